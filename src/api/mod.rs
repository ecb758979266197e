pub mod client;
pub mod error;
pub mod query;

pub use client::{AuthResponse, Credentials, HttpTeamApi, NewMember, Registration, TeamApi};
pub use error::ApiError;
pub use query::Query;

#[cfg(test)]
pub use client::MockTeamApi;
