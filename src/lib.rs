pub mod api;
pub mod chat;
pub mod model;
pub mod storage;
pub mod store;

pub use api::{ApiError, HttpTeamApi, Query, TeamApi};
pub use chat::{ChatEntry, ChatRoom};
pub use store::{LoadOutcome, Navigation, Notification, Store, StoreError, StoreState, UiHooks};
