pub mod event;
pub mod message;
pub mod project;
pub mod task;
pub mod user;

/// Server-assigned identifier shared by every entity.
pub type EntityId = i64;

pub use event::{Event, EventHost, EventUpdate, MeetingPlatform, NewEvent};
pub use message::{ChatMessage, NewMessage, Reaction, UploadedFile};
pub use project::{NewProject, Project, ProjectMember, ProjectRef, ProjectStatus, ProjectUpdate};
pub use task::{NewTask, Priority, Task, TaskStatus, TaskUpdate};
pub use user::{User, UserSummary};

/// Anything the server identifies by an [`EntityId`].
pub trait Entity {
    fn id(&self) -> EntityId;
}

impl Entity for Event {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Entity for Task {
    fn id(&self) -> EntityId {
        self.id
    }
}

impl Entity for Project {
    fn id(&self) -> EntityId {
        self.id
    }
}
