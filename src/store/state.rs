use crate::model::{Event, Project, Task, User};

/// Everything the UI renders from. Cloned out of the Store as a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub user: Option<User>,
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
    pub loading: bool,
    pub error: Option<String>,
    pub loading_events: bool,
    pub loading_tasks: bool,
    pub loading_projects: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Events,
    Tasks,
    Projects,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Tasks => "tasks",
            Collection::Projects => "projects",
        }
    }
}

/// Result of a load action. Failures are already surfaced through the hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(usize),
    /// A load of the same collection was in flight; nothing was requested.
    AlreadyLoading,
    Failed,
}

impl StoreState {
    pub fn is_loading(&self, collection: Collection) -> bool {
        match collection {
            Collection::Events => self.loading_events,
            Collection::Tasks => self.loading_tasks,
            Collection::Projects => self.loading_projects,
        }
    }

    pub fn set_loading(&mut self, collection: Collection, loading: bool) {
        match collection {
            Collection::Events => self.loading_events = loading,
            Collection::Tasks => self.loading_tasks = loading,
            Collection::Projects => self.loading_projects = loading,
        }
    }

    /// Drops the user and every collection.
    pub fn clear_session(&mut self) {
        self.user = None;
        self.events.clear();
        self.tasks.clear();
        self.projects.clear();
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_flags_are_independent() {
        let mut state = StoreState::default();

        state.set_loading(Collection::Tasks, true);

        assert!(state.is_loading(Collection::Tasks));
        assert!(!state.is_loading(Collection::Events));
        assert!(!state.is_loading(Collection::Projects));
    }
}
