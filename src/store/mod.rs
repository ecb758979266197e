//! Client-side application state.
//!
//! [`Store`] owns the session user and the event, task and project
//! collections. Every mutating action goes to the server first and only
//! reconciles local state with what the server returned.

pub mod hooks;
pub mod reconcile;
pub mod state;


use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiError, Credentials, NewMember, Query, Registration, TeamApi};
use crate::model::{
    EntityId, Event, EventUpdate, NewEvent, NewProject, NewTask, Project, ProjectMember,
    ProjectUpdate, Task, TaskUpdate, User,
};
use crate::storage::session::{
    clear_session, load_session, save_session, SessionStorage, StorageError, TOKEN_KEY, USER_KEY,
};

pub use hooks::{Navigation, Notification, NotificationLevel, UiHooks};
pub use state::{Collection, LoadOutcome, StoreState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

struct Inner {
    api: Arc<dyn TeamApi>,
    storage: Arc<dyn SessionStorage>,
    hooks: Arc<dyn UiHooks>,
    state: Mutex<StoreState>,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub fn new(
        api: Arc<dyn TeamApi>,
        storage: Arc<dyn SessionStorage>,
        hooks: Arc<dyn UiHooks>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                storage,
                hooks,
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> StoreState {
        self.inner.state.lock().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().user.is_some()
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.state.lock().events.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.state.lock().tasks.clone()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.inner.state.lock().projects.clone()
    }

    // Session

    /// Restores the persisted session without a network call, then loads every collection.
    pub async fn restore(&self) -> Result<Option<User>, StoreError> {
        let session = match load_session(self.inner.storage.as_ref()) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to read stored session: {}", e);
                return Err(e.into());
            }
        };

        let Some(session) = session else {
            tracing::info!("No stored session, starting logged out");
            return Ok(None);
        };

        tracing::info!("Restored session for {}", session.user.email);
        self.inner.state.lock().user = Some(session.user.clone());
        self.start_session().await;
        Ok(Some(session.user))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, StoreError> {
        self.begin();
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };

        match self.inner.api.login(&credentials).await {
            Ok(auth) => self.establish_session(&auth.access_token, auth.user, "Login failed").await,
            Err(err) => Err(self.fail(err, "Login failed")),
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        department: Option<&str>,
    ) -> Result<User, StoreError> {
        self.begin();
        let registration = Registration {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            department: department.map(str::to_string),
        };

        match self.inner.api.register(&registration).await {
            Ok(auth) => {
                self.establish_session(&auth.access_token, auth.user, "Registration failed")
                    .await
            }
            Err(err) => Err(self.fail(err, "Registration failed")),
        }
    }

    /// Asks the server for the provider's sign-in page and navigates there.
    pub async fn login_with_oauth(&self) -> Result<String, StoreError> {
        match self.inner.api.oauth_authorize_url().await {
            Ok(url) => {
                tracing::info!("Redirecting to OAuth provider");
                self.inner.hooks.navigate(Navigation::External(url.clone()));
                Ok(url)
            }
            Err(err) => Err(self.fail(err, "Failed to start OAuth sign-in")),
        }
    }

    /// Completes an OAuth sign-in. A failed profile lookup falls back to a
    /// profile derived from `email`; only storage failures are errors.
    pub async fn handle_oauth_callback(
        &self,
        token: &str,
        email: &str,
    ) -> Result<User, StoreError> {
        if let Err(e) = self.inner.storage.set(TOKEN_KEY, token) {
            return Err(self.fail_storage(e, "Failed to complete sign-in"));
        }

        let user = match self.inner.api.current_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Profile lookup after OAuth failed, using fallback profile: {}", e);
                User::fallback_for_email(email)
            }
        };

        self.establish_session(token, user, "Failed to complete sign-in")
            .await
    }

    pub fn logout(&self) {
        if let Err(e) = clear_session(self.inner.storage.as_ref()) {
            tracing::error!("Failed to clear stored session: {}", e);
        }
        self.inner.state.lock().clear_session();
        tracing::info!("Logged out");
    }

    /// Re-reads the current user's profile and persists it.
    pub async fn refresh_user(&self) -> Result<User, StoreError> {
        match self.inner.api.current_user().await {
            Ok(user) => {
                let json = serde_json::to_string(&user).map_err(StorageError::from);
                if let Err(e) = json.and_then(|json| self.inner.storage.set(USER_KEY, &json)) {
                    return Err(self.fail_storage(e, "Failed to save profile"));
                }
                self.inner.state.lock().user = Some(user.clone());
                Ok(user)
            }
            Err(err) => Err(self.fail(err, "Failed to load profile")),
        }
    }

    async fn establish_session(
        &self,
        token: &str,
        user: User,
        fallback: &str,
    ) -> Result<User, StoreError> {
        if let Err(e) = save_session(self.inner.storage.as_ref(), token, &user) {
            self.inner.state.lock().clear_session();
            return Err(self.fail_storage(e, fallback));
        }

        {
            let mut state = self.inner.state.lock();
            state.user = Some(user.clone());
            state.loading = false;
            state.error = None;
        }
        tracing::info!("Signed in as {}", user.email);

        self.start_session().await;
        Ok(user)
    }

    /// One load of each collection, run concurrently.
    async fn start_session(&self) {
        let query = Query::new();
        let (events, tasks, projects) = tokio::join!(
            self.load_events(&query),
            self.load_tasks(&query),
            self.load_projects(&query),
        );
        tracing::debug!(
            "Session start loads: events={:?} tasks={:?} projects={:?}",
            events,
            tasks,
            projects
        );
    }

    // Collections

    pub async fn load_events(&self, query: &Query) -> LoadOutcome {
        if !self.begin_load(Collection::Events) {
            return LoadOutcome::AlreadyLoading;
        }
        let result = self.inner.api.list_events(query).await;
        self.finish_load(Collection::Events, result, |state, events| state.events = events)
    }

    pub async fn load_tasks(&self, query: &Query) -> LoadOutcome {
        if !self.begin_load(Collection::Tasks) {
            return LoadOutcome::AlreadyLoading;
        }
        let result = self.inner.api.list_tasks(query).await;
        self.finish_load(Collection::Tasks, result, |state, tasks| state.tasks = tasks)
    }

    pub async fn load_projects(&self, query: &Query) -> LoadOutcome {
        if !self.begin_load(Collection::Projects) {
            return LoadOutcome::AlreadyLoading;
        }
        let result = self.inner.api.list_projects(query).await;
        self.finish_load(Collection::Projects, result, |state, projects| {
            state.projects = projects
        })
    }

    pub async fn create_event(&self, event: &NewEvent) -> Result<Event, StoreError> {
        self.begin();
        match self.inner.api.create_event(event).await {
            Ok(created) => {
                self.apply(|state| reconcile::append(&mut state.events, created.clone()));
                self.succeed("Event created");
                Ok(created)
            }
            Err(err) => Err(self.fail(err, "Failed to create event")),
        }
    }

    pub async fn update_event(
        &self,
        id: EntityId,
        update: &EventUpdate,
    ) -> Result<Event, StoreError> {
        self.begin();
        match self.inner.api.update_event(id, update).await {
            Ok(updated) => {
                self.apply(|state| reconcile::replace(&mut state.events, updated.clone()));
                self.succeed("Event updated");
                Ok(updated)
            }
            Err(err) => Err(self.fail(err, "Failed to update event")),
        }
    }

    pub async fn delete_event(&self, id: EntityId) -> Result<(), StoreError> {
        self.begin();
        match self.inner.api.delete_event(id).await {
            Ok(()) => {
                self.apply(|state| reconcile::remove(&mut state.events, id));
                self.succeed("Event deleted");
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to delete event")),
        }
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        self.begin();
        match self.inner.api.create_task(task).await {
            Ok(created) => {
                self.apply(|state| reconcile::append(&mut state.tasks, created.clone()));
                self.succeed("Task created");
                Ok(created)
            }
            Err(err) => Err(self.fail(err, "Failed to create task")),
        }
    }

    pub async fn update_task(&self, id: EntityId, update: &TaskUpdate) -> Result<Task, StoreError> {
        self.begin();
        match self.inner.api.update_task(id, update).await {
            Ok(updated) => {
                self.apply(|state| reconcile::replace(&mut state.tasks, updated.clone()));
                self.succeed("Task updated");
                Ok(updated)
            }
            Err(err) => Err(self.fail(err, "Failed to update task")),
        }
    }

    pub async fn delete_task(&self, id: EntityId) -> Result<(), StoreError> {
        self.begin();
        match self.inner.api.delete_task(id).await {
            Ok(()) => {
                self.apply(|state| reconcile::remove(&mut state.tasks, id));
                self.succeed("Task deleted");
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to delete task")),
        }
    }

    /// Flips completion on the server, then reloads the whole task list
    /// rather than patching the local entry.
    pub async fn toggle_task(&self, id: EntityId) -> Result<(), StoreError> {
        self.begin();
        match self.inner.api.toggle_task(id).await {
            Ok(_) => {
                self.settle();
                let outcome = self.load_tasks(&Query::new()).await;
                tracing::debug!("Reload after toggling task {}: {:?}", id, outcome);
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to update task")),
        }
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project, StoreError> {
        self.begin();
        match self.inner.api.create_project(project).await {
            Ok(created) => {
                self.apply(|state| reconcile::append(&mut state.projects, created.clone()));
                self.succeed("Project created");
                Ok(created)
            }
            Err(err) => Err(self.fail(err, "Failed to create project")),
        }
    }

    pub async fn update_project(
        &self,
        id: EntityId,
        update: &ProjectUpdate,
    ) -> Result<Project, StoreError> {
        self.begin();
        match self.inner.api.update_project(id, update).await {
            Ok(updated) => {
                self.apply(|state| reconcile::replace(&mut state.projects, updated.clone()));
                self.succeed("Project updated");
                Ok(updated)
            }
            Err(err) => Err(self.fail(err, "Failed to update project")),
        }
    }

    pub async fn delete_project(&self, id: EntityId) -> Result<(), StoreError> {
        self.begin();
        match self.inner.api.delete_project(id).await {
            Ok(()) => {
                self.apply(|state| reconcile::remove(&mut state.projects, id));
                self.succeed("Project deleted");
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to delete project")),
        }
    }

    // Pass-through lookups

    pub async fn list_users(&self, query: &Query) -> Result<Vec<User>, StoreError> {
        self.inner
            .api
            .list_users(query)
            .await
            .map_err(|err| self.fail(err, "Failed to load users"))
    }

    pub async fn project_members(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<ProjectMember>, StoreError> {
        self.inner
            .api
            .list_project_members(project_id)
            .await
            .map_err(|err| self.fail(err, "Failed to load project members"))
    }

    /// Adds a member, then reloads projects so member counts stay current.
    pub async fn add_project_member(
        &self,
        project_id: EntityId,
        user_id: EntityId,
        role: Option<&str>,
    ) -> Result<ProjectMember, StoreError> {
        let member = NewMember {
            user_id,
            role: role.map(str::to_string),
        };
        let added = self
            .inner
            .api
            .add_project_member(project_id, &member)
            .await
            .map_err(|err| self.fail(err, "Failed to add member"))?;

        self.succeed("Member added");
        self.load_projects(&Query::new()).await;
        Ok(added)
    }

    pub async fn remove_project_member(
        &self,
        project_id: EntityId,
        user_id: EntityId,
    ) -> Result<(), StoreError> {
        self.inner
            .api
            .remove_project_member(project_id, user_id)
            .await
            .map_err(|err| self.fail(err, "Failed to remove member"))?;

        self.succeed("Member removed");
        self.load_projects(&Query::new()).await;
        Ok(())
    }

    // Bookkeeping. The state lock is never held across an await or a hook call.

    fn begin(&self) {
        let mut state = self.inner.state.lock();
        state.loading = true;
        state.error = None;
    }

    fn apply(&self, mutate: impl FnOnce(&mut StoreState)) {
        let mut state = self.inner.state.lock();
        mutate(&mut state);
        state.loading = false;
    }

    fn settle(&self) {
        self.inner.state.lock().loading = false;
    }

    fn succeed(&self, message: &str) {
        self.inner.hooks.notify(Notification::success(message));
    }

    /// Claims the collection's loading flag. `false` means a load is already in flight.
    fn begin_load(&self, collection: Collection) -> bool {
        let mut state = self.inner.state.lock();
        if state.is_loading(collection) {
            tracing::debug!("Skipping {} load, one is already in flight", collection.name());
            return false;
        }
        state.set_loading(collection, true);
        state.error = None;
        true
    }

    fn finish_load<T>(
        &self,
        collection: Collection,
        result: Result<Vec<T>, ApiError>,
        install: impl FnOnce(&mut StoreState, Vec<T>),
    ) -> LoadOutcome {
        match result {
            Ok(items) => {
                let count = items.len();
                let mut state = self.inner.state.lock();
                install(&mut state, items);
                state.set_loading(collection, false);
                tracing::info!("Loaded {} {}", count, collection.name());
                LoadOutcome::Loaded(count)
            }
            Err(err) => {
                self.inner.state.lock().set_loading(collection, false);
                self.fail(err, &format!("Failed to load {}", collection.name()));
                LoadOutcome::Failed
            }
        }
    }

    /// Records and surfaces a failed remote call. A 401 drops the session and
    /// sends the user to sign in instead of reporting the action's error.
    /// Concurrent 401s navigate once, for whichever call still saw a session.
    fn fail(&self, err: ApiError, fallback: &str) -> StoreError {
        if err.is_unauthorized() {
            let had_session = {
                let mut state = self.inner.state.lock();
                let had_session = state.user.is_some();
                state.clear_session();
                had_session
            };
            if had_session {
                tracing::warn!("{}: session rejected by server, signing out", fallback);
                self.inner.hooks.navigate(Navigation::Login);
            }
            return err.into();
        }

        let message = err
            .server_message()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string());
        tracing::error!("{}: {}", fallback, err);

        {
            let mut state = self.inner.state.lock();
            state.loading = false;
            state.error = Some(message.clone());
        }
        self.inner.hooks.notify(Notification::error(message));
        err.into()
    }

    fn fail_storage(&self, err: StorageError, fallback: &str) -> StoreError {
        tracing::error!("{}: {}", fallback, err);
        {
            let mut state = self.inner.state.lock();
            state.loading = false;
            state.error = Some(fallback.to_string());
        }
        self.inner.hooks.notify(Notification::error(fallback));
        err.into()
    }
}
