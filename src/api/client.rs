use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::error::{extract_error_message, ApiError};
use crate::api::query::Query;
use crate::model::{
    ChatMessage, EntityId, Event, EventUpdate, NewEvent, NewMessage, NewProject, NewTask, Project,
    ProjectMember, ProjectUpdate, Task, TaskUpdate, UploadedFile, User,
};
use crate::storage::session::{clear_session, SessionStorage, TOKEN_KEY};

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "token")]
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMember {
    pub user_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    #[serde(alias = "url")]
    authorization_url: String,
}

#[derive(Debug, Serialize)]
struct ReactionRequest<'a> {
    emoji: &'a str,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TeamApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
    async fn oauth_authorize_url(&self) -> Result<String, ApiError>;

    async fn list_events(&self, query: &Query) -> Result<Vec<Event>, ApiError>;
    async fn create_event(&self, event: &NewEvent) -> Result<Event, ApiError>;
    async fn update_event(&self, id: EntityId, update: &EventUpdate) -> Result<Event, ApiError>;
    async fn delete_event(&self, id: EntityId) -> Result<(), ApiError>;

    async fn list_tasks(&self, query: &Query) -> Result<Vec<Task>, ApiError>;
    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError>;
    async fn update_task(&self, id: EntityId, update: &TaskUpdate) -> Result<Task, ApiError>;
    async fn delete_task(&self, id: EntityId) -> Result<(), ApiError>;
    async fn toggle_task(&self, id: EntityId) -> Result<Task, ApiError>;

    async fn list_projects(&self, query: &Query) -> Result<Vec<Project>, ApiError>;
    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError>;
    async fn update_project(
        &self,
        id: EntityId,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError>;
    async fn delete_project(&self, id: EntityId) -> Result<(), ApiError>;
    async fn list_project_members(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<ProjectMember>, ApiError>;
    async fn add_project_member(
        &self,
        project_id: EntityId,
        member: &NewMember,
    ) -> Result<ProjectMember, ApiError>;
    async fn remove_project_member(
        &self,
        project_id: EntityId,
        user_id: EntityId,
    ) -> Result<(), ApiError>;

    async fn list_users(&self, query: &Query) -> Result<Vec<User>, ApiError>;

    async fn list_messages(&self, query: &Query) -> Result<Vec<ChatMessage>, ApiError>;
    async fn send_message(&self, message: &NewMessage) -> Result<ChatMessage, ApiError>;
    async fn add_reaction(
        &self,
        message_id: EntityId,
        emoji: &str,
    ) -> Result<ChatMessage, ApiError>;
    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedFile, ApiError>;
}

/// What a 401 means for the call that received it.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OnUnauthorized {
    /// The stored session is no longer valid.
    PurgeSession,
    /// Bad credentials on a login form; report like any other failure.
    Report,
}

pub struct HttpTeamApi {
    base_url: String,
    client: reqwest::Client,
    storage: Arc<dyn SessionStorage>,
}

impl HttpTeamApi {
    pub fn new(base_url: impl Into<String>, storage: Arc<dyn SessionStorage>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            storage,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);
        let builder = self.client.request(method, url);

        match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) => builder.bearer_auth(token),
            Ok(None) => builder,
            Err(e) => {
                tracing::warn!("Could not read stored token, sending request without it: {}", e);
                builder
            }
        }
    }

    async fn check(
        &self,
        response: Response,
        what: &str,
        on_unauthorized: OnUnauthorized,
    ) -> Result<Response, ApiError> {
        let status = response.status();
        tracing::info!("{} response status: {}", what, status);

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && on_unauthorized == OnUnauthorized::PurgeSession {
            tracing::error!("Authentication failed on {}, clearing stored session", what);
            if let Err(e) = clear_session(self.storage.as_ref()) {
                tracing::error!("Failed to clear stored session: {}", e);
            }
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await?;
        let message = extract_error_message(&body);

        if status == StatusCode::NOT_FOUND {
            tracing::error!("{} not found: {}", what, body);
            return Err(ApiError::NotFound(message.unwrap_or_else(|| what.to_string())));
        }

        tracing::error!("{} failed. Status: {}, Body: {}", what, status, body);
        Err(ApiError::RequestError {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        self.fetch_with(builder, what, OnUnauthorized::PurgeSession).await
    }

    async fn fetch_with<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
        on_unauthorized: OnUnauthorized,
    ) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let response = self.check(response, what, on_unauthorized).await?;
        let body = response.text().await?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse {} response: {}", what, e);
            ApiError::ParseError(format!("{}: {}", what, e))
        })
    }

    async fn execute(&self, builder: RequestBuilder, what: &str) -> Result<(), ApiError> {
        let response = builder.send().await?;
        self.check(response, what, OnUnauthorized::PurgeSession).await?;
        Ok(())
    }
}

#[async_trait]
impl TeamApi for HttpTeamApi {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        tracing::info!("Logging in as {}", credentials.email);
        let builder = self.request(Method::POST, "/auth/login").json(credentials);
        self.fetch_with(builder, "login", OnUnauthorized::Report).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse, ApiError> {
        tracing::info!("Registering {}", registration.email);
        let builder = self.request(Method::POST, "/auth/register").json(registration);
        self.fetch_with(builder, "register", OnUnauthorized::Report).await
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        self.fetch(self.request(Method::GET, "/auth/me"), "current user").await
    }

    async fn oauth_authorize_url(&self) -> Result<String, ApiError> {
        let response: AuthorizeResponse = self
            .fetch(self.request(Method::GET, "/auth/oauth/authorize"), "oauth authorize")
            .await?;
        Ok(response.authorization_url)
    }

    async fn list_events(&self, query: &Query) -> Result<Vec<Event>, ApiError> {
        let builder = self.request(Method::GET, "/events").query(query.pairs());
        let events: Vec<Event> = self.fetch(builder, "list events").await?;
        tracing::info!("Fetched {} events successfully", events.len());
        Ok(events)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<Event, ApiError> {
        tracing::info!("Creating event: {} on {}", event.title, event.start_time);
        let builder = self.request(Method::POST, "/events").json(event);
        self.fetch(builder, "create event").await
    }

    async fn update_event(&self, id: EntityId, update: &EventUpdate) -> Result<Event, ApiError> {
        tracing::info!("Updating event {}", id);
        tracing::debug!("PUT /events/{} with payload: {:?}", id, update);
        let builder = self.request(Method::PUT, &format!("/events/{}", id)).json(update);
        self.fetch(builder, "update event").await
    }

    async fn delete_event(&self, id: EntityId) -> Result<(), ApiError> {
        tracing::info!("Deleting event {}", id);
        self.execute(self.request(Method::DELETE, &format!("/events/{}", id)), "delete event")
            .await
    }

    async fn list_tasks(&self, query: &Query) -> Result<Vec<Task>, ApiError> {
        let builder = self.request(Method::GET, "/tasks").query(query.pairs());
        let tasks: Vec<Task> = self.fetch(builder, "list tasks").await?;
        tracing::info!("Fetched {} tasks successfully", tasks.len());
        Ok(tasks)
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
        tracing::info!("Creating task: {}", task.title);
        let builder = self.request(Method::POST, "/tasks").json(task);
        self.fetch(builder, "create task").await
    }

    async fn update_task(&self, id: EntityId, update: &TaskUpdate) -> Result<Task, ApiError> {
        tracing::info!("Updating task {}", id);
        tracing::debug!("PUT /tasks/{} with payload: {:?}", id, update);
        let builder = self.request(Method::PUT, &format!("/tasks/{}", id)).json(update);
        self.fetch(builder, "update task").await
    }

    async fn delete_task(&self, id: EntityId) -> Result<(), ApiError> {
        tracing::info!("Deleting task {}", id);
        self.execute(self.request(Method::DELETE, &format!("/tasks/{}", id)), "delete task")
            .await
    }

    async fn toggle_task(&self, id: EntityId) -> Result<Task, ApiError> {
        tracing::info!("Toggling task {}", id);
        let builder = self.request(Method::PATCH, &format!("/tasks/{}/toggle", id));
        self.fetch(builder, "toggle task").await
    }

    async fn list_projects(&self, query: &Query) -> Result<Vec<Project>, ApiError> {
        let builder = self.request(Method::GET, "/projects").query(query.pairs());
        let projects: Vec<Project> = self.fetch(builder, "list projects").await?;
        tracing::info!("Fetched {} projects successfully", projects.len());
        Ok(projects)
    }

    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
        tracing::info!("Creating project: {}", project.name);
        let builder = self.request(Method::POST, "/projects").json(project);
        self.fetch(builder, "create project").await
    }

    async fn update_project(
        &self,
        id: EntityId,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError> {
        tracing::info!("Updating project {}", id);
        let builder = self.request(Method::PUT, &format!("/projects/{}", id)).json(update);
        self.fetch(builder, "update project").await
    }

    async fn delete_project(&self, id: EntityId) -> Result<(), ApiError> {
        tracing::info!("Deleting project {}", id);
        self.execute(self.request(Method::DELETE, &format!("/projects/{}", id)), "delete project")
            .await
    }

    async fn list_project_members(
        &self,
        project_id: EntityId,
    ) -> Result<Vec<ProjectMember>, ApiError> {
        let path = format!("/projects/{}/members", project_id);
        self.fetch(self.request(Method::GET, &path), "list project members")
            .await
    }

    async fn add_project_member(
        &self,
        project_id: EntityId,
        member: &NewMember,
    ) -> Result<ProjectMember, ApiError> {
        tracing::info!("Adding user {} to project {}", member.user_id, project_id);
        let path = format!("/projects/{}/members", project_id);
        self.fetch(self.request(Method::POST, &path).json(member), "add project member")
            .await
    }

    async fn remove_project_member(
        &self,
        project_id: EntityId,
        user_id: EntityId,
    ) -> Result<(), ApiError> {
        tracing::info!("Removing user {} from project {}", user_id, project_id);
        let path = format!("/projects/{}/members/{}", project_id, user_id);
        self.execute(self.request(Method::DELETE, &path), "remove project member")
            .await
    }

    async fn list_users(&self, query: &Query) -> Result<Vec<User>, ApiError> {
        let builder = self.request(Method::GET, "/users").query(query.pairs());
        self.fetch(builder, "list users").await
    }

    async fn list_messages(&self, query: &Query) -> Result<Vec<ChatMessage>, ApiError> {
        let builder = self.request(Method::GET, "/chat/messages").query(query.pairs());
        self.fetch(builder, "list messages").await
    }

    async fn send_message(&self, message: &NewMessage) -> Result<ChatMessage, ApiError> {
        let builder = self.request(Method::POST, "/chat/messages").json(message);
        self.fetch(builder, "send message").await
    }

    async fn add_reaction(
        &self,
        message_id: EntityId,
        emoji: &str,
    ) -> Result<ChatMessage, ApiError> {
        let path = format!("/chat/messages/{}/reactions", message_id);
        let builder = self.request(Method::POST, &path).json(&ReactionRequest { emoji });
        self.fetch(builder, "add reaction").await
    }

    async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedFile, ApiError> {
        tracing::info!("Uploading {} ({} bytes)", file_name, bytes.len());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let builder = self.request(Method::POST, "/chat/upload").multipart(form);
        self.fetch(builder, "upload file").await
    }
}
