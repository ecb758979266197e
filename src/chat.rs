use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::api::{ApiError, Query, TeamApi};
use crate::model::{ChatMessage, EntityId, NewMessage};
use crate::store::{Navigation, Notification, UiHooks};

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEntry {
    Delivered(ChatMessage),
    /// Shown locally while the send request is in flight.
    Pending {
        local_id: Uuid,
        content: String,
        sent_at: DateTime<Utc>,
    },
}

impl ChatEntry {
    pub fn content(&self) -> &str {
        match self {
            ChatEntry::Delivered(message) => &message.content,
            ChatEntry::Pending { content, .. } => content,
        }
    }

    fn server_id(&self) -> Option<EntityId> {
        match self {
            ChatEntry::Delivered(message) => Some(message.id),
            ChatEntry::Pending { .. } => None,
        }
    }
}

/// Local view of one team channel, kept current by polling.
pub struct ChatRoom {
    api: Arc<dyn TeamApi>,
    hooks: Arc<dyn UiHooks>,
    team_id: Option<String>,
    entries: Mutex<Vec<ChatEntry>>,
}

impl ChatRoom {
    pub fn new(api: Arc<dyn TeamApi>, hooks: Arc<dyn UiHooks>, team_id: Option<String>) -> Self {
        Self {
            api,
            hooks,
            team_id,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<ChatEntry> {
        self.entries.lock().clone()
    }

    fn query(&self) -> Query {
        match &self.team_id {
            Some(team) => Query::new().with("team_id", team),
            None => Query::new(),
        }
    }

    fn is_known(entries: &[ChatEntry], id: EntityId) -> bool {
        entries.iter().any(|entry| entry.server_id() == Some(id))
    }

    /// Fetches the channel once and appends messages not seen before.
    /// Returns the newly appended messages.
    pub async fn poll_once(&self) -> Result<Vec<ChatMessage>, ApiError> {
        let fetched = match self.api.list_messages(&self.query()).await {
            Ok(fetched) => fetched,
            Err(err) => {
                if err.is_unauthorized() {
                    self.hooks.navigate(Navigation::Login);
                } else {
                    tracing::warn!("Chat poll failed: {}", err);
                }
                return Err(err);
            }
        };

        let mut entries = self.entries.lock();
        let mut appended = Vec::new();
        for message in fetched {
            if !Self::is_known(&entries, message.id) {
                entries.push(ChatEntry::Delivered(message.clone()));
                appended.push(message);
            }
        }

        if !appended.is_empty() {
            tracing::debug!("Appended {} chat messages", appended.len());
        }
        Ok(appended)
    }

    /// Polls every `period` until `shutdown` resolves, handing new messages to `on_new`.
    pub async fn run<F>(
        &self,
        period: Duration,
        shutdown: F,
        mut on_new: impl FnMut(&[ChatMessage]),
    ) where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("Polling chat every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Chat polling stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Ok(appended) = self.poll_once().await
                        && !appended.is_empty()
                    {
                        on_new(&appended);
                    }
                }
            }
        }
    }

    pub async fn send(&self, content: &str) -> Result<ChatMessage, ApiError> {
        self.send_message(content, None).await
    }

    /// Uploads a file and posts it to the channel as an attachment.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<ChatMessage, ApiError> {
        let uploaded = self
            .api
            .upload_file(file_name, bytes)
            .await
            .map_err(|err| self.fail(err, "Failed to upload file"))?;

        let label = uploaded.file_name.unwrap_or_else(|| file_name.to_string());
        self.send_message(&label, Some(uploaded.url)).await
    }

    async fn send_message(
        &self,
        content: &str,
        attachment_url: Option<String>,
    ) -> Result<ChatMessage, ApiError> {
        let local_id = Uuid::new_v4();
        self.entries.lock().push(ChatEntry::Pending {
            local_id,
            content: content.to_string(),
            sent_at: Utc::now(),
        });

        let request = NewMessage {
            content: content.to_string(),
            team_id: self.team_id.clone(),
            attachment_url,
        };
        let result = self.api.send_message(&request).await;

        let mut entries = self.entries.lock();
        let pending_at = entries.iter().position(
            |entry| matches!(entry, ChatEntry::Pending { local_id: id, .. } if *id == local_id),
        );

        match result {
            Ok(message) => {
                if let Some(index) = pending_at {
                    if Self::is_known(&entries, message.id) {
                        entries.remove(index);
                    } else {
                        entries[index] = ChatEntry::Delivered(message.clone());
                    }
                }
                Ok(message)
            }
            Err(err) => {
                if let Some(index) = pending_at {
                    entries.remove(index);
                }
                drop(entries);
                Err(self.fail(err, "Failed to send message"))
            }
        }
    }

    pub async fn react(&self, message_id: EntityId, emoji: &str) -> Result<ChatMessage, ApiError> {
        let updated = self
            .api
            .add_reaction(message_id, emoji)
            .await
            .map_err(|err| self.fail(err, "Failed to add reaction"))?;

        let mut entries = self.entries.lock();
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.server_id() == Some(message_id))
        {
            *entry = ChatEntry::Delivered(updated.clone());
        }
        Ok(updated)
    }

    /// Surfaces a failed chat action. A 401 only redirects to sign in.
    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        if err.is_unauthorized() {
            tracing::warn!("{}: session rejected by server", fallback);
            self.hooks.navigate(Navigation::Login);
            return err;
        }

        tracing::error!("{}: {}", fallback, err);
        let text = err.server_message().unwrap_or(fallback).to_string();
        self.hooks.notify(Notification::error(text));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpTeamApi, MockTeamApi};
    use crate::model::{Reaction, UploadedFile, UserSummary};
    use crate::storage::session::MemorySessionStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingHooks {
        notifications: Mutex<Vec<Notification>>,
        navigations: Mutex<Vec<Navigation>>,
    }

    impl UiHooks for RecordingHooks {
        fn notify(&self, notification: Notification) {
            self.notifications.lock().push(notification);
        }

        fn navigate(&self, to: Navigation) {
            self.navigations.lock().push(to);
        }
    }

    fn message(id: EntityId, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            sender: UserSummary {
                id: 1,
                name: "Ada".to_string(),
                email: None,
            },
            content: content.to_string(),
            created_at: Utc::now(),
            attachment_url: None,
            reactions: vec![],
        }
    }

    fn room(api: MockTeamApi) -> (ChatRoom, Arc<RecordingHooks>) {
        let hooks = Arc::new(RecordingHooks::default());
        let room = ChatRoom::new(Arc::new(api), hooks.clone(), Some("design".to_string()));
        (room, hooks)
    }

    fn contents(room: &ChatRoom) -> Vec<String> {
        room.entries().iter().map(|e| e.content().to_string()).collect()
    }

    #[tokio::test]
    async fn poll_appends_only_unseen_messages() {
        let mut api = MockTeamApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_list_messages()
            .withf(|q| q.pairs() == [("team_id".to_string(), "design".to_string())])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![message(1, "hi")]));
        api.expect_list_messages()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![message(1, "hi"), message(2, "hello")]));
        let (room, _) = room(api);

        room.poll_once().await.unwrap();
        let appended = room.poll_once().await.unwrap();

        assert_eq!(appended.len(), 1);
        assert_eq!(contents(&room), vec!["hi", "hello"]);
    }

    #[tokio::test]
    async fn unauthorized_poll_redirects_to_login() {
        let mut api = MockTeamApi::new();
        api.expect_list_messages()
            .returning(|_| Err(ApiError::Unauthorized));
        let (room, hooks) = room(api);

        assert!(room.poll_once().await.is_err());
        assert_eq!(hooks.navigations.lock().clone(), vec![Navigation::Login]);
    }

    #[tokio::test]
    async fn sent_message_replaces_pending_entry() {
        let mut api = MockTeamApi::new();
        api.expect_send_message()
            .withf(|m| m.content == "ship it" && m.team_id.as_deref() == Some("design"))
            .returning(|m| Ok(message(10, &m.content)));
        let (room, _) = room(api);

        let sent = room.send("ship it").await.unwrap();

        assert_eq!(room.entries(), vec![ChatEntry::Delivered(sent)]);
        assert_eq!(contents(&room), vec!["ship it"]);
    }

    #[tokio::test]
    async fn failed_send_rolls_back_pending_entry() {
        let mut api = MockTeamApi::new();
        api.expect_send_message().returning(|_| {
            Err(ApiError::RequestError {
                status: 500,
                message: None,
            })
        });
        let (room, hooks) = room(api);

        assert!(room.send("lost").await.is_err());
        assert!(room.entries().is_empty());
        assert_eq!(
            hooks.notifications.lock().clone(),
            vec![Notification::error("Failed to send message")]
        );
    }

    #[tokio::test]
    async fn unauthorized_send_redirects_without_error_toast() {
        let mut api = MockTeamApi::new();
        api.expect_send_message()
            .returning(|_| Err(ApiError::Unauthorized));
        let (room, hooks) = room(api);

        let result = room.send("hello?").await;

        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert!(room.entries().is_empty());
        assert!(hooks.notifications.lock().is_empty());
        assert_eq!(hooks.navigations.lock().clone(), vec![Navigation::Login]);
    }

    #[tokio::test]
    async fn unauthorized_reaction_and_upload_redirect_without_error_toast() {
        let mut api = MockTeamApi::new();
        api.expect_add_reaction()
            .returning(|_, _| Err(ApiError::Unauthorized));
        api.expect_upload_file()
            .returning(|_, _| Err(ApiError::Unauthorized));
        let (room, hooks) = room(api);

        assert!(room.react(3, "👍").await.is_err());
        assert!(room.upload("plan.pdf", vec![1]).await.is_err());

        assert!(hooks.notifications.lock().is_empty());
        assert_eq!(
            hooks.navigations.lock().clone(),
            vec![Navigation::Login, Navigation::Login]
        );
    }

    #[tokio::test]
    async fn failed_reaction_reports_server_message() {
        let mut api = MockTeamApi::new();
        api.expect_add_reaction().returning(|_, _| {
            Err(ApiError::RequestError {
                status: 400,
                message: Some("Unknown emoji".to_string()),
            })
        });
        let (room, hooks) = room(api);

        assert!(room.react(3, "x").await.is_err());

        assert_eq!(
            hooks.notifications.lock().clone(),
            vec![Notification::error("Unknown emoji")]
        );
        assert!(hooks.navigations.lock().is_empty());
    }

    #[tokio::test]
    async fn pending_message_is_visible_while_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/messages"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({
                        "id": 5,
                        "sender": {"id": 1, "name": "Ada"},
                        "content": "on my way",
                        "created_at": "2025-03-01T10:00:00Z"
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let api = HttpTeamApi::new(server.uri(), Arc::new(MemorySessionStorage::new()));
        let room = Arc::new(ChatRoom::new(
            Arc::new(api),
            Arc::new(RecordingHooks::default()),
            None,
        ));

        let sending = {
            let room = room.clone();
            tokio::spawn(async move { room.send("on my way").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            room.entries().as_slice(),
            [ChatEntry::Pending { content, .. }] if content == "on my way"
        ));

        sending.await.unwrap().unwrap();
        assert!(matches!(room.entries().as_slice(), [ChatEntry::Delivered(m)] if m.id == 5));
    }

    #[tokio::test]
    async fn upload_posts_attachment_message() {
        let mut api = MockTeamApi::new();
        api.expect_upload_file()
            .withf(|name, bytes| name == "plan.pdf" && bytes.len() == 3)
            .returning(|_, _| {
                Ok(UploadedFile {
                    url: "https://files.example.com/plan.pdf".to_string(),
                    file_name: None,
                })
            });
        api.expect_send_message()
            .withf(|m| m.attachment_url.as_deref() == Some("https://files.example.com/plan.pdf"))
            .returning(|m| {
                let mut sent = message(11, &m.content);
                sent.attachment_url = m.attachment_url.clone();
                Ok(sent)
            });
        let (room, _) = room(api);

        let sent = room.upload("plan.pdf", vec![1, 2, 3]).await.unwrap();

        assert_eq!(sent.content, "plan.pdf");
        assert_eq!(contents(&room), vec!["plan.pdf"]);
    }

    #[tokio::test]
    async fn reaction_updates_local_message() {
        let mut api = MockTeamApi::new();
        api.expect_list_messages()
            .returning(|_| Ok(vec![message(3, "lunch?")]));
        api.expect_add_reaction()
            .withf(|id, emoji| *id == 3 && emoji == "👍")
            .returning(|id, emoji| {
                let mut reacted = message(id, "lunch?");
                reacted.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    user_id: 1,
                });
                Ok(reacted)
            });
        let (room, _) = room(api);
        room.poll_once().await.unwrap();

        room.react(3, "👍").await.unwrap();

        match &room.entries()[0] {
            ChatEntry::Delivered(m) => assert_eq!(m.reactions.len(), 1),
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_polls_until_shutdown() {
        let mut api = MockTeamApi::new();
        api.expect_list_messages()
            .times(2..)
            .returning(|_| Ok(vec![message(1, "hi")]));
        let (room, _) = room(api);
        let mut delivered = 0;

        room.run(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(35)),
            |new| delivered += new.len(),
        )
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(room.entries().len(), 1);
    }
}
