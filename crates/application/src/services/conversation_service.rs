//! 会话查询与持久消息服务
//!
//! 读写持久存储，并把结果与实时在线状态对齐（参与者的 `isOnline`）。
//! 写入成功后绕过临时聊天通道，直接通知在线的接收方或发送方。
//! 存储调用期间不持有在线状态登记表的锁。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{
    counterpart_of, MessageContent, MessageId, MessageRecord, MessageType, NewMessage, UserId,
    UserProfile,
};
use tracing::{debug, error, info};

use crate::{
    clock::Clock,
    dto::{ConversationDto, MessageDto, ParticipantDto},
    error::ApplicationError,
    events::ServerEvent,
    relay::MessageRelay,
    repository::{MessageStore, UserDirectory},
};

/// 单次历史查询返回的最大条数
pub const HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct CreateMessageRequest {
    pub sender_id: UserId,
    pub receiver_id: String,
    pub content: String,
    pub message_type: Option<String>,
    pub file_url: Option<String>,
}

pub struct ConversationServiceDependencies {
    pub message_store: Arc<dyn MessageStore>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub relay: Arc<MessageRelay>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConversationService {
    deps: ConversationServiceDependencies,
}

impl ConversationService {
    pub fn new(deps: ConversationServiceDependencies) -> Self {
        Self { deps }
    }

    /// 每个对方的最后一条消息
    pub async fn list_conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationDto>, ApplicationError> {
        let records = self
            .deps
            .message_store
            .latest_per_counterpart(user_id)
            .await
            .map_err(|err| store_failure("latest_per_counterpart", err))?;

        let messages = self.resolve(&records).await?;
        Ok(records
            .iter()
            .zip(messages)
            .map(|(record, last_message)| ConversationDto {
                counterpart_id: counterpart_of(record, user_id).clone(),
                last_message,
            })
            .collect())
    }

    /// 与某个对方的最近消息，按时间倒序
    pub async fn list_history(
        &self,
        user_id: &UserId,
        counterpart_id: &str,
    ) -> Result<Vec<MessageDto>, ApplicationError> {
        let counterpart_id = UserId::parse(counterpart_id)?;
        let records = self
            .deps
            .message_store
            .find_between(user_id, &counterpart_id, HISTORY_LIMIT)
            .await
            .map_err(|err| store_failure("find_between", err))?;

        self.resolve(&records).await
    }

    /// 持久化一条私信，并在接收方在线时推送 `newMessage`
    pub async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> Result<MessageDto, ApplicationError> {
        let content = MessageContent::new(request.content)?;
        let receiver_id = UserId::parse(request.receiver_id)?;
        let message_type = match request.message_type.as_deref() {
            None | Some("") => MessageType::default(),
            Some(tag) => tag.parse()?,
        };
        let file_url = request.file_url.filter(|url| !url.is_empty());

        let created = self
            .deps
            .message_store
            .create(NewMessage {
                sender_id: request.sender_id,
                receiver_id,
                content,
                message_type,
                file_url,
            })
            .await
            .map_err(|err| store_failure("create", err))?;

        let record = self
            .deps
            .message_store
            .find_by_id(created.id)
            .await
            .map_err(|err| store_failure("find_by_id", err))?
            .unwrap_or(created);

        let message = self.resolve_one(&record).await?;
        info!(
            message_id = %record.id,
            sender_id = %record.sender_id,
            receiver_id = %record.receiver_id,
            "message stored"
        );

        let delivered = self
            .deps
            .relay
            .deliver_to_user(&record.receiver_id, ServerEvent::NewMessage(message.clone()));
        debug!(message_id = %record.id, delivered, "newMessage notification");

        Ok(message)
    }

    /// 设置已读时间，并在发送方在线时推送 `messageRead`。
    ///
    /// 已读、接收者不符和不存在三种情况统一返回 `NotFound`。
    pub async fn mark_read(
        &self,
        message_id: MessageId,
        reader_id: &UserId,
    ) -> Result<MessageDto, ApplicationError> {
        let now = self.deps.clock.now();
        let record = self
            .deps
            .message_store
            .mark_read(message_id, reader_id, now)
            .await
            .map_err(|err| store_failure("mark_read", err))?
            .ok_or(ApplicationError::NotFound)?;

        let message = self.resolve_one(&record).await?;
        let delivered = self
            .deps
            .relay
            .deliver_to_user(&record.sender_id, ServerEvent::MessageRead(message.clone()));
        debug!(message_id = %record.id, delivered, "messageRead notification");

        Ok(message)
    }

    async fn resolve_one(&self, record: &MessageRecord) -> Result<MessageDto, ApplicationError> {
        let mut resolved = self.resolve(std::slice::from_ref(record)).await?;
        resolved.pop().ok_or(ApplicationError::NotFound)
    }

    /// 填充参与者展示字段与在线标记
    async fn resolve(&self, records: &[MessageRecord]) -> Result<Vec<MessageDto>, ApplicationError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<UserId> = records
            .iter()
            .flat_map(|r| [r.sender_id.clone(), r.receiver_id.clone()])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let profiles: HashMap<UserId, UserProfile> = self
            .deps
            .user_directory
            .find_profiles(&ids)
            .await
            .map_err(|err| store_failure("find_profiles", err))?
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect();

        // 存储调用结束后再读取在线状态
        let online = self.deps.relay.presence().online_among(ids.iter());

        Ok(records
            .iter()
            .map(|record| {
                let sender = ParticipantDto::resolve(
                    &record.sender_id,
                    &profiles,
                    online.contains(&record.sender_id),
                );
                let receiver = ParticipantDto::resolve(
                    &record.receiver_id,
                    &profiles,
                    online.contains(&record.receiver_id),
                );
                MessageDto::new(record, sender, receiver)
            })
            .collect())
    }
}

fn store_failure(operation: &'static str, err: domain::RepositoryError) -> ApplicationError {
    error!(operation, error = %err, "message store operation failed");
    ApplicationError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SystemClock};
    use crate::hub::{ConnectionHub, EventReceiver};
    use crate::memory::{InMemoryMessageStore, InMemoryUserDirectory};
    use crate::presence::PresenceRegistry;
    use crate::repository::MockMessageStore;
    use domain::{ConnectionId, RepositoryError};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Fixture {
        service: ConversationService,
        relay: Arc<MessageRelay>,
    }

    impl Fixture {
        fn new(clock: Arc<dyn Clock>) -> Self {
            Self::with_store(Arc::new(InMemoryMessageStore::new(clock.clone())), clock)
        }

        fn with_store(store: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
            let directory = InMemoryUserDirectory::new();
            directory.insert(UserProfile::new(user("alice"), "alice", "a.png"));
            directory.insert(UserProfile::new(user("bob"), "bob", ""));

            let relay = Arc::new(MessageRelay::new(
                Arc::new(PresenceRegistry::new()),
                Arc::new(ConnectionHub::new()),
                clock.clone(),
            ));
            let service = ConversationService::new(ConversationServiceDependencies {
                message_store: store,
                user_directory: Arc::new(directory),
                relay: relay.clone(),
                clock,
            });
            Self { service, relay }
        }

        fn connect(&self, name: &str) -> EventReceiver {
            let handle = ConnectionId::generate();
            let (tx, rx) = mpsc::unbounded_channel();
            self.relay.hub().attach(handle, tx);
            self.relay.presence().register(handle, user(name));
            rx
        }

        async fn send(&self, from: &str, to: &str, content: &str) -> MessageDto {
            self.service
                .create_message(request(from, to, content))
                .await
                .unwrap()
        }
    }

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    fn request(from: &str, to: &str, content: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            sender_id: user(from),
            receiver_id: to.to_owned(),
            content: content.to_owned(),
            message_type: None,
            file_url: None,
        }
    }

    #[tokio::test]
    async fn created_message_shows_up_for_both_parties() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let created = fixture.send("alice", "bob", "hi").await;

        assert_eq!(created.content, "hi");
        assert_eq!(created.message_type, MessageType::Text);
        assert_eq!(created.file_url, "");
        assert_eq!(created.read_at, None);
        assert_eq!(created.sender.username.as_deref(), Some("alice"));

        let from_alice = fixture.service.list_history(&user("alice"), "bob").await.unwrap();
        let from_bob = fixture.service.list_history(&user("bob"), "alice").await.unwrap();
        assert_eq!(from_alice, vec![created.clone()]);
        assert_eq!(from_bob, vec![created.clone()]);

        let alice_conversations = fixture
            .service
            .list_conversations(&user("alice"))
            .await
            .unwrap();
        assert_eq!(alice_conversations.len(), 1);
        assert_eq!(alice_conversations[0].counterpart_id, user("bob"));
        assert_eq!(alice_conversations[0].last_message.id, created.id);

        let bob_conversations = fixture
            .service
            .list_conversations(&user("bob"))
            .await
            .unwrap();
        assert_eq!(bob_conversations[0].counterpart_id, user("alice"));
        assert_eq!(bob_conversations[0].last_message.created_at, created.created_at);
    }

    #[tokio::test]
    async fn new_message_is_pushed_to_online_receiver() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let mut bob_rx = fixture.connect("bob");

        let created = fixture.send("alice", "bob", "hello").await;

        match bob_rx.try_recv().unwrap() {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.content, "hello");
                assert!(message.receiver.is_online);
                assert!(!message.sender.is_online);
                assert_eq!(message.id, created.id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_durable_record() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let mut alice_rx = fixture.connect("alice");

        let created = fixture.send("alice", "bob", "later").await;

        assert!(alice_rx.try_recv().is_err());
        let history = fixture.service.list_history(&user("bob"), "alice").await.unwrap();
        assert_eq!(history[0].id, created.id);
    }

    #[tokio::test]
    async fn empty_content_fails_without_store_write() {
        let mut store = MockMessageStore::new();
        store.expect_create().never();
        let fixture = Fixture::with_store(Arc::new(store), Arc::new(SystemClock));

        for content in ["", "   "] {
            let err = fixture
                .service
                .create_message(request("alice", "bob", content))
                .await
                .unwrap_err();
            assert!(matches!(err, ApplicationError::Validation { .. }));
        }
    }

    #[tokio::test]
    async fn unknown_message_type_is_rejected() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let mut req = request("alice", "bob", "clip");
        req.message_type = Some("video".into());

        let err = fixture.service.create_message(req).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Validation { .. }));
    }

    #[tokio::test]
    async fn attachment_fields_are_kept() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let mut req = request("alice", "bob", "see attached");
        req.message_type = Some("image".into());
        req.file_url = Some("https://cdn.example.com/cat.png".into());

        let created = fixture.service.create_message(req).await.unwrap();
        assert_eq!(created.message_type, MessageType::Image);
        assert_eq!(created.file_url, "https://cdn.example.com/cat.png");
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let mut store = MockMessageStore::new();
        store
            .expect_create()
            .returning(|_| Err(RepositoryError::storage("connection reset")));
        let fixture = Fixture::with_store(Arc::new(store), Arc::new(SystemClock));

        let err = fixture
            .service
            .create_message(request("alice", "bob", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Store(_)));
    }

    #[tokio::test]
    async fn mark_read_notifies_sender_once() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let mut alice_rx = fixture.connect("alice");
        let created = fixture.send("alice", "bob", "hello").await;

        let read = fixture
            .service
            .mark_read(created.id, &user("bob"))
            .await
            .unwrap();
        assert!(read.read_at.is_some());

        match alice_rx.try_recv().unwrap() {
            ServerEvent::MessageRead(message) => {
                assert_eq!(message.id, created.id);
                assert_eq!(message.read_at, read.read_at);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // 第二次标记已读：NotFound，记录不变
        let err = fixture
            .service
            .mark_read(created.id, &user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotFound));
        assert!(alice_rx.try_recv().is_err());

        let history = fixture.service.list_history(&user("alice"), "bob").await.unwrap();
        assert_eq!(history[0].read_at, read.read_at);
    }

    #[tokio::test]
    async fn mark_read_by_wrong_reader_or_unknown_id_is_not_found() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let created = fixture.send("alice", "bob", "hello").await;

        let wrong_reader = fixture.service.mark_read(created.id, &user("alice")).await;
        assert!(matches!(wrong_reader, Err(ApplicationError::NotFound)));

        let unknown = fixture
            .service
            .mark_read(MessageId::from(Uuid::new_v4()), &user("bob"))
            .await;
        assert!(matches!(unknown, Err(ApplicationError::NotFound)));
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        for i in 0..(HISTORY_LIMIT + 5) {
            fixture.send("alice", "bob", &format!("m{i}")).await;
        }

        let history = fixture.service.list_history(&user("bob"), "alice").await.unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT as usize);
        assert_eq!(history[0].content, format!("m{}", HISTORY_LIMIT + 4));
    }

    #[tokio::test]
    async fn conversation_tie_break_prefers_latest_insert() {
        let fixture = Fixture::new(Arc::new(FixedClock(chrono::Utc::now())));
        fixture.send("alice", "bob", "first").await;
        fixture.send("bob", "alice", "second").await;

        let conversations = fixture
            .service
            .list_conversations(&user("alice"))
            .await
            .unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].last_message.content, "second");
    }

    #[tokio::test]
    async fn unknown_profiles_resolve_to_bare_ids() {
        let fixture = Fixture::new(Arc::new(SystemClock));
        let created = fixture.send("alice", "carol", "hi carol").await;

        assert_eq!(created.receiver.id, user("carol"));
        assert_eq!(created.receiver.username, None);
        assert_eq!(created.receiver.avatar, None);
    }
}
