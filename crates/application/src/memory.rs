//! 内存版存储实现，用于测试与本地开发

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use domain::{
    latest_per_counterpart, MessageId, MessageRecord, NewMessage, RepositoryError, Timestamp,
    UserId, UserProfile,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::clock::Clock;
use crate::repository::{MessageStore, UserDirectory};

#[derive(Default)]
struct StoreState {
    records: Vec<MessageRecord>,
    next_sequence: i64,
}

pub struct InMemoryMessageStore {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewMessage) -> Result<MessageRecord, RepositoryError> {
        let mut state = self.state.lock().await;
        state.next_sequence += 1;
        let record = MessageRecord::from_new(
            MessageId::from(Uuid::new_v4()),
            message,
            self.clock.now(),
            state.next_sequence,
        );
        state.records.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<MessageRecord>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_between(
        &self,
        user_id: &UserId,
        counterpart_id: &UserId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let state = self.state.lock().await;
        let mut records: Vec<MessageRecord> = state
            .records
            .iter()
            .filter(|r| {
                (&r.sender_id == user_id && &r.receiver_id == counterpart_id)
                    || (&r.sender_id == counterpart_id && &r.receiver_id == user_id)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.created_at, b.sequence).cmp(&(a.created_at, a.sequence)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn mark_read(
        &self,
        id: MessageId,
        reader_id: &UserId,
        at: Timestamp,
    ) -> Result<Option<MessageRecord>, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(record) = state
            .records
            .iter_mut()
            .find(|r| r.id == id && &r.receiver_id == reader_id)
        else {
            return Ok(None);
        };

        if record.mark_read(at).is_err() {
            return Ok(None);
        }
        Ok(Some(record.clone()))
    }

    async fn latest_per_counterpart(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(latest_per_counterpart(user_id, state.records.iter().cloned()))
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserProfile) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>, RepositoryError> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }
}
