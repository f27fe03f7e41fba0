use std::sync::Arc;

use async_trait::async_trait;

use super::transport::RealtimeTransport;
use crate::common::{MessageRow, NewMessageRow};
use crate::error::ChatResult;

/// Row storage for the `messages` table.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every persisted row, ascending by `created_at`.
    async fn read_all(&self) -> ChatResult<Vec<MessageRow>>;

    /// Inserts a row and returns it with the server-assigned `id` and `created_at`.
    async fn insert(&self, row: NewMessageRow) -> ChatResult<MessageRow>;
}

/// Blob storage for attachments.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ChatResult<()>;

    /// Publicly fetchable reference for an object stored at `path`.
    fn public_url(&self, path: &str) -> ChatResult<String>;
}

pub type RealtimeFactory = Arc<dyn Fn() -> Box<dyn RealtimeTransport> + Send + Sync>;

/// The three external collaborators a session talks to.
#[derive(Clone)]
pub struct Backend {
    pub messages: Arc<dyn MessageStore>,
    pub objects: Arc<dyn ObjectStore>,
    realtime: RealtimeFactory,
}

impl Backend {
    pub fn new<F>(messages: Arc<dyn MessageStore>, objects: Arc<dyn ObjectStore>, realtime: F) -> Self
    where
        F: Fn() -> Box<dyn RealtimeTransport> + Send + Sync + 'static,
    {
        Self {
            messages,
            objects,
            realtime: Arc::new(realtime),
        }
    }

    /// A fresh transport for one login cycle.
    pub fn realtime(&self) -> Box<dyn RealtimeTransport> {
        (self.realtime)()
    }
}
