pub mod backend;
pub mod client;
pub mod relay;
pub mod supabase;
pub mod transport;

pub use backend::{Backend, MessageStore, ObjectStore, RealtimeFactory};
pub use client::ChatClient;
pub use relay::{LocalRelay, LocalTransport};
pub use transport::RealtimeTransport;

use crate::config::{AppConfig, BackendKind};
use crate::error::ChatResult;

/// Builds the backend selected by `config.backend`.
pub fn connect(config: &AppConfig) -> ChatResult<Backend> {
    match config.backend {
        BackendKind::Supabase => supabase::backend(&config.supabase),
        BackendKind::Local => crate::storage::local_backend(&config.local),
    }
}
