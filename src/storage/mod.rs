pub mod message_db;
pub mod objects;

pub use message_db::SqliteMessageStore;
pub use objects::LocalObjectStore;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::LocalConfig;
use crate::error::{ChatError, ChatResult};
use crate::network::{Backend, LocalRelay};

/// Ensure the parent directory of `path` exists
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// SQLite + uploads directory + in-process relay. Only sessions inside this
/// process see each other's presence.
pub fn local_backend(config: &LocalConfig) -> ChatResult<Backend> {
    ensure_parent_dir(&config.database_path)
        .map_err(|err| ChatError::Config(format!("cannot create data dir: {err}")))?;

    let relay = LocalRelay::new();
    let messages = SqliteMessageStore::with_path(&config.database_path, relay.clone())
        .map_err(|err| ChatError::Config(format!("cannot open {}: {err}", config.database_path.display())))?;
    let objects = LocalObjectStore::new(&config.uploads_dir)?;

    log::info!(
        "Using local backend at {} (uploads in {})",
        config.database_path.display(),
        config.uploads_dir.display()
    );
    Ok(Backend::new(Arc::new(messages), Arc::new(objects), move || {
        relay.boxed_transport()
    }))
}

/// Like [`local_backend`] but with an in-memory database.
pub fn in_memory_backend(uploads_dir: &Path) -> ChatResult<Backend> {
    let relay = LocalRelay::new();
    let messages = SqliteMessageStore::in_memory(relay.clone())
        .map_err(|err| ChatError::Config(err.to_string()))?;
    let objects = LocalObjectStore::new(uploads_dir)?;

    Ok(Backend::new(Arc::new(messages), Arc::new(objects), move || {
        relay.boxed_transport()
    }))
}
