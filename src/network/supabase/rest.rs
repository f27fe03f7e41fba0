use async_trait::async_trait;
use url::Url;

use super::{authorized, check_status};
use crate::common::{MessageRow, NewMessageRow};
use crate::error::{ChatError, ChatResult};
use crate::network::MessageStore;

/// The `messages` table through PostgREST.
pub struct SupabaseMessages {
    http: reqwest::Client,
    endpoint: Url,
    anon_key: String,
}

impl SupabaseMessages {
    pub fn new(http: reqwest::Client, base: &Url, table: &str, anon_key: &str) -> ChatResult<Self> {
        let endpoint = base
            .join(&format!("rest/v1/{table}"))
            .map_err(|err| ChatError::Config(format!("invalid table endpoint: {err}")))?;
        Ok(Self {
            http,
            endpoint,
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl MessageStore for SupabaseMessages {
    async fn read_all(&self) -> ChatResult<Vec<MessageRow>> {
        let request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("select", "*"), ("order", "created_at.asc")]);

        let response = authorized(request, &self.anon_key)
            .send()
            .await
            .map_err(|err| ChatError::FetchFailed(err.to_string()))?;
        let response = check_status(response).await.map_err(ChatError::FetchFailed)?;

        response
            .json::<Vec<MessageRow>>()
            .await
            .map_err(|err| ChatError::FetchFailed(format!("unexpected history payload: {err}")))
    }

    async fn insert(&self, row: NewMessageRow) -> ChatResult<MessageRow> {
        let request = self
            .http
            .post(self.endpoint.clone())
            .header("Prefer", "return=representation")
            .json(&[row]);

        let response = authorized(request, &self.anon_key)
            .send()
            .await
            .map_err(|err| ChatError::SendFailed(err.to_string()))?;
        let response = check_status(response).await.map_err(ChatError::SendFailed)?;

        let rows = response
            .json::<Vec<MessageRow>>()
            .await
            .map_err(|err| ChatError::SendFailed(format!("unexpected insert payload: {err}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ChatError::SendFailed("insert returned no row".into()))
    }
}
