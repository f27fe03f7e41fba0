use async_trait::async_trait;
use url::Url;

use super::{authorized, check_status};
use crate::error::{ChatError, ChatResult};
use crate::network::ObjectStore;

/// One bucket of Supabase Storage.
pub struct SupabaseStorage {
    http: reqwest::Client,
    base: Url,
    bucket: String,
    anon_key: String,
}

impl SupabaseStorage {
    pub fn new(http: reqwest::Client, base: &Url, bucket: &str, anon_key: &str) -> Self {
        Self {
            http,
            base: base.clone(),
            bucket: bucket.to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// `storage/v1/object[/public]/{bucket}/{path}`, each segment percent-encoded.
    fn object_url(&self, public: bool, path: &str) -> ChatResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ChatError::Config(format!("{} cannot hold a path", self.base)))?;
            segments.pop_if_empty().extend(["storage", "v1", "object"]);
            if public {
                segments.push("public");
            }
            segments.push(&self.bucket);
            segments.extend(path.split('/'));
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> ChatResult<()> {
        let url = self.object_url(false, path)?;
        let request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);

        let response = authorized(request, &self.anon_key)
            .send()
            .await
            .map_err(|err| ChatError::UploadFailed(err.to_string()))?;
        check_status(response)
            .await
            .map(|_| ())
            .map_err(ChatError::UploadFailed)
    }

    fn public_url(&self, path: &str) -> ChatResult<String> {
        self.object_url(true, path).map(String::from)
    }
}
