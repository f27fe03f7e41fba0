//! Hosted backend: PostgREST table, Storage bucket and Realtime socket.

pub mod phoenix;
pub mod presence;
pub mod realtime;
pub mod rest;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use url::Url;

pub use realtime::{RealtimeConfig, SupabaseRealtime};
pub use rest::SupabaseMessages;
pub use storage::SupabaseStorage;

use crate::config::SupabaseConfig;
use crate::error::{ChatError, ChatResult};
use crate::network::Backend;

pub fn backend(config: &SupabaseConfig) -> ChatResult<Backend> {
    let base = base_url(&config.url)?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
        .build()
        .map_err(|err| ChatError::Config(format!("cannot build http client: {err}")))?;

    let messages = SupabaseMessages::new(
        http.clone(),
        &base,
        &config.messages_table,
        &config.anon_key,
    )?;
    let objects = SupabaseStorage::new(http, &base, &config.bucket, &config.anon_key);
    let realtime = RealtimeConfig::new(&base, config)?;

    log::info!("Using Supabase project at {base}");
    Ok(Backend::new(
        Arc::new(messages),
        Arc::new(objects),
        move || SupabaseRealtime::boxed(realtime.clone()),
    ))
}

/// Project URL with a trailing slash so relative joins append.
fn base_url(raw: &str) -> ChatResult<Url> {
    let mut url = Url::parse(raw.trim())
        .map_err(|err| ChatError::Config(format!("invalid SUPABASE_URL `{raw}`: {err}")))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn authorized(request: RequestBuilder, anon_key: &str) -> RequestBuilder {
    request.header("apikey", anon_key).bearer_auth(anon_key)
}

/// Passes 2xx responses through; otherwise the status and body as the error.
pub(crate) async fn check_status(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("{status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        assert_eq!(
            base_url("https://demo.supabase.co").unwrap().as_str(),
            "https://demo.supabase.co/"
        );
        assert_eq!(
            base_url("http://localhost:54321/proxy").unwrap().as_str(),
            "http://localhost:54321/proxy/"
        );
        assert!(matches!(base_url("not a url"), Err(ChatError::Config(_))));
    }

    #[test]
    fn backend_builds_from_config() {
        let config = SupabaseConfig {
            url: "https://demo.supabase.co".into(),
            anon_key: "anon".into(),
            ..SupabaseConfig::default()
        };
        assert!(backend(&config).is_ok());
    }
}
