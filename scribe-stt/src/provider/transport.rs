//! HTTP plumbing shared by the adapters: client construction, cancellation,
//! timeouts and error-body extraction.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;

/// Default per-request timeout applied by every adapter.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Per-adapter cancellation scope.
///
/// Every call clones the current token; [`CancelHandle::cancel`] fires it and
/// installs a fresh one so later calls are unaffected.
#[derive(Debug, Default)]
pub struct CancelHandle {
    token: Mutex<CancellationToken>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for a call that is about to start.
    pub fn token(&self) -> CancellationToken {
        match self.token.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Cancel every call holding the current token.
    pub fn cancel(&self) {
        let mut guard = match self.token.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.cancel();
        *guard = CancellationToken::new();
    }
}

/// Run a provider future under cancellation and a hard timeout.
pub(crate) async fn guarded<T, F>(
    provider: &str,
    timeout: Duration,
    token: &CancellationToken,
    fut: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(ProviderError::cancelled(provider)),
        outcome = tokio::time::timeout(timeout, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(provider, timeout.as_secs())),
        },
    }
}

/// Pass a success response through, or turn an error response into a
/// [`ProviderError`] carrying the backend's message.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body)
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)));
    Err(ProviderError::from_status(provider, status.as_u16(), message))
}

/// Pull a human message out of the common JSON error shapes:
/// `{"error": {"message": ..}}`, `{"error": ".."}`, `{"err_msg": ..}`, `{"message": ..}`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.get("error"),
        value.get("err_msg"),
        value.get("message"),
        value.get("reason"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .filter(|m| !m.trim().is_empty());
    message
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// MIME type for an audio extension.
pub(crate) fn mime_type(format: &str) -> &'static str {
    match format {
        "mp3" | "mpga" | "mpeg" => "audio/mpeg",
        "mp4" | "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "aac" => "audio/aac",
        "mp2" => "audio/mpeg",
        "pcm" => "audio/l16",
        _ => "application/octet-stream",
    }
}
