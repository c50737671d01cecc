//! Dispatcher — posts a rendered activity to the messaging API and
//! classifies the result into a delivery outcome.
//!
//! Retry here is transport-level only: a bounded number of attempts within
//! one invocation, pausing on rate limits and transient failures. Outer
//! retry belongs to the queue (throttle re-enqueue, crash redelivery),
//! never to this call. The dispatcher has no side effects beyond the
//! network call; it never touches the status store.

use std::time::Duration;

use reqwest::header::{HeaderValue, RETRY_AFTER};

use herald_common::error::DeliveryError;
use herald_common::types::{DeliveryOutcome, MessagePayload, status_code};

/// Pause between attempts when the API gives no Retry-After hint.
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Error text is stored in a status row; cap it so a giant HTML error page
/// doesn't become a column value.
const MAX_ERROR_TEXT: usize = 512;

/// How a single transport response should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Success,
    Throttle,
    Transient,
    Fatal,
}

fn classify(status: u16) -> Disposition {
    match status {
        200..=299 => Disposition::Success,
        429 => Disposition::Throttle,
        500..=599 => Disposition::Transient,
        _ => Disposition::Fatal,
    }
}

/// Seconds to wait before the next attempt, honoring Retry-After when the
/// transport sends one.
fn retry_pause(retry_after: Option<&HeaderValue>) -> Duration {
    retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_PAUSE)
}

fn truncate_error(text: String) -> String {
    if text.len() <= MAX_ERROR_TEXT {
        return text;
    }
    let mut end = MAX_ERROR_TEXT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// HTTP client for the messaging API.
pub struct Dispatcher {
    http: reqwest::Client,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(max_attempts: u32, timeout_seconds: u64) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Post `payload` into the conversation and classify the result.
    ///
    /// - 2xx → `Succeeded` with the transport-assigned activity id
    /// - 429 after the last attempt → `Throttled`, counting every rate
    ///   limit observed in this invocation
    /// - anything else → `Failed` with the status and error text
    pub async fn send(
        &self,
        payload: &MessagePayload,
        service_url: &str,
        conversation_id: &str,
    ) -> DeliveryOutcome {
        let url = format!(
            "{}/v3/conversations/{}/activities",
            service_url.trim_end_matches('/'),
            conversation_id
        );

        let mut throttles = 0i32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.http.post(&url).json(&payload.activity).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match classify(status) {
                        Disposition::Success => {
                            let activity_id = response
                                .json::<serde_json::Value>()
                                .await
                                .ok()
                                .and_then(|v| {
                                    v.get("id").and_then(|id| id.as_str()).map(str::to_string)
                                })
                                .unwrap_or_default();

                            return DeliveryOutcome::Succeeded {
                                status_code: status_code::CREATED,
                                activity_id,
                            };
                        }
                        Disposition::Throttle => {
                            throttles += 1;
                            if attempt < self.max_attempts {
                                let pause = retry_pause(response.headers().get(RETRY_AFTER));
                                tracing::warn!(
                                    attempt,
                                    pause_secs = pause.as_secs(),
                                    "Send throttled by transport, retrying"
                                );
                                tokio::time::sleep(pause).await;
                                continue;
                            }
                            return DeliveryOutcome::Throttled {
                                status_code: status_code::TOO_MANY_REQUESTS,
                                throttle_count: throttles,
                            };
                        }
                        Disposition::Transient if attempt < self.max_attempts => {
                            tracing::warn!(status, attempt, "Transient send failure, retrying");
                            tokio::time::sleep(DEFAULT_RETRY_PAUSE).await;
                        }
                        Disposition::Transient | Disposition::Fatal => {
                            let body = response.text().await.unwrap_or_default();
                            return DeliveryOutcome::Failed {
                                status_code: status as i32,
                                error_message: truncate_error(body),
                            };
                        }
                    }
                }
                Err(e) if attempt < self.max_attempts && (e.is_connect() || e.is_timeout()) => {
                    tracing::warn!(error = %e, attempt, "Connection failure, retrying");
                    tokio::time::sleep(DEFAULT_RETRY_PAUSE).await;
                }
                Err(e) => {
                    let code = e.status().map(|s| s.as_u16() as i32).unwrap_or(500);
                    return DeliveryOutcome::Failed {
                        status_code: code,
                        error_message: truncate_error(e.to_string()),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success_range() {
        assert_eq!(classify(200), Disposition::Success);
        assert_eq!(classify(201), Disposition::Success);
        assert_eq!(classify(299), Disposition::Success);
    }

    #[test]
    fn test_classify_throttle() {
        assert_eq!(classify(429), Disposition::Throttle);
    }

    #[test]
    fn test_classify_server_errors_transient() {
        assert_eq!(classify(500), Disposition::Transient);
        assert_eq!(classify(503), Disposition::Transient);
    }

    #[test]
    fn test_classify_client_errors_fatal() {
        assert_eq!(classify(400), Disposition::Fatal);
        assert_eq!(classify(401), Disposition::Fatal);
        assert_eq!(classify(404), Disposition::Fatal);
    }

    #[test]
    fn test_retry_pause_honors_header() {
        let header = HeaderValue::from_static("7");
        assert_eq!(retry_pause(Some(&header)), Duration::from_secs(7));
    }

    #[test]
    fn test_retry_pause_defaults_on_missing_or_bad_header() {
        assert_eq!(retry_pause(None), DEFAULT_RETRY_PAUSE);
        let bad = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(retry_pause(Some(&bad)), DEFAULT_RETRY_PAUSE);
    }

    #[test]
    fn test_truncate_error_caps_length() {
        let long = "x".repeat(2000);
        assert_eq!(truncate_error(long).len(), MAX_ERROR_TEXT);
        assert_eq!(truncate_error("short".to_string()), "short");
    }
}
