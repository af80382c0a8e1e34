use std::time::Duration;
use tracing::warn;

use super::client::Transport;
use crate::error::{IngestError, Result};

/// Bounded exponential backoff for upstream requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// No sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Terminal,
}

pub fn classify(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::Retryable,
        400..=499 => StatusClass::Terminal,
        _ => StatusClass::Retryable,
    }
}

/// GET `url`, retrying transport failures, 5xx and 429 with backoff.
/// Returns the body of the first successful response.
pub fn get_with_retry<T: Transport>(
    transport: &T,
    policy: &RetryPolicy,
    url: &str,
) -> Result<String> {
    let attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        match transport.get(url) {
            Ok(reply) => match classify(reply.status) {
                StatusClass::Success => return Ok(reply.body),
                StatusClass::Terminal => {
                    return Err(IngestError::UpstreamUnavailable {
                        url: url.to_string(),
                        reason: format!("HTTP {} (not retried)", reply.status),
                    })
                }
                StatusClass::Retryable => last_reason = format!("HTTP {}", reply.status),
            },
            Err(e) => last_reason = e.to_string(),
        }

        if attempt < attempts {
            let delay = policy.backoff(attempt);
            warn!(
                url,
                attempt,
                reason = %last_reason,
                delay_ms = delay.as_millis() as u64,
                "upstream request failed, retrying"
            );
            std::thread::sleep(delay);
        }
    }

    Err(IngestError::UpstreamUnavailable {
        url: url.to_string(),
        reason: format!("{} after {} attempts", last_reason, attempts),
    })
}
