//! HTTP client wrapper for talking to the authority registries.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;

use crate::config::HarvestConfig;
use crate::error::{HarvesterError, Result};

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("authority-harvester/", env!("CARGO_PKG_VERSION"));

/// Something that can GET a URL.
///
/// Adapters only depend on this, so tests can drive them from fixtures.
pub trait Transport {
    /// Fetch `url`, sending `accept` as the Accept header.
    fn get(&self, url: &str, accept: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP transport with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpTransport {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config.http_timeout)?,
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, accept: &str) -> Result<Vec<u8>> {
        download_bytes(&self.client, url, accept, self.max_retries, self.base_delay)
    }
}

/// Create a configured HTTP client.
///
/// # Returns
/// A `reqwest::blocking::Client` configured with timeout and user agent.
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Exponential backoff: `base`, `2 * base`, `4 * base`, ...
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}

/// Download content from a URL with retry logic.
///
/// Uses exponential backoff for transient failures (network errors, 5xx responses).
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `url` - URL to download from
/// * `accept` - Accept header value
/// * `max_retries` - Hard ceiling on attempts
/// * `base_delay` - Delay before the second attempt
///
/// # Returns
/// Raw bytes of the response body
pub fn download_bytes(
    client: &Client,
    url: &str,
    accept: &str,
    max_retries: u32,
    base_delay: Duration,
) -> Result<Vec<u8>> {
    let mut last_error: Option<String> = None;

    for attempt in 0..max_retries {
        if attempt > 0 {
            let delay = backoff_delay(base_delay, attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
            thread::sleep(delay);
        }

        match client.get(url).header(ACCEPT, accept).send() {
            Ok(response) => {
                let status = response.status();

                // Retry on server errors (5xx)
                if status.is_server_error() {
                    tracing::warn!(
                        %url,
                        status = %status,
                        attempt = attempt + 1,
                        max_retries,
                        "Server error, will retry"
                    );
                    last_error = Some(format!("Server error: {status}"));
                    continue;
                }

                // Don't retry client errors (4xx) - they won't succeed
                if status.is_client_error() {
                    return Err(HarvesterError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                let response = response.error_for_status()?;
                let bytes = response.bytes()?;
                return Ok(bytes.to_vec());
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        %url,
                        error = %e,
                        attempt = attempt + 1,
                        max_retries,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                    continue;
                }
                return Err(HarvesterError::Http(e));
            }
        }
    }

    Err(HarvesterError::RetriesExhausted {
        attempts: max_retries,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Convert response bytes to a string, replacing invalid UTF-8.
pub fn bytes_to_string(bytes: &[u8], what: &str) -> String {
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => s,
        Err(_) => {
            tracing::warn!(what, "Response is not valid UTF-8, replacing invalid sequences");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client() {
        let client = create_client(Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
    }

    #[test]
    fn test_bytes_to_string_lossy() {
        assert_eq!(bytes_to_string(b"abc", "test"), "abc");
        assert_eq!(bytes_to_string(&[0x61, 0xff], "test"), "a\u{fffd}");
    }
}
