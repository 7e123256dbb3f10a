//! HTTP plumbing shared by the REST-backed adapters.

use std::time::Duration;

use super::SourceError;

const USER_AGENT: &str = concat!("georisk/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| SourceError::NotConfigured(format!("HTTP client: {}", e)))
}

/// Map a transport error. The URL is stripped since query strings may carry
/// API keys.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(timeout)
    } else {
        SourceError::Unavailable(err.without_url().to_string())
    }
}

/// Classify an HTTP status.
pub(crate) fn classify_status(status: u16, retry_after: Option<Duration>) -> Result<(), SourceError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(SourceError::Auth),
        429 => Err(SourceError::RateLimited { retry_after }),
        500..=599 => Err(SourceError::Unavailable(format!("HTTP {}", status))),
        _ => Err(SourceError::Rejected(format!("HTTP {}", status))),
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send a request and decode a JSON body, mapping every failure to a
/// [`SourceError`].
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    classify_status(response.status().as_u16(), retry_after(&response))?;

    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::InvalidResponse(e.without_url().to_string()))
}

#[cfg(feature = "market-data")]
/// Like [`send_json`], but a 404 means "nothing to report" and yields `None`.
pub(crate) async fn send_json_or_missing<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Option<T>, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(e, timeout))?;

    if response.status().as_u16() == 404 {
        return Ok(None);
    }
    classify_status(response.status().as_u16(), retry_after(&response))?;

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| SourceError::InvalidResponse(e.without_url().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(200, None).is_ok());
        assert_eq!(classify_status(401, None), Err(SourceError::Auth));
        assert_eq!(classify_status(403, None), Err(SourceError::Auth));
        assert_eq!(
            classify_status(429, Some(Duration::from_secs(3))),
            Err(SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            })
        );
        assert!(classify_status(503, None).unwrap_err().is_transient());
        assert!(!classify_status(404, None).unwrap_err().is_transient());
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }
}
