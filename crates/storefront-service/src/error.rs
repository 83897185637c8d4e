use serde_json::Value;
use storefront_cache::ComputationCanceled;
use thiserror::Error;

/// An error that happens when fetching catalog data from the CMS.
///
/// Errors are shared between all callers that were waiting on the same request, which is
/// why this type is [`Clone`] and only carries rendered messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The query was rejected before sending it, e.g. because of an empty slug.
    #[error("invalid query: {0}")]
    InvalidQuery(&'static str),
    /// The CMS responded with a non-success status code.
    ///
    /// The message is taken from the CMS error body, if it has one.
    #[error("request failed with status {status}{}", fmt_message(.message))]
    Status { status: u16, message: Option<String> },
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(String),
    /// The response body was not valid JSON.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The request was abandoned without a response, e.g. because it panicked.
    #[error("request was canceled")]
    Canceled,
}

fn fmt_message(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

impl ApiError {
    /// A short name for the kind of error, used to tag metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidQuery(_) => "invalid_query",
            ApiError::Status { .. } => "status",
            ApiError::Timeout => "timeout",
            ApiError::Request(_) => "request",
            ApiError::Malformed(_) => "malformed",
            ApiError::Canceled => "canceled",
        }
    }

    /// Builds a [`Status`](Self::Status) error from a status code and the response body.
    ///
    /// Strapi nests the message as `error.message`, other servers put it at the top level.
    pub(crate) fn from_status(status: u16, body: Option<&Value>) -> Self {
        let message = body
            .and_then(|body| {
                body.pointer("/error/message")
                    .or_else(|| body.get("message"))
            })
            .and_then(Value::as_str)
            .map(String::from);
        ApiError::Status { status, message }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Request(err.to_string())
        }
    }
}

impl From<ComputationCanceled> for ApiError {
    fn from(_: ComputationCanceled) -> Self {
        ApiError::Canceled
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_status_message() {
        let body = json!({"data": null, "error": {"status": 404, "message": "Not Found"}});
        let err = ApiError::from_status(404, Some(&body));
        assert_eq!(err.to_string(), "request failed with status 404: Not Found");

        let body = json!({"message": "Forbidden"});
        let err = ApiError::from_status(403, Some(&body));
        assert_eq!(
            err,
            ApiError::Status {
                status: 403,
                message: Some("Forbidden".into())
            }
        );

        let err = ApiError::from_status(502, None);
        assert_eq!(err.to_string(), "request failed with status 502");
        assert_eq!(err.kind(), "status");
    }
}
