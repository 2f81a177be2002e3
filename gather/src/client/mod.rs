//! HTTP clients for the Azure data and management planes.

pub mod logs;
pub mod management;

pub use logs::LogAnalyticsClient;
pub use management::{ManagementClient, MANAGEMENT_API_VERSION};

use serde::Deserialize;
use std::time::Duration;

/// Default Log Analytics data-plane endpoint.
pub const DEFAULT_LOGS_ENDPOINT: &str = "https://api.loganalytics.io";

/// Default Azure Resource Manager endpoint.
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Request timeout for management-plane calls.
pub const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Azure error envelope: `{"error": {"code", "message", "innererror": {...}}}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "innerError")]
    pub innererror: Option<Box<ErrorDetail>>,
}

impl ErrorDetail {
    /// Every code of the chain, outermost first, joined with `/`.
    pub fn code_chain(&self) -> String {
        self.chain()
            .map(|d| d.code.as_str())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The outermost message followed by the innermost one when they differ.
    pub fn full_message(&self) -> String {
        let innermost = self
            .chain()
            .filter(|d| !d.message.is_empty())
            .last()
            .map_or("", |d| d.message.as_str());
        if innermost.is_empty() || innermost == self.message {
            self.message.clone()
        } else if self.message.is_empty() {
            innermost.to_string()
        } else {
            format!("{}: {innermost}", self.message)
        }
    }

    fn chain(&self) -> impl Iterator<Item = &ErrorDetail> {
        std::iter::successors(Some(self), |d| d.innererror.as_deref())
    }
}

/// Decodes an error body, falling back to the raw text.
pub(crate) fn decode_error(body: &str) -> ErrorDetail {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_else(|| ErrorDetail {
            message: body.trim().to_string(),
            ..ErrorDetail::default()
        })
}

pub(crate) fn trim_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_nested_error() {
        let body = r#"{"error":{"message":"The request had some invalid properties","code":"BadArgumentError","innererror":{"code":"SyntaxError","message":"A recognition error occurred in the query.","innererror":{"code":"SYN0002","message":"Query could not be parsed at 'x'"}}}}"#;
        let detail = decode_error(body);

        assert_eq!(detail.code_chain(), "BadArgumentError/SyntaxError/SYN0002");
        assert_eq!(
            detail.full_message(),
            "The request had some invalid properties: Query could not be parsed at 'x'"
        );
    }

    #[test]
    fn test_decode_non_json_body() {
        let detail = decode_error("  upstream timeout \n");
        assert_eq!(detail.code_chain(), "");
        assert_eq!(detail.full_message(), "upstream timeout");
    }

    #[test]
    fn test_trim_endpoint() {
        assert_eq!(trim_endpoint(" https://x.io/ "), "https://x.io");
    }
}
