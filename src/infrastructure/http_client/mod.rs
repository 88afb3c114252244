//! Blocking HTTP adapters for the hosted collaborators: the chat-completion API, the
//! embeddings API and the hosted vector index.
//!
//! Every adapter owns a `ureq::Agent` with a bounded timeout, so a stalled service
//! surfaces as an error at the stage boundary instead of hanging the request.

mod chat_client;
mod embeddings;
mod hosted_store;

pub use chat_client::ChatCompletionClient;
pub use embeddings::RemoteEmbeddingEngine;
pub use hosted_store::HostedVectorStore;

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

pub(crate) fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Error body shapes returned by OpenAI-compatible and Pinecone-style APIs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorDetail },
    Flat { message: String },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Renders a ureq failure as a readable message, including the API's own error text
/// when the body carries one. Timeouts keep the transport wording ("timed out").
pub(crate) fn describe_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
                .map(|body| match body {
                    ErrorBody::Nested { error } => error.message,
                    ErrorBody::Flat { message } => message,
                });
            match detail {
                Some(detail) => format!("HTTP {code}: {detail}"),
                None => format!("HTTP error: {code}"),
            }
        }
        ureq::Error::Transport(transport) => {
            debug!(target: "brightsteps::http", kind = ?transport.kind(), "transport failure");
            format!("transport error: {transport}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(join_url("http://idx", "query"), "http://idx/query");
    }

    #[test]
    fn error_bodies_of_both_shapes_parse() {
        let nested: ErrorBody =
            serde_json::from_str(r#"{"error":{"message":"quota exceeded","type":"x"}}"#).unwrap();
        assert!(matches!(nested, ErrorBody::Nested { error } if error.message == "quota exceeded"));

        let flat: ErrorBody = serde_json::from_str(r#"{"code":3,"message":"bad vector"}"#).unwrap();
        assert!(matches!(flat, ErrorBody::Flat { message } if message == "bad vector"));
    }
}
