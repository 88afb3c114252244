//! OpenAI-compatible chat-completion client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::services::{CompletionRequest, CompletionService};
use crate::domain::DomainError;

use super::{build_agent, describe_http_error, join_url};

pub struct ChatCompletionClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionClient {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            endpoint: join_url(base_url, "chat/completions"),
            model: model.into(),
            api_key,
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

fn first_choice(response: ChatResponse) -> Result<String, DomainError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| DomainError::other("completion response contained no message"))
}

impl CompletionService for ChatCompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, DomainError> {
        let mut call = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }

        debug!(
            target: "brightsteps::llm",
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "sending chat completion"
        );

        let response: ChatResponse = call
            .send_json(self.body(request))
            .map_err(|err| DomainError::other(describe_http_error(err)))?
            .into_json()
            .map_err(|err| DomainError::other(format!("invalid completion response: {err}")))?;

        first_choice(response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatCompletionClient {
        ChatCompletionClient::new(
            "https://api.openai.com/v1/",
            "gpt-3.5-turbo",
            None,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn body_carries_system_and_user_messages() {
        let client = client();
        let request = CompletionRequest {
            system: Some("Answer only from context.".into()),
            prompt: "Question: when?".into(),
            temperature: 0.7,
            max_tokens: 500,
        };

        let body = serde_json::to_value(client.body(&request)).unwrap();

        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Question: when?");
    }

    #[test]
    fn prompt_without_system_sends_one_message() {
        let client = client();
        let request = CompletionRequest {
            system: None,
            prompt: "p".into(),
            temperature: 0.0,
            max_tokens: 10,
        };
        let body = serde_json::to_value(client.body(&request)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn first_choice_is_returned() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Walks at 12-15 months."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "Walks at 12-15 months.");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(first_choice(response).is_err());
    }
}
