use std::sync::Arc;

use tracing::debug;

use crate::domain::{AnswerMode, DomainError};

use super::{CompletionRequest, CompletionService};

pub const REFUSAL_SENTENCE: &str = "I cannot answer this based on the available information.";

pub const STRICT_INSTRUCTION: &str = "Answer using ONLY the information in the provided context. \
     Do not make up information and do not use outside knowledge.";

pub const AUGMENTED_INSTRUCTION: &str = "Prefer the information in the provided context. \
     You may supplement it with general knowledge when the context is insufficient.";

const ASSISTANT_ROLE: &str = "You are a helpful assistant for parents and caregivers following a \
     child's development. Be accurate and concise.";

/// Turns the assembled context and the original question into the final answer.
pub struct AnswerSynthesizer {
    llm: Arc<dyn CompletionService>,
    temperature: f32,
    max_tokens: u32,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self {
            llm,
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// In strict mode an empty context is answered with [`REFUSAL_SENTENCE`] without
    /// calling the model.
    pub fn synthesize(
        &self,
        question: &str,
        context_text: &str,
        mode: AnswerMode,
    ) -> Result<String, DomainError> {
        if mode == AnswerMode::Strict && context_text.trim().is_empty() {
            debug!(target: "brightsteps::synthesizer", "empty context, refusing");
            return Ok(REFUSAL_SENTENCE.to_string());
        }

        let request = self.build_request(question, context_text, mode);
        let answer = self
            .llm
            .complete(&request)
            .map_err(|err| match err {
                DomainError::Synthesis(_) => err,
                other => DomainError::synthesis(other.to_string()),
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(DomainError::synthesis("model returned an empty answer"));
        }
        Ok(answer.to_string())
    }

    pub fn build_request(
        &self,
        question: &str,
        context_text: &str,
        mode: AnswerMode,
    ) -> CompletionRequest {
        CompletionRequest {
            system: Some(system_instruction(mode)),
            prompt: user_prompt(question, context_text, mode),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn system_instruction(mode: AnswerMode) -> String {
    match mode {
        AnswerMode::Strict => format!(
            "{ASSISTANT_ROLE} {STRICT_INSTRUCTION} If the context does not contain enough \
             information, respond exactly with: \"{REFUSAL_SENTENCE}\""
        ),
        AnswerMode::Augmented => format!(
            "{ASSISTANT_ROLE} {AUGMENTED_INSTRUCTION} Clearly mark which parts of your answer \
             come from which source and which parts come from general knowledge."
        ),
    }
}

fn user_prompt(question: &str, context_text: &str, mode: AnswerMode) -> String {
    let context = if context_text.trim().is_empty() {
        "No relevant context was found in the knowledge base."
    } else {
        context_text
    };

    let closing = match mode {
        AnswerMode::Strict => format!(
            "If the answer cannot be found in the context, say \"{REFUSAL_SENTENCE}\""
        ),
        AnswerMode::Augmented => {
            "Cite the source of each point taken from the context and label anything else as \
             general knowledge."
                .to_string()
        }
    };

    format!(
        "Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer the question in a clear and concise manner. If you find multiple relevant \
         pieces of information in the context, synthesize them into a coherent response. \
         {closing}"
    )
}
