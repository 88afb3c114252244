use std::sync::Arc;

use tracing::debug;

use crate::domain::DomainError;

use super::{CompletionRequest, CompletionService};

pub const DEFAULT_VARIANT_COUNT: usize = 3;

/// Turns one question into the original plus LLM-generated paraphrases.
pub struct QueryExpander {
    llm: Arc<dyn CompletionService>,
    variant_count: usize,
    temperature: f32,
    max_tokens: u32,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn CompletionService>, variant_count: usize) -> Self {
        Self {
            llm,
            variant_count: variant_count.max(1),
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Returns `[query, paraphrase..]`. Paraphrases equal to the query are kept.
    pub fn expand(&self, query: &str) -> Result<Vec<String>, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("query cannot be empty"));
        }

        let request = CompletionRequest {
            system: None,
            prompt: expansion_prompt(query, self.variant_count),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let raw = self
            .llm
            .complete(&request)
            .map_err(|err| DomainError::expansion(err.to_string()))?;

        let paraphrases = parse_variants(&raw, self.variant_count)?;
        debug!(
            target: "brightsteps::expander",
            generated = paraphrases.len(),
            "query expanded"
        );

        let mut variants = Vec::with_capacity(paraphrases.len() + 1);
        variants.push(query.to_string());
        variants.extend(paraphrases);
        Ok(variants)
    }
}

pub fn expansion_prompt(query: &str, count: usize) -> String {
    format!(
        "Generate {count} different versions of the following question that mean the same thing.\n\
         Format them as a comma-separated list.\n\n\
         Question: {query}\n\n\
         Different versions:"
    )
}

/// Parses the comma-separated paraphrase list, keeping at most `max` non-empty entries.
pub fn parse_variants(raw: &str, max: usize) -> Result<Vec<String>, DomainError> {
    let variants: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .take(max)
        .map(str::to_string)
        .collect();

    if variants.is_empty() {
        return Err(DomainError::expansion(
            "completion contained no usable paraphrases",
        ));
    }
    Ok(variants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::FakeLlm;

    #[test]
    fn original_query_comes_first() {
        let llm = Arc::new(FakeLlm::scripted([Ok(
            "When should my baby crawl? , At what age do babies crawl?,Is late crawling normal?"
                .to_string(),
        )]));
        let expander = QueryExpander::new(llm.clone(), DEFAULT_VARIANT_COUNT);

        let variants = expander.expand("When do babies crawl?").unwrap();

        assert_eq!(
            variants,
            vec![
                "When do babies crawl?",
                "When should my baby crawl?",
                "At what age do babies crawl?",
                "Is late crawling normal?",
            ]
        );
        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.contains("Generate 3 different versions"));
        assert!(prompt.contains("Question: When do babies crawl?"));
    }

    #[test]
    fn paraphrase_equal_to_original_is_retained() {
        let llm = Arc::new(FakeLlm::scripted([Ok("Why?, Why?".to_string())]));
        let variants = QueryExpander::new(llm, 3).expand("Why?").unwrap();
        assert_eq!(variants, vec!["Why?", "Why?", "Why?"]);
    }

    #[test]
    fn extra_paraphrases_are_truncated() {
        assert_eq!(parse_variants("a, b, c, d, e", 3).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_completion_is_an_expansion_error() {
        assert!(matches!(
            parse_variants(" ,  , ", 3),
            Err(DomainError::Expansion(_))
        ));
    }

    #[test]
    fn llm_failure_maps_to_expansion_error() {
        let llm = Arc::new(FakeLlm::scripted([Err(DomainError::other("rate limited"))]));
        let err = QueryExpander::new(llm, 3).expand("question").unwrap_err();
        assert!(matches!(err, DomainError::Expansion(msg) if msg.contains("rate limited")));
    }
}
