//! Answer Composer: grounds a generation on filtered candidates.
//!
//! No candidates means no model call. Empty model output keeps the sources
//! so the caller can see what grounding was attempted; a failed model call
//! (including a timeout or a closed pool) drops them.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::GenerationConfig;
use crate::error::RagError;
use crate::llm::generate::{sanitize_for_prompt, GenerationParams, Generator};
use crate::models::{Answer, CandidateResult, Category};

pub const NO_RELEVANT_INFO: &str = "Sorry, no relevant information was found.";
pub const GENERATION_FAILED: &str = "Sorry, an appropriate answer could not be generated.";
pub const GENERATION_ERROR: &str = "An error occurred while generating the answer.";

const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

/// Instruction framing for the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    General,
    Code,
}

impl From<Category> for PromptTemplate {
    fn from(category: Category) -> Self {
        match category {
            Category::General => PromptTemplate::General,
            Category::Code => PromptTemplate::Code,
        }
    }
}

pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    config: GenerationConfig,
    /// Generation worker pool
    pool: Arc<Semaphore>,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>, config: GenerationConfig) -> Self {
        let permits = config.max_concurrent.max(1);
        Self {
            generator,
            config,
            pool: Arc::new(Semaphore::new(permits)),
        }
    }

    pub async fn compose(
        &self,
        query: &str,
        candidates: Vec<CandidateResult>,
        template: PromptTemplate,
        model: Option<String>,
    ) -> Answer {
        if candidates.is_empty() {
            return Answer {
                answer: NO_RELEVANT_INFO.to_string(),
                sources: Vec::new(),
            };
        }

        let context = build_context_block(&candidates);
        let prompt = build_prompt(template, &context, &sanitize_for_prompt(query));
        let params = GenerationParams {
            model,
            max_length: self.config.max_length,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        match self.generate(&prompt, &params).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(
                    "Model returned no text for query ({} chars, {} sources)",
                    query.len(),
                    candidates.len()
                );
                Answer {
                    answer: GENERATION_FAILED.to_string(),
                    sources: candidates,
                }
            }
            Ok(text) => Answer {
                answer: text.trim().to_string(),
                sources: candidates,
            },
            Err(e) => {
                tracing::error!("No answer for query ({} chars): {e}", query.len());
                Answer {
                    answer: GENERATION_ERROR.to_string(),
                    sources: Vec::new(),
                }
            }
        }
    }

    /// Run one generation inside the pool, bounded by the configured timeout.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, RagError> {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| RagError::Generation("generation pool is shut down".into()))?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(timeout, self.generator.generate(prompt, params)).await {
            Ok(result) => result.map_err(|e| RagError::Generation(format!("{e:#}"))),
            Err(_) => Err(RagError::Generation(format!(
                "timed out after {}s",
                self.config.timeout_secs
            ))),
        }
    }

    /// Stop accepting generations. Calls already holding a slot run to completion.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Concatenate candidate contents in ranked order, each tagged with its source.
pub fn build_context_block(candidates: &[CandidateResult]) -> String {
    let mut ctx = String::new();
    for (i, c) in candidates.iter().enumerate() {
        if i > 0 {
            ctx.push_str(SOURCE_SEPARATOR);
        }
        let _ = write!(
            ctx,
            "[Source {}: {} ({})]\n{}",
            i + 1,
            sanitize_for_prompt(&c.metadata.title),
            c.metadata.source_url,
            sanitize_for_prompt(&c.content)
        );
    }
    ctx
}

pub fn build_prompt(template: PromptTemplate, context: &str, query: &str) -> String {
    match template {
        PromptTemplate::General => format!(
            "Answer the question using only the reference information below.\n\
             If the information does not contain the answer, say so.\n\n\
             Reference information:\n{context}\n\n\
             Question: {query}\n\n\
             Answer:"
        ),
        PromptTemplate::Code => format!(
            "You are a programming assistant. Answer the question using only the \
             documentation and code below.\n\
             Show code in markdown code blocks with language tags.\n\
             If the material does not cover the question, say what is missing.\n\n\
             Reference material:\n{context}\n\n\
             Question: {query}\n\n\
             Answer:"
        ),
    }
}
