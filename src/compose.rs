//! Answer composition: prompt assembly and the single model call.

use std::fmt::Write as _;
use std::time::Instant;

use crate::error::Result;
use crate::llm::LanguageModel;
use crate::models::{Answer, RetrievalResult};

const INSTRUCTION: &str = "Answer the question based only on the provided context.";

/// Render the grounded prompt for `question`.
///
/// Every retrieved chunk appears inside `<context>`, in rank order, tagged
/// with its 1-based rank and source document.
pub fn build_prompt(question: &str, result: &RetrievalResult) -> String {
    let mut prompt = String::with_capacity(
        256 + question.len() + result.hits.iter().map(|h| h.chunk.text.len() + 64).sum::<usize>(),
    );
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n<context>\n");
    for (i, hit) in result.hits.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "[{}] (source: {})\n{}\n",
            i + 1,
            hit.chunk.source,
            hit.chunk.text.trim_end()
        );
    }
    prompt.push_str("</context>\n\nQuestion: ");
    prompt.push_str(question.trim());
    prompt.push('\n');
    prompt
}

/// Ask `model` to answer `question` from `result`.
///
/// The model is called exactly once. `processing_time` covers only that
/// call, not retrieval.
pub async fn compose(
    question: &str,
    result: RetrievalResult,
    model: &dyn LanguageModel,
) -> Result<Answer> {
    let prompt = build_prompt(question, &result);

    let started = Instant::now();
    let outcome = model.generate(&prompt).await;
    let processing_time = started.elapsed();

    match outcome {
        Ok(text) => {
            tracing::info!(
                model = model.model_name(),
                context_chunks = result.len(),
                elapsed_ms = processing_time.as_millis() as u64,
                "answer composed"
            );
            Ok(Answer {
                text: text.trim().to_string(),
                retrieval: result,
                processing_time,
            })
        }
        Err(err) => {
            tracing::error!(
                model = model.model_name(),
                code = err.code(),
                error = %err,
                "model call failed"
            );
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ModelErrorKind};
    use crate::models::{Chunk, ScoredChunk};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: Result<String>,
    }

    impl Recording {
        fn replying(reply: Result<String>) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply,
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Recording {
        fn provider(&self) -> &str {
            "recording"
        }
        fn model_name(&self) -> &str {
            "recording-1"
        }
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(Error::model("recording", ModelErrorKind::RateLimited, "busy")),
            }
        }
    }

    fn hit(source: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                source: source.into(),
                chunk_index: 0,
                char_offset: 0,
                text: text.into(),
                hash: String::new(),
            },
            score,
        }
    }

    fn two_hits() -> RetrievalResult {
        RetrievalResult {
            hits: vec![
                hit("b.pdf", "B is the capital of Y.", 0.9),
                hit("a.pdf", "A is the capital of X.", 0.4),
            ],
        }
    }

    #[test]
    fn prompt_lists_context_in_rank_order() {
        let prompt = build_prompt("What is the capital of Y?", &two_hits());
        assert!(prompt.starts_with(INSTRUCTION));
        let first = prompt.find("[1] (source: b.pdf)").unwrap();
        let second = prompt.find("[2] (source: a.pdf)").unwrap();
        assert!(first < second);
        assert!(prompt.find("</context>").unwrap() > second);
        assert!(prompt.trim_end().ends_with("Question: What is the capital of Y?"));
    }

    #[test]
    fn prompt_with_no_context_still_has_block() {
        let prompt = build_prompt("anything?", &RetrievalResult::default());
        assert!(prompt.contains("<context>\n</context>"));
    }

    #[tokio::test]
    async fn compose_calls_model_once() {
        let model = Recording::replying(Ok("  Y's capital is B.  ".into()));
        let answer = compose("What is the capital of Y?", two_hits(), &model)
            .await
            .unwrap();
        assert_eq!(answer.text, "Y's capital is B.");
        assert_eq!(answer.retrieval.len(), 2);
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn model_failure_propagates_with_category() {
        let model = Recording::replying(Err(Error::NotReady));
        let err = compose("q?", two_hits(), &model).await.unwrap_err();
        assert_eq!(err.code(), "model_rate_limited");
        assert_eq!(model.prompts.lock().unwrap().len(), 1);
    }
}
