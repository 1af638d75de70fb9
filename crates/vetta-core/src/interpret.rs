//! Answer interpretation: classify the inbound answer and capture literal
//! facts.
//!
//! Pure over its inputs (answer text, prior question, recent conversation
//! window); the only side effect is the model call. Classification failures
//! degrade to `partial_answer` so a model hiccup never blocks the turn.

use vetta_types::assessment::Interpretation;
use vetta_types::config::LlmSettings;
use vetta_types::message::{MessageRole, TurnMessage};

use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::RetryPolicy;
use crate::llm::structured;

const INTERPRET_SYSTEM_PROMPT: &str = r#"You classify a candidate's answer in a structured interview.

Classify the answer into exactly one answer_type:
- "direct_answer": fully addresses the question
- "partial_answer": addresses the question incompletely or vaguely
- "off_topic": does not address the question at all
- "clarification_request": asks what the question means or for an example

Also list literal_facts: every concrete factual statement present in the
answer, verbatim or lightly normalized (e.g. "3 years of Python").

IMPORTANT: a clarification request can still contain facts. "3 years. What do
you mean by types?" is a clarification_request whose literal_facts include
"3 years". Always capture the facts regardless of classification.

Return JSON with fields answer_type and literal_facts."#;

/// Stateless answer interpreter.
pub struct AnswerInterpreter;

impl AnswerInterpreter {
    /// Classify an answer against the question it responds to.
    ///
    /// Never fails: on classifier error the result defaults to a partial
    /// answer with no facts and the turn proceeds.
    #[tracing::instrument(name = "interpret_answer", skip_all, fields(answer_len = answer.len()))]
    pub async fn interpret(
        provider: &BoxLlmProvider,
        retry: &RetryPolicy,
        settings: &LlmSettings,
        question: &str,
        answer: &str,
        window: &[TurnMessage],
    ) -> Interpretation {
        let mut prompt = String::new();
        if !window.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for message in window {
                let speaker = match message.role {
                    MessageRole::Assistant => "Interviewer",
                    _ => "Candidate",
                };
                prompt.push_str(&format!("{speaker}: {}\n", message.content));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("Question: {question}\nAnswer: {answer}"));

        match structured::request::<Interpretation>(
            provider,
            retry,
            settings,
            "interpret_answer",
            INTERPRET_SYSTEM_PROMPT,
            &prompt,
        )
        .await
        {
            Ok(interpretation) => {
                tracing::debug!(
                    answer_type = %interpretation.answer_type,
                    facts = interpretation.literal_facts.len(),
                    "answer interpreted"
                );
                interpretation
            }
            Err(err) => {
                tracing::warn!(error = %err, "answer classification failed; defaulting to partial_answer");
                Interpretation::fallback()
            }
        }
    }
}
