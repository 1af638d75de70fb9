//! Question generation: the next question text for a selected gap.
//!
//! Generation always goes through the provider's streaming interface so
//! token deltas reach the emitter; the blocking entry point simply uses a
//! silent emitter and sees only the accumulated text. Any generation
//! failure falls back to a templated question for the gap's category --
//! never empty text.

use futures_util::StreamExt;

use vetta_types::config::LlmSettings;
use vetta_types::gap::{Gap, GapKind};
use vetta_types::llm::{CompletionRequest, LlmError, Message, MessageRole, StreamEvent};
use vetta_types::message::TurnMessage;
use vetta_types::session::{QuestionContext, SessionState, TerminationReason};

use crate::emitter::TurnEmitter;
use crate::llm::box_provider::BoxLlmProvider;

const QUESTION_SYSTEM_PROMPT: &str = "You are a friendly, focused technical interviewer. \
Ask exactly one question. Keep it short and conversational. Output only the question text.";

const GREETING_EN: &str = "Hi! Thanks for taking the time to talk with me today. \
I've read through your resume and I'd like to dig into a few areas together. \
Feel free to ask if any question is unclear.";

const GREETING_BY_LANGUAGE: [(&str, &str); 4] = [
    ("en", GREETING_EN),
    (
        "es",
        "¡Hola! Gracias por tu tiempo hoy. He leído tu currículum y me gustaría profundizar \
         en algunas áreas. Si alguna pregunta no queda clara, dímelo.",
    ),
    (
        "fr",
        "Bonjour ! Merci de prendre le temps d'échanger aujourd'hui. J'ai lu votre CV et \
         j'aimerais approfondir quelques points ensemble. N'hésitez pas à demander des précisions.",
    ),
    (
        "id",
        "Halo! Terima kasih sudah meluangkan waktu hari ini. Saya sudah membaca resume Anda \
         dan ingin mendalami beberapa hal bersama. Silakan bertanya jika ada pertanyaan yang kurang jelas.",
    ),
];

/// Stateless question generator.
pub struct QuestionGenerator;

impl QuestionGenerator {
    /// One-time greeting prefixed to the first question.
    pub fn greeting(language: Option<&str>) -> &'static str {
        let code = language.unwrap_or("en").to_lowercase();
        GREETING_BY_LANGUAGE
            .iter()
            .find(|(lang, _)| *lang == code)
            .map(|(_, text)| *text)
            .unwrap_or(GREETING_EN)
    }

    /// Generate the question for a newly selected gap.
    #[tracing::instrument(name = "generate_question", skip_all, fields(gap_id = %gap.id))]
    pub async fn generate(
        provider: &BoxLlmProvider,
        settings: &LlmSettings,
        state: &SessionState,
        gap: &Gap,
        gaps_resolved_last_turn: usize,
        emitter: &TurnEmitter,
    ) -> (String, QuestionContext) {
        match &gap.kind {
            GapKind::Predefined { question_text, .. } => {
                let text = Self::predefined_question_text(
                    provider,
                    settings,
                    state,
                    gap,
                    question_text,
                    emitter,
                )
                .await;
                (text.clone(), Self::context_for(gap, text))
            }
            GapKind::Skill { skill } => {
                let prompt = Self::dynamic_prompt(state, gap, skill, gaps_resolved_last_turn);
                let text = match Self::stream_text(provider, settings, &prompt, emitter).await {
                    Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
                    Ok(_) | Err(_) => {
                        tracing::warn!(gap_id = %gap.id, "question generation failed; using fallback template");
                        let fallback = Self::fallback_question(gap);
                        emitter.token(&fallback);
                        fallback
                    }
                };
                (text.clone(), Self::context_for(gap, text))
            }
        }
    }

    /// Generate a follow-up on the same gap: an example/explanation for a
    /// clarification request, a probe for specifics otherwise.
    #[tracing::instrument(name = "generate_follow_up", skip_all, fields(gap_id = %gap.id))]
    pub async fn follow_up(
        provider: &BoxLlmProvider,
        settings: &LlmSettings,
        state: &SessionState,
        gap: &Gap,
        clarification: bool,
        extracted_facts: &[String],
        emitter: &TurnEmitter,
    ) -> (String, QuestionContext) {
        let original = state
            .current_question
            .as_ref()
            .map(|q| q.question_text.clone())
            .unwrap_or_else(|| gap.description.clone());
        let last_answer = state
            .history
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut prompt = format!(
            "Original question: {original}\nCandidate's reply: {last_answer}\n\n"
        );
        if clarification {
            prompt.push_str(
                "The candidate asked for clarification. Rephrase the question in plainer terms \
                 and give one concrete example of the kind of answer you are looking for.",
            );
        } else {
            prompt.push_str(
                "The reply was too vague to be useful. Ask a more specific follow-up that makes \
                 it easy to give concrete details (numbers, team size, time frames).",
            );
        }
        if !extracted_facts.is_empty() {
            prompt.push_str(&format!(
                "\nAcknowledge what they already told you ({}) instead of re-asking it.",
                extracted_facts.join("; ")
            ));
        }

        let text = match Self::stream_text(provider, settings, &prompt, emitter).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) | Err(_) => {
                tracing::warn!(gap_id = %gap.id, "follow-up generation failed; using fallback template");
                let fallback = if clarification {
                    format!(
                        "Let me rephrase: {}. For example, you could describe a specific project \
                         where this came up.",
                        original
                    )
                } else {
                    "Could you give a bit more detail? Specific numbers, time frames, or an \
                     example project all help."
                        .to_string()
                };
                emitter.token(&fallback);
                fallback
            }
        };
        (text.clone(), Self::context_for(gap, text))
    }

    /// Completion message for a terminated interview.
    pub fn completion_message(reason: TerminationReason, state: &SessionState) -> String {
        match reason {
            TerminationReason::Complete => format!(
                "That gives me a really good picture -- thank you! We covered {} skill{} and \
                 I have what I need. The team will be in touch about next steps.",
                state.skills.len(),
                if state.skills.len() == 1 { "" } else { "s" }
            ),
            TerminationReason::Disengaged => "Thanks for your time today -- let's leave it here. \
                 If you'd like to continue another time, we can pick up right where we stopped."
                .to_string(),
            TerminationReason::NoGaps => format!(
                "That covers everything I wanted to ask -- thank you! We went through {} \
                 question{} together. The team will be in touch about next steps.",
                state.engagement.questions_asked,
                if state.engagement.questions_asked == 1 { "" } else { "s" }
            ),
        }
    }

    /// Templated question used when generation fails.
    pub fn fallback_question(gap: &Gap) -> String {
        match &gap.kind {
            GapKind::Predefined { question_text, .. } => question_text.clone(),
            GapKind::Skill { skill } => {
                let wanted = gap
                    .targets_attributes
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                if wanted.is_empty() {
                    format!("Can you tell me more about your experience with {skill}?")
                } else {
                    format!(
                        "Can you tell me more about your experience with {skill}? \
                         I'm particularly interested in {wanted}."
                    )
                }
            }
        }
    }

    /// First few words of a question, tracked to avoid repetitive openings.
    pub fn transition_phrase(question: &str) -> Option<String> {
        let first = question.split(['.', '!', '?', ',']).next()?.trim();
        let words: Vec<&str> = first.split_whitespace().take(4).collect();
        if words.len() < 2 {
            return None;
        }
        Some(words.join(" "))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn context_for(gap: &Gap, question_text: String) -> QuestionContext {
        match &gap.kind {
            GapKind::Skill { skill } => QuestionContext {
                question_text,
                gap_id: gap.id,
                gap_description: gap.description.clone(),
                skill_name: Some(skill.clone()),
                attribute: gap.targets_attributes.iter().next().copied(),
                category: None,
                criteria: vec![],
            },
            GapKind::Predefined {
                question_text: original,
                criteria,
                ..
            } => QuestionContext {
                question_text,
                gap_id: gap.id,
                gap_description: original.clone(),
                skill_name: None,
                attribute: None,
                category: Some(gap.category.clone()),
                criteria: criteria.clone(),
            },
        }
    }

    fn dynamic_prompt(
        state: &SessionState,
        gap: &Gap,
        skill: &str,
        gaps_resolved_last_turn: usize,
    ) -> String {
        let attribute = gap
            .targets_attributes
            .iter()
            .next()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "experience".to_string());

        let mut prompt = format!(
            "Ask the candidate one question about their {attribute} with {skill}.\n\
             Gap being filled: {}\n",
            gap.description
        );

        // Confirm what we already know instead of re-asking it.
        if let Some(known) = state.skills.get(skill) {
            let facts: Vec<String> = vetta_types::skill::SkillAttribute::ALL
                .into_iter()
                .filter_map(|a| known.attribute(a).map(|v| format!("{a}: {v}")))
                .collect();
            if !facts.is_empty() {
                prompt.push_str(&format!(
                    "Already known about {skill} ({}). Briefly confirm this instead of asking again, \
                     then ask about what is missing.\n",
                    facts.join("; ")
                ));
            }
        }

        // Topic-switch transition.
        let previous_skill = state
            .current_question
            .as_ref()
            .and_then(|q| q.skill_name.as_deref());
        if let Some(previous) = previous_skill {
            if !previous.eq_ignore_ascii_case(skill) {
                prompt.push_str(&format!(
                    "The previous question was about {previous}; add a brief transition \
                     acknowledging the topic switch to {skill}.\n"
                ));
            }
        }

        if gaps_resolved_last_turn >= 2 {
            prompt.push_str(&format!(
                "The previous answer covered {gaps_resolved_last_turn} topics at once; open by \
                 acknowledging that.\n"
            ));
        }

        if gap.probes_attempted >= 1 {
            prompt.push_str(&format!(
                "We asked about this earlier (attempt {} of {}); acknowledge circling back so \
                 re-asking feels natural.\n",
                gap.probes_attempted + 1,
                gap.max_probes
            ));
        }

        if !state.recent_transitions.is_empty() {
            prompt.push_str(&format!(
                "Do not open with any of these recently used phrases: {}.\n",
                state.recent_transitions.join("; ")
            ));
        }

        if let Some(language) = state.language.as_deref() {
            if !language.eq_ignore_ascii_case("en") {
                prompt.push_str(&format!("Write the question in language code '{language}'.\n"));
            }
        }

        prompt
    }

    /// Question text for a predefined gap: raw text for the very first
    /// question, a contextual bridge afterwards, and a short confirmation
    /// follow-up for a gap pre-filled by an earlier answer.
    async fn predefined_question_text(
        provider: &BoxLlmProvider,
        settings: &LlmSettings,
        state: &SessionState,
        gap: &Gap,
        question_text: &str,
        emitter: &TurnEmitter,
    ) -> String {
        let GapKind::Predefined {
            interview_filled,
            interview_evidence,
            ..
        } = &gap.kind
        else {
            return question_text.to_string();
        };

        let prompt = if *interview_filled {
            let evidence = interview_evidence.as_deref().unwrap_or_default();
            format!(
                "The candidate already touched on this earlier: \"{evidence}\".\n\
                 Original question: {question_text}\n\
                 Ask a short confirmation follow-up that builds on what they said instead of \
                 asking the full question again."
            )
        } else if state.engagement.questions_asked > 0 && state.history.len() >= 2 {
            let conversation = Self::format_window(state.recent_window(4));
            format!(
                "Recent conversation:\n{conversation}\n\
                 Deliver the next interview question with a one-sentence natural bridge from \
                 what the candidate just said. Next question: {question_text}"
            )
        } else {
            // First question goes out verbatim.
            emitter.token(question_text);
            return question_text.to_string();
        };

        match Self::stream_text(provider, settings, &prompt, emitter).await {
            Ok(text) if text.trim().len() >= 20 && text.contains('?') => text.trim().to_string(),
            Ok(_) | Err(_) => {
                tracing::warn!(gap_id = %gap.id, "contextual question failed; using question text verbatim");
                emitter.token(question_text);
                question_text.to_string()
            }
        }
    }

    fn format_window(window: &[TurnMessage]) -> String {
        window
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    MessageRole::Assistant => "Interviewer",
                    _ => "Candidate",
                };
                let content: String = m.content.chars().take(300).collect();
                format!("{speaker}: {content}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drive a streaming completion, forwarding deltas to the emitter and
    /// returning the accumulated text. Used by sync and streaming turns
    /// alike so both share one generation path.
    async fn stream_text(
        provider: &BoxLlmProvider,
        settings: &LlmSettings,
        prompt: &str,
        emitter: &TurnEmitter,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: settings.model.clone(),
            messages: vec![Message {
                role: MessageRole::User,
                content: prompt.to_string(),
            }],
            system: Some(QUESTION_SYSTEM_PROMPT.to_string()),
            max_tokens: settings.max_tokens,
            temperature: Some(settings.temperature),
            stream: true,
            output_schema: None,
        };

        let mut stream = provider.stream(request);
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: delta } => {
                    emitter.token(&delta);
                    text.push_str(&delta);
                }
                StreamEvent::Done => break,
                StreamEvent::Connected | StreamEvent::Usage(_) => {}
            }
        }
        Ok(text)
    }
}
