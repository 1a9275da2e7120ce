//! services/api/src/adapters/feedback_llm.rs
//!
//! This module contains the adapter for the Feedback LLM.
//! It implements the `FeedbackOracle` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use case_tutor_core::{
    domain::{Feedback, FeedbackRequest},
    ports::{FeedbackOracle, PortError, PortResult},
};
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "You are a clinical ophthalmology tutor evaluating a medical \
student working through a clinical case one step at a time. Score the student's answer to \
the current step: 0 = incorrect or unsafe, 1 = partially correct, 2 = correct and complete. \
Write the feedback directly to the student, in a constructive tone, pointing out what was \
right, what was missing and the expected reasoning. Respond with a single JSON object and \
nothing else, with the fields \"feedback\" (string), \"score\" (number between 0 and 2) and \
\"justification\" (string, a short rationale for the score).";

const MAX_SCORE: f64 = 2.0;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FeedbackOracle` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiFeedbackAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiFeedbackAdapter {
    /// Creates a new `OpenAiFeedbackAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Renders the per-step context the model is asked to grade.
fn render_case_context(request: &FeedbackRequest) -> String {
    format!(
        "CASE: {}\nTHEME: {}\nCURRENT STEP: {} of {}\nSTEP INFORMATION: {}\nQUESTION ASKED: {}\nSTUDENT ANSWER: {}",
        request.case_title,
        request.theme,
        request.step_index + 1,
        request.step_count,
        request.step_content,
        request.step_question,
        request.student_response,
    )
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    justification: Option<String>,
}

/// Extracts the verdict from the model's reply.
///
/// Tolerates code fences and chatter around the JSON object. Scores are clamped to the
/// grading range; a missing score counts as zero.
fn parse_feedback(reply: &str) -> PortResult<Feedback> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(PortError::Unexpected(
                "Feedback LLM reply did not contain a JSON object.".to_string(),
            ))
        }
    };
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| PortError::Unexpected(format!("Malformed feedback JSON: {}", e)))?;

    let feedback = raw
        .feedback
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| "No feedback could be generated for this answer.".to_string());
    let score = raw
        .score
        .filter(|s| s.is_finite())
        .map(|s| s.clamp(0.0, MAX_SCORE))
        .unwrap_or(0.0);

    Ok(Feedback {
        feedback,
        score,
        justification: raw.justification.unwrap_or_default(),
    })
}

//=========================================================================================
// `FeedbackOracle` Trait Implementation
//=========================================================================================

#[async_trait]
impl FeedbackOracle for OpenAiFeedbackAdapter {
    async fn evaluate(&self, request: &FeedbackRequest) -> PortResult<Feedback> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(render_case_context(request))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Feedback LLM response contained no text content.".to_string())
            })?;

        parse_feedback(&content)
    }
}

//=========================================================================================
// Fallback
//=========================================================================================

/// Used when no API key is configured; every evaluation degrades to a zero score.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredOracle;

#[async_trait]
impl FeedbackOracle for UnconfiguredOracle {
    async fn evaluate(&self, _request: &FeedbackRequest) -> PortResult<Feedback> {
        Err(PortError::Unavailable(
            "No feedback model is configured (OPENAI_API_KEY is unset).".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_reply_is_parsed() {
        let fb = parse_feedback(r#"{"feedback":"Good","score":2,"justification":"All findings"}"#)
            .unwrap();
        assert_eq!(fb.feedback, "Good");
        assert_eq!(fb.score, 2.0);
        assert_eq!(fb.justification, "All findings");
    }

    #[test]
    fn fenced_reply_is_parsed() {
        let reply = "Here you go:\n```json\n{\"feedback\": \"Partly\", \"score\": 1}\n```";
        let fb = parse_feedback(reply).unwrap();
        assert_eq!(fb.score, 1.0);
        assert_eq!(fb.justification, "");
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        assert_eq!(parse_feedback(r#"{"feedback":"x","score":7}"#).unwrap().score, 2.0);
        assert_eq!(parse_feedback(r#"{"feedback":"x","score":-1}"#).unwrap().score, 0.0);
    }

    #[test]
    fn missing_fields_fall_back() {
        let fb = parse_feedback("{}").unwrap();
        assert_eq!(fb.score, 0.0);
        assert!(!fb.feedback.is_empty());
    }

    #[test]
    fn non_json_reply_is_an_error() {
        assert!(parse_feedback("I cannot grade this.").is_err());
        assert!(parse_feedback("{not json}").is_err());
    }

    #[test]
    fn context_uses_one_based_step_numbers() {
        let request = FeedbackRequest {
            case_title: "Red eye".to_string(),
            theme: "Glaucoma".to_string(),
            step_index: 0,
            step_count: 5,
            step_content: "Pain".to_string(),
            step_question: "Next?".to_string(),
            student_response: "Tonometry".to_string(),
        };
        let context = render_case_context(&request);
        assert!(context.contains("CURRENT STEP: 1 of 5"));
        assert!(context.contains("STUDENT ANSWER: Tonometry"));
    }

    #[tokio::test]
    async fn unconfigured_oracle_reports_unavailable() {
        let request = FeedbackRequest {
            case_title: String::new(),
            theme: String::new(),
            step_index: 0,
            step_count: 1,
            step_content: String::new(),
            step_question: String::new(),
            student_response: "a".to_string(),
        };
        assert!(matches!(
            UnconfiguredOracle.evaluate(&request).await,
            Err(PortError::Unavailable(_))
        ));
    }
}
