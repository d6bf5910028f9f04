//! The mastery-check quiz pipeline: config estimation, bulk question
//! generation, grading, and review. Quiz calls run on the lite model
//! tier with their own narrow retry policy instead of the full
//! fallback chain: one retry at lower temperature for a bad
//! generation, a hop to an even lighter model on rate-limit or
//! unavailable signals, then give up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::core::OracleConfig;
use crate::error::OracleError;
use crate::normalize::extract_json;
use crate::prompt::{Language, Prompt, render, render_conversation};
use crate::provider::{CompletionRequest, Message, ProviderClient, Role};
use crate::store::{KEY_QUIZ_STATE, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuizLevel {
    Fundamental,
    #[default]
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuizConfig {
    pub level: QuizLevel,
    pub count: u8,
    #[serde(rename = "mcqRatio")]
    pub mcq_ratio: f32,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            level: QuizLevel::Intermediate,
            count: 5,
            mcq_ratio: 0.5,
        }
    }
}

impl QuizConfig {
    /// Clamp into the supported ranges; the config is immutable once
    /// a run starts, so this happens exactly once at the boundary.
    pub fn clamped(mut self) -> Self {
        self.count = self.count.clamp(1, 10);
        self.mcq_ratio = self.mcq_ratio.clamp(0.0, 1.0);
        self
    }

    /// MCQ share of the question set, standard rounding.
    pub fn mcq_count(&self) -> u8 {
        (self.count as f32 * self.mcq_ratio).round() as u8
    }

    pub fn open_count(&self) -> u8 {
        self.count - self.mcq_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "mcq")]
    Mcq,
    #[serde(rename = "open")]
    Open,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(rename = "correctAnswer", skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizResult {
    #[serde(rename = "questionId")]
    pub question_id: String,
    #[serde(rename = "userAnswer")]
    pub user_answer: String,
    #[serde(rename = "isCorrect")]
    pub is_correct: bool,
    pub feedback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuizPhase {
    #[default]
    Config,
    Loading,
    Active,
    Review,
}

/// The whole quiz run, serialized to the session store after every
/// transition so a reload resumes mid-quiz.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuizState {
    pub phase: QuizPhase,
    pub config: QuizConfig,
    pub questions: Vec<QuizQuestion>,
    pub current_index: usize,
    pub answers: HashMap<String, String>,
    pub results: HashMap<String, QuizResult>,
}

impl QuizState {
    pub fn load(store: &SessionStore) -> Self {
        store.get(KEY_QUIZ_STATE).unwrap_or_default()
    }

    pub fn save(&self, store: &mut SessionStore) {
        if let Err(err) = store.put(KEY_QUIZ_STATE, self) {
            tracing::warn!("Failed to persist quiz state: {}", err);
        }
    }

    pub fn begin_loading(&mut self, config: QuizConfig) {
        self.config = config.clamped();
        self.phase = QuizPhase::Loading;
    }

    /// Loading -> Active with a complete question set. Partial sets
    /// are rejected upstream; this only sees validated questions.
    pub fn activate(&mut self, questions: Vec<QuizQuestion>) {
        self.questions = questions;
        self.results.clear();
        self.answers.clear();
        self.current_index = 0;
        self.phase = QuizPhase::Active;
    }

    /// Generation failure: back to Config, nothing kept.
    pub fn fail_loading(&mut self) {
        self.questions.clear();
        self.phase = QuizPhase::Config;
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn record_result(&mut self, answer: String, result: QuizResult) {
        self.answers.insert(result.question_id.clone(), answer);
        self.results.insert(result.question_id.clone(), result);
    }

    /// Active -> Active (next question) or Active -> Review.
    pub fn advance(&mut self) {
        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
        } else {
            self.phase = QuizPhase::Review;
        }
    }

    /// Review -> Config for a retake; the config survives, the run
    /// does not.
    pub fn retake(&mut self) {
        self.questions.clear();
        self.answers.clear();
        self.results.clear();
        self.current_index = 0;
        self.phase = QuizPhase::Config;
    }

    pub fn score(&self) -> usize {
        self.results.values().filter(|r| r.is_correct).count()
    }

    /// Review summary suitable for appending to the student profile.
    pub fn summary(&self, language: Language) -> String {
        let score = self.score();
        let total = self.questions.len();
        let level = format!("{:?}", self.config.level);
        match language {
            Language::En => format!("[QUIZ RESULT: {}/{} at {} difficulty]", score, total, level),
            Language::Fr => format!("[RÉSULTAT DU QUIZ : {}/{} au niveau {}]", score, total, level),
            Language::Es => format!("[RESULTADO DEL QUIZ: {}/{} en nivel {}]", score, total, level),
            Language::Vi => format!("[KẾT QUẢ QUIZ: {}/{} ở mức {}]", score, total, level),
        }
    }
}

/// One completion plus parse. Parsing is part of the attempt so a 200
/// reply with unusable content counts as a failed generation, not a
/// success.
async fn attempt_quiz_call<T>(
    client: &ProviderClient,
    request: &CompletionRequest,
    api_key: &str,
    parse: &impl Fn(&str) -> Result<T, OracleError>,
) -> Result<T, OracleError> {
    let text = client.completion(request, api_key).await?;
    parse(&text)
}

/// One quiz-tier model call: primary lite model, one lower-temperature
/// retry on a bad generation, the lighter fallback model on
/// rate-limit/unavailable signals specifically.
async fn quiz_tier_call<T>(
    client: &ProviderClient,
    config: &OracleConfig,
    mut request: CompletionRequest,
    api_key: &str,
    parse: impl Fn(&str) -> Result<T, OracleError>,
) -> Result<T, OracleError> {
    request.model = config.quiz_model.clone();
    match attempt_quiz_call(client, &request, api_key, &parse).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_fatal() => Err(err),
        Err(OracleError::RateLimited(_)) | Err(OracleError::Unavailable(_)) => {
            tracing::debug!("Quiz tier saturated, hopping to {}", config.quiz_fallback_model);
            let mut lighter = request.clone();
            lighter.model = config.quiz_fallback_model.clone();
            attempt_quiz_call(client, &lighter, api_key, &parse).await
        }
        Err(err) => {
            tracing::debug!("Quiz generation unusable ({}), retrying at lower temperature", err);
            let mut retry = request.clone();
            retry.temperature = (request.temperature * 0.5).max(0.1);
            match attempt_quiz_call(client, &retry, api_key, &parse).await {
                Ok(value) => Ok(value),
                Err(OracleError::RateLimited(_)) | Err(OracleError::Unavailable(_)) => {
                    let mut lighter = retry.clone();
                    lighter.model = config.quiz_fallback_model.clone();
                    attempt_quiz_call(client, &lighter, api_key, &parse).await
                }
                Err(err) => Err(err),
            }
        }
    }
}

/// Estimate a quiz configuration from the conversation. Estimation
/// failure is non-fatal: the caller's prior config comes back
/// unchanged.
pub async fn estimate_config(
    client: &ProviderClient,
    config: &OracleConfig,
    history: &[Message],
    memory: Option<&str>,
    prior: QuizConfig,
    api_key: &str,
) -> QuizConfig {
    let Ok(prompt) = render(
        Prompt::QuizEstimate,
        &json!({
            "conversation": render_conversation(history),
            "memory": memory.map(str::trim).filter(|m| !m.is_empty()),
        }),
    ) else {
        return prior;
    };

    let request = CompletionRequest {
        model: String::new(),
        system_instruction: "You estimate quiz configurations. Output JSON only.".to_string(),
        messages: vec![Message::new(Role::User, &prompt)],
        temperature: 0.2,
        json_response: true,
    };

    let parse = |text: &str| {
        let value = extract_json(text)?;
        serde_json::from_value::<QuizConfig>(value)
            .map_err(|e| OracleError::MalformedResponse(e.to_string()))
    };
    match quiz_tier_call(client, config, request, api_key, parse).await {
        Ok(estimated) => estimated.clamped(),
        Err(err) => {
            tracing::debug!("Quiz config estimation failed: {}", err);
            prior
        }
    }
}

/// Generate the full question set in one call. No partial sets: a
/// reply with the wrong count, a broken MCQ, or the wrong type mix
/// is rejected wholesale as malformed.
pub async fn generate_questions(
    client: &ProviderClient,
    config: &OracleConfig,
    quiz: QuizConfig,
    history: &[Message],
    memory: Option<&str>,
    language: Language,
    api_key: &str,
) -> Result<Vec<QuizQuestion>, OracleError> {
    let quiz = quiz.clamped();
    let prompt = render(
        Prompt::QuizGeneration,
        &json!({
            "level": format!("{:?}", quiz.level),
            "count": quiz.count,
            "mcq_count": quiz.mcq_count(),
            "open_count": quiz.open_count(),
            "language": language.directive(),
            "conversation": render_conversation(history),
            "memory": memory.map(str::trim).filter(|m| !m.is_empty()),
        }),
    )?;

    let request = CompletionRequest {
        model: String::new(),
        system_instruction: "You write quizzes. Output JSON only.".to_string(),
        messages: vec![Message::new(Role::User, &prompt)],
        temperature: 0.6,
        json_response: true,
    };

    let parse = |text: &str| {
        let value = extract_json(text)?;
        parse_question_set(&value, quiz)
    };
    quiz_tier_call(client, config, request, api_key, parse).await
}

fn parse_question_set(value: &Value, quiz: QuizConfig) -> Result<Vec<QuizQuestion>, OracleError> {
    let raw = value
        .get("questions")
        .cloned()
        .ok_or_else(|| OracleError::MalformedResponse("missing `questions` array".to_string()))?;
    let mut questions: Vec<QuizQuestion> = serde_json::from_value(raw)
        .map_err(|e| OracleError::MalformedResponse(format!("bad question set: {}", e)))?;

    if questions.len() != quiz.count as usize {
        return Err(OracleError::MalformedResponse(format!(
            "expected {} questions, got {}",
            quiz.count,
            questions.len()
        )));
    }
    let mcq_count = questions
        .iter()
        .filter(|q| q.kind == QuestionKind::Mcq)
        .count();
    if mcq_count != quiz.mcq_count() as usize {
        return Err(OracleError::MalformedResponse(format!(
            "expected {} mcq questions, got {}",
            quiz.mcq_count(),
            mcq_count
        )));
    }

    for q in &mut questions {
        if q.id.trim().is_empty() {
            q.id = Uuid::new_v4().to_string();
        }
        if q.kind == QuestionKind::Mcq {
            let correct = q
                .correct_answer
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    OracleError::MalformedResponse("mcq question missing correctAnswer".to_string())
                })?;
            let options = q.options.as_deref().unwrap_or_default();
            if options.is_empty() || !options.iter().any(|o| o == correct) {
                return Err(OracleError::MalformedResponse(
                    "mcq options missing the correct answer".to_string(),
                ));
            }
        }
    }
    Ok(questions)
}

/// MCQ grading is exact-match against the provided correct answer; no
/// model call involved.
pub fn grade_mcq(question: &QuizQuestion, answer: &str, language: Language) -> QuizResult {
    let correct = question.correct_answer.as_deref().unwrap_or_default();
    let is_correct = answer == correct;
    let feedback = if is_correct {
        match language {
            Language::En => "Correct!".to_string(),
            Language::Fr => "Correct !".to_string(),
            Language::Es => "¡Correcto!".to_string(),
            Language::Vi => "Chính xác!".to_string(),
        }
    } else {
        let explanation = question.explanation.as_deref().unwrap_or_default();
        match language {
            Language::En => format!("Not quite. The answer is: {}. {}", correct, explanation),
            Language::Fr => format!("Pas tout à fait. La réponse est : {}. {}", correct, explanation),
            Language::Es => format!("No exactamente. La respuesta es: {}. {}", correct, explanation),
            Language::Vi => format!("Chưa đúng. Đáp án là: {}. {}", correct, explanation),
        }
    };
    QuizResult {
        question_id: question.id.clone(),
        user_answer: answer.to_string(),
        is_correct,
        feedback: feedback.trim_end().to_string(),
    }
}

/// Open-ended grading is delegated to a quiz-tier model call that
/// returns `{isCorrect, feedback}` through the shared normalizer.
pub async fn grade_open(
    client: &ProviderClient,
    config: &OracleConfig,
    question: &QuizQuestion,
    answer: &str,
    language: Language,
    api_key: &str,
) -> Result<QuizResult, OracleError> {
    let reference = question
        .correct_answer
        .as_deref()
        .or(question.explanation.as_deref())
        .unwrap_or_default();
    let prompt = render(
        Prompt::QuizGrading,
        &json!({
            "question": question.question,
            "reference": reference,
            "answer": answer,
            "language": language.directive(),
        }),
    )?;

    let request = CompletionRequest {
        model: String::new(),
        system_instruction: "You grade student answers. Output JSON only.".to_string(),
        messages: vec![Message::new(Role::User, &prompt)],
        temperature: 0.3,
        json_response: true,
    };

    let parse = |text: &str| {
        let value = extract_json(text)?;
        let is_correct = value
            .get("isCorrect")
            .and_then(Value::as_bool)
            .ok_or_else(|| OracleError::MalformedResponse("missing `isCorrect`".to_string()))?;
        let feedback = value
            .get("feedback")
            .and_then(Value::as_str)
            .ok_or_else(|| OracleError::MalformedResponse("missing `feedback`".to_string()))?;
        Ok(QuizResult {
            question_id: question.id.clone(),
            user_answer: answer.to_string(),
            is_correct,
            feedback: feedback.to_string(),
        })
    };
    quiz_tier_call(client, config, request, api_key, parse).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq(id: &str, correct: &str) -> QuizQuestion {
        QuizQuestion {
            id: id.to_string(),
            kind: QuestionKind::Mcq,
            question: "Pick one".to_string(),
            options: Some(vec!["a".to_string(), correct.to_string(), "c".to_string(), "d".to_string()]),
            correct_answer: Some(correct.to_string()),
            explanation: Some("because".to_string()),
        }
    }

    fn question_set_json(mcqs: usize, opens: usize) -> Value {
        let mut questions = Vec::new();
        for i in 0..mcqs {
            questions.push(json!({
                "id": format!("q{}", i),
                "type": "mcq",
                "question": "Pick one",
                "options": ["a", "b", "c", "d"],
                "correctAnswer": "b",
                "explanation": "because"
            }));
        }
        for i in 0..opens {
            questions.push(json!({
                "id": format!("o{}", i),
                "type": "open",
                "question": "Explain",
                "correctAnswer": "model answer"
            }));
        }
        json!({ "questions": questions })
    }

    #[test]
    fn test_mcq_ratio_rounding() {
        let quiz = QuizConfig {
            level: QuizLevel::Intermediate,
            count: 5,
            mcq_ratio: 0.4,
        };
        assert_eq!(quiz.mcq_count(), 2);
        assert_eq!(quiz.open_count(), 3);
    }

    #[test]
    fn test_config_clamping() {
        let quiz = QuizConfig {
            level: QuizLevel::Advanced,
            count: 25,
            mcq_ratio: 1.7,
        }
        .clamped();
        assert_eq!(quiz.count, 10);
        assert_eq!(quiz.mcq_ratio, 1.0);
    }

    #[test]
    fn test_question_set_validation_accepts_matching_set() {
        let quiz = QuizConfig {
            level: QuizLevel::Intermediate,
            count: 5,
            mcq_ratio: 0.4,
        };
        let set = question_set_json(2, 3);
        let questions = parse_question_set(&set, quiz).unwrap();
        assert_eq!(questions.len(), 5);
        for q in questions.iter().filter(|q| q.kind == QuestionKind::Mcq) {
            let options = q.options.as_ref().unwrap();
            assert!(!options.is_empty());
            assert!(options.contains(q.correct_answer.as_ref().unwrap()));
        }
    }

    #[test]
    fn test_question_set_validation_rejects_wrong_count() {
        let quiz = QuizConfig::default(); // count 5
        let set = question_set_json(2, 2);
        assert!(matches!(
            parse_question_set(&set, quiz),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_question_set_validation_rejects_mcq_without_answer_in_options() {
        let quiz = QuizConfig {
            level: QuizLevel::Intermediate,
            count: 1,
            mcq_ratio: 1.0,
        };
        let set = json!({ "questions": [{
            "id": "q0",
            "type": "mcq",
            "question": "Pick one",
            "options": ["a", "c"],
            "correctAnswer": "b"
        }]});
        assert!(parse_question_set(&set, quiz).is_err());
    }

    #[test]
    fn test_missing_ids_are_filled() {
        let quiz = QuizConfig {
            level: QuizLevel::Fundamental,
            count: 1,
            mcq_ratio: 0.0,
        };
        let set = json!({ "questions": [{
            "type": "open",
            "question": "Explain",
            "correctAnswer": "ref"
        }]});
        let questions = parse_question_set(&set, quiz).unwrap();
        assert!(!questions[0].id.is_empty());
    }

    #[test]
    fn test_grade_mcq_exact_match() {
        let q = mcq("q1", "b");
        let right = grade_mcq(&q, "b", Language::En);
        assert!(right.is_correct);
        let wrong = grade_mcq(&q, "a", Language::En);
        assert!(!wrong.is_correct);
        assert!(wrong.feedback.contains("b"));
        assert!(wrong.feedback.contains("because"));
    }

    #[test]
    fn test_state_machine_transitions() {
        let mut state = QuizState::default();
        assert_eq!(state.phase, QuizPhase::Config);

        state.begin_loading(QuizConfig::default());
        assert_eq!(state.phase, QuizPhase::Loading);

        state.activate(vec![mcq("q1", "b"), mcq("q2", "c")]);
        assert_eq!(state.phase, QuizPhase::Active);
        assert_eq!(state.current_question().unwrap().id, "q1");

        let result = grade_mcq(&state.questions[0].clone(), "b", Language::En);
        state.record_result("b".to_string(), result);
        state.advance();
        assert_eq!(state.phase, QuizPhase::Active);
        assert_eq!(state.current_question().unwrap().id, "q2");

        let result = grade_mcq(&state.questions[1].clone(), "x", Language::En);
        state.record_result("x".to_string(), result);
        state.advance();
        assert_eq!(state.phase, QuizPhase::Review);
        assert_eq!(state.score(), 1);

        let summary = state.summary(Language::En);
        assert!(summary.contains("1/2"));
        assert!(summary.contains("Intermediate"));

        state.retake();
        assert_eq!(state.phase, QuizPhase::Config);
        assert!(state.results.is_empty());
    }

    #[test]
    fn test_failed_generation_returns_to_config() {
        let mut state = QuizState::default();
        state.begin_loading(QuizConfig::default());
        state.fail_loading();
        assert_eq!(state.phase, QuizPhase::Config);
        assert!(state.questions.is_empty());
    }

    #[test]
    fn test_state_survives_store_round_trip() {
        let mut store = SessionStore::new();
        let mut state = QuizState::default();
        state.begin_loading(QuizConfig::default());
        state.activate(vec![mcq("q1", "b")]);
        state.save(&mut store);

        let restored = QuizState::load(&store);
        assert_eq!(restored.phase, QuizPhase::Active);
        assert_eq!(restored.questions.len(), 1);
        assert_eq!(restored.questions[0].id, "q1");
    }

    #[tokio::test]
    async fn test_grade_open_parses_model_verdict() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"content": "{\"isCorrect\": true, \"feedback\": \"Nailed it.\"}"}}]}"#,
            )
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let config = OracleConfig::default();
        let q = QuizQuestion {
            id: "q1".to_string(),
            kind: QuestionKind::Open,
            question: "Explain entropy".to_string(),
            options: None,
            correct_answer: Some("disorder measure".to_string()),
            explanation: None,
        };
        let result = grade_open(&client, &config, &q, "it measures disorder", Language::En, "key")
            .await
            .unwrap();
        assert!(result.is_correct);
        assert_eq!(result.feedback, "Nailed it.");
        assert_eq!(result.question_id, "q1");
    }

    #[test]
    fn test_summary_localization() {
        let mut state = QuizState::default();
        state.activate(vec![mcq("q1", "b")]);
        state.record_result("b".to_string(), grade_mcq(&state.questions[0].clone(), "b", Language::En));

        assert!(state.summary(Language::Fr).contains("RÉSULTAT DU QUIZ"));
        assert!(state.summary(Language::Vi).contains("KẾT QUẢ QUIZ"));
        assert!(state.summary(Language::Es).contains("RESULTADO DEL QUIZ"));
    }

    #[tokio::test]
    async fn test_bad_generation_retries_once_at_lower_temperature() {
        let mut server = mockito::Server::new_async().await;
        // The primary model answers 200 twice with prose instead of a
        // question set: one lower-temperature retry, then give up. The
        // lighter model is reserved for saturation signals.
        let primary = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "quiz-lite"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"content": "Here is a quiz for you!"}}]}"#)
            .expect(2)
            .create_async()
            .await;
        let lighter = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "quiz-lighter"}"#.to_string(),
            ))
            .expect(0)
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let config = OracleConfig {
            quiz_model: "quiz-lite".to_string(),
            quiz_fallback_model: "quiz-lighter".to_string(),
            ..OracleConfig::default()
        };
        let err = generate_questions(
            &client,
            &config,
            QuizConfig::default(),
            &[],
            None,
            Language::En,
            "key",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OracleError::MalformedResponse(_)));
        primary.assert_async().await;
        lighter.assert_async().await;
    }

    #[tokio::test]
    async fn test_quiz_tier_hops_to_lighter_model_on_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        // First call rate-limits, second succeeds on the lighter model.
        let _limited = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "gemini-2.5-flash-lite"}"#.to_string(),
            ))
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED","message":"quota"}}"#)
            .create_async()
            .await;
        let _lighter = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model": "gemini-2.0-flash-lite"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(
                r#"{"choices": [{"message": {"content": "{\"isCorrect\": false, \"feedback\": \"Close.\"}"}}]}"#,
            )
            .create_async()
            .await;

        let client = ProviderClient::new(&server.url());
        let config = OracleConfig {
            quiz_model: "gemini-2.5-flash-lite".to_string(),
            quiz_fallback_model: "gemini-2.0-flash-lite".to_string(),
            ..OracleConfig::default()
        };
        let q = QuizQuestion {
            id: "q1".to_string(),
            kind: QuestionKind::Open,
            question: "Explain".to_string(),
            options: None,
            correct_answer: Some("ref".to_string()),
            explanation: None,
        };
        let result = grade_open(&client, &config, &q, "answer", Language::En, "key")
            .await
            .unwrap();
        assert!(!result.is_correct);
        assert_eq!(result.feedback, "Close.");
    }
}
