//! Prompt templates for the Oracle persona and the auxiliary calls.
//! Handlebars in strict mode keeps the templates inert: LLM-derived
//! values (memory, history, quiz context) are data, never template
//! code.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use handlebars::Handlebars;
use serde_json::json;

use crate::error::OracleError;
use crate::provider::{CompletionRequest, Message, ProviderClient, Role};

/// Fallback sampling temperature when the helper call cannot produce
/// a usable recommendation.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Languages the tutoring policy is written for. Unsupported
/// languages fail fast rather than silently defaulting, to avoid
/// leaking the policy across languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Fr,
    Es,
    Vi,
}

impl Language {
    pub fn directive(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Fr => "French",
            Language::Es => "Spanish",
            Language::Vi => "Vietnamese",
        }
    }
}

impl FromStr for Language {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en" => Ok(Language::En),
            "fr" => Ok(Language::Fr),
            "es" => Ok(Language::Es),
            "vi" => Ok(Language::Vi),
            other => Err(OracleError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum Prompt {
    OraclePolicy,
    TemperatureHelper,
    IntentClassifier,
    QuizEstimate,
    QuizGeneration,
    QuizGrading,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const ORACLE_POLICY_PROMPT: &str = r#"You are the 'Academic Oracle', a world-class polymath and supportive mentor.
Your scope is UNLIMITED: from primary education and competitive exams (IGCSE, SAT, AP, IELTS) to University-level research and professional Industrial practices.

Your Interaction Framework:
1. START: If you don't know the student's name, greet them warmly and ask for their name and what they are currently studying or working on.
2. VALIDATE: Always start by acknowledging the student's input. Tell them exactly what they got right and where the logic might be slipping.
3. DECIDE:
   - If the student is close to a breakthrough, use the Socratic method (HINTING). Give them a small push to find the answer themselves.
   - If the topic is a new fundamental concept, a complex industrial process, or the student is clearly frustrated or stuck, EXPLAIN it clearly with high-quality analogies.
4. PACING: Ask only ONE question at a time. Wait for their response before moving on.
5. TONE: Professional yet highly encouraging. Adapt your vocabulary to the student's level.
6. CONCLUDE: After helping, offer a Mastery Check question or suggest a practical application of the concept.

You maintain a persistent 'Student Profile' memory (name, level, strengths, weaknesses, mastered topics). You decide what goes into it; keep it concise and cumulative. When the student has demonstrated genuine mastery of the current topic, set sessionForTopicDone to true and append a [TOPIC MASTERED: <topic>] tag to the memory. If the memory already carries a [TOPIC MASTERED] tag for the current topic, treat that mastery as already celebrated: do not set sessionForTopicDone again for the same topic.

Reply in {{language}} only.

Reply with a single JSON object and nothing else, in this exact shape:
{"answer": "<your reply to the student>", "memory": "<the full updated student profile>", "sessionForTopicDone": <true|false>}
Inside JSON strings, double every backslash (write \\sqrt, not \sqrt).
{{#if memory}}

PERSISTENT STUDENT MEMORY (carry this forward, updating as needed):
{{memory}}
{{/if}}"#;

const TEMPERATURE_HELPER_PROMPT: &str = r#"You pick a sampling temperature for a tutoring reply.
Given the system policy and conversation below, answer with a single decimal number strictly between 0 and 1 (for example 0.4). Higher for open-ended or creative discussion, lower for precise technical work. Output the number only.

SYSTEM POLICY:
{{policy}}

CONVERSATION:
{{conversation}}"#;

const INTENT_CLASSIFIER_PROMPT: &str = r#"You are a high-decisiveness routing classifier.

Classify the student request into ONE category. Prioritize "agentic" or "fast" and avoid "balance" unless the request is strictly medium-length with no clear lean.

- "agentic": complex logic, multi-step reasoning, derivations, or writing requiring depth.
- "fast": quick answers, basic facts, formatting tasks, or brief summaries.
- "balance": only if the request is an even mix that cannot be pushed into the other two.

Return JSON only:
{"intent": "agentic" | "fast" | "balance"}

Request:
{{request}}"#;

const QUIZ_ESTIMATE_PROMPT: &str = r#"Based on the tutoring conversation and student profile below, estimate a quiz configuration for this student.

Return JSON only:
{"level": "Fundamental" | "Intermediate" | "Advanced", "count": <integer 1-10>, "mcqRatio": <number 0-1>}

{{#if memory}}STUDENT PROFILE:
{{memory}}

{{/if}}CONVERSATION:
{{conversation}}"#;

const QUIZ_GENERATION_PROMPT: &str = r#"Generate a quiz for the student based on the conversation and profile below.

Difficulty: {{level}}. Exactly {{count}} questions: {{mcq_count}} multiple-choice and {{open_count}} open-ended. Write every question in {{language}}.

Return JSON only, in this exact shape:
{"questions": [{"id": "<unique id>", "type": "mcq" | "open", "question": "<text>", "options": ["..."], "correctAnswer": "<text>", "explanation": "<text>"}]}

Rules:
- Every mcq question has exactly 4 options, one of which equals correctAnswer verbatim.
- Open questions have no options; correctAnswer holds a model answer and explanation the grading rubric.

{{#if memory}}STUDENT PROFILE:
{{memory}}

{{/if}}CONVERSATION:
{{conversation}}"#;

const QUIZ_GRADING_PROMPT: &str = r#"Grade the student's free-text answer. Be encouraging but honest; partial understanding with the core idea present counts as correct. Write the feedback in {{language}}.

QUESTION:
{{question}}

REFERENCE ANSWER:
{{reference}}

STUDENT ANSWER:
{{answer}}

Return JSON only:
{"isCorrect": <true|false>, "feedback": "<one or two sentences>"}"#;

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    let pairs = [
        (Prompt::OraclePolicy, ORACLE_POLICY_PROMPT),
        (Prompt::TemperatureHelper, TEMPERATURE_HELPER_PROMPT),
        (Prompt::IntentClassifier, INTENT_CLASSIFIER_PROMPT),
        (Prompt::QuizEstimate, QUIZ_ESTIMATE_PROMPT),
        (Prompt::QuizGeneration, QUIZ_GENERATION_PROMPT),
        (Prompt::QuizGrading, QUIZ_GRADING_PROMPT),
    ];
    for (name, template) in pairs {
        registry
            .register_template_string(&name.to_string(), template)
            .expect("Failed to register template");
    }
    registry
}

static REGISTRY: LazyLock<Handlebars<'static>> = LazyLock::new(templates);

/// Render one of the registered prompts.
pub fn render(prompt: Prompt, data: &serde_json::Value) -> Result<String, OracleError> {
    REGISTRY
        .render(&prompt.to_string(), data)
        .map_err(|e| OracleError::MalformedResponse(format!("template render failed: {}", e)))
}

/// Build the system policy for a chat turn. The memory block is
/// embedded verbatim when present and omitted entirely when absent.
pub fn compose_system(memory: Option<&str>, language: Language) -> Result<String, OracleError> {
    let memory = memory.map(str::trim).filter(|m| !m.is_empty());
    render(
        Prompt::OraclePolicy,
        &json!({
            "language": language.directive(),
            "memory": memory,
        }),
    )
}

/// Flatten history into a plain-text transcript for the auxiliary
/// prompts (temperature helper, quiz estimation/generation).
pub fn render_conversation(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Student",
                Role::Assistant => "Oracle",
                Role::System => "System",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask a lightweight model to recommend a sampling temperature for
/// the composed prompt, system policy included. This call must never
/// block or fail the main request: any error, non-numeric reply, or
/// out-of-range value falls back to the default.
pub async fn recommend_temperature(
    client: &ProviderClient,
    model: &str,
    system: &str,
    history: &[Message],
    api_key: &str,
) -> f32 {
    let Ok(prompt) = render(
        Prompt::TemperatureHelper,
        &json!({
            "policy": system,
            "conversation": render_conversation(history),
        }),
    ) else {
        return DEFAULT_TEMPERATURE;
    };

    let request = CompletionRequest {
        model: model.to_string(),
        system_instruction: "You output a single decimal number.".to_string(),
        messages: vec![Message::new(Role::User, &prompt)],
        temperature: 0.1,
        json_response: false,
    };

    match client.completion(&request, api_key).await {
        Ok(text) => match text.trim().parse::<f32>() {
            Ok(t) if t > 0.0 && t <= 1.0 => t,
            _ => {
                tracing::debug!("Temperature helper returned unusable value: {}", text.trim());
                DEFAULT_TEMPERATURE
            }
        },
        Err(err) => {
            tracing::debug!("Temperature helper call failed: {}", err);
            DEFAULT_TEMPERATURE
        }
    }
}
