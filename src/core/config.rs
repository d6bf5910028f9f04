use std::env;

/// Environment-driven configuration for the oracle client. Every
/// value has a code default so a bare test environment still
/// constructs; deployments override through `ORACLE_*` variables.
#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// OpenAI-compatible gateway serving every model tier.
    pub api_hostname: String,
    /// Remote key-encryption function endpoint.
    pub crypto_endpoint: String,
    /// Comma-separated rotating pool of free-tier keys.
    pub free_keys: String,
    /// Fallback chain for balanced requests.
    pub chat_models: Vec<String>,
    /// Fallback chain for deep, multi-step requests.
    pub agentic_models: Vec<String>,
    /// Fallback chain for quick requests.
    pub fast_models: Vec<String>,
    /// Lite tier used by the quiz pipeline.
    pub quiz_model: String,
    /// Even lighter model the quiz grader falls back to.
    pub quiz_fallback_model: String,
    /// Lite tier used by the temperature helper and intent classifier.
    pub helper_model: String,
    /// FIFO cap on the history projection sent to the model.
    pub history_window: usize,
}

fn env_models(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_else(|_| default.iter().map(|m| m.to_string()).collect())
}

impl Default for OracleConfig {
    fn default() -> Self {
        let api_hostname = env::var("ORACLE_API_HOSTNAME")
            .unwrap_or_else(|_| "https://openrouter.ai/api".to_string());
        let crypto_endpoint = env::var("ORACLE_CRYPTO_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:54321/functions/v1/encrypt-api-key".to_string());
        let free_keys = env::var("ORACLE_FREE_KEYS").unwrap_or_default();
        let chat_models = env_models(
            "ORACLE_CHAT_MODELS",
            &[
                "gemini-3-flash-preview",
                "gemini-2.5-flash",
                "stepfun/step-3.5-flash:free",
            ],
        );
        let agentic_models = env_models(
            "ORACLE_AGENTIC_MODELS",
            &[
                "gemini-3-pro-preview",
                "gemini-3-flash-preview",
                "stepfun/step-3.5-flash:free",
            ],
        );
        let fast_models = env_models(
            "ORACLE_FAST_MODELS",
            &["gemini-2.5-flash-lite", "stepfun/step-3.5-flash:free"],
        );
        let quiz_model =
            env::var("ORACLE_QUIZ_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string());
        let quiz_fallback_model = env::var("ORACLE_QUIZ_FALLBACK_MODEL")
            .unwrap_or_else(|_| "gemini-2.0-flash-lite".to_string());
        let helper_model =
            env::var("ORACLE_HELPER_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-lite".to_string());

        Self {
            api_hostname,
            crypto_endpoint,
            free_keys,
            chat_models,
            agentic_models,
            fast_models,
            quiz_model,
            quiz_fallback_model,
            helper_model,
            history_window: 10,
        }
    }
}
