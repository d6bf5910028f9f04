//! Error taxonomy for the oracle client and the provider fault
//! classifier. Classification must never panic: provider errors show
//! up as plain strings, JSON-encoded strings, or structured objects
//! depending on which backend produced them, and all three shapes are
//! handled here.

use serde_json::Value;
use thiserror::Error;

use crate::prompt::Language;

#[derive(Debug, Error)]
pub enum OracleError {
    /// Malformed or missing encrypted key payload. Fatal; the user
    /// needs to re-authenticate.
    #[error("invalid or missing encrypted key payload")]
    InvalidCredential,

    /// The provider rejected the key as expired or malformed. Fatal
    /// and distinct from fallback exhaustion so the UI can direct the
    /// user to key management.
    #[error("provider rejected the API key: {0}")]
    InvalidApiKey(String),

    /// Transient rate limit; drives fallback to the next model.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transient service fault (503, overloaded); drives fallback.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The normalizer could not extract or validate a JSON reply.
    /// Treated like a transient provider fault since it is usually a
    /// one-off generation glitch.
    #[error("could not extract a valid structured reply: {0}")]
    MalformedResponse(String),

    /// Local free-tier policy ceiling; raised before any network call.
    #[error("session quota exhausted")]
    QuotaExceeded,

    /// File-context extraction failed. The send proceeds without the
    /// file context; this only surfaces from the extractor seam.
    #[error("failed to read file context: {0}")]
    ExtractionFailure(String),

    /// Every model in the chain failed; carries the last observed
    /// error for diagnostics.
    #[error("all models in the fallback chain failed: {0}")]
    AllModelsFailed(#[source] Box<OracleError>),

    /// Network-level transport fault, classified as transient.
    #[error("transport error: {0}")]
    Transport(String),

    /// The tutoring policy has no translation for this language.
    /// Failing fast avoids leaking the English policy into sessions
    /// configured for another language.
    #[error("unsupported language `{0}`")]
    UnsupportedLanguage(String),
}

impl OracleError {
    /// Fatal errors abort the fallback chain immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OracleError::InvalidCredential
                | OracleError::InvalidApiKey(_)
                | OracleError::QuotaExceeded
        )
    }

    /// Curated, localized message for the UI. Raw provider text never
    /// crosses this boundary.
    pub fn user_message(&self, lang: Language) -> &'static str {
        use Language::*;
        match self {
            OracleError::InvalidCredential => match lang {
                En => "Your session credentials are invalid. Please sign in again.",
                Fr => "Vos identifiants de session sont invalides. Veuillez vous reconnecter.",
                Es => "Sus credenciales de sesión no son válidas. Inicie sesión de nuevo.",
                Vi => "Thông tin đăng nhập không hợp lệ. Vui lòng đăng nhập lại.",
            },
            OracleError::InvalidApiKey(_) => match lang {
                En => "Your API key was rejected. Please check it in key management.",
                Fr => "Votre clé API a été refusée. Vérifiez-la dans la gestion des clés.",
                Es => "Su clave API fue rechazada. Revísela en la gestión de claves.",
                Vi => "Khóa API của bạn bị từ chối. Vui lòng kiểm tra lại khóa.",
            },
            OracleError::QuotaExceeded => match lang {
                En => "You've reached the free session limit. Sign in to continue.",
                Fr => "Vous avez atteint la limite de session gratuite. Connectez-vous pour continuer.",
                Es => "Ha alcanzado el límite de la sesión gratuita. Inicie sesión para continuar.",
                Vi => "Bạn đã đạt giới hạn phiên miễn phí. Đăng nhập để tiếp tục.",
            },
            OracleError::ExtractionFailure(_) => match lang {
                En => "The Oracle couldn't read your file, so it was skipped.",
                Fr => "L'Oracle n'a pas pu lire votre fichier, il a donc été ignoré.",
                Es => "El Oráculo no pudo leer su archivo, así que se omitió.",
                Vi => "Oracle không đọc được tệp của bạn nên tệp đã bị bỏ qua.",
            },
            // Everything else is a transient fault surfaced only after
            // the whole chain is exhausted.
            _ => match lang {
                En => "The Oracle is overloaded right now. Please try again in a moment.",
                Fr => "L'Oracle est surchargé pour le moment. Veuillez réessayer dans un instant.",
                Es => "El Oráculo está sobrecargado en este momento. Inténtelo de nuevo en un momento.",
                Vi => "Oracle hiện đang quá tải. Vui lòng thử lại sau giây lát.",
            },
        }
    }
}

/// Classification of a raw provider fault, used by the dispatcher to
/// decide between advancing the chain and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    RateLimited,
    Unavailable,
    InvalidApiKey,
    Other,
}

/// Classify a raw provider error. Accepts a plain string, a
/// JSON-encoded string, or a structured object with nested
/// `error.code` / `error.status` / `error.message` fields. Pure and
/// total: malformed input classifies as `Other`, it never raises.
pub fn classify(raw: &str) -> FaultKind {
    // Structured object first, then a JSON-encoded string wrapping
    // one, then plain substring markers.
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        match value {
            Value::Object(_) => {
                if let Some(kind) = classify_object(&value) {
                    return kind;
                }
            }
            Value::String(inner) => return classify(&inner),
            _ => {}
        }
    }
    classify_markers(raw)
}

fn classify_object(value: &Value) -> Option<FaultKind> {
    let error = value.get("error")?;
    let code = error.get("code").and_then(|c| c.as_u64());
    let status = error
        .get("status")
        .and_then(|s| s.as_str())
        .unwrap_or_default();
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default();

    match code {
        Some(429) => return Some(FaultKind::RateLimited),
        Some(503) => return Some(FaultKind::Unavailable),
        Some(400) => {
            let m = message.to_lowercase();
            if m.contains("api key") && (m.contains("invalid") || m.contains("expired")) {
                return Some(FaultKind::InvalidApiKey);
            }
        }
        _ => {}
    }
    match status {
        "RESOURCE_EXHAUSTED" => Some(FaultKind::RateLimited),
        "UNAVAILABLE" => Some(FaultKind::Unavailable),
        "INVALID_ARGUMENT" if message.to_lowercase().contains("api key") => {
            Some(FaultKind::InvalidApiKey)
        }
        _ => Some(classify_markers(message)),
    }
}

fn classify_markers(text: &str) -> FaultKind {
    let t = text.to_lowercase();
    if t.contains("api key not valid")
        || t.contains("api key expired")
        || (t.contains("api key") && (t.contains("invalid") || t.contains("expired")))
    {
        return FaultKind::InvalidApiKey;
    }
    if t.contains("429")
        || t.contains("rate limit")
        || t.contains("rate-limit")
        || t.contains("resource_exhausted")
        || t.contains("quota exceeded")
    {
        return FaultKind::RateLimited;
    }
    if t.contains("503") || t.contains("overloaded") || t.contains("unavailable") {
        return FaultKind::Unavailable;
    }
    FaultKind::Other
}

/// Lift a classified raw fault into the matching error variant.
pub fn fault_to_error(raw: &str) -> OracleError {
    match classify(raw) {
        FaultKind::InvalidApiKey => OracleError::InvalidApiKey(raw.to_string()),
        FaultKind::RateLimited => OracleError::RateLimited(raw.to_string()),
        FaultKind::Unavailable => OracleError::Unavailable(raw.to_string()),
        FaultKind::Other => OracleError::Unavailable(raw.to_string()),
    }
}
