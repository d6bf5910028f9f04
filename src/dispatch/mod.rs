//! The fallback machinery shared by the chat and quiz pipelines: try
//! an ordered list of models, advance on transient faults, abort on
//! fatal ones. Fallback implies an ordering preference, so models are
//! tried sequentially, never raced against each other; the one
//! exception is `race_with_timeout`, kept for the historical
//! race-among-equal-providers pattern.

use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use futures::future::{BoxFuture, select_ok};

use crate::error::OracleError;

/// Ceiling for the provider race.
const RACE_TIMEOUT: Duration = Duration::from_secs(50);

/// Result of a successful fallback run: which model answered, and
/// what it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess<T> {
    pub model: String,
    pub value: T,
}

/// Try each model in order until one succeeds. The per-model `call`
/// owns the whole attempt (provider call plus normalization), so a
/// malformed reply surfaces here as `MalformedResponse` and advances
/// the chain like any other transient fault. Fatal errors (invalid
/// key, invalid credential) abort immediately without trying further
/// models. Exhausting the chain yields `AllModelsFailed` carrying the
/// last observed error.
pub async fn attempt_with_fallback<'a, T, F>(
    models: &[String],
    mut call: F,
) -> Result<FallbackSuccess<T>, OracleError>
where
    F: FnMut(String) -> BoxFuture<'a, Result<T, OracleError>>,
{
    let mut last_error = OracleError::Unavailable("no models configured".to_string());

    for model in models {
        match call(model.clone()).await {
            Ok(value) => {
                return Ok(FallbackSuccess {
                    model: model.clone(),
                    value,
                });
            }
            Err(err) if err.is_fatal() => {
                tracing::debug!("Model {} failed fatally: {}", model, err);
                return Err(err);
            }
            Err(err) => {
                tracing::debug!("Model {} failed, advancing chain: {}", model, err);
                last_error = err;
            }
        }
    }

    Err(OracleError::AllModelsFailed(Box::new(last_error)))
}

/// Race equally-acceptable attempts and resolve with the first
/// success, discarding the losers' results. No cancellation signal is
/// sent to losers beyond the race future being dropped, so callers
/// must tolerate resource use by abandoned attempts. Errors from
/// individual tasks are ignored unless every task fails or the
/// ceiling elapses.
pub async fn race_with_timeout<T>(
    tasks: Vec<BoxFuture<'static, Result<T, OracleError>>>,
) -> Result<T, OracleError> {
    if tasks.is_empty() {
        return Err(OracleError::Unavailable("nothing to race".to_string()));
    }
    match tokio::time::timeout(RACE_TIMEOUT, select_ok(tasks)).await {
        Ok(Ok((value, _losers))) => Ok(value),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(OracleError::Unavailable("race timeout".to_string())),
    }
}

/// The free-tier pool gets hammered between 12:30 and 16:30 UTC.
pub fn is_rush_hour_utc(now: DateTime<Utc>) -> bool {
    let total_minutes = now.hour() * 60 + now.minute();
    let start = 12 * 60 + 30;
    let end = 16 * 60 + 30;
    total_minutes >= start && total_minutes <= end
}

/// During rush hours, promote the OpenRouter-hosted free models to
/// the front of the chain to spare the shared key pool.
pub fn reorder_for_rush_hour(models: &[String], now: DateTime<Utc>) -> Vec<String> {
    if !is_rush_hour_utc(now) {
        return models.to_vec();
    }
    let (free, paid): (Vec<_>, Vec<_>) = models
        .iter()
        .cloned()
        .partition(|m| m.ends_with(":free"));
    free.into_iter().chain(paid).collect()
}
