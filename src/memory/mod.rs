//! Reconciling a model reply into the persistent student profile.
//! The model, not the client, decides memory content; the client only
//! performs two explicit appends (mastery tag, quiz summary) and
//! never replaces the profile with empty text.

use chrono::{DateTime, Utc};

use crate::normalize::OracleResponse;

const MASTERY_TAG_PREFIX: &str = "[TOPIC MASTERED";

/// Outcome of applying one reply to the stored profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub memory: String,
    /// True only when this turn newly tagged the topic; an already
    /// tagged topic counts as consumed and must not re-trigger the
    /// mastery celebration.
    pub mastery_achieved: bool,
}

pub fn mastery_tag(topic: &str, when: DateTime<Utc>) -> String {
    format!("{}: {} @ {}]", MASTERY_TAG_PREFIX, topic, when.format("%Y-%m-%d"))
}

/// Whether the profile already carries a mastery tag for this topic.
pub fn has_mastery_tag(memory: &str, topic: &str) -> bool {
    let needle = format!("{}: {}", MASTERY_TAG_PREFIX, topic);
    memory.lines().any(|line| line.trim_start().starts_with(&needle))
}

/// Drop repeated mastery tags for the same topic, keeping the first.
/// The reset rule for mastery flags is otherwise prompt-enforced;
/// this is the client-side hardening for the one failure mode that
/// visibly corrupts the profile (the model re-emitting a tag it was
/// told to treat as consumed).
pub fn reset_stale_tags(memory: &str) -> String {
    let mut seen: Vec<String> = Vec::new();
    let kept: Vec<&str> = memory
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            if !trimmed.starts_with(MASTERY_TAG_PREFIX) {
                return true;
            }
            let tag = trimmed.to_string();
            if seen.contains(&tag) {
                false
            } else {
                seen.push(tag);
                true
            }
        })
        .collect();
    kept.join("\n")
}

/// Append a quiz-run summary line to the profile.
pub fn append_quiz_summary(memory: &str, summary: &str) -> String {
    if memory.trim().is_empty() {
        summary.to_string()
    } else {
        format!("{}\n{}", memory.trim_end(), summary)
    }
}

/// Apply a validated reply to the current profile. The returned
/// memory replaces the stored one verbatim except for the two guard
/// rules: an empty model memory keeps the prior profile, and the
/// mastery tag is appended at most once per topic.
pub fn reconcile(
    current: Option<&str>,
    response: &OracleResponse,
    active_topic: &str,
    now: DateTime<Utc>,
) -> Reconciled {
    let incoming = response.memory.trim();
    let mut memory = if incoming.is_empty() {
        current.unwrap_or_default().to_string()
    } else {
        reset_stale_tags(&response.memory)
    };

    let mut mastery_achieved = false;
    if response.session_for_topic_done {
        if has_mastery_tag(&memory, active_topic) {
            // Already consumed for this topic.
            tracing::debug!("Mastery flag for `{}` already consumed", active_topic);
        } else {
            let tag = mastery_tag(active_topic, now);
            memory = if memory.trim().is_empty() {
                tag
            } else {
                format!("{}\n{}", memory.trim_end(), tag)
            };
            mastery_achieved = true;
        }
    }

    Reconciled {
        memory,
        mastery_achieved,
    }
}
