//! The per-conversation session context. One `OracleSession` owns the
//! visible message list, the trimmed history projection, the student
//! profile memory, and the quota counters; there is no process-wide
//! chat singleton. All shared state is single-writer within one
//! event tick, so the pipeline runs on plain `&mut self`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::OracleConfig;
use crate::dispatch::{attempt_with_fallback, reorder_for_rush_hour};
use crate::error::OracleError;
use crate::files::{AttachmentMeta, TextExtractor, extract_file_context, file_context_block};
use crate::intent::{ChatIntent, classify_intent};
use crate::keys::{Credential, CryptoClient, KeyPool, resolve_key};
use crate::memory::reconcile;
use crate::normalize::parse_oracle_response;
use crate::prompt::{Language, compose_system, recommend_temperature};
use crate::provider::{CompletionRequest, Message, ProviderClient, Role};
use crate::quota::SessionQuota;
use crate::store::{KEY_HISTORY, KEY_MEMORY, KEY_MESSAGES, KEY_QUOTA, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

/// A message as rendered in the UI. Append-only; attachment metadata
/// is display-only and never sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentMeta>,
}

/// The token-budget-trimmed projection sent to the model. Distinct
/// from `ChatMessage`: no attachment metadata, but file-extracted
/// text is injected here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistoryItem {
    pub role: ChatRole,
    pub content: String,
}

/// Strict FIFO cap. Not content-aware: bounded request size beats
/// context richness here.
pub fn trim_history(history: &mut Vec<ChatHistoryItem>, window: usize) {
    if history.len() > window {
        history.drain(..history.len() - window);
    }
}

/// What a successful send hands back to the UI.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub answer: String,
    pub model: String,
    /// True when this turn newly tagged the active topic as mastered;
    /// the celebration popup keys off the delayed timer, not this.
    pub mastery_achieved: bool,
}

/// Single-shot delayed flag for the mastery celebration popup,
/// cancelled if the user navigates away before it fires. Cooperative
/// cancellation only; nothing else in the pipeline is cancellable.
#[derive(Debug, Default)]
pub struct MasteryPopupTimer {
    handle: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl MasteryPopupTimer {
    pub fn schedule(&mut self, delay: Duration) {
        self.cancel();
        let fired = Arc::new(AtomicBool::new(false));
        self.fired = Arc::clone(&fired);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fired.store(true, Ordering::SeqCst);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.fired.store(false, Ordering::SeqCst);
    }

    /// Consume the fired flag. True at most once per schedule.
    pub fn take_fired(&mut self) -> bool {
        self.fired.swap(false, Ordering::SeqCst)
    }
}

pub struct OracleSession {
    pub id: String,
    config: OracleConfig,
    client: ProviderClient,
    crypto: CryptoClient,
    credential: Credential,
    key_pool: KeyPool,
    language: Language,
    active_topic: String,
    pub store: SessionStore,
    messages: Vec<ChatMessage>,
    history: Vec<ChatHistoryItem>,
    memory: Option<String>,
    quota: SessionQuota,
    in_flight: bool,
    pub mastery_timer: MasteryPopupTimer,
}

impl OracleSession {
    pub fn new(config: OracleConfig, credential: Credential, language: Language) -> Self {
        let client = ProviderClient::new(&config.api_hostname);
        let crypto = CryptoClient::new(&config.crypto_endpoint);
        let key_pool = KeyPool::from_env_value(&config.free_keys);
        let store = SessionStore::new();
        Self {
            id: Uuid::new_v4().to_string(),
            config,
            client,
            crypto,
            credential,
            key_pool,
            language,
            active_topic: "the current topic".to_string(),
            messages: Vec::new(),
            history: Vec::new(),
            memory: None,
            quota: store.get(KEY_QUOTA).unwrap_or_default(),
            store,
            in_flight: false,
            mastery_timer: MasteryPopupTimer::default(),
        }
    }

    /// Rehydrate a session from an existing store (page reload).
    pub fn resume(config: OracleConfig, credential: Credential, language: Language, store: SessionStore) -> Self {
        let mut session = Self::new(config, credential, language);
        session.messages = store.get(KEY_MESSAGES).unwrap_or_default();
        session.history = store.get(KEY_HISTORY).unwrap_or_default();
        session.memory = store.get(KEY_MEMORY);
        session.quota = store.get(KEY_QUOTA).unwrap_or_default();
        session.store = store;
        session
    }

    pub fn set_active_topic(&mut self, topic: &str) {
        self.active_topic = topic.to_string();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn history(&self) -> &[ChatHistoryItem] {
        &self.history
    }

    pub fn memory(&self) -> Option<&str> {
        self.memory.as_deref()
    }

    pub fn quota(&self) -> &SessionQuota {
        &self.quota
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// History as provider messages, for the auxiliary prompts.
    pub fn provider_history(&self) -> Vec<Message> {
        self.history
            .iter()
            .map(|item| {
                let role = match item.role {
                    ChatRole::User => Role::User,
                    ChatRole::Model => Role::Assistant,
                };
                Message::new(role, &item.content)
            })
            .collect()
    }

    /// Append a quiz-run summary to the profile memory (the second of
    /// the two permitted local appends).
    pub fn add_quiz_summary_to_memory(&mut self, summary: &str) {
        let updated = crate::memory::append_quiz_summary(self.memory.as_deref().unwrap_or(""), summary);
        self.memory = Some(updated);
        self.persist();
    }

    /// The user navigated away from the chat view: cancel the pending
    /// mastery popup.
    pub fn navigate_away(&mut self) {
        self.mastery_timer.cancel();
    }

    /// Explicit logout/reset confirmation: the only path that clears
    /// memory and counters.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.history.clear();
        self.memory = None;
        self.quota = SessionQuota::new();
        self.mastery_timer.cancel();
        self.store.clear();
    }

    /// Send one user message through the full pipeline: quota gate,
    /// file context, compose, dispatch across the fallback chain,
    /// normalize, reconcile, persist.
    pub async fn send_message(
        &mut self,
        text: &str,
        attachment: Option<(&str, &[u8], &str)>,
        extractor: Option<&dyn TextExtractor>,
    ) -> Result<SendOutcome, OracleError> {
        // The UI disables send while a request is outstanding; this
        // guard backs that up for non-UI callers.
        if self.in_flight {
            return Err(OracleError::Unavailable(
                "a request is already in flight for this conversation".to_string(),
            ));
        }
        self.in_flight = true;
        let result = self.send_inner(text, attachment, extractor).await;
        self.in_flight = false;
        result
    }

    async fn send_inner(
        &mut self,
        text: &str,
        attachment: Option<(&str, &[u8], &str)>,
        extractor: Option<&dyn TextExtractor>,
    ) -> Result<SendOutcome, OracleError> {
        // Local quota policy short-circuits before any network call.
        if matches!(self.credential, Credential::Free) && self.quota.is_out_of_quota() {
            return Err(OracleError::QuotaExceeded);
        }

        // File context is best-effort: a failed extraction drops the
        // context but never aborts the message.
        let mut history_content = text.to_string();
        let mut attachment_meta = None;
        if let Some((name, bytes, mime_type)) = attachment {
            attachment_meta = Some(AttachmentMeta {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                size_bytes: bytes.len() as u64,
            });
            if let Some(extractor) = extractor {
                match extract_file_context(extractor, name, bytes).await {
                    Ok(extracted) => {
                        history_content =
                            format!("{}\n\n{}", file_context_block(name, &extracted), text);
                    }
                    Err(err) => {
                        tracing::warn!("Proceeding without file context: {}", err);
                    }
                }
            }
        }

        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: text.to_string(),
            attachment: attachment_meta,
        });
        self.history.push(ChatHistoryItem {
            role: ChatRole::User,
            content: history_content,
        });
        // Trimming happens before dispatch, independent of
        // reconciliation.
        trim_history(&mut self.history, self.config.history_window);
        self.persist();

        // One plaintext key per user-initiated request, dropped when
        // this frame returns.
        let api_key = resolve_key(&self.credential, &self.crypto, &mut self.key_pool).await?;

        let system_instruction = compose_system(self.memory.as_deref(), self.language)?;
        let provider_history = self.provider_history();
        let temperature = recommend_temperature(
            &self.client,
            &self.config.helper_model,
            &system_instruction,
            &provider_history,
            &api_key,
        )
        .await;
        let intent =
            classify_intent(&self.client, &self.config.helper_model, text, &api_key).await;

        let chain = match intent {
            ChatIntent::Agentic => &self.config.agentic_models,
            ChatIntent::Fast => &self.config.fast_models,
            ChatIntent::Balance => &self.config.chat_models,
        };
        let chain = if matches!(self.credential, Credential::Free) {
            reorder_for_rush_hour(chain, Utc::now())
        } else {
            chain.clone()
        };

        let client = &self.client;
        let request_template = CompletionRequest {
            model: String::new(),
            system_instruction,
            messages: provider_history,
            temperature,
            json_response: true,
        };

        let success = attempt_with_fallback(&chain, |model| {
            let mut request = request_template.clone();
            request.model = model;
            let api_key = api_key.clone();
            async move {
                let raw = client.completion(&request, &api_key).await?;
                parse_oracle_response(&raw)
            }
            .boxed()
        })
        .await?;

        if matches!(self.credential, Credential::Free) {
            self.quota.record(&self.id);
        }

        let reconciled = reconcile(
            self.memory.as_deref(),
            &success.value,
            &self.active_topic,
            Utc::now(),
        );
        self.memory = Some(reconciled.memory);
        if reconciled.mastery_achieved {
            self.mastery_timer.schedule(Duration::from_millis(1200));
        }

        self.messages.push(ChatMessage {
            role: ChatRole::Model,
            content: success.value.answer.clone(),
            attachment: None,
        });
        self.history.push(ChatHistoryItem {
            role: ChatRole::Model,
            content: success.value.answer.clone(),
        });
        trim_history(&mut self.history, self.config.history_window);
        self.persist();

        Ok(SendOutcome {
            answer: success.value.answer,
            model: success.model,
            mastery_achieved: reconciled.mastery_achieved,
        })
    }

    fn persist(&mut self) {
        let results = [
            self.store.put(KEY_MESSAGES, &self.messages),
            self.store.put(KEY_HISTORY, &self.history),
            self.store.put(KEY_QUOTA, &self.quota),
        ];
        for result in results {
            if let Err(err) = result {
                tracing::warn!("Failed to persist session state: {}", err);
            }
        }
        if let Some(memory) = &self.memory {
            if let Err(err) = self.store.put(KEY_MEMORY, memory) {
                tracing::warn!("Failed to persist memory: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(role: ChatRole, content: &str) -> ChatHistoryItem {
        ChatHistoryItem {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_trim_is_noop_under_window() {
        let mut history: Vec<ChatHistoryItem> =
            (0..5).map(|i| item(ChatRole::User, &format!("m{}", i))).collect();
        let before = history.clone();
        trim_history(&mut history, 10);
        assert_eq!(history, before);
    }

    #[test]
    fn test_trim_keeps_most_recent_in_order() {
        let mut history: Vec<ChatHistoryItem> =
            (0..14).map(|i| item(ChatRole::User, &format!("m{}", i))).collect();
        trim_history(&mut history, 10);
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].content, "m4");
        assert_eq!(history[9].content, "m13");

        // Idempotent at exactly the window size.
        let before = history.clone();
        trim_history(&mut history, 10);
        assert_eq!(history, before);
    }

    #[tokio::test]
    async fn test_mastery_timer_fires_after_delay() {
        let mut timer = MasteryPopupTimer::default();
        timer.schedule(Duration::from_millis(10));
        assert!(!timer.take_fired());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(timer.take_fired());
        // Single-shot: consumed.
        assert!(!timer.take_fired());
    }

    #[tokio::test]
    async fn test_mastery_timer_cancelled_on_navigation() {
        let mut timer = MasteryPopupTimer::default();
        timer.schedule(Duration::from_millis(10));
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!timer.take_fired());
    }

    #[test]
    fn test_reset_clears_everything() {
        let config = OracleConfig::default();
        let mut session = OracleSession::new(config, Credential::Free, Language::En);
        session.memory = Some("profile".to_string());
        session.quota.record(&session.id.clone());
        session.reset();
        assert!(session.memory().is_none());
        assert_eq!(session.quota().used, 0);
        assert!(session.store.get_raw(KEY_MEMORY).is_none());
    }

    #[test]
    fn test_resume_rehydrates_state() {
        let config = OracleConfig::default();
        let mut store = SessionStore::new();
        store
            .put(KEY_HISTORY, &vec![item(ChatRole::User, "hello")])
            .unwrap();
        store.put(KEY_MEMORY, &"Name: Alex".to_string()).unwrap();

        let session = OracleSession::resume(config, Credential::Free, Language::En, store);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.memory(), Some("Name: Alex"));
    }
}
