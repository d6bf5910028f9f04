//! Client core for the Academic Oracle, a Socratic tutoring chat on
//! top of hosted LLM APIs. The host UI drives `chat::OracleSession`;
//! everything else (fallback dispatch, response normalization, memory
//! reconciliation, the quiz pipeline) hangs off that session.

pub mod chat;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod intent;
pub mod keys;
pub mod memory;
pub mod normalize;
pub mod prompt;
pub mod provider;
pub mod quiz;
pub mod quota;
pub mod store;

pub use chat::{OracleSession, SendOutcome};
pub use core::OracleConfig;
pub use error::OracleError;
pub use keys::{Credential, EncryptedKeyPayload};
pub use normalize::OracleResponse;
pub use prompt::Language;
