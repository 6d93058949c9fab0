//! # metabot-store
//!
//! Per-chat persistence for Metabot.
//!
//! Every conversation owns one directory under the history root:
//!
//! ```text
//! history/
//! └── 123456789/
//!     ├── state.json     ChatRecord, rewritten on every state change
//!     └── messages.log   append-only conversation log
//! ```
//!
//! The store never interprets a record beyond (de)serializing it; the
//! engine decides what a record means.

pub mod chat_store;
pub mod error;
pub mod record;

// ── re-exports ───────────────────────────────────────────────────────

pub use chat_store::ChatStore;
pub use error::{StoreError, StoreResult};
pub use record::ChatRecord;
