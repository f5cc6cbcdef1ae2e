//! Relay core — directive state, draft lifecycle, dispatch, digests.

pub mod digest;
pub mod directive;
pub mod dispatcher;
pub mod draft;

pub use digest::build_digest;
pub use directive::{DirectiveStore, RelayDirective, SendPolicy, StyleProfile, UserStatus};
pub use dispatcher::RelayDispatcher;
pub use draft::{DraftAction, DraftEngine, DraftOutcome, PendingDraft};
