//! Inbound triage — urgency detection, command parsing, auto-respond policy.

pub mod command;
pub mod policy;
pub mod urgency;

pub use command::{ParsedInput, RelayCommand, parse_command};
pub use policy::should_auto_respond;
pub use urgency::is_urgent;
