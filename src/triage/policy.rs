//! Auto-respond policy — decides whether a contact message gets an
//! automated answer.

use crate::relay::directive::UserStatus;

/// Decision table for auto-responding to a non-command contact message.
///
/// Urgent messages are always routed to the primary user, never
/// auto-answered. "Available" means the user will respond personally;
/// every other status delegates to automation unless the contact has
/// opted out (the opt-out overrides status).
pub fn should_auto_respond(status: UserStatus, is_urgent: bool, contact_allows: bool) -> bool {
    if is_urgent {
        return false;
    }
    if !contact_allows {
        return false;
    }
    match status {
        UserStatus::Available => false,
        UserStatus::Busy | UserStatus::Away | UserStatus::Sleep | UserStatus::Dnd => true,
    }
}
