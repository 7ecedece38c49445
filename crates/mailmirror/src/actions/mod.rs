//! Mailbox mutations
//!
//! Provides the action handler for trash, restore, permanent delete and
//! send, each applied remotely first and then mirrored locally.

mod handler;

pub use handler::{Ack, ActionHandler, MailAction};
