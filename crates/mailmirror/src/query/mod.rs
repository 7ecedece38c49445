//! Query API for UI consumption
//!
//! Provides high-level query functions that return data formatted
//! for display in the UI.

mod messages;

pub use messages::{
    MessageQuery, MessageSummary, count_unread, get_message_detail, list_messages,
};
