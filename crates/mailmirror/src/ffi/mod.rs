//! FFI bindings for UniFFI export
//!
//! This module provides Swift/Kotlin bindings for the mailmirror crate via UniFFI.
//!
//! ## Usage from Swift
//!
//! ```swift
//! import MailMirrorFFI
//!
//! // Initialize logging first
//! initializeLogging(callback: myLogCallback, maxLevel: .info)
//!
//! let mirror = try MailMirror(
//!     dbPath: "/path/to/mail.db",
//!     clientId: clientId,
//!     clientSecret: clientSecret
//! )
//!
//! // After the OAuth consent
//! try mirror.saveCredential(
//!     userId: "alice",
//!     email: "alice@example.com",
//!     accessToken: accessToken,
//!     refreshToken: refreshToken
//! )
//!
//! let stats = try mirror.syncMailbox(userId: "alice", labels: ["INBOX"], callback: progress)
//! let inbox = try mirror.listMessages(
//!     userId: "alice", label: "INBOX", search: nil, limit: 50, offset: 0
//! )
//! ```

mod logging;
mod service;
mod types;

// Re-export all FFI types and the MailMirror object
pub use logging::{init_ffi_logger, initialize_logging, set_log_callback, set_log_level};
pub use service::*;
pub use types::*;
