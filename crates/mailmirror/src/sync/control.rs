//! Cancellation and per-mailbox exclusion for syncs

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Cooperative cancellation flag shared between a caller and a running sync
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether both handles share one flag
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Set of mailboxes with a sync in flight
#[derive(Debug, Default)]
pub struct MailboxLocks {
    active: Mutex<HashSet<String>>,
}

impl MailboxLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `email` for a sync; `None` if another sync holds it
    ///
    /// The claim is released when the returned guard drops.
    pub fn try_acquire(&self, email: &str) -> Option<MailboxGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(email.to_string()) {
            return None;
        }
        Some(MailboxGuard {
            locks: self,
            email: email.to_string(),
        })
    }

    pub fn is_locked(&self, email: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(email)
    }
}

/// Releases its mailbox on drop
#[derive(Debug)]
pub struct MailboxGuard<'a> {
    locks: &'a MailboxLocks,
    email: String,
}

impl MailboxGuard<'_> {
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Drop for MailboxGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.locks.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.email);
    }
}
