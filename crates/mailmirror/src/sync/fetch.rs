//! Mail fetcher: list message ids per label, then fetch each in full
//!
//! Listing failures are fatal. Detail failures are skipped and counted
//! unless every listed message fails.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};
use rayon::prelude::*;

use super::CancellationToken;
use crate::config::SyncSettings;
use crate::error::FetchError;
use crate::gmail::api::RawMessage;
use crate::gmail::{GmailClient, MailProvider, is_transient};
use crate::models::{AccessToken, LabelFilter, MessageId};

/// Base delay before retrying a transient detail failure
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Longest wait between two attempts on the same message
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Upper bound on `fetch_attempts` read from settings
const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Knobs for one fetch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: u32,
    pub max_messages_per_label: usize,
    pub concurrency: usize,
    pub attempts: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for FetchOptions {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            page_size: settings.page_size.clamp(1, GmailClient::MAX_PAGE_SIZE),
            max_messages_per_label: settings.max_messages_per_label,
            concurrency: settings.fetch_concurrency.max(1),
            attempts: settings.fetch_attempts.clamp(1, MAX_FETCH_ATTEMPTS),
        }
    }
}

/// What a fetch produced
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successfully fetched messages, in listing order
    pub messages: Vec<RawMessage>,
    /// Distinct ids listed across all labels
    pub listed: usize,
    /// Ids whose detail fetch failed
    pub failed: Vec<MessageId>,
}

/// List every label in `filter` and fetch each distinct message
///
/// `on_progress(done, total)` is called after each detail fetch.
pub fn list_and_fetch(
    provider: &dyn MailProvider,
    token: &AccessToken,
    filter: &LabelFilter,
    options: &FetchOptions,
    cancel: &CancellationToken,
    on_progress: &(dyn Fn(usize, usize) + Sync),
) -> Result<FetchOutcome, FetchError> {
    let ids = list_ids(provider, token, filter, options, cancel)?;

    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    if ids.is_empty() {
        return Ok(FetchOutcome::default());
    }

    let total = ids.len();
    let done = AtomicUsize::new(0);
    let fetch_one = |id: &MessageId| {
        let result = fetch_with_retry(provider, token, id, options.attempts);
        on_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        result
    };

    let results: Vec<Result<RawMessage>> = if options.concurrency <= 1 || total == 1 {
        ids.iter().map(fetch_one).collect()
    } else {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.concurrency)
            .build()
        {
            Ok(pool) => pool.install(|| ids.par_iter().map(fetch_one).collect()),
            Err(e) => {
                warn!("Failed to build fetch pool, fetching sequentially: {}", e);
                ids.iter().map(fetch_one).collect()
            }
        }
    };

    let mut outcome = FetchOutcome {
        listed: total,
        ..Default::default()
    };
    for (id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(message) => outcome.messages.push(message),
            Err(e) => {
                warn!("Failed to fetch message {}: {:#}", id.as_str(), e);
                outcome.failed.push(id);
            }
        }
    }

    if outcome.messages.is_empty() {
        return Err(FetchError::AllDetailsFailed { count: total });
    }

    Ok(outcome)
}

/// Page through each label, keeping ids unique across labels
fn list_ids(
    provider: &dyn MailProvider,
    token: &AccessToken,
    filter: &LabelFilter,
    options: &FetchOptions,
    cancel: &CancellationToken,
) -> Result<Vec<MessageId>, FetchError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let cap = options.max_messages_per_label;

    for label in filter.labels() {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut listed = 0usize;
        let mut page_token: Option<String> = None;

        while listed < cap {
            let want = u32::try_from(cap - listed)
                .unwrap_or(u32::MAX)
                .min(options.page_size);
            let page = provider
                .list_messages(token, label, want, page_token.as_deref())
                .map_err(|source| FetchError::List {
                    label: label.as_str().to_string(),
                    source,
                })?;

            for message_ref in page.messages.unwrap_or_default() {
                if listed >= cap {
                    break;
                }
                listed += 1;
                if seen.insert(message_ref.id.clone()) {
                    ids.push(MessageId::new(message_ref.id));
                }
            }

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!("Listed {} messages under {}", listed, label.as_str());
    }

    Ok(ids)
}

/// Fetch one message, retrying throttling and server errors with backoff
fn fetch_with_retry(
    provider: &dyn MailProvider,
    token: &AccessToken,
    id: &MessageId,
    attempts: u32,
) -> Result<RawMessage> {
    let mut attempt = 1;
    loop {
        match provider.get_message(token, id) {
            Ok(message) => return Ok(message),
            Err(e) if attempt < attempts && is_transient(&e) => {
                let delay = retry_delay(attempt);
                debug!(
                    "Transient failure fetching {} (attempt {}), retrying in {:?}",
                    id.as_str(),
                    attempt,
                    delay
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Exponential backoff after the given failed attempt, capped
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::api::{ListMessagesResponse, MessageHandle, MessageRef};
    use crate::models::LabelId;
    use anyhow::anyhow;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Pages of ids per label, plus ids whose detail fetch fails
    #[derive(Default)]
    struct PagedProvider {
        pages: HashMap<String, Vec<Vec<&'static str>>>,
        failing: HashSet<&'static str>,
        fail_listing: bool,
        list_calls: Mutex<Vec<(String, u32, Option<String>)>>,
        get_calls: AtomicUsize,
    }

    impl MailProvider for PagedProvider {
        fn list_messages(
            &self,
            _token: &AccessToken,
            label: &LabelId,
            page_size: u32,
            page_token: Option<&str>,
        ) -> Result<ListMessagesResponse> {
            self.list_calls.lock().unwrap().push((
                label.as_str().to_string(),
                page_size,
                page_token.map(str::to_string),
            ));
            if self.fail_listing {
                return Err(anyhow!("list exploded"));
            }
            let pages = self.pages.get(label.as_str()).cloned().unwrap_or_default();
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let ids = pages.get(index).cloned().unwrap_or_default();
            Ok(ListMessagesResponse {
                messages: Some(
                    ids.into_iter()
                        .map(|id| MessageRef {
                            id: id.to_string(),
                            thread_id: None,
                        })
                        .collect(),
                ),
                next_page_token: (index + 1 < pages.len()).then(|| (index + 1).to_string()),
                result_size_estimate: None,
            })
        }

        fn get_message(&self, _token: &AccessToken, id: &MessageId) -> Result<RawMessage> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(id.as_str()) {
                return Err(anyhow!("boom"));
            }
            Ok(RawMessage {
                id: id.0.clone(),
                ..Default::default()
            })
        }

        fn send_message(&self, _: &AccessToken, _: &str) -> Result<MessageHandle> {
            unreachable!()
        }

        fn modify_labels(
            &self,
            _: &AccessToken,
            _: &MessageId,
            _: &[&str],
            _: &[&str],
        ) -> Result<MessageHandle> {
            unreachable!()
        }

        fn trash_message(&self, _: &AccessToken, _: &MessageId) -> Result<MessageHandle> {
            unreachable!()
        }

        fn untrash_message(&self, _: &AccessToken, _: &MessageId) -> Result<MessageHandle> {
            unreachable!()
        }

        fn delete_message(&self, _: &AccessToken, _: &MessageId) -> Result<()> {
            unreachable!()
        }
    }

    fn run(
        provider: &PagedProvider,
        filter: &LabelFilter,
        options: &FetchOptions,
    ) -> Result<FetchOutcome, FetchError> {
        list_and_fetch(
            provider,
            &AccessToken::new("atok"),
            filter,
            options,
            &CancellationToken::new(),
            &|_, _| {},
        )
    }

    fn ids(outcome: &FetchOutcome) -> Vec<&str> {
        outcome.messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_follows_page_tokens() {
        let provider = PagedProvider {
            pages: HashMap::from([("INBOX".to_string(), vec![vec!["m1", "m2"], vec!["m3"]])]),
            ..Default::default()
        };
        let outcome = run(&provider, &LabelFilter::inbox(), &FetchOptions::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["m1", "m2", "m3"]);
        assert_eq!(outcome.listed, 3);

        let calls = provider.list_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].2.as_deref(), Some("1"));
    }

    #[test]
    fn test_per_label_cap_stops_paging() {
        let provider = PagedProvider {
            pages: HashMap::from([(
                "INBOX".to_string(),
                vec![vec!["m1", "m2"], vec!["m3", "m4"], vec!["m5"]],
            )]),
            ..Default::default()
        };
        let options = FetchOptions {
            max_messages_per_label: 3,
            page_size: 2,
            ..Default::default()
        };
        let outcome = run(&provider, &LabelFilter::inbox(), &options).unwrap();
        assert_eq!(ids(&outcome), vec!["m1", "m2", "m3"]);

        let calls = provider.list_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // Second page only asks for what is left under the cap
        assert_eq!(calls[1].1, 1);
    }

    #[test]
    fn test_overlapping_labels_fetch_once() {
        let provider = PagedProvider {
            pages: HashMap::from([
                ("INBOX".to_string(), vec![vec!["m1", "m2"]]),
                ("STARRED".to_string(), vec![vec!["m2", "m3"]]),
            ]),
            ..Default::default()
        };
        let filter = LabelFilter::new(["INBOX", "STARRED"]);
        let outcome = run(&provider, &filter, &FetchOptions::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["m1", "m2", "m3"]);
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_partial_failure_is_skipped() {
        let provider = PagedProvider {
            pages: HashMap::from([("INBOX".to_string(), vec![vec!["m1", "m2", "m3"]])]),
            failing: HashSet::from(["m2"]),
            ..Default::default()
        };
        let outcome = run(&provider, &LabelFilter::inbox(), &FetchOptions::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["m1", "m3"]);
        assert_eq!(outcome.failed, vec![MessageId::new("m2")]);
    }

    #[test]
    fn test_all_details_failing_is_fatal() {
        let provider = PagedProvider {
            pages: HashMap::from([("INBOX".to_string(), vec![vec!["m1", "m2"]])]),
            failing: HashSet::from(["m1", "m2"]),
            ..Default::default()
        };
        let err = run(&provider, &LabelFilter::inbox(), &FetchOptions::default()).unwrap_err();
        assert!(matches!(err, FetchError::AllDetailsFailed { count: 2 }));
    }

    #[test]
    fn test_empty_listing_is_empty_outcome() {
        let provider = PagedProvider::default();
        let outcome = run(&provider, &LabelFilter::inbox(), &FetchOptions::default()).unwrap();
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.listed, 0);
        assert_eq!(provider.get_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listing_failure_names_label() {
        let provider = PagedProvider {
            fail_listing: true,
            ..Default::default()
        };
        let err = run(&provider, &LabelFilter::inbox(), &FetchOptions::default()).unwrap_err();
        match err {
            FetchError::List { label, .. } => assert_eq!(label, "INBOX"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_before_listing() {
        let provider = PagedProvider::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = list_and_fetch(
            &provider,
            &AccessToken::new("atok"),
            &LabelFilter::inbox(),
            &FetchOptions::default(),
            &cancel,
            &|_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(provider.list_calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sequential_fetch_reports_progress() {
        let provider = PagedProvider {
            pages: HashMap::from([("INBOX".to_string(), vec![vec!["m1", "m2"]])]),
            ..Default::default()
        };
        let options = FetchOptions {
            concurrency: 1,
            ..Default::default()
        };
        let seen = Mutex::new(Vec::new());
        list_and_fetch(
            &provider,
            &AccessToken::new("atok"),
            &LabelFilter::inbox(),
            &options,
            &CancellationToken::new(),
            &|done, total| seen.lock().unwrap().push((done, total)),
        )
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_options_from_settings_clamp() {
        let settings = SyncSettings {
            page_size: 0,
            fetch_concurrency: 0,
            fetch_attempts: 0,
            ..Default::default()
        };
        let options = FetchOptions::from(&settings);
        assert_eq!(options.page_size, 1);
        assert_eq!(options.concurrency, 1);
        assert_eq!(options.attempts, 1);

        let settings = SyncSettings {
            fetch_attempts: 1000,
            ..Default::default()
        };
        assert_eq!(FetchOptions::from(&settings).attempts, MAX_FETCH_ATTEMPTS);
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        assert_eq!(retry_delay(1), Duration::from_millis(250));
        assert_eq!(retry_delay(2), Duration::from_millis(500));
        assert_eq!(retry_delay(4), Duration::from_secs(2));
        assert_eq!(retry_delay(6), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(33), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX), MAX_RETRY_DELAY);
    }
}
