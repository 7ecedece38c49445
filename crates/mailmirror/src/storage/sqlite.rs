//! SQLite-based mail storage with zstd-compressed message bodies

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rusqlite::types::Value;
use rusqlite_migration::{M, Migrations};

use super::traits::{CredentialStore, MessageStore};
use crate::models::{AccessToken, LabelSet, MailboxCredential, MessageId, MessageRecord};
use crate::query::MessageQuery;

/// zstd level for bodies (fast, decent ratio)
const BODY_COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One credential per user; email is the sync key
            CREATE TABLE mailbox_credentials (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                access_token TEXT,
                refresh_token TEXT,
                updated_at TEXT NOT NULL
            );

            -- Mirrored messages, unique per (id, owner_email)
            CREATE TABLE messages (
                id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                snippet TEXT NOT NULL,
                body BLOB NOT NULL,  -- zstd compressed
                created_at TEXT NOT NULL,
                PRIMARY KEY (id, owner_email)
            );

            CREATE INDEX idx_messages_owner_created
                ON messages(owner_email, created_at DESC);

            -- Labels on messages (many-to-many)
            CREATE TABLE message_labels (
                message_id TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                label_id TEXT NOT NULL,
                PRIMARY KEY (message_id, owner_email, label_id),
                FOREIGN KEY (message_id, owner_email)
                    REFERENCES messages(id, owner_email) ON DELETE CASCADE
            );

            CREATE INDEX idx_message_labels_label ON message_labels(owner_email, label_id);
            "#,
        ),
    ])
}

/// Fixed-width timestamps so text ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {s}"))?
        .with_timezone(&Utc))
}

/// Escape LIKE wildcards so user search text matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// SQLite-based mail storage
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL keeps readers unblocked during sync writes; foreign_keys is
        // required for label rows to cascade with their message.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Load labels for a message
    fn load_labels(conn: &Connection, owner_email: &str, message_id: &str) -> Result<LabelSet> {
        let mut stmt = conn.prepare_cached(
            "SELECT label_id FROM message_labels WHERE owner_email = ? AND message_id = ?",
        )?;

        let labels = stmt
            .query_map(params![owner_email, message_id], |row| row.get(0))?
            .collect::<Result<LabelSet, _>>()?;

        Ok(labels)
    }

    /// Replace the label rows for a message
    fn save_labels(
        conn: &Connection,
        owner_email: &str,
        message_id: &str,
        labels: &LabelSet,
    ) -> Result<()> {
        conn.execute(
            "DELETE FROM message_labels WHERE owner_email = ? AND message_id = ?",
            params![owner_email, message_id],
        )?;

        let mut stmt = conn.prepare_cached(
            "INSERT INTO message_labels (message_id, owner_email, label_id) VALUES (?, ?, ?)",
        )?;
        for label in labels {
            stmt.execute(params![message_id, owner_email, label])?;
        }

        Ok(())
    }

    /// Build full records from `(id, owner, subject, sender, snippet, body, created_at)` rows
    fn load_records(
        conn: &Connection,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<MessageRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, owner_email, subject, sender, snippet, body, created_at) in rows {
            let body = zstd::decode_all(body.as_slice())
                .with_context(|| format!("Failed to decompress body of {id}"))?;
            let labels = Self::load_labels(conn, &owner_email, &id)?;
            records.push(MessageRecord {
                body: String::from_utf8_lossy(&body).into_owned(),
                created_at: parse_timestamp(&created_at)?,
                id: MessageId(id),
                owner_email,
                subject,
                sender,
                snippet,
                labels,
            });
        }
        Ok(records)
    }
}

impl CredentialStore for SqliteMailStore {
    fn get_credential(&self, user_id: &str) -> Result<Option<MailboxCredential>> {
        let conn = self.lock()?;
        let credential = conn
            .query_row(
                "SELECT user_id, email, access_token, refresh_token
                 FROM mailbox_credentials WHERE user_id = ?",
                [user_id],
                |row| {
                    Ok(MailboxCredential {
                        user_id: row.get(0)?,
                        email: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(credential)
    }

    fn save_credential(&self, credential: MailboxCredential) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO mailbox_credentials
                (user_id, email, access_token, refresh_token, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                email = excluded.email,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at",
            params![
                credential.user_id,
                credential.email,
                credential.access_token,
                credential.refresh_token,
                format_timestamp(&Utc::now()),
            ],
        )
        .with_context(|| format!("Failed to save credential for {}", credential.email))?;
        Ok(())
    }

    fn update_access_token(&self, user_id: &str, token: &AccessToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE mailbox_credentials SET access_token = ?, updated_at = ? WHERE user_id = ?",
            params![token.as_str(), format_timestamp(&Utc::now()), user_id],
        )?;
        Ok(())
    }
}

impl MessageStore for SqliteMailStore {
    fn upsert_messages(&self, records: Vec<MessageRecord>) -> Result<usize> {
        // Last occurrence of a duplicate id wins, matching a sequential apply
        let mut seen = std::collections::HashSet::new();
        let mut batch: Vec<MessageRecord> = records
            .into_iter()
            .rev()
            .filter(|r| seen.insert((r.owner_email.clone(), r.id.0.clone())))
            .collect();
        batch.reverse();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for record in &batch {
            let body = zstd::encode_all(record.body.as_bytes(), BODY_COMPRESSION_LEVEL)
                .context("Failed to compress body")?;

            // created_at keeps its first-seen value
            tx.execute(
                "INSERT INTO messages
                 (id, owner_email, subject, sender, snippet, body, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id, owner_email) DO UPDATE SET
                    subject = excluded.subject,
                    sender = excluded.sender,
                    snippet = excluded.snippet,
                    body = excluded.body",
                params![
                    record.id.as_str(),
                    record.owner_email,
                    record.subject,
                    record.sender,
                    record.snippet,
                    body,
                    format_timestamp(&record.created_at),
                ],
            )?;

            Self::save_labels(&tx, &record.owner_email, record.id.as_str(), &record.labels)?;
        }

        tx.commit()?;
        Ok(batch.len())
    }

    fn get_message(&self, owner_email: &str, id: &MessageId) -> Result<Option<MessageRecord>> {
        let conn = self.lock()?;
        let mut rows = Self::load_records(
            &conn,
            "SELECT id, owner_email, subject, sender, snippet, body, created_at
             FROM messages WHERE owner_email = ? AND id = ?",
            vec![owner_email.to_string().into(), id.0.clone().into()],
        )?;
        Ok(rows.pop())
    }

    fn update_message_labels(
        &self,
        owner_email: &str,
        id: &MessageId,
        labels: &LabelSet,
    ) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE owner_email = ? AND id = ?)",
            params![owner_email, id.as_str()],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(false);
        }

        Self::save_labels(&tx, owner_email, id.as_str(), labels)?;
        tx.commit()?;
        Ok(true)
    }

    fn delete_message(&self, owner_email: &str, id: &MessageId) -> Result<bool> {
        let conn = self.lock()?;
        // Cascades to message_labels
        let deleted = conn.execute(
            "DELETE FROM messages WHERE owner_email = ? AND id = ?",
            params![owner_email, id.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn query_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>> {
        let mut sql = String::from(
            "SELECT m.id, m.owner_email, m.subject, m.sender, m.snippet, m.body, m.created_at
             FROM messages m WHERE m.owner_email = ?",
        );
        let mut values: Vec<Value> = vec![query.owner_email.trim().to_lowercase().into()];

        if let Some(label) = &query.label {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM message_labels ml
                   WHERE ml.message_id = m.id AND ml.owner_email = m.owner_email
                   AND ml.label_id = ?)",
            );
            values.push(label.clone().into());
        }

        if let Some(term) = query.search_term() {
            sql.push_str(
                " AND (m.sender LIKE ? ESCAPE '\\'
                   OR m.subject LIKE ? ESCAPE '\\'
                   OR m.snippet LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(term);
            for _ in 0..3 {
                values.push(pattern.clone().into());
            }
        }

        sql.push_str(" ORDER BY m.created_at DESC, m.id ASC LIMIT ? OFFSET ?");
        let limit = i64::try_from(query.effective_limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        values.push(limit.into());
        values.push(offset.into());

        let conn = self.lock()?;
        Self::load_records(&conn, &sql, values)
    }

    fn count_messages(&self, owner_email: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE owner_email = ?",
            [owner_email],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count)?)
    }

    fn count_unread(&self, owner_email: &str, label: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = match label {
            Some(label) => conn.query_row(
                "SELECT COUNT(*) FROM message_labels u
                 JOIN message_labels l
                   ON l.message_id = u.message_id AND l.owner_email = u.owner_email
                 WHERE u.owner_email = ? AND u.label_id = 'UNREAD' AND l.label_id = ?",
                params![owner_email, label],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM message_labels
                 WHERE owner_email = ? AND label_id = 'UNREAD'",
                [owner_email],
                |row| row.get(0),
            )?,
        };
        Ok(usize::try_from(count)?)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "DELETE FROM message_labels;
             DELETE FROM messages;
             DELETE FROM mailbox_credentials;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteMailStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("mail.test.sqlite");
        let store = SqliteMailStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_test_message(id: &str, labels: &[&str], minute: i64) -> MessageRecord {
        let mut r = MessageRecord::new(id, "alice@example.com");
        r.subject = format!("Subject {id}");
        r.sender = "Bob <bob@example.com>".to_string();
        r.snippet = "Test preview".to_string();
        r.body = "Test body text".to_string();
        r.labels = labels.iter().map(|l| l.to_string()).collect();
        r.created_at =
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute);
        r
    }

    #[test]
    fn test_message_crud() {
        let (store, _dir) = create_test_store();

        let message = make_test_message("m1", &["INBOX", "UNREAD"], 0);
        store.upsert_messages(vec![message.clone()]).unwrap();

        let retrieved = store
            .get_message("alice@example.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, message);
        assert_eq!(store.count_messages("alice@example.com").unwrap(), 1);
    }

    #[test]
    fn test_upsert_keeps_first_created_at() {
        let (store, _dir) = create_test_store();
        let first = make_test_message("m1", &["INBOX"], 0);
        store.upsert_messages(vec![first.clone()]).unwrap();

        let mut again = make_test_message("m1", &["INBOX", "STARRED"], 30);
        again.body = "Changed body".to_string();
        store.upsert_messages(vec![again]).unwrap();

        let got = store
            .get_message("alice@example.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(got.created_at, first.created_at);
        assert_eq!(got.body, "Changed body");
        assert!(got.has_label("STARRED"));
    }

    #[test]
    fn test_same_id_different_owner() {
        let (store, _dir) = create_test_store();
        let mine = make_test_message("m1", &["INBOX"], 0);
        let mut theirs = make_test_message("m1", &["SENT"], 0);
        theirs.owner_email = "carol@example.com".to_string();
        store.upsert_messages(vec![mine, theirs]).unwrap();

        assert_eq!(store.count_messages("alice@example.com").unwrap(), 1);
        assert_eq!(store.count_messages("carol@example.com").unwrap(), 1);
        assert!(store.delete_message("carol@example.com", &MessageId::new("m1")).unwrap());
        assert_eq!(store.count_messages("alice@example.com").unwrap(), 1);
    }

    #[test]
    fn test_update_labels() {
        let (store, _dir) = create_test_store();
        store
            .upsert_messages(vec![make_test_message("m1", &["INBOX", "UNREAD"], 0)])
            .unwrap();

        let labels = LabelSet::from(["TRASH".to_string()]);
        assert!(store
            .update_message_labels("alice@example.com", &MessageId::new("m1"), &labels)
            .unwrap());
        assert!(!store
            .update_message_labels("alice@example.com", &MessageId::new("m2"), &labels)
            .unwrap());

        let got = store
            .get_message("alice@example.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(got.labels, labels);
        assert_eq!(store.count_unread("alice@example.com", None).unwrap(), 0);
    }

    #[test]
    fn test_delete_message_cascades_labels() {
        let (store, _dir) = create_test_store();
        store
            .upsert_messages(vec![make_test_message("m1", &["INBOX", "UNREAD"], 0)])
            .unwrap();

        assert!(store.delete_message("alice@example.com", &MessageId::new("m1")).unwrap());
        assert!(!store.delete_message("alice@example.com", &MessageId::new("m1")).unwrap());
        assert_eq!(store.count_unread("alice@example.com", None).unwrap(), 0);
    }

    #[test]
    fn test_query_filters_and_order() {
        let (store, _dir) = create_test_store();
        let mut percent = make_test_message("m3", &["INBOX"], 2);
        percent.subject = "100% done".to_string();
        store
            .upsert_messages(vec![
                make_test_message("m1", &["INBOX", "UNREAD"], 0),
                make_test_message("m2", &["SENT"], 1),
                percent,
            ])
            .unwrap();

        let all = store.query_messages(&MessageQuery::new("alice@example.com")).unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m2", "m1"]);

        let inbox = store
            .query_messages(&MessageQuery::new("alice@example.com").with_label("INBOX"))
            .unwrap();
        assert_eq!(inbox.len(), 2);

        let by_sender = store
            .query_messages(&MessageQuery::new("alice@example.com").with_search("BOB@"))
            .unwrap();
        assert_eq!(by_sender.len(), 3);

        // '%' in the needle is literal, not a wildcard
        let literal = store
            .query_messages(&MessageQuery::new("alice@example.com").with_search("0% d"))
            .unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].id.as_str(), "m3");

        let page = store
            .query_messages(&MessageQuery::new("alice@example.com").page(1, 1))
            .unwrap();
        assert_eq!(page[0].id.as_str(), "m2");
    }

    #[test]
    fn test_count_unread_by_label() {
        let (store, _dir) = create_test_store();
        store
            .upsert_messages(vec![
                make_test_message("m1", &["INBOX", "UNREAD"], 0),
                make_test_message("m2", &["SPAM", "UNREAD"], 1),
                make_test_message("m3", &["INBOX"], 2),
            ])
            .unwrap();

        assert_eq!(store.count_unread("alice@example.com", None).unwrap(), 2);
        assert_eq!(store.count_unread("alice@example.com", Some("INBOX")).unwrap(), 1);
    }

    #[test]
    fn test_credentials_roundtrip() {
        let (store, _dir) = create_test_store();
        store
            .save_credential(
                MailboxCredential::new("u1", "alice@example.com").with_refresh_token("rtok1"),
            )
            .unwrap();
        store.update_access_token("u1", &AccessToken::new("atok")).unwrap();

        let cred = store.get_credential("u1").unwrap().unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("atok"));
        assert_eq!(cred.refresh_token.as_deref(), Some("rtok1"));
        assert!(store.get_credential("u2").unwrap().is_none());

        // Email is unique across users
        assert!(store
            .save_credential(MailboxCredential::new("u2", "alice@example.com"))
            .is_err());
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("mail.test.sqlite");
        {
            let store = SqliteMailStore::new(&db_path).unwrap();
            store
                .upsert_messages(vec![make_test_message("m1", &["INBOX"], 0)])
                .unwrap();
        }
        let store = SqliteMailStore::new(&db_path).unwrap();
        assert_eq!(store.count_messages("alice@example.com").unwrap(), 1);
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
    }
}
