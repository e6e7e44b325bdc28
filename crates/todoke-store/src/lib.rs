//! # Todoke Store
//!
//! SQLite-backed document store for campaigns and submissions.
//! WAL mode, migration on open, JSON columns for the open-ended form and
//! survey maps.
//!
//! The one mutable shared resource in the system is a submission's delivery
//! state, and [`Store::mark_delivered`] is its only writer: a conditional
//! `UPDATE ... WHERE delivered IS NOT 1` so the false->true transition can
//! happen at most once even under overlapping reconciliation runs.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use todoke_core::error::{Result, TodokeError};
use todoke_core::types::{
    Campaign, DeliveryChannel, DeliveryType, EmailTemplate, FormData, Submission,
};

/// Campaign + submission store.
pub struct Store {
    conn: Mutex<Connection>,
}

/// Input for creating a submission. The store assigns the id; the caller
/// supplies the precomputed scheduled due-time for `delivered_at`.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub campaign_id: String,
    pub submitted_at: DateTime<Utc>,
    pub delivery_choice: Option<DeliveryChannel>,
    /// Scheduled due-time, computed from the campaign policy at creation.
    pub delivered_at: Option<String>,
    pub form_data: FormData,
    pub survey_answers: BTreeMap<String, serde_json::Value>,
}

impl Store {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .map_err(|e| TodokeError::Store(format!("DB open: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .ok();
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TodokeError::Store(format!("DB open: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                delivery_type TEXT NOT NULL,            -- 'datetime' | 'interval'
                delivery_datetime TEXT,                 -- raw, may be tz-naive
                delivery_interval_days INTEGER,
                delivery_channel TEXT,                  -- 'email' | 'line' (default only)
                line_channel_id TEXT,
                line_channel_secret TEXT,
                line_message TEXT,
                email_subject TEXT,
                email_body TEXT,
                from_email TEXT,
                publish_start TEXT,
                publish_end TEXT,
                submission_start TEXT,
                submission_end TEXT,
                created_at TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                delivery_choice TEXT,                   -- 'email' | 'line'
                delivered INTEGER NOT NULL DEFAULT 0,
                delivered_at TEXT,                      -- scheduled due-time, write-once
                actual_delivered_at TEXT,               -- stamped on successful send
                form_data TEXT NOT NULL DEFAULT '{}',   -- JSON field map
                survey_answers TEXT NOT NULL DEFAULT '{}',
                created_at TEXT DEFAULT (datetime('now')),
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_campaign_pending
                ON submissions(campaign_id, delivered);
            ",
        )
        .map_err(|e| TodokeError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TodokeError::Store(format!("Lock: {e}")))
    }

    // ─── Campaigns ────────────────────────────────────────────

    /// Insert or replace a campaign.
    pub fn upsert_campaign(&self, c: &Campaign) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO campaigns
             (id, name, delivery_type, delivery_datetime, delivery_interval_days,
              delivery_channel, line_channel_id, line_channel_secret, line_message,
              email_subject, email_body, from_email,
              publish_start, publish_end, submission_start, submission_end)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
            params![
                c.id,
                c.name,
                c.delivery_type.as_str(),
                c.delivery_datetime,
                c.delivery_interval_days,
                c.delivery_channel.map(|ch| ch.as_str()),
                c.line_channel_id,
                c.line_channel_secret,
                c.line_message,
                c.email_template.as_ref().map(|t| t.subject.clone()),
                c.email_template.as_ref().map(|t| t.body.clone()),
                c.from_email,
                c.publish_start,
                c.publish_end,
                c.submission_start,
                c.submission_end,
            ],
        )
        .map_err(|e| TodokeError::Store(format!("Upsert campaign: {e}")))?;
        Ok(())
    }

    /// Load a single campaign.
    pub fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns WHERE id = ?1"
            ))
            .map_err(|e| TodokeError::Store(format!("Prepare: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], row_to_campaign)
            .map_err(|e| TodokeError::Store(format!("Query campaign: {e}")))?;
        match rows.next() {
            Some(Ok(c)) => Ok(Some(c?)),
            Some(Err(e)) => Err(TodokeError::Store(format!("Read campaign: {e}"))),
            None => Ok(None),
        }
    }

    /// All campaigns with a supported delivery policy — the reconciliation
    /// loop's scan set.
    pub fn list_campaigns_with_delivery_policy(&self) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CAMPAIGN_COLS} FROM campaigns
                 WHERE delivery_type IN ('datetime','interval')
                 ORDER BY created_at"
            ))
            .map_err(|e| TodokeError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map([], row_to_campaign)
            .map_err(|e| TodokeError::Store(format!("Query campaigns: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let c = row.map_err(|e| TodokeError::Store(format!("Read campaign: {e}")))?;
            match c {
                Ok(c) => out.push(c),
                // One malformed record must not block the scan for every
                // other campaign; skip it and surface it in the log.
                Err(e) => tracing::warn!("⚠️ Skipping malformed campaign row: {e}"),
            }
        }
        Ok(out)
    }

    /// Delete a campaign and, by cascade, all of its submissions.
    pub fn delete_campaign(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM campaigns WHERE id = ?1", params![id])
            .map_err(|e| TodokeError::Store(format!("Delete campaign: {e}")))?;
        Ok(n > 0)
    }

    // ─── Submissions ──────────────────────────────────────────

    /// Create a submission; the store assigns the id.
    pub fn create_submission(&self, new: NewSubmission) -> Result<Submission> {
        let id = uuid::Uuid::new_v4().to_string();
        let form_json = serde_json::to_string(&new.form_data)
            .map_err(|e| TodokeError::Store(format!("Serialize form data: {e}")))?;
        let survey_json = serde_json::to_string(&new.survey_answers)
            .map_err(|e| TodokeError::Store(format!("Serialize survey: {e}")))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO submissions
             (id, campaign_id, submitted_at, delivery_choice, delivered,
              delivered_at, actual_delivered_at, form_data, survey_answers)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, NULL, ?6, ?7)",
            params![
                id,
                new.campaign_id,
                new.submitted_at.to_rfc3339(),
                new.delivery_choice.map(|c| c.as_str()),
                new.delivered_at,
                form_json,
                survey_json,
            ],
        )
        .map_err(|e| TodokeError::Store(format!("Insert submission: {e}")))?;

        Ok(Submission {
            id,
            campaign_id: new.campaign_id,
            submitted_at: new.submitted_at,
            delivery_choice: new.delivery_choice,
            delivered: false,
            delivered_at: new.delivered_at,
            actual_delivered_at: None,
            form_data: new.form_data,
            survey_answers: new.survey_answers,
        })
    }

    /// Load a single submission.
    pub fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBMISSION_COLS} FROM submissions WHERE id = ?1"
            ))
            .map_err(|e| TodokeError::Store(format!("Prepare: {e}")))?;
        let mut rows = stmt
            .query_map(params![id], row_to_submission)
            .map_err(|e| TodokeError::Store(format!("Query submission: {e}")))?;
        match rows.next() {
            Some(Ok(s)) => Ok(Some(s?)),
            Some(Err(e)) => Err(TodokeError::Store(format!("Read submission: {e}"))),
            None => Ok(None),
        }
    }

    /// All submissions for a campaign (ops/dashboard view).
    pub fn list_by_campaign(&self, campaign_id: &str) -> Result<Vec<Submission>> {
        self.list_submissions(campaign_id, false)
    }

    /// Candidate submissions for a reconciliation run: everything not yet
    /// delivered. Missing/NULL delivered flags count as "not yet delivered".
    pub fn list_pending_for_campaign(&self, campaign_id: &str) -> Result<Vec<Submission>> {
        self.list_submissions(campaign_id, true)
    }

    fn list_submissions(&self, campaign_id: &str, pending_only: bool) -> Result<Vec<Submission>> {
        let filter = if pending_only {
            "AND delivered IS NOT 1"
        } else {
            ""
        };
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBMISSION_COLS} FROM submissions
                 WHERE campaign_id = ?1 {filter}
                 ORDER BY submitted_at"
            ))
            .map_err(|e| TodokeError::Store(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(params![campaign_id], row_to_submission)
            .map_err(|e| TodokeError::Store(format!("Query submissions: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let s = row.map_err(|e| TodokeError::Store(format!("Read submission: {e}")))?;
            match s {
                Ok(s) => out.push(s),
                // A poison record is a per-submission problem, not a
                // structural one — every other candidate still gets its
                // delivery attempt this run.
                Err(e) => tracing::warn!("⚠️ Skipping malformed submission row: {e}"),
            }
        }
        Ok(out)
    }

    /// Conditionally commit the delivered state: flips `delivered` to true
    /// and stamps `actual_delivered_at`, but only if the submission was
    /// still undelivered. Returns true iff this call performed the
    /// transition. `delivered_at` (the scheduled due-time) is never touched.
    pub fn mark_delivered(&self, id: &str, actual_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE submissions
                 SET delivered = 1, actual_delivered_at = ?2
                 WHERE id = ?1 AND delivered IS NOT 1",
                params![id, actual_at.to_rfc3339()],
            )
            .map_err(|e| TodokeError::Store(format!("Mark delivered: {e}")))?;
        Ok(n == 1)
    }
}

const CAMPAIGN_COLS: &str = "id, name, delivery_type, delivery_datetime, delivery_interval_days, \
     delivery_channel, line_channel_id, line_channel_secret, line_message, \
     email_subject, email_body, from_email, \
     publish_start, publish_end, submission_start, submission_end";

const SUBMISSION_COLS: &str = "id, campaign_id, submitted_at, delivery_choice, delivered, \
     delivered_at, actual_delivered_at, form_data, survey_answers";

// Row mappers return a nested Result: the outer for SQL access errors, the
// inner for domain validation at the store boundary.

fn row_to_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Campaign>> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let delivery_type_raw: String = row.get(2)?;
    let delivery_datetime: Option<String> = row.get(3)?;
    let delivery_interval_days: Option<i64> = row.get(4)?;
    let delivery_channel_raw: Option<String> = row.get(5)?;
    let line_channel_id: Option<String> = row.get(6)?;
    let line_channel_secret: Option<String> = row.get(7)?;
    let line_message: Option<String> = row.get(8)?;
    let email_subject: Option<String> = row.get(9)?;
    let email_body: Option<String> = row.get(10)?;
    let from_email: Option<String> = row.get(11)?;
    let publish_start: Option<String> = row.get(12)?;
    let publish_end: Option<String> = row.get(13)?;
    let submission_start: Option<String> = row.get(14)?;
    let submission_end: Option<String> = row.get(15)?;

    let Some(delivery_type) = DeliveryType::parse(&delivery_type_raw) else {
        return Ok(Err(TodokeError::InvalidRecord(format!(
            "campaign {id}: unknown delivery_type '{delivery_type_raw}'"
        ))));
    };

    // Unknown channel strings degrade to "no default channel" rather than
    // failing the whole listing; the decision engine logs the skip.
    let delivery_channel = delivery_channel_raw.as_deref().and_then(DeliveryChannel::parse);

    let email_template = match (email_subject, email_body) {
        (None, None) => None,
        (subject, body) => Some(EmailTemplate {
            subject: subject.unwrap_or_default(),
            body: body.unwrap_or_default(),
        }),
    };

    Ok(Ok(Campaign {
        id,
        name,
        delivery_type,
        delivery_datetime,
        delivery_interval_days,
        delivery_channel,
        line_channel_id,
        line_channel_secret,
        line_message,
        email_template,
        from_email,
        publish_start,
        publish_end,
        submission_start,
        submission_end,
    }))
}

fn row_to_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Submission>> {
    let id: String = row.get(0)?;
    let campaign_id: String = row.get(1)?;
    let submitted_at_raw: String = row.get(2)?;
    let delivery_choice_raw: Option<String> = row.get(3)?;
    let delivered: bool = row.get::<_, Option<i64>>(4)?.unwrap_or(0) != 0;
    let delivered_at: Option<String> = row.get(5)?;
    let actual_delivered_at_raw: Option<String> = row.get(6)?;
    let form_json: String = row.get(7)?;
    let survey_json: String = row.get(8)?;

    let submitted_at = match DateTime::parse_from_rfc3339(&submitted_at_raw) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            return Ok(Err(TodokeError::InvalidRecord(format!(
                "submission {id}: bad submitted_at '{submitted_at_raw}': {e}"
            ))));
        }
    };

    let actual_delivered_at = actual_delivered_at_raw
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    let form_data: FormData = match serde_json::from_str(&form_json) {
        Ok(f) => f,
        Err(e) => {
            return Ok(Err(TodokeError::InvalidRecord(format!(
                "submission {id}: bad form_data: {e}"
            ))));
        }
    };
    let survey_answers: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&survey_json).unwrap_or_default();

    Ok(Ok(Submission {
        id,
        campaign_id,
        submitted_at,
        delivery_choice: delivery_choice_raw.as_deref().and_then(DeliveryChannel::parse),
        delivered,
        delivered_at,
        actual_delivered_at,
        form_data,
        survey_answers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use todoke_core::types::FormValue;

    fn campaign(id: &str) -> Campaign {
        Campaign {
            id: id.into(),
            name: "Spring".into(),
            delivery_type: DeliveryType::Interval,
            delivery_datetime: None,
            delivery_interval_days: Some(7),
            delivery_channel: Some(DeliveryChannel::Email),
            line_channel_id: None,
            line_channel_secret: None,
            line_message: None,
            email_template: Some(EmailTemplate {
                subject: "Hi {email}".into(),
                body: "{message}".into(),
            }),
            from_email: Some("noreply@example.com".into()),
            publish_start: None,
            publish_end: None,
            submission_start: None,
            submission_end: None,
        }
    }

    fn new_submission(campaign_id: &str) -> NewSubmission {
        let mut form = FormData::new();
        form.insert("message", FormValue::Text("hello".into()));
        form.insert("email", FormValue::Text("user@example.com".into()));
        NewSubmission {
            campaign_id: campaign_id.into(),
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            delivery_choice: Some(DeliveryChannel::Email),
            delivered_at: Some("2024-01-08T00:00:00Z".into()),
            form_data: form,
            survey_answers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_campaign_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_campaign(&campaign("c1")).unwrap();

        let loaded = store.get_campaign("c1").unwrap().unwrap();
        assert_eq!(loaded.name, "Spring");
        assert_eq!(loaded.delivery_type, DeliveryType::Interval);
        assert_eq!(loaded.delivery_interval_days, Some(7));
        assert_eq!(loaded.email_template.unwrap().subject, "Hi {email}");

        let all = store.list_campaigns_with_delivery_policy().unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_submission_roundtrip_and_pending() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_campaign(&campaign("c1")).unwrap();
        let s = store.create_submission(new_submission("c1")).unwrap();

        let pending = store.list_pending_for_campaign("c1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, s.id);
        assert!(!pending[0].delivered);
        assert_eq!(pending[0].form_data.message(), Some("hello"));
        assert_eq!(pending[0].delivered_at.as_deref(), Some("2024-01-08T00:00:00Z"));
    }

    #[test]
    fn test_mark_delivered_is_at_most_once() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_campaign(&campaign("c1")).unwrap();
        let s = store.create_submission(new_submission("c1")).unwrap();

        let now = Utc.with_ymd_and_hms(2024, 1, 8, 0, 5, 0).unwrap();
        assert!(store.mark_delivered(&s.id, now).unwrap());
        // Second commit loses the race — no transition happens.
        assert!(!store.mark_delivered(&s.id, now).unwrap());

        let loaded = store.get_submission(&s.id).unwrap().unwrap();
        assert!(loaded.delivered);
        assert_eq!(loaded.actual_delivered_at, Some(now));
        // Scheduled due-time untouched.
        assert_eq!(loaded.delivered_at.as_deref(), Some("2024-01-08T00:00:00Z"));

        // Delivered submissions drop out of the candidate set.
        assert!(store.list_pending_for_campaign("c1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_campaign_cascades() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_campaign(&campaign("c1")).unwrap();
        let s = store.create_submission(new_submission("c1")).unwrap();

        assert!(store.delete_campaign("c1").unwrap());
        assert!(store.get_submission(&s.id).unwrap().is_none());
    }

    #[test]
    fn test_malformed_row_does_not_block_listing() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_campaign(&campaign("c1")).unwrap();
        let good = store.create_submission(new_submission("c1")).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO submissions (id, campaign_id, submitted_at, form_data)
                 VALUES ('bad', 'c1', 'not-a-timestamp', '{}')",
                [],
            )
            .unwrap();
        }

        // The corrupt row is skipped; everything else still lists.
        let pending = store.list_pending_for_campaign("c1").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, good.id);
    }

    #[test]
    fn test_unknown_channel_string_degrades_to_none() {
        let store = Store::open_in_memory().unwrap();
        let mut c = campaign("c1");
        c.delivery_channel = None;
        store.upsert_campaign(&c).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE campaigns SET delivery_channel = 'fax' WHERE id = 'c1'",
                [],
            )
            .unwrap();
        }
        let loaded = store.get_campaign("c1").unwrap().unwrap();
        assert_eq!(loaded.delivery_channel, None);
    }
}
