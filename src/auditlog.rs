use crate::models::{call, call_log};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;

pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub logged_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSummary {
    pub call_id: i64,
    pub sid: String,
    pub created_at: DateTime<Utc>,
    pub first_line: Option<LogLine>,
}

/// Append-only per-call audit trail.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Get-or-create the call row for `sid`; concurrent callers with the same
    /// SID all receive the same id.
    async fn ensure_call(&self, sid: &str) -> Result<i64>;
    async fn append(&self, call_id: i64, message: &str) -> Result<()>;
    /// Ensures the call and appends every message as one transaction.
    async fn record(&self, sid: &str, messages: &[String]) -> Result<i64>;
    async fn read_all(&self, call_id: i64) -> Result<Vec<LogLine>>;
    /// Newest calls first, each with only its first log line.
    async fn read_first_lines(&self, offset: u64, limit: u64) -> Result<Vec<CallSummary>>;
    async fn ping(&self) -> Result<()>;
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Restricts a message to printable ASCII and bounds its length.
pub fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .take(MAX_MESSAGE_LEN)
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c } else { '?' })
        .collect()
}

pub struct DbAuditLog {
    db: DatabaseConnection,
    clock: Clock,
}

impl DbAuditLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    async fn ensure_call_on<C: ConnectionTrait>(&self, conn: &C, sid: &str) -> Result<i64> {
        let model = call::ActiveModel {
            sid: Set(sid.to_string()),
            created_at: Set((self.clock)()),
            ..Default::default()
        };
        match call::Entity::insert(model)
            .on_conflict(OnConflict::column(call::Column::Sid).do_nothing().to_owned())
            .exec(conn)
            .await
        {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(anyhow!("Database error on call insert: {}", e)),
        }

        let call = call::Entity::find()
            .filter(call::Column::Sid.eq(sid))
            .one(conn)
            .await
            .map_err(|e| anyhow!("Database error on call lookup: {}", e))?
            .ok_or_else(|| anyhow!("call {} missing after insert", sid))?;
        Ok(call.id)
    }

    async fn append_on<C: ConnectionTrait>(&self, conn: &C, call_id: i64, message: &str) -> Result<()> {
        let now = (self.clock)();
        let latest = call_log::Entity::find()
            .filter(call_log::Column::CallId.eq(call_id))
            .order_by_desc(call_log::Column::LoggedAt)
            .one(conn)
            .await
            .map_err(|e| anyhow!("Database error on log lookup: {}", e))?;
        // Keep timestamps monotonic per call even if the wall clock steps back.
        let logged_at = match latest {
            Some(line) if line.logged_at > now => line.logged_at,
            _ => now,
        };

        call_log::ActiveModel {
            call_id: Set(call_id),
            logged_at: Set(logged_at),
            message: Set(sanitize_message(message)),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(|e| anyhow!("Database error on log append: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for DbAuditLog {
    async fn ensure_call(&self, sid: &str) -> Result<i64> {
        self.ensure_call_on(&self.db, sid).await
    }

    async fn append(&self, call_id: i64, message: &str) -> Result<()> {
        self.append_on(&self.db, call_id, message).await
    }

    async fn record(&self, sid: &str, messages: &[String]) -> Result<i64> {
        // Dropping the transaction on an early return rolls it back.
        let txn = self.db.begin().await?;
        let call_id = self.ensure_call_on(&txn, sid).await?;
        for message in messages {
            self.append_on(&txn, call_id, message).await?;
        }
        txn.commit().await?;
        Ok(call_id)
    }

    async fn read_all(&self, call_id: i64) -> Result<Vec<LogLine>> {
        let lines = call_log::Entity::find()
            .filter(call_log::Column::CallId.eq(call_id))
            .order_by_asc(call_log::Column::LoggedAt)
            .order_by_asc(call_log::Column::Id)
            .all(&self.db)
            .await?;
        Ok(lines
            .into_iter()
            .map(|line| LogLine {
                logged_at: line.logged_at,
                message: line.message,
            })
            .collect())
    }

    async fn read_first_lines(&self, offset: u64, limit: u64) -> Result<Vec<CallSummary>> {
        let calls = call::Entity::find()
            .order_by_desc(call::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        let mut summaries = Vec::with_capacity(calls.len());
        for call in calls {
            let first_line = call_log::Entity::find()
                .filter(call_log::Column::CallId.eq(call.id))
                .order_by_asc(call_log::Column::LoggedAt)
                .order_by_asc(call_log::Column::Id)
                .one(&self.db)
                .await?
                .map(|line| LogLine {
                    logged_at: line.logged_at,
                    message: line.message,
                });
            summaries.push(CallSummary {
                call_id: call.id,
                sid: call.sid,
                created_at: call.created_at,
                first_line,
            });
        }
        Ok(summaries)
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::create_db;
    use chrono::{Duration, TimeZone};
    use sea_orm::PaginatorTrait;

    async fn memory_log() -> DbAuditLog {
        DbAuditLog::new(create_db("sqlite::memory:").await.unwrap())
    }

    #[test]
    fn test_sanitize_message() {
        assert_eq!(sanitize_message("call from +44 1234"), "call from +44 1234");
        assert_eq!(sanitize_message("line\nbreak\u{e9}"), "line?break?");
        assert_eq!(sanitize_message(&"x".repeat(5000)).len(), MAX_MESSAGE_LEN);
    }

    #[tokio::test]
    async fn test_ensure_call_is_idempotent() {
        let log = memory_log().await;
        let a = log.ensure_call("CA1").await.unwrap();
        let b = log.ensure_call("CA1").await.unwrap();
        let c = log.ensure_call("CA2").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_call_creates_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("audit.sqlite3").display());
        let db = create_db(&url).await.unwrap();
        let log = Arc::new(DbAuditLog::new(db.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move { log.ensure_call("CA-race").await }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(call::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_all_keeps_insertion_order_on_equal_timestamps() {
        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let log = memory_log().await.with_clock(Arc::new(move || fixed));
        let call_id = log.ensure_call("CA1").await.unwrap();
        for message in ["started", "gathered", "dialing", "completed"] {
            log.append(call_id, message).await.unwrap();
        }

        let lines = log.read_all(call_id).await.unwrap();
        let messages: Vec<_> = lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["started", "gathered", "dialing", "completed"]);
        assert!(lines.iter().all(|l| l.logged_at == fixed));
    }

    #[tokio::test]
    async fn test_timestamps_never_go_backwards() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let ticks = Arc::new(std::sync::Mutex::new(vec![
            base - Duration::seconds(30),
            base,
        ]));
        let clock_ticks = ticks.clone();
        let log = memory_log()
            .await
            .with_clock(Arc::new(move || clock_ticks.lock().unwrap().pop().unwrap()));
        let call_id = log.ensure_call("CA1").await.unwrap();
        log.append(call_id, "first").await.unwrap();
        log.append(call_id, "second").await.unwrap();

        let lines = log.read_all(call_id).await.unwrap();
        assert_eq!(lines[0].message, "first");
        assert_eq!(lines[1].message, "second");
        assert_eq!(lines[1].logged_at, base);
    }

    #[tokio::test]
    async fn test_record_appends_each_callback_in_order() {
        let log = memory_log().await;
        let call_id = log
            .record("CA1", &["started".to_string(), "greeting".to_string()])
            .await
            .unwrap();
        let again = log
            .record("CA1", &["gather failed".to_string()])
            .await
            .unwrap();
        assert_eq!(call_id, again);
        let messages: Vec<_> = log
            .read_all(call_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(messages, vec!["started", "greeting", "gather failed"]);
    }

    #[tokio::test]
    async fn test_failed_append_rolls_back_the_callback() {
        let db = create_db("sqlite::memory:").await.unwrap();
        db.execute_unprepared(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON infoline_call_log \
             WHEN NEW.message = 'boom' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .await
        .unwrap();
        let log = DbAuditLog::new(db.clone());

        let result = log
            .record("CA-rollback", &["ok".to_string(), "boom".to_string()])
            .await;
        assert!(result.is_err());
        assert!(log.read_first_lines(0, 10).await.unwrap().is_empty());
        assert_eq!(call_log::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_call_row_uses_injected_clock() {
        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let log = memory_log().await.with_clock(Arc::new(move || fixed));
        log.ensure_call("CA1").await.unwrap();
        let calls = log.read_first_lines(0, 1).await.unwrap();
        assert_eq!(calls[0].created_at, fixed);
    }

    #[tokio::test]
    async fn test_read_first_lines_pages_newest_first() {
        let log = memory_log().await;
        for sid in ["CA1", "CA2", "CA3"] {
            log.record(sid, &[format!("{} started", sid), "more".to_string()])
                .await
                .unwrap();
        }
        log.ensure_call("CA4").await.unwrap();

        let page = log.read_first_lines(0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].sid, "CA4");
        assert!(page[0].first_line.is_none());
        assert_eq!(page[1].first_line.as_ref().unwrap().message, "CA3 started");

        let page = log.read_first_lines(2, 2).await.unwrap();
        let sids: Vec<_> = page.iter().map(|s| s.sid.as_str()).collect();
        assert_eq!(sids, vec!["CA2", "CA1"]);
        log.ping().await.unwrap();
    }
}
