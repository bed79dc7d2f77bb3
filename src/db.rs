//! Sqlite-backed mirror store, owned-entity tables, and the checkpoint KV.
//!
//! Grounded in the `sqlx::query_as` + positional-bind idiom used by the
//! teacher's WhatsApp router; generalized here to the mirror/owned schema.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::errors::GestorError;
use crate::types::{
    GuardianMirror, Interaction, InstallmentMirror, InstallmentState, InteractionKind,
    NotificationKind, StudentMirror, Ticket, TicketCategory, TicketPriority, TicketState,
};

/// Connects to the mirror store and runs embedded schema migrations.
///
/// # Errors
///
/// Returns an error if the pool cannot be created or the schema cannot be
/// applied.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePool::connect(database_url).await?;
    sqlx::query(SCHEMA).execute(&pool).await?;
    Ok(pool)
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS guardian_mirror (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    handle TEXT NOT NULL UNIQUE,
    last_sync TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS student_mirror (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    grade TEXT NOT NULL,
    last_sync TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS guardian_students (
    guardian_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    PRIMARY KEY (guardian_id, student_id)
);
CREATE TABLE IF NOT EXISTS installment_mirror (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    state TEXT NOT NULL,
    last_sync TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS interactions (
    id TEXT PRIMARY KEY,
    handle TEXT NOT NULL,
    installment_id TEXT,
    kind TEXT NOT NULL,
    text TEXT NOT NULL,
    agent_tag TEXT,
    extras TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    guardian_id TEXT,
    category TEXT NOT NULL,
    reason TEXT NOT NULL,
    context TEXT NOT NULL,
    state TEXT NOT NULL,
    priority TEXT NOT NULL,
    admin_reply TEXT,
    created_at TEXT NOT NULL,
    resolved_at TEXT
);
CREATE TABLE IF NOT EXISTS notifications_sent (
    id TEXT PRIMARY KEY,
    installment_id TEXT NOT NULL,
    handle TEXT NOT NULL,
    kind TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    UNIQUE (installment_id, kind)
);
CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT PRIMARY KEY,
    state_bytes BLOB NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Eventually-consistent local mirror of ERP state.
#[derive(Clone)]
pub struct MirrorStore {
    pool: SqlitePool,
}

impl MirrorStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts a guardian-mirror row, e.g. on `guardian-updated` webhook
    /// receipt or batch resync.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert_guardian(&self, row: &GuardianMirror) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO guardian_mirror (id, name, handle, last_sync) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, handle = excluded.handle, last_sync = excluded.last_sync",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.handle)
        .bind(row.last_sync.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts a student-mirror row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert_student(&self, row: &StudentMirror) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO student_mirror (id, name, grade, last_sync) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, grade = excluded.grade, last_sync = excluded.last_sync",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.grade)
        .bind(row.last_sync.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts an installment-mirror row, e.g. on `payment-confirmed` or
    /// `installment-generated` webhook receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert_installment(&self, row: &InstallmentMirror) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO installment_mirror (id, student_id, amount_cents, due_date, state, last_sync)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET student_id = excluded.student_id, amount_cents = excluded.amount_cents,
                 due_date = excluded.due_date, state = excluded.state, last_sync = excluded.last_sync",
        )
        .bind(&row.id)
        .bind(&row.student_id)
        .bind(row.amount.cents())
        .bind(row.due_date.to_string())
        .bind(state_tag(row.state))
        .bind(row.last_sync.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks the guardian<->student join row, idempotently.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn link_guardian_student(
        &self,
        guardian_id: &str,
        student_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO guardian_students (guardian_id, student_id) VALUES (?, ?)",
        )
        .bind(guardian_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Looks up a guardian-mirror row by normalized handle
    /// (invariant 2: `lookup(h) == lookup(normalize(h))`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn guardian_by_handle(
        &self,
        normalized_handle: &str,
    ) -> Result<Option<GuardianMirror>, sqlx::Error> {
        let row = sqlx::query_as::<_, GuardianMirrorRow>(
            "SELECT id, name, handle, last_sync FROM guardian_mirror WHERE handle = ?",
        )
        .bind(normalized_handle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Lists student ids linked to a guardian.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn students_of_guardian(
        &self,
        guardian_id: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT student_id FROM guardian_students WHERE guardian_id = ?",
        )
        .bind(guardian_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    /// Marks an installment-mirror row as paid, e.g. on the
    /// `payment-confirmed` webhook.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn mark_installment_paid(&self, installment_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE installment_mirror SET state = 'paid' WHERE id = ?")
            .bind(installment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a `NotificationSent` row, ignoring the insert if the
    /// `(installment_id, kind)` pair already exists (invariant 10).
    ///
    /// Returns `true` if a new row was inserted (i.e. this call is the one
    /// that should actually dispatch the notification).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn record_notification_once(
        &self,
        id: &str,
        installment_id: &str,
        handle: &str,
        kind: NotificationKind,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO notifications_sent (id, installment_id, handle, kind, sent_at, read)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(id)
        .bind(installment_id)
        .bind(handle)
        .bind(notification_kind_tag(kind))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Appends an `Interaction` row; the table is append-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn insert_interaction(&self, row: &Interaction) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO interactions (id, handle, installment_id, kind, text, agent_tag, extras, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.handle)
        .bind(&row.installment_id)
        .bind(interaction_kind_tag(row.kind))
        .bind(&row.text)
        .bind(&row.agent_tag)
        .bind(row.extras.to_string())
        .bind(row.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Creates a `Ticket` row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn insert_ticket(&self, row: &Ticket) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tickets (id, student_id, guardian_id, category, reason, context, state, priority, admin_reply, created_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.student_id)
        .bind(&row.guardian_id)
        .bind(ticket_category_tag(row.category))
        .bind(&row.reason)
        .bind(&row.context)
        .bind(ticket_state_tag(row.state))
        .bind(ticket_priority_tag(row.priority))
        .bind(&row.admin_reply)
        .bind(row.created_at.to_rfc3339())
        .bind(row.resolved_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Looks up a ticket by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_ticket(&self, id: &str) -> Result<Option<Ticket>, sqlx::Error> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, student_id, guardian_id, category, reason, context, state, priority, admin_reply, created_at, resolved_at
             FROM tickets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Transitions a ticket `pending -> in_progress -> resolved`, setting
    /// `resolved_at` together with `admin_reply` on resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn resolve_ticket(&self, id: &str, admin_reply: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tickets SET state = 'resolved', admin_reply = ?, resolved_at = ? WHERE id = ?",
        )
        .bind(admin_reply)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn interaction_kind_tag(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::Inbound => "inbound",
        InteractionKind::BotReply => "bot_reply",
        InteractionKind::PaymentClaim => "payment_claim",
        InteractionKind::AdminReply => "admin_reply",
    }
}

fn ticket_category_tag(category: TicketCategory) -> &'static str {
    match category {
        TicketCategory::PlanRequest => "plan_request",
        TicketCategory::Complaint => "complaint",
        TicketCategory::Withdrawal => "withdrawal",
        TicketCategory::Generic => "generic",
        TicketCategory::AuthorityInfo => "authority_info",
    }
}

fn ticket_category_from_tag(tag: &str) -> TicketCategory {
    match tag {
        "plan_request" => TicketCategory::PlanRequest,
        "complaint" => TicketCategory::Complaint,
        "withdrawal" => TicketCategory::Withdrawal,
        "authority_info" => TicketCategory::AuthorityInfo,
        _ => TicketCategory::Generic,
    }
}

fn ticket_state_tag(state: TicketState) -> &'static str {
    match state {
        TicketState::Pending => "pending",
        TicketState::InProgress => "in_progress",
        TicketState::Resolved => "resolved",
    }
}

fn ticket_state_from_tag(tag: &str) -> TicketState {
    match tag {
        "in_progress" => TicketState::InProgress,
        "resolved" => TicketState::Resolved,
        _ => TicketState::Pending,
    }
}

fn ticket_priority_tag(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::Low => "low",
        TicketPriority::Medium => "medium",
        TicketPriority::High => "high",
    }
}

fn ticket_priority_from_tag(tag: &str) -> TicketPriority {
    match tag {
        "high" => TicketPriority::High,
        "medium" => TicketPriority::Medium,
        _ => TicketPriority::Low,
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    student_id: String,
    guardian_id: Option<String>,
    category: String,
    reason: String,
    context: String,
    state: String,
    priority: String,
    admin_reply: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            guardian_id: row.guardian_id,
            category: ticket_category_from_tag(&row.category),
            reason: row.reason,
            context: row.context,
            state: ticket_state_from_tag(&row.state),
            priority: ticket_priority_from_tag(&row.priority),
            admin_reply: row.admin_reply,
            created_at: row.created_at.parse().unwrap_or_else(|_| Utc::now().into()),
            resolved_at: row.resolved_at.and_then(|t| t.parse().ok()),
        }
    }
}

fn state_tag(state: InstallmentState) -> &'static str {
    match state {
        InstallmentState::Pending => "pending",
        InstallmentState::Paid => "paid",
        InstallmentState::Overdue => "overdue",
    }
}

fn notification_kind_tag(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::ReminderD7 => "reminder_d7",
        NotificationKind::ReminderD3 => "reminder_d3",
        NotificationKind::ReminderD1 => "reminder_d1",
        NotificationKind::PaymentConfirmation => "payment_confirmation",
    }
}

#[derive(sqlx::FromRow)]
struct GuardianMirrorRow {
    id: String,
    name: String,
    handle: String,
    last_sync: String,
}

impl From<GuardianMirrorRow> for GuardianMirror {
    fn from(row: GuardianMirrorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            handle: row.handle,
            last_sync: row
                .last_sync
                .parse()
                .unwrap_or_else(|_| Utc::now().into()),
        }
    }
}

/// Opaque key-value interface for agent checkpointing.
///
/// Any durable KV store suffices; serialization must be schema-stable so
/// restarts after a deploy can still resume in-flight conversations.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persists `state_bytes` under `thread_id`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn put(&self, thread_id: &str, state_bytes: &[u8]) -> Result<(), GestorError>;

    /// Returns the most recently persisted state for `thread_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn get(&self, thread_id: &str) -> Result<Option<Vec<u8>>, GestorError>;
}

/// Sqlite-backed `Checkpointer`, the default implementation.
#[derive(Clone)]
pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn put(&self, thread_id: &str, state_bytes: &[u8]) -> Result<(), GestorError> {
        sqlx::query(
            "INSERT INTO checkpoints (thread_id, state_bytes, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET state_bytes = excluded.state_bytes, updated_at = excluded.updated_at",
        )
        .bind(thread_id)
        .bind(state_bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Vec<u8>>, GestorError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT state_bytes FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(bytes,)| bytes))
    }
}

/// A checkpointer with no persistence at all, used as the "no-checkpoint"
/// entry point for tests.
#[derive(Debug, Clone, Default)]
pub struct NullCheckpointer;

#[async_trait]
impl Checkpointer for NullCheckpointer {
    async fn put(&self, _thread_id: &str, _state_bytes: &[u8]) -> Result<(), GestorError> {
        Ok(())
    }

    async fn get(&self, _thread_id: &str) -> Result<Option<Vec<u8>>, GestorError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;
    use chrono::NaiveDate;

    async fn test_pool() -> SqlitePool {
        connect("sqlite::memory:").await.expect("connect")
    }

    #[tokio::test]
    async fn guardian_lookup_round_trips() {
        let pool = test_pool().await;
        let store = MirrorStore::new(pool);
        let row = GuardianMirror {
            id: "G-1".into(),
            name: "Ana Perez".into(),
            handle: "5491112345001".into(),
            last_sync: Utc::now(),
        };
        store.upsert_guardian(&row).await.expect("upsert");
        let found = store
            .guardian_by_handle("5491112345001")
            .await
            .expect("query")
            .expect("present");
        assert_eq!(found.id, "G-1");
    }

    #[tokio::test]
    async fn notification_dedup_allows_only_one_insert() {
        let pool = test_pool().await;
        let store = MirrorStore::new(pool);
        let first = store
            .record_notification_once("N-1", "I-1", "54911", NotificationKind::PaymentConfirmation)
            .await
            .expect("insert");
        let second = store
            .record_notification_once("N-2", "I-1", "54911", NotificationKind::PaymentConfirmation)
            .await
            .expect("insert");
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn checkpoint_put_then_get_round_trips() {
        let pool = test_pool().await;
        let checkpointer = SqliteCheckpointer::new(pool);
        checkpointer
            .put("+5491112345001", b"{\"cursor\":1}")
            .await
            .expect("put");
        let got = checkpointer
            .get("+5491112345001")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(got, b"{\"cursor\":1}");
    }

    #[tokio::test]
    async fn null_checkpointer_never_resumes() {
        let checkpointer = NullCheckpointer;
        checkpointer.put("t", b"x").await.expect("put");
        assert!(checkpointer.get("t").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn ticket_create_then_resolve_round_trips() {
        let pool = test_pool().await;
        let store = MirrorStore::new(pool);
        let ticket = Ticket {
            id: "T1234567".into(),
            student_id: "S-1".into(),
            guardian_id: Some("G-1".into()),
            category: crate::types::TicketCategory::PlanRequest,
            reason: "wants a new plan".into(),
            context: "conversation snapshot".into(),
            state: crate::types::TicketState::Pending,
            priority: crate::types::TicketPriority::Medium,
            admin_reply: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        store.insert_ticket(&ticket).await.expect("insert");
        let found = store.get_ticket("T1234567").await.expect("query").expect("present");
        assert_eq!(found.category, crate::types::TicketCategory::PlanRequest);
        assert_eq!(found.state, crate::types::TicketState::Pending);

        store.resolve_ticket("T1234567", "handled").await.expect("resolve");
        let resolved = store.get_ticket("T1234567").await.expect("query").expect("present");
        assert_eq!(resolved.state, crate::types::TicketState::Resolved);
        assert_eq!(resolved.admin_reply.as_deref(), Some("handled"));
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn interaction_insert_succeeds() {
        let pool = test_pool().await;
        let store = MirrorStore::new(pool);
        let interaction = Interaction {
            id: "I-1".into(),
            handle: "+54911".into(),
            installment_id: None,
            kind: crate::types::InteractionKind::Inbound,
            text: "Hola".into(),
            agent_tag: None,
            extras: serde_json::json!({}),
            timestamp: Utc::now(),
        };
        store.insert_interaction(&interaction).await.expect("insert");
    }

    #[tokio::test]
    async fn installment_mirror_upsert_then_mark_paid() {
        let pool = test_pool().await;
        let store = MirrorStore::new(pool);
        let row = InstallmentMirror {
            id: "C-A001-03".into(),
            student_id: "S-1".into(),
            amount: Money::from_cents(5_000_000),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date"),
            state: InstallmentState::Pending,
            last_sync: Utc::now(),
        };
        store.upsert_installment(&row).await.expect("upsert");
        store
            .mark_installment_paid("C-A001-03")
            .await
            .expect("mark paid");
    }
}
