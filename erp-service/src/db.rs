//! Sqlite-backed repository for the ERP's canonical tables.

use chrono::{NaiveDate, Utc};
use rand::Rng;
use sqlx::SqlitePool;

use crate::errors::ErpError;
use crate::types::{
    Guardian, GuardianRelation, GuardianView, Installment, InstallmentState, Payment,
    PaymentPlan, Student,
};

/// Connects to the ERP database and runs embedded schema migrations.
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
CREATE TABLE IF NOT EXISTS guardians (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    handle TEXT NOT NULL UNIQUE,
    email TEXT,
    relation TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    grade TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    date_of_birth TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS guardian_students (
    guardian_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    PRIMARY KEY (guardian_id, student_id)
);
CREATE TABLE IF NOT EXISTS payment_plans (
    id TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    installment_count INTEGER NOT NULL,
    installment_amount_cents INTEGER NOT NULL,
    year INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS installments (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    amount_cents INTEGER NOT NULL,
    due_date TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    pay_link TEXT,
    paid_at TEXT
);
CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    installment_id TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    paid_at TEXT NOT NULL,
    method TEXT NOT NULL,
    reference TEXT
);
";

/// Repository over the ERP's canonical tables.
#[derive(Clone)]
pub struct ErpRepository {
    pool: SqlitePool,
}

impl ErpRepository {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `get_student(id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_student(&self, id: &str) -> Result<Option<Student>, ErpError> {
        let row = sqlx::query_as::<_, StudentRow>(
            "SELECT id, name, grade, active, date_of_birth FROM students WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// `get_student_installments(student_id, state?)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_student_installments(
        &self,
        student_id: &str,
        state: Option<&str>,
    ) -> Result<Vec<Installment>, ErpError> {
        let rows = if let Some(state) = state {
            sqlx::query_as::<_, InstallmentRow>(
                "SELECT id, student_id, plan_id, sequence, amount_cents, due_date, state, pay_link, paid_at
                 FROM installments WHERE student_id = ? AND state = ? ORDER BY sequence",
            )
            .bind(student_id)
            .bind(state)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, InstallmentRow>(
                "SELECT id, student_id, plan_id, sequence, amount_cents, due_date, state, pay_link, paid_at
                 FROM installments WHERE student_id = ? ORDER BY sequence",
            )
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All guardians linked to a student, for the embedded-guardians view
    /// on `GET /api/v1/students/{id}?embed=guardians`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn guardians_for_student(&self, student_id: &str) -> Result<Vec<Guardian>, ErpError> {
        let guardian_ids: Vec<(String,)> =
            sqlx::query_as("SELECT guardian_id FROM guardian_students WHERE student_id = ?")
                .bind(student_id)
                .fetch_all(&self.pool)
                .await?;
        let mut guardians = Vec::with_capacity(guardian_ids.len());
        for (guardian_id,) in guardian_ids {
            let row = sqlx::query_as::<_, GuardianRow>(
                "SELECT id, name, handle, email, relation FROM guardians WHERE id = ?",
            )
            .bind(&guardian_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                guardians.push(row.into());
            }
        }
        Ok(guardians)
    }

    /// `get_guardian_by_handle(handle)`, handle already normalized by the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_guardian_by_handle(
        &self,
        normalized_handle: &str,
    ) -> Result<Option<GuardianView>, ErpError> {
        let Some(row) = sqlx::query_as::<_, GuardianRow>(
            "SELECT id, name, handle, email, relation FROM guardians WHERE handle = ?",
        )
        .bind(normalized_handle)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let guardian: Guardian = row.into();

        let student_ids: Vec<(String,)> =
            sqlx::query_as("SELECT student_id FROM guardian_students WHERE guardian_id = ?")
                .bind(&guardian.id)
                .fetch_all(&self.pool)
                .await?;
        let mut students = Vec::with_capacity(student_ids.len());
        for (student_id,) in student_ids {
            if let Some(student) = self.get_student(&student_id).await? {
                students.push(student);
            }
        }
        Ok(Some(GuardianView { guardian, students }))
    }

    /// `get_installment(id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_installment(&self, id: &str) -> Result<Option<Installment>, ErpError> {
        let row = sqlx::query_as::<_, InstallmentRow>(
            "SELECT id, student_id, plan_id, sequence, amount_cents, due_date, state, pay_link, paid_at
             FROM installments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Looks up a `PaymentPlan` by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_plan(&self, id: &str) -> Result<Option<PaymentPlan>, ErpError> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT id, label, installment_count, installment_amount_cents, year FROM payment_plans WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Lists installments filtered by state and/or a due-date window, for
    /// `GET /api/v1/installments`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_installments(
        &self,
        state: Option<&str>,
        due_from: Option<NaiveDate>,
        due_to: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<Installment>, ErpError> {
        let rows = sqlx::query_as::<_, InstallmentRow>(
            "SELECT id, student_id, plan_id, sequence, amount_cents, due_date, state, pay_link, paid_at
             FROM installments
             WHERE (?1 IS NULL OR state = ?1)
               AND (?2 IS NULL OR due_date >= ?2)
               AND (?3 IS NULL OR due_date <= ?3)
             ORDER BY due_date
             LIMIT ?4",
        )
        .bind(state)
        .bind(due_from.map(|d| d.to_string()))
        .bind(due_to.map(|d| d.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// `get_upcoming_installments(days)`: pending installments due within
    /// `days` of today.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_upcoming_installments(&self, days: i64) -> Result<Vec<Installment>, ErpError> {
        let today = Utc::now().date_naive();
        let horizon = today + chrono::Duration::days(days);
        self.list_installments(Some("pending"), Some(today), Some(horizon), 10_000)
            .await
    }

    /// Confirms a payment against `installment_id`:
    /// loads the installment, rejects if missing or already paid,
    /// generates a `PAY-<8 uppercase hex>` id, and persists both the
    /// `Payment` row and the installment's `paid` transition atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ErpError::NotFound`] if the installment doesn't exist,
    /// [`ErpError::AlreadyPaid`] if it's already settled, or
    /// [`ErpError::Database`] on any write failure.
    pub async fn confirm_payment(
        &self,
        installment_id: &str,
        amount_cents: i64,
        method: &str,
        reference: Option<&str>,
    ) -> Result<(Payment, Installment), ErpError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, InstallmentRow>(
            "SELECT id, student_id, plan_id, sequence, amount_cents, due_date, state, pay_link, paid_at
             FROM installments WHERE id = ?",
        )
        .bind(installment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ErpError::NotFound)?;

        if existing.state == "paid" {
            return Err(ErpError::AlreadyPaid);
        }

        let payment_id = format!("PAY-{}", random_hex8());
        let paid_at = Utc::now();

        sqlx::query(
            "INSERT INTO payments (id, installment_id, amount_cents, paid_at, method, reference) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&payment_id)
        .bind(installment_id)
        .bind(amount_cents)
        .bind(paid_at.to_rfc3339())
        .bind(method)
        .bind(reference)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE installments SET state = 'paid', paid_at = ? WHERE id = ?")
            .bind(paid_at.to_rfc3339())
            .bind(installment_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let payment = Payment {
            id: payment_id,
            installment_id: installment_id.to_string(),
            amount: crate::types::Money::from_cents(amount_cents),
            paid_at,
            method: method.to_string(),
            reference: reference.map(ToString::to_string),
        };
        let installment: Installment = InstallmentRow {
            state: "paid".to_string(),
            paid_at: Some(paid_at.to_rfc3339()),
            ..existing
        }
        .into();

        Ok((payment, installment))
    }
}

fn random_hex8() -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    (0..8).map(|_| char::from(HEX[rng.gen_range(0..HEX.len())])).collect()
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: String,
    name: String,
    grade: String,
    active: bool,
    date_of_birth: String,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            grade: row.grade,
            active: row.active,
            date_of_birth: row
                .date_of_birth
                .parse()
                .unwrap_or_else(|_| Utc::now().date_naive()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct GuardianRow {
    id: String,
    name: String,
    handle: String,
    email: Option<String>,
    relation: String,
}

impl From<GuardianRow> for Guardian {
    fn from(row: GuardianRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            handle: row.handle,
            email: row.email,
            relation: match row.relation.as_str() {
                "mother" => GuardianRelation::Mother,
                "tutor" => GuardianRelation::Tutor,
                _ => GuardianRelation::Father,
            },
        }
    }
}

#[derive(sqlx::FromRow, Clone)]
struct InstallmentRow {
    id: String,
    student_id: String,
    plan_id: String,
    sequence: i64,
    amount_cents: i64,
    due_date: String,
    state: String,
    pay_link: Option<String>,
    paid_at: Option<String>,
}

impl From<InstallmentRow> for Installment {
    fn from(row: InstallmentRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            plan_id: row.plan_id,
            sequence: u32::try_from(row.sequence).unwrap_or_default(),
            amount: crate::types::Money::from_cents(row.amount_cents),
            due_date: row.due_date.parse().unwrap_or_else(|_| Utc::now().date_naive()),
            state: match row.state.as_str() {
                "paid" => InstallmentState::Paid,
                "overdue" => InstallmentState::Overdue,
                _ => InstallmentState::Pending,
            },
            pay_link: row.pay_link,
            paid_at: row.paid_at.and_then(|t| t.parse().ok()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: String,
    label: String,
    installment_count: i64,
    installment_amount_cents: i64,
    year: i64,
}

impl From<PlanRow> for PaymentPlan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            installment_count: u32::try_from(row.installment_count).unwrap_or_default(),
            installment_amount: crate::types::Money::from_cents(row.installment_amount_cents),
            year: i32::try_from(row.year).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_repo() -> ErpRepository {
        let pool = connect("sqlite::memory:").await.expect("connect");
        sqlx::query("INSERT INTO students (id, name, grade, active, date_of_birth) VALUES ('S-1', 'Juan Perez', '5A', 1, '2015-03-01')")
            .execute(&pool)
            .await
            .expect("seed student");
        sqlx::query("INSERT INTO guardians (id, name, handle, email, relation) VALUES ('G-1', 'Ana Perez', '5491112345001', NULL, 'mother')")
            .execute(&pool)
            .await
            .expect("seed guardian");
        sqlx::query("INSERT INTO guardian_students (guardian_id, student_id) VALUES ('G-1', 'S-1')")
            .execute(&pool)
            .await
            .expect("seed link");
        sqlx::query("INSERT INTO payment_plans (id, label, installment_count, installment_amount_cents, year) VALUES ('P-1', '12 cuotas 2026', 12, 5000000, 2026)")
            .execute(&pool)
            .await
            .expect("seed plan");
        sqlx::query(
            "INSERT INTO installments (id, student_id, plan_id, sequence, amount_cents, due_date, state)
             VALUES ('C-A001-03', 'S-1', 'P-1', 3, 5000000, '2026-03-10', 'pending')",
        )
        .execute(&pool)
        .await
        .expect("seed installment");
        ErpRepository::new(pool)
    }

    #[tokio::test]
    async fn get_student_returns_seeded_row() {
        let repo = seeded_repo().await;
        let student = repo.get_student("S-1").await.expect("query").expect("present");
        assert_eq!(student.name, "Juan Perez");
    }

    #[tokio::test]
    async fn get_guardian_by_handle_embeds_students() {
        let repo = seeded_repo().await;
        let view = repo
            .get_guardian_by_handle("5491112345001")
            .await
            .expect("query")
            .expect("present");
        assert_eq!(view.students.len(), 1);
        assert_eq!(view.students[0].id, "S-1");
    }

    #[tokio::test]
    async fn confirm_payment_then_reject_second_confirmation() {
        let repo = seeded_repo().await;
        let (payment, installment) = repo
            .confirm_payment("C-A001-03", 5_000_000, "transfer", None)
            .await
            .expect("first confirm");
        assert!(payment.id.starts_with("PAY-"));
        assert_eq!(installment.state, InstallmentState::Paid);
        assert!(installment.paid_at.is_some());

        let second = repo.confirm_payment("C-A001-03", 5_000_000, "transfer", None).await;
        assert!(matches!(second, Err(ErpError::AlreadyPaid)));
    }

    #[tokio::test]
    async fn confirm_payment_on_missing_installment_is_not_found() {
        let repo = seeded_repo().await;
        let result = repo.confirm_payment("NOPE", 100, "cash", None).await;
        assert!(matches!(result, Err(ErpError::NotFound)));
    }

    #[tokio::test]
    async fn get_upcoming_installments_respects_window() {
        let repo = seeded_repo().await;
        let upcoming = repo.get_upcoming_installments(3650).await.expect("query");
        assert!(upcoming.iter().any(|i| i.id == "C-A001-03"));
    }
}
