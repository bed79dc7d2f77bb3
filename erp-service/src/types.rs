//! Canonical ERP entities: Guardian/Student/PaymentPlan/Installment/Payment.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Normalizes a messaging handle by stripping spaces and hyphens.
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

/// An amount of money, stored as integer cents and serialized as a decimal
/// number with two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Builds a `Money` value from a whole number of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// The stored integer cent value.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.cents
    }
}

impl TryFrom<f64> for Money {
    type Error = std::num::TryFromIntError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let cents = (value * 100.0).round();
        i64::try_from(cents as i128).map(Self::from_cents)
    }
}

impl From<Money> for f64 {
    fn from(value: Money) -> Self {
        value.cents as f64 / 100.0
    }
}

/// Relation of a guardian to a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianRelation {
    /// Father.
    Father,
    /// Mother.
    Mother,
    /// Legal tutor.
    Tutor,
}

/// Canonical guardian.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guardian {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Messaging handle, unique after normalization (invariant).
    pub handle: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Relation to the student(s).
    pub relation: GuardianRelation,
}

/// Guardian with its linked students embedded, for
/// `GET /api/v1/guardians/by-handle/{handle}`.
#[derive(Debug, Clone, Serialize)]
pub struct GuardianView {
    /// Flattened guardian fields.
    #[serde(flatten)]
    pub guardian: Guardian,
    /// Linked students.
    pub students: Vec<Student>,
}

/// Canonical student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Stable id.
    pub id: String,
    /// Full name.
    pub name: String,
    /// Grade label, e.g. `"5A"`.
    pub grade: String,
    /// Whether the student is currently enrolled.
    pub active: bool,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
}

/// A payment plan template for a given school year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    /// Stable id.
    pub id: String,
    /// Human label, e.g. `"12 cuotas 2026"`.
    pub label: String,
    /// Number of installments in the plan.
    pub installment_count: u32,
    /// Amount charged per installment.
    pub installment_amount: Money,
    /// School year this plan applies to.
    pub year: i32,
}

/// State of a single installment (invariant: `paid_at` non-null iff paid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentState {
    /// Not yet due, or due but unpaid and within grace.
    Pending,
    /// Has a successful payment.
    Paid,
    /// Past due date, still unpaid.
    Overdue,
}

/// A single scheduled payment belonging to a `PaymentPlan` for a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    /// Stable id.
    pub id: String,
    /// Owning student.
    pub student_id: String,
    /// Owning plan.
    pub plan_id: String,
    /// 1-based sequence number within the plan.
    pub sequence: u32,
    /// Amount due.
    pub amount: Money,
    /// Due date.
    pub due_date: NaiveDate,
    /// Current state.
    pub state: InstallmentState,
    /// Optional hosted pay-link.
    pub pay_link: Option<String>,
    /// Timestamp of successful payment; non-null iff `state == Paid`.
    pub paid_at: Option<DateTime<Utc>>,
}

/// Installment with its owning student and plan embedded, for
/// `GET /api/v1/installments/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct InstallmentView {
    /// Flattened installment fields.
    #[serde(flatten)]
    pub installment: Installment,
    /// Owning student, if embedding was requested and found.
    pub student: Option<Student>,
    /// Owning plan, if embedding was requested and found.
    pub plan: Option<PaymentPlan>,
}

/// A successful payment against an installment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Stable id of the form `PAY-<8 uppercase hex>`.
    pub id: String,
    /// Installment this payment settles.
    pub installment_id: String,
    /// Amount paid.
    pub amount: Money,
    /// When the payment was recorded.
    pub paid_at: DateTime<Utc>,
    /// Payment method, e.g. `"transfer"`, `"cash"`.
    pub method: String,
    /// External reference, e.g. a bank transaction id.
    pub reference: Option<String>,
}

/// Request body for `POST /api/v1/payments/confirm`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmPaymentRequest {
    /// Installment to settle.
    pub installment_id: String,
    /// Amount paid.
    pub amount: f64,
    /// Payment method, defaults to `"transfer"`.
    pub method: Option<String>,
    /// External reference.
    pub reference: Option<String>,
}

/// Response body for `POST /api/v1/payments/confirm`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmPaymentResponse {
    /// Always `true` on this response path (errors short-circuit earlier).
    pub success: bool,
    /// Human-readable confirmation message.
    pub message: String,
    /// The recorded payment.
    pub payment: Payment,
    /// The now-paid installment.
    pub installment: Installment,
}
