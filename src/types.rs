//! Shared domain types: ERP mirror rows, orchestrator-owned entities, and
//! the agent's plan/report shapes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Normalizes a messaging handle by stripping spaces and hyphens.
///
/// Idempotent: `normalize(normalize(h)) == normalize(h)` (invariant 2).
#[must_use]
pub fn normalize_handle(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

/// An amount of money, stored as integer cents.
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

    /// Renders as a decimal string with exactly two fractional digits.
    #[must_use]
    pub fn to_decimal_string(self) -> String {
        format!("{}.{:02}", self.cents / 100, (self.cents % 100).abs())
    }

    /// Renders with thousands separators, e.g. `50,000.00` (used by the
    /// synthesizer per S2's formatting requirement).
    #[must_use]
    pub fn to_formatted_string(self) -> String {
        let whole = self.cents / 100;
        let frac = (self.cents % 100).abs();
        let sign = if whole < 0 { "-" } else { "" };
        let digits = whole.unsigned_abs().to_string();
        let mut grouped = String::new();
        for (i, ch) in digits.chars().rev().enumerate() {
            if i > 0 && i % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let grouped: String = grouped.chars().rev().collect();
        format!("{sign}{grouped}.{frac:02}")
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

/// Canonical guardian, as held by the ERP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guardian {
    /// Stable ERP-assigned id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Messaging handle, already normalized.
    pub handle: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Relation to the student(s).
    pub relation: GuardianRelation,
}

/// Canonical student, as held by the ERP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Stable ERP-assigned id.
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
    /// Stable ERP-assigned id.
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

/// State of a single installment.
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
    /// Stable ERP-assigned id.
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
    /// Timestamp of successful payment; non-null iff `state == Paid`
    /// (invariant 1).
    pub paid_at: Option<DateTime<Utc>>,
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

/// Orchestrator-side eventually-consistent replica of a `Guardian`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianMirror {
    /// Same id as the canonical ERP row.
    pub id: String,
    /// Mirrored display name.
    pub name: String,
    /// Mirrored, normalized handle.
    pub handle: String,
    /// When this row was last refreshed from the ERP.
    pub last_sync: DateTime<Utc>,
}

/// Orchestrator-side eventually-consistent replica of a `Student`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentMirror {
    /// Same id as the canonical ERP row.
    pub id: String,
    /// Mirrored name.
    pub name: String,
    /// Mirrored grade label.
    pub grade: String,
    /// When this row was last refreshed from the ERP.
    pub last_sync: DateTime<Utc>,
}

/// Orchestrator-side eventually-consistent replica of an `Installment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentMirror {
    /// Same id as the canonical ERP row.
    pub id: String,
    /// Mirrored owning student id.
    pub student_id: String,
    /// Mirrored amount.
    pub amount: Money,
    /// Mirrored due date.
    pub due_date: NaiveDate,
    /// Mirrored state.
    pub state: InstallmentState,
    /// When this row was last refreshed from the ERP.
    pub last_sync: DateTime<Utc>,
}

/// The kind of a logged `Interaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Inbound guardian message.
    Inbound,
    /// Outbound bot reply.
    BotReply,
    /// A guardian's self-reported payment claim.
    PaymentClaim,
    /// An admin's reply to an escalated ticket.
    AdminReply,
}

/// Append-only incoming/outgoing message log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Row id.
    pub id: String,
    /// Normalized guardian handle.
    pub handle: String,
    /// Installment this interaction concerns, if any.
    pub installment_id: Option<String>,
    /// Kind of interaction.
    pub kind: InteractionKind,
    /// Message text.
    pub text: String,
    /// Which specialist/agent produced this entry, if any.
    pub agent_tag: Option<String>,
    /// Free-form extra data.
    pub extras: serde_json::Value,
    /// When the interaction occurred.
    pub timestamp: DateTime<Utc>,
}

/// Escalation category for a `Ticket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    /// Request for a new or modified payment plan.
    PlanRequest,
    /// General complaint.
    Complaint,
    /// Withdrawal of a student from the school.
    Withdrawal,
    /// Anything not covered by the other categories.
    Generic,
    /// Question about an institutional authority figure.
    AuthorityInfo,
}

/// Lifecycle state of a `Ticket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Created, not yet picked up.
    Pending,
    /// Being worked.
    InProgress,
    /// Closed out with an admin reply.
    Resolved,
}

/// Priority assigned to a `Ticket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

/// An escalation record created by the Administrative specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Row id; its first 8 characters are surfaced to the guardian (S6).
    pub id: String,
    /// Student this ticket concerns.
    pub student_id: String,
    /// Guardian who raised it, if known.
    pub guardian_id: Option<String>,
    /// Category.
    pub category: TicketCategory,
    /// Free-text reason.
    pub reason: String,
    /// Snapshot of the conversation at creation time.
    pub context: String,
    /// Lifecycle state.
    pub state: TicketState,
    /// Priority.
    pub priority: TicketPriority,
    /// Admin's reply, once resolved.
    pub admin_reply: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp, set together with `admin_reply`.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Which notification kind was sent for an installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Reminder sent 7 days before due date.
    ReminderD7,
    /// Reminder sent 3 days before due date.
    ReminderD3,
    /// Reminder sent 1 day before due date.
    ReminderD1,
    /// Confirmation that a payment was received.
    PaymentConfirmation,
}

/// Record guarding at-most-one delivery of a given `(installment, kind)`
/// pair; the `(installment_id, kind)` tuple is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSent {
    /// Row id.
    pub id: String,
    /// Installment the notification concerns.
    pub installment_id: String,
    /// Recipient handle.
    pub handle: String,
    /// Notification kind.
    pub kind: NotificationKind,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
    /// Whether the recipient has read it, if known.
    pub read: bool,
}

/// Intents the manager's `MasterPlan` can classify an inbound message as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// "How much do I owe?"
    FinancialQuery,
    /// "I want to pay."
    PaymentRequest,
    /// "I already paid."
    PaymentClaim,
    /// A complaint.
    Complaint,
    /// Withdraw a student.
    WithdrawalRequest,
    /// Ask about payment plans.
    PlanRequest,
    /// Hours, calendar, contact, general info.
    InstitutionalQuery,
    /// A greeting with no other content.
    Greeting,
    /// Anything else.
    Other,
}

/// Which specialist subgraph a `MasterPlan` step targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    /// Account status, payment links, payment claims.
    Financial,
    /// Tickets.
    Administrative,
    /// Hours, calendar, authorities, contact, general info.
    Institutional,
}

/// One step of a `MasterPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Which specialist should execute this step.
    pub specialist: SpecialistKind,
    /// Short natural-language goal for the specialist's own planner.
    pub goal: String,
    /// Extra structured parameters forwarded to the specialist.
    pub params: serde_json::Value,
    /// Relative ordering hint; lower runs first.
    pub priority: u32,
}

/// Strategic plan emitted by the manager LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterPlan {
    /// Classified intent.
    pub intent: Intent,
    /// Model's confidence in the classification, in `[0, 1]`.
    pub confidence: f32,
    /// Ordered specialist steps.
    pub steps: Vec<PlanStep>,
    /// Whether a human must review before any side effect is taken.
    pub requires_human: bool,
    /// Free-text rationale, not shown to the user.
    pub reasoning: String,
}

/// One action in a specialist's tactical `SubPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPlanAction {
    /// Tool name to invoke.
    pub tool: String,
    /// Arguments for the tool call.
    pub params: serde_json::Value,
    /// Why this action was chosen, not shown to the user.
    pub description: String,
}

/// Tactical plan emitted by a specialist's own LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPlan {
    /// Ordered tool actions.
    pub actions: Vec<SubPlanAction>,
    /// Free-text rationale.
    pub reasoning: String,
}

/// Structured result of one specialist subgraph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistReport {
    /// Which specialist produced this report.
    pub specialist: SpecialistKind,
    /// Whether the specialist's actions all succeeded.
    pub success: bool,
    /// Structured data gathered, for the synthesizer to read.
    pub data: serde_json::Value,
    /// Short human-readable summary of what happened.
    pub summary: String,
    /// Error detail, never shown to the end user directly.
    pub error: Option<String>,
    /// Whether the manager should re-plan given this report.
    pub requires_replan: bool,
}
