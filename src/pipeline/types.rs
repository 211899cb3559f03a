//! Shared types for the notification pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Notification kind ───────────────────────────────────────────────

/// The closed set of notification categories.
///
/// Adding a variant means adding a classifier rule set and an extraction
/// rule set for it; nothing is inferred ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingRequest,
    BookingConfirmation,
    Cancellation,
    Message,
    Unknown,
}

impl NotificationKind {
    /// Known kinds in classification priority order (highest first).
    pub const PRIORITY: [NotificationKind; 4] = [
        Self::BookingRequest,
        Self::BookingConfirmation,
        Self::Cancellation,
        Self::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookingRequest => "booking_request",
            Self::BookingConfirmation => "booking_confirmation",
            Self::Cancellation => "cancellation",
            Self::Message => "message",
            Self::Unknown => "unknown",
        }
    }

    /// Position in the classification priority order; `Unknown` sorts last.
    pub fn priority(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    /// Field schema for this kind.
    pub fn schema(&self) -> &'static FieldSchema {
        match self {
            Self::BookingRequest => &BOOKING_REQUEST_SCHEMA,
            Self::BookingConfirmation => &BOOKING_CONFIRMATION_SCHEMA,
            Self::Cancellation => &CANCELLATION_SCHEMA,
            Self::Message => &MESSAGE_SCHEMA,
            Self::Unknown => &UNKNOWN_SCHEMA,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_request" => Ok(Self::BookingRequest),
            "booking_confirmation" => Ok(Self::BookingConfirmation),
            "cancellation" => Ok(Self::Cancellation),
            "message" => Ok(Self::Message),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

// ── Field schemas ───────────────────────────────────────────────────

/// Canonical field names.
pub mod field {
    pub const GUEST: &str = "guest";
    pub const CHECK_IN: &str = "check_in";
    pub const CHECK_OUT: &str = "check_out";
    pub const NUM_GUESTS: &str = "num_guests";
    pub const PROPERTY: &str = "property";
    pub const RESERVATION_ID: &str = "reservation_id";
    pub const AMOUNT: &str = "amount";
    pub const CURRENCY: &str = "currency";
    pub const CANCELLATION_REASON: &str = "cancellation_reason";
    pub const SENDER_NAME: &str = "sender_name";
    pub const MESSAGE_CONTENT: &str = "message_content";
}

/// Required and optional fields for one notification kind.
///
/// Required fields form the completeness contract; optional fields are
/// extracted when present but never reported missing.
#[derive(Debug)]
pub struct FieldSchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl FieldSchema {
    /// All schema fields, required first.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields().any(|f| f == name)
    }
}

static BOOKING_REQUEST_SCHEMA: FieldSchema = FieldSchema {
    required: &[
        field::GUEST,
        field::CHECK_IN,
        field::CHECK_OUT,
        field::NUM_GUESTS,
        field::PROPERTY,
    ],
    optional: &[
        field::RESERVATION_ID,
        field::AMOUNT,
        field::CURRENCY,
        field::MESSAGE_CONTENT,
    ],
};

static BOOKING_CONFIRMATION_SCHEMA: FieldSchema = FieldSchema {
    required: &[
        field::RESERVATION_ID,
        field::GUEST,
        field::CHECK_IN,
        field::CHECK_OUT,
        field::PROPERTY,
    ],
    optional: &[field::NUM_GUESTS, field::AMOUNT, field::CURRENCY],
};

static CANCELLATION_SCHEMA: FieldSchema = FieldSchema {
    required: &[field::RESERVATION_ID, field::GUEST, field::PROPERTY],
    optional: &[
        field::CHECK_IN,
        field::CHECK_OUT,
        field::CANCELLATION_REASON,
    ],
};

static MESSAGE_SCHEMA: FieldSchema = FieldSchema {
    required: &[field::SENDER_NAME, field::MESSAGE_CONTENT],
    optional: &[
        field::PROPERTY,
        field::RESERVATION_ID,
        field::CHECK_IN,
        field::CHECK_OUT,
    ],
};

static UNKNOWN_SCHEMA: FieldSchema = FieldSchema {
    required: &[],
    optional: &[],
};

// ── Field values ────────────────────────────────────────────────────

/// A typed extracted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Date(NaiveDate),
    Amount(Decimal),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Amount(a) => write!(f, "{a}"),
        }
    }
}

// ── Raw body ────────────────────────────────────────────────────────

/// The original bodies, carried on the record for targets that ask for them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBody {
    pub text: String,
    pub html: Option<String>,
}

// ── Canonical record ────────────────────────────────────────────────

/// Structured, kind-typed representation of one notification email.
///
/// Built once by the extractor and never mutated afterwards; accessors
/// only hand out shared references.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalRecord {
    notification_id: String,
    kind: NotificationKind,
    subject: String,
    sender: String,
    received_at: DateTime<Utc>,
    fields: BTreeMap<String, Option<FieldValue>>,
    missing_fields: Vec<String>,
    #[serde(skip)]
    raw: RawBody,
}

impl CanonicalRecord {
    /// Assemble a record. `fields` must hold one entry per schema field.
    pub(crate) fn new(
        notification_id: String,
        kind: NotificationKind,
        subject: String,
        sender: String,
        received_at: DateTime<Utc>,
        fields: BTreeMap<String, Option<FieldValue>>,
        raw: RawBody,
    ) -> Self {
        let missing_fields = kind
            .schema()
            .required
            .iter()
            .filter(|name| !matches!(fields.get(**name), Some(Some(_))))
            .map(|name| name.to_string())
            .collect();

        Self {
            notification_id,
            kind,
            subject,
            sender,
            received_at,
            fields,
            missing_fields,
            raw,
        }
    }

    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn fields(&self) -> &BTreeMap<String, Option<FieldValue>> {
        &self.fields
    }

    /// Value of a field, `None` when missing or not part of the schema.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(Option::as_ref)
    }

    /// Required fields that no rule could fill, in schema order.
    pub fn missing_fields(&self) -> &[String] {
        &self.missing_fields
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    pub fn raw(&self) -> &RawBody {
        &self.raw
    }

    /// One-line human-readable digest for logs.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("Type: {}", self.kind)];

        if let Some(id) = self.get(field::RESERVATION_ID) {
            parts.push(format!("Reservation: {id}"));
        }
        if let Some(property) = self.get(field::PROPERTY) {
            parts.push(format!("Property: {property}"));
        }
        if let Some(guest) = self.get(field::GUEST) {
            parts.push(format!("Guest: {guest}"));
        }
        if let (Some(check_in), Some(check_out)) =
            (self.get(field::CHECK_IN), self.get(field::CHECK_OUT))
        {
            parts.push(format!("Stay: {check_in} to {check_out}"));
        }
        if let Some(n) = self.get(field::NUM_GUESTS) {
            parts.push(format!("Guests: {n}"));
        }
        if let (Some(amount), Some(currency)) =
            (self.get(field::AMOUNT), self.get(field::CURRENCY))
        {
            parts.push(format!("Amount: {currency}{amount}"));
        }
        if let Some(message) = self.get(field::MESSAGE_CONTENT) {
            let message = message.to_string();
            let message = if message.chars().count() > 100 {
                format!("{}...", message.chars().take(100).collect::<String>())
            } else {
                message
            };
            parts.push(format!("Message: {message}"));
        }

        parts.join(" | ")
    }
}
