//! Template renderer — projects a canonical record into an outbound payload.
//!
//! Rendering is total: every template key lands in the payload, with `null`
//! for anything the record doesn't have. The same record and template always
//! serialize to the same bytes.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::EncodeError;
use crate::pipeline::resolver::{ContentType, OrderedMap};
use crate::pipeline::types::{CanonicalRecord, FieldValue, NotificationKind};

/// Outbound payload: a JSON object.
pub type Payload = Map<String, Value>;

/// Payload key holding the original bodies when a target asks for them.
pub const RAW_KEY: &str = "_raw";

/// Record attributes a template may reference besides schema fields.
pub const RECORD_ATTRIBUTES: &[&str] = &[
    "notification_id",
    "kind",
    "subject",
    "sender",
    "received_at",
    "missing_fields",
];

/// Ordered mapping from payload key to record source name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    entries: Vec<(String, String)>,
}

impl Template {
    pub fn new<K, S>(entries: impl IntoIterator<Item = (K, S)>) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, s)| (k.into(), s.into()))
                .collect(),
        }
    }

    /// `notification_id`, `kind`, then every schema field of `kind` under its own name.
    pub fn identity(kind: NotificationKind) -> Self {
        let names = ["notification_id", "kind"]
            .into_iter()
            .chain(kind.schema().fields());
        Self::new(names.map(|n| (n, n)))
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let OrderedMap(entries) = OrderedMap::<String>::deserialize(deserializer)?;
        Ok(Self { entries })
    }
}

/// Project `record` through `template`.
pub fn render(record: &CanonicalRecord, template: &Template, include_raw: bool) -> Payload {
    let mut payload = Map::new();
    for (key, source) in template.entries() {
        payload.insert(key.clone(), lookup(record, source));
    }

    if include_raw {
        let raw = record.raw();
        let mut body = Map::new();
        body.insert("text".into(), Value::String(raw.text.clone()));
        body.insert(
            "html".into(),
            raw.html.clone().map(Value::String).unwrap_or(Value::Null),
        );
        payload.insert(RAW_KEY.into(), Value::Object(body));
    }

    payload
}

fn lookup(record: &CanonicalRecord, source: &str) -> Value {
    match source {
        "notification_id" => Value::String(record.notification_id().to_string()),
        "kind" => Value::String(record.kind().as_str().to_string()),
        "subject" => Value::String(record.subject().to_string()),
        "sender" => Value::String(record.sender().to_string()),
        "received_at" => Value::String(record.received_at().to_rfc3339()),
        "missing_fields" => Value::Array(
            record
                .missing_fields()
                .iter()
                .map(|f| Value::String(f.clone()))
                .collect(),
        ),
        name => record.get(name).map(field_to_json).unwrap_or(Value::Null),
    }
}

fn field_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Integer(n) => Value::from(*n),
        FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        FieldValue::Amount(a) => Value::String(a.to_string()),
    }
}

/// Serialize a payload for the wire.
///
/// Form encoding stringifies scalars, sends `null` as an empty value and
/// nested values as compact JSON.
pub fn encode(payload: &Payload, content_type: ContentType) -> Result<Vec<u8>, EncodeError> {
    match content_type {
        ContentType::Json => Ok(serde_json::to_vec(payload)?),
        ContentType::Form => {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in payload {
                let text = match value {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => b.to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
                };
                form.append_pair(key, &text);
            }
            Ok(form.finish().into_bytes())
        }
    }
}
