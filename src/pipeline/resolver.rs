//! Config resolver — global and per-kind delivery config merged into targets.
//!
//! Targets defined only in the kind scope come first, in declaration order,
//! followed by every global target (merged with its kind override when one
//! exists) in global declaration order. A bad target is reported and
//! skipped; the rest of the plan is unaffected.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use serde::de::{self, MapAccess, Visitor};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::ConfigError;
use crate::pipeline::render::{RAW_KEY, Template};
use crate::pipeline::types::NotificationKind;

/// Scope name for targets that apply to every kind.
pub const GLOBAL_SCOPE: &str = "all";

const SCOPES: &[&str] = &[
    GLOBAL_SCOPE,
    "booking_request",
    "booking_confirmation",
    "cancellation",
    "message",
    "unknown",
];

pub const DEFAULT_TIMEOUT_SECS: f64 = 10.0;

/// Longest per-attempt timeout a target may declare.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

// ── Ordered maps ────────────────────────────────────────────────────

/// A string-keyed map that keeps declaration order and rejects duplicate keys.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderedMap<V>(pub Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(OrderedMap(Vec::new()))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(de::Error::custom(format!("duplicate key {key:?}")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

// ── Target definitions ──────────────────────────────────────────────

/// Request body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Json,
    Form,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// HTTP methods a delivery target may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target as written in one scope. Every attribute is optional so that a
/// kind-scope entry can override just the parts it names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TargetSpec {
    pub enabled: Option<bool>,
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Seconds; fractions allowed.
    pub timeout: Option<f64>,
    pub include_raw: Option<bool>,
    pub content_type: Option<ContentType>,
    pub require_complete: Option<bool>,
    pub template: Option<Template>,
}

impl TargetSpec {
    /// Layer `over` on top of `self`. Present attributes in `over` win;
    /// headers merge key-wise with case-insensitive names.
    pub fn merge(&self, over: &TargetSpec) -> TargetSpec {
        let mut headers = self.headers.clone();
        for (name, value) in &over.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.clone(), value.clone());
        }

        TargetSpec {
            enabled: over.enabled.or(self.enabled),
            url: over.url.clone().or_else(|| self.url.clone()),
            method: over.method.clone().or_else(|| self.method.clone()),
            headers,
            timeout: over.timeout.or(self.timeout),
            include_raw: over.include_raw.or(self.include_raw),
            content_type: over.content_type.or(self.content_type),
            require_complete: over.require_complete.or(self.require_complete),
            template: over.template.clone().or_else(|| self.template.clone()),
        }
    }
}

/// The `services` section: a global scope plus optional per-kind scopes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicesConfig {
    pub global: Vec<(String, TargetSpec)>,
    pub by_kind: HashMap<NotificationKind, Vec<(String, TargetSpec)>>,
}

impl ServicesConfig {
    /// Targets declared in the scope for `kind`.
    pub fn scope(&self, kind: NotificationKind) -> &[(String, TargetSpec)] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<'de> Deserialize<'de> for ServicesConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let OrderedMap(scopes) = OrderedMap::<Option<OrderedMap<TargetSpec>>>::deserialize(deserializer)?;

        let mut config = ServicesConfig::default();
        for (scope, targets) in scopes {
            let targets = targets.map(|t| t.0).unwrap_or_default();
            if scope == GLOBAL_SCOPE {
                config.global = targets;
                continue;
            }
            let kind: NotificationKind = scope
                .parse()
                .map_err(|_| <D::Error as de::Error>::unknown_variant(&scope, SCOPES))?;
            config.by_kind.insert(kind, targets);
        }
        Ok(config)
    }
}

// ── Resolved targets ────────────────────────────────────────────────

/// A fully resolved, validated delivery target.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryTarget {
    pub name: String,
    pub url: Url,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub template: Template,
    pub include_raw: bool,
    pub content_type: ContentType,
    pub require_complete: bool,
}

/// Outcome of resolving the config for one kind.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Dispatch plan, in order.
    pub targets: Vec<DeliveryTarget>,
    /// One entry per target that failed validation.
    pub errors: Vec<ConfigError>,
    /// Targets switched off with `enabled: false`.
    pub disabled: Vec<String>,
}

/// Build the ordered dispatch plan for `kind`.
pub fn resolve(kind: NotificationKind, services: &ServicesConfig) -> Resolution {
    let kind_scope = services.scope(kind);
    let is_global = |name: &str| services.global.iter().any(|(n, _)| n == name);

    let kind_only = kind_scope
        .iter()
        .filter(|(name, _)| !is_global(name.as_str()))
        .map(|(name, spec)| (name.as_str(), spec.clone()));

    let global = services.global.iter().map(|(name, spec)| {
        let merged = match kind_scope.iter().find(|(n, _)| n == name) {
            Some((_, over)) => spec.merge(over),
            None => spec.clone(),
        };
        (name.as_str(), merged)
    });

    let mut resolution = Resolution::default();
    for (name, spec) in kind_only.chain(global) {
        if spec.enabled == Some(false) {
            debug!(kind = %kind, target = %name, "Delivery target disabled");
            resolution.disabled.push(name.to_string());
            continue;
        }
        match finalize(name, spec, kind) {
            Ok(target) => resolution.targets.push(target),
            Err(e) => {
                warn!(kind = %kind, target = %name, error = %e, "Skipping misconfigured delivery target");
                resolution.errors.push(e);
            }
        }
    }

    debug!(
        kind = %kind,
        targets = resolution.targets.len(),
        errors = resolution.errors.len(),
        disabled = resolution.disabled.len(),
        "Resolved delivery plan"
    );
    resolution
}

/// Validate a merged spec and fill in defaults.
fn finalize(name: &str, spec: TargetSpec, kind: NotificationKind) -> Result<DeliveryTarget, ConfigError> {
    let raw_url = spec
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ConfigError::MissingUrl {
            target: name.to_string(),
        })?;
    let url = Url::parse(raw_url).map_err(|e| ConfigError::InvalidUrl {
        target: name.to_string(),
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            target: name.to_string(),
            url: raw_url.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }

    let method = match spec.method.as_deref() {
        None => HttpMethod::default(),
        Some(raw) => HttpMethod::parse(raw).ok_or_else(|| ConfigError::InvalidMethod {
            target: name.to_string(),
            method: raw.to_string(),
        })?,
    };

    let seconds = spec.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
    let timeout = Duration::try_from_secs_f64(seconds)
        .ok()
        .filter(|t| !t.is_zero() && *t <= MAX_TIMEOUT)
        .ok_or_else(|| ConfigError::InvalidTimeout {
            target: name.to_string(),
            seconds: seconds.to_string(),
        })?;

    if let Some((header, _)) = spec.headers.iter().find(|(h, v)| {
        HeaderName::from_bytes(h.as_bytes()).is_err() || HeaderValue::from_str(v).is_err()
    }) {
        return Err(ConfigError::InvalidHeader {
            target: name.to_string(),
            header: header.clone(),
        });
    }

    let template = spec.template.unwrap_or_else(|| Template::identity(kind));
    if template.contains_key(RAW_KEY) {
        return Err(ConfigError::ReservedKey {
            target: name.to_string(),
            key: RAW_KEY.to_string(),
        });
    }

    Ok(DeliveryTarget {
        name: name.to_string(),
        url,
        method,
        headers: spec.headers,
        timeout,
        template,
        include_raw: spec.include_raw.unwrap_or(false),
        content_type: spec.content_type.unwrap_or_default(),
        require_complete: spec.require_complete.unwrap_or(false),
    })
}
