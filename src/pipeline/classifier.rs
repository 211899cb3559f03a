//! Notification classifier — rule-based, no I/O.
//!
//! Each rule is a conjunction of optional signals (sender domain, subject
//! pattern, body marker). Rules are kept sorted by kind priority:
//! booking_request > booking_confirmation > cancellation > message.
//! A cancellation mail often repeats booking vocabulary, so the more
//! specific kinds get first look. First match wins; no match is `Unknown`.

use regex::Regex;
use tracing::debug;

use crate::email::RawEmail;
use crate::pipeline::types::NotificationKind;

/// Sender domains the default rules accept.
pub const DEFAULT_SENDER_DOMAINS: &[&str] = &[
    "airbnb.com",
    "airbnb.co.jp",
    "airbnb.co.uk",
    "airbnb.ca",
    "airbnb.com.au",
    "airbnb.de",
    "airbnb.fr",
];

/// A single classification rule. Absent signals always hold.
#[derive(Debug, Clone)]
pub struct ClassifyRule {
    pub kind: NotificationKind,
    /// Human-readable description, used in logs.
    pub label: String,
    /// Sender must come from one of these domains (or a subdomain).
    pub sender_domains: Option<Vec<String>>,
    /// Pattern over the subject line.
    pub subject: Option<Regex>,
    /// Marker over the plain body and the markup body.
    pub body: Option<Regex>,
}

impl ClassifyRule {
    fn matches(&self, email: &RawEmail) -> bool {
        if let Some(domains) = &self.sender_domains
            && !sender_in_domains(email, domains)
        {
            return false;
        }

        if let Some(subject) = &self.subject
            && !subject.is_match(&email.subject)
        {
            return false;
        }

        if let Some(body) = &self.body {
            let in_text = body.is_match(&email.text_body);
            let in_html = email.html_body.as_deref().is_some_and(|h| body.is_match(h));
            if !in_text && !in_html {
                return false;
            }
        }

        true
    }
}

/// Check whether the sender's domain equals or is a subdomain of one of `domains`.
pub fn sender_in_domains(email: &RawEmail, domains: &[String]) -> bool {
    let Some(domain) = email.sender_domain() else {
        return false;
    };
    domains.iter().any(|d| {
        let d = d.trim_start_matches('@').to_lowercase();
        domain == d || domain.ends_with(&format!(".{d}"))
    })
}

/// Ordered rule list mapping an email to a notification kind.
pub struct Classifier {
    rules: Vec<ClassifyRule>,
}

impl Classifier {
    /// Create a classifier with the default rule table for the given sender domains.
    pub fn default_rules(sender_domains: &[String]) -> Self {
        let domains = Some(sender_domains.to_vec());
        let rule = |kind, label: &str, subject: Option<&str>, body: Option<&str>| ClassifyRule {
            kind,
            label: label.into(),
            sender_domains: domains.clone(),
            subject: subject.map(|s| Regex::new(s).unwrap()),
            body: body.map(|b| Regex::new(b).unwrap()),
        };

        let rules = vec![
            rule(
                NotificationKind::BookingRequest,
                "booking request subject",
                Some(r"(?i)\b(booking|reservation) (request|inquiry)\b|予約リクエスト"),
                None,
            ),
            rule(
                NotificationKind::BookingRequest,
                "respond-to-request body",
                None,
                Some(r#"(?i)\b(accept or decline|respond to (this|the|their) (booking |reservation )?request)\b|data-kind="booking_request""#),
            ),
            rule(
                NotificationKind::BookingConfirmation,
                "confirmation subject",
                Some(r"(?i)\b(confirmed|confirmation|booked)\b|予約確定|予約が確定"),
                None,
            ),
            rule(
                NotificationKind::BookingConfirmation,
                "confirmed-reservation body",
                None,
                Some(r#"(?i)\b(new )?(booking|reservation) (is |has been )?confirmed\b|data-kind="booking_confirmation""#),
            ),
            rule(
                NotificationKind::Cancellation,
                "cancellation subject",
                Some(r"(?i)\b(cancell?ed|cancellation)\b|キャンセル"),
                None,
            ),
            rule(
                NotificationKind::Cancellation,
                "cancelled-reservation body",
                None,
                Some(r#"(?i)\bhas been cancell?ed\b|data-kind="cancellation""#),
            ),
            rule(
                NotificationKind::Message,
                "message subject",
                Some(r"(?i)\b(new message|message from|sent you a message|re: reservation)\b|メッセージ"),
                None,
            ),
            rule(
                NotificationKind::Message,
                "reply-to-guest body",
                None,
                Some(r#"(?i)\breply to (this message|your guest)\b|data-kind="message""#),
            ),
        ];

        let mut classifier = Self { rules: Vec::new() };
        for rule in rules {
            classifier.add_rule(rule);
        }
        classifier
    }

    /// Create an empty classifier (everything is `Unknown`).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Insert a rule after every rule of equal or higher priority.
    ///
    /// Keeps the priority order intact no matter when rules are added;
    /// within one kind, declaration order is preserved. Rules for
    /// `Unknown` are ignored since that kind means "no rule matched".
    pub fn add_rule(&mut self, rule: ClassifyRule) {
        if rule.kind == NotificationKind::Unknown {
            return;
        }
        let pos = self
            .rules
            .iter()
            .position(|r| r.kind.priority() > rule.kind.priority())
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, rule);
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ClassifyRule] {
        &self.rules
    }

    /// Classify an email. Deterministic and infallible.
    pub fn classify(&self, email: &RawEmail) -> NotificationKind {
        for rule in &self.rules {
            if rule.matches(email) {
                debug!(
                    id = %email.message_id,
                    kind = %rule.kind,
                    rule = %rule.label,
                    "Email matched classification rule"
                );
                return rule.kind;
            }
        }

        debug!(id = %email.message_id, "No classification rule matched");
        NotificationKind::Unknown
    }
}

impl Default for Classifier {
    fn default() -> Self {
        let domains: Vec<String> = DEFAULT_SENDER_DOMAINS.iter().map(|d| d.to_string()).collect();
        Self::default_rules(&domains)
    }
}
