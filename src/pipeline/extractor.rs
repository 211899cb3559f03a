//! Field extractor — data-driven rule tables, one per notification kind.
//!
//! Each field rule is an ordered list of matchers. Markup anchors come
//! first, then labelled-line patterns over the plain body, then fallbacks
//! for layout variants seen in the wild. The first matcher whose capture
//! survives type coercion wins. Fields never influence each other.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use tracing::{debug, info};

use crate::email::{RawEmail, html_to_text, strip_html};
use crate::pipeline::coerce::Coercion;
use crate::pipeline::types::{CanonicalRecord, FieldValue, NotificationKind, RawBody, field};

/// Which tier of the lookup order a matcher belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Labelled element or attribute in the HTML body.
    Markup,
    /// Labelled-line pattern over the plain body.
    Pattern,
    /// Secondary pattern for known layout variants.
    Fallback,
}

/// Which part of the email a matcher reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Html,
    Body,
    Subject,
}

/// One lookup attempt: a pattern, the capture group holding the value, and where to look.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub tier: Tier,
    pub source: Source,
    pub pattern: Regex,
    pub group: usize,
}

impl Matcher {
    fn pattern(source: Source, tier: Tier, pattern: &str, group: usize) -> Self {
        Self {
            tier,
            source,
            pattern: Regex::new(pattern).unwrap(),
            group,
        }
    }

    /// Element whose `data-field` or `itemprop` is `name`: its `content`
    /// attribute in either order, else the inner text of a non-void element.
    fn markup(name: &str) -> [Self; 3] {
        let name = regex::escape(name);
        let anchor = format!(r#"\b(?:data-field|itemprop)\s*=\s*["']{name}["']"#);
        let content = r#"\bcontent\s*=\s*["']([^"']*)["']"#;
        [
            Self::pattern(
                Source::Html,
                Tier::Markup,
                &format!(r"(?is)<[^>]*{anchor}[^>]*{content}"),
                1,
            ),
            Self::pattern(
                Source::Html,
                Tier::Markup,
                &format!(r"(?is)<[^>]*{content}[^>]*{anchor}"),
                1,
            ),
            Self::pattern(
                Source::Html,
                Tier::Markup,
                &format!(r"(?is)<(?P<tag>[a-z][a-z0-9]*)\b[^>]*{anchor}(?:[^>]*[^>/])?>(.*?)</"),
                2,
            ),
        ]
    }

    fn find<'a>(&self, sources: &'a Sources<'_>) -> Option<std::borrow::Cow<'a, str>> {
        let haystack = match self.source {
            Source::Html => sources.html?,
            Source::Body => sources.body,
            Source::Subject => sources.subject,
        };
        // Void elements have no inner text; the lazy capture would run into a sibling.
        let caps = self.pattern.captures_iter(haystack).find(|caps| {
            caps.name("tag")
                .is_none_or(|tag| !VOID_ELEMENTS.contains(&tag.as_str().to_ascii_lowercase().as_str()))
        })?;
        let value = caps.get(self.group)?.as_str();
        Some(match self.source {
            Source::Html => strip_html(value).into(),
            Source::Body | Source::Subject => value.into(),
        })
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// The texts a matcher can read from.
struct Sources<'a> {
    html: Option<&'a str>,
    body: &'a str,
    subject: &'a str,
}

/// Ordered matchers for one canonical field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: &'static str,
    pub coercion: Coercion,
    pub matchers: Vec<Matcher>,
}

impl FieldRule {
    fn new(field: &'static str, coercion: Coercion) -> Self {
        Self {
            field,
            coercion,
            matchers: Vec::new(),
        }
    }

    fn markup(mut self, names: &[&str]) -> Self {
        for name in names {
            self.matchers.extend(Matcher::markup(name));
        }
        self
    }

    fn text(mut self, pattern: &str, group: usize) -> Self {
        self.matchers
            .push(Matcher::pattern(Source::Body, Tier::Pattern, pattern, group));
        self
    }

    /// Layout-variant pattern, tried on the body and then the subject.
    fn fallback(mut self, pattern: &str, group: usize) -> Self {
        self.matchers
            .push(Matcher::pattern(Source::Body, Tier::Fallback, pattern, group));
        self.matchers
            .push(Matcher::pattern(Source::Subject, Tier::Fallback, pattern, group));
        self
    }

    /// Layout-variant pattern that only makes sense on the body.
    fn body_fallback(mut self, pattern: &str, group: usize) -> Self {
        self.matchers
            .push(Matcher::pattern(Source::Body, Tier::Fallback, pattern, group));
        self
    }

    /// Run matchers in order; the first capture that coerces wins.
    fn apply(&self, sources: &Sources<'_>) -> Option<(FieldValue, Tier)> {
        self.matchers.iter().find_map(|m| {
            let raw = m.find(sources)?;
            let value = self.coercion.apply(&raw);
            if value.is_none() {
                debug!(
                    field = self.field,
                    raw = %raw,
                    "Captured value failed coercion, trying next matcher"
                );
            }
            value.map(|v| (v, m.tier))
        })
    }
}

// ── Shared patterns ─────────────────────────────────────────────────

const DATES_RANGE: &str = r"(?im)^\s*(?:dates?|stay|日程|日付)\s*[:：]\s*(.+?)\s+(?:to|until|-|–|~|〜)\s+(.+?)\s*$";
const TOTAL_LINE: &str = r"(?:total(?: amount| payout| price)?|amount|payout|合計|お支払い金額)";

/// Build the rule for `name` as used by `kind`.
///
/// Generic patterns apply to every kind; kind-specific fallbacks encode the
/// sentence layouts each notification type uses.
fn field_rule(kind: NotificationKind, name: &'static str) -> FieldRule {
    use NotificationKind::*;

    match name {
        field::GUEST => {
            let rule = FieldRule::new(name, Coercion::Text)
                .markup(&["guest", "guest_name", "underName"])
                .text(r"(?im)^\s*(?:guest(?:\s+name)?|ゲスト(?:名)?)\s*[:：]\s*(.+?)\s*$", 1);
            match kind {
                BookingRequest => rule.fallback(
                    r"(?i)\b(?:booking|reservation) request from\s+(.+?)\s+for\s",
                    1,
                ),
                BookingConfirmation => rule.fallback(
                    r"(?i)\breservation (?:is )?confirmed\s*[-–:]\s*(.+?)\s+arrives\b",
                    1,
                ),
                Cancellation => rule.fallback(
                    r"(?i)\b(?:your )?guest\s+(.+?)\s+(?:has\s+)?cancell?ed\b",
                    1,
                ),
                _ => rule,
            }
        }
        field::CHECK_IN => FieldRule::new(name, Coercion::Date)
            .markup(&["check_in", "checkin", "checkinDate", "checkinTime"])
            .text(
                r"(?im)^\s*(?:check[- ]?in|arrival|チェックイン)(?:\s+date)?\s*[:：]\s*(.+?)\s*$",
                1,
            )
            .body_fallback(DATES_RANGE, 1),
        field::CHECK_OUT => FieldRule::new(name, Coercion::Date)
            .markup(&["check_out", "checkout", "checkoutDate", "checkoutTime"])
            .text(
                r"(?im)^\s*(?:check[- ]?out|departure|チェックアウト)(?:\s+date)?\s*[:：]\s*(.+?)\s*$",
                1,
            )
            .body_fallback(DATES_RANGE, 2),
        field::NUM_GUESTS => FieldRule::new(name, Coercion::Integer)
            .markup(&["num_guests", "guests", "numGuests"])
            .text(
                r"(?im)^\s*(?:number of guests|guests|ゲスト人数|人数)\s*[:：]\s*(.+?)\s*$",
                1,
            )
            .body_fallback(r"(?i)\b(\d+)\s+(?:guests?|adults?)\b", 1)
            .body_fallback(r"(\d+)\s*名", 1),
        field::PROPERTY => {
            let rule = FieldRule::new(name, Coercion::Text)
                .markup(&["property", "listing", "listing_name", "reservationFor"])
                .text(
                    r"(?im)^\s*(?:property|listing|リスティング|物件)\s*[:：]\s*(.+?)\s*$",
                    1,
                );
            match kind {
                BookingRequest => rule.fallback(
                    r"(?im)\b(?:booking|reservation) request from\s+.+?\s+for\s+(.+?)\s*(?:[.!](?:\s|$)|$)",
                    1,
                ),
                BookingConfirmation => rule.fallback(
                    r"(?im)\b(?:booking|reservation) (?:for|at)\s+(.+?)\s+(?:is|has been)\s+confirmed\b",
                    1,
                ),
                Cancellation => rule.fallback(
                    r"(?im)\b(?:booking|reservation) (?:for|at)\s+(.+?)\s+(?:is|has been)\s+cancell?ed\b",
                    1,
                ),
                Message => rule.fallback(
                    r"(?im)\b(?:reservation|inquiry) at\s+(.+?)\s*(?:\s+for\s|[,(]|$)",
                    1,
                ),
                Unknown => rule,
            }
        }
        field::RESERVATION_ID => FieldRule::new(name, Coercion::Text)
            .markup(&["reservation_id", "confirmation_code", "reservationNumber"])
            .text(
                r"(?:(?i:reservation|confirmation)\s+(?i:code|number|id)|予約コード|確認コード)\s*[:#：]?\s*([A-Z0-9]{5,12})\b",
                1,
            )
            .fallback(r"\b(HM[A-Z0-9]{6,10})\b", 1),
        field::AMOUNT => FieldRule::new(name, Coercion::Amount)
            .markup(&["amount", "total", "totalPrice", "price"])
            .text(
                &format!(r"(?im)^\s*{TOTAL_LINE}[^:：\n]*[:：]\s*(.+?)\s*$"),
                1,
            )
            .body_fallback(r"(?i)\b(?:total|payout)\b[^\n\d]{0,40}?([$€£¥]\s?[\d.,]+)", 1),
        field::CURRENCY => FieldRule::new(name, Coercion::Currency)
            .markup(&["currency", "priceCurrency"])
            .text(
                &format!(r"(?im)^\s*{TOTAL_LINE}[^:：\n]*[:：]\s*(US\$|[$€£¥￥])"),
                1,
            )
            .text(
                &format!(r"(?im)^\s*{TOTAL_LINE}[^:：\n]*[:：]\s*[\d.,]+\s*([A-Z]{{3}}|円)"),
                1,
            )
            .body_fallback(r"\b(USD|EUR|GBP|JPY|AUD|CAD)\b", 1),
        field::CANCELLATION_REASON => FieldRule::new(name, Coercion::Text)
            .markup(&["cancellation_reason", "reason"])
            .text(
                r"(?im)^\s*(?:cancellation reason|reason(?: for cancell?ation)?|キャンセル理由)\s*[:：]\s*(.+?)\s*$",
                1,
            ),
        field::SENDER_NAME => FieldRule::new(name, Coercion::Text)
            .markup(&["sender_name", "sender", "author"])
            .text(r"(?im)^\s*(?:from|sender|送信者)\s*[:：]\s*(.+?)\s*$", 1)
            .fallback(r"(?im)\b(?:new )?message from\s+(.+?)\s*(?:[:.!,]|$)", 1)
            .body_fallback(r"(?im)^\s*(.+?)\s+(?:sent you a message|wrote|says)\s*:?\s*$", 1),
        field::MESSAGE_CONTENT => FieldRule::new(name, Coercion::Block)
            .markup(&["message_content", "message", "messageBody"])
            .text(r"(?ims)^\s*(?:message|メッセージ)\s*[:：]\s*(.+?)(?:\n\s*\n|\z)", 1)
            .body_fallback(
                r"(?im)^[^\n]+?\s+(?:sent you a message|wrote|says)[ \t]*:?[ \t]*\n(?s:(.+?))(?:\n[ \t]*\n|\z)",
                1,
            )
            .body_fallback(r#"(?m)^\s*["“](.+?)["”]\s*$"#, 1),
        // Schema fields are all covered above; anything else never matches.
        other => FieldRule::new(other, Coercion::Text),
    }
}

// ── Extractor ───────────────────────────────────────────────────────

/// Produces canonical records from raw emails using per-kind rule tables.
pub struct Extractor {
    tables: HashMap<NotificationKind, Vec<FieldRule>>,
}

impl Extractor {
    /// Create an extractor with the built-in rule tables.
    pub fn default_rules() -> Self {
        let tables = NotificationKind::PRIORITY
            .iter()
            .map(|&kind| {
                let rules = kind
                    .schema()
                    .fields()
                    .map(|name| field_rule(kind, name))
                    .collect();
                (kind, rules)
            })
            .collect();
        Self { tables }
    }

    /// Rules for a kind, in schema order. Empty for `Unknown`.
    pub fn rules_for(&self, kind: NotificationKind) -> &[FieldRule] {
        self.tables.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Extract a canonical record. Never fails; unmatched fields are recorded as missing.
    pub fn extract(&self, email: &RawEmail, kind: NotificationKind) -> CanonicalRecord {
        let stripped;
        let body = if email.text_body.trim().is_empty() {
            stripped = email.html_body.as_deref().map(html_to_text).unwrap_or_default();
            stripped.as_str()
        } else {
            email.text_body.as_str()
        };

        let sources = Sources {
            html: email.html_body.as_deref(),
            body,
            subject: &email.subject,
        };

        let mut fields = BTreeMap::new();
        for rule in self.rules_for(kind) {
            let value = match rule.apply(&sources) {
                Some((value, tier)) => {
                    debug!(
                        id = %email.message_id,
                        field = rule.field,
                        tier = ?tier,
                        "Extracted field"
                    );
                    Some(value)
                }
                None => None,
            };
            fields.insert(rule.field.to_string(), value);
        }

        let record = CanonicalRecord::new(
            email.message_id.clone(),
            kind,
            email.subject.clone(),
            email.sender.clone(),
            email.received_at,
            fields,
            RawBody {
                text: email.text_body.clone(),
                html: email.html_body.clone(),
            },
        );

        info!(
            id = %record.notification_id(),
            kind = %kind,
            missing = ?record.missing_fields(),
            "Extracted notification record"
        );

        record
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::default_rules()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> FieldValue {
        FieldValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn booking_request_email() -> RawEmail {
        RawEmail::new(
            "12345abc",
            "Airbnb <automated@airbnb.com>",
            "Booking request from John for Tokyo Apartment",
            "You have a booking request from John for Tokyo Apartment.\n\
             Dates: 1 May 2025 to 5 May 2025\n\
             Number of guests: 2\n\
             Please review and accept or decline this request.\n",
        )
    }

    #[test]
    fn booking_request_from_plain_text() {
        let extractor = Extractor::default();
        let record = extractor.extract(&booking_request_email(), NotificationKind::BookingRequest);

        assert_eq!(record.notification_id(), "12345abc");
        assert_eq!(record.get(field::GUEST), Some(&text("John")));
        assert_eq!(record.get(field::PROPERTY), Some(&text("Tokyo Apartment")));
        assert_eq!(record.get(field::CHECK_IN), Some(&ymd(2025, 5, 1)));
        assert_eq!(record.get(field::CHECK_OUT), Some(&ymd(2025, 5, 5)));
        assert_eq!(record.get(field::NUM_GUESTS), Some(&FieldValue::Integer(2)));
        assert!(record.is_complete());
    }

    #[test]
    fn booking_confirmation_with_amount() {
        let email = RawEmail::new(
            "67890xyz",
            "automated@airbnb.com",
            "Booking for Tokyo Apartment is confirmed",
            "The booking for Tokyo Apartment has been confirmed.\n\
             Reservation code: ABC123\n\
             Guest: Jane Doe\n\
             Dates: 1 May 2025 to 5 May 2025\n\
             Total amount: ¥50,000\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingConfirmation);

        assert_eq!(record.get(field::RESERVATION_ID), Some(&text("ABC123")));
        assert_eq!(record.get(field::PROPERTY), Some(&text("Tokyo Apartment")));
        assert_eq!(record.get(field::AMOUNT), Some(&FieldValue::Amount(dec!(50000))));
        assert_eq!(record.get(field::CURRENCY), Some(&text("JPY")));
        assert!(record.is_complete());
    }

    #[test]
    fn markup_wins_over_text() {
        let email = booking_request_email().with_html(
            r#"<table>
                 <tr><td>Guest</td><td data-field="guest"><b>John Smith</b></td></tr>
                 <tr><td itemprop="checkinDate" content="2025-05-02"></td></tr>
               </table>"#,
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);

        assert_eq!(record.get(field::GUEST), Some(&text("John Smith")));
        assert_eq!(record.get(field::CHECK_IN), Some(&ymd(2025, 5, 2)));
        // Not in markup, falls through to the text pattern
        assert_eq!(record.get(field::CHECK_OUT), Some(&ymd(2025, 5, 5)));
    }

    #[test]
    fn meta_content_before_anchor() {
        let email = booking_request_email().with_html(
            r#"<meta content="Harbor Loft" itemprop="reservationFor"><p>Welcome aboard</p>"#,
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);
        assert_eq!(record.get(field::PROPERTY), Some(&text("Harbor Loft")));
    }

    #[test]
    fn void_element_without_content_is_not_read_past() {
        let email = booking_request_email()
            .with_html(r#"<meta itemprop="reservationFor"><p>Welcome aboard</p>"#);
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);
        // Falls through to the plain-text layout
        assert_eq!(record.get(field::PROPERTY), Some(&text("Tokyo Apartment")));
    }

    #[test]
    fn self_closing_anchor_is_not_read_past() {
        let email = booking_request_email()
            .with_html(r#"<span data-field="guest"/><p>Welcome aboard</p>"#);
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);
        assert_eq!(record.get(field::GUEST), Some(&text("John")));
    }

    #[test]
    fn total_line_with_trailing_text() {
        let email = RawEmail::new(
            "t1",
            "automated@airbnb.com",
            "Reservation confirmed",
            "Reservation code: HMX1\nTotal (USD): $120.50 for 3 nights\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingConfirmation);
        assert_eq!(record.get(field::AMOUNT), Some(&FieldValue::Amount(dec!(120.50))));
        assert_eq!(record.get(field::CURRENCY), Some(&text("USD")));
    }

    #[test]
    fn html_only_email_uses_stripped_markup_as_body() {
        let email = RawEmail::new("h1", "automated@airbnb.com", "Booking request", "")
            .with_html("<p>Guest: Ana</p><p>Property: Beach House</p>");
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);
        assert_eq!(record.get(field::GUEST), Some(&text("Ana")));
        assert_eq!(record.get(field::PROPERTY), Some(&text("Beach House")));
    }

    #[test]
    fn coercion_failure_falls_through_then_missing() {
        let email = RawEmail::new(
            "c1",
            "automated@airbnb.com",
            "Booking request",
            "Guest: Kim\nCheck-in: sometime soon\nNumber of guests: two\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);

        assert!(record.get(field::CHECK_IN).is_none());
        assert!(record.get(field::NUM_GUESTS).is_none());
        assert_eq!(
            record.missing_fields(),
            &["check_in", "check_out", "num_guests", "property"]
        );
    }

    #[test]
    fn missing_and_present_partition_required_fields() {
        let extractor = Extractor::default();
        let email = RawEmail::new("p1", "automated@airbnb.com", "x", "Guest: Kim\nReservation code: HMABC12345");
        for kind in NotificationKind::PRIORITY {
            let record = extractor.extract(&email, kind);
            for name in kind.schema().required {
                let present = record.get(name).is_some();
                let missing = record.missing_fields().iter().any(|m| m == name);
                assert!(present != missing, "{kind}/{name} must be exactly one of present/missing");
            }
            assert_eq!(record.fields().len(), kind.schema().fields().count());
        }
    }

    #[test]
    fn unknown_has_no_fields_but_keeps_raw() {
        let email = RawEmail::new("u1", "someone@example.com", "Hi", "Just chatting")
            .with_html("<p>Just chatting</p>");
        let record = Extractor::default().extract(&email, NotificationKind::Unknown);

        assert_eq!(record.kind(), NotificationKind::Unknown);
        assert!(record.fields().is_empty());
        assert!(record.missing_fields().is_empty());
        assert_eq!(record.raw().text, "Just chatting");
        assert_eq!(record.raw().html.as_deref(), Some("<p>Just chatting</p>"));
    }

    #[test]
    fn cancellation_fields_and_reason() {
        let email = RawEmail::new(
            "x1",
            "automated@airbnb.com",
            "Reservation HMQ8Z2K4TT canceled",
            "Your guest Maria Lopez has canceled.\n\
             The reservation for Lakeside Cabin has been canceled.\n\
             Reason: Change of plans\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::Cancellation);

        assert_eq!(record.get(field::RESERVATION_ID), Some(&text("HMQ8Z2K4TT")));
        assert_eq!(record.get(field::GUEST), Some(&text("Maria Lopez")));
        assert_eq!(record.get(field::PROPERTY), Some(&text("Lakeside Cabin")));
        assert_eq!(record.get(field::CANCELLATION_REASON), Some(&text("Change of plans")));
        assert!(record.is_complete());
    }

    #[test]
    fn message_sender_from_subject_and_quoted_body() {
        let email = RawEmail::new(
            "m1",
            "express@airbnb.com",
            "New message from Maria",
            "Reply to this message\n\n\"Hi! Can we check in early?\"\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::Message);

        assert_eq!(record.get(field::SENDER_NAME), Some(&text("Maria")));
        assert_eq!(
            record.get(field::MESSAGE_CONTENT),
            Some(&text("Hi! Can we check in early?"))
        );
    }

    #[test]
    fn message_block_keeps_lines() {
        let email = RawEmail::new(
            "m2",
            "express@airbnb.com",
            "Message",
            "Sender: Ken\nMessage:\n  Hello!\n  Is parking available?\n\nReply on the app.",
        );
        let record = Extractor::default().extract(&email, NotificationKind::Message);
        assert_eq!(
            record.get(field::MESSAGE_CONTENT),
            Some(&text("Hello!\nIs parking available?"))
        );
        assert_eq!(record.get(field::SENDER_NAME), Some(&text("Ken")));
    }

    #[test]
    fn japanese_layout() {
        let email = RawEmail::new(
            "jp1",
            "automated@airbnb.co.jp",
            "予約リクエスト",
            "ゲスト：山田太郎\nチェックイン：2025年5月1日\nチェックアウト：2025年5月3日\n人数：3\n物件：渋谷ロフト\n",
        );
        let record = Extractor::default().extract(&email, NotificationKind::BookingRequest);

        assert_eq!(record.get(field::GUEST), Some(&text("山田太郎")));
        assert_eq!(record.get(field::CHECK_IN), Some(&ymd(2025, 5, 1)));
        assert_eq!(record.get(field::CHECK_OUT), Some(&ymd(2025, 5, 3)));
        assert_eq!(record.get(field::NUM_GUESTS), Some(&FieldValue::Integer(3)));
        assert_eq!(record.get(field::PROPERTY), Some(&text("渋谷ロフト")));
    }

    #[test]
    fn rule_tables_follow_schema_and_tier_order() {
        let extractor = Extractor::default();
        assert!(extractor.rules_for(NotificationKind::Unknown).is_empty());

        for kind in NotificationKind::PRIORITY {
            let names: Vec<_> = extractor.rules_for(kind).iter().map(|r| r.field).collect();
            let schema: Vec<_> = kind.schema().fields().collect();
            assert_eq!(names, schema);

            for rule in extractor.rules_for(kind) {
                let tiers: Vec<_> = rule.matchers.iter().map(|m| m.tier as u8).collect();
                assert!(tiers.windows(2).all(|w| w[0] <= w[1]), "{kind}/{} out of order", rule.field);
            }
        }
    }

    #[test]
    fn extraction_is_pure() {
        let extractor = Extractor::default();
        let email = booking_request_email();
        let a = extractor.extract(&email, NotificationKind::BookingRequest);
        let b = extractor.extract(&email, NotificationKind::BookingRequest);
        assert_eq!(a.fields(), b.fields());
        assert_eq!(a.missing_fields(), b.missing_fields());
    }
}
