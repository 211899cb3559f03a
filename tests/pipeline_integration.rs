//! End-to-end tests for the notification pipeline.
//!
//! Each test spins up an Axum server on a random port that records every
//! request it receives, then runs real emails through the coordinator with
//! the production HTTP transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use booking_relay::config::AppConfig;
use booking_relay::email::RawEmail;
use booking_relay::pipeline::dispatch::{DeliveryStatus, ErrorClass};
use booking_relay::pipeline::{Coordinator, HttpTransport, NotificationKind, Stage};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One request as the receiving server saw it.
#[derive(Debug, Clone)]
struct Captured {
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("body is not JSON")
    }
}

type Captures = Arc<Mutex<Vec<Captured>>>;

async fn capture(
    State(captures): State<Captures>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    captures.lock().unwrap().push(Captured {
        path: uri.path().to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    match uri.path() {
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            StatusCode::OK
        }
        "/reject" => StatusCode::UNPROCESSABLE_ENTITY,
        "/unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// Start a recording server on a random port, return (base url, captures).
async fn start_server() -> (String, Captures) {
    let captures: Captures = Arc::default();
    let app = Router::new()
        .fallback(capture)
        .with_state(Arc::clone(&captures));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), captures)
}

fn coordinator(yaml: &str) -> Coordinator {
    let config = AppConfig::from_yaml(yaml).expect("invalid test config");
    Coordinator::from_config(&config, Arc::new(HttpTransport::new()))
}

fn requests_to(captures: &Captures, path: &str) -> Vec<Captured> {
    captures
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.path == path)
        .cloned()
        .collect()
}

const BOOKING_REQUEST_EML: &str = "From: Airbnb <automated@airbnb.com>\r
To: host@example.com\r
Subject: Booking request from Ken Sato for Harbor Loft\r
Message-ID: <scenario-a@airbnb.com>\r
Date: Tue, 15 Apr 2025 09:00:00 +0000\r
MIME-Version: 1.0\r
Content-Type: multipart/alternative; boundary=\"b1\"\r
\r
--b1\r
Content-Type: text/plain; charset=utf-8\r
\r
Booking request from Ken Sato for Harbor Loft.\r
Please accept or decline within 24 hours.\r
\r
--b1\r
Content-Type: text/html; charset=utf-8\r
\r
<html><body><div data-kind=\"booking_request\">\r
<span data-field=\"guest\">Ken Sato</span>\r
<span data-field=\"property\">Harbor Loft</span>\r
<span data-field=\"check_in\">2025-06-10</span>\r
<span data-field=\"check_out\">2025-06-14</span>\r
<span data-field=\"num_guests\">3</span>\r
</div></body></html>\r
--b1--\r
";

// ── Scenario A: booking request via markup ─────────────────────────

#[tokio::test]
async fn booking_request_markup_is_delivered_verbatim() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        r#"
services:
  all:
    hook:
      url: {base}/hook
      headers:
        Authorization: Bearer global
        X-Source: relay
      template:
        id: notification_id
        guest: guest
        property: property
        check_in: check_in
        check_out: check_out
        guests: num_guests
  booking_request:
    hook:
      headers:
        authorization: Bearer requests
"#
    ));

    let email = RawEmail::from_rfc822(BOOKING_REQUEST_EML.as_bytes()).unwrap();
    let report = timeout(TEST_TIMEOUT, coordinator.run(email)).await.unwrap();

    assert_eq!(report.kind, NotificationKind::BookingRequest);
    assert!(report.missing_fields.is_empty(), "{:?}", report.missing_fields);
    assert_eq!(report.stage, Stage::Completed);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].is_delivered());
    assert_eq!(report.outcomes[0].attempts, 1);

    let seen = requests_to(&captures, "/hook");
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].json(),
        serde_json::json!({
            "id": "scenario-a@airbnb.com",
            "guest": "Ken Sato",
            "property": "Harbor Loft",
            "check_in": "2025-06-10",
            "check_out": "2025-06-14",
            "guests": 3,
        })
    );
    assert_eq!(seen[0].headers["authorization"], "Bearer requests");
    assert_eq!(seen[0].headers["x-source"], "relay");
    assert_eq!(seen[0].headers["content-type"], "application/json");
}

// ── Scenario B: unknown notification ───────────────────────────────

#[tokio::test]
async fn unknown_notification_goes_to_global_targets_with_raw_body() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        r#"
services:
  all:
    archive:
      url: {base}/archive
      include_raw: true
  booking_request:
    requests_only:
      url: {base}/requests
"#
    ));

    let email = RawEmail::new(
        "scenario-b",
        "automated@airbnb.com",
        "Your monthly earnings summary",
        "You earned a lot this month.",
    )
    .with_html("<p>You earned a lot this month.</p>");
    let report = timeout(TEST_TIMEOUT, coordinator.run(email)).await.unwrap();

    assert_eq!(report.kind, NotificationKind::Unknown);
    assert!(report.missing_fields.is_empty());
    let names: Vec<&str> = report.outcomes.iter().map(|o| o.target.as_str()).collect();
    assert_eq!(names, ["archive"]);
    assert!(requests_to(&captures, "/requests").is_empty());

    let body = requests_to(&captures, "/archive")[0].json();
    assert_eq!(body["kind"], "unknown");
    assert_eq!(body["notification_id"], "scenario-b");
    assert_eq!(body["_raw"]["text"], "You earned a lot this month.");
    assert_eq!(body["_raw"]["html"], "<p>You earned a lot this month.</p>");
}

// ── Scenario C: cancellation with a timing-out sibling ─────────────

#[tokio::test]
async fn timing_out_target_fails_while_sibling_delivers() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        r#"
services:
  all:
    slow:
      url: {base}/slow
      timeout: 0.2
    fast:
      url: {base}/hook
dispatch:
  max_attempts: 3
  base_delay_ms: 10
  jitter: false
"#
    ));

    let email = RawEmail::new(
        "scenario-c",
        "automated@airbnb.com",
        "Reservation HMQ8Z2K4TT canceled",
        "Your guest Maria Lopez has canceled.\n\
         The reservation for Lakeside Cabin has been canceled.\n\
         Reason: Change of plans\n",
    );
    let report = timeout(TEST_TIMEOUT, coordinator.run(email)).await.unwrap();

    assert_eq!(report.kind, NotificationKind::Cancellation);
    assert!(report.missing_fields.is_empty(), "{:?}", report.missing_fields);

    let slow = &report.outcomes[0];
    assert_eq!(slow.target, "slow");
    assert_eq!(slow.status, DeliveryStatus::Failed);
    assert_eq!(slow.attempts, 3);
    assert_eq!(slow.last_error, Some(ErrorClass::Timeout));

    let fast = &report.outcomes[1];
    assert_eq!(fast.target, "fast");
    assert!(fast.is_delivered());
    assert_eq!(fast.attempts, 1);

    assert_eq!(requests_to(&captures, "/slow").len(), 3);
    let body = requests_to(&captures, "/hook")[0].json();
    assert_eq!(body["reservation_id"], "HMQ8Z2K4TT");
    assert_eq!(body["guest"], "Maria Lopez");
    assert_eq!(body["property"], "Lakeside Cabin");
}

// ── Status handling ─────────────────────────────────────────────────

#[tokio::test]
async fn client_error_is_not_retried_but_server_error_is() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        r#"
services:
  all:
    reject:
      url: {base}/reject
    unavailable:
      url: {base}/unavailable
dispatch:
  max_attempts: 3
  base_delay_ms: 5
  jitter: false
"#
    ));

    let email = RawEmail::new(
        "status-1",
        "automated@airbnb.com",
        "New message from Maria",
        "Message: Is parking available?",
    );
    let report = timeout(TEST_TIMEOUT, coordinator.run(email)).await.unwrap();

    assert_eq!(report.outcomes[0].attempts, 1);
    assert_eq!(report.outcomes[0].last_error, Some(ErrorClass::ClientError));
    assert_eq!(report.outcomes[0].status_code, Some(422));
    assert_eq!(report.outcomes[1].attempts, 3);
    assert_eq!(report.outcomes[1].last_error, Some(ErrorClass::ServerError));

    assert_eq!(requests_to(&captures, "/reject").len(), 1);
    assert_eq!(requests_to(&captures, "/unavailable").len(), 3);
}

#[tokio::test]
async fn form_target_receives_urlencoded_body() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        r#"
services:
  all:
    legacy:
      url: {base}/form
      method: PUT
      content_type: form
      template:
        from: sender_name
        text: message_content
        listing: property
"#
    ));

    let email = RawEmail::new(
        "form-1",
        "automated@airbnb.com",
        "New message from Maria",
        "Message: Is parking available?",
    );
    let report = timeout(TEST_TIMEOUT, coordinator.run(email)).await.unwrap();
    assert!(report.outcomes[0].is_delivered());

    let seen = requests_to(&captures, "/form");
    assert_eq!(
        seen[0].headers["content-type"],
        "application/x-www-form-urlencoded"
    );
    assert_eq!(
        seen[0].body,
        "from=Maria&listing=&text=Is+parking+available%3F"
    );
}

#[tokio::test]
async fn batch_overlaps_emails_and_reports_each() {
    let (base, captures) = start_server().await;
    let coordinator = coordinator(&format!(
        "services:\n  all:\n    hook:\n      url: {base}/hook\ndispatch:\n  max_concurrent_emails: 3\n"
    ));

    let emails: Vec<RawEmail> = (0..6)
        .map(|i| {
            RawEmail::new(
                format!("batch-{i}"),
                "automated@airbnb.com",
                "Reservation confirmed",
                format!("Reservation code: HMBATCH{i:03}\nGuest: Guest {i}\n"),
            )
        })
        .collect();
    let reports = timeout(TEST_TIMEOUT, coordinator.run_batch(emails)).await.unwrap();

    assert_eq!(reports.len(), 6);
    assert!(reports.iter().all(|r| r.kind == NotificationKind::BookingConfirmation));
    assert!(reports.iter().all(|r| r.delivered_count() == 1));
    assert_eq!(requests_to(&captures, "/hook").len(), 6);
}
