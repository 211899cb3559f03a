//! Notification pipeline.
//!
//! Every email flows through:
//! 1. `Classifier::classify()` — sender/subject/body rules pick a kind
//! 2. `Extractor::extract()` — per-kind rule tables fill a canonical record
//! 3. `resolve()` — global and per-kind config merge into ordered targets
//! 4. `render()` — each target's template projects the record into a payload
//! 5. `Dispatcher::dispatch()` — HTTP delivery with timeout and retry
//!
//! `Coordinator` sequences the steps and aggregates a `DeliveryReport`.
//! Steps 1–4 are pure; only dispatch does I/O.

pub mod classifier;
pub mod coerce;
pub mod coordinator;
pub mod dispatch;
pub mod extractor;
pub mod render;
pub mod resolver;
pub mod retry;
pub mod types;

pub use classifier::Classifier;
pub use coordinator::{Coordinator, DeliveryReport, Stage};
pub use dispatch::{DeliveryTransport, DispatchOutcome, Dispatcher, HttpTransport};
pub use extractor::Extractor;
pub use render::{Payload, Template, render};
pub use resolver::{DeliveryTarget, Resolution, ServicesConfig, resolve};
pub use retry::RetryPolicy;
pub use types::{CanonicalRecord, FieldValue, NotificationKind};
