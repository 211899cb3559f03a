//! Pipeline coordinator — sequences one email through every stage.
//!
//! Classification, extraction, resolution and rendering run inline.
//! Deliveries for one record fan out onto a `JoinSet` bounded by a
//! semaphore; each task reports its outcome over an mpsc channel and the
//! coordinator reassembles them in plan order.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::email::RawEmail;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::dispatch::{DeliveryTransport, DispatchOutcome, Dispatcher, ErrorClass};
use crate::pipeline::extractor::Extractor;
use crate::pipeline::render::render;
use crate::pipeline::resolver::{DeliveryTarget, ServicesConfig, resolve};
use crate::pipeline::types::{CanonicalRecord, NotificationKind};

// ── Stage machine ───────────────────────────────────────────────────

/// Where an email is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw email received.
    Fetched,
    /// Kind decided.
    Classified,
    /// Canonical record built.
    Extracted,
    /// Delivery targets resolved.
    Planned,
    /// Deliveries in flight.
    Dispatching,
    /// Every resolved target has an outcome.
    Completed,
}

impl Stage {
    /// Stages only ever advance one step.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;

        matches!(
            (self, target),
            (Fetched, Classified)
                | (Classified, Extracted)
                | (Extracted, Planned)
                | (Planned, Dispatching)
                | (Dispatching, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetched => "fetched",
            Self::Classified => "classified",
            Self::Extracted => "extracted",
            Self::Planned => "planned",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// A stage transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub timestamp: DateTime<Utc>,
}

/// Progress of one email through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub notification_id: String,
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub transitions: Vec<StageTransition>,
}

impl PipelineRun {
    pub fn new(notification_id: impl Into<String>) -> Self {
        Self {
            notification_id: notification_id.into(),
            stage: Stage::Fetched,
            started_at: Utc::now(),
            transitions: Vec::new(),
        }
    }

    /// Advance to `next`, recording the transition.
    pub fn transition_to(&mut self, next: Stage) -> Result<(), String> {
        if !self.stage.can_transition_to(next) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.stage, next
            ));
        }

        self.transitions.push(StageTransition {
            from: self.stage,
            to: next,
            timestamp: Utc::now(),
        });
        debug!(id = %self.notification_id, from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
        Ok(())
    }
}

// ── Report ──────────────────────────────────────────────────────────

/// Everything that happened to one email.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub notification_id: String,
    pub kind: NotificationKind,
    pub stage: Stage,
    pub summary: String,
    pub missing_fields: Vec<String>,
    /// One per resolved target, in plan order.
    pub outcomes: Vec<DispatchOutcome>,
    /// Targets dropped because their configuration is invalid.
    pub config_errors: Vec<String>,
    /// Targets switched off for this kind.
    pub disabled: Vec<String>,
    pub transitions: Vec<StageTransition>,
    pub completed_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }
}

// ── Coordinator ─────────────────────────────────────────────────────

/// Runs emails through classify → extract → resolve → render → dispatch.
pub struct Coordinator {
    classifier: Classifier,
    extractor: Extractor,
    services: Arc<ServicesConfig>,
    dispatcher: Dispatcher,
    max_concurrent_dispatches: usize,
    max_concurrent_emails: usize,
}

impl Coordinator {
    pub fn new(
        classifier: Classifier,
        extractor: Extractor,
        services: ServicesConfig,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            classifier,
            extractor,
            services: Arc::new(services),
            dispatcher,
            max_concurrent_dispatches: 8,
            max_concurrent_emails: 4,
        }
    }

    /// Build a coordinator with the default rule tables and the given config.
    pub fn from_config(config: &AppConfig, transport: Arc<dyn DeliveryTransport>) -> Self {
        Self::new(
            Classifier::default_rules(&config.classifier.sender_domains),
            Extractor::default_rules(),
            config.services.clone(),
            Dispatcher::new(transport, config.dispatch.retry_policy()),
        )
        .with_limits(
            config.dispatch.max_concurrent_dispatches,
            config.dispatch.max_concurrent_emails,
        )
    }

    /// Cap concurrent deliveries per email and concurrent emails per batch.
    /// Zero is treated as one.
    pub fn with_limits(mut self, dispatches: usize, emails: usize) -> Self {
        self.max_concurrent_dispatches = dispatches.max(1);
        self.max_concurrent_emails = emails.max(1);
        self
    }

    /// Process one email to completion. Target failures never abort the run.
    pub async fn run(&self, email: RawEmail) -> DeliveryReport {
        let mut run = PipelineRun::new(&email.message_id);

        let kind = self.classifier.classify(&email);
        self.advance(&mut run, Stage::Classified);

        let record = self.extractor.extract(&email, kind);
        self.advance(&mut run, Stage::Extracted);

        let resolution = resolve(kind, &self.services);
        self.advance(&mut run, Stage::Planned);

        self.advance(&mut run, Stage::Dispatching);
        let outcomes = self.dispatch_all(&record, &resolution.targets).await;
        self.advance(&mut run, Stage::Completed);

        let report = DeliveryReport {
            notification_id: record.notification_id().to_string(),
            kind,
            stage: run.stage,
            summary: record.summary(),
            missing_fields: record.missing_fields().to_vec(),
            outcomes,
            config_errors: resolution.errors.iter().map(|e| e.to_string()).collect(),
            disabled: resolution.disabled,
            transitions: run.transitions,
            completed_at: Utc::now(),
        };

        info!(
            id = %report.notification_id,
            kind = %kind,
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            config_errors = report.config_errors.len(),
            "Notification processed"
        );
        report
    }

    /// Process many emails, overlapping up to `max_concurrent_emails` at a time.
    /// Reports come back in completion order.
    pub async fn run_batch(&self, emails: Vec<RawEmail>) -> Vec<DeliveryReport> {
        info!(count = emails.len(), "Processing notification batch");
        stream::iter(emails)
            .map(|email| self.run(email))
            .buffer_unordered(self.max_concurrent_emails)
            .collect()
            .await
    }

    fn advance(&self, run: &mut PipelineRun, next: Stage) {
        if let Err(e) = run.transition_to(next) {
            warn!(id = %run.notification_id, error = %e, "Invalid stage transition");
        }
    }

    /// Fan deliveries out and collect one outcome per target, in plan order.
    async fn dispatch_all(
        &self,
        record: &CanonicalRecord,
        targets: &[DeliveryTarget],
    ) -> Vec<DispatchOutcome> {
        if targets.is_empty() {
            return Vec::new();
        }

        let permits = targets.len().min(self.max_concurrent_dispatches);
        let semaphore = Arc::new(Semaphore::new(permits));
        let (tx, mut rx) = mpsc::channel::<(usize, DispatchOutcome)>(targets.len());
        let mut tasks = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            if target.require_complete && !record.is_complete() {
                warn!(
                    id = %record.notification_id(),
                    target = %target.name,
                    missing = ?record.missing_fields(),
                    "Target requires a complete record, skipping"
                );
                let outcome = DispatchOutcome::not_attempted(&target.name, ErrorClass::IncompleteRecord);
                // Capacity covers every target, so this never waits.
                let _ = tx.send((index, outcome)).await;
                continue;
            }

            let payload = render(record, &target.template, target.include_raw);
            let target = target.clone();
            let dispatcher = self.dispatcher.clone();
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = dispatcher.dispatch(&payload, &target).await;
                let _ = tx.send((index, outcome)).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<DispatchOutcome>> = vec![None; targets.len()];
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(id = %record.notification_id(), error = %e, "Dispatch task failed");
            }
        }

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| DispatchOutcome::not_attempted(&target.name, ErrorClass::Request))
            })
            .collect()
    }
}
