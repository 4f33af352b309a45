//! Metrics collection for observability
//!
//! Prometheus collectors registered on a private [`Registry`], so several
//! validators or drivers can live in one process.
//!
//! # Metrics
//!
//! - `ledger_transactions_validated_total` - Transactions accepted by the validator
//! - `ledger_transactions_rejected_total{kind}` - Rejections by error kind
//! - `ledger_validation_duration_seconds` - Histogram of validation latencies
//! - `ledger_blocks_written_total` - Blocks committed
//! - `ledger_votes_cast_total{valid}` - Votes written
//! - `ledger_commit_conflicts_total` - Optimistic-concurrency retries

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accepted transactions
    pub transactions_validated: IntCounter,

    /// Rejected transactions, labelled by `ValidationError::kind`
    pub transactions_rejected: IntCounterVec,

    /// Validation duration histogram
    pub validation_duration: Histogram,

    /// Blocks committed
    pub blocks_written: IntCounter,

    /// Votes written, labelled by verdict
    pub votes_cast: IntCounterVec,

    /// Block/vote commits that hit a conflict
    pub commit_conflicts: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_validated", &self.transactions_validated.get())
            .field("blocks_written", &self.blocks_written.get())
            .field("commit_conflicts", &self.commit_conflicts.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_validated = IntCounter::new(
            "ledger_transactions_validated_total",
            "Transactions accepted by the validator",
        )?;
        registry.register(Box::new(transactions_validated.clone()))?;

        let transactions_rejected = IntCounterVec::new(
            Opts::new(
                "ledger_transactions_rejected_total",
                "Transactions rejected by the validator",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let validation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_validation_duration_seconds",
                "Histogram of validation latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(validation_duration.clone()))?;

        let blocks_written =
            IntCounter::new("ledger_blocks_written_total", "Blocks committed")?;
        registry.register(Box::new(blocks_written.clone()))?;

        let votes_cast = IntCounterVec::new(
            Opts::new("ledger_votes_cast_total", "Votes written"),
            &["valid"],
        )?;
        registry.register(Box::new(votes_cast.clone()))?;

        let commit_conflicts = IntCounter::new(
            "ledger_commit_conflicts_total",
            "Block or vote commits retried after a conflict",
        )?;
        registry.register(Box::new(commit_conflicts.clone()))?;

        Ok(Self {
            transactions_validated,
            transactions_rejected,
            validation_duration,
            blocks_written,
            votes_cast,
            commit_conflicts,
            registry,
        })
    }

    /// Record an accepted transaction
    pub fn record_validated(&self, duration_seconds: f64) {
        self.transactions_validated.inc();
        self.validation_duration.observe(duration_seconds);
    }

    /// Record a rejected transaction
    pub fn record_rejected(&self, kind: &str, duration_seconds: f64) {
        self.transactions_rejected.with_label_values(&[kind]).inc();
        self.validation_duration.observe(duration_seconds);
    }

    /// Record block commit
    pub fn record_block_written(&self) {
        self.blocks_written.inc();
    }

    /// Record vote commit
    pub fn record_vote(&self, is_valid: bool) {
        let label = if is_valid { "true" } else { "false" };
        self.votes_cast.with_label_values(&[label]).inc();
    }

    /// Record a commit conflict
    pub fn record_conflict(&self) {
        self.commit_conflicts.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
