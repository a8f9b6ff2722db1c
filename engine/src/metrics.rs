//! Prometheus metrics for the challenge engine.
//!
//! The [`EngineMetrics`] struct owns a dedicated [`Registry`] that the RPC
//! `/metrics` endpoint encodes into the Prometheus text exposition format.

use prometheus::{register_int_counter_with_registry, IntCounter, Opts, Registry, TextEncoder};

pub struct EngineMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    pub challenges_created: IntCounter,
    pub joins: IntCounter,
    pub submissions: IntCounter,
    pub votes: IntCounter,
    pub reports: IntCounter,
    /// Challenges deleted after reaching the report threshold.
    pub challenges_removed: IntCounter,
    pub settlements: IntCounter,
    pub creator_claims: IntCounter,
    /// Transfers out of a treasury pool (winner, creator, protocol, voter).
    pub disbursements: IntCounter,
    pub payment_failures: IntCounter,
    pub payment_timeouts: IntCounter,
    /// Fees returned because their phase closed before the record was written.
    pub fee_refunds: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    register_int_counter_with_registry!(Opts::new(name, help), registry)
        .unwrap_or_else(|e| panic!("failed to register {name}: {e}"))
}

impl EngineMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            challenges_created: counter(
                &registry,
                "cpt_challenges_created_total",
                "Total challenges created",
            ),
            joins: counter(&registry, "cpt_joins_total", "Total participants admitted"),
            submissions: counter(&registry, "cpt_submissions_total", "Total videos submitted"),
            votes: counter(&registry, "cpt_votes_total", "Total paid votes recorded"),
            reports: counter(&registry, "cpt_reports_total", "Total reports recorded"),
            challenges_removed: counter(
                &registry,
                "cpt_challenges_removed_total",
                "Total challenges removed by moderation",
            ),
            settlements: counter(
                &registry,
                "cpt_settlements_total",
                "Total challenges finalized",
            ),
            creator_claims: counter(
                &registry,
                "cpt_creator_claims_total",
                "Total creator rewards claimed",
            ),
            disbursements: counter(
                &registry,
                "cpt_disbursements_total",
                "Total transfers issued out of treasury pools",
            ),
            payment_failures: counter(
                &registry,
                "cpt_payment_failures_total",
                "Total fee payments or transfers that failed",
            ),
            payment_timeouts: counter(
                &registry,
                "cpt_payment_timeouts_total",
                "Total fee confirmations that timed out",
            ),
            fee_refunds: counter(
                &registry,
                "cpt_fee_refunds_total",
                "Total stranded fees returned to their payers",
            ),
            registry,
        }
    }

    /// Encode every metric in the Prometheus text format.
    pub fn gather(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
