//! Moderation aggregator.
//!
//! Collects reports from distinct users regardless of phase. A challenge
//! reaching the report threshold is deleted together with everything that
//! hangs off it. Settlement, claim and payout records are kept as an audit
//! trail of value already moved.

use cpt_store::ReportRecord;
use cpt_types::{ChallengeId, UserId};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{spans, ChallengeEngine, EngineError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReportOutcome {
    /// Report stored; the challenge stays.
    Recorded { reports: u32 },
    /// Threshold reached; the challenge and its dependents are gone.
    Removed { reports: u32 },
}

impl ChallengeEngine {
    pub async fn report(
        &self,
        challenge: &ChallengeId,
        reporter: &UserId,
    ) -> Result<ReportOutcome, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let mut record = self.load_challenge(challenge).await?;
            if record.report_count >= self.config.report_threshold {
                // An earlier removal was interrupted.
                self.remove_challenge(challenge).await?;
                return Ok(ReportOutcome::Removed {
                    reports: record.report_count,
                });
            }
            if &record.creator == reporter {
                return Err(EngineError::SelfReportForbidden);
            }

            let reports = self.store.list_reports(challenge).await?;
            if reports.iter().any(|r| &r.reporter == reporter) {
                return Err(EngineError::AlreadyReported {
                    challenge: challenge.clone(),
                    user: reporter.clone(),
                });
            }

            self.store
                .put_report(&ReportRecord {
                    challenge: challenge.clone(),
                    reporter: reporter.clone(),
                    reported_at: self.clock.now(),
                })
                .await?;
            self.metrics.reports.inc();
            let count = reports.len() as u32 + 1;

            record.report_count = count;
            self.store.put_challenge(&record).await?;

            if count >= self.config.report_threshold {
                self.remove_challenge(challenge).await?;
                self.metrics.challenges_removed.inc();
                tracing::warn!(reports = count, "challenge removed after reports");
                return Ok(ReportOutcome::Removed { reports: count });
            }

            tracing::info!(reports = count, "report recorded");
            Ok(ReportOutcome::Recorded { reports: count })
        }
        .instrument(spans::operation_span("report", challenge, reporter))
        .await
    }

    /// Delete a challenge and its dependents. The challenge record goes last
    /// and already carries the final report count, so the next report on an
    /// interrupted removal finishes it.
    async fn remove_challenge(&self, challenge: &ChallengeId) -> Result<(), EngineError> {
        self.store.delete_votes(challenge).await?;
        self.store.delete_submissions(challenge).await?;
        self.store.delete_memberships(challenge).await?;
        self.store.delete_reports(challenge).await?;
        self.store.delete_pending(challenge).await?;
        self.store.delete_challenge(challenge).await?;
        Ok(())
    }
}
