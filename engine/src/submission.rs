//! Submission registry: one video per participant per challenge.

use cpt_store::SubmissionRecord;
use cpt_types::{ChallengeId, SubmissionId, UserId};
use std::collections::BTreeSet;
use tracing::Instrument;

use crate::{spans, ChallengeEngine, EngineError, Phase};

impl ChallengeEngine {
    pub async fn submit(
        &self,
        challenge: &ChallengeId,
        participant: &UserId,
        video: String,
        description: String,
    ) -> Result<SubmissionRecord, EngineError> {
        async {
            let _guard = self.locks.lock(challenge).await;
            let record = self.load_challenge(challenge).await?;
            self.require_phase(&record, Phase::Submission)?;

            if self
                .store
                .get_membership(challenge, participant)
                .await?
                .is_none()
            {
                return Err(EngineError::NotAParticipant {
                    challenge: challenge.clone(),
                    user: participant.clone(),
                });
            }

            let existing = self.store.list_submissions(challenge).await?;
            if existing.iter().any(|s| &s.participant == participant) {
                return Err(EngineError::DuplicateSubmission {
                    challenge: challenge.clone(),
                    user: participant.clone(),
                });
            }

            let submission = SubmissionRecord {
                id: SubmissionId::generate(),
                challenge: challenge.clone(),
                participant: participant.clone(),
                video,
                description,
                likes: 0,
                dislikes: 0,
                liked_by: BTreeSet::new(),
                disliked_by: BTreeSet::new(),
                tally: 0,
                voters: BTreeSet::new(),
                submitted_at: self.clock.now(),
            };
            self.store.put_submission(&submission).await?;

            self.metrics.submissions.inc();
            tracing::info!(submission = %submission.id, "video submitted");
            Ok(submission)
        }
        .instrument(spans::operation_span("submit", challenge, participant))
        .await
    }
}
