//! Like/dislike toggles on submissions.
//!
//! Informational only: engagement never affects ranking or payouts. A user
//! either likes, dislikes, or does neither; counters are the set sizes.

use cpt_store::SubmissionRecord;
use cpt_types::{SubmissionId, UserId};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{spans, ChallengeEngine, EngineError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

/// Toggle `user`'s reaction on a submission in place.
pub fn toggle_reaction(submission: &mut SubmissionRecord, user: &UserId, reaction: Reaction) {
    let (chosen, opposite) = match reaction {
        Reaction::Like => (&mut submission.liked_by, &mut submission.disliked_by),
        Reaction::Dislike => (&mut submission.disliked_by, &mut submission.liked_by),
    };
    if !chosen.remove(user) {
        chosen.insert(user.clone());
        opposite.remove(user);
    }
    submission.likes = submission.liked_by.len() as u32;
    submission.dislikes = submission.disliked_by.len() as u32;
}

impl ChallengeEngine {
    pub async fn like(
        &self,
        submission: &SubmissionId,
        user: &UserId,
    ) -> Result<SubmissionRecord, EngineError> {
        self.react(submission, user, Reaction::Like).await
    }

    pub async fn dislike(
        &self,
        submission: &SubmissionId,
        user: &UserId,
    ) -> Result<SubmissionRecord, EngineError> {
        self.react(submission, user, Reaction::Dislike).await
    }

    async fn react(
        &self,
        submission: &SubmissionId,
        user: &UserId,
        reaction: Reaction,
    ) -> Result<SubmissionRecord, EngineError> {
        let not_found = || EngineError::NotFound(format!("submission {submission}"));
        let challenge = self
            .store
            .get_submission(submission)
            .await?
            .ok_or_else(not_found)?
            .challenge;

        async {
            let _guard = self.locks.lock(&challenge).await;
            let mut record = self
                .store
                .get_submission(submission)
                .await?
                .ok_or_else(not_found)?;
            toggle_reaction(&mut record, user, reaction);
            self.store.put_submission(&record).await?;
            tracing::debug!(
                ?reaction,
                likes = record.likes,
                dislikes = record.dislikes,
                "reaction toggled"
            );
            Ok(record)
        }
        .instrument(spans::operation_span("react", &challenge, user))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpt_types::{ChallengeId, Timestamp};
    use std::collections::BTreeSet;

    fn submission() -> SubmissionRecord {
        SubmissionRecord {
            id: SubmissionId::new("s1"),
            challenge: ChallengeId::new("c1"),
            participant: UserId::new("p"),
            video: "v".into(),
            description: String::new(),
            likes: 0,
            dislikes: 0,
            liked_by: BTreeSet::new(),
            disliked_by: BTreeSet::new(),
            tally: 0,
            voters: BTreeSet::new(),
            submitted_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn like_twice_undoes() {
        let mut s = submission();
        let u = UserId::new("u");
        toggle_reaction(&mut s, &u, Reaction::Like);
        assert_eq!((s.likes, s.dislikes), (1, 0));
        toggle_reaction(&mut s, &u, Reaction::Like);
        assert_eq!((s.likes, s.dislikes), (0, 0));
    }

    #[test]
    fn dislike_replaces_like() {
        let mut s = submission();
        let u = UserId::new("u");
        toggle_reaction(&mut s, &u, Reaction::Like);
        toggle_reaction(&mut s, &u, Reaction::Dislike);
        assert_eq!((s.likes, s.dislikes), (0, 1));
        assert!(!s.liked_by.contains(&u));
    }

    #[test]
    fn counters_track_distinct_users() {
        let mut s = submission();
        for name in ["a", "b", "c"] {
            toggle_reaction(&mut s, &UserId::new(name), Reaction::Like);
        }
        toggle_reaction(&mut s, &UserId::new("d"), Reaction::Dislike);
        assert_eq!((s.likes, s.dislikes), (3, 1));
        assert_eq!(s.tally, 0);
    }
}
