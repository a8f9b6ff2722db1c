//! Phase resolution.
//!
//! A challenge's phase is never stored. It is a pure function of its three
//! deadlines and the current time:
//!
//! ```text
//! now < registration_end  → Registration
//! now < submission_end    → Submission
//! now < voting_end        → Voting
//! otherwise               → Ended
//! ```
//!
//! Coinciding deadlines give the phases between them zero duration.

use cpt_store::Deadlines;
use cpt_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Registration,
    Submission,
    Voting,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Submission => "submission",
            Self::Voting => "voting",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the phase of a challenge at `now`.
pub fn resolve_phase(deadlines: &Deadlines, now: Timestamp) -> Phase {
    if now < deadlines.registration_end {
        Phase::Registration
    } else if now < deadlines.submission_end {
        Phase::Submission
    } else if now < deadlines.voting_end {
        Phase::Voting
    } else {
        Phase::Ended
    }
}

/// The deadline that ends `phase`, or `None` once the challenge has ended.
pub fn phase_deadline(deadlines: &Deadlines, phase: Phase) -> Option<Timestamp> {
    match phase {
        Phase::Registration => Some(deadlines.registration_end),
        Phase::Submission => Some(deadlines.submission_end),
        Phase::Voting => Some(deadlines.voting_end),
        Phase::Ended => None,
    }
}

/// Where a challenge stands with respect to settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    /// Voting has not ended yet.
    Open,
    /// Voting ended and no terminal settlement record exists.
    ReadyToFinalize,
    Finalized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn deadlines(r: u64, s: u64, v: u64) -> Deadlines {
        Deadlines {
            registration_end: Timestamp::new(r),
            submission_end: Timestamp::new(s),
            voting_end: Timestamp::new(v),
        }
    }

    #[test]
    fn phases_follow_deadlines() {
        let d = deadlines(100, 200, 300);
        assert_eq!(resolve_phase(&d, Timestamp::new(0)), Phase::Registration);
        assert_eq!(resolve_phase(&d, Timestamp::new(99)), Phase::Registration);
        assert_eq!(resolve_phase(&d, Timestamp::new(100)), Phase::Submission);
        assert_eq!(resolve_phase(&d, Timestamp::new(200)), Phase::Voting);
        assert_eq!(resolve_phase(&d, Timestamp::new(299)), Phase::Voting);
        assert_eq!(resolve_phase(&d, Timestamp::new(300)), Phase::Ended);
    }

    #[test]
    fn coinciding_deadlines_skip_phases() {
        let d = deadlines(100, 100, 100);
        assert_eq!(resolve_phase(&d, Timestamp::new(99)), Phase::Registration);
        assert_eq!(resolve_phase(&d, Timestamp::new(100)), Phase::Ended);
    }

    #[test]
    fn ended_has_no_deadline() {
        let d = deadlines(1, 2, 3);
        assert_eq!(phase_deadline(&d, Phase::Voting), Some(Timestamp::new(3)));
        assert_eq!(phase_deadline(&d, Phase::Ended), None);
    }

    proptest! {
        #[test]
        fn phase_never_moves_backwards(
            mut ends in proptest::array::uniform3(0u64..10_000),
            t1 in 0u64..12_000,
            dt in 0u64..2_000,
        ) {
            ends.sort_unstable();
            let d = deadlines(ends[0], ends[1], ends[2]);
            let earlier = resolve_phase(&d, Timestamp::new(t1));
            let later = resolve_phase(&d, Timestamp::new(t1 + dt));
            prop_assert!(earlier <= later);
        }

        #[test]
        fn ended_exactly_from_voting_end(
            mut ends in proptest::array::uniform3(0u64..10_000),
            t in 0u64..12_000,
        ) {
            ends.sort_unstable();
            let d = deadlines(ends[0], ends[1], ends[2]);
            let ended = resolve_phase(&d, Timestamp::new(t)) == Phase::Ended;
            prop_assert_eq!(ended, t >= ends[2]);
        }
    }
}
