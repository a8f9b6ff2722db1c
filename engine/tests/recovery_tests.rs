//! Crash and retry behaviour across the record store and the value ledger.

mod common;

use common::*;
use cpt_engine::{EngineConfig, EngineError, Phase, ReportOutcome, SettlementState};
use cpt_nullables::{ConfirmMode, StoreOp};
use cpt_store::{
    ChallengeStore, MembershipStore, PendingKey, PendingStatus, PendingStore, SettlementStatus,
    SettlementStore, SubmissionStore, VoteStore,
};
use cpt_types::{Amount, ChallengeId, FeeKind, Payee, TxRef};

async fn pending_status(
    h: &Harness,
    challenge: &ChallengeId,
    user: &str,
    kind: FeeKind,
) -> PendingStatus {
    h.store
        .get_pending(&PendingKey::new(challenge.clone(), common::user(user), kind))
        .await
        .unwrap()
        .expect("pending operation should exist")
        .status
}

#[tokio::test]
async fn failed_membership_write_is_retried_without_paying_again() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let fees_before = h.ledger.fee_calls();

    h.store.fail_next(StoreOp::PutMembership, 1);
    let err = h.engine.join(&c.id, &user("p1"), None).await.unwrap_err();
    assert!(matches!(err, EngineError::Infrastructure(_)));
    assert!(err.is_retryable());
    assert!(matches!(
        pending_status(&h, &c.id, "p1", FeeKind::Entry).await,
        PendingStatus::FeeConfirmed { .. }
    ));
    assert!(h.store.get_membership(&c.id, &user("p1")).await.unwrap().is_none());

    let membership = h.engine.join(&c.id, &user("p1"), None).await.unwrap();
    assert_eq!(h.ledger.fee_calls(), fees_before + 1);
    assert!(matches!(
        pending_status(&h, &c.id, "p1", FeeKind::Entry).await,
        PendingStatus::Recorded { tx } if Some(&tx) == membership.fee_tx.as_ref()
    ));
    assert_eq!(
        h.engine.treasury_balance(&c.id).await.unwrap().reward_pool,
        Amount::new(REWARD + ENTRY_FEE)
    );

    let again = h.engine.join(&c.id, &user("p1"), None).await;
    assert!(matches!(again, Err(EngineError::AlreadyMember { .. })));
}

#[tokio::test]
async fn timed_out_fee_completes_on_retry_even_after_registration_closes() {
    let h = Harness::new();
    let c = h.create(5, 50).await;

    h.ledger.set_confirm_mode(ConfirmMode::Hang);
    let tx = match h.engine.join(&c.id, &user("p1"), None).await {
        Err(EngineError::PaymentTimeout { tx: Some(tx) }) => tx,
        other => panic!("expected PaymentTimeout with a tx, got {other:?}"),
    };
    assert!(h.store.get_membership(&c.id, &user("p1")).await.unwrap().is_none());

    h.ledger.set_confirm_mode(ConfirmMode::Confirm);
    h.to_submission();
    let membership = h.engine.join(&c.id, &user("p1"), Some(tx.clone())).await.unwrap();
    assert_eq!(membership.fee_tx, Some(tx));
    assert_eq!(h.ledger.fee_calls(), 2);

    // A user who never paid is still held to the phase.
    let late = h.engine.join(&c.id, &user("p2"), None).await;
    assert!(matches!(late, Err(EngineError::PhaseClosed { .. })));
}

#[tokio::test]
async fn supplied_tx_must_match_pending_fee() {
    let h = Harness::new();
    let c = h.create(5, 50).await;

    h.ledger.set_confirm_mode(ConfirmMode::Hang);
    let err = h.engine.join(&c.id, &user("p1"), None).await.unwrap_err();
    assert!(matches!(err, EngineError::PaymentTimeout { .. }));

    let err = h
        .engine
        .join(&c.id, &user("p1"), Some(TxRef::new("forged")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PaymentFailed { tx: Some(_), .. }));
    assert!(h.store.list_memberships(&c.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn rejected_fee_is_retried_as_a_new_attempt() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let fees_before = h.ledger.fee_calls();

    h.ledger.set_confirm_mode(ConfirmMode::Reject);
    let rejected = match h.engine.join(&c.id, &user("p1"), None).await {
        Err(EngineError::PaymentFailed { tx: Some(tx), .. }) => tx,
        other => panic!("expected PaymentFailed, got {other:?}"),
    };
    assert_eq!(
        pending_status(&h, &c.id, "p1", FeeKind::Entry).await,
        PendingStatus::Rejected { tx: rejected.clone() }
    );

    h.ledger.set_confirm_mode(ConfirmMode::Confirm);
    let membership = h
        .engine
        .join(&c.id, &user("p1"), Some(rejected.clone()))
        .await
        .unwrap();
    assert_ne!(membership.fee_tx, Some(rejected));
    assert_eq!(h.ledger.fee_calls(), fees_before + 2);
    assert_eq!(
        h.engine.treasury_balance(&c.id).await.unwrap().reward_pool,
        Amount::new(REWARD + ENTRY_FEE)
    );
}

#[tokio::test]
async fn fee_submission_failure_leaves_nothing_committed() {
    let h = Harness::new();
    let c = h.create(5, 50).await;

    h.ledger.fail_next_fee_submits(1);
    let err = h.engine.join(&c.id, &user("p1"), None).await.unwrap_err();
    assert!(matches!(err, EngineError::Infrastructure(_)));
    assert_eq!(
        pending_status(&h, &c.id, "p1", FeeKind::Entry).await,
        PendingStatus::Initiated
    );

    h.engine.join(&c.id, &user("p1"), None).await.unwrap();
    assert_eq!(h.store.list_memberships(&c.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn interrupted_creation_finishes_without_second_funding() {
    let h = Harness::new();
    let mut new = new_challenge(5, 50);
    new.id = Some(ChallengeId::new("retry-me"));

    h.store.fail_next(StoreOp::PutChallenge, 1);
    let err = h
        .engine
        .create_challenge(&creator(), new.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Infrastructure(_)));
    assert_eq!(h.store.challenge_count(), 0);

    let record = h.engine.create_challenge(&creator(), new).await.unwrap();
    assert_eq!(h.ledger.fee_calls(), 1);
    assert_eq!(
        h.engine.treasury_balance(&record.id).await.unwrap().reward_pool,
        Amount::new(REWARD)
    );
}

#[tokio::test]
async fn interrupted_vote_is_completed_not_double_counted() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1", "p2"]).await;
    h.to_voting();
    let fees_before = h.ledger.fee_calls();

    h.store.fail_next(StoreOp::PutVote, 1);
    let err = h.engine.vote(&c.id, &user("v"), &subs[0].id, None).await;
    assert!(matches!(err, Err(EngineError::Infrastructure(_))));

    let vote = h.engine.vote(&c.id, &user("v"), &subs[0].id, None).await.unwrap();
    assert_eq!(vote.submission, subs[0].id);
    assert_eq!(h.ledger.fee_calls(), fees_before + 1);
    assert_eq!(h.store.vote_count(), 1);
    let stored = h.store.get_submission(&subs[0].id).await.unwrap().unwrap();
    assert_eq!(stored.tally, 1);
    assert!(matches!(
        pending_status(&h, &c.id, "v", FeeKind::Vote).await,
        PendingStatus::Recorded { .. }
    ));

    let again = h.engine.vote(&c.id, &user("v"), &subs[1].id, None).await;
    assert!(matches!(again, Err(EngineError::AlreadyVotedInChallenge { .. })));
    assert_eq!(h.store.list_votes(&c.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn interrupted_finalize_resumes_from_stored_plan() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1", "p2", "p3"]).await;
    h.to_voting();
    h.votes_for(&subs[0], "a", 2).await;
    h.votes_for(&subs[1], "b", 2).await;
    h.votes_for(&subs[2], "c", 1).await;
    h.to_ended();

    h.ledger.fail_transfers_to(Payee::User(user("p2")));
    let err = h.engine.finalize(&c.id).await.unwrap_err();
    assert!(err.is_retryable());

    let partial = h.store.get_settlement(&c.id).await.unwrap().unwrap();
    assert_eq!(partial.status, SettlementStatus::Disbursing);
    assert!(partial.payouts[0].disbursement.tx.is_some());
    assert!(partial.payouts[1].disbursement.tx.is_none());
    assert_eq!(
        h.engine.settlement_state(&c.id).await.unwrap(),
        SettlementState::ReadyToFinalize
    );

    h.ledger.clear_transfer_failures();
    let settlement = h.engine.finalize(&c.id).await.unwrap();
    assert_eq!(
        settlement.payouts[0].disbursement.tx,
        partial.payouts[0].disbursement.tx
    );
    assert!(settlement.payouts.iter().all(|p| p.disbursement.is_settled()));
    assert_eq!(h.ledger.received_by_user(&user("p1")), Amount::new(375));
    assert_eq!(h.ledger.received_by_user(&user("p2")), Amount::new(375));
    assert_eq!(h.ledger.received_by_user(&user("p3")), Amount::new(250));
    assert_eq!(h.ledger.transfers_executed(), 3);
}

#[tokio::test]
async fn lost_transfer_response_does_not_pay_twice() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1", "p2", "p3"]).await;
    h.to_voting();
    h.votes_for(&subs[0], "a", 3).await;
    h.votes_for(&subs[1], "b", 2).await;
    h.votes_for(&subs[2], "c", 2).await;
    h.to_ended();

    h.ledger.lose_next_transfer_responses(1);
    assert!(h.engine.finalize(&c.id).await.is_err());

    let settlement = h.engine.finalize(&c.id).await.unwrap();
    assert!(settlement.is_finalized());
    assert_eq!(h.ledger.transfers_executed(), 3);
    assert_eq!(h.ledger.transfer_calls(), 4);
    assert_eq!(h.ledger.received_by_user(&user("p1")), Amount::new(750));
    assert_eq!(h.ledger.received_by_user(&user("p2")), Amount::new(125));
    assert_eq!(h.ledger.received_by_user(&user("p3")), Amount::new(125));
    assert_eq!(
        h.engine.treasury_balance(&c.id).await.unwrap().reward_pool,
        Amount::new(3 * ENTRY_FEE)
    );
}

#[tokio::test]
async fn in_flight_fee_reserves_its_slot() {
    let h = Harness::new();
    let c = h.create(1, 50).await;

    h.ledger.set_confirm_mode(ConfirmMode::Hang);
    let err = h.engine.join(&c.id, &user("p1"), None).await.unwrap_err();
    let tx = err.tx().cloned();
    assert!(tx.is_some());

    h.ledger.set_confirm_mode(ConfirmMode::Confirm);
    let blocked = h.engine.join(&c.id, &user("p2"), None).await;
    assert!(matches!(blocked, Err(EngineError::CapacityExceeded { limit: 1, .. })));

    h.engine.join(&c.id, &user("p1"), tx).await.unwrap();
    assert_eq!(h.store.list_memberships(&c.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn interrupted_removal_finishes_on_next_report() {
    let h = Harness::with_config(EngineConfig {
        report_threshold: 2,
        ..test_config()
    });
    let c = h.create(5, 50).await;
    h.join_all(&c.id, &["p1"]).await;

    h.engine.report(&c.id, &user("r0")).await.unwrap();
    h.store.fail_next(StoreOp::Delete, 1);
    let err = h.engine.report(&c.id, &user("r1")).await.unwrap_err();
    assert!(matches!(err, EngineError::Infrastructure(_)));
    assert_eq!(
        h.store.get_challenge(&c.id).await.unwrap().unwrap().report_count,
        2
    );

    let outcome = h.engine.report(&c.id, &user("r2")).await.unwrap();
    assert_eq!(outcome, ReportOutcome::Removed { reports: 2 });
    assert!(h.store.get_challenge(&c.id).await.unwrap().is_none());
    assert!(h.store.list_memberships(&c.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_voter_payout_response_is_not_paid_twice() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1"]).await;
    h.to_voting();
    h.votes_for(&subs[0], "v", 2).await;
    h.to_ended();

    h.ledger.lose_next_transfer_responses(1);
    let first = h.engine.distribute_voting_rewards(&c.id).await.unwrap();
    assert_eq!(first.failures.len(), 1);

    let second = h.engine.distribute_voting_rewards(&c.id).await.unwrap();
    assert_eq!((second.processed, second.total), (2, 2));
    assert_eq!(h.ledger.transfers_executed(), 2);
    assert_eq!(h.ledger.received_by_user(&user("v0")), Amount::new(VOTING_FEE));
    assert_eq!(h.ledger.received_by_user(&user("v1")), Amount::new(VOTING_FEE));
}

#[tokio::test]
async fn vote_stranded_past_voting_end_is_refunded_after_claim() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1"]).await;
    h.to_voting();

    h.store.fail_next(StoreOp::PutSubmission, 1);
    let err = h.engine.vote(&c.id, &user("v"), &subs[0].id, None).await;
    assert!(matches!(err, Err(EngineError::Infrastructure(_))));
    assert!(matches!(
        pending_status(&h, &c.id, "v", FeeKind::Vote).await,
        PendingStatus::FeeConfirmed { .. }
    ));

    h.to_ended();
    let claim = h.engine.claim_creator_reward(&c.id, &creator()).await.unwrap();
    assert_eq!(claim.refunded_reward, Amount::new(REWARD));

    let late = h.engine.vote(&c.id, &user("v"), &subs[0].id, None).await;
    assert!(matches!(
        late,
        Err(EngineError::PhaseClosed {
            expected: Phase::Voting,
            actual: Phase::Ended,
            ..
        })
    ));
    let stored = h.store.get_submission(&subs[0].id).await.unwrap().unwrap();
    assert_eq!(stored.tally, 0);
    assert!(matches!(
        pending_status(&h, &c.id, "v", FeeKind::Vote).await,
        PendingStatus::Refunded { .. }
    ));
    assert_eq!(h.ledger.received_by_user(&user("v")), Amount::new(VOTING_FEE));

    let settlement = h.engine.finalize(&c.id).await.unwrap();
    assert!(settlement.is_finalized());
    assert!(settlement.payouts.is_empty());

    // A second retry neither counts the vote nor refunds again.
    let again = h.engine.vote(&c.id, &user("v"), &subs[0].id, None).await;
    assert!(matches!(again, Err(EngineError::PhaseClosed { .. })));
    assert_eq!(h.ledger.received_by_user(&user("v")), Amount::new(VOTING_FEE));
    assert_eq!(h.store.vote_count(), 0);
}

#[tokio::test]
async fn stranded_vote_fee_is_held_back_from_voter_rewards() {
    let h = Harness::new();
    let c = h.create(5, 50).await;
    let subs = h.enter_all(&c.id, &["p1"]).await;
    h.to_voting();
    h.votes_for(&subs[0], "v", 2).await;

    h.store.fail_next(StoreOp::PutSubmission, 1);
    let err = h.engine.vote(&c.id, &user("late"), &subs[0].id, None).await;
    assert!(matches!(err, Err(EngineError::Infrastructure(_))));
    h.to_ended();

    let settlement = h.engine.finalize(&c.id).await.unwrap();
    let summary = h.engine.distribute_voting_rewards(&c.id).await.unwrap();
    assert_eq!((summary.processed, summary.total), (2, 2));
    assert_eq!(h.ledger.received_by_user(&user("v0")), Amount::new(VOTING_FEE));
    assert_eq!(h.ledger.received_by_user(&user("v1")), Amount::new(VOTING_FEE));

    let late = h.engine.vote(&c.id, &user("late"), &subs[0].id, None).await;
    assert!(matches!(late, Err(EngineError::PhaseClosed { .. })));
    assert_eq!(h.ledger.received_by_user(&user("late")), Amount::new(VOTING_FEE));
    assert_eq!(
        h.engine.treasury_balance(&c.id).await.unwrap().voting_pool,
        Amount::ZERO
    );

    let rerun = h.engine.distribute_voting_rewards(&c.id).await.unwrap();
    assert_eq!((rerun.processed, rerun.total, rerun.newly_paid), (2, 2, 0));
    assert_eq!(h.store.get_settlement(&c.id).await.unwrap(), Some(settlement));
}

#[tokio::test]
async fn entry_fees_stranded_past_submission_are_refunded() {
    let h = Harness::new();
    let c = h.create(5, 50).await;

    h.store.fail_next(StoreOp::PutMembership, 1);
    let err = h.engine.join(&c.id, &user("p1"), None).await;
    assert!(matches!(err, Err(EngineError::Infrastructure(_))));

    h.ledger.set_confirm_mode(ConfirmMode::Hang);
    let err = h.engine.join(&c.id, &user("p2"), None).await;
    assert!(matches!(err, Err(EngineError::PaymentTimeout { tx: Some(_) })));
    h.ledger.set_confirm_mode(ConfirmMode::Confirm);

    h.to_voting();
    let late = h.engine.join(&c.id, &user("p1"), None).await;
    assert!(matches!(
        late,
        Err(EngineError::PhaseClosed {
            expected: Phase::Registration,
            actual: Phase::Voting,
            ..
        })
    ));

    h.to_ended();
    let late = h.engine.join(&c.id, &user("p2"), None).await;
    assert!(matches!(late, Err(EngineError::PhaseClosed { .. })));

    assert!(h.store.list_memberships(&c.id).await.unwrap().is_empty());
    assert_eq!(h.ledger.received_by_user(&user("p1")), Amount::new(ENTRY_FEE));
    assert_eq!(h.ledger.received_by_user(&user("p2")), Amount::new(ENTRY_FEE));
    for name in ["p1", "p2"] {
        assert!(matches!(
            pending_status(&h, &c.id, name, FeeKind::Entry).await,
            PendingStatus::Refunded { .. }
        ));
    }
    assert_eq!(h.ledger.fee_calls(), 3);

    let claim = h.engine.claim_creator_reward(&c.id, &creator()).await.unwrap();
    assert_eq!(claim.entry_fees, Amount::ZERO);
    assert_eq!(claim.creator_payout.amount, Amount::new(REWARD));
    assert_eq!(
        h.engine.treasury_balance(&c.id).await.unwrap().reward_pool,
        Amount::ZERO
    );
}
