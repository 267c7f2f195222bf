use std::sync::Arc;

use kindred_core::{CoreError, PostKind, PostStatus, Visibility};
use kindred_ledger::AuraLedger;
use kindred_memory::{InMemoryEventStore, InMemoryStore, InMemoryUserDirectory, RecordingSink};
use tokio::sync::Barrier;
use uuid::Uuid;

use super::{LifecycleService, NewPost};

struct TestEnv {
    service: Arc<LifecycleService>,
    ledger: Arc<AuraLedger>,
    users: Arc<InMemoryUserDirectory>,
    sink: Arc<RecordingSink>,
}

fn env() -> TestEnv {
    let store = Arc::new(InMemoryStore::new());
    let events = Arc::new(InMemoryEventStore::new());
    let sink = Arc::new(RecordingSink::new());
    let users = Arc::new(InMemoryUserDirectory::new());
    let ledger = Arc::new(AuraLedger::new(store.clone(), events.clone(), sink.clone()));
    let service = Arc::new(LifecycleService::new(
        store,
        events,
        sink.clone(),
        users.clone(),
        ledger.clone(),
    ));
    TestEnv {
        service,
        ledger,
        users,
        sink,
    }
}

impl TestEnv {
    async fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.register(id).await;
        id
    }
}

fn new_post(kind: PostKind, points_value: u64, allow_collaborators: bool) -> NewPost {
    NewPost {
        title: "Rake the community garden".to_string(),
        description: "Autumn leaves everywhere".to_string(),
        media_ref: None,
        visibility: Visibility::Public,
        kind,
        points_value,
        allow_collaborators,
        anonymous: false,
    }
}

#[tokio::test]
async fn created_post_starts_open_with_defaulted_points() {
    let env = env();
    let creator = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 0, false))
        .await
        .unwrap();

    assert_eq!(post.status, PostStatus::Open);
    assert_eq!(post.points_value, super::DEFAULT_POINTS_VALUE);
    assert!(post.completed_at.is_none());
}

#[tokio::test]
async fn unknown_creator_is_rejected() {
    let env = env();
    let err = env
        .service
        .create_post(Uuid::new_v4(), new_post(PostKind::Offer, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound("user")));
}

#[tokio::test]
async fn claim_moves_post_to_in_progress() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    let claim = env
        .service
        .claim(post.id, claimant, "On it".to_string(), false)
        .await
        .unwrap();

    assert_eq!(claim.claimant, claimant);
    let post = env.service.post(post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::InProgress);
    assert_eq!(env.service.claimants(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn creator_cannot_claim_own_post() {
    let env = env();
    let creator = env.user().await;

    for (kind, allow) in [
        (PostKind::Offer, false),
        (PostKind::Offer, true),
        (PostKind::Request, false),
        (PostKind::Request, true),
    ] {
        let post = env
            .service
            .create_post(creator, new_post(kind, 10, allow))
            .await
            .unwrap();
        let err = env
            .service
            .claim(post.id, creator, String::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SelfClaim));
    }
}

#[tokio::test]
async fn completed_post_cannot_be_claimed() {
    let env = env();
    let creator = env.user().await;
    let late = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let err = env
        .service
        .claim(post.id, late, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));
}

#[tokio::test]
async fn prior_claimant_reclaiming_completed_post_hits_status_first() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    // The closed status wins over the duplicate claim.
    let err = env
        .service
        .claim(post.id, claimant, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));
}

#[tokio::test]
async fn second_claimant_rejected_without_collaboration() {
    let env = env();
    let creator = env.user().await;
    let first = env.user().await;
    let second = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, first, String::new(), false).await.unwrap();

    let err = env
        .service
        .claim(post.id, second, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));
    assert_eq!(env.service.claimants(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn collaboration_admits_more_claimants_but_not_twice() {
    let env = env();
    let creator = env.user().await;
    let first = env.user().await;
    let second = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, true))
        .await
        .unwrap();
    env.service.claim(post.id, first, String::new(), false).await.unwrap();
    env.service.claim(post.id, second, String::new(), false).await.unwrap();

    let err = env
        .service
        .claim(post.id, second, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateClaim));
    assert_eq!(env.service.claimants(post.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn enable_collaborators_is_creator_only_and_idempotent() {
    let env = env();
    let creator = env.user().await;
    let stranger = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();

    let err = env
        .service
        .enable_collaborators(post.id, stranger)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    env.service.enable_collaborators(post.id, creator).await.unwrap();
    env.service.enable_collaborators(post.id, creator).await.unwrap();
    assert!(env.service.post(post.id).await.unwrap().allow_collaborators);
}

#[tokio::test]
async fn collaborator_rules_mirror_claim_rules() {
    let env = env();
    let creator = env.user().await;
    let helper = env.user().await;

    let closed = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();
    let err = env
        .service
        .collaborate(closed.id, helper, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, true))
        .await
        .unwrap();
    let err = env
        .service
        .collaborate(post.id, creator, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SelfClaim));

    env.service
        .collaborate(post.id, helper, "Count me in".to_string(), false)
        .await
        .unwrap();
    assert_eq!(env.service.post(post.id).await.unwrap().status, PostStatus::InProgress);

    let err = env
        .service
        .collaborate(post.id, helper, String::new(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateClaim));
    assert_eq!(env.service.collaborators(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn completion_awards_each_claimant_and_sets_timestamp() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let post = env.service.post(post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Completed);
    assert!(post.completed_at.is_some());

    let claimant_profile = env.ledger.profile(claimant).await.unwrap();
    assert_eq!(claimant_profile.points, 10);
    assert_eq!(claimant_profile.points_from_claiming, 10);

    let creator_profile = env.ledger.profile(creator).await.unwrap();
    assert_eq!(creator_profile.points, 0);
}

#[tokio::test]
async fn completed_at_tracks_status_through_the_lifecycle() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    assert!(post.completed_at.is_none());

    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    let post_now = env.service.post(post.id).await.unwrap();
    assert_eq!(post_now.completed_at.is_some(), post_now.status == PostStatus::Completed);

    env.service.complete(post.id, creator).await.unwrap();
    let post_now = env.service.post(post.id).await.unwrap();
    assert_eq!(post_now.status, PostStatus::Completed);
    assert!(post_now.completed_at.is_some());
}

#[tokio::test]
async fn double_complete_awards_once() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 25, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();

    env.service.complete(post.id, creator).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let profile = env.ledger.profile(claimant).await.unwrap();
    assert_eq!(profile.points, 25);
}

#[tokio::test]
async fn completing_a_request_without_claims_is_rejected() {
    let env = env();
    let creator = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    let err = env.service.complete(post.id, creator).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition(_)));
    assert_eq!(env.service.post(post.id).await.unwrap().status, PostStatus::Open);
}

#[tokio::test]
async fn offer_can_be_self_certified_without_claims() {
    let env = env();
    let creator = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let post = env.service.post(post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Completed);
    // Nobody claimed, so nobody was paid.
    assert_eq!(env.ledger.profile(creator).await.unwrap().points, 0);
}

#[tokio::test]
async fn offer_completion_counts_as_offer_points() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 15, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let profile = env.ledger.profile(claimant).await.unwrap();
    assert_eq!(profile.points_from_offers, 15);
    assert_eq!(profile.points_from_claiming, 0);
}

#[tokio::test]
async fn only_the_creator_may_complete_or_move_status() {
    let env = env();
    let creator = env.user().await;
    let stranger = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();

    let err = env.service.complete(post.id, stranger).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = env
        .service
        .update_status(post.id, stranger, PostStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn update_status_moves_between_open_and_in_progress() {
    let env = env();
    let creator = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();

    env.service
        .update_status(post.id, creator, PostStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(env.service.post(post.id).await.unwrap().status, PostStatus::InProgress);

    env.service
        .update_status(post.id, creator, PostStatus::Open)
        .await
        .unwrap();
    assert_eq!(env.service.post(post.id).await.unwrap().status, PostStatus::Open);
}

#[tokio::test]
async fn update_status_to_completed_goes_through_the_award_path() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service
        .update_status(post.id, creator, PostStatus::Completed)
        .await
        .unwrap();

    assert_eq!(env.ledger.profile(claimant).await.unwrap().points, 10);
}

#[tokio::test]
async fn completed_posts_never_move_again() {
    let env = env();
    let creator = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    for target in [PostStatus::Open, PostStatus::InProgress] {
        let err = env
            .service
            .update_status(post.id, creator, target)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }
}

#[tokio::test]
async fn racing_completes_award_exactly_once() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = env.service.clone();
        let barrier = barrier.clone();
        let post_id = post.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            service.complete(post_id, creator).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let profile = env.ledger.profile(claimant).await.unwrap();
    assert_eq!(profile.points, 10);
}

#[tokio::test]
async fn claim_racing_complete_never_half_applies() {
    let env = env();
    let creator = env.user().await;
    let first = env.user().await;
    let second = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, true))
        .await
        .unwrap();
    env.service.claim(post.id, first, String::new(), false).await.unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let complete = {
        let service = env.service.clone();
        let barrier = barrier.clone();
        let post_id = post.id;
        tokio::spawn(async move {
            barrier.wait().await;
            service.complete(post_id, creator).await
        })
    };
    let claim = {
        let service = env.service.clone();
        let barrier = barrier.clone();
        let post_id = post.id;
        tokio::spawn(async move {
            barrier.wait().await;
            service.claim(post_id, second, String::new(), false).await
        })
    };

    complete.await.unwrap().unwrap();
    let claim_result = claim.await.unwrap();

    let claims = env.service.claimants(post.id).await.unwrap();
    let awarded: u64 = {
        let mut total = 0;
        for c in &claims {
            total += env.ledger.profile(c.claimant).await.unwrap().points;
        }
        total
    };

    // Either the claim lost the race (rejected, one award) or it landed
    // before completion (two claims, two awards). Never in between.
    match claim_result {
        Ok(_) => {
            assert_eq!(claims.len(), 2);
            assert_eq!(awarded, 20);
        }
        Err(CoreError::InvalidTransition(_)) => {
            assert_eq!(claims.len(), 1);
            assert_eq!(awarded, 10);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn level_crossing_on_completion_grants_badge_and_notifies() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 120, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let badges = env.ledger.profile(claimant).await.unwrap();
    assert_eq!(badges.level, "Sustainer");

    let sent = env.sink.sent().await;
    assert!(
        sent.iter()
            .any(|n| n.recipient == claimant && n.message.contains("First Sustainer Badge"))
    );
}

#[tokio::test]
async fn pay_it_forward_requires_completion() {
    let env = env();
    let creator = env.user().await;
    let forwarder = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();

    let err = env
        .service
        .pay_it_forward(post.id, forwarder, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotCompleted));

    assert!(!env.service.paid_forward(post.id).await.unwrap());
    assert_eq!(env.ledger.profile(creator).await.unwrap().points, 0);
}

#[tokio::test]
async fn forwarding_a_request_credits_the_original_creator() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;
    let forwarder = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    let new_post = env
        .service
        .pay_it_forward(post.id, forwarder, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();

    assert_eq!(new_post.created_by, forwarder);
    assert_eq!(new_post.status, PostStatus::Open);
    assert!(env.service.paid_forward(post.id).await.unwrap());

    let creator_profile = env.ledger.profile(creator).await.unwrap();
    assert_eq!(creator_profile.points, 10);
    assert_eq!(creator_profile.points_from_pay_it_forward, 10);
}

#[tokio::test]
async fn forwarding_an_offer_moves_no_points() {
    let env = env();
    let creator = env.user().await;
    let forwarder = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    env.service
        .pay_it_forward(post.id, forwarder, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();

    assert_eq!(env.ledger.profile(creator).await.unwrap().points, 0);
}

#[tokio::test]
async fn one_forward_per_user_with_fan_out_across_users() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;
    let first = env.user().await;
    let second = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();
    env.service.complete(post.id, creator).await.unwrap();

    env.service
        .pay_it_forward(post.id, first, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap();

    let err = env
        .service
        .pay_it_forward(post.id, first, new_post(PostKind::Offer, 10, false))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::AlreadyForwarded));

    // A different user can still fan out from the same original.
    env.service
        .pay_it_forward(post.id, second, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();

    let creator_profile = env.ledger.profile(creator).await.unwrap();
    assert_eq!(creator_profile.points_from_pay_it_forward, 20);
}

#[tokio::test]
async fn claim_notifies_the_creator() {
    let env = env();
    let creator = env.user().await;
    let claimant = env.user().await;

    let post = env
        .service
        .create_post(creator, new_post(PostKind::Request, 10, false))
        .await
        .unwrap();
    env.service.claim(post.id, claimant, String::new(), false).await.unwrap();

    let sent = env.sink.sent().await;
    assert!(sent.iter().any(|n| n.recipient == creator && n.message.contains("claimed")));
}
