//! Vouching, rate limiting and claim flows of the eligibility resolver

use council_runtime::{EligibilityResolver, HatsOracle, InMemoryHats, ManualClock, StandingUpdate};
use council_types::{
    ErrorKind, GovernanceError, GovernanceEvent, HatId, Identity, VouchingLimits, WearerStatus,
};
use std::sync::Arc;

const MEMBER: HatId = HatId(0x10);
const CONTRIBUTOR: HatId = HatId(0x20);
const DAY: u64 = 86_400;

struct Harness {
    resolver: EligibilityResolver,
    hats: Arc<InMemoryHats>,
    clock: Arc<ManualClock>,
    root: Identity,
}

fn harness(limits: VouchingLimits) -> Harness {
    let hats = Arc::new(InMemoryHats::new());
    let clock = Arc::new(ManualClock::new(100 * DAY));
    let root = Identity::new("root");
    let resolver = EligibilityResolver::new(root.clone(), limits, hats.clone(), clock.clone());
    Harness {
        resolver,
        hats,
        clock,
        root,
    }
}

impl Harness {
    fn members(&self, names: &[&str]) -> Vec<Identity> {
        names
            .iter()
            .map(|name| {
                let id = Identity::new(*name);
                self.hats.wear(MEMBER, &id);
                id
            })
            .collect()
    }
}

#[test]
fn test_quorum_of_three_then_revoke() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 3, MEMBER, false)
        .unwrap();
    let vouchers = h.members(&["v1", "v2", "v3"]);
    let candidate = Identity::new("candidate");

    for (i, voucher) in vouchers.iter().enumerate() {
        assert!(!h.resolver.wearer_status(&candidate, CONTRIBUTOR).eligible);
        h.resolver
            .vouch_for(voucher, &candidate, CONTRIBUTOR)
            .unwrap();
        assert_eq!(
            h.resolver.vouch_count(&candidate, CONTRIBUTOR),
            i as u32 + 1
        );
    }
    assert_eq!(
        h.resolver.wearer_status(&candidate, CONTRIBUTOR),
        WearerStatus::new(true, true)
    );

    h.resolver
        .revoke_vouch(&vouchers[1], &candidate, CONTRIBUTOR)
        .unwrap();
    assert_eq!(h.resolver.vouch_count(&candidate, CONTRIBUTOR), 2);
    assert!(!h.resolver.wearer_status(&candidate, CONTRIBUTOR).eligible);
    assert!(!h.resolver.has_vouched(&vouchers[1], &candidate, CONTRIBUTOR));

    assert!(matches!(
        h.resolver.revoke_vouch(&vouchers[1], &candidate, CONTRIBUTOR),
        Err(GovernanceError::NoVouchToRevoke { .. })
    ));
}

#[test]
fn test_daily_limit_resets_next_day() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 5, MEMBER, false)
        .unwrap();
    let voucher = h.members(&["busy"]).remove(0);

    for i in 0..3 {
        h.resolver
            .vouch_for(&voucher, &Identity::new(format!("c{i}")), CONTRIBUTOR)
            .unwrap();
    }
    assert_eq!(h.resolver.vouches_today(&voucher), 3);
    assert_eq!(h.resolver.remaining_vouches_today(&voucher), 0);

    let err = h
        .resolver
        .vouch_for(&voucher, &Identity::new("c3"), CONTRIBUTOR)
        .unwrap_err();
    assert_eq!(
        err,
        GovernanceError::VouchingRateLimitExceeded {
            voucher: voucher.clone(),
            day: 100,
            limit: 3,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Rate);
    assert!(err.kind().is_retryable());
    assert_eq!(h.resolver.vouch_count(&Identity::new("c3"), CONTRIBUTOR), 0);

    h.clock.set(101 * DAY);
    h.resolver
        .vouch_for(&voucher, &Identity::new("c3"), CONTRIBUTOR)
        .unwrap();
    assert_eq!(h.resolver.remaining_vouches_today(&voucher), 2);
}

#[test]
fn test_new_user_restriction_window() {
    let h = harness(VouchingLimits {
        new_user_restriction_days: 7,
        ..VouchingLimits::default()
    });
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 1, MEMBER, false)
        .unwrap();
    let newcomer = h.members(&["newcomer"]).remove(0);
    let candidate = Identity::new("candidate");

    assert!(matches!(
        h.resolver.vouch_for(&newcomer, &candidate, CONTRIBUTOR),
        Err(GovernanceError::NewUserVouchingRestricted { .. })
    ));

    let joined = h.resolver.register_join(&newcomer).unwrap();
    h.clock.advance(7 * DAY - 1);
    assert_eq!(
        h.resolver.vouch_for(&newcomer, &candidate, CONTRIBUTOR),
        Err(GovernanceError::NewUserVouchingRestricted {
            voucher: newcomer.clone(),
            allowed_at: joined + 7 * DAY,
        })
    );

    h.clock.advance(1);
    h.resolver
        .vouch_for(&newcomer, &candidate, CONTRIBUTOR)
        .unwrap();

    // Backdated by the super admin
    let veteran = h.members(&["veteran"]).remove(0);
    h.resolver
        .set_user_join_time(&h.root, &veteran, 0)
        .unwrap();
    h.resolver
        .vouch_for(&veteran, &Identity::new("other"), CONTRIBUTOR)
        .unwrap();
}

#[test]
fn test_claim_after_quorum() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 2, MEMBER, false)
        .unwrap();
    let vouchers = h.members(&["v1", "v2"]);
    let candidate = Identity::new("candidate");

    h.resolver
        .vouch_for(&vouchers[0], &candidate, CONTRIBUTOR)
        .unwrap();
    assert_eq!(
        h.resolver.claim_vouched_hat(&candidate, CONTRIBUTOR),
        Err(GovernanceError::NotEligible {
            wearer: candidate.clone(),
            hat: CONTRIBUTOR,
        })
    );

    h.resolver
        .vouch_for(&vouchers[1], &candidate, CONTRIBUTOR)
        .unwrap();
    h.resolver
        .claim_vouched_hat(&candidate, CONTRIBUTOR)
        .unwrap();
    assert!(h.hats.is_wearer_of(&candidate, CONTRIBUTOR));
    assert!(matches!(
        h.resolver.events().last().map(|e| &e.event),
        Some(GovernanceEvent::HatClaimed { .. })
    ));

    assert_eq!(
        h.resolver.claim_vouched_hat(&candidate, CONTRIBUTOR),
        Err(GovernanceError::AlreadyWearingHat {
            wearer: candidate.clone(),
            hat: CONTRIBUTOR,
        })
    );
}

#[test]
fn test_claim_fails_when_mint_refused() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .set_default_eligibility(&h.root, CONTRIBUTOR, true, true)
        .unwrap();
    h.hats.refuse_writes(true);
    let err = h
        .resolver
        .claim_vouched_hat(&Identity::new("anyone"), CONTRIBUTOR)
        .unwrap_err();
    assert!(matches!(err, GovernanceError::OracleRejected(_)));
}

#[test]
fn test_revoke_below_quorum_pushes_standing_to_hierarchy() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 1, MEMBER, false)
        .unwrap();
    let voucher = h.members(&["voucher"]).remove(0);
    let wearer = Identity::new("wearer");

    h.resolver
        .vouch_for(&voucher, &wearer, CONTRIBUTOR)
        .unwrap();
    h.resolver.claim_vouched_hat(&wearer, CONTRIBUTOR).unwrap();

    h.resolver
        .revoke_vouch(&voucher, &wearer, CONTRIBUTOR)
        .unwrap();
    assert_eq!(
        h.hats.standing_updates(),
        vec![StandingUpdate {
            hat: CONTRIBUTOR,
            wearer: wearer.clone(),
            eligible: false,
            standing: true,
        }]
    );
    assert!(!h.hats.is_wearer_of(&wearer, CONTRIBUTOR));
    assert!(matches!(
        h.resolver.events().last().map(|e| &e.event),
        Some(GovernanceEvent::VouchRevoked {
            count: 0,
            standing_revoked: true,
            ..
        })
    ));
}

#[test]
fn test_revoke_side_effect_skipped_with_override() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 1, MEMBER, false)
        .unwrap();
    let voucher = h.members(&["voucher"]).remove(0);
    let wearer = Identity::new("wearer");
    h.hats.wear(CONTRIBUTOR, &wearer);
    h.resolver
        .set_wearer_eligibility(&h.root, &wearer, CONTRIBUTOR, true, true)
        .unwrap();

    h.resolver
        .vouch_for(&voucher, &wearer, CONTRIBUTOR)
        .unwrap();
    h.resolver
        .revoke_vouch(&voucher, &wearer, CONTRIBUTOR)
        .unwrap();
    assert!(h.hats.standing_updates().is_empty());
    assert!(h.hats.is_wearer_of(&wearer, CONTRIBUTOR));
}

#[test]
fn test_refused_standing_update_aborts_revoke() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 1, MEMBER, false)
        .unwrap();
    let voucher = h.members(&["voucher"]).remove(0);
    let wearer = Identity::new("wearer");
    h.hats.wear(CONTRIBUTOR, &wearer);
    h.resolver
        .vouch_for(&voucher, &wearer, CONTRIBUTOR)
        .unwrap();

    h.hats.refuse_writes(true);
    assert!(matches!(
        h.resolver.revoke_vouch(&voucher, &wearer, CONTRIBUTOR),
        Err(GovernanceError::OracleRejected(_))
    ));
    assert_eq!(h.resolver.vouch_count(&wearer, CONTRIBUTOR), 1);
    assert!(h.resolver.has_vouched(&voucher, &wearer, CONTRIBUTOR));
}

#[test]
fn test_combine_with_hierarchy() {
    let h = harness(VouchingLimits::default());
    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 2, MEMBER, true)
        .unwrap();
    let alice = Identity::new("alice");
    let bob = Identity::new("bob");

    // Hierarchy alone is enough when combined
    h.resolver
        .set_wearer_eligibility(&h.root, &alice, CONTRIBUTOR, true, true)
        .unwrap();
    assert!(h.resolver.wearer_status(&alice, CONTRIBUTOR).eligible);

    // So are vouches alone
    let vouchers = h.members(&["v1", "v2"]);
    for voucher in &vouchers {
        h.resolver.vouch_for(voucher, &bob, CONTRIBUTOR).unwrap();
    }
    assert!(h.resolver.wearer_status(&bob, CONTRIBUTOR).eligible);

    // Bad standing overrides both
    h.resolver
        .set_wearer_eligibility(&h.root, &bob, CONTRIBUTOR, true, false)
        .unwrap();
    assert_eq!(
        h.resolver.wearer_status(&bob, CONTRIBUTOR),
        WearerStatus::new(false, false)
    );

    // Hat admins may vouch without the membership hat
    let officer = Identity::new("officer");
    h.hats.make_admin(CONTRIBUTOR, &officer);
    h.resolver
        .vouch_for(&officer, &Identity::new("carol"), CONTRIBUTOR)
        .unwrap();
}

#[test]
fn test_replace_mode_ignores_hierarchy() {
    let h = harness(VouchingLimits::default());
    let alice = Identity::new("alice");
    h.resolver
        .set_default_eligibility(&h.root, CONTRIBUTOR, true, true)
        .unwrap();
    assert!(h.resolver.wearer_status(&alice, CONTRIBUTOR).eligible);

    h.resolver
        .configure_vouching(&h.root, CONTRIBUTOR, 1, MEMBER, false)
        .unwrap();
    assert!(!h.resolver.wearer_status(&alice, CONTRIBUTOR).eligible);

    let officer = Identity::new("officer");
    h.hats.make_admin(CONTRIBUTOR, &officer);
    assert!(matches!(
        h.resolver.vouch_for(&officer, &alice, CONTRIBUTOR),
        Err(GovernanceError::NotAuthorizedToVouch { .. })
    ));
}

#[test]
fn test_batch_operations_emit_single_event() {
    let h = harness(VouchingLimits::default());
    let wearers = vec![Identity::new("a"), Identity::new("b"), Identity::new("c")];
    h.resolver
        .batch_set_wearer_eligibility(
            &h.root,
            CONTRIBUTOR,
            &wearers,
            &[true, false, true],
            &[true, true, false],
        )
        .unwrap();
    assert_eq!(h.resolver.events().len(), 1);
    assert!(h.resolver.wearer_status(&wearers[0], CONTRIBUTOR).eligible);
    assert!(!h.resolver.wearer_status(&wearers[1], CONTRIBUTOR).eligible);
    assert!(!h.resolver.wearer_status(&wearers[2], CONTRIBUTOR).standing);

    let role_a = HatId(0x30);
    let role_b = HatId(0x31);
    h.resolver
        .batch_configure_vouching(
            &h.root,
            &[role_a, role_b],
            &[1, 2],
            &[MEMBER, MEMBER],
            &[false, true],
        )
        .unwrap();
    assert_eq!(h.resolver.events().len(), 2);
    assert_eq!(h.resolver.vouch_config(role_b).unwrap().quorum, 2);

    h.resolver
        .batch_mint_hats(&h.root, &[role_a, role_b], &wearers[..2])
        .unwrap();
    assert_eq!(h.resolver.events().len(), 3);
    assert!(h.hats.is_wearer_of(&wearers[1], role_b));
}

#[test]
fn test_batch_authorization_is_per_element() {
    let h = harness(VouchingLimits::default());
    let officer = Identity::new("officer");
    let owned = HatId(0x40);
    let foreign = HatId(0x41);
    h.hats.make_admin(owned, &officer);

    assert_eq!(
        h.resolver.batch_configure_vouching(
            &officer,
            &[owned, foreign],
            &[1, 1],
            &[MEMBER, MEMBER],
            &[false, false],
        ),
        Err(GovernanceError::NotHatAdmin {
            caller: officer.clone(),
            hat: foreign,
        })
    );
    assert_eq!(h.resolver.vouch_config(owned), None);

    assert_eq!(
        h.resolver
            .batch_configure_vouching(&h.root, &[owned], &[0], &[MEMBER], &[false]),
        Err(GovernanceError::InvalidQuorum(0))
    );
}

#[test]
fn test_batch_mint_checks_every_pair_first() {
    let h = harness(VouchingLimits::default());
    let a = Identity::new("a");
    let b = Identity::new("b");
    h.hats.wear(CONTRIBUTOR, &b);

    assert!(matches!(
        h.resolver
            .batch_mint_hats(&h.root, &[CONTRIBUTOR, CONTRIBUTOR], &[a.clone(), b]),
        Err(GovernanceError::AlreadyWearingHat { .. })
    ));
    assert!(!h.hats.is_wearer_of(&a, CONTRIBUTOR));
    assert!(h.resolver.events().is_empty());
}

#[test]
fn test_batch_mint_rejects_repeated_pair() {
    let h = harness(VouchingLimits::default());
    let alice = Identity::new("alice");

    assert_eq!(
        h.resolver.batch_mint_hats(
            &h.root,
            &[CONTRIBUTOR, CONTRIBUTOR],
            &[alice.clone(), alice.clone()]
        ),
        Err(GovernanceError::AlreadyWearingHat {
            wearer: alice.clone(),
            hat: CONTRIBUTOR,
        })
    );
    assert!(!h.hats.is_wearer_of(&alice, CONTRIBUTOR));
    assert!(h.resolver.events().is_empty());
}
