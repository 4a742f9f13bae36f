//! Organization: the owned world state of one governed organization
//!
//! Bundles a direct-democracy [`ProposalEngine`], an optional hybrid engine
//! and the [`EligibilityResolver`], all reading the same role hierarchy and
//! clock.

use crate::clock::Clock;
use crate::eligibility::EligibilityResolver;
use crate::oracle::{BalanceSource, Executor, HatsOracle};
use crate::proposals::ProposalEngine;
use council_types::{ClassConfig, GovernanceConfig, GovernanceResult, HatId, Identity, Timestamp};
use std::sync::Arc;
use tracing::info;

pub struct Organization {
    config: GovernanceConfig,
    address: Identity,
    executor: Identity,
    hats: Arc<dyn HatsOracle>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn Executor>,
    direct: ProposalEngine,
    hybrid: Option<ProposalEngine>,
    eligibility: EligibilityResolver,
}

impl Organization {
    /// Build an organization after validating `config`
    pub fn new(
        config: GovernanceConfig,
        address: Identity,
        executor: Identity,
        super_admin: Identity,
        hats: Arc<dyn HatsOracle>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn Executor>,
    ) -> GovernanceResult<Self> {
        config.validate()?;

        let direct = ProposalEngine::new(
            address.clone(),
            executor.clone(),
            config.proposals.clone(),
            hats.clone(),
            clock.clone(),
            dispatcher.clone(),
        );
        let eligibility = EligibilityResolver::new(
            super_admin,
            config.vouching.clone(),
            hats.clone(),
            clock.clone(),
        );

        info!(organization = %address, executor = %executor, "Organization created");
        Ok(Self {
            config,
            address,
            executor,
            hats,
            clock,
            dispatcher,
            direct,
            hybrid: None,
            eligibility,
        })
    }

    /// Add a hybrid engine voting over `classes`
    pub fn with_hybrid(
        mut self,
        classes: Vec<ClassConfig>,
        balances: Arc<dyn BalanceSource>,
    ) -> GovernanceResult<Self> {
        let engine = ProposalEngine::new(
            self.address.clone(),
            self.executor.clone(),
            self.config.proposals.clone(),
            self.hats.clone(),
            self.clock.clone(),
            self.dispatcher.clone(),
        )
        .with_balances(balances);
        let class_count = classes.len();
        engine.set_classes(&self.executor, classes)?;

        info!(organization = %self.address, class_count, "Hybrid voting enabled");
        self.hybrid = Some(engine);
        Ok(self)
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn address(&self) -> &Identity {
        &self.address
    }

    /// Direct-democracy engine
    pub fn proposals(&self) -> &ProposalEngine {
        &self.direct
    }

    pub fn hybrid(&self) -> Option<&ProposalEngine> {
        self.hybrid.as_ref()
    }

    pub fn eligibility(&self) -> &EligibilityResolver {
        &self.eligibility
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// True when `who` wears `hat` and the resolver still allows it
    pub fn is_active_wearer(&self, who: &Identity, hat: HatId) -> bool {
        self.hats.is_wearer_of(who, hat) && self.eligibility.wearer_status(who, hat).can_wear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::oracle::{InMemoryBalances, InMemoryHats, RecordingExecutor};
    use council_types::{GovernanceError, ProposalDraft, TallyError, TallyScheme};

    fn org(config: GovernanceConfig) -> GovernanceResult<(Organization, Arc<InMemoryHats>)> {
        let hats = Arc::new(InMemoryHats::new());
        let org = Organization::new(
            config,
            Identity::new("org"),
            Identity::new("executor"),
            Identity::new("root"),
            hats.clone(),
            Arc::new(ManualClock::new(0)),
            Arc::new(RecordingExecutor::new()),
        )?;
        Ok((org, hats))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GovernanceConfig::default();
        config.proposals.max_options = 0;
        assert!(matches!(org(config), Err(GovernanceError::Config(_))));
    }

    #[test]
    fn test_engines_share_configuration() {
        let mut config = GovernanceConfig::default();
        config.proposals.default_quorum_percent = 66;
        let (org, _) = org(config).unwrap();
        assert_eq!(org.proposals().quorum_percent(), 66);
        assert_eq!(org.eligibility().super_admin(), Identity::new("root"));
        assert!(org.hybrid().is_none());

        let executor = Identity::new("executor");
        org.proposals()
            .create_proposal(&executor, ProposalDraft::new("Charter", 60, 2))
            .unwrap();
        assert_eq!(org.proposals().proposal_count(), 1);
    }

    #[test]
    fn test_with_hybrid_validates_classes() {
        let (base, _) = org(GovernanceConfig::default()).unwrap();
        let balances = Arc::new(InMemoryBalances::new());
        let err = base
            .with_hybrid(vec![ClassConfig::direct(40)], balances.clone())
            .err();
        assert_eq!(
            err,
            Some(GovernanceError::Tally(TallyError::SliceSumNot100(40)))
        );

        let (base, _) = org(GovernanceConfig::default()).unwrap();
        let org = base
            .with_hybrid(
                vec![
                    ClassConfig::direct(50),
                    ClassConfig::token(Identity::new("gov-token"), 50),
                ],
                balances,
            )
            .unwrap();
        let hybrid = org.hybrid().unwrap();
        assert_eq!(hybrid.scheme().class_count(), 2);
        assert!(matches!(hybrid.scheme(), TallyScheme::Sliced(_)));
    }

    #[test]
    fn test_active_wearer_needs_eligibility() {
        let (org, hats) = org(GovernanceConfig::default()).unwrap();
        let root = Identity::new("root");
        let alice = Identity::new("alice");
        let hat = HatId(7);
        hats.wear(hat, &alice);
        assert!(!org.is_active_wearer(&alice, hat));

        org.eligibility()
            .set_default_eligibility(&root, hat, true, true)
            .unwrap();
        assert!(org.is_active_wearer(&alice, hat));
    }
}
