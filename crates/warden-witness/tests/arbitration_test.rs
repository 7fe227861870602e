//! Orchestrator integration tests against a live registry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use warden_core::{Claim, ClaimType, Direction, MarketBar, MarketWindow, Tier, WitnessHealth};
use warden_registry::{WitnessHealthProvider, WitnessRegistry};
use warden_witness::{
    ActivityFlag, ArbitrationConfig, Orchestrator, Resolution, Witness, WitnessResult,
    WitnessSetConfig,
};

fn bar(minute: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> MarketBar {
    MarketBar {
        timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
            + Duration::minutes(minute),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Five quiet rising bars, then `last`.
fn window_ending_with(last: MarketBar) -> Arc<MarketWindow> {
    let mut bars: Vec<MarketBar> = [dec!(100), dec!(100.4), dec!(100.8), dec!(101.2), dec!(101.5)]
        .iter()
        .enumerate()
        .map(|(i, c)| bar(i as i64, *c, *c, *c, *c, dec!(1)))
        .collect();
    bars.push(last);
    Arc::new(MarketWindow::new("BTC", bars).unwrap())
}

fn registry_for(witnesses: &[Arc<dyn Witness>]) -> Arc<WitnessRegistry> {
    let registry = Arc::new(WitnessRegistry::default());
    for w in witnesses {
        registry
            .upsert(WitnessHealth::new(w.strategy_id(), w.tier(), dec!(0.55), 0, dec!(0.5)).unwrap())
            .unwrap();
    }
    registry
}

fn orchestrator(witnesses: Vec<Arc<dyn Witness>>) -> (Orchestrator, Arc<WitnessRegistry>) {
    let registry = registry_for(&witnesses);
    let orchestrator = Orchestrator::new(
        Arc::clone(&registry) as Arc<dyn WitnessHealthProvider>,
        ArbitrationConfig::default(),
    );
    for w in witnesses {
        orchestrator.register(w).unwrap();
    }
    (orchestrator, registry)
}

/// Emits a fixed claim, or panics when `claim` is `None`.
struct Fixed {
    id: &'static str,
    tier: Tier,
    claim: Option<(ClaimType, Decimal, Option<Direction>)>,
    active: ActivityFlag,
}

impl Fixed {
    fn arc(
        id: &'static str,
        tier: Tier,
        claim: Option<(ClaimType, Decimal, Option<Direction>)>,
    ) -> Arc<dyn Witness> {
        Arc::new(Self {
            id,
            tier,
            claim,
            active: ActivityFlag::default(),
        })
    }
}

impl Witness for Fixed {
    fn strategy_id(&self) -> &str {
        self.id
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn mute(&self) {
        self.active.set(false);
    }

    fn activate(&self) {
        self.active.set(true);
    }

    fn generate_claim(&self, _window: &MarketWindow) -> WitnessResult<Option<Claim>> {
        let Some((kind, confidence, direction)) = self.claim else {
            panic!("{} blew up", self.id);
        };
        let mut builder = Claim::builder(self.id, kind)
            .confidence(confidence)
            .validity_secs(60);
        if let Some(d) = direction {
            builder = builder.direction(d);
        }
        Ok(Some(builder.build()?))
    }
}

fn quiet_window() -> Arc<MarketWindow> {
    window_ending_with(bar(5, dec!(101.5), dec!(101.6), dec!(101.4), dec!(101.5), dec!(1)))
}

#[tokio::test]
async fn test_veto_dominates_everything() {
    let (orchestrator, _) = orchestrator(vec![
        Fixed::arc("core", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.95), Some(Direction::Long)))),
        Fixed::arc("support", Tier::Tier2, Some((ClaimType::RegimeMatched, dec!(0.9), Some(Direction::Long)))),
        Fixed::arc("guard", Tier::Tier3, Some((ClaimType::ExecutionVeto, dec!(0.55), None))),
    ]);
    let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
    assert_eq!(claims.len(), 3);

    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::Vetoed);
    assert!(!result.is_tradeable);
    assert_eq!(result.vetoed_by, vec!["guard".to_string()]);
}

#[tokio::test]
async fn test_tier1_disagreement_is_regime_unclear() {
    let (orchestrator, _) = orchestrator(vec![
        Fixed::arc("up", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.7), Some(Direction::Long)))),
        Fixed::arc("down", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.7), Some(Direction::Short)))),
    ]);
    let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::RegimeUnclear);
    assert!(!result.is_tradeable);
    assert!(!orchestrator.check_high_trading_window(&claims).active);
}

#[tokio::test]
async fn test_dominant_claim_selected() {
    let (orchestrator, _) = orchestrator(vec![
        Fixed::arc("core", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.8), Some(Direction::Long)))),
        Fixed::arc("support", Tier::Tier2, Some((ClaimType::RegimeMatched, dec!(0.6), Some(Direction::Long)))),
    ]);
    let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::DominantSelected);
    assert!(result.is_tradeable);
    assert_eq!(result.direction, Some(Direction::Long));
    assert_eq!(result.dominant_claim.unwrap().strategy_id(), "core");
}

#[tokio::test]
async fn test_tier2_veto_claim_cannot_block_or_dominate() {
    let (orchestrator, _) = orchestrator(vec![
        Fixed::arc("core", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.7), Some(Direction::Long)))),
        Fixed::arc("nervous", Tier::Tier2, Some((ClaimType::ExecutionVeto, dec!(0.9), None))),
    ]);
    let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::DominantSelected);
    assert!(result.is_tradeable);
    assert_eq!(result.direction, Some(Direction::Long));
    assert_eq!(result.dominant_claim.unwrap().strategy_id(), "core");
}

#[tokio::test]
async fn test_muted_witness_claims_excluded() {
    let (orchestrator, registry) = orchestrator(vec![
        Fixed::arc("core", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.6), Some(Direction::Long)))),
        Fixed::arc("loud", Tier::Tier2, Some((ClaimType::RegimeMatched, dec!(0.9), Some(Direction::Short)))),
    ]);
    let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
    registry.mute("loud").unwrap();

    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.excluded, vec!["loud".to_string()]);
    assert_eq!(result.dominant_claim.unwrap().strategy_id(), "core");
}

#[tokio::test]
async fn test_panicking_witness_does_not_stop_others() {
    let (orchestrator, _) = orchestrator(vec![
        Fixed::arc("core", Tier::Tier1, Some((ClaimType::MarketEligible, dec!(0.8), Some(Direction::Long)))),
        Fixed::arc("broken", Tier::Tier2, None),
    ]);
    for _ in 0..3 {
        let claims = orchestrator.run_witnesses(quiet_window()).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].strategy_id(), "core");
    }
}

#[tokio::test]
async fn test_builtin_witnesses_trade_on_confirmed_move() {
    let witnesses = WitnessSetConfig::default().build().unwrap();
    let (orchestrator, _) = orchestrator(witnesses);

    // Rising closes with a 5x volume spike on a narrow green bar.
    let window = window_ending_with(bar(5, dec!(101.5), dec!(102.5), dec!(101.4), dec!(102), dec!(5)));
    let claims = orchestrator.run_witnesses(window).await.unwrap();
    let ids: Vec<_> = claims.iter().map(|c| c.strategy_id()).collect();
    assert_eq!(ids, vec!["momentum", "volume_confirm"]);

    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::DominantSelected);
    assert!(result.is_tradeable);
    assert_eq!(result.direction, Some(Direction::Long));
    assert_eq!(result.dominant_claim.unwrap().strategy_id(), "momentum");

    let signal = orchestrator.check_high_trading_window(&claims);
    assert!(signal.active);
    assert_eq!(signal.direction, Some(Direction::Long));
    // mean of 0.95 and 0.875 at equal weight
    assert_eq!(signal.confidence, dec!(0.9125));
}

#[tokio::test]
async fn test_builtin_veto_on_wide_bar() {
    let witnesses = WitnessSetConfig::default().build().unwrap();
    let (orchestrator, _) = orchestrator(witnesses);

    let window = window_ending_with(bar(5, dec!(101.5), dec!(106), dec!(100), dec!(102), dec!(5)));
    let claims = orchestrator.run_witnesses(window).await.unwrap();
    let result = orchestrator.aggregate_claims(&claims);
    assert_eq!(result.resolution, Resolution::Vetoed);
    assert_eq!(result.vetoed_by, vec!["volatility_veto".to_string()]);
}
