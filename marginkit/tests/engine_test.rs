//! Integration tests for the risk engine: atomic listings, margin engine
//! updates, and risk resolution across overrides and categories.

use std::collections::BTreeSet;
use std::sync::Arc;

use marginkit::*;
use rust_decimal_macros::dec;

const NETWORK: &str = r#"{
    "name": "arbitrum-one",
    "chainId": 42161,
    "adapters": ["CHAINLINK", "STATIC"],
    "tokens": [
        {"address": "0x82af49447d8a07e3bd95bd0d56f35241523fbab1", "symbol": "WETH", "decimals": 18},
        {"address": "0xaf88d065e77c8cc2239327c5edb3a432268e5831", "symbol": "USDC", "decimals": 6},
        {"address": "0x2f2a2543b76a4166549f7aab2e75bef0aefc5b0f", "symbol": "WBTC", "decimals": 8},
        {"address": "0x5979d7b546e38e414f7e9822514be443a4800529", "symbol": "wstETH", "decimals": 18}
    ],
    "contracts": {
        "LinearStepFunction8L92UInterestSetter": "0xbe4e5ab2f2bd2c0e5d6a36e4f8e5f6a8b7c6d5e4"
    },
    "baseRates": {"collateralization": "115%", "liquidationSpread": "5%"}
}"#;

const SETTER: &str = "LinearStepFunction8L92UInterestSetter";

struct Harness {
    network: Arc<NetworkConfig>,
    margin: Arc<RecordingMarginEngine>,
    engine: RiskEngine,
}

impl Harness {
    async fn new() -> Self {
        let network = Arc::new(NetworkConfig::from_json(NETWORK).unwrap());
        let margin = Arc::new(RecordingMarginEngine::new(network.base_rates));
        let engine = RiskEngine::new(network.clone(), margin.clone());

        let mut quotes = StaticPriceSource::new();
        for (symbol, price, decimals) in [
            ("WETH", 3_000_00000000u128, 8u8),
            ("USDC", 1_00000000, 8),
            ("WBTC", 60_000_00000000, 8),
            // wstETH quoted in WETH.
            ("wstETH", 1_180000000000000000, 18),
        ] {
            quotes = quotes.with_quote(network.token(symbol).unwrap().address.clone(), price, decimals);
        }
        engine
            .register_source(SourceRef::new("static"), OracleAdapter::Static, Arc::new(quotes))
            .await
            .unwrap();

        Self {
            network,
            margin,
            engine,
        }
    }

    fn token(&self, symbol: &str) -> Token {
        self.network.token(symbol).unwrap().clone()
    }

    fn request(&self, symbol: &str) -> ListingRequest {
        let token = self.token(symbol);
        ListingRequest {
            oracle: Some(OracleListing {
                decimals: token.decimals,
                sources: vec![PriceSourceEntry::usd("static", 100)],
            }),
            listing: MarketListing {
                token,
                interest_setter: InterestSetterRef(SETTER.into()),
                min_collateralization: "125%".parse().unwrap(),
                liquidation_penalty: "6%".parse().unwrap(),
                supply_cap: Cap::Limited(1_000_000),
                borrow_cap: Cap::Unlimited,
                is_collateral_only: false,
            },
            category: RiskCategory::None,
            overrides: Vec::new(),
        }
    }
}

fn settings(margin: &str, reward: &str) -> RiskSettings {
    RiskSettings {
        margin_ratio: margin.parse().unwrap(),
        liquidation_reward: reward.parse().unwrap(),
    }
}

fn ids(v: &[u32]) -> BTreeSet<MarketId> {
    v.iter().copied().map(MarketId).collect()
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_listing_pushes_market_update() {
    let h = Harness::new().await;
    let id = h.engine.list_market(h.request("WETH")).await.unwrap();
    assert_eq!(id, MarketId(0));

    let updates = h.margin.updates().await;
    assert_eq!(updates.len(), 1);
    let u = &updates[0];
    assert_eq!(u.market_id, id);
    assert_eq!(u.margin_premium.value(), dec!(0.086956521739130434));
    assert_eq!(u.liquidation_premium.value(), dec!(0.2));
    assert_eq!(u.supply_cap, Cap::Limited(1_000_000));
    assert_eq!(u.base_rates, h.network.base_rates);
}

#[tokio::test]
async fn test_failed_listing_leaves_nothing_behind() {
    let h = Harness::new().await;
    let mut request = h.request("WETH");
    request.listing.interest_setter = InterestSetterRef("Missing".into());
    let weth = request.listing.token.address.clone();

    let err = h.engine.list_market(request).await.unwrap_err();
    assert!(matches!(err, RiskError::UnknownContract(_)), "{err}");

    // The oracle config from the same request was not kept either.
    let state = h.engine.snapshot();
    assert!(state.oracle.config(&weth).is_none());
    assert!(state.markets.is_empty());
    assert!(h.margin.updates().await.is_empty());
}

#[tokio::test]
async fn test_listing_with_bad_override_is_rejected_whole() {
    let h = Harness::new().await;
    let mut request = h.request("WETH");
    request.category = RiskCategory::Eth;
    request.overrides = vec![SingleCollateralDebtOverride {
        debt_market_ids: BTreeSet::new(),
        settings: settings("105%", "2%"),
    }];

    assert!(h.engine.list_market(request).await.is_err());
    let state = h.engine.snapshot();
    assert!(state.markets.is_empty());
    assert!(state.categories.markets_in_category(RiskCategory::Eth).is_empty());
}

#[tokio::test]
async fn test_listing_with_forged_decimals_is_rejected() {
    let h = Harness::new().await;
    let mut request = h.request("USDC");
    request.listing.token.decimals = 18;
    if let Some(oracle) = request.oracle.as_mut() {
        oracle.decimals = 18;
    }
    let usdc = request.listing.token.address.clone();

    let err = h.engine.list_market(request).await.unwrap_err();
    assert!(matches!(err, RiskError::DecimalMismatch { .. }), "{err}");
    let state = h.engine.snapshot();
    assert!(state.oracle.config(&usdc).is_none());
    assert!(state.markets.is_empty());

    // A genuine listing still scales UI caps by the network's 6 decimals.
    h.engine.list_market(h.request("USDC")).await.unwrap();
    h.engine.set_supply_cap_ui(&usdc, dec!(1)).await.unwrap();
    let market = h.engine.snapshot().markets.market_by_token(&usdc).unwrap().clone();
    assert_eq!(market.supply_cap, Cap::Limited(1_000_000));
    assert_eq!(h.engine.snapshot().oracle.config(&usdc).unwrap().decimals, 6);
}

#[tokio::test]
async fn test_rejected_margin_update_keeps_old_state() {
    let h = Harness::new().await;
    let id = h.engine.list_market(h.request("WETH")).await.unwrap();

    h.margin.reject_next_update("paused").await;
    let err = h
        .engine
        .set_borrow_cap(id, Cap::Limited(0))
        .await
        .unwrap_err();
    assert!(
        matches!(
            &err,
            RiskError::MarginEngineRejected { market, reason }
                if market == "#0" && reason == "paused"
        ),
        "{err}"
    );

    let view = h.engine.market_view(id).unwrap();
    assert_eq!(view.market.borrow_cap, Cap::Unlimited);
    assert_eq!(h.margin.updates().await.len(), 1);
}

#[tokio::test]
async fn test_ui_caps_and_flags_reach_margin_engine() {
    let h = Harness::new().await;
    let request = h.request("USDC");
    let usdc = request.listing.token.address.clone();
    let id = h.engine.list_market(request).await.unwrap();

    h.engine.set_supply_cap_ui(&usdc, dec!(5000000)).await.unwrap();
    h.engine.set_is_borrow_only(id, true).await.unwrap();

    let updates = h.margin.updates().await;
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[1].supply_cap, Cap::Limited(5_000_000_000_000));
    assert!(updates[2].is_borrow_only);
}

#[tokio::test]
async fn test_premium_recomputed_against_live_base() {
    let h = Harness::new().await;
    let id = h.engine.list_market(h.request("WETH")).await.unwrap();

    let new_base = BaseRates {
        collateralization: "120%".parse().unwrap(),
        liquidation_spread: "5%".parse().unwrap(),
    };
    h.margin.set_base_rates(new_base).await;
    h.engine
        .set_min_collateralization(id, "150%".parse().unwrap())
        .await
        .unwrap();

    let last = h.margin.updates().await.pop().unwrap();
    assert_eq!(last.margin_premium.value(), dec!(0.25));
    assert_eq!(last.base_rates, new_base);
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pair_priced_market() {
    let h = Harness::new().await;
    h.engine.list_market(h.request("WETH")).await.unwrap();

    let mut request = h.request("wstETH");
    request.oracle = Some(OracleListing {
        decimals: 18,
        sources: vec![PriceSourceEntry::paired(
            "static",
            h.token("WETH").address,
            100,
        )],
    });
    h.engine.list_market(request).await.unwrap();

    let price = h.engine.get_price(&h.token("wstETH").address).await.unwrap();
    assert_eq!(price.value, dec!(3540));
    assert_eq!(price.to_protocol_units().unwrap(), 3540 * 10u128.pow(18));
}

#[tokio::test]
async fn test_oracle_round_trip_through_engine() {
    let h = Harness::new().await;
    let usdc = h.token("USDC");
    let sources = vec![PriceSourceEntry::usd("static", 100)];
    h.engine
        .insert_or_update_oracle_config(&usdc.address, 6, sources.clone())
        .await
        .unwrap();

    let state = h.engine.snapshot();
    let config = state.oracle.config(&usdc.address).unwrap();
    assert_eq!(
        config,
        &AggregatedPriceConfig {
            token: usdc.address.clone(),
            decimals: 6,
            sources,
        }
    );
}

// ---------------------------------------------------------------------------
// Risk resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_override_beats_category() {
    let h = Harness::new().await;
    let usdc = h.engine.list_market(h.request("USDC")).await.unwrap();
    let mut weth = h.request("WETH");
    weth.category = RiskCategory::Eth;
    weth.overrides = vec![SingleCollateralDebtOverride {
        debt_market_ids: ids(&[usdc.0]),
        settings: settings("108%", "3%"),
    }];
    let weth = h.engine.list_market(weth).await.unwrap();
    h.engine
        .set_category_settings(RiskCategory::Eth, settings("112%", "4%"))
        .await
        .unwrap();

    let r = h.engine.resolve_risk(weth, &ids(&[usdc.0])).await.unwrap();
    assert_eq!(r.source, RiskSource::DebtOverride { index: 0 });
    assert_eq!(r.settings, settings("108%", "3%"));

    let r = h.engine.resolve_risk(weth, &BTreeSet::new()).await.unwrap();
    assert_eq!(
        r.source,
        RiskSource::Category {
            category: RiskCategory::Eth
        }
    );
}

#[tokio::test]
async fn test_category_settings_apply_to_every_tagged_market() {
    let h = Harness::new().await;
    let mut tagged = Vec::new();
    for symbol in ["WETH", "wstETH"] {
        let mut request = h.request(symbol);
        request.category = RiskCategory::Eth;
        tagged.push(h.engine.list_market(request).await.unwrap());
    }
    let usdc = h.engine.list_market(h.request("USDC")).await.unwrap();

    let affected = h
        .engine
        .set_category_settings(RiskCategory::Eth, settings("110%", "3%"))
        .await
        .unwrap();
    assert_eq!(affected, tagged);

    for id in &tagged {
        let r = h.engine.resolve_risk(*id, &ids(&[usdc.0])).await.unwrap();
        assert_eq!(r.settings, settings("110%", "3%"));
    }
    let r = h.engine.resolve_risk(usdc, &ids(&[tagged[0].0])).await.unwrap();
    assert_eq!(r.source, RiskSource::Market);
}

#[tokio::test]
async fn test_retagging_requires_clearing_first() {
    let h = Harness::new().await;
    let mut request = h.request("WBTC");
    request.category = RiskCategory::Btc;
    let id = h.engine.list_market(request).await.unwrap();

    let err = h
        .engine
        .set_category(id, RiskCategory::Eth)
        .await
        .unwrap_err();
    assert!(matches!(err, RiskError::DuplicateCategoryAssignment { .. }));

    h.engine.set_category(id, RiskCategory::None).await.unwrap();
    h.engine.set_category(id, RiskCategory::Eth).await.unwrap();
    assert_eq!(h.engine.market_view(id).unwrap().category, RiskCategory::Eth);
}

#[tokio::test]
async fn test_unknown_market_operations() {
    let h = Harness::new().await;
    assert!(matches!(
        h.engine.market_view(MarketId(3)).unwrap_err(),
        RiskError::UnknownMarket(_)
    ));
    assert!(matches!(
        h.engine
            .set_category(MarketId(3), RiskCategory::Stable)
            .await
            .unwrap_err(),
        RiskError::UnknownMarket(_)
    ));
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_readers_keep_their_snapshot() {
    let h = Harness::new().await;
    let before = h.engine.snapshot();
    let mut rx = h.engine.subscribe();

    h.engine.list_market(h.request("WETH")).await.unwrap();

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().markets.len(), 1);
    assert!(before.markets.is_empty());
    assert_eq!(h.engine.market_views().len(), 1);
}
