//! Integration tests for network configs and deployment plans, using the
//! checked-in files under `deploy/`.

use std::collections::BTreeSet;
use std::sync::Arc;

use marginkit::*;
use rust_decimal_macros::dec;

const NETWORK_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../deploy/arbitrum-one.json");
const PLAN_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../deploy/plan.json");

fn network() -> Arc<NetworkConfig> {
    Arc::new(NetworkConfig::load(NETWORK_PATH).unwrap())
}

async fn deployed() -> (RiskEngine, Arc<RecordingMarginEngine>, Vec<MarketId>) {
    let network = network();
    let margin = Arc::new(RecordingMarginEngine::new(network.base_rates));
    let engine = RiskEngine::new(network.clone(), margin.clone());
    let plan = DeploymentPlan::load(PLAN_PATH).unwrap();
    let listed = plan.apply(&engine, &network).await.unwrap();
    (engine, margin, listed)
}

#[test]
fn test_network_file_parses() {
    let net = network();
    assert_eq!(net.chain_id, 42161);
    assert_eq!(net.tokens.len(), 4);
    assert!(net.supports(OracleAdapter::PendlePt));
    assert!(!net.supports(OracleAdapter::Twap));
    assert_eq!(net.token("wsteth").unwrap().symbol, "wstETH");
}

#[tokio::test]
async fn test_plan_lists_every_market_in_order() {
    let (engine, margin, listed) = deployed().await;
    assert_eq!(listed, vec![MarketId(0), MarketId(1), MarketId(2), MarketId(3)]);

    let views = engine.market_views();
    let symbols: Vec<_> = views.iter().map(|v| v.market.token.symbol.as_str()).collect();
    assert_eq!(symbols, ["WETH", "USDC", "WBTC", "wstETH"]);

    // One update per listing.
    assert_eq!(margin.updates().await.len(), 4);
}

#[tokio::test]
async fn test_plan_caps_are_ui_units() {
    let (engine, _, _) = deployed().await;
    let usdc = engine.market_view(MarketId(1)).unwrap().market;
    assert_eq!(usdc.supply_cap, Cap::Limited(50_000_000 * 10u128.pow(6)));
    assert_eq!(usdc.borrow_cap, Cap::Unlimited);

    let wbtc = engine.market_view(MarketId(2)).unwrap().market;
    assert_eq!(wbtc.borrow_cap, Cap::Limited(50 * 10u128.pow(8)));
    assert_eq!(wbtc.margin_premium.value(), dec!(0.086956521739130434));
}

#[tokio::test]
async fn test_plan_prices() {
    let (engine, _, _) = deployed().await;
    let net = engine.network().clone();

    let weth = engine.get_price(&net.token("WETH").unwrap().address).await.unwrap();
    assert_eq!(weth.value, dec!(3000));

    let wsteth = engine.get_price(&net.token("wstETH").unwrap().address).await.unwrap();
    assert_eq!(wsteth.value, dec!(3540));

    let usdc = engine.get_price(&net.token("USDC").unwrap().address).await.unwrap();
    assert_eq!(usdc.to_protocol_units().unwrap(), 10u128.pow(30));
}

#[tokio::test]
async fn test_plan_categories_and_overrides() {
    let (engine, _, _) = deployed().await;

    let wsteth = engine.market_view(MarketId(3)).unwrap();
    assert_eq!(wsteth.category, RiskCategory::Eth);
    assert_eq!(wsteth.overrides.len(), 1);
    assert!(wsteth.market.is_collateral_only);

    let debt_weth: BTreeSet<_> = [MarketId(0)].into();
    let r = engine.resolve_risk(MarketId(3), &debt_weth).await.unwrap();
    assert_eq!(r.source, RiskSource::DebtOverride { index: 0 });
    assert_eq!(r.settings.margin_ratio.value(), dec!(1.05));

    let debt_usdc: BTreeSet<_> = [MarketId(1)].into();
    let r = engine.resolve_risk(MarketId(3), &debt_usdc).await.unwrap();
    assert_eq!(
        r.source,
        RiskSource::Category {
            category: RiskCategory::Eth
        }
    );
}

#[tokio::test]
async fn test_plan_rejects_external_adapter() {
    let network = network();
    let margin = Arc::new(RecordingMarginEngine::new(network.base_rates));
    let engine = RiskEngine::new(network.clone(), margin);

    let plan = DeploymentPlan::from_json(
        r#"{"sources":[{"name":"chainlink","adapter":"CHAINLINK"}]}"#,
    )
    .unwrap();
    let err = plan.apply(&engine, &network).await.unwrap_err();
    assert!(matches!(err, RiskError::UnsupportedAdapter { .. }), "{err}");
}

#[tokio::test]
async fn test_plan_with_quote_file_source() {
    let dir = tempfile::tempdir().unwrap();
    let now = chrono::Utc::now().timestamp();
    std::fs::write(
        dir.path().join("quotes.json"),
        format!(
            r#"{{"0x82af49447d8a07e3bd95bd0d56f35241523fbab1": {{"value": 250000000000, "decimals": 8, "asOf": {now}}}}}"#
        ),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("plan.json"),
        r#"{
            "sources": [{"name": "feed", "adapter": "FILE", "path": "quotes.json"}],
            "oracles": [{"token": "WETH", "sources": [{"source": "feed", "weight": 100}]}]
        }"#,
    )
    .unwrap();

    let network = network();
    let margin = Arc::new(RecordingMarginEngine::new(network.base_rates));
    let engine = RiskEngine::new(network.clone(), margin);
    DeploymentPlan::load(dir.path().join("plan.json"))
        .unwrap()
        .apply(&engine, &network)
        .await
        .unwrap();

    let price = engine
        .get_price(&network.token("WETH").unwrap().address)
        .await
        .unwrap();
    assert_eq!(price.value, dec!(2500));
}
