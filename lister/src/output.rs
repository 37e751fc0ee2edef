//! Line-oriented output: TSV by default, one JSON object per line with `--json`.

use std::io::Write;

use marginkit::{MarketUpdate, MarketView, Premium, Price};
use serde::Serialize;

use crate::error::Result;

/// Write one market per line.
///
/// TSV columns: id, symbol, token, category, min collateralization, margin
/// premium, liquidation penalty, liquidation premium, supply cap, borrow cap,
/// flags.
pub fn write_markets<W: Write>(
    views: &[MarketView],
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<()> {
    for view in views {
        buf.clear();
        if json_mode {
            push_json(buf, view)?;
        } else {
            let m = &view.market;
            push_row(
                buf,
                &[
                    &m.id.0.to_string(),
                    &m.token.symbol,
                    m.token.address.as_str(),
                    &view.category.to_string(),
                    &m.min_collateralization.to_string(),
                    &m.margin_premium.to_string(),
                    &m.liquidation_penalty.to_string(),
                    &m.liquidation_premium.to_string(),
                    &m.supply_cap.to_string(),
                    &m.borrow_cap.to_string(),
                    &flags(m.is_collateral_only, m.is_borrow_only),
                ],
            );
        }
        writer.write_all(buf.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write one margin engine update per line.
///
/// TSV columns: market id, token, margin premium (WAD), liquidation premium
/// (WAD), supply cap, borrow cap, flags, base collateralization, base spread.
pub fn write_updates<W: Write>(
    updates: &[MarketUpdate],
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<()> {
    for u in updates {
        buf.clear();
        if json_mode {
            push_json(buf, u)?;
        } else {
            push_row(
                buf,
                &[
                    &u.market_id.0.to_string(),
                    u.token.as_str(),
                    &u.margin_premium.to_wad()?.to_string(),
                    &u.liquidation_premium.to_wad()?.to_string(),
                    &u.supply_cap.to_string(),
                    &u.borrow_cap.to_string(),
                    &flags(u.is_collateral_only, u.is_borrow_only),
                    &u.base_rates.collateralization.to_string(),
                    &u.base_rates.liquidation_spread.to_string(),
                ],
            );
        }
        writer.write_all(buf.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriceLine<'a> {
    symbol: &'a str,
    #[serde(flatten)]
    price: &'a Price,
    /// Stringified to survive JSON readers without 128-bit integers.
    protocol_units: String,
}

/// Write one price line.
///
/// TSV columns: symbol, USD value, protocol units, decimals.
pub fn write_price<W: Write>(
    symbol: &str,
    price: &Price,
    json_mode: bool,
    buf: &mut String,
    writer: &mut W,
) -> Result<()> {
    let units = price.to_protocol_units()?.to_string();
    buf.clear();
    if json_mode {
        push_json(
            buf,
            &PriceLine {
                symbol,
                price,
                protocol_units: units,
            },
        )?;
    } else {
        push_row(
            buf,
            &[symbol, &price.value.to_string(), &units, &price.decimals.to_string()],
        );
    }
    writer.write_all(buf.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Write a premium as a decimal and its WAD integer, tab separated.
pub fn write_premium<W: Write>(premium: Premium, buf: &mut String, writer: &mut W) -> Result<()> {
    buf.clear();
    push_row(buf, &[&premium.to_string(), &premium.to_wad()?.to_string()]);
    writer.write_all(buf.as_bytes())?;
    writer.flush()?;
    Ok(())
}

fn push_row(buf: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.push('\t');
        }
        buf.push_str(field);
    }
    buf.push('\n');
}

fn push_json<T: Serialize>(buf: &mut String, value: &T) -> Result<()> {
    buf.push_str(&serde_json::to_string(value)?);
    buf.push('\n');
    Ok(())
}

fn flags(collateral_only: bool, borrow_only: bool) -> String {
    match (collateral_only, borrow_only) {
        (false, false) => "-".into(),
        (true, false) => "collateral-only".into(),
        (false, true) => "borrow-only".into(),
        (true, true) => "collateral-only,borrow-only".into(),
    }
}
