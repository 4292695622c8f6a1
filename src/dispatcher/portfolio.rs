use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::Path;

use super::{print_json, Session};
use crate::cli::formatters::format_holdings;

#[derive(Serialize)]
struct HoldingJson<'a> {
    ticker: &'a str,
    quantity: Decimal,
    value: Decimal,
}

pub async fn dispatch_show(session: &Session, file: &Path) -> Result<()> {
    let snapshot = session.portfolio(file).await?;

    if session.json {
        let quantities = snapshot.trade_data.quantity.last_row();
        let holdings: Vec<HoldingJson> = snapshot
            .holdings()
            .into_iter()
            .map(|(ticker, value)| HoldingJson {
                ticker,
                quantity: quantities
                    .iter()
                    .find(|(t, _)| *t == ticker)
                    .map(|(_, q)| *q)
                    .unwrap_or(Decimal::ZERO),
                value,
            })
            .collect();
        return print_json(&serde_json::json!({
            "as_of": snapshot.last_date(),
            "holdings": holdings,
            "total_value": snapshot.trade_data.end_value.total().last(),
        }));
    }

    print!("{}", format_holdings(&snapshot));
    Ok(())
}
