use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::ledger::Ledger;

/// An asset transaction valued at the latest close of its instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioTrade {
    pub date: NaiveDate,
    pub ticker: String,
    pub quantity: Decimal,
    pub investment: Decimal,
    pub last_close: Decimal,
    pub value: Decimal,
    pub abs_return: Decimal,
    pub pct_return: Decimal,
}

/// Value every asset transaction of `ledger` at `last_closes`
pub fn build_trade_table(ledger: &Ledger, last_closes: &BTreeMap<String, Decimal>) -> Vec<PortfolioTrade> {
    ledger
        .asset_transactions()
        .map(|tx| {
            let last_close = last_closes.get(&tx.ticker).copied().unwrap_or(Decimal::ZERO);
            let value = tx.quantity * last_close;
            let abs_return = value - tx.investment;
            // Relative to the absolute amount so sales keep the sign of their gain
            let pct_return = if tx.investment.is_zero() {
                Decimal::ZERO
            } else {
                abs_return / tx.investment.abs()
            };
            PortfolioTrade {
                date: tx.date,
                ticker: tx.ticker.clone(),
                quantity: tx.quantity,
                investment: tx.investment,
                last_close,
                value,
                abs_return,
                pct_return,
            }
        })
        .collect()
}
