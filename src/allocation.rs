//! Portfolio allocation arithmetic
//!
//! Deterministic; no LLM involvement.

use serde::Serialize;

use crate::catalog::EtfInfo;
use crate::models::RiskTolerance;

const MIN_STOCKS: i32 = 20;
const MAX_STOCKS: i32 = 90;

/// Share of the stock sleeve per sub-class
const US_LARGE_CAP_SHARE: f64 = 0.50;
const US_SMALL_MID_SHARE: f64 = 0.20;
const INTERNATIONAL_SHARE: f64 = 0.20;
const EMERGING_GROWTH_SHARE: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub total_stocks: i32,
    pub total_bonds: i32,
    pub breakdown: AllocationBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationBreakdown {
    pub us_large_cap: f64,
    pub us_small_mid: f64,
    pub international: f64,
    pub emerging_growth: f64,
    pub bonds: f64,
}

impl AllocationBreakdown {
    pub fn stock_total(&self) -> f64 {
        self.us_large_cap + self.us_small_mid + self.international + self.emerging_growth
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyInvestment {
    pub etf: &'static str,
    pub name: &'static str,
    pub allocation_percent: f64,
    pub monthly_amount: f64,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Stock/bond split: `110 - age`, shifted by risk tolerance, clamped to 20..=90
pub fn calculate_allocation(risk: RiskTolerance, age: u32) -> Allocation {
    let base = 110 - age as i32;

    let adjusted = match risk {
        RiskTolerance::Low => (base - 20).min(60),
        RiskTolerance::High => (base + 10).min(MAX_STOCKS),
        RiskTolerance::Medium => base,
    };

    let total_stocks = adjusted.clamp(MIN_STOCKS, MAX_STOCKS);
    let total_bonds = 100 - total_stocks;
    let stocks = f64::from(total_stocks);

    Allocation {
        total_stocks,
        total_bonds,
        breakdown: AllocationBreakdown {
            us_large_cap: round_to(stocks * US_LARGE_CAP_SHARE, 1),
            us_small_mid: round_to(stocks * US_SMALL_MID_SHARE, 1),
            international: round_to(stocks * INTERNATIONAL_SHARE, 1),
            emerging_growth: round_to(stocks * EMERGING_GROWTH_SHARE, 1),
            bonds: round_to(f64::from(total_bonds), 1),
        },
    }
}

/// Dollar amounts per ETF for a monthly contribution.
///
/// Categories are paired positionally with the first four ETFs; the
/// small/mid sleeve has no dedicated fund.
pub fn monthly_breakdown(
    monthly_capacity: f64,
    allocation: &Allocation,
    etfs: &[EtfInfo],
) -> Vec<MonthlyInvestment> {
    if monthly_capacity <= 0.0 {
        return Vec::new();
    }

    let b = &allocation.breakdown;
    let categories = [b.us_large_cap, b.international, b.emerging_growth, b.bonds];

    categories
        .iter()
        .zip(etfs.iter())
        .filter(|(percent, _)| **percent > 0.0)
        .map(|(percent, etf)| MonthlyInvestment {
            etf: etf.symbol,
            name: etf.name,
            allocation_percent: *percent,
            monthly_amount: round_to(percent / 100.0 * monthly_capacity, 2),
        })
        .collect()
}

pub fn rebalancing_tips(allocation: &Allocation, age: u32) -> Vec<String> {
    let mut tips = vec![
        format!(
            "Review your portfolio quarterly to ensure your {}% stocks / {}% bonds allocation is maintained.",
            allocation.total_stocks, allocation.total_bonds
        ),
        "Rebalance when any asset class drifts more than 5% from target allocation.".to_string(),
        "Consider tax-loss harvesting opportunities during rebalancing.".to_string(),
    ];

    if age < 35 {
        tips.push(
            "At your age, you can afford more market volatility - consider increasing stock allocation during market dips."
                .to_string(),
        );
    }

    tips.push("Set up automatic investments to take advantage of dollar-cost averaging.".to_string());
    tips
}
