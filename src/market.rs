//! Static market reference data and portfolio impact arithmetic
//!
//! The tables are mock data, read-only for the life of the process.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::allocation::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexQuote {
    pub name: &'static str,
    pub symbol: &'static str,
    pub change_percent: f64,
    pub price: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SectorMove {
    pub name: &'static str,
    pub change_percent: f64,
    pub trend: Trend,
    pub top_movers: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BondYield {
    pub name: &'static str,
    pub yield_percent: f64,
    pub change: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EconomicIndicators {
    pub fed_rate: f64,
    pub fed_next_meeting: &'static str,
    pub fed_expected_move: &'static str,
    pub inflation_cpi: f64,
    pub inflation_trend: Trend,
    pub inflation_previous: f64,
    pub unemployment: f64,
    pub unemployment_trend: Trend,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MarketData {
    pub indices: &'static [IndexQuote],
    pub sectors: &'static [SectorMove],
    pub bonds: &'static [BondYield],
    pub economic_indicators: EconomicIndicators,
    pub news_headlines: &'static [&'static str],
}

pub const MARKET_DATA: MarketData = MarketData {
    indices: &[
        IndexQuote { name: "S&P 500", symbol: "SPY", change_percent: 1.2, price: 450.25, trend: Trend::Up },
        IndexQuote { name: "NASDAQ", symbol: "QQQ", change_percent: 2.4, price: 380.50, trend: Trend::Up },
        IndexQuote { name: "Dow Jones", symbol: "DIA", change_percent: 0.8, price: 350.75, trend: Trend::Up },
        IndexQuote { name: "Russell 2000", symbol: "IWM", change_percent: -0.5, price: 195.30, trend: Trend::Down },
    ],
    sectors: &[
        SectorMove { name: "Technology", change_percent: 2.4, trend: Trend::Up, top_movers: &["AAPL", "MSFT", "NVDA"] },
        SectorMove { name: "Healthcare", change_percent: 0.8, trend: Trend::Up, top_movers: &["JNJ", "UNH"] },
        SectorMove { name: "Financials", change_percent: 1.5, trend: Trend::Up, top_movers: &["JPM", "BAC"] },
        SectorMove { name: "Energy", change_percent: -1.2, trend: Trend::Down, top_movers: &["XOM", "CVX"] },
        SectorMove { name: "Consumer", change_percent: 0.5, trend: Trend::Up, top_movers: &["AMZN", "WMT"] },
    ],
    bonds: &[
        BondYield { name: "10-Year Treasury", yield_percent: 4.25, change: 0.05, trend: Trend::Up },
        BondYield { name: "Corporate Bonds", yield_percent: 5.10, change: 0.03, trend: Trend::Up },
    ],
    economic_indicators: EconomicIndicators {
        fed_rate: 5.25,
        fed_next_meeting: "2 weeks",
        fed_expected_move: "hold",
        inflation_cpi: 3.2,
        inflation_trend: Trend::Down,
        inflation_previous: 3.7,
        unemployment: 3.8,
        unemployment_trend: Trend::Stable,
    },
    news_headlines: &[
        "Federal Reserve signals interest rate cuts may begin in Q2 2024",
        "Tech stocks rally on strong AI chip demand",
        "Healthcare sector sees gains on new drug approvals",
        "Bond yields rise as investors reassess Fed policy",
        "Consumer spending remains resilient despite inflation",
    ],
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtfPerformance {
    pub name: &'static str,
    pub change_percent: f64,
    pub volume: &'static str,
    pub sector_exposure: &'static str,
}

lazy_static! {
    static ref ETF_PERFORMANCE: HashMap<&'static str, EtfPerformance> = {
        let rows = [
            ("VOO", "Vanguard S&P 500", 1.2, "high", "broad"),
            ("VTI", "Vanguard Total Market", 1.1, "high", "broad"),
            ("VEA", "Vanguard International", 0.6, "moderate", "international"),
            ("VWO", "Vanguard Emerging Markets", -0.3, "moderate", "emerging"),
            ("BND", "Vanguard Total Bond", -0.2, "moderate", "bonds"),
            ("AGG", "iShares Aggregate Bond", -0.15, "high", "bonds"),
            ("QQQ", "Invesco QQQ", 2.4, "very_high", "tech"),
            ("SCHD", "Schwab Dividend", 0.9, "moderate", "dividend"),
        ];
        rows.into_iter()
            .map(|(symbol, name, change_percent, volume, sector_exposure)| {
                (
                    symbol,
                    EtfPerformance {
                        name,
                        change_percent,
                        volume,
                        sector_exposure,
                    },
                )
            })
            .collect()
    };
}

pub fn etf_performance(symbol: &str) -> Option<&'static EtfPerformance> {
    ETF_PERFORMANCE.get(symbol)
}

pub fn index_quote(name: &str) -> Option<&'static IndexQuote> {
    MARKET_DATA.indices.iter().find(|i| i.name == name)
}

//
// ================= Portfolio impact =================
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EtfImpact {
    pub symbol: String,
    pub name: &'static str,
    pub allocation: f64,
    pub change_percent: f64,
    pub contribution_to_portfolio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioImpact {
    pub total_portfolio_change: f64,
    /// Largest absolute contribution first
    pub etf_impacts: Vec<EtfImpact>,
    pub best_performer: Option<EtfImpact>,
    pub worst_performer: Option<EtfImpact>,
}

/// Weighted daily change of a `{symbol: percent}` allocation.
///
/// Symbols missing from the performance table are ignored.
pub fn calculate_portfolio_impact(allocation: &IndexMap<String, f64>) -> PortfolioImpact {
    let impacts: Vec<EtfImpact> = allocation
        .iter()
        .filter_map(|(symbol, percent)| {
            let perf = etf_performance(symbol)?;
            Some(EtfImpact {
                symbol: symbol.clone(),
                name: perf.name,
                allocation: *percent,
                change_percent: perf.change_percent,
                contribution_to_portfolio: perf.change_percent * (percent / 100.0),
            })
        })
        .collect();

    let total: f64 = impacts.iter().map(|i| i.contribution_to_portfolio).sum();

    // first of equals wins, in allocation order
    let best_performer = impacts
        .iter()
        .cloned()
        .reduce(|best, next| if next.change_percent > best.change_percent { next } else { best });
    let worst_performer = impacts
        .iter()
        .cloned()
        .reduce(|worst, next| if next.change_percent < worst.change_percent { next } else { worst });

    let mut etf_impacts = impacts;
    etf_impacts.sort_by(|a, b| {
        b.contribution_to_portfolio
            .abs()
            .partial_cmp(&a.contribution_to_portfolio.abs())
            .unwrap_or(Ordering::Equal)
    });

    PortfolioImpact {
        total_portfolio_change: round_to(total, 2),
        etf_impacts,
        best_performer,
        worst_performer,
    }
}

//
// ================= Summaries =================
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSummary {
    pub sp500_change: f64,
    pub nasdaq_change: f64,
    pub bond_yield: f64,
    pub market_sentiment: &'static str,
    pub top_sector: &'static str,
}

pub fn market_summary() -> MarketSummary {
    let sp500 = index_quote("S&P 500").map(|q| q.change_percent).unwrap_or_default();
    let nasdaq = index_quote("NASDAQ").map(|q| q.change_percent).unwrap_or_default();
    let bond_yield = MARKET_DATA
        .bonds
        .iter()
        .find(|b| b.name == "10-Year Treasury")
        .map(|b| b.yield_percent)
        .unwrap_or_default();

    let market_sentiment = if sp500 > 0.5 {
        "bullish"
    } else if sp500 < -0.5 {
        "bearish"
    } else {
        "neutral"
    };

    let top_sector = MARKET_DATA
        .sectors
        .iter()
        .reduce(|top, next| if next.change_percent > top.change_percent { next } else { top })
        .map(|s| s.name)
        .unwrap_or_default();

    MarketSummary {
        sp500_change: sp500,
        nasdaq_change: nasdaq,
        bond_yield,
        market_sentiment,
        top_sector,
    }
}

/// Up to three plain-language nudges for the day's move
pub fn action_items(impact: &PortfolioImpact) -> Vec<String> {
    let mut actions = Vec::new();
    let change = impact.total_portfolio_change;

    if change.abs() > 2.0 {
        actions.push(format!(
            "Portfolio moved significantly ({:+.1}%) - this is normal market volatility",
            change
        ));
    }

    if change > 1.0 {
        actions.push("Great day! Stay disciplined - don't get overexcited by short-term gains".to_string());
    } else if change < -1.0 {
        actions.push("Portfolio dipped - remember your long-term strategy, don't panic sell".to_string());
    }

    if let (Some(best), Some(worst)) = (&impact.best_performer, &impact.worst_performer) {
        if best.change_percent - worst.change_percent > 5.0 {
            actions.push("Large divergence between holdings - review if rebalancing is needed".to_string());
        }
    }

    actions.push("Continue your regular dollar-cost averaging schedule".to_string());
    actions.truncate(3);
    actions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    #[default]
    Daily,
    Weekly,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::Daily => "daily",
            InsightKind::Weekly => "weekly",
        }
    }
}

const MARKET_CLOSE_HOUR: u32 = 16;

/// When the next update is due: the next 16:00 close for daily feeds,
/// next Monday 16:00 for weekly ones
pub fn next_update(kind: InsightKind, now: NaiveDateTime) -> String {
    let close = NaiveTime::from_hms_opt(MARKET_CLOSE_HOUR, 0, 0).unwrap_or_default();

    let next = match kind {
        InsightKind::Daily => {
            let today = now.date().and_time(close);
            if now.hour() >= MARKET_CLOSE_HOUR {
                today + Duration::days(1)
            } else {
                today
            }
        }
        InsightKind::Weekly => {
            let days_ahead = 7 - i64::from(now.weekday().num_days_from_monday());
            (now.date() + Duration::days(days_ahead)).and_time(close)
        }
    };

    next.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Snapshot served by the market-analysis endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MarketAnalysis {
    pub summary: MarketSummary,
    pub data: MarketData,
}

pub fn market_analysis() -> MarketAnalysis {
    MarketAnalysis {
        summary: market_summary(),
        data: MARKET_DATA,
    }
}
