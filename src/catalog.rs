//! Static ETF catalog grouped by risk band

use serde::Serialize;

use crate::market::{etf_performance, EtfPerformance};
use crate::models::RiskTolerance;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtfInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub expense_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectorEtf {
    pub symbol: &'static str,
    pub name: &'static str,
    pub sector: &'static str,
}

const fn etf(symbol: &'static str, name: &'static str, kind: &'static str, expense_ratio: f64) -> EtfInfo {
    EtfInfo {
        symbol,
        name,
        kind,
        expense_ratio,
    }
}

pub const LOW_RISK_ETFS: [EtfInfo; 4] = [
    etf("AGG", "iShares Core U.S. Aggregate Bond ETF", "Bond", 0.03),
    etf("BND", "Vanguard Total Bond Market ETF", "Bond", 0.03),
    etf("SCHZ", "Schwab U.S. Aggregate Bond ETF", "Bond", 0.03),
    etf("TIP", "iShares TIPS Bond ETF", "Inflation-Protected", 0.19),
];

pub const MEDIUM_RISK_ETFS: [EtfInfo; 5] = [
    etf("VOO", "Vanguard S&P 500 ETF", "Large Cap Equity", 0.03),
    etf("VTI", "Vanguard Total Stock Market ETF", "Total Market", 0.03),
    etf("SCHD", "Schwab U.S. Dividend Equity ETF", "Dividend", 0.06),
    etf("QQQ", "Invesco QQQ Trust", "Tech/Growth", 0.20),
    etf("VEA", "Vanguard FTSE Developed Markets ETF", "International", 0.05),
];

pub const HIGH_RISK_ETFS: [EtfInfo; 5] = [
    etf("VUG", "Vanguard Growth ETF", "Growth", 0.04),
    etf("VGT", "Vanguard Information Technology ETF", "Technology", 0.10),
    etf("VWO", "Vanguard FTSE Emerging Markets ETF", "Emerging Markets", 0.08),
    etf("ARKK", "ARK Innovation ETF", "Disruptive Innovation", 0.75),
    etf("IWM", "iShares Russell 2000 ETF", "Small Cap", 0.19),
];

pub const SECTOR_ETFS: [SectorEtf; 5] = [
    SectorEtf { symbol: "XLK", name: "Technology Select Sector SPDR", sector: "Technology" },
    SectorEtf { symbol: "XLV", name: "Health Care Select Sector SPDR", sector: "Healthcare" },
    SectorEtf { symbol: "XLF", name: "Financial Select Sector SPDR", sector: "Financials" },
    SectorEtf { symbol: "XLE", name: "Energy Select Sector SPDR", sector: "Energy" },
    SectorEtf { symbol: "XLY", name: "Consumer Discretionary Select Sector SPDR", sector: "Consumer" },
];

pub fn etfs_for_band(risk: RiskTolerance) -> &'static [EtfInfo] {
    match risk {
        RiskTolerance::Low => &LOW_RISK_ETFS,
        RiskTolerance::Medium => &MEDIUM_RISK_ETFS,
        RiskTolerance::High => &HIGH_RISK_ETFS,
    }
}

/// Band funds plus a little diversification from neighbouring bands
pub fn recommended_etfs(risk: RiskTolerance) -> Vec<EtfInfo> {
    let mut recommendations = etfs_for_band(risk).to_vec();

    match risk {
        RiskTolerance::Medium => {
            recommendations.push(LOW_RISK_ETFS[0]);
            recommendations.push(HIGH_RISK_ETFS[0]);
        }
        RiskTolerance::Low => recommendations.push(MEDIUM_RISK_ETFS[0]),
        RiskTolerance::High => {}
    }

    recommendations
}

/// Everything known about one symbol
#[derive(Debug, Clone, Serialize)]
pub struct EtfDetails {
    pub symbol: &'static str,
    pub name: &'static str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_band: Option<RiskTolerance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<EtfPerformance>,
}

/// Case-insensitive lookup across risk bands and sector funds
pub fn find_etf(symbol: &str) -> Option<EtfDetails> {
    let symbol = symbol.trim().to_uppercase();

    for risk in [RiskTolerance::Low, RiskTolerance::Medium, RiskTolerance::High] {
        if let Some(info) = etfs_for_band(risk).iter().find(|e| e.symbol == symbol) {
            return Some(EtfDetails {
                symbol: info.symbol,
                name: info.name,
                kind: Some(info.kind),
                expense_ratio: Some(info.expense_ratio),
                risk_band: Some(risk),
                sector: None,
                performance: etf_performance(info.symbol).cloned(),
            });
        }
    }

    SECTOR_ETFS
        .iter()
        .find(|e| e.symbol == symbol)
        .map(|sector| EtfDetails {
            symbol: sector.symbol,
            name: sector.name,
            kind: None,
            expense_ratio: None,
            risk_band: None,
            sector: Some(sector.sector),
            performance: etf_performance(sector.symbol).cloned(),
        })
}
