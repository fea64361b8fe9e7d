//! Payloads exchanged with the advisor REST backend.
//!
//! Only the fields the service reads are typed; everything else the backend
//! sends is carried through untouched so cached payloads round-trip intact.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    #[serde(default)]
    pub shares: f64,
    #[serde(default, alias = "avg_price", skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<f64>,
    #[serde(default, alias = "current_price", skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Holding {
    /// Market value, falling back to cost basis when no live price is known.
    pub fn market_value(&self) -> f64 {
        let price = self.current_price.or(self.avg_price).unwrap_or(0.0);
        self.shares * price
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub cash: f64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Portfolio {
    pub fn total_value(&self) -> f64 {
        self.holdings.iter().map(Holding::market_value).sum::<f64>() + self.cash
    }
}

/// Body of `PUT /api/portfolio/{email}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioUpdate {
    pub holdings: Vec<Holding>,
    pub cash: f64,
}

/// Live figures substituted into canned chat replies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub risk_score: Option<f64>,
    pub cash: f64,
    pub holdings_count: usize,
}

impl PortfolioSummary {
    pub fn from_parts(portfolio: &Portfolio, risk: Option<&RiskAnalysis>) -> Self {
        Self {
            total_value: portfolio.total_value(),
            risk_score: risk.and_then(|r| r.risk_score),
            cash: portfolio.cash,
            holdings_count: portfolio.holdings.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecommendationBuckets {
    #[serde(default)]
    pub immediate: Vec<JsonValue>,
    #[serde(default)]
    pub short_term: Vec<JsonValue>,
    #[serde(default)]
    pub long_term: Vec<JsonValue>,
    #[serde(default)]
    pub opportunities: Vec<JsonValue>,
}

impl RecommendationBuckets {
    pub fn total(&self) -> usize {
        self.immediate.len() + self.short_term.len() + self.long_term.len() +
            self.opportunities.len()
    }
}

/// `GET /api/portfolio/{email}/recommendations`, minus the `success` flag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationsReport {
    #[serde(default)]
    pub recommendations: RecommendationBuckets,
    #[serde(default)]
    pub summary: JsonValue,
    #[serde(default)]
    pub ai_insights: JsonValue,
    #[serde(default)]
    pub metadata: JsonValue,
    #[serde(default)]
    pub confidence: JsonValue,
    #[serde(default)]
    pub explainability: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysis {
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub risk_label: Option<String>,
    #[serde(default)]
    pub recommendation: JsonValue,
    #[serde(default)]
    pub factors: JsonValue,
    #[serde(default)]
    pub breakdown: JsonValue,
    #[serde(default)]
    pub rationale: JsonValue,
}

/// `GET /api/portfolio/{email}/market-report`, minus the `success` flag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketReport {
    #[serde(default)]
    pub holdings: Vec<JsonValue>,
    #[serde(default)]
    pub portfolio_metrics: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Answers collected by the onboarding wizard; forwarded as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub email: String,
    #[serde(flatten)]
    pub answers: Map<String, JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn total_value_prefers_live_price() {
        let portfolio: Portfolio = serde_json::from_value(
            json!({
                "holdings": [
                    { "symbol": "AAPL", "shares": 10.0, "avgPrice": 100.0, "currentPrice": 150.0 },
                    { "symbol": "MSFT", "shares": 2.0, "avg_price": 300.0 }
                ],
                "cash": 250.0
            })
        ).unwrap();

        assert_eq!(portfolio.total_value(), 1500.0 + 600.0 + 250.0);
    }

    #[test]
    fn summary_takes_risk_score_from_analysis() {
        let portfolio = Portfolio { cash: 10.0, ..Default::default() };
        let risk = RiskAnalysis { risk_score: Some(6.2), ..Default::default() };
        let summary = PortfolioSummary::from_parts(&portfolio, Some(&risk));

        assert_eq!(summary.risk_score, Some(6.2));
        assert_eq!(summary.holdings_count, 0);
        assert_eq!(summary.total_value, 10.0);
    }

    #[test]
    fn unknown_holding_fields_survive_round_trip() {
        let raw = json!({ "symbol": "VTI", "shares": 1.0, "sector": "ETF" });
        let holding: Holding = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(holding.extra["sector"], "ETF");
        assert_eq!(serde_json::to_value(&holding).unwrap(), raw);
    }
}
