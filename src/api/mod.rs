pub mod http;

pub use self::http::HttpAdvisorBackend;

use crate::models::portfolio::{
    Credentials,
    MarketReport,
    OnboardingProfile,
    Portfolio,
    PortfolioUpdate,
    RecommendationsReport,
    RiskAnalysis,
    User,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http: {0}")] Http(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")] Url(#[from] url::ParseError),
    #[error("backend returned {status}: {message}")] Status {
        status: u16,
        message: String,
    },
    #[error("backend rejected request: {0}")] Rejected(String),
    #[error("malformed response: {0}")] Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Text safe to show an end user next to a retry button.
    pub fn user_message(&self, what: &str) -> String {
        match self {
            ApiError::Rejected(message) => format!("Failed to load {}: {}", what, message),
            ApiError::Status { status, .. } if *status == 401 || *status == 403 => {
                format!("Not authorized to load {}. Please sign in again.", what)
            }
            ApiError::Status { status, .. } if *status == 404 => {
                format!("No {} found for this account.", what)
            }
            _ => format!("Failed to load {}. Please try again.", what),
        }
    }
}

/// The advisor REST backend. Valuation, scoring and recommendation logic all
/// live behind this trait.
#[async_trait]
pub trait AdvisorBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError>;

    async fn complete_onboarding(&self, profile: &OnboardingProfile) -> Result<User, ApiError>;

    async fn portfolio(&self, email: &str) -> Result<Portfolio, ApiError>;

    async fn update_portfolio(
        &self,
        email: &str,
        update: &PortfolioUpdate
    ) -> Result<Portfolio, ApiError>;

    async fn recommendations(&self, email: &str) -> Result<RecommendationsReport, ApiError>;

    async fn risk_analysis(&self, email: &str) -> Result<RiskAnalysis, ApiError>;

    async fn market_report(&self, email: &str) -> Result<MarketReport, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_transport_detail() {
        let err = ApiError::Status { status: 500, message: "stack trace".into() };
        assert_eq!(err.user_message("recommendations"), "Failed to load recommendations. Please try again.");

        let err = ApiError::Status { status: 401, message: String::new() };
        assert!(err.user_message("risk analysis").contains("sign in"));

        let err = ApiError::Rejected("Portfolio is empty".into());
        assert_eq!(err.user_message("market trends"), "Failed to load market trends: Portfolio is empty");
    }
}
