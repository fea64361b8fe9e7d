//! Per-user backend reads behind the cache gate.

use crate::api::{ AdvisorBackend, ApiError };
use crate::cache::{ CacheGate, Fetched };
use crate::cli::Args;
use crate::models::portfolio::{
    Credentials,
    MarketReport,
    OnboardingProfile,
    Portfolio,
    PortfolioSummary,
    PortfolioUpdate,
    RecommendationsReport,
    RiskAnalysis,
    User,
};
use log::{ error, info, warn };
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub fn recommendations_key(email: &str) -> String {
    format!("recommendations_{}", email)
}

pub fn risk_analysis_key(email: &str) -> String {
    format!("risk_analysis_{}", email)
}

pub fn market_trends_key(email: &str) -> String {
    format!("market_trends_{}", email)
}

pub fn portfolio_key(email: &str) -> String {
    format!("currentPortfolio_{}", email)
}

pub fn current_user_key(email: &str) -> String {
    format!("currentUser_{}", email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub recommendations: Duration,
    pub risk_analysis: Duration,
    pub market_trends: Duration,
    pub portfolio: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            recommendations: Duration::from_secs(5 * 60),
            risk_analysis: Duration::from_secs(10 * 60),
            market_trends: Duration::from_secs(5 * 60),
            portfolio: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheTtls {
    pub fn from_args(args: &Args) -> Self {
        Self {
            recommendations: Duration::from_secs(args.recommendations_ttl_secs),
            risk_analysis: Duration::from_secs(args.risk_analysis_ttl_secs),
            market_trends: Duration::from_secs(args.market_trends_ttl_secs),
            portfolio: Duration::from_secs(args.portfolio_ttl_secs),
        }
    }
}

pub struct DataService {
    backend: Arc<dyn AdvisorBackend>,
    cache: CacheGate,
    ttls: CacheTtls,
}

impl DataService {
    pub fn new(backend: Arc<dyn AdvisorBackend>, cache: CacheGate, ttls: CacheTtls) -> Self {
        Self { backend, cache, ttls }
    }

    async fn cached<T, F, Fut>(
        &self,
        what: &str,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        fetch: F
    ) -> Result<Fetched<T>, ApiError>
        where
            T: Serialize + DeserializeOwned,
            F: FnOnce() -> Fut,
            Fut: Future<Output = Result<T, ApiError>>
    {
        self.cache.get_or_fetch(key, ttl, force_refresh, fetch).await.map_err(|e| {
            error!("Failed to fetch {} ('{}'): {}", what, key, e);
            e
        })
    }

    pub async fn recommendations(
        &self,
        email: &str,
        force_refresh: bool
    ) -> Result<Fetched<RecommendationsReport>, ApiError> {
        let key = recommendations_key(email);
        self.cached("recommendations", &key, self.ttls.recommendations, force_refresh, || {
            self.backend.recommendations(email)
        }).await
    }

    pub async fn risk_analysis(
        &self,
        email: &str,
        force_refresh: bool
    ) -> Result<Fetched<RiskAnalysis>, ApiError> {
        let key = risk_analysis_key(email);
        self.cached("risk analysis", &key, self.ttls.risk_analysis, force_refresh, || {
            self.backend.risk_analysis(email)
        }).await
    }

    pub async fn market_trends(
        &self,
        email: &str,
        force_refresh: bool
    ) -> Result<Fetched<MarketReport>, ApiError> {
        let key = market_trends_key(email);
        self.cached("market trends", &key, self.ttls.market_trends, force_refresh, || {
            self.backend.market_report(email)
        }).await
    }

    pub async fn portfolio(
        &self,
        email: &str,
        force_refresh: bool
    ) -> Result<Fetched<Portfolio>, ApiError> {
        let key = portfolio_key(email);
        self.cached("portfolio", &key, self.ttls.portfolio, force_refresh, || {
            self.backend.portfolio(email)
        }).await
    }

    /// Live figures for chat replies. The risk score is optional: a failing
    /// risk endpoint still yields a summary.
    pub async fn portfolio_summary(&self, email: &str) -> Result<PortfolioSummary, ApiError> {
        let portfolio = self.portfolio(email, false).await?.data;
        let risk = match self.risk_analysis(email, false).await {
            Ok(fetched) => Some(fetched.data),
            Err(e) => {
                warn!("Portfolio summary for {} has no risk score: {}", email, e);
                None
            }
        };
        Ok(PortfolioSummary::from_parts(&portfolio, risk.as_ref()))
    }

    pub async fn update_portfolio(
        &self,
        email: &str,
        update: &PortfolioUpdate
    ) -> Result<Portfolio, ApiError> {
        let portfolio = self.backend.update_portfolio(email, update).await.map_err(|e| {
            error!("Failed to update portfolio for {}: {}", email, e);
            e
        })?;
        self.cache.put(&portfolio_key(email), &portfolio).await;
        Ok(portfolio)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let user = self.backend.login(credentials).await.map_err(|e| {
            error!("Login failed for {}: {}", credentials.email, e);
            e
        })?;
        self.cache.put(&current_user_key(&user.email), &user).await;
        info!("Signed in {}", user.email);
        Ok(user)
    }

    pub async fn complete_onboarding(&self, profile: &OnboardingProfile) -> Result<User, ApiError> {
        let user = self.backend.complete_onboarding(profile).await.map_err(|e| {
            error!("Onboarding failed for {}: {}", profile.email, e);
            e
        })?;
        self.cache.put(&current_user_key(&user.email), &user).await;
        Ok(user)
    }

    pub async fn current_user(&self, email: &str) -> Option<User> {
        self.cache.peek::<User>(&current_user_key(email)).await.map(|record| record.data)
    }

    /// Last stored payload for `key`, however old.
    pub async fn stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.peek::<T>(key).await.map(|record| record.data)
    }
}
