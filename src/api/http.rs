use super::{ AdvisorBackend, ApiError };
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
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, RequestBuilder };
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpAdvisorBackend {
    http: HttpClient,
    base_url: Url,
}

impl HttpAdvisorBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    /// `base/api/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<JsonValue, ApiError> {
        let resp = request.send().await?;
        let status = resp.status();
        let body_text = resp.text().await?;

        if !status.is_success() {
            let message = serde_json
                ::from_str::<JsonValue>(&body_text)
                .ok()
                .and_then(|body| error_message(&body))
                .unwrap_or(body_text);
            warn!("Backend returned {}: {}", status, message);
            return Err(ApiError::Status { status: status.as_u16(), message });
        }

        let body: JsonValue = serde_json::from_str(&body_text)?;
        if body.get("success").and_then(JsonValue::as_bool) == Some(false) {
            let message = error_message(&body).unwrap_or_else(|| "request failed".to_string());
            return Err(ApiError::Rejected(message));
        }
        Ok(body)
    }

    async fn get_json(&self, segments: &[&str]) -> Result<JsonValue, ApiError> {
        let url = self.endpoint(segments)?;
        debug!("GET {}", url);
        self.send(self.http.get(url)).await
    }
}

fn error_message(body: &JsonValue) -> Option<String> {
    body.get("message")
        .or_else(|| body.get("error"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

/// Decodes `body[field]` when the backend wraps the payload, otherwise the
/// whole body.
fn unwrap_field<T: DeserializeOwned>(mut body: JsonValue, field: &str) -> Result<T, ApiError> {
    let payload = match body.get_mut(field) {
        Some(inner) => inner.take(),
        None => {
            if let Some(obj) = body.as_object_mut() {
                obj.remove("success");
            }
            body
        }
    };
    Ok(serde_json::from_value(payload)?)
}

#[async_trait]
impl AdvisorBackend for HttpAdvisorBackend {
    async fn login(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        let body = self.send(self.http.post(url).json(credentials)).await?;
        unwrap_field(body, "user")
    }

    async fn complete_onboarding(&self, profile: &OnboardingProfile) -> Result<User, ApiError> {
        let url = self.endpoint(&["onboarding", "complete"])?;
        let body = self.send(self.http.post(url).json(profile)).await?;
        unwrap_field(body, "user")
    }

    async fn portfolio(&self, email: &str) -> Result<Portfolio, ApiError> {
        let body = self.get_json(&["portfolio", email]).await?;
        unwrap_field(body, "portfolio")
    }

    async fn update_portfolio(
        &self,
        email: &str,
        update: &PortfolioUpdate
    ) -> Result<Portfolio, ApiError> {
        let url = self.endpoint(&["portfolio", email])?;
        let body = self.send(self.http.put(url).json(update)).await?;
        unwrap_field(body, "portfolio")
    }

    async fn recommendations(&self, email: &str) -> Result<RecommendationsReport, ApiError> {
        let body = self.get_json(&["portfolio", email, "recommendations"]).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn risk_analysis(&self, email: &str) -> Result<RiskAnalysis, ApiError> {
        let body = self.get_json(&["portfolio", email, "risk-analysis"]).await?;
        unwrap_field(body, "riskAnalysis")
    }

    async fn market_report(&self, email: &str) -> Result<MarketReport, ApiError> {
        let body = self.get_json(&["portfolio", email, "market-report"]).await?;
        Ok(serde_json::from_value(body)?)
    }
}
