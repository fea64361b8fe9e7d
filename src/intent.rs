//! Keyword intent classifier.
//!
//! Rules are evaluated in order against the lower-cased message and the first
//! match wins, so the table order is the precedence order.

use crate::models::chat::ConversationContext;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Topic {
    #[serde(rename = "portfolioAnalysis")]
    PortfolioAnalysis,
    #[serde(rename = "recommendations")]
    Recommendations,
    #[serde(rename = "marketTrends")]
    MarketTrends,
    #[serde(rename = "industryRecommendation")]
    IndustryRecommendation,
    #[serde(rename = "rebalancing")]
    Rebalancing,
    #[serde(rename = "riskAnalysis")]
    RiskAnalysis,
    #[serde(rename = "taxAnalysis")]
    TaxAnalysis,
    #[serde(rename = "diversification")]
    Diversification,
    #[serde(rename = "contextual_recommendation")]
    ContextualRecommendation,
    #[serde(rename = "general")]
    General,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::PortfolioAnalysis,
        Topic::Recommendations,
        Topic::MarketTrends,
        Topic::IndustryRecommendation,
        Topic::Rebalancing,
        Topic::RiskAnalysis,
        Topic::TaxAnalysis,
        Topic::Diversification,
        Topic::ContextualRecommendation,
        Topic::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::PortfolioAnalysis => "portfolioAnalysis",
            Topic::Recommendations => "recommendations",
            Topic::MarketTrends => "marketTrends",
            Topic::IndustryRecommendation => "industryRecommendation",
            Topic::Rebalancing => "rebalancing",
            Topic::RiskAnalysis => "riskAnalysis",
            Topic::TaxAnalysis => "taxAnalysis",
            Topic::Diversification => "diversification",
            Topic::ContextualRecommendation => "contextual_recommendation",
            Topic::General => "general",
        }
    }

    /// Label of the handler that answers this topic.
    pub fn agent(&self) -> &'static str {
        match self {
            Topic::PortfolioAnalysis => "Portfolio Analyst",
            Topic::Recommendations | Topic::ContextualRecommendation => "Recommendation Engine",
            Topic::MarketTrends => "Market Analyst",
            Topic::IndustryRecommendation => "Industry Analyst",
            Topic::Rebalancing => "Rebalancing Advisor",
            Topic::RiskAnalysis => "Risk Analyst",
            Topic::TaxAnalysis => "Tax Advisor",
            Topic::Diversification => "Diversification Advisor",
            Topic::General => "General Advisor",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseTopicError {
    message: String,
}

impl fmt::Display for ParseTopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseTopicError {}

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| ParseTopicError {
                message: format!("Unknown topic: '{}'", s),
            })
    }
}

/// A test over a lower-cased message.
#[derive(Debug)]
pub enum Predicate {
    /// The previous turn was `topic` and the message contains one of `phrases`.
    FollowsTopic {
        topic: Topic,
        phrases: &'static [&'static str],
    },
    /// The message contains at least one of the phrases.
    AnyOf(&'static [&'static str]),
    /// Every group has at least one phrase present in the message.
    AllOf(&'static [&'static [&'static str]]),
    /// At least one nested predicate holds.
    Either(&'static [Predicate]),
}

fn contains_any(message: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| message.contains(p))
}

impl Predicate {
    pub fn matches(&self, message: &str, context: &ConversationContext) -> bool {
        match self {
            Predicate::FollowsTopic { topic, phrases } => {
                context.last_intent == Some(*topic) && contains_any(message, phrases)
            }
            Predicate::AnyOf(phrases) => contains_any(message, phrases),
            Predicate::AllOf(groups) => groups.iter().all(|group| contains_any(message, group)),
            Predicate::Either(options) => options.iter().any(|p| p.matches(message, context)),
        }
    }
}

#[derive(Debug)]
pub struct IntentRule {
    pub topic: Topic,
    pub predicate: Predicate,
}

pub static RULES: &[IntentRule] = &[
    IntentRule {
        topic: Topic::ContextualRecommendation,
        predicate: Predicate::FollowsTopic {
            topic: Topic::PortfolioAnalysis,
            phrases: &["what should", "recommend", "what can", "how can"],
        },
    },
    IntentRule {
        topic: Topic::PortfolioAnalysis,
        predicate: Predicate::AllOf(
            &[
                &["portfolio", "my investment"],
                &["analyz", "review", "check", "look"],
            ]
        ),
    },
    IntentRule {
        topic: Topic::Recommendations,
        predicate: Predicate::Either(
            &[
                Predicate::AnyOf(&["recommend", "suggest", "stock pick"]),
                Predicate::AllOf(&[&["what"], &["buy"]]),
            ]
        ),
    },
    IntentRule {
        topic: Topic::MarketTrends,
        predicate: Predicate::AllOf(
            &[
                &["market", "industry"],
                &["trend", "doing", "update", "news"],
            ]
        ),
    },
    IntentRule {
        topic: Topic::IndustryRecommendation,
        predicate: Predicate::Either(
            &[
                Predicate::AnyOf(&["industry", "sector"]),
                Predicate::AllOf(&[&["which"], &["invest", "booming"]]),
            ]
        ),
    },
    IntentRule {
        topic: Topic::Rebalancing,
        predicate: Predicate::AnyOf(&["rebalanc", "adjust", "reallocat"]),
    },
    IntentRule {
        topic: Topic::RiskAnalysis,
        predicate: Predicate::AllOf(
            &[
                &["risk"],
                &["analys", "profile", "score", "assess"],
            ]
        ),
    },
    IntentRule {
        topic: Topic::TaxAnalysis,
        predicate: Predicate::AnyOf(&["tax", "capital gain"]),
    },
    IntentRule {
        topic: Topic::Diversification,
        predicate: Predicate::AnyOf(&["divers", "spread"]),
    },
];

/// Maps a message to a topic. Total: anything unmatched is `General`.
pub fn classify(message: &str, context: &ConversationContext) -> Topic {
    let lower = message.to_lowercase();
    RULES.iter()
        .find(|rule| rule.predicate.matches(&lower, context))
        .map(|rule| rule.topic)
        .unwrap_or(Topic::General)
}
