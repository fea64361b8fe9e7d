use crate::intent::Topic;
use crate::models::chat::FollowUp;
use crate::models::portfolio::PortfolioSummary;
use log::info;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug)]
pub enum ResponseTableError {
    UnknownTopic(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for ResponseTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseTableError::UnknownTopic(key) => write!(f, "Unknown response topic '{}'", key),
            ResponseTableError::IoError(e) => write!(f, "Responses file IO error: {}", e),
            ResponseTableError::JsonError(e) => write!(f, "Responses JSON parsing error: {}", e),
        }
    }
}

impl Error for ResponseTableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResponseTableError::IoError(e) => Some(e),
            ResponseTableError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ResponseTableError {
    fn from(err: std::io::Error) -> Self {
        ResponseTableError::IoError(err)
    }
}

impl From<serde_json::Error> for ResponseTableError {
    fn from(err: serde_json::Error) -> Self {
        ResponseTableError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTemplate {
    pub content: String,
    #[serde(default)]
    pub follow_up: Option<FollowUp>,
}

impl ResponseTemplate {
    fn new(content: &str, follow_up: Option<&str>) -> Self {
        Self {
            content: content.to_string(),
            follow_up: follow_up.map(|f| FollowUp::Single(f.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct ResponsesFile {
    responses: HashMap<String, ResponseTemplate>,
}

/// A canned reply after placeholder substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct CannedReply {
    pub content: String,
    pub follow_up: Option<FollowUp>,
}

#[derive(Debug, Clone)]
pub struct ResponseTable {
    templates: HashMap<Topic, ResponseTemplate>,
    pub last_loaded: Option<SystemTime>,
}

impl ResponseTable {
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            Topic::PortfolioAnalysis,
            ResponseTemplate::new(
                "I've reviewed your portfolio. Its total value is ${total_value}, \
                 including ${cash} in cash across {holdings_count} holdings, and your \
                 risk score is {risk_score} out of 10. Concentration in a few positions \
                 is the main driver of that score, so the biggest gains usually come from \
                 trimming your largest weights and keeping an emergency cash buffer.",
                Some("Would you like recommendations on what to do next?")
            )
        );
        templates.insert(
            Topic::ContextualRecommendation,
            ResponseTemplate::new(
                "Based on the analysis we just did (risk score {risk_score} on a \
                 ${total_value} portfolio), I'd start by rebalancing toward your target \
                 allocation, then add broad index exposure to reduce single-stock risk, and \
                 finally put idle cash to work gradually rather than all at once.",
                Some("Should I walk you through a rebalancing plan?")
            )
        );
        templates.insert(
            Topic::Recommendations,
            ResponseTemplate::new(
                "Your personalised recommendations are grouped into immediate actions, \
                 short-term moves, long-term positions and new opportunities. Each one \
                 comes with a confidence level and the reasoning behind it. Open the \
                 Recommendations page to see the full list.",
                Some("Do you want me to explain the immediate actions first?")
            )
        );
        templates.insert(
            Topic::MarketTrends,
            ResponseTemplate::new(
                "Markets have been mixed: technology and healthcare continue to lead, \
                 while rate-sensitive sectors remain under pressure. The Market page \
                 shows how each of your holdings is moving against its sector.",
                Some("Want to see how these trends affect your holdings?")
            )
        );
        templates.insert(
            Topic::IndustryRecommendation,
            ResponseTemplate::new(
                "Sectors with strong momentum right now include clean energy, \
                 semiconductors and healthcare innovation. Sector funds give exposure \
                 without picking individual winners, which suits most long-term investors.",
                Some("Should I compare these sectors against your current exposure?")
            )
        );
        templates.insert(
            Topic::Rebalancing,
            ResponseTemplate::new(
                "Rebalancing brings your ${total_value} portfolio back to its target mix. \
                 A common rule is to act when any asset class drifts more than 5% from its \
                 target, or once or twice a year on a fixed schedule.",
                Some("Would you like to see which positions have drifted?")
            )
        );
        templates.insert(
            Topic::RiskAnalysis,
            ResponseTemplate::new(
                "Your current risk score is {risk_score} out of 10. The score combines \
                 volatility, concentration and sector exposure. The Risk page breaks down \
                 each factor and explains what moves it.",
                Some("Would you like suggestions for lowering your risk?")
            )
        );
        templates.insert(
            Topic::TaxAnalysis,
            ResponseTemplate::new(
                "Holding positions for more than a year usually qualifies gains for lower \
                 long-term capital gains rates, and harvesting losses can offset gains \
                 you have already realised. Check with a tax professional before acting.",
                Some("Should I look for tax-loss harvesting candidates?")
            )
        );
        templates.insert(
            Topic::Diversification,
            ResponseTemplate::new(
                "Your {holdings_count} holdings are worth ${total_value} in total. Spreading \
                 money across asset classes, sectors and regions reduces the impact of any \
                 single position going wrong.",
                Some("Want a breakdown of your exposure by sector?")
            )
        );
        templates.insert(
            Topic::General,
            ResponseTemplate::new(
                "I can analyse your portfolio, suggest investments, explain market trends, \
                 review your risk profile, help with rebalancing and diversification, or \
                 talk through tax considerations. What would you like to explore?",
                None
            )
        );

        Self { templates, last_loaded: None }
    }

    /// Built-in templates overridden by every topic present in `json`.
    pub fn from_json_str(json: &str) -> Result<Self, ResponseTableError> {
        let file: ResponsesFile = serde_json::from_str(json)?;
        let mut table = Self::builtin();
        for (key, template) in file.responses {
            let topic: Topic = key.parse().map_err(|_| ResponseTableError::UnknownTopic(key))?;
            table.templates.insert(topic, template);
        }
        Ok(table)
    }

    pub fn template(&self, topic: Topic) -> Option<&ResponseTemplate> {
        self.templates.get(&topic)
    }

    /// Renders the reply for `topic`, falling back to the general template.
    pub fn lookup(&self, topic: Topic, portfolio: Option<&PortfolioSummary>) -> CannedReply {
        let template = self.templates
            .get(&topic)
            .or_else(|| self.templates.get(&Topic::General));

        let Some(template) = template else {
            return CannedReply { content: String::new(), follow_up: None };
        };

        let content = match portfolio {
            Some(summary) => substitute(&template.content, summary),
            None => template.content.clone(),
        };

        CannedReply { content, follow_up: template.follow_up.clone() }
    }
}

impl Default for ResponseTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn substitute(template: &str, summary: &PortfolioSummary) -> String {
    let mut out = template
        .replace("{total_value}", &format!("{:.2}", summary.total_value))
        .replace("{cash}", &format!("{:.2}", summary.cash))
        .replace("{holdings_count}", &summary.holdings_count.to_string());
    if let Some(score) = summary.risk_score {
        out = out.replace("{risk_score}", &score.to_string());
    }
    out
}

/// Loads the overrides file. The table is stamped with the file's mtime as
/// observed before the read, so an edit racing the load is picked up later.
pub fn load_responses(path: &str) -> Result<Arc<ResponseTable>, ResponseTableError> {
    let modified = fs::metadata(path)?.modified().ok();
    let file_content = fs::read_to_string(path)?;
    let mut table = ResponseTable::from_json_str(&file_content)?;
    table.last_loaded = modified.or_else(|| Some(SystemTime::now()));
    Ok(Arc::new(table))
}

pub fn reload_responses_if_changed<P: AsRef<Path>>(
    path: P,
    current: &Arc<ResponseTable>
) -> Result<Option<Arc<ResponseTable>>, ResponseTableError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)?;
    let path_str = path.to_string_lossy();

    if let Ok(modified) = metadata.modified() {
        match current.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Responses file changed, reloading...");
                return load_responses(&path_str).map(Some);
            }
            None => {
                info!("No last_loaded timestamp, reloading responses...");
                return load_responses(&path_str).map(Some);
            }
        }
    }
    Ok(None)
}
