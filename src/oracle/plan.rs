use serde::{Deserialize, Deserializer, Serialize};

/// Recommended action, as named in the oracle contract and in trade memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    #[default]
    Hold,
    EnterLong,
    EnterShort,
    ExitPosition,
    AdjustStop,
}

impl PlanAction {
    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "HOLD" => Some(Self::Hold),
            "ENTER_LONG" => Some(Self::EnterLong),
            "ENTER_SHORT" => Some(Self::EnterShort),
            "EXIT_POSITION" => Some(Self::ExitPosition),
            "ADJUST_STOP" => Some(Self::AdjustStop),
            _ => None,
        }
    }
}

/// Validated recommendation. Every variant is handled explicitly by the lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TradePlan {
    Hold {
        rationale: String,
    },
    /// `limit_price` of None means a market entry
    EnterLong {
        limit_price: Option<f64>,
        rationale: String,
    },
    EnterShort {
        limit_price: Option<f64>,
        rationale: String,
    },
    ExitPosition {
        rationale: String,
    },
    AdjustStop {
        stop_price: Option<f64>,
        rationale: String,
    },
}

impl TradePlan {
    pub fn hold(rationale: impl Into<String>) -> Self {
        Self::Hold {
            rationale: rationale.into(),
        }
    }

    pub fn action(&self) -> PlanAction {
        match self {
            Self::Hold { .. } => PlanAction::Hold,
            Self::EnterLong { .. } => PlanAction::EnterLong,
            Self::EnterShort { .. } => PlanAction::EnterShort,
            Self::ExitPosition { .. } => PlanAction::ExitPosition,
            Self::AdjustStop { .. } => PlanAction::AdjustStop,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            Self::Hold { rationale }
            | Self::EnterLong { rationale, .. }
            | Self::EnterShort { rationale, .. }
            | Self::ExitPosition { rationale }
            | Self::AdjustStop { rationale, .. } => rationale,
        }
    }
}

/// Raw oracle output before validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecommendation {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    order_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_price")]
    price: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

/// Accepts a number, a numeric string or null
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|p| p.is_finite() && *p > 0.0))
}

/// A plan plus whatever was wrong with the oracle output that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecommendation {
    pub plan: TradePlan,
    pub notes: Option<String>,
    pub anomaly: Option<String>,
}

impl ParsedRecommendation {
    fn fallback(anomaly: String) -> Self {
        Self {
            plan: TradePlan::hold("no usable recommendation"),
            notes: None,
            anomaly: Some(anomaly),
        }
    }
}

/// Strip markdown code fences the model sometimes wraps JSON in
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Decode oracle output into a plan. Never fails: anything unusable becomes HOLD
/// with an anomaly attached.
pub fn parse_recommendation(text: &str) -> ParsedRecommendation {
    let raw: RawRecommendation = match serde_json::from_str(strip_code_fences(text)) {
        Ok(raw) => raw,
        Err(e) => return ParsedRecommendation::fallback(format!("malformed oracle output: {}", e)),
    };

    let rationale = raw.reason.unwrap_or_default();
    let notes = raw.notes.filter(|n| !n.trim().is_empty());

    let action = match raw.action.as_deref() {
        None => {
            return ParsedRecommendation {
                plan: TradePlan::hold(rationale),
                notes,
                anomaly: Some("oracle output has no action".to_string()),
            }
        }
        Some(label) => match PlanAction::from_label(label) {
            Some(action) => action,
            None => {
                return ParsedRecommendation {
                    plan: TradePlan::hold(rationale),
                    notes,
                    anomaly: Some(format!("unrecognized oracle action {:?}", label)),
                }
            }
        },
    };

    let mut anomaly = None;
    let wants_limit = raw
        .order_type
        .as_deref()
        .map(|t| t.trim().to_ascii_lowercase())
        .is_some_and(|t| t == "limit" || t == "lmt");
    let limit_price = if wants_limit {
        if raw.price.is_none() {
            anomaly = Some("limit entry without a price, using market".to_string());
        }
        raw.price
    } else {
        None
    };

    let plan = match action {
        PlanAction::Hold => TradePlan::Hold { rationale },
        PlanAction::EnterLong => TradePlan::EnterLong {
            limit_price,
            rationale,
        },
        PlanAction::EnterShort => TradePlan::EnterShort {
            limit_price,
            rationale,
        },
        PlanAction::ExitPosition => TradePlan::ExitPosition { rationale },
        PlanAction::AdjustStop => TradePlan::AdjustStop {
            stop_price: raw.price,
            rationale,
        },
    };

    ParsedRecommendation {
        plan,
        notes,
        anomaly,
    }
}
