//! LLM-backed recommendation oracle using an OpenAI-compatible chat API
//!
//! The model gets the cycle's market context as JSON and must answer with the
//! recommendation object only.

use super::{MarketContext, Oracle};
use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 512;

const SYSTEM_PROMPT: &str = "You manage one leveraged futures position. \
Reply with a single JSON object and nothing else: \
{\"action\": \"HOLD\" | \"ENTER_LONG\" | \"ENTER_SHORT\" | \"EXIT_POSITION\" | \"ADJUST_STOP\", \
\"orderType\": \"market\" | \"limit\", \"price\": number | null, \"reason\": string, \"notes\": string}. \
Never propose an entry while a position is open. ADJUST_STOP needs the new stop price in \"price\".";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

pub struct LlmOracle {
    api_key: String,
    api_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmOracle {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            api_key,
            api_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn user_prompt(context: &MarketContext) -> String {
        let context_json =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
        format!(
            "Market and account state for {} (priced from {}):\n{}\n\nWhat is the next action?",
            context.trading_symbol, context.pricing_symbol, context_json
        )
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn recommend(&self, context: &MarketContext) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: Self::user_prompt(context),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::Empty)?;

        tracing::debug!("Oracle replied: {}", content);
        Ok(content)
    }
}
