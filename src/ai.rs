use crate::config::Config;
use crate::forecast::types::{CurrentConditions, ForecastPoint};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

pub const HEAT_ADVISORY: &str = "It's quite hot today. Stay hydrated and avoid direct sunlight!";
pub const RAIN_ADVISORY: &str = "High chance of rain today. Don't forget your umbrella!";
pub const BREEZY_NOTICE: &str = "Expect breezy conditions throughout the day.";
pub const PLEASANT_DAY: &str = "The weather looks stable. Have a great day!";
pub const NO_INSIGHT: &str = "No insights available for this location.";

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Text generation is not configured")]
    NotConfigured,
}

/// Prompt in, completion out. The insight generator only depends on this.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct AiClient {
    client: Client,
    config: Config,
}

impl AiClient {
    pub fn new(config: Config) -> Result<Self, AiError> {
        let client = Client::builder()
            .user_agent("SkyCast/0.1")
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self { client, config })
    }

    async fn chat_completion(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self
            .config
            .openrouter_api_key
            .as_deref()
            .ok_or(AiError::NotConfigured)?;

        let request = ChatRequest {
            model: self.config.or_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a friendly weather assistant. Answer in at most two short sentences.".to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: 120,
            temperature: 0.7,
            stream: false,
        };

        let response = self
            .client
            .post(&self.config.openrouter_base_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let chat_response: ChatResponse = response.json().await?;
                if let Some(choice) = chat_response.choices.first() {
                    Ok(choice.message.content.clone())
                } else {
                    Err(AiError::ApiError("No response choices".to_string()))
                }
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(AiError::ApiError(format!("HTTP {}: {}", status, error_text)))
            }
        }
    }
}

#[async_trait]
impl TextGenerator for AiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        self.chat_completion(prompt).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InsightSource {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Insight {
    pub text: String,
    pub source: InsightSource,
}

pub fn build_insight_prompt(current: &CurrentConditions, daily: &[ForecastPoint]) -> String {
    let highs = daily
        .iter()
        .take(3)
        .filter_map(|d| d.max_temp)
        .map(|t| format!("{}°", t))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Based on the following weather data, provide a concise, friendly \"Weather Insight\" (max 2 sentences).\n\
         Mention any concerns like heatwaves, heavy rain, or storms if present.\n\
         If weather is pleasant, give a tip.\n\n\
         Current: {}°, {}, Humidity: {}%.\n\
         Forecast Highs for next few days: {}.\n\
         Rain Probability: {}%.",
        current.temp,
        current.description,
        current.humidity,
        highs,
        today_rain_prob(daily)
    )
}

/// Rule-based sentence used whenever the text service cannot answer.
/// Rules are checked in order; the first match wins.
pub fn fallback_insight(current: &CurrentConditions, daily: &[ForecastPoint]) -> &'static str {
    if current.temp > 30 {
        HEAT_ADVISORY
    } else if today_rain_prob(daily) > 50 {
        RAIN_ADVISORY
    } else if current.wind_speed > 10.0 {
        BREEZY_NOTICE
    } else {
        PLEASANT_DAY
    }
}

fn today_rain_prob(daily: &[ForecastPoint]) -> u8 {
    daily.first().map(|d| d.rain_prob).unwrap_or(0)
}

/// Asks the text service for an insight and never fails: any error from the
/// service is logged and replaced by [`fallback_insight`].
pub async fn generate_insight(
    generator: &dyn TextGenerator,
    current: &CurrentConditions,
    daily: &[ForecastPoint],
) -> Insight {
    let prompt = build_insight_prompt(current, daily);

    match generator.complete(&prompt).await {
        Ok(text) if text.trim().is_empty() => Insight {
            text: NO_INSIGHT.to_string(),
            source: InsightSource::Ai,
        },
        Ok(text) => Insight {
            text: text.trim().to_string(),
            source: InsightSource::Ai,
        },
        Err(e) => {
            match e {
                AiError::NotConfigured => tracing::debug!("Insight service not configured, using fallback"),
                other => tracing::warn!("Insight generation failed, using fallback: {}", other),
            }
            Insight {
                text: fallback_insight(current, daily).to_string(),
                source: InsightSource::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, AiError> {
            Err(AiError::ApiError("quota exceeded".to_string()))
        }
    }

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, AiError> {
            Ok(self.0.to_string())
        }
    }

    fn current(temp: i32, wind_speed: f64) -> CurrentConditions {
        CurrentConditions {
            name: "Kanjirappally".to_string(),
            display_name: None,
            country: "IN".to_string(),
            temp,
            feels_like: temp,
            humidity: 70,
            wind_speed,
            wind_deg: 180.0,
            pressure: 1010.0,
            visibility: 10000,
            description: "few clouds".to_string(),
            icon: "02d".to_string(),
            timestamp: 1_704_067_200,
            sunrise: 1_704_070_000,
            sunset: 1_704_112_000,
            uv_index: None,
        }
    }

    fn day(max_temp: i32, rain_prob: u8) -> ForecastPoint {
        ForecastPoint {
            dt: 1_704_067_200,
            temp: max_temp - 3,
            min_temp: Some(max_temp - 6),
            max_temp: Some(max_temp),
            description: "light rain".to_string(),
            icon: "10d".to_string(),
            rain_prob,
            humidity: 80,
        }
    }

    #[tokio::test]
    async fn test_heat_advisory_wins_over_everything() {
        let daily = vec![day(36, 90)];
        let insight = generate_insight(&FailingGenerator, &current(35, 15.0), &daily).await;
        assert_eq!(insight.text, HEAT_ADVISORY);
        assert_eq!(insight.source, InsightSource::Fallback);
    }

    #[tokio::test]
    async fn test_rain_advisory_when_not_hot() {
        let daily = vec![day(24, 60)];
        let insight = generate_insight(&FailingGenerator, &current(20, 15.0), &daily).await;
        assert_eq!(insight.text, RAIN_ADVISORY);
    }

    #[test]
    fn test_fallback_rule_order() {
        assert_eq!(fallback_insight(&current(31, 0.0), &[]), HEAT_ADVISORY);
        assert_eq!(fallback_insight(&current(30, 0.0), &[day(30, 51)]), RAIN_ADVISORY);
        assert_eq!(fallback_insight(&current(30, 10.5), &[day(30, 50)]), BREEZY_NOTICE);
        assert_eq!(fallback_insight(&current(30, 10.0), &[day(30, 50)]), PLEASANT_DAY);
        assert_eq!(fallback_insight(&current(12, 2.0), &[]), PLEASANT_DAY);
    }

    #[test]
    fn test_prompt_mentions_next_three_highs() {
        let daily = vec![day(31, 40), day(29, 10), day(27, 0), day(40, 0)];
        let prompt = build_insight_prompt(&current(28, 3.0), &daily);

        assert!(prompt.contains("Current: 28°, few clouds, Humidity: 70%."));
        assert!(prompt.contains("Forecast Highs for next few days: 31°, 29°, 27°."));
        assert!(prompt.contains("Rain Probability: 40%."));
        assert!(!prompt.contains("40°"));
    }

    #[tokio::test]
    async fn test_service_text_is_returned_trimmed() {
        let generator = FixedGenerator("  Warm and humid; carry water.  \n");
        let insight = generate_insight(&generator, &current(29, 3.0), &[day(31, 20)]).await;
        assert_eq!(insight.text, "Warm and humid; carry water.");
        assert_eq!(insight.source, InsightSource::Ai);
    }

    #[tokio::test]
    async fn test_blank_completion_yields_placeholder() {
        let insight = generate_insight(&FixedGenerator("   "), &current(29, 3.0), &[]).await;
        assert_eq!(insight.text, NO_INSIGHT);
    }

    #[tokio::test]
    async fn test_unconfigured_client_falls_back() {
        let client = AiClient::new(Config::default()).unwrap();
        let insight = generate_insight(&client, &current(20, 12.0), &[day(22, 10)]).await;
        assert_eq!(insight.text, BREEZY_NOTICE);
        assert_eq!(insight.source, InsightSource::Fallback);
    }

    #[tokio::test]
    async fn test_chat_completion_against_mock_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer or_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Mild and dry. Great for a walk."}}]
            })))
            .mount(&mock_server)
            .await;

        let client = AiClient::new(Config {
            openrouter_api_key: Some("or_key".to_string()),
            openrouter_base_url: format!("{}/chat/completions", mock_server.uri()),
            ..Config::default()
        })
        .unwrap();

        let insight = generate_insight(&client, &current(22, 2.0), &[day(24, 5)]).await;
        assert_eq!(insight.text, "Mild and dry. Great for a walk.");
        assert_eq!(insight.source, InsightSource::Ai);
    }

    #[tokio::test]
    async fn test_rate_limited_service_falls_back() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let client = AiClient::new(Config {
            openrouter_api_key: Some("or_key".to_string()),
            openrouter_base_url: mock_server.uri(),
            ..Config::default()
        })
        .unwrap();

        assert!(matches!(client.complete("hi").await, Err(AiError::RateLimited)));

        let insight = generate_insight(&client, &current(20, 3.0), &[day(22, 70)]).await;
        assert_eq!(insight.text, RAIN_ADVISORY);
    }
}
