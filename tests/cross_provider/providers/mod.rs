pub mod anthropic;
pub mod chat;
pub mod openai;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use unified_llm::{ClientConfig, LLMProvider, Tool};
use wiremock::MockServer;

pub const PROMPT: &str = "What's the weather like in Paris?";
pub const SYSTEM: &str =
    "You have access to weather data. Use the get_weather function when asked about weather.";
pub const PREAMBLE: &str = "I'll check the weather in Paris for you.";
pub const ARGUMENTS: &str = r#"{"location":"Paris","unit":"celsius"}"#;
pub const WEATHER_RESULT: &str = "The weather in Paris is sunny with a temperature of 22°C.";
pub const FINAL_ANSWER: &str = "It's sunny and 22°C in Paris right now. Perfect weather for sightseeing!";

/// Get the current weather for a location
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    /// City name, e.g. Paris
    pub location: String,
    /// Temperature unit
    pub unit: Option<String>,
}

/// The weather tool every provider test offers.
pub fn create_weather_tool() -> Tool {
    Tool::from_fn("get_weather", |args: WeatherArgs| async move {
        assert_eq!(args.location, "Paris");
        Ok::<_, std::io::Error>(WEATHER_RESULT.to_string())
    })
    .expect("weather tool schema")
}

/// Body of a `text/event-stream` response made of `data:` lines.
pub fn sse_body(events: &[Value]) -> String {
    let mut body: String = events.iter().map(|e| format!("data: {e}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Like [`sse_body`] with an `event:` line per event and no `[DONE]` sentinel.
pub fn named_sse_body(events: &[(&str, Value)]) -> String {
    events
        .iter()
        .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
        .collect()
}

/// Provider-specific test configuration.
pub struct ProviderConfig {
    pub name: &'static str,
    pub model: &'static str,
    /// Call id the mocked first turn assigns to the weather call.
    pub call_id: &'static str,
}

/// Wires one provider to the shared function calling scenario.
#[async_trait::async_trait]
pub trait ProviderTestSetup {
    fn get_config() -> ProviderConfig;

    fn create_provider(base_url: &str) -> Box<dyn LLMProvider>;

    /// Client configuration routing this provider's models to `base_url`.
    fn client_config(base_url: &str) -> ClientConfig;

    /// Mount the first turn (a weather call) and the follow-up turn, which
    /// only matches when the tool result was sent back.
    async fn mount_function_calling_mocks(mock_server: &MockServer);
}
