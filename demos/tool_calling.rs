//! Tool calling through the unified client.
//!
//! Picks the provider from `LLM_MODEL` (default `gpt-4o-mini`); credentials
//! come from the environment or a `.env` file.

use schemars::JsonSchema;
use serde::Deserialize;
use unified_llm::{CallOptions, LLMClient, Tool};

/// Get the current weather for a location
#[derive(Debug, Deserialize, JsonSchema)]
struct WeatherArgs {
    /// The city, e.g. San Francisco
    location: String,
    /// "celsius" or "fahrenheit"
    #[serde(default = "default_unit")]
    unit: String,
}

fn default_unit() -> String {
    "celsius".to_string()
}

async fn get_weather(args: WeatherArgs) -> Result<String, std::io::Error> {
    // A real tool would call a weather service here.
    let temperature = if args.unit == "fahrenheit" { 72 } else { 22 };
    Ok(format!(
        "{}: sunny, {temperature} degrees {}",
        args.location, args.unit
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

    let mut client = LLMClient::from_env()?;
    client
        .registry_mut()
        .register_tool(Tool::from_fn("get_weather", get_weather)?)?;

    let options = CallOptions::new(model)
        .instructions("Use the get_weather tool when asked about weather.");

    println!("=== Tool Calling Example ===");
    let response = client
        .response("What's the weather like in Paris and in Boston, in fahrenheit?", &options)
        .await?;

    println!("{}", response.text);
    println!(
        "\n[tokens: {} in, {} out]",
        response.input_tokens, response.output_tokens
    );
    Ok(())
}
