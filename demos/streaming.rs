//! Streaming text to stdout as it arrives.

use std::io::Write;

use unified_llm::{BoxError, CallOptions, LLMClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let client = LLMClient::from_env()?;

    println!("=== Streaming Example ===");
    let response = client
        .stream(
            "Write a haiku about the Rust borrow checker.",
            &CallOptions::new(model),
            |delta: String| async move {
                let mut stdout = std::io::stdout();
                stdout.write_all(delta.as_bytes())?;
                stdout.flush()?;
                Ok::<_, BoxError>(())
            },
        )
        .await?;

    println!(
        "\n\n[{} chars, tokens: {} in, {} out]",
        response.text.chars().count(),
        response.input_tokens,
        response.output_tokens
    );
    Ok(())
}
