use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use unified_llm::accumulator::ResponseAccumulator;
use unified_llm::{
    BoxError, CallOptions, Error, FinishReason, InputItem, LLMClient, LLMRequest, Prompt,
    ToolCallLoop, ToolRegistry,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::providers::{
    anthropic::AnthropicTestSetup, chat::OllamaTestSetup, create_weather_tool,
    openai::{weather_call_turn, OpenAITestSetup},
    ProviderTestSetup, FINAL_ANSWER, PREAMBLE, PROMPT, SYSTEM, WEATHER_RESULT,
};

fn weather_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register_tool(create_weather_tool())
        .expect("register weather tool");
    registry
}

fn initial_request<T: ProviderTestSetup>() -> LLMRequest {
    LLMRequest::from_prompt(T::get_config().model, &Prompt::user(PROMPT))
        .instructions(SYSTEM)
        .temperature(0.7)
        .max_tokens(150)
        .tools(vec![create_weather_tool().declaration()])
}

/// Drive both turns by hand: stream the first, run the tool, send the result.
async fn run_function_calling_test<T: ProviderTestSetup>() -> Result<(), Box<dyn std::error::Error>>
{
    let config = T::get_config();
    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;
    let provider = T::create_provider(&mock_server.uri());

    let request = initial_request::<T>();
    let response = provider.generate(&request).await?;

    let mut accumulator = ResponseAccumulator::new();
    let mut stream = response.stream();
    while let Some(event) = stream.next().await {
        accumulator.process_event(event?)?;
    }

    let function_calls = accumulator.completed_function_calls();
    assert_eq!(function_calls.len(), 1, "{}: expected one function call", config.name);
    let weather_call = &function_calls[0];
    assert_eq!(weather_call.name, "get_weather", "{}", config.name);
    assert_eq!(weather_call.call_id, config.call_id, "{}", config.name);
    assert_eq!(weather_call.parsed_arguments()?["location"], "Paris", "{}", config.name);

    let complete = accumulator.finalize()?;
    assert_eq!(complete.finish_reason, FinishReason::ToolCalls, "{}", config.name);
    assert_eq!(complete.content(), PREAMBLE, "{}", config.name);

    let conversation = Prompt::user(PROMPT)
        .with_response(&complete)
        .with_item(InputItem::function_call_output(
            weather_call.call_id.clone(),
            WEATHER_RESULT,
        ));
    let followup = LLMRequest::from_prompt(config.model, &conversation)
        .instructions(SYSTEM)
        .temperature(0.7)
        .max_tokens(150)
        .tools(vec![create_weather_tool().declaration()]);

    // Only matches the second mock if the call and its result were sent back.
    let followup_text = provider.generate(&followup).await?.text().await?;
    assert_eq!(followup_text, FINAL_ANSWER, "{}", config.name);

    Ok(())
}

/// Same conversation, resolved by the loop against the registry.
async fn run_resolution_loop_test<T: ProviderTestSetup>() {
    let config = T::get_config();
    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;
    let provider = T::create_provider(&mock_server.uri());
    let registry = weather_registry();

    let outcome = ToolCallLoop::new(provider.as_ref(), &registry, 3)
        .run(initial_request::<T>())
        .await
        .unwrap_or_else(|e| panic!("{}: loop failed: {e}", config.name));

    assert_eq!(outcome.response.content(), FINAL_ANSWER, "{}", config.name);
    assert_eq!(outcome.response.finish_reason, FinishReason::Stop, "{}", config.name);
    assert_eq!(outcome.provider_calls, 2, "{}", config.name);
    assert_eq!(outcome.tool_calls_executed, 1, "{}", config.name);
    assert!(outcome.usage.input_tokens > 0, "{}", config.name);
}

/// End to end through the client facade, buffered and streamed.
async fn run_client_test<T: ProviderTestSetup>() {
    let config = T::get_config();
    let options = CallOptions::new(config.model).instructions(SYSTEM);

    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;
    let client = LLMClient::new(T::client_config(&mock_server.uri())).with_registry(weather_registry());
    let response = client
        .response(PROMPT, &options)
        .await
        .unwrap_or_else(|e| panic!("{}: response failed: {e}", config.name));
    assert_eq!(response.text, FINAL_ANSWER, "{}", config.name);
    assert!(response.output_tokens > 0, "{}", config.name);

    let mock_server = MockServer::start().await;
    T::mount_function_calling_mocks(&mock_server).await;
    let client = LLMClient::new(T::client_config(&mock_server.uri())).with_registry(weather_registry());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let streamed = client
        .stream(PROMPT, &options, move |delta: String| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(delta);
                Ok::<_, BoxError>(())
            }
        })
        .await
        .unwrap_or_else(|e| panic!("{}: stream failed: {e}", config.name));

    let delivered: String = seen.lock().unwrap().concat();
    assert_eq!(streamed.text, delivered, "{}", config.name);
    assert_eq!(streamed.text, format!("{PREAMBLE}{FINAL_ANSWER}"), "{}", config.name);
}

#[tokio::test]
async fn test_openai_function_calling_e2e() {
    run_function_calling_test::<OpenAITestSetup>()
        .await
        .expect("OpenAI function calling test failed");
}

#[tokio::test]
async fn test_anthropic_function_calling_e2e() {
    run_function_calling_test::<AnthropicTestSetup>()
        .await
        .expect("Anthropic function calling test failed");
}

#[tokio::test]
async fn test_ollama_function_calling_e2e() {
    run_function_calling_test::<OllamaTestSetup>()
        .await
        .expect("Ollama function calling test failed");
}

#[tokio::test]
async fn test_openai_resolution_loop() {
    run_resolution_loop_test::<OpenAITestSetup>().await;
}

#[tokio::test]
async fn test_anthropic_resolution_loop() {
    run_resolution_loop_test::<AnthropicTestSetup>().await;
}

#[tokio::test]
async fn test_ollama_resolution_loop() {
    run_resolution_loop_test::<OllamaTestSetup>().await;
}

#[tokio::test]
async fn test_openai_client() {
    run_client_test::<OpenAITestSetup>().await;
}

#[tokio::test]
async fn test_anthropic_client() {
    run_client_test::<AnthropicTestSetup>().await;
}

#[tokio::test]
async fn test_ollama_client() {
    run_client_test::<OllamaTestSetup>().await;
}

#[tokio::test]
async fn test_depth_bound_over_http() {
    // A model that asks for the weather on every turn.
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(weather_call_turn()),
        )
        .mount(&mock_server)
        .await;

    let config = OpenAITestSetup::client_config(&mock_server.uri()).with_max_tool_call_depth(1);
    let client = LLMClient::new(config).with_registry(weather_registry());

    let result = client
        .response(PROMPT, &CallOptions::new("gpt-4o-mini").instructions(SYSTEM))
        .await;
    match result {
        Err(Error::ToolDepthExceeded {
            max_depth,
            partial_text,
        }) => {
            assert_eq!(max_depth, 1);
            assert_eq!(partial_text.as_deref(), Some(PREAMBLE));
        }
        other => panic!("expected depth error, got {other:?}"),
    }

    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
    let second: serde_json::Value = requests[1].body_json().expect("json body");
    assert_eq!(second["input"][3]["type"], "function_call_output");
    assert_eq!(second["input"][3]["output"], WEATHER_RESULT);
}

#[tokio::test]
async fn test_provider_error_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "type": "error",
            "error": {"type": "rate_limit_error", "message": "Number of requests has exceeded your rate limit"}
        })))
        .mount(&mock_server)
        .await;

    let client = LLMClient::new(AnthropicTestSetup::client_config(&mock_server.uri()));
    let result = client
        .response(PROMPT, &CallOptions::new("claude-3-5-haiku-latest"))
        .await;
    assert!(
        matches!(&result, Err(Error::RateLimit { message, .. }) if message.contains("rate limit")),
        "got {result:?}"
    );
}
