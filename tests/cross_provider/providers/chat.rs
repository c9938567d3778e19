use super::{
    create_weather_tool, sse_body, ProviderConfig, ProviderTestSetup, ARGUMENTS, PREAMBLE,
    PROMPT, SYSTEM, WEATHER_RESULT,
};
use serde_json::json;
use unified_llm::{ChatCompletionsProvider, ClientConfig, LLMProvider, ToolFormat};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Chat Completions against a local Ollama-style server: no credentials,
/// tool call ids assigned by the server.
pub struct OllamaTestSetup;

const CALL_ID: &str = "call_7x2kq9";

#[async_trait::async_trait]
impl ProviderTestSetup for OllamaTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Ollama",
            model: "llama3.2",
            call_id: CALL_ID,
        }
    }

    fn create_provider(base_url: &str) -> Box<dyn LLMProvider> {
        Box::new(
            ChatCompletionsProvider::ollama(base_url).expect("Failed to create Ollama provider"),
        )
    }

    fn client_config(base_url: &str) -> ClientConfig {
        ClientConfig::new().with_ollama_base_url(base_url)
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let rendered = ToolFormat::Ollama
            .render(weather_tool.schema())
            .expect("render weather tool");

        let initial_request = json!({
            "model": "llama3.2",
            "messages": [
                {"role": "system", "content": SYSTEM},
                {"role": "user", "content": PROMPT}
            ],
            "tools": [rendered],
            "stream": true,
            "stream_options": {"include_usage": true}
        });

        let chunk = |delta: serde_json::Value, finish: Option<&str>| {
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "model": "llama3.2",
                "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
            })
        };

        let initial_events = sse_body(&[
            chunk(json!({"role": "assistant", "content": PREAMBLE}), None),
            chunk(
                json!({"tool_calls": [{"index": 0, "id": CALL_ID, "type": "function",
                    "function": {"name": "get_weather", "arguments": ""}}]}),
                None,
            ),
            chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"location\":\"Paris\","}}]}),
                None,
            ),
            chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"unit\":\"celsius\"}"}}]}),
                None,
            ),
            chunk(json!({}), Some("tool_calls")),
            json!({"id": "chatcmpl-1", "choices": [], "usage": {"prompt_tokens": 88, "completion_tokens": 21}}),
        ]);

        let followup_request = json!({
            "model": "llama3.2",
            "messages": [
                {"role": "system", "content": SYSTEM},
                {"role": "user", "content": PROMPT},
                {"role": "assistant", "content": PREAMBLE, "tool_calls": [
                    {"id": CALL_ID, "type": "function",
                     "function": {"name": "get_weather", "arguments": ARGUMENTS}}
                ]},
                {"role": "tool", "tool_call_id": CALL_ID, "content": WEATHER_RESULT}
            ],
            "stream": true
        });

        let followup_events = sse_body(&[
            chunk(json!({"role": "assistant", "content": "It's sunny and 22°C in Paris right now. "}), None),
            chunk(json!({"content": "Perfect weather for sightseeing!"}), None),
            chunk(json!({}), Some("stop")),
            json!({"id": "chatcmpl-2", "choices": [], "usage": {"prompt_tokens": 140, "completion_tokens": 17}}),
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(&initial_request))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(initial_events),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(&followup_request))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(followup_events),
            )
            .expect(1)
            .mount(mock_server)
            .await;
    }
}
