use super::{
    create_weather_tool, named_sse_body, ProviderConfig, ProviderTestSetup, FINAL_ANSWER,
    PREAMBLE, PROMPT, SYSTEM, WEATHER_RESULT,
};
use serde_json::json;
use unified_llm::{AnthropicProvider, ClientConfig, LLMProvider, ToolFormat};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct AnthropicTestSetup;

const TOOL_USE_ID: &str = "toolu_01A09q90qw90lq917835lq9";

#[async_trait::async_trait]
impl ProviderTestSetup for AnthropicTestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "Anthropic",
            model: "claude-3-5-haiku-latest",
            call_id: TOOL_USE_ID,
        }
    }

    fn create_provider(base_url: &str) -> Box<dyn LLMProvider> {
        Box::new(
            AnthropicProvider::new_with_base_url("test-api-key", base_url)
                .expect("Failed to create Anthropic provider"),
        )
    }

    fn client_config(base_url: &str) -> ClientConfig {
        ClientConfig::new()
            .with_anthropic("test-api-key")
            .with_anthropic_base_url(base_url)
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let rendered = ToolFormat::Anthropic
            .render(weather_tool.schema())
            .expect("render weather tool");

        let initial_request = json!({
            "model": "claude-3-5-haiku-latest",
            "messages": [
                {"role": "user", "content": PROMPT}
            ],
            "system": SYSTEM,
            "tools": [rendered],
            "stream": true
        });

        let initial_events = named_sse_body(&[
            ("message_start", json!({"type": "message_start", "message": {
                "id": "msg_01Weather", "type": "message", "role": "assistant", "content": [],
                "usage": {"input_tokens": 64, "output_tokens": 1}
            }})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "text", "text": ""}})),
            ("ping", json!({"type": "ping"})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": PREAMBLE}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("content_block_start", json!({"type": "content_block_start", "index": 1,
                "content_block": {"type": "tool_use", "id": TOOL_USE_ID, "name": "get_weather", "input": {}}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "{\"location\": \"Par"}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "is\", \"unit\": \"celsius\"}"}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 1})),
            ("message_delta", json!({"type": "message_delta",
                "delta": {"stop_reason": "tool_use", "stop_sequence": null},
                "usage": {"output_tokens": 42}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);

        // Tool use rides on the assistant turn; its result comes back as a user turn.
        let followup_request = json!({
            "model": "claude-3-5-haiku-latest",
            "messages": [
                {"role": "user", "content": PROMPT},
                {"role": "assistant", "content": [
                    {"type": "text", "text": PREAMBLE},
                    {"type": "tool_use", "id": TOOL_USE_ID, "name": "get_weather",
                     "input": {"location": "Paris", "unit": "celsius"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": TOOL_USE_ID, "content": WEATHER_RESULT}
                ]}
            ],
            "system": SYSTEM,
            "stream": true
        });

        let followup_events = named_sse_body(&[
            ("message_start", json!({"type": "message_start", "message": {
                "id": "msg_02Answer", "usage": {"input_tokens": 131, "output_tokens": 1}
            }})),
            ("content_block_start", json!({"type": "content_block_start", "index": 0,
                "content_block": {"type": "text", "text": ""}})),
            ("content_block_delta", json!({"type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": FINAL_ANSWER}})),
            ("content_block_stop", json!({"type": "content_block_stop", "index": 0})),
            ("message_delta", json!({"type": "message_delta",
                "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 19}})),
            ("message_stop", json!({"type": "message_stop"})),
        ]);

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
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
            .and(path("/v1/messages"))
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
