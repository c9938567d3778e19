use super::{
    create_weather_tool, sse_body, ProviderConfig, ProviderTestSetup, ARGUMENTS, FINAL_ANSWER,
    PREAMBLE, PROMPT, SYSTEM, WEATHER_RESULT,
};
use serde_json::json;
use unified_llm::{ClientConfig, LLMProvider, OpenAIProvider, ToolFormat};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct OpenAITestSetup;

const CALL_ID: &str = "call_abc123def456";

#[async_trait::async_trait]
impl ProviderTestSetup for OpenAITestSetup {
    fn get_config() -> ProviderConfig {
        ProviderConfig {
            name: "OpenAI",
            model: "gpt-4o-mini",
            call_id: CALL_ID,
        }
    }

    fn create_provider(base_url: &str) -> Box<dyn LLMProvider> {
        Box::new(
            OpenAIProvider::new_with_base_url("test-api-key", base_url)
                .expect("Failed to create OpenAI provider"),
        )
    }

    fn client_config(base_url: &str) -> ClientConfig {
        ClientConfig::new()
            .with_openai("test-api-key")
            .with_openai_base_url(base_url)
    }

    async fn mount_function_calling_mocks(mock_server: &MockServer) {
        let weather_tool = create_weather_tool();
        let rendered = ToolFormat::Responses
            .render(weather_tool.schema())
            .expect("render weather tool");

        let initial_request = json!({
            "model": "gpt-4o-mini",
            "input": [
                {"type": "message", "role": "user", "content": PROMPT}
            ],
            "instructions": SYSTEM,
            "tools": [rendered],
            "parallel_tool_calls": true,
            "stream": true
        });

        let initial_events = weather_call_turn();

        let followup_request = json!({
            "model": "gpt-4o-mini",
            "input": [
                {"type": "message", "role": "user", "content": PROMPT},
                {"type": "message", "role": "assistant", "content": PREAMBLE},
                {"type": "function_call", "call_id": CALL_ID, "name": "get_weather", "arguments": ARGUMENTS},
                {"type": "function_call_output", "call_id": CALL_ID, "output": WEATHER_RESULT}
            ],
            "stream": true
        });

        let followup_events = sse_body(&[
            json!({"type": "response.created", "response": {"id": "resp_second", "output": []}}),
            json!({"type": "response.output_item.added", "item": {"type": "message", "id": "msg_2"}}),
            json!({"type": "response.output_text.delta", "item_id": "msg_2", "delta": "It's sunny and 22°C in Paris right now. "}),
            json!({"type": "response.output_text.delta", "item_id": "msg_2", "delta": "Perfect weather for sightseeing!"}),
            json!({"type": "response.completed", "response": {
                "id": "resp_second",
                "status": "completed",
                "output": [{"type": "message", "content": [{"type": "output_text", "text": FINAL_ANSWER}]}],
                "usage": {"input_tokens": 102, "output_tokens": 16}
            }}),
        ]);

        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer test-api-key"))
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
            .and(path("/responses"))
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

/// A Responses API turn with some text and one `get_weather` call.
pub fn weather_call_turn() -> String {
    sse_body(&[
        json!({"type": "response.created", "response": {"id": "resp_first", "output": []}}),
        json!({"type": "response.output_item.added", "item": {"type": "message", "id": "msg_1"}}),
        json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": PREAMBLE}),
        json!({"type": "response.output_item.added", "item": {
            "type": "function_call", "id": "fc_1", "call_id": CALL_ID, "name": "get_weather"
        }}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "{\"location\":"}),
        json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "\"Paris\",\"unit\":\"celsius\"}"}),
        json!({"type": "response.output_item.done", "item": {
            "type": "function_call", "id": "fc_1", "call_id": CALL_ID,
            "name": "get_weather", "arguments": ARGUMENTS
        }}),
        json!({"type": "response.completed", "response": {
            "id": "resp_first",
            "status": "completed",
            "output": [{"type": "function_call", "id": "fc_1"}],
            "usage": {"input_tokens": 57, "output_tokens": 18}
        }}),
    ])
}
