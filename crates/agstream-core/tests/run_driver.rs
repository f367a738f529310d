//! End-to-end runs through the agent driver.

use agstream_core::{
    Agent, AgentError, EventFilterMiddleware, RetryMiddleware, SequentialIdGenerator,
    TimeoutMiddleware,
};
use agstream_protocol::{EventType, Message, RunAgentParams};
use agstream_test_utils::assertions::assert_json_eq;
use agstream_test_utils::{
    assert_err, assert_ok, assert_some, events, RecordingMiddleware, RecordingSubscriber,
    ScriptedTransport, SseStreamBuilder,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn agent() -> Agent {
    assert_ok!(Agent::builder("http://localhost:8000/agent")
        .id_generator(Arc::new(SequentialIdGenerator::new()))
        .build())
}

fn conversation() -> SseStreamBuilder {
    SseStreamBuilder::new()
        .comment("connected")
        .event(events::run_started("thr_1", "run_2"))
        .events(events::text_message("m1", &["Hi", " th", "ere ✓"]))
        .events(events::tool_call("tc1", "search", None, &["{\"q\":", "\"rust\"}"]))
        .event(events::state_snapshot(json!({"count": 1})))
        .event(events::state_delta(json!([
            {"op": "replace", "path": "/count", "value": 5},
            {"op": "add", "path": "/tags", "value": ["a"]}
        ])))
        .event(events::run_finished("thr_1", "run_2", json!("done")))
}

#[test]
fn test_chunk_boundaries_do_not_change_outcome() {
    let body = conversation().crlf().build_bytes();

    let mut whole = agent();
    let request = assert_ok!(whole.prepare_request(RunAgentParams::new()));
    let mut run = whole.begin_run(request);
    assert_ok!(whole.feed(&mut run, &body));
    let expected = assert_ok!(whole.finish(&mut run));
    assert_eq!(expected.new_messages.len(), 1);
    assert_eq!(expected.new_messages[0].content, "Hi there ✓");

    for split in 0..=body.len() {
        let mut agent = agent();
        let request = assert_ok!(agent.prepare_request(RunAgentParams::new()));
        let mut run = agent.begin_run(request);
        assert_ok!(agent.feed(&mut run, &body[..split]));
        assert_ok!(agent.feed(&mut run, &body[split..]));
        let result = assert_ok!(agent.finish(&mut run));
        assert_eq!(result, expected, "split at {split}");
    }
}

#[tokio::test]
async fn test_run_stream_builds_result() {
    let recorder = RecordingSubscriber::new();
    let mut agent = agent();
    agent.subscribe(Arc::new(recorder.clone()));

    let chunks = conversation().chunk_stream(5);
    let result = assert_ok!(
        agent
            .run_stream(
                RunAgentParams::new().add_message(Message::user("hello")),
                chunks,
                CancellationToken::new(),
            )
            .await
    );
    let result = assert_some!(result);

    assert_eq!(result.thread_id, "thr_1");
    assert_eq!(result.run_id, "run_2");
    assert_eq!(result.result, json!("done"));
    assert_json_eq(&result.new_state, &json!({"count": 5, "tags": ["a"]}));
    // the user message predates the run
    assert_eq!(result.new_messages.len(), 1);
    assert_eq!(agent.messages().len(), 2);

    let tool_call = &agent.messages()[1].tool_calls[0];
    assert_eq!(tool_call.function.arguments, "{\"q\":\"rust\"}");

    assert!(recorder.was_called("on_run_initialized"));
    assert!(recorder.was_called("on_run_finalized"));
    assert!(!recorder.was_called("on_run_failed"));
}

#[tokio::test]
async fn test_filtered_tool_call_start_never_reaches_reducer() {
    let mut agent = agent();
    agent.use_middleware(Arc::new(EventFilterMiddleware::new([EventType::ToolCallStart])));

    let chunks = SseStreamBuilder::new()
        .events(events::text_message("m1", &["calling"]))
        .event(events::tool_call_start("tc1", "search", Some("m1")))
        .chunk_stream(64);
    let result = assert_ok!(
        agent
            .run_stream(RunAgentParams::new(), chunks, CancellationToken::new())
            .await
    );

    assert!(result.is_some());
    assert!(agent.messages()[0].tool_calls.is_empty());
    assert!(agent.reducer().find_tool_call("tc1").is_none());
}

#[tokio::test]
async fn test_middleware_phase_ordering() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut agent = agent();
    agent.use_middleware(Arc::new(RecordingMiddleware::new("outer").with_log(log.clone())));
    agent.use_middleware(Arc::new(RecordingMiddleware::new("inner").with_log(log.clone())));

    let chunks = SseStreamBuilder::new()
        .event(events::step_started("plan"))
        .chunk_stream(16);
    assert_ok!(
        agent
            .run_stream(RunAgentParams::new(), chunks, CancellationToken::new())
            .await
    );

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "outer:request",
            "inner:request",
            "outer:event:STEP_STARTED",
            "inner:event:STEP_STARTED",
            "inner:response",
            "outer:response",
        ]
    );
}

#[tokio::test]
async fn test_halting_middleware_cancels_before_transport() {
    let transport = ScriptedTransport::new().with_bytes(conversation().build_bytes());
    let mut agent = agent();
    agent.use_middleware(Arc::new(RecordingMiddleware::new("gate").halting()));

    let err = assert_err!(
        agent
            .run(RunAgentParams::new(), &transport, CancellationToken::new())
            .await
    );
    assert!(matches!(err, AgentError::Cancelled { .. }));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_run_with_transport_sends_request() {
    let transport = ScriptedTransport::new().with_chunks(conversation().chunks(3));
    let mut agent = assert_ok!(Agent::builder("http://localhost:8000/agent")
        .bearer_token("secret")
        .timeout_ms(1500)
        .build());

    let params = RunAgentParams::new()
        .with_thread_id("thread-a")
        .with_run_id("run-a")
        .add_user_message("hello");
    let result = assert_ok!(
        agent
            .run(params, &transport, CancellationToken::new())
            .await
    );
    assert!(result.is_some());

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "http://localhost:8000/agent");
    assert_eq!(requests[0].timeout, Duration::from_millis(1500));
    assert_eq!(requests[0].headers["Authorization"], "Bearer secret");
    assert_eq!(requests[0].body["threadId"], "thread-a");
    assert_eq!(requests[0].body["messages"][0]["content"], "hello");
}

#[tokio::test]
async fn test_stream_error_is_terminal_without_middleware() {
    let recorder = RecordingSubscriber::new();
    let transport = ScriptedTransport::new()
        .with_bytes(SseStreamBuilder::new().events(events::text_message("m1", &["partial"])).build_bytes())
        .with_network_error("connection reset");
    let mut agent = agent();
    agent.subscribe(Arc::new(recorder.clone()));

    let err = assert_err!(
        agent
            .run(RunAgentParams::new(), &transport, CancellationToken::new())
            .await
    );
    assert!(matches!(err, AgentError::Network { .. }));
    assert!(recorder.was_called("on_run_failed"));
    // committed mutations are kept
    assert_eq!(agent.messages()[0].content, "partial");
}

#[tokio::test]
async fn test_retry_middleware_suppresses_network_error() {
    let transport = ScriptedTransport::new().failing_open("refused");
    let retry = Arc::new(RetryMiddleware::new(1, 10));
    let mut agent = agent();
    agent.use_middleware(retry.clone());

    let params = RunAgentParams::new().with_run_id("run-r");
    let first = assert_ok!(
        agent
            .run(params.clone(), &transport, CancellationToken::new())
            .await
    );
    assert!(first.is_none());
    assert_eq!(retry.attempts("run-r"), 1);

    let err = assert_err!(
        agent
            .run(params, &transport, CancellationToken::new())
            .await
    );
    assert!(matches!(err, AgentError::Network { .. }));
    assert_eq!(retry.attempts("run-r"), 0);
}

#[tokio::test]
async fn test_cancellation_ends_hanging_stream() {
    let transport = ScriptedTransport::new()
        .with_bytes(SseStreamBuilder::new().event(events::text_message_start("m1")).build_bytes())
        .then_hang();
    let mut agent = agent();
    agent.use_middleware(Arc::new(TimeoutMiddleware::new(5_000)));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = assert_err!(agent.run(RunAgentParams::new(), &transport, cancel).await);
    assert!(matches!(err, AgentError::Cancelled { .. }));
    assert_eq!(agent.messages().len(), 1);
    assert_eq!(agent.reducer().text_buffer("m1"), Some(""));
}

#[tokio::test]
async fn test_state_history_rollback_after_run() {
    let mut agent = assert_ok!(Agent::builder("http://localhost:8000/agent")
        .state(json!({"count": 0}))
        .state_history(5)
        .build());

    let chunks = SseStreamBuilder::new()
        .event(events::state_delta(json!([{"op": "replace", "path": "/count", "value": 1}])))
        .event(events::state_delta(json!([{"op": "replace", "path": "/count", "value": 2}])))
        .chunk_stream(8);
    assert_ok!(
        agent
            .run_stream(RunAgentParams::new(), chunks, CancellationToken::new())
            .await
    );
    assert_json_eq(agent.state(), &json!({"count": 2}));

    assert_ok!(agent.state_store_mut().rollback());
    assert_json_eq(agent.state(), &json!({"count": 1}));
}

#[tokio::test]
async fn test_failing_events_leave_rest_of_stream_applied() {
    let recorder = RecordingSubscriber::new()
        .fail_on(EventType::TextMessageContent)
        .fail_on(EventType::StepStarted);
    let mut agent = agent();
    agent.subscribe(Arc::new(recorder.clone()));

    let chunks = SseStreamBuilder::new()
        .event(events::state_snapshot(json!({"count": 1})))
        .event(events::state_delta(json!([{"op": "replace", "path": "/missing", "value": 2}])))
        .event(events::step_started("plan"))
        .event(events::text_message_start("m1"))
        .event(events::text_message_content("m1", "lost"))
        .event(events::text_message_end("m1"))
        .event(events::tool_call_start("tc1", "search", Some("m1")))
        .event(events::tool_call_start("tc1", "search", Some("m1")))
        .event(events::state_delta(json!([{"op": "replace", "path": "/count", "value": 3}])))
        .event(events::run_finished("thr_1", "run_2", json!("done")))
        .chunk_stream(7);
    let result = assert_ok!(
        agent
            .run_stream(RunAgentParams::new(), chunks, CancellationToken::new())
            .await
    );
    let result = assert_some!(result);

    assert_eq!(result.result, json!("done"));
    assert_json_eq(&result.new_state, &json!({"count": 3}));
    assert_eq!(agent.messages().len(), 1);
    assert_eq!(agent.messages()[0].content, "");
    assert_eq!(agent.messages()[0].tool_calls.len(), 1);
    assert!(recorder.was_called("on_run_finalized"));
    assert!(!recorder.was_called("on_run_failed"));
}
