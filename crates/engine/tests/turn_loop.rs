//! End-to-end turn loop tests against a scripted model and in-memory
//! store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use parley_dispatch::{
    Dispatcher, ExecutionMetadata, KeyMaterial, MemoryResourceLookup, MemoryToolRegistry, Secret,
    StaticTool, StaticToolSet,
};
use parley_domain::error::{Error, Result};
use parley_domain::message::{Message, Role};
use parley_domain::stream::StepEvent;
use parley_domain::thread::ThreadDelta;
use parley_domain::tool::ToolCall;
use parley_engine::title::TITLE_INSTRUCTION;
use parley_engine::{CancelToken, ConversationEngine, EngineConfig, ModelInvoker, TurnInput};
use parley_threads::memory::MemoryThreadStore;
use parley_threads::store::ThreadStore;

// ── Fixtures ───────────────────────────────────────────────────────

/// Opt-in log output: `RUST_LOG=debug cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replays a fixed sequence of assistant messages. Title-prompt
/// invocations are answered out of band so they never consume the
/// script.
struct ScriptedInvoker {
    script: Mutex<VecDeque<Message>>,
    title_reply: Option<String>,
    invocations: AtomicUsize,
}

impl ScriptedInvoker {
    fn new(script: Vec<Message>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            title_reply: Some("Scripted Test Thread".into()),
            invocations: AtomicUsize::new(0),
        }
    }

    fn without_title(mut self) -> Self {
        self.title_reply = None;
        self
    }

    fn loop_invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn invoke(&self, messages: &[Message], _tools: &[parley_domain::tool::ToolDefinition]) -> Result<Message> {
        if messages.first().and_then(|m| m.content.text()) == Some(TITLE_INSTRUCTION) {
            return match &self.title_reply {
                Some(title) => Ok(Message::assistant(title.clone())),
                None => Err(Error::ModelInvocation("title model offline".into())),
            };
        }
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .ok_or_else(|| Error::ModelInvocation("script exhausted".into()))
    }
}

struct TestKeys;

impl KeyMaterial for TestKeys {
    fn derive_private_key_material(&self, agent_id: &str) -> Result<Secret> {
        Ok(Secret::new(format!("key:{agent_id}")))
    }
}

/// Echoes its arguments after an optional delay.
struct DelayedEcho(Duration);

#[async_trait::async_trait]
impl StaticTool for DelayedEcho {
    async fn call(&self, arguments: Value, _meta: &ExecutionMetadata) -> Result<Value> {
        tokio::time::sleep(self.0).await;
        Ok(arguments)
    }
}

fn echo_dispatcher() -> Arc<Dispatcher> {
    let mut set = StaticToolSet::new("builtin");
    set.register_fn("echo", |args, _| Ok(args));
    set.register("slow_echo", Arc::new(DelayedEcho(Duration::from_millis(80))));
    Arc::new(Dispatcher::new(
        Arc::new(MemoryToolRegistry::new()),
        Arc::new(MemoryResourceLookup::new()),
        vec![Arc::new(set)],
    ))
}

fn engine(store: Arc<MemoryThreadStore>, invoker: Arc<ScriptedInvoker>) -> ConversationEngine {
    ConversationEngine::new(store, invoker, echo_dispatcher(), Arc::new(TestKeys))
}

fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

fn input(thread_id: &str, new_messages: Vec<Message>) -> TurnInput {
    TurnInput {
        thread_id: thread_id.into(),
        agent_id: "agent-a".into(),
        new_messages,
        persona: None,
        tools: Vec::new(),
    }
}

async fn seed(store: &MemoryThreadStore, thread_id: &str, messages: Vec<Message>) {
    let delta = ThreadDelta {
        messages,
        ..Default::default()
    };
    store.append_and_checkpoint(thread_id, delta).await.unwrap();
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn tool_turn_appends_results_then_final_answer() {
    init_tracing();
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::system("ctx"), Message::user("run echo")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant_with_tools("", vec![call("c1", "echo", json!({"x": 1}))]),
        Message::assistant("done"),
    ]));
    let engine = engine(store.clone(), invoker.clone());

    let outcome = engine.run(input("t1", vec![])).await.unwrap();
    assert_eq!(outcome.final_message.content.text(), Some("done"));
    assert_eq!(outcome.session_id, "t1");

    let state = store.get_latest("t1").await.unwrap();
    // seed system+user, then assistant(tool call), tool result, assistant.
    assert_eq!(state.messages.len(), 5);

    let tool_msg = &state.messages[3];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    let final_msg = &state.messages[4];
    assert_eq!(final_msg.content.text(), Some("done"));

    assert!(state.tool_correlation_holds());
    assert_eq!(state.title.as_deref(), Some("Scripted Test Thread"));
    // One checkpoint for the seed, exactly one for the whole turn.
    assert_eq!(store.checkpoint_count("t1"), 2);
    assert_eq!(invoker.loop_invocations(), 2);
}

#[tokio::test]
async fn tool_results_follow_issue_order_not_completion_order() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("both")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant_with_tools(
            "",
            vec![
                call("c_slow", "slow_echo", json!({"order": 1})),
                call("c_fast", "echo", json!({"order": 2})),
            ],
        ),
        Message::assistant("done"),
    ]));
    let engine = engine(store.clone(), invoker);

    engine.run(input("t1", vec![])).await.unwrap();

    let state = store.get_latest("t1").await.unwrap();
    let tool_ids: Vec<_> = state
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.tool_call_id.clone().unwrap())
        .collect();
    assert_eq!(tool_ids, vec!["c_slow", "c_fast"]);
}

#[tokio::test]
async fn unresolved_tool_becomes_structured_error_and_turn_recovers() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("try it")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant_with_tools("", vec![call("c1", "ghost", json!({}))]),
        Message::assistant("that tool does not exist"),
    ]));
    let engine = engine(store.clone(), invoker);

    let outcome = engine.run(input("t1", vec![])).await.unwrap();
    assert_eq!(
        outcome.final_message.content.text(),
        Some("that tool does not exist")
    );

    let state = store.get_latest("t1").await.unwrap();
    let tool_msg = state
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    let content = match &tool_msg.content {
        parley_domain::message::MessageContent::Json(v) => v.clone(),
        other => panic!("expected json content, got {other:?}"),
    };
    assert_eq!(content["error"]["type"], "tool_not_found");

    // The error is flagged in per-message metadata.
    let meta = &state.metadata[&tool_msg.id];
    assert_eq!(meta["is_error"], json!(true));
    assert_eq!(meta["tool_call_id"], json!("c1"));
}

#[tokio::test]
async fn model_failure_aborts_without_checkpoint() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("hello")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![]));
    let engine = engine(store.clone(), invoker);

    let err = engine
        .run(input("t1", vec![Message::user("again")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModelInvocation(_)));

    // The failed turn left no trace: one seed checkpoint, one message.
    assert_eq!(store.checkpoint_count("t1"), 1);
    let state = store.get_latest("t1").await.unwrap();
    assert_eq!(state.messages.len(), 1);
}

#[tokio::test]
async fn loop_cap_aborts_a_runaway_turn() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("go")]).await;

    let script: Vec<Message> = (0..10)
        .map(|i| {
            Message::assistant_with_tools("", vec![call(&format!("c{i}"), "echo", json!({}))])
        })
        .collect();
    let invoker = Arc::new(ScriptedInvoker::new(script));
    let engine = ConversationEngine::with_config(
        store.clone(),
        invoker.clone(),
        echo_dispatcher(),
        Arc::new(TestKeys),
        EngineConfig { max_tool_loops: 3 },
    );

    let err = engine.run(input("t1", vec![])).await.unwrap_err();
    assert!(matches!(err, Error::Other(_)));
    assert_eq!(invoker.loop_invocations(), 3);
    assert_eq!(store.checkpoint_count("t1"), 1);
}

#[tokio::test]
async fn first_turn_synthesizes_system_context() {
    let store = Arc::new(MemoryThreadStore::new());
    let invoker = Arc::new(ScriptedInvoker::new(vec![Message::assistant("hi")]));
    let engine = engine(store.clone(), invoker);

    let mut turn = input("fresh", vec![Message::user("hello")]);
    turn.persona = Some("Answer briefly.".into());
    engine.run(turn).await.unwrap();

    let state = store.get_latest("fresh").await.unwrap();
    assert_eq!(state.messages[0].role, Role::System);
    let ctx = state.messages[0].content.text().unwrap();
    assert!(ctx.contains("agent-a"));
    assert!(ctx.contains("Answer briefly."));
}

#[tokio::test]
async fn title_set_once_and_not_regenerated() {
    let store = Arc::new(MemoryThreadStore::new());
    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant("first"),
        Message::assistant("second"),
    ]));
    let engine = engine(store.clone(), invoker);

    engine
        .run(input("t1", vec![Message::user("name this")]))
        .await
        .unwrap();
    let state = store.get_latest("t1").await.unwrap();
    assert_eq!(state.title.as_deref(), Some("Scripted Test Thread"));

    // Second turn on a titled thread leaves the title alone.
    engine
        .run(input("t1", vec![Message::user("something else entirely")]))
        .await
        .unwrap();
    let state = store.get_latest("t1").await.unwrap();
    assert_eq!(state.title.as_deref(), Some("Scripted Test Thread"));
}

#[tokio::test]
async fn title_failure_is_not_fatal() {
    let store = Arc::new(MemoryThreadStore::new());
    let invoker =
        Arc::new(ScriptedInvoker::new(vec![Message::assistant("ok")]).without_title());
    let engine = engine(store.clone(), invoker);

    let outcome = engine
        .run(input("t1", vec![Message::user("hello")]))
        .await
        .unwrap();
    assert_eq!(outcome.final_message.content.text(), Some("ok"));

    let state = store.get_latest("t1").await.unwrap();
    assert!(state.title.is_none());
    assert_eq!(store.checkpoint_count("t1"), 1);
}

#[tokio::test]
async fn streaming_emits_events_in_order() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("stream it")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant_with_tools("thinking", vec![call("c1", "echo", json!({"x": 1}))]),
        Message::assistant("done"),
    ]));
    let engine = Arc::new(engine(store.clone(), invoker));

    let mut rx = engine.run_streaming(input("t1", vec![]), CancelToken::new());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            StepEvent::ModelChunk { .. } => "chunk",
            StepEvent::ToolDispatched { .. } => "dispatched",
            StepEvent::ToolCompleted { .. } => "completed",
            StepEvent::TitleSet { .. } => "title",
            StepEvent::TurnCompleted { .. } => "turn",
            StepEvent::Stopped => "stopped",
            StepEvent::Error { .. } => "error",
        })
        .collect();

    // Title generation is concurrent with dispatch, so pin down only
    // the invariant parts of the order.
    assert_eq!(kinds[0], "chunk");
    assert!(kinds.contains(&"dispatched"));
    assert!(kinds.contains(&"title"));
    let completed = kinds.iter().position(|k| *k == "completed").unwrap();
    let dispatched = kinds.iter().position(|k| *k == "dispatched").unwrap();
    assert!(dispatched < completed);
    assert_eq!(*kinds.last().unwrap(), "turn");
}

#[tokio::test]
async fn cancelled_turn_emits_stopped_and_writes_nothing() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("hello")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![Message::assistant("never sent")]));
    let engine = Arc::new(engine(store.clone(), invoker));

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut rx = engine.run_streaming(input("t1", vec![Message::user("more")]), cancel);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.as_slice(), [StepEvent::Stopped]));
    assert_eq!(store.checkpoint_count("t1"), 1);
}

#[tokio::test]
async fn concurrent_runs_on_one_session_serialize() {
    let store = Arc::new(MemoryThreadStore::new());
    seed(&store, "t1", vec![Message::user("start")]).await;

    let invoker = Arc::new(ScriptedInvoker::new(vec![
        Message::assistant("first turn"),
        Message::assistant("second turn"),
    ]));
    let engine = Arc::new(engine(store.clone(), invoker));
    let locks = Arc::new(parley_engine::SessionLockMap::new());

    let mut handles = Vec::new();
    for text in ["one", "two"] {
        let engine = engine.clone();
        let locks = locks.clone();
        handles.push(tokio::spawn(async move {
            let _permit = locks.acquire("t1").await.unwrap();
            engine
                .run(input("t1", vec![Message::user(text)]))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Two complete turns: each appended its user message and reply as
    // one checkpoint, never interleaved.
    assert_eq!(store.checkpoint_count("t1"), 3);
    let state = store.get_latest("t1").await.unwrap();
    assert_eq!(state.messages.len(), 5);
    assert_eq!(state.messages[1].role, Role::User);
    assert_eq!(state.messages[2].role, Role::Assistant);
    assert_eq!(state.messages[3].role, Role::User);
    assert_eq!(state.messages[4].role, Role::Assistant);
}

#[tokio::test]
async fn space_thread_session_comes_from_sessions_map() {
    let store = Arc::new(MemoryThreadStore::new());
    let mut delta = ThreadDelta::with_message(Message::user("hi"));
    delta.sessions.insert("agent-a".into(), "sub-42".into());
    store.append_and_checkpoint("space-1", delta).await.unwrap();

    let invoker = Arc::new(ScriptedInvoker::new(vec![Message::assistant("ok")]));
    let engine = engine(store.clone(), invoker);

    let outcome = engine.run(input("space-1", vec![])).await.unwrap();
    assert_eq!(outcome.session_id, "sub-42");
}
