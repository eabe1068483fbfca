//! The conversation turn loop.
//!
//! One turn: load the latest thread state, invoke the model, dispatch
//! whatever tool calls it issues (concurrently, results appended in
//! issue order), feed the results back, and repeat until the model
//! answers without tool calls or the loop cap is hit. Exactly one
//! checkpoint is written per completed turn; an aborted or cancelled
//! turn writes nothing.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::Instrument;

use parley_dispatch::{Dispatcher, ExecutionMetadata, KeyMaterial};
use parley_domain::error::{Error, Result};
use parley_domain::message::{Message, Role};
use parley_domain::stream::StepEvent;
use parley_domain::thread::ThreadDelta;
use parley_domain::tool::{ToolCall, ToolDefinition, ToolResult};
use parley_threads::store::ThreadStore;

use crate::cancel::CancelToken;
use crate::invoker::ModelInvoker;
use crate::title;

/// Cap on invoke/dispatch iterations within one turn. A model that keeps
/// issuing tool calls past this point aborts the turn.
pub const MAX_TOOL_LOOPS: usize = 25;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_tool_loops: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_loops: MAX_TOOL_LOOPS,
        }
    }
}

/// Everything one turn needs besides the thread itself.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub thread_id: String,
    pub agent_id: String,
    /// Messages to append before invoking (typically one user message;
    /// empty when re-running against existing context).
    pub new_messages: Vec<Message>,
    /// Persona text folded into the system context on a thread's first turn.
    pub persona: Option<String>,
    /// Tool definitions advertised to the model this turn.
    pub tools: Vec<ToolDefinition>,
}

/// What a completed turn produced, beyond the checkpoint itself.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_message: Message,
    pub updated_metadata: HashMap<String, serde_json::Value>,
    pub session_id: String,
}

pub struct ConversationEngine {
    store: Arc<dyn ThreadStore>,
    invoker: Arc<dyn ModelInvoker>,
    dispatcher: Arc<Dispatcher>,
    keys: Arc<dyn KeyMaterial>,
    config: EngineConfig,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        invoker: Arc<dyn ModelInvoker>,
        dispatcher: Arc<Dispatcher>,
        keys: Arc<dyn KeyMaterial>,
    ) -> Self {
        Self::with_config(store, invoker, dispatcher, keys, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ThreadStore>,
        invoker: Arc<dyn ModelInvoker>,
        dispatcher: Arc<Dispatcher>,
        keys: Arc<dyn KeyMaterial>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            dispatcher,
            keys,
            config,
        }
    }

    /// Run one turn to completion, discarding step events.
    pub async fn run(&self, input: TurnInput) -> Result<TurnOutcome> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let outcome = self.run_inner(input, &tx, &CancelToken::new()).await;
        drop(tx);
        let _ = drain.await;
        outcome
    }

    /// Run one turn, streaming step events to the returned receiver. The
    /// turn runs on a spawned task; a failure surfaces as a terminal
    /// [`StepEvent::Error`] (or [`StepEvent::Stopped`] on cancellation).
    pub fn run_streaming(
        self: &Arc<Self>,
        input: TurnInput,
        cancel: CancelToken,
    ) -> mpsc::Receiver<StepEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.run_inner(input, &tx, &cancel).await {
                Ok(_) => {}
                // Stopped was already emitted at the cancel check.
                Err(Error::Cancelled) => {}
                Err(err) => {
                    let _ = tx
                        .send(StepEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        });
        rx
    }

    async fn run_inner(
        &self,
        input: TurnInput,
        tx: &mpsc::Sender<StepEvent>,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome> {
        let state = self.store.get_latest(&input.thread_id).await?;

        let mut delta = ThreadDelta::default();
        let mut messages = state.messages.clone();

        // The session identity for this turn: space threads record one
        // per agent; a plain thread is its own session.
        let session_id = state
            .sessions
            .get(&input.agent_id)
            .cloned()
            .unwrap_or_else(|| input.thread_id.clone());

        // First turn on a fresh thread synthesizes the system context.
        if messages.is_empty()
            && !input.new_messages.iter().any(|m| m.role == Role::System)
        {
            let system = Message::system(system_context(&input.agent_id, input.persona.as_deref()));
            messages.push(system.clone());
            delta.messages.push(system);
        }

        for msg in &input.new_messages {
            messages.push(msg.clone());
            delta.messages.push(msg.clone());
        }

        // Key material is derived once per turn and rides along in the
        // dispatch metadata. It is never logged.
        let secret = self.keys.derive_private_key_material(&input.agent_id)?;
        let meta = ExecutionMetadata {
            agent_id: Some(input.agent_id.clone()),
            session_id: Some(session_id.clone()),
            values: HashMap::new(),
            secret: Some(secret),
        };

        let mut title_pending = state.title.is_none();

        for loop_idx in 0..self.config.max_tool_loops {
            if cancel.is_cancelled() {
                let _ = tx.send(StepEvent::Stopped).await;
                return Err(Error::Cancelled);
            }

            let assistant = self.invoker.invoke(&messages, &input.tools).await?;
            if let Some(text) = assistant.content.text() {
                if !text.is_empty() {
                    let _ = tx
                        .send(StepEvent::ModelChunk {
                            text: text.to_owned(),
                        })
                        .await;
                }
            }
            messages.push(assistant.clone());
            delta.messages.push(assistant.clone());

            let calls = assistant.tool_calls.clone();
            tracing::debug!(
                thread_id = %input.thread_id,
                loop_idx,
                tool_calls = calls.len(),
                "model invocation settled"
            );

            if cancel.is_cancelled() {
                let _ = tx.send(StepEvent::Stopped).await;
                return Err(Error::Cancelled);
            }

            // Tool dispatch and title generation run concurrently; the
            // title is a side channel and never blocks tool results.
            let (results, generated_title) = tokio::join!(
                self.dispatch_batch(&calls, &meta, tx),
                async {
                    if title_pending {
                        title::generate_title(self.invoker.as_ref(), &messages).await
                    } else {
                        None
                    }
                }
            );
            if let Some(new_title) = generated_title {
                title_pending = false;
                let _ = tx
                    .send(StepEvent::TitleSet {
                        title: new_title.clone(),
                    })
                    .await;
                delta.title = Some(new_title);
            }

            if calls.is_empty() {
                let updated_metadata = delta.metadata.clone();
                self.store
                    .append_and_checkpoint(&input.thread_id, delta)
                    .await?;
                let _ = tx
                    .send(StepEvent::TurnCompleted {
                        message_id: assistant.id.clone(),
                        session_id: session_id.clone(),
                    })
                    .await;
                return Ok(TurnOutcome {
                    final_message: assistant,
                    updated_metadata,
                    session_id,
                });
            }

            // Results are appended in the order the calls were issued,
            // regardless of completion order.
            for result in results {
                let msg = Message::tool_result(&result);
                if result.is_error {
                    delta.metadata.insert(
                        msg.id.clone(),
                        serde_json::json!({
                            "tool_call_id": result.tool_call_id,
                            "is_error": true,
                        }),
                    );
                }
                messages.push(msg.clone());
                delta.messages.push(msg);
            }
        }

        Err(Error::Other(format!(
            "turn exceeded {} tool loops on thread {}",
            self.config.max_tool_loops, input.thread_id
        )))
    }

    /// Dispatch a batch of tool calls concurrently. Every call settles to
    /// a [`ToolResult`]; failures become structured error results the
    /// model can react to on the next iteration.
    async fn dispatch_batch(
        &self,
        calls: &[ToolCall],
        meta: &ExecutionMetadata,
        tx: &mpsc::Sender<StepEvent>,
    ) -> Vec<ToolResult> {
        if calls.is_empty() {
            return Vec::new();
        }

        for call in calls {
            let _ = tx
                .send(StepEvent::ToolDispatched {
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;
        }

        let futures = calls.iter().map(|call| {
            let span = tracing::info_span!("tool.dispatch", tool = %call.name);
            async move { self.dispatcher.dispatch(&call.name, &call.arguments, meta).await }
                .instrument(span)
        });
        let settled = join_all(futures).await;

        let mut results = Vec::with_capacity(calls.len());
        for (call, outcome) in calls.iter().zip(settled) {
            let result = match outcome {
                Ok(content) => {
                    let _ = tx
                        .send(StepEvent::ToolCompleted {
                            call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            content: content.clone(),
                            is_error: false,
                        })
                        .await;
                    ToolResult::ok(&call.id, content)
                }
                Err(err) => {
                    tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                    let result = ToolResult::error(&call.id, &err);
                    let _ = tx
                        .send(StepEvent::ToolCompleted {
                            call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            content: result.content.clone(),
                            is_error: true,
                        })
                        .await;
                    result
                }
            };
            results.push(result);
        }
        results
    }
}

fn system_context(agent_id: &str, persona: Option<&str>) -> String {
    match persona {
        Some(persona) => format!("You are {agent_id}. {persona}"),
        None => format!("You are {agent_id}."),
    }
}
