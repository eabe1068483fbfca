//! Turn-taking for shared (multi-member) threads.
//!
//! A space thread is keyed by its space id and holds the shared
//! transcript plus a `sessions` map of agent id → private sub-thread.
//! When a message lands, the router appends it, then runs a bounded
//! nomination cycle: a classifier picks the next responder from the
//! space's recent context, the nominee's agent runs a turn on its own
//! sub-thread with the messages it has not yet seen this cycle, and the
//! reply is appended back to the shared thread tagged `agent:<id>`. The
//! cycle ends when the classifier declines, a nominee cannot run, or the
//! turn cap is hit.
//!
//! Membership and write permission are checked before anything mutates;
//! sub-threads are provisioned by the membership layer when an agent
//! joins, so a nominee with no `sessions` entry is skipped rather than
//! run against a thread it was never given.

use std::collections::HashMap;
use std::sync::Arc;

use parley_domain::error::{Error, Result};
use parley_domain::message::Message;
use parley_domain::space::{MemberType, SpaceMember};
use parley_domain::thread::ThreadDelta;
use parley_domain::tool::ToolDefinition;
use parley_threads::store::ThreadStore;

use crate::session_lock::SessionLockMap;
use crate::turn::{ConversationEngine, TurnInput};

/// How many trailing shared-thread messages the classifier sees.
pub const ROUTER_CONTEXT_MESSAGES: usize = 20;

/// Default cap on agent replies per inbound message.
pub const DEFAULT_MAX_AGENT_TURNS: usize = 4;

/// Picks which agent member (if any) should respond next. `None` means
/// the conversation rests with the humans.
#[async_trait::async_trait]
pub trait RouteClassifier: Send + Sync {
    async fn select_responder(
        &self,
        recent: &[Message],
        members: &[SpaceMember],
    ) -> Result<Option<String>>;
}

/// Membership and permission checks, owned by an external collaborator.
#[async_trait::async_trait]
pub trait Membership: Send + Sync {
    async fn is_member(&self, space_id: &str, member_id: &str) -> Result<bool>;
    async fn has_write_permission(&self, space_id: &str, member_id: &str) -> Result<bool>;
    async fn members(&self, space_id: &str) -> Result<Vec<SpaceMember>>;
}

/// Per-agent turn configuration handed to the engine.
#[derive(Debug, Clone, Default)]
pub struct AgentProfile {
    pub persona: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

/// What one routing cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub agent_turns: usize,
    pub stopped_by_limit: bool,
}

pub struct SpaceRouter {
    store: Arc<dyn ThreadStore>,
    engine: Arc<ConversationEngine>,
    classifier: Arc<dyn RouteClassifier>,
    membership: Arc<dyn Membership>,
    locks: Arc<SessionLockMap>,
    profiles: HashMap<String, AgentProfile>,
    max_agent_turns: usize,
}

pub struct SpaceRouterBuilder {
    router: SpaceRouter,
}

impl SpaceRouterBuilder {
    pub fn profile(mut self, agent_id: impl Into<String>, profile: AgentProfile) -> Self {
        self.router.profiles.insert(agent_id.into(), profile);
        self
    }

    pub fn max_agent_turns(mut self, cap: usize) -> Self {
        self.router.max_agent_turns = cap;
        self
    }

    pub fn build(self) -> SpaceRouter {
        self.router
    }
}

impl SpaceRouter {
    pub fn builder(
        store: Arc<dyn ThreadStore>,
        engine: Arc<ConversationEngine>,
        classifier: Arc<dyn RouteClassifier>,
        membership: Arc<dyn Membership>,
    ) -> SpaceRouterBuilder {
        SpaceRouterBuilder {
            router: SpaceRouter {
                store,
                engine,
                classifier,
                membership,
                locks: Arc::new(SessionLockMap::new()),
                profiles: HashMap::new(),
                max_agent_turns: DEFAULT_MAX_AGENT_TURNS,
            },
        }
    }

    /// Handle one inbound message on a space thread.
    ///
    /// The sender is taken from `message.name`; a message without one, or
    /// from a non-member or read-only member, is rejected before any
    /// mutation.
    pub async fn on_message(&self, space_id: &str, message: Message) -> Result<RouteSummary> {
        let sender = message
            .name
            .clone()
            .ok_or_else(|| Error::MembershipDenied("message has no sender".into()))?;

        if !self.membership.is_member(space_id, &sender).await? {
            return Err(Error::MembershipDenied(format!(
                "{sender} is not a member of space {space_id}"
            )));
        }
        if !self.membership.has_write_permission(space_id, &sender).await? {
            return Err(Error::MembershipDenied(format!(
                "{sender} cannot write to space {space_id}"
            )));
        }

        self.store
            .append_and_checkpoint(space_id, ThreadDelta::with_message(message.clone()))
            .await?;

        let members = self.membership.members(space_id).await?;

        // Messages produced this cycle, plus the inbound one. Each agent
        // is handed only what it has not seen yet, minus its own replies.
        let mut cycle_log: Vec<Message> = vec![message];
        let mut delivered: HashMap<String, usize> = HashMap::new();
        let mut agent_turns = 0;

        loop {
            if agent_turns >= self.max_agent_turns {
                tracing::info!(space_id, agent_turns, "routing cycle hit the turn cap");
                return Ok(RouteSummary {
                    agent_turns,
                    stopped_by_limit: true,
                });
            }

            let state = self.store.get_latest(space_id).await?;
            let recent = state.recent_messages(ROUTER_CONTEXT_MESSAGES);

            let nominee = self
                .classifier
                .select_responder(recent, &members)
                .await?;
            let Some(agent_id) = nominee else { break };

            let is_agent_member = members
                .iter()
                .any(|m| m.member_id == agent_id && m.member_type == MemberType::Agent);
            if !is_agent_member {
                tracing::warn!(space_id, nominee = %agent_id, "classifier nominated a non-agent, ending cycle");
                break;
            }

            let Some(sub_thread) = state.sessions.get(&agent_id).cloned() else {
                tracing::debug!(space_id, agent = %agent_id, "nominee has no sub-session, skipping");
                break;
            };

            let author_tag = format!("agent:{agent_id}");
            let seen = delivered.get(&agent_id).copied().unwrap_or(0);
            let new_messages: Vec<Message> = cycle_log[seen..]
                .iter()
                .filter(|m| m.name.as_deref() != Some(author_tag.as_str()))
                .cloned()
                .collect();
            delivered.insert(agent_id.clone(), cycle_log.len());

            let profile = self.profiles.get(&agent_id).cloned().unwrap_or_default();
            let input = TurnInput {
                thread_id: sub_thread.clone(),
                agent_id: agent_id.clone(),
                new_messages,
                persona: profile.persona,
                tools: profile.tools,
            };

            let outcome = {
                let _permit = self
                    .locks
                    .acquire(&sub_thread)
                    .await
                    .map_err(|e| Error::Other(e.to_string()))?;
                self.engine.run(input).await?
            };

            let reply = outcome.final_message.clone().with_name(&author_tag);
            let mut delta = ThreadDelta::with_message(reply.clone());
            delta
                .sessions
                .insert(agent_id.clone(), outcome.session_id.clone());
            self.store.append_and_checkpoint(space_id, delta).await?;

            cycle_log.push(reply);
            agent_turns += 1;
        }

        Ok(RouteSummary {
            agent_turns,
            stopped_by_limit: false,
        })
    }
}
