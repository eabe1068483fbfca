//! Execution metadata passed to every tool invocation.
//!
//! The caller merges secret key material into the metadata before
//! dispatch, so everything here is treated as sensitive: `Secret` redacts
//! itself in `Debug` and `Display`, and `ExecutionMetadata`'s `Debug`
//! prints value keys only. Nothing in this crate logs metadata contents.

use std::collections::HashMap;
use std::fmt;

use parley_domain::error::Result;

/// Key material derived from an agent's identity. The raw bytes are only
/// reachable through [`Secret::expose`].
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw secret. Callers must not log the returned value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Derives per-agent secret material (external collaborator; the wallet
/// derivation itself is out of scope).
pub trait KeyMaterial: Send + Sync {
    fn derive_private_key_material(&self, agent_id: &str) -> Result<Secret>;
}

/// Context handed to every tool invocation, static and spec alike.
#[derive(Clone, Default)]
pub struct ExecutionMetadata {
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub values: HashMap<String, serde_json::Value>,
    /// Agent key material merged in by the caller before dispatch.
    pub secret: Option<Secret>,
}

impl ExecutionMetadata {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            ..Default::default()
        }
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }
}

impl fmt::Debug for ExecutionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionMetadata")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .field("value_keys", &self.values.keys().collect::<Vec<_>>())
            .field("secret", &self.secret)
            .finish()
    }
}
