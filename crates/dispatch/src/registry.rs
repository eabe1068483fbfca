//! Consumed lookup contracts: the tool registry and resource lookup are
//! owned by the excluded CRUD layer; the dispatcher only reads them.

use std::collections::HashMap;

use parking_lot::RwLock;

use parley_domain::error::Result;
use parley_domain::tool::{ApiSpec, ToolDefinition};

/// Looks up independently registered tool definitions by name.
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn get_tool_by_name(&self, name: &str) -> Result<Option<ToolDefinition>>;
}

/// A resource record that may carry an attached API spec.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: String,
    pub api_spec: Option<ApiSpec>,
}

/// Looks up resource records for `resourceTool_<id>` calls.
#[async_trait::async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn get_resource_by_id(&self, id: &str) -> Result<Option<ResourceRecord>>;
}

// ── In-memory implementations ──────────────────────────────────────
// Used by tests and by embedders that keep definitions in process.

#[derive(Default)]
pub struct MemoryToolRegistry {
    tools: RwLock<HashMap<String, ToolDefinition>>,
}

impl MemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, def: ToolDefinition) {
        self.tools.write().insert(def.name().to_owned(), def);
    }
}

#[async_trait::async_trait]
impl ToolRegistry for MemoryToolRegistry {
    async fn get_tool_by_name(&self, name: &str) -> Result<Option<ToolDefinition>> {
        Ok(self.tools.read().get(name).cloned())
    }
}

#[derive(Default)]
pub struct MemoryResourceLookup {
    resources: RwLock<HashMap<String, ResourceRecord>>,
}

impl MemoryResourceLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ResourceRecord) {
        self.resources.write().insert(record.id.clone(), record);
    }
}

#[async_trait::async_trait]
impl ResourceLookup for MemoryResourceLookup {
    async fn get_resource_by_id(&self, id: &str) -> Result<Option<ResourceRecord>> {
        Ok(self.resources.read().get(id).cloned())
    }
}
