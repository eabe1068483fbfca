//! Static tool bindings.
//!
//! The source system resolved static tools by probing service singletons
//! for a member matching the call name. Here bindings are explicit: each
//! [`StaticToolSet`] is a name→handler map built at startup, and the
//! dispatcher scans an injected, ordered list of sets; first match wins.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use parley_domain::error::Result;

use crate::metadata::ExecutionMetadata;

/// A callable tool bound in process.
#[async_trait::async_trait]
pub trait StaticTool: Send + Sync {
    async fn call(&self, arguments: Value, meta: &ExecutionMetadata) -> Result<Value>;
}

/// One named group of static bindings (the analogue of a service object).
pub struct StaticToolSet {
    label: String,
    tools: HashMap<String, Arc<dyn StaticTool>>,
}

impl StaticToolSet {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tools: HashMap::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register a handler under a tool name. Re-registering a name
    /// replaces the previous handler.
    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn StaticTool>) -> &mut Self {
        self.tools.insert(name.into(), tool);
        self
    }

    /// Register a synchronous closure as a tool.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value, &ExecutionMetadata) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnTool { f: Box::new(f) }))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StaticTool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

struct FnTool {
    #[allow(clippy::type_complexity)]
    f: Box<dyn Fn(Value, &ExecutionMetadata) -> Result<Value> + Send + Sync>,
}

#[async_trait::async_trait]
impl StaticTool for FnTool {
    async fn call(&self, arguments: Value, meta: &ExecutionMetadata) -> Result<Value> {
        (self.f)(arguments, meta)
    }
}
