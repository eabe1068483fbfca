//! Tool-call resolution and execution.
//!
//! Resolution tries three strategies in order; the first match wins, and
//! a "found but malformed" definition does not fall through to the next
//! strategy:
//!
//! 1. registered spec tool: a registry hit with an API spec dispatches
//!    over HTTP; a hit without one falls back to a static binding of the
//!    same name, or fails `ToolMisconfigured`;
//! 2. static binding: the injected tool sets are scanned in order;
//! 3. resource-linked tool: `resourceTool_<id>` loads the resource and
//!    dispatches its attached spec.

use std::sync::Arc;

use serde_json::Value;

use parley_domain::error::{Error, Result};

use crate::bindings::{StaticTool, StaticToolSet};
use crate::http::dispatch_spec;
use crate::metadata::ExecutionMetadata;
use crate::registry::{ResourceLookup, ToolRegistry};

/// Call names of the form `resourceTool_<resourceId>` resolve through the
/// resource lookup.
pub const RESOURCE_TOOL_PREFIX: &str = "resourceTool_";

pub struct Dispatcher {
    registry: Arc<dyn ToolRegistry>,
    resources: Arc<dyn ResourceLookup>,
    bindings: Vec<Arc<StaticToolSet>>,
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn ToolRegistry>,
        resources: Arc<dyn ResourceLookup>,
        bindings: Vec<Arc<StaticToolSet>>,
    ) -> Self {
        Self {
            registry,
            resources,
            bindings,
            client: reqwest::Client::new(),
        }
    }

    /// First static binding matching `name`, scanning sets in order.
    fn find_binding(&self, name: &str) -> Option<Arc<dyn StaticTool>> {
        self.bindings.iter().find_map(|set| set.get(name))
    }

    /// Resolve and execute one tool call.
    ///
    /// `meta` is sensitive (it carries agent key material merged in by
    /// the caller) and is never logged here.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &Value,
        meta: &ExecutionMetadata,
    ) -> Result<Value> {
        // 1. Registered spec tool.
        if let Some(def) = self.registry.get_tool_by_name(name).await? {
            match def.api_spec() {
                Some(spec) => {
                    return dispatch_spec(&self.client, name, spec, arguments).await;
                }
                None => {
                    if let Some(tool) = self.find_binding(name) {
                        tracing::debug!(tool = name, "dispatching static binding (via registry)");
                        return tool.call(arguments.clone(), meta).await;
                    }
                    return Err(Error::ToolMisconfigured {
                        name: name.to_owned(),
                        reason: "registered without an api spec or static binding".into(),
                    });
                }
            }
        }

        // 2. Static binding.
        if let Some(tool) = self.find_binding(name) {
            tracing::debug!(tool = name, "dispatching static binding");
            return tool.call(arguments.clone(), meta).await;
        }

        // 3. Resource-linked tool.
        if let Some(resource_id) = name.strip_prefix(RESOURCE_TOOL_PREFIX) {
            return match self.resources.get_resource_by_id(resource_id).await? {
                Some(resource) => match &resource.api_spec {
                    Some(spec) => dispatch_spec(&self.client, name, spec, arguments).await,
                    None => Err(Error::ToolMisconfigured {
                        name: name.to_owned(),
                        reason: format!("resource {resource_id} has no api spec"),
                    }),
                },
                None => Err(Error::ToolNotFound(name.to_owned())),
            };
        }

        Err(Error::ToolNotFound(name.to_owned()))
    }
}
