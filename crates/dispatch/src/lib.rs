//! Tool dispatch for the Parley orchestration core.
//!
//! [`Dispatcher::dispatch`] resolves a tool-call name to a result by
//! trying, in order: a registered spec tool, a static binding, and a
//! resource-linked spec tool. Spec tools execute as HTTP requests built
//! from `{key}` templates; static tools are explicit name→handler maps
//! injected at startup.

pub mod bindings;
pub mod dispatcher;
pub mod http;
pub mod metadata;
pub mod registry;
pub mod template;

pub use bindings::{StaticTool, StaticToolSet};
pub use dispatcher::{Dispatcher, RESOURCE_TOOL_PREFIX};
pub use metadata::{ExecutionMetadata, KeyMaterial, Secret};
pub use registry::{MemoryResourceLookup, MemoryToolRegistry, ResourceLookup, ResourceRecord, ToolRegistry};
