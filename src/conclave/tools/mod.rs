//! Built-in Tool Implementations
//!
//! Tools are exposed to agents through the [`ToolProtocol`](crate::tool_protocol::ToolProtocol)
//! trait and instantiated by name from configuration by the
//! [`ToolFactory`](crate::tool_provider::ToolFactory).
//!
//! # Available Tools
//!
//! - **FileSystem**: read, write and list files confined to a configured base directory
//!   - Canonical-path containment check against the base directory
//!   - Rejects `../` escapes, symlink escapes, overlong and ambiguous paths
//!   - Failures are reported as text the agent can reason about
//!
//! ```ignore
//! use conclave::tools::FileSystemTool;
//! use conclave::tool_protocol::ToolRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = ToolRegistry::new();
//! registry.add_protocol(Arc::new(FileSystemTool::new("/data")?));
//! ```

pub mod filesystem;

pub use filesystem::{DirectoryEntry, FileSystemError, FileSystemTool};
