//! Tool abstraction for the capabilities exposed to a calling agent.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use builtin::register_builtin;
pub use registry::ToolRegistry;
pub use tool::*;
