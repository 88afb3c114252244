// Interfaces exposed by optional adapters (e.g., MCP servers).
//
// Each submodule should be feature-gated by the capability it implements.
#[cfg(feature = "mcp-server")]
pub mod mcp;
