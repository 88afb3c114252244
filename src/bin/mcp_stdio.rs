use brightsteps_lib::run_mcp_stdio;

/// MCP server over stdio (stdin/stdout), for clients that spawn a process and speak
/// line-delimited JSON-RPC, such as IDE assistants.
///
/// # Example Configuration
///
/// ```json
/// {
///   "mcpServers": {
///     "brightsteps": {
///       "command": "/path/to/mcp-stdio",
///       "args": []
///     }
///   }
/// }
/// ```
///
/// # Environment Variables
///
/// - `BRIGHTSTEPS_LOG`: logging filter (trace, debug, info, warn, error)
/// - `BRIGHTSTEPS_DATA_DIR`: override the data directory location
/// - `OPENAI_API_KEY`: completion API key (name configurable in `config.json`)
#[tokio::main]
async fn main() {
    if let Err(err) = run_mcp_stdio().await {
        eprintln!("[brightsteps::mcp-stdio] runtime failed: {err:?}");
        std::process::exit(1);
    }
}
