use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::task;
use tracing::{debug, error, info};

use crate::{
    application::{
        dtos::{AskRequest, IngestDocumentRequest},
        RagService,
    },
    domain::DomainError,
};

const INSTRUCTIONS: &str = r#"Brightsteps answers questions about child development from an indexed knowledge base of guidance documents.

- Call answer_question with the parent's question. Use mode "strict" (default) when the answer must come only from the indexed documents; use "augmented" to let the model add general knowledge.
- The result carries `text`, the `contexts` it was grounded on, and `error` when a stage failed. Quote the contexts' sources when relaying an answer.
- Call ingest_document to add or replace a document (plain-text pages). Re-ingesting the same source replaces it.
- Call health to check that the knowledge base is reachable."#;

#[derive(Clone)]
pub struct BrightstepsMcpServer {
    service: Arc<RagService>,
    tool_router: ToolRouter<Self>,
}

impl BrightstepsMcpServer {
    pub fn new(service: Arc<RagService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    async fn ask(&self, payload: AskRequest) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let answer = task::spawn_blocking(move || service.ask(payload))
            .await
            .map_err(|err| internal_error(err.to_string()))?;

        let failed = answer.is_error();
        let value = serde_json::to_value(answer).map_err(|err| internal_error(err.to_string()))?;
        let mut result = CallToolResult::structured(value);
        result.is_error = Some(failed);
        Ok(result)
    }

    async fn ingest(&self, payload: IngestDocumentRequest) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let summary = task::spawn_blocking(move || service.ingest_document(payload))
            .await
            .map_err(|err| internal_error(err.to_string()))?
            .map_err(map_domain_error)?;

        let value = serde_json::to_value(summary).map_err(|err| internal_error(err.to_string()))?;
        Ok(CallToolResult::structured(value))
    }

    async fn check_health(&self) -> Result<CallToolResult, McpError> {
        let service = Arc::clone(&self.service);
        let status = task::spawn_blocking(move || service.health())
            .await
            .map_err(|err| internal_error(err.to_string()))?
            .map_err(map_domain_error)?;

        let value = serde_json::to_value(status).map_err(|err| internal_error(err.to_string()))?;
        Ok(CallToolResult::structured(value))
    }
}

#[tool_router]
impl BrightstepsMcpServer {
    #[tool(
        name = "answer_question",
        description = "Answer a child-development question from the knowledge base (mode: strict or augmented)."
    )]
    async fn answer_question(
        &self,
        Parameters(payload): Parameters<AskRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.ask(payload).await
    }

    #[tool(
        name = "ingest_document",
        description = "Add or replace a plain-text document in the knowledge base."
    )]
    async fn ingest_document(
        &self,
        Parameters(payload): Parameters<IngestDocumentRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.ingest(payload).await
    }

    #[tool(name = "health", description = "Report knowledge-base and model readiness.")]
    async fn health(&self) -> Result<CallToolResult, McpError> {
        self.check_health().await
    }
}

impl ServerHandler for BrightstepsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "brightsteps-mcp".into(),
                title: Some("Brightsteps Guidance Assistant".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.into()),
        }
    }
}

fn map_domain_error(err: DomainError) -> McpError {
    match err {
        DomainError::Validation(msg) => {
            McpError::invalid_params("invalid request", Some(json!({ "detail": msg })))
        }
        DomainError::NotFound(msg) => {
            McpError::resource_not_found("not found", Some(json!({ "detail": msg })))
        }
        other @ (DomainError::Expansion(_)
        | DomainError::Retrieval(_)
        | DomainError::Synthesis(_)) => McpError::internal_error(
            "pipeline stage failed",
            Some(json!({ "detail": other.to_string() })),
        ),
        DomainError::Embedding(msg) | DomainError::Storage(msg) | DomainError::Other(msg) => {
            McpError::internal_error("internal error", Some(json!({ "detail": msg })))
        }
    }
}

fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(
        "internal MCP server error",
        Some(json!({ "detail": message.into() })),
    )
}

/// Run the MCP server over stdio: one JSON-RPC message per line on stdin, one
/// response per line on stdout.
pub async fn run_mcp_stdio_server(service: Arc<RagService>) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    info!(target: "brightsteps::mcp", "starting MCP stdio server");

    let server = BrightstepsMcpServer::new(service);
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                info!(target: "brightsteps::mcp", "client closed stdio connection");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(target: "brightsteps::mcp", "received: {}", trimmed);

                let response = match serde_json::from_str::<Value>(trimmed) {
                    Ok(request) => handle_jsonrpc_request(&server, request).await,
                    Err(e) => {
                        error!(
                            target: "brightsteps::mcp",
                            "failed to parse JSON-RPC request: {}", e
                        );
                        Some(json!({
                            "jsonrpc": "2.0",
                            "id": Value::Null,
                            "error": { "code": -32700, "message": format!("Parse error: {}", e) }
                        }))
                    }
                };

                // Notifications get no reply.
                let Some(response) = response else {
                    continue;
                };

                let mut payload = response.to_string();
                payload.push('\n');
                if let Err(e) = stdout.write_all(payload.as_bytes()).await {
                    error!(target: "brightsteps::mcp", "failed to write response: {}", e);
                    break;
                }
                if let Err(e) = stdout.flush().await {
                    error!(target: "brightsteps::mcp", "failed to flush stdout: {}", e);
                    break;
                }

                debug!(target: "brightsteps::mcp", "sent: {}", payload.trim_end());
            }
            Err(e) => {
                error!(target: "brightsteps::mcp", "failed to read from stdin: {}", e);
                break;
            }
        }
    }

    info!(target: "brightsteps::mcp", "MCP stdio server terminated");
    Ok(())
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, McpError> {
    serde_json::from_value(arguments).map_err(|e| {
        McpError::invalid_params(
            format!("Invalid {tool} arguments"),
            Some(json!({ "detail": e.to_string() })),
        )
    })
}

/// Dispatches one JSON-RPC message. Returns `None` for notifications.
async fn handle_jsonrpc_request(server: &BrightstepsMcpServer, request: Value) -> Option<Value> {
    let id = request.get("id").cloned()?;
    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

    let outcome: Result<Value, McpError> = match method {
        "initialize" => {
            let info = server.get_info();
            Ok(json!({
                "protocolVersion": info.protocol_version,
                "capabilities": info.capabilities,
                "serverInfo": info.server_info,
                "instructions": info.instructions
            }))
        }
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": server.tool_router.list_all() })),
        "tools/call" => match request.get("params") {
            Some(params) => {
                let tool_name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

                let result = match tool_name {
                    "answer_question" => match parse_arguments(tool_name, arguments) {
                        Ok(req) => server.ask(req).await,
                        Err(e) => Err(e),
                    },
                    "ingest_document" => match parse_arguments(tool_name, arguments) {
                        Ok(req) => server.ingest(req).await,
                        Err(e) => Err(e),
                    },
                    "health" => server.check_health().await,
                    _ => Err(McpError::invalid_params(
                        format!("Unknown tool: {}", tool_name),
                        None,
                    )),
                };

                result.and_then(|result| {
                    serde_json::to_value(result).map_err(|err| internal_error(err.to_string()))
                })
            }
            None => Err(McpError::invalid_params("Invalid params", None)),
        },
        _ => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {}", method) }
            }))
        }
    };

    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(e) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": e.code, "message": e.message, "data": e.data }
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::{hit, FakeEmbedder, FakeLlm, FakeStore};
    use crate::application::services::ServiceConfig;
    use rmcp::model::ErrorCode;

    fn server(store: FakeStore, llm: FakeLlm) -> BrightstepsMcpServer {
        let service = RagService::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(store),
            Arc::new(llm),
            ServiceConfig::with_model("fake"),
        )
        .unwrap();
        BrightstepsMcpServer::new(Arc::new(service))
    }

    #[tokio::test]
    async fn lists_the_three_tools() {
        let server = server(FakeStore::default(), FakeLlm::default());
        let response = handle_jsonrpc_request(
            &server,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await
        .unwrap();

        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert!(names.contains(&"answer_question"));
        assert!(names.contains(&"ingest_document"));
        assert!(names.contains(&"health"));
    }

    #[tokio::test]
    async fn answer_question_returns_structured_answer() {
        let store = FakeStore::default().respond(
            "When do babies crawl?",
            vec![hit("Most babies crawl by 9 months.", "milestones.pdf", 4, 0.9)],
        );
        let llm = FakeLlm::scripted([
            Ok("At what age do infants crawl?, When does crawling start?".to_string()),
            Ok("Around 9 months.".to_string()),
        ]);
        let server = server(store, llm);

        let response = handle_jsonrpc_request(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": "q1",
                "method": "tools/call",
                "params": {
                    "name": "answer_question",
                    "arguments": {"question": "When do babies crawl?", "mode": "strict"}
                }
            }),
        )
        .await
        .unwrap();

        let result = &response["result"];
        assert_eq!(response["id"], "q1");
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["text"], "Around 9 months.");
        assert_eq!(
            result["structuredContent"]["contexts"][0],
            "Most babies crawl by 9 months."
        );
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported() {
        let server = server(FakeStore::default(), FakeLlm::default());
        let response = handle_jsonrpc_request(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "answer_question", "arguments": {"mode": "loud"}}
            }),
        )
        .await
        .unwrap();

        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn notifications_and_unknown_methods() {
        let server = server(FakeStore::default(), FakeLlm::default());

        let silent = handle_jsonrpc_request(
            &server,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert!(silent.is_none());

        let unknown = handle_jsonrpc_request(
            &server,
            json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}),
        )
        .await
        .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);
    }

    #[test]
    fn domain_errors_map_to_protocol_errors() {
        let invalid = map_domain_error(DomainError::validation("question cannot be empty"));
        assert_eq!(invalid.code, ErrorCode::INVALID_PARAMS);

        let missing = map_domain_error(DomainError::not_found("no chunks stored"));
        assert_eq!(missing.code, ErrorCode::RESOURCE_NOT_FOUND);

        let stage = map_domain_error(DomainError::synthesis("timed out"));
        assert_eq!(stage.code, ErrorCode::INTERNAL_ERROR);
        assert!(stage.data.unwrap()["detail"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }
}
