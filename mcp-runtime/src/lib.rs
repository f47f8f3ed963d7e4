//! MCP server bridging line-delimited JSON-RPC on stdio to the Excalidraw
//! canvas HTTP service.

pub mod canvas;
pub mod dispatch;
pub mod tools;
mod util;

use std::io;
use std::time::Duration;

use clap::Subcommand;
use excalidraw_core::ElementSynthesizer;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::canvas::{CanvasClient, CanvasError};
use crate::dispatch::{DispatchError, ToolDispatcher};
use crate::tools::tools_list_payload;
use crate::util::{extract_request_id, to_pretty_json};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const DEFAULT_SERVER_NAME: &str = "excalidraw-http";
pub const DEFAULT_CANVAS_URL: &str = "http://127.0.0.1:31337";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the Excalidraw MCP server over stdio
    Serve,
    /// Print the advertised tool registry and exit
    Tools,
}

#[derive(Clone, Debug)]
pub struct McpRuntimeConfig {
    pub canvas_url: String,
    pub timeout: Duration,
    pub server_name: String,
}

impl Default for McpRuntimeConfig {
    fn default() -> Self {
        Self {
            canvas_url: DEFAULT_CANVAS_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            server_name: DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

pub async fn run(config: McpRuntimeConfig, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let server = match McpServer::new(config) {
                Ok(server) => server,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_config_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    return 1;
                }
            };
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": format!("MCP stdio channel failed: {err}"),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(tools_list_payload()));
            0
        }
    }
}

/// Per-session protocol state. Lives exactly as long as its server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    initialized: bool,
}

impl SessionState {
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn mark_initialized(&mut self) {
        self.initialized = true;
    }
}

pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Reserved. Argument problems are reported as tool execution failures.
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const NOT_INITIALIZED: i64 = -32002;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn parse_error() -> Self {
        Self {
            code: codes::PARSE_ERROR,
            message: "Parse error".to_string(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: codes::METHOD_NOT_FOUND,
            message: format!("Unknown method: {method}"),
        }
    }

    fn internal(message: impl std::fmt::Display) -> Self {
        Self {
            code: codes::INTERNAL_ERROR,
            message: format!("Internal error: {message}"),
        }
    }

    fn tool_execution_failed(reason: &DispatchError) -> Self {
        Self {
            code: codes::INTERNAL_ERROR,
            message: format!("Tool execution failed: {reason}"),
        }
    }

    fn not_initialized() -> Self {
        Self {
            code: codes::NOT_INITIALIZED,
            message: "Server not initialized".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum McpMethod {
    Initialize,
    ToolsList,
    ToolsCall,
}

impl McpMethod {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(McpMethod::Initialize),
            "tools/list" => Some(McpMethod::ToolsList),
            "tools/call" => Some(McpMethod::ToolsCall),
            _ => None,
        }
    }
}

pub struct McpServer {
    config: McpRuntimeConfig,
    dispatcher: ToolDispatcher,
    session: SessionState,
    session_id: String,
}

impl McpServer {
    pub fn new(config: McpRuntimeConfig) -> Result<Self, CanvasError> {
        Self::with_synthesizer(config, ElementSynthesizer::default())
    }

    pub fn with_synthesizer(
        config: McpRuntimeConfig,
        synthesizer: ElementSynthesizer,
    ) -> Result<Self, CanvasError> {
        let canvas = CanvasClient::new(&config.canvas_url, config.timeout)?;
        Ok(Self {
            config,
            dispatcher: ToolDispatcher::new(canvas, synthesizer),
            session: SessionState::default(),
            session_id: format!("stdio-{}", Uuid::now_v7()),
        })
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn serve_stdio(self) -> io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Read one request per line until end of input, answering each before
    /// the next is read. Consumes the server so the canvas client is released
    /// on every exit path.
    pub async fn serve<R, W>(mut self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = info_span!("mcp_session", session_id = %self.session_id);
        async move {
            info!(
                canvas_url = self.dispatcher.canvas().base_url(),
                server = %self.config.server_name,
                "mcp session started"
            );
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                let response = self.handle_line(&line).await;
                let mut encoded = serde_json::to_vec(&response)?;
                encoded.push(b'\n');
                writer.write_all(&encoded).await?;
                writer.flush().await?;
            }
            info!("input closed, mcp session ending");
            drop(self);
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Every line gets exactly one response. A blank line does not decode
    /// and is answered with a parse error.
    pub async fn handle_line(&mut self, line: &str) -> Value {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handle_request(&request).await,
            Err(err) => {
                let id = extract_request_id(line);
                warn!(error = %err, id = %id, "undecodable request line");
                error_response(id, RpcError::parse_error())
            }
        }
    }

    pub async fn handle_request(&mut self, request: &Value) -> Value {
        let Some(obj) = request.as_object() else {
            warn!("request is not a JSON object");
            return error_response(
                Value::Null,
                RpcError::internal("request must be a JSON object"),
            );
        };
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        let method = obj.get("method").and_then(Value::as_str);
        debug!(method = method.unwrap_or_default(), id = %id, "mcp request");

        match self.route(method, obj.get("params")).await {
            Ok(result) => success_response(id, result),
            Err(err) => error_response(id, err),
        }
    }

    async fn route(
        &mut self,
        method: Option<&str>,
        params: Option<&Value>,
    ) -> Result<Value, RpcError> {
        let parsed = method.and_then(McpMethod::from_name);
        if parsed != Some(McpMethod::Initialize) && !self.session.is_initialized() {
            return Err(RpcError::not_initialized());
        }
        let Some(parsed) = parsed else {
            return Err(RpcError::method_not_found(method.unwrap_or("null")));
        };

        match parsed {
            McpMethod::Initialize => {
                self.session.mark_initialized();
                Ok(self.initialize_payload())
            }
            McpMethod::ToolsList => Ok(tools_list_payload().clone()),
            McpMethod::ToolsCall => self.handle_tools_call(params).await.map_err(|err| {
                warn!(error = %err, "tool execution failed");
                RpcError::tool_execution_failed(&err)
            }),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.config.server_name,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    async fn handle_tools_call(&self, params: Option<&Value>) -> Result<Value, DispatchError> {
        let empty = Map::new();
        let params = match params {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(DispatchError::InvalidParams),
        };
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or(DispatchError::MissingToolName)?;
        let args = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(DispatchError::InvalidArguments),
        };

        let text = self.dispatcher.call(name, args).await?;
        Ok(json!({
            "content": [
                {
                    "type": "text",
                    "text": text
                }
            ]
        }))
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use excalidraw_core::SequentialIdentity;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn server_for(canvas_url: &str) -> McpServer {
        let config = McpRuntimeConfig {
            canvas_url: canvas_url.to_string(),
            timeout: Duration::from_secs(5),
            ..McpRuntimeConfig::default()
        };
        McpServer::with_synthesizer(
            config,
            ElementSynthesizer::new(Arc::new(SequentialIdentity::new(1_700_000_000_000))),
        )
        .unwrap()
    }

    fn request(id: i64, method: &str, params: Value) -> Value {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
    }

    async fn initialized_server(canvas_url: &str) -> McpServer {
        let mut server = server_for(canvas_url);
        server
            .handle_request(&request(0, "initialize", json!({})))
            .await;
        server
    }

    async fn run_session(server: McpServer, input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_is_idempotent() {
        let mut server = server_for(DEFAULT_CANVAS_URL);
        assert!(!server.session().is_initialized());
        assert!(server.session_id().starts_with("stdio-"));

        let first = server
            .handle_request(&request(1, "initialize", json!({})))
            .await;
        assert_eq!(first["id"], json!(1));
        assert_eq!(first["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(first["result"]["capabilities"], json!({"tools": {}}));
        assert_eq!(first["result"]["serverInfo"]["name"], json!("excalidraw-http"));
        assert!(server.session().is_initialized());

        let second = server
            .handle_request(&request(2, "initialize", json!({})))
            .await;
        assert_eq!(second["result"], first["result"]);
    }

    #[tokio::test]
    async fn methods_before_initialize_are_rejected() {
        let mut server = server_for(DEFAULT_CANVAS_URL);
        for method in ["tools/list", "tools/call", "resources/list"] {
            let response = server.handle_request(&request(3, method, json!({}))).await;
            assert_eq!(response["error"]["code"], json!(-32002));
            assert_eq!(response["error"]["message"], json!("Server not initialized"));
            assert!(response.get("result").is_none());
        }
        assert!(!server.session().is_initialized());
    }

    #[tokio::test]
    async fn unknown_method_after_initialize() {
        let mut server = initialized_server(DEFAULT_CANVAS_URL).await;
        let response = server
            .handle_request(&request(4, "prompts/list", json!({})))
            .await;
        assert_eq!(response["error"]["code"], json!(-32601));
        assert_eq!(response["error"]["message"], json!("Unknown method: prompts/list"));
    }

    #[tokio::test]
    async fn tools_list_is_byte_identical_across_calls() {
        let mut server = initialized_server(DEFAULT_CANVAS_URL).await;
        let first = server.handle_request(&request(5, "tools/list", json!({}))).await;
        let second = server.handle_request(&request(5, "tools/list", json!({}))).await;
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first["result"]["tools"].as_array().unwrap().len(), 11);
    }

    #[tokio::test]
    async fn tool_call_failures_map_to_internal_error() {
        let mut server = initialized_server(DEFAULT_CANVAS_URL).await;

        let unknown = server
            .handle_request(&request(6, "tools/call", json!({"name": "nope"})))
            .await;
        assert_eq!(unknown["error"]["code"], json!(-32603));
        assert_eq!(
            unknown["error"]["message"],
            json!("Tool execution failed: Unknown tool: nope")
        );

        let nameless = server
            .handle_request(&json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call"}))
            .await;
        assert_eq!(nameless["error"]["code"], json!(-32603));

        let bad_args = server
            .handle_request(&request(
                8,
                "tools/call",
                json!({"name": "get_canvas", "arguments": [1, 2]}),
            ))
            .await;
        assert_eq!(bad_args["error"]["code"], json!(-32603));
    }

    #[tokio::test]
    async fn non_object_request_is_an_internal_error() {
        let mut server = server_for(DEFAULT_CANVAS_URL);
        let response = server.handle_request(&json!([1, 2, 3])).await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], json!(-32603));
        assert!(
            response["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Internal error: ")
        );
    }

    #[tokio::test]
    async fn session_loop_survives_bad_lines_in_order() {
        let server = server_for("http://127.0.0.1:9");
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\",\"params\":{}}\n",
            "   \n",
            "{\"jsonrpc\":\"2.0\",\"id\": 7, \"method\": broken\n",
            "{\"id\":\"x\", oops\n",
            "42\n",
            "{\"jsonrpc\":\"2.0\",\"id\":\"b\",\"method\":\"tools/list\"}"
        );

        let responses = run_session(server, input).await;
        assert_eq!(responses.len(), 6);
        assert_eq!(responses[0]["id"], json!(1));
        assert!(responses[0].get("result").is_some());
        assert_eq!(responses[1]["id"], Value::Null);
        assert_eq!(responses[1]["error"]["code"], json!(-32700));
        assert_eq!(responses[2]["id"], json!(7));
        assert_eq!(responses[2]["error"]["code"], json!(-32700));
        assert_eq!(responses[2]["error"]["message"], json!("Parse error"));
        assert_eq!(responses[3]["id"], json!("x"));
        assert_eq!(responses[3]["error"]["code"], json!(-32700));
        assert_eq!(responses[4]["id"], Value::Null);
        assert_eq!(responses[4]["error"]["code"], json!(-32603));
        assert_eq!(responses[5]["id"], json!("b"));
        assert!(responses[5]["result"]["tools"].is_array());
    }

    #[tokio::test]
    async fn empty_line_between_requests_gets_a_parse_error() {
        let server = server_for("http://127.0.0.1:9");
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n"
        );

        let responses = run_session(server, input).await;
        let ids: Vec<Value> = responses.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), Value::Null, json!(2)]);
        assert_eq!(responses[1]["error"]["code"], json!(-32700));
        assert_eq!(responses[1]["error"]["message"], json!("Parse error"));
        assert!(responses[2]["result"]["tools"].is_array());
    }

    #[tokio::test]
    async fn update_app_state_round_trip_through_the_loop() {
        let canvas = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/canvas"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "canvas": {"elements": [], "appState": {"scrollX": 5}, "files": {}}
            })))
            .expect(1)
            .mount(&canvas)
            .await;
        Mock::given(method("PUT"))
            .and(path("/canvas"))
            .and(wiremock::matchers::body_json(json!({
                "elements": [],
                "appState": {"scrollX": 5, "zoom": {"value": 2}},
                "files": {}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&canvas)
            .await;

        let server = server_for(&canvas.uri());
        let call = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {
                "name": "update_app_state",
                "arguments": {"stateUpdates": {"zoom": {"value": 2}}}
            }
        });
        let input = format!(
            "{}\n{}\n",
            request(1, "initialize", json!({})),
            call
        );

        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();
        let raw = String::from_utf8(output).unwrap();
        assert!(raw.contains("✅ App state updated successfully"), "{raw}");

        let response: Value = serde_json::from_str(raw.lines().nth(1).unwrap()).unwrap();
        assert_eq!(response["id"], json!(2));
        assert_eq!(response["result"]["content"][0]["type"], json!("text"));
        assert_eq!(
            response["result"]["content"][0]["text"],
            json!("✅ App state updated successfully\nUpdated fields: zoom")
        );
    }

    #[tokio::test]
    async fn backend_failure_stays_inside_the_tool_result() {
        let canvas = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/canvas/element/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&canvas)
            .await;

        let mut server = initialized_server(&canvas.uri()).await;
        let response = server
            .handle_request(&request(
                9,
                "tools/call",
                json!({"name": "remove_element", "arguments": {"element_id": "missing"}}),
            ))
            .await;
        assert!(response.get("error").is_none());
        assert_eq!(
            response["result"]["content"][0]["text"],
            json!("❌ Element with ID 'missing' not found")
        );
    }
}
