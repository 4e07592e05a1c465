//! Per-session protocol engine.
//!
//! Owns the tools registered for one session and answers JSON-RPC messages
//! for it. The engine knows nothing about HTTP; it is bound to a session
//! transport exactly once and pushes log notifications through it.

use rmcp::model::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{debug, info, instrument, warn};

use crate::core::transport::jsonrpc::{
    InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
};
use crate::domains::tools::{ToolEntry, ToolError};

/// Protocol revisions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Severity of a `notifications/message` log entry, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// Where an engine sends server-initiated notifications.
pub trait NotificationSink: Send + Sync {
    /// Deliver `notification`; `false` when nobody is listening.
    fn send(&self, notification: JsonRpcNotification) -> bool;
}

/// What the server reports about itself during `initialize`.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

/// Client details captured from `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingInitialize,
    Ready,
}

#[derive(Debug)]
struct EngineState {
    phase: Phase,
    protocol_version: Option<String>,
    client: Option<ClientInfo>,
    log_level: LogLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    client_info: Option<ClientInfo>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SetLevelParams {
    level: LogLevel,
}

/// JSON-RPC method dispatch for one session.
pub struct ProtocolEngine {
    identity: ServerIdentity,
    tools: Vec<ToolEntry>,
    state: Mutex<EngineState>,
    notifications: OnceLock<Arc<dyn NotificationSink>>,
}

impl ProtocolEngine {
    /// Create an engine with no tools.
    pub fn new(identity: ServerIdentity) -> Self {
        Self {
            identity,
            tools: Vec::new(),
            state: Mutex::new(EngineState {
                phase: Phase::AwaitingInitialize,
                protocol_version: None,
                client: None,
                log_level: LogLevel::Info,
            }),
            notifications: OnceLock::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register_tool(&mut self, entry: ToolEntry) {
        match self.tools.iter_mut().find(|t| t.name() == entry.name()) {
            Some(existing) => *existing = entry,
            None => self.tools.push(entry),
        }
    }

    /// Tools visible to `tools/list`.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|entry| entry.tool.clone()).collect()
    }

    /// Whether `initialize` has completed.
    pub fn is_initialized(&self) -> bool {
        self.state().phase == Phase::Ready
    }

    /// Negotiated protocol revision.
    pub fn protocol_version(&self) -> Option<String> {
        self.state().protocol_version.clone()
    }

    /// Client reported in `initialize`.
    pub fn client(&self) -> Option<ClientInfo> {
        self.state().client.clone()
    }

    /// Minimum level forwarded as `notifications/message`.
    pub fn log_level(&self) -> LogLevel {
        self.state().log_level
    }

    /// Attach the notification channel. Returns `false` if one was already attached.
    pub fn bind_notifications(&self, sink: Arc<dyn NotificationSink>) -> bool {
        self.notifications.set(sink).is_ok()
    }

    /// Emit a log notification to the client if `level` passes the session filter.
    pub fn notify_log(&self, level: LogLevel, data: Value) -> bool {
        if level < self.log_level() {
            return false;
        }
        let Some(sink) = self.notifications.get() else {
            return false;
        };
        let params = json!({
            "level": level,
            "logger": self.identity.name,
            "data": data,
        });
        sink.send(JsonRpcNotification::new("notifications/message", params))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one inbound message; only requests and invalid messages produce a response.
    pub async fn handle_message(&self, message: InboundMessage) -> Option<JsonRpcResponse> {
        match message {
            InboundMessage::Request(request) => Some(self.handle_request(request).await),
            InboundMessage::Notification(notification) => {
                self.handle_notification(&notification);
                None
            }
            InboundMessage::Response(value) => {
                let id = value.get("id").cloned().unwrap_or_default();
                debug!(%id, "Ignoring client response");
                None
            }
            InboundMessage::Invalid { id, reason } => {
                Some(JsonRpcResponse::invalid_request(id, reason))
            }
        }
    }

    /// Answer a JSON-RPC request.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        match method.as_str() {
            "initialize" => return self.initialize(id, params),
            "ping" => return JsonRpcResponse::success(id, json!({})),
            _ => {}
        }

        if !self.is_initialized() {
            return JsonRpcResponse::invalid_request(id, "Session not initialized");
        }

        match method.as_str() {
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.tools() })),
            "tools/call" => self.call_tool(id, params).await,
            "logging/setLevel" => self.set_level(id, params),
            _ => {
                warn!("Unknown method: {}", method);
                JsonRpcResponse::method_not_found(id, &method)
            }
        }
    }

    /// Accept a client notification.
    pub fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client confirmed initialization"),
            "notifications/cancelled" => {
                debug!(params = ?notification.params, "Client cancelled a request")
            }
            other => debug!("Received notification: {}", other),
        }
    }

    fn initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = match serde_json::from_value(params.unwrap_or(json!({}))) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::invalid_params(id, e.to_string()),
        };

        let version = params
            .protocol_version
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
            .to_string();

        {
            let mut state = self.state();
            if state.phase == Phase::Ready {
                return JsonRpcResponse::invalid_request(id, "Session already initialized");
            }
            state.phase = Phase::Ready;
            state.protocol_version = Some(version.clone());
            state.client = params.client_info.clone();
        }

        let client = params.client_info.unwrap_or_default();
        info!(
            client_name = %client.name,
            client_version = %client.version,
            protocol_version = %version,
            "Session initialized"
        );

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": { "listChanged": false },
                "logging": {}
            },
            "serverInfo": {
                "name": self.identity.name,
                "version": self.identity.version
            }
        });
        if let Some(instructions) = &self.identity.instructions {
            result["instructions"] = json!(instructions);
        }

        JsonRpcResponse::success(id, result)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::invalid_params(id, "Missing params");
        };
        let params: CallToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::invalid_params(id, e.to_string()),
        };

        let Some(entry) = self.tools.iter().find(|t| t.name() == params.name) else {
            return JsonRpcResponse::invalid_params(id, format!("Unknown tool: {}", params.name));
        };

        info!(tool = %params.name, "Calling tool");
        self.notify_log(LogLevel::Debug, json!({ "tool": params.name, "event": "call" }));

        let result = match entry
            .handler
            .call(params.arguments.unwrap_or_default())
            .await
        {
            Ok(result) => result,
            Err(ToolError::InvalidArguments(msg)) => {
                return JsonRpcResponse::invalid_params(id, format!("Invalid arguments: {msg}"));
            }
            Err(e) => e.into_result(),
        };

        if result.is_error == Some(true) {
            self.notify_log(
                LogLevel::Warning,
                json!({ "tool": params.name, "event": "failed" }),
            );
        }

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::internal_error(id, e.to_string()),
        }
    }

    fn set_level(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        match serde_json::from_value::<SetLevelParams>(params.unwrap_or(Value::Null)) {
            Ok(SetLevelParams { level }) => {
                self.state().log_level = level;
                debug!(?level, "Session log level changed");
                JsonRpcResponse::success(id, json!({}))
            }
            Err(e) => JsonRpcResponse::invalid_params(id, e.to_string()),
        }
    }
}
