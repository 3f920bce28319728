//! JSON-RPC 2.0 envelope codec.
//!
//! Decoding goes through [`parse_message`], which separates malformed JSON
//! ([`ErrorCode::ParseError`]) from well-formed JSON that is not a valid
//! envelope ([`ErrorCode::InvalidRequest`]). Encoding goes through the
//! `Serialize` impls, which always emit `"jsonrpc":"2.0"` first and never
//! place an `id` on a notification.

use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

/// The only protocol version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// Marker for the `jsonrpc` member; (de)serializes only as `"2.0"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == JSONRPC_VERSION {
            Ok(Self)
        } else {
            Err(D::Error::custom(format!("unsupported jsonrpc version {raw:?}")))
        }
    }
}

/// Request identifier. JSON-RPC allows a string, a number or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Numeric id, kept as the original JSON number.
    Number(Number),
    /// String id.
    String(String),
    /// Explicit `null`, also used when the id could not be recovered.
    Null,
}

impl JsonRpcId {
    /// Convert a JSON value into an id, rejecting illegal id types.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n)),
            Value::String(s) => Some(Self::String(s)),
            Value::Null => Some(Self::Null),
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl Display for JsonRpcId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Error codes produced by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Body is not valid JSON.
    ParseError,
    /// Valid JSON that is not a conformant envelope.
    InvalidRequest,
    /// Unknown method, or unknown tool in `tools/call`.
    MethodNotFound,
    /// Method parameters are missing or of the wrong shape.
    InvalidParams,
    /// Failure inside the dispatcher itself.
    InternalError,
    /// A tool handler failed.
    ToolExecution,
}

impl ErrorCode {
    /// Numeric wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ToolExecution => -32000,
        }
    }

    /// Canonical message for the code.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ToolExecution => "Tool execution error",
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Optional diagnostic payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Build an error with the canonical message for `code`.
    #[must_use]
    pub fn new(code: ErrorCode, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_owned(),
            data,
        }
    }

    /// -32700 with the decoder diagnostic as `data`.
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, Some(Value::String(detail.into())))
    }

    /// -32600 with the violated rule in the message.
    #[must_use]
    pub fn invalid_request(detail: &str) -> Self {
        Self {
            code: ErrorCode::InvalidRequest.code(),
            message: format!("{}: {detail}", ErrorCode::InvalidRequest.message()),
            data: None,
        }
    }

    /// -32601 naming the missing method or tool.
    #[must_use]
    pub fn method_not_found(name: &str) -> Self {
        Self {
            code: ErrorCode::MethodNotFound.code(),
            message: format!("{}: {name}", ErrorCode::MethodNotFound.message()),
            data: None,
        }
    }

    /// -32602 with the violated rule in the message.
    #[must_use]
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: ErrorCode::InvalidParams.code(),
            message: format!("{}: {detail}", ErrorCode::InvalidParams.message()),
            data: None,
        }
    }

    /// -32603 carrying the failure message as `data`.
    #[must_use]
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, Some(Value::String(detail.into())))
    }

    /// -32000 carrying the tool's failure message as `data`.
    #[must_use]
    pub fn tool_execution(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolExecution, Some(Value::String(detail.into())))
    }
}

/// Request: has an `id`, expects exactly one Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: Version,
    /// Identifier echoed on the Response.
    pub id: JsonRpcId,
    /// Method name.
    pub method: String,
    /// Structured parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request.
    #[must_use]
    pub fn new(id: impl Into<JsonRpcId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Notification: no `id`, expects no Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: Version,
    /// Method name.
    pub method: String,
    /// Structured parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outcome half of a Response. Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Successful result.
    Result(Value),
    /// Error object.
    Error(JsonRpcError),
}

/// Response to a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// Echo of the request id.
    pub id: JsonRpcId,
    /// Result or error.
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Successful response.
    #[must_use]
    pub fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            id,
            payload: ResponsePayload::Result(result),
        }
    }

    /// Error response.
    #[must_use]
    pub fn failure(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// The error object, if this is an error response.
    #[must_use]
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Error(err) => Some(err),
            ResponsePayload::Result(_) => None,
        }
    }

    /// The result value, if this is a successful response.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", &Version)?;
        map.serialize_entry("id", &self.id)?;
        match &self.payload {
            ResponsePayload::Result(value) => map.serialize_entry("result", value)?,
            ResponsePayload::Error(err) => map.serialize_entry("error", err)?,
        }
        map.end()
    }
}

/// Any JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    /// Request with an id.
    Request(JsonRpcRequest),
    /// Response to an earlier request.
    Response(JsonRpcResponse),
    /// Notification without an id.
    Notification(JsonRpcNotification),
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(req) => req.serialize(serializer),
            Self::Response(resp) => resp.serialize(serializer),
            Self::Notification(note) => note.serialize(serializer),
        }
    }
}

/// Failure to decode an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    code: ErrorCode,
    id: JsonRpcId,
    detail: String,
}

impl DecodeError {
    fn parse(err: &serde_json::Error) -> Self {
        Self {
            code: ErrorCode::ParseError,
            id: JsonRpcId::Null,
            detail: err.to_string(),
        }
    }

    fn invalid(id: JsonRpcId, detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequest,
            id,
            detail: detail.into(),
        }
    }

    /// Either [`ErrorCode::ParseError`] or [`ErrorCode::InvalidRequest`].
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Recovered request id, `null` when none could be read.
    #[must_use]
    pub fn id(&self) -> &JsonRpcId {
        &self.id
    }

    /// Human-readable reason.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Error Response to send back for this failure.
    #[must_use]
    pub fn into_response(self) -> JsonRpcResponse {
        let error = match self.code {
            ErrorCode::ParseError => JsonRpcError::parse_error(self.detail),
            _ => JsonRpcError::invalid_request(&self.detail),
        };
        JsonRpcResponse::failure(self.id, error)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (id {}): {}", self.code.message(), self.id, self.detail)
    }
}

impl std::error::Error for DecodeError {}

/// Decode one JSON-RPC message from raw bytes.
///
/// # Errors
///
/// Returns a [`DecodeError`] with [`ErrorCode::ParseError`] when `raw` is not
/// JSON, or [`ErrorCode::InvalidRequest`] when it is JSON but not a valid
/// JSON-RPC 2.0 envelope.
pub fn parse_message(raw: &[u8]) -> Result<JsonRpcMessage, DecodeError> {
    let value: Value = serde_json::from_slice(raw).map_err(|err| DecodeError::parse(&err))?;
    message_from_value(value)
}

/// Classify an already-parsed JSON value as a JSON-RPC message.
///
/// # Errors
///
/// Returns a [`DecodeError`] with [`ErrorCode::InvalidRequest`] when the
/// value is not a conformant envelope.
pub fn message_from_value(value: Value) -> Result<JsonRpcMessage, DecodeError> {
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::invalid(
            JsonRpcId::Null,
            "message must be a JSON object",
        ));
    };

    let id = match obj.remove("id") {
        None => None,
        Some(raw) => match JsonRpcId::from_value(raw) {
            Some(id) => Some(id),
            None => {
                return Err(DecodeError::invalid(
                    JsonRpcId::Null,
                    "id must be a string, a number, or null",
                ));
            }
        },
    };
    let echo_id = id.clone().unwrap_or(JsonRpcId::Null);

    match obj.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => return Err(DecodeError::invalid(echo_id, "jsonrpc must be '2.0'")),
    }

    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(DecodeError::invalid(echo_id, "method must be a string"));
        };
        let params = take_params(&mut obj).map_err(|detail| DecodeError::invalid(echo_id, detail))?;
        return Ok(match id {
            Some(id) => JsonRpcMessage::Request(JsonRpcRequest {
                jsonrpc: Version,
                id,
                method,
                params,
            }),
            None => JsonRpcMessage::Notification(JsonRpcNotification {
                jsonrpc: Version,
                method,
                params,
            }),
        });
    }

    match (id, obj.remove("result"), obj.remove("error")) {
        (Some(id), Some(result), None) => Ok(JsonRpcMessage::Response(JsonRpcResponse::success(
            id, result,
        ))),
        (Some(id), None, Some(error)) => {
            let error: JsonRpcError = serde_json::from_value(error).map_err(|err| {
                DecodeError::invalid(id.clone(), format!("malformed error object: {err}"))
            })?;
            Ok(JsonRpcMessage::Response(JsonRpcResponse::failure(id, error)))
        }
        _ => Err(DecodeError::invalid(
            echo_id,
            "message must carry a method, or an id with exactly one of result and error",
        )),
    }
}

/// `params` must be structured when present; `null` counts as absent.
fn take_params(obj: &mut Map<String, Value>) -> Result<Option<Value>, &'static str> {
    match obj.remove("params") {
        None | Some(Value::Null) => Ok(None),
        Some(params @ (Value::Object(_) | Value::Array(_))) => Ok(Some(params)),
        Some(_) => Err("params must be an object or an array"),
    }
}

/// Build a Response from either a result or an error, never both.
#[must_use]
pub fn build_response(id: JsonRpcId, outcome: Result<Value, JsonRpcError>) -> JsonRpcResponse {
    match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    }
}

/// Build a Notification. The result never carries an `id`.
#[must_use]
pub fn build_notification(method: impl Into<String>, params: Value) -> JsonRpcNotification {
    JsonRpcNotification {
        jsonrpc: Version,
        method: method.into(),
        params: Some(params),
    }
}
