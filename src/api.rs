//! Request routing and the five device operations
//!
//! Transport-independent: the server hands over a parsed [`Request`] and writes back whatever
//! [`Response`] comes out of [`dispatch`].

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info_span, warn};

use crate::controls::{enumerate_controls, set_controls};
use crate::device::{DeviceProvider, VideoNode, list_devices, open_node};
use crate::error::Error;
use crate::formats::{enumerate_formats, read_active_format};
use crate::json::{JsonEntry, to_body};

/// Device path segments this long or longer are rejected.
pub const DEVICE_SEGMENT_LIMIT: usize = 128;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

const MSG_CANT_OPEN: &str = "Device can't be opened.";
const MSG_NAME_TOO_LONG: &str = "Device name too long.";
const MSG_UNSUPPORTED_METHOD: &str = "Unsupported method.";

/// HTTP request as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method token, e.g. "GET"
    pub method: String,
    /// Request target, possibly with a query string
    pub uri: String,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request from its parts.
    pub fn new(method: impl Into<String>, uri: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            body: body.into(),
        }
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }
}

/// HTTP response to be written by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: u16,
    /// Content-Type header, if any
    pub content_type: Option<&'static str>,
    /// Body bytes
    pub body: Vec<u8>,
}

impl Response {
    /// 200 with a JSON body.
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(JSON),
            body,
        }
    }

    /// Plain-text response.
    pub fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: Some(TEXT),
            body: message.as_bytes().to_vec(),
        }
    }

    /// Response with no body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Standard reason phrase for the status code.
    pub fn reason(&self) -> &'static str {
        reason_phrase(self.status)
    }
}

/// Reason phrase for the status codes this service emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// A matched route and its device segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// `/devices`
    Devices,
    /// `/device/formats/*`
    Formats(&'a str),
    /// `/device/format/*`
    Format(&'a str),
    /// `/device/control/*`
    Control(&'a str),
}

impl<'a> Route<'a> {
    /// Match a request path. `*` is exactly one (possibly empty) segment.
    pub fn parse(path: &'a str) -> Option<Self> {
        if path == "/devices" {
            return Some(Route::Devices);
        }

        let (prefix, segment) = path.rsplit_once('/')?;
        match prefix {
            "/device/formats" => Some(Route::Formats(segment)),
            "/device/format" => Some(Route::Format(segment)),
            "/device/control" => Some(Route::Control(segment)),
            _ => None,
        }
    }

    /// Device segment, if the route has one.
    pub fn device(&self) -> Option<&'a str> {
        match *self {
            Route::Devices => None,
            Route::Formats(node) | Route::Format(node) | Route::Control(node) => Some(node),
        }
    }

    /// Whether the route accepts the method.
    pub fn allows(&self, method: &str) -> bool {
        match self {
            Route::Control(_) => matches!(method, "GET" | "POST"),
            _ => method == "GET",
        }
    }
}

/// Route a request and run the matching operation.
pub fn dispatch(request: &Request, provider: &dyn DeviceProvider) -> Response {
    let Some(route) = Route::parse(request.path()) else {
        return Response::empty(404);
    };

    if let Some(node) = route.device() {
        if node.len() >= DEVICE_SEGMENT_LIMIT {
            warn!(len = node.len(), "{}", Error::NameTooLong(node.len()));
            return Response::text(400, MSG_NAME_TOO_LONG);
        }
    }

    if !route.allows(&request.method) {
        return Response::text(405, MSG_UNSUPPORTED_METHOD);
    }

    match route {
        Route::Devices => respond(&list_devices(provider)),
        Route::Formats(node) => with_device(provider, node, |dev| respond(&enumerate_formats(dev))),
        Route::Format(node) => with_device(provider, node, |dev| respond(&read_active_format(dev))),
        Route::Control(node) if request.method == "POST" => {
            let requested = parse_body(&request.body);
            with_device(provider, node, |dev| respond(&set_controls(dev, &requested)))
        }
        Route::Control(node) => with_device(provider, node, |dev| respond(&enumerate_controls(dev))),
    }
}

/// Open the node for the duration of `op`; the handle is released when `op` returns.
fn with_device(
    provider: &dyn DeviceProvider,
    node: &str,
    op: impl FnOnce(&dyn VideoNode) -> Response,
) -> Response {
    let span = info_span!("device", node = %node);
    let _guard = span.enter();

    match open_node(provider, node) {
        Ok(handle) => op(handle.as_ref()),
        Err(err) => {
            warn!(error = %err, "{MSG_CANT_OPEN}");
            Response::text(400, MSG_CANT_OPEN)
        }
    }
}

fn respond<T: JsonEntry + Serialize>(entries: &[T]) -> Response {
    match to_body(entries) {
        Ok(body) => Response::json(body),
        Err(err) => {
            error!(error = %Error::Json(err), "failed to encode response");
            Response::empty(500)
        }
    }
}

/// Parse a control-write body; anything unparsable counts as an empty request.
fn parse_body(body: &[u8]) -> Value {
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "ignoring unparsable request body");
            Value::Object(Default::default())
        }
    }
}
