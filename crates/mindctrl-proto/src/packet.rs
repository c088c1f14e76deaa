//! Request and response packets
//!
//! Both packets travel as JSON objects. The `type` field names the packet
//! kind, `id` carries the call identifier as a decimal string, and the call
//! payload sits under `params` (requests) or `result` (responses) so that
//! the shape stays close to JSON-RPC.

use crate::{CallId, ProtocolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Value of the `type` field in request packets
pub const REQUEST_TYPE: &str = "request";

/// Value of the `type` field in response packets
pub const RESPONSE_TYPE: &str = "response";

#[derive(Serialize)]
struct OutboundRequest<'a, T: ?Sized> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    method: &'a str,
    client: &'a str,
    server: &'a str,
    params: &'a T,
}

#[derive(Serialize)]
struct OutboundResponse<'a, T: ?Sized> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    method: &'a str,
    client: &'a str,
    server: &'a str,
    result: &'a T,
}

#[derive(Deserialize)]
struct InboundPacket {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    method: String,
    client: String,
    server: String,
    #[serde(default)]
    params: Option<Box<RawValue>>,
    #[serde(default)]
    result: Option<Box<RawValue>>,
}

/// Decoded request packet
#[derive(Debug, Clone)]
pub struct RequestPacket {
    /// Call identifier
    pub id: CallId,
    /// Remote method name
    pub method: String,
    /// Client that issued the call
    pub client: String,
    /// Server expected to execute the call
    pub server: String,
    params: Option<Box<RawValue>>,
}

impl RequestPacket {
    /// Decode the call input into `T`
    pub fn input<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_raw(self.params.as_deref())
    }
}

/// Decoded response packet. The result stays undecoded until the caller
/// names the type it expects.
#[derive(Debug, Clone)]
pub struct ResponsePacket {
    /// Call identifier
    pub id: CallId,
    /// Remote method name
    pub method: String,
    /// Client that issued the call
    pub client: String,
    /// Server that executed the call
    pub server: String,
    result: Option<Box<RawValue>>,
}

impl ResponsePacket {
    /// Decode the call output into `T`
    pub fn output<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_raw(self.result.as_deref())
    }

    /// Raw JSON text of the call output
    pub fn raw_output(&self) -> &str {
        self.result.as_deref().map(RawValue::get).unwrap_or("null")
    }
}

/// Encode a request packet
pub fn encode_request<T: Serialize + ?Sized>(
    id: CallId,
    method: &str,
    client: &str,
    server: &str,
    input: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let packet = OutboundRequest {
        kind: REQUEST_TYPE,
        id: id.to_string(),
        method,
        client,
        server,
        params: input,
    };

    serde_json::to_vec(&packet).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Encode a response packet
pub fn encode_response<T: Serialize + ?Sized>(
    id: CallId,
    method: &str,
    client: &str,
    server: &str,
    output: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let packet = OutboundResponse {
        kind: RESPONSE_TYPE,
        id: id.to_string(),
        method,
        client,
        server,
        result: output,
    };

    serde_json::to_vec(&packet).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Decode a request packet
pub fn decode_request(bytes: &[u8]) -> Result<RequestPacket, ProtocolError> {
    let packet = decode_inbound(bytes, REQUEST_TYPE)?;
    Ok(RequestPacket {
        id: parse_call_id(&packet.id)?,
        method: packet.method,
        client: packet.client,
        server: packet.server,
        params: packet.params,
    })
}

/// Decode a response packet
pub fn decode_response(bytes: &[u8]) -> Result<ResponsePacket, ProtocolError> {
    let packet = decode_inbound(bytes, RESPONSE_TYPE)?;
    Ok(ResponsePacket {
        id: parse_call_id(&packet.id)?,
        method: packet.method,
        client: packet.client,
        server: packet.server,
        result: packet.result,
    })
}

fn decode_inbound(bytes: &[u8], kind: &str) -> Result<InboundPacket, ProtocolError> {
    let packet: InboundPacket =
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::malformed(e.to_string()))?;

    if packet.kind != kind {
        return Err(ProtocolError::malformed(format!(
            "expected {} packet, got {}",
            kind, packet.kind
        )));
    }

    Ok(packet)
}

/// Call identifiers are plain decimal digits; signs and whitespace are rejected.
fn parse_call_id(id: &str) -> Result<CallId, ProtocolError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::malformed(format!("invalid call id: {:?}", id)));
    }

    id.parse()
        .map_err(|_| ProtocolError::malformed(format!("call id out of range: {}", id)))
}

fn decode_raw<T: DeserializeOwned>(raw: Option<&RawValue>) -> Result<T, ProtocolError> {
    let text = raw.map(RawValue::get).unwrap_or("null");
    serde_json::from_str(text).map_err(|e| ProtocolError::malformed(e.to_string()))
}
