//! MQTT control packets
//!
//! Only the MQTT 5 packets a mindctrl client exchanges with its broker are
//! modelled: the session handshake, subscriptions, QoS 0/1 publishing,
//! keep-alive pings and disconnection.

use crate::BrokerError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Protocol name sent in CONNECT
pub const PROTOCOL_NAME: &str = "MQTT";

/// MQTT protocol level 5
pub const PROTOCOL_VERSION: u8 = 5;

/// Largest value a variable byte integer can hold
pub const MAX_VAR_INT: usize = 268_435_455;

const CONNECT: u8 = 1;
const CONNACK: u8 = 2;
const PUBLISH: u8 = 3;
const PUBACK: u8 = 4;
const SUBSCRIBE: u8 = 8;
const SUBACK: u8 = 9;
const PINGREQ: u8 = 12;
const PINGRESP: u8 = 13;
const DISCONNECT: u8 = 14;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_WILL: u8 = 0x04;
const FLAG_CLEAN_START: u8 = 0x02;

const PROP_SERVER_KEEP_ALIVE: usize = 0x13;
const PROP_MAXIMUM_PACKET_SIZE: usize = 0x27;
const PROP_REASON_STRING: usize = 0x1F;

/// Delivery guarantee of a PUBLISH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget
    AtMostOnce = 0,
    /// Acknowledged delivery
    AtLeastOnce = 1,
    /// Assured single delivery
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> Result<Self, BrokerError> {
        match bits {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(BrokerError::protocol(format!("invalid QoS {}", other))),
        }
    }
}

/// CONNECT packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Client identifier
    pub client_id: String,
    /// Discard any previous session state
    pub clean_start: bool,
    /// Keep-alive interval in seconds, 0 disables it
    pub keep_alive: u16,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<Bytes>,
    /// Largest packet the client accepts
    pub max_packet_size: Option<u32>,
}

/// CONNACK packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    /// Broker resumed an earlier session
    pub session_present: bool,
    /// Reason code, 0 on success
    pub reason_code: u8,
    /// Human readable reason
    pub reason_string: Option<String>,
    /// Keep-alive the broker imposes in place of the requested one
    pub server_keep_alive: Option<u16>,
}

/// PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Topic name
    pub topic: String,
    /// Application payload
    pub payload: Bytes,
    /// Delivery guarantee
    pub qos: QoS,
    /// Broker keeps the message for late subscribers
    pub retain: bool,
    /// Redelivery flag
    pub dup: bool,
    /// Packet identifier, present when QoS > 0
    pub packet_id: Option<u16>,
}

impl Publish {
    /// Create a QoS 0, non-retained publish
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            packet_id: None,
        }
    }

    /// Mark the publish as retained
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

/// SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    /// Packet identifier
    pub packet_id: u16,
    /// Topic filters, all requested at QoS 0
    pub topics: Vec<String>,
}

/// SUBACK packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    /// Packet identifier of the SUBSCRIBE
    pub packet_id: u16,
    /// One reason code per requested topic; 0x80 and above are failures
    pub reason_codes: Vec<u8>,
}

/// MQTT control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Session request
    Connect(Connect),
    /// Session answer
    ConnAck(ConnAck),
    /// Application message
    Publish(Publish),
    /// QoS 1 acknowledgement
    PubAck {
        /// Packet identifier of the PUBLISH
        packet_id: u16,
    },
    /// Subscription request
    Subscribe(Subscribe),
    /// Subscription answer
    SubAck(SubAck),
    /// Keep-alive probe
    PingReq,
    /// Keep-alive answer
    PingResp,
    /// Session end
    Disconnect {
        /// Reason code, 0 for a normal disconnection
        reason_code: u8,
    },
}

#[derive(Debug, Default)]
struct Properties {
    max_packet_size: Option<u32>,
    reason_string: Option<String>,
    server_keep_alive: Option<u16>,
}

impl Packet {
    /// Packet name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT",
            Self::ConnAck(_) => "CONNACK",
            Self::Publish(_) => "PUBLISH",
            Self::PubAck { .. } => "PUBACK",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::SubAck(_) => "SUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect { .. } => "DISCONNECT",
        }
    }

    /// Append the packet, fixed header included, to `out`
    pub(crate) fn encode_into(&self, out: &mut BytesMut) -> Result<(), BrokerError> {
        let mut body = BytesMut::new();

        let header = match self {
            Self::Connect(connect) => {
                put_string(&mut body, PROTOCOL_NAME)?;
                body.put_u8(PROTOCOL_VERSION);

                let mut flags = 0;
                if connect.username.is_some() {
                    flags |= FLAG_USERNAME;
                }
                if connect.password.is_some() {
                    flags |= FLAG_PASSWORD;
                }
                if connect.clean_start {
                    flags |= FLAG_CLEAN_START;
                }
                body.put_u8(flags);
                body.put_u16(connect.keep_alive);

                put_properties(
                    &mut body,
                    &Properties {
                        max_packet_size: connect.max_packet_size,
                        ..Properties::default()
                    },
                )?;

                put_string(&mut body, &connect.client_id)?;
                if let Some(username) = &connect.username {
                    put_string(&mut body, username)?;
                }
                if let Some(password) = &connect.password {
                    put_binary(&mut body, password)?;
                }
                CONNECT << 4
            }
            Self::ConnAck(ack) => {
                body.put_u8(ack.session_present as u8);
                body.put_u8(ack.reason_code);
                put_properties(
                    &mut body,
                    &Properties {
                        max_packet_size: None,
                        reason_string: ack.reason_string.clone(),
                        server_keep_alive: ack.server_keep_alive,
                    },
                )?;
                CONNACK << 4
            }
            Self::Publish(publish) => {
                put_string(&mut body, &publish.topic)?;
                if publish.qos != QoS::AtMostOnce {
                    let packet_id = publish.packet_id.ok_or_else(|| {
                        BrokerError::protocol("QoS > 0 publish without packet id")
                    })?;
                    body.put_u16(packet_id);
                }
                put_var_int(&mut body, 0)?;
                body.put_slice(&publish.payload);

                let mut flags = (publish.qos as u8) << 1;
                if publish.dup {
                    flags |= 0x08;
                }
                if publish.retain {
                    flags |= 0x01;
                }
                (PUBLISH << 4) | flags
            }
            Self::PubAck { packet_id } => {
                body.put_u16(*packet_id);
                PUBACK << 4
            }
            Self::Subscribe(subscribe) => {
                body.put_u16(subscribe.packet_id);
                put_var_int(&mut body, 0)?;
                for topic in &subscribe.topics {
                    put_string(&mut body, topic)?;
                    body.put_u8(QoS::AtMostOnce as u8);
                }
                (SUBSCRIBE << 4) | 0x02
            }
            Self::SubAck(ack) => {
                body.put_u16(ack.packet_id);
                put_var_int(&mut body, 0)?;
                body.put_slice(&ack.reason_codes);
                SUBACK << 4
            }
            Self::PingReq => PINGREQ << 4,
            Self::PingResp => PINGRESP << 4,
            Self::Disconnect { reason_code } => {
                if *reason_code != 0 {
                    body.put_u8(*reason_code);
                }
                DISCONNECT << 4
            }
        };

        out.reserve(1 + 4 + body.len());
        out.put_u8(header);
        put_var_int(out, body.len())?;
        out.put_slice(&body);
        Ok(())
    }

    /// Decode a packet from its first header byte and its body
    pub(crate) fn decode(header: u8, mut body: Bytes) -> Result<Self, BrokerError> {
        let flags = header & 0x0F;

        let packet = match header >> 4 {
            CONNECT => {
                let name = get_string(&mut body)?;
                if name != PROTOCOL_NAME {
                    return Err(BrokerError::protocol(format!("unknown protocol {:?}", name)));
                }
                let version = get_u8(&mut body)?;
                if version != PROTOCOL_VERSION {
                    return Err(BrokerError::protocol(format!(
                        "unsupported protocol level {}",
                        version
                    )));
                }

                let connect_flags = get_u8(&mut body)?;
                if connect_flags & FLAG_WILL != 0 {
                    return Err(BrokerError::protocol("will messages are not supported"));
                }
                let keep_alive = get_u16(&mut body)?;
                let properties = get_properties(&mut body)?;
                let client_id = get_string(&mut body)?;
                let username = if connect_flags & FLAG_USERNAME != 0 {
                    Some(get_string(&mut body)?)
                } else {
                    None
                };
                let password = if connect_flags & FLAG_PASSWORD != 0 {
                    Some(get_binary(&mut body)?)
                } else {
                    None
                };

                Self::Connect(Connect {
                    client_id,
                    clean_start: connect_flags & FLAG_CLEAN_START != 0,
                    keep_alive,
                    username,
                    password,
                    max_packet_size: properties.max_packet_size,
                })
            }
            CONNACK => {
                let session_present = get_u8(&mut body)? & 0x01 != 0;
                let reason_code = get_u8(&mut body)?;
                let properties = if body.has_remaining() {
                    get_properties(&mut body)?
                } else {
                    Properties::default()
                };

                Self::ConnAck(ConnAck {
                    session_present,
                    reason_code,
                    reason_string: properties.reason_string,
                    server_keep_alive: properties.server_keep_alive,
                })
            }
            PUBLISH => {
                let qos = QoS::from_bits((flags >> 1) & 0x03)?;
                let topic = get_string(&mut body)?;
                let packet_id = if qos != QoS::AtMostOnce {
                    Some(get_u16(&mut body)?)
                } else {
                    None
                };
                get_properties(&mut body)?;

                Self::Publish(Publish {
                    topic,
                    payload: body.split_to(body.remaining()),
                    qos,
                    retain: flags & 0x01 != 0,
                    dup: flags & 0x08 != 0,
                    packet_id,
                })
            }
            PUBACK => Self::PubAck {
                packet_id: get_u16(&mut body)?,
            },
            SUBSCRIBE => {
                let packet_id = get_u16(&mut body)?;
                get_properties(&mut body)?;

                let mut topics = Vec::new();
                while body.has_remaining() {
                    topics.push(get_string(&mut body)?);
                    get_u8(&mut body)?;
                }
                if topics.is_empty() {
                    return Err(BrokerError::protocol("SUBSCRIBE without topics"));
                }

                Self::Subscribe(Subscribe { packet_id, topics })
            }
            SUBACK => {
                let packet_id = get_u16(&mut body)?;
                get_properties(&mut body)?;

                Self::SubAck(SubAck {
                    packet_id,
                    reason_codes: body.split_to(body.remaining()).to_vec(),
                })
            }
            PINGREQ => Self::PingReq,
            PINGRESP => Self::PingResp,
            DISCONNECT => Self::Disconnect {
                reason_code: if body.has_remaining() { get_u8(&mut body)? } else { 0 },
            },
            other => {
                return Err(BrokerError::protocol(format!("unsupported packet type {}", other)));
            }
        };

        Ok(packet)
    }
}

/// Append a variable byte integer
pub(crate) fn put_var_int(buf: &mut BytesMut, mut value: usize) -> Result<(), BrokerError> {
    if value > MAX_VAR_INT {
        return Err(BrokerError::protocol(format!("length {} exceeds MQTT limit", value)));
    }

    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

/// Read a variable byte integer without consuming it. Returns the value and
/// its encoded length, or `None` when more bytes are needed.
pub(crate) fn peek_var_int(buf: &[u8]) -> Result<Option<(usize, usize)>, BrokerError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;

    for (index, byte) in buf.iter().take(4).enumerate() {
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
        multiplier *= 128;
    }

    if buf.len() >= 4 {
        Err(BrokerError::protocol("malformed variable byte integer"))
    } else {
        Ok(None)
    }
}

fn get_var_int(buf: &mut Bytes) -> Result<usize, BrokerError> {
    match peek_var_int(&buf[..])? {
        Some((value, length)) => {
            buf.advance(length);
            Ok(value)
        }
        None => Err(truncated()),
    }
}

fn truncated() -> BrokerError {
    BrokerError::protocol("truncated packet")
}

fn get_u8(buf: &mut Bytes) -> Result<u8, BrokerError> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16, BrokerError> {
    if buf.remaining() < 2 {
        return Err(truncated());
    }
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut Bytes) -> Result<u32, BrokerError> {
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    Ok(buf.get_u32())
}

fn get_binary(buf: &mut Bytes) -> Result<Bytes, BrokerError> {
    let len = get_u16(buf)? as usize;
    if buf.remaining() < len {
        return Err(truncated());
    }
    Ok(buf.split_to(len))
}

fn get_string(buf: &mut Bytes) -> Result<String, BrokerError> {
    let raw = get_binary(buf)?;
    String::from_utf8(raw.to_vec()).map_err(|_| BrokerError::protocol("invalid UTF-8 string"))
}

fn put_binary(buf: &mut BytesMut, data: &[u8]) -> Result<(), BrokerError> {
    let len = u16::try_from(data.len())
        .map_err(|_| BrokerError::protocol(format!("field of {} bytes is too long", data.len())))?;
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), BrokerError> {
    put_binary(buf, value.as_bytes())
}

fn put_properties(buf: &mut BytesMut, properties: &Properties) -> Result<(), BrokerError> {
    let mut block = BytesMut::new();
    if let Some(size) = properties.max_packet_size {
        put_var_int(&mut block, PROP_MAXIMUM_PACKET_SIZE)?;
        block.put_u32(size);
    }
    if let Some(reason) = &properties.reason_string {
        put_var_int(&mut block, PROP_REASON_STRING)?;
        put_string(&mut block, reason)?;
    }
    if let Some(seconds) = properties.server_keep_alive {
        put_var_int(&mut block, PROP_SERVER_KEEP_ALIVE)?;
        block.put_u16(seconds);
    }

    put_var_int(buf, block.len())?;
    buf.put_slice(&block);
    Ok(())
}

/// Read a property block, keeping the properties a client cares about and
/// skipping the rest according to their declared types.
fn get_properties(buf: &mut Bytes) -> Result<Properties, BrokerError> {
    let len = get_var_int(buf)?;
    if buf.remaining() < len {
        return Err(truncated());
    }

    let mut block = buf.split_to(len);
    let mut properties = Properties::default();

    while block.has_remaining() {
        match get_var_int(&mut block)? {
            PROP_MAXIMUM_PACKET_SIZE => properties.max_packet_size = Some(get_u32(&mut block)?),
            PROP_REASON_STRING => properties.reason_string = Some(get_string(&mut block)?),
            PROP_SERVER_KEEP_ALIVE => properties.server_keep_alive = Some(get_u16(&mut block)?),
            0x01 | 0x17 | 0x19 | 0x24 | 0x25 | 0x28 | 0x29 | 0x2A => {
                get_u8(&mut block)?;
            }
            0x21 | 0x22 | 0x23 => {
                get_u16(&mut block)?;
            }
            0x02 | 0x11 | 0x18 => {
                get_u32(&mut block)?;
            }
            0x0B => {
                get_var_int(&mut block)?;
            }
            0x03 | 0x08 | 0x12 | 0x15 | 0x1A | 0x1C => {
                get_string(&mut block)?;
            }
            0x09 | 0x16 => {
                get_binary(&mut block)?;
            }
            0x26 => {
                get_string(&mut block)?;
                get_string(&mut block)?;
            }
            other => {
                return Err(BrokerError::protocol(format!("unknown property {:#04x}", other)));
            }
        }
    }

    Ok(properties)
}
