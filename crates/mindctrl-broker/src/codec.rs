//! Packet codec for async streams

use crate::packet::peek_var_int;
use crate::{BrokerError, Packet};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default inbound packet ceiling (16MB)
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Packet codec for encoding/decoding MQTT packets over async streams
pub struct PacketCodec {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum inbound packet size allowed
    max_packet_size: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketCodec {
    /// Create a new packet codec with default settings
    pub fn new() -> Self {
        Self::with_max_packet_size(DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create a new packet codec with a custom inbound packet ceiling
    pub fn with_max_packet_size(max_packet_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_packet_size,
        }
    }

    /// Maximum inbound packet size
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Encode a packet to bytes
    pub fn encode_packet(&self, packet: &Packet) -> Result<Bytes, BrokerError> {
        let mut buf = BytesMut::new();
        packet.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Write a packet to an async writer
    pub async fn write_packet<W>(&self, writer: &mut W, packet: &Packet) -> Result<(), BrokerError>
    where
        W: AsyncWrite + Unpin,
    {
        let encoded = self.encode_packet(packet)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read a packet from an async reader. Returns `None` on a clean EOF.
    pub async fn read_packet<R>(&mut self, reader: &mut R) -> Result<Option<Packet>, BrokerError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(packet) = self.try_decode_packet()? {
                return Ok(Some(packet));
            }

            let mut temp_buf = [0u8; 8192];
            let n = reader.read(&mut temp_buf).await?;

            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(BrokerError::protocol("connection closed mid-packet"));
                }
            }

            self.read_buf.extend_from_slice(&temp_buf[..n]);
        }
    }

    /// Try to decode a packet from the internal buffer
    pub fn try_decode_packet(&mut self) -> Result<Option<Packet>, BrokerError> {
        if self.read_buf.len() < 2 {
            return Ok(None);
        }

        let (body_len, prefix_len) = match peek_var_int(&self.read_buf[1..])? {
            Some(found) => found,
            None => return Ok(None),
        };

        let packet_len = 1 + prefix_len + body_len;
        if packet_len > self.max_packet_size {
            return Err(BrokerError::PacketTooLarge {
                size: packet_len,
                max: self.max_packet_size,
            });
        }

        if self.read_buf.len() < packet_len {
            return Ok(None);
        }

        let header = self.read_buf[0];
        self.read_buf.advance(1 + prefix_len);
        let body = self.read_buf.split_to(body_len).freeze();

        Packet::decode(header, body).map(Some)
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Publish, SubAck};
    use proptest::prelude::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_write_read_packet() {
        let codec = PacketCodec::new();
        let packet = Packet::Publish(Publish::new("mindctrl/clients/c1", "{}"));

        let mut buffer = Vec::new();
        codec.write_packet(&mut buffer, &packet).await.unwrap();

        let mut codec2 = PacketCodec::new();
        let mut cursor = Cursor::new(buffer);
        let decoded = codec2.read_packet(&mut cursor).await.unwrap().unwrap();

        assert_eq!(decoded, packet);
    }

    #[tokio::test]
    async fn test_partial_packet_reading() {
        let codec = PacketCodec::new();
        let packet = Packet::Publish(Publish::new("mindctrl/statuses/s1", "alive"));
        let encoded = codec.encode_packet(&packet).unwrap();

        let mut codec2 = PacketCodec::new();
        let mid = encoded.len() / 2;
        codec2.read_buf.extend_from_slice(&encoded[..mid]);
        assert!(codec2.try_decode_packet().unwrap().is_none());

        codec2.read_buf.extend_from_slice(&encoded[mid..]);
        assert_eq!(codec2.try_decode_packet().unwrap().unwrap(), packet);
        assert_eq!(codec2.buffer_size(), 0);
    }

    #[tokio::test]
    async fn test_multiple_packets_in_buffer() {
        let codec = PacketCodec::new();
        let first = Packet::SubAck(SubAck { packet_id: 1, reason_codes: vec![0, 0] });
        let second = Packet::Publish(Publish::new("mindctrl/statuses/s1", "alive").retained());

        let mut combined = BytesMut::new();
        combined.extend_from_slice(&codec.encode_packet(&first).unwrap());
        combined.extend_from_slice(&codec.encode_packet(&second).unwrap());

        let mut codec2 = PacketCodec::new();
        let mut cursor = Cursor::new(combined.freeze());

        assert_eq!(codec2.read_packet(&mut cursor).await.unwrap().unwrap(), first);
        assert_eq!(codec2.read_packet(&mut cursor).await.unwrap().unwrap(), second);
        assert!(codec2.read_packet(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_packet_too_large() {
        let codec = PacketCodec::new();
        let packet = Packet::Publish(Publish::new("t", vec![0u8; 200]));
        let encoded = codec.encode_packet(&packet).unwrap();

        let mut small = PacketCodec::with_max_packet_size(100);
        let mut cursor = Cursor::new(encoded);
        let result = small.read_packet(&mut cursor).await;

        assert!(matches!(result, Err(BrokerError::PacketTooLarge { max: 100, .. })));
    }

    #[tokio::test]
    async fn test_eof_mid_packet() {
        let codec = PacketCodec::new();
        let encoded = codec.encode_packet(&Packet::Publish(Publish::new("t", "payload"))).unwrap();

        let mut codec2 = PacketCodec::new();
        let mut cursor = Cursor::new(encoded.slice(..encoded.len() - 2));
        let result = codec2.read_packet(&mut cursor).await;

        assert!(matches!(result, Err(BrokerError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut codec = PacketCodec::new();
        let mut cursor = Cursor::new(Vec::<u8>::new());

        assert!(codec.read_packet(&mut cursor).await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn test_publish_roundtrip_properties(
            topic in "[a-z/]{1,64}",
            payload in prop::collection::vec(any::<u8>(), 0..4096),
            retain in any::<bool>(),
        ) {
            let mut publish = Publish::new(topic, payload);
            publish.retain = retain;
            let packet = Packet::Publish(publish);

            let codec = PacketCodec::new();
            let encoded = codec.encode_packet(&packet).unwrap();

            let mut codec2 = PacketCodec::new();
            codec2.read_buf.extend_from_slice(&encoded);
            let decoded = codec2.try_decode_packet().unwrap().unwrap();

            prop_assert_eq!(decoded, packet);
        }
    }
}
