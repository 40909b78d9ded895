//! Codec trait and the JSON reference implementation.
//!
//! The adapter never looks inside frames. It needs something that turns a
//! [`Packet`] into frames once per broadcast, so the same frames can be
//! handed to every matching connection without re-encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EncodedFrame, Packet, PacketType, ProtocolError};

/// Encodes packets into frames and decodes them back.
///
/// `Send + Sync + 'static` because the adapter stores its codec and
/// uses it from flush tasks running on any Tokio worker.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a packet into one or more frames.
    ///
    /// The first frame is always the header. Codecs that support binary
    /// attachments append one frame per attachment.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the header can't be serialized.
    fn encode(&self, packet: &Packet) -> Result<Vec<EncodedFrame>, ProtocolError>;

    /// Decodes the frames produced by [`encode`](Self::encode).
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for malformed headers and
    /// [`ProtocolError::InvalidPacket`] when the frame layout is wrong.
    fn decode(&self, frames: &[EncodedFrame]) -> Result<Packet, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// Wire shape of the header frame.
#[derive(Serialize)]
struct HeaderRef<'a> {
    #[serde(rename = "type")]
    packet_type: PacketType,
    nsp: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    data: &'a Value,
    #[serde(skip_serializing_if = "is_zero")]
    attachments: usize,
}

#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type")]
    packet_type: PacketType,
    nsp: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    attachments: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// A [`Codec`] that writes the header as a JSON text frame followed by
/// raw binary frames for attachments.
///
/// ```rust
/// use roomcast_protocol::{Codec, JsonCodec, Packet};
/// use serde_json::json;
///
/// let codec = JsonCodec;
/// let frames = codec.encode(&Packet::event("chat", json!("hi"))).unwrap();
/// assert_eq!(frames.len(), 1);
///
/// let decoded = codec.decode(&frames).unwrap();
/// assert_eq!(decoded.event_name(), Some("chat"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<EncodedFrame>, ProtocolError> {
        let header = HeaderRef {
            packet_type: packet.packet_type,
            nsp: &packet.nsp,
            id: packet.id,
            data: &packet.data,
            attachments: packet.attachments.len(),
        };
        let text = serde_json::to_string(&header).map_err(ProtocolError::Encode)?;

        let mut frames = Vec::with_capacity(1 + packet.attachments.len());
        frames.push(EncodedFrame::Text(text));
        frames.extend(
            packet
                .attachments
                .iter()
                .map(|bytes| EncodedFrame::Binary(bytes.clone())),
        );
        Ok(frames)
    }

    fn decode(&self, frames: &[EncodedFrame]) -> Result<Packet, ProtocolError> {
        let (first, rest) = frames.split_first().ok_or_else(|| {
            ProtocolError::InvalidPacket("no frames to decode".into())
        })?;
        let text = first.as_text().ok_or_else(|| {
            ProtocolError::InvalidPacket("header frame must be text".into())
        })?;
        let header: Header =
            serde_json::from_str(text).map_err(ProtocolError::Decode)?;

        if header.attachments != rest.len() {
            return Err(ProtocolError::InvalidPacket(format!(
                "header announces {} attachments, got {}",
                header.attachments,
                rest.len()
            )));
        }

        let attachments = rest
            .iter()
            .map(|frame| match frame {
                EncodedFrame::Binary(bytes) => Ok(bytes.clone()),
                EncodedFrame::Text(_) => Err(ProtocolError::InvalidPacket(
                    "attachment frame must be binary".into(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Packet {
            packet_type: header.packet_type,
            nsp: header.nsp,
            id: header.id,
            data: header.data,
            attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_event_produces_single_text_frame() {
        let mut packet = Packet::event("chat", json!({"text": "hi"}));
        packet.nsp = "/".into();

        let frames = JsonCodec.encode(&packet).unwrap();

        assert_eq!(frames.len(), 1);
        let header: Value = serde_json::from_str(frames[0].as_text().unwrap()).unwrap();
        assert_eq!(header["type"], "event");
        assert_eq!(header["nsp"], "/");
        assert_eq!(header["data"], json!(["chat", {"text": "hi"}]));
        assert!(header.get("attachments").is_none());
        assert!(header.get("id").is_none());
    }

    #[test]
    fn test_encode_binary_event_appends_attachment_frames() {
        let packet =
            Packet::binary_event("upload", json!({}), vec![vec![1, 2], vec![3]]);

        let frames = JsonCodec.encode(&packet).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], EncodedFrame::Binary(vec![1, 2]));
        assert_eq!(frames[2], EncodedFrame::Binary(vec![3]));
        let header: Value = serde_json::from_str(frames[0].as_text().unwrap()).unwrap();
        assert_eq!(header["attachments"], 2);
    }

    #[test]
    fn test_decode_restores_binary_event() {
        let mut packet = Packet::binary_event("upload", json!(1), vec![vec![9]]);
        packet.id = Some(4);

        let decoded = JsonCodec.decode(&JsonCodec.encode(&packet).unwrap()).unwrap();

        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_missing_attachments() {
        let packet = Packet::binary_event("upload", json!(1), vec![vec![9]]);
        let frames = JsonCodec.encode(&packet).unwrap();

        let result = JsonCodec.decode(&frames[..1]);

        assert!(matches!(result, Err(ProtocolError::InvalidPacket(_))));
    }

    #[test]
    fn test_decode_rejects_binary_header() {
        let result = JsonCodec.decode(&[EncodedFrame::Binary(vec![0])]);
        assert!(matches!(result, Err(ProtocolError::InvalidPacket(_))));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let result = JsonCodec.decode(&[EncodedFrame::Text("{nope".into())]);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_frames_is_invalid() {
        assert!(matches!(
            JsonCodec.decode(&[]),
            Err(ProtocolError::InvalidPacket(_))
        ));
    }
}
