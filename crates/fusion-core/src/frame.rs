//! Newline-delimited JSON frames exchanged with the host mod-framework.

use crate::packets::{InboundPacket, OutboundPacket};
use crate::{deserialize_u64_lenient, GameId};
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;
pub const CURRENT_PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const CURRENT: Self = Self(CURRENT_PROTOCOL_VERSION);
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ProtocolVersionVisitor;

        impl<'de> Visitor<'de> for ProtocolVersionVisitor {
            type Value = ProtocolVersion;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a protocol version as string or integer")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u16::try_from(value)
                    .map(ProtocolVersion)
                    .map_err(|_| E::custom(format!("protocol version out of range: {value}")))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!(
                        "protocol version cannot be negative: {value}"
                    )));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let cleaned = value.trim().trim_start_matches('v');
                cleaned
                    .parse::<u16>()
                    .map(ProtocolVersion)
                    .map_err(|err| E::custom(format!("invalid protocol version '{value}': {err}")))
            }
        }

        deserializer.deserialize_any(ProtocolVersionVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostEnvelope {
    #[serde(default)]
    pub version: ProtocolVersion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub msg: HostMsg,
}

impl HostEnvelope {
    pub fn new(msg: HostMsg, timestamp: Option<String>) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            timestamp,
            msg,
        }
    }
}

/// Host -> bridge: `hello`, `packet`, `command`, `shutdown`.
/// Bridge -> host: `send`, `message`, `hook`, `unhook`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HostMsg {
    Hello(HelloPayload),
    Packet(InboundPacket),
    Command(CommandPayload),
    Shutdown,
    Send(SendPayload),
    Message(MessagePayload),
    Hook(HookPayload),
    Unhook(UnhookPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    #[serde(deserialize_with = "deserialize_u64_lenient")]
    pub game_id: GameId,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandPayload {
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendPayload {
    pub version: u32,
    pub packet: OutboundPacket,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookPayload {
    pub token: u64,
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnhookPayload {
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("buffer exceeds max size without delimiter: {size} > {max}")]
    OversizedBuffer { size: usize, max: usize },
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct DecodeReport<T> {
    pub frames: Vec<T>,
    pub errors: Vec<FrameError>,
}

impl<T> Default for DecodeReport<T> {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            errors: Vec::new(),
        }
    }
}

pub fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut encoded =
        serde_json::to_vec(value).map_err(|err| FrameError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    encoded.push(b'\n');
    Ok(encoded)
}

pub fn decode_frame<T: DeserializeOwned>(
    bytes: &[u8],
    max_frame_bytes: usize,
) -> Result<T, FrameError> {
    let raw = trim_line_ending(bytes);
    if raw.len() > max_frame_bytes {
        return Err(FrameError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    serde_json::from_slice(raw).map_err(|err| FrameError::Decode(err.to_string()))
}

fn trim_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Incremental decoder: feed arbitrary chunks, get whole frames back.
///
/// A malformed line is reported and skipped; decoding resumes at the next
/// newline.
pub struct NdjsonFrameDecoder<T> {
    max_frame_bytes: usize,
    pending: Vec<u8>,
    marker: PhantomData<T>,
}

impl<T> NdjsonFrameDecoder<T> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<T> Default for NdjsonFrameDecoder<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl<T: DeserializeOwned> NdjsonFrameDecoder<T> {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        self.pending.extend_from_slice(chunk);

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            let frame = trim_line_ending(&line);
            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            self.decode_into(frame, &mut report);
        }

        if self.pending.len() > self.max_frame_bytes {
            report.errors.push(FrameError::OversizedBuffer {
                size: self.pending.len(),
                max: self.max_frame_bytes,
            });
            self.pending.clear();
        }

        report
    }

    /// Decode whatever is left once the stream closes without a final newline.
    pub fn finish(&mut self) -> DecodeReport<T> {
        let mut report = DecodeReport::default();
        let rest = std::mem::take(&mut self.pending);
        if !rest.iter().all(u8::is_ascii_whitespace) {
            self.decode_into(&rest, &mut report);
        }
        report
    }

    fn decode_into(&self, frame: &[u8], report: &mut DecodeReport<T>) {
        match decode_frame(frame, self.max_frame_bytes) {
            Ok(parsed) => report.frames.push(parsed),
            Err(err) => report.errors.push(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{ContractOpenedEvent, InboundPacket};

    fn command_envelope(args: &[&str]) -> HostEnvelope {
        HostEnvelope::new(
            HostMsg::Command(CommandPayload {
                args: args.iter().map(|arg| arg.to_string()).collect(),
            }),
            Some("2026-10-16T09:00:00Z".to_string()),
        )
    }

    #[test]
    fn host_frames_parse_from_wire_json() {
        let hello: HostEnvelope = serde_json::from_str(
            r#"{"type":"hello","payload":{"game_id":"4451","name":"Tester"}}"#,
        )
        .expect("hello");
        assert_eq!(hello.version, ProtocolVersion::CURRENT);
        assert_eq!(
            hello.msg,
            HostMsg::Hello(HelloPayload {
                game_id: 4451,
                name: Some("Tester".to_string()),
            })
        );

        let packet: HostEnvelope = serde_json::from_str(
            r#"{"version":"1","type":"packet","payload":{"name":"S_REQUEST_CONTRACT","data":{"type":89,"id":31}}}"#,
        )
        .expect("packet");
        assert_eq!(
            packet.msg,
            HostMsg::Packet(InboundPacket::ContractOpened(ContractOpenedEvent {
                contract_type: 89,
                id: 31,
            }))
        );

        let shutdown: HostEnvelope =
            serde_json::from_str(r#"{"version":1,"type":"shutdown"}"#).expect("shutdown");
        assert_eq!(shutdown.msg, HostMsg::Shutdown);
    }

    #[test]
    fn decoder_reassembles_split_chunks() {
        let frame = encode_frame(&command_envelope(&["status"]), DEFAULT_MAX_FRAME_BYTES)
            .expect("encode");
        let (head, tail) = frame.split_at(frame.len() / 2);

        let mut decoder = NdjsonFrameDecoder::<HostEnvelope>::default();
        assert!(decoder.push_chunk(head).frames.is_empty());
        let report = decoder.push_chunk(tail);
        assert_eq!(report.frames, vec![command_envelope(&["status"])]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn decoder_recovers_after_malformed_line() {
        let valid = encode_frame(&command_envelope(&["off"]), DEFAULT_MAX_FRAME_BYTES)
            .expect("encode");
        let mut chunk = b"{\"type\":\"command\"\n\r\n".to_vec();
        chunk.extend_from_slice(&valid);

        let mut decoder = NdjsonFrameDecoder::<HostEnvelope>::default();
        let report = decoder.push_chunk(&chunk);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], FrameError::Decode(_)));
    }

    #[test]
    fn oversized_frames_are_rejected_both_ways() {
        let big = command_envelope(&["on", &"x".repeat(256)]);
        assert!(matches!(
            encode_frame(&big, 64),
            Err(FrameError::OversizedFrame { .. })
        ));

        let mut decoder = NdjsonFrameDecoder::<HostEnvelope>::new(32);
        let report = decoder.push_chunk(&[b'a'; 40]);
        assert!(matches!(
            report.errors[0],
            FrameError::OversizedBuffer { size: 40, max: 32 }
        ));
    }

    #[test]
    fn finish_flushes_trailing_frame() {
        let frame = encode_frame(&command_envelope(&["status"]), DEFAULT_MAX_FRAME_BYTES)
            .expect("encode");
        let mut decoder = NdjsonFrameDecoder::<HostEnvelope>::default();
        assert!(decoder
            .push_chunk(&frame[..frame.len() - 1])
            .frames
            .is_empty());
        assert_eq!(decoder.finish().frames.len(), 1);
        assert!(decoder.finish().frames.is_empty());
    }
}
