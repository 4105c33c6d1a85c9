//! Binary frame codec shared by the ASR and TTS upstreams.
//!
//! Both services speak the same framing: a 4-byte nibble-packed header
//! (version, header size in words, message type, type-specific flags,
//! serialization and compression methods, one reserved byte), an optional
//! header extension skipped by size, then a payload whose layout depends
//! on the message type. Sequence numbers are signed big-endian; a negative
//! sequence marks the end of a stream.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use voxling_core::{Result, VoxlingError};

pub const PROTOCOL_VERSION: u8 = 0x1;

/// Wire message types. Requests go out as `0x1`/`0x2`; everything at
/// `0xb` and above only ever arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    FullClientRequest = 0x1,
    AudioOnlyRequest = 0x2,
    AudioOnlyResponse = 0xb,
    FrontendResponse = 0xc,
    Error = 0xf,
}

impl MessageType {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x1 => Ok(Self::FullClientRequest),
            0x2 => Ok(Self::AudioOnlyRequest),
            0xb => Ok(Self::AudioOnlyResponse),
            0xc => Ok(Self::FrontendResponse),
            0xf => Ok(Self::Error),
            other => Err(VoxlingError::Protocol(format!(
                "unrecognized message type 0x{other:x}"
            ))),
        }
    }
}

/// Type-specific flags nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageFlags {
    NoSequence = 0x0,
    PositiveSequence = 0x1,
    /// Last message; the sequence number it carries is negative.
    LastMessage = 0x2,
    NegativeSequence = 0x3,
}

impl MessageFlags {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x0 => Ok(Self::NoSequence),
            0x1 => Ok(Self::PositiveSequence),
            0x2 => Ok(Self::LastMessage),
            0x3 => Ok(Self::NegativeSequence),
            other => Err(VoxlingError::Protocol(format!(
                "unrecognized message flags 0x{other:x}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SerializationMethod {
    None = 0x0,
    Json = 0x1,
    Custom = 0xf,
}

impl SerializationMethod {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x0 => Ok(Self::None),
            0x1 => Ok(Self::Json),
            0xf => Ok(Self::Custom),
            other => Err(VoxlingError::Protocol(format!(
                "unrecognized serialization method 0x{other:x}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0x0,
    Gzip = 0x1,
    Custom = 0xf,
}

impl CompressionMethod {
    fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x0 => Ok(Self::None),
            0x1 => Ok(Self::Gzip),
            0xf => Ok(Self::Custom),
            other => Err(VoxlingError::Protocol(format!(
                "unrecognized compression method 0x{other:x}"
            ))),
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub message_type: MessageType,
    pub serialization: SerializationMethod,
    pub compression: CompressionMethod,
    pub body: ResponseBody,
}

/// Closed set of payload interpretations.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// Acknowledgment with no payload (audio-only response, no sequence).
    Ack,
    /// Sequenced payload chunk. Data is returned raw; the ASR client
    /// JSON-decodes it, the TTS client appends it as audio bytes.
    Chunk { sequence: i32, data: Vec<u8> },
    /// Informational frontend message; never terminal.
    Info(String),
    /// Explicit upstream error; always terminal.
    UpstreamError { code: u32, message: String },
}

impl ResponseFrame {
    /// Whether this frame terminates the stream it arrived on.
    pub fn is_last(&self) -> bool {
        match &self.body {
            ResponseBody::Ack | ResponseBody::Info(_) => false,
            ResponseBody::Chunk { sequence, .. } => *sequence < 0,
            ResponseBody::UpstreamError { .. } => true,
        }
    }
}

/// Encode a frame header plus a raw, already-laid-out payload.
pub fn encode_frame(
    message_type: MessageType,
    flags: MessageFlags,
    serialization: SerializationMethod,
    compression: CompressionMethod,
    raw_payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + raw_payload.len());
    frame.push((PROTOCOL_VERSION << 4) | 0x1); // header size: 1 word
    frame.push(((message_type as u8) << 4) | flags as u8);
    frame.push(((serialization as u8) << 4) | compression as u8);
    frame.push(0x00); // reserved
    frame.extend_from_slice(raw_payload);
    frame
}

/// Encode an outbound request frame.
///
/// With a sequence number the payload is laid out
/// `[seq i32 BE][len u32 BE][payload]` (audio chunk); without one it is
/// `[len u32 BE][payload]` (full client request).
pub fn encode_request_frame(
    message_type: MessageType,
    flags: MessageFlags,
    serialization: SerializationMethod,
    compression: CompressionMethod,
    sequence: Option<i32>,
    payload: &[u8],
) -> Vec<u8> {
    let mut raw = Vec::with_capacity(8 + payload.len());
    if let Some(seq) = sequence {
        raw.extend_from_slice(&seq.to_be_bytes());
    }
    raw.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    raw.extend_from_slice(payload);
    encode_frame(message_type, flags, serialization, compression, &raw)
}

/// Decode an inbound frame.
pub fn decode_response_frame(bytes: &[u8]) -> Result<ResponseFrame> {
    if bytes.len() < 4 {
        return Err(VoxlingError::Protocol(format!(
            "frame shorter than fixed header: {} bytes",
            bytes.len()
        )));
    }

    let header_words = (bytes[0] & 0x0f) as usize;
    let message_type = MessageType::from_nibble(bytes[1] >> 4)?;
    let flags = MessageFlags::from_nibble(bytes[1] & 0x0f)?;
    let serialization = SerializationMethod::from_nibble(bytes[2] >> 4)?;
    let compression = CompressionMethod::from_nibble(bytes[2] & 0x0f)?;

    let header_len = header_words * 4;
    if header_len < 4 || header_len > bytes.len() {
        return Err(VoxlingError::Protocol(format!(
            "header extension exceeds frame: {header_len} > {}",
            bytes.len()
        )));
    }
    let payload = &bytes[header_len..];

    let body = match message_type {
        MessageType::AudioOnlyResponse => {
            if flags == MessageFlags::NoSequence {
                ResponseBody::Ack
            } else {
                let sequence = i32::from_be_bytes(read_word(payload, 0)?);
                let size = u32::from_be_bytes(read_word(payload, 4)?) as usize;
                let data = read_sized(payload, 8, size)?;
                ResponseBody::Chunk {
                    sequence,
                    data: data.to_vec(),
                }
            }
        }
        MessageType::Error => {
            let code = u32::from_be_bytes(read_word(payload, 0)?);
            let size = u32::from_be_bytes(read_word(payload, 4)?) as usize;
            let raw = read_sized(payload, 8, size)?;
            let message = decode_text(raw, compression)?;
            ResponseBody::UpstreamError { code, message }
        }
        MessageType::FrontendResponse => {
            let size = u32::from_be_bytes(read_word(payload, 0)?) as usize;
            let raw = read_sized(payload, 4, size)?;
            ResponseBody::Info(decode_text(raw, compression)?)
        }
        MessageType::FullClientRequest | MessageType::AudioOnlyRequest => {
            return Err(VoxlingError::Protocol(format!(
                "request message type 0x{:x} in a response frame",
                message_type as u8
            )));
        }
    };

    Ok(ResponseFrame {
        message_type,
        serialization,
        compression,
        body,
    })
}

pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| VoxlingError::Protocol(format!("gzip payload: {e}")))?;
    Ok(out)
}

fn decode_text(raw: &[u8], compression: CompressionMethod) -> Result<String> {
    let raw = match compression {
        CompressionMethod::Gzip => gzip_decompress(raw)?,
        _ => raw.to_vec(),
    };
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn read_word(payload: &[u8], offset: usize) -> Result<[u8; 4]> {
    payload
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            VoxlingError::Protocol(format!(
                "payload truncated at offset {offset} ({} bytes)",
                payload.len()
            ))
        })
}

fn read_sized(payload: &[u8], offset: usize, size: usize) -> Result<&[u8]> {
    payload.get(offset..offset + size).ok_or_else(|| {
        VoxlingError::Protocol(format!(
            "declared payload size {size} exceeds remaining {} bytes",
            payload.len().saturating_sub(offset)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_bytes() {
        // The fixed full-client-request header: version 1, one header
        // word, type 0x1, no flags, JSON + gzip.
        let frame = encode_request_frame(
            MessageType::FullClientRequest,
            MessageFlags::NoSequence,
            SerializationMethod::Json,
            CompressionMethod::Gzip,
            None,
            b"{}",
        );
        assert_eq!(&frame[..4], &[0x11, 0x10, 0x11, 0x00]);
        assert_eq!(&frame[4..8], &2u32.to_be_bytes());
        assert_eq!(&frame[8..], b"{}");
    }

    #[test]
    fn test_chunk_roundtrip() {
        let payload = b"audio-bytes".to_vec();
        let frame = encode_request_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::PositiveSequence,
            SerializationMethod::None,
            CompressionMethod::None,
            Some(7),
            &payload,
        );
        let decoded = decode_response_frame(&frame).unwrap();
        assert!(!decoded.is_last());
        match decoded.body {
            ResponseBody::Chunk { sequence, data } => {
                assert_eq!(sequence, 7);
                assert_eq!(data, payload);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_negative_sequence_is_last() {
        for flags in [MessageFlags::LastMessage, MessageFlags::NegativeSequence] {
            let frame = encode_request_frame(
                MessageType::AudioOnlyResponse,
                flags,
                SerializationMethod::None,
                CompressionMethod::None,
                Some(-3),
                b"tail",
            );
            let decoded = decode_response_frame(&frame).unwrap();
            assert!(decoded.is_last());
        }
    }

    #[test]
    fn test_ack_has_no_payload() {
        let frame = encode_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::NoSequence,
            SerializationMethod::None,
            CompressionMethod::None,
            &[],
        );
        let decoded = decode_response_frame(&frame).unwrap();
        assert!(!decoded.is_last());
        assert!(matches!(decoded.body, ResponseBody::Ack));
    }

    #[test]
    fn test_error_frame_gzip_message() {
        let message = "quota exceeded, please retry later";
        let compressed = gzip_compress(message.as_bytes()).unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&55u32.to_be_bytes());
        raw.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
        raw.extend_from_slice(&compressed);

        let frame = encode_frame(
            MessageType::Error,
            MessageFlags::NoSequence,
            SerializationMethod::Json,
            CompressionMethod::Gzip,
            &raw,
        );
        let decoded = decode_response_frame(&frame).unwrap();
        assert!(decoded.is_last());
        match decoded.body {
            ResponseBody::UpstreamError { code, message: m } => {
                assert_eq!(code, 55);
                assert_eq!(m, message);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_frontend_response_not_terminal() {
        let text = b"synthesis queued";
        let mut raw = Vec::new();
        raw.extend_from_slice(&(text.len() as u32).to_be_bytes());
        raw.extend_from_slice(text);

        let frame = encode_frame(
            MessageType::FrontendResponse,
            MessageFlags::NoSequence,
            SerializationMethod::Json,
            CompressionMethod::None,
            &raw,
        );
        let decoded = decode_response_frame(&frame).unwrap();
        assert!(!decoded.is_last());
        assert!(matches!(decoded.body, ResponseBody::Info(ref m) if m == "synthesis queued"));
    }

    #[test]
    fn test_header_extension_skipped() {
        // header size of 2 words: 4 fixed bytes + 4 extension bytes
        let mut frame = vec![
            (PROTOCOL_VERSION << 4) | 0x2,
            (MessageType::AudioOnlyResponse as u8) << 4 | MessageFlags::PositiveSequence as u8,
            0x00,
            0x00,
            0xde, 0xad, 0xbe, 0xef, // extension, skipped by size
        ];
        frame.extend_from_slice(&4i32.to_be_bytes());
        frame.extend_from_slice(&2u32.to_be_bytes());
        frame.extend_from_slice(b"ok");

        let decoded = decode_response_frame(&frame).unwrap();
        match decoded.body {
            ResponseBody::Chunk { sequence, data } => {
                assert_eq!(sequence, 4);
                assert_eq!(data, b"ok");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_header_extension_beyond_frame() {
        // header claims 4 words but the frame is only 6 bytes long
        let frame = vec![0x14, 0xb1, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode_response_frame(&frame),
            Err(VoxlingError::Protocol(_))
        ));
    }

    #[test]
    fn test_declared_size_beyond_frame() {
        let mut frame = encode_frame(
            MessageType::AudioOnlyResponse,
            MessageFlags::PositiveSequence,
            SerializationMethod::None,
            CompressionMethod::None,
            &[],
        );
        frame.extend_from_slice(&1i32.to_be_bytes());
        frame.extend_from_slice(&100u32.to_be_bytes()); // declares 100 bytes
        frame.extend_from_slice(b"short");

        assert!(matches!(
            decode_response_frame(&frame),
            Err(VoxlingError::Protocol(_))
        ));
    }

    #[test]
    fn test_unrecognized_message_type() {
        let frame = vec![0x11, 0x70, 0x00, 0x00]; // type 0x7 is not defined
        assert!(matches!(
            decode_response_frame(&frame),
            Err(VoxlingError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncated_frame() {
        assert!(matches!(
            decode_response_frame(&[0x11, 0xb1]),
            Err(VoxlingError::Protocol(_))
        ));
    }

    #[test]
    fn test_gzip_roundtrip() {
        let data = b"the quick brown fox";
        let packed = gzip_compress(data).unwrap();
        assert_ne!(packed, data);
        assert_eq!(gzip_decompress(&packed).unwrap(), data);
    }
}
