//! HTTP/2 frame types and binary serialization.
//!
//! Implements the RFC 9113 frame format for the egress side of a server
//! connection. Only the frame kinds this engine emits are represented;
//! padding and priority fields are never produced.

use bytes::{BufMut, BytesMut};

/// Frame header size (9 bytes per RFC 9113).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Default maximum frame size (16KB per RFC 9113).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Frame type identifiers per RFC 9113.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    RstStream,
    Settings,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

/// Frame flags.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1; // Same value, different context (SETTINGS/PING)
    pub const END_HEADERS: u8 = 0x4;
}

/// SETTINGS frame parameter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsId {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

impl From<SettingsId> for u16 {
    fn from(id: SettingsId) -> Self {
        id as u16
    }
}

/// HTTP/2 error codes per RFC 9113 Section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

/// Frame header: the 9-byte prefix carried by every frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Encode the header as exactly 9 big-endian bytes.
    ///
    /// The reserved bit above the stream ID is always written as 0.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let sid = self.stream_id & 0x7fff_ffff;
        [
            (self.length >> 16) as u8,
            (self.length >> 8) as u8,
            self.length as u8,
            self.frame_type.into(),
            self.flags,
            (sid >> 24) as u8,
            (sid >> 16) as u8,
            (sid >> 8) as u8,
            sid as u8,
        ]
    }

    /// Parse a frame header from bytes.
    ///
    /// Returns None if fewer than 9 bytes are available or the reserved
    /// bit is set.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
        let frame_type = FrameType::from(buf[3]);
        let flags = buf[4];

        // RFC 9113 Section 4.1: the bit above the stream ID is reserved
        if (buf[5] & 0x80) != 0 {
            return None;
        }

        let stream_id = ((buf[5] as u32 & 0x7f) << 24)
            | ((buf[6] as u32) << 16)
            | ((buf[7] as u32) << 8)
            | (buf[8] as u32);

        Some(Self {
            length,
            frame_type,
            flags,
            stream_id,
        })
    }
}

/// SETTINGS frame serializer.
#[derive(Debug, Clone)]
pub struct SettingsFrame {
    /// Settings to send, in wire order. Each tuple is (id, value).
    pub settings: Vec<(u16, u32)>,
    pub ack: bool,
}

impl SettingsFrame {
    /// Create a SETTINGS frame carrying the given parameters.
    pub fn new(settings: Vec<(u16, u32)>) -> Self {
        Self {
            settings,
            ack: false,
        }
    }

    /// Create a SETTINGS ACK frame.
    pub fn ack() -> Self {
        Self {
            settings: Vec::new(),
            ack: true,
        }
    }

    /// Serialize to bytes (including frame header).
    pub fn serialize(&self) -> BytesMut {
        let payload_len = if self.ack { 0 } else { self.settings.len() * 6 };
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);

        let header = FrameHeader {
            length: payload_len as u32,
            frame_type: FrameType::Settings,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        };
        buf.put_slice(&header.encode());

        if !self.ack {
            for (id, value) in &self.settings {
                buf.put_u16(*id);
                buf.put_u32(*value);
            }
        }

        buf
    }
}

/// WINDOW_UPDATE frame serializer.
#[derive(Debug, Clone)]
pub struct WindowUpdateFrame {
    /// 0 for the connection window, otherwise a stream ID.
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdateFrame {
    /// Create a new WINDOW_UPDATE frame.
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment,
        }
    }

    /// Serialize to bytes (including frame header).
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);

        let header = FrameHeader {
            length: 4,
            frame_type: FrameType::WindowUpdate,
            flags: 0,
            stream_id: self.stream_id,
        };
        buf.put_slice(&header.encode());
        buf.put_u32(self.increment & 0x7fff_ffff);

        buf
    }
}

/// PING frame serializer.
#[derive(Debug, Clone)]
pub struct PingFrame {
    pub flags: u8,
    pub payload: [u8; 8],
}

impl PingFrame {
    /// Create a new PING frame. `flags` may carry ACK.
    pub fn new(flags: u8, payload: [u8; 8]) -> Self {
        Self { flags, payload }
    }

    /// Serialize to bytes (including frame header).
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);

        let header = FrameHeader {
            length: 8,
            frame_type: FrameType::Ping,
            flags: self.flags,
            stream_id: 0,
        };
        buf.put_slice(&header.encode());
        buf.put_slice(&self.payload);

        buf
    }
}

/// GOAWAY frame serializer. Debug data is never emitted.
#[derive(Debug, Clone)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: ErrorCode,
}

impl GoAwayFrame {
    /// Create a new GOAWAY frame.
    pub fn new(last_stream_id: u32, error_code: ErrorCode) -> Self {
        Self {
            last_stream_id,
            error_code,
        }
    }

    /// Serialize to bytes (including frame header).
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);

        let header = FrameHeader {
            length: 8,
            frame_type: FrameType::GoAway,
            flags: 0,
            stream_id: 0,
        };
        buf.put_slice(&header.encode());
        buf.put_u32(self.last_stream_id & 0x7fff_ffff);
        buf.put_u32(self.error_code as u32);

        buf
    }
}

/// RST_STREAM frame serializer.
#[derive(Debug, Clone)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: ErrorCode,
}

impl RstStreamFrame {
    /// Create a new RST_STREAM frame.
    pub fn new(stream_id: u32, error_code: ErrorCode) -> Self {
        Self {
            stream_id,
            error_code,
        }
    }

    /// Serialize to bytes (including frame header).
    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);

        let header = FrameHeader {
            length: 4,
            frame_type: FrameType::RstStream,
            flags: 0,
            stream_id: self.stream_id,
        };
        buf.put_slice(&header.encode());
        buf.put_u32(self.error_code as u32);

        buf
    }
}
