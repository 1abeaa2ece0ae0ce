//! Wire format for mux frames.
//!
//! ```text
//!  0       1       5       7
//! +-------+-------+-------+-------------------------+
//! | kind  | strmId(4B) | length(2B) | payload(length B) |
//! +-------+------------+------------+-------------------+
//! ```
//!
//! All integers are little-endian. The codec is length-prefixed and framed
//! independently of whatever carrier transports it (one WebSocket binary
//! message, or one length-delimited read off a byte-stream carrier).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Maximum payload a single frame may carry. A longer write at the
/// [`crate::stream::SubStream`] API boundary is split into multiple DATA frames.
pub const MAX_PAYLOAD: usize = 16 * 1024;

/// The initial flow-control window granted implicitly to every new stream.
pub const INITIAL_WINDOW: u32 = 256 * 1024;

/// Frame kind tag, numbered 1..8 as specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Open = 1,
    OpenWithData = 2,
    Ack = 3,
    Data = 4,
    WindowUpdate = 5,
    CloseWrite = 6,
    CloseBoth = 7,
    Ping = 8,
    Pong = 9,
}

impl Kind {
    fn from_u8(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::Open,
            2 => Self::OpenWithData,
            3 => Self::Ack,
            4 => Self::Data,
            5 => Self::WindowUpdate,
            6 => Self::CloseWrite,
            7 => Self::CloseBoth,
            8 => Self::Ping,
            9 => Self::Pong,
            _ => return None,
        })
    }
}

/// A decoded mux frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: Kind,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn open(stream_id: u32) -> Self {
        Self { kind: Kind::Open, stream_id, payload: Bytes::new() }
    }

    pub fn open_with_data(stream_id: u32, data: Bytes) -> Self {
        Self { kind: Kind::OpenWithData, stream_id, payload: data }
    }

    pub fn ack(stream_id: u32) -> Self {
        Self { kind: Kind::Ack, stream_id, payload: Bytes::new() }
    }

    pub fn data(stream_id: u32, data: Bytes) -> Self {
        Self { kind: Kind::Data, stream_id, payload: data }
    }

    pub fn window_update(stream_id: u32, delta: u32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32_le(delta);
        Self { kind: Kind::WindowUpdate, stream_id, payload: payload.freeze() }
    }

    pub fn close_write(stream_id: u32) -> Self {
        Self { kind: Kind::CloseWrite, stream_id, payload: Bytes::new() }
    }

    pub fn close_both(stream_id: u32) -> Self {
        Self { kind: Kind::CloseBoth, stream_id, payload: Bytes::new() }
    }

    pub fn ping(payload: Bytes) -> Self {
        Self { kind: Kind::Ping, stream_id: 0, payload }
    }

    pub fn pong(payload: Bytes) -> Self {
        Self { kind: Kind::Pong, stream_id: 0, payload }
    }

    /// Parses the `delta` carried by a WINDOW_UPDATE frame's payload.
    pub fn window_update_delta(&self) -> Result<u32> {
        if self.payload.len() != 4 {
            return Err(Error::Protocol("window update payload must be 4 bytes".into()));
        }
        Ok(u32::from_le_bytes([self.payload[0], self.payload[1], self.payload[2], self.payload[3]]))
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8(self.kind as u8);
        out.put_u32_le(self.stream_id);
        out.put_u16_le(self.payload.len() as u16);
        out.extend_from_slice(&self.payload);
    }

    pub fn encoded(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(7 + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decodes exactly one frame from `buf`, advancing it past the frame.
    /// `buf` must contain a complete frame (the carrier already delimits
    /// messages; this function does not wait for more bytes).
    pub fn decode(buf: &mut BytesMut) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::Protocol("truncated frame header".into()));
        }
        let kind_byte = buf[0];
        let stream_id = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let length = u16::from_le_bytes([buf[5], buf[6]]) as usize;
        if length > MAX_PAYLOAD {
            return Err(Error::Protocol(format!("frame payload {length} exceeds {MAX_PAYLOAD}")));
        }
        if buf.len() < 7 + length {
            return Err(Error::Protocol("truncated frame payload".into()));
        }
        let kind = Kind::from_u8(kind_byte).ok_or_else(|| Error::Protocol(format!("unknown frame kind {kind_byte}")))?;
        buf.advance(7);
        let payload = buf.split_to(length).freeze();
        Ok(Self { kind, stream_id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_data_frame() {
        let frame = Frame::data(3, Bytes::from_static(b"hello"));
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let decoded = Frame::decode(&mut buf).expect("decode");
        assert_eq!(decoded.stream_id, 3);
        assert!(matches!(decoded.kind, Kind::Data));
        assert_eq!(&decoded.payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn round_trip_control_frames() {
        for frame in [
            Frame::open(5),
            Frame::open_with_data(5, Bytes::from_static(b"x")),
            Frame::ack(5),
            Frame::window_update(5, 4096),
            Frame::close_write(5),
            Frame::close_both(5),
            Frame::ping(Bytes::from_static(b"tag")),
            Frame::pong(Bytes::from_static(b"tag")),
        ] {
            let mut buf = BytesMut::new();
            frame.encode(&mut buf);
            let decoded = Frame::decode(&mut buf).expect("decode");
            assert_eq!(decoded.stream_id, frame.stream_id);
            assert_eq!(&decoded.payload[..], &frame.payload[..]);
        }
    }

    #[test]
    fn window_update_round_trips_delta() {
        let frame = Frame::window_update(7, 123_456);
        assert_eq!(frame.window_update_delta().expect("delta"), 123_456);
    }

    #[test]
    fn rejects_oversized_payload_length() {
        let mut buf = BytesMut::new();
        buf.put_u8(Kind::Data as u8);
        buf.put_u32_le(1);
        buf.put_u16_le((MAX_PAYLOAD + 1) as u16);
        let err = Frame::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xEE);
        buf.put_u32_le(1);
        buf.put_u16_le(0);
        let err = Frame::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut buf = BytesMut::new();
        buf.put_u8(Kind::Data as u8);
        buf.put_u32_le(1);
        buf.put_u16_le(10);
        buf.extend_from_slice(b"abc");
        let err = Frame::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
