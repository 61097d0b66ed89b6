//! WebSocket frame codec and the per-connection state machines.
//!
//! Frames follow RFC 6455 §5; there is no custom framing. Clients MUST
//! mask; the caller closes with 1002 on unmasked client frames. The
//! fragment reassembler enforces §5.4, with the size check applied
//! BEFORE each append so the server never buffers an overflowing
//! message.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Maximum single-frame payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
/// Maximum reassembled message size; exceeding it closes with 1009.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_INVALID_DATA: u16 = 1007;
pub const CLOSE_TOO_BIG: u16 = 1009;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_bits(bits: u8) -> Option<Opcode> {
        Some(match bits {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            _ => return None,
        })
    }

    fn bits(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    pub payload: Vec<u8>,
}

/// Read one frame. Payload is unmasked in place.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Frame> {
    let mut header = [0u8; 2];
    reader.read_exact(&mut header)?;
    let fin = header[0] & 0x80 != 0;
    let opcode = Opcode::from_bits(header[0] & 0x0F).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "reserved opcode")
    })?;
    let masked = header[1] & 0x80 != 0;
    let mut len = (header[1] & 0x7F) as u64;
    if len == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext)?;
        len = u16::from_be_bytes(ext) as u64;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext)?;
        len = u64::from_be_bytes(ext);
    }
    if len as usize > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds maximum payload size",
        ));
    }
    let mask_key = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key)?;
        Some(key)
    } else {
        None
    };
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    if let Some(key) = mask_key {
        for (i, b) in payload.iter_mut().enumerate() {
            *b ^= key[i % 4];
        }
    }
    Ok(Frame {
        fin,
        opcode,
        masked,
        payload,
    })
}

/// Write one unmasked (server-to-client) frame.
pub fn write_frame<W: Write>(
    writer: &mut W,
    opcode: Opcode,
    payload: &[u8],
    fin: bool,
) -> io::Result<()> {
    let mut header = Vec::with_capacity(payload.len() + 10);
    let fin_bit = if fin { 0x80 } else { 0x00 };
    header.push(fin_bit | opcode.bits());
    if payload.len() < 126 {
        header.push(payload.len() as u8);
    } else if payload.len() <= u16::MAX as usize {
        header.push(126);
        header.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    } else {
        header.push(127);
        header.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    }
    header.extend_from_slice(payload);
    writer.write_all(&header)?;
    writer.flush()
}

pub fn write_close<W: Write>(writer: &mut W, code: u16, reason: &str) -> io::Result<()> {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    write_frame(writer, Opcode::Close, &payload, true)
}

// ── Fragment reassembly ─────────────────────────────────────────────────

/// A complete reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// RFC 6455 §5.4 state machine. Control frames never touch this state;
/// the caller processes them inline.
#[derive(Debug, Default)]
pub struct FragmentState {
    initial_opcode: Option<Opcode>,
    buffer: Vec<u8>,
}

impl FragmentState {
    pub fn new() -> Self {
        FragmentState::default()
    }

    /// Feed one data frame. `Ok(Some(message))` delivers a complete
    /// message; `Err(code)` is the close code for a protocol violation.
    pub fn feed(&mut self, frame: Frame) -> Result<Option<Message>, u16> {
        debug_assert!(!frame.opcode.is_control());
        match (frame.fin, frame.opcode) {
            (true, Opcode::Text | Opcode::Binary) => {
                if self.initial_opcode.is_some() {
                    // A new data frame mid-sequence.
                    return Err(CLOSE_PROTOCOL_ERROR);
                }
                if frame.payload.len() > MAX_MESSAGE_SIZE {
                    return Err(CLOSE_TOO_BIG);
                }
                let message = Message {
                    opcode: frame.opcode,
                    payload: frame.payload,
                };
                validate_text(&message)?;
                Ok(Some(message))
            }
            (false, Opcode::Text | Opcode::Binary) => {
                if self.initial_opcode.is_some() {
                    return Err(CLOSE_PROTOCOL_ERROR);
                }
                self.check_capacity(frame.payload.len())?;
                self.initial_opcode = Some(frame.opcode);
                self.buffer = frame.payload;
                Ok(None)
            }
            (fin, Opcode::Continuation) => {
                let Some(initial) = self.initial_opcode else {
                    // Continuation with nothing in flight.
                    return Err(CLOSE_PROTOCOL_ERROR);
                };
                self.check_capacity(frame.payload.len())?;
                self.buffer.extend_from_slice(&frame.payload);
                if !fin {
                    return Ok(None);
                }
                let message = Message {
                    opcode: initial,
                    payload: std::mem::take(&mut self.buffer),
                };
                self.initial_opcode = None;
                validate_text(&message)?;
                Ok(Some(message))
            }
            _ => Err(CLOSE_PROTOCOL_ERROR),
        }
    }

    /// The size check runs before appending so the overflow is never
    /// buffered.
    fn check_capacity(&self, incoming: usize) -> Result<(), u16> {
        if self.buffer.len() + incoming > MAX_MESSAGE_SIZE {
            Err(CLOSE_TOO_BIG)
        } else {
            Ok(())
        }
    }
}

/// Text messages validate UTF-8 on the complete buffer, not per
/// fragment.
fn validate_text(message: &Message) -> Result<(), u16> {
    if message.opcode == Opcode::Text && std::str::from_utf8(&message.payload).is_err() {
        Err(CLOSE_INVALID_DATA)
    } else {
        Ok(())
    }
}

// ── Heartbeat ───────────────────────────────────────────────────────────

pub const PING_INTERVAL: Duration = Duration::from_secs(30);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-read timeout on the underlying socket; bounds how long the
/// reader holds the stream mutex.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Ping/pong liveness tracking. Intervals are fixed at build time.
#[derive(Debug)]
pub struct HeartbeatState {
    pub last_ping_sent: Instant,
    pub last_pong_received: Instant,
    pub pending_ping_payload: Option<[u8; 4]>,
}

impl HeartbeatState {
    pub fn new() -> Self {
        let now = Instant::now();
        HeartbeatState {
            last_ping_sent: now,
            last_pong_received: now,
            pending_ping_payload: None,
        }
    }

    pub fn ping_due(&self) -> bool {
        self.pending_ping_payload.is_none() && self.last_ping_sent.elapsed() >= PING_INTERVAL
    }

    /// True when an outstanding ping has gone unanswered past the
    /// timeout.
    pub fn pong_overdue(&self) -> bool {
        self.pending_ping_payload.is_some()
            && self.last_ping_sent.elapsed() >= PONG_TIMEOUT
            && self.last_pong_received < self.last_ping_sent
    }

    pub fn record_ping(&mut self, payload: [u8; 4]) {
        self.pending_ping_payload = Some(payload);
        self.last_ping_sent = Instant::now();
    }

    /// Unsolicited pongs (no matching payload) are ignored, as the RFC
    /// permits.
    pub fn on_pong(&mut self, payload: &[u8]) {
        if let Some(pending) = self.pending_ping_payload {
            if payload == pending {
                self.last_pong_received = Instant::now();
                self.pending_ping_payload = None;
            }
        }
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn masked_frame(fin: bool, opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let key = [0x11u8, 0x22, 0x33, 0x44];
        let mut out = Vec::new();
        out.push(if fin { 0x80 } else { 0x00 } | opcode.bits());
        assert!(payload.len() < 126);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(&key);
        for (i, &b) in payload.iter().enumerate() {
            out.push(b ^ key[i % 4]);
        }
        out
    }

    #[test]
    fn codec_round_trip_masked_client_frame() {
        let bytes = masked_frame(true, Opcode::Text, b"hello");
        let frame = read_frame(&mut Cursor::new(bytes)).unwrap();
        assert!(frame.fin);
        assert!(frame.masked);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hello");
    }

    #[test]
    fn server_frames_are_unmasked() {
        let mut out = Vec::new();
        write_frame(&mut out, Opcode::Text, b"hi", true).unwrap();
        assert_eq!(out[0], 0x81);
        assert_eq!(out[1], 2);
        assert_eq!(&out[2..], b"hi");
    }

    #[test]
    fn extended_16bit_length() {
        let payload = vec![7u8; 300];
        let mut out = Vec::new();
        write_frame(&mut out, Opcode::Binary, &payload, true).unwrap();
        assert_eq!(out[1], 126);
        assert_eq!(u16::from_be_bytes([out[2], out[3]]), 300);
    }

    fn data(fin: bool, opcode: Opcode, payload: &[u8]) -> Frame {
        Frame {
            fin,
            opcode,
            masked: true,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fragments_reassemble_in_order() {
        let mut state = FragmentState::new();
        assert_eq!(state.feed(data(false, Opcode::Text, b"he")), Ok(None));
        assert_eq!(state.feed(data(false, Opcode::Continuation, b"ll")), Ok(None));
        let message = state
            .feed(data(true, Opcode::Continuation, b"o"))
            .unwrap()
            .unwrap();
        assert_eq!(message.opcode, Opcode::Text);
        assert_eq!(message.payload, b"hello");
        // State is reset for the next message.
        assert_eq!(state.feed(data(true, Opcode::Text, b"next")).unwrap().unwrap().payload, b"next");
    }

    #[test]
    fn unexpected_continuation_is_protocol_error() {
        let mut state = FragmentState::new();
        assert_eq!(
            state.feed(data(true, Opcode::Continuation, b"x")),
            Err(CLOSE_PROTOCOL_ERROR)
        );
    }

    #[test]
    fn new_data_frame_mid_sequence_is_protocol_error() {
        let mut state = FragmentState::new();
        state.feed(data(false, Opcode::Text, b"a")).unwrap();
        assert_eq!(
            state.feed(data(false, Opcode::Text, b"b")),
            Err(CLOSE_PROTOCOL_ERROR)
        );
    }

    #[test]
    fn oversized_message_closes_1009_before_buffering() {
        let mut state = FragmentState::new();
        let half = vec![0u8; MAX_MESSAGE_SIZE - 1];
        state.feed(data(false, Opcode::Binary, &half)).unwrap();
        let overflow = vec![0u8; 2];
        assert_eq!(
            state.feed(data(false, Opcode::Continuation, &overflow)),
            Err(CLOSE_TOO_BIG)
        );
    }

    #[test]
    fn text_utf8_validated_on_complete_message_only() {
        let mut state = FragmentState::new();
        // Split a multi-byte scalar across fragments; each half is
        // invalid alone, the whole is valid.
        let e_acute = "é".as_bytes();
        state.feed(data(false, Opcode::Text, &e_acute[..1])).unwrap();
        let message = state
            .feed(data(true, Opcode::Continuation, &e_acute[1..]))
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, e_acute);

        let mut state = FragmentState::new();
        assert_eq!(
            state.feed(data(true, Opcode::Text, &[0xFF, 0xFE])),
            Err(CLOSE_INVALID_DATA)
        );
    }

    #[test]
    fn heartbeat_matching_pong_clears_pending() {
        let mut hb = HeartbeatState::new();
        hb.record_ping([1, 2, 3, 4]);
        hb.on_pong(&[9, 9, 9, 9]); // unsolicited payload ignored
        assert!(hb.pending_ping_payload.is_some());
        hb.on_pong(&[1, 2, 3, 4]);
        assert!(hb.pending_ping_payload.is_none());
    }
}
