//! WebSocket frame codec.
//!
//! ```text
//!  0               1               2               3
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |            (16/64)            |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |   Masking-key, if MASK set    |          Payload Data         |
//! +-------------------------------+-------------------------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD: u64 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame payload of {0} bytes exceeds the limit")]
    TooLarge(u64),

    #[error("connection closed mid-frame")]
    Truncated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Reserved(u8),
}

impl OpCode {
    pub fn from_u8(value: u8) -> Self {
        match value & 0x0f {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xa => OpCode::Pong,
            other => OpCode::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Continuation => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xa,
            OpCode::Reserved(value) => value & 0x0f,
        }
    }

    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// A single frame. `payload` is always held unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub mask: Option<[u8; 4]>,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(OpCode::Text, Bytes::from(text.into()))
    }

    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, payload)
    }

    pub fn close() -> Self {
        Self::new(OpCode::Close, Bytes::new())
    }

    /// Mask the payload on the wire with `key`.
    pub fn masked(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Payload as UTF-8, replacing invalid sequences.
    pub fn text_payload(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or `None`
    /// when `buf` does not yet hold a complete frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let fin = buf[0] & 0x80 != 0;
        let opcode = OpCode::from_u8(buf[0]);
        let masked = buf[1] & 0x80 != 0;

        let mut offset = 2;
        let len = match buf[1] & 0x7f {
            126 => {
                let Some(ext) = buf.get(2..4) else {
                    return Ok(None);
                };
                offset = 4;
                u64::from(u16::from_be_bytes([ext[0], ext[1]]))
            }
            127 => {
                let Some(ext) = buf.get(2..10) else {
                    return Ok(None);
                };
                offset = 10;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(ext);
                u64::from_be_bytes(raw)
            }
            len => u64::from(len),
        };
        if len > MAX_PAYLOAD {
            return Err(FrameError::TooLarge(len));
        }

        let mask = if masked {
            let Some(key) = buf.get(offset..offset + 4) else {
                return Ok(None);
            };
            offset += 4;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        // Bounded by MAX_PAYLOAD above.
        let len = len as usize;
        let Some(data) = buf.get(offset..offset + len) else {
            return Ok(None);
        };
        let mut payload = data.to_vec();
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        let frame = Frame {
            fin,
            opcode,
            mask,
            payload: Bytes::from(payload),
        };
        Ok(Some((frame, offset + len)))
    }

    /// Encode for the wire, masking the payload when a key is set.
    pub fn encode(&self) -> Bytes {
        let len = self.payload.len();
        let mut out = BytesMut::with_capacity(len + 14);

        let fin = if self.fin { 0x80 } else { 0 };
        out.put_u8(fin | self.opcode.as_u8());

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        if len < 126 {
            out.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            out.put_u8(mask_bit | 126);
            out.put_u16(len as u16);
        } else {
            out.put_u8(mask_bit | 127);
            out.put_u64(len as u64);
        }

        match self.mask {
            Some(key) => {
                out.put_slice(&key);
                let mut payload = self.payload.to_vec();
                apply_mask(&mut payload, key);
                out.put_slice(&payload);
            }
            None => out.put_slice(&self.payload),
        }
        out.freeze()
    }
}

/// XOR every byte with `key[i % 4]`. Applying twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_masked_client_text() {
        // RFC 6455 section 5.7: masked "Hello".
        let wire = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let (frame, used) = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(used, wire.len());
        assert!(frame.fin);
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.mask, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(frame.text_payload(), "Hello");

        // The same frame re-encodes to identical bytes.
        assert_eq!(&frame.encode()[..], &wire[..]);
    }

    #[test]
    fn partial_input_needs_more_bytes() {
        let wire = Frame::text("Hello").masked([1, 2, 3, 4]).encode();
        for end in 0..wire.len() {
            assert!(Frame::decode(&wire[..end]).unwrap().is_none(), "prefix {end}");
        }
    }

    #[test]
    fn extended_lengths() {
        let medium = Frame::new(OpCode::Binary, vec![7u8; 300]);
        let wire = medium.encode();
        assert_eq!(wire[1], 126);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 300);
        let (decoded, used) = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(used, 4 + 300);
        assert_eq!(decoded.payload.len(), 300);

        let large = Frame::new(OpCode::Binary, vec![1u8; 70_000]).masked([9, 8, 7, 6]);
        let wire = large.encode();
        assert_eq!(wire[1], 0x80 | 127);
        let (decoded, used) = Frame::decode(&wire).unwrap().unwrap();
        assert_eq!(used, 10 + 4 + 70_000);
        assert_eq!(decoded.payload, large.payload);
    }

    #[test]
    fn rejects_oversized_payloads() {
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&(MAX_PAYLOAD + 1).to_be_bytes());
        assert!(matches!(Frame::decode(&wire), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn opcodes() {
        assert_eq!(OpCode::from_u8(0x89), OpCode::Ping);
        assert_eq!(OpCode::from_u8(0x3), OpCode::Reserved(3));
        assert!(OpCode::Close.is_control());
        assert!(!OpCode::Text.is_control());
    }
}
