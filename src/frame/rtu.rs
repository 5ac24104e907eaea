// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU ADU framing: `[unit_id][pdu][crc16 LE]`.

use super::{fc, is_exception, Direction, MAX_ADU_LEN, MAX_PDU_LEN};
use crate::buffer::MsgBuf;
use crate::crc;
use crate::error::Error;
use crate::transport::{Io, PlatformIo};

/// How many more bytes follow a PDU's function-code byte, for a given direction.
///
/// Looked up once per frame by both the client-response and server-request decode paths,
/// rather than re-deriving the per-FC length rule at each call site.
#[derive(Debug, Clone, Copy)]
pub enum TailShape {
    /// Exactly `n` more bytes, independent of their contents.
    Fixed(usize),
    /// `offset` fixed bytes, then a one-byte count, then that many more bytes.
    LenPrefixed { offset: usize },
}

impl TailShape {
    #[must_use]
    pub fn prefix_len(self) -> usize {
        match self {
            Self::Fixed(n) => n,
            Self::LenPrefixed { offset } => offset + 1,
        }
    }

    /// Total additional-byte count, given at least `prefix_len()` bytes already read.
    #[must_use]
    pub fn total_len(self, prefix: &[u8]) -> usize {
        match self {
            Self::Fixed(n) => n,
            Self::LenPrefixed { offset } => offset + 1 + usize::from(prefix[offset]),
        }
    }
}

/// Looks up the tail shape for a known function code. Returns `None` for function codes this
/// crate does not implement; callers fall back to reading until a byte-timeout gap.
#[must_use]
pub fn tail_shape(function_code: u8, direction: Direction) -> Option<TailShape> {
    use Direction::{Request, Response};
    match (function_code, direction) {
        (fc::READ_COILS, Request)
        | (fc::READ_DISCRETE_INPUTS, Request)
        | (fc::READ_HOLDING_REGISTERS, Request)
        | (fc::READ_INPUT_REGISTERS, Request)
        | (fc::WRITE_SINGLE_COIL, Request)
        | (fc::WRITE_SINGLE_REGISTER, Request)
        | (fc::WRITE_SINGLE_COIL, Response)
        | (fc::WRITE_SINGLE_REGISTER, Response)
        | (fc::WRITE_MULTIPLE_COILS, Response)
        | (fc::WRITE_MULTIPLE_REGISTERS, Response) => Some(TailShape::Fixed(4)),

        (fc::READ_COILS, Response)
        | (fc::READ_DISCRETE_INPUTS, Response)
        | (fc::READ_HOLDING_REGISTERS, Response)
        | (fc::READ_INPUT_REGISTERS, Response) => Some(TailShape::LenPrefixed { offset: 0 }),

        (fc::WRITE_MULTIPLE_COILS, Request) | (fc::WRITE_MULTIPLE_REGISTERS, Request) => {
            Some(TailShape::LenPrefixed { offset: 4 })
        }

        _ => None,
    }
}

/// Prepends `unit_id` and appends the CRC-16 trailer to a PDU already built at offset 0 of
/// `buf`, turning it into a complete RTU ADU ready for [`Io::send`].
pub fn build(buf: &mut MsgBuf, unit_id: u8) {
    buf.prepend_bytes(&[unit_id]);
    let trailer = crc::append(buf.as_slice());
    buf.put_bytes(&trailer);
}

/// Receives one complete RTU ADU (`unit_id`, PDU, CRC) into `buf`, validating the CRC.
///
/// On return, `buf`'s read cursor is at the start of the ADU (`unit_id`), ready for
/// `get_u8`/`get_u16_be`/`get_bytes` to walk the header and payload.
pub fn recv<T: PlatformIo>(
    io: &mut Io<'_, T>,
    buf: &mut MsgBuf,
    direction: Direction,
    read_timeout_ms: i32,
    byte_timeout_ms: i32,
) -> Result<(), Error> {
    buf.reset();

    let mut head = [0u8; 2];
    io.recv(&mut head, read_timeout_ms, byte_timeout_ms)?;
    buf.put_bytes(&head);

    let shape = if is_exception(head[1]) {
        Some(TailShape::Fixed(1))
    } else {
        tail_shape(head[1], direction)
    };

    let crc_bytes = match shape {
        Some(shape) => {
            let prefix_len = shape.prefix_len();
            let mut prefix = [0u8; 8];
            if prefix_len > 0 {
                io.recv(&mut prefix[..prefix_len], byte_timeout_ms, byte_timeout_ms)?;
                buf.put_bytes(&prefix[..prefix_len]);
            }
            let total = shape.total_len(&prefix[..prefix_len]);
            if total < prefix_len || total > MAX_PDU_LEN - 1 {
                return Err(Error::InvalidResponse);
            }
            let remaining = total - prefix_len;
            if remaining > 0 {
                let mut rest = [0u8; MAX_PDU_LEN];
                io.recv(&mut rest[..remaining], byte_timeout_ms, byte_timeout_ms)?;
                buf.put_bytes(&rest[..remaining]);
            }
            let mut trailer = [0u8; 2];
            io.recv(&mut trailer, byte_timeout_ms, byte_timeout_ms)?;
            trailer
        }
        None => {
            loop {
                if buf.len() >= MAX_ADU_LEN {
                    break;
                }
                let mut byte = [0u8; 1];
                match io.recv(&mut byte, byte_timeout_ms, byte_timeout_ms) {
                    Ok(()) => buf.put_bytes(&byte),
                    Err(Error::Timeout) => break,
                    Err(other) => return Err(other),
                }
            }
            if buf.len() < 4 {
                return Err(Error::InvalidResponse);
            }
            let tail = buf.as_slice();
            [tail[tail.len() - 2], tail[tail.len() - 1]]
        }
    };

    let body_len = match shape {
        Some(_) => buf.len(),
        None => buf.len() - 2,
    };
    if !crc::check(&buf.as_slice()[..body_len], crc_bytes) {
        return Err(Error::InvalidResponse);
    }
    if shape.is_some() {
        buf.put_bytes(&crc_bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct FixedIo {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl FixedIo {
        fn new(bytes: &[u8]) -> Self {
            Self {
                bytes: bytes.to_vec(),
                pos: 0,
            }
        }
    }

    impl PlatformIo for FixedIo {
        fn read_byte(&mut self, out: &mut u8, _deadline_ms: i32) -> crate::transport::IoStatus {
            match self.bytes.get(self.pos) {
                Some(&b) => {
                    *out = b;
                    self.pos += 1;
                    crate::transport::IoStatus::Ready
                }
                None => crate::transport::IoStatus::TimedOut,
            }
        }

        fn write_byte(&mut self, _byte: u8, _deadline_ms: i32) -> crate::transport::IoStatus {
            crate::transport::IoStatus::Ready
        }

        fn sleep(&mut self, _ms: u32) {}
    }

    #[test]
    fn tail_shape_known_vs_unknown() {
        assert!(tail_shape(fc::READ_COILS, Direction::Request).is_some());
        assert!(tail_shape(fc::READ_COILS, Direction::Response).is_some());
        assert!(tail_shape(0x07, Direction::Request).is_none());
    }

    #[test]
    fn build_matches_scenario_1_request() {
        // spec scenario 1: FC 3 request, unit 0x11, addr 0x006B, qty 0x0003
        let mut buf = MsgBuf::new();
        buf.put_u8(fc::READ_HOLDING_REGISTERS);
        buf.put_u16_be(0x006B);
        buf.put_u16_be(0x0003);
        build(&mut buf, 0x11);
        assert_eq!(
            buf.as_slice(),
            [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
        );
    }

    #[test]
    fn recv_decodes_scenario_1_response() {
        let wire = [0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64, 0x50, 0xA7];
        let mut platform = FixedIo::new(&wire);
        let mut io = Io::new(&mut platform);
        let mut buf = MsgBuf::new();
        recv(&mut io, &mut buf, Direction::Response, 1000, 100).unwrap();
        assert_eq!(buf.as_slice(), wire);
    }

    #[test]
    fn recv_rejects_corrupted_crc() {
        let mut wire = [0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64, 0x50, 0xA7];
        wire[3] ^= 0xFF;
        let mut platform = FixedIo::new(&wire);
        let mut io = Io::new(&mut platform);
        let mut buf = MsgBuf::new();
        assert_eq!(
            recv(&mut io, &mut buf, Direction::Response, 1000, 100),
            Err(Error::InvalidResponse)
        );
    }

    #[test]
    fn recv_decodes_exception_response() {
        // spec scenario 3: server replies with IllegalDataAddress to an FC 3 request
        let wire = [0x11, 0x83, 0x02, 0xC0, 0xF1];
        let mut platform = FixedIo::new(&wire);
        let mut io = Io::new(&mut platform);
        let mut buf = MsgBuf::new();
        recv(&mut io, &mut buf, Direction::Response, 1000, 100).unwrap();
        assert_eq!(buf.as_slice(), wire);
    }
}
