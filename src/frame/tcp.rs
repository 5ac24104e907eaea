// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP ADU framing: the 7-byte MBAP header (`tid`, `proto`, `len`, `unit_id`) plus PDU.

use super::MAX_PDU_LEN;
use crate::buffer::MsgBuf;
use crate::error::Error;
use crate::transport::{Io, PlatformIo};

/// Size of the MBAP header in bytes.
pub const HEADER_LEN: usize = 7;

/// Prepends the MBAP header to a PDU already built at offset 0 of `buf`.
pub fn build(buf: &mut MsgBuf, transaction_id: u16, unit_id: u8) {
    let pdu_len = buf.len();
    let length = 1 + pdu_len as u16;
    let mut header = [0u8; HEADER_LEN];
    header[0..2].copy_from_slice(&transaction_id.to_be_bytes());
    header[2..4].copy_from_slice(&0u16.to_be_bytes());
    header[4..6].copy_from_slice(&length.to_be_bytes());
    header[6] = unit_id;
    buf.prepend_bytes(&header);
}

/// Receives one complete TCP ADU into `buf`, validating `proto == 0` and the declared length.
///
/// If `expected_tid` is `Some`, frames whose transaction id does not match are silently
/// discarded and the read retried, each attempt bounded independently by `read_timeout_ms` for
/// its first header byte (there is no cumulative elapsed-time budget across retries, since the
/// deadline is always supplied fresh to the host per call).
pub fn recv<T: PlatformIo>(
    io: &mut Io<'_, T>,
    buf: &mut MsgBuf,
    expected_tid: Option<u16>,
    read_timeout_ms: i32,
    byte_timeout_ms: i32,
) -> Result<(), Error> {
    loop {
        buf.reset();
        let mut header = [0u8; HEADER_LEN];
        io.recv(&mut header, read_timeout_ms, byte_timeout_ms)?;
        buf.put_bytes(&header);

        let tid = u16::from_be_bytes([header[0], header[1]]);
        let proto = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]);
        if proto != 0 {
            return Err(Error::InvalidResponse);
        }
        if length == 0 {
            return Err(Error::InvalidResponse);
        }
        let pdu_len = usize::from(length - 1);
        if pdu_len > MAX_PDU_LEN {
            return Err(Error::InvalidResponse);
        }
        let mut pdu = [0u8; MAX_PDU_LEN];
        io.recv(&mut pdu[..pdu_len], byte_timeout_ms, byte_timeout_ms)?;
        buf.put_bytes(&pdu[..pdu_len]);

        if let Some(expected) = expected_tid {
            if tid != expected {
                log::debug!("discarding stray TCP frame with tid {tid:#06x}, expected {expected:#06x}");
                continue;
            }
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fc;
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
    fn build_matches_scenario_4() {
        // spec scenario 4: TCP FC 6, tid=1, unit=0xFF, addr=1, val=3
        let mut buf = MsgBuf::new();
        buf.put_u8(fc::WRITE_SINGLE_REGISTER);
        buf.put_u16_be(0x0001);
        buf.put_u16_be(0x0003);
        build(&mut buf, 1, 0xFF);
        assert_eq!(
            buf.as_slice(),
            [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x06, 0x00, 0x01, 0x00, 0x03]
        );
    }

    #[test]
    fn recv_rejects_nonzero_protocol_id() {
        let wire = [0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0xFF, 0x06, 0x00, 0x01, 0x00, 0x03];
        let mut platform = FixedIo::new(&wire);
        let mut io = Io::new(&mut platform);
        let mut buf = MsgBuf::new();
        assert_eq!(
            recv(&mut io, &mut buf, Some(1), 1000, 100),
            Err(Error::InvalidResponse)
        );
    }

    #[test]
    fn recv_discards_mismatched_transaction_id() {
        // a stray frame for tid=9 arrives first, then the real tid=1 response
        let wire = [
            0x00, 0x09, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x06, 0x00, 0x01, 0x00, 0x03, //
            0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x06, 0x00, 0x01, 0x00, 0x03,
        ];
        let mut platform = FixedIo::new(&wire);
        let mut io = Io::new(&mut platform);
        let mut buf = MsgBuf::new();
        recv(&mut io, &mut buf, Some(1), 1000, 100).unwrap();
        assert_eq!(buf.as_slice(), &wire[12..]);
    }
}
