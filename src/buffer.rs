// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-capacity scratch buffer shared by the frame codec and the client/server engines.

use crate::error::Error;

/// Largest ADU this crate will build or accept: 1 (RTU unit id) + 253 (max PDU) + 2 (CRC), or
/// 7 (MBAP header) + 253 (max PDU) on TCP, rounded up to a tidy 260.
pub const CAPACITY: usize = 260;

/// A fixed `[u8; 260]` buffer with independent read/write cursors.
///
/// Mirrors the put/get shape of `bytes::BytesMut` + `byteorder::BigEndian` that the teacher
/// codec builds on, generalized to a non-growable backing array: every `put_*` is checked
/// against remaining capacity and every `get_*` is checked against remaining unread bytes.
#[derive(Debug, Clone)]
pub struct MsgBuf {
    data: [u8; CAPACITY],
    /// Number of valid bytes currently in `data`, starting at index 0.
    len: usize,
    /// Read cursor into `data[..len]`.
    pos: usize,
}

impl Default for MsgBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgBuf {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: [0; CAPACITY],
            len: 0,
            pos: 0,
        }
    }

    /// Clears the buffer and resets both cursors.
    pub fn reset(&mut self) {
        self.len = 0;
        self.pos = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes not yet consumed by `get_*`.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Raw capacity remaining for appends, independent of the read cursor.
    #[must_use]
    pub fn free(&self) -> usize {
        CAPACITY - self.len
    }

    /// Appends one byte. Caller must have checked `free() >= 1`.
    pub fn put_u8(&mut self, byte: u8) {
        debug_assert!(self.free() >= 1, "MsgBuf::put_u8 overflow");
        self.data[self.len] = byte;
        self.len += 1;
    }

    /// Appends a big-endian `u16`. Caller must have checked `free() >= 2`.
    pub fn put_u16_be(&mut self, value: u16) {
        debug_assert!(self.free() >= 2, "MsgBuf::put_u16_be overflow");
        let bytes = value.to_be_bytes();
        self.data[self.len] = bytes[0];
        self.data[self.len + 1] = bytes[1];
        self.len += 2;
    }

    /// Appends raw bytes. Caller must have checked `free() >= bytes.len()`.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(self.free() >= bytes.len(), "MsgBuf::put_bytes overflow");
        let end = self.len + bytes.len();
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
    }

    /// Reserves `n` zeroed bytes at the front of the buffer, shifting existing content right.
    /// Used to prepend a transport header after the PDU has already been written at offset 0.
    pub fn shift_right(&mut self, n: usize) {
        debug_assert!(self.free() >= n, "MsgBuf::shift_right overflow");
        self.data.copy_within(0..self.len, n);
        self.data[..n].fill(0);
        self.len += n;
    }

    /// Shifts the buffer right by `bytes.len()` and writes `bytes` into the freed space at the
    /// front. Used to prepend a transport header once the PDU has already been built at offset 0.
    pub fn prepend_bytes(&mut self, bytes: &[u8]) {
        self.shift_right(bytes.len());
        self.data[..bytes.len()].copy_from_slice(bytes);
    }

    /// Reads one byte, advancing the read cursor.
    pub fn get_u8(&mut self) -> Result<u8, Error> {
        if self.remaining() < 1 {
            return Err(Error::InvalidResponse);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a big-endian `u16`, advancing the read cursor.
    pub fn get_u16_be(&mut self) -> Result<u16, Error> {
        if self.remaining() < 2 {
            return Err(Error::InvalidResponse);
        }
        let value = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    /// Copies `out.len()` bytes, advancing the read cursor.
    pub fn get_bytes(&mut self, out: &mut [u8]) -> Result<(), Error> {
        if self.remaining() < out.len() {
            return Err(Error::InvalidResponse);
        }
        out.copy_from_slice(&self.data[self.pos..self.pos + out.len()]);
        self.pos += out.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let mut buf = MsgBuf::new();
        buf.put_u8(0x11);
        buf.put_u16_be(0x006B);
        buf.put_bytes(&[0xAA, 0xBB]);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.get_u8().unwrap(), 0x11);
        assert_eq!(buf.get_u16_be().unwrap(), 0x006B);
        let mut out = [0u8; 2];
        buf.get_bytes(&mut out).unwrap();
        assert_eq!(out, [0xAA, 0xBB]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn get_on_underflow_is_invalid_response() {
        let mut buf = MsgBuf::new();
        buf.put_u8(0x01);
        let _ = buf.get_u8().unwrap();
        assert_eq!(buf.get_u8(), Err(Error::InvalidResponse));
    }

    #[test]
    fn shift_right_prepends_header() {
        let mut buf = MsgBuf::new();
        buf.put_u8(0x03);
        buf.put_u16_be(0x006B);
        buf.shift_right(1);
        buf.data[0] = 0x11;
        assert_eq!(buf.as_slice(), [0x11, 0x03, 0x00, 0x6B]);
    }

    #[test]
    fn reset_clears_both_cursors() {
        let mut buf = MsgBuf::new();
        buf.put_u8(0xAA);
        let _ = buf.get_u8().unwrap();
        buf.reset();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.remaining(), 0);
    }
}
