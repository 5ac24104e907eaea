// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The host-provided byte transport and the deadline bookkeeping built on top of it.

use crate::error::Error;

/// Outcome of a single `read_byte`/`write_byte` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// The byte was transferred before the deadline.
    Ready,
    /// The deadline elapsed with no byte transferred.
    TimedOut,
    /// The host reported a transport-level failure.
    Error,
}

/// The three byte-level primitives a host must provide; the Rust analogue of the C ABI's
/// `nmbs_platform_conf` function-pointer triple.
///
/// A negative `deadline_ms` means "wait forever". Implementations own whatever state they need
/// (the serial handle, socket fd, ...); there is no separate opaque user-data pointer, since
/// that role is filled by `Self`.
pub trait PlatformIo {
    /// Reads one byte into `*out`, waiting at most `deadline_ms` milliseconds.
    fn read_byte(&mut self, out: &mut u8, deadline_ms: i32) -> IoStatus;

    /// Writes one byte, waiting at most `deadline_ms` milliseconds for the host to accept it.
    fn write_byte(&mut self, byte: u8, deadline_ms: i32) -> IoStatus;

    /// Blocks the caller for approximately `ms` milliseconds. Used for inter-byte spacing on
    /// RTU sends; never called on receive.
    fn sleep(&mut self, ms: u32);
}

/// Composite recv/send operations layered on a [`PlatformIo`], enforcing the frame/byte deadline
/// split described in the data model.
#[derive(Debug)]
pub struct Io<'a, T> {
    platform: &'a mut T,
}

impl<'a, T: PlatformIo> Io<'a, T> {
    pub fn new(platform: &'a mut T) -> Self {
        Self { platform }
    }

    /// Fills `buf` completely. The first byte must arrive within `read_timeout_ms`; every
    /// subsequent byte must arrive within `byte_timeout_ms`.
    pub fn recv(
        &mut self,
        buf: &mut [u8],
        read_timeout_ms: i32,
        byte_timeout_ms: i32,
    ) -> Result<(), Error> {
        for (i, slot) in buf.iter_mut().enumerate() {
            let deadline = if i == 0 {
                read_timeout_ms
            } else {
                byte_timeout_ms
            };
            match self.platform.read_byte(slot, deadline) {
                IoStatus::Ready => {}
                IoStatus::TimedOut => return Err(Error::Timeout),
                IoStatus::Error => return Err(Error::Transport),
            }
        }
        Ok(())
    }

    /// Writes every byte in `bytes`, sleeping `byte_spacing_ms` between bytes (RTU pacing; pass
    /// `0` on TCP).
    pub fn send(
        &mut self,
        bytes: &[u8],
        byte_timeout_ms: i32,
        byte_spacing_ms: u32,
    ) -> Result<(), Error> {
        for (i, &byte) in bytes.iter().enumerate() {
            if i > 0 && byte_spacing_ms > 0 {
                self.platform.sleep(byte_spacing_ms);
            }
            match self.platform.write_byte(byte, byte_timeout_ms) {
                IoStatus::Ready => {}
                IoStatus::TimedOut => return Err(Error::Timeout),
                IoStatus::Error => return Err(Error::Transport),
            }
        }
        Ok(())
    }
}
