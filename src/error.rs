// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Library error type and the Modbus exception taxonomy.

use core::fmt;

/// A Modbus exception, as carried in an exception response PDU.
///
/// The discriminant equals the wire exception code, so `exception as u8` round-trips through
/// [`Exception::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exception {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
    ServerDeviceFailure = 4,
}

impl Exception {
    /// Recover an [`Exception`] from a wire exception code, if it is one of the four this core
    /// knows about.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::IllegalFunction),
            2 => Some(Self::IllegalDataAddress),
            3 => Some(Self::IllegalDataValue),
            4 => Some(Self::ServerDeviceFailure),
            _ => None,
        }
    }

    /// The wire exception code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IllegalFunction => "illegal function",
            Self::IllegalDataAddress => "illegal data address",
            Self::IllegalDataValue => "illegal data value",
            Self::ServerDeviceFailure => "server device failure",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modbus core errors.
///
/// Values that would be `<= 0` in the C ABI this crate distills (transport/timeout/framing/
/// argument errors) and success (`Ok(())`/`Ok(T)`) are kept separate from the `1..=4` Modbus
/// exception range, which is its own [`Exception`] type wrapped in [`Error::Exception`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The host transport primitive (`read_byte`/`write_byte`) reported an error.
    Transport,
    /// A read or write did not complete before its deadline.
    Timeout,
    /// A received frame failed to validate: framing, CRC, length, echoed-parameter mismatch, or
    /// (on TCP) a non-zero MBAP protocol identifier.
    InvalidResponse,
    /// A caller-supplied argument violates a protocol precondition (address/quantity bounds,
    /// broadcast used with a read function code, ...).
    InvalidArgument,
    /// A Modbus exception was received from (client) or is to be sent to (server) the peer.
    Exception(Exception),
}

impl Error {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport error",
            Self::Timeout => "timeout",
            Self::InvalidResponse => "invalid response",
            Self::InvalidArgument => "invalid argument",
            Self::Exception(exception) => exception.as_str(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Exception> for Error {
    fn from(exception: Exception) -> Self {
        Self::Exception(exception)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// A specialized [`Result`](core::result::Result) for Modbus operations.
pub type Result<T> = core::result::Result<T, Error>;
