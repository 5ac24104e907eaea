// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common imports for consumers of this crate.
//!
//! ```
//! use modbus_core::prelude::*;
//! ```

pub use crate::bitfield::Bitfield;
pub use crate::error::{Error, Exception, Result};
pub use crate::transport::{Io, IoStatus, PlatformIo};

#[cfg(feature = "client")]
pub use crate::client::ModbusClient;

#[cfg(feature = "server")]
pub use crate::server::{ModbusServer, ServerCallbacks};

#[cfg(feature = "rtu")]
pub use crate::rtu::{is_broadcast, is_single_device, BROADCAST_ADDRESS};
