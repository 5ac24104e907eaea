// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::explicit_deref_methods)]
#![warn(rustdoc::broken_intra_doc_links)]
#![doc = include_str!("../README.md")]

pub mod bitfield;
mod buffer;
mod crc;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod transport;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
pub mod server;
