// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! RTU unit-id addressing helpers.

/// The reserved RTU unit id that marks a request as a broadcast: no response is sent or
/// awaited.
///
/// Mirrors `tokio-modbus`'s `Slave::broadcast()` and the original C library's
/// `NMBS_BROADCAST_ADDRESS`.
pub const BROADCAST_ADDRESS: u8 = 0;

#[must_use]
pub const fn is_broadcast(unit_id: u8) -> bool {
    unit_id == BROADCAST_ADDRESS
}

/// `true` for every unit id that addresses exactly one device (i.e. not the broadcast address).
#[must_use]
pub const fn is_single_device(unit_id: u8) -> bool {
    !is_broadcast(unit_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_is_zero() {
        assert!(is_broadcast(0));
        assert!(!is_single_device(0));
        assert!(is_single_device(1));
        assert!(is_single_device(0x11));
    }
}
