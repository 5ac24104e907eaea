// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Function-code constants, exception-bit helpers, and per-transport ADU framing.

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

/// The eight function codes this core implements.
pub mod fc {
    pub const READ_COILS: u8 = 0x01;
    pub const READ_DISCRETE_INPUTS: u8 = 0x02;
    pub const READ_HOLDING_REGISTERS: u8 = 0x03;
    pub const READ_INPUT_REGISTERS: u8 = 0x04;
    pub const WRITE_SINGLE_COIL: u8 = 0x05;
    pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
    pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
    pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
}

/// Set on a PDU's function-code byte to mark it as an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Largest ADU this crate builds or parses on either transport.
pub const MAX_ADU_LEN: usize = crate::buffer::CAPACITY;

/// Largest PDU (function code + payload), per the Modbus application protocol spec.
pub const MAX_PDU_LEN: usize = 253;

#[must_use]
pub const fn is_exception(fc: u8) -> bool {
    fc & EXCEPTION_BIT != 0
}

#[must_use]
pub const fn apply_exception(fc: u8) -> u8 {
    fc | EXCEPTION_BIT
}

#[must_use]
pub const fn strip_exception(fc: u8) -> u8 {
    fc & !EXCEPTION_BIT
}

/// Inclusive `(min, max)` quantity bounds for the function codes that carry a quantity field.
/// Returns `None` for FC 5/6, which have no quantity (they address a single coil/register).
#[must_use]
pub fn quantity_bounds(function_code: u8) -> Option<(u16, u16)> {
    match function_code {
        fc::READ_COILS | fc::READ_DISCRETE_INPUTS => Some((1, 2000)),
        fc::READ_HOLDING_REGISTERS | fc::READ_INPUT_REGISTERS => Some((1, 125)),
        fc::WRITE_MULTIPLE_COILS => Some((1, 1968)),
        fc::WRITE_MULTIPLE_REGISTERS => Some((1, 123)),
        _ => None,
    }
}

/// Which side of the exchange a frame is being built/parsed for; several function codes have a
/// different wire shape for their request than for their response (e.g. FC 1: fixed-length
/// request, byte-count-prefixed response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_bit_helpers_round_trip() {
        assert!(!is_exception(fc::READ_COILS));
        let marked = apply_exception(fc::READ_COILS);
        assert!(is_exception(marked));
        assert_eq!(strip_exception(marked), fc::READ_COILS);
    }

    #[test]
    fn quantity_bounds_cover_the_eight_function_codes() {
        assert_eq!(quantity_bounds(fc::READ_COILS), Some((1, 2000)));
        assert_eq!(quantity_bounds(fc::READ_HOLDING_REGISTERS), Some((1, 125)));
        assert_eq!(quantity_bounds(fc::WRITE_MULTIPLE_COILS), Some((1, 1968)));
        assert_eq!(
            quantity_bounds(fc::WRITE_MULTIPLE_REGISTERS),
            Some((1, 123))
        );
        assert_eq!(quantity_bounds(fc::WRITE_SINGLE_COIL), None);
    }
}
