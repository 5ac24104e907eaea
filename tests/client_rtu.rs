// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use common::ScriptedIo;
use modbus_core::bitfield::Bitfield;
use modbus_core::client::ModbusClient;
use modbus_core::error::{Error, Exception};

#[test]
fn scenario_1_read_holding_registers_round_trip() {
    let response = [
        0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64, 0x50, 0xA7,
    ];
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x11);
    let mut registers = [0u16; 3];
    client
        .read_holding_registers(0x006B, 3, &mut registers)
        .unwrap();
    assert_eq!(registers, [0x022B, 0x0000, 0x0064]);
}

#[test]
fn scenario_2_read_coils_bit_packing() {
    let response = [0x04, 0x01, 0x02, 0xCD, 0x6B, 0xAA, 0x3F];
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x04);
    let mut coils = Bitfield::new();
    client.read_coils(0x0000, 0x0010, &mut coils).unwrap();
    let expected = Bitfield::from_wire(&[0xCD, 0x6B], 16);
    for i in 0..16 {
        assert_eq!(coils.get(i), expected.get(i), "bit {i}");
    }
}

#[test]
fn scenario_3_exception_response() {
    let response = [0x11, 0x83, 0x02, 0xC0, 0xF1];
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x11);
    let mut registers = [0u16; 3];
    let err = client
        .read_holding_registers(0x006B, 3, &mut registers)
        .unwrap_err();
    assert_eq!(err, Error::Exception(Exception::IllegalDataAddress));
}

#[test]
fn scenario_5_broadcast_write_multiple_registers() {
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&[]), 0x00);
    client
        .write_multiple_registers(0x0000, &[0x000A, 0x0102])
        .unwrap();
}

#[test]
fn broadcast_reads_are_rejected_locally_without_touching_the_transport() {
    for function_under_test in 0..4 {
        let mut client = ModbusClient::new_rtu(ScriptedIo::new(&[]), 0x00);
        let mut registers = [0u16; 1];
        let mut coils = Bitfield::new();
        let result = match function_under_test {
            0 => client.read_coils(0, 1, &mut coils),
            1 => client.read_discrete_inputs(0, 1, &mut coils),
            2 => client.read_holding_registers(0, 1, &mut registers),
            _ => client.read_input_registers(0, 1, &mut registers),
        };
        assert_eq!(result, Err(Error::InvalidArgument));
    }
}

#[test]
fn quantity_above_bound_is_rejected_locally() {
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&[]), 0x11);
    let mut registers = [0u16; 126];
    assert_eq!(
        client.read_holding_registers(0, 126, &mut registers),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn p8_echo_mismatch_on_write_single_coil_is_invalid_response() {
    // Server echoes back address 0x0001 instead of the requested 0x0000.
    let response = [0x11, 0x05, 0x00, 0x01, 0xFF, 0x00];
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x11);
    assert_eq!(
        client.write_single_coil(0x0000, true),
        Err(Error::InvalidResponse)
    );
}

#[test]
fn p1_single_byte_flip_in_response_breaks_crc() {
    let mut response = [
        0x11, 0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64, 0x50, 0xA7,
    ];
    response[4] ^= 0xFF;
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x11);
    let mut registers = [0u16; 3];
    assert_eq!(
        client.read_holding_registers(0x006B, 3, &mut registers),
        Err(Error::InvalidResponse)
    );
}

#[test]
fn raw_pdu_round_trip() {
    // a server echoing back a custom-looking FC/payload pair
    let response = [0x11, 0x64, 0xAA, 0xBB, 0xCC, 0x95, 0xB6];
    let mut client = ModbusClient::new_rtu(ScriptedIo::new(&response), 0x11);
    client.send_raw_pdu(0x64, &[0x01, 0x02]).unwrap();
    let mut out = [0u8; 8];
    let n = client.receive_raw_pdu_response(&mut out).unwrap();
    assert_eq!(&out[..n], [0xAA, 0xBB, 0xCC]);
}
