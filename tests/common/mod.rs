// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A scripted [`PlatformIo`] mock shared by the integration tests: feeds back a fixed byte
//! sequence on read and records every written byte, mirroring `tokio-modbus`'s
//! `service::rtu::test::MockTransport` but for the blocking byte-callback ABI.

use modbus_core::transport::{IoStatus, PlatformIo};

pub struct ScriptedIo {
    rx: Vec<u8>,
    rx_pos: usize,
    pub tx: Vec<u8>,
}

impl ScriptedIo {
    pub fn new(rx: &[u8]) -> Self {
        Self {
            rx: rx.to_vec(),
            rx_pos: 0,
            tx: Vec::new(),
        }
    }
}

impl PlatformIo for ScriptedIo {
    fn read_byte(&mut self, out: &mut u8, _deadline_ms: i32) -> IoStatus {
        match self.rx.get(self.rx_pos) {
            Some(&byte) => {
                *out = byte;
                self.rx_pos += 1;
                IoStatus::Ready
            }
            None => IoStatus::TimedOut,
        }
    }

    fn write_byte(&mut self, byte: u8, _deadline_ms: i32) -> IoStatus {
        self.tx.push(byte);
        IoStatus::Ready
    }

    fn sleep(&mut self, _ms: u32) {}
}
