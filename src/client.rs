// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client (master) transaction engine: one method per data-access function code, plus the
//! raw PDU escape hatch.

use crate::bitfield::{self, Bitfield};
use crate::buffer::MsgBuf;
use crate::error::{Error, Exception, Result};
use crate::frame::{fc, is_exception, quantity_bounds, Direction, MAX_PDU_LEN};
#[cfg(feature = "rtu")]
use crate::frame::rtu as rtu_frame;
#[cfg(feature = "tcp")]
use crate::frame::tcp as tcp_frame;
use crate::transport::{Io, PlatformIo};

const DEFAULT_READ_TIMEOUT_MS: i32 = 1000;
const DEFAULT_BYTE_TIMEOUT_MS: i32 = 100;
const DEFAULT_BYTE_SPACING_MS: u32 = 0;

/// Which wire framing a [`ModbusClient`] speaks, and the per-transport addressing state that
/// goes with it.
#[derive(Debug, Clone, Copy)]
enum Link {
    #[cfg(feature = "rtu")]
    Rtu { unit_id: u8 },
    #[cfg(feature = "tcp")]
    Tcp { current_tid: u16, unit_id: u8 },
}

/// A Modbus client (master) bound to one host transport.
///
/// Built via [`ModbusClient::new_rtu`] or [`ModbusClient::new_tcp`]; every subsequent request
/// goes through exactly one of the eight typed methods below, or the raw PDU escape hatch. The
/// handle owns no register/coil state of its own, callers supply and receive plain buffers.
pub struct ModbusClient<T: PlatformIo> {
    io: T,
    link: Link,
    buf: MsgBuf,
    read_timeout_ms: i32,
    byte_timeout_ms: i32,
    byte_spacing_ms: u32,
}

impl<T: PlatformIo> core::fmt::Debug for ModbusClient<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModbusClient")
            .field("link", &self.link)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("byte_timeout_ms", &self.byte_timeout_ms)
            .field("byte_spacing_ms", &self.byte_spacing_ms)
            .finish()
    }
}

impl<T: PlatformIo> ModbusClient<T> {
    /// Creates an RTU client that will address `unit_id` by default. `unit_id == 0`
    /// ([`crate::rtu::BROADCAST_ADDRESS`]) makes every write call a broadcast and every read
    /// call fail locally with [`Error::InvalidArgument`] (§4.5 broadcast rule).
    #[cfg(feature = "rtu")]
    #[must_use]
    pub fn new_rtu(io: T, unit_id: u8) -> Self {
        Self {
            io,
            link: Link::Rtu { unit_id },
            buf: MsgBuf::new(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            byte_spacing_ms: DEFAULT_BYTE_SPACING_MS,
        }
    }

    /// Creates a TCP client that addresses `unit_id` in the MBAP header of every request (the
    /// common case is a gateway pass-through id; plain Modbus TCP servers ignore it).
    #[cfg(feature = "tcp")]
    #[must_use]
    pub fn new_tcp(io: T, unit_id: u8) -> Self {
        Self {
            io,
            link: Link::Tcp {
                current_tid: 0,
                unit_id,
            },
            buf: MsgBuf::new(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            byte_spacing_ms: DEFAULT_BYTE_SPACING_MS,
        }
    }

    /// Access to the underlying host transport, e.g. to inspect a test double.
    pub fn transport(&self) -> &T {
        &self.io
    }

    pub fn set_read_timeout(&mut self, read_timeout_ms: i32) {
        self.read_timeout_ms = read_timeout_ms;
    }

    pub fn set_byte_timeout(&mut self, byte_timeout_ms: i32) {
        self.byte_timeout_ms = byte_timeout_ms;
    }

    pub fn set_byte_spacing(&mut self, byte_spacing_ms: u32) {
        self.byte_spacing_ms = byte_spacing_ms;
    }

    /// Changes the RTU unit id addressed by subsequent requests. A no-op on a TCP client.
    #[cfg(feature = "rtu")]
    pub fn set_destination_rtu_address(&mut self, unit_id: u8) {
        if let Link::Rtu { unit_id: dest } = &mut self.link {
            *dest = unit_id;
        }
    }

    fn is_broadcast(&self) -> bool {
        match self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { unit_id } => crate::rtu::is_broadcast(unit_id),
            #[cfg(feature = "tcp")]
            Link::Tcp { .. } => false,
        }
    }

    /// Bytes following the PDU on the wire that `receive_raw_pdu_response` must not hand back
    /// to the caller (the RTU CRC trailer; nothing on TCP).
    fn trailer_len(&self) -> usize {
        match self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { .. } => 2,
            #[cfg(feature = "tcp")]
            Link::Tcp { .. } => 0,
        }
    }

    /// Frames the PDU already sitting at offset 0 of `self.buf` and writes it to the transport.
    fn send_adu(&mut self) -> Result<()> {
        let byte_spacing_ms = match &mut self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { unit_id } => {
                rtu_frame::build(&mut self.buf, *unit_id);
                self.byte_spacing_ms
            }
            #[cfg(feature = "tcp")]
            Link::Tcp {
                current_tid,
                unit_id,
            } => {
                *current_tid = current_tid.wrapping_add(1);
                tcp_frame::build(&mut self.buf, *current_tid, *unit_id);
                0
            }
        };
        let mut io = Io::new(&mut self.io);
        io.send(self.buf.as_slice(), self.byte_timeout_ms, byte_spacing_ms)
    }

    /// Awaits and frames the matching response, leaving the read cursor positioned right after
    /// the function-code byte. Returns the response's function code.
    fn recv_response(&mut self) -> Result<u8> {
        match self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { .. } => {
                let mut io = Io::new(&mut self.io);
                rtu_frame::recv(
                    &mut io,
                    &mut self.buf,
                    Direction::Response,
                    self.read_timeout_ms,
                    self.byte_timeout_ms,
                )?;
                let _unit_id = self.buf.get_u8()?;
                self.buf.get_u8()
            }
            #[cfg(feature = "tcp")]
            Link::Tcp { current_tid, .. } => {
                let mut io = Io::new(&mut self.io);
                tcp_frame::recv(
                    &mut io,
                    &mut self.buf,
                    Some(current_tid),
                    self.read_timeout_ms,
                    self.byte_timeout_ms,
                )?;
                let _tid = self.buf.get_u16_be()?;
                let _proto = self.buf.get_u16_be()?;
                let _len = self.buf.get_u16_be()?;
                let _unit_id = self.buf.get_u8()?;
                self.buf.get_u8()
            }
        }
    }

    /// Validates the response's function code against the request's (I3), unpacking the
    /// exception code and returning [`Error::Exception`] if the top bit is set.
    fn check_response_fc(&mut self, request_fc: u8, response_fc: u8) -> Result<()> {
        if is_exception(response_fc) {
            let code = self.buf.get_u8()?;
            let exception = Exception::from_code(code).ok_or(Error::InvalidResponse)?;
            log::debug!("received exception {exception} for function code {request_fc:#04x}");
            return Err(Error::Exception(exception));
        }
        if response_fc != request_fc {
            log::warn!(
                "response function code {response_fc:#04x} does not match request {request_fc:#04x}"
            );
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    fn check_quantity(function_code: u8, quantity: u16) -> Result<()> {
        if let Some((min, max)) = quantity_bounds(function_code) {
            if quantity < min || quantity > max {
                return Err(Error::InvalidArgument);
            }
        }
        Ok(())
    }

    fn read_bits(
        &mut self,
        function_code: u8,
        address: u16,
        quantity: u16,
        out: &mut Bitfield,
    ) -> Result<()> {
        Self::check_quantity(function_code, quantity)?;
        if self.is_broadcast() {
            // Reads are not meaningful as a broadcast; reject before touching the transport.
            return Err(Error::InvalidArgument);
        }
        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        self.send_adu()?;
        let response_fc = self.recv_response()?;
        self.check_response_fc(function_code, response_fc)?;
        let byte_count = usize::from(self.buf.get_u8()?);
        let expected = Bitfield::byte_count(usize::from(quantity));
        if byte_count != expected || self.buf.remaining() < byte_count {
            return Err(Error::InvalidResponse);
        }
        let mut raw = [0u8; bitfield::CAPACITY];
        self.buf.get_bytes(&mut raw[..byte_count])?;
        *out = Bitfield::from_wire(&raw[..byte_count], usize::from(quantity));
        Ok(())
    }

    /// FC 1: reads `quantity` coils starting at `address` into `out`.
    pub fn read_coils(&mut self, address: u16, quantity: u16, out: &mut Bitfield) -> Result<()> {
        self.read_bits(fc::READ_COILS, address, quantity, out)
    }

    /// FC 2: reads `quantity` discrete inputs starting at `address` into `out`.
    pub fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut Bitfield,
    ) -> Result<()> {
        self.read_bits(fc::READ_DISCRETE_INPUTS, address, quantity, out)
    }

    fn read_registers(
        &mut self,
        function_code: u8,
        address: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> Result<()> {
        Self::check_quantity(function_code, quantity)?;
        if out.len() < usize::from(quantity) {
            return Err(Error::InvalidArgument);
        }
        if self.is_broadcast() {
            return Err(Error::InvalidArgument);
        }
        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        self.send_adu()?;
        let response_fc = self.recv_response()?;
        self.check_response_fc(function_code, response_fc)?;
        let byte_count = usize::from(self.buf.get_u8()?);
        if byte_count != 2 * usize::from(quantity) || self.buf.remaining() < byte_count {
            return Err(Error::InvalidResponse);
        }
        for slot in out.iter_mut().take(usize::from(quantity)) {
            *slot = self.buf.get_u16_be()?;
        }
        Ok(())
    }

    /// FC 3: reads `quantity` holding registers starting at `address` into `out`.
    pub fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> Result<()> {
        self.read_registers(fc::READ_HOLDING_REGISTERS, address, quantity, out)
    }

    /// FC 4: reads `quantity` input registers starting at `address` into `out`.
    pub fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
        out: &mut [u16],
    ) -> Result<()> {
        self.read_registers(fc::READ_INPUT_REGISTERS, address, quantity, out)
    }

    fn write_single(&mut self, function_code: u8, address: u16, raw_value: u16) -> Result<()> {
        let mut payload = [0u8; 4];
        payload[0..2].copy_from_slice(&address.to_be_bytes());
        payload[2..4].copy_from_slice(&raw_value.to_be_bytes());

        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_bytes(&payload);

        if self.is_broadcast() {
            self.send_adu()?;
            return Ok(());
        }
        self.send_adu()?;
        let response_fc = self.recv_response()?;
        self.check_response_fc(function_code, response_fc)?;
        let mut echoed = [0u8; 4];
        self.buf.get_bytes(&mut echoed)?;
        if echoed != payload {
            log::warn!("write echo mismatch for function code {function_code:#04x}");
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// FC 5: writes a single coil. `value` is encoded on the wire as `0xFF00`/`0x0000`.
    pub fn write_single_coil(&mut self, address: u16, value: bool) -> Result<()> {
        self.write_single(
            fc::WRITE_SINGLE_COIL,
            address,
            if value { 0xFF00 } else { 0x0000 },
        )
    }

    /// FC 6: writes a single holding register.
    pub fn write_single_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.write_single(fc::WRITE_SINGLE_REGISTER, address, value)
    }

    /// FC 15: writes `quantity` coils starting at `address` from `bits`.
    pub fn write_multiple_coils(
        &mut self,
        address: u16,
        quantity: u16,
        bits: &Bitfield,
    ) -> Result<()> {
        Self::check_quantity(fc::WRITE_MULTIPLE_COILS, quantity)?;
        let byte_count = Bitfield::byte_count(usize::from(quantity));

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_MULTIPLE_COILS);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        self.buf.put_u8(byte_count as u8);
        let mut raw = [0u8; bitfield::CAPACITY];
        bits.to_wire(&mut raw, usize::from(quantity));
        self.buf.put_bytes(&raw[..byte_count]);

        if self.is_broadcast() {
            self.send_adu()?;
            return Ok(());
        }
        self.send_adu()?;
        let response_fc = self.recv_response()?;
        self.check_response_fc(fc::WRITE_MULTIPLE_COILS, response_fc)?;
        let echoed_address = self.buf.get_u16_be()?;
        let echoed_quantity = self.buf.get_u16_be()?;
        if echoed_address != address || echoed_quantity != quantity {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// FC 16: writes `values` as consecutive holding registers starting at `address`.
    pub fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        if values.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidArgument);
        }
        let quantity = values.len() as u16;
        Self::check_quantity(fc::WRITE_MULTIPLE_REGISTERS, quantity)?;
        let byte_count = values.len() * 2;

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_MULTIPLE_REGISTERS);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        self.buf.put_u8(byte_count as u8);
        for &value in values {
            self.buf.put_u16_be(value);
        }

        if self.is_broadcast() {
            self.send_adu()?;
            return Ok(());
        }
        self.send_adu()?;
        let response_fc = self.recv_response()?;
        self.check_response_fc(fc::WRITE_MULTIPLE_REGISTERS, response_fc)?;
        let echoed_address = self.buf.get_u16_be()?;
        let echoed_quantity = self.buf.get_u16_be()?;
        if echoed_address != address || echoed_quantity != quantity {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// Sends a PDU with an arbitrary function code and payload, skipping quantity validation and
    /// not awaiting a response. Pairs with [`ModbusClient::receive_raw_pdu_response`].
    pub fn send_raw_pdu(&mut self, function_code: u8, data: &[u8]) -> Result<()> {
        if 1 + data.len() > MAX_PDU_LEN {
            return Err(Error::InvalidArgument);
        }
        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_bytes(data);
        self.send_adu()
    }

    /// Reads one response frame and copies its PDU payload (after the function-code byte) into
    /// `out`, returning the number of bytes copied. An exception response maps to
    /// [`Error::Exception`] instead.
    pub fn receive_raw_pdu_response(&mut self, out: &mut [u8]) -> Result<usize> {
        let response_fc = self.recv_response()?;
        if is_exception(response_fc) {
            let code = self.buf.get_u8()?;
            let exception = Exception::from_code(code).ok_or(Error::InvalidResponse)?;
            return Err(Error::Exception(exception));
        }
        let payload_len = self.buf.remaining().saturating_sub(self.trailer_len());
        let n = payload_len.min(out.len());
        self.buf.get_bytes(&mut out[..n])?;
        Ok(n)
    }
}
