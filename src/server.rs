// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The server (slave) dispatch engine: one `poll` call per request/response cycle.

use crate::bitfield::{self, Bitfield};
use crate::buffer::MsgBuf;
use crate::error::{Error, Exception, Result};
use crate::frame::{fc, quantity_bounds, Direction};
#[cfg(feature = "rtu")]
use crate::frame::rtu as rtu_frame;
#[cfg(feature = "tcp")]
use crate::frame::tcp as tcp_frame;
use crate::transport::{Io, PlatformIo};

const DEFAULT_READ_TIMEOUT_MS: i32 = 1000;
const DEFAULT_BYTE_TIMEOUT_MS: i32 = 100;
const DEFAULT_BYTE_SPACING_MS: u32 = 0;

/// Largest register count ever unpacked into a stack array by this module (FC 3/4's bound).
const MAX_REGISTERS: usize = 125;

/// Host-provided data callbacks, one per supported function code.
///
/// A default method body returns [`Exception::IllegalFunction`], the idiomatic substitute for a
/// null C function pointer ("not implemented"): a host that only cares about holding registers
/// overrides just `read_holding_registers`/`write_single_register`/`write_multiple_registers`
/// and leaves the rest at their default.
pub trait ServerCallbacks {
    fn read_coils(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut Bitfield,
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn read_discrete_inputs(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut Bitfield,
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn read_holding_registers(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut [u16],
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn read_input_registers(
        &mut self,
        _address: u16,
        _quantity: u16,
        _out: &mut [u16],
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn write_single_coil(
        &mut self,
        _address: u16,
        _value: bool,
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn write_single_register(
        &mut self,
        _address: u16,
        _value: u16,
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn write_multiple_coils(
        &mut self,
        _address: u16,
        _quantity: u16,
        _bits: &Bitfield,
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }

    fn write_multiple_registers(
        &mut self,
        _address: u16,
        _values: &[u16],
    ) -> core::result::Result<(), Exception> {
        Err(Exception::IllegalFunction)
    }
}

#[derive(Debug, Clone, Copy)]
enum Link {
    #[cfg(feature = "rtu")]
    Rtu { address_rtu: u8 },
    #[cfg(feature = "tcp")]
    Tcp,
}

/// What to do once a request has been received and, for RTU, address-filtered.
struct RequestMeta {
    /// `true` for an RTU request to the broadcast address; never set on TCP.
    broadcast: bool,
    /// The MBAP transaction id to echo back; `None` on RTU.
    tid: Option<u16>,
    /// The unit id to reflect back into the response header (the RTU address on RTU, the
    /// MBAP unit id on TCP).
    unit_id: u8,
}

/// A Modbus server (slave) bound to one host transport and one set of data callbacks.
pub struct ModbusServer<T: PlatformIo, C: ServerCallbacks> {
    io: T,
    callbacks: C,
    link: Link,
    buf: MsgBuf,
    read_timeout_ms: i32,
    byte_timeout_ms: i32,
    byte_spacing_ms: u32,
}

impl<T: PlatformIo, C: ServerCallbacks> core::fmt::Debug for ModbusServer<T, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModbusServer")
            .field("link", &self.link)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("byte_timeout_ms", &self.byte_timeout_ms)
            .field("byte_spacing_ms", &self.byte_spacing_ms)
            .finish()
    }
}

impl<T: PlatformIo, C: ServerCallbacks> ModbusServer<T, C> {
    /// Creates an RTU server answering to `address_rtu` (and to the broadcast address `0`,
    /// without replying).
    #[cfg(feature = "rtu")]
    #[must_use]
    pub fn new_rtu(io: T, address_rtu: u8, callbacks: C) -> Self {
        Self {
            io,
            callbacks,
            link: Link::Rtu { address_rtu },
            buf: MsgBuf::new(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            byte_spacing_ms: DEFAULT_BYTE_SPACING_MS,
        }
    }

    /// Creates a TCP server. TCP has no broadcast/address-filter concept: every request that
    /// frames correctly is processed.
    #[cfg(feature = "tcp")]
    #[must_use]
    pub fn new_tcp(io: T, callbacks: C) -> Self {
        Self {
            io,
            callbacks,
            link: Link::Tcp,
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

    /// Runs one request/response cycle: receives a request (or times out waiting for one),
    /// filters it, dispatches it to a callback, and sends the response (unless the request was
    /// a broadcast or was silently ignored).
    ///
    /// Returns `Ok(())` both on a fully handled request and on a silently-dropped one (bad CRC,
    /// address not ours); only transport-level failures are propagated as `Err`.
    pub fn poll(&mut self) -> Result<()> {
        self.buf.reset();
        let meta = match self.recv_request()? {
            Some(meta) => meta,
            None => return Ok(()),
        };
        let function_code = self.buf.get_u8()?;
        self.handle_request(function_code, meta)
    }

    fn recv_request(&mut self) -> Result<Option<RequestMeta>> {
        match self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { address_rtu } => {
                let mut io = Io::new(&mut self.io);
                match rtu_frame::recv(
                    &mut io,
                    &mut self.buf,
                    Direction::Request,
                    self.read_timeout_ms,
                    self.byte_timeout_ms,
                ) {
                    Ok(()) => {}
                    Err(Error::InvalidResponse) => {
                        log::warn!("dropping malformed or CRC-invalid RTU request");
                        return Ok(None);
                    }
                    Err(other) => return Err(other),
                }
                let unit_id = self.buf.get_u8()?;
                let broadcast = crate::rtu::is_broadcast(unit_id);
                if unit_id != address_rtu && !broadcast {
                    log::debug!("ignoring request for unit {unit_id:#04x}, we are {address_rtu:#04x}");
                    return Ok(None);
                }
                Ok(Some(RequestMeta {
                    broadcast,
                    tid: None,
                    unit_id,
                }))
            }
            #[cfg(feature = "tcp")]
            Link::Tcp => {
                let mut io = Io::new(&mut self.io);
                tcp_frame::recv(
                    &mut io,
                    &mut self.buf,
                    None,
                    self.read_timeout_ms,
                    self.byte_timeout_ms,
                )?;
                let tid = self.buf.get_u16_be()?;
                let _proto = self.buf.get_u16_be()?;
                let _len = self.buf.get_u16_be()?;
                let unit_id = self.buf.get_u8()?;
                Ok(Some(RequestMeta {
                    broadcast: false,
                    tid: Some(tid),
                    unit_id,
                }))
            }
        }
    }

    fn handle_request(&mut self, function_code: u8, meta: RequestMeta) -> Result<()> {
        if let Err(exception) = self.dispatch(function_code) {
            log::warn!("function code {function_code:#04x} failed: {exception}");
            self.buf.reset();
            self.buf.put_u8(function_code | crate::frame::EXCEPTION_BIT);
            self.buf.put_u8(exception.code());
        }

        if meta.broadcast {
            return Ok(());
        }

        match self.link {
            #[cfg(feature = "rtu")]
            Link::Rtu { address_rtu } => rtu_frame::build(&mut self.buf, address_rtu),
            #[cfg(feature = "tcp")]
            Link::Tcp => {
                tcp_frame::build(&mut self.buf, meta.tid.unwrap_or(0), meta.unit_id);
            }
        }
        let mut io = Io::new(&mut self.io);
        io.send(self.buf.as_slice(), self.byte_timeout_ms, self.byte_spacing_ms)
    }

    fn dispatch(&mut self, function_code: u8) -> core::result::Result<(), Exception> {
        match function_code {
            fc::READ_COILS => self.handle_read_bits(function_code, true),
            fc::READ_DISCRETE_INPUTS => self.handle_read_bits(function_code, false),
            fc::READ_HOLDING_REGISTERS => self.handle_read_registers(function_code, true),
            fc::READ_INPUT_REGISTERS => self.handle_read_registers(function_code, false),
            fc::WRITE_SINGLE_COIL => self.handle_write_single_coil(),
            fc::WRITE_SINGLE_REGISTER => self.handle_write_single_register(),
            fc::WRITE_MULTIPLE_COILS => self.handle_write_multiple_coils(),
            fc::WRITE_MULTIPLE_REGISTERS => self.handle_write_multiple_registers(),
            _ => Err(Exception::IllegalFunction),
        }
    }

    fn handle_read_bits(
        &mut self,
        function_code: u8,
        coils: bool,
    ) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let quantity = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let (min, max) = quantity_bounds(function_code).expect("read FCs carry quantity bounds");
        if quantity < min || quantity > max {
            return Err(Exception::IllegalDataValue);
        }

        let mut bits = Bitfield::new();
        if coils {
            self.callbacks.read_coils(address, quantity, &mut bits)?;
        } else {
            self.callbacks
                .read_discrete_inputs(address, quantity, &mut bits)?;
        }

        let byte_count = Bitfield::byte_count(usize::from(quantity));
        let mut raw = [0u8; bitfield::CAPACITY];
        bits.to_wire(&mut raw, usize::from(quantity));

        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_u8(byte_count as u8);
        self.buf.put_bytes(&raw[..byte_count]);
        Ok(())
    }

    fn handle_read_registers(
        &mut self,
        function_code: u8,
        holding: bool,
    ) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let quantity = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let (min, max) = quantity_bounds(function_code).expect("read FCs carry quantity bounds");
        if quantity < min || quantity > max {
            return Err(Exception::IllegalDataValue);
        }

        let mut registers = [0u16; MAX_REGISTERS];
        let slice = &mut registers[..usize::from(quantity)];
        if holding {
            self.callbacks
                .read_holding_registers(address, quantity, slice)?;
        } else {
            self.callbacks
                .read_input_registers(address, quantity, slice)?;
        }

        self.buf.reset();
        self.buf.put_u8(function_code);
        self.buf.put_u8((2 * usize::from(quantity)) as u8);
        for &value in slice.iter() {
            self.buf.put_u16_be(value);
        }
        Ok(())
    }

    fn handle_write_single_coil(&mut self) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let raw_value = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let value = match raw_value {
            0xFF00 => true,
            0x0000 => false,
            _ => return Err(Exception::IllegalDataValue),
        };
        self.callbacks.write_single_coil(address, value)?;

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_SINGLE_COIL);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(raw_value);
        Ok(())
    }

    fn handle_write_single_register(&mut self) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let value = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        self.callbacks.write_single_register(address, value)?;

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_SINGLE_REGISTER);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(value);
        Ok(())
    }

    fn handle_write_multiple_coils(&mut self) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let quantity = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let byte_count = usize::from(self.buf.get_u8().map_err(|_| Exception::IllegalDataValue)?);
        let (min, max) =
            quantity_bounds(fc::WRITE_MULTIPLE_COILS).expect("FC 15 carries quantity bounds");
        if quantity < min || quantity > max {
            return Err(Exception::IllegalDataValue);
        }
        let expected = Bitfield::byte_count(usize::from(quantity));
        if byte_count != expected || self.buf.remaining() < byte_count {
            return Err(Exception::IllegalDataValue);
        }
        let mut raw = [0u8; bitfield::CAPACITY];
        self.buf
            .get_bytes(&mut raw[..byte_count])
            .map_err(|_| Exception::IllegalDataValue)?;
        let bits = Bitfield::from_wire(&raw[..byte_count], usize::from(quantity));
        self.callbacks
            .write_multiple_coils(address, quantity, &bits)?;

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_MULTIPLE_COILS);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        Ok(())
    }

    fn handle_write_multiple_registers(&mut self) -> core::result::Result<(), Exception> {
        let address = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let quantity = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        let byte_count = usize::from(self.buf.get_u8().map_err(|_| Exception::IllegalDataValue)?);
        let (min, max) =
            quantity_bounds(fc::WRITE_MULTIPLE_REGISTERS).expect("FC 16 carries quantity bounds");
        if quantity < min || quantity > max {
            return Err(Exception::IllegalDataValue);
        }
        if byte_count != 2 * usize::from(quantity) || self.buf.remaining() < byte_count {
            return Err(Exception::IllegalDataValue);
        }
        let mut registers = [0u16; MAX_REGISTERS];
        for slot in registers.iter_mut().take(usize::from(quantity)) {
            *slot = self.buf.get_u16_be().map_err(|_| Exception::IllegalDataValue)?;
        }
        let slice = &registers[..usize::from(quantity)];
        self.callbacks.write_multiple_registers(address, slice)?;

        self.buf.reset();
        self.buf.put_u8(fc::WRITE_MULTIPLE_REGISTERS);
        self.buf.put_u16_be(address);
        self.buf.put_u16_be(quantity);
        Ok(())
    }
}
