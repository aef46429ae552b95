//! The register-access boundary between the driver and the bus.
//!
//! A [`Transport`] performs one blocking Modbus transaction per call. It
//! owns framing, CRC checks and timeouts; the driver only sees the
//! registers that came back or the [`Status`] explaining why none did.
//!
//! The slave address is an argument of every call, so one transport can
//! serve several sessions on a shared bus, one at a time.

use crate::status::Status;

/// Result of a single transaction. `Err` never holds [`Status::Success`].
pub type TransportResult<T> = Result<T, Status>;

/// Blocking access to the registers of a Modbus slave.
pub trait Transport {
    /// Read `count` consecutive input registers (function 0x04).
    fn read_input_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    /// Read `count` consecutive holding registers (function 0x03).
    fn read_holding_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    /// Write one holding register (function 0x06).
    fn write_single_register(&mut self, slave: u8, address: u16, value: u16)
    -> TransportResult<()>;

    /// Send a vendor function `code` without payload.
    ///
    /// `expected_response_len` is the length of the acknowledgement frame,
    /// for transports that cannot infer it from the function code.
    fn issue_command(
        &mut self,
        slave: u8,
        code: u8,
        expected_response_len: u16,
    ) -> TransportResult<()>;

    /// Human-readable text for a status produced by this transport.
    fn describe(&self, status: Status) -> String {
        status.to_string()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_input_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        (**self).read_input_registers(slave, start, count)
    }

    fn read_holding_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        (**self).read_holding_registers(slave, start, count)
    }

    fn write_single_register(
        &mut self,
        slave: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        (**self).write_single_register(slave, address, value)
    }

    fn issue_command(
        &mut self,
        slave: u8,
        code: u8,
        expected_response_len: u16,
    ) -> TransportResult<()> {
        (**self).issue_command(slave, code, expected_response_len)
    }

    fn describe(&self, status: Status) -> String {
        (**self).describe(status)
    }
}
