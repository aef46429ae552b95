//! [`Transport`] over a serial line, using the `tokio-modbus` sync RTU client.
//!
//! Standard register functions go through `tokio-modbus`. Its RTU codec only
//! frames the public function codes, so vendor commands are framed here and
//! exchanged on a second blocking handle to the same port.

use crc::{CRC_16_MODBUS, Crc};
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio_modbus::client::sync::{self, Reader, Writer};
use tokio_modbus::prelude::{ExceptionCode, ProtocolError, Slave, SlaveContext};
use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, trace};

use crate::config::SerialConfig;
use crate::registers::GENERAL_ADDRESS;
use crate::status::Status;
use crate::transport::{Transport, TransportResult};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Bit set in the function code of an exception reply.
const EXCEPTION_FLAG: u8 = 0x80;

/// Slave, function, exception code and CRC.
const EXCEPTION_FRAME_LEN: usize = 5;

/// Modbus RTU transport on a serial port.
pub struct RtuTransport {
    ctx: sync::Context,
    command_port: Box<dyn SerialPort>,
    port: String,
}

impl RtuTransport {
    /// Open the serial port and attach an RTU client to it.
    ///
    /// The port is opened twice in shared mode: once for the `tokio-modbus`
    /// client and once for vendor commands.
    pub fn open(serial: &SerialConfig, timeout: Duration) -> io::Result<Self> {
        let builder = serial.builder().exclusive(false).timeout(timeout);
        let mut ctx = sync::rtu::connect_slave(&builder, Slave(GENERAL_ADDRESS))?;
        ctx.set_timeout(Some(timeout));
        let command_port = builder.open()?;

        debug!(
            port = %serial.port,
            baud_rate = serial.baud_rate,
            timeout_ms = timeout.as_millis() as u64,
            "Opened Modbus RTU port"
        );

        Ok(Self {
            ctx,
            command_port,
            port: serial.port.clone(),
        })
    }

    fn finish<T>(
        &self,
        operation: &str,
        slave: u8,
        result: TransportResult<T>,
    ) -> TransportResult<T> {
        result.inspect_err(|status| {
            debug!(
                port = %self.port,
                slave,
                status = %status,
                "Modbus {} failed",
                operation
            );
        })
    }
}

impl fmt::Debug for RtuTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtuTransport")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl Transport for RtuTransport {
    fn read_input_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        trace!(slave, start, count, "Reading input registers");
        self.ctx.set_slave(Slave(slave));
        let result = map_result(self.ctx.read_input_registers(start, count));
        self.finish("input register read", slave, result)
    }

    fn read_holding_registers(
        &mut self,
        slave: u8,
        start: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        trace!(slave, start, count, "Reading holding registers");
        self.ctx.set_slave(Slave(slave));
        let result = map_result(self.ctx.read_holding_registers(start, count));
        self.finish("holding register read", slave, result)
    }

    fn write_single_register(
        &mut self,
        slave: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        trace!(slave, address, value, "Writing register");
        self.ctx.set_slave(Slave(slave));
        let result = map_result(self.ctx.write_single_register(address, value));
        self.finish("register write", slave, result)
    }

    fn issue_command(
        &mut self,
        slave: u8,
        code: u8,
        expected_response_len: u16,
    ) -> TransportResult<()> {
        trace!(slave, code, expected_response_len, "Issuing vendor command");
        if let Err(err) = self.command_port.clear(ClearBuffer::Input) {
            debug!(port = %self.port, error = %err, "Could not discard pending input");
        }
        let result = exchange_command(
            &mut *self.command_port,
            slave,
            code,
            usize::from(expected_response_len),
        );
        self.finish("vendor command", slave, result)
    }
}

/// Frame a payload-less command with its CRC.
pub fn command_frame(slave: u8, code: u8) -> [u8; 4] {
    let [crc_lo, crc_hi] = CRC_MODBUS.checksum(&[slave, code]).to_le_bytes();
    [slave, code, crc_lo, crc_hi]
}

/// Send a payload-less vendor command and check its acknowledgement.
///
/// A normal reply is `response_len` bytes including the CRC; an exception
/// reply is always five.
pub fn exchange_command<P>(
    port: &mut P,
    slave: u8,
    code: u8,
    response_len: usize,
) -> TransportResult<()>
where
    P: Read + Write + ?Sized,
{
    let request = command_frame(slave, code);
    port.write_all(&request)
        .and_then(|()| port.flush())
        .map_err(|err| status_from_io(&err))?;

    let mut reply = vec![0u8; 2];
    port.read_exact(&mut reply).map_err(|err| status_from_io(&err))?;

    let exception = reply[1] == code | EXCEPTION_FLAG;
    let frame_len = if exception {
        EXCEPTION_FRAME_LEN
    } else {
        response_len.max(reply.len() + 2)
    };
    reply.resize(frame_len, 0);
    port.read_exact(&mut reply[2..]).map_err(|err| status_from_io(&err))?;

    let (body, crc) = reply.split_at(frame_len - 2);
    if CRC_MODBUS.checksum(body).to_le_bytes() != [crc[0], crc[1]] {
        return Err(Status::InvalidCrc);
    }
    if body[0] != slave {
        return Err(Status::InvalidSlaveId);
    }
    if exception {
        return Err(status_from_exception(ExceptionCode::new(body[2])));
    }
    if body[1] != code {
        return Err(Status::InvalidFunction);
    }
    Ok(())
}

/// Fold the nested `tokio-modbus` result into a single status.
pub fn map_result<T>(result: tokio_modbus::Result<T>) -> TransportResult<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(status_from_exception(exception)),
        Err(err) => Err(status_from_error(&err)),
    }
}

/// Status for a Modbus exception response.
pub fn status_from_exception(exception: ExceptionCode) -> Status {
    match exception {
        ExceptionCode::IllegalFunction => Status::IllegalFunction,
        ExceptionCode::IllegalDataAddress => Status::IllegalDataAddress,
        ExceptionCode::IllegalDataValue => Status::IllegalDataValue,
        _ => Status::SlaveDeviceFailure,
    }
}

/// Status for a failed transaction.
pub fn status_from_error(err: &tokio_modbus::Error) -> Status {
    match err {
        tokio_modbus::Error::Transport(io_err) => status_from_io(io_err),
        // The RTU header carries only the slave id.
        tokio_modbus::Error::Protocol(ProtocolError::HeaderMismatch { .. }) => {
            Status::InvalidSlaveId
        }
        tokio_modbus::Error::Protocol(ProtocolError::FunctionCodeMismatch { .. }) => {
            Status::InvalidFunction
        }
    }
}

fn status_from_io(err: &io::Error) -> Status {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::UnexpectedEof => {
            Status::ResponseTimedOut
        }
        io::ErrorKind::InvalidData => Status::InvalidCrc,
        _ => Status::TransportFailure,
    }
}
