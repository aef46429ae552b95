//! Operation result codes.
//!
//! Every transaction the driver issues ends in exactly one [`Status`]. The
//! numeric codes follow the usual Modbus master convention: `0x00` for
//! success, the standard exception codes `0x01..=0x04`, and `0xE0..` for
//! failures detected on the master side.

use thiserror::Error;

/// Result of the most recent driver operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Error)]
pub enum Status {
    /// The operation completed.
    #[default]
    #[error("Success")]
    Success,
    /// The slave does not support the requested function.
    #[error("Illegal function exception")]
    IllegalFunction,
    /// The register address is not valid on the slave.
    #[error("Illegal data address exception")]
    IllegalDataAddress,
    /// A value was out of range, either on the slave or during local validation.
    #[error("Illegal data value exception")]
    IllegalDataValue,
    /// The slave failed while processing the request.
    #[error("Slave device failure exception")]
    SlaveDeviceFailure,
    /// The response came from another slave, or a local address check failed.
    #[error("Invalid slave ID")]
    InvalidSlaveId,
    /// The response did not match the request.
    #[error("Invalid response function")]
    InvalidFunction,
    /// No response arrived in time.
    #[error("Response timed out")]
    ResponseTimedOut,
    /// The response was corrupted.
    #[error("Invalid response CRC")]
    InvalidCrc,
    /// Any other failure of the underlying link.
    #[error("Transport failure")]
    TransportFailure,
}

impl Status {
    /// The one-byte code of this status.
    pub const fn code(self) -> u8 {
        match self {
            Status::Success => 0x00,
            Status::IllegalFunction => 0x01,
            Status::IllegalDataAddress => 0x02,
            Status::IllegalDataValue => 0x03,
            Status::SlaveDeviceFailure => 0x04,
            Status::InvalidSlaveId => 0xE0,
            Status::InvalidFunction => 0xE1,
            Status::ResponseTimedOut => 0xE2,
            Status::InvalidCrc => 0xE3,
            Status::TransportFailure => 0xE4,
        }
    }

    /// Returns `true` for [`Status::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Error returned when a byte is not a known status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown status code: 0x{0:02X}")]
pub struct UnknownStatusCode(pub u8);

impl TryFrom<u8> for Status {
    type Error = UnknownStatusCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x00 => Ok(Status::Success),
            0x01 => Ok(Status::IllegalFunction),
            0x02 => Ok(Status::IllegalDataAddress),
            0x03 => Ok(Status::IllegalDataValue),
            0x04 => Ok(Status::SlaveDeviceFailure),
            0xE0 => Ok(Status::InvalidSlaveId),
            0xE1 => Ok(Status::InvalidFunction),
            0xE2 => Ok(Status::ResponseTimedOut),
            0xE3 => Ok(Status::InvalidCrc),
            0xE4 => Ok(Status::TransportFailure),
            other => Err(UnknownStatusCode(other)),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Status; 10] = [
        Status::Success,
        Status::IllegalFunction,
        Status::IllegalDataAddress,
        Status::IllegalDataValue,
        Status::SlaveDeviceFailure,
        Status::InvalidSlaveId,
        Status::InvalidFunction,
        Status::ResponseTimedOut,
        Status::InvalidCrc,
        Status::TransportFailure,
    ];

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Status::Success.code(), 0x00);
        assert_eq!(Status::IllegalDataValue.code(), 0x03);
        assert_eq!(Status::InvalidSlaveId.code(), 0xE0);
        assert_eq!(Status::ResponseTimedOut.code(), 0xE2);
        assert_eq!(u8::from(Status::InvalidCrc), 0xE3);
    }

    #[test]
    fn test_every_code_maps_back() {
        for status in ALL {
            assert_eq!(Status::try_from(status.code()), Ok(status));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Status::try_from(0x7F), Err(UnknownStatusCode(0x7F)));
        assert_eq!(
            UnknownStatusCode(0x7F).to_string(),
            "Unknown status code: 0x7F"
        );
    }

    #[test]
    fn test_default_and_success() {
        assert_eq!(Status::default(), Status::Success);
        assert!(Status::Success.is_success());
        assert!(ALL[1..].iter().all(|s| !s.is_success()));
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::Success.to_string(), "Success");
        assert_eq!(Status::ResponseTimedOut.to_string(), "Response timed out");
    }
}
