//! The device session: read cache, measurement getters and configuration.

use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::config::DeviceConfig;
use crate::error::Error;
use crate::registers::{
    COMMAND_RESET_ENERGY, HOLDING_ALARM_OVERVOLTAGE, HOLDING_ALARM_UNDERVOLTAGE,
    HOLDING_CURRENT_RANGE, HOLDING_SLAVE_ADDRESS, INPUT_VOLTAGE, MEASUREMENT_REGISTER_COUNT,
    RESET_ENERGY_RESPONSE_LEN, Snapshot,
};
use crate::rtu::RtuTransport;
use crate::status::Status;
use crate::transport::{Transport, TransportResult};

/// Readings younger than this are served from the cache.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

const MIN_SLAVE_ADDRESS: u8 = 0x01;
const MAX_SLAVE_ADDRESS: u8 = 0xF7;

const UNDERVOLTAGE_RANGE: std::ops::RangeInclusive<f32> = 1.0..=350.0;
const OVERVOLTAGE_RANGE: std::ops::RangeInclusive<f32> = 5.0..=350.0;

/// A PZEM-017 meter reached through a [`Transport`].
///
/// All measurements come from one block read that is cached for
/// [`update_interval`](Self::update_interval). Getters report failure as
/// `NaN` (floats) or `None` (alarms); the cause is kept in
/// [`last_operation_result`](Self::last_operation_result) until the next
/// operation overwrites it.
///
/// Methods block until the transport finishes. The session holds no lock;
/// wrap it in a `Mutex` to share it between threads.
pub struct Pzem017<T, C = MonotonicClock> {
    transport: T,
    clock: C,
    slave_address: u8,
    snapshot: Snapshot,
    last_read: Option<Instant>,
    update_interval: Duration,
    last_result: Status,
}

impl<T: Transport> Pzem017<T> {
    /// Bind a session to a transport and the meter at `slave_address`.
    pub fn new(transport: T, slave_address: u8) -> Self {
        Self::with_clock(transport, slave_address, MonotonicClock)
    }
}

impl Pzem017<RtuTransport> {
    /// Open the configured serial port and bind a session to it.
    pub fn open(config: &DeviceConfig) -> Result<Self, Error> {
        config.validate()?;

        let transport =
            RtuTransport::open(&config.serial, config.timeout()).map_err(|source| Error::Open {
                port: config.serial.port.clone(),
                source,
            })?;

        let mut session = Self::new(transport, config.slave_address);
        session.update_interval = config.update_interval();
        Ok(session)
    }
}

impl<T: Transport, C: Clock> Pzem017<T, C> {
    /// Bind a session that takes its time from `clock`.
    pub fn with_clock(transport: T, slave_address: u8, clock: C) -> Self {
        Self {
            transport,
            clock,
            slave_address,
            snapshot: Snapshot::default(),
            last_read: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            last_result: Status::Success,
        }
    }

    // --- Measurement ---

    /// Volts, 0.01 V resolution. `NaN` if the meter could not be read.
    pub fn voltage(&mut self, force_new_reading: bool) -> f32 {
        self.measurement(force_new_reading, |s| s.voltage)
    }

    /// Amperes, 0.01 A resolution. `NaN` if the meter could not be read.
    pub fn current(&mut self, force_new_reading: bool) -> f32 {
        self.measurement(force_new_reading, |s| s.current)
    }

    /// Watts, 0.1 W resolution. `NaN` if the meter could not be read.
    pub fn power(&mut self, force_new_reading: bool) -> f32 {
        self.measurement(force_new_reading, |s| s.power)
    }

    /// Watt-hours since the last reset, 1 Wh resolution. `NaN` if the meter
    /// could not be read.
    pub fn energy(&mut self, force_new_reading: bool) -> f32 {
        self.measurement(force_new_reading, |s| s.energy)
    }

    /// Whether the under-voltage alarm is set; `None` if the meter could not
    /// be read.
    pub fn undervoltage_alarm_status(&mut self, force_new_reading: bool) -> Option<bool> {
        self.alarm(force_new_reading, |s| s.under_voltage_alarm)
    }

    /// Whether the over-voltage alarm is set; `None` if the meter could not
    /// be read.
    pub fn overvoltage_alarm_status(&mut self, force_new_reading: bool) -> Option<bool> {
        self.alarm(force_new_reading, |s| s.over_voltage_alarm)
    }

    /// Clear the meter's energy counter.
    ///
    /// On success the cached energy is set to zero without reading the
    /// meter back.
    pub fn reset_energy(&mut self) -> bool {
        let result = self.transport.issue_command(
            self.slave_address,
            COMMAND_RESET_ENERGY,
            RESET_ENERGY_RESPONSE_LEN,
        );

        if self.record(result).is_none() {
            return false;
        }

        debug!(slave = self.slave_address, "Energy counter reset");
        self.snapshot.energy = 0.0;
        true
    }

    /// Read all measurements unless the cached ones are still fresh.
    ///
    /// A failed read leaves the cached values and their age untouched.
    pub fn update_values(&mut self) -> bool {
        let now = self.clock.now();

        if self.is_fresh(now) {
            trace!(slave = self.slave_address, "Serving cached measurements");
            return true;
        }

        let result = self.transport.read_input_registers(
            self.slave_address,
            INPUT_VOLTAGE,
            MEASUREMENT_REGISTER_COUNT,
        );

        let Some(words) = self.record(result) else {
            return false;
        };

        self.snapshot = Snapshot::decode(&words, chrono::Utc::now());
        self.last_read = Some(now);

        debug!(
            slave = self.slave_address,
            voltage = self.snapshot.voltage,
            current = self.snapshot.current,
            power = self.snapshot.power,
            energy = self.snapshot.energy,
            "Measurements updated"
        );
        true
    }

    /// The cached measurements, without touching the meter.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    // --- Addressing and configuration ---

    /// Change the address this session talks to. No bus traffic.
    ///
    /// The address must be in the range 0x01 to 0xF7.
    pub fn set_slave_address(&mut self, address: u8) -> bool {
        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&address) {
            self.reject(Status::InvalidSlaveId, "slave address");
            return false;
        }

        self.slave_address = address;
        true
    }

    /// Tell the meter to move to a new bus address.
    ///
    /// The address must be in the range 0x0001 to 0x00F7.
    ///
    /// This session keeps talking to the old address afterwards. Call
    /// [`set_slave_address`](Self::set_slave_address) with the same value to
    /// follow the meter, otherwise every later operation misses it.
    pub fn set_address(&mut self, address: u16) -> bool {
        if !(u16::from(MIN_SLAVE_ADDRESS)..=u16::from(MAX_SLAVE_ADDRESS)).contains(&address) {
            self.reject(Status::InvalidSlaveId, "device address");
            return false;
        }

        self.write(HOLDING_SLAVE_ADDRESS, address)
    }

    /// The address this session currently talks to.
    pub fn address(&self) -> u8 {
        self.slave_address
    }

    /// Select the measurement range of the installed shunt.
    ///
    /// Accepts a [`CurrentRange`](crate::CurrentRange) or a raw register
    /// value; raw values are written as given.
    pub fn set_current_range(&mut self, range: impl Into<u16>) -> bool {
        self.write(HOLDING_CURRENT_RANGE, range.into())
    }

    /// Read back the raw current range register.
    ///
    /// Returns 0 when the read fails, so check
    /// [`last_operation_result`](Self::last_operation_result).
    pub fn current_range(&mut self) -> u16 {
        let result =
            self.transport
                .read_holding_registers(self.slave_address, HOLDING_CURRENT_RANGE, 1);

        self.record(result)
            .and_then(|words| words.first().copied())
            .unwrap_or(0)
    }

    // --- Alarms ---

    /// Set the under-voltage threshold. Range is 1-350 V; the fraction is
    /// dropped.
    pub fn set_undervoltage_alarm(&mut self, volts: f32) -> bool {
        if !UNDERVOLTAGE_RANGE.contains(&volts) {
            self.reject(Status::IllegalDataValue, "under-voltage threshold");
            return false;
        }

        self.write(HOLDING_ALARM_UNDERVOLTAGE, volts as u16)
    }

    /// Set the over-voltage threshold. Range is 5-350 V; the fraction is
    /// dropped.
    pub fn set_overvoltage_alarm(&mut self, volts: f32) -> bool {
        if !OVERVOLTAGE_RANGE.contains(&volts) {
            self.reject(Status::IllegalDataValue, "over-voltage threshold");
            return false;
        }

        self.write(HOLDING_ALARM_OVERVOLTAGE, volts as u16)
    }

    // --- Misc ---

    /// Result of the latest operation, including local validation failures.
    pub fn last_operation_result(&self) -> Status {
        self.last_result
    }

    /// Text for [`last_operation_result`](Self::last_operation_result), as
    /// worded by the transport.
    pub fn last_operation_result_string(&self) -> String {
        self.transport.describe(self.last_result)
    }

    /// Change the cache lifetime.
    ///
    /// The cached measurements count as fresh from this moment.
    pub fn set_update_interval(&mut self, update_interval: Duration) {
        self.update_interval = update_interval;
        self.last_read = Some(self.clock.now());
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn measurement(&mut self, force_new_reading: bool, field: fn(&Snapshot) -> f32) -> f32 {
        if force_new_reading {
            self.age_cache();
        }

        if !self.update_values() {
            return f32::NAN;
        }

        field(&self.snapshot)
    }

    fn alarm(&mut self, force_new_reading: bool, field: fn(&Snapshot) -> bool) -> Option<bool> {
        if force_new_reading {
            self.age_cache();
        }

        self.update_values().then(|| field(&self.snapshot))
    }

    /// Push the last read one interval further into the past.
    fn age_cache(&mut self) {
        self.last_read = self
            .last_read
            .and_then(|read| read.checked_sub(self.update_interval));
    }

    fn is_fresh(&self, now: Instant) -> bool {
        match self.last_read {
            Some(read) => match read.checked_add(self.update_interval) {
                Some(expires) => expires > now,
                None => true,
            },
            None => false,
        }
    }

    fn write(&mut self, address: u16, value: u16) -> bool {
        let result = self
            .transport
            .write_single_register(self.slave_address, address, value);

        let written = self.record(result).is_some();
        if written {
            debug!(slave = self.slave_address, address, value, "Register written");
        }
        written
    }

    /// Store the outcome of a transaction as the last result.
    fn record<R>(&mut self, result: TransportResult<R>) -> Option<R> {
        match result {
            Ok(value) => {
                self.last_result = Status::Success;
                Some(value)
            }
            Err(status) => {
                warn!(slave = self.slave_address, status = %status, "Meter operation failed");
                self.last_result = status;
                None
            }
        }
    }

    fn reject(&mut self, status: Status, what: &str) {
        debug!(slave = self.slave_address, status = %status, "Rejected {}", what);
        self.last_result = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Answers every read with a fixed block and counts reads.
    #[derive(Default)]
    struct FixedTransport {
        words: Vec<u16>,
        reads: usize,
    }

    impl Transport for FixedTransport {
        fn read_input_registers(
            &mut self,
            _slave: u8,
            _start: u16,
            _count: u16,
        ) -> TransportResult<Vec<u16>> {
            self.reads += 1;
            Ok(self.words.clone())
        }

        fn read_holding_registers(
            &mut self,
            _slave: u8,
            _start: u16,
            _count: u16,
        ) -> TransportResult<Vec<u16>> {
            Err(Status::IllegalFunction)
        }

        fn write_single_register(
            &mut self,
            _slave: u8,
            _address: u16,
            _value: u16,
        ) -> TransportResult<()> {
            Ok(())
        }

        fn issue_command(
            &mut self,
            _slave: u8,
            _code: u8,
            _expected_response_len: u16,
        ) -> TransportResult<()> {
            Ok(())
        }
    }

    fn session(clock: &ManualClock) -> Pzem017<FixedTransport, ManualClock> {
        let transport = FixedTransport {
            words: vec![2400, 150, 360, 0, 10, 0, 0, 0],
            reads: 0,
        };
        Pzem017::with_clock(transport, 0x01, clock.clone())
    }

    #[test]
    fn test_first_access_reads() {
        let clock = ManualClock::new();
        let mut pzem = session(&clock);

        assert_eq!(pzem.voltage(false), 24.0);
        assert_eq!(pzem.transport().reads, 1);
    }

    #[test]
    fn test_is_fresh_boundary() {
        let clock = ManualClock::new();
        let mut pzem = session(&clock);
        pzem.update_values();

        clock.advance(DEFAULT_UPDATE_INTERVAL - Duration::from_millis(1));
        assert!(pzem.is_fresh(clock.now()));

        // Fresh only while strictly inside the window.
        clock.advance(Duration::from_millis(1));
        assert!(!pzem.is_fresh(clock.now()));
    }

    #[test]
    fn test_age_cache_without_reading_is_noop() {
        let clock = ManualClock::new();
        let mut pzem = session(&clock);

        pzem.age_cache();

        assert!(pzem.last_read.is_none());
    }

    #[test]
    fn test_age_cache_is_additive() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(10));
        let mut pzem = session(&clock);
        pzem.update_values();
        let read = pzem.last_read.unwrap();

        pzem.age_cache();
        pzem.age_cache();

        assert_eq!(read - pzem.last_read.unwrap(), DEFAULT_UPDATE_INTERVAL * 2);
    }

    #[test]
    fn test_default_update_interval() {
        let clock = ManualClock::new();
        let pzem = session(&clock);

        assert_eq!(pzem.update_interval(), DEFAULT_UPDATE_INTERVAL);
        assert_eq!(pzem.last_operation_result(), Status::Success);
        assert_eq!(pzem.snapshot(), &Snapshot::default());
    }

    #[test]
    fn test_current_range_failure_returns_zero() {
        let clock = ManualClock::new();
        let mut pzem = session(&clock);

        assert_eq!(pzem.current_range(), 0);
        assert_eq!(pzem.last_operation_result(), Status::IllegalFunction);
    }
}
