//! rcolorhug-dummy - In-memory ColorHug emulator for testing
//!
//! This crate provides a dummy device that answers the ColorHug protocol
//! from memory. It's useful for testing the queue and the flash workflows
//! without real hardware, and backs the `dummy` device of the CLI.
//!
//! On top of the emulation it can inject faults (a device status on the
//! Nth use of an opcode, a wrong echoed opcode, a corrupted flash checksum,
//! truncated frames, transport errors), delay every transfer, and records
//! every request it sees along with the peak number of concurrent transfers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rcolorhug_core::error::{Error, Result};
use rcolorhug_core::protocol::packed::{get_u16, put_u16, put_u32};
use rcolorhug_core::protocol::{
    checksum, opcodes, DeviceStatus, Frame, EEPROM_MAGIC, FRAME_SIZE, MAX_CALIBRATION_SLOTS,
    MAX_READ_CHUNK, OWNER_FIELD_LEN, RUNCODE_ADDRESS,
};
use rcolorhug_core::types::{CalibrationRecord, FirmwareVersion, Triple};
use rcolorhug_core::{Device, DeviceId, DeviceMode, DeviceRef, Reconnect};

/// Size of the emulated program flash
pub const FLASH_SIZE: usize = 0x10000;

/// How often [`DummyBus`] looks for a device while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Device identity
    pub id: String,
    /// Mode the device starts in
    pub mode: DeviceMode,
    /// Serial number
    pub serial: u32,
    /// Reported firmware version
    pub firmware_version: FirmwareVersion,
    /// Reported hardware version
    pub hardware_version: u8,
    /// Value returned by TAKE_READINGS
    pub reading: Triple,
    /// Value returned by TAKE_READING_RAW
    pub raw_reading: u32,
    /// Time every transfer takes
    pub delay: Duration,
    /// Answer with `2 + payload` bytes instead of full frames
    pub short_frames: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            id: "dummy".to_string(),
            mode: DeviceMode::Firmware,
            serial: 1337,
            firmware_version: FirmwareVersion {
                major: 2,
                minor: 0,
                micro: 6,
            },
            hardware_version: 2, // ColorHug2
            reading: Triple::new(0.25, 0.5, 0.75),
            raw_reading: 12345,
            delay: Duration::ZERO,
            short_frames: false,
        }
    }
}

impl DummyConfig {
    /// Default configuration with a different identity
    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }
}

/// What an injected fault does to the response
#[derive(Debug, Clone, PartialEq)]
pub enum FaultKind {
    /// Fail the command with this status
    Status(DeviceStatus),
    /// Echo this opcode instead of the request's
    EchoOpcode(u8),
    /// Run the command, then flip the READ_FLASH checksum byte
    CorruptChecksum,
    /// Run the command, then cut the response to this many bytes
    Truncate(usize),
    /// Fail the transfer itself
    Transport(Error),
}

/// A fault bound to one use of an opcode
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// Opcode the fault applies to
    pub opcode: u8,
    /// Use of the opcode that fails, counting from 1; 0 fails every use
    pub nth: usize,
    /// What goes wrong
    pub kind: FaultKind,
}

impl Fault {
    /// Create a fault for the `nth` use of `opcode`
    pub fn new(opcode: u8, nth: usize, kind: FaultKind) -> Self {
        Self { opcode, nth, kind }
    }
}

struct State {
    mode: DeviceMode,
    serial: u32,
    color_select: u8,
    multiplier: u8,
    integral_time: u16,
    leds: u8,
    dark_offsets: Option<Vec<u8>>,
    owner_name: Vec<u8>,
    owner_email: Vec<u8>,
    calibration: Vec<Option<Vec<u8>>>,
    calibration_map: Vec<u8>,
    flash: Vec<u8>,
    flash_success: Option<bool>,
    eeprom_writes: usize,
    self_test_fails: bool,
    faults: Vec<Fault>,
    uses: HashMap<u8, usize>,
    log: Vec<Frame>,
}

impl State {
    fn new(config: &DummyConfig) -> Self {
        let mut calibration_map = Vec::with_capacity(12);
        for slot in 0..6 {
            put_u16(&mut calibration_map, slot);
        }
        Self {
            mode: config.mode,
            serial: config.serial,
            color_select: 1,
            multiplier: 3,
            integral_time: 0xffff,
            leds: 0,
            dark_offsets: None,
            owner_name: vec![0; OWNER_FIELD_LEN],
            owner_email: vec![0; OWNER_FIELD_LEN],
            calibration: vec![None; MAX_CALIBRATION_SLOTS as usize],
            calibration_map,
            flash: vec![0xff; FLASH_SIZE],
            flash_success: None,
            eeprom_writes: 0,
            self_test_fails: false,
            faults: Vec::new(),
            uses: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// Count this use of the opcode and return the fault that applies, if any
    fn take_fault(&mut self, opcode: u8) -> Option<FaultKind> {
        let count = self.uses.entry(opcode).or_insert(0);
        *count += 1;
        let count = *count;
        self.faults
            .iter()
            .find(|f| f.opcode == opcode && (f.nth == 0 || f.nth == count))
            .map(|f| f.kind.clone())
    }

    fn check_mode(&self, opcode: u8) -> std::result::Result<(), DeviceStatus> {
        match self.mode {
            DeviceMode::Bootloader => match opcode {
                opcodes::GET_FIRMWARE_VERSION
                | opcodes::GET_HARDWARE_VERSION
                | opcodes::GET_SERIAL_NUMBER
                | opcodes::GET_LEDS
                | opcodes::SET_LEDS
                | opcodes::RESET
                | opcodes::READ_FLASH
                | opcodes::WRITE_FLASH
                | opcodes::ERASE_FLASH
                | opcodes::BOOT_FLASH => Ok(()),
                _ => Err(DeviceStatus::UnknownCmdForBootloader),
            },
            DeviceMode::Firmware => match opcode {
                opcodes::WRITE_FLASH | opcodes::ERASE_FLASH | opcodes::BOOT_FLASH => {
                    Err(DeviceStatus::UnknownCmd)
                }
                _ => Ok(()),
            },
        }
    }

    fn flash_range(
        &self,
        addr: u16,
        len: usize,
    ) -> std::result::Result<std::ops::Range<usize>, DeviceStatus> {
        let start = addr as usize;
        let end = start + len;
        if end > self.flash.len() {
            return Err(DeviceStatus::InvalidAddress);
        }
        Ok(start..end)
    }

    /// Execute one command and return the response payload
    fn execute(
        &mut self,
        config: &DummyConfig,
        opcode: u8,
        payload: &[u8],
    ) -> std::result::Result<Vec<u8>, DeviceStatus> {
        self.check_mode(opcode)?;

        let mut out = Vec::new();
        match opcode {
            opcodes::GET_COLOR_SELECT => out.push(self.color_select),
            opcodes::SET_COLOR_SELECT => {
                if payload[0] > 3 {
                    return Err(DeviceStatus::InvalidValue);
                }
                self.color_select = payload[0];
            }
            opcodes::GET_MULTIPLIER => out.push(self.multiplier),
            opcodes::SET_MULTIPLIER => {
                if payload[0] > 3 {
                    return Err(DeviceStatus::InvalidValue);
                }
                self.multiplier = payload[0];
            }
            opcodes::GET_INTEGRAL_TIME => put_u16(&mut out, self.integral_time),
            opcodes::SET_INTEGRAL_TIME => self.integral_time = get_u16(payload, 0),

            opcodes::GET_FIRMWARE_VERSION => {
                let v = config.firmware_version;
                put_u16(&mut out, v.major);
                put_u16(&mut out, v.minor);
                put_u16(&mut out, v.micro);
            }
            opcodes::GET_HARDWARE_VERSION => out.push(config.hardware_version),
            opcodes::GET_SERIAL_NUMBER => {
                if self.serial == 0 {
                    return Err(DeviceStatus::NoSerial);
                }
                put_u32(&mut out, self.serial);
            }
            opcodes::SET_SERIAL_NUMBER => {
                self.serial = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]])
            }
            opcodes::GET_OWNER_NAME => out.extend_from_slice(&self.owner_name),
            opcodes::SET_OWNER_NAME => {
                self.owner_name = payload[..OWNER_FIELD_LEN].to_vec();
            }
            opcodes::GET_OWNER_EMAIL => out.extend_from_slice(&self.owner_email),
            opcodes::SET_OWNER_EMAIL => {
                self.owner_email = payload[..OWNER_FIELD_LEN].to_vec();
            }

            opcodes::GET_CALIBRATION => {
                let slot = self.slot(payload)?;
                match &self.calibration[slot] {
                    Some(record) => out.extend_from_slice(record),
                    None => return Err(DeviceStatus::NoCalibration),
                }
            }
            opcodes::SET_CALIBRATION => {
                let slot = self.slot(payload)?;
                self.calibration[slot] = Some(payload[2..2 + CalibrationRecord::WIRE_LEN].to_vec());
            }
            opcodes::GET_CALIBRATION_MAP => out.extend_from_slice(&self.calibration_map),
            opcodes::SET_CALIBRATION_MAP => {
                for i in 0..6 {
                    if get_u16(payload, i * 2) >= MAX_CALIBRATION_SLOTS {
                        return Err(DeviceStatus::InvalidValue);
                    }
                }
                self.calibration_map = payload[..12].to_vec();
            }
            opcodes::GET_DARK_OFFSETS => match &self.dark_offsets {
                Some(offsets) => out.extend_from_slice(offsets),
                None => return Err(DeviceStatus::NoDarkOffset),
            },
            opcodes::SET_DARK_OFFSETS => self.dark_offsets = Some(payload[..Triple::WIRE_LEN].to_vec()),
            opcodes::WRITE_EEPROM => {
                if &payload[..EEPROM_MAGIC.len()] != EEPROM_MAGIC {
                    return Err(DeviceStatus::WrongUnlockCode);
                }
                self.eeprom_writes += 1;
            }

            opcodes::GET_LEDS => out.push(self.leds),
            opcodes::SET_LEDS => self.leds = payload[0] & 0x03,

            opcodes::TAKE_READING_RAW => put_u32(&mut out, config.raw_reading),
            opcodes::TAKE_READINGS => {
                if self.multiplier == 0 {
                    return Err(DeviceStatus::UnderflowSensor);
                }
                out = config
                    .reading
                    .to_payload()
                    .map_err(|_| DeviceStatus::OverflowSensor)?;
            }
            opcodes::TAKE_READING_XYZ => {
                let slot = self.slot(payload)?;
                let record = match &self.calibration[slot] {
                    Some(bytes) => CalibrationRecord::from_bytes(bytes),
                    None => return Err(DeviceStatus::NoCalibration),
                };
                let r = config.reading;
                let m = &record.matrix;
                let xyz = Triple::new(
                    m[0] * r.a + m[1] * r.b + m[2] * r.c,
                    m[3] * r.a + m[4] * r.b + m[5] * r.c,
                    m[6] * r.a + m[7] * r.b + m[8] * r.c,
                );
                out = xyz
                    .to_payload()
                    .map_err(|_| DeviceStatus::OverflowMultiply)?;
            }

            opcodes::RESET => self.mode = DeviceMode::Bootloader,
            opcodes::BOOT_FLASH => self.mode = DeviceMode::Firmware,
            opcodes::SET_FLASH_SUCCESS => {
                if payload[0] > 1 {
                    return Err(DeviceStatus::InvalidValue);
                }
                self.flash_success = Some(payload[0] == 1);
            }
            opcodes::SELF_TEST => {
                if self.self_test_fails {
                    return Err(DeviceStatus::SelfTestFailed);
                }
            }

            opcodes::ERASE_FLASH => {
                let addr = get_u16(payload, 0);
                let len = get_u16(payload, 2) as usize;
                if addr < RUNCODE_ADDRESS {
                    return Err(DeviceStatus::InvalidAddress);
                }
                let range = self.flash_range(addr, len)?;
                self.flash[range].fill(0xff);
            }
            opcodes::WRITE_FLASH => {
                let addr = get_u16(payload, 0);
                let len = payload[2] as usize;
                if len == 0 || 4 + len > payload.len() {
                    return Err(DeviceStatus::InvalidLength);
                }
                if addr < RUNCODE_ADDRESS {
                    return Err(DeviceStatus::InvalidAddress);
                }
                let data = &payload[4..4 + len];
                if checksum(data) != payload[3] {
                    return Err(DeviceStatus::InvalidChecksum);
                }
                let range = self.flash_range(addr, len)?;
                // Programming can only clear bits
                for (cell, &byte) in self.flash[range].iter_mut().zip(data) {
                    *cell &= byte;
                }
            }
            opcodes::READ_FLASH => {
                let addr = get_u16(payload, 0);
                let len = payload[2] as usize;
                if len == 0 || len > MAX_READ_CHUNK {
                    return Err(DeviceStatus::InvalidLength);
                }
                let range = self.flash_range(addr, len)?;
                let data = &self.flash[range];
                out.push(checksum(data));
                out.extend_from_slice(data);
            }

            _ => return Err(DeviceStatus::UnknownCmd),
        }
        Ok(out)
    }

    fn slot(&self, payload: &[u8]) -> std::result::Result<usize, DeviceStatus> {
        let slot = get_u16(payload, 0);
        if slot >= MAX_CALIBRATION_SLOTS {
            return Err(DeviceStatus::InvalidValue);
        }
        Ok(slot as usize)
    }
}

/// Decrements the in-flight counter when a transfer ends or is dropped
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Dummy ColorHug
///
/// Emulates a device in memory for testing purposes.
pub struct DummyDevice {
    id: DeviceId,
    config: DummyConfig,
    state: Mutex<State>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl DummyDevice {
    /// Create a new dummy device with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            id: DeviceId::new(config.id.clone()),
            state: Mutex::new(State::new(&config)),
            config,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Create a new dummy device with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a test thread panicked mid-command
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a fault
    pub fn inject(&self, fault: Fault) {
        self.state().faults.push(fault);
    }

    /// Make SELF_TEST report a hardware fault
    pub fn fail_self_test(&self, fail: bool) {
        self.state().self_test_fails = fail;
    }

    /// Switch modes without a command, as if the user replugged the device
    pub fn set_mode(&self, mode: DeviceMode) {
        self.state().mode = mode;
    }

    /// Copy of `len` bytes of flash at `addr`
    pub fn flash(&self, addr: u16, len: usize) -> Vec<u8> {
        let start = addr as usize;
        self.state().flash[start..start + len].to_vec()
    }

    /// Overwrite flash contents directly
    pub fn load_flash(&self, addr: u16, data: &[u8]) {
        let start = addr as usize;
        self.state().flash[start..start + data.len()].copy_from_slice(data);
    }

    /// Store a calibration record directly
    pub fn load_calibration(&self, slot: u16, record: &CalibrationRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        let mut state = self.state();
        let cell = state
            .calibration
            .get_mut(slot as usize)
            .ok_or(Error::SlotOutOfRange {
                slot,
                max: MAX_CALIBRATION_SLOTS,
            })?;
        *cell = Some(bytes);
        Ok(())
    }

    /// Current serial number
    pub fn serial(&self) -> u32 {
        self.state().serial
    }

    /// Current LED bits
    pub fn leds(&self) -> u8 {
        self.state().leds
    }

    /// Last value sent with SET_FLASH_SUCCESS
    pub fn flash_success(&self) -> Option<bool> {
        self.state().flash_success
    }

    /// Number of accepted WRITE_EEPROM commands
    pub fn eeprom_writes(&self) -> usize {
        self.state().eeprom_writes
    }

    /// Every request frame received, in arrival order
    pub fn transfers(&self) -> Vec<Frame> {
        self.state().log.clone()
    }

    /// Opcodes of every request received, in arrival order
    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.state().log.iter().map(|f| f[0]).collect()
    }

    /// Most transfers this device ever had running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Handle one request and build the response frame
    fn respond(&self, request: &Frame) -> Result<Vec<u8>> {
        let opcode = request[0];
        let mut state = self.state();
        state.log.push(*request);

        let fault = state.take_fault(opcode);
        let (status, echoed, payload) = match &fault {
            Some(FaultKind::Transport(err)) => {
                log::trace!("dummy {}: transport fault on 0x{:02x}", self.id, opcode);
                return Err(err.clone());
            }
            Some(FaultKind::Status(status)) => (*status, opcode, Vec::new()),
            Some(FaultKind::EchoOpcode(echoed)) => (DeviceStatus::None, *echoed, Vec::new()),
            _ => match state.execute(&self.config, opcode, &request[1..]) {
                Ok(payload) => (DeviceStatus::None, opcode, payload),
                Err(status) => (status, opcode, Vec::new()),
            },
        };
        drop(state);

        let mut response = Vec::with_capacity(FRAME_SIZE);
        response.push(status.code());
        response.push(echoed);
        response.extend_from_slice(&payload);
        if !self.config.short_frames {
            response.resize(FRAME_SIZE, 0);
        }

        match fault {
            Some(FaultKind::CorruptChecksum) if response.len() > 2 => response[2] ^= 0xff,
            Some(FaultKind::Truncate(len)) => response.truncate(len),
            _ => {}
        }

        log::trace!(
            "dummy {}: {} -> {}",
            self.id,
            opcodes::name(opcode),
            status
        );
        Ok(response)
    }
}

#[async_trait]
impl Device for DummyDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn mode(&self) -> DeviceMode {
        self.state().mode
    }

    async fn transfer(&self, request: &Frame, timeout: Duration) -> Result<Vec<u8>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            if self.config.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(Error::Timeout);
            }
            tokio::time::sleep(self.config.delay).await;
        }

        self.respond(request)
    }
}

/// A set of dummy devices that can be waited on after a mode switch
#[derive(Default, Clone)]
pub struct DummyBus {
    devices: Vec<Arc<DummyDevice>>,
}

impl DummyBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug a device into the bus
    pub fn add(&mut self, device: Arc<DummyDevice>) {
        self.devices.push(device);
    }

    /// Find a device by identity
    pub fn find(&self, id: &DeviceId) -> Option<Arc<DummyDevice>> {
        self.devices.iter().find(|d| d.id() == id).cloned()
    }
}

#[async_trait]
impl Reconnect for DummyBus {
    async fn wait_for(
        &self,
        id: &DeviceId,
        mode: DeviceMode,
        timeout: Duration,
    ) -> Result<DeviceRef> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(device) = self.find(id).filter(|d| d.mode() == mode) {
                log::debug!("dummy {} is back in {} mode", id, mode);
                return Ok(device as DeviceRef);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcolorhug_core::protocol::{
        decode_read_flash, decode_response, encode_request, read_flash_payload,
        write_flash_payload,
    };
    use rcolorhug_core::types::CalibrationTypes;

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn command(dev: &DummyDevice, opcode: u8, payload: &[u8]) -> Vec<u8> {
        let frame = encode_request(opcode, payload).unwrap();
        dev.transfer(&frame, TIMEOUT).await.unwrap()
    }

    #[tokio::test]
    async fn test_serial_number() {
        let dev = DummyDevice::new_default();
        let response = command(&dev, opcodes::GET_SERIAL_NUMBER, &[]).await;
        assert_eq!(response.len(), FRAME_SIZE);
        let payload = decode_response(&response, opcodes::GET_SERIAL_NUMBER, 4).unwrap();
        assert_eq!(payload, 1337u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_short_frames() {
        let dev = DummyDevice::new(DummyConfig {
            short_frames: true,
            ..Default::default()
        });
        let response = command(&dev, opcodes::GET_HARDWARE_VERSION, &[]).await;
        assert_eq!(response, [0x00, opcodes::GET_HARDWARE_VERSION, 2]);
    }

    #[tokio::test]
    async fn test_flash_write_read() {
        let dev = DummyDevice::new(DummyConfig {
            mode: DeviceMode::Bootloader,
            ..Default::default()
        });
        let data = [0x12, 0x34, 0x56, 0x78];
        let payload = write_flash_payload(0x4000, &data).unwrap();
        let response = command(&dev, opcodes::WRITE_FLASH, &payload).await;
        decode_response(&response, opcodes::WRITE_FLASH, 0).unwrap();

        let payload = read_flash_payload(0x4000, 4).unwrap();
        let response = command(&dev, opcodes::READ_FLASH, &payload).await;
        let body = decode_response(&response, opcodes::READ_FLASH, 5).unwrap();
        assert_eq!(decode_read_flash(0x4000, body).unwrap(), data);
        assert_eq!(dev.flash(0x4000, 4), data);
    }

    #[tokio::test]
    async fn test_flash_protects_bootloader() {
        let dev = DummyDevice::new(DummyConfig {
            mode: DeviceMode::Bootloader,
            ..Default::default()
        });
        let payload = write_flash_payload(0x1000, &[0]).unwrap();
        let response = command(&dev, opcodes::WRITE_FLASH, &payload).await;
        assert_eq!(response[0], DeviceStatus::InvalidAddress.code());
    }

    #[tokio::test]
    async fn test_mode_restrictions() {
        let dev = DummyDevice::new_default();
        let response = command(&dev, opcodes::ERASE_FLASH, &[0x00, 0x40, 0x10, 0x00]).await;
        assert_eq!(response[0], DeviceStatus::UnknownCmd.code());

        command(&dev, opcodes::RESET, &[]).await;
        assert_eq!(dev.mode(), DeviceMode::Bootloader);
        let response = command(&dev, opcodes::TAKE_READINGS, &[]).await;
        assert_eq!(response[0], DeviceStatus::UnknownCmdForBootloader.code());

        command(&dev, opcodes::BOOT_FLASH, &[]).await;
        assert_eq!(dev.mode(), DeviceMode::Firmware);
    }

    #[tokio::test]
    async fn test_fault_on_nth_use() {
        let dev = DummyDevice::new_default();
        dev.inject(Fault::new(
            opcodes::GET_LEDS,
            2,
            FaultKind::Status(DeviceStatus::Watchdog),
        ));
        assert_eq!(command(&dev, opcodes::GET_LEDS, &[]).await[0], 0);
        assert_eq!(
            command(&dev, opcodes::GET_LEDS, &[]).await[0],
            DeviceStatus::Watchdog.code()
        );
        assert_eq!(command(&dev, opcodes::GET_LEDS, &[]).await[0], 0);
        assert_eq!(dev.sent_opcodes(), [opcodes::GET_LEDS; 3]);
    }

    #[tokio::test]
    async fn test_xyz_reading_uses_calibration() {
        let dev = DummyDevice::new_default();
        let mut record = CalibrationRecord::identity(CalibrationTypes::LCD, "lcd");
        record.matrix[0] = 2.0;
        dev.load_calibration(3, &record).unwrap();

        let response = command(&dev, opcodes::TAKE_READING_XYZ, &[3, 0]).await;
        let payload = decode_response(&response, opcodes::TAKE_READING_XYZ, 12).unwrap();
        let xyz = Triple::from_bytes(payload);
        let lsb = 1.0 / 65535.0;
        assert!((xyz.a - 0.5).abs() <= 2.0 * lsb);
        assert!((xyz.b - 0.5).abs() <= lsb);
        assert!((xyz.c - 0.75).abs() <= lsb);

        let response = command(&dev, opcodes::TAKE_READING_XYZ, &[4, 0]).await;
        assert_eq!(response[0], DeviceStatus::NoCalibration.code());
    }

    #[tokio::test]
    async fn test_delay_longer_than_timeout() {
        let dev = DummyDevice::new(DummyConfig {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let frame = encode_request(opcodes::GET_LEDS, &[]).unwrap();
        let result = dev.transfer(&frame, Duration::from_millis(5)).await;
        assert_eq!(result, Err(Error::Timeout));
        assert_eq!(dev.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_bus_waits_for_mode() {
        let dev = Arc::new(DummyDevice::new_default());
        let mut bus = DummyBus::new();
        bus.add(dev.clone());

        let id = DeviceId::new("dummy");
        let found = bus
            .wait_for(&id, DeviceMode::Firmware, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(found.id(), &id);

        let result = bus
            .wait_for(&id, DeviceMode::Bootloader, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }
}
