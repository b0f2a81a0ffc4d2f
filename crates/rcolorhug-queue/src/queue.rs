//! The command queue
//!
//! Callers build a batch with the `add*` operations, which never perform
//! I/O, then drain it once with [`CommandQueue::process`]. Typed operations
//! that take values validate them up front, so a bad argument is reported
//! before anything is queued.

use std::time::Duration;

use rcolorhug_core::protocol::packed::{put_fixed_str, put_u16, put_u32};
use rcolorhug_core::protocol::{
    erase_flash_payload, opcodes, read_flash_payload, write_flash_payload, EEPROM_MAGIC,
    FLASH_VERIFY_BLOCK_SIZE, MAX_READ_CHUNK, MAX_WRITE_CHUNK, OWNER_FIELD_LEN,
};
use rcolorhug_core::types::{
    check_slot, CalibrationMap, CalibrationRecord, ColorSelect, FirmwareVersion, LedPattern, Leds,
    Multiplier, Triple,
};
use rcolorhug_core::{DeviceRef, Error as CoreError};

use crate::command::{Command, OutputTarget, Transform};
use crate::dispatch::{ProcessFlags, ProcessOptions, Session};
use crate::error::{Error, Result};

/// Default per-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Ordered batch of commands for one or more devices
///
/// `'a` is the lifetime of the caller-owned buffers the responses are
/// written into.
pub struct CommandQueue<'a> {
    commands: Vec<Command<'a>>,
    timeout: Duration,
}

impl Default for CommandQueue<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CommandQueue<'a> {
    /// Create an empty queue with the default timeout
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-transfer timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Change the per-transfer timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Per-transfer timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queue a raw command
    ///
    /// `input` is copied. Nothing is validated or sent until
    /// [`process`](Self::process); an input that does not fit in a frame
    /// fails the command then, without reaching the device.
    pub fn add(&mut self, device: &DeviceRef, opcode: u8, input: &[u8], output: OutputTarget<'a>) {
        self.commands
            .push(Command::new(device.clone(), opcode, input.to_vec(), output));
    }

    /// Queue a command whose response is decoded by `transform`
    pub fn add_with_transform(
        &mut self,
        device: &DeviceRef,
        opcode: u8,
        input: &[u8],
        scratch_len: usize,
        transform: Transform<'a>,
    ) {
        self.add(
            device,
            opcode,
            input,
            OutputTarget::Owned {
                scratch_len,
                transform,
            },
        );
    }

    fn add_simple(&mut self, device: &DeviceRef, opcode: u8, input: &[u8]) {
        self.add(device, opcode, input, OutputTarget::None);
    }

    // =========================================================================
    // Measurement setup
    // =========================================================================

    /// Read the sensor color filter
    pub fn get_color_select(&mut self, device: &DeviceRef, out: &'a mut ColorSelect) {
        let transform = Transform::custom(move |scratch| {
            *out = ColorSelect::from_u8(scratch[0])?;
            Ok(())
        });
        self.add_with_transform(device, opcodes::GET_COLOR_SELECT, &[], 1, transform);
    }

    /// Select the sensor color filter
    pub fn set_color_select(&mut self, device: &DeviceRef, color: ColorSelect) {
        self.add_simple(device, opcodes::SET_COLOR_SELECT, &[color as u8]);
    }

    /// Read the sensor frequency scaling
    pub fn get_multiplier(&mut self, device: &DeviceRef, out: &'a mut Multiplier) {
        let transform = Transform::custom(move |scratch| {
            *out = Multiplier::from_u8(scratch[0])?;
            Ok(())
        });
        self.add_with_transform(device, opcodes::GET_MULTIPLIER, &[], 1, transform);
    }

    /// Set the sensor frequency scaling
    pub fn set_multiplier(&mut self, device: &DeviceRef, multiplier: Multiplier) {
        self.add_simple(device, opcodes::SET_MULTIPLIER, &[multiplier as u8]);
    }

    /// Read the integration time
    pub fn get_integral_time(&mut self, device: &DeviceRef, out: &'a mut u16) {
        self.add_with_transform(
            device,
            opcodes::GET_INTEGRAL_TIME,
            &[],
            2,
            Transform::U16(out),
        );
    }

    /// Set the integration time
    pub fn set_integral_time(&mut self, device: &DeviceRef, integral_time: u16) {
        self.add_simple(
            device,
            opcodes::SET_INTEGRAL_TIME,
            &integral_time.to_le_bytes(),
        );
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Read the firmware version
    pub fn get_firmware_version(&mut self, device: &DeviceRef, out: &'a mut FirmwareVersion) {
        self.add_with_transform(
            device,
            opcodes::GET_FIRMWARE_VERSION,
            &[],
            FirmwareVersion::WIRE_LEN,
            Transform::FirmwareVersion(out),
        );
    }

    /// Read the hardware version
    pub fn get_hardware_version(&mut self, device: &DeviceRef, out: &'a mut u8) {
        self.add_with_transform(
            device,
            opcodes::GET_HARDWARE_VERSION,
            &[],
            1,
            Transform::U8(out),
        );
    }

    /// Read the serial number
    pub fn get_serial_number(&mut self, device: &DeviceRef, out: &'a mut u32) {
        self.add_with_transform(
            device,
            opcodes::GET_SERIAL_NUMBER,
            &[],
            4,
            Transform::U32(out),
        );
    }

    /// Program the serial number
    pub fn set_serial_number(&mut self, device: &DeviceRef, serial: u32) {
        let mut input = Vec::with_capacity(4);
        put_u32(&mut input, serial);
        self.add_simple(device, opcodes::SET_SERIAL_NUMBER, &input);
    }

    /// Read the owner name
    pub fn get_owner_name(&mut self, device: &DeviceRef, out: &'a mut String) {
        self.add_with_transform(
            device,
            opcodes::GET_OWNER_NAME,
            &[],
            OWNER_FIELD_LEN,
            Transform::String(out),
        );
    }

    /// Set the owner name
    pub fn set_owner_name(&mut self, device: &DeviceRef, name: &str) -> Result<()> {
        let mut input = Vec::with_capacity(OWNER_FIELD_LEN);
        put_fixed_str(&mut input, name, OWNER_FIELD_LEN)?;
        self.add_simple(device, opcodes::SET_OWNER_NAME, &input);
        Ok(())
    }

    /// Read the owner email address
    pub fn get_owner_email(&mut self, device: &DeviceRef, out: &'a mut String) {
        self.add_with_transform(
            device,
            opcodes::GET_OWNER_EMAIL,
            &[],
            OWNER_FIELD_LEN,
            Transform::String(out),
        );
    }

    /// Set the owner email address
    pub fn set_owner_email(&mut self, device: &DeviceRef, email: &str) -> Result<()> {
        let mut input = Vec::with_capacity(OWNER_FIELD_LEN);
        put_fixed_str(&mut input, email, OWNER_FIELD_LEN)?;
        self.add_simple(device, opcodes::SET_OWNER_EMAIL, &input);
        Ok(())
    }

    // =========================================================================
    // Calibration
    // =========================================================================

    /// Read one calibration slot
    pub fn get_calibration(
        &mut self,
        device: &DeviceRef,
        slot: u16,
        out: &'a mut CalibrationRecord,
    ) -> Result<()> {
        check_slot(slot)?;
        self.add_with_transform(
            device,
            opcodes::GET_CALIBRATION,
            &slot.to_le_bytes(),
            CalibrationRecord::WIRE_LEN,
            Transform::Calibration(out),
        );
        Ok(())
    }

    /// Write one calibration slot
    pub fn set_calibration(
        &mut self,
        device: &DeviceRef,
        slot: u16,
        record: &CalibrationRecord,
    ) -> Result<()> {
        check_slot(slot)?;
        let mut input = Vec::with_capacity(2 + CalibrationRecord::WIRE_LEN);
        put_u16(&mut input, slot);
        input.extend_from_slice(&record.to_bytes()?);
        self.add_simple(device, opcodes::SET_CALIBRATION, &input);
        Ok(())
    }

    /// Read which slot is used for each display type
    pub fn get_calibration_map(&mut self, device: &DeviceRef, out: &'a mut CalibrationMap) {
        self.add_with_transform(
            device,
            opcodes::GET_CALIBRATION_MAP,
            &[],
            CalibrationMap::WIRE_LEN,
            Transform::CalibrationMap(out),
        );
    }

    /// Set which slot is used for each display type
    pub fn set_calibration_map(&mut self, device: &DeviceRef, map: &CalibrationMap) -> Result<()> {
        let input = map.to_bytes()?;
        self.add_simple(device, opcodes::SET_CALIBRATION_MAP, &input);
        Ok(())
    }

    /// Read the sensor dark offsets
    pub fn get_dark_offsets(&mut self, device: &DeviceRef, out: &'a mut Triple) {
        self.add_with_transform(
            device,
            opcodes::GET_DARK_OFFSETS,
            &[],
            Triple::WIRE_LEN,
            Transform::Triple(out),
        );
    }

    /// Set the sensor dark offsets
    pub fn set_dark_offsets(&mut self, device: &DeviceRef, offsets: &Triple) -> Result<()> {
        let input = offsets.to_payload()?;
        self.add_simple(device, opcodes::SET_DARK_OFFSETS, &input);
        Ok(())
    }

    // =========================================================================
    // Indicators
    // =========================================================================

    /// Read which LEDs are lit
    pub fn get_leds(&mut self, device: &DeviceRef, out: &'a mut Leds) {
        self.add_with_transform(device, opcodes::GET_LEDS, &[], 1, Transform::Leds(out));
    }

    /// Set the LEDs, optionally blinking `repeat` times
    ///
    /// Times are in units of 10ms.
    pub fn set_leds(
        &mut self,
        device: &DeviceRef,
        leds: Leds,
        repeat: u8,
        on_time: u8,
        off_time: u8,
    ) -> Result<()> {
        let pattern = LedPattern {
            leds,
            repeat,
            on_time,
            off_time,
        };
        let input = pattern.to_payload()?;
        self.add_simple(device, opcodes::SET_LEDS, &input);
        Ok(())
    }

    // =========================================================================
    // Readings
    // =========================================================================

    /// Take a raw sensor reading with the current color filter
    pub fn take_reading_raw(&mut self, device: &DeviceRef, out: &'a mut u32) {
        self.add_with_transform(
            device,
            opcodes::TAKE_READING_RAW,
            &[],
            4,
            Transform::U32(out),
        );
    }

    /// Take dark-offset corrected RGB readings
    pub fn take_readings(&mut self, device: &DeviceRef, out: &'a mut Triple) {
        self.add_with_transform(
            device,
            opcodes::TAKE_READINGS,
            &[],
            Triple::WIRE_LEN,
            Transform::Triple(out),
        );
    }

    /// Take an XYZ reading corrected with calibration `slot`
    pub fn take_reading_xyz(
        &mut self,
        device: &DeviceRef,
        slot: u16,
        out: &'a mut Triple,
    ) -> Result<()> {
        check_slot(slot)?;
        self.add_with_transform(
            device,
            opcodes::TAKE_READING_XYZ,
            &slot.to_le_bytes(),
            Triple::WIRE_LEN,
            Transform::Triple(out),
        );
        Ok(())
    }

    // =========================================================================
    // Persistence and modes
    // =========================================================================

    /// Commit settings to EEPROM
    pub fn write_eeprom(&mut self, device: &DeviceRef) {
        self.add_simple(device, opcodes::WRITE_EEPROM, EEPROM_MAGIC);
    }

    /// Reboot into the bootloader
    pub fn reset(&mut self, device: &DeviceRef) {
        self.add_simple(device, opcodes::RESET, &[]);
    }

    /// Leave the bootloader and start the firmware
    pub fn boot_flash(&mut self, device: &DeviceRef) {
        self.add_simple(device, opcodes::BOOT_FLASH, &[]);
    }

    /// Tell the bootloader whether the last upgrade worked
    pub fn set_flash_success(&mut self, device: &DeviceRef, success: bool) {
        self.add_simple(device, opcodes::SET_FLASH_SUCCESS, &[success as u8]);
    }

    /// Run the on-device self test
    pub fn self_test(&mut self, device: &DeviceRef) {
        self.add_simple(device, opcodes::SELF_TEST, &[]);
    }

    // =========================================================================
    // Flash
    // =========================================================================

    /// Erase `len` bytes of flash at `addr`
    pub fn erase_flash(&mut self, device: &DeviceRef, addr: u16, len: u16) -> Result<()> {
        check_flash_range(addr, len as usize)?;
        self.add_simple(device, opcodes::ERASE_FLASH, &erase_flash_payload(addr, len));
        Ok(())
    }

    /// Write `data` at `addr`, `chunk_size` bytes per command
    pub fn write_flash(
        &mut self,
        device: &DeviceRef,
        addr: u16,
        data: &[u8],
        chunk_size: usize,
    ) -> Result<()> {
        check_chunk_size(chunk_size)?;
        check_flash_range(addr, data.len())?;
        for (i, chunk) in data.chunks(chunk_size).enumerate() {
            let chunk_addr = addr + (i * chunk_size) as u16;
            let input = write_flash_payload(chunk_addr, chunk)?;
            self.add_simple(device, opcodes::WRITE_FLASH, &input);
        }
        Ok(())
    }

    /// Read flash at `addr` into `buf`
    pub fn read_flash(&mut self, device: &DeviceRef, addr: u16, buf: &'a mut [u8]) -> Result<()> {
        check_flash_range(addr, buf.len())?;
        for (i, dest) in buf.chunks_mut(MAX_READ_CHUNK).enumerate() {
            let chunk_addr = addr + (i * MAX_READ_CHUNK) as u16;
            let input = read_flash_payload(chunk_addr, dest.len())?;
            self.add_with_transform(
                device,
                opcodes::READ_FLASH,
                &input,
                1 + dest.len(),
                Transform::ReadFlash {
                    addr: chunk_addr,
                    dest,
                },
            );
        }
        Ok(())
    }

    /// Check that flash at `addr` holds `data`
    pub fn verify_flash(&mut self, device: &DeviceRef, addr: u16, data: &[u8]) -> Result<()> {
        check_flash_range(addr, data.len())?;
        for (i, expected) in data.chunks(FLASH_VERIFY_BLOCK_SIZE).enumerate() {
            let chunk_addr = addr + (i * FLASH_VERIFY_BLOCK_SIZE) as u16;
            let input = read_flash_payload(chunk_addr, expected.len())?;
            self.add_with_transform(
                device,
                opcodes::READ_FLASH,
                &input,
                1 + expected.len(),
                Transform::VerifyFlash {
                    addr: chunk_addr,
                    expected: expected.to_vec(),
                },
            );
        }
        Ok(())
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// Run every queued command
    ///
    /// Resolves once every command has completed or been abandoned. The
    /// queue is empty afterwards, whatever the outcome.
    pub async fn process(&mut self, flags: ProcessFlags) -> Result<()> {
        self.process_with(ProcessOptions::new(flags)).await
    }

    /// Run every queued command with cancellation and event reporting
    pub async fn process_with(&mut self, options: ProcessOptions) -> Result<()> {
        let result = Session::new(&mut self.commands, options, self.timeout)
            .run()
            .await;
        self.commands.clear();
        result
    }

    /// Run every queued command, blocking the calling thread
    ///
    /// Uses a private single-threaded runtime. Must not be called from
    /// inside an async runtime.
    pub fn process_sync(&mut self, flags: ProcessFlags) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Reentrant);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Runtime(e.to_string()))?;
        runtime.block_on(self.process(flags))
    }
}

/// Check that `len` bytes from `addr` are inside the 16-bit address space
pub(crate) fn check_flash_range(addr: u16, len: usize) -> std::result::Result<(), CoreError> {
    if len == 0 {
        return Err(CoreError::InvalidParameter("empty flash range".into()));
    }
    if addr as usize + len > 0x10000 {
        return Err(CoreError::InvalidParameter(format!(
            "{} bytes at 0x{:04x} run past the end of the address space",
            len, addr
        )));
    }
    Ok(())
}

/// Check a WRITE_FLASH chunk size
pub(crate) fn check_chunk_size(chunk_size: usize) -> std::result::Result<(), CoreError> {
    if chunk_size == 0 || chunk_size > MAX_WRITE_CHUNK {
        return Err(CoreError::InvalidParameter(format!(
            "chunk size {} outside 1..={}",
            chunk_size, MAX_WRITE_CHUNK
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rcolorhug_core::protocol::packed::get_u16;
    use rcolorhug_core::protocol::DeviceStatus;
    use rcolorhug_core::types::CalibrationTypes;
    use rcolorhug_core::{Device, DeviceMode};
    use rcolorhug_dummy::{DummyConfig, DummyDevice, Fault, FaultKind};

    fn dummy(mode: DeviceMode) -> (Arc<DummyDevice>, DeviceRef) {
        let dev = Arc::new(DummyDevice::new(DummyConfig {
            mode,
            ..Default::default()
        }));
        let handle: DeviceRef = dev.clone();
        (dev, handle)
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[tokio::test]
    async fn test_measurement_setup() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut color = ColorSelect::White;
        let mut multiplier = Multiplier::Disabled;
        let mut integral = 0u16;
        {
            let mut queue = CommandQueue::new();
            queue.set_color_select(&dev, ColorSelect::Green);
            queue.set_multiplier(&dev, Multiplier::Scale20);
            queue.set_integral_time(&dev, 0x1234);
            queue.get_color_select(&dev, &mut color);
            queue.get_multiplier(&dev, &mut multiplier);
            queue.get_integral_time(&dev, &mut integral);
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert_eq!(color, ColorSelect::Green);
        assert_eq!(multiplier, Multiplier::Scale20);
        assert_eq!(integral, 0x1234);
    }

    #[tokio::test]
    async fn test_identity() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut version = FirmwareVersion::default();
        let mut hardware = 0u8;
        let mut serial = 0u32;
        let mut name = String::new();
        let mut email = String::new();
        {
            let mut queue = CommandQueue::new();
            queue.set_serial_number(&dev, 0xc0ffee);
            queue.set_owner_name(&dev, "Ada Lovelace").unwrap();
            queue.set_owner_email(&dev, "ada@example.com").unwrap();
            queue.get_firmware_version(&dev, &mut version);
            queue.get_hardware_version(&dev, &mut hardware);
            queue.get_serial_number(&dev, &mut serial);
            queue.get_owner_name(&dev, &mut name);
            queue.get_owner_email(&dev, &mut email);
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert_eq!(version.to_string(), "2.0.6");
        assert_eq!(hardware, 2);
        assert_eq!(serial, 0xc0ffee);
        assert_eq!(name, "Ada Lovelace");
        assert_eq!(email, "ada@example.com");
    }

    #[test]
    fn test_validation_queues_nothing() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut out = Triple::default();
        let mut queue = CommandQueue::new();
        let long = "x".repeat(OWNER_FIELD_LEN + 1);
        assert!(queue.set_owner_name(&dev, &long).is_err());

        let err = queue
            .set_calibration(&dev, 64, &CalibrationRecord::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CoreError::SlotOutOfRange { slot: 64, max: 64 })
        ));

        let mut record = CalibrationRecord::identity(CalibrationTypes::LCD, "lcd");
        record.matrix[2] = 1e6;
        assert!(matches!(
            queue.set_calibration(&dev, 0, &record),
            Err(Error::Command(CoreError::PackedFloatRange(_)))
        ));
        assert!(queue
            .set_dark_offsets(&dev, &Triple::new(0.0, -40000.0, 0.0))
            .is_err());
        assert!(queue.set_leds(&dev, Leds::RED, 2, 0, 10).is_err());
        assert!(queue
            .set_calibration_map(&dev, &CalibrationMap([0, 1, 2, 3, 4, 99]))
            .is_err());
        assert!(queue.take_reading_xyz(&dev, 70, &mut out).is_err());
        assert!(queue.erase_flash(&dev, 0xff00, 0x0200).is_err());
        assert!(queue.write_flash(&dev, 0x4000, &[1, 2, 3], 0).is_err());
        assert!(queue.write_flash(&dev, 0x4000, &[1, 2, 3], 60).is_err());
        assert!(queue.verify_flash(&dev, 0x4000, &[]).is_err());

        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_undersized_transform_fails_one_command() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut serial = 0u32;
        let mut hardware = 0u8;
        let result = {
            let mut queue = CommandQueue::new();
            queue.add_with_transform(
                &dev,
                opcodes::GET_SERIAL_NUMBER,
                &[],
                2,
                Transform::U32(&mut serial),
            );
            queue.get_hardware_version(&dev, &mut hardware);
            queue.process(ProcessFlags::CONTINUE_ON_ERROR).await
        };
        let failures = match result {
            Err(Error::Batch { failures }) => failures,
            other => panic!("expected a batch failure, got {:?}", other),
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].error,
            CoreError::ShortFrame {
                expected: 4,
                actual: 2
            }
        );
        assert_eq!(serial, 0);
        assert_eq!(hardware, 2);
    }

    #[tokio::test]
    async fn test_calibration() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut record = CalibrationRecord::identity(CalibrationTypes::CRT, "Trinitron");
        record.matrix[4] = 3.0;
        let map = CalibrationMap([5, 5, 1, 2, 3, 4]);

        let mut read = CalibrationRecord::default();
        let mut read_map = CalibrationMap::default();
        let mut xyz = Triple::default();
        {
            let mut queue = CommandQueue::new();
            queue.set_calibration(&dev, 5, &record).unwrap();
            queue.set_calibration_map(&dev, &map).unwrap();
            queue.get_calibration(&dev, 5, &mut read).unwrap();
            queue.get_calibration_map(&dev, &mut read_map);
            queue.take_reading_xyz(&dev, 5, &mut xyz).unwrap();
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert_eq!(read, record);
        assert_eq!(read_map, map);
        assert!((xyz.b - 1.5).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_empty_calibration_slot() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let mut read = CalibrationRecord::default();
        let result = {
            let mut queue = CommandQueue::new();
            queue.get_calibration(&dev, 9, &mut read).unwrap();
            queue.process(ProcessFlags::empty()).await
        };
        assert_eq!(
            result.unwrap_err().failures()[0].error,
            CoreError::Device {
                opcode: opcodes::GET_CALIBRATION,
                status: DeviceStatus::NoCalibration
            }
        );
    }

    #[tokio::test]
    async fn test_dark_offsets_and_readings() {
        let (_, dev) = dummy(DeviceMode::Firmware);
        let offsets = Triple::new(0.5, 0.25, 2.0);
        let mut read_offsets = Triple::default();
        let mut readings = Triple::default();
        let mut raw = 0u32;
        {
            let mut queue = CommandQueue::new();
            queue.set_dark_offsets(&dev, &offsets).unwrap();
            queue.get_dark_offsets(&dev, &mut read_offsets);
            queue.take_readings(&dev, &mut readings);
            queue.take_reading_raw(&dev, &mut raw);
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert!((read_offsets.a - 0.5).abs() < 1e-4);
        assert!((read_offsets.c - 2.0).abs() < 1e-4);
        assert!((readings.b - 0.5).abs() < 1e-4);
        assert_eq!(raw, 12345);
    }

    #[tokio::test]
    async fn test_leds_eeprom_and_self_test() {
        let (device, dev) = dummy(DeviceMode::Firmware);
        let mut leds = Leds::empty();
        {
            let mut queue = CommandQueue::new();
            queue.set_leds(&dev, Leds::RED | Leds::GREEN, 0, 0, 0).unwrap();
            queue.get_leds(&dev, &mut leds);
            queue.write_eeprom(&dev);
            queue.self_test(&dev);
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert_eq!(leds, Leds::RED | Leds::GREEN);
        assert_eq!(device.eeprom_writes(), 1);

        device.fail_self_test(true);
        let mut queue = CommandQueue::new();
        queue.self_test(&dev);
        let err = queue.process(ProcessFlags::empty()).await.unwrap_err();
        assert!(err.to_string().contains("self test failed"));
    }

    #[tokio::test]
    async fn test_mode_switching() {
        let (device, dev) = dummy(DeviceMode::Firmware);
        let mut queue = CommandQueue::new();
        queue.reset(&dev);
        queue.process(ProcessFlags::empty()).await.unwrap();
        assert_eq!(dev.mode(), DeviceMode::Bootloader);

        queue.boot_flash(&dev);
        queue.set_flash_success(&dev, true);
        queue.process(ProcessFlags::empty()).await.unwrap();
        assert_eq!(dev.mode(), DeviceMode::Firmware);
        assert_eq!(device.flash_success(), Some(true));
    }

    #[tokio::test]
    async fn test_write_in_chunks() {
        let (device, dev) = dummy(DeviceMode::Bootloader);
        let data = image(130);

        let mut queue = CommandQueue::new();
        queue.write_flash(&dev, 0x4000, &data, 32).unwrap();
        assert_eq!(queue.len(), 5);
        queue.process(ProcessFlags::empty()).await.unwrap();

        let chunks: Vec<(u16, usize)> = device
            .transfers()
            .iter()
            .map(|frame| (get_u16(frame, 1), frame[3] as usize))
            .collect();
        assert_eq!(
            chunks,
            [
                (0x4000, 32),
                (0x4020, 32),
                (0x4040, 32),
                (0x4060, 32),
                (0x4080, 2)
            ]
        );
        assert_eq!(device.flash(0x4000, 130), data);

        queue.verify_flash(&dev, 0x4000, &data).unwrap();
        assert_eq!(queue.len(), 3);
        queue.process(ProcessFlags::empty()).await.unwrap();

        let mut back = vec![0u8; 130];
        {
            let mut queue = CommandQueue::new();
            queue.read_flash(&dev, 0x4000, &mut back).unwrap();
            assert_eq!(queue.len(), 3);
            queue.process(ProcessFlags::empty()).await.unwrap();
        }
        assert_eq!(back, data);
    }

    #[tokio::test]
    async fn test_verify_mismatch() {
        let (device, dev) = dummy(DeviceMode::Bootloader);
        let data = image(100);
        let mut flashed = data.clone();
        flashed[70] ^= 0x10;
        device.load_flash(0x4000, &flashed);

        let mut queue = CommandQueue::new();
        queue.verify_flash(&dev, 0x4000, &data).unwrap();
        let err = queue.process(ProcessFlags::empty()).await.unwrap_err();
        assert_eq!(
            err.failures()[0].error,
            CoreError::VerifyMismatch {
                addr: 0x4000 + 70,
                expected: data[70],
                actual: flashed[70]
            }
        );
    }

    #[tokio::test]
    async fn test_read_flash_bad_checksum() {
        let (device, dev) = dummy(DeviceMode::Bootloader);
        device.inject(Fault::new(opcodes::READ_FLASH, 2, FaultKind::CorruptChecksum));

        let mut back = vec![0u8; 100];
        let result = {
            let mut queue = CommandQueue::new();
            queue.read_flash(&dev, 0x4000, &mut back).unwrap();
            queue.process(ProcessFlags::empty()).await
        };
        assert!(matches!(
            result.unwrap_err().failures()[0].error,
            CoreError::ChecksumMismatch { addr: 0x403c, .. }
        ));
    }

    #[tokio::test]
    async fn test_erase_flash() {
        let (device, dev) = dummy(DeviceMode::Bootloader);
        device.load_flash(0x4000, &[0u8; 16]);
        let mut queue = CommandQueue::new();
        queue.erase_flash(&dev, 0x4000, 8).unwrap();
        queue.process(ProcessFlags::empty()).await.unwrap();
        assert_eq!(device.flash(0x4000, 8), [0xff; 8]);
        assert_eq!(device.flash(0x4008, 8), [0x00; 8]);
    }
}
