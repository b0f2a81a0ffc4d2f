//! ColorHug command opcodes
//!
//! The first byte of every request frame, echoed back in byte 1 of the
//! response. Firmware and bootloader share the same numbering; commands the
//! running image does not implement are answered with a nonzero status.

// ============================================================================
// Sensor setup
// ============================================================================

/// Get the color filter currently selected on the sensor
pub const GET_COLOR_SELECT: u8 = 0x01;
/// Select the sensor color filter
pub const SET_COLOR_SELECT: u8 = 0x02;
/// Get the sensor frequency multiplier
pub const GET_MULTIPLIER: u8 = 0x03;
/// Set the sensor frequency multiplier
pub const SET_MULTIPLIER: u8 = 0x04;
/// Get the sensor integration time
pub const GET_INTEGRAL_TIME: u8 = 0x05;
/// Set the sensor integration time
pub const SET_INTEGRAL_TIME: u8 = 0x06;

// ============================================================================
// Identification
// ============================================================================

/// Get firmware version (major, minor, micro)
pub const GET_FIRMWARE_VERSION: u8 = 0x07;
/// Get the hardware (PCB) version
pub const GET_HARDWARE_VERSION: u8 = 0x30;
/// Get the device serial number
pub const GET_SERIAL_NUMBER: u8 = 0x0b;
/// Set the device serial number
pub const SET_SERIAL_NUMBER: u8 = 0x0c;
/// Get the owner name
pub const GET_OWNER_NAME: u8 = 0x11;
/// Set the owner name
pub const SET_OWNER_NAME: u8 = 0x12;
/// Get the owner email
pub const GET_OWNER_EMAIL: u8 = 0x13;
/// Set the owner email
pub const SET_OWNER_EMAIL: u8 = 0x14;

// ============================================================================
// Calibration
// ============================================================================

/// Read one calibration slot
pub const GET_CALIBRATION: u8 = 0x09;
/// Write one calibration slot
pub const SET_CALIBRATION: u8 = 0x0a;
/// Get the dark offsets (3 packed floats)
pub const GET_DARK_OFFSETS: u8 = 0x0f;
/// Set the dark offsets (3 packed floats)
pub const SET_DARK_OFFSETS: u8 = 0x10;
/// Get the display-type to calibration-slot map
pub const GET_CALIBRATION_MAP: u8 = 0x2e;
/// Set the display-type to calibration-slot map
pub const SET_CALIBRATION_MAP: u8 = 0x2f;
/// Commit volatile settings to EEPROM
pub const WRITE_EEPROM: u8 = 0x20;

// ============================================================================
// Indicators
// ============================================================================

/// Get LED state
pub const GET_LEDS: u8 = 0x0d;
/// Set LED state and blink pattern
pub const SET_LEDS: u8 = 0x0e;

// ============================================================================
// Readings
// ============================================================================

/// Take a raw sensor reading
pub const TAKE_READING_RAW: u8 = 0x21;
/// Take a dark-offset corrected RGB reading
pub const TAKE_READINGS: u8 = 0x22;
/// Take an XYZ reading through a calibration slot
pub const TAKE_READING_XYZ: u8 = 0x23;

// ============================================================================
// Flash and execution mode
// ============================================================================

/// Reset into the bootloader
pub const RESET: u8 = 0x24;
/// Read flash memory
pub const READ_FLASH: u8 = 0x25;
/// Write flash memory
pub const WRITE_FLASH: u8 = 0x26;
/// Jump from the bootloader into the runcode
pub const BOOT_FLASH: u8 = 0x27;
/// Mark the current firmware as good (or bad)
pub const SET_FLASH_SUCCESS: u8 = 0x28;
/// Erase flash memory
pub const ERASE_FLASH: u8 = 0x29;

// ============================================================================
// Diagnostics
// ============================================================================

/// Run the on-device self test
pub const SELF_TEST: u8 = 0x40;

/// Human-readable name for an opcode, used in log output
pub fn name(opcode: u8) -> &'static str {
    match opcode {
        GET_COLOR_SELECT => "get-color-select",
        SET_COLOR_SELECT => "set-color-select",
        GET_MULTIPLIER => "get-multiplier",
        SET_MULTIPLIER => "set-multiplier",
        GET_INTEGRAL_TIME => "get-integral-time",
        SET_INTEGRAL_TIME => "set-integral-time",
        GET_FIRMWARE_VERSION => "get-firmware-version",
        GET_HARDWARE_VERSION => "get-hardware-version",
        GET_SERIAL_NUMBER => "get-serial-number",
        SET_SERIAL_NUMBER => "set-serial-number",
        GET_OWNER_NAME => "get-owner-name",
        SET_OWNER_NAME => "set-owner-name",
        GET_OWNER_EMAIL => "get-owner-email",
        SET_OWNER_EMAIL => "set-owner-email",
        GET_CALIBRATION => "get-calibration",
        SET_CALIBRATION => "set-calibration",
        GET_DARK_OFFSETS => "get-dark-offsets",
        SET_DARK_OFFSETS => "set-dark-offsets",
        GET_CALIBRATION_MAP => "get-calibration-map",
        SET_CALIBRATION_MAP => "set-calibration-map",
        WRITE_EEPROM => "write-eeprom",
        GET_LEDS => "get-leds",
        SET_LEDS => "set-leds",
        TAKE_READING_RAW => "take-reading-raw",
        TAKE_READINGS => "take-readings",
        TAKE_READING_XYZ => "take-reading-xyz",
        RESET => "reset",
        READ_FLASH => "read-flash",
        WRITE_FLASH => "write-flash",
        BOOT_FLASH => "boot-flash",
        SET_FLASH_SUCCESS => "set-flash-success",
        ERASE_FLASH => "erase-flash",
        SELF_TEST => "self-test",
        _ => "unknown",
    }
}
