//! Identity, calibration, LED and measurement commands

use rcolorhug_core::types::{CalibrationRecord, FirmwareVersion, Leds, Triple};
use rcolorhug_core::{Device, DeviceMode};
use rcolorhug_queue::CommandQueue;

use super::device::Opened;
use super::{progress, CmdResult, Context};

/// Show firmware version, hardware version and serial number
pub async fn run_info(ctx: &Context, opened: &Opened) -> CmdResult {
    let device = &opened.device;
    let mut version = FirmwareVersion::default();
    let mut hardware = 0u8;
    let mut serial = 0u32;
    {
        let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
        queue.get_firmware_version(device, &mut version);
        queue.get_hardware_version(device, &mut hardware);
        queue.get_serial_number(device, &mut serial);
        progress::run(&mut queue, ctx).await?;
    }

    println!("Device:           {}", device.id());
    println!("Mode:             {}", device.mode());
    println!("Firmware version: {}", version);
    println!("Hardware version: {}", hardware);
    println!("Serial number:    {:06}", serial);
    Ok(())
}

/// Show one calibration slot
pub async fn run_get_calibration(ctx: &Context, opened: &Opened, slot: u16) -> CmdResult {
    let mut record = CalibrationRecord::default();
    {
        let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
        queue.get_calibration(&opened.device, slot, &mut record)?;
        progress::run(&mut queue, ctx).await?;
    }

    let types: Vec<&str> = record.types.iter_names().map(|(name, _)| name).collect();
    println!("Slot {}: {}", slot, record.description);
    println!("Types: {}", if types.is_empty() { "none".to_string() } else { types.join(", ") });
    for row in record.matrix.chunks(3) {
        println!("  {:>10.6} {:>10.6} {:>10.6}", row[0], row[1], row[2]);
    }
    Ok(())
}

/// Set or blink the LEDs
pub async fn run_set_leds(
    ctx: &Context,
    opened: &Opened,
    leds: Leds,
    repeat: u8,
    on_time: u8,
    off_time: u8,
) -> CmdResult {
    let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
    queue.set_leds(&opened.device, leds, repeat, on_time, off_time)?;
    progress::run(&mut queue, ctx).await?;
    Ok(())
}

/// Take an RGB reading, or an XYZ reading with a calibration slot
pub async fn run_take_reading(ctx: &Context, opened: &Opened, slot: Option<u16>) -> CmdResult {
    check_firmware(opened)?;
    let mut reading = Triple::default();
    {
        let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
        match slot {
            Some(slot) => queue.take_reading_xyz(&opened.device, slot, &mut reading)?,
            None => queue.take_readings(&opened.device, &mut reading),
        }
        progress::run(&mut queue, ctx).await?;
    }

    let labels = if slot.is_some() { ["X", "Y", "Z"] } else { ["R", "G", "B"] };
    println!(
        "{}: {:.6}  {}: {:.6}  {}: {:.6}",
        labels[0], reading.a, labels[1], reading.b, labels[2], reading.c
    );
    Ok(())
}

/// Run the device self test
pub async fn run_self_test(ctx: &Context, opened: &Opened) -> CmdResult {
    check_firmware(opened)?;
    let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
    queue.self_test(&opened.device);
    progress::run(&mut queue, ctx).await?;
    println!("Self test passed");
    Ok(())
}

fn check_firmware(opened: &Opened) -> CmdResult {
    if opened.device.mode() == DeviceMode::Bootloader {
        return Err(format!(
            "{} is in bootloader mode; install firmware with `rcolorhug upgrade` first",
            opened.device.id()
        )
        .into());
    }
    Ok(())
}
