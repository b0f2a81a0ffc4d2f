//! List command implementation

use super::CmdResult;

/// List connected ColorHug devices
#[cfg(feature = "usb")]
pub async fn run_list() -> CmdResult {
    let devices = rcolorhug_usb::list_devices().await?;
    if devices.is_empty() {
        println!("No ColorHug devices found");
        return Ok(());
    }

    println!("{:<12} {:<10} {:<11} {}", "Device", "Model", "Mode", "Serial");
    println!("{}", "-".repeat(48));
    for info in &devices {
        println!(
            "{:<12} {:<10} {:<11} {}",
            info.id.to_string(),
            info.model.to_string(),
            info.mode.to_string(),
            info.serial.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// List connected ColorHug devices
#[cfg(not(feature = "usb"))]
pub async fn run_list() -> CmdResult {
    println!("USB support not compiled in; only the \"dummy\" device is available");
    Ok(())
}
