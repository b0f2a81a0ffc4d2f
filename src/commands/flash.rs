//! Flash read, write and firmware upgrade commands

use std::path::Path;

use rcolorhug_core::types::FirmwareVersion;
use rcolorhug_core::Device;
use rcolorhug_queue::{CommandQueue, FlashOrchestrator};
use tokio::sync::mpsc;

use super::device::Opened;
use super::{progress, CmdResult, Context};

fn orchestrator(ctx: &Context) -> rcolorhug_queue::Result<FlashOrchestrator> {
    Ok(
        FlashOrchestrator::from_config(&ctx.config.flash, ctx.config.transfer.timeout())?
            .with_cancel(ctx.cancel.clone()),
    )
}

/// Read `len` bytes of flash at `addr` into a file
pub async fn run_read_flash(
    ctx: &Context,
    opened: &Opened,
    addr: u16,
    len: usize,
    output: &Path,
) -> CmdResult {
    let mut data = vec![0u8; len];
    {
        let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
        queue.read_flash(&opened.device, addr, &mut data)?;
        progress::run_with_bar(&mut queue, ctx, "Reading").await?;
    }

    std::fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Erase, write and verify a file at `addr`
pub async fn run_write_flash(
    ctx: &Context,
    opened: &Opened,
    addr: u16,
    input: &Path,
    chunk_size: Option<usize>,
) -> CmdResult {
    let data = std::fs::read(input)?;
    log::info!("Read {} bytes from {:?}", data.len(), input);

    let mut flasher = orchestrator(ctx)?;
    if let Some(chunk_size) = chunk_size {
        flasher = flasher.with_chunk_size(chunk_size)?;
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let flasher = flasher.with_events(tx);

    let device = &opened.device;
    let work = async move { flasher.write_firmware(device, addr, &data).await };
    let (result, ()) = tokio::join!(work, progress::show_flash_events(rx));
    result?;

    println!("Flash written and verified");
    Ok(())
}

/// Install a firmware image and report the version now running
pub async fn run_upgrade(ctx: &Context, opened: &Opened, input: &Path) -> CmdResult {
    let image = std::fs::read(input)?;
    log::info!("Read {} byte firmware image from {:?}", image.len(), input);

    let (tx, rx) = mpsc::unbounded_channel();
    let flasher = orchestrator(ctx)?.with_events(tx);

    let device = opened.device.clone();
    let reconnect = opened.reconnect.as_ref();
    let work = async move { flasher.upgrade(device, &image, reconnect).await };
    let (result, ()) = tokio::join!(work, progress::show_flash_events(rx));
    let device = result?;

    let mut version = FirmwareVersion::default();
    {
        let mut queue = CommandQueue::new().with_timeout(ctx.config.transfer.timeout());
        queue.get_firmware_version(&device, &mut version);
        progress::run(&mut queue, ctx).await?;
    }
    println!("{} is now running firmware {}", device.id(), version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DeviceArgs;
    use crate::commands::device::{open, DUMMY};
    use rcolorhug_core::config::Config;
    use rcolorhug_core::DeviceMode;
    use tokio_util::sync::CancellationToken;

    fn context() -> Context {
        Context::new(Config::default(), &DeviceArgs::default(), CancellationToken::new())
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("rcolorhug-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_upgrade_then_read_back() {
        let ctx = context();
        let opened = open(Some(DUMMY)).await.unwrap();
        let image: Vec<u8> = (0..500u32).map(|i| (i * 7) as u8).collect();
        let input = temp_path("upgrade-in.bin");
        let output = temp_path("upgrade-out.bin");
        std::fs::write(&input, &image).unwrap();

        run_upgrade(&ctx, &opened, &input).await.unwrap();
        assert_eq!(opened.device.mode(), DeviceMode::Firmware);

        run_read_flash(&ctx, &opened, 0x4000, image.len(), &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), image);

        let _ = std::fs::remove_file(input);
        let _ = std::fs::remove_file(output);
    }

    #[tokio::test]
    async fn test_write_flash_needs_bootloader() {
        let ctx = context();
        let opened = open(Some(DUMMY)).await.unwrap();
        let input = temp_path("write-in.bin");
        std::fs::write(&input, [0x55u8; 64]).unwrap();

        let result = run_write_flash(&ctx, &opened, 0x4000, &input, Some(16)).await;
        assert!(result.is_err());

        let result = run_write_flash(&ctx, &opened, 0x4000, &input, Some(0)).await;
        assert!(result.is_err());
        let _ = std::fs::remove_file(input);
    }
}
