//! Flash workflows
//!
//! Multi-step operations built from queue batches. Each step is one batch,
//! awaited before the next one is built; the first failing step aborts the
//! workflow and is named in the returned [`Error::Flash`].
//!
//! ```text
//! write_firmware:  erase -> write -> verify
//! upgrade:         [reset -> wait for bootloader] -> erase -> write -> verify
//!                  -> boot -> wait for firmware -> confirm
//! ```

use std::fmt;
use std::time::Duration;

use rcolorhug_core::config::FlashConfig;
use rcolorhug_core::protocol::{FLASH_TRANSFER_BLOCK_SIZE, RUNCODE_ADDRESS};
use rcolorhug_core::{DeviceId, DeviceMode, DeviceRef, Reconnect};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{ProcessEvent, ProcessFlags, ProcessOptions};
use crate::error::{Error, Result};
use crate::queue::{check_chunk_size, check_flash_range, CommandQueue, DEFAULT_TIMEOUT};

/// Default time to wait for a device to re-enumerate
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// One step of a flash workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashStep {
    /// Reboot the firmware into the bootloader
    Reset,
    /// Wait for the bootloader to enumerate
    WaitForBootloader,
    /// Erase the target region
    Erase,
    /// Write the image
    Write,
    /// Read the image back and compare
    Verify,
    /// Start the new firmware
    Boot,
    /// Wait for the firmware to enumerate
    WaitForFirmware,
    /// Record that the upgrade worked
    Confirm,
}

impl fmt::Display for FlashStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlashStep::Reset => "reset",
            FlashStep::WaitForBootloader => "waiting for bootloader",
            FlashStep::Erase => "erase",
            FlashStep::Write => "write",
            FlashStep::Verify => "verify",
            FlashStep::Boot => "boot",
            FlashStep::WaitForFirmware => "waiting for firmware",
            FlashStep::Confirm => "confirm",
        };
        f.write_str(name)
    }
}

/// Notification emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashEvent {
    /// A step is starting
    Step(FlashStep),
    /// Progress of the current step's batch
    Progress(u8),
}

/// Runs erase/write/verify and firmware upgrade workflows
#[derive(Debug, Clone)]
pub struct FlashOrchestrator {
    timeout: Duration,
    chunk_size: usize,
    reconnect_timeout: Duration,
    runcode_address: u16,
    cancel: CancellationToken,
    events: Option<UnboundedSender<FlashEvent>>,
}

impl Default for FlashOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashOrchestrator {
    /// Create an orchestrator with default settings
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            chunk_size: FLASH_TRANSFER_BLOCK_SIZE,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            runcode_address: RUNCODE_ADDRESS,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Create an orchestrator from the `[flash]` configuration section
    pub fn from_config(config: &FlashConfig, timeout: Duration) -> Result<Self> {
        check_chunk_size(config.chunk_size)?;
        Ok(Self {
            timeout,
            chunk_size: config.chunk_size,
            reconnect_timeout: config.reconnect_timeout(),
            runcode_address: config.runcode_address,
            ..Self::new()
        })
    }

    /// Set the number of bytes per WRITE_FLASH command
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        check_chunk_size(chunk_size)?;
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Set the per-transfer timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long to wait for the device to re-enumerate
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Cancel the running batch, and the workflow, when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send step and progress events to `events`
    pub fn with_events(mut self, events: UnboundedSender<FlashEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Erase, write and verify `data` at `addr`
    pub async fn write_firmware(&self, device: &DeviceRef, addr: u16, data: &[u8]) -> Result<()> {
        check_flash_range(addr, data.len())?;
        // Erase length is a u16
        let len = u16::try_from(data.len()).map_err(|_| {
            rcolorhug_core::Error::InvalidParameter(format!(
                "image of {} bytes is too large",
                data.len()
            ))
        })?;

        log::info!(
            "Writing {} bytes at 0x{:04x} to {}",
            data.len(),
            addr,
            device.id()
        );
        self.batch(FlashStep::Erase, |q| q.erase_flash(device, addr, len))
            .await?;
        self.batch(FlashStep::Write, |q| {
            q.write_flash(device, addr, data, self.chunk_size)
        })
        .await?;
        self.batch(FlashStep::Verify, |q| q.verify_flash(device, addr, data))
            .await?;
        Ok(())
    }

    /// Install a new firmware image
    ///
    /// Returns the handle of the device running the new firmware; the one
    /// passed in is stale once the device has re-enumerated.
    pub async fn upgrade(
        &self,
        device: DeviceRef,
        image: &[u8],
        reconnect: &dyn Reconnect,
    ) -> Result<DeviceRef> {
        check_flash_range(self.runcode_address, image.len())?;

        let id = device.id().clone();
        let mut device = device;
        if device.mode() == DeviceMode::Firmware {
            log::info!("Resetting {} into the bootloader", id);
            self.batch(FlashStep::Reset, |q| {
                q.reset(&device);
                Ok(())
            })
            .await?;
            device = self
                .wait(FlashStep::WaitForBootloader, reconnect, &id, DeviceMode::Bootloader)
                .await?;
        }

        self.write_firmware(&device, self.runcode_address, image)
            .await?;

        log::info!("Booting new firmware on {}", id);
        self.batch(FlashStep::Boot, |q| {
            q.boot_flash(&device);
            Ok(())
        })
        .await?;
        let device = self
            .wait(FlashStep::WaitForFirmware, reconnect, &id, DeviceMode::Firmware)
            .await?;

        self.batch(FlashStep::Confirm, |q| {
            q.set_flash_success(&device, true);
            Ok(())
        })
        .await?;
        log::info!("Upgrade of {} complete", id);
        Ok(device)
    }

    async fn wait(
        &self,
        step: FlashStep,
        reconnect: &dyn Reconnect,
        id: &DeviceId,
        mode: DeviceMode,
    ) -> Result<DeviceRef> {
        self.emit(FlashEvent::Step(step));
        let wait = reconnect.wait_for(id, mode, self.reconnect_timeout);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Flash {
                step,
                source: Box::new(Error::Cancelled { failures: Vec::new() }),
            }),
            result = wait => result.map_err(|e| Error::Flash {
                step,
                source: Box::new(Error::Command(e)),
            }),
        }
    }

    /// Build one batch with `build` and run it to completion
    async fn batch<F>(&self, step: FlashStep, build: F) -> Result<()>
    where
        F: FnOnce(&mut CommandQueue<'static>) -> Result<()>,
    {
        log::debug!("Flash step: {}", step);
        self.emit(FlashEvent::Step(step));

        let mut queue = CommandQueue::new().with_timeout(self.timeout);
        build(&mut queue)?;

        let options = ProcessOptions::new(ProcessFlags::empty()).with_cancel(self.cancel.clone());
        let result = match &self.events {
            None => queue.process_with(options).await,
            Some(events) => {
                let (tx, mut rx) = mpsc::unbounded_channel();
                let forward = async {
                    while let Some(event) = rx.recv().await {
                        if let ProcessEvent::Progress(percent) = event {
                            let _ = events.send(FlashEvent::Progress(percent));
                        }
                    }
                };
                let (result, ()) = tokio::join!(queue.process_with(options.with_events(tx)), forward);
                result
            }
        };

        result.map_err(|e| Error::Flash {
            step,
            source: Box::new(e),
        })
    }

    fn emit(&self, event: FlashEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rcolorhug_core::protocol::{opcodes, DeviceStatus};
    use rcolorhug_dummy::{DummyBus, DummyConfig, DummyDevice, Fault, FaultKind};

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn setup(mode: DeviceMode) -> (Arc<DummyDevice>, DeviceRef, DummyBus) {
        let device = Arc::new(DummyDevice::new(DummyConfig {
            mode,
            ..Default::default()
        }));
        let mut bus = DummyBus::new();
        bus.add(device.clone());
        let handle: DeviceRef = device.clone();
        (device, handle, bus)
    }

    fn steps(rx: &mut mpsc::UnboundedReceiver<FlashEvent>) -> Vec<FlashStep> {
        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let FlashEvent::Step(step) = event {
                steps.push(step);
            }
        }
        steps
    }

    #[tokio::test]
    async fn test_write_firmware() {
        let (device, handle, _) = setup(DeviceMode::Bootloader);
        device.load_flash(0x4000, &[0u8; 256]);
        let data = image(200);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let flasher = FlashOrchestrator::new().with_events(tx);
        flasher.write_firmware(&handle, 0x4000, &data).await.unwrap();

        assert_eq!(device.flash(0x4000, 200), data);
        assert_eq!(device.flash(0x4000 + 200, 56), [0u8; 56]);
        assert_eq!(
            steps(&mut rx),
            [FlashStep::Erase, FlashStep::Write, FlashStep::Verify]
        );

        let opcodes_sent = device.sent_opcodes();
        assert_eq!(opcodes_sent[0], opcodes::ERASE_FLASH);
        // 200 bytes: 7 writes of 32, then 4 verify reads of 60
        assert_eq!(
            opcodes_sent
                .iter()
                .filter(|&&op| op == opcodes::WRITE_FLASH)
                .count(),
            7
        );
        assert_eq!(
            opcodes_sent
                .iter()
                .filter(|&&op| op == opcodes::READ_FLASH)
                .count(),
            4
        );
    }

    #[tokio::test]
    async fn test_write_firmware_progress_events() {
        let (_, handle, _) = setup(DeviceMode::Bootloader);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let flasher = FlashOrchestrator::new()
            .with_chunk_size(59)
            .unwrap()
            .with_events(tx);
        flasher
            .write_firmware(&handle, 0x4000, &image(118))
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let write = events
            .iter()
            .position(|e| *e == FlashEvent::Step(FlashStep::Write))
            .unwrap();
        assert_eq!(
            &events[write..write + 4],
            [
                FlashEvent::Step(FlashStep::Write),
                FlashEvent::Progress(0),
                FlashEvent::Progress(50),
                FlashEvent::Progress(100),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_firmware_validation() {
        let (device, handle, _) = setup(DeviceMode::Bootloader);
        let flasher = FlashOrchestrator::new();

        assert!(matches!(
            flasher.write_firmware(&handle, 0x4000, &[]).await,
            Err(Error::Command(_))
        ));
        assert!(matches!(
            flasher.write_firmware(&handle, 0xf000, &image(0x1001)).await,
            Err(Error::Command(_))
        ));
        assert!(FlashOrchestrator::new().with_chunk_size(0).is_err());
        assert!(FlashOrchestrator::new().with_chunk_size(60).is_err());
        assert!(device.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_write_firmware_stops_at_failed_step() {
        let (device, handle, _) = setup(DeviceMode::Bootloader);
        device.inject(Fault::new(opcodes::READ_FLASH, 1, FaultKind::CorruptChecksum));

        let err = FlashOrchestrator::new()
            .write_firmware(&handle, 0x4000, &image(64))
            .await
            .unwrap_err();
        match err {
            Error::Flash { step, source } => {
                assert_eq!(step, FlashStep::Verify);
                assert!(matches!(*source, Error::Batch { .. }));
            }
            other => panic!("expected flash error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_in_firmware_mode_fails_at_erase() {
        let (device, handle, _) = setup(DeviceMode::Firmware);
        let err = FlashOrchestrator::new()
            .write_firmware(&handle, 0x4000, &image(64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Flash {
                step: FlashStep::Erase,
                ..
            }
        ));
        assert_eq!(err.failures().len(), 1);
        assert_eq!(device.sent_opcodes(), [opcodes::ERASE_FLASH]);
    }

    #[tokio::test]
    async fn test_upgrade_from_firmware() {
        let (device, handle, bus) = setup(DeviceMode::Firmware);
        let firmware = image(300);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let flasher = FlashOrchestrator::new().with_events(tx);
        let upgraded = flasher.upgrade(handle, &firmware, &bus).await.unwrap();

        assert_eq!(upgraded.mode(), DeviceMode::Firmware);
        assert_eq!(device.flash(RUNCODE_ADDRESS, 300), firmware);
        assert_eq!(device.flash_success(), Some(true));
        assert_eq!(
            steps(&mut rx),
            [
                FlashStep::Reset,
                FlashStep::WaitForBootloader,
                FlashStep::Erase,
                FlashStep::Write,
                FlashStep::Verify,
                FlashStep::Boot,
                FlashStep::WaitForFirmware,
                FlashStep::Confirm,
            ]
        );

        let sent = device.sent_opcodes();
        assert_eq!(sent.first(), Some(&opcodes::RESET));
        assert_eq!(sent[1], opcodes::ERASE_FLASH);
        assert_eq!(
            &sent[sent.len() - 2..],
            [opcodes::BOOT_FLASH, opcodes::SET_FLASH_SUCCESS]
        );
    }

    #[tokio::test]
    async fn test_upgrade_from_bootloader_skips_reset() {
        let (device, handle, bus) = setup(DeviceMode::Bootloader);
        FlashOrchestrator::new()
            .upgrade(handle, &image(40), &bus)
            .await
            .unwrap();
        let sent = device.sent_opcodes();
        assert_eq!(sent[0], opcodes::ERASE_FLASH);
        assert!(!sent.contains(&opcodes::RESET));
        assert_eq!(device.flash_success(), Some(true));
    }

    #[tokio::test]
    async fn test_upgrade_boot_failure() {
        let (device, handle, bus) = setup(DeviceMode::Bootloader);
        device.inject(Fault::new(
            opcodes::BOOT_FLASH,
            1,
            FaultKind::Status(DeviceStatus::InvalidChecksum),
        ));
        let Err(err) = FlashOrchestrator::new()
            .upgrade(handle, &image(40), &bus)
            .await
        else {
            panic!("upgrade should fail at boot");
        };
        assert!(matches!(
            err,
            Error::Flash {
                step: FlashStep::Boot,
                ..
            }
        ));
        assert_eq!(device.flash_success(), None);
        assert_eq!(device.sent_opcodes().last(), Some(&opcodes::BOOT_FLASH));
    }

    #[tokio::test]
    async fn test_upgrade_device_never_returns() {
        let (_, handle, _) = setup(DeviceMode::Firmware);
        let empty_bus = DummyBus::new();
        let Err(err) = FlashOrchestrator::new()
            .with_reconnect_timeout(Duration::from_millis(20))
            .upgrade(handle, &image(40), &empty_bus)
            .await
        else {
            panic!("upgrade should time out waiting for the bootloader");
        };
        match err {
            Error::Flash { step, source } => {
                assert_eq!(step, FlashStep::WaitForBootloader);
                assert!(matches!(
                    *source,
                    Error::Command(rcolorhug_core::Error::Timeout)
                ));
            }
            other => panic!("expected flash error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upgrade_rejects_oversized_image() {
        let (device, handle, bus) = setup(DeviceMode::Firmware);
        let result = FlashOrchestrator::new()
            .upgrade(handle, &image(0xc001), &bus)
            .await;
        assert!(matches!(result, Err(Error::Command(_))));
        assert!(device.transfers().is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = FlashConfig {
            chunk_size: 48,
            reconnect_timeout_ms: 100,
            runcode_address: 0x6000,
        };
        let flasher = FlashOrchestrator::from_config(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(flasher.chunk_size, 48);
        assert_eq!(flasher.runcode_address, 0x6000);
        assert_eq!(flasher.reconnect_timeout, Duration::from_millis(100));

        let bad = FlashConfig {
            chunk_size: 64,
            ..FlashConfig::default()
        };
        assert!(FlashOrchestrator::from_config(&bad, Duration::from_secs(1)).is_err());
    }
}
