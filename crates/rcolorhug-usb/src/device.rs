//! ColorHug device over nusb

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use nusb::transfer::{Buffer, In, Interrupt, Out};
use nusb::Endpoint;
use rcolorhug_core::protocol::{Frame, FRAME_SIZE};
use rcolorhug_core::{Device, DeviceId, DeviceMode, DeviceRef, Reconnect};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, UsbError};
use crate::protocol::*;

/// A connected ColorHug found during enumeration
#[derive(Debug, Clone)]
pub struct UsbDeviceInfo {
    /// Bus and port path
    pub id: DeviceId,
    /// Hardware generation
    pub model: Model,
    /// Image the device is running
    pub mode: DeviceMode,
    /// USB serial number string, if the device reports one
    pub serial: Option<String>,
    info: nusb::DeviceInfo,
}

impl fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} ({})", self.model, self.id, self.mode)?;
        if let Some(serial) = &self.serial {
            write!(f, " serial {}", serial)?;
        }
        Ok(())
    }
}

/// List all connected ColorHug devices, in either mode
pub async fn list_devices() -> Result<Vec<UsbDeviceInfo>> {
    let devices = nusb::list_devices()
        .await
        .map_err(|e| UsbError::EnumerationFailed(e.to_string()))?
        .filter_map(|d| {
            let (model, mode) = identify(d.vendor_id(), d.product_id())?;
            Some(UsbDeviceInfo {
                id: DeviceId::new(location_id(d.bus_id(), d.port_chain())),
                model,
                mode,
                serial: d.serial_number().map(str::to_string),
                info: d,
            })
        })
        .collect();
    Ok(devices)
}

struct Endpoints {
    out_ep: Endpoint<Interrupt, Out>,
    in_ep: Endpoint<Interrupt, In>,
}

impl Endpoints {
    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>> {
        self.in_ep.submit(Buffer::new(FRAME_SIZE));
        self.out_ep.submit(Buffer::from(request.to_vec()));

        let sent = self.out_ep.next_complete().await;
        sent.status?;
        if sent.actual_len != FRAME_SIZE {
            return Err(UsbError::TransferFailed(format!(
                "short write: {} of {} bytes",
                sent.actual_len, FRAME_SIZE
            )));
        }

        let received = self.in_ep.next_complete().await;
        received.status?;
        let len = received.actual_len.min(received.buffer.len());
        Ok(received.buffer[..len].to_vec())
    }

    /// Transfers still owned by the endpoints, e.g. after a cancelled exchange
    fn pending(&self) -> usize {
        self.out_ep.pending() + self.in_ep.pending()
    }

    /// Cancel whatever is still queued and wait for it to retire
    async fn drain(&mut self) {
        self.out_ep.cancel_all();
        self.in_ep.cancel_all();
        while self.out_ep.pending() > 0 {
            self.out_ep.next_complete().await;
        }
        while self.in_ep.pending() > 0 {
            self.in_ep.next_complete().await;
        }
    }
}

/// An open ColorHug
///
/// Implements [`Device`]; hand it to the queue as a [`DeviceRef`].
pub struct UsbDevice {
    id: DeviceId,
    model: Model,
    mode: DeviceMode,
    endpoints: Mutex<Endpoints>,
    _interface: nusb::Interface,
}

impl UsbDevice {
    /// Open an enumerated device and claim its HID interface
    pub async fn open(info: &UsbDeviceInfo) -> Result<Self> {
        log::info!("Opening {} at {} in {} mode", info.model, info.id, info.mode);

        let device = info
            .info
            .open()
            .await
            .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
        // The HID class driver usually owns the interface
        let interface = device
            .detach_and_claim_interface(INTERFACE)
            .await
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        let out_ep = interface
            .endpoint::<Interrupt, Out>(EP_OUT)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
        let in_ep = interface
            .endpoint::<Interrupt, In>(EP_IN)
            .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;

        Ok(Self {
            id: info.id.clone(),
            model: info.model,
            mode: info.mode,
            endpoints: Mutex::new(Endpoints { out_ep, in_ep }),
            _interface: interface,
        })
    }

    /// Open the first ColorHug found
    pub async fn open_first() -> Result<Self> {
        let devices = list_devices().await?;
        let info = devices.first().ok_or(UsbError::DeviceNotFound)?;
        if devices.len() > 1 {
            log::warn!(
                "{} ColorHug devices connected, using {}",
                devices.len(),
                info.id
            );
        }
        Self::open(info).await
    }

    /// Open the device at the given bus and port path
    pub async fn open_id(id: &DeviceId) -> Result<Self> {
        let devices = list_devices().await?;
        let info = devices
            .iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| UsbError::NoSuchDevice(id.to_string()))?;
        Self::open(info).await
    }

    /// Hardware generation
    pub fn model(&self) -> Model {
        self.model
    }
}

#[async_trait]
impl Device for UsbDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn mode(&self) -> DeviceMode {
        self.mode
    }

    async fn transfer(&self, request: &Frame, timeout: Duration) -> rcolorhug_core::Result<Vec<u8>> {
        let mut endpoints = self.endpoints.lock().await;
        if endpoints.pending() > 0 {
            log::debug!("{}: draining transfers left by a dropped exchange", self.id);
            endpoints.drain().await;
        }
        log::trace!("{} <- {:02x?}", self.id, &request[..]);

        let result = match tokio::time::timeout(timeout, endpoints.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(UsbError::Timeout),
        };
        if result.is_err() {
            endpoints.drain().await;
        }

        let response = result?;
        log::trace!("{} -> {:02x?}", self.id, response);
        Ok(response)
    }
}

/// Finds a device again after it re-enumerates
///
/// Polls enumeration until a device with the same bus and port path shows up
/// in the requested mode, then opens it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbReconnect;

#[async_trait]
impl Reconnect for UsbReconnect {
    async fn wait_for(
        &self,
        id: &DeviceId,
        mode: DeviceMode,
        timeout: Duration,
    ) -> rcolorhug_core::Result<DeviceRef> {
        let deadline = Instant::now() + timeout;
        log::debug!("Waiting up to {:?} for {} in {} mode", timeout, id, mode);

        loop {
            let found = list_devices()
                .await?
                .into_iter()
                .find(|d| &d.id == id && d.mode == mode);
            if let Some(info) = found {
                // udev may not have applied permissions yet
                match UsbDevice::open(&info).await {
                    Ok(device) => return Ok(std::sync::Arc::new(device)),
                    Err(e) => log::debug!("{} not ready yet: {}", id, e),
                }
            }

            if Instant::now() >= deadline {
                return Err(rcolorhug_core::Error::Timeout);
            }
            tokio::time::sleep(Duration::from_millis(RECONNECT_POLL_MS)).await;
        }
    }
}
