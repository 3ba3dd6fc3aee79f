//! USB peripheral listing through libusb

use crate::errors::CameraError;
use crate::platform::UsbManager;
use crate::types::UsbDeviceInfo;
use rusb::UsbContext;

/// Lists attached USB devices with `rusb`
pub struct RusbUsbManager {
    context: Option<rusb::Context>,
}

impl RusbUsbManager {
    pub fn new() -> Self {
        let context = match rusb::Context::new() {
            Ok(context) => Some(context),
            Err(e) => {
                log::warn!("Failed to create libusb context: {}", e);
                None
            }
        };
        Self { context }
    }
}

impl Default for RusbUsbManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Device node path the way Linux and Android name USB devices
pub fn usb_device_name(bus_number: u8, address: u8) -> String {
    format!("/dev/bus/usb/{:03}/{:03}", bus_number, address)
}

impl UsbManager for RusbUsbManager {
    fn device_list(&self) -> Result<Vec<UsbDeviceInfo>, CameraError> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| CameraError::UsbError("libusb is not available".to_string()))?;

        let devices = context
            .devices()
            .map_err(|e| CameraError::UsbError(format!("Failed to list USB devices: {}", e)))?;

        let mut list = Vec::new();
        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    log::debug!(
                        "Skipping USB device {}:{}: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            list.push(UsbDeviceInfo::new(
                usb_device_name(device.bus_number(), device.address()),
                descriptor.vendor_id(),
                descriptor.product_id(),
            ));
        }

        log::debug!("Found {} USB devices", list.len());
        Ok(list)
    }
}
