//! Synthetic frames for exercising the preview path without hardware

use image::RgbImage;

/// An RGB gradient that shifts with `frame_number`, so consecutive frames differ
pub fn synthetic_rgb_frame(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

/// A USB inventory resembling a phone with a UVC thermal camera attached
pub fn sample_usb_inventory() -> Vec<crate::types::UsbDeviceInfo> {
    vec![
        crate::types::UsbDeviceInfo::new("/dev/bus/usb/001/002", 1234, 5678),
        crate::types::UsbDeviceInfo::new("/dev/bus/usb/001/003", 3034, 22136),
    ]
}
