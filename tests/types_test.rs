//! Tests for core types
//!
//! Descriptor formatting, event wire shape, and control value handling.

use proptest::prelude::*;
use uvcbridge::types::{
    BridgeEvent, BridgeEventKind, CameraControl, ControlValues, Platform, SessionPhase,
    UsbDeviceInfo,
};

#[cfg(test)]
mod platform_tests {
    use super::*;

    #[test]
    fn test_platform_current_detection() {
        assert_ne!(Platform::current(), Platform::Unknown, "Platform should be detected");
    }

    #[test]
    fn test_platform_as_str() {
        assert_eq!(Platform::Windows.as_str(), "windows");
        assert_eq!(Platform::Linux.as_str(), "linux");
        assert_eq!(Platform::Unknown.as_str(), "unknown");
    }
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    #[test]
    fn test_descriptor_format() {
        let device = UsbDeviceInfo::new("/dev/bus/usb/001/002", 1234, 5678);
        assert_eq!(device.descriptor(), "/dev/bus/usb/001/002 (VID:1234 PID:5678)");
    }

    #[test]
    fn test_descriptor_uses_decimal_ids() {
        let device = UsbDeviceInfo::new("cam", 0x0bda, 0xffff);
        assert_eq!(device.descriptor(), "cam (VID:3034 PID:65535)");
    }

    proptest! {
        #[test]
        fn prop_descriptor_shape(
            name in "[a-zA-Z0-9/_ .-]{0,40}",
            vendor_id in any::<u16>(),
            product_id in any::<u16>(),
        ) {
            let descriptor = UsbDeviceInfo::new(name.clone(), vendor_id, product_id).descriptor();
            let expected_suffix = format!(" (VID:{} PID:{})", vendor_id, product_id);
            prop_assert!(descriptor.starts_with(&name));
            prop_assert!(descriptor.ends_with(&expected_suffix));
            prop_assert_eq!(descriptor.len(), name.len() + expected_suffix.len());
        }
    }
}

#[cfg(test)]
mod event_tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_and_flat() {
        let event = BridgeEvent::new(
            "session-1",
            BridgeEventKind::DeviceError {
                camera_id: "0".to_string(),
                code: 4,
            },
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "device_error");
        assert_eq!(json["session_id"], "session-1");
        assert_eq!(json["camera_id"], "0");
        assert_eq!(json["code"], 4);
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn test_closed_event_round_trip() {
        let event = BridgeEvent::new("s", BridgeEventKind::Closed);
        let json = serde_json::to_string(&event).unwrap();
        let back: BridgeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_session_phase_names() {
        assert_eq!(serde_json::to_value(SessionPhase::Streaming).unwrap(), "streaming");
        assert_eq!(SessionPhase::Failed.as_str(), "failed");
    }
}

#[cfg(test)]
mod control_tests {
    use super::*;

    #[test]
    fn test_control_values_default_neutral() {
        let controls = ControlValues::default();
        assert_eq!(controls.get(CameraControl::Brightness), 0.0);
        assert_eq!(controls.get(CameraControl::Contrast), 0.0);
    }

    #[test]
    fn test_control_values_set_independent() {
        let mut controls = ControlValues::default();
        controls.set(CameraControl::Contrast, 0.75);
        assert_eq!(controls.get(CameraControl::Contrast), 0.75);
        assert_eq!(controls.get(CameraControl::Brightness), 0.0);
    }
}
