//! Session lifecycle tests for the camera bridge, run against the mock platform

use std::time::Duration;
use tokio::sync::broadcast;
use uvcbridge::config::BridgeConfig;
use uvcbridge::testing::{sample_usb_inventory, MockPlatform, OpenBehavior};
use uvcbridge::types::{
    AfMode, BridgeEvent, BridgeEventKind, CameraControl, CaptureTemplate, PreviewOptions,
    SessionPhase, UsbDeviceInfo, PREVIEW_HEIGHT, PREVIEW_WIDTH,
};
use uvcbridge::{CameraBridge, CameraError};

fn bridge_with(platform: &MockPlatform) -> CameraBridge {
    CameraBridge::new(platform.backend(), BridgeConfig::default())
}

fn bridge_with_timeout(platform: &MockPlatform, timeout_ms: u64) -> CameraBridge {
    let mut config = BridgeConfig::default();
    config.preview.open_timeout_ms = timeout_ms;
    CameraBridge::new(platform.backend(), config)
}

async fn wait_for_event<F>(events: &mut broadcast::Receiver<BridgeEvent>, matches: F) -> BridgeEvent
where
    F: Fn(&BridgeEventKind) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event.kind) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel error: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for bridge event")
}

async fn wait_for_phase(bridge: &CameraBridge, phase: SessionPhase) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while bridge.phase() != phase {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for session phase");
}

#[cfg(test)]
mod enumerate_tests {
    use super::*;

    #[test]
    fn test_one_descriptor_per_usb_device() {
        let platform = MockPlatform::new();
        platform.set_usb_devices(sample_usb_inventory());
        let bridge = bridge_with(&platform);

        assert_eq!(
            bridge.enumerate_devices(),
            vec![
                "/dev/bus/usb/001/002 (VID:1234 PID:5678)".to_string(),
                "/dev/bus/usb/001/003 (VID:3034 PID:22136)".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_usb_devices_is_empty() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        assert!(bridge.enumerate_devices().is_empty());
    }

    #[test]
    fn test_usb_failure_is_swallowed() {
        let platform = MockPlatform::new();
        platform.set_usb_error(CameraError::UsbError("libusb unavailable".to_string()));
        let bridge = bridge_with(&platform);
        assert!(bridge.enumerate_devices().is_empty());
    }

    #[test]
    fn test_enumeration_has_no_session_side_effects() {
        let platform = MockPlatform::new();
        platform.set_usb_devices(vec![UsbDeviceInfo::new("/dev/bus/usb/002/007", 1, 2)]);
        let bridge = bridge_with(&platform);

        bridge.enumerate_devices();

        assert!(platform.open_calls().is_empty());
        assert!(platform.surfaces_created().is_empty());
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }
}

#[cfg(test)]
mod start_preview_tests {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_with_camera_zero() {
        let platform = MockPlatform::with_cameras(&["0"]);
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        let surface_id = bridge
            .start_preview(PreviewOptions::default())
            .await
            .expect("preview should start");

        assert_eq!(platform.open_calls(), vec!["0".to_string()]);
        assert_eq!(
            platform.surfaces_created(),
            vec![(surface_id, PREVIEW_WIDTH, PREVIEW_HEIGHT)]
        );

        let committed = platform.committed_requests();
        assert_eq!(committed.len(), 1);
        let request = &committed[0].request;
        assert_eq!(request.template, CaptureTemplate::Preview);
        assert_eq!(request.af_mode, AfMode::ContinuousPicture);
        assert_eq!(request.targets.len(), 1);
        assert_eq!(request.targets[0].texture_id, surface_id);
        assert_eq!(committed[0].thread_name.as_deref(), Some("CameraBackground"));

        assert_eq!(bridge.phase(), SessionPhase::Streaming);
        assert_eq!(bridge.current_surface_id(), Some(surface_id));

        let event = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Streaming { .. })).await;
        assert_eq!(
            event.kind,
            BridgeEventKind::Streaming {
                surface_id,
                camera_id: "0".to_string()
            }
        );

        bridge.close_device();
    }

    #[tokio::test]
    async fn test_second_start_tears_down_first() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        let first = bridge.start_preview(PreviewOptions::default()).await.unwrap();
        let second = bridge.start_preview(PreviewOptions::default()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(platform.open_calls().len(), 2);
        assert_eq!(platform.surfaces_created().len(), 2);
        assert_eq!(platform.live_surfaces(), vec![second]);
        assert_eq!(platform.live_devices().len(), 1);
        assert_eq!(platform.live_sessions(), 1);
        assert_eq!(bridge.live_background_contexts(), 1);
        assert_eq!(bridge.current_surface_id(), Some(second));

        bridge.close_device();
        assert_eq!(bridge.live_background_contexts(), 0);
        assert!(platform.live_surfaces().is_empty());
        assert!(platform.live_devices().is_empty());
    }

    #[tokio::test]
    async fn test_no_camera_allocates_nothing() {
        let platform = MockPlatform::with_cameras(&[]);
        let bridge = bridge_with(&platform);

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert_eq!(result, Err(CameraError::NoCameraAvailable));
        assert!(platform.open_calls().is_empty());
        assert!(platform.surfaces_created().is_empty());
        assert!(platform.live_devices().is_empty());
        assert_eq!(platform.live_sessions(), 0);
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_camera_id_query_failure_is_access_error() {
        let platform = MockPlatform::new();
        platform.set_camera_list_error(CameraError::AccessFailed("service down".to_string()));
        let bridge = bridge_with(&platform);

        let result = bridge.start_preview(PreviewOptions::default()).await;
        assert!(matches!(result, Err(CameraError::AccessFailed(_))));
        assert!(platform.surfaces_created().is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_leaves_no_partial_state() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Deny);
        let bridge = bridge_with(&platform);

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert!(matches!(result, Err(CameraError::PermissionDenied(_))));
        assert_eq!(platform.surfaces_created().len(), 1);
        assert!(platform.live_surfaces().is_empty());
        assert!(platform.live_devices().is_empty());
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_camera_in_use_is_access_error() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::AccessFail);
        let bridge = bridge_with(&platform);

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert_eq!(result.map_err(|e| e.code()), Err("CAMERA_ACCESS"));
        assert!(platform.live_surfaces().is_empty());
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_surface_failure_stops_before_open() {
        let platform = MockPlatform::new();
        platform.set_fail_surface(true);
        let bridge = bridge_with(&platform);

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert!(matches!(result, Err(CameraError::SurfaceError(_))));
        assert!(platform.open_calls().is_empty());
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_index_option_selects_camera() {
        let platform = MockPlatform::with_cameras(&["0", "1", "2"]);
        let bridge = bridge_with(&platform);

        bridge.start_preview(PreviewOptions::with_index(1)).await.unwrap();
        assert_eq!(platform.open_calls(), vec!["1".to_string()]);
        assert_eq!(bridge.current_camera_id().as_deref(), Some("1"));

        let out_of_range = bridge.start_preview(PreviewOptions::with_index(5)).await;
        assert_eq!(out_of_range, Err(CameraError::NoCameraAvailable));
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_slow_open_within_timeout_succeeds() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::SucceedAfter(Duration::from_millis(30)));
        let bridge = bridge_with_timeout(&platform, 1000);

        assert!(bridge.start_preview(PreviewOptions::default()).await.is_ok());
        bridge.close_device();
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_that_never_resolves_times_out() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Never);
        let bridge = bridge_with_timeout(&platform, 100);
        let mut events = bridge.subscribe();

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert_eq!(result, Err(CameraError::OpenTimeout(100)));
        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(platform.live_surfaces().is_empty());

        let event = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::OpenTimeout { .. })).await;
        assert_eq!(
            event.kind,
            BridgeEventKind::OpenTimeout {
                camera_id: "0".to_string(),
                timeout_ms: 100
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_start_is_busy() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Never);
        let bridge = bridge_with_timeout(&platform, 5000);

        let pending = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.start_preview(PreviewOptions::default()).await })
        };
        wait_for_phase(&bridge, SessionPhase::Opening).await;

        let second = bridge.start_preview(PreviewOptions::default()).await;
        assert_eq!(second, Err(CameraError::SessionBusy));
        assert_eq!(platform.open_calls().len(), 1);

        bridge.close_device();
        assert_eq!(pending.await.unwrap(), Err(CameraError::PreviewCancelled));
    }

    #[tokio::test]
    async fn test_close_during_camera_selection_cancels_start() {
        let platform = MockPlatform::new();
        platform.set_camera_list_delay(Duration::from_millis(200));
        let bridge = bridge_with(&platform);

        let pending = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.start_preview(PreviewOptions::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bridge.phase(), SessionPhase::Idle);

        bridge.close_device();
        assert_eq!(pending.await.unwrap(), Err(CameraError::PreviewCancelled));

        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(platform.open_calls().is_empty());
        assert!(platform.live_surfaces().is_empty());
        assert!(platform.live_devices().is_empty());
        assert_eq!(bridge.live_background_contexts(), 0);
    }

    #[tokio::test]
    async fn test_close_before_start_does_not_cancel_it() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        bridge.close_device();
        assert!(bridge.start_preview(PreviewOptions::default()).await.is_ok());
        assert_eq!(bridge.phase(), SessionPhase::Streaming);

        bridge.close_device();
    }

    #[tokio::test]
    async fn test_joined_starts_yield_one_session() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        let (first, second) = futures::future::join(
            bridge.start_preview(PreviewOptions::default()),
            bridge.start_preview(PreviewOptions::default()),
        )
        .await;

        assert!(first.is_ok());
        assert_eq!(second, Err(CameraError::SessionBusy));
        assert_eq!(platform.open_calls().len(), 1);
        assert_eq!(platform.live_devices().len(), 1);

        bridge.close_device();
    }

    #[tokio::test]
    async fn test_disconnect_while_opening_fails_call() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Disconnect);
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert_eq!(result, Err(CameraError::Disconnected));
        wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Disconnected { .. })).await;
        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(platform.live_surfaces().is_empty());
    }

    #[tokio::test]
    async fn test_device_error_while_opening_fails_call() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::FailWith(3));
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        let result = bridge.start_preview(PreviewOptions::default()).await;

        assert_eq!(result, Err(CameraError::DeviceError(3)));
        let event = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::DeviceError { .. })).await;
        assert_eq!(
            event.kind,
            BridgeEventKind::DeviceError {
                camera_id: "0".to_string(),
                code: 3
            }
        );
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_after_streaming_returns_to_idle() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        assert!(platform.fire_disconnected());

        let event = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Disconnected { .. })).await;
        assert_eq!(
            event.kind,
            BridgeEventKind::Disconnected {
                camera_id: "0".to_string()
            }
        );
        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(platform.live_devices().is_empty());
        assert!(platform.live_surfaces().is_empty());
        assert_eq!(platform.live_sessions(), 0);
    }

    #[tokio::test]
    async fn test_late_open_after_close_is_discarded() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Never);
        let bridge = bridge_with_timeout(&platform, 5000);

        let pending = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.start_preview(PreviewOptions::default()).await })
        };
        wait_for_phase(&bridge, SessionPhase::Opening).await;
        bridge.close_device();
        assert_eq!(pending.await.unwrap(), Err(CameraError::PreviewCancelled));

        assert!(platform.fire_opened());

        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(platform.live_devices().is_empty());
        assert!(platform.committed_requests().is_empty());
    }

    #[tokio::test]
    async fn test_late_open_for_superseded_session_keeps_current() {
        let platform = MockPlatform::new();
        platform.set_open_behavior(OpenBehavior::Never);
        let bridge = bridge_with_timeout(&platform, 50);

        let timed_out = bridge.start_preview(PreviewOptions::default()).await;
        assert_eq!(timed_out, Err(CameraError::OpenTimeout(50)));

        platform.set_open_behavior(OpenBehavior::Succeed);
        let surface_id = bridge.start_preview(PreviewOptions::default()).await.unwrap();

        assert!(platform.fire_opened_at(0));

        assert_eq!(bridge.phase(), SessionPhase::Streaming);
        assert_eq!(bridge.current_surface_id(), Some(surface_id));
        assert_eq!(platform.live_devices().len(), 1);

        bridge.close_device();
        assert!(platform.live_devices().is_empty());
    }

    #[tokio::test]
    async fn test_configure_failure_still_returns_surface() {
        let platform = MockPlatform::new();
        platform.set_fail_configure(true);
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        let surface_id = bridge.start_preview(PreviewOptions::default()).await.unwrap();

        assert_eq!(bridge.current_surface_id(), Some(surface_id));
        assert_eq!(bridge.phase(), SessionPhase::Failed);
        assert_eq!(platform.live_sessions(), 0);
        wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::ConfigureFailed { .. })).await;

        bridge.close_device();
        assert!(platform.live_devices().is_empty());
        assert!(platform.live_surfaces().is_empty());
    }
}

#[cfg(test)]
mod close_tests {
    use super::*;

    #[test]
    fn test_close_without_session_is_noop() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        bridge.close_device();
        bridge.close_device();

        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_close_releases_everything_and_emits_closed() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        let mut events = bridge.subscribe();
        bridge.close_device();

        assert_eq!(bridge.phase(), SessionPhase::Idle);
        assert_eq!(bridge.current_surface_id(), None);
        assert!(platform.live_devices().is_empty());
        assert!(platform.live_surfaces().is_empty());
        assert_eq!(platform.live_sessions(), 0);

        let event = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Closed)).await;
        assert!(!event.session_id.is_empty());

        bridge.close_device();
        assert_eq!(bridge.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_events_share_session_id() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        let mut events = bridge.subscribe();

        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        bridge.close_device();

        let streaming = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Streaming { .. })).await;
        let closed = wait_for_event(&mut events, |k| matches!(k, BridgeEventKind::Closed)).await;
        assert_eq!(streaming.session_id, closed.session_id);
        assert!(closed.timestamp >= streaming.timestamp);
    }
}

#[cfg(test)]
mod control_tests {
    use super::*;

    #[tokio::test]
    async fn test_control_recommits_while_streaming() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        bridge.start_preview(PreviewOptions::default()).await.unwrap();

        bridge.set_control(CameraControl::Brightness, 0.5).unwrap();

        let committed = platform.committed_requests();
        assert_eq!(committed.len(), 2);
        let last = &committed[1].request;
        assert_eq!(last.controls.brightness, 0.5);
        assert_eq!(last.af_mode, AfMode::ContinuousPicture);

        bridge.close_device();
    }

    #[tokio::test]
    async fn test_control_set_before_preview_applies_on_start() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        bridge.set_control(CameraControl::Contrast, -0.25).unwrap();
        assert!(platform.committed_requests().is_empty());

        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        assert_eq!(platform.committed_requests()[0].request.controls.contrast, -0.25);

        bridge.close_device();
    }

    #[tokio::test]
    async fn test_rejected_recommit_keeps_previous_value() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        bridge.set_control(CameraControl::Brightness, 0.25).unwrap();
        bridge.start_preview(PreviewOptions::default()).await.unwrap();

        platform.set_fail_commit(true);
        let result = bridge.set_control(CameraControl::Brightness, 0.75);
        assert!(matches!(result, Err(CameraError::ConfigurationFailed(_))));
        assert_eq!(bridge.controls().brightness, 0.25);

        platform.set_fail_commit(false);
        bridge.close_device();
        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        let committed = platform.committed_requests();
        assert_eq!(committed.last().unwrap().request.controls.brightness, 0.25);

        bridge.close_device();
    }

    #[test]
    fn test_out_of_range_control_rejected() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);

        for value in [1.5, -1.01, f64::NAN, f64::INFINITY] {
            let result = bridge.set_control(CameraControl::Brightness, value);
            assert!(matches!(result, Err(CameraError::InvalidArgument(_))));
        }
        assert_eq!(bridge.controls().brightness, 0.0);
    }
}

#[cfg(test)]
mod contract_tests {
    use super::*;
    use uvcbridge::invariant_ppt::contract_test;

    #[tokio::test]
    async fn contract_session_lifecycle() {
        let platform = MockPlatform::new();
        let bridge = bridge_with(&platform);
        bridge.start_preview(PreviewOptions::default()).await.unwrap();
        bridge.close_device();

        contract_test(
            "session lifecycle",
            &[
                "Previous session is torn down before a new preview starts",
                "Preview surface buffer is 640x480",
                "Repeating request targets the preview surface",
            ],
        );
    }
}
