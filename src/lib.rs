//! uvcbridge: UVC / USB camera preview bridge for Tauri applications
//!
//! Lists attached USB peripherals, opens a camera into a 640x480 preview
//! surface, and tears the session down again, behind a small command set
//! that a UI layer calls by name.
//!
//! # Features
//! - USB device descriptors (`"<name> (VID:<vendor> PID:<product>)"`)
//! - Single preview session with open timeout and busy guard
//! - Continuous auto-focus repeating request, software brightness/contrast
//! - Persistent event stream for disconnects, device errors and timeouts
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! uvcbridge = "0.1"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! Then in your Tauri app:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(uvcbridge::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
pub mod bridge;
pub mod channel;
pub mod commands;
pub mod config;
pub mod errors;
pub mod invariant_ppt;
pub mod permissions;
pub mod platform;
pub mod session;
pub mod types;

// Testing utilities - mock platform and synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use bridge::CameraBridge;
pub use channel::{dispatch, MethodCall, MethodResponse, CHANNEL_NAME};
pub use config::BridgeConfig;
pub use errors::{CameraError, CommandError};
pub use platform::PlatformBackend;
pub use types::{
    BridgeEvent, BridgeEventKind, CameraControl, Platform, PreviewOptions, SessionPhase,
    UsbDeviceInfo,
};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Emitter, Runtime,
};
use tokio::sync::broadcast::error::RecvError;

/// Tauri event carrying every `BridgeEvent`
pub const EVENT_NAME: &str = "uvcbridge://event";
/// Tauri event carrying the texture id of each new preview frame
pub const FRAME_EVENT_NAME: &str = "uvcbridge://frame";

/// Initialize the uvcbridge plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("uvcbridge")
        .invoke_handler(tauri::generate_handler![
            // Session commands
            commands::camera::enumerate_devices,
            commands::camera::start_preview,
            commands::camera::close_device,
            commands::camera::set_brightness,
            commands::camera::set_contrast,
            commands::camera::get_session_phase,
            commands::camera::copy_pixel_buffer,
            commands::camera::get_platform_info,
            commands::camera::get_permission_status,
            // Method channel
            commands::channel::handle_method_call,
            // Configuration commands
            commands::config::get_config,
            commands::config::update_config,
            commands::config::reset_config,
        ])
        .setup(|app, _api| {
            let frame_app = app.clone();
            commands::camera::global_textures().set_frame_listener(move |texture_id| {
                if let Err(e) = frame_app.emit(FRAME_EVENT_NAME, texture_id) {
                    log::debug!("Failed to emit frame event: {}", e);
                }
            });

            let event_app = app.clone();
            let mut events = commands::camera::global_bridge().subscribe();
            tauri::async_runtime::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if let Err(e) = event_app.emit(EVENT_NAME, &event) {
                                log::warn!("Failed to forward bridge event: {}", e);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::warn!("Event forwarder lagged, {} events dropped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            log::info!("uvcbridge plugin initialized on {}", Platform::current().as_str());
            Ok(())
        })
        .build()
}

/// Detect the current platform using the Platform enum
pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging for the bridge
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "uvcbridge=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
        channel: CHANNEL_NAME.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
    pub channel: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = current_platform();
        assert_ne!(platform, Platform::Unknown);
    }

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "uvcbridge");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
        assert_eq!(info.channel, "com.example.uvc_ir_viewer/camera");
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
