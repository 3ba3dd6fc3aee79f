//! Testing utilities
//!
//! A recording mock of the platform services plus synthetic frames and USB
//! inventories, for offline tests that need no camera hardware.

pub mod mock_platform;
pub mod synthetic_data;

pub use mock_platform::{CommittedRequest, MockPlatform, OpenBehavior};
pub use synthetic_data::{sample_usb_inventory, synthetic_rgb_frame};
