pub mod camera;
pub mod channel;
pub mod config;

pub use camera::*;
pub use channel::*;
pub use config::*;
