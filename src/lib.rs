//! droidfrpd - A supervisor for the FRP reverse-proxy binaries
//!
//! This library provides a process supervisor that:
//! - Extracts a bundled FRP client or server binary into a writable data directory
//! - Materializes a default configuration file on first use and never overwrites it
//! - Spawns the binary and streams its stdout/stderr into a bounded log buffer
//! - Treats an exit within the first seconds as a configuration error
//! - Periodically checks liveness and restarts a child that crashed later on
//! - Optionally starts on boot from persisted settings

pub mod autostart;
pub mod clock;
pub mod config;
pub mod config_store;
pub mod drainer;
pub mod error;
pub mod host;
pub mod log_buffer;
pub mod log_view;
pub mod mode;
pub mod provision;
pub mod settings;
pub mod supervisor;

pub use mode::Mode;
pub use supervisor::{Phase, Supervisor, SupervisorStatus, SupervisorView};
