#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # walkingpad 🚶
//!
//! A Rust library for controlling KingSmith WalkingPad treadmills via
//! Bluetooth Low Energy.
//!
//! The WalkingPad speaks a small proprietary protocol over a Nordic-style
//! serial service: 6-byte command frames with a wraparound checksum going
//! out, and status notification frames (speed, mode, elapsed time, distance,
//! steps) coming back. This crate implements the full device session driver
//! around that protocol:
//!
//! - **Frame codec** ([`protocol`]): command encoding, checksum, status
//!   decoding
//! - **Command queue & writer** ([`queue`]): a bounded queue drained by a
//!   single paced writer, because the pad drops closely-spaced writes
//! - **Session driver** ([`driver`]): one [`PadDriver`] per connection owning
//!   the queue, the status poller and the notification decoder, with
//!   idempotent join-on-close teardown
//! - **Connection supervisor** ([`supervisor`]): scan → connect → ready loop
//!   with automatic reconnection after link loss
//! - **Session accounting** ([`session`]): per-session accumulators with
//!   detection of starts/stops made on the device's own controls
//! - **Reporting** ([`report`]): optional webhook delivery of finished
//!   sessions with an append-only JSONL audit log
//!
//! ## Safety Warning
//!
//! ⚠️ **Important**: This library controls physical exercise equipment.
//! Always ensure users can stop the belt on the device itself and that your
//! application handles disconnects gracefully.
//!
//! ## Quick Start
//!
//! ```no_run
//! use walkingpad::{Discoverer, KingsmithDiscoverer, ScanParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let discoverer = KingsmithDiscoverer::new().await?;
//!     let candidates = discoverer.scan(&ScanParams::default()).await?;
//!
//!     let (transport, notifications) = candidates
//!         .into_iter()
//!         .next()
//!         .ok_or(walkingpad::PadError::DeviceNotFound)?
//!         .connect()
//!         .await?;
//!
//!     let driver = walkingpad::PadDriver::new(transport, notifications, None);
//!     driver.start(2.5).await;
//!     // ... walk ...
//!     driver.stop().await;
//!     driver.close().await;
//!     Ok(())
//! }
//! ```

/// JSON configuration file loading
pub mod config;
/// Per-connection session driver
pub mod driver;
/// Error types and handling
pub mod error;
/// Protocol frame encoding and status decoding
pub mod protocol;
/// Command queue and the single paced writer
pub mod queue;
/// Session reporting (webhook + audit log)
pub mod report;
/// Session accumulators and external-change detection
pub mod session;
/// Connection supervisor state machine
pub mod supervisor;
/// Bluetooth Low Energy transport and device discovery
pub mod transport;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use config::Config;
pub use driver::PadDriver;
pub use error::{PadError, Result};
pub use report::{SessionReport, SessionReporter, WebhookReporter};
pub use supervisor::{StatusSink, Supervisor, TracingSink};
pub use transport::{discover_candidates, Candidate, Discoverer, KingsmithDiscoverer, PadTransport};
pub use types::{ConnectionState, Intent, PadMode, ScanParams, SessionSnapshot, StatusReading};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Primary WalkingPad service UUID advertised by KingSmith pads
///
/// The pad exposes its serial-style command channel under this service. The
/// discovery UUID set (see [`transport::WALKINGPAD_SERVICE_UUIDS`])
/// additionally includes the generic access/device information services that
/// older firmware advertises instead.
pub const WALKINGPAD_SERVICE_UUID: &str = "0000fe00-0000-1000-8000-00805f9b34fb";

/// Notification characteristic UUID (device-to-app status frames)
pub const WALKINGPAD_NOTIFY_CHAR_UUID: &str = "0000fe01-0000-1000-8000-00805f9b34fb";

/// Write characteristic UUID (app-to-device command frames)
pub const WALKINGPAD_WRITE_CHAR_UUID: &str = "0000fe02-0000-1000-8000-00805f9b34fb";
