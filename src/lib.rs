//! videoctl - HTTP/JSON control surface for Linux V4L2 video devices
//!
//! Exposes device discovery, pixel-format enumeration, active-format readout and
//! control get/set over a small JSON API.
//!
//! # Endpoints
//!
//! - `GET /devices`: every `video*` node with driver, card, bus and capability names
//! - `GET /device/formats/<node>`: formats and frame sizes per buffer type
//! - `GET /device/format/<node>`: currently configured format per buffer type
//! - `GET /device/control/<node>`: controls with range, value and menu
//! - `POST /device/control/<node>`: write controls by normalised name
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use videoctl::config::ServerOptions;
//! use videoctl::device::mock::{MockDevice, MockProvider};
//! use videoctl::server::Server;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> videoctl::Result<()> {
//!     let provider = MockProvider::new();
//!     provider.insert("video0", MockDevice::webcam());
//!
//!     let server = Server::bind(&ServerOptions::default(), Arc::new(provider)).await?;
//!     server.run().await
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod config;
pub mod controls;
pub mod device;
pub mod error;
pub mod formats;
pub mod json;
pub mod logging;
pub mod names;
pub mod server;

// Re-exports for convenience
pub use error::{Error, Result};

pub use api::{Request, Response, dispatch};
pub use config::{LogRotation, LoggingOptions, ServerOptions, VideoctlConfig};
pub use device::{DeviceProvider, VideoNode};
pub use server::Server;

#[cfg(feature = "hardware")]
#[cfg_attr(docsrs, doc(cfg(feature = "hardware")))]
pub use device::node::{DevFs, V4l2Node};
