#![allow(refining_impl_trait)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate bridges LAN-mode Bambu Lab printers to a plain HTTP API:
//! printer status, print submission and a live camera feed, without
//! speaking MQTT or the camera protocol yourself.

mod any_client;
#[cfg(feature = "bambu")]
pub mod bambu;
pub mod camera;
pub mod config;
mod error;
pub mod job;
pub mod noop;
pub mod registry;
pub mod server;
pub mod session;
#[cfg(test)]
mod testing;
mod traits;

pub use any_client::{AnyClient, AnyConnector};
pub use camera::{CameraSource, FrameSequence};
pub use config::{Config, PrinterConfig};
pub use error::{Error, Result};
pub use registry::Registry;
pub use session::{ConnectTiming, ConnectionState, Session, SessionStatus};
pub use traits::{Connector, PrinterClient};
