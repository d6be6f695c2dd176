//! The seam between printer sessions and the protocol clients behind them.

use std::future::Future;

use url::Url;

use crate::{camera::CameraSource, config::PrinterConfig};

/// A `Connector` opens protocol clients. A session asks its connector for a
/// fresh client every time it connects, and never shares it.
pub trait Connector: Send + Sync + 'static {
    /// Client handle produced by this connector.
    type Client: PrinterClient;

    /// Create a client for `config` and start its connection. This returns
    /// once the handshake is underway; readiness is reported separately
    /// through [PrinterClient::connected].
    fn open(&self, config: &PrinterConfig) -> impl Future<Output = anyhow::Result<Self::Client>> + Send;
}

/// A live connection to one printer.
pub trait PrinterClient: Send + Sync + 'static {
    /// Error type returned by this trait.
    type Error: Into<anyhow::Error> + Send;

    /// Readiness flag: true once the handshake has completed and while the
    /// connection stays up. Must not block.
    fn connected(&self) -> bool;

    /// Ask the printer to fetch and run the job at `gcode_url`, with an
    /// optional thumbnail/preview at `thmf_url`.
    fn start_print(
        &self,
        gcode_url: &Url,
        thmf_url: Option<&Url>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Request that the printer pause the current job, which may be resumed
    /// later.
    fn pause(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Request that the printer resume the paused job.
    fn resume(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Request that the printer stop the current job.
    fn stop(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Latest status report, as reported by the printer.
    fn status(&self) -> impl Future<Output = Result<serde_json::Value, Self::Error>> + Send;

    /// The camera frame source, if this printer has one we can stream.
    fn camera(&self) -> Option<CameraSource>;

    /// Tear down the connection. Called at most once per client.
    fn disconnect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
