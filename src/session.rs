//! One printer's connection lifecycle.
//!
//! A [Session] owns at most one client at a time. It moves between four
//! states:
//!
//! ```text
//! Disconnected -> Connecting -> Ready -> Disconnected
//!                 Connecting -> Failed -> Connecting
//! ```
//!
//! The state lives behind a single lock which is only held to read or flip
//! the state, never across a network call. A request that arrives while a
//! connect is running sees `Connecting` and fails fast with
//! [Error::NotReady].

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use parse_display::Display;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    camera::{self, FrameSequence},
    config::{BambuVariant, PrinterConfig},
    error::{Error, Result},
    job::JobRequest,
    traits::{Connector, PrinterClient},
};

/// How often to poll the readiness flag, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTiming {
    /// Delay between two readiness checks.
    pub poll_interval: Duration,

    /// Wall-clock deadline for the whole wait.
    pub timeout: Duration,
}

impl Default for ConnectTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema, Display)]
#[serde(rename_all = "snake_case")]
#[display(style = "snake_case")]
pub enum ConnectionState {
    /// No client.
    Disconnected,
    /// A client exists and we are waiting for it to report ready.
    Connecting,
    /// The client reported ready; commands may be sent.
    Ready,
    /// The last connect attempt failed. Connect again to retry.
    Failed,
}

/// A point-in-time view of a session, as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionStatus {
    /// The printer's name.
    pub name: String,
    /// Hostname or address.
    pub host: String,
    /// Serial number.
    pub serial: String,
    /// Printer model.
    pub variant: BambuVariant,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// True when the session is ready for commands.
    pub connected: bool,
    /// Why the last attempt failed or the connection dropped.
    pub last_error: Option<String>,
    /// When the session entered its current state.
    pub since: DateTime<Utc>,
    /// The printer's own latest report, when ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
}

struct Inner<T> {
    state: ConnectionState,
    client: Option<Arc<T>>,
    last_error: Option<String>,
    since: DateTime<Utc>,
    /// Bumped on every connect and disconnect so a connect that finishes
    /// late can tell it was superseded.
    generation: u64,
    /// Cancelled when the current client is released; camera streams end
    /// with it.
    released: CancellationToken,
}

impl<T: PrinterClient> Inner<T> {
    fn transition(&mut self, printer: &str, next: ConnectionState) {
        if self.state == next {
            return;
        }

        if self.state == ConnectionState::Ready {
            self.released.cancel();
        }

        match next {
            ConnectionState::Failed => {
                tracing::warn!(printer, from = %self.state, to = %next, error = ?self.last_error, "session state changed")
            }
            _ => tracing::info!(printer, from = %self.state, to = %next, "session state changed"),
        }
        self.state = next;
        self.since = Utc::now();
    }

    /// Drop to Disconnected if the client stopped reporting ready. Returns
    /// the client to release.
    fn check_liveness(&mut self, printer: &str) -> Option<Arc<T>> {
        if self.state != ConnectionState::Ready {
            return None;
        }
        if self.client.as_ref().is_some_and(|client| client.connected()) {
            return None;
        }

        self.last_error = Some("connection lost".to_owned());
        self.generation += 1;
        self.transition(printer, ConnectionState::Disconnected);
        self.client.take()
    }
}

/// The live connection state of one configured printer.
pub struct Session<C: Connector> {
    config: PrinterConfig,
    connector: Arc<C>,
    inner: Mutex<Inner<C::Client>>,
}

impl<C: Connector> Session<C> {
    /// A new session, initially Disconnected.
    pub fn new(config: PrinterConfig, connector: Arc<C>) -> Self {
        Self {
            config,
            connector,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                client: None,
                last_error: None,
                since: Utc::now(),
                generation: 0,
                released: CancellationToken::new(),
            }),
        }
    }

    /// The printer's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The printer's configuration.
    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    /// Current state, without probing the client.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Open a client and wait for it to report ready.
    ///
    /// A no-op returning the current state when already Connecting or
    /// Ready. If a [Session::disconnect] lands while this is in flight, the
    /// new client is released and the session stays Disconnected.
    pub async fn connect(&self, timing: &ConnectTiming) -> Result<ConnectionState> {
        let name = self.name();

        let (generation, lost) = {
            let mut inner = self.inner.lock().await;
            let lost = inner.check_liveness(name);
            if matches!(inner.state, ConnectionState::Connecting | ConnectionState::Ready) {
                return Ok(inner.state);
            }

            inner.generation += 1;
            inner.transition(name, ConnectionState::Connecting);
            (inner.generation, lost)
        };
        if let Some(client) = lost {
            self.release(client).await;
        }

        let client = match self.connector.open(&self.config).await {
            Ok(client) => Arc::new(client),
            Err(err) => return self.fail(generation, Error::Connect(err), None).await,
        };

        if let Err(err) = wait_until_ready(client.as_ref(), timing.poll_interval, timing.timeout).await {
            return self.fail(generation, err, Some(client)).await;
        }

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            let state = inner.state;
            drop(inner);
            tracing::info!(printer = name, "connect superseded by disconnect");
            self.release(client).await;
            return Ok(state);
        }

        inner.client = Some(client);
        inner.last_error = None;
        inner.released = CancellationToken::new();
        inner.transition(name, ConnectionState::Ready);
        Ok(ConnectionState::Ready)
    }

    async fn fail(
        &self,
        generation: u64,
        err: Error,
        client: Option<Arc<C::Client>>,
    ) -> Result<ConnectionState> {
        {
            let mut inner = self.inner.lock().await;
            if inner.generation == generation {
                inner.last_error = Some(err.to_string());
                inner.transition(self.name(), ConnectionState::Failed);
            }
        }

        if let Some(client) = client {
            self.release(client).await;
        }
        Err(err)
    }

    /// Release the client, if any, and go to Disconnected. A no-op when
    /// already Disconnected.
    pub async fn disconnect(&self) {
        let client = {
            let mut inner = self.inner.lock().await;
            if inner.state == ConnectionState::Disconnected && inner.client.is_none() {
                return;
            }

            inner.generation += 1;
            inner.transition(self.name(), ConnectionState::Disconnected);
            inner.client.take()
        };

        if let Some(client) = client {
            self.release(client).await;
        }
    }

    async fn release(&self, client: Arc<C::Client>) {
        if let Err(err) = client.disconnect().await {
            let err: anyhow::Error = err.into();
            tracing::warn!(printer = self.name(), error = format!("{:?}", err), "failed to release client");
        }
    }

    /// The client, if the session is Ready and the client still is.
    async fn ready_client(&self) -> Result<Arc<C::Client>> {
        self.ready().await.map(|(client, _)| client)
    }

    /// The ready client together with the token cancelled on its release.
    async fn ready(&self) -> Result<(Arc<C::Client>, CancellationToken)> {
        let (ready, lost) = {
            let mut inner = self.inner.lock().await;
            let lost = inner.check_liveness(self.name());
            let ready = match inner.state {
                ConnectionState::Ready => inner.client.clone().map(|client| (client, inner.released.clone())),
                _ => None,
            };
            (ready, lost)
        };

        if let Some(lost) = lost {
            self.release(lost).await;
        }
        ready.ok_or(Error::NotReady)
    }

    /// Hand a job to the printer. Fails with [Error::NotReady] without
    /// touching the client unless Ready.
    pub async fn submit_print(&self, job: &JobRequest) -> Result<()> {
        let client = self.ready_client().await?;
        tracing::info!(printer = self.name(), gcode_url = %job.gcode_url, "submitting print");
        client
            .start_print(&job.gcode_url, job.thmf_url.as_ref())
            .await
            .map_err(|err| Error::Client(err.into()))
    }

    /// Open the printer's camera as a lazy frame sequence. The sequence
    /// ends when the session disconnects or loses its client.
    pub async fn open_camera_stream(&self) -> Result<FrameSequence> {
        let (client, released) = self.ready().await?;
        let source = client.camera().ok_or(Error::CameraUnavailable)?;
        tracing::debug!(printer = self.name(), deferred = source.is_deferred(), "opening camera stream");
        Ok(camera::adapt(source).until(released.cancelled_owned()))
    }

    /// Pause the current job.
    pub async fn pause(&self) -> Result<()> {
        let client = self.ready_client().await?;
        client.pause().await.map_err(|err| Error::Client(err.into()))
    }

    /// Resume the paused job.
    pub async fn resume(&self) -> Result<()> {
        let client = self.ready_client().await?;
        client.resume().await.map_err(|err| Error::Client(err.into()))
    }

    /// Stop the current job.
    pub async fn stop(&self) -> Result<()> {
        let client = self.ready_client().await?;
        client.stop().await.map_err(|err| Error::Client(err.into()))
    }

    /// Lifecycle view, without asking the printer anything.
    pub async fn status(&self) -> SessionStatus {
        let (status, lost) = {
            let mut inner = self.inner.lock().await;
            let lost = inner.check_liveness(self.name());
            (self.snapshot(&inner), lost)
        };

        if let Some(lost) = lost {
            self.release(lost).await;
        }
        status
    }

    /// Lifecycle view plus the printer's latest report, when Ready.
    pub async fn status_with_report(&self) -> SessionStatus {
        let mut status = self.status().await;
        let Ok(client) = self.ready_client().await else {
            return status;
        };

        match client.status().await {
            Ok(report) => status.report = Some(report),
            Err(err) => {
                let err: anyhow::Error = err.into();
                tracing::warn!(printer = self.name(), error = format!("{:?}", err), "failed to read status report");
            }
        }
        status
    }

    fn snapshot(&self, inner: &Inner<C::Client>) -> SessionStatus {
        SessionStatus {
            name: self.config.name.clone(),
            host: self.config.host.clone(),
            serial: self.config.serial.clone(),
            variant: self.config.variant,
            state: inner.state,
            connected: inner.state == ConnectionState::Ready,
            last_error: inner.last_error.clone(),
            since: inner.since,
            report: None,
        }
    }
}

/// Poll `client`'s readiness flag every `poll_interval` until it is set,
/// giving up with [Error::ConnectTimeout] after `timeout`.
pub async fn wait_until_ready<T: PrinterClient>(client: &T, poll_interval: Duration, timeout: Duration) -> Result<()> {
    let poll = async {
        while !client.connected() {
            tokio::time::sleep(poll_interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| Error::ConnectTimeout(timeout))
}
