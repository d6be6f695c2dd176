//! Scripted connector and client for exercising sessions without a printer.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;
use url::Url;

use crate::{
    camera::{CameraSource, FrameStream},
    config::PrinterConfig,
    traits::{Connector, PrinterClient},
};

/// What the fake camera hands out.
#[derive(Debug, Clone)]
pub enum FakeCamera {
    /// No camera.
    None,
    /// A direct source of these frames; `Err` items fail the stream.
    Direct(Vec<Result<&'static str, &'static str>>),
    /// A deferred source of these frames.
    Deferred(Vec<Result<&'static str, &'static str>>),
    /// A direct source producing a frame every 100ms, forever.
    Endless,
}

impl FakeCamera {
    fn source(&self) -> Option<CameraSource> {
        fn frames(items: Vec<Result<&'static str, &'static str>>) -> FrameStream {
            stream::iter(
                items
                    .into_iter()
                    .map(|item| item.map(Bytes::from).map_err(|err| anyhow::anyhow!(err))),
            )
            .boxed()
        }

        match self.clone() {
            Self::None => None,
            Self::Direct(items) => Some(CameraSource::direct(move || frames(items))),
            Self::Deferred(items) => Some(CameraSource::deferred(move || async move { Ok(frames(items)) })),
            Self::Endless => Some(CameraSource::direct(|| {
                stream::unfold((), |()| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Some((Ok(Bytes::from_static(b"frame")), ()))
                })
                .boxed()
            })),
        }
    }
}

/// Counters shared by a connector and every client it opened.
#[derive(Debug, Default)]
pub struct FakeStats {
    opened: AtomicUsize,
    live: AtomicUsize,
    disconnects: AtomicUsize,
    lost: Mutex<BTreeSet<usize>>,
    prints: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeStats {
    /// Clients opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Clients opened and not yet disconnected.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Disconnect calls.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Every start_print call, as (gcode, thumbnail).
    pub fn prints(&self) -> Vec<(String, Option<String>)> {
        self.prints.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct Script {
    ready_after: Option<Duration>,
    never_ready: BTreeSet<String>,
    open_error: Option<&'static str>,
    print_error: Option<&'static str>,
    camera: FakeCamera,
}

/// Opens [FakeClient]s that report ready after a fixed delay.
#[derive(Debug)]
pub struct FakeConnector {
    script: Mutex<Script>,
    /// Shared counters.
    pub stats: Arc<FakeStats>,
}

impl FakeConnector {
    /// Clients report ready `delay` after being opened.
    pub fn ready_after(delay: Duration) -> Self {
        Self::with_delay(Some(delay))
    }

    /// Clients never report ready.
    pub fn never_ready() -> Self {
        Self::with_delay(None)
    }

    fn with_delay(ready_after: Option<Duration>) -> Self {
        Self {
            script: Mutex::new(Script {
                ready_after,
                never_ready: BTreeSet::new(),
                open_error: None,
                print_error: None,
                camera: FakeCamera::Direct(vec![Ok("frame")]),
            }),
            stats: Arc::new(FakeStats::default()),
        }
    }

    /// Change the readiness delay for clients opened from now on.
    pub fn set_ready_after(&self, delay: Option<Duration>) {
        self.script.lock().unwrap().ready_after = delay;
    }

    /// Clients for this printer never report ready.
    pub fn set_never_ready(&self, name: &str) {
        self.script.lock().unwrap().never_ready.insert(name.to_owned());
    }

    /// Make `open` fail.
    pub fn set_open_error(&self, err: Option<&'static str>) {
        self.script.lock().unwrap().open_error = err;
    }

    /// Make `start_print` fail.
    pub fn set_print_error(&self, err: Option<&'static str>) {
        self.script.lock().unwrap().print_error = err;
    }

    /// Set the camera of clients opened from now on.
    pub fn set_camera(&self, camera: FakeCamera) {
        self.script.lock().unwrap().camera = camera;
    }

    /// The most recently opened client stops reporting ready.
    pub fn drop_connection(&self) {
        let latest = self.stats.opened().saturating_sub(1);
        self.stats.lost.lock().unwrap().insert(latest);
    }
}

impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn open(&self, config: &PrinterConfig) -> anyhow::Result<FakeClient> {
        let script = self.script.lock().unwrap();
        if let Some(err) = script.open_error {
            anyhow::bail!(err);
        }

        let ready_after = match script.never_ready.contains(&config.name) {
            true => None,
            false => script.ready_after,
        };
        let id = self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_add(1, Ordering::SeqCst);

        Ok(FakeClient {
            id,
            ready_at: ready_after.map(|delay| Instant::now() + delay),
            print_error: script.print_error,
            camera: script.camera.clone(),
            stats: self.stats.clone(),
        })
    }
}

/// A client whose behavior is fixed by the connector's script when opened.
#[derive(Debug)]
pub struct FakeClient {
    id: usize,
    ready_at: Option<Instant>,
    print_error: Option<&'static str>,
    camera: FakeCamera,
    stats: Arc<FakeStats>,
}

impl PrinterClient for FakeClient {
    type Error = anyhow::Error;

    fn connected(&self) -> bool {
        let ready = self.ready_at.is_some_and(|at| Instant::now() >= at);
        ready && !self.stats.lost.lock().unwrap().contains(&self.id)
    }

    async fn start_print(&self, gcode_url: &Url, thmf_url: Option<&Url>) -> anyhow::Result<()> {
        if let Some(err) = self.print_error {
            anyhow::bail!(err);
        }
        self.stats
            .prints
            .lock()
            .unwrap()
            .push((gcode_url.to_string(), thmf_url.map(|url| url.to_string())));
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn status(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({"gcode_state": "IDLE"}))
    }

    fn camera(&self) -> Option<CameraSource> {
        self.camera.source()
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
