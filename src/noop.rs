//! `noop` implements a no-op printer, one that accepts every command and
//! does exactly nothing with it.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::Result;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use url::Url;

use crate::{
    camera::CameraSource,
    config::PrinterConfig,
    traits::{Connector, PrinterClient},
};

/// An empty JPEG: start and end of image markers.
const PLACEHOLDER_FRAME: &[u8] = &[0xff, 0xd8, 0xff, 0xd9];
const FRAME_INTERVAL: Duration = Duration::from_millis(500);

/// Opens [NoopPrinter]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConnector;

impl Connector for NoopConnector {
    type Client = NoopPrinter;

    async fn open(&self, config: &PrinterConfig) -> Result<NoopPrinter> {
        tracing::debug!(printer = config.name, "opening no-op printer");
        Ok(NoopPrinter {
            connected: AtomicBool::new(true),
            state: Mutex::new(NoopState::default()),
        })
    }
}

#[derive(Debug, Default)]
struct NoopState {
    gcode_state: &'static str,
    gcode_url: Option<String>,
}

/// Noop-printer will no-op, well, everything.
#[derive(Debug)]
pub struct NoopPrinter {
    connected: AtomicBool,
    state: Mutex<NoopState>,
}

impl NoopPrinter {
    fn set(&self, gcode_state: &'static str) {
        if let Ok(mut state) = self.state.lock() {
            state.gcode_state = gcode_state;
        }
    }
}

impl PrinterClient for NoopPrinter {
    type Error = anyhow::Error;

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn start_print(&self, gcode_url: &Url, _thmf_url: Option<&Url>) -> Result<()> {
        if let Ok(mut state) = self.state.lock() {
            state.gcode_state = "RUNNING";
            state.gcode_url = Some(gcode_url.to_string());
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.set("PAUSE");
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.set("RUNNING");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.set("IDLE");
        Ok(())
    }

    async fn status(&self) -> Result<serde_json::Value> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("noop printer state poisoned"))?;
        Ok(serde_json::json!({
            "gcode_state": if state.gcode_state.is_empty() { "IDLE" } else { state.gcode_state },
            "gcode_url": state.gcode_url,
        }))
    }

    fn camera(&self) -> Option<CameraSource> {
        Some(CameraSource::direct(|| {
            stream::unfold((), |()| async {
                tokio::time::sleep(FRAME_INTERVAL).await;
                Some((Ok::<_, anyhow::Error>(Bytes::from_static(PLACEHOLDER_FRAME)), ()))
            })
            .boxed()
        }))
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}
