//! This module contains support for Bambu Lab printers in LAN mode, over
//! the [bambulabs] MQTT client.

use std::sync::Arc;

use anyhow::Result;
use bambulabs::{camera::Camera, client::Client, command::Command};
use url::Url;

use crate::{
    camera::CameraSource,
    config::{BambuVariant, PrinterConfig},
    traits::{Connector, PrinterClient},
};

/// Opens MQTT connections to Bambu printers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BambuConnector;

impl Connector for BambuConnector {
    type Client = BambuPrinter;

    async fn open(&self, config: &PrinterConfig) -> Result<BambuPrinter> {
        let client = Client::new(config.host.as_str(), config.access_code.as_str(), config.serial.as_str())?;

        let runner = client.clone();
        let printer = config.name.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = runner.run().await {
                tracing::warn!(printer, error = format!("{:?}", err), "bambu client stopped");
            }
        });

        Ok(BambuPrinter {
            client: Arc::new(client),
            variant: config.variant,
            camera: Camera::new(config.host.as_str(), config.access_code.as_str()),
            task,
        })
    }
}

/// A connected Bambu printer.
pub struct BambuPrinter {
    client: Arc<Client>,
    variant: BambuVariant,
    camera: Camera,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for BambuPrinter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl PrinterClient for BambuPrinter {
    type Error = anyhow::Error;

    fn connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn start_print(&self, gcode_url: &Url, thmf_url: Option<&Url>) -> Result<()> {
        if let Some(thmf_url) = thmf_url {
            // project_file has no field for a preview image.
            tracing::debug!(thmf_url = %thmf_url, "thumbnail not forwarded to printer");
        }

        self.client.publish(Command::print_from_url(gcode_url)).await?;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.client.publish(Command::pause()).await?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.client.publish(Command::resume()).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.client.publish(Command::stop()).await?;
        Ok(())
    }

    async fn status(&self) -> Result<serde_json::Value> {
        match self.client.get_status() {
            Some(status) => Ok(serde_json::to_value(status)?),
            None => Ok(serde_json::Value::Null),
        }
    }

    fn camera(&self) -> Option<CameraSource> {
        if !self.variant.has_jpeg_camera() {
            return None;
        }

        let camera = self.camera.clone();
        Some(CameraSource::deferred(move || async move { camera.frames().await }))
    }

    async fn disconnect(&self) -> Result<()> {
        let result = self.client.disconnect().await;
        self.task.abort();
        result
    }
}
