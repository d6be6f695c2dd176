use anyhow::Result;
use url::Url;

use crate::{
    camera::CameraSource,
    config::{Backend, PrinterConfig},
    traits::{Connector, PrinterClient},
};

/// AnyConnector opens a client for whichever backend a printer is
/// configured with.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyConnector {
    #[cfg(feature = "bambu")]
    bambu: crate::bambu::BambuConnector,

    noop: crate::noop::NoopConnector,
}

impl Connector for AnyConnector {
    type Client = AnyClient;

    async fn open(&self, config: &PrinterConfig) -> Result<AnyClient> {
        match config.backend {
            #[cfg(feature = "bambu")]
            Backend::Bambu => Ok(self.bambu.open(config).await?.into()),

            #[cfg(not(feature = "bambu"))]
            Backend::Bambu => anyhow::bail!("{}: built without bambu support", config.name),

            Backend::Noop => Ok(self.noop.open(config).await?.into()),
        }
    }
}

/// AnyClient is any supported printer client.
pub enum AnyClient {
    /// Bambu Lab printer in LAN mode.
    #[cfg(feature = "bambu")]
    Bambu(crate::bambu::BambuPrinter),

    /// No-op printer.
    Noop(crate::noop::NoopPrinter),
}

macro_rules! def_client_stubs {
    (if $feature:expr, $name:ident($client:path)) => {
        #[cfg(feature = $feature)]
        impl From<$client> for AnyClient {
            fn from(client: $client) -> Self {
                Self::$name(client)
            }
        }
    };
    ($name:ident($client:path)) => {
        impl From<$client> for AnyClient {
            fn from(client: $client) -> Self {
                Self::$name(client)
            }
        }
    };
}

def_client_stubs!(if "bambu", Bambu(crate::bambu::BambuPrinter));
def_client_stubs!(Noop(crate::noop::NoopPrinter));

macro_rules! for_all {
    (|$slf:ident, $client:ident| $body:block) => {
        match $slf {
            #[cfg(feature = "bambu")]
            Self::Bambu($client) => $body,

            Self::Noop($client) => $body,
        }
    };
}

impl PrinterClient for AnyClient {
    type Error = anyhow::Error;

    fn connected(&self) -> bool {
        for_all!(|self, client| { client.connected() })
    }

    async fn start_print(&self, gcode_url: &Url, thmf_url: Option<&Url>) -> Result<()> {
        for_all!(|self, client| { client.start_print(gcode_url, thmf_url).await })
    }

    async fn pause(&self) -> Result<()> {
        for_all!(|self, client| { client.pause().await })
    }

    async fn resume(&self) -> Result<()> {
        for_all!(|self, client| { client.resume().await })
    }

    async fn stop(&self) -> Result<()> {
        for_all!(|self, client| { client.stop().await })
    }

    async fn status(&self) -> Result<serde_json::Value> {
        for_all!(|self, client| { client.status().await })
    }

    fn camera(&self) -> Option<CameraSource> {
        for_all!(|self, client| { client.camera() })
    }

    async fn disconnect(&self) -> Result<()> {
        for_all!(|self, client| { client.disconnect().await })
    }
}
