use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use bambu_bridge::{server, AnyConnector, Config, Registry};

pub async fn main(cfg: &Config, bind: &str, logger: &slog::Logger) -> Result<()> {
    let bind_addr: SocketAddr = bind.parse()?;

    let registry = Registry::build(cfg.printers.clone(), Arc::new(AnyConnector::default()))?;
    tracing::info!(printers = registry.len(), "printer registry built");

    if cfg.server.autoconnect {
        match registry.autoconnect_all(&cfg.server.timing()).await {
            Ok(outcomes) => {
                let ready = outcomes.iter().filter(|outcome| outcome.result.is_ok()).count();
                tracing::info!(ready, total = outcomes.len(), "autoconnect complete");
            }
            Err(err) => tracing::warn!(error = %err, "autoconnect skipped"),
        }
    }

    // Held for the lifetime of the server; dropping the service withdraws
    // the advertisement.
    let responder = libmdns::Responder::spawn(&tokio::runtime::Handle::current());
    let _svc = match &responder {
        Ok(responder) => {
            tracing::info!(
                bind_addr = bind_addr.to_string(),
                "starting mDNS advertisement for _bambu-bridge._tcp"
            );
            Some(responder.register(
                "_bambu-bridge._tcp",
                "Bambu Bridge",
                bind_addr.port(),
                &["path=/"],
            ))
        }
        Err(err) => {
            tracing::warn!(error = format!("{:?}", err), "mDNS advertisement unavailable");
            None
        }
    };

    server::serve(bind_addr, registry, &cfg.server, logger, async {
        if let Err(err) = super::handle_signals().await {
            tracing::error!(error = format!("{:?}", err), "signal handling failed; shutting down");
        }
    })
    .await
}
