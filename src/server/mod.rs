//! The HTTP API over the printer registry.

pub mod context;
mod cors;
pub mod endpoints;
pub mod raw;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{anyhow, Result};
use dropshot::{ApiDescription, ConfigDropshot};

use crate::{any_client::AnyConnector, config::ServerConfig, registry::Registry};
pub use context::Context;

/// Create an API description for the server.
pub fn create_api_description() -> Result<ApiDescription<Arc<Context>>> {
    fn register_endpoints(api: &mut ApiDescription<Arc<Context>>) -> Result<(), dropshot::ApiDescriptionRegisterError> {
        api.register(endpoints::api_get_schema)?;
        api.register(endpoints::healthz)?;
        api.register(endpoints::get_metrics)?;
        api.register(endpoints::get_printers)?;
        api.register(endpoints::get_printer_status)?;
        api.register(endpoints::connect_printer)?;
        api.register(endpoints::disconnect_printer)?;
        api.register(endpoints::print_job)?;
        api.register(endpoints::pause_job)?;
        api.register(endpoints::resume_job)?;
        api.register(endpoints::stop_job)?;
        api.register(endpoints::get_camera)?;

        Ok(())
    }

    let mut api = ApiDescription::new();
    register_endpoints(&mut api).map_err(|err| anyhow!("failed to register endpoints: {}", err))?;

    Ok(api)
}

/// Get the OpenAPI specification for the server.
pub fn get_openapi(api: &mut ApiDescription<Arc<Context>>) -> Result<serde_json::Value> {
    let mut definition = api.openapi("bambu-bridge", clap::crate_version!().parse()?);
    definition
        .description("HTTP bridge to LAN-mode Bambu Lab printers")
        .json()
        .map_err(|e| e.into())
}

/// Build the context and start serving `registry` on `bind`.
pub fn create_server(
    bind: SocketAddr,
    registry: Registry<AnyConnector>,
    server: &ServerConfig,
    logger: &slog::Logger,
) -> Result<(dropshot::HttpServer<Arc<Context>>, Arc<Context>)> {
    let mut api = create_api_description()?;
    let schema = get_openapi(&mut api)?;

    if server.api_key.is_none() {
        tracing::warn!("no API key configured; mutating endpoints are open to anyone who can reach the server");
    }

    let config_dropshot = ConfigDropshot {
        bind_address: bind,
        default_handler_task_mode: dropshot::HandlerTaskMode::Detached,
        ..Default::default()
    };
    let dropshot_logger = logger.new(slog::o!("component" => "dropshot"));

    let api_context = Arc::new(Context::new(
        schema,
        registry,
        server.timing(),
        server.api_key.clone(),
        server.origins(),
    ));

    let http = dropshot::ServerBuilder::new(api, api_context.clone(), dropshot_logger)
        .config(config_dropshot)
        .start()
        .map_err(|error| anyhow!("failed to create server: {}", error))?;

    Ok((http, api_context))
}

/// Serve until `shutdown` resolves, then disconnect every printer.
pub async fn serve<F>(
    bind: SocketAddr,
    registry: Registry<AnyConnector>,
    server: &ServerConfig,
    logger: &slog::Logger,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let (http, api_context) = create_server(bind, registry, server, logger)?;
    tracing::info!(bind = %http.local_addr(), "listening");

    shutdown.await;
    tracing::info!("triggering cleanup...");

    api_context.registry.disconnect_all().await;
    http.close().await.map_err(|error| anyhow!("server failed: {}", error))?;

    tracing::info!("all clean, exiting!");
    Ok(())
}
