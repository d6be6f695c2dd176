//! LAN-mode client for Bambu Lab printers: the MQTT report/request channel
//! and the TLS JPEG camera socket.

#![deny(missing_docs)]

pub mod camera;
pub mod client;
pub mod command;
pub mod message;
mod no_auth;
pub mod parser;
pub mod sequence_id;

/// Username every LAN-mode service on the printer expects.
pub(crate) const LAN_USERNAME: &str = "bblp";

/// Build a rustls client configuration that accepts the printer's
/// self-signed certificate.
pub(crate) fn tls_config() -> std::sync::Arc<rustls::ClientConfig> {
    std::sync::Arc::new(
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(std::sync::Arc::new(no_auth::NoAuth::new()))
            .with_no_client_auth(),
    )
}
