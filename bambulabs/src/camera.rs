//! JPEG camera feed served on port 6000 by the A1 and P1 families.
//!
//! After a TLS handshake the client sends an 80 byte authentication packet;
//! the printer then streams frames, each a 16 byte header whose first four
//! bytes are the little-endian payload length, followed by one JPEG image.

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const CAMERA_PORT: u16 = 6000;
const HEADER_LEN: usize = 16;
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;
const JPEG_START: [u8; 2] = [0xff, 0xd8];
const JPEG_END: [u8; 2] = [0xff, 0xd9];

/// Connection parameters for the camera socket.
#[derive(Debug, Clone)]
pub struct Camera {
    /// The printer's address.
    pub host: String,
    /// The LAN access code.
    pub access_code: String,
}

impl Camera {
    /// Create a camera handle; nothing is opened until [`Camera::frames`].
    pub fn new<S: Into<String>>(host: S, access_code: S) -> Self {
        Self {
            host: host.into(),
            access_code: access_code.into(),
        }
    }

    /// Connect, authenticate, and return the stream of JPEG frames. The
    /// stream ends after the first read error.
    pub async fn frames(&self) -> Result<BoxStream<'static, Result<Bytes>>> {
        let tcp = tokio::net::TcpStream::connect((self.host.as_str(), CAMERA_PORT))
            .await
            .with_context(|| format!("connecting to camera at {}:{}", self.host, CAMERA_PORT))?;

        let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
            .map_err(|e| anyhow::anyhow!("invalid camera host {}: {}", self.host, e))?;
        let connector = tokio_rustls::TlsConnector::from(crate::tls_config());
        let mut tls = connector
            .connect(server_name, tcp)
            .await
            .context("camera TLS handshake")?;

        tls.write_all(&auth_packet(&self.access_code)).await?;
        tls.flush().await?;
        tracing::debug!(host = self.host, "camera stream authenticated");

        Ok(frame_stream(tls))
    }
}

/// Build the authentication packet: a 16 byte header followed by the
/// username and access code, each NUL padded to 32 bytes.
pub fn auth_packet(access_code: &str) -> [u8; 80] {
    let mut packet = [0u8; 80];
    packet[0..4].copy_from_slice(&0x40u32.to_le_bytes());
    packet[4..8].copy_from_slice(&0x3000u32.to_le_bytes());

    let username = crate::LAN_USERNAME.as_bytes();
    packet[16..16 + username.len()].copy_from_slice(username);

    let code = access_code.as_bytes();
    let len = code.len().min(32);
    packet[48..48 + len].copy_from_slice(&code[..len]);

    packet
}

/// Decode frames from `reader` until it errors or closes.
pub fn frame_stream<R>(reader: R) -> BoxStream<'static, Result<Bytes>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
    .boxed()
}

/// Read one frame. `Ok(None)` on a clean end of stream before a header.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Bytes>> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        anyhow::bail!("camera frame length {} out of range", len);
    }

    let mut payload = BytesMut::zeroed(len);
    reader
        .read_exact(&mut payload)
        .await
        .context("camera stream closed mid-frame")?;

    if !payload.starts_with(&JPEG_START) || !payload.ends_with(&JPEG_END) {
        anyhow::bail!("camera frame is not a JPEG image");
    }

    Ok(Some(payload.freeze()))
}
