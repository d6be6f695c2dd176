//! The HTTP endpoints and the mapping from errors to status codes.

use bytes::{BufMut, Bytes, BytesMut};
use dropshot::{
    endpoint, Body, ClientErrorStatusCode, ErrorStatusCode, HttpError, HttpResponseHeaders, HttpResponseOk,
    HttpResponseUpdatedNoContent, Path, RequestContext, TypedBody,
};
use futures::StreamExt;
use http::{header::CONTENT_TYPE, Response, StatusCode};
use hyper::body::Frame;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::mpsc;

use super::{
    context::Context,
    cors::{apply_cors, with_cors},
    raw::RawResponseOk,
};
use crate::{
    camera::FrameSequence,
    error::Error,
    job::{self, JobAccepted, JobRequest, SubmitError},
    session::SessionStatus,
};

const API_KEY_HEADER: &str = "x-api-key";
const FRAME_BOUNDARY: &str = "frame";
const FRAME_BUFFER: usize = 4;

type CorsResult<T> = Result<HttpResponseHeaders<T>, HttpError>;

fn client_error(code: &str, status: ClientErrorStatusCode, message: String) -> HttpError {
    HttpError::for_client_error(Some(code.to_owned()), status, message)
}

fn unavailable(code: &str, message: String) -> HttpError {
    let mut err = HttpError::for_unavail(Some(code.to_owned()), message.clone());
    err.external_message = message;
    err
}

fn not_implemented(code: &str, message: String) -> HttpError {
    HttpError {
        status_code: ErrorStatusCode::NOT_IMPLEMENTED,
        error_code: Some(code.to_owned()),
        external_message: message.clone(),
        internal_message: message,
        headers: None,
    }
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::UnknownPrinter(_) => client_error("UnknownPrinter", ClientErrorStatusCode::NOT_FOUND, message),
            Error::NotReady => client_error("NotReady", ClientErrorStatusCode::CONFLICT, message),
            Error::CameraUnavailable => not_implemented("CameraUnavailable", message),
            Error::ConnectTimeout(_) => unavailable("ConnectTimeout", message),
            Error::Connect(_) => unavailable("ConnectFailed", message),
            Error::Client(_) | Error::StreamInterrupted(_) => unavailable("PrinterError", message),
            Error::DuplicateName(_) | Error::NoPrinters => HttpError::for_internal_error(message),
        }
    }
}

impl From<SubmitError> for HttpError {
    fn from(err: SubmitError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            SubmitError::NotFound(_) => client_error(code, ClientErrorStatusCode::NOT_FOUND, message),
            SubmitError::NotConnected => client_error(code, ClientErrorStatusCode::CONFLICT, message),
            SubmitError::Invalid(_) => HttpError::for_bad_request(Some(code.to_owned()), message),
            SubmitError::Failed(_) => unavailable(code, message),
        }
    }
}

/// Reject the request unless it carries the configured API key.
fn check_api_key(rqctx: &RequestContext<Arc<Context>>) -> Result<(), HttpError> {
    let Some(expected) = rqctx.context().api_key.as_deref() else {
        return Ok(());
    };

    let presented = rqctx
        .request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if presented == Some(expected) {
        Ok(())
    } else {
        Err(HttpError::for_client_error(
            None,
            ClientErrorStatusCode::FORBIDDEN,
            "Invalid or missing API key".to_owned(),
        ))
    }
}

/// Return the OpenAPI schema in JSON format.
#[endpoint {
    method = GET,
    path = "/",
    tags = ["meta"],
}]
pub async fn api_get_schema(
    rqctx: RequestContext<Arc<Context>>,
) -> Result<HttpResponseOk<serde_json::Value>, HttpError> {
    Ok(HttpResponseOk(rqctx.context().schema.clone()))
}

/// The response from the `/healthz` endpoint.
#[derive(Clone, Copy, Deserialize, Debug, JsonSchema, Serialize)]
pub struct Health {
    /// Always true while the server is up.
    pub ok: bool,

    /// Number of configured printers.
    pub printers: usize,
}

/** Liveness of the bridge itself; never touches a printer. */
#[endpoint {
    method = GET,
    path = "/healthz",
    tags = ["meta"],
}]
pub async fn healthz(rqctx: RequestContext<Arc<Context>>) -> CorsResult<HttpResponseOk<Health>> {
    let printers = rqctx.context().registry.len();
    Ok(with_cors(&rqctx, HttpResponseOk(Health { ok: true, printers })))
}

/// List Prometheus metrics.
#[endpoint {
    method = GET,
    path = "/metrics",
    tags = ["meta"],
}]
pub async fn get_metrics(rqctx: RequestContext<Arc<Context>>) -> Result<RawResponseOk, HttpError> {
    let ctx = rqctx.context();
    for session in ctx.registry.iter() {
        let status = session.status().await;
        ctx.metrics.set_ready(&status.name, status.connected);
    }

    let body = ctx.metrics.encode().map_err(|e| {
        tracing::warn!(error = format!("{:?}", e), "failed to encode metrics");
        HttpError::for_internal_error(format!("{:?}", e))
    })?;
    Ok(RawResponseOk(body))
}

/// The path parameters for operations on one printer.
#[derive(Deserialize, Debug, JsonSchema, Serialize)]
pub struct PrinterPathParams {
    /// The printer's configured name.
    pub name: String,
}

/// List every configured printer and its connection state.
#[endpoint {
    method = GET,
    path = "/printers",
    tags = ["printers"],
}]
pub async fn get_printers(rqctx: RequestContext<Arc<Context>>) -> CorsResult<HttpResponseOk<Vec<SessionStatus>>> {
    let mut printers = vec![];
    for session in rqctx.context().registry.iter() {
        printers.push(session.status().await);
    }
    Ok(with_cors(&rqctx, HttpResponseOk(printers)))
}

/// Get the status of a printer, including its latest report when connected.
#[endpoint {
    method = GET,
    path = "/api/{name}/status",
    tags = ["printers"],
}]
pub async fn get_printer_status(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseOk<SessionStatus>> {
    let params = path_params.into_inner();
    let session = rqctx.context().registry.get(&params.name)?;
    Ok(with_cors(&rqctx, HttpResponseOk(session.status_with_report().await)))
}

/// Connect to a printer now, waiting until it is ready or the attempt
/// fails.
#[endpoint {
    method = POST,
    path = "/api/{name}/connect",
    tags = ["printers"],
}]
pub async fn connect_printer(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseOk<SessionStatus>> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    let ctx = rqctx.context();
    let session = ctx.registry.get(&params.name)?;

    tracing::info!(printer = params.name, "connect requested");
    session.connect(&ctx.timing).await?;
    Ok(with_cors(&rqctx, HttpResponseOk(session.status().await)))
}

/// Disconnect from a printer.
#[endpoint {
    method = POST,
    path = "/api/{name}/disconnect",
    tags = ["printers"],
}]
pub async fn disconnect_printer(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseOk<SessionStatus>> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    let session = rqctx.context().registry.get(&params.name)?;

    session.disconnect().await;
    Ok(with_cors(&rqctx, HttpResponseOk(session.status().await)))
}

/// Send a print job to a printer, which downloads it from `gcode_url`.
#[endpoint {
    method = POST,
    path = "/api/{name}/print",
    tags = ["jobs"],
}]
pub async fn print_job(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
    body: TypedBody<JobRequest>,
) -> CorsResult<HttpResponseOk<JobAccepted>> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();

    let accepted = job::submit(&rqctx.context().registry, &params.name, body.into_inner()).await?;
    Ok(with_cors(&rqctx, HttpResponseOk(accepted)))
}

/// Pause the current job.
#[endpoint {
    method = POST,
    path = "/api/{name}/pause",
    tags = ["jobs"],
}]
pub async fn pause_job(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseUpdatedNoContent> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    rqctx.context().registry.get(&params.name)?.pause().await?;
    Ok(with_cors(&rqctx, HttpResponseUpdatedNoContent()))
}

/// Resume the paused job.
#[endpoint {
    method = POST,
    path = "/api/{name}/resume",
    tags = ["jobs"],
}]
pub async fn resume_job(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseUpdatedNoContent> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    rqctx.context().registry.get(&params.name)?.resume().await?;
    Ok(with_cors(&rqctx, HttpResponseUpdatedNoContent()))
}

/// Stop the current job.
#[endpoint {
    method = POST,
    path = "/api/{name}/stop",
    tags = ["jobs"],
}]
pub async fn stop_job(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> CorsResult<HttpResponseUpdatedNoContent> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    rqctx.context().registry.get(&params.name)?.stop().await?;
    Ok(with_cors(&rqctx, HttpResponseUpdatedNoContent()))
}

/// Stream the printer's camera as MJPEG.
#[endpoint {
    method = GET,
    path = "/api/{name}/camera",
    tags = ["camera"],
}]
pub async fn get_camera(
    rqctx: RequestContext<Arc<Context>>,
    path_params: Path<PrinterPathParams>,
) -> Result<Response<Body>, HttpError> {
    check_api_key(&rqctx)?;
    let params = path_params.into_inner();
    let frames = rqctx.context().registry.get(&params.name)?.open_camera_stream().await?;

    let (tx, mut rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(pump_frames(params.name, frames, tx));
    let body = http_body_util::StreamBody::new(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)));

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(
            CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", FRAME_BOUNDARY),
        )
        .body(Body::wrap(body))?;
    apply_cors(&rqctx, response.headers_mut());
    Ok(response)
}

/// Copy frames into the response until the camera ends or the client hangs
/// up.
async fn pump_frames(printer: String, mut frames: FrameSequence, tx: mpsc::Sender<Result<Frame<Bytes>, Infallible>>) {
    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = tx.closed() => {
                tracing::debug!(printer, "camera client went away");
                return;
            }
        };
        let Some(frame) = frame else {
            break;
        };

        match frame {
            Ok(jpeg) => {
                if tx.send(Ok(Frame::data(multipart_part(&jpeg)))).await.is_err() {
                    tracing::debug!(printer, "camera client went away");
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(printer, error = %err, "camera stream ended");
                return;
            }
        }
    }
    tracing::debug!(printer, "camera source finished");
}

fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", FRAME_BOUNDARY);
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_register() {
        let mut api = crate::server::create_api_description().unwrap();
        let schema = crate::server::get_openapi(&mut api).unwrap();
        assert!(schema["paths"]["/printers"]["get"].is_object());
        assert!(schema["paths"]["/api/{name}/status"]["get"].is_object());
        assert!(schema["paths"]["/api/{name}/camera"]["get"].is_object());
    }

    #[tokio::test]
    async fn test_pump_stops_when_client_leaves() {
        let frames = crate::camera::adapt(crate::camera::CameraSource::direct(|| {
            futures::stream::pending::<anyhow::Result<Bytes>>().boxed()
        }));
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let pump = tokio::spawn(pump_frames("bench".to_owned(), frames, tx));

        drop(rx);
        tokio::time::timeout(std::time::Duration::from_secs(1), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_multipart_part() {
        let part = multipart_part(&[0xff, 0xd8, 0xff, 0xd9]);
        assert_eq!(
            part.as_ref(),
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xff\xd8\xff\xd9\r\n".as_slice()
        );
    }

    #[test]
    fn test_error_codes() {
        let cases = [
            (Error::UnknownPrinter("x".to_owned()), StatusCode::NOT_FOUND, "UnknownPrinter"),
            (Error::NotReady, StatusCode::CONFLICT, "NotReady"),
            (Error::CameraUnavailable, StatusCode::NOT_IMPLEMENTED, "CameraUnavailable"),
            (
                Error::ConnectTimeout(std::time::Duration::from_secs(5)),
                StatusCode::SERVICE_UNAVAILABLE,
                "ConnectTimeout",
            ),
            (
                Error::Connect(anyhow::anyhow!("refused")),
                StatusCode::SERVICE_UNAVAILABLE,
                "ConnectFailed",
            ),
            (
                Error::Client(anyhow::anyhow!("rejected")),
                StatusCode::SERVICE_UNAVAILABLE,
                "PrinterError",
            ),
        ];

        for (err, status, code) in cases {
            let message = err.to_string();
            let http: HttpError = err.into();
            assert_eq!(http.status_code.as_status(), status);
            assert_eq!(http.error_code.as_deref(), Some(code));
            assert_eq!(http.external_message, message);
        }
    }

    #[test]
    fn test_submit_error_codes() {
        let http: HttpError = SubmitError::NotConnected.into();
        assert_eq!(http.status_code.as_status(), StatusCode::CONFLICT);
        assert_eq!(http.error_code.as_deref(), Some("NotReady"));

        let http: HttpError = SubmitError::Failed("busy".to_owned()).into();
        assert_eq!(http.status_code.as_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(http.external_message, "submission failed: busy");
    }
}
