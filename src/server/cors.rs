//! CORS headers for allow-listed origins.

use dropshot::{HttpCodedResponse, HttpResponseHeaders, RequestContext};
use http::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY};
use std::sync::Arc;

use super::context::Context;

/// Wrap `response`, adding `access-control-allow-origin` when the request's
/// `Origin` is on the allow list.
pub fn with_cors<T: HttpCodedResponse>(rqctx: &RequestContext<Arc<Context>>, response: T) -> HttpResponseHeaders<T> {
    let mut response = HttpResponseHeaders::new_unnamed(response);

    let origin = rqctx
        .request
        .headers()
        .get(ORIGIN)
        .and_then(|origin| origin.to_str().ok());
    let Some(origin) = origin else {
        return response;
    };

    if rqctx.context().allow_origins.iter().any(|allowed| allowed == origin) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(VARY, HeaderValue::from_static("origin"));
        }
    }

    response
}

/// Same as [with_cors], for raw responses.
pub fn apply_cors(rqctx: &RequestContext<Arc<Context>>, headers: &mut http::HeaderMap) {
    let Some(origin) = rqctx.request.headers().get(ORIGIN) else {
        return;
    };

    let allowed = origin
        .to_str()
        .map(|origin| rqctx.context().allow_origins.iter().any(|allowed| allowed == origin))
        .unwrap_or(false);
    if allowed {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(VARY, HeaderValue::from_static("origin"));
    }
}
