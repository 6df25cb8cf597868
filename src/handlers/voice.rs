//! Call-setup webhook handler
//!
//! The telephony provider posts here when a call arrives. A request with a
//! valid signature gets back stream instructions pointing at the media-stream
//! endpoint, carrying a freshly issued single-use token.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    http::{HeaderMap, Uri, header, uri::Authority},
    response::{IntoResponse, Response},
};
use tracing::{debug, info, warn};

use crate::auth::{SIGNATURE_HEADER, verify_request};
use crate::core::telephony::{TWIML_CONTENT_TYPE, connect_stream};
use crate::errors::{AppResult, AuthError, AuthResult};
use crate::state::AppState;

/// Header set by reverse proxies terminating TLS
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Handle an incoming call webhook
///
/// # Returns
/// * `200` with the stream document on success
/// * `403` when the signature is missing or wrong
/// * `400` when the request cannot be interpreted
pub async fn incoming_call(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let params = parse_form(&body)?;
    let url = signed_url(state.config.webhook_url.as_deref(), &headers, &uri)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = verify_request(&url, &params, signature, &state.config.twilio_auth_token) {
        warn!(url = %url, error = %e, "Rejecting call-setup webhook");
        return Err(e.into());
    }

    let purged = state.tokens.purge_expired();
    if purged > 0 {
        debug!(purged, "Purged expired tokens before issuing");
    }
    let token = state.tokens.issue();

    let host = stream_host(state.config.public_host.as_deref(), &headers)?;
    let call_sid = params
        .iter()
        .find(|(name, _)| name == "CallSid")
        .map(|(_, value)| value.as_str());
    info!(call_sid = ?call_sid, host = %host, "Accepted incoming call");

    Ok((
        [(header::CONTENT_TYPE, TWIML_CONTENT_TYPE)],
        connect_stream(&host, &token.value),
    )
        .into_response())
}

/// Decode a form-encoded body into name/value pairs.
fn parse_form(body: &[u8]) -> AuthResult<Vec<(String, String)>> {
    std::str::from_utf8(body)
        .map_err(|_| AuthError::MalformedRequest("form body is not valid UTF-8".to_string()))?;
    Ok(url::form_urlencoded::parse(body).into_owned().collect())
}

/// The URL the provider signed.
///
/// A configured webhook URL wins; otherwise it is rebuilt from the forwarded
/// scheme, the Host header and the request path and query.
pub(crate) fn signed_url(
    configured: Option<&str>,
    headers: &HeaderMap,
    uri: &Uri,
) -> AuthResult<String> {
    if let Some(url) = configured {
        return Ok(url.to_string());
    }

    let host = header_str(headers, header::HOST.as_str())
        .ok_or_else(|| AuthError::MalformedRequest("missing Host header".to_string()))?;
    let scheme = header_str(headers, FORWARDED_PROTO_HEADER)
        .and_then(|proto| proto.split(',').next())
        .map(str::trim)
        .filter(|proto| !proto.is_empty())
        .or(uri.scheme_str())
        .unwrap_or("http");

    let mut url = format!("{scheme}://{host}{}", uri.path());
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}

/// Host placed in the `wss://` stream URL, without a port.
pub(crate) fn stream_host(configured: Option<&str>, headers: &HeaderMap) -> AuthResult<String> {
    if let Some(host) = configured {
        return Ok(host.to_string());
    }

    let raw = header_str(headers, header::HOST.as_str())
        .ok_or_else(|| AuthError::MalformedRequest("missing Host header".to_string()))?;
    let authority: Authority = raw
        .parse()
        .map_err(|_| AuthError::MalformedRequest(format!("invalid Host header {raw:?}")))?;
    Ok(authority.host().to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
