//! Call-setup webhook signature validation
//!
//! The telephony provider signs each webhook with HMAC-SHA1 over the full
//! request URL followed by every form parameter, sorted by name and appended
//! as `name` + `value`. The base64 digest arrives in a request header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use url::{Position, Url};

use crate::errors::{AuthError, AuthResult};

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the provider's request signature
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Compute the base64 signature for a webhook request
pub fn compute_signature(
    url: &str,
    params: &[(String, String)],
    secret: &str,
) -> AuthResult<String> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| AuthError::MalformedRequest("invalid signing key".to_string()))?;
    mac.update(url.as_bytes());
    for (name, value) in sorted {
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
    }

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a provided signature against the request, in constant time
///
/// The provider may sign the URL with or without the scheme's default port,
/// so both forms are tried when the exact URL does not match.
pub fn validate(url: &str, params: &[(String, String)], provided: &str, secret: &str) -> bool {
    url_variants(url).iter().any(|candidate| {
        compute_signature(candidate, params, secret)
            .map(|expected| bool::from(expected.as_bytes().ct_eq(provided.as_bytes())))
            .unwrap_or(false)
    })
}

/// Validate a webhook request, distinguishing a missing header from a bad one
pub fn verify_request(
    url: &str,
    params: &[(String, String)],
    provided: Option<&str>,
    secret: &str,
) -> AuthResult<()> {
    let provided = provided
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::MissingSignature)?;

    if validate(url, params, provided, secret) {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature)
    }
}

/// The exact URL first, then the same URL with the default port toggled
fn url_variants(url: &str) -> Vec<String> {
    let mut variants = vec![url.to_string()];

    let Ok(parsed) = Url::parse(url) else {
        return variants;
    };
    // `Url` elides default ports, so `port()` is only set for non-default ones
    if parsed.port().is_some() {
        return variants;
    }
    let (Some(host), Some(default_port)) = (parsed.host_str(), parsed.port_or_known_default())
    else {
        return variants;
    };

    let scheme = parsed.scheme();
    let rest = &parsed[Position::BeforePath..];
    for candidate in [
        format!("{scheme}://{host}{rest}"),
        format!("{scheme}://{host}:{default_port}{rest}"),
    ] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    variants
}
