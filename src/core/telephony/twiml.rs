//! Stream instructions returned from the call-setup webhook.

use std::borrow::Cow;

use super::messages::TOKEN_PARAMETER;

/// Path of the media-stream WebSocket endpoint
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Content type of the call-setup response
pub const TWIML_CONTENT_TYPE: &str = "application/xml";

/// Build the document that connects the call to `wss://{host}/media-stream`
/// and hands the access token over as a stream parameter.
pub fn connect_stream(host: &str, token: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<Response><Connect><Stream url="wss://{host}{path}">"#,
            r#"<Parameter name="{param}" value="{token}"/>"#,
            r#"</Stream></Connect></Response>"#
        ),
        host = xml_escape(host),
        path = MEDIA_STREAM_PATH,
        param = TOKEN_PARAMETER,
        token = xml_escape(token),
    )
}

fn xml_escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(raw);
    }

    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
