//! Response shadow record and body conversions.

use crate::hook::ResponseData;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Body kind a legacy call asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Plain text (the transport default)
    #[default]
    Text,
    /// Body parsed as JSON by the transport
    Json,
    /// Markup document
    Document,
    /// Raw bytes
    Binary,
}

/// Value of the body field of a completed legacy call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Json(ResponseData),
    Document(String),
    Binary(Bytes),
}

/// Shadow of the observable completion fields of a legacy call.
///
/// Callers never read the native response directly: every completion they
/// see is backed by a view the adapter owns, so fields of a spent call can be
/// replaced after the fact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseView {
    pub status: u16,
    pub status_text: String,
    pub kind: ResponseKind,
    pub body: ResponseBody,
    pub text: String,
    pub xml: Option<String>,
}

impl ResponseView {
    /// Build the view a transport exposes for a buffered body.
    pub fn from_bytes(
        status: u16,
        status_text: impl Into<String>,
        kind: ResponseKind,
        content_type: Option<&str>,
        body: &Bytes,
    ) -> Self {
        let text = match kind {
            ResponseKind::Binary => String::new(),
            _ => String::from_utf8_lossy(body).into_owned(),
        };

        let is_xml = content_type.is_some_and(|ct| ct.contains("xml"));
        let xml = match kind {
            ResponseKind::Document => Some(text.clone()),
            ResponseKind::Text if is_xml => Some(text.clone()),
            _ => None,
        };

        let body = match kind {
            ResponseKind::Text => ResponseBody::Text(text.clone()),
            ResponseKind::Json => {
                ResponseBody::Json(serde_json::from_str(&text).unwrap_or(ResponseData::Null))
            }
            ResponseKind::Document => ResponseBody::Document(text.clone()),
            ResponseKind::Binary => ResponseBody::Binary(body.clone()),
        };

        Self {
            status,
            status_text: status_text.into(),
            kind,
            body,
            text,
            xml,
        }
    }

    /// Response data handed to hooks.
    ///
    /// Binary bodies have no text field, so they are decoded lossily.
    pub fn data(&self) -> ResponseData {
        match &self.body {
            ResponseBody::Json(value) if !value.is_null() => value.clone(),
            ResponseBody::Binary(bytes) => parse_body(&String::from_utf8_lossy(bytes)),
            _ => parse_body(&self.text),
        }
    }

    /// Replace the body fields with a hook result.
    ///
    /// Strings are exposed verbatim; any other value is exposed as-is in the
    /// body field and JSON-serialized in the text field. The markup field
    /// follows a string override when the view exposed markup, and is cleared
    /// otherwise.
    pub fn override_body(&mut self, data: ResponseData) {
        self.text = body_text(&data);
        let had_xml = self.xml.take().is_some();
        self.body = match data {
            ResponseData::String(text) => {
                if had_xml {
                    self.xml = Some(text.clone());
                }
                match self.kind {
                    ResponseKind::Document => ResponseBody::Document(text),
                    _ => ResponseBody::Text(text),
                }
            }
            other => ResponseBody::Json(other),
        };
    }

    /// Copy every observable field from another view.
    pub fn replace_with(&mut self, other: &ResponseView) {
        self.clone_from(other);
    }
}

/// Parse a body as JSON, falling back to the raw text.
pub fn parse_body(text: &str) -> ResponseData {
    serde_json::from_str(text).unwrap_or_else(|_| ResponseData::String(text.to_string()))
}

/// Text form of hook output: strings verbatim, everything else as JSON.
pub fn body_text(data: &ResponseData) -> String {
    match data {
        ResponseData::String(text) => text.clone(),
        other => other.to_string(),
    }
}
