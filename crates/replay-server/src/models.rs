//! Control API request and response models.
//!
//! Binary data (upload chunks, reply payloads) travels as standard base64;
//! headers travel as `[name, value]` pairs.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use replay_proxy::{LookupReply, LookupRequest, UploadChunk};

use crate::error::{ApiError, Result};

/// One upload chunk of a forwarded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadEntry {
    /// Literal bytes, base64.
    Bytes { data: String },
    /// Blob reference.
    Blob { id: String },
}

impl From<&UploadChunk> for UploadEntry {
    fn from(chunk: &UploadChunk) -> Self {
        match chunk {
            UploadChunk::Bytes(bytes) => UploadEntry::Bytes {
                data: STANDARD.encode(bytes),
            },
            UploadChunk::Blob(id) => UploadEntry::Blob { id: id.clone() },
        }
    }
}

/// Response body for GET /api/lookups/next.
#[derive(Debug, Serialize)]
pub struct LookupMessage {
    /// Token the reply must be posted to.
    pub token: String,
    /// Current collection.
    pub collection: Option<String>,
    /// Current capture timestamp.
    pub timestamp: Option<String>,
    pub method: String,
    /// Archive-relative URL.
    pub url: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<Vec<UploadEntry>>,
}

impl From<LookupRequest> for LookupMessage {
    fn from(lookup: LookupRequest) -> Self {
        let request = lookup.request;
        Self {
            token: lookup.token,
            collection: lookup.collection,
            timestamp: lookup.timestamp,
            method: request.method.to_string(),
            url: request.url,
            headers: header_pairs(&request.headers),
            referrer: request.referrer,
            upload: request
                .upload
                .map(|chunks| chunks.iter().map(UploadEntry::from).collect()),
        }
    }
}

/// Request body for POST /api/lookups/{token}.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    /// Archived status; 404 without payload is a miss.
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Archived payload, base64.
    #[serde(default)]
    pub payload: Option<String>,
}

impl ReplyRequest {
    /// Decodes headers and payload into a [`LookupReply`].
    pub fn into_reply(self) -> Result<LookupReply> {
        let headers = header_map(&self.headers)?;
        let payload = self
            .payload
            .map(|data| {
                STANDARD
                    .decode(data)
                    .map(Bytes::from)
                    .map_err(|e| ApiError::BadRequest(format!("invalid payload: {}", e)))
            })
            .transpose()?;
        Ok(LookupReply::new(self.status, headers, payload))
    }
}

/// Response body for POST /api/lookups/{token}.
#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub delivered: bool,
}

/// Response body for GET /api/lookups/pending.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    /// Lookups still awaiting a reply.
    pub pending: usize,
}

/// Response body for PUT /api/blobs/{id}.
#[derive(Debug, Serialize)]
pub struct BlobResponse {
    pub id: String,
    pub size: usize,
}

/// Flattens headers into pairs, keeping repeated names.
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Builds a header map from pairs.
pub fn header_map(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::BadRequest(format!("invalid value for {}: {}", name, e)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use replay_proxy::InterceptedRequest;
    use serde_json::json;

    #[test]
    fn lookup_message_encodes_upload() {
        let request = InterceptedRequest::new(Method::POST, "https://example.com/api")
            .with_header(axum::http::header::CONTENT_TYPE, "text/plain")
            .with_upload(vec![
                UploadChunk::Bytes(Bytes::from_static(b"hi")),
                UploadChunk::Blob("blob-1".to_string()),
            ]);
        let message = LookupMessage::from(LookupRequest {
            token: "req:1:0:https://example.com/api".to_string(),
            collection: Some("c".to_string()),
            timestamp: None,
            request,
        });

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["headers"], json!([["content-type", "text/plain"]]));
        assert_eq!(
            value["upload"],
            json!([{"type": "bytes", "data": "aGk="}, {"type": "blob", "id": "blob-1"}])
        );
        assert!(value.get("referrer").is_none());
        assert!(value["timestamp"].is_null());
    }

    #[test]
    fn reply_decodes_payload_and_headers() {
        let reply: ReplyRequest = serde_json::from_value(json!({
            "status": 200,
            "headers": [["content-type", "text/html"], ["set-cookie", "a=1"], ["set-cookie", "b=2"]],
            "payload": "PGh0bWw+"
        }))
        .unwrap();

        let reply = reply.into_reply().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.headers.get_all("set-cookie").iter().count(), 2);
        assert_eq!(reply.payload.unwrap(), Bytes::from_static(b"<html>"));
    }

    #[test]
    fn reply_without_payload_is_a_miss() {
        let reply: ReplyRequest = serde_json::from_value(json!({"status": 404})).unwrap();
        let reply = reply.into_reply().unwrap();
        assert!(reply.payload.is_none());
        assert!(reply.headers.is_empty());
    }

    #[test]
    fn bad_base64_is_rejected() {
        let reply: ReplyRequest =
            serde_json::from_value(json!({"status": 200, "payload": "@@@"})).unwrap();
        assert!(matches!(reply.into_reply(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn bad_header_is_rejected() {
        let pairs = vec![("bad header".to_string(), "x".to_string())];
        assert!(matches!(header_map(&pairs), Err(ApiError::BadRequest(_))));
    }
}
