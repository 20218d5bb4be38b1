//! Route handlers.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::BodyExt;
use tracing::{debug, info, warn};

use replay_proxy::{InterceptedRequest, InterceptedResponse, UploadChunk};

use crate::error::{ApiError, Result};
use crate::models::{BlobResponse, LookupMessage, PendingResponse, ReplyRequest, ReplyResponse};
use crate::state::AppState;

/// Fallback on the interception front: every request goes through the router.
pub async fn intercept(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let url = request_url(&parts.uri, &state.router.config().static_prefix);
    let mut request = InterceptedRequest::new(parts.method, url);
    request.headers = parts.headers;
    request = request.referrer_from_headers();
    if !body_bytes.is_empty() {
        request = request.with_upload(vec![UploadChunk::Bytes(body_bytes)]);
    }

    into_http_response(state.router.route(request).await)
}

/// Reconstructs the full URL of a request.
///
/// Absolute-form URIs are used as they are. An origin-form request reaching
/// the front is addressed to the local origin whatever `Host` it carries, so
/// its path is resolved against `origin`.
fn request_url(uri: &Uri, origin: &str) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{}{}", origin.trim_end_matches('/'), path)
}

fn into_http_response(response: InterceptedResponse) -> Response {
    let body = match response.body {
        Some(body) => Body::from_stream(body.into_stream()),
        None => Body::empty(),
    };

    let mut out = Response::new(body);
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

/// GET /api/lookups/next - Long-poll for the next archive lookup.
pub async fn next_lookup(State(state): State<AppState>) -> Result<Response> {
    let mut lookups = state.lookups.lock().await;

    match tokio::time::timeout(state.poll_timeout, lookups.recv()).await {
        Ok(Some(lookup)) => {
            debug!("Handing out lookup {}", lookup.token);
            Ok(Json(LookupMessage::from(lookup)).into_response())
        }
        Ok(None) => Err(ApiError::Internal("lookup channel closed".to_string())),
        Err(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /api/lookups/{token} - Deliver the archive's reply.
///
/// Tokens contain the request URL and must be percent-encoded in the path.
pub async fn deliver_reply(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<Json<ReplyResponse>> {
    let reply = req.into_reply()?;

    if !state.pending.fulfill(&token, reply) {
        return Err(ApiError::NotFound(format!("lookup {}", token)));
    }

    debug!("Delivered reply for {}", token);
    Ok(Json(ReplyResponse { delivered: true }))
}

/// GET /api/lookups/pending - Count lookups awaiting a reply.
pub async fn pending_lookups(State(state): State<AppState>) -> Json<PendingResponse> {
    Json(PendingResponse {
        pending: state.pending.len(),
    })
}

/// PUT /api/blobs/{id} - Store a session blob.
pub async fn put_blob(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Json<BlobResponse> {
    let size = body.len();
    state.blobs.insert(id.clone(), body);
    info!("Stored blob {} ({} bytes)", id, size);
    Json(BlobResponse { id, size })
}

/// DELETE /api/blobs/{id} - Drop a session blob.
pub async fn delete_blob(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if state.blobs.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("blob {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_resolves_against_local_origin() {
        let uri: Uri = "/w/c/20230101000000/https://example.com/?q=1".parse().unwrap();

        assert_eq!(
            request_url(&uri, "http://localhost:5471/"),
            "http://localhost:5471/w/c/20230101000000/https://example.com/?q=1"
        );
    }

    #[test]
    fn absolute_form_is_kept() {
        let uri: Uri = "https://example.com/a?b=c".parse().unwrap();
        assert_eq!(
            request_url(&uri, "http://localhost:5471/"),
            "https://example.com/a?b=c"
        );
    }
}
