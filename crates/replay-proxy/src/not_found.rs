//! The uniform "nothing to serve" response.

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;

use crate::request::{InterceptedResponse, ResponseBody};

/// Content type of the not-found page.
pub const NOT_FOUND_CONTENT_TYPE: &str = "text/html; charset=\"utf-8\"";

/// Builds the 404 response naming the URL that could not be resolved.
pub fn not_found(url: &str) -> InterceptedResponse {
    tracing::info!("not found: {}", url);

    let mut response = InterceptedResponse::new(StatusCode::NOT_FOUND);
    response.headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(NOT_FOUND_CONTENT_TYPE),
    );
    response.body = Some(ResponseBody::from_bytes(format!(
        "Sorry, the url <b>{}</b> could not be found in this archive.",
        url
    )));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn names_the_missing_url() {
        let response = not_found("https://example.com/missing");

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.header(CONTENT_TYPE),
            Some("text/html; charset=\"utf-8\"")
        );

        let body = response.body_bytes().await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("https://example.com/missing"));
    }
}
