//! Single-range `Range` header handling.

use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use hyper::{HeaderMap, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;

static RANGE_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^bytes=(\d+)-(\d*)$").expect("valid range regex"));

/// Outcome of applying a request's `Range` header to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeResult {
    /// 200 for the whole resource, 206 for a byte window.
    pub status: StatusCode,
    /// Inclusive byte bounds, present only with 206.
    pub range: Option<(u64, u64)>,
}

impl RangeResult {
    fn full() -> Self {
        Self {
            status: StatusCode::OK,
            range: None,
        }
    }

    /// First byte of the window.
    pub fn start(&self) -> Option<u64> {
        self.range.map(|(start, _)| start)
    }

    /// Last byte of the window (inclusive).
    pub fn end(&self) -> Option<u64> {
        self.range.map(|(_, end)| end)
    }

    /// Number of bytes the response will carry.
    pub fn len(&self, total_size: u64) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => total_size,
        }
    }

    /// Slices an in-memory body to the window.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        match self.range {
            Some((start, end)) => {
                let start = usize::try_from(start).unwrap_or(usize::MAX).min(data.len());
                let end = usize::try_from(end)
                    .map(|end| end.saturating_add(1))
                    .unwrap_or(usize::MAX)
                    .min(data.len());
                &data[start..end.max(start)]
            }
            None => data,
        }
    }
}

/// Computes the response status and byte window for a resource of
/// `total_size` bytes.
///
/// When `response_headers` is given, `Content-Length` (and `Content-Range`
/// for partial responses) are written into it. Ranges that do not have the
/// single `bytes=<start>-[<end>]` form are ignored and the whole resource is
/// served. An end past the resource is clamped; a start past the resource or
/// after the end is treated like a malformed range.
pub fn parse_range(
    request_headers: &HeaderMap,
    response_headers: Option<&mut HeaderMap>,
    total_size: u64,
) -> RangeResult {
    let Some(range) = request_headers.get(RANGE) else {
        if let Some(headers) = response_headers {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(total_size));
        }
        return RangeResult::full();
    };

    let Some((start, end)) = range.to_str().ok().and_then(|r| match_range(r, total_size)) else {
        tracing::debug!("Ignoring unsupported range {:?}", range);
        return RangeResult::full();
    };

    if let Some(headers) = response_headers {
        let content_range = format!("bytes {}-{}/{}", start, end, total_size);
        if let Ok(value) = HeaderValue::from_str(&content_range) {
            headers.insert(CONTENT_RANGE, value);
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(end - start + 1));
    }

    RangeResult {
        status: StatusCode::PARTIAL_CONTENT,
        range: Some((start, end)),
    }
}

fn match_range(range: &str, total_size: u64) -> Option<(u64, u64)> {
    let caps = RANGE_RX.captures(range.trim())?;
    let start: u64 = caps[1].parse().ok()?;
    let last = total_size.checked_sub(1)?;
    let end = match &caps[2] {
        "" => last,
        end => end.parse::<u64>().ok()?.min(last),
    };

    (start <= end).then_some((start, end))
}
