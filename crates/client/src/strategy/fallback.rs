//! Synthesized responses for when neither cache nor network can answer.

use binsync_core::StoredResponse;

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">"##,
    r##"<rect width="200" height="200" fill="#e8efe9"/>"##,
    r##"<path d="M70 80h60l-6 70H76z" fill="none" stroke="#8aa391" stroke-width="6"/>"##,
    r##"<path d="M64 80h72M88 70h24" stroke="#8aa391" stroke-width="6" stroke-linecap="round"/></svg>"##,
);

const OFFLINE_HTML: &str = concat!(
    "<!doctype html><html><head><meta charset=\"utf-8\"><title>Offline</title></head>",
    "<body><h1>You are offline</h1>",
    "<p>Your entries are saved on this device and will sync when you reconnect.</p></body></html>",
);

/// Stand-in for an image that could not be loaded.
pub fn placeholder_image() -> StoredResponse {
    StoredResponse::new(200, PLACEHOLDER_SVG.as_bytes().to_vec())
        .with_header("content-type", "image/svg+xml")
        .with_header("cache-control", "no-store")
}

/// Minimal offline page used when the cached one is missing.
pub fn offline_page() -> StoredResponse {
    StoredResponse::new(503, OFFLINE_HTML.as_bytes().to_vec())
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header("cache-control", "no-store")
}

/// Generic failure for non-navigation requests.
pub fn request_timeout() -> StoredResponse {
    StoredResponse::new(408, b"Request Timeout".to_vec())
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header("cache-control", "no-store")
}
