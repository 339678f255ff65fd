use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, Method},
    response::{IntoResponse, Response},
};
use tracing::{debug, info};

use crate::build_request::BuildRequest;
use crate::AppState;

pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript";
pub const BUILD_CONTENT_DISPOSITION: &str = "attachment; filename=\"c3dlapi.js\"";
pub const NOT_PRESSED: &str = "Button not pressed";

/// Runs the build tool when `submit` is present and streams its stdout back
/// as a JavaScript download. Always answers 200, even if the build fails.
///
/// HEAD gets the same headers but never starts a build.
pub async fn trigger_build(
    method: Method,
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let request = BuildRequest::from_query(query.as_deref());

    if !request.submit {
        return NOT_PRESSED.into_response();
    }

    let mode = request.mode();
    if method == Method::HEAD {
        debug!(%mode, "HEAD request, not starting a build");
        return javascript_download(Body::empty());
    }

    info!(%mode, "Build requested");
    let output = state.builds.run(mode).await;

    javascript_download(Body::from_stream(output))
}

fn javascript_download(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, BUILD_CONTENT_DISPOSITION),
        ],
        body,
    )
        .into_response()
}
