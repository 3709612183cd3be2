//! HTTP routes
//!
//! Every GET/HEAD below the mount path goes through the mirror decision:
//! fresh files are handed to the static file service, everything else is
//! redirected to the origin.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower::ServiceExt;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::status::{StatusReport, STATUS_PATH};
use crate::cache::ResourcePath;
use crate::mirror::{Decision, Mirror};

/// Build the mirror's router
pub fn router(mirror: Arc<Mirror>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status))
        .fallback(mirror_request)
        .with_state(mirror)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn status(State(mirror): State<Arc<Mirror>>) -> Json<StatusReport> {
    Json(StatusReport::collect(&mirror))
}

/// Serve, redirect or reject a request for a mirrored resource
async fn mirror_request(State(mirror): State<Arc<Mirror>>, request: Request) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let path = request.uri().path().to_string();
    let mount = mirror.mount_path();

    if mount != "/" && path == mount.trim_end_matches('/') {
        return redirect(StatusCode::MOVED_PERMANENTLY, mount);
    }

    let Some(rest) = path.strip_prefix(mount) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match mirror.decide(rest).await {
        Ok(Decision::Redirect(url)) => redirect(StatusCode::FOUND, &url),
        Ok(Decision::Serve) => {
            if needs_trailing_slash(&mirror, rest) {
                return redirect(StatusCode::MOVED_PERMANENTLY, &format!("{}/", path));
            }
            serve_local(mirror.store().root(), rest, request).await
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Rejected request path");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// Directories are only served with their canonical trailing slash
fn needs_trailing_slash(mirror: &Mirror, rest: &str) -> bool {
    if rest.is_empty() || rest.ends_with('/') {
        return false;
    }
    match ResourcePath::parse(rest) {
        Ok(path) => matches!(mirror.store().metadata(&path), Ok(Some(m)) if m.is_dir()),
        Err(_) => false,
    }
}

fn redirect(status: StatusCode, location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Hand the request to the static file service rooted at the cache
async fn serve_local(root: &Path, rest: &str, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    parts.uri = match format!("/{}", rest).parse() {
        Ok(uri) => uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match ServeDir::new(root)
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
