//! Static web content served from the www directory.
//!
//! `Last-Modified` is pinned to the moment the server started instead of the
//! file mtime, and `If-Modified-Since` is answered against that instant. A
//! web bundle replaced on disk is therefore re-fetched after every restart.
use std::path::Path;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, SubsecRound, Utc};
use tower_http::{compression::CompressionLayer, services::ServeDir};

use crate::adapters::middleware::with_observability;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Start time used for every `Last-Modified` answer.
#[derive(Clone, Copy, Debug)]
pub struct StartTime(DateTime<Utc>);

impl StartTime {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        // HTTP dates carry whole seconds only.
        Self(instant.trunc_subsecs(0))
    }

    pub fn http_date(&self) -> String {
        self.0.format(HTTP_DATE).to_string()
    }
}

pub fn static_router(www_path: &Path, started: StartTime) -> Router {
    let serve_dir = ServeDir::new(www_path).append_index_html_on_directories(true);

    let router = Router::new()
        .fallback_service(serve_dir)
        .layer(middleware::from_fn_with_state(started, pin_last_modified))
        .layer(CompressionLayer::new());

    with_observability(router)
}

async fn pin_last_modified(
    State(started): State<StartTime>,
    mut req: Request,
    next: Next,
) -> Response {
    let since = req
        .headers_mut()
        .remove(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok().map(str::to_string))
        .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
        .map(|v| v.with_timezone(&Utc));

    if since.is_some_and(|since| started.0 <= since) {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let mut response = next.run(req).await;
    if response.status().is_success() {
        if let Ok(value) = HeaderValue::from_str(&started.http_date()) {
            response.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }
    response
}
