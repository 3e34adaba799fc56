use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::color::ColorSpec;
use crate::error::{QrError, QrResult};
use crate::gradient::{GradientKind, GradientSpec};
use crate::logo::LogoFetcher;
use crate::pipeline::{self, ServiceConfig, StyleRequest};
use crate::qr::ErrorLevel;

pub struct AppState {
    pub fetcher: LogoFetcher,
    pub config: ServiceConfig,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> QrResult<Self> {
        Ok(Self {
            fetcher: LogoFetcher::new(&config.fetch)?,
            config,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", get(generate))
        .fallback(not_found)
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for QrError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

async fn not_found() -> Response {
    let body = ErrorBody {
        error: "Not found".to_string(),
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let started = Instant::now();
    let request = GenerateParams::new(&query).into_style_request();
    let data_len = request.data.len();

    match pipeline::generate(request, &state.fetcher, &state.config).await {
        Ok(png) => {
            tracing::info!(data_len, bytes = png.len(), elapsed = ?started.elapsed(), "generated");
            ([(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
        Err(err) => {
            tracing::warn!(data_len, status = %err.status(), error = %err, "generate failed");
            err.into_response()
        }
    }
}

/// Raw `/generate` query parameters.
///
/// Numbers that don't parse fall back to their defaults, and empty strings
/// count as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateParams {
    pub data: String,
    pub size: i64,
    pub foreground: String,
    pub background: String,
    pub error: String,
    pub border: i64,
    pub logo_url: Option<String>,
    pub logo_size: f64,
    pub gradient_start: Option<String>,
    pub gradient_end: Option<String>,
    pub gradient_type: String,
}

impl GenerateParams {
    pub fn new(query: &HashMap<String, String>) -> Self {
        let text = |key: &str, default: &str| {
            non_empty(query, key).unwrap_or(default).to_string()
        };
        let optional = |key: &str| non_empty(query, key).map(str::to_string);

        Self {
            data: query.get("data").cloned().unwrap_or_default(),
            size: number(query, "size", 300),
            foreground: text("foreground", "black"),
            background: text("background", "white"),
            error: text("error", "M"),
            border: number(query, "border", 4),
            logo_url: optional("logo_url"),
            logo_size: number(query, "logo_size", 20.0),
            gradient_start: optional("gradient_start"),
            gradient_end: optional("gradient_end"),
            gradient_type: text("gradient_type", "linear"),
        }
    }

    pub fn into_style_request(self) -> StyleRequest {
        let gradient = match (&self.gradient_start, &self.gradient_end) {
            (Some(start), Some(end)) => Some(GradientSpec {
                start: ColorSpec::parse(start),
                end: ColorSpec::parse(end),
                kind: GradientKind::from_query(&self.gradient_type),
            }),
            _ => None,
        };

        StyleRequest {
            data: self.data,
            size: self.size,
            foreground: ColorSpec::parse(&self.foreground),
            background: ColorSpec::parse(&self.background),
            error_level: ErrorLevel::from_query(&self.error),
            border: self.border,
            logo_url: self.logo_url,
            logo_size: self.logo_size,
            gradient,
        }
    }
}

fn non_empty<'a>(query: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    query.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn number<T: FromStr>(query: &HashMap<String, String>, key: &str, default: T) -> T {
    non_empty(query, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
