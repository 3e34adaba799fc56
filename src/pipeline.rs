use std::io::Cursor;
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbaImage};

use crate::color::ColorSpec;
use crate::error::{QrError, QrResult};
use crate::gradient::{self, GradientSpec};
use crate::logo::{self, LogoFetcher};
use crate::qr::{self, ErrorLevel, NATIVE_BORDER};

/// Settings shared by every request, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_size: u32,
    pub request_timeout: Duration,
    pub fetch: logo::FetchLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_size: 4096,
            request_timeout: Duration::from_secs(30),
            fetch: logo::FetchLimits::default(),
        }
    }
}

/// One request's worth of styling parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct StyleRequest {
    pub data: String,
    pub size: i64,
    pub foreground: ColorSpec,
    pub background: ColorSpec,
    pub error_level: ErrorLevel,
    pub border: i64,
    pub logo_url: Option<String>,
    /// Percent of the QR image's width and height.
    pub logo_size: f64,
    pub gradient: Option<GradientSpec>,
}

impl Default for StyleRequest {
    fn default() -> Self {
        Self {
            data: String::new(),
            size: 300,
            foreground: ColorSpec::BLACK,
            background: ColorSpec::WHITE,
            error_level: ErrorLevel::M,
            border: 4,
            logo_url: None,
            logo_size: 20.0,
            gradient: None,
        }
    }
}

/// A request that passed validation, with the border-inflated pixel size.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidRequest {
    pub style: StyleRequest,
    pub pixel_size: u32,
    pub border_enabled: bool,
}

impl StyleRequest {
    /// Rejects empty data and out-of-range sizes, clamps a negative border
    /// to zero and applies border inflation.
    ///
    /// A border wider than the renderer's native quiet zone is approximated by
    /// growing the image by two pixels per extra module, not by real padding.
    ///
    /// Sizes outside `1..=max_size` are rejected as client errors rather
    /// than rendered.
    pub fn validate(mut self, max_size: u32) -> QrResult<ValidRequest> {
        if self.data.is_empty() {
            return Err(QrError::invalid_request("Data parameter is required"));
        }
        if self.size <= 0 || self.size > max_size as i64 {
            return Err(QrError::invalid_request(format!(
                "Size must be between 1 and {max_size}"
            )));
        }
        if self.border < 0 {
            tracing::debug!(border = self.border, "negative border clamped to 0");
            self.border = 0;
        }

        let border_enabled = self.border > 0;
        let extra = self.border - NATIVE_BORDER as i64;
        let pixel_size = if border_enabled && extra > 0 {
            self.size.saturating_add(extra.saturating_mul(2))
        } else {
            self.size
        };
        let pixel_size = u32::try_from(pixel_size)
            .ok()
            .filter(|&px| px <= max_size)
            .ok_or_else(|| QrError::invalid_request("Border is too large for this size"))?;

        Ok(ValidRequest {
            style: self,
            pixel_size,
            border_enabled,
        })
    }
}

/// Base render, then the optional gradient.
pub fn render_styled(req: &ValidRequest) -> QrResult<RgbaImage> {
    let style = &req.style;
    let base = qr::render(
        &style.data,
        style.error_level,
        req.pixel_size,
        style.foreground,
        style.background,
        req.border_enabled,
    )
    .map_err(|e| QrError::render(format!("{e:#}")))?;

    match style.gradient {
        Some(g) => {
            let gradient = gradient::synthesize(base.width(), base.height(), g.start, g.end, g.kind);
            gradient::apply_gradient(base, style.foreground, style.background, gradient)
        }
        None => Ok(base),
    }
}

pub fn encode_png(img: &RgbaImage) -> QrResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| QrError::encode(e.to_string()))?;
    Ok(buf.into_inner())
}

/// Runs the whole pipeline for one request and returns PNG bytes.
///
/// Bounded by `config.request_timeout`. On timeout the request fails
/// right away, but a render or resize already running on the blocking pool
/// is not cancelled and finishes in the background; its result is dropped.
pub async fn generate(
    request: StyleRequest,
    fetcher: &LogoFetcher,
    config: &ServiceConfig,
) -> QrResult<Vec<u8>> {
    let limit = config.request_timeout;
    tokio::time::timeout(limit, run(request, fetcher, config))
        .await
        .map_err(|_| QrError::Timeout(limit))?
}

async fn run(
    request: StyleRequest,
    fetcher: &LogoFetcher,
    config: &ServiceConfig,
) -> QrResult<Vec<u8>> {
    let valid = request.validate(config.max_size)?;
    let started = Instant::now();

    let logo_url = valid.style.logo_url.clone();
    let logo_size = valid.style.logo_size;

    let styled = blocking(move || render_styled(&valid)).await?;
    tracing::debug!(elapsed = ?started.elapsed(), "styled raster ready");

    let logo = match logo_url {
        Some(url) => Some(fetcher.fetch(&url).await?),
        None => None,
    };

    let png = blocking(move || {
        let img = match logo {
            Some(logo) => logo::overlay_logo(styled, logo, logo_size),
            None => styled,
        };
        encode_png(&img)
    })
    .await?;

    tracing::debug!(elapsed = ?started.elapsed(), bytes = png.len(), "png encoded");
    Ok(png)
}

async fn blocking<T, F>(f: F) -> QrResult<T>
where
    F: FnOnce() -> QrResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QrError::image_processing(format!("worker failed: {e}")))?
}
