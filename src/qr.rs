use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use ndarray::Array2;
use qrcode::{EcLevel, QrCode};

use crate::color::ColorSpec;

/// Quiet zone width, in modules, added around the symbol when the border is on.
pub const NATIVE_BORDER: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ErrorLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

impl ErrorLevel {
    /// Unknown levels fall back to `M`.
    pub fn from_query(s: &str) -> Self {
        match s {
            "L" => Self::L,
            "M" => Self::M,
            "Q" => Self::Q,
            "H" => Self::H,
            _ => Self::M,
        }
    }
}

impl From<ErrorLevel> for EcLevel {
    fn from(v: ErrorLevel) -> Self {
        match v {
            ErrorLevel::L => EcLevel::L,
            ErrorLevel::M => EcLevel::M,
            ErrorLevel::Q => EcLevel::Q,
            ErrorLevel::H => EcLevel::H,
        }
    }
}

/// Encodes `text` into a square module bitmap, `true` meaning dark.
///
/// With `border` set the bitmap carries a light quiet zone of
/// [`NATIVE_BORDER`] modules on every side.
pub fn generate_qr_data(text: &str, ec_level: EcLevel, border: bool) -> Result<Array2<bool>> {
    let code = QrCode::with_error_correction_level(text, ec_level)
        .context("Failed to generate QR code")?;

    let modules = code.to_colors();
    let width = code.width();
    let pad = if border { NATIVE_BORDER } else { 0 };
    let full = width + 2 * pad;

    let mut qr_data = Array2::from_elem((full, full), false);
    for y in 0..width {
        for x in 0..width {
            qr_data[[y + pad, x + pad]] = matches!(modules[y * width + x], qrcode::Color::Dark);
        }
    }

    Ok(qr_data)
}

/// Renders `text` as a `size`x`size` raster with the given colors.
///
/// Each pixel takes the color of the module under it, so there is no
/// anti-aliasing: every pixel is exactly `fg` or exactly `bg`. A `size`
/// smaller than the bitmap grows to one pixel per module.
pub fn render(
    text: &str,
    level: ErrorLevel,
    size: u32,
    fg: ColorSpec,
    bg: ColorSpec,
    border: bool,
) -> Result<RgbaImage> {
    let bitmap = generate_qr_data(text, level.into(), border)?;
    Ok(render_bitmap(&bitmap, size, fg, bg))
}

fn render_bitmap(bitmap: &Array2<bool>, size: u32, fg: ColorSpec, bg: ColorSpec) -> RgbaImage {
    let modules = bitmap.nrows();
    let size = size.max(modules as u32);
    let modules_per_pixel = modules as f64 / size as f64;

    let fg: Rgba<u8> = fg.into();
    let bg: Rgba<u8> = bg.into();

    ImageBuffer::from_fn(size, size, |x, y| {
        let mx = (x as f64 * modules_per_pixel) as usize;
        let my = (y as f64 * modules_per_pixel) as usize;
        if bitmap[[my, mx]] {
            fg
        } else {
            bg
        }
    })
}
