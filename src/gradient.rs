use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::color::ColorSpec;
use crate::error::{QrError, QrResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
}

/// Endpoints and shape of a gradient fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GradientSpec {
    pub start: ColorSpec,
    pub end: ColorSpec,
    pub kind: GradientKind,
}

impl GradientKind {
    /// Anything other than `radial` is linear.
    pub fn from_query(s: &str) -> Self {
        match s {
            "radial" => Self::Radial,
            _ => Self::Linear,
        }
    }
}

/// Builds a `width`x`height` raster blending from `start` to `end`.
///
/// Linear gradients run left to right. Radial gradients grow from the image
/// center and reach `end` at the distance from the center to a corner.
/// Channels are truncated, never rounded, and the output is always opaque.
pub fn synthesize(
    width: u32,
    height: u32,
    start: ColorSpec,
    end: ColorSpec,
    kind: GradientKind,
) -> RgbaImage {
    let w = width as usize;

    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;
    let max_distance = (center_x * center_x + center_y * center_y).sqrt();

    let mut img = RgbaImage::new(width, height);
    img.par_chunks_exact_mut(4).enumerate().for_each(|(i, px)| {
        let y = (i / w) as f64;
        let x = (i % w) as f64;

        let ratio = match kind {
            GradientKind::Linear => {
                if w > 1 {
                    x / (w - 1) as f64
                } else {
                    0.0
                }
            }
            GradientKind::Radial => {
                let distance = ((x - center_x).powi(2) + (y - center_y).powi(2)).sqrt();
                (distance / max_distance).min(1.0)
            }
        };

        px.copy_from_slice(&[
            lerp(start.r, end.r, ratio),
            lerp(start.g, end.g, ratio),
            lerp(start.b, end.b, ratio),
            255,
        ]);
    });

    img
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + t * (b as f64 - a as f64)) as u8
}

/// Repaints `base`: pixels whose RGB exactly matches `foreground` take the
/// gradient pixel, everything else becomes `background`.
///
/// Matching is exact on purpose. Anti-aliased edge pixels fall to the
/// background.
pub fn apply_gradient(
    base: RgbaImage,
    foreground: ColorSpec,
    background: ColorSpec,
    gradient: RgbaImage,
) -> QrResult<RgbaImage> {
    if base.dimensions() != gradient.dimensions() {
        return Err(QrError::image_processing(format!(
            "gradient is {:?} but base raster is {:?}",
            gradient.dimensions(),
            base.dimensions()
        )));
    }

    let bg: Rgba<u8> = background.into();

    let mut out = base;
    out.par_chunks_exact_mut(4)
        .zip(gradient.par_chunks_exact(4))
        .for_each(|(px, g)| {
            if foreground.same_rgb(&Rgba([px[0], px[1], px[2], px[3]])) {
                px.copy_from_slice(g);
            } else {
                px.copy_from_slice(&bg.0);
            }
        });

    Ok(out)
}
