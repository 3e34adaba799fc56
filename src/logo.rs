use std::time::Duration;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::{QrError, QrResult};

/// Limits applied to every logo download.
#[derive(Debug, Clone)]
pub struct FetchLimits {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_bytes: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Downloads and decodes logo images.
///
/// Holds one `reqwest::Client`; clone freely, clones share the pool.
#[derive(Debug, Clone)]
pub struct LogoFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl LogoFetcher {
    pub fn new(limits: &FetchLimits) -> QrResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(limits.timeout)
            .connect_timeout(limits.connect_timeout)
            .build()
            .map_err(|e| QrError::logo(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: limits.max_bytes,
        })
    }

    pub async fn fetch(&self, url: &str) -> QrResult<RgbaImage> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| QrError::logo(format!("bad URL {url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(QrError::logo(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }

        tracing::debug!(%parsed, "fetching logo");
        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| QrError::logo(e.to_string()))?;

        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(QrError::logo(format!(
                    "logo is {len} bytes (limit {})",
                    self.max_bytes
                )));
            }
        }

        let mut resp = resp;
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| QrError::logo(e.to_string()))? {
            let total = bytes.len() as u64 + chunk.len() as u64;
            if total > self.max_bytes {
                return Err(QrError::logo(format!(
                    "logo exceeds {} bytes",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        decode_logo(&bytes)
    }
}

pub fn decode_logo(bytes: &[u8]) -> QrResult<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| QrError::logo(format!("cannot decode logo: {e}")))
}

/// Largest size with the aspect ratio of `width`x`height` that fits inside
/// `max_width`x`max_height`. Images already inside the box keep their size.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let src_aspect = width as f64 / height as f64;
    let box_aspect = max_width as f64 / max_height as f64;

    let (w, h) = if src_aspect > box_aspect {
        (max_width, (max_width as f64 / src_aspect) as u32)
    } else {
        ((max_height as f64 * src_aspect) as u32, max_height)
    };

    (w.max(1), h.max(1))
}

/// Scales `logo` to `size_percent` of `target` and draws it centered on top.
///
/// The result always has the target's dimensions. A logo larger than the
/// target is clipped. The remainder of an odd margin goes to the right and
/// bottom.
pub fn overlay_logo(target: RgbaImage, logo: RgbaImage, size_percent: f64) -> RgbaImage {
    let (width, height) = target.dimensions();
    let box_w = (width as f64 * size_percent / 100.0) as u32;
    let box_h = (height as f64 * size_percent / 100.0) as u32;

    if box_w == 0 || box_h == 0 || logo.width() == 0 || logo.height() == 0 {
        tracing::debug!(size_percent, "logo box is empty, skipping overlay");
        return target;
    }

    let (logo_w, logo_h) = fit_within(logo.width(), logo.height(), box_w, box_h);
    let resized = if (logo_w, logo_h) == logo.dimensions() {
        logo
    } else {
        imageops::resize(&logo, logo_w, logo_h, FilterType::Lanczos3)
    };

    let x = (width as i64 - logo_w as i64) / 2;
    let y = (height as i64 - logo_h as i64) / 2;

    let mut out = target;
    for (lx, ly, src) in resized.enumerate_pixels() {
        let tx = x + lx as i64;
        let ty = y + ly as i64;
        if tx < 0 || ty < 0 || tx >= width as i64 || ty >= height as i64 {
            continue;
        }
        let dst = out.get_pixel_mut(tx as u32, ty as u32);
        *dst = over(*dst, *src);
    }
    out
}

/// Straight-alpha source-over, rounded. An opaque `dst` stays opaque.
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let oa = sa + da * (1.0 - sa);

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (src[i] as f32 * sa + dst[i] as f32 * da * (1.0 - sa)) / oa;
        out[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn bounds_of(img: &RgbaImage, color: Rgba<u8>) -> Option<(u32, u32, u32, u32)> {
        let mut hit: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in img.enumerate_pixels() {
            if *p == color {
                hit = Some(match hit {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        hit
    }

    #[test]
    fn fit_within_preserves_aspect() {
        assert_eq!(fit_within(200, 100, 60, 60), (60, 30));
        assert_eq!(fit_within(100, 200, 60, 60), (30, 60));
        assert_eq!(fit_within(100, 100, 60, 30), (30, 30));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(16, 16, 60, 60), (16, 16));
    }

    #[test]
    fn fit_within_keeps_at_least_one_pixel() {
        assert_eq!(fit_within(1000, 1, 10, 10), (10, 1));
    }

    #[test]
    fn output_keeps_target_dimensions() {
        for pct in [0.0, 5.0, 20.0, 100.0, 250.0] {
            let target = RgbaImage::from_pixel(120, 80, WHITE);
            let logo = RgbaImage::from_pixel(300, 300, RED);
            let out = overlay_logo(target, logo, pct);
            assert_eq!(out.dimensions(), (120, 80), "pct {pct}");
        }
    }

    #[test]
    fn logo_is_centered() {
        let target = RgbaImage::from_pixel(100, 100, WHITE);
        let logo = RgbaImage::from_pixel(40, 40, RED);
        let out = overlay_logo(target, logo, 20.0);

        // 40x40 fit into 20x20, offset (100 - 20) / 2 = 40.
        let (x0, y0, x1, y1) = bounds_of(&out, RED).unwrap();
        assert!((39..=41).contains(&x0) && (39..=41).contains(&y0));
        assert!((58..=60).contains(&x1) && (58..=60).contains(&y1));
        assert_eq!(*out.get_pixel(0, 0), WHITE);
        assert_eq!(*out.get_pixel(50, 50), RED);
    }

    #[test]
    fn wide_logo_is_centered_on_both_axes() {
        let target = RgbaImage::from_pixel(101, 101, WHITE);
        let logo = RgbaImage::from_pixel(10, 5, RED);
        let out = overlay_logo(target, logo, 50.0);

        // Logo fits already: 10x5 at ((101-10)/2, (101-5)/2) = (45, 48).
        assert_eq!(bounds_of(&out, RED), Some((45, 48, 54, 52)));
    }

    #[test]
    fn transparent_logo_pixels_reveal_target() {
        let target = RgbaImage::from_pixel(10, 10, WHITE);
        let mut logo = RgbaImage::from_pixel(4, 4, RED);
        logo.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let out = overlay_logo(target, logo, 100.0);

        // Logo lands at (3, 3).
        assert_eq!(*out.get_pixel(3, 3), WHITE);
        assert_eq!(*out.get_pixel(4, 4), RED);
    }

    #[test]
    fn half_transparent_logo_blends_over_target() {
        let target = RgbaImage::from_pixel(4, 4, WHITE);
        let logo = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 128]));
        let out = overlay_logo(target, logo, 100.0);
        let p = out.get_pixel(1, 1);
        assert!((120..=135).contains(&p[0]), "got {p:?}");
        assert_eq!(p[3], 255);
    }

    #[test]
    fn zero_percent_leaves_target_untouched() {
        let target = RgbaImage::from_pixel(50, 50, WHITE);
        let out = overlay_logo(target.clone(), RgbaImage::from_pixel(5, 5, RED), 0.0);
        assert_eq!(out.as_raw(), target.as_raw());
    }

    #[test]
    fn undecodable_bytes_are_a_logo_error() {
        let err = decode_logo(b"definitely not an image").unwrap_err();
        assert!(matches!(err, QrError::LogoFetch(_)));
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected() {
        let fetcher = LogoFetcher::new(&FetchLimits::default()).unwrap();
        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, QrError::LogoFetch(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_logo_error() {
        let fetcher = LogoFetcher::new(&FetchLimits::default()).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:1/logo.png").await.unwrap_err();
        assert!(matches!(err, QrError::LogoFetch(_)));
    }

    #[test]
    fn over_keeps_opaque_destination_opaque() {
        for alpha in [1, 77, 128, 200, 254] {
            let out = over(WHITE, Rgba([10, 20, 30, alpha]));
            assert_eq!(out[3], 255, "alpha {alpha}");
        }
    }

    #[test]
    fn over_onto_transparent_returns_source() {
        let src = Rgba([100, 110, 120, 200]);
        assert_eq!(over(Rgba([0, 0, 0, 0]), src), src);
    }

    #[test]
    fn resized_translucent_edges_stay_opaque() {
        let target = RgbaImage::from_pixel(100, 100, WHITE);
        let mut logo = RgbaImage::from_pixel(64, 64, RED);
        for i in 0..64 {
            logo.put_pixel(i, 0, Rgba([255, 0, 0, 90]));
            logo.put_pixel(0, i, Rgba([255, 0, 0, 0]));
        }
        let out = overlay_logo(target, logo, 30.0);
        assert!(out.pixels().all(|p| p[3] == 255));
    }

    fn small_limits(max_bytes: u64, timeout: Duration) -> FetchLimits {
        FetchLimits {
            timeout,
            connect_timeout: Duration::from_secs(2),
            max_bytes,
        }
    }

    #[tokio::test]
    async fn chunked_body_over_the_cap_is_cut_off() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sent = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = sent.clone();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nTransfer-Encoding: chunked\r\n\r\n";
            if sock.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let chunk = vec![b'x'; 4096];
            for _ in 0..20_000 {
                let frame = [b"1000\r\n".as_slice(), chunk.as_slice(), b"\r\n".as_slice()].concat();
                if sock.write_all(&frame).await.is_err() {
                    return;
                }
                counter.fetch_add(chunk.len(), std::sync::atomic::Ordering::SeqCst);
            }
            let _ = sock.write_all(b"0\r\n\r\n").await;
        });

        let fetcher = LogoFetcher::new(&small_limits(1024, Duration::from_secs(10))).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/logo.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, QrError::LogoFetch(_)));
        assert!(err.to_string().contains("exceeds 1024 bytes"), "{err}");
        // The fetch stops long before the 80 MiB body is through.
        assert!(sent.load(std::sync::atomic::Ordering::SeqCst) < 20_000 * 4096);
    }

    #[tokio::test]
    async fn slow_logo_host_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let fetcher = LogoFetcher::new(&small_limits(1024, Duration::from_millis(300))).unwrap();
        let started = std::time::Instant::now();
        let err = fetcher
            .fetch(&format!("http://{addr}/logo.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, QrError::LogoFetch(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
