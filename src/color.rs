use image::Rgba;

/// An RGBA color parsed from a styling string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorSpec {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorSpec {
    pub const BLACK: ColorSpec = ColorSpec::rgb(0, 0, 0);
    pub const WHITE: ColorSpec = ColorSpec::rgb(255, 255, 255);
    pub const RED: ColorSpec = ColorSpec::rgb(255, 0, 0);
    pub const GREEN: ColorSpec = ColorSpec::rgb(0, 255, 0);
    pub const BLUE: ColorSpec = ColorSpec::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `s`, falling back to opaque black for anything unrecognized.
    ///
    /// Never fails. Use [`ColorSpec::try_parse`] to tell an explicit black
    /// apart from a fallback.
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or_else(|| {
            tracing::debug!(input = s, "unrecognized color, falling back to black");
            Self::BLACK
        })
    }

    /// Recognizes `rgb(R,G,B)`, `rgba(R,G,B,A)` and a few named colors.
    pub fn try_parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();

        if let Some([r, g, b]) = functional_args(&s, "rgb") {
            return Some(Self::rgb(r, g, b));
        }
        if let Some([r, g, b, a]) = functional_args(&s, "rgba") {
            return Some(Self::rgba(r, g, b, a));
        }

        match s.as_str() {
            "black" => Some(Self::BLACK),
            "white" => Some(Self::WHITE),
            "red" => Some(Self::RED),
            "green" => Some(Self::GREEN),
            "blue" => Some(Self::BLUE),
            _ => None,
        }
    }

    pub fn same_rgb(&self, px: &Rgba<u8>) -> bool {
        px[0] == self.r && px[1] == self.g && px[2] == self.b
    }
}

impl From<ColorSpec> for Rgba<u8> {
    fn from(c: ColorSpec) -> Self {
        Rgba([c.r, c.g, c.b, c.a])
    }
}

// Parses `name(c0,c1,..)` into exactly N channel bytes.
fn functional_args<const N: usize>(s: &str, name: &str) -> Option<[u8; N]> {
    let inner = s.strip_prefix(name)?.strip_prefix('(')?.strip_suffix(')')?;

    let mut out = [0u8; N];
    let mut parts = inner.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}
