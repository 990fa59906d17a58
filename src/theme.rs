use serde::Serialize;

// Built-in palette used whenever a brand has no usable color of its own.
pub const DEFAULT_PRIMARY_HEX: &str = "#2563eb";
pub const DEFAULT_ACCENT_HEX: &str = "#f59e0b";

const DEFAULT_PRIMARY: Hsl = Hsl { h: 221.0, s: 83.0, l: 53.0 };
const DEFAULT_ACCENT: Hsl = Hsl { h: 38.0, s: 92.0, l: 50.0 };
const WHITE: Hsl = Hsl { h: 0.0, s: 0.0, l: 100.0 };
const INK: Hsl = Hsl { h: 222.0, s: 47.0, l: 11.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

// Hue in degrees 0..360; saturation and lightness in percent 0..100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Hsl {
    pub fn css(self) -> String {
        format!(
            "hsl({}, {}%, {}%)",
            self.h.round() as i64,
            self.s.round() as i64,
            self.l.round() as i64
        )
    }

    fn shifted_lightness(self, delta: f64) -> Hsl {
        Hsl {
            l: (self.l + delta).clamp(0.0, 100.0),
            ..self
        }
    }

    fn with_lightness(self, l: f64) -> Hsl {
        Hsl { l, ..self }
    }
}

// Learner-facing palette derived from a brand's stored colors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandTheme {
    pub primary: String,
    pub primary_dark: String,
    pub primary_light: String,
    pub accent: String,
    pub on_primary: String,
}

// Accepts `#rrggbb`, `rrggbb`, and `#rgb` shorthand.
pub fn parse_hex_color(raw: &str) -> Option<Rgb> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let v = u32::from_str_radix(&expanded, 16).ok()?;
    Some(Rgb {
        r: (v >> 16) as u8,
        g: (v >> 8) as u8,
        b: v as u8,
    })
}

pub fn rgb_to_hsl(rgb: Rgb) -> Hsl {
    let r = f64::from(rgb.r) / 255.0;
    let g = f64::from(rgb.g) / 255.0;
    let b = f64::from(rgb.b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < f64::EPSILON {
        return Hsl {
            h: 0.0,
            s: 0.0,
            l: l * 100.0,
        };
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if (max - r).abs() < f64::EPSILON {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if (max - g).abs() < f64::EPSILON {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    Hsl {
        h: h * 60.0,
        s: s * 100.0,
        l: l * 100.0,
    }
}

fn channel(hex: Option<&str>, fallback: Hsl) -> Hsl {
    hex.and_then(parse_hex_color)
        .map(rgb_to_hsl)
        .unwrap_or(fallback)
}

// Missing or unparsable colors fall back to the built-in defaults per channel,
// so a brand with only a primary color still gets the stock accent.
pub fn derive_theme(primary_hex: Option<&str>, accent_hex: Option<&str>) -> BrandTheme {
    let primary = channel(primary_hex, DEFAULT_PRIMARY);
    let accent = channel(accent_hex, DEFAULT_ACCENT);
    // Light primaries need ink text to stay readable; everything else gets white.
    let on_primary = if primary.l >= 60.0 { INK } else { WHITE };

    BrandTheme {
        primary: primary.css(),
        primary_dark: primary.shifted_lightness(-11.0).css(),
        primary_light: primary.with_lightness(95.0).css(),
        accent: accent.css(),
        on_primary: on_primary.css(),
    }
}
