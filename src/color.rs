//! Color type definitions and conversions.

/// PNG color types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorType {
    /// Grayscale samples.
    Gray = 0,
    /// Red, green, blue samples.
    Rgb = 2,
    /// Palette indices.
    Indexed = 3,
    /// Grayscale plus alpha.
    GrayAlpha = 4,
    /// Red, green, blue plus alpha.
    Rgba = 6,
}

impl ColorType {
    /// Parse the IHDR color type byte.
    pub const fn from_png(value: u8) -> Option<Self> {
        match value {
            0 => Some(ColorType::Gray),
            2 => Some(ColorType::Rgb),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayAlpha),
            6 => Some(ColorType::Rgba),
            _ => None,
        }
    }

    /// The IHDR color type byte.
    #[inline]
    pub const fn png_code(self) -> u8 {
        self as u8
    }

    /// Number of samples per pixel.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            ColorType::Gray | ColorType::Indexed => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    /// Whether pixels carry an alpha sample.
    #[inline]
    pub const fn has_alpha_channel(self) -> bool {
        matches!(self, ColorType::GrayAlpha | ColorType::Rgba)
    }

    /// Whether `bit_depth` is legal for this color type.
    pub const fn allows_bit_depth(self, bit_depth: u8) -> bool {
        match self {
            ColorType::Gray => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Indexed => matches!(bit_depth, 1 | 2 | 4 | 8),
            ColorType::Rgb | ColorType::GrayAlpha | ColorType::Rgba => {
                matches!(bit_depth, 8 | 16)
            }
        }
    }

    /// Bits occupied by one pixel.
    #[inline]
    pub const fn bits_per_pixel(self, bit_depth: u8) -> usize {
        self.channels() * bit_depth as usize
    }

    /// Distance in bytes to the "left" pixel used by the filters (at least 1).
    #[inline]
    pub const fn filter_bpp(self, bit_depth: u8) -> usize {
        let bytes = self.bits_per_pixel(bit_depth) / 8;
        if bytes == 0 {
            1
        } else {
            bytes
        }
    }

    /// Length in bytes of one scanline of `width` pixels, without the filter byte.
    ///
    /// Returns `None` on overflow.
    pub fn scanline_len(self, width: u32, bit_depth: u8) -> Option<usize> {
        let bits = (width as usize).checked_mul(self.bits_per_pixel(bit_depth))?;
        Some(bits.div_ceil(8))
    }
}

/// Convert an 8-bit sRGB color to CIE L*a*b* (D65 white point).
pub fn srgb_to_lab(r: u8, g: u8, b: u8) -> [f64; 3] {
    // IEC 61966-2-1 transfer function.
    fn linearize(u: f64) -> f64 {
        if u > 0.04045 {
            ((u + 0.055) / 1.055).powf(2.4)
        } else {
            u / 12.92
        }
    }
    fn lab_f(t: f64) -> f64 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            (903.3 * t + 16.0) / 116.0
        }
    }

    let r = linearize(r as f64 / 255.0);
    let g = linearize(g as f64 / 255.0);
    let b = linearize(b as f64 / 255.0);

    let x = (0.4124564 * r + 0.3575761 * g + 0.1804375 * b) / 0.95047;
    let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
    let z = (0.0193339 * r + 0.1191920 * g + 0.9503041 * b) / 1.08883;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// CIE76 color difference between two Lab colors.
#[inline]
pub fn delta_e76(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    (dl * dl + da * da + db * db).sqrt()
}

/// Perceptual difference between two RGBA colors.
///
/// The Lab distance of the color channels, combined with the alpha difference
/// expressed on the L* scale (0..100).
pub fn rgba_difference(a: [u8; 4], b: [u8; 4]) -> f64 {
    let de = delta_e76(srgb_to_lab(a[0], a[1], a[2]), srgb_to_lab(b[0], b[1], b[2]));
    let dalpha = (a[3] as f64 - b[3] as f64) * 100.0 / 255.0;
    (de * de + dalpha * dalpha).sqrt()
}
