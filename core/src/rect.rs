use serde::{Deserialize, Serialize};

/// Axis-aligned pixel rectangle with an inclusive `end` corner, `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl CropRect {
    pub fn new(start: (u32, u32), end: (u32, u32)) -> Self {
        Self { start, end }
    }

    /// The whole of a `width` x `height` raster. Both must be non-zero.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new((0, 0), (width.saturating_sub(1), height.saturating_sub(1)))
    }

    pub fn width(&self) -> u32 {
        self.end.0 + 1 - self.start.0
    }

    pub fn height(&self) -> u32 {
        self.end.1 + 1 - self.start.1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.start.0 && x <= self.end.0 && y >= self.start.1 && y <= self.end.1
    }

    pub fn fits_in(&self, width: u32, height: u32) -> bool {
        self.end.0 < width && self.end.1 < height
    }
}

/// Resolution independent rectangle in `[0, 1]` coordinates with an
/// exclusive end, used to carry a crop from a preview to a full-size image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioRect {
    pub start: (f64, f64),
    pub end: (f64, f64),
}

impl Default for RatioRect {
    fn default() -> Self {
        Self {
            start: (0.0, 0.0),
            end: (1.0, 1.0),
        }
    }
}

impl RatioRect {
    pub fn from_crop(rect: &CropRect, width: u32, height: u32) -> Self {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        Self {
            start: (rect.start.0 as f64 / w, rect.start.1 as f64 / h),
            end: ((rect.end.0 + 1) as f64 / w, (rect.end.1 + 1) as f64 / h),
        }
    }

    /// Pixel rectangle on a `width` x `height` raster, clamped to it.
    pub fn to_crop(&self, width: u32, height: u32) -> Option<CropRect> {
        if width == 0 || height == 0 {
            return None;
        }
        let to_px = |r: f64, len: u32| (r.clamp(0.0, 1.0) * len as f64).round() as u32;
        let x0 = to_px(self.start.0, width).min(width - 1);
        let y0 = to_px(self.start.1, height).min(height - 1);
        let x1 = to_px(self.end.0, width);
        let y1 = to_px(self.end.1, height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(CropRect::new((x0, y0), (x1 - 1, y1 - 1)))
    }

    pub fn is_full(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusive_dimensions() {
        let r = CropRect::full(20, 10);
        assert_eq!(r.end, (19, 9));
        assert_eq!((r.width(), r.height()), (20, 10));
        assert_eq!(r.area(), 200);
        assert!(r.contains(19, 9));
        assert!(!r.contains(20, 9));
    }

    #[test]
    fn ratio_rect_scales_between_resolutions() {
        let preview = CropRect::new((10, 5), (89, 44));
        let ratio = RatioRect::from_crop(&preview, 100, 50);
        let full = ratio.to_crop(1000, 500).expect("crop");
        assert_eq!(full, CropRect::new((100, 50), (899, 449)));
    }

    #[test]
    fn degenerate_ratio_rect_is_none() {
        let r = RatioRect {
            start: (0.5, 0.5),
            end: (0.5, 0.9),
        };
        assert!(r.to_crop(100, 100).is_none());
        assert!(RatioRect::default().to_crop(0, 10).is_none());
    }
}
