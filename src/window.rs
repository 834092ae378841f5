//! Window sizing for screenshot renders

use crate::{Error, Result};

/// Long-edge dimension used when sizing a window from an aspect ratio
pub const DEFAULT_LONG_EDGE: u32 = 2400;

/// Window size used for screenshots when no aspect ratio is supplied
pub const DEFAULT_WINDOW_SIZE: WindowSize = WindowSize {
    width: 640,
    height: 480,
};

/// Concrete pixel dimensions of the sandbox browser window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        DEFAULT_WINDOW_SIZE
    }
}

impl std::fmt::Display for WindowSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

/// Map an aspect ratio (width / height) onto a window whose longer side is
/// `long_edge` pixels.
///
/// Portrait and square ratios keep the height at `long_edge`; landscape
/// ratios keep the width. The short side is rounded to the nearest pixel and
/// never drops below one.
///
/// ```
/// let size = gensandbox::compute_window_size(0.5, 2400).unwrap();
/// assert_eq!((size.width, size.height), (1200, 2400));
/// ```
pub fn compute_window_size(aspect_ratio: f64, long_edge: u32) -> Result<WindowSize> {
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
        return Err(Error::InvalidArgument(format!(
            "aspect ratio must be a finite positive number, got {}",
            aspect_ratio
        )));
    }
    if long_edge == 0 {
        return Err(Error::InvalidArgument("long edge must be positive".into()));
    }

    let dim = f64::from(long_edge);
    let short = |v: f64| (v.round() as u32).clamp(1, long_edge);

    let size = if aspect_ratio <= 1.0 {
        WindowSize {
            width: short(dim * aspect_ratio),
            height: long_edge,
        }
    } else {
        WindowSize {
            width: long_edge,
            height: short(dim / aspect_ratio),
        }
    };
    Ok(size)
}
