/// Window and screen metrics sampled from the host at resize time.
///
/// Any dimension the host could not report should be passed as `f64::NAN`;
/// a missing screen axis leaves the window as the only constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayMetrics {
    pub window_width: f64,
    pub window_height: f64,
    pub screen_avail_width: f64,
    pub screen_avail_height: f64,
    pub device_pixel_ratio: f64,
}

/// Presented (CSS) size of the surface together with its backing store size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceSize {
    pub logical_width: u32,
    pub logical_height: u32,
    pub backing_width: u32,
    pub backing_height: u32,
    pub device_pixel_ratio: f64,
}

impl SurfaceSize {
    pub fn new(logical_width: u32, logical_height: u32, device_pixel_ratio: f64) -> Self {
        let device_pixel_ratio = sanitize_pixel_ratio(device_pixel_ratio);
        Self {
            logical_width,
            logical_height,
            backing_width: backing_extent(logical_width, device_pixel_ratio),
            backing_height: backing_extent(logical_height, device_pixel_ratio),
            device_pixel_ratio,
        }
    }

    /// True while layout has not produced a usable area yet.
    pub fn is_empty(&self) -> bool {
        self.logical_width == 0 || self.logical_height == 0
    }
}

pub fn sanitize_pixel_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

pub fn backing_extent(logical: u32, device_pixel_ratio: f64) -> u32 {
    (logical as f64 * sanitize_pixel_ratio(device_pixel_ratio)).round() as u32
}

/// Fits the surface to the smaller of the window and the screen's available
/// area on each axis. The logical size is floored so it never exceeds either
/// bound; the backing size is the logical size scaled by the pixel ratio.
pub fn fit_to_display(metrics: &DisplayMetrics) -> SurfaceSize {
    let width = constrained_axis(metrics.window_width, metrics.screen_avail_width);
    let height = constrained_axis(metrics.window_height, metrics.screen_avail_height);
    SurfaceSize::new(width, height, metrics.device_pixel_ratio)
}

fn constrained_axis(window: f64, screen: f64) -> u32 {
    let window = usable_extent(window);
    let screen = usable_extent(screen);
    let bound = match (window, screen) {
        (Some(window), Some(screen)) => window.min(screen),
        (Some(value), None) | (None, Some(value)) => value,
        (None, None) => 0.0,
    };
    bound.floor().min(u32::MAX as f64) as u32
}

fn usable_extent(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value.max(0.0))
    } else {
        None
    }
}
