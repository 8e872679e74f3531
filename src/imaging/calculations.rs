//! Pure geometry policy for retrieval-time transforms.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! The policy only ever downsizes. A requested dimension at or above the
//! source dimension fails the "fits" test and the whole geometric step is
//! skipped, so asking for a larger image returns the original geometry.

use super::params::TransformOptions;
use crate::validation::MIN_TRANSFORM_DIM;

/// Geometric operation chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryOp {
    /// Leave the image as decoded.
    Unchanged,
    /// Center fill-crop: scale to cover, then crop to exactly `width`×`height`.
    Fill { width: u32, height: u32 },
    /// Scale to exactly `width`×`height`.
    Resize { width: u32, height: u32 },
}

/// Decide which geometric operation applies to a `source` image.
///
/// `opts` must already have passed
/// [`validate_transform`](crate::validation::validate_transform).
///
/// # Examples
/// ```
/// # use pixstore::imaging::{GeometryOp, TransformOptions, plan_geometry};
/// let opts = TransformOptions { width: 500, height: 500, ..TransformOptions::default() };
/// assert_eq!(
///     plan_geometry((1000, 1000), &opts),
///     GeometryOp::Resize { width: 500, height: 500 }
/// );
///
/// // Wider than the source: nothing happens
/// let opts = TransformOptions { width: 2000, height: 500, ..TransformOptions::default() };
/// assert_eq!(plan_geometry((1000, 1000), &opts), GeometryOp::Unchanged);
/// ```
pub fn plan_geometry(source: (u32, u32), opts: &TransformOptions) -> GeometryOp {
    let (src_w, src_h) = source;
    let req_w = opts.width.max(0) as u32;
    let req_h = opts.height.max(0) as u32;

    let width_ok = req_w >= MIN_TRANSFORM_DIM;
    let height_ok = req_h >= MIN_TRANSFORM_DIM;
    let width_fits = req_w < src_w;
    let height_fits = req_h < src_h;
    let both_fit = width_fits && height_fits;

    if opts.crop {
        if both_fit && width_ok && height_ok {
            return GeometryOp::Fill {
                width: req_w,
                height: req_h,
            };
        }
        return GeometryOp::Unchanged;
    }

    if both_fit && (width_ok || height_ok) {
        let (width, height) = calculate_resize_dimensions(source, (req_w, req_h));
        return GeometryOp::Resize { width, height };
    }

    GeometryOp::Unchanged
}

/// Resolve a resize target where `0` on one axis means "keep aspect ratio".
///
/// When both axes are given the result is exactly the target, which may
/// distort the image.
pub fn calculate_resize_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    match target {
        (0, 0) => source,
        (w, 0) => {
            let h = (src_h as f64 * w as f64 / src_w as f64).round() as u32;
            (w, h.max(1))
        }
        (0, h) => {
            let w = (src_w as f64 * h as f64 / src_h as f64).round() as u32;
            (w.max(1), h)
        }
        exact => exact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(width: i32, height: i32, crop: bool) -> TransformOptions {
        TransformOptions {
            width,
            height,
            crop,
            ..TransformOptions::default()
        }
    }

    // =========================================================================
    // plan_geometry: resize
    // =========================================================================

    #[test]
    fn square_downsize_is_exact() {
        assert_eq!(
            plan_geometry((1000, 1000), &opts(500, 500, false)),
            GeometryOp::Resize {
                width: 500,
                height: 500
            }
        );
    }

    #[test]
    fn oversized_axis_skips_transform() {
        // Width exceeds the source, so the height request is ignored too
        assert_eq!(
            plan_geometry((1000, 1000), &opts(2000, 500, false)),
            GeometryOp::Unchanged
        );
    }

    #[test]
    fn equal_to_source_is_not_a_fit() {
        assert_eq!(
            plan_geometry((800, 600), &opts(800, 0, false)),
            GeometryOp::Unchanged
        );
    }

    #[test]
    fn width_only_keeps_aspect() {
        assert_eq!(
            plan_geometry((1000, 800), &opts(300, 0, false)),
            GeometryOp::Resize {
                width: 300,
                height: 240
            }
        );
    }

    #[test]
    fn height_only_keeps_aspect() {
        assert_eq!(
            plan_geometry((1000, 800), &opts(0, 400, false)),
            GeometryOp::Resize {
                width: 500,
                height: 400
            }
        );
    }

    #[test]
    fn both_axes_may_distort() {
        assert_eq!(
            plan_geometry((1000, 800), &opts(600, 100, false)),
            GeometryOp::Resize {
                width: 600,
                height: 100
            }
        );
    }

    // =========================================================================
    // plan_geometry: crop
    // =========================================================================

    #[test]
    fn crop_inside_bounds_fills() {
        assert_eq!(
            plan_geometry((800, 600), &opts(200, 300, true)),
            GeometryOp::Fill {
                width: 200,
                height: 300
            }
        );
    }

    #[test]
    fn crop_exceeding_one_axis_is_skipped() {
        assert_eq!(
            plan_geometry((800, 600), &opts(200, 600, true)),
            GeometryOp::Unchanged
        );
    }

    #[test]
    fn crop_never_falls_back_to_resize() {
        assert_eq!(
            plan_geometry((800, 600), &opts(2000, 2000, true)),
            GeometryOp::Unchanged
        );
    }

    // =========================================================================
    // calculate_resize_dimensions
    // =========================================================================

    #[test]
    fn resize_dimensions_never_collapse_to_zero() {
        // 6000x50 scaled to width 50 would round height to 0
        assert_eq!(calculate_resize_dimensions((6000, 50), (50, 0)), (50, 1));
    }

    #[test]
    fn resize_dimensions_without_target_keep_source() {
        assert_eq!(calculate_resize_dimensions((640, 480), (0, 0)), (640, 480));
    }
}
