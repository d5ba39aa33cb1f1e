//! `paths`
//!
//! Provides utilities for measuring paths, turning SVG path data into lyon geometry in document
//! space and summing up how far the pen travels along it.

use lyon_algorithms::length::approximate_length;
use lyon_algorithms::path::math::{point, Point};
use lyon_algorithms::path::Path as LyonPath;
use usvg::tiny_skia_path::PathSegment;
use usvg::Path;

/// Maximum distance between a curve and its flattened approximation, in SVG units.
pub const LENGTH_TOLERANCE: f32 = 0.1;

/// A point in SVG user units, after all transforms have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointInSvgUnits {
    /// Horizontal axis position.
    pub x: f32,
    /// Vertical axis position.
    pub y: f32,
}

impl From<usvg::tiny_skia_path::Point> for PointInSvgUnits {
    fn from(value: usvg::tiny_skia_path::Point) -> Self {
        PointInSvgUnits {
            x: value.x,
            y: value.y,
        }
    }
}

impl From<PointInSvgUnits> for Point {
    fn from(value: PointInSvgUnits) -> Self {
        point(value.x, value.y)
    }
}

/// Converts an SVG path into a lyon path in document space.
///
/// The path's absolute transform is applied first, so the result already accounts for the
/// transforms of its parent groups and the document's `viewBox` scaling.
///
/// # Returns
/// `None` if the transform leaves nothing drawable (for example a zero scale).
pub fn to_lyon_path(path: &Path) -> Option<LyonPath> {
    let data = path.data().clone().transform(path.abs_transform())?;

    let mut path_builder = LyonPath::builder();
    let mut open = false;
    let mut subpath_start = PointInSvgUnits { x: 0.0, y: 0.0 };
    for segment in data.segments() {
        // Drawing straight after a close continues from where that sub-path began.
        if !open && !matches!(segment, PathSegment::MoveTo(_) | PathSegment::Close) {
            path_builder.begin(subpath_start.into());
            open = true;
        }
        match segment {
            PathSegment::MoveTo(target) => {
                if open {
                    path_builder.end(false);
                }
                subpath_start = target.into();
                path_builder.begin(subpath_start.into());
                open = true;
            }
            PathSegment::LineTo(target) => {
                path_builder.line_to(PointInSvgUnits::from(target).into());
            }
            // The target point is the end of the curve, the control point is somewhere in the middle.
            PathSegment::QuadTo(control_point, target_point) => {
                path_builder.quadratic_bezier_to(
                    PointInSvgUnits::from(control_point).into(),
                    PointInSvgUnits::from(target_point).into(),
                );
            }
            // The target point is the end of the curve, the first control point is towards the beginning
            // of the curve, the second control point is towards the end of the curve.
            PathSegment::CubicTo(first_control_point, second_control_point, target_point) => {
                path_builder.cubic_bezier_to(
                    PointInSvgUnits::from(first_control_point).into(),
                    PointInSvgUnits::from(second_control_point).into(),
                    PointInSvgUnits::from(target_point).into(),
                );
            }
            PathSegment::Close => {
                if open {
                    path_builder.end(true);
                    open = false;
                }
            }
        }
    }

    if open {
        path_builder.end(false);
    }

    Some(path_builder.build())
}

/// The length of a single path, in SVG units.
pub fn path_length(path: &Path) -> f32 {
    to_lyon_path(path).map_or(0.0, |built_path| {
        approximate_length(built_path.iter(), LENGTH_TOLERANCE)
    })
}

/// The combined length of a set of paths, in SVG units.
pub fn total_length<'a>(paths: impl IntoIterator<Item = &'a Path>) -> f64 {
    paths
        .into_iter()
        .map(|path| f64::from(path_length(path)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svg::{get_visible_paths, parse_svg};

    fn measure(text: &str) -> f64 {
        let tree = parse_svg(std::path::Path::new("test.svg"), text.as_bytes()).unwrap();
        let paths = get_visible_paths(&tree);
        total_length(paths.iter().map(|path| &**path))
    }

    #[test]
    fn test_straight_lines() {
        let length = measure(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
                <path d="M0 0 H30 V40" stroke="black" fill="none"/>
            </svg>"#,
        );
        assert!((length - 70.0).abs() < 1e-3, "{length}");
    }

    #[test]
    fn test_closed_path_includes_closing_segment() {
        let length = measure(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
                <rect width="10" height="20" stroke="black" fill="none"/>
            </svg>"#,
        );
        assert!((length - 60.0).abs() < 1e-3, "{length}");
    }

    #[test]
    fn test_group_transforms_are_applied() {
        let length = measure(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
                <g transform="scale(2)"><path d="M0 0 H10" stroke="black"/></g>
            </svg>"#,
        );
        assert!((length - 20.0).abs() < 1e-3, "{length}");
    }

    #[test]
    fn test_curves_are_measured() {
        // A circle of radius 10 is 62.83 units around.
        let length = measure(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
                <circle cx="50" cy="50" r="10" stroke="black" fill="none"/>
            </svg>"#,
        );
        assert!((length - 62.83).abs() < 0.1, "{length}");
    }
}
