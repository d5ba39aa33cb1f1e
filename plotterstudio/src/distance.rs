//! `distance`
//!
//! Estimates how far the pen will travel while drawing a design, for when the drawing tool
//! does not report it.

use std::path::Path;

use crate::{
    paths::total_length,
    svg::{get_visible_paths, parse_svg, SVG_UNITS_PER_MM},
};

/// Estimates the total drawn length of the design at `path`, in mm.
///
/// Lengths are measured in document space, after every transform including the `viewBox`
/// scaling, where one unit is one CSS pixel (96 per inch).
///
/// # Returns
/// `Some(0.0)` for a design with nothing to draw, `None` if the file cannot be read or parsed.
pub fn estimate_distance_mm(path: &Path) -> Option<f64> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("Unable to read {} for distance estimate: {err}", path.display());
            return None;
        }
    };
    estimate_svg_distance_mm(path, &bytes)
}

/// Estimates the total drawn length of an SVG document, in mm.
///
/// # Arguments
/// * `path`: Where the document lives, used to resolve linked resources.
/// * `bytes`: The document itself.
pub fn estimate_svg_distance_mm(path: &Path, bytes: &[u8]) -> Option<f64> {
    let tree = match parse_svg(path, bytes) {
        Ok(tree) => tree,
        Err(err) => {
            log::warn!("Unable to parse {} for distance estimate: {err}", path.display());
            return None;
        }
    };

    let paths = get_visible_paths(&tree);
    let length = total_length(paths.iter().map(|path| &**path));
    let distance_mm = length / f64::from(SVG_UNITS_PER_MM);
    log::debug!(
        "Estimated {distance_mm:.1} mm over {} paths in {}",
        paths.len(),
        path.display()
    );
    Some(distance_mm)
}

/// Estimates a drawing time from a distance and a pen-down speed.
///
/// The speed is a percentage of the plotter's maximum drawing rate of 35 mm/s, never taken to
/// be below 5 mm/s.
pub fn estimate_seconds(distance_mm: f64, speed_percent: u32) -> f64 {
    let mm_per_second = (f64::from(speed_percent) / 100.0 * 35.0).max(5.0);
    distance_mm / mm_per_second
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(text: &str) -> Option<f64> {
        estimate_svg_distance_mm(Path::new("design.svg"), text.as_bytes())
    }

    #[test]
    fn test_physical_units() {
        // 100 user units across a 100mm wide page.
        let distance = estimate(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100mm" height="50mm" viewBox="0 0 100 50">
                <path d="M0 10 H100" stroke="black"/>
            </svg>"#,
        )
        .unwrap();
        assert!((distance - 100.0).abs() < 0.01, "{distance}");
    }

    #[test]
    fn test_unitless_size_is_pixels() {
        let distance = estimate(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="192" height="96">
                <path d="M0 0 H96" stroke="black"/>
            </svg>"#,
        )
        .unwrap();
        assert!((distance - 25.4).abs() < 0.01, "{distance}");
    }

    #[test]
    fn test_empty_drawing_is_zero() {
        assert_eq!(
            estimate(r#"<svg xmlns="http://www.w3.org/2000/svg" width="10mm" height="10mm"/>"#),
            Some(0.0)
        );
    }

    #[test]
    fn test_unparseable_is_unknown() {
        assert_eq!(estimate("<svg"), None);
        assert_eq!(
            estimate_distance_mm(Path::new("/definitely/not/here.svg")),
            None
        );
    }

    #[test]
    fn test_estimate_seconds() {
        assert!((estimate_seconds(350.0, 100) - 10.0).abs() < 1e-9);
        // 10% of 35 mm/s is below the floor of 5 mm/s.
        assert!((estimate_seconds(50.0, 10) - 10.0).abs() < 1e-9);
    }
}
