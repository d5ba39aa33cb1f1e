//! `svg`
//!
//! Reads the drawable geometry out of SVG documents.

use std::{path::Path, sync::Arc};

/// SVG user units per mm, at 96 units to the inch.
#[allow(clippy::excessive_precision)]
pub const SVG_UNITS_PER_MM: f32 = 3.779_527_559;

/// Size used for documents that declare neither a size nor a `viewBox`.
const DEFAULT_SIZE_PX: f32 = 1000.0;

/// Parses an SVG document.
///
/// No fonts are loaded, so text that has not been converted to outlines is dropped. The
/// plotter only draws paths, so nothing is lost that would have reached the paper.
///
/// # Arguments
/// * `path`: Where the document lives. Linked resources are looked up next to it.
/// * `bytes`: The document itself.
///
/// # Errors
/// Whatever `usvg` reports for a document it cannot make sense of.
#[allow(clippy::module_name_repetitions)]
pub fn parse_svg(path: &Path, bytes: &[u8]) -> Result<usvg::Tree, usvg::Error> {
    let options = usvg::Options {
        resources_dir: path.parent().map(Path::to_path_buf),
        default_size: usvg::Size::from_wh(DEFAULT_SIZE_PX, DEFAULT_SIZE_PX)
            .ok_or(usvg::Error::InvalidSize)?,
        fontdb: Arc::new(usvg::fontdb::Database::new()),
        ..usvg::Options::default()
    };
    usvg::Tree::from_data(bytes, &options)
}

/// Every visible path in the document, in document order.
pub fn get_visible_paths(svg: &usvg::Tree) -> Vec<Box<usvg::Path>> {
    let mut paths = Vec::new();
    collect_paths(svg.root(), &mut paths);
    paths
}

/// Appends the visible paths under `group` to `paths`, descending into nested groups and
/// into the sub-roots of patterns, masks and the like. Images and text are skipped.
#[allow(clippy::vec_box)]
fn collect_paths(group: &usvg::Group, paths: &mut Vec<Box<usvg::Path>>) {
    for child in group.children() {
        match child {
            usvg::Node::Group(child_group) => collect_paths(child_group, paths),
            usvg::Node::Path(path) => {
                if path.is_visible() {
                    paths.push(path.clone());
                }
            }
            usvg::Node::Image(_) | usvg::Node::Text(_) => {}
        }

        child.subroots(|subroot| collect_paths(subroot, paths));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> usvg::Tree {
        parse_svg(Path::new("test.svg"), text.as_bytes()).unwrap()
    }

    #[test]
    fn test_collects_nested_paths() {
        let tree = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
                <path d="M0 0 H5" stroke="black"/>
                <g><g><path d="M0 0 V5" stroke="red"/></g></g>
            </svg>"#,
        );
        assert_eq!(get_visible_paths(&tree).len(), 2);
    }

    #[test]
    fn test_skips_hidden_paths() {
        let tree = parse(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
                <path d="M0 0 H5" stroke="black" visibility="hidden"/>
                <text x="1" y="1">not drawn</text>
            </svg>"#,
        );
        assert!(get_visible_paths(&tree).is_empty());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_svg(Path::new("test.svg"), b"not an svg").is_err());
    }
}
