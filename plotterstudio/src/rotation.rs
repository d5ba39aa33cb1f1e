//! `rotation`
//!
//! Quarter-turn rotation of SVG designs.
//!
//! A rotated design keeps all of its original content inside a single wrapper group directly
//! below the root. The first rotation records the document's original `viewBox`, `width` and
//! `height` on that group, and every rotation after that is computed from those recorded values
//! rather than from whatever the document currently shows. Rotating a design four times by 90
//! degrees therefore gives back exactly the original document frame, however many times the
//! file has been rewritten in between.
//!
//! Documents are rewritten as an event stream, so everything the rotation does not manage
//! (comments, namespaces, formatting, unknown elements) passes through untouched.

use std::{
    fmt,
    io::Write as _,
    path::Path,
    sync::LazyLock,
};

use quick_xml::{
    events::{attributes::Attribute, BytesStart, Event},
    Reader, Writer,
};
use regex::Regex;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::GeometryError;

/// `id` of the group holding the original content of a rotated design.
pub const ROTATION_WRAPPER_ID: &str = "plotterstudio-rotation-wrapper";
/// Cumulative rotation in degrees, one of 0, 90, 180 or 270.
pub const ROTATION_ANGLE_ATTR: &str = "data-plotterstudio-rotation";
/// The `viewBox` of the design before it was first rotated.
pub const ROTATION_BASE_VIEWBOX_ATTR: &str = "data-plotterstudio-base-viewbox";
/// The `width` of the design before it was first rotated.
pub const ROTATION_BASE_WIDTH_ATTR: &str = "data-plotterstudio-base-width";
/// The `height` of the design before it was first rotated.
pub const ROTATION_BASE_HEIGHT_ATTR: &str = "data-plotterstudio-base-height";

/// Attributes the rotation owns on the wrapper group, rewritten on every rotation.
const MANAGED_WRAPPER_ATTRS: [&str; 5] = [
    ROTATION_ANGLE_ATTR,
    ROTATION_BASE_VIEWBOX_ATTR,
    ROTATION_BASE_WIDTH_ATTR,
    ROTATION_BASE_HEIGHT_ATTR,
    "transform",
];

/// Attributes the rotation owns on the root element.
const MANAGED_ROOT_ATTRS: [&str; 3] = ["viewBox", "width", "height"];

static LENGTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?(?:\d+\.\d+|\d+|\.\d+)(?:[eE][+-]?\d+)?)([a-zA-Z%]*)$")
        .expect("valid length pattern")
});

/// A rotation by a multiple of 90 degrees, clockwise as seen on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuarterTurn {
    /// No rotation.
    #[default]
    Zero,
    /// 90 degrees.
    Quarter,
    /// 180 degrees.
    Half,
    /// 270 degrees.
    ThreeQuarters,
}

impl QuarterTurn {
    /// Normalizes any multiple of 90 degrees, including negative ones.
    ///
    /// # Examples
    /// ```
    /// use plotterstudio::QuarterTurn;
    ///
    /// assert_eq!(QuarterTurn::from_degrees(450), Some(QuarterTurn::Quarter));
    /// assert_eq!(QuarterTurn::from_degrees(-90), Some(QuarterTurn::ThreeQuarters));
    /// assert_eq!(QuarterTurn::from_degrees(45), None);
    /// ```
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(QuarterTurn::Zero),
            90 => Some(QuarterTurn::Quarter),
            180 => Some(QuarterTurn::Half),
            270 => Some(QuarterTurn::ThreeQuarters),
            _ => None,
        }
    }

    /// The rotation in degrees, in `0..360`.
    pub fn degrees(self) -> u16 {
        match self {
            QuarterTurn::Zero => 0,
            QuarterTurn::Quarter => 90,
            QuarterTurn::Half => 180,
            QuarterTurn::ThreeQuarters => 270,
        }
    }

    /// Applies `self` followed by `other`.
    #[must_use]
    pub fn then(self, other: QuarterTurn) -> QuarterTurn {
        let total = i64::from(self.degrees()) + i64::from(other.degrees());
        QuarterTurn::from_degrees(total).unwrap_or_default()
    }

    /// Whether the rotation exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, QuarterTurn::Quarter | QuarterTurn::ThreeQuarters)
    }

    /// `(cos, sin)` of the rotation, exact.
    fn cos_sin(self) -> (f64, f64) {
        match self {
            QuarterTurn::Zero => (1.0, 0.0),
            QuarterTurn::Quarter => (0.0, 1.0),
            QuarterTurn::Half => (-1.0, 0.0),
            QuarterTurn::ThreeQuarters => (0.0, -1.0),
        }
    }
}

impl fmt::Display for QuarterTurn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// An SVG `viewBox`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    /// Left edge.
    pub min_x: f64,
    /// Top edge.
    pub min_y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl ViewBox {
    /// Parses four numbers separated by whitespace and/or commas.
    pub fn parse(text: &str) -> Option<Self> {
        let mut numbers = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<f64>().ok().filter(|n| n.is_finite()));
        let view_box = ViewBox {
            min_x: numbers.next()??,
            min_y: numbers.next()??,
            width: numbers.next()??,
            height: numbers.next()??,
        };
        numbers.next().is_none().then_some(view_box)
    }

    /// The centre of the box.
    pub fn centre(&self) -> (f64, f64) {
        (
            self.min_x + self.width / 2.0,
            self.min_y + self.height / 2.0,
        )
    }

    /// The axis-aligned box enclosing this box rotated by `turn` about its centre.
    #[must_use]
    pub fn rotated(&self, turn: QuarterTurn) -> ViewBox {
        if turn == QuarterTurn::Zero {
            return *self;
        }

        let (cx, cy) = self.centre();
        let (cos, sin) = turn.cos_sin();
        let corners = [
            (self.min_x, self.min_y),
            (self.min_x + self.width, self.min_y),
            (self.min_x, self.min_y + self.height),
            (self.min_x + self.width, self.min_y + self.height),
        ]
        .map(|(x, y)| {
            let (dx, dy) = (x - cx, y - cy);
            (cos * dx - sin * dy + cx, sin * dx + cos * dy + cy)
        });

        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        // + 0.0 folds negative zero into zero
        ViewBox {
            min_x: min_x + 0.0,
            min_y: min_y + 0.0,
            width: max_x - min_x + 0.0,
            height: max_y - min_y + 0.0,
        }
    }

    /// The recorded form, shortest round-trip decimals.
    fn to_metadata_string(self) -> String {
        format!(
            "{:?} {:?} {:?} {:?}",
            self.min_x, self.min_y, self.width, self.height
        )
    }
}

impl fmt::Display for ViewBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6} {:.6} {:.6} {:.6}",
            self.min_x, self.min_y, self.width, self.height
        )
    }
}

/// Converts an SVG length to CSS pixels. Percentages and unknown units give `None`.
pub fn parse_length_to_px(value: &str) -> Option<f64> {
    let captures = LENGTH_RE.captures(value.trim())?;
    let number: f64 = captures[1].parse().ok()?;
    let factor = match captures[2].to_ascii_lowercase().as_str() {
        "" | "px" => 1.0,
        "mm" => 96.0 / 25.4,
        "cm" => 96.0 / 2.54,
        "in" => 96.0,
        "pt" => 96.0 / 72.0,
        _ => return None,
    };
    Some(number * factor)
}

/// Rotation bookkeeping stored on the wrapper group.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationMetadata {
    /// The `viewBox` before the first rotation.
    pub base_view_box: ViewBox,
    /// The `width` before the first rotation, `None` if it was never recorded.
    pub base_width: Option<String>,
    /// The `height` before the first rotation, `None` if it was never recorded.
    pub base_height: Option<String>,
    /// Rotation applied so far.
    pub angle: QuarterTurn,
}

impl RotationMetadata {
    /// Metadata for a design that has not been rotated yet.
    fn first(view_box: ViewBox, root: &RootInfo) -> Self {
        RotationMetadata {
            base_view_box: view_box,
            base_width: Some(root.width.clone().unwrap_or_default()),
            base_height: Some(root.height.clone().unwrap_or_default()),
            angle: QuarterTurn::Zero,
        }
    }

    /// Reads the metadata from the wrapper's attributes.
    ///
    /// # Returns
    /// `Ok(None)` if no base `viewBox` has been recorded yet.
    fn from_wrapper(wrapper: &WrapperInfo) -> Result<Option<Self>, GeometryError> {
        let Some(raw_view_box) = &wrapper.base_view_box else {
            return Ok(None);
        };
        let base_view_box = ViewBox::parse(raw_view_box).ok_or_else(|| {
            GeometryError::InvalidMetadata(format!("base viewBox '{raw_view_box}'"))
        })?;

        let angle = match wrapper.angle.as_deref().map(str::trim) {
            None | Some("") => QuarterTurn::Zero,
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .and_then(QuarterTurn::from_degrees)
                .ok_or_else(|| GeometryError::InvalidMetadata(format!("rotation '{raw}'")))?,
        };

        Ok(Some(RotationMetadata {
            base_view_box,
            base_width: wrapper.base_width.clone(),
            base_height: wrapper.base_height.clone(),
            angle,
        }))
    }

    /// The attributes written onto the wrapper, in order.
    fn to_attributes(&self, root: &RootInfo) -> Vec<(&'static str, String)> {
        let mut attributes = vec![(
            ROTATION_BASE_VIEWBOX_ATTR,
            self.base_view_box.to_metadata_string(),
        )];
        attributes.push((
            ROTATION_BASE_WIDTH_ATTR,
            self.base_width(root).unwrap_or_default(),
        ));
        attributes.push((
            ROTATION_BASE_HEIGHT_ATTR,
            self.base_height(root).unwrap_or_default(),
        ));
        attributes.push((ROTATION_ANGLE_ATTR, self.angle.to_string()));
        if self.angle != QuarterTurn::Zero {
            let (cx, cy) = self.base_view_box.centre();
            attributes.push(("transform", format!("rotate({},{cx:?},{cy:?})", self.angle)));
        }
        attributes
    }

    /// The recorded width, or the document's current one if none was recorded.
    fn base_width(&self, root: &RootInfo) -> Option<String> {
        self.base_width.clone().or_else(|| root.width.clone())
    }

    /// The recorded height, or the document's current one if none was recorded.
    fn base_height(&self, root: &RootInfo) -> Option<String> {
        self.base_height.clone().or_else(|| root.height.clone())
    }
}

/// What the rotation needs to know about the root element.
#[derive(Debug, Default)]
struct RootInfo {
    /// Namespace prefix of the root, including the trailing `:`.
    prefix: String,
    view_box: Option<String>,
    width: Option<String>,
    height: Option<String>,
}

/// What the rotation needs to know about an existing wrapper group.
#[derive(Debug, Default)]
struct WrapperInfo {
    base_view_box: Option<String>,
    base_width: Option<String>,
    base_height: Option<String>,
    angle: Option<String>,
}

/// The result of reading a document before rewriting it.
#[derive(Debug)]
struct Inspection {
    root: RootInfo,
    wrapper: Option<WrapperInfo>,
}

impl Inspection {
    /// The qualified name of the wrapper group.
    fn wrapper_name(&self) -> String {
        format!("{}g", self.root.prefix)
    }
}

/// Whether an element is the rotation wrapper.
fn is_wrapper(
    element: &BytesStart<'_>,
    wrapper_name: &str,
    reader: &Reader<&[u8]>,
) -> Result<bool, GeometryError> {
    if element.name().as_ref() != wrapper_name.as_bytes() {
        return Ok(false);
    }
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() == b"id" {
            let id = attribute.decode_and_unescape_value(reader.decoder())?;
            return Ok(id == ROTATION_WRAPPER_ID);
        }
    }
    Ok(false)
}

/// Reads the root element and the wrapper group, if there is one.
fn inspect(text: &str) -> Result<Inspection, GeometryError> {
    let mut reader = Reader::from_str(text);
    let mut root = None;
    let mut wrapper = None;
    let mut wrapper_name = String::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(element) | Event::Empty(element) => {
                if depth == 0 {
                    if root.is_some() {
                        return Err(GeometryError::Malformed(
                            "more than one root element".to_string(),
                        ));
                    }
                    let info = read_root(element, &reader)?;
                    wrapper_name = format!("{}g", info.prefix);
                    root = Some(info);
                } else if depth == 1
                    && wrapper.is_none()
                    && is_wrapper(element, &wrapper_name, &reader)?
                {
                    wrapper = Some(read_wrapper(element, &reader)?);
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(GeometryError::Malformed("unclosed element".to_string()));
    }
    let root =
        root.ok_or_else(|| GeometryError::Malformed("document has no root element".to_string()))?;
    Ok(Inspection { root, wrapper })
}

fn read_root(element: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<RootInfo, GeometryError> {
    if element.local_name().as_ref() != b"svg" {
        return Err(GeometryError::Malformed(
            "root element is not <svg>".to_string(),
        ));
    }

    let mut info = RootInfo::default();
    if let Some(prefix) = element.name().prefix() {
        let prefix = std::str::from_utf8(prefix.as_ref())
            .map_err(|err| GeometryError::Malformed(err.to_string()))?;
        info.prefix = format!("{prefix}:");
    }
    for attribute in element.attributes() {
        let attribute = attribute?;
        let slot = match attribute.key.as_ref() {
            b"viewBox" => &mut info.view_box,
            b"width" => &mut info.width,
            b"height" => &mut info.height,
            _ => continue,
        };
        *slot = Some(
            attribute
                .decode_and_unescape_value(reader.decoder())?
                .into_owned(),
        );
    }
    Ok(info)
}

fn read_wrapper(
    element: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<WrapperInfo, GeometryError> {
    let mut info = WrapperInfo::default();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let slot = match attribute.key.as_ref() {
            key if key == ROTATION_BASE_VIEWBOX_ATTR.as_bytes() => &mut info.base_view_box,
            key if key == ROTATION_BASE_WIDTH_ATTR.as_bytes() => &mut info.base_width,
            key if key == ROTATION_BASE_HEIGHT_ATTR.as_bytes() => &mut info.base_height,
            key if key == ROTATION_ANGLE_ATTR.as_bytes() => &mut info.angle,
            _ => continue,
        };
        *slot = Some(
            attribute
                .decode_and_unescape_value(reader.decoder())?
                .into_owned(),
        );
    }
    Ok(info)
}

/// The document frame after a rotation.
#[derive(Debug)]
struct Frame {
    view_box: ViewBox,
    width: Option<String>,
    height: Option<String>,
}

impl Frame {
    /// The new value of a managed root attribute, `None` to remove it.
    fn value_of(&self, key: &[u8]) -> Option<String> {
        match key {
            b"viewBox" => Some(self.view_box.to_string()),
            b"width" => self.width.clone().filter(|width| !width.is_empty()),
            b"height" => self.height.clone().filter(|height| !height.is_empty()),
            _ => None,
        }
    }
}

/// Works out the new metadata and document frame.
fn plan(
    inspection: &Inspection,
    turn: QuarterTurn,
) -> Result<(RotationMetadata, Frame), GeometryError> {
    let root = &inspection.root;
    let existing = match &inspection.wrapper {
        Some(wrapper) => RotationMetadata::from_wrapper(wrapper)?,
        None => None,
    };
    let mut metadata = match existing {
        Some(metadata) => metadata,
        None => RotationMetadata::first(current_view_box(root)?, root),
    };
    metadata.angle = metadata.angle.then(turn);

    let (base_width, base_height) = (metadata.base_width(root), metadata.base_height(root));
    let (width, height) = if metadata.angle.swaps_axes() {
        (base_height, base_width)
    } else {
        (base_width, base_height)
    };
    let frame = Frame {
        view_box: metadata.base_view_box.rotated(metadata.angle),
        width,
        height,
    };
    Ok((metadata, frame))
}

/// The document's `viewBox`, derived from its width and height if it has none.
fn current_view_box(root: &RootInfo) -> Result<ViewBox, GeometryError> {
    if let Some(view_box) = root.view_box.as_deref().and_then(ViewBox::parse) {
        return Ok(view_box);
    }
    let width = root.width.as_deref().and_then(parse_length_to_px);
    let height = root.height.as_deref().and_then(parse_length_to_px);
    match (width, height) {
        (Some(width), Some(height)) => Ok(ViewBox {
            min_x: 0.0,
            min_y: 0.0,
            width,
            height,
        }),
        _ => Err(GeometryError::UnknownDimensions),
    }
}

/// Copies `element` with its managed attributes replaced.
fn rewrite_root(
    element: &BytesStart<'_>,
    frame: &Frame,
) -> Result<BytesStart<'static>, GeometryError> {
    let mut rewritten = element.to_owned();
    rewritten.clear_attributes();

    let mut seen = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let key = attribute.key.as_ref();
        if let Some(managed) = MANAGED_ROOT_ATTRS
            .iter()
            .find(|name| name.as_bytes() == key)
        {
            seen.push(*managed);
            if let Some(value) = frame.value_of(key) {
                rewritten.push_attribute((*managed, value.as_str()));
            }
        } else {
            rewritten.push_attribute(attribute);
        }
    }
    for managed in MANAGED_ROOT_ATTRS {
        if !seen.contains(&managed) {
            if let Some(value) = frame.value_of(managed.as_bytes()) {
                rewritten.push_attribute((managed, value.as_str()));
            }
        }
    }
    Ok(rewritten)
}

/// Copies the wrapper with the rotation's own attributes replaced.
fn rewrite_wrapper(
    element: &BytesStart<'_>,
    metadata: &RotationMetadata,
    root: &RootInfo,
) -> Result<BytesStart<'static>, GeometryError> {
    let mut rewritten = element.to_owned();
    rewritten.clear_attributes();
    for attribute in element.attributes() {
        let attribute: Attribute<'_> = attribute?;
        let key = attribute.key.as_ref();
        if !MANAGED_WRAPPER_ATTRS
            .iter()
            .any(|name| name.as_bytes() == key)
        {
            rewritten.push_attribute(attribute);
        }
    }
    for (name, value) in metadata.to_attributes(root) {
        rewritten.push_attribute((name, value.as_str()));
    }
    Ok(rewritten)
}

/// A fresh wrapper group.
fn new_wrapper(inspection: &Inspection, metadata: &RotationMetadata) -> BytesStart<'static> {
    let mut wrapper = BytesStart::new(inspection.wrapper_name());
    wrapper.push_attribute(("id", ROTATION_WRAPPER_ID));
    for (name, value) in metadata.to_attributes(&inspection.root) {
        wrapper.push_attribute((name, value.as_str()));
    }
    wrapper
}

/// Rewrites `text` rotated by a further `turn`.
///
/// # Returns
/// The new document and the cumulative rotation it now carries.
fn rewrite(text: &str, turn: QuarterTurn) -> Result<(String, QuarterTurn), GeometryError> {
    let inspection = inspect(text)?;
    let (metadata, frame) = plan(&inspection, turn)?;
    let wrapper_name = inspection.wrapper_name();
    let insert_wrapper = inspection.wrapper.is_none();

    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::with_capacity(text.len() + 256));
    let mut depth = 0usize;
    let mut wrapper_done = false;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(element) if depth == 0 => {
                writer.write_event(Event::Start(rewrite_root(&element, &frame)?))?;
                if insert_wrapper {
                    writer.write_event(Event::Start(new_wrapper(&inspection, &metadata)))?;
                }
                depth += 1;
            }
            Event::Empty(element) if depth == 0 => {
                let root = rewrite_root(&element, &frame)?;
                let end = root.to_end().into_owned();
                writer.write_event(Event::Start(root))?;
                writer.write_event(Event::Empty(new_wrapper(&inspection, &metadata)))?;
                writer.write_event(Event::End(end))?;
            }
            Event::Start(element)
                if depth == 1 && !wrapper_done && is_wrapper(&element, &wrapper_name, &reader)? =>
            {
                wrapper_done = true;
                let rewritten = rewrite_wrapper(&element, &metadata, &inspection.root)?;
                writer.write_event(Event::Start(rewritten))?;
                depth += 1;
            }
            Event::Empty(element)
                if depth == 1 && !wrapper_done && is_wrapper(&element, &wrapper_name, &reader)? =>
            {
                wrapper_done = true;
                let rewritten = rewrite_wrapper(&element, &metadata, &inspection.root)?;
                writer.write_event(Event::Empty(rewritten))?;
            }
            Event::Start(element) => {
                writer.write_event(Event::Start(element))?;
                depth += 1;
            }
            Event::End(element) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && insert_wrapper {
                    let wrapper = BytesStart::new(wrapper_name.as_str());
                    writer.write_event(Event::End(wrapper.to_end()))?;
                }
                writer.write_event(Event::End(element))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    let bytes = writer.into_inner();
    let text = String::from_utf8(bytes).map_err(|err| GeometryError::Malformed(err.to_string()))?;
    Ok((text, metadata.angle))
}

/// Rotates an SVG document by a further `turn`.
///
/// # Returns
/// `None` for [`QuarterTurn::Zero`], the document is left as it is.
///
/// # Errors
/// If the document is not well-formed SVG, its size cannot be determined, or its rotation
/// metadata cannot be read.
pub fn rotate_svg(text: &str, turn: QuarterTurn) -> Result<Option<String>, GeometryError> {
    if turn == QuarterTurn::Zero {
        return Ok(None);
    }
    rewrite(text, turn).map(|(text, _)| Some(text))
}

/// The result of rotating a design on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    /// Whether the file was rewritten.
    pub rotated: bool,
    /// The design's cumulative rotation in degrees, `None` if the file was not read.
    pub angle: Option<u16>,
}

/// Rotates the design at `path` by `degrees`, writing the result back in place.
///
/// A rotation of zero (after normalization) neither reads nor writes the file. The new document
/// is written to a temporary file next to the original and moved over it, so the design is
/// never left half written.
///
/// # Errors
/// [`GeometryError::InvalidAngle`] if `degrees` is not a multiple of 90, or any error from
/// [`rotate_svg`] or from reading and writing the file.
pub fn rotate_svg_file(path: &Path, degrees: i64) -> Result<RotationOutcome, GeometryError> {
    let turn = QuarterTurn::from_degrees(degrees).ok_or(GeometryError::InvalidAngle(degrees))?;
    if turn == QuarterTurn::Zero {
        return Ok(RotationOutcome {
            rotated: false,
            angle: None,
        });
    }

    let text = std::fs::read_to_string(path)?;
    let (rotated, angle) = rewrite(&text, turn)?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = std::fs::metadata(path)?.permissions();
    let mut file = NamedTempFile::new_in(directory)?;
    // The temporary file starts out private; the design keeps its own mode.
    file.as_file().set_permissions(permissions)?;
    file.write_all(rotated.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| GeometryError::Io(err.into()))?;

    log::info!("Rotated {} to {angle} degrees", path.display());
    Ok(RotationOutcome {
        rotated: true,
        angle: Some(angle.degrees()),
    })
}
