//! SVG export serializer.
//!
//! Converts a [`TracedDocument`] into an SVG string using the [`svg`]
//! crate for document construction, XML escaping and path data
//! formatting.
//!
//! The document is sized in millimetres and its `viewBox` is the placed
//! image frame, so one user unit is one millimetre and the traced
//! content sits centred around the origin. Each layer becomes a `<g>`
//! carrying its paint; each contour becomes a closed `<path>` (`M`, then
//! `L` per vertex, then `z`).
//!
//! Optional [`SvgMetadata`] embeds `<title>`, `<desc>` and the serialized
//! trace options for reproducibility.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Group, Path, Title};
use svg::node::{Node, Text, Value};

use tracery_pipeline::{Contour, FillRule, Layer, LayerStyle, TracedDocument};

/// Namespace of the `<tracery:options>` metadata element.
pub const METADATA_NAMESPACE: &str = "https://tracery.dev/ns/1";

/// Metadata to embed in the SVG document.
///
/// Every field is optional. Text values are XML-escaped automatically by
/// the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    ///
    /// Typically the source image filename (without extension).
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized trace options JSON, emitted inside a `<metadata>`
    /// element wrapped in a namespaced `<tracery:options>` element.
    pub options_json: Option<&'a str>,
}

/// Build a closed SVG path `d` attribute string from a contour.
///
/// Returns an empty string for contours with fewer than 2 points.
///
/// Coordinates are formatted by the [`svg`] crate using `f32` precision,
/// which is well below a laser's positioning resolution in millimetres.
///
/// # Examples
///
/// ```
/// use tracery_pipeline::{Contour, Point};
/// use tracery_export::build_path_data;
///
/// let contour = Contour::new(vec![
///     Point::new(0.0, 0.0),
///     Point::new(4.0, 0.0),
///     Point::new(4.0, 3.0),
/// ]);
/// assert_eq!(build_path_data(&contour), "M0,0 L4,0 L4,3 z");
/// ```
#[must_use]
pub fn build_path_data(contour: &Contour) -> String {
    let points = contour.points();
    let Some((first, rest)) = points.split_first() else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }

    let mut data = Data::new().move_to((first.x, first.y));
    for p in rest {
        data = data.line_to((p.x, p.y));
    }
    String::from(Value::from(data.close()))
}

/// CSS hex colour for a gray level.
fn gray_hex(gray: u8) -> String {
    format!("#{gray:02x}{gray:02x}{gray:02x}")
}

/// `<g>` element carrying `layer`'s paint with one `<path>` per contour.
fn layer_group(layer: &Layer) -> Group {
    let group = Group::new().set("data-threshold", u32::from(layer.threshold));
    let mut group = match layer.style {
        LayerStyle::Fill { gray, rule } => group
            .set("fill", gray_hex(gray))
            .set(
                "fill-rule",
                match rule {
                    FillRule::NonZero => "nonzero",
                    FillRule::EvenOdd => "evenodd",
                },
            )
            .set("stroke", "none"),
        LayerStyle::Stroke { width_mm } => group
            .set("fill", "none")
            .set("stroke", "#000000")
            .set("stroke-width", width_mm),
    };

    for contour in &layer.contours {
        let d = build_path_data(contour);
        if d.is_empty() {
            continue;
        }
        group = group.add(Path::new().set("d", d));
    }
    group
}

/// Serialize a traced document into an SVG document string.
///
/// Layers are emitted in the document's drawing order so later layers
/// paint over earlier ones.
///
/// # Examples
///
/// ```
/// use tracery_pipeline::{Bitmap, RgbaImage, TraceOptions, trace};
/// use tracery_export::{SvgMetadata, to_svg};
///
/// let img = RgbaImage::from_fn(20, 20, |x, y| {
///     let inside = (5..15).contains(&x) && (5..15).contains(&y);
///     let v = if inside { 0 } else { 255 };
///     image::Rgba([v, v, v, 255])
/// });
/// let doc = trace(&Bitmap::from_image(img).unwrap(), &TraceOptions::default()).unwrap();
/// let metadata = SvgMetadata {
///     title: Some("square"),
///     ..SvgMetadata::default()
/// };
/// let svg = to_svg(&doc, &metadata);
/// assert!(svg.contains("<title>square</title>"));
/// assert_eq!(svg.matches("<path").count(), 1);
/// ```
#[must_use]
pub fn to_svg(document: &TracedDocument, metadata: &SvgMetadata<'_>) -> String {
    let placement = &document.placement;
    let frame = placement.frame;
    let mut doc = Document::new()
        .set("width", format!("{}mm", placement.width_mm()))
        .set("height", format!("{}mm", placement.height_mm()))
        .set(
            "viewBox",
            (frame.min_x, frame.min_y, frame.width(), frame.height()),
        );

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(options_json) = metadata.options_json {
        let mut options_el = Element::new("tracery:options");
        options_el.assign("xmlns:tracery", METADATA_NAMESPACE);
        options_el.append(Text::new(options_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(options_el);
        doc = doc.add(metadata_el);
    }

    for layer in &document.layers {
        doc = doc.add(layer_group(layer));
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
