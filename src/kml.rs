//! KML export of routes.

use std::fmt::Write;

use crate::Coordinate;

/// Render `coords` as a KML document holding one LineString placemark.
///
/// `color` is a KML `aabbggrr` hex string. Coordinates are written as
/// `lon, lat, 0.` in the given order.
///
/// # Example
/// ```
/// use sakura_run::{kml::coords_to_kml, Coordinate};
///
/// let kml = coords_to_kml(&[Coordinate::new(51.05, 3.72)], Some("ff0000ff"));
/// assert!(kml.contains("3.72, 51.05, 0."));
/// assert!(kml.contains("<color>ff0000ff</color>"));
/// ```
pub fn coords_to_kml(coords: &[Coordinate], color: Option<&str>) -> String {
    let mut kml = String::with_capacity(256 + coords.len() * 40);
    kml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    kml.push_str("<kml xmlns=\"http://earth.google.com/kml/2.0\"> <Document>\n");
    kml.push_str("<Placemark>\n");
    kml.push_str("<LineString> <coordinates>\n");
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            kml.push('\n');
        }
        // Writing into a String cannot fail
        let _ = write!(kml, "{}, {}, 0.", c.lon, c.lat);
    }
    kml.push_str("\n</coordinates> </LineString>\n");
    kml.push_str("<Style> <LineStyle>\n");
    if let Some(color) = color {
        let _ = writeln!(kml, "<color>{}</color>", escape(color));
    }
    kml.push_str("</LineStyle> </Style>\n");
    kml.push_str("</Placemark> </Document> </kml>");
    kml
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
