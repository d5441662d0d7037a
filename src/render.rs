use crate::config::MapConfig;
use crate::types::{EncodedLayer, MapView, Record};
use anyhow::{Context, Result};
use geo::{Centroid, MultiPoint};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde::Serialize;
use std::fs;
use std::path::Path;

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

/// Places the encoded layer on a base map centered on the mean location of
/// the subset. Returns `None` when no record of the subset has a location.
pub fn assemble(layer: EncodedLayer, subset: &[&Record], map: &MapConfig) -> Option<MapView> {
    let points: MultiPoint<f64> = subset.iter().filter_map(|r| r.location).collect();
    let center = points.centroid()?;

    Some(MapView {
        center,
        zoom: map.zoom,
        layer_name: map.layer_name.clone(),
        markers: layer.markers,
        popups: layer.popups,
        skipped_without_location: layer.skipped_without_location,
    })
}

/// JSON shape consumed by the browser side drawing code.
#[derive(Debug, Serialize)]
pub struct MapPayload<'a> {
    pub center: [f64; 2],
    pub zoom: u8,
    pub tiles_url: &'a str,
    pub tiles_attribution: &'a str,
    pub layer_name: &'a str,
    pub fill_opacity: f64,
    pub popup_max_width: u32,
    pub popups: &'a [String],
    pub markers: Vec<MarkerPayload<'a>>,
    pub skipped_without_location: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkerPayload<'a> {
    pub location: [f64; 2],
    pub radius: f64,
    pub color: &'a str,
    pub field: &'a str,
    pub popup: usize,
}

pub fn payload<'a>(view: &'a MapView, map: &'a MapConfig) -> MapPayload<'a> {
    MapPayload {
        center: [view.center.y(), view.center.x()],
        zoom: view.zoom,
        tiles_url: &map.tiles_url,
        tiles_attribution: &map.tiles_attribution,
        layer_name: &view.layer_name,
        fill_opacity: map.fill_opacity,
        popup_max_width: map.popup_max_width,
        popups: &view.popups,
        markers: view.markers.iter().map(|m| MarkerPayload {
            location: [m.location.y(), m.location.x()],
            radius: m.radius,
            color: m.color,
            field: &m.field,
            popup: m.popup,
        }).collect(),
        skipped_without_location: view.skipped_without_location,
    }
}

/// Markers as point features, one per circle, popup HTML inlined.
pub fn to_geojson(view: &MapView) -> FeatureCollection {
    let features = view.markers.iter().map(|m| {
        let mut feature = Feature::from(Geometry::new(Value::Point(vec![m.location.x(), m.location.y()])));
        feature.set_property("field", m.field.clone());
        feature.set_property("radius", m.radius);
        feature.set_property("color", m.color);
        feature.set_property(
            "popup",
            view.popups.get(m.popup).cloned().unwrap_or_default(),
        );
        feature
    }).collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Leaflet code shared by the standalone document and the dashboard page.
/// Defines `drawMap(container, payload)` which returns the Leaflet map.
pub const DRAW_SCRIPT: &str = r#"
function drawMap(container, data) {
    var map = L.map(container).setView(data.center, data.zoom);
    L.tileLayer(data.tiles_url, { attribution: data.tiles_attribution, subdomains: 'abcd', maxZoom: 20 }).addTo(map);
    var group = L.featureGroup();
    data.markers.forEach(function (m) {
        L.circleMarker(m.location, {
            radius: m.radius,
            color: m.color,
            fill: true,
            fillOpacity: data.fill_opacity,
            stroke: false
        }).bindPopup(data.popups[m.popup], { maxWidth: data.popup_max_width }).addTo(group);
    });
    group.addTo(map);
    var overlays = {};
    overlays[data.layer_name] = group;
    L.control.layers(null, overlays).addTo(map);
    return map;
}
"#;

pub fn render_html(view: &MapView, map: &MapConfig, title: &str) -> Result<String> {
    let data = serde_json::to_string(&payload(view, map))
        .context("Failed to serialize map payload")?
        // Keep popup markup from closing the surrounding script element.
        .replace("</", "<\\/");

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <link rel="stylesheet" href="{css}">
    <script src="{js}"></script>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 1rem; }}
        #map {{ width: {width}px; height: {height}px; }}
    </style>
</head>
<body>
    <h2>{title}</h2>
    <div id="map"></div>
    <script>
{script}
drawMap('map', {data});
    </script>
</body>
</html>
"#,
        title = crate::processing::escape_html(title),
        css = LEAFLET_CSS,
        js = LEAFLET_JS,
        width = map.width,
        height = map.height,
        script = DRAW_SCRIPT,
        data = data,
    ))
}

pub fn write_html(path: &Path, view: &MapView, map: &MapConfig, title: &str) -> Result<()> {
    let html = render_html(view, map, title)?;
    fs::write(path, html).with_context(|| format!("Failed to write map to {:?}", path))?;
    Ok(())
}

pub fn leaflet_assets() -> (&'static str, &'static str) {
    (LEAFLET_CSS, LEAFLET_JS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncodedMarker;
    use geo::Point;
    use std::collections::HashMap;

    fn located(lat: f64, lon: f64) -> Record {
        Record {
            code: "A00".to_string(),
            description: "Colera".to_string(),
            municipality: "Cacoal".to_string(),
            location: Some(Point::new(lon, lat)),
            fields: HashMap::new(),
        }
    }

    fn layer() -> EncodedLayer {
        let marker = |radius: f64, color: &'static str, field: &str| EncodedMarker {
            location: Point::new(-61.0, -11.0),
            radius,
            color,
            field: field.to_string(),
            popup: 0,
        };
        EncodedLayer {
            markers: vec![
                marker(20.0, "blue", "ocorrencias_da_doenca"),
                marker(5.0, "red", "media_idade"),
            ],
            popups: vec!["<div><h4>Cacoal</h4></div>".to_string()],
            skipped_without_location: 2,
        }
    }

    #[test]
    fn centers_on_mean_location() {
        let a = located(-10.0, -60.0);
        let b = located(-12.0, -64.0);
        let mut unlocated = located(0.0, 0.0);
        unlocated.location = None;

        let view = assemble(layer(), &[&a, &b, &unlocated], &MapConfig::default()).unwrap();

        assert_eq!(view.center, Point::new(-62.0, -11.0));
        assert_eq!(view.zoom, 6);
        assert_eq!(view.layer_name, "Dados SUS");
        assert_eq!(view.markers.len(), 2);
        assert_eq!(view.skipped_without_location, 2);
    }

    #[test]
    fn empty_subset_has_no_center() {
        assert!(assemble(EncodedLayer::default(), &[], &MapConfig::default()).is_none());
    }

    #[test]
    fn html_embeds_markers_and_layer_control() {
        let a = located(-11.0, -61.0);
        let map = MapConfig::default();
        let view = assemble(layer(), &[&a], &map).unwrap();

        let html = render_html(&view, &map, "CID A00 - Colera").unwrap();

        assert!(html.contains("drawMap('map', {"));
        assert!(html.contains("L.control.layers"));
        assert!(html.contains(r#""center":[-11.0,-61.0]"#));
        assert!(html.contains(r#""color":"blue""#));
        assert!(html.contains(r#""layer_name":"Dados SUS""#));
        assert!(html.contains("<\\/h4>"));
        assert!(html.contains("width: 1000px; height: 700px;"));
    }

    #[test]
    fn geojson_has_one_feature_per_circle() {
        let a = located(-11.0, -61.0);
        let view = assemble(layer(), &[&a], &MapConfig::default()).unwrap();

        let collection = to_geojson(&view);

        assert_eq!(collection.features.len(), 2);
        let first = &collection.features[0];
        assert_eq!(first.property("field").and_then(|v| v.as_str()), Some("ocorrencias_da_doenca"));
        assert_eq!(first.property("radius").and_then(|v| v.as_f64()), Some(20.0));
        assert_eq!(
            first.property("popup").and_then(|v| v.as_str()),
            Some("<div><h4>Cacoal</h4></div>")
        );
    }
}
