use std::{fs, path::Path};

use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use log::info;
use maud::{html, PreEscaped, DOCTYPE};
use serde::Serialize;
use serde_json::json;
use titlecase::titlecase;

use crate::{
    error::Result,
    model::{canonical_location, ClusterId, Coordinates},
    riders::RiderTable,
};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOptions {
    pub center: Coordinates,
    pub zoom: u8,
}

/// UCSD
pub const DEFAULT_CENTER: (f64, f64) = (32.8788, -117.2359);
pub const DEFAULT_ZOOM: u8 = 14;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    /// rider name
    pub popup: String,
    /// title-cased location
    pub tooltip: String,
    pub cluster: Option<ClusterId>,
}

/// One marker per rider with known coordinates, in table order.
pub fn markers(table: &RiderTable) -> Vec<Marker> {
    table
        .records()
        .iter()
        .filter_map(|record| {
            let coordinates = record.coordinates?;
            Some(Marker {
                lat: coordinates.latitude(),
                lon: coordinates.longitude(),
                popup: record.name.clone(),
                tooltip: titlecase(&canonical_location(&record.location)),
                cluster: record.cluster,
            })
        })
        .collect()
}

pub fn render_html(markers: &[Marker], options: &MapOptions) -> Result<String> {
    // keep "</script>" in rider names from closing the script element
    let data = serde_json::to_string(markers)?.replace("</", "<\\/");
    let center = json!([options.center.latitude(), options.center.longitude()]);

    let script = format!(
        r#"
const markers = {data};
const map = L.map("map").setView({center}, {zoom});
L.tileLayer("https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
    maxZoom: 19,
    attribution: '&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors',
}}).addTo(map);
const text = (s) => {{
    const span = document.createElement("span");
    span.textContent = s;
    return span;
}};
for (const m of markers) {{
    L.marker([m.lat, m.lon])
        .bindPopup(text(m.popup))
        .bindTooltip(text(m.tooltip))
        .addTo(map);
}}
"#,
        zoom = options.zoom,
    );

    let page = html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { "Riders" }
                link rel="stylesheet" href=(LEAFLET_CSS);
                script src=(LEAFLET_JS) {}
                style { "html, body, #map { height: 100%; margin: 0; }" }
            }
            body {
                div id="map" {}
                script { (PreEscaped(script)) }
            }
        }
    };

    Ok(page.into_string())
}

pub fn save_html(path: &Path, markers: &[Marker], options: &MapOptions) -> Result<()> {
    let page = render_html(markers, options)?;
    fs::write(path, page)?;
    info!(target: "map", "Wrote {} markers to {}", markers.len(), path.display());
    Ok(())
}

pub fn to_geojson(markers: &[Marker]) -> FeatureCollection {
    let features = markers
        .iter()
        .map(|marker| {
            let point = geo::Point::new(marker.lon, marker.lat);

            let mut properties = JsonObject::new();
            properties.insert("name".to_owned(), json!(marker.popup));
            properties.insert("location".to_owned(), json!(marker.tooltip));
            properties.insert("cluster".to_owned(), json!(marker.cluster));

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&point))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn save_geojson(path: &Path, markers: &[Marker]) -> Result<()> {
    let collection = to_geojson(markers);
    fs::write(path, collection.to_string())?;
    info!(target: "map", "Wrote {} features to {}", markers.len(), path.display());
    Ok(())
}
