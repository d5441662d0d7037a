use crate::catalog::VariableCatalog;
use crate::config::{ColorKeying, MapConfig};
use crate::error::PassError;
use crate::render;
use crate::types::{
    Dataset, EncodedLayer, EncodedMarker, Extrema, ExtremaMap, FieldValue, Record, RenderOutcome,
    Selection,
};
use tracing::{debug, info, warn};

pub const MIN_RADIUS: f64 = 5.0;
pub const RADIUS_SPAN: f64 = 15.0;

pub const PALETTE: [&str; 7] = ["blue", "red", "green", "purple", "orange", "pink", "darkblue"];

/// Runs filter, normalization, encoding and assembly for one selection.
pub fn render_pass(
    dataset: &Dataset,
    selection: &Selection,
    catalog: &VariableCatalog,
    map: &MapConfig,
) -> Result<RenderOutcome, PassError> {
    if selection.fields.is_empty() {
        warn!("No variables selected, skipping map");
        return Ok(RenderOutcome::NoVariables);
    }
    if let Some(unknown) = selection.fields.iter().find(|f| dataset.column_kind(f).is_none()) {
        return Err(PassError::UnknownField(unknown.clone()));
    }

    let subset = filter_by_code(dataset, &selection.code);
    if subset.is_empty() {
        warn!(code = %selection.code, "No records match disease code");
        return Ok(RenderOutcome::NoMatches { code: selection.code.clone() });
    }

    let extrema = compute_extrema(dataset, &subset, &selection.fields);
    let layer = encode_markers(&subset, selection, &extrema, catalog, map.color_keying);

    if layer.skipped_without_location > 0 {
        warn!(
            code = %selection.code,
            skipped = layer.skipped_without_location,
            "Records without latitude/longitude left off the map"
        );
    }

    let skipped = layer.skipped_without_location;
    match render::assemble(layer, &subset, map) {
        Some(view) => {
            info!(
                code = %selection.code,
                records = subset.len(),
                markers = view.markers.len(),
                "Rendered map"
            );
            Ok(RenderOutcome::Rendered(view))
        }
        None => {
            warn!(code = %selection.code, "No record of the disease has a location");
            Ok(RenderOutcome::NoLocations { code: selection.code.clone(), skipped })
        }
    }
}

/// Records whose disease code equals `code` exactly, in dataset order.
pub fn filter_by_code<'a>(dataset: &'a Dataset, code: &str) -> Vec<&'a Record> {
    dataset.records.iter().filter(|r| r.code == code).collect()
}

/// Min and max of each selected numeric field over `subset`.
///
/// Text fields and fields with no value in the subset get no entry.
pub fn compute_extrema(dataset: &Dataset, subset: &[&Record], fields: &[String]) -> ExtremaMap {
    fields.iter()
        .filter(|f| dataset.is_numeric(f))
        .filter_map(|field| {
            let range = subset.iter()
                .filter_map(|r| r.number(field))
                .fold(None, |acc: Option<Extrema>, v| match acc {
                    None => Some(Extrema { min: v, max: v }),
                    Some(e) => Some(Extrema { min: e.min.min(v), max: e.max.max(v) }),
                })?;
            debug!(field = %field, min = range.min, max = range.max, "Computed extrema");
            Some((field.clone(), range))
        })
        .collect()
}

pub fn radius(value: f64, extrema: &Extrema) -> f64 {
    MIN_RADIUS + RADIUS_SPAN * extrema.fraction(value)
}

pub fn color_for(
    field: &str,
    position: usize,
    catalog: &VariableCatalog,
    keying: ColorKeying,
) -> &'static str {
    let index = match keying {
        ColorKeying::Position => position,
        ColorKeying::Identity => catalog.position(field).unwrap_or(position),
    };
    PALETTE[index % PALETTE.len()]
}

/// Builds the concentric circles and the shared popup of every located record.
pub fn encode_markers(
    subset: &[&Record],
    selection: &Selection,
    extrema: &ExtremaMap,
    catalog: &VariableCatalog,
    keying: ColorKeying,
) -> EncodedLayer {
    let mut layer = EncodedLayer::default();

    for record in subset {
        let Some(location) = record.location else {
            layer.skipped_without_location += 1;
            continue;
        };

        let popup = layer.popups.len();
        layer.popups.push(build_popup(record, selection, catalog));

        for (position, field) in selection.fields.iter().enumerate() {
            let (Some(value), Some(range)) = (record.number(field), extrema.get(field)) else {
                continue;
            };
            layer.markers.push(EncodedMarker {
                location,
                radius: radius(value, range),
                color: color_for(field, position, catalog, keying),
                field: field.clone(),
                popup,
            });
        }
    }

    layer
}

pub fn build_popup(record: &Record, selection: &Selection, catalog: &VariableCatalog) -> String {
    let mut html = String::from(r#"<div style="font-family: Arial; max-width: 300px;">"#);
    html.push_str(&format!(
        r#"<h4 style="margin-bottom: 5px;">{}</h4>"#,
        escape_html(&record.municipality)
    ));
    html.push_str(&popup_line("CID", &selection.code));
    html.push_str(&popup_line("Descrição", &record.description));

    for field in &selection.fields {
        let shown = match record.value(field) {
            Some(FieldValue::Number(v)) => format!("{:.2}", v),
            Some(FieldValue::Text(s)) => s.clone(),
            None => continue,
        };
        html.push_str(&popup_line(catalog.label(field), &shown));
    }

    html.push_str("</div>");
    html
}

fn popup_line(label: &str, value: &str) -> String {
    format!(
        r#"<p style="margin: 2px 0;"><b>{}:</b> {}</p>"#,
        escape_html(label),
        escape_html(value)
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
