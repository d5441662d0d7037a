use crate::catalog::{self, CatalogEntry, VariableCatalog};
use crate::config::AppConfig;
use crate::error::MapRequestError;
use crate::processing;
use crate::render;
use crate::types::{Dataset, RenderOutcome, Selection};
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub catalog: VariableCatalog,
    pub config: AppConfig,
}

#[derive(Debug, Serialize)]
pub struct DiseaseResponse {
    pub option: String,
    pub code: String,
    pub description: String,
}

/// Selection as sent by the dashboard: the full select box option and display labels.
#[derive(Debug, Deserialize)]
pub struct MapRequest {
    pub disease: String,
    #[serde(default)]
    pub variables: Vec<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct MapResponse {
    pub warning: Option<String>,
    pub map: Option<serde_json::Value>,
    pub geojson: Option<geojson::FeatureCollection>,
}

pub async fn start_server(config: AppConfig, dataset: Arc<Dataset>) -> Result<()> {
    let state = Arc::new(AppState {
        dataset,
        catalog: config.catalog(),
        config: config.clone(),
    });

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    info!("Starting server on http://{}", addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/diseases", get(diseases_handler))
        .route("/api/variables", get(variables_handler))
        .route("/api/map", post(map_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(&state.config))
}

async fn diseases_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DiseaseResponse>> {
    let options = catalog::disease_options(&state.dataset)
        .into_iter()
        .map(|o| DiseaseResponse {
            option: o.to_string(),
            code: o.code,
            description: o.description,
        })
        .collect();
    Json(options)
}

async fn variables_handler(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntry>> {
    Json(state.catalog.entries().to_vec())
}

async fn map_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MapRequest>,
) -> Result<Json<MapResponse>, (StatusCode, String)> {
    handle_map_request(&state, &request)
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "Rejected map request");
            (status_for(&e), e.to_string())
        })
}

fn status_for(error: &MapRequestError) -> StatusCode {
    match error {
        MapRequestError::Pass(_) => StatusCode::BAD_REQUEST,
        MapRequestError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Turns a dashboard selection into a map payload or a warning.
pub fn handle_map_request(
    state: &AppState,
    request: &MapRequest,
) -> Result<MapResponse, MapRequestError> {
    let code = catalog::parse_disease_option(&request.disease);
    let fields = state.catalog.keys_for_labels(&request.variables);
    let selection = Selection::new(code, fields);

    let outcome = processing::render_pass(&state.dataset, &selection, &state.catalog, &state.config.map)?;

    let response = match outcome {
        RenderOutcome::Rendered(view) => MapResponse {
            warning: None,
            map: Some(serde_json::to_value(render::payload(&view, &state.config.map))?),
            geojson: Some(render::to_geojson(&view)),
        },
        other => MapResponse {
            warning: other.warning(),
            ..MapResponse::default()
        },
    };
    Ok(response)
}

fn index_page(config: &AppConfig) -> String {
    let (css, js) = render::leaflet_assets();
    format!(
        r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
    <meta charset="UTF-8">
    <title>Mapa Interativo de Dados SUS por Município</title>
    <link rel="stylesheet" href="{css}">
    <script src="{js}"></script>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 1rem; }}
        #map {{ width: {width}px; height: {height}px; }}
        #warning {{ color: #8a6d3b; background: #fcf8e3; padding: 0.5rem; display: none; }}
        select {{ min-width: 320px; }}
    </style>
</head>
<body>
    <h1>Mapa Interativo de Dados SUS por Município</h1>
    <h3>Variáveis Obrigatórias</h3>
    <label>Selecione a CID (Doença): <select id="disease"></select></label>
    <p><label>Selecione variáveis para visualização:<br><select id="variables" multiple size="9"></select></label></p>
    <button id="draw">Atualizar mapa</button>
    <p id="warning"></p>
    <div id="map"></div>
    <script>
{script}
var current = null;
function fill(id, items, text) {{
    var select = document.getElementById(id);
    items.forEach(function (item) {{
        var opt = document.createElement('option');
        opt.textContent = text(item);
        select.appendChild(opt);
    }});
}}
fetch('/api/diseases').then(function (r) {{ return r.json(); }})
    .then(function (items) {{ fill('disease', items, function (d) {{ return d.option; }}); }});
fetch('/api/variables').then(function (r) {{ return r.json(); }})
    .then(function (items) {{ fill('variables', items, function (v) {{ return v.label; }}); }});
// Selection order drives circle colors, so keep labels in the order they were picked.
var picked = [];
document.getElementById('variables').addEventListener('change', function (e) {{
    var now = Array.from(e.target.selectedOptions).map(function (o) {{ return o.textContent; }});
    picked = picked.filter(function (l) {{ return now.indexOf(l) >= 0; }})
        .concat(now.filter(function (l) {{ return picked.indexOf(l) < 0; }}));
}});
document.getElementById('draw').addEventListener('click', function () {{
    var body = {{ disease: document.getElementById('disease').value, variables: picked }};
    fetch('/api/map', {{ method: 'POST', headers: {{ 'Content-Type': 'application/json' }}, body: JSON.stringify(body) }})
        .then(function (r) {{ return r.json(); }})
        .then(function (res) {{
            var warning = document.getElementById('warning');
            warning.style.display = res.warning ? 'block' : 'none';
            warning.textContent = res.warning || '';
            if (!res.map) {{ return; }}
            if (current) {{ current.remove(); }}
            current = drawMap('map', res.map);
        }});
}});
    </script>
</body>
</html>
"#,
        css = css,
        js = js,
        width = config.map.width,
        height = config.map.height,
        script = render::DRAW_SCRIPT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PassError;
    use crate::types::{ColumnKind, FieldValue, Record};
    use geo::Point;

    fn state() -> AppState {
        let config = AppConfig::from_toml("[input]\ndata_file = \"dados.zip\"\n").unwrap();
        let record = |municipality: &str, lat: f64, value: f64| Record {
            code: "A00".to_string(),
            description: "Colera".to_string(),
            municipality: municipality.to_string(),
            location: Some(Point::new(-60.0, lat)),
            fields: [("ocorrencias_da_doenca".to_string(), FieldValue::Number(value))]
                .into_iter()
                .collect(),
        };
        AppState {
            dataset: Arc::new(Dataset {
                records: vec![record("Cacoal", -11.0, 10.0), record("Jaru", -10.0, 30.0)],
                columns: vec![("ocorrencias_da_doenca".to_string(), ColumnKind::Numeric)],
            }),
            catalog: config.catalog(),
            config,
        }
    }

    #[test]
    fn dashboard_selection_renders_map() {
        let request = MapRequest {
            disease: "A00 - Colera".to_string(),
            variables: vec!["Total de Ocorrências".to_string()],
        };

        let response = handle_map_request(&state(), &request).unwrap();

        assert!(response.warning.is_none());
        let map = response.map.unwrap();
        assert_eq!(map["markers"].as_array().unwrap().len(), 2);
        assert_eq!(map["center"][0].as_f64(), Some(-10.5));
        assert_eq!(response.geojson.unwrap().features.len(), 2);
    }

    #[test]
    fn empty_variable_list_returns_warning() {
        let request = MapRequest { disease: "A00 - Colera".to_string(), variables: vec![] };

        let response = handle_map_request(&state(), &request).unwrap();

        assert!(response.warning.unwrap().contains("pelo menos uma variável"));
        assert!(response.map.is_none());
    }

    #[test]
    fn unknown_disease_returns_warning() {
        let request = MapRequest {
            disease: "Z99 - Nada".to_string(),
            variables: vec!["Total de Ocorrências".to_string()],
        };

        let response = handle_map_request(&state(), &request).unwrap();

        assert!(response.warning.unwrap().contains("Z99"));
        assert!(response.geojson.is_none());
    }

    #[test]
    fn cataloged_field_missing_from_dataset_is_rejected() {
        let request = MapRequest {
            disease: "A00".to_string(),
            variables: vec!["Média de Idade".to_string()],
        };

        let err = handle_map_request(&state(), &request).unwrap_err();
        assert!(matches!(
            &err,
            MapRequestError::Pass(PassError::UnknownField(f)) if f == "media_idade"
        ));
        assert_eq!(status_for(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn payload_encoding_failure_is_a_server_error() {
        let encode_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = MapRequestError::from(encode_err);
        assert_eq!(status_for(&err), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("failed to encode map payload"));
    }

    #[test]
    fn label_order_from_dashboard_picks_colors() {
        let mut state = state();
        let dataset = Arc::make_mut(&mut state.dataset);
        dataset.columns.push(("media_idade".to_string(), ColumnKind::Numeric));
        for r in &mut dataset.records {
            r.fields.insert("media_idade".to_string(), FieldValue::Number(40.0));
        }

        let colors = |labels: &[&str]| {
            let request = MapRequest {
                disease: "A00 - Colera".to_string(),
                variables: labels.iter().map(|l| l.to_string()).collect(),
            };
            let map = handle_map_request(&state, &request).unwrap().map.unwrap();
            map["markers"].as_array().unwrap()[..2]
                .iter()
                .map(|m| (m["field"].as_str().unwrap().to_string(), m["color"].as_str().unwrap().to_string()))
                .collect::<Vec<_>>()
        };
        let pairs = |expected: &[(&str, &str)]| {
            expected.iter()
                .map(|(f, c)| (f.to_string(), c.to_string()))
                .collect::<Vec<_>>()
        };

        assert_eq!(
            colors(&["Total de Ocorrências", "Média de Idade"]),
            pairs(&[("ocorrencias_da_doenca", "blue"), ("media_idade", "red")])
        );
        assert_eq!(
            colors(&["Média de Idade", "Total de Ocorrências"]),
            pairs(&[("media_idade", "blue"), ("ocorrencias_da_doenca", "red")])
        );
    }

    #[test]
    fn index_page_embeds_drawing_code() {
        let page = index_page(&state().config);
        assert!(page.contains("function drawMap"));
        assert!(page.contains("/api/map"));
        assert!(page.contains("variables: picked"));
    }
}
