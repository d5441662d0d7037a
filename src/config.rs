use crate::catalog::{CatalogEntry, VariableCatalog};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntry>,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_file: PathBuf,
    #[serde(default = "default_drop_columns")]
    pub drop_columns: Vec<String>,
    #[serde(skip)]
    pub columns: ColumnConfig,
}

/// Names of the columns every record needs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    pub code: String,
    pub description: String,
    pub municipality: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            code: "cid_doenca".to_string(),
            description: "DESCRICAO".to_string(),
            municipality: "nome_municipio".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
        }
    }
}

/// How circle colors are picked from the palette.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorKeying {
    /// Index of the field within the current selection. Reordering the
    /// selection changes the colors.
    #[default]
    Position,
    /// Index of the field within the variable catalog.
    Identity,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub zoom: u8,
    pub tiles_url: String,
    pub tiles_attribution: String,
    pub layer_name: String,
    pub fill_opacity: f64,
    pub popup_max_width: u32,
    pub width: u32,
    pub height: u32,
    pub color_keying: ColorKeying,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom: 6,
            tiles_url: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_string(),
            tiles_attribution: "&copy; OpenStreetMap contributors &copy; CARTO".to_string(),
            layer_name: "Dados SUS".to_string(),
            fill_opacity: 0.6,
            popup_max_width: 350,
            width: 1000,
            height: 700,
            color_keying: ColorKeying::Position,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

fn default_drop_columns() -> Vec<String> {
    ["codigo_municipio_6", "codigo_municipio_paciente", "nome_padrao"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_catalog() -> Vec<CatalogEntry> {
    VariableCatalog::default().entries().to_vec()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        // `[columns]` is a top level table; the loader reads it through `input`.
        config.input.columns = config.columns.clone();
        Ok(config)
    }

    pub fn catalog(&self) -> VariableCatalog {
        VariableCatalog::new(self.catalog.clone())
    }
}
