//! Variable catalog and the disease option list shown to users.

use crate::types::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const OPTION_DELIMITER: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub label: String,
}

impl CatalogEntry {
    fn new(key: &str, label: &str) -> Self {
        Self { key: key.to_string(), label: label.to_string() }
    }
}

/// Ordered mapping from dataset column key to display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCatalog {
    entries: Vec<CatalogEntry>,
}

impl Default for VariableCatalog {
    fn default() -> Self {
        Self::new(vec![
            CatalogEntry::new("ocorrencias_da_doenca", "Total de Ocorrências"),
            CatalogEntry::new("ocorrencias_mulheres", "Ocorrências em Mulheres"),
            CatalogEntry::new("ocorrencias_homens", "Ocorrências em Homens"),
            CatalogEntry::new("soma_val_tot", "Valor Total (R$)"),
            CatalogEntry::new("media_idade", "Média de Idade"),
            CatalogEntry::new("IDHM", "IDHM Geral"),
            CatalogEntry::new("IDHM Renda", "IDHM Renda"),
            CatalogEntry::new("IDHM educacao", "IDHM Educação"),
            CatalogEntry::new("IDHM Longevidade", "IDHM Longevidade"),
        ])
    }
}

impl VariableCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// Display label for `key`, or the key itself when it is not cataloged.
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.iter()
            .find(|e| e.key == key)
            .map(|e| e.label.as_str())
            .unwrap_or(key)
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    /// Maps selected labels back to keys in the order given. Unknown labels are dropped.
    pub fn keys_for_labels<S: AsRef<str>>(&self, labels: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        labels.iter()
            .filter_map(|label| self.entries.iter().find(|e| e.label == label.as_ref()))
            .filter(|e| seen.insert(e.key.as_str()))
            .map(|e| e.key.clone())
            .collect()
    }

    /// Accepts either a display label or a raw key.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|e| e.label == name)
            .or_else(|| self.entries.iter().find(|e| e.key == name))
            .map(|e| e.key.as_str())
    }
}

/// One entry of the disease select box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiseaseOption {
    pub code: String,
    pub description: String,
}

impl fmt::Display for DiseaseOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.code, OPTION_DELIMITER, self.description)
    }
}

/// Distinct (code, description) pairs in order of first appearance.
pub fn disease_options(dataset: &Dataset) -> Vec<DiseaseOption> {
    let mut seen = HashSet::new();
    dataset.records.iter()
        .filter(|r| seen.insert((r.code.as_str(), r.description.as_str())))
        .map(|r| DiseaseOption {
            code: r.code.clone(),
            description: r.description.clone(),
        })
        .collect()
}

/// Extracts the bare code from `"<code> - <description>"`. Input without the
/// delimiter is returned unchanged.
pub fn parse_disease_option(option: &str) -> &str {
    option.split_once(OPTION_DELIMITER)
        .map(|(code, _)| code)
        .unwrap_or(option)
}
