use geo::Point;
use std::collections::{HashMap, HashSet};

/// A single indicator cell that was present in the source file.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// One row of the dataset: a disease code observed in one municipality.
#[derive(Debug, Clone)]
pub struct Record {
    pub code: String,
    pub description: String,
    pub municipality: String,
    // x = longitude, y = latitude
    pub location: Option<Point<f64>>,
    // Missing cells are not stored.
    pub fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(FieldValue::Number(v)) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<Record>,
    // Indicator columns in file order.
    pub columns: Vec<(String, ColumnKind)>,
}

impl Dataset {
    pub fn column_kind(&self, key: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|(name, _)| name == key).map(|(_, kind)| *kind)
    }

    pub fn is_numeric(&self, key: &str) -> bool {
        self.column_kind(key) == Some(ColumnKind::Numeric)
    }
}

/// One disease code and the ordered indicator keys to draw for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub code: String,
    pub fields: Vec<String>,
}

impl Selection {
    /// Repeated keys are dropped, keeping the first occurrence.
    pub fn new(code: impl Into<String>, fields: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let fields = fields.into_iter()
            .filter(|f| seen.insert(f.clone()))
            .collect();
        Self { code: code.into(), fields }
    }
}

/// Observed range of one numeric field over a filtered subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrema {
    pub min: f64,
    pub max: f64,
}

impl Extrema {
    /// Position of `value` within the range, 0 for a constant field.
    pub fn fraction(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            return 0.0;
        }
        let fraction = if span.is_finite() {
            (value - self.min) / span
        } else {
            // The span of two finite extremes can overflow; halving is exact.
            (value / 2.0 - self.min / 2.0) / (self.max / 2.0 - self.min / 2.0)
        };
        fraction.clamp(0.0, 1.0)
    }
}

pub type ExtremaMap = HashMap<String, Extrema>;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMarker {
    pub location: Point<f64>,
    pub radius: f64,
    pub color: &'static str,
    pub field: String,
    // Index into the owning layer's popups.
    pub popup: usize,
}

/// Everything drawn for one pass, before it is placed on a base map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedLayer {
    pub markers: Vec<EncodedMarker>,
    pub popups: Vec<String>,
    pub skipped_without_location: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapView {
    pub center: Point<f64>,
    pub zoom: u8,
    pub layer_name: String,
    pub markers: Vec<EncodedMarker>,
    pub popups: Vec<String>,
    pub skipped_without_location: usize,
}

/// Result of one rendering pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(MapView),
    NoVariables,
    NoMatches { code: String },
    NoLocations { code: String, skipped: usize },
}

impl RenderOutcome {
    /// User facing warning for the passes that produce no map.
    pub fn warning(&self) -> Option<String> {
        match self {
            RenderOutcome::Rendered(_) => None,
            RenderOutcome::NoVariables => {
                Some("Selecione pelo menos uma variável para visualizar o mapa.".to_string())
            }
            RenderOutcome::NoMatches { code } => {
                Some(format!("Nenhum registro encontrado para a CID {}.", code))
            }
            RenderOutcome::NoLocations { code, skipped } => Some(format!(
                "Nenhum dos {} registros da CID {} possui latitude/longitude.",
                skipped, code
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_spans_unit_interval() {
        let e = Extrema { min: 10.0, max: 30.0 };
        assert_eq!(e.fraction(10.0), 0.0);
        assert_eq!(e.fraction(20.0), 0.5);
        assert_eq!(e.fraction(30.0), 1.0);
    }

    #[test]
    fn constant_range_has_zero_fraction() {
        let e = Extrema { min: 7.0, max: 7.0 };
        assert_eq!(e.fraction(7.0), 0.0);
    }

    #[test]
    fn fraction_survives_overflowing_span() {
        let e = Extrema { min: -1.0e308, max: 1.0e308 };
        assert_eq!(e.fraction(-1.0e308), 0.0);
        assert_eq!(e.fraction(0.0), 0.5);
        assert_eq!(e.fraction(1.0e308), 1.0);
        assert_eq!(e.fraction(f64::MAX), 1.0);
    }

    #[test]
    fn selection_drops_repeated_fields() {
        let selection = Selection::new(
            "A00",
            vec!["media_idade".into(), "IDHM".into(), "media_idade".into()],
        );
        assert_eq!(selection.fields, vec!["media_idade", "IDHM"]);
    }

    #[test]
    fn only_rendered_outcome_has_no_warning() {
        assert!(RenderOutcome::NoVariables.warning().is_some());
        assert!(RenderOutcome::NoMatches { code: "A00".into() }
            .warning()
            .unwrap()
            .contains("A00"));
    }
}
