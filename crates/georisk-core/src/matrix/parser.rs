//! Risk matrix parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::schema::validate_matrix_schema;
use crate::types::{PairKey, SourceKind};

/// Query template used when a category does not declare one.
pub const DEFAULT_QUERY_TEMPLATE: &str = "{category} {country} latest news analysis";

const DEFAULT_MATRIX_YAML: &str = include_str!("../../matrix/default.yaml");

/// Errors that can occur when loading a risk matrix.
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Failed to read matrix file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Matrix does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Matrix validation failed: {0}")]
    ValidationError(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

/// A country that categories are evaluated against.
///
/// Countries are declared once and shared by every category that lists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Stable identifier (e.g., "DE")
    pub id: String,

    /// Display name used in prompts and the report (e.g., "Germany")
    pub name: String,

    /// ISO 4217 currency code for FX lookups
    #[serde(default)]
    pub currency: Option<String>,

    /// Market data symbol for the country's benchmark index
    #[serde(default)]
    pub market_symbol: Option<String>,
}

impl Country {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            currency: None,
            market_symbol: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_market_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.market_symbol = Some(symbol.into());
        self
    }
}

/// A search/lookup template with `{category}` and `{country}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate(String);

impl QueryTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Substitute the category display name and country name.
    pub fn render(&self, category: &str, country: &str) -> String {
        self.0
            .replace("{category}", category)
            .replace("{country}", country)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TEMPLATE)
    }
}

/// One geopolitical risk theme and the countries it is evaluated against.
#[derive(Debug, Clone)]
pub struct RiskCategory {
    /// Stable identifier (e.g., "russia-nato-conflict")
    pub id: String,

    /// Display name (e.g., "Russia-NATO Conflict")
    pub name: String,

    /// What the category measures; forwarded to the scorer as rubric context
    pub description: Option<String>,

    /// Countries in declared order
    pub countries: Vec<Arc<Country>>,

    /// Template for source lookups
    pub query_template: QueryTemplate,

    /// Source kinds that apply; `None` means every registered source
    pub sources: Option<Vec<SourceKind>>,
}

impl RiskCategory {
    /// Whether sources of `kind` should be queried for this category.
    pub fn uses_source(&self, kind: SourceKind) -> bool {
        self.sources
            .as_ref()
            .map(|kinds| kinds.contains(&kind))
            .unwrap_or(true)
    }

    /// Look up one of this category's countries by id.
    pub fn country(&self, id: &str) -> Option<&Arc<Country>> {
        self.countries.iter().find(|c| c.id == id)
    }

    /// Render the category's query for a country.
    pub fn query_for(&self, country: &Country) -> String {
        self.query_template.render(&self.name, &country.name)
    }
}

/// Raw category entry as written in the matrix document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CategorySpec {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    countries: Vec<String>,
    #[serde(default)]
    query_template: Option<String>,
    #[serde(default)]
    sources: Option<Vec<SourceKind>>,
}

/// Raw matrix document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MatrixDocument {
    countries: Vec<Country>,
    categories: Vec<CategorySpec>,
}

/// The full category x country matrix for a run.
///
/// Immutable once loaded; iteration order is the declared order.
#[derive(Debug, Clone)]
pub struct RiskMatrix {
    categories: Vec<RiskCategory>,
}

impl RiskMatrix {
    /// Parse a matrix from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, MatrixError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a matrix from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, MatrixError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a matrix file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let matrix = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }?;

        tracing::debug!(
            path = %path.display(),
            categories = matrix.categories.len(),
            pairs = matrix.pair_count(),
            "Loaded risk matrix"
        );
        Ok(matrix)
    }

    /// The built-in matrix of 11 categories over 20 countries plus "Global".
    pub fn builtin() -> Result<Self, MatrixError> {
        Self::from_yaml(DEFAULT_MATRIX_YAML)
    }

    /// Build a matrix directly from already-resolved categories.
    pub fn new(categories: Vec<RiskCategory>) -> Result<Self, MatrixError> {
        let matrix = Self { categories };
        matrix.validate()?;
        Ok(matrix)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, MatrixError> {
        validate_matrix_schema(&value).map_err(MatrixError::SchemaViolation)?;
        let document: MatrixDocument = serde_json::from_value(value)?;
        Self::resolve(document)
    }

    /// Resolve country references and validate.
    fn resolve(document: MatrixDocument) -> Result<Self, MatrixError> {
        let mut countries: BTreeMap<String, Arc<Country>> = BTreeMap::new();
        for country in document.countries {
            let id = country.id.clone();
            if countries.insert(id.clone(), Arc::new(country)).is_some() {
                return Err(MatrixError::ValidationError(format!(
                    "Duplicate country ID: {}",
                    id
                )));
            }
        }

        let categories = document
            .categories
            .into_iter()
            .map(|spec| {
                let resolved = spec
                    .countries
                    .iter()
                    .map(|id| {
                        countries.get(id).cloned().ok_or_else(|| {
                            MatrixError::ValidationError(format!(
                                "Category '{}' references undeclared country '{}'",
                                spec.id, id
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(RiskCategory {
                    id: spec.id,
                    name: spec.name,
                    description: spec.description,
                    countries: resolved,
                    query_template: spec
                        .query_template
                        .map(QueryTemplate::new)
                        .unwrap_or_default(),
                    sources: spec.sources,
                })
            })
            .collect::<Result<Vec<_>, MatrixError>>()?;

        Self::new(categories)
    }

    /// Structural checks the schema cannot express.
    fn validate(&self) -> Result<(), MatrixError> {
        if self.categories.is_empty() {
            return Err(MatrixError::ValidationError(
                "Matrix declares no categories".to_string(),
            ));
        }

        let mut seen_categories = HashSet::new();
        for category in &self.categories {
            if !seen_categories.insert(category.id.as_str()) {
                return Err(MatrixError::ValidationError(format!(
                    "Duplicate category ID: {}",
                    category.id
                )));
            }

            if category.countries.is_empty() {
                return Err(MatrixError::ValidationError(format!(
                    "Category '{}' lists no countries",
                    category.id
                )));
            }

            let mut seen_countries = HashSet::new();
            for country in &category.countries {
                if !seen_countries.insert(country.id.as_str()) {
                    return Err(MatrixError::ValidationError(format!(
                        "Category '{}' lists country '{}' twice",
                        category.id, country.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Categories in declared order.
    pub fn categories(&self) -> &[RiskCategory] {
        &self.categories
    }

    /// Look up a category by id.
    pub fn category(&self, id: &str) -> Option<&RiskCategory> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Category ids in declared order.
    pub fn category_ids(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.id.as_str()).collect()
    }

    /// Number of (category, country) pairs: the exact report row count.
    pub fn pair_count(&self) -> usize {
        self.categories.iter().map(|c| c.countries.len()).sum()
    }

    /// Every pair in canonical order: categories as declared, then countries
    /// as declared within each category.
    pub fn pairs(&self) -> impl Iterator<Item = (&RiskCategory, &Arc<Country>)> + '_ {
        self.categories
            .iter()
            .flat_map(|category| category.countries.iter().map(move |c| (category, c)))
    }

    /// Pair keys in canonical order.
    pub fn pair_keys(&self) -> Vec<PairKey> {
        self.pairs()
            .map(|(category, country)| PairKey::new(&category.id, &country.id))
            .collect()
    }

    /// Restrict the matrix to the given category ids, keeping declared order.
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Self, MatrixError> {
        for id in ids {
            if self.category(id.as_ref()).is_none() {
                return Err(MatrixError::UnknownCategory(id.as_ref().to_string()));
            }
        }

        let categories = self
            .categories
            .iter()
            .filter(|c| ids.iter().any(|id| id.as_ref() == c.id))
            .cloned()
            .collect();

        Self::new(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CATEGORY_MATRIX: &str = r#"
countries:
  - { id: X, name: Xland }
  - { id: Y, name: Yland, currency: YYY }
  - { id: Z, name: Zland, market_symbol: "^ZZ" }
categories:
  - id: A
    name: Category A
    countries: [X, Y]
  - id: B
    name: Category B
    countries: [Z]
    query_template: "{country} {category} outlook"
    sources: [market_data]
"#;

    #[test]
    fn test_parse_valid_matrix() {
        let matrix = RiskMatrix::from_yaml(TWO_CATEGORY_MATRIX).unwrap();
        assert_eq!(matrix.categories().len(), 2);
        assert_eq!(matrix.pair_count(), 3);
        assert_eq!(matrix.category_ids(), vec!["A", "B"]);
    }

    #[test]
    fn test_pairs_follow_declared_order() {
        let matrix = RiskMatrix::from_yaml(TWO_CATEGORY_MATRIX).unwrap();
        let keys: Vec<String> = matrix.pair_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["A/X", "A/Y", "B/Z"]);
    }

    #[test]
    fn test_query_template_rendering() {
        let matrix = RiskMatrix::from_yaml(TWO_CATEGORY_MATRIX).unwrap();

        let a = matrix.category("A").unwrap();
        let x = a.country("X").unwrap();
        assert_eq!(a.query_for(x), "Category A Xland latest news analysis");

        let b = matrix.category("B").unwrap();
        let z = b.country("Z").unwrap();
        assert_eq!(b.query_for(z), "Zland Category B outlook");
    }

    #[test]
    fn test_source_restriction() {
        let matrix = RiskMatrix::from_yaml(TWO_CATEGORY_MATRIX).unwrap();
        let a = matrix.category("A").unwrap();
        let b = matrix.category("B").unwrap();

        assert!(a.uses_source(SourceKind::News));
        assert!(a.uses_source(SourceKind::FxRate));
        assert!(b.uses_source(SourceKind::MarketData));
        assert!(!b.uses_source(SourceKind::WebSearch));
    }

    #[test]
    fn test_countries_are_shared() {
        let yaml = r#"
countries:
  - { id: X, name: Xland }
categories:
  - { id: A, name: A, countries: [X] }
  - { id: B, name: B, countries: [X] }
"#;
        let matrix = RiskMatrix::from_yaml(yaml).unwrap();
        let from_a = matrix.category("A").unwrap().country("X").unwrap();
        let from_b = matrix.category("B").unwrap().country("X").unwrap();
        assert!(Arc::ptr_eq(from_a, from_b));
    }

    #[test]
    fn test_undeclared_country() {
        let yaml = r#"
countries:
  - { id: X, name: Xland }
categories:
  - { id: A, name: A, countries: [X, Q] }
"#;
        let result = RiskMatrix::from_yaml(yaml);
        assert!(matches!(result, Err(MatrixError::ValidationError(_))));
    }

    #[test]
    fn test_duplicate_country_in_category() {
        let yaml = r#"
countries:
  - { id: X, name: Xland }
categories:
  - { id: A, name: A, countries: [X, X] }
"#;
        let result = RiskMatrix::from_yaml(yaml);
        assert!(matches!(result, Err(MatrixError::ValidationError(_))));
    }

    #[test]
    fn test_duplicate_category_ids() {
        let yaml = r#"
countries:
  - { id: X, name: Xland }
categories:
  - { id: A, name: First, countries: [X] }
  - { id: A, name: Second, countries: [X] }
"#;
        let result = RiskMatrix::from_yaml(yaml);
        assert!(matches!(result, Err(MatrixError::ValidationError(_))));
    }

    #[test]
    fn test_schema_violation_reported() {
        let yaml = r#"
countries: []
categories: []
"#;
        let result = RiskMatrix::from_yaml(yaml);
        assert!(matches!(result, Err(MatrixError::SchemaViolation(_))));
    }

    #[test]
    fn test_json_matrix() {
        let json = r#"{
            "countries": [{ "id": "X", "name": "Xland" }],
            "categories": [{ "id": "A", "name": "A", "countries": ["X"] }]
        }"#;
        let matrix = RiskMatrix::from_json(json).unwrap();
        assert_eq!(matrix.pair_count(), 1);
    }

    #[test]
    fn test_select_keeps_declared_order() {
        let matrix = RiskMatrix::from_yaml(TWO_CATEGORY_MATRIX).unwrap();
        let selected = matrix.select(&["B", "A"]).unwrap();
        assert_eq!(selected.category_ids(), vec!["A", "B"]);

        let only_b = matrix.select(&["B"]).unwrap();
        assert_eq!(only_b.pair_count(), 1);

        assert!(matches!(
            matrix.select(&["C"]),
            Err(MatrixError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_builtin_matrix() {
        let matrix = RiskMatrix::builtin().unwrap();
        assert_eq!(matrix.categories().len(), 11);
        // Two global categories plus nine categories over 20 countries
        assert_eq!(matrix.pair_count(), 2 + 9 * 20);

        let global = matrix.category("global-indicator").unwrap();
        assert_eq!(global.countries.len(), 1);
        assert_eq!(global.countries[0].name, "Global");

        let terror = matrix.category("major-terror-attacks").unwrap();
        assert!(!terror.uses_source(SourceKind::MarketData));
    }
}
