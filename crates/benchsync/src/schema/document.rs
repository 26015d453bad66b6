//! JSON Table Schema documents.

use serde::{Deserialize, Serialize};

/// Loosely typed per-field type constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text values; always valid.
    #[default]
    String,
    /// Floating-point numbers.
    Number,
    /// Whole numbers.
    Integer,
    /// Calendar dates, `%Y-%m-%d`.
    Date,
}

impl FieldType {
    /// Check whether a non-empty cell value conforms to this type.
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            FieldType::String => true,
            FieldType::Number => value.parse::<f64>().is_ok(),
            FieldType::Integer => value.parse::<i64>().is_ok(),
            FieldType::Date => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        }
    }
}

/// Constraints attached to a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Whether the field must be non-empty in every row.
    #[serde(default)]
    pub required: bool,
}

/// Declaration of a single expected column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name as it appears in the header row.
    pub name: String,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Expected value type.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Field constraints.
    #[serde(default)]
    pub constraints: FieldConstraints,
}

impl FieldSpec {
    /// Create a field spec with the given name and type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            title: None,
            field_type,
            constraints: FieldConstraints::default(),
        }
    }
}

/// A named, versioned declaration of expected columns and constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    /// Expected columns.
    pub fields: Vec<FieldSpec>,
    /// Maximum allowed data row count.
    #[serde(rename = "maxRows", default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl SchemaDoc {
    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get all field names.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Derive a new schema with one additional numeric field per name.
    ///
    /// The canonical document is never mutated; the physiology schema is
    /// extended this way with one measurement column per sample id found in
    /// the companion samples table.
    pub fn with_extra_number_fields<I, S>(&self, names: I) -> SchemaDoc
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut derived = self.clone();
        for name in names {
            let name = name.into();
            let mut spec = FieldSpec::new(name.clone(), FieldType::Number);
            spec.title = Some(format!("measurements for {name}"));
            derived.fields.push(spec);
        }
        derived
    }
}
