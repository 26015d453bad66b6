//! Measurement test descriptors derived from physical units.
//!
//! The unit string on a physiology row determines the shape of the test:
//! a concentration per volume, a rate, a yield, or a carbon balance.
//! Numerator and denominator compounds fill in the remaining slots.

use serde::Serialize;

use crate::error::{BenchsyncError, Result};

/// One side of a ratio measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePart {
    /// Measured quantity, e.g. `mass` or `amount`.
    pub quantity: String,
    /// Unit the quantity is expressed in; absent for carbon balances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Compound names attached to this side, empty when not applicable.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compounds: Vec<String>,
}

impl RatePart {
    fn new(quantity: &str, unit: &str) -> Self {
        Self {
            quantity: quantity.to_string(),
            unit: Some(unit.to_string()),
            compounds: Vec::new(),
        }
    }

    fn unitless(quantity: &str) -> Self {
        Self {
            quantity: quantity.to_string(),
            unit: None,
            compounds: Vec::new(),
        }
    }
}

/// A fully described measurement test, ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDescriptor {
    /// Measured parameter, e.g. `concentration` or `yield`.
    #[serde(rename = "type")]
    pub parameter: String,
    /// Numerator of the ratio, absent for rate-only tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numerator: Option<RatePart>,
    /// Denominator of the ratio, absent for rate-only tests and carbon
    /// balances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denominator: Option<RatePart>,
    /// Time base for rate tests, e.g. `h`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
}

impl TestDescriptor {
    fn plain(parameter: &str, numerator: RatePart) -> Self {
        Self {
            parameter: parameter.to_string(),
            numerator: Some(numerator),
            denominator: None,
            rate: None,
        }
    }

    fn ratio(parameter: &str, numerator: RatePart, denominator: RatePart) -> Self {
        Self {
            parameter: parameter.to_string(),
            numerator: Some(numerator),
            denominator: Some(denominator),
            rate: None,
        }
    }
}

/// Build a test descriptor for a physiology measurement.
///
/// The `unit` string selects the template; an empty or `nan` unit denotes a
/// carbon balance, whose numerator carries the `carbon-balance` quantity and
/// no unit. `numerator` and `denominator` compounds are attached to the
/// matching side. A non-empty `quantity` overrides the numerator quantity
/// the template chose.
pub fn measurement_test(
    unit: &str,
    parameter: &str,
    numerator_compound: Option<&str>,
    denominator_compound: Option<&str>,
    quantity: Option<&str>,
) -> Result<TestDescriptor> {
    let unit = unit.trim();
    let mut test = if unit.is_empty() || unit.eq_ignore_ascii_case("nan") {
        TestDescriptor::plain(parameter, RatePart::unitless("carbon-balance"))
    } else {
        match unit {
            "mg/L" => TestDescriptor::ratio(
                parameter,
                RatePart::new("mass", "mg"),
                RatePart::new("volume", "L"),
            ),
            "g/L" | "g CDW/L" => TestDescriptor::ratio(
                parameter,
                RatePart::new("mass", "g"),
                RatePart::new("volume", "L"),
            ),
            "Cmol/Cmol" => TestDescriptor::ratio(
                parameter,
                RatePart::new("amount", "Cmol"),
                RatePart::new("amount", "Cmol"),
            ),
            "g CDW/mol" => TestDescriptor::ratio(
                parameter,
                RatePart::new("CDW", "g"),
                RatePart::new("amount", "mol"),
            ),
            "mmol/gCDW" => TestDescriptor::ratio(
                parameter,
                RatePart::new("amount", "mmol"),
                RatePart::new("CDW", "g"),
            ),
            "mg/gCDW" => TestDescriptor::ratio(
                parameter,
                RatePart::new("mass", "mg"),
                RatePart::new("CDW", "g"),
            ),
            "h-1" => TestDescriptor {
                parameter: parameter.to_string(),
                numerator: None,
                denominator: None,
                rate: Some("h".to_string()),
            },
            "mmol/(gCDW*h)" => TestDescriptor {
                rate: Some("h".to_string()),
                ..TestDescriptor::ratio(
                    parameter,
                    RatePart::new("amount", "mmol"),
                    RatePart::new("CDW", "g"),
                )
            },
            "mg/(gCDW*h)" => TestDescriptor {
                rate: Some("h".to_string()),
                ..TestDescriptor::ratio(
                    parameter,
                    RatePart::new("mass", "mg"),
                    RatePart::new("CDW", "g"),
                )
            },
            other => {
                return Err(BenchsyncError::AmbiguousData(format!(
                    "unknown unit {other}"
                )))
            }
        }
    };

    if let Some(compound) = numerator_compound.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(numerator) = test.numerator.as_mut() {
            numerator.compounds.push(compound.to_string());
        }
    }
    if let Some(compound) = denominator_compound.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(denominator) = test.denominator.as_mut() {
            denominator.compounds.push(compound.to_string());
        }
    }
    if let Some(quantity) = quantity.map(str::trim).filter(|q| !q.is_empty()) {
        if let Some(numerator) = test.numerator.as_mut() {
            numerator.quantity = quantity.to_string();
        }
    }
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_concentration_carries_volume_denominator() {
        let test =
            measurement_test("mg/L", "concentration", Some("L-tryptophan"), None, None).unwrap();
        assert_eq!(test.parameter, "concentration");
        let numerator = test.numerator.unwrap();
        assert_eq!(numerator.quantity, "mass");
        assert_eq!(numerator.unit.as_deref(), Some("mg"));
        assert_eq!(numerator.compounds, vec!["L-tryptophan".to_string()]);
        let denominator = test.denominator.unwrap();
        assert_eq!(denominator.quantity, "volume");
        assert_eq!(denominator.unit.as_deref(), Some("L"));
        assert!(denominator.compounds.is_empty());
        assert!(test.rate.is_none());
    }

    #[test]
    fn test_biomass_concentration_measures_mass() {
        let test = measurement_test("g CDW/L", "concentration", None, None, None).unwrap();
        let numerator = test.numerator.unwrap();
        assert_eq!(numerator.quantity, "mass");
        assert_eq!(numerator.unit.as_deref(), Some("g"));
        assert_eq!(test.denominator.unwrap().quantity, "volume");
    }

    #[test]
    fn test_yield_ratio() {
        let test = measurement_test(
            "Cmol/Cmol",
            "yield",
            Some("aldehydo-D-glucose"),
            Some("dioxygen"),
            None,
        )
        .unwrap();
        let numerator = test.numerator.unwrap();
        let denominator = test.denominator.unwrap();
        assert_eq!(numerator.quantity, "amount");
        assert_eq!(denominator.quantity, "amount");
        assert_eq!(denominator.compounds, vec!["dioxygen".to_string()]);
    }

    #[test]
    fn test_growth_rate() {
        let test = measurement_test("h-1", "growth-rate", None, None, None).unwrap();
        assert_eq!(test.rate.as_deref(), Some("h"));
        assert!(test.numerator.is_none());
    }

    #[test]
    fn test_specific_rate() {
        let test = measurement_test("mmol/(gCDW*h)", "uptake-rate", None, None, None).unwrap();
        assert_eq!(test.rate.as_deref(), Some("h"));
        assert_eq!(test.numerator.unwrap().unit.as_deref(), Some("mmol"));
        assert_eq!(test.denominator.unwrap().quantity, "CDW");
    }

    #[test]
    fn test_empty_unit_is_carbon_balance() {
        for unit in ["", "nan"] {
            let test = measurement_test(unit, "carbon-recovery", None, None, None).unwrap();
            assert_eq!(test.parameter, "carbon-recovery");
            let numerator = test.numerator.unwrap();
            assert_eq!(numerator.quantity, "carbon-balance");
            assert!(numerator.unit.is_none());
            assert!(test.denominator.is_none());
        }
    }

    #[test]
    fn test_quantity_override() {
        let test = measurement_test("g/L", "concentration", None, None, Some("amount")).unwrap();
        assert_eq!(test.numerator.unwrap().quantity, "amount");
        // The override also applies to a carbon balance numerator.
        let test = measurement_test("", "carbon-recovery", None, None, Some("amount")).unwrap();
        assert_eq!(test.numerator.unwrap().quantity, "amount");
    }

    #[test]
    fn test_descriptor_serialization() {
        let test = measurement_test("mg/L", "concentration", None, None, None).unwrap();
        let value = serde_json::to_value(&test).unwrap();
        assert_eq!(value["type"], json!("concentration"));
        assert_eq!(value["denominator"], json!({"quantity": "volume", "unit": "L"}));
        let test = measurement_test("", "carbon-recovery", None, None, None).unwrap();
        let value = serde_json::to_value(&test).unwrap();
        assert_eq!(value["type"], json!("carbon-recovery"));
        assert_eq!(value["numerator"], json!({"quantity": "carbon-balance"}));
    }

    #[test]
    fn test_unknown_unit_fails() {
        let err = measurement_test("furlongs", "concentration", None, None, None).unwrap_err();
        assert!(err.to_string().contains("unknown unit furlongs"));
    }
}
