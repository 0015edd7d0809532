//! Shape and range checks applied to upstream product records before they reach the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ProductSummary;

/// How a batch reacts to a record that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// The first bad record aborts the whole batch.
    Strict,
    /// Bad records are dropped and reported; the rest of the batch survives.
    #[default]
    Lenient,
}

impl std::str::FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(format!("unknown validation mode `{other}` (expected strict|lenient)")),
        }
    }
}

/// Upstream record as decoded off the wire, before any checks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProductSummary {
    pub name: Option<String>,
    pub link: Option<String>,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub average_sentiment: Option<f64>,
    pub positive_ratio: Option<f64>,
    pub composite_score: Option<f64>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("missing required field")]
    Missing,
    #[error("blank value")]
    Blank,
    #[error("value {value} outside [0, 1]")]
    OutOfRange { value: f64 },
    #[error("negative value {value}")]
    Negative { value: i64 },
    #[error("value is not finite")]
    NotFinite,
    #[error("malformed record: {message}")]
    Malformed { message: String },
}

/// A single rejected record: which one, which field, and why.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("record {index}{} field `{field}`: {failure}", .name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default())]
pub struct ValidationError {
    pub index: usize,
    pub name: Option<String>,
    pub field: &'static str,
    pub failure: ValidationFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedBatch {
    pub products: Vec<ProductSummary>,
    pub rejected: Vec<ValidationError>,
}

impl ValidatedBatch {
    pub fn skipped_count(&self) -> usize {
        self.rejected.len()
    }
}

impl RawProductSummary {
    /// Checks one record. `index` is the record's position in the incoming batch.
    pub fn validate(self, index: usize) -> Result<ProductSummary, ValidationError> {
        let name_hint = self.name.clone().filter(|n| !n.trim().is_empty());
        let fail = |field: &'static str, failure: ValidationFailure| ValidationError {
            index,
            name: name_hint.clone(),
            field,
            failure,
        };

        let name = match self.name {
            None => return Err(fail("name", ValidationFailure::Missing)),
            Some(n) if n.trim().is_empty() => return Err(fail("name", ValidationFailure::Blank)),
            Some(n) => n,
        };
        let link = self.link.ok_or_else(|| fail("link", ValidationFailure::Missing))?;

        let review_count = match self.review_count {
            None => return Err(fail("review_count", ValidationFailure::Missing)),
            Some(v) if v < 0 => return Err(fail("review_count", ValidationFailure::Negative { value: v })),
            Some(v) => v as u64,
        };

        let average_sentiment = unit_interval(self.average_sentiment)
            .map_err(|failure| fail("average_sentiment", failure))?;
        let positive_ratio =
            unit_interval(self.positive_ratio).map_err(|failure| fail("positive_ratio", failure))?;
        let composite_score = unit_interval(self.composite_score)
            .map_err(|failure| fail("composite_score", failure))?;

        if let Some(rating) = self.rating {
            if !rating.is_finite() {
                return Err(fail("rating", ValidationFailure::NotFinite));
            }
        }

        Ok(ProductSummary {
            name,
            link,
            price: self.price,
            rating: self.rating,
            review_count,
            average_sentiment,
            positive_ratio,
            composite_score,
            last_updated: self.last_updated.unwrap_or_default(),
        })
    }
}

fn unit_interval(value: Option<f64>) -> Result<f64, ValidationFailure> {
    let value = value.ok_or(ValidationFailure::Missing)?;
    if !value.is_finite() {
        return Err(ValidationFailure::NotFinite);
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationFailure::OutOfRange { value });
    }
    Ok(value)
}

fn decode_record(index: usize, value: JsonValue) -> Result<RawProductSummary, ValidationError> {
    let name = value
        .get("name")
        .and_then(|n| n.as_str())
        .map(ToString::to_string);
    serde_json::from_value(value).map_err(|err| ValidationError {
        index,
        name,
        field: "record",
        failure: ValidationFailure::Malformed {
            message: err.to_string(),
        },
    })
}

/// Validates a batch of untyped upstream records, preserving their relative order.
pub fn validate_records(
    records: Vec<JsonValue>,
    mode: ValidationMode,
) -> Result<ValidatedBatch, ValidationError> {
    let mut batch = ValidatedBatch {
        products: Vec::with_capacity(records.len()),
        rejected: Vec::new(),
    };

    for (index, value) in records.into_iter().enumerate() {
        match decode_record(index, value).and_then(|raw| raw.validate(index)) {
            Ok(product) => batch.products.push(product),
            Err(err) => match mode {
                ValidationMode::Strict => return Err(err),
                ValidationMode::Lenient => batch.rejected.push(err),
            },
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good(name: &str) -> JsonValue {
        json!({
            "name": name,
            "link": format!("https://example.test/{name}"),
            "price": "₹64,999",
            "rating": 4.3,
            "review_count": 42,
            "average_sentiment": 0.81,
            "positive_ratio": 0.9,
            "composite_score": 0.74,
            "last_updated": "2026-02-24T12:00:00"
        })
    }

    #[test]
    fn accepts_a_well_formed_record() {
        let batch = validate_records(vec![good("OnePlus 12 5G")], ValidationMode::Strict).unwrap();
        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.products[0].review_count, 42);
        assert_eq!(batch.products[0].price.as_deref(), Some("₹64,999"));
        assert!(batch.rejected.is_empty());
    }

    #[test]
    fn optional_passthrough_fields_may_be_absent() {
        let mut value = good("Pixel 8");
        let obj = value.as_object_mut().unwrap();
        obj.remove("price");
        obj.remove("rating");
        obj.remove("last_updated");
        let batch = validate_records(vec![value], ValidationMode::Strict).unwrap();
        assert_eq!(batch.products[0].price, None);
        assert_eq!(batch.products[0].rating, None);
        assert_eq!(batch.products[0].last_updated, "");
    }

    #[test]
    fn lenient_mode_skips_bad_records_and_keeps_order() {
        let mut missing = good("Broken One");
        missing.as_object_mut().unwrap().remove("review_count");
        let mut out_of_range = good("Broken Two");
        out_of_range["positive_ratio"] = json!(1.4);

        let batch = validate_records(
            vec![good("A a"), missing, good("B b"), out_of_range, json!("not an object")],
            ValidationMode::Lenient,
        )
        .unwrap();

        let names: Vec<_> = batch.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A a", "B b"]);
        assert_eq!(batch.skipped_count(), 3);

        assert_eq!(batch.rejected[0].index, 1);
        assert_eq!(batch.rejected[0].field, "review_count");
        assert_eq!(batch.rejected[0].failure, ValidationFailure::Missing);
        assert_eq!(batch.rejected[0].name.as_deref(), Some("Broken One"));

        assert_eq!(batch.rejected[1].field, "positive_ratio");
        assert_eq!(batch.rejected[1].failure, ValidationFailure::OutOfRange { value: 1.4 });

        assert_eq!(batch.rejected[2].index, 4);
        assert!(matches!(batch.rejected[2].failure, ValidationFailure::Malformed { .. }));
    }

    #[test]
    fn strict_mode_aborts_on_first_failure() {
        let mut negative = good("Bad Count");
        negative["review_count"] = json!(-3);
        let mut blank = good("x");
        blank["name"] = json!("   ");

        let err = validate_records(vec![good("Fine One"), negative, blank], ValidationMode::Strict)
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.field, "review_count");
        assert_eq!(err.failure, ValidationFailure::Negative { value: -3 });
    }

    #[test]
    fn wrong_json_type_is_a_per_record_failure() {
        let mut wrong = good("Typed Wrong");
        wrong["average_sentiment"] = json!("high");
        let batch = validate_records(vec![wrong, good("Still Fine")], ValidationMode::Lenient).unwrap();
        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.rejected[0].name.as_deref(), Some("Typed Wrong"));
        assert_eq!(batch.rejected[0].field, "record");
    }

    #[test]
    fn blank_name_is_rejected() {
        let mut blank = good("x");
        blank["name"] = json!("");
        let err = validate_records(vec![blank], ValidationMode::Strict).unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.failure, ValidationFailure::Blank);
        assert_eq!(err.name, None);
    }

    #[test]
    fn error_message_names_record_and_field() {
        let mut value = good("Galaxy S24");
        value["composite_score"] = json!(-0.2);
        let err = validate_records(vec![value], ValidationMode::Strict).unwrap_err();
        assert_eq!(
            err.to_string(),
            "record 0 (Galaxy S24) field `composite_score`: value -0.2 outside [0, 1]"
        );
    }

    #[test]
    fn validation_mode_parses_from_text() {
        assert_eq!("Strict".parse::<ValidationMode>(), Ok(ValidationMode::Strict));
        assert_eq!(" lenient ".parse::<ValidationMode>(), Ok(ValidationMode::Lenient));
        assert!("loose".parse::<ValidationMode>().is_err());
    }
}
