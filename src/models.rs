use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

/// A captured product photo, held in memory for the lifetime of one pipeline
/// invocation. The acquisition layer normalizes uploads to JPEG before the
/// bytes reach the marketplace stages.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/jpeg")
    }
}

/// Closed condition vocabulary accepted from the extraction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Condition {
    NewOther,
    UsedExcellent,
    UsedGood,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::NewOther => "NEW_OTHER",
            Condition::UsedExcellent => "USED_EXCELLENT",
            Condition::UsedGood => "USED_GOOD",
        }
    }

    /// The inventory endpoint's condition literals carry no separators, so
    /// `USED_EXCELLENT` goes over the wire as `USEDEXCELLENT`.
    pub fn inventory_code(&self) -> &'static str {
        match self {
            Condition::NewOther => "NEWOTHER",
            Condition::UsedExcellent => "USEDEXCELLENT",
            Condition::UsedGood => "USEDGOOD",
        }
    }
}

/// Structured listing record extracted from a single product photo.
///
/// Price and currency may be absent on the extracted record; the offer stage
/// owns the fallbacks for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    #[serde(default = "default_brand")]
    pub brand: String,
    pub condition: Condition,
    pub category_keyword: String,
    #[serde(default)]
    pub suggested_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

fn default_brand() -> String {
    "Unbranded".to_string()
}

/// Body of `POST /listings`. Exactly one image source must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingRequest {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub overrides: Option<DraftOverrides>,
}

/// Caller-authored edits applied to the extracted draft before any
/// marketplace call is made.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftOverrides {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub sku: String,
    pub offer_id: String,
    pub title: String,
    pub suggested_price: f64,
    pub currency: String,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

/// Error body returned to API callers. The footprint fields are populated on
/// stage failures so operators can tell which remote objects already exist.
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: Option<String>,
    pub media_uploaded: Option<bool>,
    pub inventory_sku: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: Some(detail.into()),
            media_uploaded: None,
            inventory_sku: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_inventory_codes_drop_separators() {
        assert_eq!(Condition::NewOther.inventory_code(), "NEWOTHER");
        assert_eq!(Condition::UsedExcellent.inventory_code(), "USEDEXCELLENT");
        assert_eq!(Condition::UsedGood.inventory_code(), "USEDGOOD");
    }

    #[test]
    fn condition_round_trips_through_serde() {
        let parsed: Condition = serde_json::from_str("\"USED_EXCELLENT\"").expect("parse");
        assert_eq!(parsed, Condition::UsedExcellent);
        assert_eq!(
            serde_json::to_string(&Condition::NewOther).expect("serialize"),
            "\"NEW_OTHER\""
        );
    }

    #[test]
    fn condition_rejects_values_outside_the_vocabulary() {
        assert!(serde_json::from_str::<Condition>("\"FOR_PARTS\"").is_err());
        assert!(serde_json::from_str::<Condition>("\"used_good\"").is_err());
    }

    #[test]
    fn draft_brand_defaults_when_absent() {
        let draft: ListingDraft = serde_json::from_str(
            r#"{
                "title": "Vintage Leather Jacket",
                "description": "Supple leather, light wear.",
                "condition": "USED_EXCELLENT",
                "category_keyword": "men's leather jacket"
            }"#,
        )
        .expect("parse");
        assert_eq!(draft.brand, "Unbranded");
        assert!(draft.suggested_price.is_none());
        assert!(draft.currency.is_none());
    }

    #[test]
    fn api_error_omits_empty_footprint_fields() {
        let body = serde_json::to_value(ApiError::new("uploading", "HTTP 500")).expect("json");
        assert!(body.get("media_uploaded").is_none());
        assert!(body.get("inventory_sku").is_none());
    }
}
