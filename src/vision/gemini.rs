use crate::config::VisionConfig;
use crate::http::build_client;
use crate::models::{ListingDraft, RawImage};
use crate::vision::{ExtractionError, VisionExtractor};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const LISTING_PROMPT: &str = r#"
You are an expert e-commerce product listing specialist. Analyze the provided
image of a single product and generate a complete, structured draft listing.
Return ONLY a single, raw JSON object. Do not include any text before or
after the JSON, and do not use Markdown fencing.

Output structure:
{
    "title": "A highly descriptive, keyword-rich title (max 80 chars)",
    "description": "A compelling, easy-to-read sales description formatted with short paragraphs or bullet points.",
    "brand": "The manufacturer name (or 'Unbranded')",
    "condition": "NEW_OTHER" or "USED_EXCELLENT" or "USED_GOOD",
    "category_keyword": "2-3 keyword phrase for category search (e.g., 'Men's running shoes')",
    "suggested_price": 45.00,
    "currency": "ISO 4217 code, e.g. 'USD'"
}
"#;

pub struct GeminiVision {
    http: Client,
    config: VisionConfig,
}

impl GeminiVision {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }
}

#[async_trait]
impl VisionExtractor for GeminiVision {
    async fn extract(&self, image: &RawImage) -> Result<ListingDraft, ExtractionError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ExtractionError::MissingCredential);
        }

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::text(LISTING_PROMPT),
                    Part::inline(&image.content_type, &image.bytes),
                ],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| ExtractionError::Transport(err.to_string()))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ExtractionError::Malformed("model returned no text".into()))?;

        parse_listing_draft(&text)
    }
}

/// Parses the model's reply into a draft. Only the known ```json fence
/// markers are stripped; anything else around the object makes the parse
/// fail rather than being discarded.
pub(crate) fn parse_listing_draft(raw: &str) -> Result<ListingDraft, ExtractionError> {
    let cleaned = strip_code_fence(raw);
    let mut draft: ListingDraft = serde_json::from_str(cleaned)
        .map_err(|err| ExtractionError::Malformed(err.to_string()))?;
    if draft.brand.trim().is_empty() {
        draft.brand = "Unbranded".to_string();
    }
    validate_draft(&draft)?;
    Ok(draft)
}

fn strip_code_fence(input: &str) -> &str {
    let mut text = input.trim();
    if let Some(rest) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    {
        text = rest;
        if let Some(rest) = text.trim_end().strip_suffix("```") {
            text = rest;
        }
    }
    text.trim()
}

fn validate_draft(draft: &ListingDraft) -> Result<(), ExtractionError> {
    if draft.title.trim().is_empty() {
        return Err(ExtractionError::Invalid("title is empty".into()));
    }
    if draft.title.chars().count() > 80 {
        return Err(ExtractionError::Invalid(
            "title exceeds 80 characters".into(),
        ));
    }
    if draft.description.trim().is_empty() {
        return Err(ExtractionError::Invalid("description is empty".into()));
    }
    if draft.category_keyword.trim().is_empty() {
        return Err(ExtractionError::Invalid("category_keyword is empty".into()));
    }
    if let Some(price) = draft.suggested_price {
        if !price.is_finite() || price < 0.0 {
            return Err(ExtractionError::Invalid(format!(
                "suggested_price {price} is not a non-negative amount"
            )));
        }
    }
    if let Some(currency) = &draft.currency {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ExtractionError::Invalid(format!(
                "currency `{currency}` is not an ISO 4217 code"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(value: &str) -> Self {
        Self {
            text: Some(value.to_string()),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;

    const VALID_OBJECT: &str = r#"{
        "title": "Vintage Leather Jacket",
        "description": "Supple full-grain leather with light wear.",
        "brand": "Unbranded",
        "condition": "USED_EXCELLENT",
        "category_keyword": "men's leather jacket",
        "suggested_price": 45.00,
        "currency": "USD"
    }"#;

    #[test]
    fn parses_a_bare_json_object() {
        let draft = parse_listing_draft(VALID_OBJECT).expect("parse");
        assert_eq!(draft.title, "Vintage Leather Jacket");
        assert_eq!(draft.condition, Condition::UsedExcellent);
        assert_eq!(draft.suggested_price, Some(45.0));
        assert_eq!(draft.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn strips_known_markdown_fences() {
        let fenced = format!("```json\n{VALID_OBJECT}\n```");
        let draft = parse_listing_draft(&fenced).expect("parse");
        assert_eq!(draft.category_keyword, "men's leather jacket");

        let plain_fence = format!("```\n{VALID_OBJECT}\n```");
        assert!(parse_listing_draft(&plain_fence).is_ok());
    }

    #[test]
    fn rejects_prose_before_the_object() {
        let noisy = format!("Here is your listing:\n{VALID_OBJECT}");
        assert!(matches!(
            parse_listing_draft(&noisy),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_prose_after_the_object() {
        let noisy = format!("{VALID_OBJECT}\nLet me know if you need edits!");
        assert!(matches!(
            parse_listing_draft(&noisy),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_prose_outside_the_fence() {
        let noisy = format!("Sure!\n```json\n{VALID_OBJECT}\n```");
        assert!(matches!(
            parse_listing_draft(&noisy),
            Err(ExtractionError::Malformed(_))
        ));

        let trailing = format!("```json\n{VALID_OBJECT}\n```\nAnything else?");
        assert!(matches!(
            parse_listing_draft(&trailing),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_title() {
        let body = r#"{
            "description": "Nice jacket.",
            "condition": "USED_GOOD",
            "category_keyword": "jacket"
        }"#;
        assert!(matches!(
            parse_listing_draft(body),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_title_over_eighty_characters() {
        let long_title = "x".repeat(81);
        let body = format!(
            r#"{{
                "title": "{long_title}",
                "description": "desc",
                "condition": "NEW_OTHER",
                "category_keyword": "widget"
            }}"#
        );
        assert!(matches!(
            parse_listing_draft(&body),
            Err(ExtractionError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_condition_outside_the_vocabulary() {
        let body = r#"{
            "title": "Widget",
            "description": "desc",
            "condition": "LIKE_NEW",
            "category_keyword": "widget"
        }"#;
        assert!(matches!(
            parse_listing_draft(body),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_negative_price_and_bad_currency() {
        let negative = r#"{
            "title": "Widget",
            "description": "desc",
            "condition": "USED_GOOD",
            "category_keyword": "widget",
            "suggested_price": -5.0
        }"#;
        assert!(matches!(
            parse_listing_draft(negative),
            Err(ExtractionError::Invalid(_))
        ));

        let bad_currency = r#"{
            "title": "Widget",
            "description": "desc",
            "condition": "USED_GOOD",
            "category_keyword": "widget",
            "currency": "US$"
        }"#;
        assert!(matches!(
            parse_listing_draft(bad_currency),
            Err(ExtractionError::Invalid(_))
        ));
    }

    #[test]
    fn blank_brand_normalizes_to_unbranded() {
        let body = r#"{
            "title": "Widget",
            "description": "desc",
            "brand": "  ",
            "condition": "USED_GOOD",
            "category_keyword": "widget"
        }"#;
        let draft = parse_listing_draft(body).expect("parse");
        assert_eq!(draft.brand, "Unbranded");
    }

    #[test]
    fn price_and_currency_stay_optional() {
        let body = r#"{
            "title": "Widget",
            "description": "desc",
            "condition": "NEW_OTHER",
            "category_keyword": "widget"
        }"#;
        let draft = parse_listing_draft(body).expect("parse");
        assert!(draft.suggested_price.is_none());
        assert!(draft.currency.is_none());
    }
}
