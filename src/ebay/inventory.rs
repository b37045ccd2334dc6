use crate::config::EbayConfig;
use crate::ebay::InventoryWriter;
use crate::http::build_client;
use crate::models::ListingDraft;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use urlencoding::encode;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("marketplace credential is not configured")]
    MissingCredential,
    #[error("inventory request failed: {0}")]
    Transport(String),
    #[error("inventory endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemRequest {
    pub product: InventoryProduct,
    pub condition: &'static str,
    pub condition_description: String,
    pub group: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryProduct {
    pub title: String,
    pub description: String,
    pub aspects: BTreeMap<String, Vec<String>>,
    pub image_urls: Vec<String>,
}

/// Caller-supplied inventory key: `SKU-` plus the first eight hex characters
/// of a v4 UUID, uppercased. Uniqueness is probabilistic; there is no remote
/// existence check and no retry on collision.
pub fn generate_sku() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("SKU-{}", token[..8].to_uppercase())
}

pub(crate) fn inventory_item_request(
    draft: &ListingDraft,
    media_ref: &str,
) -> InventoryItemRequest {
    let mut aspects = BTreeMap::new();
    aspects.insert("Brand".to_string(), vec![draft.brand.clone()]);
    aspects.insert(
        "Condition".to_string(),
        vec![draft.condition.as_str().to_string()],
    );
    InventoryItemRequest {
        product: InventoryProduct {
            title: draft.title.clone(),
            description: draft.description.clone(),
            aspects,
            image_urls: vec![media_ref.to_string()],
        },
        condition: draft.condition.inventory_code(),
        condition_description: format!("AI-generated listing for: {}", draft.title),
        group: "SINGLE",
    }
}

pub struct EbayInventoryClient {
    http: Client,
    base_url: String,
    bearer_token: String,
}

impl EbayInventoryClient {
    pub fn new(config: &EbayConfig) -> Self {
        Self {
            http: build_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        }
    }
}

#[async_trait]
impl InventoryWriter for EbayInventoryClient {
    async fn create_item(
        &self,
        draft: &ListingDraft,
        media_ref: &str,
    ) -> Result<String, InventoryError> {
        if self.bearer_token.trim().is_empty() {
            return Err(InventoryError::MissingCredential);
        }

        // The remote API keys the item by a caller-supplied SKU in the URL
        // path, so the SKU exists before the write is issued.
        let sku = generate_sku();
        let payload = inventory_item_request(draft, media_ref);
        let url = format!("{}/inventory_item/{}", self.base_url, encode(&sku));

        let response = self
            .http
            .put(url)
            .bearer_auth(&self.bearer_token)
            .header("Content-Language", "en-US")
            .json(&payload)
            .send()
            .await
            .map_err(|err| InventoryError::Transport(err.to_string()))?;

        // 204 No Content is the only acknowledged success; a 200 with a body
        // means the write did not land the way a draft listing needs it to.
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(sku)
    }
}
