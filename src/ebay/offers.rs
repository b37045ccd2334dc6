use crate::config::{EbayConfig, PolicySet};
use crate::ebay::OfferWriter;
use crate::http::build_client;
use crate::models::ListingDraft;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marketplace floor for a fixed-price offer, used when extraction produced
/// no price.
pub const MINIMUM_OFFER_PRICE: f64 = 0.99;
pub const FALLBACK_CURRENCY: &str = "USD";

#[derive(Debug, Error)]
pub enum OfferError {
    #[error("marketplace credential is not configured")]
    MissingCredential,
    #[error("offer request failed: {0}")]
    Transport(String),
    #[error("offer endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("offer endpoint accepted the request but returned no offerId")]
    MissingOfferId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPolicies {
    pub fulfillment_policy_id: String,
    pub payment_policy_id: String,
    pub return_policy_id: String,
}

impl From<&PolicySet> for ListingPolicies {
    fn from(policies: &PolicySet) -> Self {
        Self {
            fulfillment_policy_id: policies.fulfillment_policy_id.clone(),
            payment_policy_id: policies.payment_policy_id.clone(),
            return_policy_id: policies.return_policy_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingSummary {
    pub price: Price,
}

#[derive(Debug, Clone, Serialize)]
pub struct Price {
    pub value: String,
    pub currency: String,
}

impl Price {
    pub fn from_amount(amount: f64, currency: &str) -> Self {
        Self {
            value: format!("{amount:.2}"),
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequest {
    pub sku: String,
    pub marketplace_id: String,
    pub format: &'static str,
    pub quantity: i32,
    pub listing_policies: ListingPolicies,
    pub pricing_summary: PricingSummary,
    pub listing_status: &'static str,
}

/// Price and currency actually submitted for a draft, after fallbacks.
pub(crate) fn resolved_price(draft: &ListingDraft) -> (f64, String) {
    (
        draft.suggested_price.unwrap_or(MINIMUM_OFFER_PRICE),
        draft
            .currency
            .clone()
            .unwrap_or_else(|| FALLBACK_CURRENCY.to_string()),
    )
}

pub(crate) fn create_offer_request(
    sku: &str,
    draft: &ListingDraft,
    policies: &PolicySet,
    marketplace_id: &str,
) -> CreateOfferRequest {
    let (amount, currency) = resolved_price(draft);
    CreateOfferRequest {
        sku: sku.to_string(),
        marketplace_id: marketplace_id.to_string(),
        format: "FIXED_PRICE",
        quantity: 1,
        listing_policies: ListingPolicies::from(policies),
        pricing_summary: PricingSummary {
            price: Price::from_amount(amount, &currency),
        },
        // Offers leave this system as drafts; publishing is a human decision.
        listing_status: "DRAFT",
    }
}

pub struct EbayOfferClient {
    http: Client,
    base_url: String,
    bearer_token: String,
    marketplace_id: String,
}

impl EbayOfferClient {
    pub fn new(config: &EbayConfig) -> Self {
        Self {
            http: build_client(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            marketplace_id: config.marketplace_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OfferResponse {
    #[serde(rename = "offerId")]
    offer_id: Option<String>,
}

#[async_trait]
impl OfferWriter for EbayOfferClient {
    async fn create_offer(
        &self,
        sku: &str,
        draft: &ListingDraft,
        policies: &PolicySet,
    ) -> Result<String, OfferError> {
        if self.bearer_token.trim().is_empty() {
            return Err(OfferError::MissingCredential);
        }

        let payload = create_offer_request(sku, draft, policies, &self.marketplace_id);
        let response = self
            .http
            .post(format!("{}/offer", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| OfferError::Transport(err.to_string()))?;

        // Only 201 Created counts; any other status means no draft offer.
        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(OfferError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: OfferResponse = response
            .json()
            .await
            .map_err(|err| OfferError::Transport(err.to_string()))?;

        payload
            .offer_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(OfferError::MissingOfferId)
    }
}
