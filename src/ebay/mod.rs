pub mod inventory;
pub mod media;
pub mod offers;

pub use inventory::EbayInventoryClient;
pub use media::EbayMediaClient;
pub use offers::EbayOfferClient;

use crate::config::PolicySet;
use crate::models::{ListingDraft, RawImage};
use async_trait::async_trait;
use inventory::InventoryError;
use media::UploadError;
use offers::OfferError;

/// Pushes image bytes to the marketplace media endpoint and returns the
/// opaque file reference. The remote media object is never deleted by this
/// system, even when a later stage fails.
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, image: &RawImage, name: &str) -> Result<String, UploadError>;
}

/// Writes an inventory record under a freshly generated SKU. The returned
/// SKU is the join key a subsequent offer must reference verbatim.
#[async_trait]
pub trait InventoryWriter: Send + Sync {
    async fn create_item(
        &self,
        draft: &ListingDraft,
        media_ref: &str,
    ) -> Result<String, InventoryError>;
}

/// Creates a fixed-price draft offer for an existing inventory SKU.
#[async_trait]
pub trait OfferWriter: Send + Sync {
    async fn create_offer(
        &self,
        sku: &str,
        draft: &ListingDraft,
        policies: &PolicySet,
    ) -> Result<String, OfferError>;
}
