use crate::config::{AppConfig, ConfigError};
use crate::ebay::inventory::InventoryError;
use crate::ebay::media::UploadError;
use crate::ebay::offers::OfferError;
use crate::ebay::{
    EbayInventoryClient, EbayMediaClient, EbayOfferClient, InventoryWriter, MediaUploader,
    OfferWriter, offers,
};
use crate::models::{DraftOverrides, ListingDraft, ListingResponse, RawImage, StageReport};
use crate::vision::{ExtractionError, GeminiVision, VisionExtractor};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// In-progress states of one pipeline invocation, in execution order. A run
/// moves strictly forward; each stage is attempted exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Uploading,
    WritingItem,
    WritingOffer,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extracting => "extracting",
            Stage::Uploading => "uploading",
            Stage::WritingItem => "writing_item",
            Stage::WritingOffer => "writing_offer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Offer(#[from] OfferError),
}

/// Remote side effects a failed run left behind. Nothing is rolled back:
/// an uploaded media object or written inventory item stays on the
/// marketplace and is reconciled manually.
#[derive(Debug, Clone, Default)]
pub struct RemoteFootprint {
    pub media_uploaded: bool,
    pub inventory_sku: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: Stage,
        source: StageError,
        footprint: RemoteFootprint,
    },
}

impl PipelineError {
    pub fn stage_name(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "preflight",
            PipelineError::Stage { stage, .. } => stage.as_str(),
        }
    }

    pub fn detail(&self) -> String {
        match self {
            PipelineError::Config(err) => err.to_string(),
            PipelineError::Stage { source, .. } => source.to_string(),
        }
    }

    pub fn footprint(&self) -> RemoteFootprint {
        match self {
            PipelineError::Config(_) => RemoteFootprint::default(),
            PipelineError::Stage { footprint, .. } => footprint.clone(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, PipelineError::Config(_))
    }
}

/// Orchestrates one photo → draft-listing run: extraction, media upload,
/// inventory write, offer write, in that order, each stage feeding the next.
/// Holds no mutable state across invocations; concurrent runs share only the
/// read-only configuration.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<AppConfig>,
    extractor: Arc<dyn VisionExtractor>,
    media: Arc<dyn MediaUploader>,
    inventory: Arc<dyn InventoryWriter>,
    offers: Arc<dyn OfferWriter>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        Self {
            extractor: Arc::new(GeminiVision::new(config.vision.clone())),
            media: Arc::new(EbayMediaClient::new(&config.ebay)),
            inventory: Arc::new(EbayInventoryClient::new(&config.ebay)),
            offers: Arc::new(EbayOfferClient::new(&config.ebay)),
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        config: AppConfig,
        extractor: Arc<dyn VisionExtractor>,
        media: Arc<dyn MediaUploader>,
        inventory: Arc<dyn InventoryWriter>,
        offers: Arc<dyn OfferWriter>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
            media,
            inventory,
            offers,
        }
    }

    pub async fn run(
        &self,
        image: RawImage,
        overrides: Option<DraftOverrides>,
    ) -> Result<ListingResponse, PipelineError> {
        // Pre-flight: a missing credential or policy id fails here, before
        // any remote call is attempted.
        self.config.validate()?;

        let mut stages = Vec::new();
        let mut footprint = RemoteFootprint::default();

        let started = Instant::now();
        let mut draft = match self.extractor.extract(&image).await {
            Ok(draft) => draft,
            Err(err) => return Err(stage_failure(Stage::Extracting, err.into(), footprint)),
        };
        let edited = overrides.is_some();
        if let Some(overrides) = overrides {
            apply_overrides(&mut draft, overrides);
        }
        record(
            &mut stages,
            "extracting",
            started,
            json!({
                "title": draft.title,
                "brand": draft.brand,
                "condition": draft.condition.as_str(),
                "category_keyword": draft.category_keyword,
                "edited": edited,
            }),
        );

        let file_name = format!("{}.jpg", Uuid::new_v4());
        let started = Instant::now();
        let media_ref = match self.media.upload(&image, &file_name).await {
            Ok(media_ref) => media_ref,
            Err(err) => return Err(stage_failure(Stage::Uploading, err.into(), footprint)),
        };
        footprint.media_uploaded = true;
        record(
            &mut stages,
            "uploading",
            started,
            json!({
                "file_id": media_ref,
                "file_name": file_name,
                "bytes": image.bytes.len(),
                "source_content_type": image.content_type,
            }),
        );

        let started = Instant::now();
        let sku = match self.inventory.create_item(&draft, &media_ref).await {
            Ok(sku) => sku,
            Err(err) => return Err(stage_failure(Stage::WritingItem, err.into(), footprint)),
        };
        footprint.inventory_sku = Some(sku.clone());
        record(
            &mut stages,
            "writing_item",
            started,
            json!({
                "sku": sku,
                "condition": draft.condition.inventory_code(),
            }),
        );

        let started = Instant::now();
        let offer_id = match self
            .offers
            .create_offer(&sku, &draft, &self.config.ebay.policies)
            .await
        {
            Ok(offer_id) => offer_id,
            Err(err) => return Err(stage_failure(Stage::WritingOffer, err.into(), footprint)),
        };
        let (suggested_price, currency) = offers::resolved_price(&draft);
        record(
            &mut stages,
            "writing_offer",
            started,
            json!({
                "offer_id": offer_id,
                "price": format!("{suggested_price:.2}"),
                "currency": currency,
                "status": "DRAFT",
            }),
        );

        info!(
            target = "snaplist.pipeline",
            sku = %sku,
            offer_id = %offer_id,
            "draft listing created",
        );

        Ok(ListingResponse {
            sku,
            offer_id,
            title: draft.title,
            suggested_price,
            currency,
            stages,
        })
    }
}

fn apply_overrides(draft: &mut ListingDraft, overrides: DraftOverrides) {
    if let Some(title) = overrides.title {
        draft.title = title;
    }
    if let Some(description) = overrides.description {
        draft.description = description;
    }
    if let Some(condition) = overrides.condition {
        draft.condition = condition;
    }
}

fn stage_failure(stage: Stage, source: StageError, footprint: RemoteFootprint) -> PipelineError {
    warn!(
        target = "snaplist.pipeline",
        stage = stage.as_str(),
        error = %source,
        media_uploaded = footprint.media_uploaded,
        inventory_sku = footprint.inventory_sku.as_deref().unwrap_or(""),
        "pipeline stage failed",
    );
    PipelineError::Stage {
        stage,
        source,
        footprint,
    }
}

fn record(stages: &mut Vec<StageReport>, name: &'static str, started: Instant, output: Value) {
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    stages.push(StageReport::new(name, elapsed_ms, output));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, PolicySet};
    use crate::ebay::inventory::generate_sku;
    use crate::models::Condition;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn extracted_draft() -> ListingDraft {
        ListingDraft {
            title: "Vintage Leather Jacket".to_string(),
            description: "Supple full-grain leather with light wear.".to_string(),
            brand: "Unbranded".to_string(),
            condition: Condition::UsedExcellent,
            category_keyword: "men's leather jacket".to_string(),
            suggested_price: Some(45.0),
            currency: Some("USD".to_string()),
        }
    }

    fn sample_image() -> RawImage {
        RawImage::jpeg(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    struct FakeExtractor {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl VisionExtractor for FakeExtractor {
        async fn extract(&self, _image: &RawImage) -> Result<ListingDraft, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractionError::Malformed("trailing characters".into()));
            }
            Ok(extracted_draft())
        }
    }

    struct FakeMedia {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl MediaUploader for FakeMedia {
        async fn upload(&self, _image: &RawImage, _name: &str) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UploadError::Status {
                    status: 500,
                    body: "upstream unavailable".into(),
                });
            }
            Ok("f123".to_string())
        }
    }

    struct FakeInventory {
        calls: Arc<AtomicUsize>,
        fail: bool,
        fixed_sku: Option<String>,
        issued_sku: Arc<Mutex<Option<String>>>,
        seen_condition: Arc<Mutex<Option<Condition>>>,
    }

    #[async_trait]
    impl InventoryWriter for FakeInventory {
        async fn create_item(
            &self,
            draft: &ListingDraft,
            _media_ref: &str,
        ) -> Result<String, InventoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                // A 200 with a body is still a failure for this stage.
                return Err(InventoryError::Status {
                    status: 200,
                    body: "{\"warnings\":[]}".into(),
                });
            }
            *self.seen_condition.lock().expect("lock") = Some(draft.condition);
            let sku = self
                .fixed_sku
                .clone()
                .unwrap_or_else(generate_sku);
            *self.issued_sku.lock().expect("lock") = Some(sku.clone());
            Ok(sku)
        }
    }

    struct FakeOffers {
        calls: Arc<AtomicUsize>,
        fail: bool,
        seen_sku: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl OfferWriter for FakeOffers {
        async fn create_offer(
            &self,
            sku: &str,
            _draft: &ListingDraft,
            _policies: &PolicySet,
        ) -> Result<String, OfferError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_sku.lock().expect("lock") = Some(sku.to_string());
            if self.fail {
                return Err(OfferError::Status {
                    status: 400,
                    body: "invalid policy".into(),
                });
            }
            Ok("5001234567".to_string())
        }
    }

    struct Harness {
        pipeline: Pipeline,
        extract_calls: Arc<AtomicUsize>,
        upload_calls: Arc<AtomicUsize>,
        item_calls: Arc<AtomicUsize>,
        offer_calls: Arc<AtomicUsize>,
        issued_sku: Arc<Mutex<Option<String>>>,
        seen_sku: Arc<Mutex<Option<String>>>,
        seen_condition: Arc<Mutex<Option<Condition>>>,
    }

    fn harness(fail_at: Option<Stage>, fixed_sku: Option<&str>) -> Harness {
        let extract_calls = Arc::new(AtomicUsize::new(0));
        let upload_calls = Arc::new(AtomicUsize::new(0));
        let item_calls = Arc::new(AtomicUsize::new(0));
        let offer_calls = Arc::new(AtomicUsize::new(0));
        let issued_sku = Arc::new(Mutex::new(None));
        let seen_sku = Arc::new(Mutex::new(None));
        let seen_condition = Arc::new(Mutex::new(None));

        let pipeline = Pipeline::with_parts(
            config::test_config(),
            Arc::new(FakeExtractor {
                calls: extract_calls.clone(),
                fail: fail_at == Some(Stage::Extracting),
            }),
            Arc::new(FakeMedia {
                calls: upload_calls.clone(),
                fail: fail_at == Some(Stage::Uploading),
            }),
            Arc::new(FakeInventory {
                calls: item_calls.clone(),
                fail: fail_at == Some(Stage::WritingItem),
                fixed_sku: fixed_sku.map(str::to_string),
                issued_sku: issued_sku.clone(),
                seen_condition: seen_condition.clone(),
            }),
            Arc::new(FakeOffers {
                calls: offer_calls.clone(),
                fail: fail_at == Some(Stage::WritingOffer),
                seen_sku: seen_sku.clone(),
            }),
        );

        Harness {
            pipeline,
            extract_calls,
            upload_calls,
            item_calls,
            offer_calls,
            issued_sku,
            seen_sku,
            seen_condition,
        }
    }

    #[tokio::test]
    async fn creates_a_draft_listing_end_to_end() {
        let harness = harness(None, Some("SKU-AB12CD34"));
        let response = harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect("pipeline run");

        assert_eq!(response.sku, "SKU-AB12CD34");
        assert_eq!(response.offer_id, "5001234567");
        assert_eq!(response.title, "Vintage Leather Jacket");
        assert_eq!(response.suggested_price, 45.0);
        assert_eq!(response.currency, "USD");

        let names: Vec<&str> = response.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["extracting", "uploading", "writing_item", "writing_offer"]
        );
        assert_eq!(harness.extract_calls.load(Ordering::SeqCst), 1);
        assert_eq!(harness.offer_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extraction_failure_stops_before_any_marketplace_call() {
        let harness = harness(Some(Stage::Extracting), None);
        let err = harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect_err("should fail");

        assert_eq!(err.stage_name(), "extracting");
        assert_eq!(harness.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.item_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.offer_calls.load(Ordering::SeqCst), 0);
        let footprint = err.footprint();
        assert!(!footprint.media_uploaded);
        assert!(footprint.inventory_sku.is_none());
    }

    #[tokio::test]
    async fn upload_failure_skips_inventory_and_offer() {
        let harness = harness(Some(Stage::Uploading), None);
        let err = harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect_err("should fail");

        assert_eq!(err.stage_name(), "uploading");
        assert_eq!(harness.item_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.offer_calls.load(Ordering::SeqCst), 0);
        assert!(!err.footprint().media_uploaded);
    }

    #[tokio::test]
    async fn inventory_failure_reports_the_orphaned_media_object() {
        let harness = harness(Some(Stage::WritingItem), None);
        let err = harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect_err("should fail");

        assert_eq!(err.stage_name(), "writing_item");
        assert_eq!(harness.offer_calls.load(Ordering::SeqCst), 0);
        let footprint = err.footprint();
        assert!(footprint.media_uploaded);
        assert!(footprint.inventory_sku.is_none());
    }

    #[tokio::test]
    async fn offer_failure_reports_media_and_inventory_footprint() {
        let harness = harness(Some(Stage::WritingOffer), Some("SKU-AB12CD34"));
        let err = harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect_err("should fail");

        assert_eq!(err.stage_name(), "writing_offer");
        let footprint = err.footprint();
        assert!(footprint.media_uploaded);
        assert_eq!(footprint.inventory_sku.as_deref(), Some("SKU-AB12CD34"));
    }

    #[tokio::test]
    async fn offer_receives_the_exact_sku_inventory_issued() {
        let harness = harness(None, None);
        harness
            .pipeline
            .run(sample_image(), None)
            .await
            .expect("pipeline run");

        let issued = harness.issued_sku.lock().expect("lock").clone();
        let seen = harness.seen_sku.lock().expect("lock").clone();
        assert!(issued.is_some());
        assert_eq!(issued, seen);
    }

    #[tokio::test]
    async fn overrides_replace_extracted_fields_before_any_write() {
        let harness = harness(None, None);
        let overrides = DraftOverrides {
            title: Some("Collector Grade Leather Jacket".to_string()),
            description: None,
            condition: Some(Condition::UsedGood),
        };
        let response = harness
            .pipeline
            .run(sample_image(), Some(overrides))
            .await
            .expect("pipeline run");

        assert_eq!(response.title, "Collector Grade Leather Jacket");
        assert_eq!(
            *harness.seen_condition.lock().expect("lock"),
            Some(Condition::UsedGood)
        );
    }

    #[tokio::test]
    async fn missing_credential_fails_preflight_with_zero_remote_calls() {
        let mut config = config::test_config();
        config.ebay.bearer_token = String::new();

        let extract_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::with_parts(
            config,
            Arc::new(FakeExtractor {
                calls: extract_calls.clone(),
                fail: false,
            }),
            Arc::new(FakeMedia {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }),
            Arc::new(FakeInventory {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                fixed_sku: None,
                issued_sku: Arc::new(Mutex::new(None)),
                seen_condition: Arc::new(Mutex::new(None)),
            }),
            Arc::new(FakeOffers {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
                seen_sku: Arc::new(Mutex::new(None)),
            }),
        );

        let err = pipeline
            .run(sample_image(), None)
            .await
            .expect_err("should fail preflight");

        assert!(err.is_config());
        assert_eq!(err.stage_name(), "preflight");
        assert_eq!(extract_calls.load(Ordering::SeqCst), 0);
    }
}
