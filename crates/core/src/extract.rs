use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::domain::conversation::{FieldValue, ImageRef};
use crate::errors::ExtractionUnavailable;

/// Converts free text into a partial structured-field mapping.
///
/// Contract: only keys drawn from `recognized` may appear in the result;
/// benign unparsable text yields an empty map, not an error. Errors are for
/// genuine unavailability (backend down, timeout) and are recovered by the
/// workflow as an empty extraction for that turn.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        recognized: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable>;
}

/// Optional enrichment from uploaded images. Results flow through the same
/// merge path as text extraction.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image: &ImageRef,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable>;
}

/// Default analyzer: acknowledges the image and contributes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopImageAnalyzer;

#[async_trait]
impl ImageAnalyzer for NoopImageAnalyzer {
    async fn analyze(
        &self,
        _image: &ImageRef,
    ) -> Result<BTreeMap<String, FieldValue>, ExtractionUnavailable> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::conversation::ImageRef;
    use crate::extract::{ImageAnalyzer, NoopImageAnalyzer};

    #[tokio::test]
    async fn noop_analyzer_returns_an_empty_mapping() {
        let analyzer = NoopImageAnalyzer;
        let result = analyzer
            .analyze(&ImageRef("upload-1".to_string()))
            .await
            .expect("noop analysis succeeds");
        assert!(result.is_empty());
    }
}
