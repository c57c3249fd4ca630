//! Document-level extraction entry points.
//!
//! [`InvoiceExtractor`] owns the configuration and the transport and drives
//! a whole document: load every page image, run the pages through the
//! retrying client, merge the page records and decide whether the document
//! as a whole produced anything.

use crate::chat;
use crate::config::{ExtractionConfig, PageFailurePolicy};
use crate::error::InvoiceError;
use crate::output::{ExtractionOutput, ExtractionStats, PageResult};
use crate::pipeline::input::{ImageFiles, PageImage, PageSource};
use crate::pipeline::llm;
use crate::pipeline::merge::merge_pages;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::ExtractedRecord;
use crate::transport::{ModelTransport, OllamaTransport};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extracts invoices with one configuration and one shared transport.
///
/// # Example
/// ```rust,no_run
/// use invoice_vlm::{ExtractionConfig, InvoiceExtractor, FieldKey};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = InvoiceExtractor::new(ExtractionConfig::default())?;
/// let output = extractor.extract_image("invoice.png").await?;
/// println!("{}", output.record.display_value(FieldKey::InvoiceNumber));
///
/// let answer = extractor.ask(&output.record, "When is payment due?").await?;
/// println!("{answer}");
/// # Ok(())
/// # }
/// ```
pub struct InvoiceExtractor {
    config: ExtractionConfig,
    transport: Arc<dyn ModelTransport>,
}

impl std::fmt::Debug for InvoiceExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InvoiceExtractor {
    /// Create an extractor. Uses `config.transport` when set, otherwise an
    /// [`OllamaTransport`] for `config.base_url`.
    pub fn new(config: ExtractionConfig) -> Result<Self, InvoiceError> {
        let transport: Arc<dyn ModelTransport> = match &config.transport {
            Some(t) => Arc::clone(t),
            None => Arc::new(OllamaTransport::with_connect_timeout(
                &config.base_url,
                config.request_timeout_secs.map(Duration::from_secs),
            )?),
        };
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract a single image file.
    pub async fn extract_image(&self, path: impl AsRef<Path>) -> Result<ExtractionOutput, InvoiceError> {
        let path = path.as_ref();
        self.extract_files([path], display_name(path)).await
    }

    /// Extract image files as the pages of one document, in the given order.
    pub async fn extract_files<I, P>(
        &self,
        paths: I,
        filename: impl Into<String>,
    ) -> Result<ExtractionOutput, InvoiceError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let source = ImageFiles::new(paths).with_optimisation(self.config.optimise_images);
        self.extract_document(&source, filename).await
    }

    /// Extract every page of `source` and merge the results.
    ///
    /// # Errors
    /// - any page image cannot be loaded (checked before the first request)
    /// - [`InvoiceError::EmptyDocument`] when the source has no pages
    /// - [`InvoiceError::PageFailed`] on the first failed page under
    ///   [`PageFailurePolicy::Abort`]
    /// - [`InvoiceError::NothingExtracted`] when the merged record has no
    ///   field at all
    pub async fn extract_document(
        &self,
        source: &dyn PageSource,
        filename: impl Into<String>,
    ) -> Result<ExtractionOutput, InvoiceError> {
        let start = Instant::now();
        let filename = filename.into();
        let total_pages = source.page_count();
        if total_pages == 0 {
            return Err(InvoiceError::EmptyDocument);
        }
        info!("Extracting {} ({} pages)", filename, total_pages);

        // ── Step 1: Load page images ─────────────────────────────────────────
        let mut images: Vec<PageImage> = Vec::with_capacity(total_pages);
        for index in 0..total_pages {
            images.push(source.page_image(index).await?);
        }
        debug!("Loaded {} page images", images.len());

        let progress: ProgressCallback = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        progress.on_document_start(total_pages);

        // ── Step 2: Run pages through the model ──────────────────────────────
        let results = self.process_pages(&images, &progress).await?;

        // ── Step 3: Merge ────────────────────────────────────────────────────
        let (page_records, pages): (Vec<_>, Vec<_>) = results
            .into_iter()
            .map(|r| (r.record, r.outcome))
            .unzip();
        let record = merge_pages(&page_records, self.config.merge_precedence);

        let processed = pages.iter().filter(|p| p.succeeded()).count();
        progress.on_document_complete(total_pages, processed);

        // ── Step 4: Classify ─────────────────────────────────────────────────
        if record.is_empty() {
            let first_error = pages
                .iter()
                .find_map(|p| p.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_else(|| "every field was not available".to_string());
            return Err(InvoiceError::NothingExtracted {
                pages: total_pages,
                first_error,
            });
        }

        let stats = ExtractionStats {
            total_pages,
            processed_pages: processed,
            failed_pages: total_pages - processed,
            total_attempts: pages.iter().map(|p| u64::from(p.attempts)).sum(),
            fields_found: record.present_count(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {}/13 fields from {}/{} pages, {}ms",
            stats.fields_found, processed, total_pages, stats.total_duration_ms
        );

        Ok(ExtractionOutput {
            filename,
            record,
            page_records,
            pages,
            stats,
        })
    }

    /// Synchronous wrapper around [`Self::extract_document`].
    ///
    /// Creates a temporary tokio runtime internally; do not call it from
    /// inside an async context.
    pub fn extract_document_sync(
        &self,
        source: &dyn PageSource,
        filename: impl Into<String>,
    ) -> Result<ExtractionOutput, InvoiceError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| InvoiceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract_document(source, filename))
    }

    /// Ask a question about an extracted record.
    pub async fn ask(&self, record: &ExtractedRecord, question: &str) -> Result<String, InvoiceError> {
        let progress: ProgressCallback = self
            .config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        chat::ask(&*self.transport, &self.config, record, question, &*progress).await
    }

    /// Run every page, at most `concurrency` at a time, yielding results in
    /// page order.
    async fn process_pages(
        &self,
        images: &[PageImage],
        progress: &ProgressCallback,
    ) -> Result<Vec<PageResult>, InvoiceError> {
        let total_pages = images.len();
        let transport = &*self.transport;
        let config = &self.config;
        let progress = &**progress;

        let mut pages = stream::iter(images.iter().enumerate().map(|(idx, image)| {
            let page_num = idx + 1;
            async move {
                progress.on_page_start(page_num, total_pages);
                let result = llm::extract_page(transport, page_num, image, config, progress).await;
                match &result.outcome.error {
                    None => progress.on_page_complete(
                        page_num,
                        total_pages,
                        result.outcome.fields_found,
                    ),
                    Some(e) => progress.on_page_error(page_num, total_pages, &e.to_string()),
                }
                result
            }
        }))
        .buffered(config.concurrency.max(1));

        let mut results = Vec::with_capacity(total_pages);
        while let Some(result) = pages.next().await {
            if let Some(err) = &result.outcome.error {
                warn!("Page {} failed: {}", result.outcome.page_num, err);
                if config.page_failure == PageFailurePolicy::Abort {
                    return Err(InvoiceError::PageFailed {
                        page: result.outcome.page_num,
                        source: err.clone(),
                    });
                }
            }
            results.push(result);
        }
        Ok(results)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::EncodedPages;

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/tmp/scans/inv-7.png")), "inv-7.png");
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let extractor = InvoiceExtractor::new(ExtractionConfig::default()).unwrap();
        let err = extractor
            .extract_document(&EncodedPages::default(), "empty")
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceError::EmptyDocument));
    }

    #[test]
    fn debug_does_not_print_transport() {
        let extractor = InvoiceExtractor::new(ExtractionConfig::default()).unwrap();
        assert!(format!("{extractor:?}").contains("InvoiceExtractor"));
    }
}
