//! Page input: where page images come from.
//!
//! The extractor only needs a page count and, per page, a base64 image.
//! [`PageSource`] is that seam. [`ImageFiles`] reads image files from disk
//! (one file per page); [`EncodedPages`] holds pages that are already in
//! memory, such as the output of a PDF rasteriser or images received over
//! the wire as data URLs.
//!
//! Rasterisers feeding [`EncodedPages`] should render at [`RENDER_SCALE`];
//! at that scale invoice fine print stays legible to the model.

use crate::error::InvoiceError;
use crate::pipeline::encode::{clean_base64, encode_dynamic_image, encode_image_bytes};
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Scale factor PDF pages are rendered at before extraction.
pub const RENDER_SCALE: f32 = 2.0;

/// One page image, ready for the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Cleaned base64 payload (no data-URL prefix, padded).
    pub base64: String,
    /// Human-readable reference to the page, e.g. a file path.
    pub label: String,
}

impl PageImage {
    pub fn new(base64: &str, label: impl Into<String>) -> Self {
        Self {
            base64: clean_base64(base64),
            label: label.into(),
        }
    }
}

/// A document as a sequence of page images.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Reference for page `index` (0-based), used in history and errors.
    fn page_label(&self, index: usize) -> String {
        format!("page{}", index + 1)
    }

    /// Load page `index` (0-based).
    async fn page_image(&self, index: usize) -> Result<PageImage, InvoiceError>;
}

/// Image files on disk, one page each, in the given order.
#[derive(Debug, Clone)]
pub struct ImageFiles {
    paths: Vec<PathBuf>,
    optimise: bool,
}

impl ImageFiles {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            optimise: true,
        }
    }

    /// Whether to downscale files over 10 MiB. Default: true.
    pub fn with_optimisation(mut self, optimise: bool) -> Self {
        self.optimise = optimise;
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    async fn read(path: &Path) -> Result<Vec<u8>, InvoiceError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(InvoiceError::ImageNotFound {
                path: path.to_path_buf(),
            }),
            Err(source) => Err(InvoiceError::ImageReadFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl PageSource for ImageFiles {
    fn page_count(&self) -> usize {
        self.paths.len()
    }

    fn page_label(&self, index: usize) -> String {
        self.paths
            .get(index)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("page{}", index + 1))
    }

    async fn page_image(&self, index: usize) -> Result<PageImage, InvoiceError> {
        let label = self.page_label(index);
        let path = self
            .paths
            .get(index)
            .ok_or_else(|| InvoiceError::Internal(format!("Page index {index} out of range")))?;

        let bytes = Self::read(path).await?;
        debug!("Read {} ({} bytes)", label, bytes.len());

        // Decoding and resizing a large scan is CPU-bound.
        let optimise = self.optimise;
        let encoded = tokio::task::spawn_blocking(move || encode_image_bytes(&bytes, optimise))
            .await
            .map_err(|e| InvoiceError::Internal(format!("Encode task panicked: {e}")))?
            .map_err(|e| InvoiceError::ImageDecodeFailed {
                label: label.clone(),
                detail: e.to_string(),
            })?;

        Ok(PageImage::new(&encoded, label))
    }
}

/// Pages already held in memory.
#[derive(Debug, Clone, Default)]
pub struct EncodedPages {
    pages: Vec<PageImage>,
}

impl EncodedPages {
    /// Pages from base64 strings or data URLs, labelled `page1`, `page2`, …
    pub fn from_base64<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, b64)| PageImage::new(b64.as_ref(), format!("page{}", i + 1)))
                .collect(),
        }
    }

    /// Pages from decoded images (e.g. rasterised PDF pages), PNG-encoded.
    pub fn from_images(images: &[DynamicImage]) -> Result<Self, InvoiceError> {
        let pages = images
            .iter()
            .enumerate()
            .map(|(i, img)| {
                let label = format!("page{}", i + 1);
                encode_dynamic_image(img)
                    .map(|b64| PageImage::new(&b64, label.clone()))
                    .map_err(|e| InvoiceError::ImageDecodeFailed {
                        label,
                        detail: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pages })
    }

    pub fn push(&mut self, page: PageImage) {
        self.pages.push(page);
    }
}

#[async_trait]
impl PageSource for EncodedPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_label(&self, index: usize) -> String {
        self.pages
            .get(index)
            .map(|p| p.label.clone())
            .unwrap_or_else(|| format!("page{}", index + 1))
    }

    async fn page_image(&self, index: usize) -> Result<PageImage, InvoiceError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| InvoiceError::Internal(format!("Page index {index} out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn image_files_reads_and_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page1.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();

        let source = ImageFiles::new([&path]);
        assert_eq!(source.page_count(), 1);
        let page = source.page_image(0).await.unwrap();
        assert_eq!(page.label, path.display().to_string());
        assert_eq!(page.base64.len() % 4, 0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let source = ImageFiles::new(["/definitely/not/here.png"]);
        let err = source.page_image(0).await.unwrap_err();
        assert!(matches!(err, InvoiceError::ImageNotFound { .. }));
    }

    #[tokio::test]
    async fn encoded_pages_strip_data_url() {
        let source = EncodedPages::from_base64(["data:image/png;base64,QUJD", "QQ"]);
        assert_eq!(source.page_count(), 2);
        assert_eq!(source.page_label(1), "page2");
        assert_eq!(source.page_image(0).await.unwrap().base64, "QUJD");
        assert_eq!(source.page_image(1).await.unwrap().base64, "QQ==");
        assert!(source.page_image(2).await.is_err());
    }

    #[tokio::test]
    async fn encoded_pages_from_images() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let source = EncodedPages::from_images(&[img]).unwrap();
        let page = source.page_image(0).await.unwrap();
        assert!(!page.base64.is_empty());
    }
}
