//! # invoice-vlm
//!
//! Extract structured invoice fields from page images using a Vision
//! Language Model served by Ollama.
//!
//! Each page image is sent to the model with a prompt asking for 13 fields
//! as `Label: value` lines plus a free-form section of everything else on
//! the page. The streamed answer is cleaned of Markdown decoration, parsed
//! into an [`ExtractedRecord`], and retried when it carries nothing usable.
//! Pages are merged into one record per document, and follow-up questions
//! about a record can be answered through the same model service.
//!
//! ## Pipeline Overview
//!
//! ```text
//! page images
//!  │
//!  ├─ 1. Input   image files or in-memory pages (PageSource)
//!  ├─ 2. Encode  base64, oversized scans downscaled to 2048 px
//!  ├─ 3. VLM     streamed /api/chat request, 3 attempts, 1 s apart
//!  ├─ 4. Clean   strip fences, bold, headers, bullets, notes
//!  ├─ 5. Parse   alias table → 13 fields, currency-aware amounts
//!  └─ 6. Merge   pages folded in order, later values win
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_vlm::{ExtractionConfig, InvoiceExtractor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .base_url("http://localhost:11434")
//!         .build()?;
//!     let extractor = InvoiceExtractor::new(config)?;
//!     let output = extractor
//!         .extract_files(["scan-p1.png", "scan-p2.png"], "scan.pdf")
//!         .await?;
//!     for row in output.record.rows() {
//!         println!("{}: {}", row.display_name, row.formatted);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! invoice-vlm = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod schema;
pub mod stream;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, MergePrecedence, PageFailurePolicy};
pub use error::{InvoiceError, PageError, TransportError};
pub use extract::InvoiceExtractor;
pub use history::{HistoryEntry, SessionHistory};
pub use output::{ExtractionOutput, ExtractionStats, PageOutcome, PageResult};
pub use pipeline::input::{EncodedPages, ImageFiles, PageImage, PageSource};
pub use pipeline::merge::merge_pages;
pub use pipeline::parse::parse_response;
pub use progress::{
    ChannelProgress, ExtractionProgressCallback, NoopProgressCallback, ProgressCallback,
    ProgressEvent,
};
pub use record::{ExtractedRecord, FieldRow};
pub use schema::{Currency, FieldKey, NOT_AVAILABLE};
pub use transport::{ModelRequest, ModelTransport, OllamaTransport};
