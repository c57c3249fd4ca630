//! Model interaction: stream one page through the model, with retries.
//!
//! This module turns a page image into an [`ExtractedRecord`]. It is the
//! only layer that retries; everything below it (transport, stream decoding,
//! cleaning, parsing) reports a failure once and leaves the decision here.
//!
//! ## Retry Strategy
//!
//! An attempt fails when the transport fails, the stream carries no text,
//! the cleaned text has no `Label: value` line at all, or every one of the
//! 13 fields came back absent. Failed attempts are retried after a fixed
//! `retry_delay_ms` (1000 ms by default), up to `max_attempts` attempts in
//! total (at least one). The delay never grows, and there is no sleep after
//! the last attempt.

use crate::config::ExtractionConfig;
use crate::error::PageError;
use crate::output::{PageOutcome, PageResult};
use crate::pipeline::clean::clean_response;
use crate::pipeline::encode::clean_base64;
use crate::pipeline::input::PageImage;
use crate::pipeline::parse::parse_response;
use crate::progress::ExtractionProgressCallback;
use crate::record::ExtractedRecord;
use crate::stream::{collect_text, FragmentPath};
use crate::transport::{ChatRequest, ModelRequest, ModelTransport};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Streamed fragments containing this marker are forwarded as progress.
const PROGRESS_MARKER: &str = "Processing";

/// Extract one page, retrying failed attempts.
///
/// Always returns a [`PageResult`]; a page that failed every attempt has
/// `record == None` and an [`PageError::Exhausted`] in its outcome, so a
/// single bad page never aborts the document by itself.
pub async fn extract_page(
    transport: &dyn ModelTransport,
    page_num: usize,
    image: &PageImage,
    config: &ExtractionConfig,
    progress: &dyn ExtractionProgressCallback,
) -> PageResult {
    let start = Instant::now();
    let request =
        ModelRequest::Chat(ChatRequest::extraction(config, clean_base64(&image.base64)));
    let delay = Duration::from_millis(config.retry_delay_ms);
    let max_attempts = config.max_attempts.max(1);

    let mut last_err: Option<PageError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            sleep(delay).await;
        }

        match run_attempt(transport, &request, page_num, config, progress).await {
            Ok(record) => {
                let fields_found = record.present_count();
                debug!(
                    "Page {}: {}/13 fields on attempt {}, {:?}",
                    page_num,
                    fields_found,
                    attempt,
                    start.elapsed()
                );
                return PageResult {
                    outcome: PageOutcome {
                        page_num,
                        label: image.label.clone(),
                        attempts: attempt,
                        fields_found,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    },
                    record: Some(record),
                };
            }
            Err(e) => {
                let err_msg = e.to_string();
                warn!("Page {}: attempt {} failed: {}", page_num, attempt, err_msg);
                if attempt < max_attempts {
                    debug!("Page {}: retrying in {}ms", page_num, config.retry_delay_ms);
                    progress.on_page_retry(page_num, attempt, &err_msg);
                }
                last_err = Some(e);
            }
        }
    }

    let detail = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "Unknown error".to_string());

    PageResult {
        outcome: PageOutcome {
            page_num,
            label: image.label.clone(),
            attempts: max_attempts,
            fields_found: 0,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(PageError::Exhausted {
                page: page_num,
                attempts: max_attempts,
                detail,
            }),
        },
        record: None,
    }
}

/// One attempt: send, accumulate, clean, parse, validate.
async fn run_attempt(
    transport: &dyn ModelTransport,
    request: &ModelRequest,
    page_num: usize,
    config: &ExtractionConfig,
    progress: &dyn ExtractionProgressCallback,
) -> Result<ExtractedRecord, PageError> {
    let fetch = async {
        let stream = transport.send(request).await?;
        collect_text(stream, FragmentPath::MessageContent, |fragment| {
            if fragment.contains(PROGRESS_MARKER) {
                progress.on_page_fragment(page_num, fragment);
            }
        })
        .await
    };

    let text = match config.request_timeout_secs {
        Some(secs) => timeout(Duration::from_secs(secs), fetch)
            .await
            .map_err(|_| PageError::Timeout { secs })??,
        None => fetch.await?,
    };

    if text.trim().is_empty() {
        return Err(PageError::EmptyResponse);
    }
    debug!("Page {}: {} chars of raw text", page_num, text.len());

    let cleaned = clean_response(&text);
    if !cleaned.contains(':') {
        return Err(PageError::MalformedResponse);
    }

    let mut record = parse_response(&cleaned);
    if record.is_empty() {
        return Err(PageError::NothingExtracted);
    }

    record.full_text = Some(cleaned);
    Ok(record)
}
