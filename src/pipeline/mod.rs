//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements one step, so each can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ clean ──▶ parse ──▶ merge
//! (pages)   (base64)   (VLM)   (text)    (record)   (document)
//! ```
//!
//! 1. [`input`] : page images from files or memory
//! 2. [`encode`]: base64 cleaning and downscaling of oversized scans
//! 3. [`llm`]   : stream a page through the model; the only stage that
//!    retries and the only one with network I/O
//! 4. [`clean`] : strip Markdown decoration from the raw response
//! 5. [`parse`] : map `Label: value` lines onto the 13 fields
//! 6. [`merge`] : fold page records into one

pub mod clean;
pub mod encode;
pub mod input;
pub mod llm;
pub mod merge;
pub mod parse;
