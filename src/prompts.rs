//! Prompts sent to the model.
//!
//! Callers can override the extraction prompt via
//! [`crate::config::ExtractionConfig::extraction_prompt`]; the constant here
//! is used only when no override is provided. The parser relies on the
//! `Label: value` layout and the Part 2 marker this prompt asks for.

use crate::record::ExtractedRecord;

/// Default prompt for extracting the invoice fields from a page image.
pub const EXTRACTION_PROMPT: &str = r#"You are a precise invoice data extractor. First, identify the currency from any currency symbols (₹,$,€,£) or currency names in the invoice. Then extract ALL text from the invoice image, including every detail you can see. Organize the information into two parts:

Part 1 - Required Fields (format exactly as shown, DO NOT add currency symbols to amounts):
Invoice number: [exact value or "not available"]
Invoice Date: [DD/MM/YYYY or "not available"]
Invoice Amount: [number only without currency symbol, e.g. "200000.00" or "not available"]
Currency: [Use format: "₹ (Indian Rupee)" for INR, "$ (US Dollar)" for USD, "€ (Euro)" for EUR, "£ (British Pound)" for GBP]
Legal Entity Name: [exact name or "not available"]
Legal Entity Address: [full address or "not available"]
Vendor Name: [exact name or "not available"]
Vendor Address: [full address or "not available"]
Payment Terms: [exact terms or "not available"]
Payment Method: [exact method or "not available"]
VAT ID: [exact number or "not available"]
GL Account Number: [exact number or "not available"]
Bank Account Number: [exact number or "not available"]

Part 2 - Additional Information:
[List ALL other information found in the invoice, including but not limited to:
- Line items and their details
- Tax breakdowns
- Shipping information
- Contact details
- Terms and conditions
- Notes or comments
- Any other text or numbers visible in the invoice]

Format Part 2 as a clear, structured list of all additional information found."#;

const NO_ADDITIONAL_INFORMATION: &str = "No additional information available";

/// Build the question-answering prompt for one extracted record.
///
/// Structured fields are listed as `Display Name: value` in canonical
/// order, absent ones as the sentinel.
pub fn chat_prompt(record: &ExtractedRecord, question: &str) -> String {
    let fields = record
        .iter()
        .map(|(key, _)| format!("{}: {}", key.display_name(), record.display_value(key)))
        .collect::<Vec<_>>()
        .join("\n");

    let additional = record
        .additional_information
        .as_deref()
        .unwrap_or(NO_ADDITIONAL_INFORMATION);

    format!(
        "You are an AI assistant specialized in analyzing invoice data. \
You have access to the following invoice information:\n\n\
Structured Fields:\n{fields}\n\n\
Additional Information:\n{additional}\n\n\
User question: {question}\n\n\
Please provide a clear and concise answer based on both the structured fields \
and additional information. If asked about information not present in either \
source, clearly state that the information is not available."
    )
}
