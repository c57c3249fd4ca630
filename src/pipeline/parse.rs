//! Parsing: cleaned model response → [`ExtractedRecord`].
//!
//! The model is asked for two sections: a block of `Label: value` lines and
//! a free-form "Part 2 - Additional Information" section. Parsing runs in
//! two explicit stages so the parser stays a pure function of its input:
//!
//! 1. **Detect currency** from the currency line, if any.
//! 2. **Map lines to fields**, using the detected currency to normalise the
//!    amount and currency values.
//!
//! The parser never fails. Lines it cannot map are dropped with a warning
//! and every field it did not see stays absent; deciding whether the result
//! is good enough is the caller's job.

use crate::record::ExtractedRecord;
use crate::schema::{format_amount, Currency, FieldKey};
use tracing::{debug, warn};

/// Separates the structured block from the free-form section.
pub const ADDITIONAL_INFO_MARKER: &str = "Part 2 - Additional Information:";

/// Lines starting with these carry no field.
const PREAMBLES: [&str; 3] = ["Part 1", "Based on", "Note:"];

/// Values meaning "the model did not find it" (compared case-insensitively).
const NOT_FOUND_VALUES: [&str; 4] = ["not available", "n/a", "none", "-"];

/// Parse one cleaned response into a fully-formed record.
pub fn parse_response(text: &str) -> ExtractedRecord {
    let (structured, additional) = split_sections(text);

    let lines: Vec<&str> = structured
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !PREAMBLES.iter().any(|p| line.starts_with(p)))
        .collect();

    let currency = detect_currency(&lines);
    if let Some(c) = currency {
        debug!("Detected currency {} ({})", c.symbol, c.code);
    }

    let mut record = ExtractedRecord::new();
    for line in &lines {
        let Some((label, value)) = split_field_line(line) else {
            continue;
        };
        let Some(key) = FieldKey::from_label(&label) else {
            warn!("Unmatched field: {:?}", label);
            continue;
        };
        record.set(key, normalise_value(key, &value, currency));
    }

    if let Some(info) = additional {
        record.additional_information = Some(info);
    }

    debug!("Parsed {}/13 fields", record.present_count());
    record
}

/// Split into (structured part, trimmed additional information).
fn split_sections(text: &str) -> (&str, Option<String>) {
    match text.split_once(ADDITIONAL_INFO_MARKER) {
        Some((structured, rest)) => {
            let info = rest.trim();
            (structured, (!info.is_empty()).then(|| info.to_string()))
        }
        None => (text, None),
    }
}

/// Stage 1: the first currency line naming a known symbol or code.
fn detect_currency(lines: &[&str]) -> Option<Currency> {
    lines
        .iter()
        .filter_map(|line| split_field_line(line))
        .filter(|(label, _)| FieldKey::from_label(label) == Some(FieldKey::Currency))
        .find_map(|(_, value)| Currency::detect(&value))
}

/// Split `Label: value` at the first colon after stripping list and bold
/// decoration. The label is lowercased; the value is trimmed.
fn split_field_line(line: &str) -> Option<(String, String)> {
    let line = strip_line_decoration(line);
    let (label, value) = line.split_once(':')?;
    Some((
        strip_label_decoration(label).to_lowercase(),
        value.trim().to_string(),
    ))
}

fn strip_line_decoration(line: &str) -> String {
    let unbolded = line.replace("**", "");
    let mut s = unbolded.trim();
    if let Some(rest) = s.strip_prefix('*') {
        s = rest.trim_start();
    }
    s = strip_numbering(s);
    if let Some(rest) = s.strip_prefix('-') {
        s = rest.trim_start();
    }
    s.trim().to_string()
}

fn strip_label_decoration(label: &str) -> &str {
    label
        .trim()
        .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == '[' || c == ']')
        .trim()
}

/// Remove a leading `12.` list number.
fn strip_numbering(s: &str) -> &str {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 && s[digits..].starts_with('.') {
        s[digits + 1..].trim_start()
    } else {
        s
    }
}

/// Peel brackets, bold markers and quotes off both ends until none are left.
fn strip_value_decoration(value: &str) -> &str {
    let mut v = value.trim();
    loop {
        let mut next = v.trim_start_matches("**").trim_end_matches("**").trim();
        next = next.strip_prefix('[').unwrap_or(next);
        next = next.strip_suffix(']').unwrap_or(next);
        next = next.strip_prefix(['"', '\'']).unwrap_or(next);
        next = next.strip_suffix(['"', '\'']).unwrap_or(next);
        next = next.trim();
        if next.len() == v.len() {
            return next;
        }
        v = next;
    }
}

fn is_not_found(value: &str) -> bool {
    value.is_empty()
        || NOT_FOUND_VALUES
            .iter()
            .any(|marker| value.eq_ignore_ascii_case(marker))
}

/// Stage 2: normalise one field value.
fn normalise_value(key: FieldKey, raw: &str, currency: Option<Currency>) -> Option<String> {
    let value = strip_value_decoration(raw);
    if is_not_found(value) {
        return None;
    }

    match (key, currency) {
        (FieldKey::InvoiceAmount, Some(c)) => {
            let formatted = format_amount(value);
            if formatted.is_none() {
                warn!("Invalid {} amount: {:?}", c.code, value);
            }
            formatted
        }
        (FieldKey::Currency, Some(c)) => Some(c.canonical()),
        _ => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NOT_AVAILABLE;

    const FULL_RESPONSE: &str = "Invoice number: INV-42\n\
Invoice Date: 15/03/2024\n\
Invoice Amount: 200000.00\n\
Currency: ₹ (Indian Rupee)\n\
Legal Entity Name: Acme Holdings Pvt Ltd\n\
Legal Entity Address: 12 MG Road, Bengaluru\n\
Vendor Name: Globex Supplies\n\
Vendor Address: 4 Park Street, Kolkata\n\
Payment Terms: Net 30\n\
Payment Method: Bank Transfer\n\
VAT ID: 29ABCDE1234F1Z5\n\
GL Account Number: 400100\n\
Bank Account Number: 001122334455";

    #[test]
    fn full_response_has_no_missing_fields() {
        let r = parse_response(FULL_RESPONSE);
        assert_eq!(r.present_count(), 13);
        assert!(r.additional_information.is_none());
        assert_eq!(r.get(FieldKey::InvoiceAmount), Some("200,000.00"));
        assert_eq!(r.get(FieldKey::Currency), Some("₹ (Indian Rupee)"));
        assert_eq!(r.get(FieldKey::BankAccountNumber), Some("001122334455"));
    }

    #[test]
    fn reference_example() {
        let r = parse_response(
            "Invoice number: INV-001\nInvoice Date: 01/02/2024\nInvoice Amount: 1500.5\nCurrency: $ (US Dollar)",
        );
        assert_eq!(r.display_value(FieldKey::InvoiceNumber), "INV-001");
        assert_eq!(r.display_value(FieldKey::InvoiceDate), "01/02/2024");
        assert_eq!(r.display_value(FieldKey::InvoiceAmount), "1,500.50");
        assert_eq!(r.display_value(FieldKey::Currency), "$ (US Dollar)");
        for key in &FieldKey::ALL[4..] {
            assert_eq!(r.display_value(*key), NOT_AVAILABLE, "{key}");
        }
    }

    #[test]
    fn unknown_label_is_dropped() {
        let r = parse_response("Shipping Carrier: DHL\nInvoice no: 7");
        assert_eq!(r.get(FieldKey::InvoiceNumber), Some("7"));
        assert_eq!(r.present_count(), 1);
        assert_eq!(r.iter().count(), 13);
    }

    #[test]
    fn euro_currency_reformats_amount() {
        let r = parse_response("Total: EUR 12345.678\nCurrency: €");
        assert_eq!(r.get(FieldKey::InvoiceAmount), Some("12,345.68"));
        assert_eq!(r.get(FieldKey::Currency), Some("€ (Euro)"));
    }

    #[test]
    fn missing_currency_keeps_raw_amount() {
        let r = parse_response("Invoice Amount: 12345.678 EUR");
        assert_eq!(r.get(FieldKey::InvoiceAmount), Some("12345.678 EUR"));
        assert_eq!(r.get(FieldKey::Currency), None);
    }

    #[test]
    fn unknown_currency_leaves_values_alone() {
        let r = parse_response("Currency: CHF\nAmount: 1000");
        assert_eq!(r.get(FieldKey::Currency), Some("CHF"));
        assert_eq!(r.get(FieldKey::InvoiceAmount), Some("1000"));
    }

    #[test]
    fn unparseable_amount_becomes_absent_when_currency_known() {
        let r = parse_response("Currency: USD\nInvoice Amount: see attachment");
        assert_eq!(r.get(FieldKey::InvoiceAmount), None);
        assert_eq!(r.get(FieldKey::Currency), Some("$ (US Dollar)"));
    }

    #[test]
    fn not_found_markers() {
        let r = parse_response(
            "Invoice number: N/A\nVendor Name: none\nVAT ID: -\nPayment Terms:\nPayment Method: \"Not Available\"",
        );
        assert!(r.is_empty());
    }

    #[test]
    fn additional_information_split() {
        let text = format!(
            "Part 1 - Required Fields:\nInvoice number: 9\n{ADDITIONAL_INFO_MARKER}\n Line item: Widget x2\n"
        );
        let r = parse_response(&text);
        assert_eq!(r.get(FieldKey::InvoiceNumber), Some("9"));
        assert_eq!(
            r.additional_information.as_deref(),
            Some("Line item: Widget x2")
        );
    }

    #[test]
    fn empty_additional_information_is_not_attached() {
        let r = parse_response(&format!("Invoice number: 9\n{ADDITIONAL_INFO_MARKER}   "));
        assert!(r.additional_information.is_none());
    }

    #[test]
    fn decorated_lines_are_recognised() {
        let r = parse_response(
            "* **Vendor Name:** [Initech]\n3. Bill To: \"Initrode\"\n- **Tax ID:** 'X-9'",
        );
        assert_eq!(r.get(FieldKey::VendorName), Some("Initrode"));
        assert_eq!(r.get(FieldKey::VatId), Some("X-9"));
    }

    #[test]
    fn value_keeps_text_after_first_colon() {
        let r = parse_response("Payment Terms: Due: 30 days");
        assert_eq!(r.get(FieldKey::PaymentTerms), Some("Due: 30 days"));
    }

    #[test]
    fn preamble_lines_are_skipped() {
        let r = parse_response("Based on the image: the invoice\nNote: date: unclear\nDate: 2024-01-01");
        assert_eq!(r.get(FieldKey::InvoiceDate), Some("2024-01-01"));
        assert_eq!(r.present_count(), 1);
    }

    #[test]
    fn lines_without_colon_are_ignored() {
        let r = parse_response("ACME invoice\nInvoice number: 1");
        assert_eq!(r.present_count(), 1);
    }

    #[test]
    fn credit_note_value_keeps_later_fields() {
        use crate::pipeline::clean::clean_response;

        let r = parse_response(&clean_response(
            "Document Type: Credit Note: CN-7\nInvoice Number: INV-1\nVendor Name: Acme\n\
Invoice Amount: 10\nCurrency: $\n\
Part 2 - Additional Information:\n- Delivery Note: 55\n- Item: Widget",
        ));
        assert_eq!(r.get(FieldKey::InvoiceNumber), Some("INV-1"));
        assert_eq!(r.get(FieldKey::VendorName), Some("Acme"));
        assert_eq!(r.get(FieldKey::InvoiceAmount), Some("10.00"));
        assert_eq!(
            r.additional_information.as_deref(),
            Some("Delivery Note: 55\nItem: Widget")
        );
    }

    #[test]
    fn oversized_amount_is_kept_with_currency() {
        let r = parse_response("Invoice Amount: 123456789012345678901234567890.00\nCurrency: EUR");
        assert_eq!(
            r.get(FieldKey::InvoiceAmount),
            Some("123,456,789,012,345,678,901,234,567,890.00")
        );
        assert_eq!(r.get(FieldKey::Currency), Some("€ (Euro)"));
    }
}
