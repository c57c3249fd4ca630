//! The structured result of an extraction.
//!
//! [`ExtractedRecord`] has one named slot per [`FieldKey`], so a record can
//! never be missing a field. A slot holds `Some(value)` when the model found
//! the field and `None` otherwise; the `"not available"` marker only appears
//! when the record is serialised or rendered.

use crate::schema::{FieldKey, NOT_AVAILABLE};
use serde::{Deserialize, Serialize};

/// Extracted invoice fields for one page or one merged document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    #[serde(with = "sentinel", default)]
    pub invoice_number: Option<String>,
    #[serde(with = "sentinel", default)]
    pub invoice_date: Option<String>,
    #[serde(with = "sentinel", default)]
    pub invoice_amount: Option<String>,
    #[serde(with = "sentinel", default)]
    pub currency: Option<String>,
    #[serde(with = "sentinel", default)]
    pub legal_entity_name: Option<String>,
    #[serde(with = "sentinel", default)]
    pub legal_entity_address: Option<String>,
    #[serde(with = "sentinel", default)]
    pub vendor_name: Option<String>,
    #[serde(with = "sentinel", default)]
    pub vendor_address: Option<String>,
    #[serde(with = "sentinel", default)]
    pub payment_terms: Option<String>,
    #[serde(with = "sentinel", default)]
    pub payment_method: Option<String>,
    #[serde(with = "sentinel", default)]
    pub vat_id: Option<String>,
    #[serde(with = "sentinel", default)]
    pub gl_account_number: Option<String>,
    #[serde(with = "sentinel", default)]
    pub bank_account_number: Option<String>,

    /// Free text from the response that did not map to a field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,

    /// The whole cleaned model response, kept for chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.slot(key).as_deref()
    }

    /// Set a field. Blank values and the `"not available"` marker clear it.
    pub fn set(&mut self, key: FieldKey, value: Option<String>) {
        *self.slot_mut(key) = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(NOT_AVAILABLE));
    }

    /// The field as shown to users: the value or `"not available"`.
    pub fn display_value(&self, key: FieldKey) -> &str {
        self.get(key).unwrap_or(NOT_AVAILABLE)
    }

    /// `true` when none of the 13 fields has a value. The free-text slots
    /// are ignored.
    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    pub fn present_count(&self) -> usize {
        FieldKey::ALL
            .iter()
            .filter(|key| self.get(**key).is_some())
            .count()
    }

    /// Fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, Option<&str>)> + '_ {
        FieldKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }

    /// One presentation row per field, formatted and validated.
    pub fn rows(&self) -> Vec<FieldRow> {
        FieldKey::ALL
            .into_iter()
            .map(|key| {
                let descriptor = key.descriptor();
                let value = self.display_value(key).to_string();
                FieldRow {
                    key,
                    display_name: descriptor.display_name,
                    formatted: descriptor.format(&value),
                    valid: descriptor.validate(&value),
                    value,
                }
            })
            .collect()
    }

    fn slot(&self, key: FieldKey) -> &Option<String> {
        match key {
            FieldKey::InvoiceNumber => &self.invoice_number,
            FieldKey::InvoiceDate => &self.invoice_date,
            FieldKey::InvoiceAmount => &self.invoice_amount,
            FieldKey::Currency => &self.currency,
            FieldKey::LegalEntityName => &self.legal_entity_name,
            FieldKey::LegalEntityAddress => &self.legal_entity_address,
            FieldKey::VendorName => &self.vendor_name,
            FieldKey::VendorAddress => &self.vendor_address,
            FieldKey::PaymentTerms => &self.payment_terms,
            FieldKey::PaymentMethod => &self.payment_method,
            FieldKey::VatId => &self.vat_id,
            FieldKey::GlAccountNumber => &self.gl_account_number,
            FieldKey::BankAccountNumber => &self.bank_account_number,
        }
    }

    fn slot_mut(&mut self, key: FieldKey) -> &mut Option<String> {
        match key {
            FieldKey::InvoiceNumber => &mut self.invoice_number,
            FieldKey::InvoiceDate => &mut self.invoice_date,
            FieldKey::InvoiceAmount => &mut self.invoice_amount,
            FieldKey::Currency => &mut self.currency,
            FieldKey::LegalEntityName => &mut self.legal_entity_name,
            FieldKey::LegalEntityAddress => &mut self.legal_entity_address,
            FieldKey::VendorName => &mut self.vendor_name,
            FieldKey::VendorAddress => &mut self.vendor_address,
            FieldKey::PaymentTerms => &mut self.payment_terms,
            FieldKey::PaymentMethod => &mut self.payment_method,
            FieldKey::VatId => &mut self.vat_id,
            FieldKey::GlAccountNumber => &mut self.gl_account_number,
            FieldKey::BankAccountNumber => &mut self.bank_account_number,
        }
    }
}

/// A single rendered field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRow {
    pub key: FieldKey,
    pub display_name: &'static str,
    /// Raw value or `"not available"`.
    pub value: String,
    pub formatted: String,
    pub valid: bool,
}

/// Projects `None` to `"not available"` and back.
mod sentinel {
    use crate::schema::NOT_AVAILABLE;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(NOT_AVAILABLE))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let value = Option::<String>::deserialize(d)?;
        Ok(value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(NOT_AVAILABLE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_empty() {
        let r = ExtractedRecord::new();
        assert!(r.is_empty());
        assert_eq!(r.iter().count(), 13);
        assert!(r.iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn set_normalises_marker_and_blank() {
        let mut r = ExtractedRecord::new();
        r.set(FieldKey::VatId, Some("  DE123  ".into()));
        assert_eq!(r.get(FieldKey::VatId), Some("DE123"));
        r.set(FieldKey::VatId, Some("Not Available".into()));
        assert_eq!(r.get(FieldKey::VatId), None);
        r.set(FieldKey::VatId, Some("   ".into()));
        assert_eq!(r.get(FieldKey::VatId), None);
    }

    #[test]
    fn free_text_does_not_count_as_a_field() {
        let r = ExtractedRecord {
            additional_information: Some("line items".into()),
            full_text: Some("everything".into()),
            ..Default::default()
        };
        assert!(r.is_empty());
    }

    #[test]
    fn serialises_with_marker_and_camel_case() {
        let mut r = ExtractedRecord::new();
        r.set(FieldKey::InvoiceNumber, Some("A-1".into()));
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["invoiceNumber"], "A-1");
        assert_eq!(json["bankAccountNumber"], NOT_AVAILABLE);
        assert!(json.get("additionalInformation").is_none());
        assert_eq!(json.as_object().unwrap().len(), 13);
    }

    #[test]
    fn deserialises_marker_as_absent() {
        let r: ExtractedRecord = serde_json::from_str(
            r#"{"invoiceNumber":"B","currency":"not available","vatId":"  "}"#,
        )
        .unwrap();
        assert_eq!(r.get(FieldKey::InvoiceNumber), Some("B"));
        assert_eq!(r.get(FieldKey::Currency), None);
        assert_eq!(r.get(FieldKey::VatId), None);
        assert_eq!(r.present_count(), 1);
    }

    #[test]
    fn rows_format_and_validate() {
        let mut r = ExtractedRecord::new();
        r.set(FieldKey::InvoiceAmount, Some("1500.5".into()));
        let rows = r.rows();
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[0].display_name, "Invoice Number");
        assert!(!rows[0].valid);
        assert_eq!(rows[2].formatted, "1,500.50");
        assert!(rows[2].valid);
        assert_eq!(rows[4].value, NOT_AVAILABLE);
    }
}
