//! The canonical invoice field set.
//!
//! Every other stage of the pipeline speaks in terms of [`FieldKey`]: the
//! parser resolves model labels to keys, the merger folds values per key and
//! the presentation layer renders one row per key. The alias table, the
//! validators and the formatters all live here so there is exactly one place
//! to edit when a field is added or a label variant shows up in the wild.
//!
//! Everything in this module is static and pure.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker for a field the model could not find.
///
/// Only used at the presentation and wire boundary; inside the crate an
/// absent value is `None`.
pub const NOT_AVAILABLE: &str = "not available";

/// One of the 13 recognised invoice fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    InvoiceNumber,
    InvoiceDate,
    InvoiceAmount,
    Currency,
    LegalEntityName,
    LegalEntityAddress,
    VendorName,
    VendorAddress,
    PaymentTerms,
    PaymentMethod,
    VatId,
    GlAccountNumber,
    BankAccountNumber,
}

/// Accepted label variants per field, in canonical field order.
///
/// Labels are matched exactly after lowercasing and trimming; there is no
/// fuzzy matching.
pub static FIELD_VARIANTS: [(FieldKey, &[&str]); 13] = [
    (
        FieldKey::InvoiceNumber,
        &[
            "invoice number",
            "invoice no",
            "invoice no.",
            "invoice #",
            "inv no",
            "inv.no",
            "inv #",
        ],
    ),
    (
        FieldKey::InvoiceDate,
        &["invoice date", "date", "inv date", "invoice dt"],
    ),
    (
        FieldKey::InvoiceAmount,
        &["invoice amount", "total amount", "amount", "total", "grand total"],
    ),
    (FieldKey::Currency, &["currency", "curr", "currency type"]),
    (
        FieldKey::LegalEntityName,
        &["legal entity name", "company name", "business name", "entity name"],
    ),
    (
        FieldKey::LegalEntityAddress,
        &["legal entity address", "company address", "business address", "address"],
    ),
    (
        FieldKey::VendorName,
        &["vendor name", "customer name", "client name", "billed to", "bill to"],
    ),
    (
        FieldKey::VendorAddress,
        &["vendor address", "customer address", "client address", "billing address"],
    ),
    (
        FieldKey::PaymentTerms,
        &["payment terms", "terms", "payment condition", "due terms"],
    ),
    (
        FieldKey::PaymentMethod,
        &["payment method", "method of payment", "pay method", "payment type"],
    ),
    (
        FieldKey::VatId,
        &["vat id", "vat number", "vat reg no", "gst no", "tax id"],
    ),
    (
        FieldKey::GlAccountNumber,
        &["gl account number", "gl number", "general ledger", "account number"],
    ),
    (
        FieldKey::BankAccountNumber,
        &["bank account number", "account no", "bank account", "bank acc no"],
    ),
];

impl FieldKey {
    /// All keys in canonical output order.
    pub const ALL: [FieldKey; 13] = [
        FieldKey::InvoiceNumber,
        FieldKey::InvoiceDate,
        FieldKey::InvoiceAmount,
        FieldKey::Currency,
        FieldKey::LegalEntityName,
        FieldKey::LegalEntityAddress,
        FieldKey::VendorName,
        FieldKey::VendorAddress,
        FieldKey::PaymentTerms,
        FieldKey::PaymentMethod,
        FieldKey::VatId,
        FieldKey::GlAccountNumber,
        FieldKey::BankAccountNumber,
    ];

    /// Resolve a raw label (already lowercased and trimmed) to a field.
    pub fn from_label(label: &str) -> Option<FieldKey> {
        FIELD_VARIANTS
            .iter()
            .find(|(_, aliases)| aliases.contains(&label))
            .map(|(key, _)| *key)
    }

    /// camelCase key used on the wire and in JSON output.
    pub fn wire_key(self) -> &'static str {
        match self {
            FieldKey::InvoiceNumber => "invoiceNumber",
            FieldKey::InvoiceDate => "invoiceDate",
            FieldKey::InvoiceAmount => "invoiceAmount",
            FieldKey::Currency => "currency",
            FieldKey::LegalEntityName => "legalEntityName",
            FieldKey::LegalEntityAddress => "legalEntityAddress",
            FieldKey::VendorName => "vendorName",
            FieldKey::VendorAddress => "vendorAddress",
            FieldKey::PaymentTerms => "paymentTerms",
            FieldKey::PaymentMethod => "paymentMethod",
            FieldKey::VatId => "vatId",
            FieldKey::GlAccountNumber => "glAccountNumber",
            FieldKey::BankAccountNumber => "bankAccountNumber",
        }
    }

    /// Canonical lowercase label, e.g. `"invoice number"`.
    pub fn label(self) -> &'static str {
        self.aliases()[0]
    }

    /// Every accepted label variant for this field.
    pub fn aliases(self) -> &'static [&'static str] {
        FIELD_VARIANTS[self as usize].1
    }

    /// Human-readable name, e.g. `"VAT ID"`.
    pub fn display_name(self) -> &'static str {
        match self {
            FieldKey::InvoiceNumber => "Invoice Number",
            FieldKey::InvoiceDate => "Invoice Date",
            FieldKey::InvoiceAmount => "Invoice Amount",
            FieldKey::Currency => "Currency",
            FieldKey::LegalEntityName => "Legal Entity Name",
            FieldKey::LegalEntityAddress => "Legal Entity Address",
            FieldKey::VendorName => "Vendor Name",
            FieldKey::VendorAddress => "Vendor Address",
            FieldKey::PaymentTerms => "Payment Terms",
            FieldKey::PaymentMethod => "Payment Method",
            FieldKey::VatId => "VAT ID",
            FieldKey::GlAccountNumber => "GL Account Number",
            FieldKey::BankAccountNumber => "Bank Account Number",
        }
    }

    /// Is `value` well-formed for this field?
    ///
    /// Fields without a rule are always valid, so the presentation layer only
    /// highlights the number, date and amount.
    pub fn validate(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            FieldKey::InvoiceNumber => !value.is_empty() && value != NOT_AVAILABLE,
            FieldKey::InvoiceDate => value != NOT_AVAILABLE && parse_date(value).is_some(),
            FieldKey::InvoiceAmount => value != NOT_AVAILABLE && amount_digits(value).is_some(),
            _ => true,
        }
    }

    /// Display-friendly rendering of `value`. Values that cannot be
    /// formatted are returned unchanged.
    pub fn format(self, value: &str) -> String {
        match self {
            FieldKey::InvoiceDate if value != NOT_AVAILABLE => match parse_date(value) {
                Some(date) => date.format("%-m/%-d/%Y").to_string(),
                None => value.to_string(),
            },
            FieldKey::InvoiceAmount if value != NOT_AVAILABLE => {
                format_amount(value).unwrap_or_else(|| value.to_string())
            }
            _ => value.to_string(),
        }
    }

    /// The (display name, validator, formatter) triple for this field.
    pub fn descriptor(self) -> FieldDescriptor {
        FieldDescriptor {
            key: self,
            display_name: self.display_name(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

/// What a presentation layer needs to render one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub key: FieldKey,
    pub display_name: &'static str,
}

impl FieldDescriptor {
    pub fn validate(&self, value: &str) -> bool {
        self.key.validate(value)
    }

    pub fn format(&self, value: &str) -> String {
        self.key.format(value)
    }
}

// ── Currencies ───────────────────────────────────────────────────────────

/// A currency the parser can detect on the currency line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Currency {
    pub symbol: &'static str,
    pub code: &'static str,
    pub name: &'static str,
}

/// Detection order matters: the first match wins.
pub static CURRENCIES: [Currency; 4] = [
    Currency {
        symbol: "₹",
        code: "INR",
        name: "Indian Rupee",
    },
    Currency {
        symbol: "$",
        code: "USD",
        name: "US Dollar",
    },
    Currency {
        symbol: "€",
        code: "EUR",
        name: "Euro",
    },
    Currency {
        symbol: "£",
        code: "GBP",
        name: "British Pound",
    },
];

impl Currency {
    /// Find the first currency whose symbol, or code (case-insensitive),
    /// occurs in `value`.
    pub fn detect(value: &str) -> Option<Currency> {
        let lower = value.to_lowercase();
        CURRENCIES
            .iter()
            .find(|c| value.contains(c.symbol) || lower.contains(&c.code.to_lowercase()))
            .copied()
    }

    /// Canonical currency-field value, e.g. `"$ (US Dollar)"`.
    ///
    /// Uses the currency name rather than the ISO code (`"$ (USD)"`) so a
    /// currency line already written as `"$ (US Dollar)"` is kept as is.
    pub fn canonical(&self) -> String {
        format!("{} ({})", self.symbol, self.name)
    }
}

// ── Amounts ──────────────────────────────────────────────────────────────

static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.\-]").unwrap());
static RE_LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)").unwrap());

/// The numeric part of a monetary value: everything except digits, `.` and
/// `-` dropped, then the longest leading number.
fn amount_digits(value: &str) -> Option<String> {
    let stripped = RE_NON_NUMERIC.replace_all(value, "");
    let number = RE_LEADING_NUMBER.find(&stripped)?.as_str();
    Some(number.trim_end_matches('.').to_string())
}

/// Parse a monetary value. `None` for non-numeric values and for values
/// beyond the 28 significant digits of [`Decimal`].
pub fn parse_amount(value: &str) -> Option<Decimal> {
    Decimal::from_str(&amount_digits(value)?).ok()
}

/// Render an amount with thousands grouping and exactly two decimals.
///
/// Numbers too large for [`Decimal`] are grouped as written and padded to
/// two decimals without rounding. `None` only when there is no number.
pub fn format_amount(value: &str) -> Option<String> {
    let digits = amount_digits(value)?;
    let Ok(amount) = Decimal::from_str(&digits) else {
        return Some(format_digits(&digits));
    };

    let mut amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if amount.is_zero() {
        amount.set_sign_positive(true);
    }
    amount.rescale(2);

    let text = amount.abs().to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if amount.is_sign_negative() { "-" } else { "" };
    Some(format!("{sign}{}.{frac_part}", group_thousands(int_part)))
}

fn format_digits(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    format!("{sign}{}.{:0<2}", group_thousands(int_part), frac_part)
}

fn group_thousands(int_part: &str) -> String {
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// ── Dates ────────────────────────────────────────────────────────────────

/// Month/day order is tried before day/month, matching US-style readers.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
];

/// Parse a calendar date in any of the accepted layouts.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
