//! Normalisation: loosely-typed model output → typed invoice fields.
//!
//! The prompt asks for ISO dates and a bare number, and most of the time the
//! model complies. When it does not, the answer is usually still readable:
//! `"15/02/2024"`, `"$ 150.000"`, `"N/A"`. These rules recover the value
//! where the intent is unambiguous and fall back to explicit absence
//! otherwise. A field is never dropped from the record, only set to `None`.
//!
//! Amount heuristics follow Colombian invoice conventions (dot for thousands,
//! comma for decimals) when a single separator is ambiguous.

use super::sanitize::RawRecord;
use crate::output::InvoiceFields;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Strings the model uses when it means "not present".
const PLACEHOLDERS: [&str; 6] = ["null", "none", "n/a", "na", "-", "no disponible"];

/// Build typed fields from a sanitized object. Unknown keys are ignored.
pub fn fields_from_raw(raw: &RawRecord) -> InvoiceFields {
    InvoiceFields {
        contract_number: text_field(raw.get("numero_contrato")),
        tax_id: text_field(raw.get("nit_empresa")),
        company_name: text_field(raw.get("nombre_empresa")),
        issue_date: date_field("fecha_expedicion", raw.get("fecha_expedicion")),
        due_date: date_field("fecha_limite", raw.get("fecha_limite")),
        amount_due: amount_field(raw.get("valor_pagar")),
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_placeholder(s).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn date_field(key: &str, value: Option<&Value>) -> Option<NaiveDate> {
    let s = non_placeholder(value?.as_str()?)?;
    let parsed = parse_date(s);
    if parsed.is_none() {
        warn!("Dropping unparseable {}: {:?}", key, s);
    }
    parsed
}

fn amount_field(value: Option<&Value>) -> Option<Decimal> {
    let parsed = match value? {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => parse_amount(non_placeholder(s)?),
        _ => None,
    };
    if parsed.is_none() {
        warn!("Dropping unparseable valor_pagar: {:?}", value);
    }
    parsed
}

fn non_placeholder(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() || PLACEHOLDERS.iter().any(|p| t.eq_ignore_ascii_case(p)) {
        None
    } else {
        Some(t)
    }
}

// ── Dates ────────────────────────────────────────────────────────────────

static RE_DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:$|[T ])").unwrap());

static RE_DATE_DMY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})$").unwrap());

/// Parse `YYYY-MM-DD` (also with `/` or `.`, optionally followed by a time)
/// or day-first `DD/MM/YYYY`. Impossible dates yield `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    if let Some(c) = RE_DATE_YMD.captures(t) {
        return ymd(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = RE_DATE_DMY.captures(t) {
        return ymd(&c[3], &c[2], &c[1]);
    }
    None
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

// ── Amounts ──────────────────────────────────────────────────────────────

static RE_AMOUNT_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.,\-]").unwrap());

/// Parse a money string such as `"$ 150.000,50 COP"` or `"1,234.5"`.
///
/// When both `.` and `,` appear, whichever comes last is the decimal mark.
/// A lone separator is a thousands mark if it repeats or is followed by
/// exactly three digits, otherwise a decimal mark.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned = RE_AMOUNT_NOISE.replace_all(s.trim(), "");
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (Some(_), None) => single_separator(&cleaned, '.'),
        (None, Some(_)) => single_separator(&cleaned, ','),
        (None, None) => cleaned.into_owned(),
    };

    Decimal::from_str(&normalized).ok()
}

fn single_separator(s: &str, sep: char) -> String {
    let count = s.matches(sep).count();
    let digits_after = s.rfind(sep).map(|i| s.len() - i - 1).unwrap_or(0);
    if count > 1 || digits_after == 3 {
        s.replace(sep, "")
    } else {
        s.replace(sep, ".")
    }
}
