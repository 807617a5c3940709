//! Extraction instruction sent alongside every uploaded invoice.
//!
//! Kept here so tests can inspect the prompt without a live model, and so
//! changing the wording never touches the retry or parsing code.
//!
//! Callers can override the default via [`crate::config::ExtractionConfig::prompt`].

/// JSON keys the model is asked to produce, in report order.
pub const FIELD_KEYS: [&str; 6] = [
    "numero_contrato",
    "nit_empresa",
    "nombre_empresa",
    "fecha_expedicion",
    "fecha_limite",
    "valor_pagar",
];

/// Default instruction for extracting invoice fields from an uploaded PDF.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are reading a utility or service invoice (PDF). Extract the following fields and answer with ONE JSON object using exactly these keys:

- numero_contrato: contract / account / reference number, as a string
- nit_empresa: tax ID (NIT) of the issuing company, as a string
- nombre_empresa: legal name of the issuing company, as a string
- fecha_expedicion: issue date, formatted YYYY-MM-DD
- fecha_limite: payment due date, formatted YYYY-MM-DD
- valor_pagar: total amount to pay, as a bare number (no currency symbol, no thousands separators)

Rules:
- If a field does not appear in the document, set it to null. Never omit a key.
- Do not guess values that are not printed on the invoice.
- Output ONLY the JSON object. No commentary."#;
