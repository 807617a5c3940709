//! Output types: per-document records, batch results, and the tabular report.
//!
//! Serialised names are the Spanish column names downstream spreadsheets
//! already expect (`archivo`, `estado`, `valor_pagar`, ...). Field absence
//! is explicit: every record carries all six fields, `None` when the invoice
//! did not show a value or the model could not read it.

use crate::error::{InvoiceError, ItemError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Outcome tag of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Ok => f.write_str("OK"),
            RecordStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// The six fields read from an invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFields {
    #[serde(rename = "numero_contrato", default)]
    pub contract_number: Option<String>,

    /// Company tax ID (NIT), kept as text: it may contain a check digit.
    #[serde(rename = "nit_empresa", default)]
    pub tax_id: Option<String>,

    #[serde(rename = "nombre_empresa", default)]
    pub company_name: Option<String>,

    #[serde(rename = "fecha_expedicion", default)]
    pub issue_date: Option<NaiveDate>,

    #[serde(rename = "fecha_limite", default)]
    pub due_date: Option<NaiveDate>,

    #[serde(
        rename = "valor_pagar",
        default,
        with = "rust_decimal::serde::float_option"
    )]
    pub amount_due: Option<Decimal>,
}

/// Result for a single document. Exactly one exists per submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Display name of the source document.
    #[serde(rename = "archivo")]
    pub file_name: String,

    #[serde(rename = "estado")]
    pub status: RecordStatus,

    /// All `None` on ERROR records.
    #[serde(flatten)]
    pub fields: InvoiceFields,

    /// Human-readable failure, present iff `status` is ERROR.
    #[serde(default)]
    pub error_log: Option<String>,

    /// The typed failure behind `error_log`.
    #[serde(skip)]
    pub error: Option<ItemError>,

    /// Extraction calls made for this document (0 if it never got that far).
    pub attempts: u32,

    pub duration_ms: u64,
}

impl ExtractionRecord {
    pub fn ok(
        file_name: impl Into<String>,
        fields: InvoiceFields,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            status: RecordStatus::Ok,
            fields,
            error_log: None,
            error: None,
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(
        file_name: impl Into<String>,
        error: ItemError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            status: RecordStatus::Error,
            fields: InvoiceFields::default(),
            error_log: Some(error.to_string()),
            error: Some(error),
            attempts,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Every record of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<ExtractionRecord>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn new(records: Vec<ExtractionRecord>, elapsed: Duration) -> Self {
        let ok = records.iter().filter(|r| r.is_ok()).count();
        let stats = BatchStats {
            total: records.len(),
            ok,
            failed: records.len() - ok,
            total_duration_ms: elapsed.as_millis() as u64,
        };
        Self { records, stats }
    }

    /// Report columns for this batch, in output order.
    ///
    /// `archivo` and `estado` are always present. The invoice field columns
    /// appear when at least one record succeeded, `error_log` when at least
    /// one failed.
    pub fn columns(&self) -> Vec<ReportColumn> {
        let any_ok = self.records.iter().any(|r| r.is_ok());
        let any_err = self.records.iter().any(|r| !r.is_ok());
        ReportColumn::ALL
            .iter()
            .copied()
            .filter(|c| match c {
                ReportColumn::Archivo | ReportColumn::Estado => true,
                ReportColumn::ErrorLog => any_err,
                _ => any_ok,
            })
            .collect()
    }

    /// The report as rows of cells, header row excluded.
    pub fn rows(&self) -> Vec<Vec<String>> {
        let columns = self.columns();
        self.records
            .iter()
            .map(|r| columns.iter().map(|c| c.cell(r)).collect())
            .collect()
    }

    /// Write the report as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let columns = self.columns();
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(columns.iter().map(|c| c.header()))?;
        for row in self.rows() {
            w.write_record(&row)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Write the CSV report to `path` atomically (temp file + rename).
    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<(), InvoiceError> {
        let path = path.as_ref();
        let fail = |detail: String| InvoiceError::ReportWriteFailed {
            path: path.to_path_buf(),
            detail,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }

        let tmp_path = path.with_extension("csv.tmp");
        let file = std::fs::File::create(&tmp_path).map_err(|e| fail(e.to_string()))?;
        self.write_csv(std::io::BufWriter::new(file))
            .map_err(|e| fail(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| fail(e.to_string()))?;
        Ok(())
    }
}

/// One column of the tabular report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportColumn {
    Archivo,
    Estado,
    NombreEmpresa,
    ValorPagar,
    FechaLimite,
    FechaExpedicion,
    NitEmpresa,
    NumeroContrato,
    ErrorLog,
}

impl ReportColumn {
    /// Every column in report order.
    pub const ALL: [ReportColumn; 9] = [
        ReportColumn::Archivo,
        ReportColumn::Estado,
        ReportColumn::NombreEmpresa,
        ReportColumn::ValorPagar,
        ReportColumn::FechaLimite,
        ReportColumn::FechaExpedicion,
        ReportColumn::NitEmpresa,
        ReportColumn::NumeroContrato,
        ReportColumn::ErrorLog,
    ];

    pub fn header(self) -> &'static str {
        match self {
            ReportColumn::Archivo => "archivo",
            ReportColumn::Estado => "estado",
            ReportColumn::NombreEmpresa => "nombre_empresa",
            ReportColumn::ValorPagar => "valor_pagar",
            ReportColumn::FechaLimite => "fecha_limite",
            ReportColumn::FechaExpedicion => "fecha_expedicion",
            ReportColumn::NitEmpresa => "nit_empresa",
            ReportColumn::NumeroContrato => "numero_contrato",
            ReportColumn::ErrorLog => "error_log",
        }
    }

    /// Cell text for `record`; absent values are empty.
    pub fn cell(self, record: &ExtractionRecord) -> String {
        let f = &record.fields;
        match self {
            ReportColumn::Archivo => record.file_name.clone(),
            ReportColumn::Estado => record.status.to_string(),
            ReportColumn::NombreEmpresa => f.company_name.clone().unwrap_or_default(),
            ReportColumn::ValorPagar => opt_cell(f.amount_due),
            ReportColumn::FechaLimite => opt_cell(f.due_date),
            ReportColumn::FechaExpedicion => opt_cell(f.issue_date),
            ReportColumn::NitEmpresa => f.tax_id.clone().unwrap_or_default(),
            ReportColumn::NumeroContrato => f.contract_number.clone().unwrap_or_default(),
            ReportColumn::ErrorLog => record.error_log.clone().unwrap_or_default(),
        }
    }
}

fn opt_cell<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
