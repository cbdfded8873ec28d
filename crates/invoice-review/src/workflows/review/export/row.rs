use serde_json::Value;

use super::sink::{ExportSink, ExportSinkError, LedgerId};
use crate::workflows::review::domain::InvoiceData;

/// Column order for a new ledger: the configured list, or the invoice's own keys.
pub fn export_columns(invoice: &InvoiceData, configured: Option<&[String]>) -> Vec<String> {
    match configured {
        Some(fields) if !fields.is_empty() => fields.to_vec(),
        _ => invoice.keys().cloned().collect(),
    }
}

/// Render one invoice value as a ledger cell.
///
/// `{value, confidence}` wrappers are unwrapped first, a missing or null value
/// becomes the literal `None`, and lists and objects are written as JSON.
pub fn normalize_cell(value: Option<&Value>) -> String {
    let value = match value {
        Some(Value::Object(wrapper)) if wrapper.contains_key("value") => wrapper.get("value"),
        other => other,
    };
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => nested.to_string(),
    }
}

pub fn build_row(invoice: &InvoiceData, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|column| normalize_cell(invoice.get(column)))
        .collect()
}

/// Append the invoice to a ledger. A ledger that already has a header row keeps
/// it and the row follows that header; an empty ledger gets `columns` as header.
pub fn append_invoice(
    sink: &dyn ExportSink,
    ledger: &LedgerId,
    invoice: &InvoiceData,
    columns: Vec<String>,
) -> Result<(), ExportSinkError> {
    let columns = match sink.header(ledger)? {
        Some(existing) if !existing.is_empty() => existing,
        _ => {
            sink.append_row(ledger, &columns)?;
            columns
        }
    };
    sink.append_row(ledger, &build_row(invoice, &columns))
}
