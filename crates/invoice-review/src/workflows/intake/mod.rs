//! Boundary with the OCR/LLM extractor: normalises its output into a [`FieldMap`],
//! classifies it, and produces the `invoice_data` object stored on submissions.

mod fields;
mod pipeline;

pub use fields::{Confidence, FieldMap, FieldValue, InvoiceFieldValue};
pub use pipeline::{annotate, process_extraction, ExtractionId, ExtractionStatus, IntakePipeline};

/// Key under which the computed scenario is merged into `invoice_data`.
pub const SCENARIO_KEY: &str = "scenario";

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("extraction output must be a JSON object of named fields")]
    NotAnObject,
}
