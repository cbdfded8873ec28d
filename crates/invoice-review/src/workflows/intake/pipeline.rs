use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::fields::FieldMap;
use super::{IntakeError, SCENARIO_KEY};
use crate::tasks::TaskRunner;
use crate::workflows::vat::{classify, VatScenario};

/// Merge the scenario into the persisted form of the field map.
pub fn annotate(fields: &FieldMap, scenario: Option<VatScenario>) -> Map<String, Value> {
    let mut data = fields.to_json();
    let tag = scenario
        .map(|scenario| Value::String(scenario.code().to_string()))
        .unwrap_or(Value::Null);
    data.insert(SCENARIO_KEY.to_string(), tag);
    data
}

/// Normalise raw extractor output and classify it in one step.
pub fn process_extraction(raw: &Value) -> Result<Map<String, Value>, IntakeError> {
    let fields = FieldMap::from_extraction(raw)?;
    let scenario = classify(&fields);
    info!(
        fields = fields.len(),
        scenario = scenario.map(VatScenario::code).unwrap_or("undetermined"),
        "extraction classified"
    );
    Ok(annotate(&fields, scenario))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionId(pub String);

impl fmt::Display for ExtractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Processing,
    Completed { invoice_data: Map<String, Value> },
    Failed { reason: String },
}

type ResultTable = Arc<Mutex<LruCache<ExtractionId, ExtractionStatus>>>;

/// Extractions whose status stays available for polling.
pub const RETAINED_EXTRACTIONS: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

/// Runs extraction processing through the configured task runner and keeps the
/// outcome around for polling. Only the most recently used
/// [`RETAINED_EXTRACTIONS`] entries are kept; older ones read as unknown.
pub struct IntakePipeline {
    runner: Arc<dyn TaskRunner>,
    results: ResultTable,
    sequence: AtomicU64,
}

impl IntakePipeline {
    pub fn new(runner: Arc<dyn TaskRunner>) -> Self {
        Self::with_capacity(runner, RETAINED_EXTRACTIONS)
    }

    pub fn with_capacity(runner: Arc<dyn TaskRunner>, retained: NonZeroUsize) -> Self {
        Self {
            runner,
            results: Arc::new(Mutex::new(LruCache::new(retained))),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn submit(&self, raw: Value) -> ExtractionId {
        let id = ExtractionId(format!(
            "ext-{:06}",
            self.sequence.fetch_add(1, Ordering::Relaxed)
        ));
        record(&self.results, id.clone(), ExtractionStatus::Processing);

        let results = self.results.clone();
        let job_id = id.clone();
        info!(extraction = %id, runner = self.runner.name(), "extraction queued");
        self.runner.run(Box::new(move || {
            let status = match process_extraction(&raw) {
                Ok(invoice_data) => ExtractionStatus::Completed { invoice_data },
                Err(err) => {
                    warn!(extraction = %job_id, error = %err, "extraction rejected");
                    ExtractionStatus::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            record(&results, job_id, status);
        }));

        id
    }

    pub fn status(&self, id: &ExtractionId) -> Option<ExtractionStatus> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn retained(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn record(results: &ResultTable, id: ExtractionId, status: ExtractionStatus) {
    results
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .put(id, status);
}
