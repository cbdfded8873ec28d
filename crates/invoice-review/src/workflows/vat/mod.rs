//! VAT scenario classification for invoices addressed to Estonian buyers.
//!
//! A deterministic decision tree over the extracted field map: buyer group, then
//! supplier group, then supply type and rate category. No state and no I/O.

mod classifier;
pub mod domain;
mod rates;

pub use classifier::{
    classify, BUYER_COUNTRY_GROUP, SERVICE_CATEGORY, SUPPLIER_COUNTRY_GROUP, SUPPLIER_VAT_ID,
    SUPPLY_TYPE, VAT_RATES,
};
pub use domain::{CountryGroup, ScenarioFamily, ServiceCategory, SupplyType, VatScenario};
pub use rates::{extract_rates, has_zero_rate};
