//! Classification behavior observed through the public intake boundary: raw extractor
//! output in, annotated invoice data out.

use invoice_review::workflows::intake::{annotate, process_extraction, FieldMap, SCENARIO_KEY};
use invoice_review::workflows::vat::{classify, extract_rates, has_zero_rate, VatScenario};
use serde_json::{json, Value};

fn scenario_of(raw: Value) -> Option<VatScenario> {
    let fields = FieldMap::from_extraction(&raw).expect("object input");
    classify(&fields)
}

#[test]
fn golden_cases() {
    let cases = [
        (
            json!({
                "buyer_country_group": "EE",
                "supplier_country_group": "EE",
                "supply_type": "SERVICES",
                "service_category": "SERV_9",
            }),
            Some(VatScenario::EeDom9Reduced),
        ),
        (
            json!({
                "buyer_country_group": "EE",
                "supplier_country_group": "EU_OTHER",
                "supply_type": "GOODS",
                "service_category": "SERV_24",
            }),
            Some(VatScenario::EuGoodsIcs24Full),
        ),
        (
            json!({
                "buyer_country_group": "EE",
                "supplier_country_group": "EU_OTHER",
                "supply_type": "SERVICES",
                "supplier_vat_id": "DE123",
                "vat_rates": "19",
            }),
            Some(VatScenario::EuForeignVatCostOnly),
        ),
        (
            json!({
                "buyer_country_group": "EE",
                "supplier_country_group": "NON_EU",
                "supply_type": "GOODS",
                "service_category": "SERV_9",
            }),
            Some(VatScenario::NonEuImportKmd9),
        ),
        (
            json!({
                "buyer_country_group": "DE",
                "supplier_country_group": "EE",
                "supply_type": "GOODS",
            }),
            Some(VatScenario::OutOfScope),
        ),
        (
            json!({
                "buyer_country_group": "EE",
                "supply_type": "GOODS",
            }),
            None,
        ),
    ];

    for (raw, expected) in cases {
        assert_eq!(scenario_of(raw.clone()), expected, "input {raw}");
    }
}

#[test]
fn wrapped_fields_classify_like_bare_ones() {
    let wrapped = json!({
        "buyer_country_group": {"value": "EE", "confidence": "low confidence"},
        "supplier_country_group": {"value": "EE", "confidence": "definitely wrong"},
        "supply_type": {"value": "SERVICES", "confidence": "strong confidence"},
        "service_category": {"value": "SERV_13", "confidence": "medium confidence"},
    });

    assert_eq!(scenario_of(wrapped), Some(VatScenario::EeDom13Acc));
}

#[test]
fn empty_strings_count_as_missing() {
    let raw = json!({
        "buyer_country_group": "EE",
        "supplier_country_group": {"value": "", "confidence": "low confidence"},
        "supply_type": "SERVICES",
    });

    assert_eq!(scenario_of(raw), None);
}

#[test]
fn whitespace_country_group_counts_as_missing() {
    let raw = json!({
        "buyer_country_group": "EE",
        "supplier_country_group": {"value": "  ", "confidence": "low confidence"},
        "supply_type": "SERVICES",
    });

    assert_eq!(scenario_of(raw), None);
}

#[test]
fn zero_rate_keeps_reverse_charge_for_eu_services() {
    let raw = json!({
        "buyer_country_group": "EE",
        "supplier_country_group": "EU_OTHER",
        "supply_type": "SERVICES",
        "supplier_vat_id": "FI99887766",
        "vat_rates": "0,0 %",
        "service_category": "SERV_9",
    });

    assert_eq!(scenario_of(raw), Some(VatScenario::EuServRc9Full));
}

#[test]
fn estonian_vat_id_is_not_foreign_vat() {
    let raw = json!({
        "buyer_country_group": "EE",
        "supplier_country_group": "EU_OTHER",
        "supply_type": "SERVICES",
        "supplier_vat_id": "EE100200300",
        "vat_rates": ["24"],
    });

    assert_eq!(scenario_of(raw), Some(VatScenario::EuServRc24));
}

#[test]
fn comma_decimals_are_read_as_rates() {
    let fields = FieldMap::from_extraction(&json!({"vat_rates": "9,5% and 24"})).expect("object");
    let rates = extract_rates(fields.value("vat_rates").expect("present"));

    assert_eq!(rates, vec![9.5, 24.0]);
    assert!(!has_zero_rate(fields.value("vat_rates").expect("present")));
}

#[test]
fn annotated_data_carries_the_scenario_code() {
    let data = process_extraction(&json!({
        "invoice_number": {"value": "INV-9", "confidence": "strong confidence"},
        "buyer_country_group": "EE",
        "supplier_country_group": "NON_EU",
        "supply_type": "SERVICES",
    }))
    .expect("object input");

    assert_eq!(data[SCENARIO_KEY], json!("NON_EU_SERV_RC_24_FULL"));
    assert_eq!(data["invoice_number"]["value"], json!("INV-9"));

    let unresolved = annotate(&FieldMap::new(), None);
    assert_eq!(unresolved[SCENARIO_KEY], Value::Null);
}
