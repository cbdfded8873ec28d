use crate::workflows::intake::FieldMap;

use super::domain::{CountryGroup, ServiceCategory, SupplyType, VatScenario};
use super::rates::has_zero_rate;

pub const BUYER_COUNTRY_GROUP: &str = "buyer_country_group";
pub const SUPPLIER_COUNTRY_GROUP: &str = "supplier_country_group";
pub const SUPPLY_TYPE: &str = "supply_type";
pub const SERVICE_CATEGORY: &str = "service_category";
pub const VAT_RATES: &str = "vat_rates";
pub const SUPPLIER_VAT_ID: &str = "supplier_vat_id";

/// Assign a VAT scenario to an extracted invoice.
///
/// Returns `None` when the buyer group, supplier group or supply type is missing
/// (or the supplier group is unrecognised); that is distinct from
/// [`VatScenario::OutOfScope`]. Confidence levels are not consulted.
pub fn classify(fields: &FieldMap) -> Option<VatScenario> {
    let buyer = fields.text(BUYER_COUNTRY_GROUP)?;
    let supplier = fields.text(SUPPLIER_COUNTRY_GROUP)?;
    let supply = fields.text(SUPPLY_TYPE)?;

    if CountryGroup::parse(&buyer) != Some(CountryGroup::Estonia) {
        return Some(VatScenario::OutOfScope);
    }

    let supply = SupplyType::parse(&supply);
    // GOODS reuses the service codes as its reduced-rate signal.
    let category = fields
        .text(SERVICE_CATEGORY)
        .and_then(|code| ServiceCategory::parse(&code));

    match CountryGroup::parse(&supplier)? {
        CountryGroup::Estonia => supply.map(|supply| domestic(supply, category)),
        CountryGroup::OtherEu => Some(match supply {
            Some(SupplyType::Goods) => match category {
                Some(ServiceCategory::Reduced9) => VatScenario::EuGoodsIcs9Full,
                _ => VatScenario::EuGoodsIcs24Full,
            },
            Some(SupplyType::Services) if charged_foreign_vat(fields) => {
                VatScenario::EuForeignVatCostOnly
            }
            Some(SupplyType::Services) => match category {
                Some(ServiceCategory::Reduced9) => VatScenario::EuServRc9Full,
                _ => VatScenario::EuServRc24,
            },
            None => VatScenario::OutOfScope,
        }),
        CountryGroup::NonEu => Some(match (supply, category) {
            (Some(SupplyType::Goods), Some(ServiceCategory::Reduced9)) => {
                VatScenario::NonEuImportKmd9
            }
            (Some(SupplyType::Goods), _) => VatScenario::NonEuImportKmd24,
            (Some(SupplyType::Services), Some(ServiceCategory::Reduced9)) => {
                VatScenario::NonEuServRc9Full
            }
            (Some(SupplyType::Services), _) => VatScenario::NonEuServRc24Full,
            (None, _) => VatScenario::OutOfScope,
        }),
    }
}

fn domestic(supply: SupplyType, category: Option<ServiceCategory>) -> VatScenario {
    match (supply, category) {
        (_, Some(ServiceCategory::Reduced9)) => VatScenario::EeDom9Reduced,
        (_, Some(ServiceCategory::Accommodation13)) => VatScenario::EeDom13Acc,
        (SupplyType::Services, Some(ServiceCategory::Exempt)) => VatScenario::EeDomExempt,
        (SupplyType::Services, Some(ServiceCategory::Zero)) => VatScenario::EeDom0Taxable,
        _ => VatScenario::EeDom24Std,
    }
}

/// Supplier holds a non-Estonian VAT id and the invoice shows a non-zero rate,
/// i.e. foreign VAT was already charged.
fn charged_foreign_vat(fields: &FieldMap) -> bool {
    let foreign_vat_id = fields
        .text(SUPPLIER_VAT_ID)
        .is_some_and(|vat_id| !vat_id.starts_with("EE"));
    foreign_vat_id
        && fields
            .value(VAT_RATES)
            .is_some_and(|rates| !has_zero_rate(rates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::intake::{FieldValue, InvoiceFieldValue};

    fn fields(entries: &[(&str, &str)]) -> FieldMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), InvoiceFieldValue::text(*value)))
            .collect()
    }

    fn invoice(buyer: &str, supplier: &str, supply: &str, category: &str) -> FieldMap {
        fields(&[
            (BUYER_COUNTRY_GROUP, buyer),
            (SUPPLIER_COUNTRY_GROUP, supplier),
            (SUPPLY_TYPE, supply),
            (SERVICE_CATEGORY, category),
        ])
    }

    #[test]
    fn domestic_reduced_services() {
        assert_eq!(
            classify(&invoice("EE", "EE", "SERVICES", "SERV_9")),
            Some(VatScenario::EeDom9Reduced)
        );
    }

    #[test]
    fn eu_goods_standard_rate() {
        assert_eq!(
            classify(&invoice("EE", "EU_OTHER", "GOODS", "SERV_24")),
            Some(VatScenario::EuGoodsIcs24Full)
        );
    }

    #[test]
    fn eu_services_with_foreign_vat_are_cost_only() {
        let fields = fields(&[
            (BUYER_COUNTRY_GROUP, "EE"),
            (SUPPLIER_COUNTRY_GROUP, "EU_OTHER"),
            (SUPPLY_TYPE, "SERVICES"),
            (SUPPLIER_VAT_ID, "DE123"),
            (VAT_RATES, "19"),
        ]);
        assert_eq!(classify(&fields), Some(VatScenario::EuForeignVatCostOnly));
    }

    #[test]
    fn non_eu_reduced_goods_import() {
        assert_eq!(
            classify(&invoice("EE", "NON_EU", "GOODS", "SERV_9")),
            Some(VatScenario::NonEuImportKmd9)
        );
    }

    #[test]
    fn foreign_buyer_is_out_of_scope() {
        let fields = fields(&[
            (BUYER_COUNTRY_GROUP, "DE"),
            (SUPPLIER_COUNTRY_GROUP, "EE"),
            (SUPPLY_TYPE, "GOODS"),
        ]);
        assert_eq!(classify(&fields), Some(VatScenario::OutOfScope));
    }

    #[test]
    fn missing_supplier_group_is_undeterminable() {
        let missing = fields(&[(BUYER_COUNTRY_GROUP, "EE"), (SUPPLY_TYPE, "GOODS")]);
        assert_eq!(classify(&missing), None);

        let empty = fields(&[
            (BUYER_COUNTRY_GROUP, "EE"),
            (SUPPLIER_COUNTRY_GROUP, ""),
            (SUPPLY_TYPE, "GOODS"),
        ]);
        assert_eq!(classify(&empty), None, "empty string counts as missing");
    }

    #[test]
    fn unknown_supplier_group_is_undeterminable() {
        assert_eq!(classify(&invoice("EE", "MARS", "SERVICES", "SERV_24")), None);
    }

    #[test]
    fn domestic_services_lookup_table() {
        let cases = [
            ("SERV_13", VatScenario::EeDom13Acc),
            ("SERV_EX", VatScenario::EeDomExempt),
            ("SERV_0", VatScenario::EeDom0Taxable),
            ("SERV_24", VatScenario::EeDom24Std),
            ("SERV_77", VatScenario::EeDom24Std),
        ];
        for (category, expected) in cases {
            assert_eq!(
                classify(&invoice("EE", "EE", "SERVICES", category)),
                Some(expected),
                "{category}"
            );
        }

        let no_category = fields(&[
            (BUYER_COUNTRY_GROUP, "EE"),
            (SUPPLIER_COUNTRY_GROUP, "EE"),
            (SUPPLY_TYPE, "SERVICES"),
        ]);
        assert_eq!(classify(&no_category), Some(VatScenario::EeDom24Std));
    }

    #[test]
    fn domestic_goods_ignore_exempt_and_zero_codes() {
        assert_eq!(
            classify(&invoice("EE", "EE", "GOODS", "SERV_13")),
            Some(VatScenario::EeDom13Acc)
        );
        assert_eq!(
            classify(&invoice("EE", "EE", "GOODS", "SERV_EX")),
            Some(VatScenario::EeDom24Std)
        );
        assert_eq!(
            classify(&invoice("EE", "EE", "GOODS", "SERV_0")),
            Some(VatScenario::EeDom24Std)
        );
    }

    #[test]
    fn domestic_unknown_supply_type_is_undeterminable() {
        assert_eq!(classify(&invoice("EE", "EE", "RENT", "SERV_24")), None);
    }

    #[test]
    fn foreign_supply_type_outside_goods_and_services() {
        assert_eq!(
            classify(&invoice("EE", "EU_OTHER", "RENT", "SERV_9")),
            Some(VatScenario::OutOfScope)
        );
        assert_eq!(
            classify(&invoice("EE", "NON_EU", "RENT", "SERV_9")),
            Some(VatScenario::OutOfScope)
        );
    }

    #[test]
    fn eu_services_reverse_charge_when_rate_is_zero_or_vat_id_estonian() {
        let mut zero_rated = invoice("EE", "EU_OTHER", "SERVICES", "SERV_9");
        zero_rated.insert(SUPPLIER_VAT_ID, InvoiceFieldValue::text("FI555"));
        zero_rated.insert(
            VAT_RATES,
            InvoiceFieldValue::new(
                FieldValue::List(vec![FieldValue::Number(0.0), FieldValue::Number(24.0)]),
                None,
            ),
        );
        assert_eq!(classify(&zero_rated), Some(VatScenario::EuServRc9Full));

        let mut estonian_id = invoice("EE", "EU_OTHER", "SERVICES", "SERV_24");
        estonian_id.insert(SUPPLIER_VAT_ID, InvoiceFieldValue::text("EE100200300"));
        estonian_id.insert(VAT_RATES, InvoiceFieldValue::text("24"));
        assert_eq!(classify(&estonian_id), Some(VatScenario::EuServRc24));

        let mut no_rates = invoice("EE", "EU_OTHER", "SERVICES", "SERV_24");
        no_rates.insert(SUPPLIER_VAT_ID, InvoiceFieldValue::text("DE999"));
        assert_eq!(classify(&no_rates), Some(VatScenario::EuServRc24));
    }

    #[test]
    fn non_eu_services() {
        assert_eq!(
            classify(&invoice("EE", "NON_EU", "SERVICES", "SERV_9")),
            Some(VatScenario::NonEuServRc9Full)
        );
        assert_eq!(
            classify(&invoice("EE", "NON_EU", "SERVICES", "SERV_13")),
            Some(VatScenario::NonEuServRc24Full)
        );
    }
}
