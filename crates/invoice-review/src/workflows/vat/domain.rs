use std::fmt;

use serde::{Deserialize, Serialize};

/// Country grouping the extractor assigns to buyer and supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountryGroup {
    #[serde(rename = "EE")]
    Estonia,
    #[serde(rename = "EU_OTHER")]
    OtherEu,
    #[serde(rename = "NON_EU")]
    NonEu,
}

impl CountryGroup {
    /// Exact, case-sensitive match on the extractor's codes.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "EE" => Some(Self::Estonia),
            "EU_OTHER" => Some(Self::OtherEu),
            "NON_EU" => Some(Self::NonEu),
            _ => None,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Estonia => "EE",
            Self::OtherEu => "EU_OTHER",
            Self::NonEu => "NON_EU",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplyType {
    Goods,
    Services,
}

impl SupplyType {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "GOODS" => Some(Self::Goods),
            "SERVICES" => Some(Self::Services),
            _ => None,
        }
    }
}

/// Rate category code. Under `GOODS` the same codes double as the reduced-rate
/// signal (`SERV_9`, `SERV_13`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    #[serde(rename = "SERV_0")]
    Zero,
    #[serde(rename = "SERV_9")]
    Reduced9,
    #[serde(rename = "SERV_13")]
    Accommodation13,
    #[serde(rename = "SERV_24")]
    Standard24,
    #[serde(rename = "SERV_EX")]
    Exempt,
}

impl ServiceCategory {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "SERV_0" => Some(Self::Zero),
            "SERV_9" => Some(Self::Reduced9),
            "SERV_13" => Some(Self::Accommodation13),
            "SERV_24" => Some(Self::Standard24),
            "SERV_EX" => Some(Self::Exempt),
            _ => None,
        }
    }
}

/// Scenario families, mostly useful for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioFamily {
    OutOfScope,
    Domestic,
    IntraEu,
    NonEu,
}

/// VAT treatment tag assigned to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatScenario {
    #[serde(rename = "OUT_OF_SCOPE")]
    OutOfScope,
    #[serde(rename = "EE_DOM_24_STD")]
    EeDom24Std,
    #[serde(rename = "EE_DOM_13_ACC")]
    EeDom13Acc,
    #[serde(rename = "EE_DOM_9_REDUCED")]
    EeDom9Reduced,
    #[serde(rename = "EE_DOM_0_TAXABLE")]
    EeDom0Taxable,
    #[serde(rename = "EE_DOM_EXEMPT")]
    EeDomExempt,
    #[serde(rename = "EU_GOODS_ICS_9_FULL")]
    EuGoodsIcs9Full,
    #[serde(rename = "EU_GOODS_ICS_24_FULL")]
    EuGoodsIcs24Full,
    #[serde(rename = "EU_SERV_RC_9_FULL")]
    EuServRc9Full,
    #[serde(rename = "EU_SERV_RC_24")]
    EuServRc24,
    #[serde(rename = "EU_FOREIGN_VAT_COST_ONLY")]
    EuForeignVatCostOnly,
    #[serde(rename = "NON_EU_SERV_RC_24_FULL")]
    NonEuServRc24Full,
    #[serde(rename = "NON_EU_SERV_RC_9_FULL")]
    NonEuServRc9Full,
    #[serde(rename = "NON_EU_IMPORT_KMD_24")]
    NonEuImportKmd24,
    #[serde(rename = "NON_EU_IMPORT_KMD_9")]
    NonEuImportKmd9,
}

impl VatScenario {
    pub const ALL: [Self; 15] = [
        Self::OutOfScope,
        Self::EeDom24Std,
        Self::EeDom13Acc,
        Self::EeDom9Reduced,
        Self::EeDom0Taxable,
        Self::EeDomExempt,
        Self::EuGoodsIcs9Full,
        Self::EuGoodsIcs24Full,
        Self::EuServRc9Full,
        Self::EuServRc24,
        Self::EuForeignVatCostOnly,
        Self::NonEuServRc24Full,
        Self::NonEuServRc9Full,
        Self::NonEuImportKmd24,
        Self::NonEuImportKmd9,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::OutOfScope => "OUT_OF_SCOPE",
            Self::EeDom24Std => "EE_DOM_24_STD",
            Self::EeDom13Acc => "EE_DOM_13_ACC",
            Self::EeDom9Reduced => "EE_DOM_9_REDUCED",
            Self::EeDom0Taxable => "EE_DOM_0_TAXABLE",
            Self::EeDomExempt => "EE_DOM_EXEMPT",
            Self::EuGoodsIcs9Full => "EU_GOODS_ICS_9_FULL",
            Self::EuGoodsIcs24Full => "EU_GOODS_ICS_24_FULL",
            Self::EuServRc9Full => "EU_SERV_RC_9_FULL",
            Self::EuServRc24 => "EU_SERV_RC_24",
            Self::EuForeignVatCostOnly => "EU_FOREIGN_VAT_COST_ONLY",
            Self::NonEuServRc24Full => "NON_EU_SERV_RC_24_FULL",
            Self::NonEuServRc9Full => "NON_EU_SERV_RC_9_FULL",
            Self::NonEuImportKmd24 => "NON_EU_IMPORT_KMD_24",
            Self::NonEuImportKmd9 => "NON_EU_IMPORT_KMD_9",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scenario| scenario.code() == code)
    }

    pub const fn family(self) -> ScenarioFamily {
        match self {
            Self::OutOfScope => ScenarioFamily::OutOfScope,
            Self::EeDom24Std
            | Self::EeDom13Acc
            | Self::EeDom9Reduced
            | Self::EeDom0Taxable
            | Self::EeDomExempt => ScenarioFamily::Domestic,
            Self::EuGoodsIcs9Full
            | Self::EuGoodsIcs24Full
            | Self::EuServRc9Full
            | Self::EuServRc24
            | Self::EuForeignVatCostOnly => ScenarioFamily::IntraEu,
            Self::NonEuServRc24Full
            | Self::NonEuServRc9Full
            | Self::NonEuImportKmd24
            | Self::NonEuImportKmd9 => ScenarioFamily::NonEu,
        }
    }
}

impl fmt::Display for VatScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
