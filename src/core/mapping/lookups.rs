//! Lookup tables used by the mappers
//!
//! Tables are read once per run and never change afterwards. Numeric §301
//! keys are normalized so that `"01"` and `"1"` address the same entry.

use crate::domain::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Discharge reason (§301 digits 1-2) with its HL7 discharge disposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DischargeReason {
    pub display: String,
    pub disposition_code: String,
    pub disposition_display: String,
}

/// Drug application derived from an OPS chapter 6 code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsDrug {
    /// Substance name; combination products join substances with `-`
    pub medication: String,
    pub atc_code: String,
    /// Free-text dosage
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ucum_short: Option<String>,
    #[serde(default)]
    pub ucum_full: Option<String>,
    #[serde(default)]
    pub dosage_min: Option<f64>,
    #[serde(default)]
    pub dosage_max: Option<f64>,
    #[serde(default)]
    pub combination: bool,
}

impl OpsDrug {
    /// Ingredient substance names, empty when the substance is unknown
    pub fn substances(&self) -> Vec<&str> {
        if self.medication == "UNKLAR" {
            return Vec::new();
        }
        if self.combination {
            self.medication.split('-').map(str::trim).collect()
        } else {
            vec![self.medication.as_str()]
        }
    }
}

/// Substance codes used for medication ingredients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceCodes {
    pub unii: String,
    pub ask: String,
    pub cas: String,
}

/// Examination group of a lung-function test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LungFunctionGroup {
    /// Body plethysmography
    #[serde(rename = "B")]
    Plethysmography,
    /// Spirometry
    #[serde(rename = "SP")]
    Spirometry,
    /// Diffusion capacity (transfer factor)
    #[serde(rename = "TRA")]
    Diffusion,
}

impl LungFunctionGroup {
    pub fn prefix(&self) -> &'static str {
        match self {
            LungFunctionGroup::Plethysmography => "B",
            LungFunctionGroup::Spirometry => "SP",
            LungFunctionGroup::Diffusion => "TRA",
        }
    }
}

/// Measurement relative to bronchodilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LungFunctionPhase {
    Pre,
    Post,
    /// Groups without a bronchodilation test
    None,
}

/// One measured lung-function parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LungFunctionParameter {
    /// Source column of the measured value
    pub column: String,
    /// Source column of the predicted value
    #[serde(default)]
    pub target_column: Option<String>,
    pub group: LungFunctionGroup,
    pub phase: LungFunctionPhase,
    pub unit: String,
    /// LOINC code when pre and post values were both measured
    #[serde(default)]
    pub loinc: Option<String>,
    /// LOINC code when only a single (pre) measurement exists
    #[serde(default)]
    pub loinc_single: Option<String>,
    #[serde(default)]
    pub loinc_display: Option<String>,
    #[serde(default)]
    pub loinc_single_display: Option<String>,
    #[serde(default)]
    pub i2b2: Option<String>,
    #[serde(default)]
    pub i2b2_single: Option<String>,
}

/// SNOMED CT procedure code of an examination group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCode {
    pub code: String,
    pub display: String,
}

/// Immutable lookup tables
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTables {
    pub admission_reason_1_2: BTreeMap<u32, String>,
    pub admission_reason_3_4: BTreeMap<u32, String>,
    pub discharge_reason_1_2: BTreeMap<u32, DischargeReason>,
    pub discharge_reason_3: BTreeMap<u32, String>,
    pub departments: BTreeMap<u32, String>,
    pub ops_drugs: BTreeMap<String, OpsDrug>,
    pub substances: BTreeMap<String, SubstanceCodes>,
    pub lung_function: Vec<LungFunctionParameter>,
    /// Keyed by group prefix plus phase, e.g. `SP_POST`, `SP_`
    pub lung_function_groups: BTreeMap<String, GroupCode>,
}

/// File layout; every table is optional and falls back to the defaults
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTables {
    admission_reason_1_2: Option<BTreeMap<String, String>>,
    admission_reason_3_4: Option<BTreeMap<String, String>>,
    discharge_reason_1_2: Option<BTreeMap<String, DischargeReason>>,
    discharge_reason_3: Option<BTreeMap<String, String>>,
    departments: Option<BTreeMap<String, String>>,
    ops_drugs: Option<BTreeMap<String, OpsDrug>>,
    substances: Option<BTreeMap<String, SubstanceCodes>>,
    lung_function: Option<Vec<LungFunctionParameter>>,
    lung_function_groups: Option<BTreeMap<String, GroupCode>>,
}

fn numeric_keys<V>(table: &str, raw: BTreeMap<String, V>) -> Result<BTreeMap<u32, V>> {
    raw.into_iter()
        .map(|(key, value)| {
            key.trim()
                .parse::<u32>()
                .map(|k| (k, value))
                .map_err(|_| {
                    SyncError::Configuration(format!(
                        "Lookup table '{table}' has non-numeric key '{key}'"
                    ))
                })
        })
        .collect()
}

/// Parses the numeric code in `code[range]`
fn code_part(code: &str, range: std::ops::Range<usize>) -> Option<u32> {
    code.get(range).and_then(|part| part.parse().ok())
}

impl LookupTables {
    /// Loads tables from a TOML file; tables missing from the file keep
    /// their built-in defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Configuration(format!(
                "Failed to read lookup file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw: RawTables = toml::from_str(contents)?;
        let mut tables = Self::default();

        if let Some(t) = raw.admission_reason_1_2 {
            tables.admission_reason_1_2 = numeric_keys("admission_reason_1_2", t)?;
        }
        if let Some(t) = raw.admission_reason_3_4 {
            tables.admission_reason_3_4 = numeric_keys("admission_reason_3_4", t)?;
        }
        if let Some(t) = raw.discharge_reason_1_2 {
            tables.discharge_reason_1_2 = numeric_keys("discharge_reason_1_2", t)?;
        }
        if let Some(t) = raw.discharge_reason_3 {
            tables.discharge_reason_3 = numeric_keys("discharge_reason_3", t)?;
        }
        if let Some(t) = raw.departments {
            tables.departments = numeric_keys("departments", t)?;
        }
        if let Some(t) = raw.ops_drugs {
            tables.ops_drugs = t;
        }
        if let Some(t) = raw.substances {
            tables.substances = t;
        }
        if let Some(t) = raw.lung_function {
            tables.lung_function = t;
        }
        if let Some(t) = raw.lung_function_groups {
            tables.lung_function_groups = t;
        }

        Ok(tables)
    }

    /// Display of an admission reason code such as `0101`
    pub fn admission_display(&self, code: &str) -> Option<String> {
        let first = code_part(code, 0..2).and_then(|k| self.admission_reason_1_2.get(&k));
        let second = code_part(code, 2..4).and_then(|k| self.admission_reason_3_4.get(&k));
        join_display(first.map(String::as_str), second.map(String::as_str))
    }

    /// Display and disposition of a discharge reason code such as `011`
    pub fn discharge(&self, code: &str) -> (Option<String>, Option<&DischargeReason>) {
        let first = code_part(code, 0..2).and_then(|k| self.discharge_reason_1_2.get(&k));
        let second = code_part(code, 2..3).and_then(|k| self.discharge_reason_3.get(&k));
        (
            join_display(first.map(|r| r.display.as_str()), second.map(String::as_str)),
            first,
        )
    }

    /// Department name of a §301 code; specialized codes fall back to
    /// their main department
    pub fn department_name(&self, code: &str) -> Option<&str> {
        let numeric: u32 = code.trim().parse().ok()?;
        self.departments
            .get(&numeric)
            .or_else(|| self.departments.get(&(numeric / 100 * 100)))
            .map(String::as_str)
    }

    pub fn ops_drug(&self, ops_code: &str) -> Option<&OpsDrug> {
        self.ops_drugs.get(ops_code)
    }

    pub fn substance(&self, name: &str) -> Option<&SubstanceCodes> {
        self.substances.get(name)
    }

    pub fn lung_function_group(&self, key: &str) -> Option<&GroupCode> {
        self.lung_function_groups.get(key)
    }

    /// Every source column the lung-function pass reads
    pub fn lung_function_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .lung_function
            .iter()
            .flat_map(|p| std::iter::once(p.column.clone()).chain(p.target_column.clone()))
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }
}

fn join_display(first: Option<&str>, second: Option<&str>) -> Option<String> {
    match (first, second) {
        (Some(a), Some(b)) => Some(format!("{a} - {b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    }
}

fn strings(pairs: &[(u32, &str)]) -> BTreeMap<u32, String> {
    pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
}

fn discharge_reason(display: &str, code: &str, disposition: &str) -> DischargeReason {
    DischargeReason {
        display: display.to_string(),
        disposition_code: code.to_string(),
        disposition_display: disposition.to_string(),
    }
}

struct ParameterRow {
    column: &'static str,
    target: &'static str,
    group: LungFunctionGroup,
    phase: LungFunctionPhase,
    unit: &'static str,
    loinc: Option<&'static str>,
    loinc_single: Option<&'static str>,
    i2b2: Option<&'static str>,
    i2b2_single: Option<&'static str>,
}

fn loinc_display(code: &str) -> Option<String> {
    let display = match code {
        "82615-6" => {
            "Vital capacity [Volume] Respiratory system by Spirometry --pre bronchodilation"
        }
        "82616-4" => {
            "Vital capacity [Volume] Respiratory system by Spirometry --post bronchodilation"
        }
        "19866-3" => "Vital capacity [Volume] Respiratory system by Spirometry",
        "19876-2" => {
            "Forced vital capacity [Volume] Respiratory system by Spirometry --pre bronchodilation"
        }
        "19874-7" => {
            "Forced vital capacity [Volume] Respiratory system by Spirometry --post bronchodilation"
        }
        "19868-9" => "Forced vital capacity [Volume] Respiratory system by Spirometry",
        "20157-4" => "FEV1 --pre bronchodilation",
        "20155-8" => "FEV1 --post bronchodilation",
        "20150-9" => "FEV1",
        "19852-3" => "Inspiratory capacity by Spirometry",
        "91980-3" => "Specific airway resistance by Plethysmograph body box",
        "81452-5" => "Residual volume --pre bronchodilation",
        "81453-3" => "Residual volume --post bronchodilation",
        "20146-7" => "Residual volume",
        "81450-9" => "Total lung capacity --pre bronchodilation",
        "81451-7" => "Total lung capacity --post bronchodilation",
        "19859-8" => "Total lung capacity by Plethysmograph body box",
        "19911-7" => "Diffusion capacity.carbon monoxide",
        "19916-6" => "Diffusion capacity/Alveolar volume",
        _ => return None,
    };
    Some(display.to_string())
}

fn default_lung_function() -> Vec<LungFunctionParameter> {
    use LungFunctionGroup::{Diffusion, Plethysmography, Spirometry};
    use LungFunctionPhase::{None as Single, Post, Pre};

    let rows = [
        ParameterRow {
            column: "bp_vc_actual",
            target: "bp_vc_target",
            group: Spirometry,
            phase: Pre,
            unit: "L",
            loinc: Some("82615-6"),
            loinc_single: Some("19866-3"),
            i2b2: Some("LCS-MRCM:pul:vc:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:vc:best"),
        },
        ParameterRow {
            column: "bp_fvcex_actual",
            target: "bp_fvcex_target",
            group: Spirometry,
            phase: Pre,
            unit: "L",
            loinc: Some("19876-2"),
            loinc_single: Some("19868-9"),
            i2b2: Some("LCS-MRCM:pul:fvc:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:fvc:best"),
        },
        ParameterRow {
            column: "bp_fev1_actual",
            target: "bp_fev1_target",
            group: Spirometry,
            phase: Pre,
            unit: "L",
            loinc: Some("20157-4"),
            loinc_single: Some("20150-9"),
            i2b2: Some("LCS-MRCM:pul:fev1:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:fev1:best"),
        },
        ParameterRow {
            column: "bp_ic_actual",
            target: "bp_ic_target",
            group: Spirometry,
            phase: Pre,
            unit: "L",
            loinc: None,
            loinc_single: Some("19852-3"),
            i2b2: Some("LCS-MRCM:pul:ic:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:ic:best"),
        },
        ParameterRow {
            column: "bpl_vc_actual",
            target: "bpl_vc_target",
            group: Spirometry,
            phase: Post,
            unit: "L",
            loinc: Some("82616-4"),
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:vc:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_fvcex_actual",
            target: "bpl_fvcex_target",
            group: Spirometry,
            phase: Post,
            unit: "L",
            loinc: Some("19874-7"),
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:fvc:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_fev1_actual",
            target: "bpl_fev1_target",
            group: Spirometry,
            phase: Post,
            unit: "L",
            loinc: Some("20155-8"),
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:fev1:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_ic_actual",
            target: "bpl_ic_target2",
            group: Spirometry,
            phase: Post,
            unit: "L",
            loinc: None,
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:ic:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bp_rawtot_actual",
            target: "bp_rawtot_target",
            group: Plethysmography,
            phase: Pre,
            unit: "kPa.s/L",
            loinc: None,
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:sreff:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:sreff:best"),
        },
        ParameterRow {
            column: "bp_srawtot_actual",
            target: "bp_srawtot_target",
            group: Plethysmography,
            phase: Pre,
            unit: "kPa.s",
            loinc: Some("91980-3"),
            loinc_single: Some("91980-3"),
            i2b2: Some("LCS-MRCM:pul:srtot:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:srtot:best"),
        },
        ParameterRow {
            column: "bp_rv_actual",
            target: "bp_rv_target",
            group: Plethysmography,
            phase: Pre,
            unit: "L",
            loinc: Some("81452-5"),
            loinc_single: Some("20146-7"),
            i2b2: Some("LCS-MRCM:pul:rv:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:rv:best"),
        },
        ParameterRow {
            column: "bp_tlc_actual",
            target: "bp_tlc_target",
            group: Plethysmography,
            phase: Pre,
            unit: "L",
            loinc: Some("81450-9"),
            loinc_single: Some("19859-8"),
            i2b2: Some("LCS-MRCM:pul:tlc:prebd"),
            i2b2_single: Some("LCS-MRCM:pul:tlc:best"),
        },
        ParameterRow {
            column: "bpl_rawtot_actual",
            target: "bpl_rawtot_target",
            group: Plethysmography,
            phase: Post,
            unit: "kPa.s/L",
            loinc: None,
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:sreff:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_srawtot_actual",
            target: "bpl_srawtot_target",
            group: Plethysmography,
            phase: Post,
            unit: "kPa.s",
            loinc: None,
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:srtot:postbd:prdc"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_rv_actual",
            target: "bpl_rv_target",
            group: Plethysmography,
            phase: Post,
            unit: "L",
            loinc: Some("81453-3"),
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:rv:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bpl_tlc_actual",
            target: "bpl_tlc_target",
            group: Plethysmography,
            phase: Post,
            unit: "L",
            loinc: Some("81451-7"),
            loinc_single: None,
            i2b2: Some("LCS-MRCM:pul:tlc:postbd"),
            i2b2_single: None,
        },
        ParameterRow {
            column: "bp_dlcosb_actual",
            target: "bp_dlcosb_target",
            group: Diffusion,
            phase: Single,
            unit: "mmol/min/kPa",
            loinc: None,
            loinc_single: Some("19911-7"),
            i2b2: None,
            i2b2_single: Some("LCS-MRCM:pul:dlco:best"),
        },
        ParameterRow {
            column: "bp_kco_actual",
            target: "bp_kco_target",
            group: Diffusion,
            phase: Single,
            unit: "mmol/min/kPa/L",
            loinc: None,
            loinc_single: Some("19916-6"),
            i2b2: None,
            i2b2_single: Some("LCS-MRCM:pul:dlcova:best"),
        },
    ];

    rows.into_iter()
        .map(|r| LungFunctionParameter {
            column: r.column.to_string(),
            target_column: Some(r.target.to_string()),
            group: r.group,
            phase: r.phase,
            unit: r.unit.to_string(),
            loinc: r.loinc.map(str::to_string),
            loinc_single: r.loinc_single.map(str::to_string),
            loinc_display: r.loinc.and_then(loinc_display),
            loinc_single_display: r.loinc_single.and_then(loinc_display),
            i2b2: r.i2b2.map(str::to_string),
            i2b2_single: r.i2b2_single.map(str::to_string),
        })
        .collect()
}

fn default_lung_function_groups() -> BTreeMap<String, GroupCode> {
    let group = |code: &str, display: &str| GroupCode {
        code: code.to_string(),
        display: display.to_string(),
    };
    let plethysmography = group("28275007", "Total body plethysmography (procedure)");
    let spirometry = group("127783003", "Spirometry (procedure)");

    BTreeMap::from([
        ("B_PRE".to_string(), plethysmography.clone()),
        ("B_POST".to_string(), plethysmography.clone()),
        ("B_".to_string(), plethysmography),
        ("SP_PRE".to_string(), spirometry.clone()),
        ("SP_".to_string(), spirometry),
        (
            "SP_POST".to_string(),
            group("767906009", "Post bronchodilator spirometry (procedure)"),
        ),
        (
            "TRA_".to_string(),
            group("87529006", "Membrane diffusion capacity (procedure)"),
        ),
    ])
}

impl Default for LookupTables {
    /// §301 key tables and the lung-function parameter set; drug tables
    /// are site-specific and start empty
    fn default() -> Self {
        Self {
            admission_reason_1_2: strings(&[
                (1, "Krankenhausbehandlung, vollstationär"),
                (
                    2,
                    "Krankenhausbehandlung, vollstationär mit vorausgegangener vorstationärer Behandlung",
                ),
                (3, "Krankenhausbehandlung, teilstationär"),
                (4, "vorstationäre Behandlung ohne anschließende vollstationäre Behandlung"),
                (5, "Stationäre Entbindung"),
                (6, "Geburt"),
                (7, "Wiederaufnahme wegen Komplikationen (Fallpauschale)"),
                (8, "Stationäre Aufnahme zur Organentnahme"),
                (10, "Stationsäquivalente Behandlung"),
            ]),
            admission_reason_3_4: strings(&[
                (1, "Normalfall"),
                (2, "Arbeitsunfall/Berufskrankheit"),
                (3, "Verkehrsunfall/Sportunfall/Sonstiger Unfall"),
                (4, "Hinweis auf Einwirkung von äußerer Gewalt"),
                (6, "Kriegsbeschädigten-Leiden/BVG-Leiden"),
                (7, "Notfall"),
            ]),
            discharge_reason_1_2: BTreeMap::from([
                (1, discharge_reason("Behandlung regulär beendet", "home", "Home")),
                (
                    2,
                    discharge_reason(
                        "Behandlung regulär beendet, nachstationäre Behandlung vorgesehen",
                        "home",
                        "Home",
                    ),
                ),
                (3, discharge_reason("Behandlung aus sonstigen Gründen beendet", "oth", "Other")),
                (
                    4,
                    discharge_reason(
                        "Behandlung gegen ärztlichen Rat beendet",
                        "aadvice",
                        "Left against advice",
                    ),
                ),
                (5, discharge_reason("Zuständigkeitswechsel des Kostenträgers", "oth", "Other")),
                (
                    6,
                    discharge_reason(
                        "Verlegung in ein anderes Krankenhaus",
                        "other-hcf",
                        "Other healthcare facility",
                    ),
                ),
                (7, discharge_reason("Tod", "exp", "Expired")),
                (
                    8,
                    discharge_reason(
                        "Verlegung in ein anderes Krankenhaus im Rahmen einer Zusammenarbeit",
                        "other-hcf",
                        "Other healthcare facility",
                    ),
                ),
                (
                    9,
                    discharge_reason(
                        "Entlassung in eine Rehabilitationseinrichtung",
                        "rehab",
                        "Rehabilitation",
                    ),
                ),
                (
                    10,
                    discharge_reason(
                        "Entlassung in eine Pflegeeinrichtung",
                        "snf",
                        "Skilled nursing facility",
                    ),
                ),
                (11, discharge_reason("Entlassung in ein Hospiz", "hosp", "Hospice")),
                (
                    13,
                    discharge_reason(
                        "externe Verlegung zur psychiatrischen Behandlung",
                        "psy",
                        "Psychiatric hospital",
                    ),
                ),
                (
                    14,
                    discharge_reason(
                        "Behandlung aus sonstigen Gründen beendet, nachstationäre Behandlung vorgesehen",
                        "oth",
                        "Other",
                    ),
                ),
                (
                    15,
                    discharge_reason(
                        "Behandlung gegen ärztlichen Rat beendet, nachstationäre Behandlung vorgesehen",
                        "aadvice",
                        "Left against advice",
                    ),
                ),
                (
                    17,
                    discharge_reason(
                        "interne Verlegung mit Wechsel zwischen den Entgeltbereichen",
                        "other-hcf",
                        "Other healthcare facility",
                    ),
                ),
                (
                    22,
                    discharge_reason(
                        "Fallabschluss (interne Verlegung) bei Wechsel zwischen voll- und teilstationärer Behandlung",
                        "oth",
                        "Other",
                    ),
                ),
                (
                    25,
                    discharge_reason(
                        "Entlassung zum Jahresende bei Aufnahme im Vorjahr",
                        "oth",
                        "Other",
                    ),
                ),
            ]),
            discharge_reason_3: strings(&[
                (1, "arbeitsfähig entlassen"),
                (2, "arbeitsunfähig entlassen"),
                (9, "keine Angabe"),
            ]),
            departments: strings(&[
                (100, "Innere Medizin"),
                (200, "Geriatrie"),
                (300, "Kardiologie"),
                (400, "Nephrologie"),
                (500, "Hämatologie und internistische Onkologie"),
                (600, "Endokrinologie"),
                (700, "Gastroenterologie"),
                (800, "Pneumologie"),
                (900, "Rheumatologie"),
                (1000, "Pädiatrie"),
                (1100, "Kinderkardiologie"),
                (1200, "Neonatologie"),
                (1300, "Kinderchirurgie"),
                (1400, "Lungen- und Bronchialheilkunde"),
                (1500, "Allgemeine Chirurgie"),
                (1600, "Unfallchirurgie"),
                (1700, "Neurochirurgie"),
                (1800, "Gefäßchirurgie"),
                (1900, "Plastische Chirurgie"),
                (2000, "Thoraxchirurgie"),
                (2100, "Herzchirurgie"),
                (2200, "Urologie"),
                (2300, "Orthopädie"),
                (2400, "Frauenheilkunde und Geburtshilfe"),
                (2500, "Geburtshilfe"),
                (2600, "Hals-, Nasen-, Ohrenheilkunde"),
                (2700, "Augenheilkunde"),
                (2800, "Neurologie"),
                (2900, "Allgemeine Psychiatrie"),
                (3000, "Kinder- und Jugendpsychiatrie"),
                (3100, "Psychosomatik/Psychotherapie"),
                (3200, "Nuklearmedizin"),
                (3300, "Strahlenheilkunde"),
                (3400, "Dermatologie"),
                (3500, "Zahn- und Kieferheilkunde, Mund- und Kieferchirurgie"),
                (3600, "Intensivmedizin"),
                (3700, "Sonstige Fachabteilung"),
            ]),
            ops_drugs: BTreeMap::new(),
            substances: BTreeMap::new(),
            lung_function: default_lung_function(),
            lung_function_groups: default_lung_function_groups(),
        }
    }
}
