use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use crate::models::Bounds;

/// Absolute physiological limits per biomarker code, in the catalog's units.
const PHYSIOLOGICAL_BOUNDS: &[(&str, &str, &str)] = &[
    // Hematology
    ("HCT", "15", "70"),
    ("HGB", "3", "25"),
    ("RBC", "1.5", "8.0"),
    ("WBC", "500", "100000"),
    ("PLT", "5000", "1500000"),
    ("VCM", "50", "130"),
    ("HCM", "15", "45"),
    ("CHCM", "25", "40"),
    ("RDW", "8", "25"),
    ("NEUT", "100", "50000"),
    ("LYMPH", "100", "30000"),
    ("MONO", "10", "5000"),
    ("EOS", "0", "10000"),
    ("BASO", "0", "3000"),
    // Lipids
    ("CT", "50", "500"),
    ("HDL", "5", "150"),
    ("LDL", "10", "400"),
    ("VLDL", "1", "100"),
    ("TG", "10", "2000"),
    // Glycemia
    ("GLI", "20", "600"),
    ("EAG", "20", "600"),
    ("HBA1C", "3.0", "20.0"),
    ("INS", "0.1", "500"),
    // Liver
    ("TGO", "1", "2000"),
    ("TGP", "1", "2000"),
    ("GGT", "1", "5000"),
    ("FA", "10", "3000"),
    ("BILT", "0.05", "30"),
    ("BILD", "0.01", "15"),
    ("ALB", "1.0", "7.0"),
    // Renal
    ("CREA", "0.1", "15.0"),
    ("UREA", "3", "200"),
    ("AU", "0.5", "20"),
    ("TFG", "5", "200"),
    // Thyroid
    ("TSH", "0.01", "100"),
    ("T4L", "0.1", "10.0"),
    ("T3L", "0.5", "15.0"),
    ("T3T", "0.2", "5.0"),
    // Vitamins and minerals
    ("VITD", "1", "200"),
    ("B12", "50", "5000"),
    ("FOLATO", "0.5", "50"),
    ("FE", "5", "500"),
    ("FERR", "1", "5000"),
    ("ZN", "20", "300"),
    ("MG", "0.5", "5.0"),
    ("CA", "4.0", "16.0"),
    ("CAI", "0.5", "2.0"),
    ("NA", "100", "180"),
    ("K", "1.5", "9.0"),
    ("P", "0.5", "10.0"),
    // Hormones
    ("TESTO", "1", "3000"),
    ("TESTOL", "0.1", "200"),
    ("E2", "1", "1000"),
    ("DHEAS", "5", "1000"),
    ("CORT", "0.5", "50"),
    ("IGF1", "10", "1000"),
    ("PSA", "0.01", "100"),
    ("PRL", "0.5", "200"),
    ("LH", "0.1", "100"),
    ("FSH", "0.1", "100"),
    ("DHT", "10", "3000"),
    ("SHBG", "1", "300"),
    ("HGH", "0.01", "50"),
    ("PTH", "1", "500"),
    // Inflammation
    ("PCR", "0.01", "500"),
    ("VHS", "0", "150"),
    ("HOMO", "1", "100"),
    // Proteins
    ("PT", "2", "12"),
    ("GLOB", "0.5", "7"),
    // Others
    ("PEPC", "0.1", "20"),
    ("VITC", "0.1", "15"),
    ("IGFBP3", "0.5", "15"),
];

/// Codes whose values swing widely between exams for benign reasons.
const VOLATILE_CODES: &[&str] = &["INS", "CORT", "PRL", "HGH", "VHS", "PCR", "BASO", "EOS"];

pub fn default_bounds() -> BTreeMap<String, Bounds> {
    PHYSIOLOGICAL_BOUNDS
        .iter()
        .filter_map(|(code, min, max)| {
            let min = min.parse::<Decimal>().ok()?;
            let max = max.parse::<Decimal>().ok()?;
            Some((code.to_string(), Bounds::new(min, max)))
        })
        .collect()
}

pub fn default_volatile_codes() -> BTreeSet<String> {
    VOLATILE_CODES.iter().map(|c| c.to_string()).collect()
}
