//! Biomarker codes the validation layers refer to by name.

pub const WBC: &str = "WBC";
pub const NEUT: &str = "NEUT";
pub const LYMPH: &str = "LYMPH";
pub const MONO: &str = "MONO";
pub const EOS: &str = "EOS";
pub const BASO: &str = "BASO";

pub const CT: &str = "CT";
pub const HDL: &str = "HDL";
pub const LDL: &str = "LDL";
pub const VLDL: &str = "VLDL";

/// The four differential components that percentage detection inspects.
pub const PRIMARY_DIFFERENTIAL: [&str; 4] = [NEUT, LYMPH, MONO, EOS];

/// All five differential components of the white-cell count.
pub const DIFFERENTIAL: [&str; 5] = [NEUT, LYMPH, MONO, EOS, BASO];

/// Code carried by flags that concern the whole panel.
pub const PANEL_LEVEL: &str = "EXAM";

/// Code carried by flags for extracted items with no catalog match.
pub const UNMATCHED: &str = "UNKNOWN";
