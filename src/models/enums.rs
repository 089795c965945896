use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(PanelStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

str_enum!(Gender {
    Male => "male",
    Female => "female",
});

str_enum!(FlagSeverity {
    Info => "info",
    AutoCorrected => "auto_corrected",
    Warning => "warning",
    Error => "error",
});

str_enum!(FlagCategory {
    Physiological => "physiological",
    CrossBiomarker => "cross_biomarker",
    WbcPercentage => "wbc_percentage",
    DuplicateExam => "duplicate_exam",
    Historical => "historical",
    LowConfidence => "low_confidence",
    Unmatched => "unmatched",
});

str_enum!(Confidence {
    High => "high",
    Medium => "medium",
    Low => "low",
    Unknown => "none",
});

impl Default for Gender {
    /// Subjects without a recorded gender are evaluated against male ranges.
    fn default() -> Self {
        Self::Male
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FlagSeverity {
    /// Rank used when collapsing several flags into one status (higher wins).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::AutoCorrected => 2,
            Self::Warning => 3,
            Self::Error => 4,
        }
    }
}
