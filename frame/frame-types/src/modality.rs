//! Imaging modalities supported by frame detection.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::FrameError;

/// Imaging modality of the scan being registered.
///
/// The modality selects which frame edges are visible in the scan and
/// whether the depth pre-filter runs before coarse registration.
///
/// # Example
///
/// ```
/// use frame_types::Modality;
///
/// let modality: Modality = "ct".parse().unwrap();
/// assert_eq!(modality, Modality::Ct);
/// assert_eq!(modality.to_string(), "CT");
/// assert!("PET".parse::<Modality>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Modality {
    /// Computed tomography.
    Ct,
    /// Magnetic resonance.
    Mr,
}

impl Modality {
    /// All supported modalities.
    pub const ALL: [Self; 2] = [Self::Ct, Self::Mr];

    /// Short upper-case name (`"CT"` or `"MR"`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ct => "CT",
            Self::Mr => "MR",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Modality {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CT" => Ok(Self::Ct),
            "MR" | "MRI" => Ok(Self::Mr),
            _ => Err(FrameError::UnknownModality(s.to_string())),
        }
    }
}
