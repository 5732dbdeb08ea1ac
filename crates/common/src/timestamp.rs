//! Hybrid timestamps used for prepare and commit points.
//!
//! The total ordering is physical time, then logical counter. A commit
//! timestamp chosen as the maximum of all prepare timestamps is therefore
//! causally after every participant's prepare.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Physical time component (microseconds since Unix epoch)
    pub physical: u64,
    /// Logical counter for ordering within the same physical time
    pub logical: u32,
}

impl Timestamp {
    pub const fn new(physical: u64, logical: u32) -> Self {
        Self { physical, logical }
    }

    pub const fn from_micros(physical: u64) -> Self {
        Self::new(physical, 0)
    }

    /// Current wall-clock time with a zero logical component.
    pub fn now() -> Self {
        let physical = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        Self::from_micros(physical)
    }

    /// Parse from string format: "physical_logical"
    pub fn parse(s: &str) -> Result<Self, String> {
        let (physical, logical) = s.split_once('_').ok_or_else(|| {
            format!(
                "Invalid timestamp format: {} (expected physical_logical)",
                s
            )
        })?;

        let physical = physical
            .parse()
            .map_err(|_| format!("Invalid physical component: {}", physical))?;
        let logical = logical
            .parse()
            .map_err(|_| format!("Invalid logical component: {}", logical))?;

        Ok(Self::new(physical, logical))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.physical, self.logical)
    }
}
