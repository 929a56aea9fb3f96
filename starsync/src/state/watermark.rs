use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CdcValue;

/// The last successfully processed change marker for one table.
///
/// Created on the first successful load of a table and mutated only through
/// the watermark store's `advance`; removed only by an explicit reset. The
/// stored value bounds the next cycle's change selection (`cdc > value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Greatest CDC value among the rows seen by the last successful merge.
    pub cdc: CdcValue,
    /// When the merge that produced this watermark completed.
    pub last_success_at: DateTime<Utc>,
}

impl Watermark {
    /// Creates a watermark stamped with the current time.
    pub fn new(cdc: CdcValue) -> Self {
        Self {
            cdc,
            last_success_at: Utc::now(),
        }
    }

    /// Returns `true` when `candidate` may replace this watermark.
    ///
    /// Advancement requires strict growth, which protects the stored value from
    /// out-of-order processing.
    pub fn accepts(&self, candidate: &CdcValue) -> bool {
        candidate.is_after(&self.cdc)
    }
}

/// Outcome of a watermark advancement attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkAdvance {
    /// The watermark was replaced with the new value.
    Advanced(Watermark),
    /// The candidate was not strictly greater than the stored value; the store
    /// was left untouched.
    Regressed {
        stored: CdcValue,
        attempted: CdcValue,
    },
}

impl WatermarkAdvance {
    /// Returns the new watermark when the advancement succeeded.
    pub fn watermark(&self) -> Option<&Watermark> {
        match self {
            WatermarkAdvance::Advanced(watermark) => Some(watermark),
            WatermarkAdvance::Regressed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_strictly_greater_values() {
        let watermark = Watermark::new(CdcValue::parse("2025-01-03").unwrap());

        assert!(watermark.accepts(&CdcValue::parse("2025-01-04").unwrap()));
        assert!(!watermark.accepts(&CdcValue::parse("2025-01-03").unwrap()));
        assert!(!watermark.accepts(&CdcValue::parse("2025-01-02").unwrap()));
    }
}
