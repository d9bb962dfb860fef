// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link aggregation.
//!
//! [`LinkCollection`] owns the monitors; [`Aggregator`] layers named groups
//! and bulk settings on top, rebuilding its views only when the collection's
//! generation moves.

mod aggregate;
mod collection;

pub use aggregate::Aggregator;
pub use collection::LinkCollection;

use std::fmt;

/// Combined `enabled` flag of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEnabled {
    /// Every member disabled (or no members).
    Disabled,
    /// Every member enabled.
    Enabled,
    /// Members disagree.
    MultipleValues,
}

impl GroupEnabled {
    pub fn from_values(values: impl IntoIterator<Item = bool>) -> Self {
        let mut any_on = false;
        let mut any_off = false;
        for value in values {
            if value {
                any_on = true;
            } else {
                any_off = true;
            }
        }
        match (any_on, any_off) {
            (true, true) => GroupEnabled::MultipleValues,
            (true, false) => GroupEnabled::Enabled,
            _ => GroupEnabled::Disabled,
        }
    }
}

/// Result of checking a link for timecode calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Succeeded,
    /// Buffered frames carry no timecode.
    FailedNoTimecode,
    /// Link is not active.
    FailedUnresponsiveInput,
    /// Timecode frame rate is zero or malformed.
    FailedInvalidFrameRate,
    FailedNoDataBuffered,
    /// The buffer was full and has been grown; try again.
    RetryBufferSizeIncreased,
}

impl CalibrationOutcome {
    pub fn is_success(&self) -> bool {
        *self == CalibrationOutcome::Succeeded
    }
}

impl fmt::Display for CalibrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CalibrationOutcome::Succeeded => "calibration succeeded",
            CalibrationOutcome::FailedNoTimecode => "no timecode in buffered frames",
            CalibrationOutcome::FailedUnresponsiveInput => "input not responding",
            CalibrationOutcome::FailedInvalidFrameRate => "invalid timecode frame rate",
            CalibrationOutcome::FailedNoDataBuffered => "no data buffered",
            CalibrationOutcome::RetryBufferSizeIncreased => "buffer size increased, retry",
        };
        f.write_str(text)
    }
}
