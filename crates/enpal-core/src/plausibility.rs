// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Enpal Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Per-field sanity filters and unit handling applied to raw database values

/// What happens to a value that fails its rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    /// Replace the value with a fixed fallback
    Coerce(f64),
    /// Keep the previous value, do not update
    Skip,
    /// Clear the native value
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlausibilityRule {
    None,
    /// Inclusive bounds
    Range {
        min: f64,
        max: f64,
        on_violation: Violation,
    },
    /// Lower bound only, used against counters falling back to zero
    Floor { min: f64, on_violation: Violation },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accept(f64),
    Coerced { original: f64, value: f64 },
    Skip,
    Reject,
}

impl PlausibilityRule {
    pub fn check(self, value: f64) -> Verdict {
        if !value.is_finite() {
            return Verdict::Reject;
        }

        let violation = match self {
            Self::None => None,
            Self::Range {
                min,
                max,
                on_violation,
            } => (value < min || value > max).then_some(on_violation),
            Self::Floor { min, on_violation } => (value < min).then_some(on_violation),
        };

        match violation {
            None => Verdict::Accept(value),
            Some(Violation::Coerce(fallback)) => Verdict::Coerced {
                original: value,
                value: fallback,
            },
            Some(Violation::Skip) => Verdict::Skip,
            Some(Violation::Reject) => Verdict::Reject,
        }
    }
}

/// Scaling applied before exposure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Identity,
    /// e.g. milliamps upstream, amps exposed
    Divide(f64),
}

impl Conversion {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::Divide(divisor) => value / divisor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    TwoDecimals,
    Raw,
}

impl Precision {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Self::TwoDecimals => (value * 100.0).round() / 100.0,
            Self::Raw => value,
        }
    }
}
