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

//! Error types for the core crate

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a refresh did not produce a fresh value.
///
/// None of these are fatal: the poller logs them and moves on to the next node.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("no rows returned for {0}")]
    NoData(String),

    #[error("implausible value {value} for {key}")]
    Implausible { key: String, value: f64 },

    /// Previous value is kept
    #[error("update skipped, value {value} for {key} outside plausible range")]
    Skipped { key: String, value: f64 },

    #[error("transport error for {key}: {message}")]
    Transport { key: String, message: String },

    #[error("input reading {0} is unavailable")]
    MissingInput(String),

    #[error("input reading {name} is not a finite number ({value})")]
    NonFinite { name: String, value: f64 },

    #[error("invalid address returned: {0}")]
    InvalidAddress(String),
}

impl ReadingError {
    /// True when the reading kept its previous value
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle involving {0}")]
    Cycle(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("duplicate node: {0}")]
    DuplicateNode(String),
}

/// Setup-time validation failure, surfaced to the user as a form error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormError {
    #[error("invalid_ip")]
    InvalidIp,
    #[error("port_too_low")]
    PortTooLow,
    #[error("port_too_high")]
    PortTooHigh,
    #[error("token_empty")]
    TokenEmpty,
    #[error("db_not_found")]
    DbNotFound,
    #[error("token_invalid")]
    TokenInvalid,
}

impl FormError {
    /// Stable error code shown next to the form
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidIp => "invalid_ip",
            Self::PortTooLow => "port_too_low",
            Self::PortTooHigh => "port_too_high",
            Self::TokenEmpty => "token_empty",
            Self::DbNotFound => "db_not_found",
            Self::TokenInvalid => "token_invalid",
        }
    }

    /// Human readable hint for CLI output
    pub fn hint(self) -> &'static str {
        match self {
            Self::InvalidIp => "Host must be an IPv4 address like 192.168.178.50",
            Self::PortTooLow => "Port must be at least 300",
            Self::PortTooHigh => "Port must be at most 65535",
            Self::TokenEmpty => "An access token is required",
            Self::DbNotFound => "No healthy database answered on that address",
            Self::TokenInvalid => "The token did not return enough data",
        }
    }
}

/// Wrapper used when printing a form error together with its hint
#[derive(Debug)]
pub struct FormErrorDisplay(pub FormError);

impl fmt::Display for FormErrorDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0.code(), self.0.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_error_codes_match_display() {
        for err in [
            FormError::InvalidIp,
            FormError::PortTooLow,
            FormError::PortTooHigh,
            FormError::TokenEmpty,
            FormError::DbNotFound,
            FormError::TokenInvalid,
        ] {
            assert_eq!(err.to_string(), err.code());
        }
    }

    #[test]
    fn test_form_error_serde_uses_code() {
        let json = serde_json::to_string(&FormError::PortTooHigh).unwrap();
        assert_eq!(json, "\"port_too_high\"");
    }

    #[test]
    fn test_skip_detection() {
        let err = ReadingError::Skipped {
            key: "inverter/Frequency.Grid".to_owned(),
            value: 150.0,
        };
        assert!(err.is_skip());
        assert!(!ReadingError::NoData("x".to_owned()).is_skip());
    }
}
