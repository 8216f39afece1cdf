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

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of checking a configuration, split by severity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Issues that make the configuration unusable
    pub errors: Vec<ValidationIssue>,
    /// Suspicious but usable settings
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationIssue::new(
            field,
            message,
            ValidationSeverity::Error,
        ));
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(
            field,
            message,
            ValidationSeverity::Warning,
        ));
    }

    pub fn first_error(&self) -> Option<&ValidationIssue> {
        self.errors.first()
    }
}

/// A single finding, tied to a dotted field path such as `battery.max_capacity_kwh`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: ValidationSeverity,
}

impl ValidationIssue {
    fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        severity: ValidationSeverity,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_keep_result_valid() {
        let mut result = ValidationResult::success();
        result.add_warning("system.scan_interval_secs", "Very short");
        assert!(result.valid);
        assert!(result.errors.is_empty());

        result.add_error("influx.bucket", "Cannot be empty");
        assert!(!result.valid);
        assert_eq!(
            result.first_error().map(ToString::to_string).as_deref(),
            Some("influx.bucket: Cannot be empty")
        );
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&ValidationSeverity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
