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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfluxError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed - check the access token")]
    AuthenticationFailed,

    #[error("InfluxDB API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<csv::Error> for InfluxError {
    fn from(e: csv::Error) -> Self {
        Self::ParseError(e.to_string())
    }
}

pub type InfluxResult<T> = Result<T, InfluxError>;

#[derive(Debug, Error)]
pub enum HaError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Home Assistant API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type HaResult<T> = Result<T, HaError>;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Lookup service answered with status {0}")]
    Status(u16),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
