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

//! InfluxDB 2.x access over the HTTP query API

pub mod client;
pub mod flux;
pub mod response;

pub use client::{DEFAULT_BUCKET, DEFAULT_ORG, DEFAULT_TIMEOUT, InfluxClient, InfluxProber};
pub use response::FluxRecord;
