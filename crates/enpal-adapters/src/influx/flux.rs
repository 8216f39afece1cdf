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

//! Flux query text for the two query shapes the bridge needs

use enpal_types::MetricQuery;
use std::time::Duration;

/// Flux duration literal, whole minutes where possible ("5m", "90s")
pub fn duration_literal(duration: Duration) -> String {
    let secs = duration.as_secs().max(1);
    if secs.rem_euclid(60) == 0 {
        format!("{}m", secs.div_euclid(60))
    } else {
        format!("{secs}s")
    }
}

/// Escape a value for use inside a Flux string literal
pub fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// One (measurement, field) series, newest aggregated bucket only
pub fn metric_query(bucket: &str, query: &MetricQuery) -> String {
    format!(
        "from(bucket: \"{bucket}\")\n  \
         |> range(start: -{range})\n  \
         |> filter(fn: (r) => r[\"_measurement\"] == \"{measurement}\")\n  \
         |> filter(fn: (r) => r[\"_field\"] == \"{field}\")\n  \
         |> aggregateWindow(every: {every}, fn: {aggregation}, createEmpty: false)\n  \
         |> last()\n  \
         |> yield(name: \"{aggregation}\")",
        bucket = escape(bucket),
        range = duration_literal(query.range),
        measurement = escape(&query.key.measurement),
        field = escape(&query.key.field),
        every = duration_literal(query.every),
        aggregation = query.aggregation.as_str(),
    )
}

/// Every series that reported within `range`, one table per series
pub fn series_query(bucket: &str, range: Duration) -> String {
    format!(
        "from(bucket: \"{bucket}\")\n  \
         |> range(start: -{range})\n  \
         |> aggregateWindow(every: 2m, fn: last, createEmpty: false)\n  \
         |> yield(name: \"last\")",
        bucket = escape(bucket),
        range = duration_literal(range),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use enpal_types::{Aggregation, MetricKey};

    #[test]
    fn test_duration_literal() {
        assert_eq!(duration_literal(Duration::from_secs(300)), "5m");
        assert_eq!(duration_literal(Duration::from_secs(90)), "90s");
        assert_eq!(duration_literal(Duration::ZERO), "1s");
    }

    #[test]
    fn test_metric_query_text() {
        let query = MetricQuery::last(MetricKey::new("Gesamtleistung", "Produktion"));
        let flux = metric_query("my-new-bucket", &query);
        assert!(flux.starts_with("from(bucket: \"my-new-bucket\")"));
        assert!(flux.contains("|> range(start: -5m)"));
        assert!(flux.contains("r[\"_measurement\"] == \"Gesamtleistung\""));
        assert!(flux.contains("r[\"_field\"] == \"Produktion\""));
        assert!(flux.contains("aggregateWindow(every: 2m, fn: last, createEmpty: false)"));
        assert!(flux.contains("|> last()"));
    }

    #[test]
    fn test_mean_window_and_escaping() {
        let query = MetricQuery {
            key: MetricKey::new("inverter", "Temp\"erature"),
            range: Duration::from_secs(900),
            every: Duration::from_secs(900),
            aggregation: Aggregation::Mean,
        };
        let flux = metric_query("b", &query);
        assert!(flux.contains("fn: mean"));
        assert!(flux.contains("-15m"));
        assert!(flux.contains("\"Temp\\\"erature\""));
    }

    #[test]
    fn test_series_query_text() {
        let flux = series_query("my-new-bucket", Duration::from_secs(120));
        assert!(flux.contains("range(start: -2m)"));
        assert!(!flux.contains("filter"));
    }
}
