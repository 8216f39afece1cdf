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

//! Reader for the CSV body of a Flux query response.
//!
//! A response holds one or more tables. Each table starts with a header row
//! (`,result,table,_start,_stop,_time,_value,_field,_measurement`), tables are
//! separated by blank lines and annotation rows start with `#`.

use crate::errors::{InfluxError, InfluxResult};
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::trace;

/// One data row of a Flux response
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    pub table: u64,
    pub measurement: Option<String>,
    pub field: Option<String>,
    pub value: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Columns {
    table: Option<usize>,
    measurement: Option<usize>,
    field: Option<usize>,
    value: Option<usize>,
    time: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Self {
        let position = |name: &str| header.iter().position(|cell| cell == name);
        Self {
            table: position("table"),
            measurement: position("_measurement"),
            field: position("_field"),
            value: position("_value"),
            time: position("_time"),
        }
    }
}

fn is_header(record: &StringRecord) -> bool {
    record.iter().any(|cell| cell == "table" || cell == "error")
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .filter(|value| !value.is_empty())
}

/// Parse every data row of `body`. An in-band error table becomes
/// [`InfluxError::QueryError`].
pub fn parse_records(body: &str) -> InfluxResult<Vec<FluxRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(body.as_bytes());

    let mut columns: Option<Columns> = None;
    let mut error_column: Option<usize> = None;
    let mut records = Vec::new();

    for row in reader.records() {
        let row = row?;
        if row.iter().all(str::is_empty) {
            continue;
        }

        if is_header(&row) {
            error_column = row.iter().position(|c| c == "error");
            columns = Some(Columns::from_header(&row));
            continue;
        }

        if let Some(index) = error_column {
            let message = row.get(index).unwrap_or("unknown error").to_owned();
            return Err(InfluxError::QueryError(message));
        }

        let Some(columns) = columns.as_ref() else {
            return Err(InfluxError::ParseError(
                "data row before header row".to_owned(),
            ));
        };

        let table = cell(&row, columns.table)
            .map(str::parse::<u64>)
            .transpose()
            .map_err(|e| InfluxError::ParseError(format!("invalid table id: {e}")))?
            .unwrap_or(0);
        let value = cell(&row, columns.value)
            .map(str::parse::<f64>)
            .transpose()
            .map_err(|e| InfluxError::ParseError(format!("invalid _value: {e}")))?;
        let time = cell(&row, columns.time)
            .map(DateTime::parse_from_rfc3339)
            .transpose()
            .map_err(|e| InfluxError::ParseError(format!("invalid _time: {e}")))?
            .map(|t| t.with_timezone(&Utc));

        records.push(FluxRecord {
            table,
            measurement: cell(&row, columns.measurement).map(str::to_owned),
            field: cell(&row, columns.field).map(str::to_owned),
            value,
            time,
        });
    }

    trace!("[INFLUX] Parsed {} records", records.len());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TABLES: &str = "\
,result,table,_start,_stop,_time,_value,_field,_measurement\r
,last,0,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T09:58:00Z,4210.5,Produktion,Gesamtleistung\r
,last,0,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T10:00:00Z,4198,Produktion,Gesamtleistung\r
,last,1,2025-06-14T09:55:00Z,2025-06-14T10:00:00Z,2025-06-14T10:00:00Z,1034,Verbrauch,Gesamtleistung\r
\r
";

    #[test]
    fn test_parse_two_tables() {
        let records = parse_records(TWO_TABLES).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].table, 0);
        assert_eq!(records[0].value, Some(4210.5));
        assert_eq!(records[0].field.as_deref(), Some("Produktion"));
        assert_eq!(records[2].table, 1);
        assert_eq!(records[2].measurement.as_deref(), Some("Gesamtleistung"));
        assert_eq!(
            records[1].time.unwrap().to_rfc3339(),
            "2025-06-14T10:00:00+00:00"
        );
    }

    #[test]
    fn test_annotations_and_repeated_headers() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string,string
#group,false,false,false,false,true,true
#default,last,,,,,
,result,table,_time,_value,_field,_measurement
,,0,2025-06-14T10:00:00Z,49.98,Frequency.Grid,inverter

#datatype,string,long,dateTime:RFC3339,double,string,string
,result,table,_time,_value,_measurement,_field
,,1,2025-06-14T10:00:00Z,230.1,inverter,Voltage.Phase.A
";
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].field.as_deref(), Some("Voltage.Phase.A"));
        assert_eq!(records[1].measurement.as_deref(), Some("inverter"));
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_in_band_error() {
        let body = ",error,reference\n,\"bucket \"\"nope\"\" not found\",\n";
        let err = parse_records(body).unwrap_err();
        match err {
            InfluxError::QueryError(message) => assert!(message.contains("not found")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_value() {
        let body = ",result,table,_value\n,,0,abc\n";
        assert!(matches!(parse_records(body), Err(InfluxError::ParseError(_))));
    }
}
