use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::anyhow;
use csv::{ReaderBuilder, StringRecord, Trim};
use shared::models::{Candle, CandleSeries};

use crate::error::EngineError;

// Number and date/time handling for Indian exchange exports (NSE/BSE style)
pub mod indian_format {
    use anyhow::{anyhow, Result};
    use chrono::{NaiveDate, NaiveDateTime};
    use shared::utils::ist_naive_to_millis;
    use std::str::FromStr;

    // Parses "1,23,456.75" (lakh grouping), "123456.75" or "-" style blanks
    pub fn parse_decimal(s: &str) -> Result<f64> {
        let normalized: String = s.trim().chars().filter(|c| *c != ',').collect();
        let value = f64::from_str(&normalized).map_err(|e| anyhow!("Failed to parse decimal '{}': {}", s, e))?;
        if !value.is_finite() {
            return Err(anyhow!("Failed to parse decimal '{}': not a finite number", s));
        }
        Ok(value)
    }

    // Volumes are whole shares; grouping commas are allowed
    pub fn parse_volume(s: &str) -> Result<u64> {
        let normalized: String = s.trim().chars().filter(|c| *c != ',').collect();
        u64::from_str(&normalized).map_err(|e| anyhow!("Failed to parse volume '{}': {}", s, e))
    }

    const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%d-%m-%Y %H:%M:%S"];
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%b-%Y", "%d-%m-%Y"];

    // Epoch milliseconds, or an exchange-local (IST) date/datetime
    pub fn parse_timestamp(s: &str) -> Result<i64> {
        let s = s.trim();
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            return i64::from_str(s).map_err(|e| anyhow!("Failed to parse timestamp '{}': {}", s, e));
        }
        let naive = DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(|| anyhow!("Failed to parse timestamp '{}'", s))?;
        ist_naive_to_millis(naive).ok_or_else(|| anyhow!("Timestamp '{}' is out of range", s))
    }

}

pub struct CandleCsvParser;

impl CandleCsvParser {
    // CSV Header: Date,Open,High,Low,Close,Volume (column order is free, names are case-insensitive)
    // Example Row: 2024-01-02 09:15:00,"21,727.75","21,755.60","21,701.20","21,740.05","1,52,300"
    // Rows may come newest-first; the returned series is always chronological.
    pub fn load_series_from_csv(file_path: impl AsRef<Path>) -> Result<CandleSeries, EngineError> {
        let file = File::open(file_path.as_ref())?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(BufReader::new(file));

        let headers = rdr.headers()?.clone();
        let mut candles = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let record = result?;
            let line = idx + 2;
            let candle = Self::parse_record(&record, &headers, line)
                .map_err(|e| EngineError::CsvDataFormatError(e.to_string()))?;
            candles.push(candle);
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(CandleSeries::new(candles)?)
    }

    fn parse_record(record: &StringRecord, headers: &StringRecord, line: usize) -> anyhow::Result<Candle> {
        let field = |name: &str| {
            Self::get_field(record, headers, name)
                .ok_or_else(|| anyhow!("Missing '{}' field in CSV record at line {}", name, line))
        };

        let timestamp = indian_format::parse_timestamp(field("Date")?)
            .map_err(|e| anyhow!("Error parsing 'Date' at line {}: {}", line, e))?;
        let price = |name: &str| -> anyhow::Result<f64> {
            indian_format::parse_decimal(field(name)?).map_err(|e| anyhow!("Error parsing '{}' at line {}: {}", name, line, e))
        };
        let (open, high, low, close) = (price("Open")?, price("High")?, price("Low")?, price("Close")?);
        let volume = indian_format::parse_volume(field("Volume")?)
            .map_err(|e| anyhow!("Error parsing 'Volume' at line {}: {}", line, e))?;

        Candle::new(timestamp, open, high, low, close, volume)
            .map_err(|e| anyhow!("Invalid candle at line {}: {}", line, e))
    }

    // Looks a column up by header name; "Date" also matches "Timestamp"/"Datetime".
    fn get_field<'a>(record: &'a StringRecord, headers: &StringRecord, name: &str) -> Option<&'a str> {
        let aliases: &[&str] = match name {
            "Date" => &["date", "timestamp", "datetime"],
            _ => &[],
        };
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name) || aliases.iter().any(|a| header.eq_ignore_ascii_case(a)))
            .and_then(|pos| record.get(pos))
    }
}
