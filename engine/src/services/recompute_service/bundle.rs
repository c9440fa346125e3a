// Result bundle: every active indicator computed against one candle snapshot
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use shared::models::CandleSeries;

use crate::error::IndicatorError;
use crate::indicators::{IndicatorOutput, IndicatorSpec};

pub type IndicatorResult = Result<IndicatorOutput, IndicatorError>;

/// Immutable once built. A failing indicator keeps its error in its own
/// entry; the other entries are unaffected.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultBundle {
    sequence: u64,
    candle_count: usize,
    last_timestamp: Option<i64>,
    entries: BTreeMap<IndicatorSpec, IndicatorResult>,
}

impl ResultBundle {
    /// The bundle served before any snapshot has been computed.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn empty_at(sequence: u64) -> Self {
        ResultBundle { sequence, ..Self::default() }
    }

    pub fn compute<'a>(sequence: u64, series: &CandleSeries, specs: impl IntoIterator<Item = &'a IndicatorSpec>) -> Self {
        let candles = series.as_slice();
        let entries = specs
            .into_iter()
            .map(|spec| {
                let result = spec.compute(candles);
                if let Err(e) = &result {
                    tracing::debug!(indicator = %spec, sequence, error_detail = %e, "Indicator produced no output");
                }
                (*spec, result)
            })
            .collect();
        ResultBundle {
            sequence,
            candle_count: series.len(),
            last_timestamp: series.last().map(|c| c.timestamp),
            entries,
        }
    }

    /// Cycle number of the snapshot this bundle was computed from.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn candle_count(&self) -> usize {
        self.candle_count
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, spec: &IndicatorSpec) -> bool {
        self.entries.contains_key(spec)
    }

    pub fn get(&self, spec: &IndicatorSpec) -> Option<&IndicatorResult> {
        self.entries.get(spec)
    }

    /// The output for `spec`, if it was active and computed successfully.
    pub fn output(&self, spec: &IndicatorSpec) -> Option<&IndicatorOutput> {
        self.entries.get(spec).and_then(|r| r.as_ref().ok())
    }

    pub fn specs(&self) -> impl Iterator<Item = &IndicatorSpec> {
        self.entries.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&IndicatorSpec, &IndicatorResult)> {
        self.entries.iter()
    }

    /// Compares indicator results only, ignoring the cycle number.
    pub fn same_results(&self, other: &ResultBundle) -> bool {
        self.candle_count == other.candle_count
            && self.last_timestamp == other.last_timestamp
            && self.entries == other.entries
    }
}

#[derive(Serialize)]
struct EntryView<'a> {
    label: String,
    spec: &'a IndicatorSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a IndicatorOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct BundleView<'a> {
    sequence: u64,
    candle_count: usize,
    last_timestamp: Option<i64>,
    indicators: Vec<EntryView<'a>>,
}

impl Serialize for ResultBundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let indicators = self
            .entries
            .iter()
            .map(|(spec, result)| EntryView {
                label: spec.label(),
                spec,
                output: result.as_ref().ok(),
                error: result.as_ref().err().map(ToString::to_string),
            })
            .collect();
        BundleView {
            sequence: self.sequence,
            candle_count: self.candle_count,
            last_timestamp: self.last_timestamp,
            indicators,
        }
        .serialize(serializer)
    }
}
