/// Timestamp-keyed merging of reading batches into parameter series.
///
/// `merge` is the single place where series are combined: fresh batches from
/// the network land here, and so does every station written to the archive.
/// The result is always newest-first with unique timestamps. When a timestamp
/// appears on both sides, the incoming reading wins; within one batch the
/// later element wins.
///
/// Pure functions only. Nothing here can fail: malformed readings are
/// filtered out during decoding (`ingest::batch`) before they get this far.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::model::{ParameterSeries, Reading, StationRecord};

/// Counts describing what a merge changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    /// Incoming readings at timestamps the series did not have.
    pub inserted: usize,
    /// Incoming readings that overwrote an existing timestamp.
    pub replaced: usize,
    /// Length of the resulting series.
    pub total: usize,
}

/// Returns the union of `existing` and `incoming`, keyed by timestamp.
///
/// `merge(s, &[])` returns `s` unchanged, and applying the same batch twice
/// gives the same series as applying it once.
pub fn merge(existing: &ParameterSeries, incoming: &[Reading]) -> ParameterSeries {
    if incoming.is_empty() {
        return existing.clone();
    }
    let (readings, _) = union(&existing.readings, incoming);
    ParameterSeries {
        param_code: existing.param_code.clone(),
        param_name: existing.param_name.clone(),
        readings,
    }
}

/// In-place variant of `merge` that also reports what changed.
pub fn merge_into(series: &mut ParameterSeries, incoming: &[Reading]) -> MergeSummary {
    if incoming.is_empty() {
        return MergeSummary {
            total: series.len(),
            ..MergeSummary::default()
        };
    }
    let (readings, summary) = union(&series.readings, incoming);
    series.readings = readings;
    summary
}

/// Re-establishes the series invariant (unique timestamps, newest-first) on
/// readings of unknown order. For duplicated timestamps the later element
/// wins.
pub fn normalize(series: &ParameterSeries) -> ParameterSeries {
    let empty = ParameterSeries {
        param_code: series.param_code.clone(),
        param_name: series.param_name.clone(),
        readings: Vec::new(),
    };
    merge(&empty, &series.readings)
}

/// Folds `incoming` into `existing`: every incoming parameter is merged into
/// the matching series (or appended if new), the location is replaced, and a
/// known incoming display name replaces the stored one.
///
/// Parameters present only in `existing` are left untouched.
pub fn merge_station(existing: &mut StationRecord, incoming: &StationRecord) -> MergeSummary {
    existing.location = incoming.location.clone();

    let mut combined = MergeSummary::default();
    for series in &incoming.series {
        let target = existing.series_mut_or_insert(&series.param_code);
        if series.param_name.is_some() {
            target.param_name = series.param_name.clone();
        }
        let summary = merge_into(target, &series.readings);
        combined.inserted += summary.inserted;
        combined.replaced += summary.replaced;
    }
    combined.total = existing.series.iter().map(ParameterSeries::len).sum();
    combined
}

fn union(existing: &[Reading], incoming: &[Reading]) -> (Vec<Reading>, MergeSummary) {
    let mut by_time: BTreeMap<NaiveDateTime, Option<f64>> = existing
        .iter()
        .map(|r| (r.timestamp, r.value))
        .collect();

    let mut summary = MergeSummary::default();
    for reading in incoming {
        match by_time.insert(reading.timestamp, reading.value) {
            Some(_) => summary.replaced += 1,
            None => summary.inserted += 1,
        }
    }

    let readings: Vec<Reading> = by_time
        .into_iter()
        .rev()
        .map(|(timestamp, value)| Reading { timestamp, value })
        .collect();
    summary.total = readings.len();
    (readings, summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PARAM_NO2, PARAM_PM10};
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn series(readings: Vec<Reading>) -> ParameterSeries {
        ParameterSeries {
            param_code: PARAM_PM10.to_string(),
            param_name: None,
            readings,
        }
    }

    #[test]
    fn test_incoming_reading_wins_on_same_timestamp() {
        let existing = series(vec![Reading::new(at(1, 12), 1.0)]);
        let merged = merge(&existing, &[Reading::new(at(1, 12), 2.0)]);
        assert_eq!(merged.readings, vec![Reading::new(at(1, 12), 2.0)]);
    }

    #[test]
    fn test_incoming_missing_value_overwrites_archived_value() {
        // Last writer wins even when the fresh fetch has no measurement.
        let existing = series(vec![Reading::new(at(1, 12), 5.0)]);
        let merged = merge(&existing, &[Reading::missing(at(1, 12))]);
        assert_eq!(merged.readings, vec![Reading::missing(at(1, 12))]);
    }

    #[test]
    fn test_merge_with_empty_batch_returns_series_unchanged() {
        let existing = series(vec![
            Reading::new(at(1, 14), 3.0),
            Reading::missing(at(1, 13)),
            Reading::new(at(1, 12), 1.0),
        ]);
        assert_eq!(merge(&existing, &[]), existing);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = series(vec![Reading::new(at(1, 14), 3.0), Reading::new(at(1, 10), 1.0)]);
        let batch = vec![
            Reading::new(at(1, 10), 9.0),
            Reading::missing(at(1, 11)),
            Reading::new(at(2, 0), 4.0),
        ];
        let once = merge(&existing, &batch);
        let twice = merge(&once, &batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_result_is_newest_first_with_unique_timestamps() {
        let existing = series(vec![Reading::new(at(2, 6), 6.0), Reading::new(at(1, 6), 1.0)]);
        let batch = vec![
            Reading::new(at(1, 12), 2.0),
            Reading::new(at(3, 0), 7.0),
            Reading::new(at(1, 6), 1.5),
            Reading::new(at(1, 12), 2.5),
        ];
        let merged = merge(&existing, &batch);

        assert!(merged.is_normalized(), "merge output must be newest-first");
        let unique: HashSet<_> = merged.readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(merged.readings.first().map(|r| r.timestamp), Some(at(3, 0)));
        assert_eq!(
            merged.readings.iter().find(|r| r.timestamp == at(1, 12)).and_then(|r| r.value),
            Some(2.5),
            "later element of the same batch should win"
        );
    }

    #[test]
    fn test_missing_values_are_carried_not_dropped() {
        let merged = merge(&series(Vec::new()), &[Reading::missing(at(1, 1))]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.readings[0].value, None);
    }

    #[test]
    fn test_merge_into_reports_inserted_and_replaced() {
        let mut target = series(vec![Reading::new(at(1, 1), 1.0), Reading::new(at(1, 0), 0.5)]);
        let summary = merge_into(
            &mut target,
            &[Reading::new(at(1, 1), 1.1), Reading::new(at(1, 2), 2.0)],
        );
        assert_eq!(
            summary,
            MergeSummary {
                inserted: 1,
                replaced: 1,
                total: 3
            }
        );
        assert_eq!(target.len(), 3);
    }

    #[test]
    fn test_normalize_sorts_and_deduplicates() {
        let messy = series(vec![
            Reading::new(at(1, 1), 1.0),
            Reading::new(at(1, 3), 3.0),
            Reading::new(at(1, 1), 1.5),
        ]);
        let clean = normalize(&messy);
        assert_eq!(
            clean.readings,
            vec![Reading::new(at(1, 3), 3.0), Reading::new(at(1, 1), 1.5)]
        );
    }

    #[test]
    fn test_merge_station_unions_parameters_and_updates_location() {
        let mut existing = StationRecord::new("Warszawa-Marszałkowska", "old location");
        existing.series.push(series(vec![Reading::new(at(1, 1), 10.0)]));

        let mut incoming = StationRecord::new("Warszawa-Marszałkowska", "Warszawa, mazowieckie");
        let mut no2 = ParameterSeries::new(PARAM_NO2);
        no2.param_name = Some("Dwutlenek azotu".to_string());
        no2.readings = vec![Reading::new(at(1, 1), 40.0)];
        incoming.series.push(no2);
        incoming.series.push(series(vec![Reading::new(at(1, 2), 12.0)]));

        let summary = merge_station(&mut existing, &incoming);

        assert_eq!(existing.location, "Warszawa, mazowieckie");
        assert_eq!(existing.param_codes(), vec![PARAM_PM10, PARAM_NO2]);
        assert_eq!(existing.series(PARAM_PM10).map(ParameterSeries::len), Some(2));
        assert_eq!(
            existing.series(PARAM_NO2).and_then(|s| s.param_name.as_deref()),
            Some("Dwutlenek azotu")
        );
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.total, 3);
    }

    // -----------------------------------------------------------------------
    // Properties over generated series and batches
    // -----------------------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        /// Readings over a two-day span of hourly slots, so generated
        /// batches repeat timestamps often.
        fn reading() -> impl Strategy<Value = Reading> {
            (0u32..48, prop::option::of(-50.0..500.0f64)).prop_map(|(slot, value)| Reading {
                timestamp: at(1 + slot / 24, slot % 24),
                value,
            })
        }

        /// A batch in arbitrary order, duplicates and gaps included.
        fn batch() -> impl Strategy<Value = Vec<Reading>> {
            prop::collection::vec(reading(), 0..40)
        }

        /// A stored series, which always satisfies the series invariant.
        fn stored() -> impl Strategy<Value = ParameterSeries> {
            batch().prop_map(|readings| normalize(&series(readings)))
        }

        proptest! {
            #[test]
            fn prop_merge_is_idempotent(existing in stored(), incoming in batch()) {
                let once = merge(&existing, &incoming);
                prop_assert_eq!(merge(&once, &incoming), once);
            }

            #[test]
            fn prop_merge_yields_unique_newest_first_timestamps(
                existing in stored(),
                incoming in batch(),
            ) {
                let merged = merge(&existing, &incoming);
                prop_assert!(merged.is_normalized());

                let expected: HashSet<NaiveDateTime> = existing
                    .readings
                    .iter()
                    .chain(&incoming)
                    .map(|r| r.timestamp)
                    .collect();
                prop_assert_eq!(merged.len(), expected.len());
            }

            #[test]
            fn prop_last_incoming_reading_wins(existing in stored(), incoming in batch()) {
                let merged = merge(&existing, &incoming);

                let mut want: HashMap<NaiveDateTime, Option<f64>> =
                    existing.readings.iter().map(|r| (r.timestamp, r.value)).collect();
                for r in &incoming {
                    want.insert(r.timestamp, r.value);
                }
                for r in &merged.readings {
                    prop_assert_eq!(Some(&r.value), want.get(&r.timestamp));
                }
            }

            #[test]
            fn prop_empty_batch_is_identity(existing in stored()) {
                prop_assert_eq!(merge(&existing, &[]), existing.clone());
            }

            #[test]
            fn prop_merge_into_matches_merge(existing in stored(), incoming in batch()) {
                let mut in_place = existing.clone();
                let summary = merge_into(&mut in_place, &incoming);
                prop_assert_eq!(&in_place, &merge(&existing, &incoming));
                prop_assert_eq!(summary.total, in_place.len());
                prop_assert_eq!(summary.inserted + summary.replaced, incoming.len());
            }
        }
    }
}
