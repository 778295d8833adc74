//! Integration tests for the rollup core
//!
//! Exercises the public API end to end: fan-out, state updates, codec,
//! windowed aggregation, partitioned processing and history analytics.

use std::collections::BTreeSet;
use std::sync::Arc;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rollup::*;

fn building() -> Arc<dyn SensorGraph> {
    Arc::new(SensorRegistry::from_nodes([
        SensorNode::with_parents("device1", ["room1"]),
        SensorNode::with_parents("device2", ["room1"]),
        SensorNode::with_parents("device3", ["room2"]),
        SensorNode::with_parents("meter", ["room2", "tenant_a"]),
        SensorNode::with_parents("room1", ["floor1"]),
        SensorNode::with_parents("room2", ["floor1"]),
        SensorNode::with_parents("floor1", ["building"]),
    ]))
}

fn random_values(seed: u64, n: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-500.0..5_000.0)).collect()
}

// ============================================================================
// Aggregation state
// ============================================================================

#[test]
fn test_update_sequence_matches_totals() {
    for seed in 0..20 {
        let values = random_values(seed, 1 + seed as usize * 7);
        let state = values
            .iter()
            .enumerate()
            .fold(AggregationState::new(), |s, (i, v)| {
                s.update(&Measurement::new("A", i as i64, *v))
            });

        let expected_sum: f64 = values.iter().sum();
        let expected_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let expected_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        assert_eq!(state.count, values.len() as u64);
        assert_relative_eq!(state.sum, expected_sum, epsilon = FLOAT_TOLERANCE * values.len() as f64 * 5_000.0);
        assert_eq!(state.min, Some(expected_min));
        assert_eq!(state.max, Some(expected_max));
    }
}

#[test]
fn test_concrete_three_measurement_scenario() {
    let record = [(1, 10.0), (2, 20.0), (3, 30.0)]
        .iter()
        .fold(AggregationState::new(), |s, (ts, v)| {
            s.update(&Measurement::new("A", *ts, *v))
        })
        .to_record("A");

    assert_eq!(record.count, 3);
    assert_eq!(record.sum, 60.0);
    assert_eq!(record.min, 10.0);
    assert_eq!(record.max, 30.0);
    assert_eq!(record.average, Some(20.0));
}

// ============================================================================
// Fan-out
// ============================================================================

#[test]
fn test_room_fans_out_to_floor_only() {
    let router = FanoutRouter::new(building());
    let m = Measurement::new("room1", 1, 100.0);
    assert_eq!(router.route(&m), vec![("floor1".to_string(), m)]);
}

#[test]
fn test_unknown_identifier_fans_out_to_nothing() {
    let router = FanoutRouter::new(building());
    assert!(router.route(&Measurement::new("nowhere", 1, 1.0)).is_empty());
}

#[test]
fn test_engine_single_level_rollup() {
    let mut engine = AggregationEngine::new(
        FanoutRouter::new(building()),
        MemoryKeyValueStore::new(),
        Vec::<AggregatedRecord>::new(),
    );
    engine.process(&Measurement::new("device1", 1, 10.0)).unwrap();
    engine.process(&Measurement::new("device2", 2, 15.0)).unwrap();

    assert_eq!(engine.state("room1").unwrap().unwrap().count, 2);
    // Aggregates are not fed back up the hierarchy
    assert!(engine.state("floor1").unwrap().is_none());
    assert!(engine.state("building").unwrap().is_none());
}

#[test]
fn test_engine_dag_parents_each_receive_measurement() {
    let mut engine = AggregationEngine::new(
        FanoutRouter::new(building()),
        MemoryKeyValueStore::new(),
        Vec::<AggregatedRecord>::new(),
    );
    engine.process(&Measurement::new("meter", 1, 7.0)).unwrap();
    engine.process(&Measurement::new("device3", 2, 3.0)).unwrap();

    assert_eq!(engine.state("room2").unwrap().unwrap().sum, 10.0);
    assert_eq!(engine.state("tenant_a").unwrap().unwrap().sum, 7.0);
    assert_eq!(engine.metrics().records_emitted, 3);
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn test_codec_roundtrip_random_states() {
    let codec = AggregationStateCodec::new();
    for (seed, n) in [(1u64, 0usize), (2, 3), (3, 10), (4, 57)] {
        let state = random_values(seed, n)
            .iter()
            .enumerate()
            .fold(AggregationState::with_capacity(10), |s, (i, v)| {
                s.update(&Measurement::new("k", i as i64, *v))
            });
        let decoded = codec.decode(&codec.encode(&state)).unwrap().unwrap();
        assert_eq!(decoded, state);
        assert_eq!(
            decoded.last_values().collect::<Vec<_>>(),
            state.last_values().collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_optional_parents_distinguishes_absent_from_empty() {
    let codec = OptionalParentsCodec::new();
    assert_eq!(codec.decode(&codec.encode(None)).unwrap(), None);
    assert_eq!(
        codec.decode(&codec.encode(Some(&BTreeSet::new()))).unwrap(),
        Some(BTreeSet::new())
    );
    assert_eq!(codec.decode(&[]).unwrap(), None);
}

// ============================================================================
// Windowed aggregation
// ============================================================================

#[test]
fn test_add_subtract_restores_count_and_sum_not_timestamp() {
    let agg = WindowedAggregator::new();
    let mut current = None;
    for (ts, v) in [(100, 1.5), (200, 2.25), (300, 4.0)] {
        current = Some(agg.add("w", &Measurement::new("s", ts, v), current.as_ref()));
    }
    let before = current.clone().unwrap();

    let m = Measurement::new("s", 900, 8.5);
    let added = agg.add("w", &m, current.as_ref());
    let restored = agg.subtract("w", &m, Some(&added)).unwrap();

    assert_eq!(restored.count, before.count);
    assert_eq!(restored.sum, before.sum);
    assert_eq!(restored.timestamp, 900);
    assert_eq!(before.timestamp, 300);
}

#[test]
fn test_subtract_from_absent_is_contract_error() {
    let agg = WindowedAggregator::new();
    let err = agg
        .subtract("w", &Measurement::new("s", 1, 1.0), None)
        .unwrap_err();
    assert!(matches!(
        err,
        RollupError::Contract(ContractError::SubtractFromAbsent { .. })
    ));
}

#[test]
fn test_rolling_window_tracks_recent_sum() {
    let mut rolling = RollingWindowAggregator::new(RollupConfig::with_window_ms(1_000).window_ms);
    let mut last = None;
    for i in 0..10 {
        last = rolling
            .push("room1", Measurement::new("room1", i * 250, 1.0))
            .unwrap();
    }
    // Window (1250, 2250] holds t=1500, 1750, 2000, 2250
    let last = last.unwrap();
    assert_eq!(last.count, 4);
    assert_eq!(last.sum, 4.0);
    assert_eq!(last.average, Some(1.0));
}

// ============================================================================
// Partitioned processing
// ============================================================================

#[test]
fn test_partitioned_equals_single_engine() {
    let mut rng = StdRng::seed_from_u64(42);
    let sensors = ["device1", "device2", "device3", "meter", "room1", "room2"];
    let batch: Vec<_> = (0..500)
        .map(|i| {
            let sensor = sensors[rng.gen_range(0..sensors.len())];
            Measurement::new(sensor, i, rng.gen_range(0.0..100.0))
        })
        .collect();

    let mut single = AggregationEngine::new(
        FanoutRouter::new(building()),
        MemoryKeyValueStore::new(),
        Vec::<AggregatedRecord>::new(),
    );
    for m in &batch {
        single.process(m).unwrap();
    }

    let mut partitioned = PartitionedEngine::new(
        FanoutRouter::new(building()),
        RollupConfig::with_partitions(3),
        |_| (MemoryKeyValueStore::new(), Vec::<AggregatedRecord>::new()),
    );
    for chunk in batch.chunks(64) {
        partitioned.process_batch(chunk).unwrap();
    }

    for key in ["room1", "room2", "tenant_a", "floor1"] {
        let expected = single.state(key).unwrap().unwrap();
        let actual = partitioned.engine_for(key).state(key).unwrap().unwrap();
        // Same per-key order, so even the FIFO matches
        assert_eq!(actual, expected, "state mismatch for {}", key);
    }
    assert_eq!(partitioned.metrics().records_emitted, single.metrics().records_emitted);
}

// ============================================================================
// History analytics
// ============================================================================

fn history_of(values: &[f64]) -> HistoryRepository<Measurement, MemoryTimeSeries<Measurement>> {
    let mut series = MemoryTimeSeries::new();
    for (i, v) in values.iter().enumerate() {
        series
            .append(Measurement::new("room1", i as i64 + 1, *v))
            .unwrap();
    }
    HistoryRepository::new(series)
}

#[test]
fn test_distribution_properties_random() {
    for seed in 0..10 {
        let values = random_values(seed, 10 + seed as usize * 13);
        let repo = history_of(&values);
        for buckets_count in [1usize, 2, 5, 17] {
            let buckets = repo.get_distribution("room1", 0, buckets_count).unwrap();
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);

            assert_eq!(buckets.len(), buckets_count);
            assert_eq!(
                buckets.iter().map(|b| b.count).sum::<u64>(),
                values.len() as u64
            );
            assert_eq!(buckets[0].lower, min);
            assert_eq!(buckets[buckets_count - 1].upper, max);
            for pair in buckets.windows(2) {
                assert_eq!(pair[0].upper, pair[1].lower);
                assert!(pair[0].lower <= pair[0].upper);
            }
        }
    }
}

#[test]
fn test_distribution_degenerate_single_bucket_filled() {
    let repo = history_of(&[42.0; 8]);
    let buckets = repo.get_distribution("room1", 0, 3).unwrap();
    let non_empty: Vec<_> = buckets.iter().filter(|b| b.count > 0).collect();
    assert_eq!(non_empty.len(), 1);
    assert_eq!(non_empty[0].count, 8);
}

#[test]
fn test_trend_identical_halves_is_one() {
    let repo = history_of(&[3.0, 7.0, 3.0, 7.0]);
    assert_relative_eq!(repo.get_trend("room1", 0, 2).unwrap(), 1.0);
}

#[test]
fn test_trend_empty_is_insufficient_data() {
    let repo = history_of(&[]);
    assert!(matches!(
        repo.trend("room1", 0),
        Err(RollupError::Analytics(AnalyticsError::InsufficientData { .. }))
    ));
}

#[test]
fn test_engine_feeds_aggregated_history() {
    let mut engine = AggregationEngine::new(
        FanoutRouter::new(building()),
        MemoryKeyValueStore::new(),
        MemoryTimeSeries::<AggregatedRecord>::new(),
    );
    for ts in 1..=12 {
        engine.process(&Measurement::new("device1", ts, 2.0)).unwrap();
    }
    let (_, series) = engine.into_parts();
    let repo = HistoryRepository::new(series);

    // Aggregated history is analysed on the running sum: 2, 4, .. 24
    let latest = repo.get_latest("room1", 3).unwrap();
    let sums: Vec<_> = latest.iter().map(|r| r.sum).collect();
    assert_eq!(sums, vec![24.0, 22.0, 20.0]);
    assert_relative_eq!(repo.get_trend("room1", 0, 3).unwrap(), 4.0 / 22.0);
}

// ============================================================================
// Wire records
// ============================================================================

#[test]
fn test_wire_roundtrip_through_engine() {
    let input = r#"{"identifier":"device1","timestamp":1700000000000,"value":12.5}"#;
    let m = Measurement::from_json(input).unwrap();

    let mut engine = AggregationEngine::new(
        FanoutRouter::new(building()),
        MemoryKeyValueStore::new(),
        Vec::<AggregatedRecord>::new(),
    );
    let out = engine.process(&m).unwrap();
    let json = out[0].to_json();
    let parsed = AggregatedRecord::from_json(&json).unwrap();

    assert_eq!(parsed, out[0]);
    assert_eq!(parsed.identifier, "room1");
    assert_eq!(parsed.timestamp, 1_700_000_000_000);
}
