//! Replica dedup properties over seeded random replica layouts.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ugnos_dedup::cursor::{expand, SampleCursor, SliceCursor};
use ugnos_dedup::dedup::{DedupCursor, INITIAL_PENALTY};
use ugnos_dedup::{Sample, Timestamp};

const SEED: u64 = 0x_5547_4E4F_535F_4444; // fixed seed for reproducible layouts
const ROUNDS: usize = 200;

/// One replica scraping every `interval` ms from `offset`, dropping some scrapes.
fn replica(rng: &mut ChaCha8Rng, interval: Timestamp, offset: Timestamp, n: usize) -> Vec<Sample> {
    (0..n as i64)
        .filter(|_| rng.random_range(0..10) > 0)
        .map(|i| Sample::new(offset + i * interval, i as f64))
        .collect()
}

fn merged(a: &[Sample], b: &[Sample]) -> Vec<Sample> {
    let mut c = DedupCursor::new(
        SliceCursor::new(a.to_vec()),
        SliceCursor::new(b.to_vec()),
    );
    expand(&mut c).unwrap()
}

#[test]
fn merged_output_is_strictly_increasing() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    for _ in 0..ROUNDS {
        let interval = rng.random_range(1_000..30_000);
        let (off_a, off_b) = (rng.random_range(0..interval), rng.random_range(0..interval));
        let a = replica(&mut rng, interval, off_a, 50);
        let b = replica(&mut rng, interval, off_b, 50);
        let out = merged(&a, &b);
        assert!(
            out.windows(2).all(|w| w[0].t < w[1].t),
            "not monotonic: {:?}",
            out
        );
    }
}

#[test]
fn merged_output_only_contains_input_samples() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 1);
    for _ in 0..ROUNDS {
        let interval = rng.random_range(1_000..30_000);
        let lag = rng.random_range(1..interval);
        let a = replica(&mut rng, interval, 0, 40);
        let b = replica(&mut rng, interval, lag, 40);
        for s in merged(&a, &b) {
            assert!(a.contains(&s) || b.contains(&s), "invented sample {:?}", s);
        }
    }
}

#[test]
fn merge_is_order_insensitive_without_ties() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 2);
    for _ in 0..ROUNDS {
        let interval = rng.random_range(1_000..30_000);
        // Distinct offsets keep every timestamp pair unequal, so the tie-break never applies.
        let a = replica(&mut rng, interval * 2, 0, 40);
        let b = replica(&mut rng, interval * 2, interval, 40);
        assert_eq!(merged(&a, &b), merged(&b, &a));
    }
}

#[test]
fn never_doubles_the_sampling_rate() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 3);
    for _ in 0..ROUNDS {
        let interval = rng.random_range(5_000..30_000);
        let a: Vec<Sample> = (0..40).map(|i| Sample::new(i * interval, 0.0)).collect();
        let lag = rng.random_range(1..interval / 2);
        let b: Vec<Sample> = (0..40).map(|i| Sample::new(i * interval + lag, 0.0)).collect();
        let out = merged(&a, &b);
        assert!(out.len() <= a.len() + 1, "{} samples from {}", out.len(), a.len());
    }
}

#[test]
fn single_replica_passes_through_unchanged() {
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 4);
    let a = replica(&mut rng, 15_000, 0, 100);
    assert_eq!(merged(&a, &[]), a);
    assert_eq!(merged(&[], &a), a);
}

#[test]
fn three_replicas_fold_pairwise() {
    let a = vec![Sample::new(0, 0.0), Sample::new(15_000, 1.0)];
    let b = vec![Sample::new(2_000, 0.0), Sample::new(17_000, 1.0), Sample::new(32_000, 2.0)];
    let c = vec![
        Sample::new(4_000, 0.0),
        Sample::new(19_000, 1.0),
        Sample::new(34_000, 2.0),
        Sample::new(49_000, 3.0),
    ];
    let ab = DedupCursor::new(SliceCursor::new(a), SliceCursor::new(b));
    let mut abc = DedupCursor::new(ab, SliceCursor::new(c));
    let ts: Vec<Timestamp> = expand(&mut abc).unwrap().into_iter().map(|s| s.t).collect();
    assert_eq!(ts.first(), Some(&0));
    assert!(ts.windows(2).all(|w| w[1] - w[0] >= 10_000), "too dense: {:?}", ts);
    assert_eq!(ts.last(), Some(&49_000));
}

#[test]
fn first_pick_suppresses_the_other_replica_for_the_initial_penalty() {
    let a = vec![Sample::new(0, 1.0)];
    let b = vec![Sample::new(INITIAL_PENALTY - 1, 2.0), Sample::new(INITIAL_PENALTY + 1, 3.0)];
    let mut c = DedupCursor::new(SliceCursor::new(a), SliceCursor::new(b));
    assert!(c.advance());
    assert_eq!(c.current().t, 0);
    assert!(c.advance());
    assert_eq!(c.current().t, INITIAL_PENALTY + 1);
    assert!(!c.advance());
}
