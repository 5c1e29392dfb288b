use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ugnos_dedup::encoding::xor_aggr_chunk;
use ugnos_dedup::{LabelSet, PartialSeries, Sample};

pub const DEFAULT_SEED: u64 = 0x_5547_4E4F_535F_4245; // fixed seed for stable benchmarks

/// Scrape interval of every generated replica, in milliseconds.
pub const SCRAPE_INTERVAL: i64 = 15_000;

/// Generates `series_count` logical series scraped by `replicas` HA replicas each.
///
/// Replicas lag each other by a random offset below one scrape interval and drop roughly
/// `drop_per_mille` / 1000 of their scrapes. Every chunk is delivered as its own partial
/// series, in upstream order (sorted by label set).
pub fn generate_replicated_series(
    seed: u64,
    series_count: usize,
    replicas: usize,
    samples_per_series: usize,
    samples_per_chunk: usize,
    drop_per_mille: u32,
) -> Vec<PartialSeries> {
    assert!(replicas > 0);
    assert!(samples_per_chunk > 0);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(series_count * replicas * samples_per_series / samples_per_chunk + 1);

    for s in 0..series_count {
        let instance = format!("host-{:05}", s);
        for r in 0..replicas {
            let labels = LabelSet::from_pairs(&[
                ("instance", instance.as_str()),
                ("replica", format!("r{}", r).as_str()),
            ]);
            let offset = rng.random_range(0..SCRAPE_INTERVAL);
            let samples: Vec<Sample> = (0..samples_per_series)
                .filter(|_| rng.random_range(0..1000) >= drop_per_mille)
                .map(|i| Sample::new(i as i64 * SCRAPE_INTERVAL + offset, i as f64))
                .collect();

            for part in samples.chunks(samples_per_chunk) {
                let chunk = xor_aggr_chunk(part).expect("encode chunk");
                out.push(PartialSeries::new(labels.clone(), vec![chunk]));
            }
        }
    }

    out
}
