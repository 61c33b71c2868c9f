//! Round timing for scenario runs.

use std::time::{Duration, Instant};

/// Statistics over a set of timed rounds.
#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub rounds: usize,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    sorted: Vec<Duration>,
}

impl LatencyStats {
    pub fn from_samples(samples: Vec<Duration>) -> Self {
        let rounds = samples.len();
        let total = samples.iter().sum();
        let min = samples.iter().min().copied().unwrap_or(Duration::ZERO);
        let max = samples.iter().max().copied().unwrap_or(Duration::ZERO);

        let mut sorted = samples;
        sorted.sort();

        Self {
            rounds,
            total,
            min,
            max,
            sorted,
        }
    }

    pub fn average(&self) -> Duration {
        if self.rounds == 0 {
            Duration::ZERO
        } else {
            self.total / self.rounds as u32
        }
    }

    /// Get a specific percentile (0-100).
    pub fn percentile(&self, p: usize) -> Duration {
        if self.sorted.is_empty() {
            return Duration::ZERO;
        }
        let index = (self.sorted.len() * p.min(100) / 100).min(self.sorted.len() - 1);
        self.sorted[index]
    }

    pub fn median(&self) -> Duration {
        self.percentile(50)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99)
    }

    /// Messages per second, given how many messages each round moved.
    pub fn throughput(&self, messages_per_round: usize) -> f64 {
        if self.total.is_zero() {
            0.0
        } else {
            (self.rounds * messages_per_round) as f64 / self.total.as_secs_f64()
        }
    }
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rounds, avg: {:.1}us, p50: {:.1}us, p99: {:.1}us, max: {:.1}us",
            self.rounds,
            self.average().as_secs_f64() * 1e6,
            self.median().as_secs_f64() * 1e6,
            self.p99().as_secs_f64() * 1e6,
            self.max.as_secs_f64() * 1e6,
        )
    }
}

/// Time `rounds` calls of `round`.
pub fn measure_rounds<F>(rounds: usize, mut round: F) -> LatencyStats
where
    F: FnMut(usize),
{
    let mut samples = Vec::with_capacity(rounds);
    for index in 0..rounds {
        let start = Instant::now();
        round(index);
        samples.push(start.elapsed());
    }
    LatencyStats::from_samples(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_calculations() {
        let stats = LatencyStats::from_samples(vec![
            Duration::from_micros(10),
            Duration::from_micros(40),
            Duration::from_micros(20),
            Duration::from_micros(30),
        ]);

        assert_eq!(stats.rounds, 4);
        assert_eq!(stats.min, Duration::from_micros(10));
        assert_eq!(stats.max, Duration::from_micros(40));
        assert_eq!(stats.average(), Duration::from_micros(25));
        assert_eq!(stats.median(), Duration::from_micros(30));
        assert_eq!(stats.p99(), Duration::from_micros(40));
    }

    #[test]
    fn empty_stats_are_zero() {
        let stats = LatencyStats::from_samples(Vec::new());

        assert_eq!(stats.average(), Duration::ZERO);
        assert_eq!(stats.p99(), Duration::ZERO);
        assert_eq!(stats.throughput(10), 0.0);
    }

    #[test]
    fn measure_rounds_records_each_round() {
        let mut calls = Vec::new();

        let stats = measure_rounds(3, |round| calls.push(round));

        assert_eq!(stats.rounds, 3);
        assert_eq!(calls, vec![0, 1, 2]);
    }
}
