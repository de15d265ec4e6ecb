use ordered_float::OrderedFloat;
use rand::Rng;

/// Online statistics over a stream of `f64` observations, paired with a
/// reservoir-capped sample used to estimate percentiles without storing
/// every observation.
#[derive(Clone, Debug)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
    reservoir: Vec<f64>,
    perc_limit: usize,
}

impl RunningStats {
    pub fn new(perc_limit: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            reservoir: Vec::new(),
            perc_limit: perc_limit.max(1),
        }
    }

    /// Adds `x`, maintaining the running aggregates in O(1) and the
    /// reservoir via classic reservoir sampling: the first `perc_limit`
    /// values are kept outright, every value after that replaces a
    /// uniformly-chosen existing slot with probability `perc_limit / count`.
    pub fn add_value(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }

        if self.reservoir.len() < self.perc_limit {
            self.reservoir.push(x);
        } else {
            let j = rand::rng().random_range(0..self.count as usize);
            if j < self.perc_limit {
                self.reservoir[j] = x;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn lower(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min }
    }

    pub fn upper(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_sq / n) - (self.mean() * self.mean());
        variance.max(0.0).sqrt()
    }

    pub fn median(&self) -> f64 {
        self.percentile(50.0)
    }

    /// Returns the element at the nearest-rank index `ceil(p/100 * n) - 1`
    /// of the sorted reservoir, or `0` when nothing has been observed yet.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.reservoir.is_empty() {
            return 0.0;
        }
        let mut sorted = self.reservoir.clone();
        sorted.sort_unstable_by_key(|v| OrderedFloat(*v));
        let n = sorted.len();
        let rank = ((p / 100.0) * n as f64).ceil() as usize;
        let idx = rank.max(1) - 1;
        sorted[idx.min(n - 1)]
    }

    pub fn reservoir_len(&self) -> usize {
        self.reservoir.len()
    }
}
