//! Deterministic fixed-ratio sampling.

/// Samples pulses at a fixed target ratio, deterministically.
///
/// Each call to [`pulse`](Self::pulse) counts one event; the call returns
/// true iff accepting the event keeps the accepted/seen ratio below the
/// target. A ratio of 1.0 accepts every pulse, 0.0 accepts none, and any
/// ratio in between converges on the target over a long run without any
/// randomness.
#[derive(Clone, Debug)]
pub struct FixedRatioSampler {
    ratio: f64,
    num_pulses: u64,
    num_samples: u64,
}

impl FixedRatioSampler {
    /// Create a sampler with the given target ratio in `[0, 1]`.
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio,
            num_pulses: 0,
            num_samples: 0,
        }
    }

    /// Count one event; true means the event is sampled.
    pub fn pulse(&mut self) -> bool {
        self.num_pulses += 1;
        if (self.num_samples as f64) / (self.num_pulses as f64) < self.ratio {
            self.num_samples += 1;
            true
        } else {
            false
        }
    }
}
