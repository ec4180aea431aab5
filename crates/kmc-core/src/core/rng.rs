use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source of uniform random numbers strictly between 0 and 1.
pub trait RandNumGen: Send {
    /// A sample from `[0, 1)` as produced by the backing generator.
    fn next_unit(&mut self) -> f64;

    /// A sample from the open interval `(0, 1)`.
    ///
    /// Endpoints produced by the backing generator are nudged inward by
    /// `f64::EPSILON`, so the result is always safe to take the logarithm of.
    fn get_num_in_open_interval_from_0_to_1(&mut self) -> f64 {
        let r = self.next_unit();
        if r <= 0.0 {
            f64::EPSILON
        } else if r >= 1.0 {
            1.0 - f64::EPSILON
        } else {
            r
        }
    }
}

pub type RandNumGenSharedPtr = Arc<Mutex<dyn RandNumGen>>;

/// Locks a shared generator. A generator poisoned by a panicking holder is
/// still usable, since every state it can be left in is a valid stream state.
pub fn lock_rng(rng: &RandNumGenSharedPtr) -> MutexGuard<'_, dyn RandNumGen + 'static> {
    rng.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Adapts any `rand` generator to [`RandNumGen`].
#[derive(Debug, Clone)]
pub struct SeededRng<R> {
    inner: R,
}

impl<R: RngCore + Send> RandNumGen for SeededRng<R> {
    fn next_unit(&mut self) -> f64 {
        self.inner.r#gen::<f64>()
    }
}

impl SeededRng<StdRng> {
    pub fn standard(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }
}

impl SeededRng<ChaCha20Rng> {
    /// A ChaCha20 generator on an independent stream. Distinct `stream`
    /// values with the same seed never overlap, which makes this the
    /// generator of choice when several simulations share one seed.
    pub fn chacha_stream(seed: u64, stream: u64) -> Self {
        let mut inner = ChaCha20Rng::seed_from_u64(seed);
        inner.set_stream(stream);
        Self { inner }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RngKind {
    #[default]
    Standard,
    ChachaStream,
}

impl fmt::Display for RngKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RngKind::Standard => write!(f, "standard"),
            RngKind::ChachaStream => write!(f, "chacha-stream"),
        }
    }
}

pub fn mk_rng(kind: RngKind, seed: u64, stream: u64) -> RandNumGenSharedPtr {
    match kind {
        RngKind::Standard => Arc::new(Mutex::new(SeededRng::standard(seed))),
        RngKind::ChachaStream => Arc::new(Mutex::new(SeededRng::chacha_stream(seed, stream))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f64>);

    impl RandNumGen for Fixed {
        fn next_unit(&mut self) -> f64 {
            self.0.remove(0)
        }
    }

    #[test]
    fn endpoints_are_nudged_into_open_interval() {
        let mut rng = Fixed(vec![0.0, 1.0, 0.5]);
        assert_eq!(rng.get_num_in_open_interval_from_0_to_1(), f64::EPSILON);
        assert_eq!(rng.get_num_in_open_interval_from_0_to_1(), 1.0 - f64::EPSILON);
        assert_eq!(rng.get_num_in_open_interval_from_0_to_1(), 0.5);
    }

    #[test]
    fn same_seed_gives_same_sequence() {
        let a = mk_rng(RngKind::Standard, 42, 0);
        let b = mk_rng(RngKind::Standard, 42, 0);
        for _ in 0..16 {
            let x = lock_rng(&a).get_num_in_open_interval_from_0_to_1();
            let y = lock_rng(&b).get_num_in_open_interval_from_0_to_1();
            assert_eq!(x, y);
            assert!(x > 0.0 && x < 1.0);
        }
    }

    #[test]
    fn chacha_streams_differ_for_same_seed() {
        let mut a = SeededRng::chacha_stream(7, 0);
        let mut b = SeededRng::chacha_stream(7, 1);
        let xs: Vec<f64> = (0..8).map(|_| a.get_num_in_open_interval_from_0_to_1()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.get_num_in_open_interval_from_0_to_1()).collect();
        assert_ne!(xs, ys);
    }
}
