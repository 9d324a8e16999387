//! Rayon or sequential iteration, chosen by the `parallel` feature.
//!
//! Algorithms write `(0..n).into_par_iter()` once; without the feature the
//! call degrades to `into_iter()` and the chain runs on std iterators.
//! Results are identical either way because every parallel chain used here
//! ends in an order-preserving `collect`.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
pub trait IntoParallelIterator: IntoIterator + Sized {
    fn into_par_iter(self) -> Self::IntoIter {
        self.into_iter()
    }
}

#[cfg(not(feature = "parallel"))]
impl<I: IntoIterator> IntoParallelIterator for I {}
