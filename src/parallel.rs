//! Row-level data parallelism.
//!
//! With the `parallel` feature this is rayon's prelude; without it the same
//! `into_par_iter()` calls fall back to plain sequential iterators so stage
//! code is written once.

#[cfg(feature = "parallel")]
pub use rayon::prelude;

#[cfg(not(feature = "parallel"))]
pub mod prelude {
    pub use std::iter::Iterator as ParallelIterator;
    pub use std::iter::Iterator as IndexedParallelIterator;

    pub trait IntoParallelIterator: Sized {
        type Item;
        type Iter: Iterator<Item = Self::Item>;

        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I> IntoParallelIterator for I
    where
        I: IntoIterator,
    {
        type Item = I::Item;
        type Iter = I::IntoIter;

        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}
