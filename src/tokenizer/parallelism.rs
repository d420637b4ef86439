// src/tokenizer/parallelism.rs
//
// Iterators that run on the rayon pool or serially, chosen at runtime.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_cond::CondIterator;

pub trait MaybeParallelIterator<P, S>
where
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
{
    /// Parallel when `parallel` is true, serial otherwise.
    fn into_maybe_par_iter_cond(self, parallel: bool) -> CondIterator<P, S>;
}

impl<P, S, I> MaybeParallelIterator<P, S> for I
where
    I: IntoParallelIterator<Iter = P, Item = P::Item> + IntoIterator<IntoIter = S, Item = S::Item>,
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
{
    fn into_maybe_par_iter_cond(self, parallel: bool) -> CondIterator<P, S> {
        CondIterator::new(self, parallel)
    }
}

/// Borrowing counterpart of [`MaybeParallelIterator`], for slices and `Vec`s.
pub trait MaybeParallelRefIterator<'data, P, S>
where
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter_cond(&'data self, parallel: bool) -> CondIterator<P, S>;
}

impl<'data, P, S, I: 'data + ?Sized> MaybeParallelRefIterator<'data, P, S> for I
where
    &'data I: MaybeParallelIterator<P, S>,
    P: ParallelIterator,
    S: Iterator<Item = P::Item>,
    P::Item: 'data,
{
    fn maybe_par_iter_cond(&'data self, parallel: bool) -> CondIterator<P, S> {
        self.into_maybe_par_iter_cond(parallel)
    }
}
