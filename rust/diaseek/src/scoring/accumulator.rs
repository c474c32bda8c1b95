//! Fold/reduce collection of per-precursor results from a parallel iterator.
//!
//! Rayon combines the per-thread partial accumulators in input order, so
//! results come out in the order of the precursor groups.

use super::search_results::DiaSearchResult;
use super::timings::AssemblyTimings;
use rayon::iter::{
    FromParallelIterator,
    IntoParallelIterator,
    ParallelIterator,
};

type Item = (Option<DiaSearchResult>, AssemblyTimings);

#[derive(Default)]
pub(super) struct DiaSearchAccumulator {
    pub(super) res: Vec<DiaSearchResult>,
    pub(super) timings: AssemblyTimings,
}

impl DiaSearchAccumulator {
    pub(super) fn reduce(mut self, other: Self) -> Self {
        self.res.extend(other.res);
        self.timings += other.timings;
        self
    }

    /// Keeps the result if there is one; timings are always added.
    pub(super) fn fold(mut self, item: Item) -> Self {
        if let Some(elem) = item.0 {
            self.res.push(elem);
        }
        self.timings += item.1;
        self
    }
}

impl FromIterator<Item> for DiaSearchAccumulator {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        iter.into_iter()
            .fold(DiaSearchAccumulator::default(), DiaSearchAccumulator::fold)
    }
}

impl FromParallelIterator<Item> for DiaSearchAccumulator {
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = Item>,
    {
        par_iter
            .into_par_iter()
            .fold(DiaSearchAccumulator::default, DiaSearchAccumulator::fold)
            .reduce(DiaSearchAccumulator::default, DiaSearchAccumulator::reduce)
    }
}
