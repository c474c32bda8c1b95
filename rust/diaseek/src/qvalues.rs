//! Target-decoy q-values for DIA results.

use crate::scoring::DiaSearchResult;
use serde::{
    Deserialize,
    Serialize,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Q-value of a result that was never ranked.
pub const UNCALCULATED_Q_VALUE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QValueMethod {
    /// `decoys / (decoys + targets)` at each rank, not monotonised.
    #[default]
    DecoyFraction,
    /// `decoys / targets` at each rank (capped at 1), then a running minimum
    /// from the worst rank up, so q-values never decrease with rank.
    RunningMinimum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiaFdrInfo {
    pub is_decoy: bool,
    pub cumulative_target: usize,
    pub cumulative_decoy: usize,
    pub q_value: f64,
    pub peptide_q_value: Option<f64>,
    /// Posterior error probability. Not estimated yet.
    pub pep: f64,
    pub pep_q_value: f64,
}

impl Default for DiaFdrInfo {
    fn default() -> Self {
        Self {
            is_decoy: false,
            cumulative_target: 0,
            cumulative_decoy: 0,
            q_value: UNCALCULATED_Q_VALUE,
            peptide_q_value: None,
            pep: f64::NAN,
            pep_q_value: f64::NAN,
        }
    }
}

impl DiaFdrInfo {
    pub fn is_calculated(&self) -> bool {
        self.q_value <= 1.0
    }
}

/// Best first: higher score, then more detected fragments. NaN scores last.
fn rank_order(a: &DiaSearchResult, b: &DiaSearchResult) -> Ordering {
    let (sa, sb) = (a.dot_product_score(), b.dot_product_score());
    match (sa.is_nan(), sb.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => sb
            .partial_cmp(&sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.fragments_detected().cmp(&a.fragments_detected())),
    }
}

/// Indices of `results` in rank order, with NaN scores dropped.
fn ranked_indices(results: &[DiaSearchResult]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..results.len())
        .filter(|&i| !results[i].dot_product_score().is_nan())
        .collect();
    order.sort_by(|&a, &b| rank_order(&results[a], &results[b]));
    order
}

/// Cumulative counts and q-values along an already ranked list of decoy flags.
fn q_values_along(is_decoy: impl Iterator<Item = bool>, method: QValueMethod) -> Vec<(usize, usize, f64)> {
    let mut targets = 0usize;
    let mut decoys = 0usize;
    let mut out: Vec<(usize, usize, f64)> = is_decoy
        .map(|decoy| {
            if decoy {
                decoys += 1;
            } else {
                targets += 1;
            }
            let q = match method {
                QValueMethod::DecoyFraction => decoys as f64 / (decoys + targets) as f64,
                QValueMethod::RunningMinimum => {
                    if targets == 0 {
                        1.0
                    } else {
                        (decoys as f64 / targets as f64).min(1.0)
                    }
                }
            };
            (targets, decoys, q)
        })
        .collect();

    if method == QValueMethod::RunningMinimum {
        let mut q_min = 1.0f64;
        for entry in out.iter_mut().rev() {
            q_min = q_min.min(entry.2);
            entry.2 = q_min;
        }
    }
    out
}

/// One [`DiaFdrInfo`] per result, in the same order as `results`.
///
/// Results with a NaN primary score are not ranked and keep the
/// uncalculated sentinel.
pub fn annotate_fdr(results: &[DiaSearchResult], method: QValueMethod) -> Vec<DiaFdrInfo> {
    let mut fdr: Vec<DiaFdrInfo> = results
        .iter()
        .map(|r| DiaFdrInfo {
            is_decoy: r.is_decoy(),
            ..Default::default()
        })
        .collect();

    let order = ranked_indices(results);
    let qs = q_values_along(order.iter().map(|&i| results[i].is_decoy()), method);
    for (&i, (targets, decoys, q)) in order.iter().zip(qs) {
        fdr[i].cumulative_target = targets;
        fdr[i].cumulative_decoy = decoys;
        fdr[i].q_value = q;
    }
    fdr
}

/// Peptide-level q-values: the best result of every (sequence, decoy) pair
/// is ranked, and its q-value is shared by the whole group.
pub fn annotate_peptide_q_values(
    results: &[DiaSearchResult],
    fdr: &mut [DiaFdrInfo],
    method: QValueMethod,
) {
    let order = ranked_indices(results);

    let mut best_of: HashMap<(&str, bool), usize> = HashMap::new();
    let mut peptide_order: Vec<usize> = Vec::new();
    for &i in order.iter() {
        let key = (results[i].sequence(), results[i].is_decoy());
        best_of.entry(key).or_insert_with(|| {
            peptide_order.push(i);
            i
        });
    }

    let qs = q_values_along(
        peptide_order.iter().map(|&i| results[i].is_decoy()),
        method,
    );
    let mut peptide_q: HashMap<usize, f64> = HashMap::with_capacity(peptide_order.len());
    for (&best, (_, _, q)) in peptide_order.iter().zip(qs) {
        peptide_q.insert(best, q);
    }

    for (i, r) in results.iter().enumerate() {
        let Some(info) = fdr.get_mut(i) else {
            break;
        };
        info.peptide_q_value = best_of
            .get(&(r.sequence(), r.is_decoy()))
            .and_then(|best| peptide_q.get(best))
            .copied();
    }
}

/// Targets at or below the q-value threshold.
pub fn count_passing(fdr: &[DiaFdrInfo], threshold: f64) -> usize {
    fdr.iter()
        .filter(|x| !x.is_decoy && x.is_calculated() && x.q_value <= threshold)
        .count()
}
