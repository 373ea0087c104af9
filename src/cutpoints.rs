//! Per-feature grids of candidate split thresholds.
//!
//! A split is stored as a pair of indices `(feature, cutpoint)` into a
//! [`CutpointTable`]; a sample goes left when
//! `x[feature] < table.value(feature, cutpoint)` and right otherwise.

use std::cmp::Ordering;

use log::warn;
use ndarray::{ArrayView2, Axis};

use crate::errors::{CutpointError, TreeError};

/// `CutpointTable` holds one strictly increasing list of thresholds per feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CutpointTable {
    cutpoints: Vec<Vec<f64>>,
}

impl CutpointTable {
    /// Creates a table from one cutpoint list per feature.
    ///
    /// Every list must be strictly increasing. Empty lists are allowed and
    /// mark a feature that can never be split on.
    pub fn new(cutpoints: Vec<Vec<f64>>) -> Result<Self, CutpointError> {
        for (feature, values) in cutpoints.iter().enumerate() {
            if let Some(position) = values
                .windows(2)
                .position(|pair| pair[0].partial_cmp(&pair[1]) != Some(Ordering::Less))
            {
                return Err(CutpointError::NotIncreasing {
                    feature,
                    position: position + 1,
                });
            }
        }

        Ok(Self { cutpoints })
    }

    /// Builds `numcut` evenly spaced cutpoints per column of `X`.
    ///
    /// The cutpoints of column `j` are `min + (k + 1) * (max - min) / (numcut + 1)`
    /// for `k` in `0..numcut`, so all of them lie strictly inside the observed
    /// range. A constant column gets an empty list.
    #[allow(non_snake_case)]
    pub fn uniform(X: ArrayView2<f64>, numcut: usize) -> Result<Self, CutpointError> {
        let mut cutpoints = Vec::with_capacity(X.ncols());

        for (feature, column) in X.axis_iter(Axis(1)).enumerate() {
            let (min, max) = column
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                });

            if !min.is_finite() || !max.is_finite() {
                return Err(CutpointError::NonFinite(feature));
            }

            if max <= min {
                warn!("Feature {} is constant, it gets no cutpoints", feature);
                cutpoints.push(Vec::new());
                continue;
            }

            let step = (max - min) / (numcut + 1) as f64;
            cutpoints.push((0..numcut).map(|k| min + (k + 1) as f64 * step).collect());
        }

        Self::new(cutpoints)
    }

    /// Number of features covered by the table.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.cutpoints.len()
    }

    /// Number of cutpoints of `feature`.
    #[inline]
    pub fn n_cutpoints(&self, feature: usize) -> usize {
        self.cutpoints[feature].len()
    }

    /// Threshold value of the `cutpoint`-th cut of `feature`.
    #[inline(always)]
    pub fn value(&self, feature: usize, cutpoint: usize) -> f64 {
        self.cutpoints[feature][cutpoint]
    }

    /// All thresholds of `feature`.
    pub fn cutpoints(&self, feature: usize) -> &[f64] {
        &self.cutpoints[feature]
    }

    /// Iterates over the per-feature cutpoint lists.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.cutpoints.iter().map(Vec::as_slice)
    }

    /// Checks that `(feature, cutpoint)` addresses a threshold in this table.
    pub fn check(&self, feature: usize, cutpoint: usize) -> Result<(), TreeError> {
        let cuts = self
            .cutpoints
            .get(feature)
            .ok_or(TreeError::UnknownFeature {
                feature,
                n_features: self.n_features(),
            })?;

        if cutpoint >= cuts.len() {
            return Err(TreeError::UnknownCutpoint {
                feature,
                cutpoint,
                n_cutpoints: cuts.len(),
            });
        }

        Ok(())
    }
}
