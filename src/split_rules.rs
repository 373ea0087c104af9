//! Admissible split regions.
//!
//! Every ancestor of a node that splits on feature `v` restricts which
//! cutpoints of `v` can still separate samples at that node: descending
//! left through a split at cutpoint `c` leaves only cutpoints `< c`,
//! descending right leaves only cutpoints `> c`. This module computes the
//! resulting index interval and the derived queries the fitting driver uses
//! to pick grow targets.

use crate::cutpoints::CutpointTable;
use crate::errors::TreeError;
use crate::tree::DecisionTree;

/// Inclusive range `[low, high]` of cutpoint indices. Empty when `high < low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRange {
    /// Smallest admissible cutpoint index.
    pub low: isize,
    /// Largest admissible cutpoint index.
    pub high: isize,
}

impl SplitRange {
    /// Creates the unconstrained range over `n_cutpoints` cutpoints.
    pub fn full(n_cutpoints: usize) -> Self {
        Self {
            low: 0,
            high: n_cutpoints as isize - 1,
        }
    }

    /// Checks whether no cutpoint is admissible.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.high < self.low
    }

    /// Number of admissible cutpoints.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.high - self.low + 1) as usize
        }
    }

    /// Checks whether `cutpoint` lies in the range.
    pub fn contains(&self, cutpoint: usize) -> bool {
        let cutpoint = cutpoint as isize;
        self.low <= cutpoint && cutpoint <= self.high
    }

    /// Iterates over the admissible cutpoint indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        (self.low.max(0)..=self.high).map(|cutpoint| cutpoint as usize)
    }
}

impl DecisionTree {
    /// Computes the admissible cutpoint range of `feature` at the node `index`.
    ///
    /// Starts from `[0, n_cutpoints - 1]` and walks the ancestor chain up to
    /// the root. Each ancestor splitting on `feature` caps the upper bound at
    /// `cutpoint - 1` when the walk came up through its left child and raises
    /// the lower bound to `cutpoint + 1` when it came up through its right
    /// child. Ancestors on other features leave the bounds unchanged.
    ///
    /// Panics if `feature` is not covered by `cutpoints`.
    pub fn split_range(&self, index: usize, feature: usize, cutpoints: &CutpointTable) -> SplitRange {
        let mut range = SplitRange::full(cutpoints.n_cutpoints(feature));
        let mut child = index;

        while let Some(parent) = self.parent(child) {
            if self.feature(parent) == feature {
                let cut = self.cutpoint(parent) as isize;
                if self.left_child(parent) == Some(child) {
                    range.high = range.high.min(cut - 1);
                } else {
                    range.low = range.low.max(cut + 1);
                }
            }
            child = parent;
        }

        range
    }

    /// Checks whether at least one feature can still be split on at `index`.
    ///
    /// A leaf without a usable split can never be grown.
    pub fn has_usable_split(&self, index: usize, cutpoints: &CutpointTable) -> bool {
        (0..cutpoints.n_features())
            .any(|feature| !self.split_range(index, feature, cutpoints).is_empty())
    }

    /// Features with a non-empty admissible range at `index`, in increasing order.
    pub fn usable_features(&self, index: usize, cutpoints: &CutpointTable) -> Vec<usize> {
        (0..cutpoints.n_features())
            .filter(|&feature| !self.split_range(index, feature, cutpoints).is_empty())
            .collect()
    }

    /// Cutpoint of the nearest proper ancestor of `index` that splits on
    /// `feature`, or `None` if no ancestor does.
    pub fn ancestor_cutpoint(&self, index: usize, feature: usize) -> Option<usize> {
        let mut current = index;
        while let Some(parent) = self.parent(current) {
            if self.feature(parent) == feature {
                return Some(self.cutpoint(parent));
            }
            current = parent;
        }
        None
    }

    /// Grows the leaf with node id `nid` like [`DecisionTree::birth`], but
    /// first checks that `(feature, cutpoint)` exists in `cutpoints` and lies
    /// in the admissible range at the target.
    pub fn birth_within(
        &mut self,
        cutpoints: &CutpointTable,
        nid: usize,
        feature: usize,
        cutpoint: usize,
        left_value: f64,
        right_value: f64,
    ) -> Result<(usize, usize), TreeError> {
        cutpoints.check(feature, cutpoint)?;

        let index = self.index_of(nid).ok_or(TreeError::NodeNotFound(nid))?;
        let range = self.split_range(index, feature, cutpoints);
        if !range.contains(cutpoint) {
            return Err(TreeError::InadmissibleSplit {
                feature,
                cutpoint,
                low: range.low,
                high: range.high,
            });
        }

        self.birth(nid, feature, cutpoint, left_value, right_value)
    }
}
