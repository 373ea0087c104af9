//! Conversion between in-memory trees and the host's serialized forms.
//!
//! The ensemble stream is whitespace separated text:
//!
//! ```text
//! n_draws n_trees n_features
//! <tree 0 of draw 0>
//! <tree 1 of draw 0>
//! ...
//! ```
//!
//! where each tree is its node count followed by one `nid feature cutpoint value`
//! record per node. The writer emits nodes in depth-first preorder; the
//! reader accepts any order as long as the node ids describe a complete
//! binary tree under the implicit numbering (root `1`, children `2n`, `2n + 1`).
#![allow(non_snake_case)]

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::str::{FromStr, SplitWhitespace};

use log::info;
use ndarray::{Array2, ShapeError};

use crate::cutpoints::CutpointTable;
use crate::errors::ParseError;
use crate::forest::Ensemble;
use crate::tree::{DecisionTree, ROOT};

impl fmt::Display for DecisionTree {
    /// Writes the node count followed by one `nid feature cutpoint value`
    /// line per node in depth-first preorder.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.size())?;
        for index in self.nodes() {
            writeln!(
                f,
                "{} {} {} {}",
                self.nid(index),
                self.feature(index),
                self.cutpoint(index),
                self.value(index)
            )?;
        }
        Ok(())
    }
}

/// Serializes an ensemble: the `n_draws n_trees n_features` header followed
/// by every tree in draw-major order.
pub fn write_ensemble(ensemble: &Ensemble) -> String {
    let mut out = format!(
        "{} {} {}\n",
        ensemble.n_draws(),
        ensemble.n_trees(),
        ensemble.n_features()
    );
    for trees in ensemble.draws() {
        for tree in trees {
            out.push_str(&tree.to_string());
        }
    }
    out
}

/// Whitespace token stream with contextual errors.
struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_whitespace(),
        }
    }

    fn next<T: FromStr>(&mut self, context: &dyn Fn() -> String) -> Result<T, ParseError> {
        let token = self
            .inner
            .next()
            .ok_or_else(|| ParseError::UnexpectedEnd { context: context() })?;

        token.parse().map_err(|_| ParseError::InvalidToken {
            context: context(),
            token: token.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeRecord {
    feature: usize,
    cutpoint: usize,
    value: f64,
}

/// Reads an ensemble stream from `reader`. See [`parse_ensemble`].
pub fn read_ensemble<R: Read>(mut reader: R, cutpoints: CutpointTable) -> Result<Ensemble, ParseError> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    parse_ensemble(&text, cutpoints)
}

/// Parses an ensemble stream against `cutpoints`.
///
/// Fails without returning any trees if the header's feature count differs
/// from the table's, if the stream is truncated or contains a malformed
/// token, if a tree record is not a complete binary tree, or if a split
/// addresses a cutpoint the table does not have.
pub fn parse_ensemble(text: &str, cutpoints: CutpointTable) -> Result<Ensemble, ParseError> {
    let mut tokens = Tokens::new(text);

    let n_draws: usize = tokens.next(&|| "header (number of draws)".to_string())?;
    let n_trees: usize = tokens.next(&|| "header (trees per draw)".to_string())?;
    let n_features: usize = tokens.next(&|| "header (number of features)".to_string())?;

    info!(
        "Reading {} draws of {} trees over {} features",
        n_draws, n_trees, n_features
    );

    if n_features != cutpoints.n_features() {
        return Err(ParseError::FeatureCountMismatch {
            expected: n_features,
            actual: cutpoints.n_features(),
        });
    }

    // Header counts are untrusted, storage grows with the trees actually read
    let mut draws = Vec::new();
    for draw in 0..n_draws {
        let mut trees = Vec::new();
        for tree in 0..n_trees {
            trees.push(parse_tree(&mut tokens, draw, tree)?);
        }
        draws.push(trees);
    }

    Ok(Ensemble::with_n_trees(n_trees, draws, cutpoints)?)
}

/// Parses a single tree record (node count plus node records).
pub fn parse_tree_str(text: &str) -> Result<DecisionTree, ParseError> {
    parse_tree(&mut Tokens::new(text), 0, 0)
}

fn parse_tree(tokens: &mut Tokens, draw: usize, tree: usize) -> Result<DecisionTree, ParseError> {
    let context = || format!("draw {}, tree {}", draw, tree);
    let invalid = |message: String| ParseError::InvalidTree {
        draw,
        tree,
        message,
    };

    let n_nodes: usize = tokens.next(&context)?;
    if n_nodes == 0 {
        return Err(invalid("tree has no nodes".to_string()));
    }

    let mut records = BTreeMap::new();
    for _ in 0..n_nodes {
        let nid: usize = tokens.next(&context)?;
        let record = NodeRecord {
            feature: tokens.next(&context)?,
            cutpoint: tokens.next(&context)?,
            value: tokens.next(&context)?,
        };
        if nid == 0 {
            return Err(invalid("node id 0 is not valid".to_string()));
        }
        if records.insert(nid, record).is_some() {
            return Err(invalid(format!("duplicate node id {}", nid)));
        }
    }

    for &nid in records.keys() {
        if nid > 1 {
            if !records.contains_key(&(nid / 2)) {
                return Err(invalid(format!("node {} has no parent {}", nid, nid / 2)));
            }
            if !records.contains_key(&(nid ^ 1)) {
                return Err(invalid(format!("node {} has no sibling {}", nid, nid ^ 1)));
            }
        }
    }

    let root = records
        .get(&1)
        .ok_or_else(|| invalid("root node 1 is missing".to_string()))?;
    let mut decision_tree = DecisionTree::new(root.value);

    // Ascending node ids visit every parent before its children
    for (&nid, record) in &records {
        let children = nid
            .checked_mul(2)
            .and_then(|left| Some((records.get(&left)?, records.get(&(left + 1))?)));
        if let Some((left, right)) = children {
            decision_tree
                .birth(nid, record.feature, record.cutpoint, left.value, right.value)
                .map_err(|e| invalid(e.to_string()))?;
        }
    }

    Ok(decision_tree)
}

/// Builds a `(n_rows, n_features)` feature matrix from a host buffer that
/// stores each row's features contiguously.
pub fn feature_matrix(data: Vec<f64>, n_features: usize, n_rows: usize) -> Result<Array2<f64>, ShapeError> {
    Array2::from_shape_vec((n_rows, n_features), data)
}

/// One side of an exported split.
#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    /// A leaf, carrying its rescaled value.
    Leaf(f64),
    /// A nested split.
    Split(Box<TreeRecord>),
}

/// Nested export of a tree, one record per internal node.
///
/// Features and cutpoints are 1-based. A single-leaf tree is exported as a
/// record with `var = 0`, `cut = 0` and the leaf value on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeRecord {
    /// 1-based split feature, `0` for a single-leaf tree.
    pub var: usize,
    /// 1-based cutpoint index, `0` for a single-leaf tree.
    pub cut: usize,
    /// Left subtree or leaf value.
    pub left: Branch,
    /// Right subtree or leaf value.
    pub right: Branch,
}

impl TreeRecord {
    /// Shape code of the record: `1` both sides split, `2` only the left side
    /// splits, `3` only the right side splits, `0` both sides are leaves.
    pub fn shape(&self) -> u8 {
        match (&self.left, &self.right) {
            (Branch::Split(_), Branch::Split(_)) => 1,
            (Branch::Split(_), Branch::Leaf(_)) => 2,
            (Branch::Leaf(_), Branch::Split(_)) => 3,
            (Branch::Leaf(_), Branch::Leaf(_)) => 0,
        }
    }
}

/// Exports `tree` as nested records with every leaf value reported as
/// `value * scale + center`. The tree itself is not modified.
pub fn tree_to_record(tree: &DecisionTree, center: f64, scale: f64) -> TreeRecord {
    match tree.children(ROOT) {
        Some(children) => split_record(tree, ROOT, children, center, scale),
        None => {
            let value = tree.value(ROOT) * scale + center;
            TreeRecord {
                var: 0,
                cut: 0,
                left: Branch::Leaf(value),
                right: Branch::Leaf(value),
            }
        }
    }
}

fn split_record(
    tree: &DecisionTree,
    index: usize,
    (left, right): (usize, usize),
    center: f64,
    scale: f64,
) -> TreeRecord {
    TreeRecord {
        var: tree.feature(index) + 1,
        cut: tree.cutpoint(index) + 1,
        left: branch(tree, left, center, scale),
        right: branch(tree, right, center, scale),
    }
}

fn branch(tree: &DecisionTree, index: usize, center: f64, scale: f64) -> Branch {
    match tree.children(index) {
        Some(children) => Branch::Split(Box::new(split_record(tree, index, children, center, scale))),
        None => Branch::Leaf(tree.value(index) * scale + center),
    }
}

/// Counts, per feature, the internal nodes of `tree` that split on it.
///
/// Panics if a split feature is not below `n_features`.
pub fn variable_counts(tree: &DecisionTree, n_features: usize) -> Vec<usize> {
    let mut counts = vec![0; n_features];
    for index in tree.nodes() {
        if !tree.is_leaf(index) {
            counts[tree.feature(index)] += 1;
        }
    }
    counts
}
