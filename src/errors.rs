//! Error types returned by tree mutation, cutpoint construction, stream
//! parsing and ensemble prediction.

use thiserror::Error;

/// Represents errors related to binary decision tree operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    /// No node in the tree carries the requested node id.
    #[error("Node id {0} does not exist")]
    NodeNotFound(usize),
    /// An arena index does not refer to a live node.
    #[error("Node index {0} does not refer to a live node")]
    InvalidNodeIndex(usize),
    /// Attempted to split a node that already has children.
    #[error("Cannot split node {0}: it is not a leaf")]
    NonLeafSplit(usize),
    /// Attempted to prune a node whose children are not both leaves.
    #[error("Cannot prune node {0}: it is not a no-grandchildren node")]
    NotNoGrandchildren(usize),
    /// The split feature is not part of the cutpoint table.
    #[error("Feature {feature} is out of range for a table with {n_features} features")]
    UnknownFeature {
        /// Requested split feature.
        feature: usize,
        /// Number of features in the cutpoint table.
        n_features: usize,
    },
    /// The cutpoint index does not exist for the feature.
    #[error("Cutpoint {cutpoint} is out of range for feature {feature} with {n_cutpoints} cutpoints")]
    UnknownCutpoint {
        /// Split feature.
        feature: usize,
        /// Requested cutpoint index.
        cutpoint: usize,
        /// Number of cutpoints of the feature.
        n_cutpoints: usize,
    },
    /// The cutpoint is outside the admissible range at the target node.
    #[error("Cutpoint {cutpoint} of feature {feature} is outside the admissible range [{low}, {high}]")]
    InadmissibleSplit {
        /// Requested split feature.
        feature: usize,
        /// Requested cutpoint index.
        cutpoint: usize,
        /// Lower bound of the admissible range.
        low: isize,
        /// Upper bound of the admissible range.
        high: isize,
    },
    /// Splitting the node would create children too deep to carry a node id.
    #[error("Cannot split a node at depth {depth}: trees are limited to depth {max_depth}")]
    DepthLimit {
        /// Depth of the node to split.
        depth: usize,
        /// Deepest admissible level.
        max_depth: usize,
    },
    /// Grid evaluation is only defined over two features.
    #[error("Grid evaluation needs exactly 2 features, the table has {0}")]
    GridDimension(usize),
}

/// Errors raised while building a cutpoint table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CutpointError {
    /// Cutpoints of a feature are not strictly increasing.
    #[error("Cutpoints of feature {feature} are not strictly increasing at position {position}")]
    NotIncreasing {
        /// Offending feature.
        feature: usize,
        /// Position of the first value not greater than its predecessor.
        position: usize,
    },
    /// A feature column has a non-finite minimum or maximum.
    #[error("Feature {0} has non-finite values, cannot build a cutpoint grid")]
    NonFinite(usize),
}

/// Errors raised while assembling an ensemble from trees.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnsembleError {
    /// A draw does not hold the same number of trees as the first draw.
    #[error("draw {draw} has {actual} trees, expected {expected}")]
    RaggedDraw {
        /// Offending draw.
        draw: usize,
        /// Trees per draw of the ensemble.
        expected: usize,
        /// Trees found in this draw.
        actual: usize,
    },
    /// A tree references a feature or cutpoint the table does not have.
    #[error("draw {draw}, tree {tree}: {source}")]
    InvalidTree {
        /// Draw index of the offending tree.
        draw: usize,
        /// Tree index within the draw.
        tree: usize,
        /// The failed check.
        source: TreeError,
    },
}

/// Errors raised while reading a serialized ensemble.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Underlying reader failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended before a complete record was read.
    #[error("unexpected end of input while parsing {context}")]
    UnexpectedEnd {
        /// What was being read.
        context: String,
    },
    /// A token could not be parsed as the expected number.
    #[error("invalid token {token:?} while parsing {context}")]
    InvalidToken {
        /// What was being read.
        context: String,
        /// The token as found in the stream.
        token: String,
    },
    /// Feature count in the header disagrees with the cutpoint table.
    #[error("header declares {expected} features but the cutpoint table has {actual}")]
    FeatureCountMismatch {
        /// Feature count from the header.
        expected: usize,
        /// Feature count of the cutpoint table.
        actual: usize,
    },
    /// A tree record does not describe a complete binary tree.
    #[error("invalid tree format in draw {draw}, tree {tree}: {message}")]
    InvalidTree {
        /// Draw index of the offending tree.
        draw: usize,
        /// Tree index within the draw.
        tree: usize,
        /// Description of the defect.
        message: String,
    },
    /// The trees read do not form a valid ensemble.
    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
}

/// Errors raised by ensemble prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    /// The feature matrix has fewer columns than the ensemble uses.
    #[error("feature matrix has {actual} columns, the ensemble needs {expected}")]
    FeatureCountMismatch {
        /// Number of features of the ensemble.
        expected: usize,
        /// Number of columns of the feature matrix.
        actual: usize,
    },
    /// The output buffer could not be shaped into a matrix.
    #[error("unable to shape predictions: {0}")]
    Shape(#[from] ndarray::ShapeError),
    /// The worker pool could not be built.
    #[error("unable to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
