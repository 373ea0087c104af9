//   Copyright 2024 The PyMC Developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
#![warn(missing_docs, clippy::needless_borrow)]

//! bart_ensemble provides the node-level machinery of Bayesian Additive
//! Regression Trees (BART). BART approximates a function by the sum of
//! many small regression trees; a posterior sample ("draw") is one such
//! sum of `m` trees, and predictions are made by summing, for every draw,
//! the leaf values each tree assigns to a feature vector.
//!
//! The crate offers:
//! - a mutable binary decision tree with grow (`birth`) and prune (`death`)
//!   operators, whose splits index into a per-feature cutpoint grid,
//! - the admissible split region of a node given its ancestors' splits,
//! - batched evaluation of many draws of many trees over a feature matrix,
//!   optionally partitioned over draws on a thread pool,
//! - reading and writing the text form of tree ensembles, and nested or
//!   histogram exports of single trees.
//!
//! The Markov chain Monte Carlo driver that decides which moves to make is
//! not part of this crate.

pub mod cutpoints;
pub mod errors;
pub mod forest;
pub mod io;
pub mod predictor;
pub mod split_rules;
pub mod tree;

pub use crate::cutpoints::CutpointTable;
pub use crate::errors::{CutpointError, EnsembleError, ParseError, PredictError, TreeError};
pub use crate::forest::Ensemble;
pub use crate::predictor::{EnsemblePredictor, PredictSettings};
pub use crate::split_rules::SplitRange;
pub use crate::tree::{DecisionTree, NodeType, MAX_DEPTH, ROOT};
