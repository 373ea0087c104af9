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
#![allow(non_snake_case)]

mod data;

extern crate bart_ensemble;

use crate::data::{load_ensemble, record_to_dict, value_error};

use bart_ensemble::io::tree_to_record;
use bart_ensemble::{EnsemblePredictor, PredictSettings};
use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyIndexError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Predicts with every draw of a serialized ensemble on the rows of `X`.
///
/// Returns an `(n_draws, n_rows)` array.
#[pyfunction]
#[pyo3(signature = (trees, cutpoints, X, n_threads=None))]
fn predict<'py>(
    py: Python<'py>,
    trees: &str,
    cutpoints: Vec<Vec<f64>>,
    X: PyReadonlyArray2<'py, f64>,
    n_threads: Option<usize>,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let ensemble = load_ensemble(trees, cutpoints)?;
    let predictor = EnsemblePredictor::new(&ensemble, PredictSettings::new(n_threads));
    let X = X.as_array();

    let predictions = py
        .allow_threads(|| predictor.predict(X))
        .map_err(value_error)?;

    Ok(PyArray2::from_owned_array_bound(py, predictions))
}

/// Exports tree `tree` of draw `draw` as nested dicts, leaf values reported
/// as `value * scale + center`.
#[pyfunction]
#[pyo3(signature = (trees, cutpoints, draw, tree, center=0.0, scale=1.0))]
fn tree_to_dict<'py>(
    py: Python<'py>,
    trees: &str,
    cutpoints: Vec<Vec<f64>>,
    draw: usize,
    tree: usize,
    center: f64,
    scale: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let ensemble = load_ensemble(trees, cutpoints)?;
    if draw >= ensemble.n_draws() || tree >= ensemble.n_trees() {
        return Err(PyIndexError::new_err(format!(
            "tree ({}, {}) is out of range for {} draws of {} trees",
            draw,
            tree,
            ensemble.n_draws(),
            ensemble.n_trees()
        )));
    }

    let record = tree_to_record(ensemble.tree(draw, tree), center, scale);
    record_to_dict(py, &record)
}

/// Per-draw count of internal nodes splitting on each feature, as an
/// `(n_draws, n_features)` array.
#[pyfunction]
fn tree_counts<'py>(
    py: Python<'py>,
    trees: &str,
    cutpoints: Vec<Vec<f64>>,
) -> PyResult<Bound<'py, PyArray2<usize>>> {
    let ensemble = load_ensemble(trees, cutpoints)?;
    Ok(PyArray2::from_owned_array_bound(py, ensemble.variable_counts()))
}

/// A Python module implemented in Rust.
#[pymodule]
fn bart_ensemble_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(predict, m)?)?;
    m.add_function(wrap_pyfunction!(tree_to_dict, m)?)?;
    m.add_function(wrap_pyfunction!(tree_counts, m)?)?;
    Ok(())
}
