//! Conversions between Python values and the core crate's types.

use bart_ensemble::io::{Branch, TreeRecord};
use bart_ensemble::{CutpointTable, Ensemble};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Maps any core error onto a Python `ValueError`.
pub fn value_error<E: std::fmt::Display>(err: E) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Builds the ensemble described by a serialized tree stream and one
/// cutpoint sequence per feature.
pub fn load_ensemble(trees: &str, cutpoints: Vec<Vec<f64>>) -> PyResult<Ensemble> {
    let cutpoints = CutpointTable::new(cutpoints).map_err(value_error)?;
    bart_ensemble::io::parse_ensemble(trees, cutpoints).map_err(value_error)
}

/// Converts an exported tree into nested dicts with keys
/// `var`, `cut`, `type`, `left` and `right`.
pub fn record_to_dict<'py>(py: Python<'py>, record: &TreeRecord) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("var", record.var)?;
    dict.set_item("cut", record.cut)?;
    dict.set_item("type", record.shape())?;
    dict.set_item("left", branch_to_object(py, &record.left)?)?;
    dict.set_item("right", branch_to_object(py, &record.right)?)?;
    Ok(dict)
}

fn branch_to_object(py: Python<'_>, branch: &Branch) -> PyResult<PyObject> {
    Ok(match branch {
        Branch::Leaf(value) => value.to_object(py),
        Branch::Split(record) => record_to_dict(py, record)?.into_any().unbind(),
    })
}
