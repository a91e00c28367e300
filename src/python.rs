// Python bindings
//
// Built with `maturin develop --features python`. Matching uses the stock
// path library, so predicates see only the path.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::compiler::CompileError;
use crate::evaluator::PathExpressionEval;
use crate::expression::PathExpression;
use crate::functions::path_library;
use crate::path::Path;
use crate::path_parser;

fn parse_path(text: &str) -> PyResult<Path> {
    Path::parse(text).map_err(|e| PyValueError::new_err(format!("Invalid path '{}': {}", text, e)))
}

fn compile_error_to_py(e: CompileError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// A parsed path expression.
///
/// ```python
/// import pathexpr
///
/// expr = pathexpr.PathExpression("%_ /World/extra")
/// full = expr.compose_over(pathexpr.PathExpression("/World/geo//"))
/// print(full.text)  # "/World/geo// /World/extra"
/// ```
#[pyclass(name = "PathExpression")]
#[derive(Clone)]
struct PyPathExpression {
    inner: PathExpression,
}

#[pymethods]
impl PyPathExpression {
    #[new]
    fn new(text: &str) -> PyResult<Self> {
        let inner = path_parser::parse(text).map_err(|e| PyValueError::new_err(format!("Parse error: {}", e)))?;
        Ok(PyPathExpression { inner })
    }

    #[getter]
    fn text(&self) -> String {
        self.inner.text()
    }

    #[getter]
    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }

    /// Resolve `%_` references to `weaker`.
    fn compose_over(&self, weaker: &PyPathExpression) -> PyPathExpression {
        PyPathExpression {
            inner: self.inner.clone().compose_over(&weaker.inner),
        }
    }

    /// Anchor relative patterns and references at `anchor`.
    fn make_absolute(&self, anchor: &str) -> PyResult<PyPathExpression> {
        let anchor = parse_path(anchor)?;
        Ok(PyPathExpression {
            inner: self.inner.clone().make_absolute(&anchor),
        })
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(|e| PyValueError::new_err(format!("Failed to serialize: {}", e)))
    }

    fn __str__(&self) -> String {
        self.inner.text()
    }

    fn __repr__(&self) -> String {
        format!("PathExpression({:?})", self.inner.text())
    }
}

/// A compiled path expression.
///
/// ```python
/// import pathexpr
///
/// m = pathexpr.compile("/World//Mesh* - /World/Hidden//")
/// value, constant = m.match("/World/a/Mesh1")
/// hits = m.search(["/World", "/World/a", "/World/a/Mesh1"])
/// ```
#[pyclass]
struct PathMatcher {
    eval: PathExpressionEval<Path>,
}

#[pymethods]
impl PathMatcher {
    /// Match one absolute path. Returns `(value, constant)`; a constant
    /// result holds for every descendant of the path as well.
    #[pyo3(name = "match")]
    fn match_(&self, path: &str) -> PyResult<(bool, bool)> {
        let result = self.eval.match_path(&parse_path(path)?);
        Ok((result.value(), result.is_constant()))
    }

    /// Match paths given in depth-first order, reusing work across them.
    fn search(&self, paths: Vec<String>) -> PyResult<Vec<bool>> {
        let mut searcher = self.eval.path_searcher();
        paths
            .iter()
            .map(|text| -> PyResult<bool> { Ok(searcher.next(&parse_path(text)?).value()) })
            .collect()
    }
}

/// Parse and compile a complete path expression.
///
/// Raises ValueError if the expression does not parse, contains references,
/// has relative paths, or calls an unknown predicate.
#[pyfunction]
fn compile(expression: &str) -> PyResult<PathMatcher> {
    let expr = path_parser::parse(expression).map_err(|e| PyValueError::new_err(format!("Parse error: {}", e)))?;
    let eval = PathExpressionEval::new(&expr, &path_library()).map_err(compile_error_to_py)?;
    Ok(PathMatcher { eval })
}

#[pymodule]
fn _pathexpr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compile, m)?)?;
    m.add_class::<PathMatcher>()?;
    m.add_class::<PyPathExpression>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
