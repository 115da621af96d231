//! Python bindings for the `_core` extension module

use crate::config::ProcessingConfig;
use crate::core::measurement::{self, RowParameter};
use crate::core::transform::CropParams;
use crate::core::{DataManager, Manipulation};
use crate::types::{DataView, SicmError};
use numpy::{PyArray1, PyArray2, ToPyArray};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: SicmError) -> PyErr {
    match e {
        SicmError::State(msg) => PyErr::new::<PyKeyError, _>(msg),
        SicmError::Transform(msg) | SicmError::Measurement(msg) => PyErr::new::<PyValueError, _>(msg),
        other => PyErr::new::<PyRuntimeError, _>(format!("{}", other)),
    }
}

fn parse_row_parameter(name: &str) -> PyResult<RowParameter> {
    match name {
        "Ra" => Ok(RowParameter::Ra),
        "Rq" => Ok(RowParameter::Rq),
        "Rz_ISO" => Ok(RowParameter::RzIso),
        "Rz_DIN" => Ok(RowParameter::RzDin),
        "Rp" => Ok(RowParameter::Rp),
        "Rv" => Ok(RowParameter::Rv),
        "Rt" => Ok(RowParameter::Rt),
        _ => Err(PyErr::new::<PyValueError, _>(format!("Invalid row parameter: {}", name))),
    }
}

/// Python wrapper for DataManager
#[pyclass(name = "DataManager", unsendable)]
struct PyDataManager {
    inner: DataManager,
    config: ProcessingConfig,
}

#[pymethods]
impl PyDataManager {
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<String>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => ProcessingConfig::from_json_file(path).map_err(to_py_err)?,
            None => ProcessingConfig::default(),
        };
        Ok(PyDataManager {
            inner: DataManager::new(),
            config,
        })
    }

    /// Returns the keys that were imported; failures are logged
    fn import_files(&mut self, paths: Vec<String>) -> Vec<String> {
        self.inner.import_files(&paths).imported
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys().to_vec()
    }

    fn set_listener(&mut self, callback: PyObject) {
        self.inner.set_listener(move |key| {
            Python::with_gil(|py| {
                if let Err(e) = callback.call1(py, (key,)) {
                    e.print(py);
                }
            })
        });
    }

    fn apply(&mut self, key: &str, action: &str) -> PyResult<()> {
        let manipulation = self.config.manipulation(action).map_err(to_py_err)?;
        self.inner.apply(key, &manipulation).map_err(to_py_err)
    }

    fn crop(&mut self, key: &str, p1: (usize, usize), p2: (usize, usize)) -> PyResult<()> {
        self.inner
            .apply(key, &Manipulation::Crop(CropParams::new(p1, p2)))
            .map_err(to_py_err)
    }

    fn undo(&mut self, key: &str) -> PyResult<()> {
        self.inner.undo(key).map_err(to_py_err)
    }

    fn redo(&mut self, key: &str) -> PyResult<()> {
        self.inner.redo(key).map_err(to_py_err)
    }

    fn reset(&mut self, key: &str) -> PyResult<()> {
        self.inner.reset(key).map_err(to_py_err)
    }

    fn remove(&mut self, key: &str) -> PyResult<()> {
        self.inner.remove(key).map_err(to_py_err)
    }

    fn export(&self, key: &str, path: &str) -> PyResult<()> {
        self.inner.export(key, path).map_err(to_py_err)
    }

    fn is_undoable(&self, key: &str) -> PyResult<bool> {
        self.inner.is_undoable(key).map_err(to_py_err)
    }

    fn is_redoable(&self, key: &str) -> PyResult<bool> {
        self.inner.is_redoable(key).map_err(to_py_err)
    }

    fn action_names(&self, key: &str) -> PyResult<Vec<String>> {
        let names = self.inner.action_names(key).map_err(to_py_err)?;
        Ok(names.into_iter().map(String::from).collect())
    }

    fn mode(&self, key: &str) -> PyResult<String> {
        let scan = self.inner.get_scan(key).map_err(to_py_err)?;
        Ok(scan.mode().to_string())
    }

    fn raster_z<'py>(&self, py: Python<'py>, key: &str) -> PyResult<&'py PyArray2<f64>> {
        let scan = self.inner.get_scan(key).map_err(to_py_err)?;
        let raster = scan.as_raster().map_err(to_py_err)?;
        Ok(raster.z.to_pyarray(py))
    }

    fn raster_x<'py>(&self, py: Python<'py>, key: &str) -> PyResult<&'py PyArray2<f64>> {
        let scan = self.inner.get_scan(key).map_err(to_py_err)?;
        let raster = scan.as_raster().map_err(to_py_err)?;
        Ok(raster.x.to_pyarray(py))
    }

    fn raster_y<'py>(&self, py: Python<'py>, key: &str) -> PyResult<&'py PyArray2<f64>> {
        let scan = self.inner.get_scan(key).map_err(to_py_err)?;
        let raster = scan.as_raster().map_err(to_py_err)?;
        Ok(raster.y.to_pyarray(py))
    }

    fn curve<'py>(&self, py: Python<'py>, key: &str) -> PyResult<(&'py PyArray1<f64>, &'py PyArray1<f64>)> {
        let scan = self.inner.get_scan(key).map_err(to_py_err)?;
        match scan.get_data() {
            DataView::Approach { x, z } => Ok((x.to_pyarray(py), z.to_pyarray(py))),
            DataView::Raster { .. } => Err(PyErr::new::<PyValueError, _>(format!(
                "{} is not an approach curve",
                key
            ))),
        }
    }

    fn minimum(&self, key: &str) -> PyResult<f64> {
        self.inner.measure(key, measurement::minimum).map_err(to_py_err)
    }

    fn maximum(&self, key: &str) -> PyResult<f64> {
        self.inner.measure(key, measurement::maximum).map_err(to_py_err)
    }

    fn roughness(&self, key: &str) -> PyResult<f64> {
        let result = self.inner.measure(key, measurement::roughness).map_err(to_py_err)?;
        Ok(result.rq)
    }

    fn row_parameters<'py>(&self, py: Python<'py>, key: &str, parameter: &str) -> PyResult<&'py PyArray1<f64>> {
        let parameter = parse_row_parameter(parameter)?;
        let values = self
            .inner
            .measure(key, |scan| measurement::row_parameters(scan, parameter))
            .map_err(to_py_err)?;
        Ok(values.to_pyarray(py))
    }

    fn report(&self, key: &str) -> PyResult<String> {
        self.inner.measure(key, measurement::measurement_report).map_err(to_py_err)
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyDataManager>()?;
    Ok(())
}
