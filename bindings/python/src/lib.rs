use std::sync::{Arc, OnceLock};

#[cfg(feature = "rustface")]
use facemorph_core::RustfaceDetector;
use facemorph_core::{
    BackgroundReplacer, Effect, FaceBox, FaceDetector, FaceMorpher, Landmarks, MorphError,
    OutputFormat, Point,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

fn to_py_err(e: MorphError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Shared across calls so backdrops of a repeated size are rendered once.
fn replacer() -> Arc<BackgroundReplacer> {
    static REPLACER: OnceLock<Arc<BackgroundReplacer>> = OnceLock::new();
    Arc::clone(REPLACER.get_or_init(|| Arc::new(BackgroundReplacer::new())))
}

fn string_to_effect(effect: &str) -> Effect {
    Effect::from_id_or_default(effect)
}

fn string_to_format(format: &str) -> PyResult<OutputFormat> {
    format.parse().map_err(to_py_err)
}

#[cfg(feature = "rustface")]
fn load_face_detector(model_path: &str) -> PyResult<Box<dyn FaceDetector>> {
    let detector = RustfaceDetector::from_path(model_path).map_err(to_py_err)?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "rustface"))]
fn load_face_detector(model_path: &str) -> PyResult<Box<dyn FaceDetector>> {
    Err(PyValueError::new_err(format!(
        "cannot load face model {model_path}: built without the \"rustface\" feature"
    )))
}

fn points_to_landmarks(points: Vec<(i32, i32)>) -> PyResult<Landmarks> {
    let points: Vec<Point> = points.into_iter().map(|(x, y)| Point::new(x, y)).collect();
    Landmarks::try_from_slice(&points).map_err(to_py_err)
}

/// Warp the face in a photo.
///
/// Args:
///     input: Raw image bytes (JPEG, PNG, or WebP)
///     face: Face box as (x1, y1, x2, y2); optional when landmarks or
///           face_model are given
///     effect: "bulge", "cartoon", "squeeze", "big_eyes" or "wide_smile"
///             (unknown names fall back to "bulge", default: "bulge")
///     strength: Effect intensity, usually 0.0–2.0 (default: 1.0)
///     landmarks: 68 (x, y) points; estimated from the face box when omitted
///     mugshot_background: Replace the background with a police lineup wall
///     face_model: Path to a SeetaFace model used to find the face when no
///                 face box is given (requires the "rustface" feature)
///     format: "jpeg", "png" or "webp" (default: "jpeg")
///     quality: Compression quality 0.0–1.0 (default: 0.92)
///
/// Returns:
///     dict with keys: data (bytes), format (str), width (int), height (int),
///                     effect (str), strength (float), face (tuple),
///                     mugshot_background (bool)
#[pyfunction]
#[pyo3(signature = (input, *, face=None, effect="bulge", strength=1.0, landmarks=None, mugshot_background=false, face_model=None, format=None, quality=None))]
#[allow(clippy::too_many_arguments)]
fn apply_effect(
    py: Python<'_>,
    input: Vec<u8>,
    face: Option<(i32, i32, i32, i32)>,
    effect: &str,
    strength: f32,
    landmarks: Option<Vec<(i32, i32)>>,
    mugshot_background: bool,
    face_model: Option<&str>,
    format: Option<&str>,
    quality: Option<f32>,
) -> PyResult<Py<PyDict>> {
    let mut morpher = FaceMorpher::new(input)
        .map_err(to_py_err)?
        .effect(string_to_effect(effect))
        .strength(strength);

    if let Some((x1, y1, x2, y2)) = face {
        morpher = morpher.face(FaceBox::new(x1, y1, x2, y2));
    }
    if let Some(points) = landmarks {
        morpher = morpher.landmarks(points_to_landmarks(points)?);
    }
    if let Some(path) = face_model {
        morpher = morpher.face_detector(load_face_detector(path)?);
    }
    if mugshot_background {
        morpher = morpher.background(replacer());
    }
    if let Some(fmt) = format {
        morpher = morpher.format(string_to_format(fmt)?);
    }
    if let Some(q) = quality {
        morpher = morpher.quality(q);
    }

    let result = py.allow_threads(|| morpher.process()).map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("data", PyBytes::new(py, &result.data))?;
    dict.set_item("format", result.format.name())?;
    dict.set_item("width", result.width)?;
    dict.set_item("height", result.height)?;
    dict.set_item("effect", result.effect.id())?;
    dict.set_item("strength", result.strength)?;
    let f = result.face;
    dict.set_item("face", (f.x1, f.y1, f.x2, f.y2))?;
    dict.set_item("mugshot_background", result.background_replaced)?;
    Ok(dict.into())
}

/// List the available effects.
///
/// Returns:
///     list of dicts with keys: id (str), name (str), description (str)
#[pyfunction]
fn list_effects(py: Python<'_>) -> PyResult<Py<PyList>> {
    let list = PyList::empty(py);
    for info in facemorph_core::list_effects() {
        let dict = PyDict::new(py);
        dict.set_item("id", info.id)?;
        dict.set_item("name", info.name)?;
        dict.set_item("description", info.description)?;
        list.append(dict)?;
    }
    Ok(list.into())
}

#[pymodule]
fn facemorph(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(apply_effect, m)?)?;
    m.add_function(wrap_pyfunction!(list_effects, m)?)?;
    Ok(())
}
