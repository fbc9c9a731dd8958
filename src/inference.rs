use std::path::Path;

use ndarray::{Array3, ArrayView2, Axis};
use ort::{GraphOptimizationLevel, Session, Tensor};
use tracing::{debug, info, warn};

use crate::constants::SAMPLE_LENGTH;
use crate::error::{Result, VelocityError};
use crate::preprocessing::windowed_features::Window;

/// All windows of one file: `[window][position_in_window][feature]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array3<f32>,
}

impl InputTensor {
    pub fn from_windows(windows: &[Window]) -> Result<Self> {
        let Some(first) = windows.first() else {
            return Err(VelocityError::EmptyInput);
        };
        let n_features = first.n_features();
        if let Some(bad) = windows.iter().find(|w| w.n_features() != n_features) {
            return Err(VelocityError::ShapeMismatch {
                expected: vec![SAMPLE_LENGTH, n_features],
                actual: bad.data().shape().to_vec(),
            });
        }

        let views: Vec<ArrayView2<f32>> = windows.iter().map(|w| w.data().view()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|_| VelocityError::ShapeMismatch {
            expected: vec![windows.len(), SAMPLE_LENGTH, n_features],
            actual: first.data().shape().to_vec(),
        })?;
        Ok(Self { data })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn n_windows(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Number of note slots, padding included.
    pub fn slot_count(&self) -> usize {
        self.n_windows() * SAMPLE_LENGTH
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }
}

/// A pretrained velocity model: one forward pass over all windows, one
/// normalized velocity per note slot in window order.
pub trait VelocityModel {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

impl<M: VelocityModel + ?Sized> VelocityModel for &M {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        (**self).predict(input)
    }
}

pub struct OnnxVelocityModel {
    session: Session,
    input_name: String,
}

impl OnnxVelocityModel {
    pub fn load<P: AsRef<Path>>(model_path: P, input_name: &str, intra_threads: usize) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(intra_threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                warn!(model = %model_path.display(), error = %e, "failed to load velocity model");
                VelocityError::InferenceEngineError(format!(
                    "failed to load model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        info!(model = %model_path.display(), "loaded velocity model");
        Ok(Self {
            session,
            input_name: input_name.to_string(),
        })
    }
}

impl VelocityModel for OnnxVelocityModel {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let input_shape: Vec<i64> = input.shape().iter().map(|&dim| dim as i64).collect();
        let input_data: Vec<f32> = input.data().iter().copied().collect();
        let input_tensor = Tensor::from_array((input_shape, input_data))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor]?)?;

        let (_, value) = outputs.iter().next().ok_or_else(|| {
            VelocityError::InferenceEngineError("model produced no output".to_string())
        })?;
        let predictions = value.try_extract_tensor::<f32>()?;

        Ok(predictions.iter().copied().collect())
    }
}

/// Scale a normalized prediction to velocity units: round half to even, clamp to `[0, velocity_max]`.
pub fn rescale_velocity(raw: f32, velocity_max: i32) -> i32 {
    let velocity_max = velocity_max.max(0);
    let scaled = (raw * velocity_max as f32).round_ties_even();
    if scaled.is_nan() {
        return 0;
    }
    (scaled as i32).clamp(0, velocity_max)
}

/// Drop the padding slots of the final window.
///
/// # Arguments
///
/// * `predictions` - One velocity per slot, window order.
/// * `note_count` - Number of real notes in the input.
///
/// # Returns
///
/// * Exactly `note_count` velocities.
pub fn trim_padding(mut predictions: Vec<i32>, note_count: usize) -> Result<Vec<i32>> {
    if predictions.len() < note_count {
        return Err(VelocityError::InferenceEngineError(format!(
            "model returned {} predictions for {} notes",
            predictions.len(),
            note_count
        )));
    }
    predictions.truncate(note_count);
    Ok(predictions)
}

/// Run the model over all windows and map the output back to one velocity per note.
pub fn predict_velocities<M: VelocityModel + ?Sized>(
    model: &M,
    windows: &[Window],
    velocity_max: i32,
    note_count: usize,
) -> Result<Vec<i32>> {
    let input = InputTensor::from_windows(windows)?;
    debug!(shape = ?input.shape(), "submitting input tensor");

    let raw = model.predict(&input)?;
    if raw.len() != input.slot_count() {
        // Padding is trimmed from the tail, which only holds if every slot got one value.
        warn!(
            expected = input.slot_count(),
            actual = raw.len(),
            "model output size differs from slot count"
        );
    }

    let velocities: Vec<i32> = raw.iter().map(|&v| rescale_velocity(v, velocity_max)).collect();
    let dummy_count = velocities.len().saturating_sub(note_count);
    let trimmed = trim_padding(velocities, note_count)?;
    info!(notes = trimmed.len(), dropped = dummy_count, "predicted velocities");

    Ok(trimmed)
}
