use ndarray::{s, Array1, Array2, ArrayView2};
use tracing::debug;

use crate::constants::SAMPLE_LENGTH;
use crate::error::{Result, VelocityError};
use crate::preprocessing::feature_table::FeatureTable;
use crate::preprocessing::metadata::DatasetMetadata;

/// Selected columns stacked row-wise: `[feature][note]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    data: Array2<f32>,
}

impl FeatureMatrix {
    /// Stack the named columns of `table`, keeping the order of `columns`.
    pub fn stack(table: &FeatureTable, columns: &[&str]) -> Result<Self> {
        let n_notes = table.len();
        let mut data = Array2::<f32>::zeros((columns.len(), n_notes));
        for (mut row, &name) in data.outer_iter_mut().zip(columns) {
            row.assign(&Array1::from(table.column(name)?));
        }

        Ok(Self {
            names: columns.iter().map(|c| c.to_string()).collect(),
            data,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_notes(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Min-max normalize every feature that has bounds in `metadata`.
    /// Features without bounds (`low_octave`) pass through unchanged.
    pub fn normalize(&mut self, metadata: &DatasetMetadata) -> Result<()> {
        for (name, mut row) in self.names.iter().zip(self.data.outer_iter_mut()) {
            let Some(bounds) = metadata.bounds_for(name) else {
                continue;
            };
            for value in row.iter_mut() {
                *value = bounds.normalize(name, *value)?;
            }
        }
        Ok(())
    }

    /// Notes-by-features view of the matrix.
    pub fn notes(&self) -> ArrayView2<'_, f32> {
        self.data.t()
    }
}

/// A fixed `[SAMPLE_LENGTH, n_features]` block of consecutive notes.
///
/// Rows past `filled` are zero padding and carry no note.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    data: Array2<f32>,
    filled: usize,
}

impl Window {
    pub fn new(data: Array2<f32>, filled: usize) -> Result<Self> {
        if data.nrows() != SAMPLE_LENGTH || filled > SAMPLE_LENGTH {
            return Err(VelocityError::ShapeMismatch {
                expected: vec![SAMPLE_LENGTH, data.ncols()],
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self { data, filled })
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_padded(&self) -> bool {
        self.filled < SAMPLE_LENGTH
    }
}

pub struct WindowedFeatures<'a> {
    notes: ArrayView2<'a, f32>,
    index: usize,
}

impl<'a> Iterator for WindowedFeatures<'a> {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        let n_notes = self.notes.nrows();
        if self.index >= n_notes {
            return None;
        }

        let end_index = (self.index + SAMPLE_LENGTH).min(n_notes);
        let filled = end_index - self.index;
        let mut window = Array2::<f32>::zeros((SAMPLE_LENGTH, self.notes.ncols()));
        window
            .slice_mut(s![..filled, ..])
            .assign(&self.notes.slice(s![self.index..end_index, ..]));

        self.index += SAMPLE_LENGTH;
        Some(Window { data: window, filled })
    }
}

/// Split a matrix into non-overlapping windows of `SAMPLE_LENGTH` notes.
/// A short tail becomes one extra zero-padded window.
pub fn window_features(matrix: &FeatureMatrix) -> WindowedFeatures<'_> {
    WindowedFeatures {
        notes: matrix.notes(),
        index: 0,
    }
}

/// Model-ready windows for one performance.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub inputs: Vec<Window>,
    /// Ground-truth label windows, parallel to `inputs`. Inference ignores them.
    pub labels: Vec<Window>,
    pub note_count: usize,
}

/// Normalize and window a feature table.
///
/// # Arguments
///
/// * `table` - Per-note features, in onset order.
/// * `columns_train` - Input feature columns, in model order.
/// * `columns_label` - Label columns.
/// * `metadata` - Normalization bounds.
///
/// # Returns
///
/// * Input and label windows, `ceil(notes / SAMPLE_LENGTH)` of each.
pub fn make_dataset(
    table: &FeatureTable,
    columns_train: &[&str],
    columns_label: &[&str],
    metadata: &DatasetMetadata,
) -> Result<Dataset> {
    if table.is_empty() {
        return Err(VelocityError::EmptyInput);
    }

    let mut input_raw = FeatureMatrix::stack(table, columns_train)?;
    let mut label_raw = FeatureMatrix::stack(table, columns_label)?;

    input_raw.normalize(metadata)?;
    label_raw.normalize(metadata)?;

    let inputs: Vec<Window> = window_features(&input_raw).collect();
    let labels: Vec<Window> = window_features(&label_raw).collect();
    debug!(
        notes = table.len(),
        windows = inputs.len(),
        features = ?input_raw.names(),
        padded_tail = inputs.last().is_some_and(Window::is_padded),
        "windowed feature table"
    );

    Ok(Dataset {
        inputs,
        labels,
        note_count: table.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Axis;
    use crate::constants::{COLUMNS_LABEL, COLUMNS_TRAIN, FEATURE_NUM};
    use crate::preprocessing::feature_table::NoteRow;

    fn metadata() -> DatasetMetadata {
        DatasetMetadata {
            train_time_diff_min: 0,
            train_time_diff_max: 10,
            note_num_min: 21,
            note_num_max: 108,
            note_num_diff_min: -50,
            note_num_diff_max: 50,
            length_min: 0,
            length_max: 5,
            velocity_min: 0,
            velocity_max: 127,
        }
    }

    fn table(n: usize) -> FeatureTable {
        FeatureTable::new(
            (0..n)
                .map(|i| NoteRow {
                    time: i as f32 * 2.0,
                    time_diff: 2.0,
                    note_num: 60.0 + i as f32,
                    length: 1.0,
                    note_num_diff: 1.0,
                    low_octave: (i % 2) as f32,
                    velocity: 64.0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_stack_shape() {
        let m = FeatureMatrix::stack(&table(7), &COLUMNS_TRAIN).unwrap();
        assert_eq!(m.n_features(), FEATURE_NUM);
        assert_eq!(m.n_notes(), 7);
        assert_eq!(m.data()[[1, 3]], 63.0);
    }

    #[test]
    fn test_normalize_skips_low_octave() {
        let mut m = FeatureMatrix::stack(&table(2), &COLUMNS_TRAIN).unwrap();
        m.normalize(&metadata()).unwrap();

        assert!((m.data()[[0, 0]] - 0.2).abs() < 1e-6);
        assert!((m.data()[[1, 0]] - (60.0 - 21.0) / 87.0).abs() < 1e-6);
        assert!((m.data()[[3, 0]] - 0.51).abs() < 1e-6);
        assert_eq!(m.data()[[4, 1]], 1.0);
    }

    #[test]
    fn test_matrix_normalize_agrees_with_bounds() {
        let md = metadata();
        let mut m = FeatureMatrix::stack(&table(5), &COLUMNS_TRAIN).unwrap();
        let raw = m.clone();
        m.normalize(&md).unwrap();

        for (i, name) in m.names().iter().enumerate() {
            for j in 0..m.n_notes() {
                let expected = match md.bounds_for(name) {
                    Some(bounds) => bounds.normalize(name, raw.data()[[i, j]]).unwrap(),
                    None => raw.data()[[i, j]],
                };
                assert_eq!(m.data()[[i, j]], expected, "{name}[{j}]");
            }
        }
    }

    #[test]
    fn test_degenerate_bounds_fail_before_any_window() {
        let mut md = metadata();
        md.length_max = md.length_min;
        let result = make_dataset(&table(5), &COLUMNS_TRAIN, &COLUMNS_LABEL, &md);
        assert!(matches!(
            result,
            Err(VelocityError::DegenerateNormalizationRange { ref feature, .. }) if feature == "length"
        ));
    }

    #[test]
    fn test_window_count_and_padding() {
        for n in 1..=13 {
            let ds = make_dataset(&table(n), &COLUMNS_TRAIN, &COLUMNS_LABEL, &metadata()).unwrap();
            assert_eq!(ds.inputs.len(), (n + SAMPLE_LENGTH - 1) / SAMPLE_LENGTH);
            assert_eq!(ds.labels.len(), ds.inputs.len());
            for w in &ds.inputs {
                assert_eq!(w.data().shape(), &[SAMPLE_LENGTH, FEATURE_NUM]);
            }

            let last = ds.inputs.last().unwrap();
            let expected_filled = if n % SAMPLE_LENGTH == 0 { SAMPLE_LENGTH } else { n % SAMPLE_LENGTH };
            assert_eq!(last.filled(), expected_filled);
            for r in last.filled()..SAMPLE_LENGTH {
                assert!(last.data().row(r).iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn test_short_table_yields_one_padded_window() {
        let ds = make_dataset(&table(2), &COLUMNS_TRAIN, &COLUMNS_LABEL, &metadata()).unwrap();
        assert_eq!(ds.inputs.len(), 1);
        assert!(ds.inputs[0].is_padded());
        assert_eq!(ds.labels[0].data().shape(), &[SAMPLE_LENGTH, 1]);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let result = make_dataset(&table(0), &COLUMNS_TRAIN, &COLUMNS_LABEL, &metadata());
        assert!(matches!(result, Err(VelocityError::EmptyInput)));
    }

    #[test]
    fn test_windows_preserve_note_order() {
        let m = FeatureMatrix::stack(&table(6), &COLUMNS_TRAIN).unwrap();
        let windows: Vec<Window> = window_features(&m).collect();
        let views: Vec<ArrayView2<f32>> = windows.iter().map(|w| w.data().view()).collect();
        let all = ndarray::concatenate(Axis(0), &views).unwrap();

        assert_eq!(all.nrows(), 8);
        let pitches: Vec<f32> = all.column(1).iter().copied().take(6).collect();
        assert_eq!(pitches, vec![60.0, 61.0, 62.0, 63.0, 64.0, 65.0]);
    }

    #[test]
    fn test_window_rejects_wrong_height() {
        let result = Window::new(Array2::zeros((3, FEATURE_NUM)), 3);
        assert!(matches!(result, Err(VelocityError::ShapeMismatch { .. })));
    }
}
