//! Event-time grids and the two shapes a survival prediction can take.
//!
//! A fitted learner owns one [`EventTimes`] grid. Every survival curve it
//! predicts is aligned index-for-index with that grid, either materialised as
//! a row of an `N x T` matrix or wrapped in a lazily evaluable [`StepFunction`].

use crate::mean_time::integrate_curve;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or evaluating survival curves.
#[derive(Debug, Error, PartialEq)]
pub enum CurveError {
    #[error("event time sequence must contain at least one time point")]
    EmptyEventTimes,
    #[error("event time {0} is not finite")]
    NonFiniteEventTime(f64),
    #[error("event times must be strictly increasing (violated at index {index})")]
    UnorderedEventTimes { index: usize },
    #[error("survival curve has {found} time points but the event grid has {expected}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("time {time} is outside the survival function domain [0, {upper}]")]
    OutOfDomain { time: f64, upper: f64 },
}

/// Strictly increasing, distinct times at which events were observed during fit.
///
/// Cloning is cheap: every clone shares the same read-only buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EventTimes {
    values: Arc<[f64]>,
}

impl EventTimes {
    /// Wraps an already sorted grid, rejecting empty, non-finite or unordered input.
    pub fn new(values: Vec<f64>) -> Result<Self, CurveError> {
        if values.is_empty() {
            return Err(CurveError::EmptyEventTimes);
        }
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CurveError::NonFiniteEventTime(bad));
        }
        if let Some(index) = values.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(CurveError::UnorderedEventTimes { index: index + 1 });
        }
        Ok(Self {
            values: values.into(),
        })
    }

    /// Builds the grid from raw observed event times (any order, duplicates allowed).
    pub fn from_observed<I>(times: I) -> Result<Self, CurveError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values: Vec<f64> = times.into_iter().collect();
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(CurveError::NonFiniteEventTime(bad));
        }
        values.sort_by(f64::total_cmp);
        values.dedup();
        Self::new(values)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed grid; present for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.values[..])
    }

    /// The last observed event time, which bounds every step function's domain.
    #[inline]
    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Number of grid points less than or equal to `time`.
    #[inline]
    pub fn count_at_or_before(&self, time: f64) -> usize {
        self.values.partition_point(|&t| t <= time)
    }
}

impl TryFrom<Vec<f64>> for EventTimes {
    type Error = CurveError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<EventTimes> for Vec<f64> {
    fn from(times: EventTimes) -> Self {
        times.values.to_vec()
    }
}

/// Survival curve of one sample, evaluable at arbitrary times inside its domain.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFunction {
    times: EventTimes,
    survival: Array1<f64>,
}

impl StepFunction {
    pub fn new(times: EventTimes, survival: Array1<f64>) -> Result<Self, CurveError> {
        if survival.len() != times.len() {
            return Err(CurveError::ShapeMismatch {
                expected: times.len(),
                found: survival.len(),
            });
        }
        Ok(Self { times, survival })
    }

    pub fn times(&self) -> &EventTimes {
        &self.times
    }

    pub fn survival(&self) -> ArrayView1<'_, f64> {
        self.survival.view()
    }

    /// Survival probability at `time`.
    ///
    /// The curve is 1 before the first event time and holds `s_k` on
    /// `[t_k, t_{k+1})`. Nothing is known past the last event time, so the
    /// domain is `[0, t_T]`.
    pub fn evaluate(&self, time: f64) -> Result<f64, CurveError> {
        let upper = self.times.last();
        if !time.is_finite() || time < 0.0 || time > upper {
            return Err(CurveError::OutOfDomain { time, upper });
        }
        match self.times.count_at_or_before(time) {
            0 => Ok(1.0),
            reached => Ok(self.survival[reached - 1]),
        }
    }

    pub fn evaluate_many(&self, times: ArrayView1<'_, f64>) -> Result<Array1<f64>, CurveError> {
        times.iter().map(|&t| self.evaluate(t)).collect()
    }

    /// Mean survival time of this curve, using the same rule as
    /// [`crate::mean_time::estimate_mean_survival_times`].
    pub fn mean_survival_time(&self) -> f64 {
        integrate_curve(self.survival.view(), self.times.view())
    }
}

/// Output of `predict_survival_function`, selected by its `return_array` flag.
#[derive(Debug, Clone, PartialEq)]
pub enum SurvivalPrediction {
    /// Dense `N x T` matrix aligned with the learner's event times.
    Array(Array2<f64>),
    /// One lazily evaluable step function per sample.
    StepFunctions(Vec<StepFunction>),
}

impl SurvivalPrediction {
    pub fn len(&self) -> usize {
        match self {
            SurvivalPrediction::Array(matrix) => matrix.nrows(),
            SurvivalPrediction::StepFunctions(functions) => functions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialises the prediction as a survival matrix on the `times` grid.
    pub fn into_matrix(self, times: &EventTimes) -> Result<Array2<f64>, CurveError> {
        match self {
            SurvivalPrediction::Array(matrix) => {
                if matrix.ncols() != times.len() {
                    return Err(CurveError::ShapeMismatch {
                        expected: times.len(),
                        found: matrix.ncols(),
                    });
                }
                Ok(matrix)
            }
            SurvivalPrediction::StepFunctions(functions) => {
                let mut matrix = Array2::<f64>::zeros((functions.len(), times.len()));
                for (mut row, function) in matrix.rows_mut().into_iter().zip(&functions) {
                    if function.survival.len() != times.len() {
                        return Err(CurveError::ShapeMismatch {
                            expected: times.len(),
                            found: function.survival.len(),
                        });
                    }
                    row.assign(&function.survival);
                }
                Ok(matrix)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn grid() -> EventTimes {
        EventTimes::new(vec![1.0, 2.0, 4.0]).unwrap()
    }

    #[test]
    fn observed_times_are_sorted_and_deduplicated() {
        let times = EventTimes::from_observed([4.0, 1.0, 2.0, 1.0, 4.0]).unwrap();
        assert_eq!(times.as_slice(), &[1.0, 2.0, 4.0]);
    }

    #[test]
    fn grid_rejects_bad_input() {
        assert_eq!(EventTimes::new(vec![]), Err(CurveError::EmptyEventTimes));
        assert_eq!(
            EventTimes::new(vec![1.0, 1.0]),
            Err(CurveError::UnorderedEventTimes { index: 1 })
        );
        assert!(matches!(
            EventTimes::from_observed([1.0, f64::NAN]),
            Err(CurveError::NonFiniteEventTime(_))
        ));
    }

    #[test]
    fn step_function_holds_value_until_next_event() {
        let function = StepFunction::new(grid(), array![0.8, 0.5, 0.1]).unwrap();
        assert_abs_diff_eq!(function.evaluate(0.0).unwrap(), 1.0);
        assert_abs_diff_eq!(function.evaluate(0.999).unwrap(), 1.0);
        assert_abs_diff_eq!(function.evaluate(1.0).unwrap(), 0.8);
        assert_abs_diff_eq!(function.evaluate(3.5).unwrap(), 0.5);
        assert_abs_diff_eq!(function.evaluate(4.0).unwrap(), 0.1);
    }

    #[test]
    fn step_function_rejects_times_outside_domain() {
        let function = StepFunction::new(grid(), array![0.8, 0.5, 0.1]).unwrap();
        assert_eq!(
            function.evaluate(4.5),
            Err(CurveError::OutOfDomain {
                time: 4.5,
                upper: 4.0
            })
        );
        assert!(function.evaluate(-0.1).is_err());
        assert!(function.evaluate(f64::INFINITY).is_err());
        assert!(function.evaluate_many(array![0.5, 5.0].view()).is_err());
    }

    #[test]
    fn step_function_requires_matching_length() {
        let err = StepFunction::new(grid(), array![1.0, 0.5]).unwrap_err();
        assert_eq!(
            err,
            CurveError::ShapeMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn step_functions_materialise_to_matrix() {
        let rows = vec![
            StepFunction::new(grid(), array![0.9, 0.6, 0.3]).unwrap(),
            StepFunction::new(grid(), array![1.0, 1.0, 0.5]).unwrap(),
        ];
        let matrix = SurvivalPrediction::StepFunctions(rows)
            .into_matrix(&grid())
            .unwrap();
        assert_eq!(matrix, array![[0.9, 0.6, 0.3], [1.0, 1.0, 0.5]]);
    }

    #[test]
    fn matrix_with_wrong_width_is_rejected() {
        let prediction = SurvivalPrediction::Array(Array2::zeros((2, 2)));
        assert!(matches!(
            prediction.into_matrix(&grid()),
            Err(CurveError::ShapeMismatch {
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn grid_survives_toml_round_trip() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            times: EventTimes,
        }
        let text = toml::to_string(&Holder { times: grid() }).unwrap();
        let restored: Holder = toml::from_str(&text).unwrap();
        assert_eq!(restored.times, grid());

        let unordered: Result<Holder, _> = toml::from_str("times = [2.0, 1.0]");
        assert!(unordered.is_err());
    }
}
