//! The boundary between the mean-survival estimator and whatever learner
//! produces its survival curves.

use crate::curve::{CurveError, EventTimes, SurvivalPrediction};
use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors surfaced by survival learners while fitting or predicting.
#[derive(Debug, Error, PartialEq)]
pub enum LearnerError {
    #[error("this model has not been fitted yet; call fit before predicting")]
    NotFitted,
    #[error("feature matrix has {found} columns, but the model was fitted on {expected}")]
    FeatureDimensionMismatch { expected: usize, found: usize },
    #[error("feature matrix has {features} rows but {targets} survival targets were provided")]
    SampleCountMismatch { features: usize, targets: usize },
    #[error("time and event vectors have different lengths ({times} vs {events})")]
    TargetLengthMismatch { times: usize, events: usize },
    #[error("cannot fit a survival model on zero samples")]
    EmptyTrainingSet,
    #[error("feature matrix contains a non-finite value at row {row}, column {column}")]
    NonFiniteFeature { row: usize, column: usize },
    #[error("survival time {0} must be finite and non-negative")]
    InvalidTime(f64),
    #[error("training data contains no observed events; survival curves cannot be estimated")]
    NoEvents,
    #[error("invalid hyperparameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("survival curve error: {0}")]
    Curve(#[from] CurveError),
}

/// Right-censored survival outcomes: one observed time and event flag per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SurvivalTargets {
    time: Array1<f64>,
    event: Array1<bool>,
}

impl SurvivalTargets {
    pub fn new(time: Array1<f64>, event: Array1<bool>) -> Result<Self, LearnerError> {
        if time.len() != event.len() {
            return Err(LearnerError::TargetLengthMismatch {
                times: time.len(),
                events: event.len(),
            });
        }
        if time.is_empty() {
            return Err(LearnerError::EmptyTrainingSet);
        }
        if let Some(&bad) = time.iter().find(|&&t| !t.is_finite() || t < 0.0) {
            return Err(LearnerError::InvalidTime(bad));
        }
        Ok(Self { time, event })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    #[inline]
    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    #[inline]
    pub fn event(&self) -> ArrayView1<'_, bool> {
        self.event.view()
    }

    pub fn n_events(&self) -> usize {
        self.event.iter().filter(|&&e| e).count()
    }

    /// Times of the samples whose event was observed.
    pub fn observed_event_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.time
            .iter()
            .zip(self.event.iter())
            .filter_map(|(&t, &e)| e.then_some(t))
    }
}

/// A learner that estimates per-sample survival functions on a fixed grid of
/// event times established at fit time.
pub trait SurvivalLearner {
    /// Fits the learner, fixing its event-time grid.
    fn fit(&mut self, x: ArrayView2<'_, f64>, targets: &SurvivalTargets)
    -> Result<(), LearnerError>;

    /// The event-time grid every predicted curve is aligned with.
    fn event_times(&self) -> Result<&EventTimes, LearnerError>;

    /// Predicts survival curves for each row of `x`.
    ///
    /// With `return_array` the curves come back as a dense matrix; otherwise as
    /// one [`crate::curve::StepFunction`] per row.
    fn predict_survival_function(
        &self,
        x: ArrayView2<'_, f64>,
        return_array: bool,
    ) -> Result<SurvivalPrediction, LearnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn targets_validate_lengths_and_times() {
        assert_eq!(
            SurvivalTargets::new(array![1.0, 2.0], array![true]),
            Err(LearnerError::TargetLengthMismatch {
                times: 2,
                events: 1
            })
        );
        assert_eq!(
            SurvivalTargets::new(Array1::zeros(0), Array1::from_elem(0, false)),
            Err(LearnerError::EmptyTrainingSet)
        );
        assert_eq!(
            SurvivalTargets::new(array![1.0, -2.0], array![true, false]),
            Err(LearnerError::InvalidTime(-2.0))
        );
        assert!(SurvivalTargets::new(array![1.0, f64::NAN], array![true, false]).is_err());
    }

    #[test]
    fn observed_event_times_skip_censored_samples() {
        let targets =
            SurvivalTargets::new(array![5.0, 3.0, 8.0, 3.0], array![true, false, true, true])
                .unwrap();
        let observed: Vec<f64> = targets.observed_event_times().collect();
        assert_eq!(observed, vec![5.0, 8.0, 3.0]);
        assert_eq!(targets.n_events(), 3);
        assert_eq!(targets.len(), 4);
    }
}
