//! Mean-survival-time decorator over any [`SurvivalLearner`].
//!
//! The wrapped learner keeps its own fitting and curve estimation. This layer
//! forwards `fit` and `predict_surv` unchanged and adds
//! [`MeanSurvivalEstimator::predict_mean_survival_time`], which integrates the
//! predicted curves into expected survival times. It is kept apart from a
//! learner's native `predict`, which returns risk scores.

use crate::curve::{CurveError, EventTimes, SurvivalPrediction};
use crate::learner::{LearnerError, SurvivalLearner, SurvivalTargets};
use crate::mean_time::estimate_mean_survival_times;
use ndarray::{Array1, ArrayView2};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EstimatorError {
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error("mean survival time integration failed: {0}")]
    Curve(#[from] CurveError),
}

#[derive(Debug, Clone)]
pub struct MeanSurvivalEstimator<L> {
    learner: L,
    event_times: Option<EventTimes>,
}

impl<L: SurvivalLearner> MeanSurvivalEstimator<L> {
    /// Wraps `learner`. An already fitted learner (for example one restored
    /// from disk) yields a fitted estimator.
    pub fn new(learner: L) -> Self {
        let event_times = learner.event_times().ok().cloned();
        Self {
            learner,
            event_times,
        }
    }

    /// Fits the wrapped learner and captures its event-time grid.
    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        targets: &SurvivalTargets,
    ) -> Result<&mut Self, EstimatorError> {
        self.learner.fit(x, targets)?;
        self.event_times = Some(self.learner.event_times()?.clone());
        Ok(self)
    }

    /// Survival curves exactly as the wrapped learner produces them.
    pub fn predict_surv(
        &self,
        x: ArrayView2<'_, f64>,
        return_array: bool,
    ) -> Result<SurvivalPrediction, EstimatorError> {
        Ok(self.learner.predict_survival_function(x, return_array)?)
    }

    /// Expected survival time per row of `x`, in row order.
    pub fn predict_mean_survival_time(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<Array1<f64>, EstimatorError> {
        let prediction = self.predict_surv(x, true)?;
        let event_times = self.event_times.as_ref().ok_or(LearnerError::NotFitted)?;
        let curves = prediction.into_matrix(event_times)?;
        Ok(estimate_mean_survival_times(
            curves.view(),
            event_times.view(),
        )?)
    }

    pub fn is_fitted(&self) -> bool {
        self.event_times.is_some()
    }

    pub fn event_times(&self) -> Option<&EventTimes> {
        self.event_times.as_ref()
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn into_inner(self) -> L {
        self.learner
    }
}
