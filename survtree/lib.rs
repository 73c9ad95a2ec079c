#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod curve;
pub mod data;
pub mod estimator;
pub mod learner;
pub mod mean_time;
pub mod model;
pub mod tree;

pub use curve::{CurveError, EventTimes, StepFunction, SurvivalPrediction};
pub use estimator::{EstimatorError, MeanSurvivalEstimator};
pub use learner::{LearnerError, SurvivalLearner, SurvivalTargets};
pub use mean_time::estimate_mean_survival_times;
pub use model::{ModelError, TrainedModel};
pub use tree::{SurvivalTree, TreeParams};
