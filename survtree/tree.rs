//! # Survival Tree
//!
//! A binary CART-style tree for right-censored outcomes.
//!
//! - Splits maximise the standardised log-rank statistic between the left
//!   child and the pooled node, so each split separates samples whose event
//!   hazards differ the most.
//! - Each leaf stores the Kaplan-Meier estimate of its training samples,
//!   evaluated on the global grid of observed event times. Predicting a row
//!   means routing it to a leaf and returning that curve.
//! - The search over features runs on the rayon pool. Candidates are reduced
//!   with a total preference order, so the fitted tree does not depend on
//!   scheduling.

use crate::curve::{EventTimes, StepFunction, SurvivalPrediction};
use crate::learner::{LearnerError, SurvivalLearner, SurvivalTargets};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Growth limits for a [`SurvivalTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Maximum depth of the tree; `None` grows until the other limits stop it.
    pub max_depth: Option<usize>,
    /// Minimum number of samples a node needs before a split is attempted.
    pub min_samples_split: usize,
    /// Minimum number of samples each child of a split must keep.
    pub min_samples_leaf: usize,
    /// Upper bound on the number of leaves; `None` means unbounded.
    pub max_leaf_nodes: Option<usize>,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 6,
            min_samples_leaf: 3,
            max_leaf_nodes: None,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<(), LearnerError> {
        if self.min_samples_split < 2 {
            return Err(LearnerError::InvalidParameter {
                name: "min_samples_split",
                reason: format!("must be at least 2, got {}", self.min_samples_split),
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(LearnerError::InvalidParameter {
                name: "min_samples_leaf",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_depth == Some(0) {
            return Err(LearnerError::InvalidParameter {
                name: "max_depth",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        if let Some(leaves) = self.max_leaf_nodes {
            if leaves < 2 {
                return Err(LearnerError::InvalidParameter {
                    name: "max_leaf_nodes",
                    reason: format!("must be at least 2 when set, got {leaves}"),
                });
            }
        }
        Ok(())
    }
}

/// Internal decision node. Rows with `x[feature_idx] <= threshold` go left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitNode {
    pub feature_idx: usize,
    pub threshold: f64,
    /// Standardised log-rank statistic achieved by this split.
    pub statistic: f64,
    pub left: Box<TreeNode>,
    pub right: Box<TreeNode>,
}

/// Terminal node holding the Kaplan-Meier curve of its training samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
    pub survival: Vec<f64>,
    pub n_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split(SplitNode),
    Leaf(LeafNode),
}

impl TreeNode {
    /// Leaves have depth 0.
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Split(node) => 1 + node.left.depth().max(node.right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 1,
            TreeNode::Split(node) => node.left.n_leaves() + node.right.n_leaves(),
        }
    }

    fn route(&self, row: ArrayView1<'_, f64>) -> &LeafNode {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf(leaf) => return leaf,
                TreeNode::Split(split) => {
                    node = if row[split.feature_idx] <= split.threshold {
                        split.left.as_ref()
                    } else {
                        split.right.as_ref()
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedTree {
    event_times: EventTimes,
    n_features: usize,
    root: TreeNode,
}

/// Survival tree learner. Starts unfitted; [`SurvivalLearner::fit`] grows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurvivalTree {
    params: TreeParams,
    fitted: Option<FittedTree>,
}

impl SurvivalTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn root(&self) -> Result<&TreeNode, LearnerError> {
        Ok(&self.fitted()?.root)
    }

    pub fn depth(&self) -> Result<usize, LearnerError> {
        Ok(self.root()?.depth())
    }

    pub fn n_leaves(&self) -> Result<usize, LearnerError> {
        Ok(self.root()?.n_leaves())
    }

    pub fn n_features(&self) -> Result<usize, LearnerError> {
        Ok(self.fitted()?.n_features)
    }

    fn fitted(&self) -> Result<&FittedTree, LearnerError> {
        self.fitted.as_ref().ok_or(LearnerError::NotFitted)
    }
}

impl SurvivalLearner for SurvivalTree {
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        targets: &SurvivalTargets,
    ) -> Result<(), LearnerError> {
        self.params.validate()?;
        if x.nrows() != targets.len() {
            return Err(LearnerError::SampleCountMismatch {
                features: x.nrows(),
                targets: targets.len(),
            });
        }
        check_finite(x)?;
        if targets.n_events() == 0 {
            return Err(LearnerError::NoEvents);
        }
        let event_times = EventTimes::from_observed(targets.observed_event_times())?;

        log::info!(
            "Growing survival tree on {} samples x {} features ({} events at {} distinct times)",
            x.nrows(),
            x.ncols(),
            targets.n_events(),
            event_times.len()
        );

        let root = {
            let mut builder = TreeBuilder {
                x,
                time: targets.time(),
                event: targets.event(),
                event_times: &event_times,
                params: &self.params,
                n_leaves: 1,
            };
            builder.grow((0..x.nrows()).collect(), 0)
        };

        let leaves = root.n_leaves();
        if leaves == 1 {
            log::warn!("No admissible split found; the survival tree is a single leaf");
        }
        log::info!(
            "Survival tree fitted: depth {}, {} leaves",
            root.depth(),
            leaves
        );

        self.fitted = Some(FittedTree {
            event_times,
            n_features: x.ncols(),
            root,
        });
        Ok(())
    }

    fn event_times(&self) -> Result<&EventTimes, LearnerError> {
        Ok(&self.fitted()?.event_times)
    }

    fn predict_survival_function(
        &self,
        x: ArrayView2<'_, f64>,
        return_array: bool,
    ) -> Result<SurvivalPrediction, LearnerError> {
        let fitted = self.fitted()?;
        if x.ncols() != fitted.n_features {
            return Err(LearnerError::FeatureDimensionMismatch {
                expected: fitted.n_features,
                found: x.ncols(),
            });
        }
        check_finite(x)?;

        let leaves: Vec<&LeafNode> = (0..x.nrows())
            .into_par_iter()
            .map(|i| fitted.root.route(x.row(i)))
            .collect();

        if return_array {
            let mut curves = Array2::<f64>::zeros((leaves.len(), fitted.event_times.len()));
            for (mut row, leaf) in curves.rows_mut().into_iter().zip(&leaves) {
                row.assign(&ArrayView1::from(&leaf.survival[..]));
            }
            Ok(SurvivalPrediction::Array(curves))
        } else {
            let functions = leaves
                .into_iter()
                .map(|leaf| {
                    StepFunction::new(
                        fitted.event_times.clone(),
                        Array1::from(leaf.survival.clone()),
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SurvivalPrediction::StepFunctions(functions))
        }
    }
}

fn check_finite(x: ArrayView2<'_, f64>) -> Result<(), LearnerError> {
    match x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, column), _)) => Err(LearnerError::NonFiniteFeature { row, column }),
        None => Ok(()),
    }
}

/// Best split found for a node.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature_idx: usize,
    threshold: f64,
    statistic: f64,
}

impl Candidate {
    /// Higher statistic wins; ties go to the lower feature index, then the
    /// lower threshold.
    fn prefer(self, other: Candidate) -> Candidate {
        let ordering = self
            .statistic
            .total_cmp(&other.statistic)
            .then_with(|| other.feature_idx.cmp(&self.feature_idx))
            .then_with(|| other.threshold.total_cmp(&self.threshold));
        if ordering.is_ge() { self } else { other }
    }
}

/// Node-local risk set, with samples grouped by identical observed time in
/// ascending order. Members are positions into the node's index list.
struct RiskSet {
    groups: Vec<RiskGroup>,
    observed: Vec<bool>,
}

struct RiskGroup {
    members: Vec<usize>,
    deaths: usize,
}

impl RiskSet {
    fn new(indices: &[usize], time: ArrayView1<'_, f64>, event: ArrayView1<'_, bool>) -> Self {
        let observed: Vec<bool> = indices.iter().map(|&i| event[i]).collect();
        let groups = (0..indices.len())
            .sorted_by(|&a, &b| time[indices[a]].total_cmp(&time[indices[b]]))
            .chunk_by(|&pos| time[indices[pos]].to_bits())
            .into_iter()
            .map(|(_, chunk)| {
                let members: Vec<usize> = chunk.collect();
                let deaths = members.iter().filter(|&&m| observed[m]).count();
                RiskGroup { members, deaths }
            })
            .collect();
        Self { groups, observed }
    }

    /// Standardised log-rank statistic of the samples flagged in `in_left`
    /// against the whole risk set.
    fn log_rank(&self, in_left: &[bool], n_left: usize) -> f64 {
        let mut at_risk = self.observed.len() as f64;
        let mut at_risk_left = n_left as f64;
        let mut observed_minus_expected = 0.0;
        let mut variance = 0.0;

        for group in &self.groups {
            let mut size_left = 0usize;
            let mut deaths_left = 0usize;
            for &m in &group.members {
                if in_left[m] {
                    size_left += 1;
                    if self.observed[m] {
                        deaths_left += 1;
                    }
                }
            }

            if group.deaths > 0 {
                let deaths = group.deaths as f64;
                let ratio = at_risk_left / at_risk;
                observed_minus_expected += deaths_left as f64 - deaths * ratio;
                if at_risk > 1.0 {
                    variance += deaths * ratio * (1.0 - ratio) * (at_risk - deaths) / (at_risk - 1.0);
                }
            }

            at_risk -= group.members.len() as f64;
            at_risk_left -= size_left as f64;
        }

        if variance > 0.0 {
            observed_minus_expected.abs() / variance.sqrt()
        } else {
            0.0
        }
    }
}

/// Recursive grower over the borrowed inputs of one fit.
struct TreeBuilder<'a, 't, 'g> {
    x: ArrayView2<'a, f64>,
    time: ArrayView1<'t, f64>,
    event: ArrayView1<'t, bool>,
    event_times: &'g EventTimes,
    params: &'g TreeParams,
    n_leaves: usize,
}

impl TreeBuilder<'_, '_, '_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let depth_exhausted = self.params.max_depth.is_some_and(|max| depth >= max);
        let budget_exhausted = self
            .params
            .max_leaf_nodes
            .is_some_and(|max| self.n_leaves >= max);
        if depth_exhausted || budget_exhausted || indices.len() < self.params.min_samples_split {
            return self.leaf(&indices);
        }

        let candidate = match self.best_split(&indices) {
            Some(candidate) => candidate,
            None => return self.leaf(&indices),
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x[[i, candidate.feature_idx]] <= candidate.threshold);
        if left.is_empty() || right.is_empty() {
            return self.leaf(&indices);
        }

        log::debug!(
            "depth {depth}: split feature {} at {:.6} (log-rank {:.4}) -> {} | {}",
            candidate.feature_idx,
            candidate.threshold,
            candidate.statistic,
            left.len(),
            right.len()
        );

        self.n_leaves += 1;
        let left = self.grow(left, depth + 1);
        let right = self.grow(right, depth + 1);
        TreeNode::Split(SplitNode {
            feature_idx: candidate.feature_idx,
            threshold: candidate.threshold,
            statistic: candidate.statistic,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn best_split(&self, indices: &[usize]) -> Option<Candidate> {
        let risk = RiskSet::new(indices, self.time, self.event);
        (0..self.x.ncols())
            .into_par_iter()
            .filter_map(|feature_idx| self.best_split_for_feature(feature_idx, indices, &risk))
            .reduce_with(Candidate::prefer)
    }

    fn best_split_for_feature(
        &self,
        feature_idx: usize,
        indices: &[usize],
        risk: &RiskSet,
    ) -> Option<Candidate> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf;
        let column = self.x.column(feature_idx);
        let order: Vec<usize> = (0..n)
            .sorted_by(|&a, &b| column[indices[a]].total_cmp(&column[indices[b]]))
            .collect();

        let mut in_left = vec![false; n];
        let mut best: Option<Candidate> = None;
        for split_at in 1..n {
            in_left[order[split_at - 1]] = true;
            let lower = column[indices[order[split_at - 1]]];
            let upper = column[indices[order[split_at]]];
            if lower == upper || split_at < min_leaf || n - split_at < min_leaf {
                continue;
            }
            let statistic = risk.log_rank(&in_left, split_at);
            if statistic <= 0.0 {
                continue;
            }
            let candidate = Candidate {
                feature_idx,
                threshold: midpoint_threshold(lower, upper),
                statistic,
            };
            best = Some(match best {
                Some(current) => current.prefer(candidate),
                None => candidate,
            });
        }
        best
    }

    fn leaf(&self, indices: &[usize]) -> TreeNode {
        TreeNode::Leaf(LeafNode {
            survival: kaplan_meier(indices, self.time, self.event, self.event_times),
            n_samples: indices.len(),
        })
    }
}

/// Threshold strictly separating `lower` from `upper`. The midpoint of two
/// adjacent floats can round up to `upper`, which would send `upper` left.
fn midpoint_threshold(lower: f64, upper: f64) -> f64 {
    let threshold = lower + (upper - lower) / 2.0;
    if threshold >= upper { lower } else { threshold }
}

/// Product-limit estimate of the survival function of `indices`, evaluated at
/// every point of `grid`. Grid points past the last sample keep the final value.
fn kaplan_meier(
    indices: &[usize],
    time: ArrayView1<'_, f64>,
    event: ArrayView1<'_, bool>,
    grid: &EventTimes,
) -> Vec<f64> {
    let width = grid.len();
    let mut deaths = vec![0usize; width];
    // exits[r] counts samples that reach exactly r grid points; they leave the
    // risk set before grid point r.
    let mut exits = vec![0usize; width + 1];
    for &i in indices {
        let reached = grid.count_at_or_before(time[i]);
        exits[reached] += 1;
        if event[i] && reached > 0 {
            deaths[reached - 1] += 1;
        }
    }

    let mut at_risk = indices.len();
    let mut survival = 1.0;
    let mut curve = Vec::with_capacity(width);
    for k in 0..width {
        at_risk -= exits[k];
        if at_risk > 0 {
            survival *= 1.0 - deaths[k] as f64 / at_risk as f64;
        }
        curve.push(survival);
    }
    curve
}
