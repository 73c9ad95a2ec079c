//! # Mean Survival Time
//!
//! Converts step-function survival curves into expected survival times.
//!
//! A curve `s_1 >= s_2 >= ... >= s_T` on event times `t_1 < ... < t_T` is read
//! as a step function that drops from `s_k` to `s_{k+1}` at `t_{k+1}`. The mass
//! `s_k - s_{k+1}` that dies inside `[t_k, t_{k+1}]` is placed at the interval
//! midpoint, and the mass still alive at `t_T` is placed at `t_T`:
//!
//! ```text
//! mean = sum_{k=1}^{T-1} (t_k + t_{k+1}) / 2 * (s_k - s_{k+1})  +  t_T * s_T
//! ```
//!
//! The tail term carries no extrapolation past the last observed event, so the
//! estimate is biased low whenever a curve has not reached zero by `t_T`.

use crate::curve::CurveError;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip, s};

/// Estimates one mean survival time per row of `curves`.
///
/// `curves` is `N x T` with columns aligned to `event_times`. The grid is
/// trusted to be strictly increasing. Row order is preserved.
pub fn estimate_mean_survival_times(
    curves: ArrayView2<'_, f64>,
    event_times: ArrayView1<'_, f64>,
) -> Result<Array1<f64>, CurveError> {
    if event_times.is_empty() {
        return Err(CurveError::EmptyEventTimes);
    }
    if curves.ncols() != event_times.len() {
        return Err(CurveError::ShapeMismatch {
            expected: event_times.len(),
            found: curves.ncols(),
        });
    }

    Ok(curves
        .rows()
        .into_iter()
        .map(|row| integrate_curve(row, event_times))
        .collect())
}

/// Applies the midpoint rule to a single curve. Callers guarantee equal,
/// non-zero lengths.
pub(crate) fn integrate_curve(survival: ArrayView1<'_, f64>, times: ArrayView1<'_, f64>) -> f64 {
    let last = times.len() - 1;
    let interior = Zip::from(times.slice(s![..last]))
        .and(times.slice(s![1..]))
        .and(survival.slice(s![..last]))
        .and(survival.slice(s![1..]))
        .fold(0.0, |acc, &t0, &t1, &s0, &s1| acc + (t0 + t1) * (s0 - s1));
    interior / 2.0 + times[last] * survival[last]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    #[test]
    fn single_event_time_uses_tail_only() {
        let times = array![3.5];
        let curves = array![[0.4], [1.0], [0.0]];
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert_eq!(means, array![3.5 * 0.4, 3.5, 0.0]);
    }

    #[test]
    fn curve_without_deaths_sits_at_last_time() {
        let times = array![0.5, 2.0, 7.25, 9.0];
        let curves = Array2::<f64>::ones((1, 4));
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert_eq!(means[0], 9.0);
    }

    #[test]
    fn immediate_drop_lands_on_first_midpoint() {
        let times = array![1.0, 2.0, 5.0, 11.0];
        let curves = array![[1.0, 0.0, 0.0, 0.0]];
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert_eq!(means[0], (1.0 + 2.0) / 2.0);
    }

    #[test]
    fn moving_mass_between_intervals_shifts_by_midpoint_distance() {
        let times = array![1.0, 2.0, 3.0];
        let curves = array![[1.0, 0.5, 0.0], [1.0, 1.0, 0.0]];
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert_abs_diff_eq!(means[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(means[1], 2.5, epsilon = 1e-12);
        // 0.5 of mass moved from midpoint 1.5 to midpoint 2.5
        assert_abs_diff_eq!(means[1] - means[0], 0.5 * (2.5 - 1.5), epsilon = 1e-12);
    }

    #[test]
    fn rows_keep_input_order() {
        let times = array![1.0, 2.0, 3.0];
        let curves = array![[1.0, 1.0, 1.0], [1.0, 0.0, 0.0], [1.0, 0.5, 0.0]];
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert_eq!(means.len(), 3);
        assert_abs_diff_eq!(means[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(means[1], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(means[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_batch_gives_empty_result() {
        let times = array![1.0, 2.0];
        let curves = Array2::<f64>::zeros((0, 2));
        let means = estimate_mean_survival_times(curves.view(), times.view()).unwrap();
        assert!(means.is_empty());
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let times = array![1.0, 2.0, 3.0];
        let curves = array![[1.0, 0.5]];
        let err = estimate_mean_survival_times(curves.view(), times.view()).unwrap_err();
        assert_eq!(
            err,
            CurveError::ShapeMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn empty_grid_is_rejected() {
        let times = Array1::<f64>::zeros(0);
        let curves = Array2::<f64>::zeros((2, 0));
        let err = estimate_mean_survival_times(curves.view(), times.view()).unwrap_err();
        assert_eq!(err, CurveError::EmptyEventTimes);
    }
}
