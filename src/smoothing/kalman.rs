//! Constant-velocity Kalman filter with Rauch-Tung-Striebel smoothing and
//! EM parameter fitting, for a single axis.
//!
//! State is `[position, velocity]`, observations are positions only. EM
//! re-estimates the process covariance, the observation variance and the
//! initial state from the smoothed posterior.

use log::{debug, warn};
use nalgebra::{Matrix2, RowVector2, Vector2};

/// Floor for fitted variances, keeps the filter well conditioned on
/// perfectly clean input.
const MIN_VARIANCE: f64 = 1e-9;

/// Fitted model parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ConstantVelocityModel {
    transition: Matrix2<f64>,
    process_cov: Matrix2<f64>,
    observation_var: f64,
    initial_mean: Vector2<f64>,
    initial_cov: Matrix2<f64>,
}

/// Forward pass output.
struct FilterPass {
    predicted_means: Vec<Vector2<f64>>,
    predicted_covs: Vec<Matrix2<f64>>,
    filtered_means: Vec<Vector2<f64>>,
    filtered_covs: Vec<Matrix2<f64>>,
}

/// Posterior state estimates.
pub(crate) struct SmoothedStates {
    pub means: Vec<Vector2<f64>>,
    pub covs: Vec<Matrix2<f64>>,
    /// `pair_covs[t]` is Cov(x_t, x_{t-1} | all observations); zero at t = 0.
    pub pair_covs: Vec<Matrix2<f64>>,
}

impl SmoothedStates {
    pub fn positions(&self) -> Vec<f64> {
        self.means.iter().map(|m| m[0]).collect()
    }
}

impl ConstantVelocityModel {
    /// Unit noise, zero initial velocity at the first observation.
    pub fn new(dt: f64, first_observation: f64) -> Self {
        Self {
            transition: Matrix2::new(1.0, dt, 0.0, 1.0),
            process_cov: Matrix2::identity(),
            observation_var: 1.0,
            initial_mean: Vector2::new(first_observation, 0.0),
            initial_cov: Matrix2::identity(),
        }
    }

    /// Fit noise parameters with `n_iter` rounds of expectation-maximization.
    pub fn fit(mut self, observations: &[f64], n_iter: usize) -> Self {
        if observations.len() < 2 {
            return self;
        }
        for iteration in 0..n_iter {
            let states = self.smooth(observations);
            self.maximize(observations, &states);
            debug!(
                "[Smoother] EM iteration {}: R={:.4}, Q=[{:.4}, {:.4}; {:.4}, {:.4}]",
                iteration,
                self.observation_var,
                self.process_cov[(0, 0)],
                self.process_cov[(0, 1)],
                self.process_cov[(1, 0)],
                self.process_cov[(1, 1)]
            );
        }
        self
    }

    /// Smoothed state estimates for every observation.
    pub fn smooth(&self, observations: &[f64]) -> SmoothedStates {
        let pass = self.filter(observations);
        let n = observations.len();

        let mut means = pass.filtered_means.clone();
        let mut covs = pass.filtered_covs.clone();
        let mut pair_covs = vec![Matrix2::zeros(); n];

        for t in (0..n.saturating_sub(1)).rev() {
            let predicted_cov = pass.predicted_covs[t + 1];
            let predicted_inv = predicted_cov.try_inverse().unwrap_or_else(|| {
                warn!("[Smoother] Singular predicted covariance at {}", t + 1);
                Matrix2::zeros()
            });
            let gain = pass.filtered_covs[t] * self.transition.transpose() * predicted_inv;

            means[t] = pass.filtered_means[t] + gain * (means[t + 1] - pass.predicted_means[t + 1]);
            covs[t] = symmetrize(
                pass.filtered_covs[t] + gain * (covs[t + 1] - predicted_cov) * gain.transpose(),
            );
            pair_covs[t + 1] = covs[t + 1] * gain.transpose();
        }

        SmoothedStates {
            means,
            covs,
            pair_covs,
        }
    }

    fn filter(&self, observations: &[f64]) -> FilterPass {
        let n = observations.len();
        let mut pass = FilterPass {
            predicted_means: Vec::with_capacity(n),
            predicted_covs: Vec::with_capacity(n),
            filtered_means: Vec::with_capacity(n),
            filtered_covs: Vec::with_capacity(n),
        };

        let mut mean = self.initial_mean;
        let mut cov = self.initial_cov;

        for (t, &y) in observations.iter().enumerate() {
            if t > 0 {
                mean = self.transition * mean;
                cov = symmetrize(self.transition * cov * self.transition.transpose() + self.process_cov);
            }
            pass.predicted_means.push(mean);
            pass.predicted_covs.push(cov);

            // Scalar position observation: H = [1, 0]
            let innovation_var = cov[(0, 0)] + self.observation_var;
            let gain = Vector2::new(cov[(0, 0)], cov[(1, 0)]) / innovation_var;
            mean += gain * (y - mean[0]);
            cov = symmetrize(cov - gain * RowVector2::new(cov[(0, 0)], cov[(0, 1)]));

            pass.filtered_means.push(mean);
            pass.filtered_covs.push(cov);
        }

        pass
    }

    /// M-step: closed-form parameter updates from the smoothed posterior.
    fn maximize(&mut self, observations: &[f64], states: &SmoothedStates) {
        let n = observations.len();

        let residual: f64 = observations
            .iter()
            .zip(states.means.iter().zip(&states.covs))
            .map(|(&y, (mean, cov))| (y - mean[0]).powi(2) + cov[(0, 0)])
            .sum();
        self.observation_var = (residual / n as f64).max(MIN_VARIANCE);

        let a = self.transition;
        let mut process = Matrix2::zeros();
        for t in 1..n {
            let err = states.means[t] - a * states.means[t - 1];
            let pair = states.pair_covs[t] * a.transpose();
            process += err * err.transpose() + a * states.covs[t - 1] * a.transpose()
                + states.covs[t]
                - pair
                - pair.transpose();
        }
        let mut process = symmetrize(process / (n - 1) as f64);
        process[(0, 0)] = process[(0, 0)].max(MIN_VARIANCE);
        process[(1, 1)] = process[(1, 1)].max(MIN_VARIANCE);
        self.process_cov = process;

        self.initial_mean = states.means[0];
        self.initial_cov = states.covs[0];
    }
}

fn symmetrize(m: Matrix2<f64>) -> Matrix2<f64> {
    (m + m.transpose()) * 0.5
}
