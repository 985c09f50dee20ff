use std::sync::atomic::{AtomicBool, Ordering};

use glam::DMat4;
use serde::{Deserialize, Serialize};

use crate::correspondence::find_correspondences;
use crate::error::IcpError;
use crate::ops::{is_rigid, rigid_inverse, rotation_to_array, translation_to_array};
use crate::point_plane::{minimize_point_plane, DegeneracyPolicy};
use crate::pointcloud::PointCloudNormal;
use crate::selection::{select_data_points, select_model_points};
use crate::spatial_index::{KdTreeIndex, SpatialIndex};

/// Minimum number of points in the input clouds, the selected clouds and the
/// correspondences.
pub const MIN_POINTS: usize = 4;

// tolerance of the orthonormality check on the composed transformation
const RIGID_TOLERANCE: f64 = 1e-6;

/// Parameters of the point-to-plane ICP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Convergence threshold on the change of fitness between two iterations.
    pub epsilon: f64,
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Minimum fraction of selected data points with a correspondence, in `[0, 1]`.
    pub min_overlap: f64,
    /// Maximum mean squared distance of the correspondences for a successful registration.
    pub max_fitness: f64,
    /// The outlier threshold is this factor times the last fitness.
    pub distance_threshold_factor: f64,
    /// Minimum cosine between the normals of a correspondence.
    pub normals_threshold_cosine: f64,
    /// Fail with [`IcpError::SolverDegenerate`] instead of propagating a
    /// degenerate point-to-plane update.
    pub reject_degenerate: bool,
    /// Reciprocal condition below which the update is degenerate. Only used
    /// with `reject_degenerate`.
    pub degenerate_rcond: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            max_iterations: 50,
            min_overlap: 0.75,
            max_fitness: 1e-5,
            distance_threshold_factor: 9.0,
            normals_threshold_cosine: 0.7,
            reject_degenerate: false,
            degenerate_rcond: 1e-12,
        }
    }
}

impl IcpConfig {
    /// Builder-style setter for the convergence threshold.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Builder-style setter for the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Builder-style setter for the minimum overlap.
    pub fn with_min_overlap(mut self, min_overlap: f64) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    /// Builder-style setter for the maximum fitness.
    pub fn with_max_fitness(mut self, max_fitness: f64) -> Self {
        self.max_fitness = max_fitness;
        self
    }

    /// Builder-style setter for the outlier threshold factor.
    pub fn with_distance_threshold_factor(mut self, factor: f64) -> Self {
        self.distance_threshold_factor = factor;
        self
    }

    /// Builder-style setter for the normals agreement threshold.
    pub fn with_normals_threshold_cosine(mut self, cosine: f64) -> Self {
        self.normals_threshold_cosine = cosine;
        self
    }

    /// Builder-style setter for rejecting degenerate updates.
    pub fn with_reject_degenerate(mut self, reject: bool) -> Self {
        self.reject_degenerate = reject;
        self
    }

    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<(), IcpError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(IcpError::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(IcpError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_overlap) {
            return Err(IcpError::InvalidConfig(format!(
                "min_overlap must be in [0, 1], got {}",
                self.min_overlap
            )));
        }
        if self.max_fitness.is_nan() || self.max_fitness < 0.0 {
            return Err(IcpError::InvalidConfig(format!(
                "max_fitness must be non-negative, got {}",
                self.max_fitness
            )));
        }
        if !(self.distance_threshold_factor.is_finite() && self.distance_threshold_factor > 0.0) {
            return Err(IcpError::InvalidConfig(format!(
                "distance_threshold_factor must be positive, got {}",
                self.distance_threshold_factor
            )));
        }
        if !(-1.0..=1.0).contains(&self.normals_threshold_cosine) {
            return Err(IcpError::InvalidConfig(format!(
                "normals_threshold_cosine must be in [-1, 1], got {}",
                self.normals_threshold_cosine
            )));
        }
        if self.reject_degenerate && (self.degenerate_rcond.is_nan() || self.degenerate_rcond < 0.0) {
            return Err(IcpError::InvalidConfig(format!(
                "degenerate_rcond must be non-negative, got {}",
                self.degenerate_rcond
            )));
        }
        Ok(())
    }

    fn degeneracy_policy(&self) -> DegeneracyPolicy {
        if self.reject_degenerate {
            DegeneracyPolicy::Reject(self.degenerate_rcond)
        } else {
            DegeneracyPolicy::Propagate
        }
    }
}

/// State of the registration loop.
#[derive(Debug, Clone)]
pub struct IterationState {
    /// Current estimate of the transformation from the data to the model frame.
    pub transformation: DMat4,
    /// Mean squared distance of the correspondences of the last iteration.
    ///
    /// Computed before the update of that iteration is applied.
    pub fitness: f64,
    /// Fitness of the iteration before.
    pub previous_fitness: f64,
    /// Absolute change between `previous_fitness` and `fitness`.
    pub delta_fitness: f64,
    /// Squared distance above which a match is an outlier.
    pub squared_distance_threshold: f64,
    /// Current iteration, starting at 1.
    pub iteration: usize,
    /// Fraction of selected data points with a correspondence.
    pub overlap: f64,
}

impl IterationState {
    /// Create the state of a registration starting at `initial`.
    pub fn new(initial: DMat4) -> Self {
        Self {
            transformation: initial,
            fitness: 0.0,
            previous_fitness: f64::MAX,
            delta_fitness: f64::MAX,
            squared_distance_threshold: f64::INFINITY,
            iteration: 1,
            overlap: f64::NAN,
        }
    }

    /// Update the fitness, outlier threshold and overlap from the correspondences
    /// of the current iteration.
    ///
    /// # Arguments
    ///
    /// * `squared_distance_sum` - Sum of the squared distances of the correspondences.
    /// * `num_correspondences` - Number of correspondences, must be positive.
    /// * `num_data` - Number of selected data points.
    /// * `distance_threshold_factor` - Factor applied to the fitness to get the threshold.
    pub fn update(
        &mut self,
        squared_distance_sum: f64,
        num_correspondences: usize,
        num_data: usize,
        distance_threshold_factor: f64,
    ) {
        self.previous_fitness = self.fitness;
        self.fitness = squared_distance_sum / num_correspondences as f64;
        self.delta_fitness = (self.previous_fitness - self.fitness).abs();
        self.squared_distance_threshold = distance_threshold_factor * self.fitness;
        self.overlap = num_correspondences as f64 / num_data as f64;
    }

    /// Check whether the loop is done, advancing the iteration counter otherwise.
    ///
    /// Returns `true` when the fitness converged or the iteration limit was passed.
    pub fn advance(&mut self, config: &IcpConfig) -> bool {
        if self.delta_fitness < config.epsilon {
            return true;
        }
        self.iteration += 1;
        self.iteration > config.max_iterations
    }

    /// Classify the outcome of a finished loop.
    ///
    /// The bounds on iterations, overlap and fitness are checked in this order
    /// and override the reason the loop stopped.
    pub fn classify(&self, config: &IcpConfig) -> Result<(), IcpError> {
        if self.iteration > config.max_iterations {
            return Err(IcpError::ExceededIterations {
                max_iterations: config.max_iterations,
            });
        }
        // NaN overlap means no iteration ran
        if self.overlap.is_nan() || self.overlap < config.min_overlap {
            return Err(IcpError::InsufficientOverlap {
                overlap: self.overlap,
                min_overlap: config.min_overlap,
            });
        }
        if self.fitness > config.max_fitness {
            return Err(IcpError::ExceededFitness {
                fitness: self.fitness,
                max_fitness: config.max_fitness,
            });
        }
        if self.delta_fitness <= config.epsilon {
            return Ok(());
        }
        Err(IcpError::InvariantViolation(format!(
            "loop stopped at iteration {} with delta fitness {} > epsilon {}",
            self.iteration, self.delta_fitness, config.epsilon
        )))
    }

    fn log_summary(&self, config: &IcpConfig) {
        let flag = |bad: bool| if bad { " <--" } else { "" };
        log::debug!(
            "Registration: delta fitness / epsilon: {:e} / {:e}{}",
            self.delta_fitness,
            config.epsilon,
            flag(self.delta_fitness >= config.epsilon)
        );
        log::debug!(
            "Registration: fitness / max fitness: {:e} / {:e}{}",
            self.fitness,
            config.max_fitness,
            flag(self.fitness > config.max_fitness)
        );
        log::debug!(
            "Registration: iteration / max iterations: {} / {}{}",
            self.iteration,
            config.max_iterations,
            flag(self.iteration > config.max_iterations)
        );
        log::debug!(
            "Registration: overlap / min overlap: {} / {}{}",
            self.overlap,
            config.min_overlap,
            flag(self.overlap < config.min_overlap)
        );
    }
}

/// Result of a successful registration.
///
/// The transformation is from the data to the model frame.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Estimated transformation.
    pub transformation: DMat4,
    /// The number of iterations performed until convergence.
    pub num_iterations: usize,
    /// Mean squared distance of the last accepted correspondences.
    pub fitness: f64,
    /// Change of the fitness in the last iteration.
    pub delta_fitness: f64,
    /// Fraction of selected data points with a correspondence in the last iteration.
    pub overlap: f64,
    /// Number of model points facing the view.
    pub num_model_selected: usize,
    /// Number of finite data points.
    pub num_data_selected: usize,
}

impl IcpResult {
    /// Estimated rotation matrix, row-major.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        rotation_to_array(&self.transformation)
    }

    /// Estimated translation vector.
    pub fn translation(&self) -> [f64; 3] {
        translation_to_array(&self.transformation)
    }
}

/// Point-to-plane Iterative Closest Point (ICP) registration.
///
/// Uses a kd-tree over the selected model points and cannot be cancelled. See
/// [`icp_point_plane_with`].
///
/// # Arguments
///
/// * `model` - The model point cloud with normals, the target.
/// * `data` - The data point cloud with normals, the source.
/// * `initial` - Initial guess of the transformation from the data to the model frame.
/// * `config` - Registration parameters.
///
/// # Returns
///
/// The registration result or the reason the registration failed.
pub fn icp_point_plane(
    model: &PointCloudNormal,
    data: &PointCloudNormal,
    initial: &DMat4,
    config: &IcpConfig,
) -> Result<IcpResult, IcpError> {
    icp_point_plane_with::<KdTreeIndex>(model, data, initial, config, None)
}

/// Point-to-plane Iterative Closest Point (ICP) registration with a custom spatial index.
///
/// Every iteration matches the data points to the model under the current
/// transformation, rejects outliers by distance and normal agreement, and
/// composes the point-to-plane update onto the estimate:
/// `T_current = T_delta * T_current`.
///
/// # Arguments
///
/// * `model` - The model point cloud with normals, the target.
/// * `data` - The data point cloud with normals, the source.
/// * `initial` - Initial guess of the transformation from the data to the model frame.
/// * `config` - Registration parameters.
/// * `cancel` - Optional flag checked before every iteration.
///
/// # Returns
///
/// The registration result or the reason the registration failed.
pub fn icp_point_plane_with<I: SpatialIndex>(
    model: &PointCloudNormal,
    data: &PointCloudNormal,
    initial: &DMat4,
    config: &IcpConfig,
    cancel: Option<&AtomicBool>,
) -> Result<IcpResult, IcpError> {
    config.validate()?;

    if model.len() < MIN_POINTS || data.len() < MIN_POINTS {
        return Err(IcpError::InsufficientInputPoints {
            required: MIN_POINTS,
            model: model.len(),
            data: data.len(),
        });
    }

    let model_selected = select_model_points(model, &rigid_inverse(initial));
    let data_selected = select_data_points(data);

    let (n_model, n_data) = (model_selected.len(), data_selected.len());
    if n_model < MIN_POINTS || n_data < MIN_POINTS {
        return Err(IcpError::InsufficientSelectedPoints {
            required: MIN_POINTS,
            model: n_model,
            data: n_data,
        });
    }

    log::debug!("Selected points: model {}, data {}", n_model, n_data);

    // build the index once, it is read only for the rest of the call
    let index = I::build(model_selected.points());

    let policy = config.degeneracy_policy();
    let mut state = IterationState::new(*initial);

    loop {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(IcpError::Cancelled {
                iteration: state.iteration,
            });
        }

        let now = std::time::Instant::now();

        let corr = find_correspondences(
            &data_selected,
            &model_selected,
            &index,
            &state.transformation,
            state.squared_distance_threshold,
            config.normals_threshold_cosine,
        )?;

        if corr.len() < MIN_POINTS {
            log::warn!(
                "Not enough correspondences in iteration {}: {} < {}",
                state.iteration,
                corr.len(),
                MIN_POINTS
            );
            return Err(IcpError::InsufficientCorrespondences {
                required: MIN_POINTS,
                actual: corr.len(),
                iteration: state.iteration,
            });
        }

        // NOTE: the fitness comes from the correspondences found before this
        // iteration's update, so it lags the true residual by one iteration.
        state.update(
            corr.squared_distance_sum,
            corr.len(),
            n_data,
            config.distance_threshold_factor,
        );

        let t_delta = minimize_point_plane(&corr.data, &corr.model, policy)?;
        if !t_delta.is_finite() {
            log::warn!(
                "Iteration {}: the point-to-plane update is not finite",
                state.iteration
            );
            return Err(IcpError::SolverDegenerate { rcond: f64::NAN });
        }
        state.transformation = t_delta * state.transformation;

        if !is_rigid(&state.transformation, RIGID_TOLERANCE) {
            log::warn!(
                "Iteration {}: the estimate is no longer a rigid transformation",
                state.iteration
            );
        }

        log::debug!(
            "Iteration: {} | correspondences: {} | fitness: {:e} | delta fitness: {:e} | overlap: {:.3} | elapsed: {:?}",
            state.iteration,
            corr.len(),
            state.fitness,
            state.delta_fitness,
            state.overlap,
            now.elapsed()
        );

        if state.advance(config) {
            break;
        }
    }

    state.log_summary(config);

    if let Err(err) = state.classify(config) {
        log::warn!("Registration failed: {}", err);
        return Err(err);
    }

    Ok(IcpResult {
        transformation: state.transformation,
        num_iterations: state.iteration,
        fitness: state.fitness,
        delta_fitness: state.delta_fitness,
        overlap: state.overlap,
        num_model_selected: n_model,
        num_data_selected: n_data,
    })
}
