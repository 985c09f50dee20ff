use thiserror::Error;

/// Error types for the point-to-plane registration.
#[derive(Debug, Error)]
pub enum IcpError {
    /// One of the raw input clouds is too small.
    #[error("Not enough input points: model ({model}), data ({data}), required {required}")]
    InsufficientInputPoints {
        /// Minimum number of points required in each cloud
        required: usize,
        /// Number of points in the model cloud
        model: usize,
        /// Number of points in the data cloud
        data: usize,
    },

    /// One of the clouds is too small after the point selection.
    #[error("Not enough points after selection: model ({model}), data ({data}), required {required}")]
    InsufficientSelectedPoints {
        /// Minimum number of points required in each selected cloud
        required: usize,
        /// Number of selected model points
        model: usize,
        /// Number of selected data points
        data: usize,
    },

    /// Too few correspondences were accepted in an iteration.
    #[error("Not enough correspondences in iteration {iteration}: {actual} < {required}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required
        required: usize,
        /// Number of accepted correspondences
        actual: usize,
        /// Iteration in which the check failed
        iteration: usize,
    },

    /// The spatial index could not answer a nearest neighbour query.
    #[error("Nearest neighbour query failed for data point {data_index}")]
    IndexQueryFailed {
        /// Index of the selected data point used as query
        data_index: usize,
    },

    /// The iteration limit was exceeded.
    #[error("Exceeded the maximum number of iterations ({max_iterations})")]
    ExceededIterations {
        /// The configured iteration limit
        max_iterations: usize,
    },

    /// The final overlap is below the configured minimum.
    #[error("Insufficient overlap: {overlap} < {min_overlap}")]
    InsufficientOverlap {
        /// Fraction of data points with an accepted correspondence
        overlap: f64,
        /// The configured minimum overlap
        min_overlap: f64,
    },

    /// The final fitness is above the configured maximum.
    #[error("Exceeded fitness: {fitness} > {max_fitness}")]
    ExceededFitness {
        /// Mean squared distance of the last accepted correspondences
        fitness: f64,
        /// The configured maximum fitness
        max_fitness: f64,
    },

    /// The solver inputs do not pair up.
    #[error("Mismatched lengths: source ({source_len}) != target ({target_len})")]
    MismatchedLength {
        /// Number of source points
        source_len: usize,
        /// Number of target points
        target_len: usize,
    },

    /// The linear system of the point-to-plane solve is rank deficient.
    #[error("Degenerate point-to-plane system (reciprocal condition {rcond:e})")]
    SolverDegenerate {
        /// Ratio between the smallest and largest eigenvalue of the system
        rcond: f64,
    },

    /// The configuration has an out of range value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The registration was cancelled by the caller.
    #[error("Registration cancelled before iteration {iteration}")]
    Cancelled {
        /// Iteration that was about to start
        iteration: usize,
    },

    /// The registration reached a state that should not be possible.
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
}
