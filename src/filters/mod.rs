pub mod heading;
pub mod kalman_2d;

pub use heading::{HeadingConfig, HeadingEstimator, HeadingProvider, HeadingSourceKind, HeadingState, HeadingUpdate};
pub use kalman_2d::{Kf2dState, KalmanFilter2d, PredictOutcome, UpdateOutcome};
