pub mod estimator;
pub mod features;

pub use estimator::SignalEstimator;
pub use features::FeatureExtractor;
