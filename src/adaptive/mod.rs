pub mod coach;
pub mod config;
pub mod decision;
pub mod engine;
pub mod modeling;
pub mod persistence;
pub mod policy;
pub mod rng;
pub mod telemetry;
pub mod types;

pub use coach::CoachingNotifier;
pub use config::{AdaptiveConfig, ConfigError};
pub use decision::{DifficultyDirector, PatternBandit};
pub use engine::{AdaptiveSession, SessionSummary, TickOutput};
pub use modeling::SignalEstimator;
pub use persistence::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use policy::PolicyGate;
pub use rng::{RandomSource, SeededRandom};
pub use types::*;
