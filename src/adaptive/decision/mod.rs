pub mod bandit;
pub mod director;
pub mod reward;

pub use bandit::{BanditModel, PatternBandit, UpdateReport};
pub use director::{DifficultyDirector, DirectorDecision};
pub use reward::{RewardWindow, WindowVerdict};
