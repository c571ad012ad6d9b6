pub mod leaderboard;

pub use leaderboard::*;
