pub mod aggregation;
pub mod client;
pub mod config;
pub mod derived;
pub mod leaderboard;
pub mod observability;
pub mod payload;
pub mod period;
pub mod settings;
pub mod snapshot;
pub mod sorting;
pub mod types;
pub mod visualize;
