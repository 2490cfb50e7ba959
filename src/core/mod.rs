pub mod detector;
pub mod schedule;
pub mod sizing;
