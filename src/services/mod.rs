pub mod activity;
pub mod privacy;
