pub mod alerts;
pub mod events;
pub mod metrics;
pub mod monitor;
pub mod patterns;
pub mod roster;
