//! BDD step definitions for sensorhub service

pub mod access_steps;
pub mod dashboard_steps;
pub mod series_steps;
