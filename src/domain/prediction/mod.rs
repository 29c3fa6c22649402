pub mod model;

pub use model::{HourlyForecast, OccupancyPrediction, OccupancyStatus, StatusThresholds};
