pub mod predictor;

pub use predictor::OccupancyPredictor;
