pub mod model;

pub use model::{demo_stations, ChargerType, GeoPoint, Station, StationPattern};
