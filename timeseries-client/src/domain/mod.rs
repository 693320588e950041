pub mod asset;
pub mod belief;
pub mod data_source;
pub mod sensor;

pub use asset::Asset;
pub use belief::{SaveOutcome, TimedBelief};
pub use data_source::DataSource;
pub use sensor::{NewSensor, Sensor};
