pub mod area;
pub mod document;
pub mod entsoe_client;
pub mod psr_type;

pub use area::MarketArea;
pub use entsoe_client::{EntsoeClient, POWER_UNIT, PRICE_UNIT};
