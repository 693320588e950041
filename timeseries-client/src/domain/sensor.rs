use chrono::TimeDelta;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Sensor {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub asset_id: i64,
    pub timezone: String,
    pub event_resolution_minutes: i32,
}

impl Sensor {
    pub fn event_resolution(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.event_resolution_minutes))
    }
}

/// Attributes of a sensor that is created when no sensor with the same
/// name and unit exists on the asset yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSensor<'a> {
    pub name: &'a str,
    pub unit: &'a str,
    pub timezone: &'a str,
    pub event_resolution_minutes: i32,
}
