use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

/// An ordered series of values at a fixed resolution.
///
/// Timestamps are event starts in UTC; the map keeps them unique and increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub unit: String,
    pub resolution: TimeDelta,
    points: BTreeMap<DateTime<Utc>, f64>,
}

impl Series {
    pub fn new(unit: impl Into<String>, resolution: TimeDelta) -> Self {
        Self {
            unit: unit.into(),
            resolution,
            points: BTreeMap::new(),
        }
    }

    pub fn from_points<I>(unit: impl Into<String>, resolution: TimeDelta, points: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64)>,
    {
        let mut series = Self::new(unit, resolution);
        for (ts, value) in points {
            series.insert(ts, value);
        }
        series
    }

    /// Insert or replace the value at `ts`.
    pub fn insert(&mut self, ts: DateTime<Utc>, value: f64) {
        self.points.insert(ts, value);
    }

    /// Insert only if `ts` has no value yet. Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, ts: DateTime<Utc>, value: f64) -> bool {
        match self.points.entry(ts) {
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, ts: DateTime<Utc>) -> Option<f64> {
        self.points.get(&ts).copied()
    }

    pub fn points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().map(|(ts, v)| (*ts, *v))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.keys().next_back().copied()
    }

    /// Points with `start <= ts < end`.
    pub fn within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Series {
        Series {
            unit: self.unit.clone(),
            resolution: self.resolution,
            points: self.points.range(start..end).map(|(ts, v)| (*ts, *v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn keeps_points_ordered_and_unique() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t1 = t0 + TimeDelta::hours(1);
        let mut s = Series::from_points("MW", TimeDelta::hours(1), [(t1, 2.0), (t0, 1.0), (t1, 3.0)]);

        assert_eq!(s.points().collect::<Vec<_>>(), vec![(t0, 1.0), (t1, 3.0)]);
        assert!(!s.insert_if_absent(t0, 9.0));
        assert_eq!(s.get(t0), Some(1.0));
    }

    #[test]
    fn within_is_half_open() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let s = Series::from_points("MW", TimeDelta::hours(1), (0..4).map(|h| (t0 + TimeDelta::hours(h), h as f64)));

        let clipped = s.within(t0 + TimeDelta::hours(1), t0 + TimeDelta::hours(3));
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped.first_timestamp(), Some(t0 + TimeDelta::hours(1)));
        assert_eq!(clipped.last_timestamp(), Some(t0 + TimeDelta::hours(2)));
    }
}
