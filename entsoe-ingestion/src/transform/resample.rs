use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::ImportError;
use crate::transform::Series;

/// Bring `series` to the `target` resolution.
///
/// Coarser input is upsampled by forward fill over `[first, last + resolution)`;
/// finer input is downsampled to bucket means, with buckets aligned to the UTC
/// day start of the first point.
pub fn resample(series: &Series, target: TimeDelta) -> Result<Series, ImportError> {
    let source = series.resolution;
    if source <= TimeDelta::zero() || target <= TimeDelta::zero() {
        return Err(ImportError::Computation(format!(
            "cannot resample from {source} to {target}: resolutions must be positive"
        )));
    }
    if source == target || series.is_empty() {
        let mut out = series.clone();
        out.resolution = target;
        return Ok(out);
    }

    let (coarse, fine) = if source > target { (source, target) } else { (target, source) };
    if coarse.num_seconds() % fine.num_seconds() != 0 {
        return Err(ImportError::Computation(format!(
            "cannot resample from {source} to {target}: not a whole multiple"
        )));
    }

    let out = if source > target {
        tracing::debug!(%source, %target, points = series.len(), "upsampling");
        upsample(series, target)
    } else {
        tracing::debug!(%source, %target, points = series.len(), "downsampling");
        downsample(series, target)
    };
    Ok(out)
}

fn upsample(series: &Series, target: TimeDelta) -> Series {
    let mut out = Series::new(series.unit.clone(), target);
    let (Some(first), Some(last)) = (series.first_timestamp(), series.last_timestamp()) else {
        return out;
    };
    let end = last + series.resolution;

    let mut source_points = series.points().peekable();
    let mut current = None;
    let mut ts = first;
    while ts < end {
        while let Some((_, value)) = source_points.next_if(|(at, _)| *at <= ts) {
            current = Some(value);
        }
        if let Some(value) = current {
            out.insert(ts, value);
        }
        ts += target;
    }
    out
}

fn downsample(series: &Series, target: TimeDelta) -> Series {
    let mut out = Series::new(series.unit.clone(), target);
    let Some(first) = series.first_timestamp() else {
        return out;
    };
    let origin = day_start(first);
    let step = target.num_seconds();

    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for (ts, value) in series.points() {
        let offset = (ts - origin).num_seconds().div_euclid(step) * step;
        let bucket = origin + TimeDelta::seconds(offset);
        let entry = buckets.entry(bucket).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    for (bucket, (sum, count)) in buckets {
        out.insert(bucket, sum / count as f64);
    }
    out
}

fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}
