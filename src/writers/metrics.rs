use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{
    buffer::{is_reportable, Aggregate, Buffer, BufferErr},
    engine::{Engine, Mode},
    error::Result,
};

/// The learning rate of a single param group or of every group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Lr {
    Single(f64),
    Groups(Vec<f64>),
}

fn round5(lr: f64) -> f64 {
    (lr * 1e5).round() / 1e5
}

impl Lr {
    fn from_lrs(mut lrs: Vec<f64>) -> Self {
        lrs.iter_mut().for_each(|lr| *lr = round5(*lr));

        match lrs.as_slice() {
            [lr] => Self::Single(*lr),
            _ => Self::Groups(lrs),
        }
    }
}

impl fmt::Display for Lr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(lr) => write!(f, "{lr:.5}"),
            Self::Groups(lrs) => {
                let lrs: Vec<_> = lrs.iter().map(|lr| format!("{lr:.5}")).collect();
                write!(f, "[{}]", lrs.join(", "))
            }
        }
    }
}

/// A snapshot of the engine's progress, shared by every writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub mode: Mode,
    /// 1-based while training, the amount of completed epochs while validating.
    pub epoch: usize,
    /// 1-based step in the epoch while training.
    pub iter: usize,
    pub lr: Lr,
    /// Mean step time in seconds, training only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Mean batch wait time in seconds, training only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_time: Option<f64>,
}

fn mean_scalar(buffer: &Buffer, key: &str, window: usize) -> Option<f64> {
    buffer.mean(key, window).ok().and_then(|agg| agg.as_scalar())
}

/// Collects the snapshot of `engine` every writer starts from.
pub fn collect_metrics(engine: &Engine, window: usize) -> Metrics {
    let lr = Lr::from_lrs(engine.optimizer().lrs());
    let mut metrics = Metrics {
        mode: engine.mode(),
        epoch: engine.epoch(),
        iter: engine.iter_in_epoch(),
        lr,
        time: None,
        data_time: None,
    };

    if engine.mode() == Mode::Train {
        metrics.epoch += 1;
        metrics.iter += 1;
        metrics.time = mean_scalar(engine.buffer(), "_iter_time", window);
        metrics.data_time = mean_scalar(engine.buffer(), "_data_time", window);
    }

    metrics
}

/// Every reportable key averaged over `window`, dict records flattened as `<key>_<sub key>`.
/// Cleared keys are skipped.
///
/// # Errors
/// Any other buffer failure, like a plain key holding media records.
pub fn reported_values(buffer: &Buffer, window: usize) -> Result<Vec<(String, f64)>> {
    let mut values = Vec::new();

    for key in buffer.keys().filter(|key| is_reportable(key)) {
        match buffer.avg(key, window) {
            Ok(Aggregate::Scalar(value)) => values.push((key.to_string(), value)),
            Ok(Aggregate::Dict(dict)) => {
                values.extend(dict.into_iter().map(|(sub, v)| (format!("{key}_{sub}"), v)))
            }
            Err(BufferErr::EmptySeries(_)) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(values)
}

/// Estimated time left for the run, extrapolated from the time spent since launch.
///
/// Meant to be called during a training step, before the counters advance. `None` without
/// timing information.
pub fn eta(engine: &Engine) -> Option<Duration> {
    let total = engine.buffer().latest("_total_time").ok()?.as_scalar()?;
    let passed = (engine.iter() + 1).saturating_sub(engine.start_iter()).max(1);
    let left = engine.max_iters().saturating_sub(engine.iter() + 1);

    Some(Duration::from_secs((left as f64 * total / passed as f64) as u64))
}

/// Formats `duration` as `H:MM:SS`, prefixed by the days when there are any.
pub fn format_eta(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, secs) = (secs / 86_400, secs % 86_400);
    let clock = format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60);

    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{buffer::Media, error::EngineErr};

    #[test]
    fn formats_eta_like_a_clock() {
        assert_eq!(format_eta(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_eta(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(format_eta(Duration::from_secs(90_061)), "1 day, 1:01:01");
        assert_eq!(format_eta(Duration::from_secs(3 * 86_400)), "3 days, 0:00:00");
    }

    #[test]
    fn single_groups_collapse_to_a_scalar() {
        assert_eq!(Lr::from_lrs(vec![0.0123456]), Lr::Single(0.01235));
        assert_eq!(Lr::from_lrs(vec![0.1, 0.2]), Lr::Groups(vec![0.1, 0.2]));
        assert_eq!(Lr::Single(0.1).to_string(), "0.10000");
    }

    #[test]
    fn reports_only_plain_keys() {
        let mut buffer = Buffer::default();
        buffer.record("loss", 1.0);
        buffer.record("loss", 3.0);
        buffer.record("_iter_time", 0.5);
        buffer.record("weights_histogram_", 1.0);
        buffer.record("acc", BTreeMap::from([("top1".to_string(), 0.5)]));
        buffer.record("cleared", 1.0);
        buffer.clear("cleared");

        let values = reported_values(&buffer, 0).unwrap();
        assert_eq!(
            values,
            vec![("loss".to_string(), 2.0), ("acc_top1".to_string(), 0.5)]
        );
    }

    #[test]
    fn media_under_plain_keys_fails() {
        let mut buffer = Buffer::default();
        buffer.record("loss", 1.0);
        buffer.record("pred", Media::Text("cat".into()));

        let err = reported_values(&buffer, 0).unwrap_err();
        assert!(matches!(
            err,
            EngineErr::Buffer(BufferErr::NotNumeric(ref key)) if key == "pred"
        ));
    }
}
