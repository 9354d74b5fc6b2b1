use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    error::Error,
    fmt,
};

use serde::Serialize;

use crate::error::{EngineErr, Result};

/// Leading or trailing character that marks a key as non-printable.
pub const MARKER: char = '_';

/// Default amount of entries kept per key.
pub const DEFAULT_MAX_LEN: usize = 100_000;

/// Buffer query failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferErr {
    KeyNotFound(String),
    EmptySeries(String),
    NotNumeric(String),
    MixedKinds(String),
}

impl fmt::Display for BufferErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(key) => write!(f, "key '{key}' not found"),
            Self::EmptySeries(key) => write!(f, "key '{key}' has no recorded values"),
            Self::NotNumeric(key) => write!(f, "key '{key}' holds non numeric records"),
            Self::MixedKinds(key) => {
                write!(f, "key '{key}' mixes scalar and dict records in the window")
            }
        }
    }
}

impl Error for BufferErr {}

/// Raw payloads for rich media keys. Rendering is up to the dashboard backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Media {
    Values(Vec<f64>),
    Bytes(Vec<u8>),
    Text(String),
}

/// A single recorded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Scalar(f64),
    Dict(BTreeMap<String, f64>),
    Media(Media),
}

impl Record {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Record {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<f32> for Record {
    fn from(value: f32) -> Self {
        Self::Scalar(value as f64)
    }
}

impl From<BTreeMap<String, f64>> for Record {
    fn from(value: BTreeMap<String, f64>) -> Self {
        Self::Dict(value)
    }
}

impl From<Media> for Record {
    fn from(value: Media) -> Self {
        Self::Media(value)
    }
}

/// The result of averaging a window of numeric records.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Scalar(f64),
    Dict(BTreeMap<String, f64>),
}

impl Aggregate {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Dict(_) => None,
        }
    }
}

/// Rich media types a dashboard knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Histogram,
    Image,
    Images,
    Figure,
    Video,
    Audio,
    Text,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Histogram => "histogram",
            Self::Image => "image",
            Self::Images => "images",
            Self::Figure => "figure",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
        }
    }

    fn parse(token: &str) -> Result<Self> {
        let kind = match token {
            "histogram" => Self::Histogram,
            "image" => Self::Image,
            "images" => Self::Images,
            "figure" => Self::Figure,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "text" => Self::Text,
            other => return Err(EngineErr::UnsupportedLogType(other.to_string())),
        };

        Ok(kind)
    }
}

/// How a buffer key must be treated by writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    /// `_`-prefixed, e.g. timing counters. Never reported, never flushed.
    Internal,
    /// A plain metric, averaged over the window.
    Reportable,
    /// `<name>_<type>_`, rendered through the dashboard's media calls.
    Media { name: String, kind: MediaKind },
}

impl KeyKind {
    /// Classifies `key` following the marker protocol.
    ///
    /// # Errors
    /// Returns `UnsupportedLogType` if a media key carries an unknown type token.
    pub fn parse(key: &str) -> Result<Self> {
        if key.starts_with(MARKER) {
            return Ok(Self::Internal);
        }

        let Some(stem) = key.strip_suffix(MARKER) else {
            return Ok(Self::Reportable);
        };

        let (name, token) = match stem.rsplit_once(MARKER) {
            Some((name, token)) => (name, token),
            None => ("", stem),
        };

        let kind = MediaKind::parse(token)?;
        Ok(Self::Media {
            name: name.to_string(),
            kind,
        })
    }
}

/// True for keys that console and file writers average and print.
pub fn is_reportable(key: &str) -> bool {
    !key.starts_with(MARKER) && !key.ends_with(MARKER)
}

/// True for keys that survive a flush.
pub fn is_internal(key: &str) -> bool {
    key.starts_with(MARKER)
}

#[derive(Debug, Clone)]
struct Entry {
    record: Record,
    weight: f64,
}

/// Windowed metric store shared by the engine and its hooks.
#[derive(Debug)]
pub struct Buffer {
    max_len: usize,
    order: Vec<String>,
    series: HashMap<String, VecDeque<Entry>>,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

impl Buffer {
    /// Creates a new empty `Buffer`.
    ///
    /// # Args
    /// * `max_len` - Max amount of entries kept per key, older ones are dropped first.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
            order: Vec::new(),
            series: HashMap::new(),
        }
    }

    pub fn record(&mut self, key: &str, value: impl Into<Record>) {
        self.record_weighted(key, value, 1.0);
    }

    /// Appends `value` to `key`'s history, weighted by `weight` for `avg`.
    pub fn record_weighted(&mut self, key: &str, value: impl Into<Record>, weight: f64) {
        if !self.series.contains_key(key) {
            self.order.push(key.to_string());
        }

        let series = self.series.entry(key.to_string()).or_default();
        if series.len() == self.max_len {
            series.pop_front();
        }

        series.push_back(Entry {
            record: value.into(),
            weight,
        });
    }

    /// Arithmetic mean of the last `window` entries of `key`. A `window` of 0 means all of them.
    ///
    /// # Errors
    /// `KeyNotFound` if `key` was never recorded, `EmptySeries` if it was cleared, `NotNumeric`
    /// for media keys.
    pub fn mean(&self, key: &str, window: usize) -> std::result::Result<Aggregate, BufferErr> {
        self.aggregate(key, window, false)
    }

    /// Same as `mean` but weighted by each entry's recorded weight.
    pub fn avg(&self, key: &str, window: usize) -> std::result::Result<Aggregate, BufferErr> {
        self.aggregate(key, window, true)
    }

    pub fn latest(&self, key: &str) -> std::result::Result<&Record, BufferErr> {
        self.window(key, 1)?
            .next()
            .map(|entry| &entry.record)
            .ok_or_else(|| BufferErr::EmptySeries(key.to_string()))
    }

    /// Drops `key`'s history. The key keeps its place in `keys`.
    pub fn clear(&mut self, key: &str) {
        if let Some(series) = self.series.get_mut(key) {
            series.clear();
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.series.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    /// Tracked keys in first-recorded order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.series.contains_key(key)
    }

    pub fn len(&self, key: &str) -> usize {
        self.series.get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }

    fn window(
        &self,
        key: &str,
        window: usize,
    ) -> std::result::Result<impl Iterator<Item = &Entry> + '_, BufferErr> {
        let series = self
            .series
            .get(key)
            .ok_or_else(|| BufferErr::KeyNotFound(key.to_string()))?;

        if series.is_empty() {
            return Err(BufferErr::EmptySeries(key.to_string()));
        }

        let take = if window == 0 {
            series.len()
        } else {
            window.min(series.len())
        };

        Ok(series.iter().rev().take(take))
    }

    fn aggregate(
        &self,
        key: &str,
        window: usize,
        weighted: bool,
    ) -> std::result::Result<Aggregate, BufferErr> {
        let weight = |entry: &Entry| if weighted { entry.weight } else { 1.0 };

        let mut scalar: Option<(f64, f64)> = None;
        let mut dict: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        let mut seen_dict = false;

        for entry in self.window(key, window)? {
            let w = weight(entry);
            match &entry.record {
                Record::Scalar(v) => {
                    let (sum, total) = scalar.get_or_insert((0.0, 0.0));
                    *sum += v * w;
                    *total += w;
                }
                Record::Dict(values) => {
                    seen_dict = true;
                    for (k, v) in values {
                        let (sum, total) = dict.entry(k.clone()).or_insert((0.0, 0.0));
                        *sum += v * w;
                        *total += w;
                    }
                }
                Record::Media(_) => return Err(BufferErr::NotNumeric(key.to_string())),
            }
        }

        let ratio = |(sum, total): (f64, f64)| if total == 0.0 { 0.0 } else { sum / total };

        match (scalar, seen_dict) {
            (Some(acc), false) => Ok(Aggregate::Scalar(ratio(acc))),
            (None, true) => Ok(Aggregate::Dict(
                dict.into_iter().map(|(k, acc)| (k, ratio(acc))).collect(),
            )),
            _ => Err(BufferErr::MixedKinds(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_only_looks_at_the_window() {
        let mut buffer = Buffer::default();
        for v in [1.0, 2.0, 3.0, 4.0] {
            buffer.record("loss", v);
        }

        assert_eq!(buffer.mean("loss", 2), Ok(Aggregate::Scalar(3.5)));
        assert_eq!(buffer.mean("loss", 10), Ok(Aggregate::Scalar(2.5)));
        assert_eq!(buffer.mean("loss", 0), Ok(Aggregate::Scalar(2.5)));
    }

    #[test]
    fn unrecorded_key_fails() {
        let buffer = Buffer::default();
        assert_eq!(
            buffer.mean("loss", 5),
            Err(BufferErr::KeyNotFound("loss".into()))
        );
        assert!(buffer.latest("loss").is_err());
    }

    #[test]
    fn weighted_avg_uses_weights() {
        let mut buffer = Buffer::default();
        buffer.record_weighted("acc", 1.0, 3.0);
        buffer.record_weighted("acc", 0.0, 1.0);

        assert_eq!(buffer.avg("acc", 0), Ok(Aggregate::Scalar(0.75)));
        assert_eq!(buffer.mean("acc", 0), Ok(Aggregate::Scalar(0.5)));
    }

    #[test]
    fn dicts_are_averaged_per_entry() {
        let mut buffer = Buffer::default();
        buffer.record("loss", BTreeMap::from([("cls".to_string(), 1.0)]));
        buffer.record(
            "loss",
            BTreeMap::from([("cls".to_string(), 3.0), ("reg".to_string(), 2.0)]),
        );

        let Ok(Aggregate::Dict(values)) = buffer.mean("loss", 0) else {
            panic!("expected a dict aggregate");
        };
        assert_eq!(values["cls"], 2.0);
        assert_eq!(values["reg"], 2.0);
    }

    #[test]
    fn media_is_not_numeric() {
        let mut buffer = Buffer::default();
        buffer.record("w_histogram_", Media::Values(vec![1.0, 2.0]));

        assert_eq!(
            buffer.mean("w_histogram_", 1),
            Err(BufferErr::NotNumeric("w_histogram_".into()))
        );
        assert!(buffer.latest("w_histogram_").is_ok());
    }

    #[test]
    fn history_is_bounded() {
        let mut buffer = Buffer::new(3);
        for v in 0..10 {
            buffer.record("x", v as f64);
        }

        assert_eq!(buffer.len("x"), 3);
        assert_eq!(buffer.mean("x", 0), Ok(Aggregate::Scalar(8.0)));
    }

    #[test]
    fn clear_keeps_the_key_but_drops_history() {
        let mut buffer = Buffer::default();
        buffer.record("loss", 1.0);
        buffer.record("_iter_time", 0.1);
        buffer.clear("loss");

        assert_eq!(buffer.keys().collect::<Vec<_>>(), ["loss", "_iter_time"]);
        assert!(buffer.is_empty("loss"));
        assert_eq!(
            buffer.mean("loss", 1),
            Err(BufferErr::EmptySeries("loss".into()))
        );

        buffer.remove("loss");
        assert_eq!(buffer.keys().collect::<Vec<_>>(), ["_iter_time"]);
    }

    #[test]
    fn keys_reflect_current_state() {
        let mut buffer = Buffer::default();
        buffer.record("a", 1.0);
        assert_eq!(buffer.keys().count(), 1);

        buffer.record("b", 1.0);
        assert_eq!(buffer.keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn key_kinds_follow_the_marker_protocol() {
        assert_eq!(KeyKind::parse("_iter_time").unwrap(), KeyKind::Internal);
        assert_eq!(KeyKind::parse("loss").unwrap(), KeyKind::Reportable);
        assert_eq!(
            KeyKind::parse("loss_histogram_").unwrap(),
            KeyKind::Media {
                name: "loss".into(),
                kind: MediaKind::Histogram
            }
        );
        assert_eq!(
            KeyKind::parse("attn_map_images_").unwrap(),
            KeyKind::Media {
                name: "attn_map".into(),
                kind: MediaKind::Images
            }
        );

        let err = KeyKind::parse("loss_unknowntype_").unwrap_err();
        assert_eq!(err.to_string(), "unsupported log type: unknowntype");
    }

    #[test]
    fn reportable_keys_exclude_both_markers() {
        assert!(is_reportable("loss"));
        assert!(!is_reportable("_data_time"));
        assert!(!is_reportable("pred_image_"));
        assert!(is_internal("_data_time"));
    }
}
