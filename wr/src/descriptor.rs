//! QueryDescriptor - the mutable description of what a widget fetches
//!
//! The serialized form of [`QueryOptions`] is the KairosDB-style query body the
//! dashboard datasources speak:
//!
//! ```json
//! {
//!   "start_relative": {"value": 1, "unit": "hours"},
//!   "cache_time": 0,
//!   "metrics": [{"name": "cpu.usage", "aggregators": [{"name": "avg"}]}]
//! }
//! ```
//!
//! Exactly one time window is present at any time. Switching windows removes
//! the other window's keys from the body entirely; they are never sent as `null`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DescriptorError;

/// Option keys owned by typed setters
pub const RESERVED_OPTIONS: &[&str] = &[
    "start_absolute",
    "end_absolute",
    "start_relative",
    "end_relative",
    "cache_time",
    "metrics",
];

/// Time unit used by relative windows and sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ms" => Some(TimeUnit::Milliseconds),
            "s" => Some(TimeUnit::Seconds),
            "m" => Some(TimeUnit::Minutes),
            "h" => Some(TimeUnit::Hours),
            "d" => Some(TimeUnit::Days),
            "w" => Some(TimeUnit::Weeks),
            "mo" => Some(TimeUnit::Months),
            "y" => Some(TimeUnit::Years),
            _ => None,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
            TimeUnit::Weeks => "w",
            TimeUnit::Months => "mo",
            TimeUnit::Years => "y",
        }
    }
}

/// A relative time bound such as "1h" (one hour before now)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRelativeTime")]
pub struct RelativeTime {
    pub value: u64,
    pub unit: TimeUnit,
}

impl RelativeTime {
    pub fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }
}

impl FromStr for RelativeTime {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let value = digits
            .parse::<u64>()
            .map_err(|_| DescriptorError::InvalidRelativeTime(s.to_string()))?;
        let unit = TimeUnit::from_suffix(suffix.trim())
            .ok_or_else(|| DescriptorError::InvalidRelativeTime(s.to_string()))?;
        Ok(Self { value, unit })
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRelativeTime {
    Short(String),
    Full {
        #[serde(deserialize_with = "string_or_number")]
        value: String,
        unit: TimeUnit,
    },
}

impl TryFrom<RawRelativeTime> for RelativeTime {
    type Error = DescriptorError;

    fn try_from(raw: RawRelativeTime) -> Result<Self, Self::Error> {
        match raw {
            RawRelativeTime::Short(s) => s.parse(),
            RawRelativeTime::Full { value, unit } => {
                let value = value
                    .parse::<u64>()
                    .map_err(|_| DescriptorError::InvalidRelativeTime(value.clone()))?;
                Ok(Self { value, unit })
            }
        }
    }
}

/// Accepts `"1"` and `1` alike; datasources written by hand use both
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Int(u64),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Text(s) => s,
        Repr::Int(n) => n.to_string(),
    })
}

/// Downsampling parameters of an aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampling {
    pub unit: TimeUnit,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

impl Sampling {
    pub fn new(unit: TimeUnit, value: impl Into<String>) -> Self {
        Self {
            unit,
            value: value.into(),
        }
    }
}

/// One aggregator applied to a metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregator {
    /// Empty for entries created by a sampling setter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Sampling>,

    /// Aggregator-specific keys (e.g. `align_sampling`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Aggregator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sampling: None,
            extra: Map::new(),
        }
    }
}

/// One entry of the ordered `metrics` sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Empty for entries created by a sampling setter
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregators: Vec<Aggregator>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Map::new(),
            aggregators: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregators.push(aggregator);
        self
    }
}

/// The query's time window; exactly one kind is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Epoch milliseconds
    Absolute { start: i64, end: Option<i64> },
    Relative {
        start: RelativeTime,
        end: Option<RelativeTime>,
    },
}

impl TimeWindow {
    pub fn is_absolute(&self) -> bool {
        matches!(self, TimeWindow::Absolute { .. })
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TimeWindow::Relative { .. })
    }
}

/// Query options sent as the request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOptions", into = "RawOptions")]
pub struct QueryOptions {
    window: TimeWindow,
    cache_time: Option<u64>,
    metrics: Vec<MetricSpec>,
    extra: Map<String, Value>,
}

/// Wire shape of [`QueryOptions`]; absent keys stay absent
#[derive(Default, Serialize, Deserialize)]
struct RawOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_absolute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_absolute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_relative: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_relative: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_time: Option<u64>,
    #[serde(default)]
    metrics: Vec<MetricSpec>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<RawOptions> for QueryOptions {
    type Error = DescriptorError;

    fn try_from(raw: RawOptions) -> Result<Self, Self::Error> {
        let window = match (raw.start_absolute, raw.start_relative) {
            (Some(_), Some(_)) => return Err(DescriptorError::ConflictingWindow),
            (None, None) => return Err(DescriptorError::MissingWindow),
            (Some(start), None) => {
                if raw.end_relative.is_some() {
                    return Err(DescriptorError::ConflictingWindow);
                }
                TimeWindow::Absolute {
                    start,
                    end: raw.end_absolute,
                }
            }
            (None, Some(start)) => {
                if raw.end_absolute.is_some() {
                    return Err(DescriptorError::ConflictingWindow);
                }
                TimeWindow::Relative {
                    start,
                    end: raw.end_relative,
                }
            }
        };

        Ok(Self {
            window,
            cache_time: raw.cache_time,
            metrics: raw.metrics,
            extra: raw.extra,
        })
    }
}

impl From<QueryOptions> for RawOptions {
    fn from(options: QueryOptions) -> Self {
        let mut raw = RawOptions {
            cache_time: options.cache_time,
            metrics: options.metrics,
            extra: options.extra,
            ..Default::default()
        };
        match options.window {
            TimeWindow::Absolute { start, end } => {
                raw.start_absolute = Some(start);
                raw.end_absolute = end;
            }
            TimeWindow::Relative { start, end } => {
                raw.start_relative = Some(start);
                raw.end_relative = end;
            }
        }
        raw
    }
}

impl QueryOptions {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            cache_time: None,
            metrics: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn cache_time(&self) -> Option<u64> {
        self.cache_time
    }

    pub fn metrics(&self) -> &[MetricSpec] {
        &self.metrics
    }

    /// Look up a non-reserved option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// HTTP method used by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// The datasource of one widget instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    source_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    #[serde(default)]
    method: HttpMethod,

    options: QueryOptions,
}

impl QueryDescriptor {
    pub fn new(source_id: impl Into<String>, window: TimeWindow) -> Self {
        let source_id = source_id.into();
        debug!(%source_id, ?window, "QueryDescriptor::new: called");
        Self {
            source_id,
            url: None,
            method: HttpMethod::default(),
            options: QueryOptions::new(window),
        }
    }

    /// Descriptor with a relative window starting `start` before now
    pub fn relative(source_id: impl Into<String>, start: RelativeTime) -> Self {
        Self::new(source_id, TimeWindow::Relative { start, end: None })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_metric(mut self, metric: MetricSpec) -> Self {
        self.options.metrics.push(metric);
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn window(&self) -> TimeWindow {
        self.options.window
    }

    pub fn cache_hint(&self) -> Option<u64> {
        self.options.cache_time
    }

    pub fn metrics(&self) -> &[MetricSpec] {
        &self.options.metrics
    }

    /// Switch to an absolute window, dropping any relative bounds
    pub fn set_absolute_window(&mut self, min: i64, max: i64) {
        debug!(source_id = %self.source_id, min, max, "QueryDescriptor::set_absolute_window: called");
        self.options.window = TimeWindow::Absolute {
            start: min,
            end: Some(max),
        };
    }

    /// Switch to a relative window ending now, dropping any absolute bounds
    pub fn set_relative_window(&mut self, start: RelativeTime) {
        debug!(source_id = %self.source_id, %start, "QueryDescriptor::set_relative_window: called");
        self.options.window = TimeWindow::Relative { start, end: None };
    }

    pub fn set_cache_hint(&mut self, ms: u64) {
        debug!(source_id = %self.source_id, ms, "QueryDescriptor::set_cache_hint: called");
        self.options.cache_time = Some(ms);
    }

    /// Set sampling on the first aggregator of metric `metric_index`
    ///
    /// `metric_index` may equal the number of metrics, in which case a new
    /// metric entry is appended. Only an index past that fails.
    pub fn set_sampling(
        &mut self,
        metric_index: usize,
        unit: TimeUnit,
        value: impl Into<String>,
    ) -> Result<(), DescriptorError> {
        self.set_aggregator_sampling(metric_index, 0, unit, value)
    }

    /// Set sampling on one aggregator
    ///
    /// Either index may be one past the end to append an entry. Existing
    /// entries are never reordered or dropped.
    pub fn set_aggregator_sampling(
        &mut self,
        metric_index: usize,
        aggregator_index: usize,
        unit: TimeUnit,
        value: impl Into<String>,
    ) -> Result<(), DescriptorError> {
        let value = value.into();
        debug!(
            source_id = %self.source_id,
            metric_index,
            aggregator_index,
            ?unit,
            %value,
            "QueryDescriptor::set_aggregator_sampling: called"
        );

        let metrics = &self.options.metrics;
        if metric_index > metrics.len() {
            return Err(DescriptorError::OutOfRange {
                field: "metrics",
                index: metric_index,
                len: metrics.len(),
            });
        }
        let aggregators = metrics.get(metric_index).map_or(0, |m| m.aggregators.len());
        if aggregator_index > aggregators {
            return Err(DescriptorError::OutOfRange {
                field: "aggregators",
                index: aggregator_index,
                len: aggregators,
            });
        }

        if metric_index == self.options.metrics.len() {
            debug!(metric_index, "QueryDescriptor::set_aggregator_sampling: appending metric");
            self.options.metrics.push(MetricSpec::default());
        }
        let metric = &mut self.options.metrics[metric_index];
        if aggregator_index == metric.aggregators.len() {
            debug!(aggregator_index, "QueryDescriptor::set_aggregator_sampling: appending aggregator");
            metric.aggregators.push(Aggregator::default());
        }

        metric.aggregators[aggregator_index].sampling = Some(Sampling { unit, value });
        Ok(())
    }

    /// Set a free-form option such as `tags`
    pub fn set_option(&mut self, key: impl Into<String>, value: Value) -> Result<(), DescriptorError> {
        let key = key.into();
        debug!(source_id = %self.source_id, %key, "QueryDescriptor::set_option: called");
        if RESERVED_OPTIONS.contains(&key.as_str()) {
            return Err(DescriptorError::ReservedOption(key));
        }
        self.options.extra.insert(key, value);
        Ok(())
    }

    pub fn remove_option(&mut self, key: &str) -> Option<Value> {
        self.options.extra.remove(key)
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn set_method(&mut self, method: HttpMethod) {
        self.method = method;
    }

    /// The JSON body sent to the datasource
    pub fn request_body(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.options)
    }
}
