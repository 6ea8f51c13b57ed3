//! Event types carried on the page bus
//!
//! On the wire an event is just a name and a JSON payload. Widgets only react
//! to the closed set in [`DashboardEvent`]; any other name is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who raised a page event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOrigin {
    /// The rendering surface wrapped by one widget; only that widget sees it
    Surface { widget_id: String },
    /// The host page; every widget sees it
    Page,
}

/// An event as it travels on the bus
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageEvent {
    pub origin: EventOrigin,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl PageEvent {
    /// Event raised by a widget's own surface
    pub fn surface(widget_id: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: EventOrigin::Surface {
                widget_id: widget_id.into(),
            },
            name: name.into(),
            payload,
        }
    }

    /// Event broadcast by the page to every widget
    pub fn page(name: impl Into<String>, payload: Value) -> Self {
        Self {
            origin: EventOrigin::Page,
            name: name.into(),
            payload,
        }
    }

    /// Whether a widget should see this event
    pub fn is_for(&self, widget_id: &str) -> bool {
        match &self.origin {
            EventOrigin::Page => true,
            EventOrigin::Surface { widget_id: source } => source == widget_id,
        }
    }
}

/// Names of the events widgets react to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    AfterSetExtremes,
    UpdateTimeseries,
    Refresh,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::AfterSetExtremes => "after-set-extremes",
            EventKind::UpdateTimeseries => "update-timeseries",
            EventKind::Refresh => "refresh",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "after-set-extremes" => Some(EventKind::AfterSetExtremes),
            "update-timeseries" => Some(EventKind::UpdateTimeseries),
            "refresh" => Some(EventKind::Refresh),
            _ => None,
        }
    }
}

/// Typed payload of a recognized event
#[derive(Clone, Debug, PartialEq)]
pub enum DashboardEvent {
    /// A chart's x-axis range changed (epoch milliseconds)
    AfterSetExtremes { min: i64, max: i64 },
    /// Tags selected on a sibling widget, relayed by the page
    UpdateTimeseries { tags: Vec<String> },
    /// Re-fetch with the current descriptor
    Refresh,
}

#[derive(Deserialize)]
struct ExtremesPayload {
    min: f64,
    max: f64,
}

#[derive(Deserialize)]
struct TagsPayload {
    tags: Vec<String>,
}

/// Round an axis value to epoch milliseconds, rejecting what `i64` cannot hold
fn epoch_millis(value: f64) -> Result<i64, serde_json::Error> {
    let rounded = value.round();
    // -2^63 is exact in f64; 2^63 is the first value past i64::MAX
    if (i64::MIN as f64..-(i64::MIN as f64)).contains(&rounded) {
        Ok(rounded as i64)
    } else {
        Err(serde::de::Error::custom(format!("extreme {value} is outside the epoch millisecond range")))
    }
}

impl DashboardEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DashboardEvent::AfterSetExtremes { .. } => EventKind::AfterSetExtremes,
            DashboardEvent::UpdateTimeseries { .. } => EventKind::UpdateTimeseries,
            DashboardEvent::Refresh => EventKind::Refresh,
        }
    }

    /// Parse a wire event; `Ok(None)` for names outside the closed set
    pub fn parse(name: &str, payload: &Value) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = EventKind::from_name(name) else {
            return Ok(None);
        };

        let event = match kind {
            EventKind::AfterSetExtremes => {
                // Chart libraries report extremes as floats
                let p: ExtremesPayload = serde_json::from_value(payload.clone())?;
                DashboardEvent::AfterSetExtremes {
                    min: epoch_millis(p.min)?,
                    max: epoch_millis(p.max)?,
                }
            }
            EventKind::UpdateTimeseries => {
                let p: TagsPayload = serde_json::from_value(payload.clone())?;
                DashboardEvent::UpdateTimeseries { tags: p.tags }
            }
            EventKind::Refresh => DashboardEvent::Refresh,
        };
        Ok(Some(event))
    }

    /// Wire form of this event
    pub fn to_payload(&self) -> Value {
        match self {
            DashboardEvent::AfterSetExtremes { min, max } => serde_json::json!({"min": min, "max": max}),
            DashboardEvent::UpdateTimeseries { tags } => serde_json::json!({"tags": tags}),
            DashboardEvent::Refresh => Value::Null,
        }
    }
}
