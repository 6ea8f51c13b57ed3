//! Time-series chart controller
//!
//! Follows the chart's x-axis: when the visible range changes the widget
//! switches to an absolute window at one-minute resolution and re-fetches.
//! Tag selections relayed by the page narrow the query the same way.

use serde_json::Value;
use tracing::debug;

use crate::descriptor::{QueryDescriptor, TimeUnit};
use crate::error::DescriptorError;
use crate::events::{DashboardEvent, EventKind};
use crate::renderer::WidgetRenderer;

/// Server cache hint while zoomed (milliseconds)
pub const ZOOM_CACHE_TIME_MS: u64 = 1000;

/// Sampling applied to the first metric while zoomed
pub const ZOOM_SAMPLING_UNIT: TimeUnit = TimeUnit::Minutes;
pub const ZOOM_SAMPLING_VALUE: &str = "1";

/// Option key carrying the selected tags
pub const TAGS_OPTION: &str = "tags";

pub fn install(renderer: &mut WidgetRenderer) {
    renderer.on(EventKind::AfterSetExtremes, |mut descriptor, event| {
        if let DashboardEvent::AfterSetExtremes { min, max } = event {
            apply_extremes(&mut descriptor, *min, *max)?;
        }
        Ok(Some(descriptor))
    });

    renderer.on(EventKind::UpdateTimeseries, |mut descriptor, event| {
        if let DashboardEvent::UpdateTimeseries { tags } = event {
            apply_tags(&mut descriptor, tags)?;
        }
        Ok(Some(descriptor))
    });
}

/// Zoom the descriptor to `[min, max]`
///
/// A descriptor without metrics gets a first metric entry holding the sampling.
pub fn apply_extremes(descriptor: &mut QueryDescriptor, min: i64, max: i64) -> Result<(), DescriptorError> {
    debug!(source_id = %descriptor.source_id(), min, max, "timeseries::apply_extremes: called");
    descriptor.set_absolute_window(min, max);
    descriptor.set_cache_hint(ZOOM_CACHE_TIME_MS);
    descriptor.set_sampling(0, ZOOM_SAMPLING_UNIT, ZOOM_SAMPLING_VALUE)
}

/// Replace the tag selection; an empty selection removes the option
pub fn apply_tags(descriptor: &mut QueryDescriptor, tags: &[String]) -> Result<(), DescriptorError> {
    debug!(source_id = %descriptor.source_id(), count = tags.len(), "timeseries::apply_tags: called");
    if tags.is_empty() {
        descriptor.remove_option(TAGS_OPTION);
        return Ok(());
    }
    let tags = tags.iter().cloned().map(Value::String).collect();
    descriptor.set_option(TAGS_OPTION, Value::Array(tags))
}
