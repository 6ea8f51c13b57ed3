//! View definitions as returned by a view service
//!
//! ```yaml
//! id: context.myview
//! name: My View
//! widgets:
//!   - cardId: cpu-chart
//!     size: half
//!     controller: TimeseriesWidgetRendererCtrl
//!     datasource:
//!       source_id: cpu
//!       url: /api/v1/datapoints/query
//!       options:
//!         start_relative: 1h
//!         metrics:
//!           - name: cpu.usage
//!             aggregators:
//!               - name: avg
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controllers;
use crate::descriptor::QueryDescriptor;
use crate::renderer::WidgetRenderer;
use crate::transport::Transport;

/// One dashboard view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub widgets: Vec<WidgetDefinition>,
}

/// One widget on a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDefinition {
    /// Widget id, unique within the view
    #[serde(rename = "cardId")]
    pub card_id: String,

    /// Layout hint for the host page, e.g. "half"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Controller name; the default controller when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    pub datasource: QueryDescriptor,
}

impl ViewDefinition {
    /// Load a view from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "ViewDefinition::from_file: called");
        let content = fs::read_to_string(path).context(format!("Failed to read view file {}", path.display()))?;
        let view = Self::from_yaml(&content).context(format!("Failed to load view from {}", path.display()))?;
        info!(id = %view.id, widgets = view.widgets.len(), "Loaded view");
        Ok(view)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let view: Self = serde_yaml::from_str(content).context("Failed to parse view definition")?;
        view.validate()?;
        Ok(view)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for widget in &self.widgets {
            if !seen.insert(widget.card_id.as_str()) {
                bail!("View '{}' has duplicate cardId '{}'", self.id, widget.card_id);
            }
        }
        Ok(())
    }

    pub fn widget(&self, card_id: &str) -> Option<&WidgetDefinition> {
        self.widgets.iter().find(|w| w.card_id == card_id)
    }

    /// Build a renderer for every widget, in view order
    pub fn build(&self, transport: Arc<dyn Transport>) -> Result<Vec<WidgetRenderer>> {
        self.widgets
            .iter()
            .map(|w| w.build(Arc::clone(&transport)))
            .collect()
    }
}

impl WidgetDefinition {
    /// Build the widget's renderer with its configured controller
    pub fn build(&self, transport: Arc<dyn Transport>) -> Result<WidgetRenderer> {
        controllers::build(
            self.controller.as_deref(),
            self.card_id.clone(),
            self.datasource.clone(),
            transport,
        )
        .context(format!("Failed to build widget '{}'", self.card_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::mock::FixedTransport;
    use crate::descriptor::{RelativeTime, TimeUnit, TimeWindow};
    use crate::events::{EventKind, PageEvent};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VIEW: &str = r#"
id: context.myview
name: My View
widgets:
  - cardId: cpu-chart
    size: half
    controller: TimeseriesWidgetRendererCtrl
    datasource:
      source_id: cpu
      url: /api/v1/datapoints/query
      options:
        start_relative: 1h
        metrics:
          - name: cpu.usage
            aggregators:
              - name: avg
  - cardId: host-table
    datasource:
      source_id: hosts
      method: GET
      options:
        start_relative:
          value: "30"
          unit: minutes
        region: us-east
"#;

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(VIEW.as_bytes()).unwrap();

        let view = ViewDefinition::from_file(file.path()).unwrap();
        assert_eq!(view.id, "context.myview");
        assert_eq!(view.widgets.len(), 2);

        let chart = view.widget("cpu-chart").unwrap();
        assert_eq!(chart.size.as_deref(), Some("half"));
        assert_eq!(chart.controller.as_deref(), Some(controllers::TIMESERIES_CONTROLLER));
        assert_eq!(chart.datasource.url(), Some("/api/v1/datapoints/query"));

        let table = view.widget("host-table").unwrap();
        assert_eq!(table.controller, None);
        assert_eq!(
            table.datasource.window(),
            TimeWindow::Relative {
                start: RelativeTime::new(30, TimeUnit::Minutes),
                end: None
            }
        );
        assert_eq!(table.datasource.options().get("region"), Some(&json!("us-east")));
    }

    #[test]
    fn test_missing_file() {
        let err = ViewDefinition::from_file("/nonexistent/view.yml").unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read view file"));
    }

    #[test]
    fn test_conflicting_window_is_rejected() {
        let yaml = r#"
id: v
name: V
widgets:
  - cardId: w
    datasource:
      source_id: s
      options:
        start_relative: 1h
        start_absolute: 1000
"#;
        let err = ViewDefinition::from_yaml(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("both an absolute and a relative"));
    }

    #[test]
    fn test_duplicate_card_id_is_rejected() {
        let yaml = r#"
id: v
name: V
widgets:
  - cardId: w
    datasource: {source_id: a, options: {start_relative: 1h}}
  - cardId: w
    datasource: {source_id: b, options: {start_relative: 1h}}
"#;
        let err = ViewDefinition::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate cardId"));
    }

    #[tokio::test]
    async fn test_build_applies_controller() {
        let view = ViewDefinition::from_yaml(VIEW).unwrap();
        let transport = Arc::new(FixedTransport::ok(json!([])));
        let mut renderers = view.build(transport).unwrap();
        assert_eq!(renderers.len(), 2);

        // Only the time-series widget follows the chart's axis
        let extremes = PageEvent::page("after-set-extremes", json!({"min": 1, "max": 2}));
        assert_eq!(renderers[0].handle(&extremes).len(), 1);
        assert!(renderers[1].handle(&extremes).is_empty());
        assert_eq!(renderers[1].handle(&PageEvent::page(EventKind::Refresh.name(), json!(null))).len(), 1);
    }

    #[test]
    fn test_unknown_controller_fails_build() {
        let yaml = r#"
id: v
name: V
widgets:
  - cardId: w
    controller: NoSuchCtrl
    datasource: {source_id: a, options: {start_relative: 1h}}
"#;
        let view = ViewDefinition::from_yaml(yaml).unwrap();
        let err = view.build(Arc::new(FixedTransport::ok(json!(1)))).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("Failed to build widget 'w'"));
        assert!(msg.contains("NoSuchCtrl"));
    }
}
