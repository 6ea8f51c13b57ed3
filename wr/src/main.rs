use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use serde_json::json;
use tracing::{info, level_filters::LevelFilter};

use widgetrenderer::cli::{Cli, Command};
use widgetrenderer::config::Config;
use widgetrenderer::events::{EventKind, PageEvent, create_event_bus};
use widgetrenderer::state::PresentationState;
use widgetrenderer::transport::{HttpTransport, Transport};
use widgetrenderer::view::{ViewDefinition, WidgetDefinition};

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Widgets of the view, or only `--widget`
fn select<'a>(view: &'a ViewDefinition, widget: Option<&str>) -> Result<Vec<&'a WidgetDefinition>> {
    match widget {
        Some(id) => view
            .widget(id)
            .map(|w| vec![w])
            .ok_or_else(|| eyre!("View '{}' has no widget '{}'", view.id, id)),
        None => Ok(view.widgets.iter().collect()),
    }
}

fn show(view: &ViewDefinition, widget: Option<&str>) -> Result<()> {
    println!("{} {}", view.id.cyan(), view.name.dimmed());
    for w in select(view, widget)? {
        let body = w
            .datasource
            .request_body()
            .context(format!("Failed to serialize request body of '{}'", w.card_id))?;
        println!(
            "\n{} {} {}",
            w.card_id.yellow(),
            format!("{:?}", w.datasource.method()).to_uppercase(),
            w.datasource.url().unwrap_or("-")
        );
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(())
}

async fn fetch(
    config: &Config,
    view: &ViewDefinition,
    widget: Option<&str>,
    extremes: Option<(i64, i64)>,
    tags: Vec<String>,
) -> Result<()> {
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(&config.transport).context("Failed to create HTTP transport")?);
    let bus = create_event_bus(config.bus.channel_capacity);

    let mut running = Vec::new();
    for w in select(view, widget)? {
        let renderer = w.build(Arc::clone(&transport))?;
        let rx = bus.subscribe();
        running.push((w.card_id.clone(), tokio::spawn(renderer.run(rx))));
    }

    if let Some((min, max)) = extremes {
        bus.emit(PageEvent::page(
            EventKind::AfterSetExtremes.name(),
            json!({"min": min, "max": max}),
        ));
    }
    if !tags.is_empty() {
        bus.emit(PageEvent::page(EventKind::UpdateTimeseries.name(), json!({"tags": tags})));
    }

    // Closing the bus lets every run loop drain and return
    drop(bus);

    let mut failed = 0;
    for (card_id, handle) in running {
        let state = handle
            .await
            .context(format!("Widget task '{}' did not complete", card_id))?;
        if state.error {
            failed += 1;
        }
        print_state(&card_id, &state)?;
    }

    if failed > 0 {
        return Err(eyre!("{} widget(s) failed to load", failed));
    }
    Ok(())
}

fn print_state(card_id: &str, state: &PresentationState) -> Result<()> {
    let marker = if state.error { "✗".red() } else { "✓".green() };
    println!(
        "{} {} {}",
        marker,
        card_id.yellow(),
        format!("(request {})", state.request_id).dimmed()
    );
    match &state.result {
        Some(result) => println!("{}", serde_json::to_string_pretty(result)?),
        None => println!("{}", "no result".dimmed()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("wr starting");

    match cli.command {
        Command::Show { view, widget } => {
            let view = ViewDefinition::from_file(&view)?;
            show(&view, widget.as_deref())
        }
        Command::Fetch {
            view,
            widget,
            extremes,
            tags,
        } => {
            let view = ViewDefinition::from_file(&view)?;
            fetch(&config, &view, widget.as_deref(), extremes, tags).await
        }
    }
}
