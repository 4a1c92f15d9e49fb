use std::sync::Arc;

use anyhow::Result;
use stackplan::plan::LoggingEventSink;
use stackplan::{
    init_logging, BuildAction, Context, DestroyAction, GraphAction, MemoryProvider, PlanReport,
    StackerConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

const NO_TARGETS: Option<&[&str]> = None;

fn print_report(title: &str, report: &PlanReport) {
    println!("{title}: {}", report.outcome);
    for step in &report.steps {
        println!("  {:<16} {}", step.name, step.status);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(None)?;

    let path = std::env::args().nth(1).unwrap_or_else(|| "stacks.yaml".to_string());
    let config = StackerConfig::load_yaml_file(&path)?;
    info!(path = %path, stacks = config.stacks.len(), "loaded config");

    // Each operation takes three polls to settle, so the run is visible.
    let provider = Arc::new(
        MemoryProvider::new()
            .with_ticks(3)
            .with_outputs("demo-vpc", [("VpcId", "vpc-0a1b2c"), ("PublicSubnet", "subnet-1234")]),
    );
    let ctx = Arc::new(
        Context::new(&config, provider.clone())?.with_event_sink(Arc::new(LoggingEventSink)),
    );

    BuildAction::new(ctx.clone())
        .plan(NO_TARGETS)?
        .outline(Level::INFO, "Outline only; nothing has been submitted yet.")?;
    println!("{}", GraphAction::new(ctx.clone()).with_reduce(true).run(NO_TARGETS)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current polls");
            on_signal.cancel();
        }
    });

    let report = BuildAction::new(ctx.clone()).execute(NO_TARGETS, &cancel).await?;
    print_report("build", &report);
    if cancel.is_cancelled() {
        return Ok(());
    }

    let report = DestroyAction::new(ctx).execute(NO_TARGETS, &cancel).await?;
    print_report("destroy", &report);

    info!(calls = provider.calls().len(), "provider calls made");
    Ok(())
}
