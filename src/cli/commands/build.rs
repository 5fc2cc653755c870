//! Build command - run the pipeline for one watershed

use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{BasinError, BasinResult};
use crate::manifest::Registry;
use crate::ops::GdalCli;
use crate::pipeline::{
    parse_meta, pretty_duration, Backends, BuildRequest, LocalInputs, PipelineOrchestrator,
    RegionId, RunSummary, Stage,
};
use crate::ui::{self, StageProgress, UiContext};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execute the build command
pub async fn execute(mut args: BuildArgs, config: &Config, cancel: CancellationToken) -> BasinResult<()> {
    let cache_dir = args
        .download
        .take()
        .unwrap_or_else(|| ConfigManager::cache_dir(config));
    let request = build_request(args, config)?;
    let ctx = UiContext::detect();

    if !GdalCli::is_available().await {
        return Err(BasinError::command_failed(
            "gdalinfo --version",
            std::io::Error::new(std::io::ErrorKind::NotFound, "GDAL tools not found on PATH"),
        ));
    }

    let mut registry = Registry::builtin()?;
    if let Some(path) = &config.general.layer_descriptions {
        registry = registry.with_descriptions(path).await?;
    }

    ui::intro(&ctx, &format!("Watershed context for HUC {}", request.region));
    ui::step_info(&ctx, &format!("Download cache: {}", cache_dir.display()));
    debug!("Scratch: {}", request.scratch_dir.display());
    let (tx, rx) = watch::channel(Stage::Init);
    let progress = StageProgress::follow(&ctx, request.region.as_str(), rx);

    let result = PipelineOrchestrator::new(
        config,
        registry,
        Backends::production(config),
        cache_dir,
        cancel,
    )
    .with_progress(tx)
    .run(&request)
    .await;
    progress.finish();

    match result {
        Ok(outcome) => {
            print_summary(&ctx, &outcome.summary);
            let message = format!("Manifest written to {}", outcome.manifest.display());
            if outcome.summary.omitted.is_empty() && outcome.summary.warnings.is_empty() {
                ui::outro_success(&ctx, &message);
            } else {
                ui::outro_warn(&ctx, &message);
            }
            Ok(())
        }
        Err(e) => {
            ui::step_error(&ctx, &format!("Build of {} failed", request.region));
            Err(e)
        }
    }
}

/// Validate the arguments and merge in configured defaults
fn build_request(args: BuildArgs, config: &Config) -> BasinResult<BuildRequest> {
    let region = RegionId::new(&args.region)?;
    let meta = match args.meta.as_deref() {
        Some(raw) => parse_meta(raw)?,
        None => Vec::new(),
    };
    let inputs = LocalInputs {
        landfire_dir: args.landfire,
        ownership: args.ownership,
        fair_market: args.fair_market,
        ecoregions: args.ecoregions,
        states: args.states,
        counties: args.counties,
        geology: args.geology,
        climate_dir: args.climate,
    }
    .or_config(&config.inputs);

    Ok(BuildRequest {
        region,
        scratch_dir: args
            .scratch
            .unwrap_or_else(|| std::env::temp_dir().join("basin")),
        output_dir: args.output,
        force: args.force,
        parallel: args.parallel,
        meta,
        inputs,
    })
}

fn print_summary(ctx: &UiContext, summary: &RunSummary) {
    ui::section(ctx, "Summary");
    ui::key_value(ctx, "Datasets", &summary.recorded.len().to_string());
    ui::key_value(
        ctx,
        "Downloads",
        &format!("{} new, {} cached", summary.downloaded, summary.cached),
    );
    ui::key_value(
        ctx,
        "Rasters",
        &format!("{} built, {} reused", summary.rebuilt, summary.reused),
    );
    if let Some(elapsed) = summary.elapsed {
        ui::key_value(ctx, "Elapsed", &pretty_duration(elapsed.as_secs_f64()));
    }
    if summary.omitted.is_empty() {
        ui::step_ok(ctx, "Every dataset recorded");
    }
    for omission in &summary.omitted {
        ui::step_warn_hint(ctx, &format!("{} omitted", omission.dataset), &omission.reason);
    }
    for warning in &summary.warnings {
        ui::step_warn(ctx, warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(argv: &[&str]) -> BuildArgs {
        match Cli::parse_from(argv).command {
            Commands::Build(args) => args,
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn request_merges_configured_inputs() {
        let mut config = Config::default();
        config.inputs.geology = Some(PathBuf::from("/config/geology.shp"));
        config.inputs.states = Some(PathBuf::from("/config/states.shp"));

        let args = parse(&["basin", "build", "17010203", "-o", "out", "--states", "/cli/states.shp"]);
        let request = build_request(args, &config).unwrap();

        assert_eq!(request.region.as_str(), "17010203");
        assert_eq!(request.inputs.geology, Some(PathBuf::from("/config/geology.shp")));
        assert_eq!(request.inputs.states, Some(PathBuf::from("/cli/states.shp")));
        assert!(request.meta.is_empty());
    }

    #[test]
    fn invalid_region_is_rejected() {
        let args = parse(&["basin", "build", "17A1", "-o", "out"]);
        let err = build_request(args, &Config::default()).unwrap_err();
        assert!(matches!(err, BasinError::InvalidInput(_)));
    }

    #[test]
    fn malformed_meta_is_rejected() {
        let args = parse(&["basin", "build", "1701", "-o", "out", "--meta", "broken"]);
        assert!(build_request(args, &Config::default()).is_err());
    }
}
