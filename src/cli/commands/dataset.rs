//! Dataset command - fetch a dataset build and list its files

use crate::cli::args::{DatasetArgs, OutputFormat};
use crate::config::Config;
use crate::dataset::{DatasetDescriptor, DatasetFile, LoadedDataset};
use crate::error::{LayerError, LayerResult};
use crate::loader::ArtifactLoader;
use crate::transfer::{format_bytes, TransferState};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the dataset command
pub async fn execute(args: DatasetArgs, config: &Config) -> LayerResult<()> {
    let ctx = UiContext::detect();
    let descriptor = DatasetDescriptor::parse(&args.location, &args.build)?;
    let loader = ArtifactLoader::from_config(config)?;
    let loader = loader.with_no_cache(args.no_cache || !config.cache.enabled);

    let cached = !loader.no_cache() && loader.cache().get_path(&descriptor.build_id).is_some();
    debug!("Fetching dataset {} (cached: {})", descriptor.build_id, cached);

    let state = Arc::new(TransferState::new());
    let task = {
        let state = Arc::clone(&state);
        let loader = loader.clone();
        let descriptor = descriptor.clone();
        tokio::task::spawn_blocking(move || loader.load_dataset(&descriptor, &state))
    };

    // JSON output stays machine readable, so no progress bar either
    let joined = if cached || matches!(args.format, OutputFormat::Json) {
        task.await
    } else {
        let label = format!("Downloading dataset {}", descriptor.build_id);
        ui::track(&ctx, &label, Arc::clone(&state), task).await
    };
    let dataset =
        joined.map_err(|e| LayerError::Internal(format!("dataset task failed: {e}")))??;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(dataset.files())?),
        OutputFormat::Plain => {
            for file in dataset.files() {
                println!("{}", file.name);
            }
        }
        OutputFormat::Table => {
            report(&ctx, &descriptor, &dataset, &state);
            print_table(dataset.files());
        }
    }
    Ok(())
}

fn report(
    ctx: &UiContext,
    descriptor: &DatasetDescriptor,
    dataset: &LoadedDataset,
    state: &TransferState,
) {
    if dataset.from_cache() {
        ui::step_ok(ctx, &format!("Loaded dataset {} from cache", descriptor.build_id));
    } else {
        ui::step_ok_detail(
            ctx,
            &format!("Fetched dataset {}", descriptor.build_id),
            &ui::summary(&state.snapshot()),
        );
    }
    match dataset.cached_path() {
        Some(path) => ui::key_value(ctx, "path", &path.display().to_string()),
        None => ui::key_value(ctx, "path", "(not cached)"),
    }
    ui::key_value(
        ctx,
        "size",
        &format!(
            "{} file(s), {}",
            dataset.files().len(),
            format_bytes(dataset.total_bytes())
        ),
    );
}

fn print_table(files: &[DatasetFile]) {
    println!();
    println!("{:<60} {:>10}", "FILE", "SIZE");
    println!("{}", "-".repeat(71));
    for file in files {
        println!("{:<60} {:>10}", file.name, format_bytes(file.size));
    }
}
