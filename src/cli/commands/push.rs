//! Push command - upload a local directory

use crate::cli::args::PushArgs;
use crate::config::Config;
use crate::error::{LayerError, LayerResult};
use crate::transfer::{self, RemoteLocation, TransferState};
use crate::ui::{self, UiContext};
use std::sync::Arc;

/// Execute the push command
pub async fn execute(args: PushArgs, config: &Config) -> LayerResult<()> {
    let ctx = UiContext::detect();
    let location = RemoteLocation::parse(&args.location)?;
    if !args.dir.is_dir() {
        return Err(LayerError::User(format!(
            "{} is not a directory",
            args.dir.display()
        )));
    }
    let transport = transfer::create_transport(config)?;

    let state = Arc::new(TransferState::new());
    let task = {
        let state = Arc::clone(&state);
        let dir = args.dir.clone();
        let location = location.clone();
        tokio::task::spawn_blocking(move || transport.upload_dir(&dir, &location, &state))
    };

    let label = format!("Uploading {}", args.dir.display());
    ui::track(&ctx, &label, Arc::clone(&state), task)
        .await
        .map_err(|e| LayerError::Internal(format!("upload task failed: {e}")))??;

    ui::step_ok_detail(
        &ctx,
        &format!("Uploaded {} to {}", args.dir.display(), location),
        &ui::summary(&state.snapshot()),
    );
    Ok(())
}
