//! Fetch command - load an artifact through the cache

use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{LayerError, LayerResult};
use crate::flavor::ModelObject;
use crate::loader::{ArtifactDescriptor, ArtifactLoader};
use crate::transfer::{format_bytes, TransferState};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> LayerResult<()> {
    let ctx = UiContext::detect();
    let descriptor = ArtifactDescriptor::parse(&args.location, &args.key, args.flavor)?;
    let loader = ArtifactLoader::from_config(config)?;
    let loader = loader.with_no_cache(args.no_cache || !config.cache.enabled);

    let cached = !loader.no_cache() && loader.cache().get_path(&descriptor.key).is_some();
    debug!("Fetching {} (cached: {})", descriptor.key, cached);

    let state = Arc::new(TransferState::new());
    let task = {
        let state = Arc::clone(&state);
        let loader = loader.clone();
        let descriptor = descriptor.clone();
        tokio::task::spawn_blocking(move || loader.load(&descriptor, &state))
    };

    let joined = if cached {
        task.await
    } else {
        let label = format!("Downloading {}", descriptor.key);
        ui::track(&ctx, &label, Arc::clone(&state), task).await
    };
    let loaded = joined.map_err(|e| LayerError::Internal(format!("fetch task failed: {e}")))??;

    if loaded.from_cache {
        ui::step_ok(&ctx, &format!("Loaded {} from cache", descriptor.key));
    } else {
        ui::step_ok_detail(
            &ctx,
            &format!("Fetched {}", descriptor.key),
            &ui::summary(&state.snapshot()),
        );
    }

    ui::key_value(&ctx, "flavor", descriptor.flavor.as_str());
    match loaded.path {
        Some(ref path) => ui::key_value(&ctx, "path", &path.display().to_string()),
        None => ui::key_value(&ctx, "path", "(not cached)"),
    }
    ui::key_value(&ctx, "contents", &describe(&loaded.object));
    Ok(())
}

/// Short human description of a loaded object
fn describe(object: &ModelObject) -> String {
    match object {
        ModelObject::Json(serde_json::Value::Object(map)) => {
            format!("JSON object with {} field(s)", map.len())
        }
        ModelObject::Json(_) => "JSON value".to_string(),
        ModelObject::Tensors(tensors) => {
            let bytes: u64 = tensors.values().map(|t| t.data().len() as u64).sum();
            format!("{} tensor(s), {}", tensors.len(), format_bytes(bytes))
        }
        ModelObject::Bytes(bytes) => format!("binary blob, {}", format_bytes(bytes.len() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::{Tensor, TensorMap};
    use serde_json::json;

    #[test]
    fn describe_objects() {
        assert_eq!(
            describe(&ModelObject::Json(json!({"a": 1, "b": 2}))),
            "JSON object with 2 field(s)"
        );
        assert_eq!(describe(&ModelObject::Bytes(vec![0; 2048])), "binary blob, 2.0 KB");

        let mut tensors = TensorMap::new();
        tensors.insert("w".into(), Tensor::from_f32(vec![4], &[0.0; 4]).unwrap());
        assert_eq!(describe(&ModelObject::Tensors(tensors)), "1 tensor(s), 16 B");
    }
}
