//! Cache command - inspect and clean the local artifact cache

use crate::cache::{CacheEntry, CacheKey, LocalCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::{LayerError, LayerResult};
use crate::ui::{self, UiContext};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> LayerResult<()> {
    let cache = LocalCache::from_config(config);

    match args.action {
        CacheAction::Path => {
            println!("{}", cache.root().display());
            Ok(())
        }
        CacheAction::List { format } => list_entries(&cache, format),
        CacheAction::Remove { key } => remove_entry(&cache, &key).await,
        CacheAction::Clear { yes } => clear_cache(&cache, yes).await,
    }
}

fn list_entries(cache: &LocalCache, format: OutputFormat) -> LayerResult<()> {
    let entries = cache.entries()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.key);
            }
        }
        OutputFormat::Table if entries.is_empty() => println!("No cached artifacts."),
        OutputFormat::Table => print_table(&entries),
    }
    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    println!("{:<40} {:>10} {:>6} {:<17}", "KEY", "SIZE", "FILES", "CACHED");
    println!("{}", "-".repeat(76));

    for entry in entries {
        println!(
            "{:<40} {:>10} {:>6} {:<17}",
            entry.key,
            entry.size_display(),
            entry.file_count,
            entry.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "Total: {} artifact(s), {}",
        entries.len(),
        crate::transfer::format_bytes(total)
    );
}

/// Run cache IO off the async runtime; removal may wait on a key lock
async fn blocking<T, F>(work: F) -> LayerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LayerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LayerError::Internal(format!("cache task failed: {e}")))?
}

async fn remove_entry(cache: &LocalCache, key: &str) -> LayerResult<()> {
    let ctx = UiContext::detect();
    let key = CacheKey::new(key)?;

    let removed = {
        let cache = cache.clone();
        let key = key.clone();
        blocking(move || cache.remove(&key)).await?
    };
    if removed {
        ui::step_ok(&ctx, &format!("Removed {}", key));
    } else {
        ui::step_warn(&ctx, &format!("{} is not cached", key));
    }
    Ok(())
}

async fn clear_cache(cache: &LocalCache, yes: bool) -> LayerResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let prompt = format!("Delete all cached artifacts in {}?", cache.root().display());
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_info(&ctx, "Cache left untouched (pass --yes to skip the prompt)");
        return Ok(());
    }

    {
        let cache = cache.clone();
        blocking(move || cache.clear()).await?;
    }
    ui::step_ok_detail(&ctx, "Cache cleared", &cache.root().display().to_string());
    Ok(())
}
