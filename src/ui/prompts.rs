//! Confirmation prompt with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{LayerError, LayerResult};

/// Ask a yes/no question
///
/// `--yes` answers true. Without a terminal the question cannot be asked
/// and `default` is returned.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> LayerResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| LayerError::Internal(format!("prompt task failed: {e}")))?
    .map_err(|e| LayerError::User(format!("Prompt failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_yes_skips_prompt() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Clear cache?", false).await.unwrap());
    }

    #[tokio::test]
    async fn non_interactive_uses_default() {
        let ctx = UiContext::non_interactive();
        assert!(!confirm(&ctx, "Clear cache?", false).await.unwrap());
        assert!(confirm(&ctx, "Clear cache?", true).await.unwrap());
    }
}
