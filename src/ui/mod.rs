//! Terminal output for the `layer` command
//!
//! Progress bars and prompts in interactive terminals, plain lines in CI
//! and when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use layer_sdk::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//! let state = Arc::new(TransferState::new());
//! let task = tokio::task::spawn_blocking(move || loader.load(&descriptor, &state));
//! let loaded = ui::track(&ctx, "Downloading a7c0", state, task).await??;
//! ui::step_ok(&ctx, "Loaded model");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{key_value, remark, step_info, step_ok, step_ok_detail, step_warn};
pub use progress::{summary, track, TransferProgress};
pub use prompts::confirm;
