//! Terminal output for the CLI
//!
//! Uses `cliclack` for styled output in a terminal and falls back to
//! plain lines in CI or when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use basin::ui::{self, UiContext, StageProgress};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "Watershed context for HUC 1701020301");
//!
//! let progress = StageProgress::follow(&ctx, "1701020301", rx);
//! // ... run the pipeline ...
//! progress.finish();
//!
//! ui::step_warn_hint(&ctx, "GEOLOGY omitted", "no geology dataset configured");
//! ui::outro_success(&ctx, "Manifest written");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, note, outro_success, outro_warn, remark, section, step_error, step_info,
    step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{StageProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::init_theme;
