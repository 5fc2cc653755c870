//! Progress indicators with CI fallback

use super::context::UiContext;
use console::style;
use crate::pipeline::Stage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    message: String,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            message: String::new(),
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        self.message = message.to_string();

        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            // Plain output for CI
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Update the spinner message
    pub fn message(&mut self, message: &str) {
        self.message = message.to_string();

        if let Some(ref spinner) = self.spinner {
            spinner.start(message);
        }
        // No output in plain mode for message updates
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            // Fallback if spinner wasn't started
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }

    /// Stop with warning message
    pub fn stop_warn(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("!").yellow(), message);
        } else {
            println!("{} {}", style("[WARN]").yellow(), message);
        }
    }

    /// Clear the spinner without any message
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Progress bar over the pipeline stages.
///
/// Follows a stage channel and shows an indicatif bar in interactive
/// mode, or one line per completed stage in CI.
pub struct StageProgress {
    bar: Option<ProgressBar>,
    follower: JoinHandle<()>,
}

impl StageProgress {
    /// Start following `rx` until the pipeline reaches a terminal stage
    pub fn follow(ctx: &UiContext, label: &str, mut rx: watch::Receiver<Stage>) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(STAGE_COUNT);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.blue} {prefix}  {bar:20.blue/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(template.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"));
            bar.set_prefix(label.to_string());
            bar.set_message(describe_next(Stage::Init));
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Building {}...", label);
            None
        };

        let shown = bar.clone();
        let follower = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let stage = *rx.borrow_and_update();
                match &shown {
                    Some(bar) => {
                        bar.set_position(stage_position(stage));
                        bar.set_message(describe_next(stage));
                    }
                    None if stage != Stage::Failed => println!("  {}/{}: {}", stage_position(stage), STAGE_COUNT, stage),
                    None => {}
                }
                if stage.is_terminal() {
                    break;
                }
            }
        });
        Self { bar, follower }
    }

    /// Stop following and clear the bar
    pub fn finish(self) {
        self.follower.abort();
        if let Some(bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Stages shown on the bar, from sources fetched to manifest written
const STAGE_COUNT: u64 = 5;

fn stage_position(stage: Stage) -> u64 {
    match stage {
        Stage::Init | Stage::Failed => 0,
        Stage::SourcesFetched => 1,
        Stage::DerivedArtifactsReady => 2,
        Stage::VectorLayersPrepared => 3,
        Stage::Segmented => 4,
        Stage::ManifestWritten | Stage::Done => STAGE_COUNT,
    }
}

/// What the pipeline is working on after reaching `stage`
fn describe_next(stage: Stage) -> String {
    match stage {
        Stage::Init => "fetching sources",
        Stage::SourcesFetched => "deriving rasters",
        Stage::DerivedArtifactsReady => "preparing vector layers",
        Stage::VectorLayersPrepared => "segmenting network",
        Stage::Segmented => "writing manifest",
        Stage::ManifestWritten | Stage::Done => "done",
        Stage::Failed => "failed",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Testing...");
        spinner.stop("Done");
    }

    #[test]
    fn positions_follow_stage_order() {
        let mut stage = Stage::Init;
        let mut last = stage_position(stage);
        while let Some(next) = stage.next() {
            assert!(stage_position(next) >= last);
            last = stage_position(next);
            stage = next;
        }
        assert_eq!(last, STAGE_COUNT);
    }

    #[test]
    fn describes_work_after_each_stage() {
        assert_eq!(describe_next(Stage::Init), "fetching sources");
        assert_eq!(describe_next(Stage::Segmented), "writing manifest");
    }

    #[tokio::test]
    async fn stage_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let (tx, rx) = watch::channel(Stage::Init);
        let progress = StageProgress::follow(&ctx, "1701", rx);
        tx.send_replace(Stage::SourcesFetched);
        tx.send_replace(Stage::Done);
        tokio::task::yield_now().await;
        progress.finish();
    }
}
