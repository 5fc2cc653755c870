//! Terminal detection for styled vs plain output

use std::io::IsTerminal;

/// CI systems that set their own marker variable
const CI_VARS: [&str; 6] = [
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// Decides whether output is styled and whether prompts may block
#[derive(Debug, Clone)]
pub struct UiContext {
    /// stdout is a terminal and no CI marker is set
    fancy: bool,
    /// stdin is a terminal too, so prompts can be answered
    can_prompt: bool,
    /// `--yes` was given
    auto_yes: bool,
}

impl UiContext {
    /// Inspect the current process
    pub fn detect() -> Self {
        let unattended = CI_VARS.iter().any(|v| std::env::var_os(v).is_some())
            || std::env::var("TERM").is_ok_and(|t| t == "dumb");
        let fancy = !unattended && std::io::stdout().is_terminal();
        Self {
            fancy,
            can_prompt: fancy && std::io::stdin().is_terminal(),
            auto_yes: false,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            fancy: false,
            can_prompt: false,
            auto_yes: false,
        }
    }

    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.can_prompt
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners, bars and cliclack framing
    pub fn use_fancy_output(&self) -> bool {
        self.fancy
    }
}
