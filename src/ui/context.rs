//! Detects whether output may use progress bars, colors and prompts

use std::io::IsTerminal;

const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// How the CLI should talk to the user
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Progress bars and prompts go to stderr, so that is what gets checked
    interactive: bool,
    /// `--yes`: answer confirmations without asking
    auto_yes: bool,
}

impl UiContext {
    pub fn detect() -> Self {
        let interactive = std::io::stderr().is_terminal()
            && std::io::stdin().is_terminal()
            && !CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self {
            interactive,
            auto_yes: false,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}
