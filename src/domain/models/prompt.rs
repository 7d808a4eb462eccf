//! Prompt patterns and prompt-set composition.
//!
//! Prompt negotiation is regex matching against the trailing output of a CLI
//! channel: the matched pattern tells the session which logical host (or
//! interactive question) the channel has actually reached. The expected
//! prompt handed to the transport is always the OR-union of the baseline
//! prompts, the role prompt of the hop being attempted, and the personal
//! user prompt.

use regex::{Regex, RegexBuilder};

/// Interactive password question, in any of the common shapes.
pub const PASSWORD_PROMPT: &str = ".*[Pp]assword[:|.*:]|.*password for.*: $";

/// Interactive continue? question.
pub const CONTINUE_PROMPT: &str = "you want to continue|CONTINUE|Press 'y'";

/// Prompt of the local workstation shell.
pub const LOCAL_PROMPT: &str = "\\[.*\\].->.$";

/// Shell prompt on controller and compute nodes.
pub const CONTROLLER_COMPUTE_PROMPT: &str = ".*@(controller|compute|storage).*:.*[#$].*";

/// Shell prompt on the orchestration host.
pub const ORCHESTRATOR_PROMPT: &str = "\\[.*@orch.*\\]#.*";

/// Shell prompt on the jump host.
pub const JUMP_HOST_PROMPT: &str = ".*@jump.*:.*[$].*";

/// Prompt of a personal (non-role) user shell.
pub const PERSONAL_USER_PROMPT: &str = "\n\\$.$";

/// Baseline prompts every session must be able to answer mid-negotiation.
pub fn baseline_prompts() -> String {
    [PASSWORD_PROMPT, CONTINUE_PROMPT, LOCAL_PROMPT].join("|")
}

/// Expected-prompt regex for a hop: baseline set, the hop's role prompt and
/// the personal user prompt OR-ed together.
pub fn expected_prompt_for(role_prompt: &str) -> String {
    format!("{}|{}|{}", baseline_prompts(), role_prompt, PERSONAL_USER_PROMPT)
}

/// Whether `pattern` is found anywhere in `text`, matching across lines.
pub fn find(text: &str, pattern: &str) -> Result<bool, regex::Error> {
    let re = RegexBuilder::new(pattern)
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()?;
    Ok(re.is_match(text))
}

/// Whether the full `prompt` string matches `pattern` (anchored, like the
/// original prompt-signature checks).
pub fn prompt_matches(prompt: &str, pattern: &str) -> Result<bool, regex::Error> {
    let re = Regex::new(&format!("^(?s:{pattern})$"))?;
    Ok(re.is_match(prompt))
}
