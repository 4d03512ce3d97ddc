//! Terminal output for the CLI
//!
//! Uses `cliclack` for spinners and prompts in an interactive terminal and
//! falls back to plain, prefix-tagged lines in CI or when piped.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, outro_success, remark, step_info, step_ok, step_ok_detail, step_warn_hint,
};
pub use progress::TaskSpinner;
pub use prompts::confirm;
