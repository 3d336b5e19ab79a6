//! Hook execution: runs a vendor's `pre_sync`/`post_sync` commands through
//! the platform shell (spec.md §4.5 steps 1 and 5).

use std::path::Path;
use std::process::Command;

use crate::config::CommandConfig;
use crate::error::VendorError;

pub enum HookPhase {
    PreSync,
    PostSync,
}

impl HookPhase {
    fn label(&self) -> &'static str {
        match self {
            HookPhase::PreSync => "pre_sync",
            HookPhase::PostSync => "post_sync",
        }
    }
}

/// Run every command in `config` against `cwd`, in order. The first
/// non-zero exit fails the whole vendor sync (spec.md §4.5, §7 HookFailed).
pub fn run_hooks(
    config: Option<&CommandConfig>,
    phase: HookPhase,
    cwd: &Path,
    vendor_name: &str,
) -> Result<(), VendorError> {
    let Some(config) = config else { return Ok(()) };

    for command in config.commands() {
        log::info!(
            "running {} hook for {vendor_name}{}",
            phase.label(),
            command.name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default()
        );

        let status = shell_command(&command.command)
            .current_dir(cwd)
            .status()
            .map_err(|e| VendorError::HookFailed {
                vendor: vendor_name.to_string(),
                command: format!("{} (spawn failed: {e})", command.command),
                exit_code: None,
            })?;

        if !status.success() {
            return Err(VendorError::HookFailed {
                vendor: vendor_name.to_string(),
                command: command.command.clone(),
                exit_code: status.code(),
            });
        }
    }

    Ok(())
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
