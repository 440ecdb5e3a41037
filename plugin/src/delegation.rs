//! Plugin delegation.
//!
//! Sub-plugins (typically IPAM) are run with the same environment as the
//! calling plugin, except for `CNI_COMMAND`, which is always set explicitly:
//! a plugin rolling back an ADD passes [`Command::Del`] here rather than
//! touching its own environment.

use std::{
	env,
	path::{Path, PathBuf},
	process::{ExitStatus, Stdio},
};

use async_process::Command as Process;
use futures::io::{copy, AsyncWriteExt, Cursor};
use log::{debug, error, info};
use which::which_in;

use crate::{error::CniError, Command};

/// Run a plugin as delegate, returning its standard output.
///
/// The plugin is looked up in `search_path` (the runtime's `CNI_PATH`), and
/// given `payload` verbatim on standard input. STDERR is hooked up directly to
/// the calling process's STDERR.
///
/// If an ADD fails, a DEL is issued to the delegate before returning, so it
/// can release whatever it may have half-allocated.
///
/// # Errors
///
/// This method errors if:
/// - the current directory can’t be obtained
/// - the `search_path` doesn't contain the `sub_plugin`
/// - the delegate plugin can't be run, exits unsuccessfully, or outputs
///   nothing on ADD
pub async fn delegate(
	sub_plugin: &str,
	command: Command,
	payload: &[u8],
	search_path: &[PathBuf],
) -> Result<Vec<u8>, CniError> {
	let plugin = find_plugin(sub_plugin, search_path)?;

	match delegate_command(&plugin, command, payload).await {
		Ok((status, stdout)) => {
			if status.success() {
				if stdout.is_empty() && matches!(command, Command::Add) {
					cleanup(&plugin, command, payload).await;
					return Err(CniError::Delegated {
						plugin: sub_plugin.into(),
						err: Box::new(CniError::MissingOutput),
					});
				}

				Ok(stdout)
			} else {
				cleanup(&plugin, command, payload).await;
				Err(CniError::Delegated {
					plugin: sub_plugin.into(),
					err: Box::new(CniError::Generic(String::from_utf8_lossy(&stdout).into())),
				})
			}
		}
		Err(err) => {
			error!("error running delegate: {}", err);
			cleanup(&plugin, command, payload).await;
			Err(CniError::Delegated {
				plugin: sub_plugin.into(),
				err: Box::new(err),
			})
		}
	}
}

fn find_plugin(sub_plugin: &str, search_path: &[PathBuf]) -> Result<PathBuf, CniError> {
	let cwd = env::current_dir().map_err(|_| CniError::NoCwd)?;
	let paths = env::join_paths(search_path).map_err(|err| CniError::InvalidEnv {
		var: "CNI_PATH",
		err: Box::new(err),
	})?;

	which_in(sub_plugin, Some(paths), cwd).map_err(|err| CniError::MissingPlugin {
		name: sub_plugin.into(),
		err,
	})
}

async fn cleanup(plugin: &Path, command: Command, payload: &[u8]) {
	if !matches!(command, Command::Add) {
		return;
	}

	// We're already failing, so this is a Just In Case: ignore any failure.
	if let Err(err) = delegate_command(plugin, Command::Del, payload).await {
		debug!("cleanup DEL to {} failed too: {}", plugin.display(), err);
	}
}

async fn delegate_command(
	plugin: &Path,
	command: Command,
	stdin_bytes: &[u8],
) -> Result<(ExitStatus, Vec<u8>), CniError> {
	let command = command.as_ref();

	info!(
		"delegating to plugin at {} for command={}",
		plugin.display(),
		command
	);

	debug!("spawing child process, async=smol");
	let mut child = Process::new(plugin)
		.env("CNI_COMMAND", command)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.stderr(Stdio::inherit())
		.spawn()?;

	if let Some(mut stdin) = child.stdin.take() {
		debug!("copying bytes={} to stdin", stdin_bytes.len());
		let bytes = Cursor::new(stdin_bytes);
		let written = copy(bytes, &mut stdin).await?;
		debug!("wrote bytes={}, closing stdin", written);
		stdin.close().await?;
	}

	debug!("awaiting child");
	let output = child.output().await?;

	info!(
		"delegate plugin at {} for command={} has returned with {}; stdout bytes={}",
		plugin.display(),
		command,
		output.status,
		output.stdout.len()
	);
	Ok((output.status, output.stdout))
}
