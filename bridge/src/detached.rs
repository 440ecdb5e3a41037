//! Best-effort actions: sibling processes whose failure must not fail ADD.

use std::{
	path::Path,
	process::{Command, Stdio},
};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::error::AdvisoryError;

/// Starts sibling executables.
#[async_trait(?Send)]
pub trait Spawner {
	/// Start `program` and leave it running, without waiting for it.
	fn spawn_detached(&self, program: &Path, args: &[String]) -> Result<(), AdvisoryError>;

	/// Run `program` to completion, returning its combined output.
	async fn run(&self, program: &Path, args: &[String]) -> Result<String, AdvisoryError>;
}

/// Spawns real processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessSpawner;

#[async_trait(?Send)]
impl Spawner for ProcessSpawner {
	fn spawn_detached(&self, program: &Path, args: &[String]) -> Result<(), AdvisoryError> {
		let mut command = Command::new(program);
		command
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null());

		#[cfg(windows)]
		{
			use std::os::windows::process::CommandExt;
			const DETACHED_PROCESS: u32 = 0x0000_0008;
			const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
			command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
		}

		let child = command.spawn().map_err(|err| AdvisoryError::Launch {
			program: program.into(),
			err,
		})?;
		debug!("started {} pid={}", program.display(), child.id());
		Ok(())
	}

	async fn run(&self, program: &Path, args: &[String]) -> Result<String, AdvisoryError> {
		let output = async_process::Command::new(program)
			.args(args)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|err| AdvisoryError::Launch {
				program: program.into(),
				err,
			})?;

		let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
		combined.push_str(&String::from_utf8_lossy(&output.stderr));

		if output.status.success() {
			Ok(combined)
		} else {
			Err(AdvisoryError::Failed {
				program: program.into(),
				status: output.status.to_string(),
				output: combined,
			})
		}
	}
}

/// Start a process and forget it. Failure is logged, never returned.
pub fn launch<S: Spawner + ?Sized>(spawner: &S, program: &Path, args: &[String]) {
	info!("launching {} {}", program.display(), args.join(" "));
	advisory("detached launch", spawner.spawn_detached(program, args));
}

/// Log an advisory failure, keeping the value on success.
pub fn advisory<T>(what: &str, result: Result<T, AdvisoryError>) -> Option<T> {
	match result {
		Ok(value) => Some(value),
		Err(err) => {
			warn!("{} failed, continuing: {}", what, err);
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use async_std::task::block_on;

	use super::*;

	#[test]
	fn missing_program_is_advisory() {
		let dir = tempfile::tempdir().unwrap();
		let program = dir.path().join("not-here");

		let err = ProcessSpawner
			.spawn_detached(&program, &["-portid".into(), "x".into()])
			.unwrap_err();
		assert!(matches!(err, AdvisoryError::Launch { .. }));
		assert!(advisory("test", Err::<(), _>(err)).is_none());

		launch(&ProcessSpawner, &program, &[]);
	}

	#[test]
	fn run_reports_launch_failure() {
		let dir = tempfile::tempdir().unwrap();
		let err = block_on(ProcessSpawner.run(&dir.path().join("not-here"), &[])).unwrap_err();
		assert!(err.to_string().contains("not-here"));
	}
}
