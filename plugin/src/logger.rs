//! Logger installation and log file housekeeping.
//!
//! Plugins are short-lived processes whose standard output belongs to the
//! runtime, so logs go to standard error (warnings and up) and to one file
//! per invocation (everything from debug up).

use std::{
	env,
	fs::{self, OpenOptions},
	io,
	path::{Path, PathBuf},
	time::{Duration, SystemTime},
};

use log::debug;
use simplelog::{
	ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
	TerminalMode, WriteLogger,
};

use crate::CniArgs;

/// Environment variable overriding the log directory.
pub const LOG_DIR_ENV: &str = "BRIDGE_LOG_DIR";

/// Log files older than this are removed by [`remove_stale_logs`].
pub const LOG_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// The default configuration, quieting thread and target noise.
pub fn default_config() -> ConfigBuilder {
	let mut config = ConfigBuilder::new();
	config.set_thread_level(LevelFilter::Off);
	config.set_target_level(LevelFilter::Off);
	config
}

/// Directory where a plugin called `component` writes its logs.
///
/// `BRIDGE_LOG_DIR` if set; otherwise `<SystemDrive>\var\log\<component>` on
/// Windows and `/var/log/cni/<component>` elsewhere.
pub fn log_dir(component: &str) -> PathBuf {
	if let Some(dir) = env::var_os(LOG_DIR_ENV).filter(|d| !d.is_empty()) {
		return PathBuf::from(dir);
	}

	if cfg!(windows) {
		let drive = env::var("SystemDrive").unwrap_or_else(|_| "C:".into());
		PathBuf::from(format!("{}\\", drive))
			.join("var")
			.join("log")
			.join(component)
	} else {
		PathBuf::from("/var/log/cni").join(component)
	}
}

/// Name of the log file for one invocation.
///
/// Pod invocations are named after the pod and the command, so the ADD and
/// DEL of a pod sit side by side; anything else after the container.
pub fn log_file_name(component: &str, args: &CniArgs, command: &str, container_id: &str) -> String {
	match args.pod_name() {
		Some(pod) => format!("{}-{}-{}.log", component, pod, command),
		None => format!("{}-{}.log", component, container_id),
	}
}

/// Install the standard logger, writing the log file at `logfile`.
///
/// Also see [`install_logger_with_config`].
pub fn install_logger(logfile: impl AsRef<Path>) -> io::Result<()> {
	install_logger_with_config(logfile, default_config().build())
}

/// Install the standard logger, with configuration.
///
/// Warnings and errors always go to STDERR. If the log file can't be opened,
/// the error is returned and only the STDERR logger is installed, so the
/// plugin can still run and complain.
pub fn install_logger_with_config(logfile: impl AsRef<Path>, config: Config) -> io::Result<()> {
	let logfile = logfile.as_ref();
	let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
		LevelFilter::Warn,
		config.clone(),
		TerminalMode::Stderr,
		ColorChoice::Never,
	)];

	let file = logfile
		.parent()
		.map_or(Ok(()), fs::create_dir_all)
		.and_then(|_| OpenOptions::new().append(true).create(true).open(logfile));

	let outcome = match file {
		Ok(file) => {
			loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
			Ok(())
		}
		Err(err) => Err(err),
	};

	// Only fails if a logger is already installed, which is fine.
	CombinedLogger::init(loggers).ok();
	outcome
}

/// Remove regular files in `dir` last modified more than `max_age` ago.
///
/// Returns how many were removed. Entries that can't be inspected or removed
/// are skipped.
pub fn remove_stale_logs(dir: &Path, max_age: Duration) -> io::Result<usize> {
	let now = SystemTime::now();
	let mut removed = 0;
	for entry in fs::read_dir(dir)? {
		let entry = match entry {
			Ok(e) => e,
			Err(_) => continue,
		};

		let meta = match entry.metadata() {
			Ok(m) if m.is_file() => m,
			_ => continue,
		};

		let stale = meta
			.modified()
			.ok()
			.and_then(|m| now.duration_since(m).ok())
			.map_or(false, |age| age > max_age);

		if stale {
			debug!("removing stale log file {}", entry.path().display());
			if fs::remove_file(entry.path()).is_ok() {
				removed += 1;
			}
		}
	}

	Ok(removed)
}
