use std::env;

use async_std::task::block_on;
use log::{debug, error, info, warn};
use wincni::{
	config::NetworkConfig,
	error::CniError,
	logger,
	reply::{done, reply},
	version, Cni, CniArgs, Command,
};
use wincni_bridge::{Bridge, CniIpam, Hns, ProcessSpawner, Settings};

const COMPONENT: &str = "bridge";

const CNI_ENV: &[&str] = &[
	"CNI_COMMAND",
	"CNI_CONTAINERID",
	"CNI_NETNS",
	"CNI_IFNAME",
	"CNI_ARGS",
	"CNI_PATH",
];

fn main() {
	let args: CniArgs = env::var("CNI_ARGS")
		.ok()
		.and_then(|a| a.parse().ok())
		.unwrap_or_default();
	let command = env::var("CNI_COMMAND").unwrap_or_default();
	let container_id = env::var("CNI_CONTAINERID").unwrap_or_default();

	let log_dir = logger::log_dir(COMPONENT);
	let log_file = log_dir.join(logger::log_file_name(COMPONENT, &args, &command, &container_id));
	if let Err(err) = logger::install_logger(&log_file) {
		warn!("cannot open log file {}: {}", log_file.display(), err);
	}

	debug!(
		"{} (CNI plugin) version {}",
		env!("CARGO_PKG_NAME"),
		env!("CARGO_PKG_VERSION")
	);
	for var in CNI_ENV {
		debug!("{}={}", var, env::var(var).unwrap_or_default());
	}
	debug!("log file: {}", log_file.display());

	let settings = Settings::from_env();
	let inputs = match Cni::load() {
		Cni::Add(inputs) | Cni::Del(inputs) | Cni::Check(inputs) => inputs,
		Cni::Version(_) => unreachable!(),
	};

	let cni_version = NetworkConfig::from_slice(&inputs.payload)
		.map(|config| config.cni_version)
		.unwrap_or_else(|_| version::current());
	info!(
		"{} serving spec v{} for command={:?}",
		COMPONENT, cni_version, inputs.command
	);

	let bridge = Bridge::new(
		Hns,
		CniIpam::new(inputs.path.clone()),
		ProcessSpawner,
		settings,
	);

	let res = block_on(async {
		match inputs.command {
			Command::Add => bridge.add(&inputs).await.map(Some),
			Command::Del => bridge.del(&inputs).await.map(|_| None),
			Command::Check => {
				debug!("CHECK has nothing to verify");
				Ok(None)
			}
			Command::Version => unreachable!(),
		}
	});

	match logger::remove_stale_logs(&log_dir, logger::LOG_RETENTION) {
		Ok(0) => {}
		Ok(n) => debug!("removed {} stale log files", n),
		Err(err) => debug!("cannot clean up {}: {}", log_dir.display(), err),
	}

	match res {
		Ok(Some(result)) => reply(result),
		Ok(None) => done(),
		Err(err) => {
			error!("{}", err);
			reply(CniError::from(err).into_reply(cni_version))
		}
	}
}
