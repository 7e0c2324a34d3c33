use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use cable::builder::falling_cable;
use cable::config::SceneConfig;
use protocol::Message;

/// Drops a cable fixed at one end and lets it swing under gravity.
#[derive(Parser)]
#[clap(name = "falling_cable")]
struct Opt {
	/// Scene configuration in RON format. Defaults reproduce the tutorial.
	#[clap(short, long, parse(from_os_str))]
	config: Option<PathBuf>,

	/// Number of steps to run.
	#[clap(short, long, default_value = "100")]
	steps: u64,

	/// Write one bincode `Message` frame per step to this file.
	#[clap(short, long, parse(from_os_str))]
	output: Option<PathBuf>,
}

fn main() {
	if let Err(err) = try_main() {
		eprintln!("{}", err);
		std::process::exit(1);
	}
}

fn try_main() -> Result<()> {
	let _ = env_logger::Builder::from_env("CABLE_LOG").try_init();
	let opt = Opt::parse();
	let scene = match opt.config.as_ref() {
		Some(path) => SceneConfig::load(path)?,
		None => SceneConfig::default(),
	};
	let (mut world, cable) = falling_cable(&scene)?;
	let mut out = match opt.output.as_ref() {
		Some(path) => Some(BufWriter::new(File::create(path)?)),
		None => None,
	};
	if let Some(out) = out.as_mut() {
		Message::WorldUpdate(world.snapshot()).write_to(out)?;
	}
	for _ in 0..opt.steps {
		let report = world.step()?;
		if let Some(out) = out.as_mut() {
			Message::WorldUpdate(world.snapshot()).write_to(out)?;
		}
		if let Some(end) = world.node(cable.free_end()) {
			log::info!(
				"t = {:.3}: free end at {:.4} {:.4} {:.4} ({} iterations)",
				report.time,
				end.pos[0],
				end.pos[1],
				end.pos[2],
				report.iterations
			);
		}
	}
	Ok(())
}
