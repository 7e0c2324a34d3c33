use std::time::Instant;

use cable::builder::falling_cable;
use cable::config::SceneConfig;

fn main() -> anyhow::Result<()> {
	let _ = env_logger::Builder::from_env("CABLE_LOG").try_init();
	let scene = SceneConfig::default();
	let (mut world, _) = falling_cable(&scene)?;
	let start = Instant::now();
	let rframes = 1000;
	world.run(rframes)?;
	let time = rframes as f64 * scene.sim.step_size;
	let duration = start.elapsed().as_secs_f64();
	// load: wall clock per simulated second
	eprintln!("{:.3}%", duration / time * 100.0);
	Ok(())
}
