use clap::Parser;
use log::{debug, info};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use umbra_arm::calibration::TerminalOperator;
use umbra_arm::config::{BimanualConfig, FollowerConfig, LeaderConfig, load_config};
use umbra_arm::robot::umbra::{bimanual_follower, bimanual_leader};
use umbra_arm::robot::{UmbraFollower, UmbraLeader};
use umbra_arm::{Robot, Teleoperator};

/// Mirror a hand-guided leader arm onto a follower arm.
#[derive(Parser, Debug)]
#[command(name = "umbra-teleoperate")]
struct Args {
    /// Follower config (TOML)
    #[arg(long)]
    follower: Option<PathBuf>,

    /// Leader config (TOML)
    #[arg(long)]
    leader: Option<PathBuf>,

    /// Bimanual follower config; with --bimanual-leader drives both arm pairs
    #[arg(long, requires = "bimanual_leader", conflicts_with_all = ["follower", "leader"])]
    bimanual_follower: Option<PathBuf>,

    /// Bimanual leader config
    #[arg(long, requires = "bimanual_follower")]
    bimanual_leader: Option<PathBuf>,

    /// Control loop rate
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Offer calibration when an arm does not hold its stored one
    #[arg(long)]
    calibrate: bool,
}

fn load_or_default<T: Default + serde::de::DeserializeOwned>(
    path: &Option<PathBuf>,
) -> Result<T, Box<dyn Error>> {
    Ok(match path {
        Some(path) => load_config(path)?,
        None => T::default(),
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(format!("--fps must be positive, got {}", args.fps).into());
    }

    match (&args.bimanual_follower, &args.bimanual_leader) {
        (Some(follower_path), Some(leader_path)) => {
            let follower_config: BimanualConfig = load_config(follower_path)?;
            let leader_config: BimanualConfig = load_config(leader_path)?;
            let mut follower = bimanual_follower(&follower_config)?;
            let mut leader = bimanual_leader(&leader_config)?;
            teleoperate(&mut follower, &mut leader, &args)
        }
        _ => {
            let follower_config: FollowerConfig = load_or_default(&args.follower)?;
            let leader_config: LeaderConfig = load_or_default(&args.leader)?;
            let mut follower = UmbraFollower::new(&follower_config)?;
            let mut leader = UmbraLeader::new(&leader_config)?;
            teleoperate(&mut follower, &mut leader, &args)
        }
    }
}

/// Connect both sides, run the loop, and release both sides whatever the
/// loop returned.
fn teleoperate<R: Robot, T: Teleoperator>(
    follower: &mut R,
    leader: &mut T,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    let mut operator = TerminalOperator::new();

    println!("Connecting leader {}...", leader.name());
    leader.connect(args.calibrate, &mut operator)?;
    println!("Connecting follower {}...", follower.name());
    if let Err(e) = follower.connect(args.calibrate, &mut operator) {
        let _ = leader.disconnect();
        return Err(e.into());
    }

    let result = control_loop(follower, leader, args.fps);

    println!("Stopping...");
    let follower_released = follower.disconnect();
    let leader_released = leader.disconnect();
    result?;
    follower_released?;
    leader_released?;
    println!("Both arms released.");
    Ok(())
}

fn control_loop<R: Robot, T: Teleoperator>(
    follower: &mut R,
    leader: &mut T,
    fps: f64,
) -> Result<(), Box<dyn Error>> {
    // The safety clamp limits how fast the follower closes the gap.
    println!("Syncing start positions...");
    let start = leader.get_action()?;
    follower.send_action(&start)?;
    thread::sleep(Duration::from_millis(2000));

    print!("Synced. Press ENTER to START teleoperation...");
    io::stdout().flush()?;
    let mut input_buffer = String::new();
    io::stdin().read_line(&mut input_buffer)?;

    println!("Teleoperation active! Press ENTER to STOP.");
    let keep_running = Arc::new(AtomicBool::new(true));
    let r_handle = keep_running.clone();
    thread::spawn(move || {
        let mut s = String::new();
        io::stdin().read_line(&mut s).ok();
        r_handle.store(false, Ordering::Relaxed);
    });

    let target_frame_time = Duration::from_secs_f64(1.0 / fps);
    let mut steps: u64 = 0;
    while keep_running.load(Ordering::Relaxed) {
        let loop_start = Instant::now();

        let action = leader.get_action()?;
        follower.send_action(&action)?;
        steps += 1;

        let elapsed = loop_start.elapsed();
        if elapsed < target_frame_time {
            thread::sleep(target_frame_time - elapsed);
        } else {
            debug!(
                "Loop overran: {:.1}ms > {:.1}ms",
                elapsed.as_secs_f64() * 1e3,
                target_frame_time.as_secs_f64() * 1e3
            );
        }
    }
    info!("Teleoperation stopped after {steps} steps");
    Ok(())
}
