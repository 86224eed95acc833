//! Connect a follower arm, print one observation and optionally nudge a
//! joint, then release the arm.

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use umbra_arm::calibration::TerminalOperator;
use umbra_arm::config::{FollowerConfig, load_config};
use umbra_arm::robot::{ObservationValue, UmbraFollower, position_key};
use umbra_arm::{Action, ArmError, ArmResult, Device, Robot};

#[derive(Parser, Debug)]
#[command(name = "umbra", about = "Probe an Umbra follower arm.")]
struct Args {
    /// Follower config (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overriding the config
    #[arg(long)]
    port: Option<String>,

    /// Offer calibration when the motors do not hold the stored one
    #[arg(long)]
    calibrate: bool,

    /// Joint to move after reading, e.g. "base"
    #[arg(long)]
    joint: Option<String>,

    /// Relative move of --joint, in the joint's units
    #[arg(long, default_value_t = 5.0, allow_negative_numbers = true)]
    delta: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config: FollowerConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => FollowerConfig::default(),
    };
    if let Some(port) = &args.port {
        config.port = port.clone();
    }

    let mut follower = UmbraFollower::new(&config)?;
    let mut operator = TerminalOperator::new();
    follower.connect(args.calibrate, &mut operator)?;

    let probed = probe(&mut follower, &args);
    let released = follower.disconnect();
    probed?;
    released?;
    Ok(())
}

fn probe(follower: &mut UmbraFollower, args: &Args) -> ArmResult<()> {
    let observation = follower.get_observation()?;
    for (key, value) in &observation {
        match value {
            ObservationValue::Position(v) => println!("{key:>16}: {v:>9.3}"),
            ObservationValue::Image(frame) => println!("{key:>16}: {:?}", frame.shape()),
        }
    }

    let Some(joint) = &args.joint else {
        return Ok(());
    };
    let key = position_key(joint);
    let current = observation
        .get(&key)
        .and_then(ObservationValue::as_position)
        .ok_or_else(|| ArmError::UnknownJoint {
            device: follower.name().to_string(),
            joint: key.clone(),
        })?;

    let sent = follower.send_action(&Action::from([(key.clone(), current + args.delta)]))?;
    if let Some(goal) = sent.get(&key) {
        println!("{key}: {current:.3} -> {goal:.3}");
    }
    thread::sleep(Duration::from_millis(500));
    Ok(())
}
