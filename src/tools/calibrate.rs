//! Interactive calibration of one Umbra arm.

use clap::{Parser, ValueEnum};
use std::error::Error;
use std::path::PathBuf;

use umbra_arm::bus::MotorBus;
use umbra_arm::calibration::{CalibrationOutcome, TerminalOperator};
use umbra_arm::config::{FollowerConfig, LeaderConfig, load_config};
use umbra_arm::robot::{Arm, UmbraFollower, UmbraLeader};
use umbra_arm::ArmResult;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Role {
    Follower,
    Leader,
}

#[derive(Parser, Debug)]
#[command(name = "umbra-calibrate", about = "Record homing offsets and joint ranges of an arm.")]
struct Args {
    #[arg(value_enum)]
    role: Role,

    /// Arm config (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overriding the config
    #[arg(long)]
    port: Option<String>,

    /// Arm identity, overriding the config; names the calibration file
    #[arg(long)]
    id: Option<String>,
}

fn run<B: MotorBus>(arm: &mut Arm<B>) -> ArmResult<CalibrationOutcome> {
    let mut operator = TerminalOperator::new();
    arm.connect(false, &mut operator)?;
    let outcome = arm.run_calibration(&mut operator);
    let released = arm.disconnect();
    let outcome = outcome?;
    released?;
    Ok(outcome)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let outcome = match args.role {
        Role::Follower => {
            let mut config: FollowerConfig = match &args.config {
                Some(path) => load_config(path)?,
                None => FollowerConfig::default(),
            };
            if let Some(port) = &args.port {
                config.port = port.clone();
            }
            if let Some(id) = &args.id {
                config.id = id.clone();
            }
            let mut follower = UmbraFollower::new(&config)?;
            run(follower.arm_mut())?
        }
        Role::Leader => {
            let mut config: LeaderConfig = match &args.config {
                Some(path) => load_config(path)?,
                None => LeaderConfig::default(),
            };
            if let Some(port) = &args.port {
                config.port = port.clone();
            }
            if let Some(id) = &args.id {
                config.id = id.clone();
            }
            let mut leader = UmbraLeader::new(&config)?;
            run(leader.arm_mut())?
        }
    };

    match outcome {
        CalibrationOutcome::Reused(_) => println!("Kept the stored calibration."),
        CalibrationOutcome::Recorded(set) => {
            for (motor, record) in &set {
                println!(
                    "{motor:>16}: offset {:>5}  range [{:>4}, {:>4}]",
                    record.homing_offset, record.range_min, record.range_max
                );
            }
        }
        CalibrationOutcome::Aborted { motors } => {
            println!("Calibration aborted; these motors never moved: {motors:?}");
        }
    }
    Ok(())
}
