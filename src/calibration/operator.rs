//! Where the human-paced calibration decisions come from.

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

/// Observed raw (min, max) per motor while recording ranges of motion.
pub type Ranges = BTreeMap<String, (i32, i32)>;

/// Decision source for the interactive steps of calibration.
pub trait Operator {
    /// Keep the stored calibration instead of recording a new one?
    fn confirm_reuse(&mut self, device: &str) -> io::Result<bool>;

    /// Block until the arm sits in the middle of its range of motion.
    fn await_reference_pose(&mut self, device: &str) -> io::Result<()>;

    fn begin_range_recording(&mut self, device: &str) -> io::Result<()>;

    /// Polled after every sample; `true` ends the recording.
    fn range_recording_done(&mut self, ranges: &Ranges) -> io::Result<bool>;

    fn end_range_recording(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn calibration_saved(&mut self, _device: &str, _path: &Path) {}
}

/// Prompts on stdin/stdout. ENTER ends range recording.
#[derive(Debug, Default)]
pub struct TerminalOperator {
    raw_mode: bool,
    samples: u64,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self::default()
    }

    fn prompt(message: &str) -> io::Result<String> {
        print!("{message}");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }

    fn leave_raw_mode(&mut self) -> io::Result<()> {
        if self.raw_mode {
            self.raw_mode = false;
            disable_raw_mode()?;
        }
        Ok(())
    }
}

impl Operator for TerminalOperator {
    fn confirm_reuse(&mut self, device: &str) -> io::Result<bool> {
        let answer = Self::prompt(&format!(
            "Press ENTER to use the calibration file of {device}, \
             or type 'c' and press ENTER to run calibration: "
        ))?;
        Ok(answer.trim().to_lowercase() != "c")
    }

    fn await_reference_pose(&mut self, device: &str) -> io::Result<()> {
        Self::prompt(&format!(
            "Move {device} to the middle of its range of motion and press ENTER...."
        ))?;
        Ok(())
    }

    fn begin_range_recording(&mut self, device: &str) -> io::Result<()> {
        println!(
            "Move all joints of {device} (including the gripper) sequentially through \
             their entire ranges of motion.\nRecording positions. Press ENTER to stop..."
        );
        enable_raw_mode()?;
        self.raw_mode = true;
        self.samples = 0;
        Ok(())
    }

    fn range_recording_done(&mut self, ranges: &Ranges) -> io::Result<bool> {
        self.samples += 1;
        if self.samples % 30 == 0 {
            let mut line = String::from("\r");
            for (motor, (min, max)) in ranges {
                line.push_str(&format!(" {motor}:[{min:>4}-{max:>4}]"));
            }
            print!("{line}");
            io::stdout().flush()?;
        }

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
                && key.code == KeyCode::Enter
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn end_range_recording(&mut self) -> io::Result<()> {
        self.leave_raw_mode()?;
        println!();
        Ok(())
    }

    fn calibration_saved(&mut self, device: &str, path: &Path) {
        println!("Calibration of {device} saved to {}", path.display());
    }
}

impl Drop for TerminalOperator {
    fn drop(&mut self) {
        let _ = self.leave_raw_mode();
    }
}

/// Answers from a fixed script; for headless runs and tests.
#[derive(Debug, Clone)]
pub struct ScriptedOperator {
    reuse: bool,
    samples_per_recording: usize,
    samples: usize,
    prompts: Vec<String>,
}

impl ScriptedOperator {
    /// Accept any stored calibration; recordings stop after one sample.
    pub fn reuse() -> Self {
        Self {
            reuse: true,
            samples_per_recording: 1,
            samples: 0,
            prompts: Vec::new(),
        }
    }

    /// Always record anew, sampling `samples` times per recording.
    pub fn recalibrate(samples: usize) -> Self {
        Self {
            reuse: false,
            samples_per_recording: samples.max(1),
            samples: 0,
            prompts: Vec::new(),
        }
    }

    /// Every step that would have asked a human, in order.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Operator for ScriptedOperator {
    fn confirm_reuse(&mut self, device: &str) -> io::Result<bool> {
        self.prompts.push(format!("reuse {device}"));
        Ok(self.reuse)
    }

    fn await_reference_pose(&mut self, device: &str) -> io::Result<()> {
        self.prompts.push(format!("pose {device}"));
        Ok(())
    }

    fn begin_range_recording(&mut self, device: &str) -> io::Result<()> {
        self.prompts.push(format!("record {device}"));
        self.samples = 0;
        Ok(())
    }

    fn range_recording_done(&mut self, _ranges: &Ranges) -> io::Result<bool> {
        self.samples += 1;
        Ok(self.samples >= self.samples_per_recording)
    }
}
