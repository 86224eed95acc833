//! The camera collaborator, consumed only through [`Camera`].

use std::fmt;

use crate::error::ArmError;

/// Latest captured image, row-major, `channels` bytes per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(height: usize, width: usize, channels: usize, data: Vec<u8>) -> Self {
        Self {
            height,
            width,
            channels,
            data,
        }
    }

    /// Frame of one repeated value, e.g. to stand in for a missing camera.
    pub fn filled(height: usize, width: usize, channels: usize, value: u8) -> Self {
        Self::new(height, width, channels, vec![value; height * width * channels])
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("shape", &self.shape())
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A capture device producing frames in the background.
///
/// `async_read` must not block on a new exposure: it hands back the most
/// recent frame.
pub trait Camera: Send {
    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> Result<(), ArmError>;

    fn disconnect(&mut self) -> Result<(), ArmError>;

    fn async_read(&mut self) -> Result<Frame, ArmError>;

    /// (height, width, channels) of the frames this camera produces.
    fn shape(&self) -> (usize, usize, usize);
}
