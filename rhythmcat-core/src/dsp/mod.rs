//! Sample-level audio filter kernels operating on interleaved `f32` buffers.

mod echo;
mod karaoke;

pub use echo::{EchoFilter, EchoSettings, MAX_ECHO_DELAY};
pub use karaoke::{KaraokeFilter, KaraokeSettings};

use crate::error::{CoreError, Result};

/// Check that a parameter lies in `min..=max`
fn check_range(name: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::InvalidFilterParameter {
            name,
            reason: format!("{value} is outside {min}..={max}"),
        })
    }
}
