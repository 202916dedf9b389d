use super::check_range;
use crate::error::{CoreError, Result};
use std::time::Duration;

/// Longest `max_delay` the ring buffer may be sized for
pub const MAX_ECHO_DELAY: Duration = Duration::from_secs(10);

/// Echo parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoSettings {
    pub delay: Duration,
    /// Sizes the ring buffer; `delay` may be changed up to this without reallocating
    pub max_delay: Duration,
    /// Mix of the echo into the output, 0..=1
    pub intensity: f32,
    /// Echo fed back into the ring buffer, 0..=1
    pub feedback: f32,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            intensity: 0.0,
            feedback: 0.0,
        }
    }
}

impl EchoSettings {
    /// # Errors
    ///
    /// Returns `InvalidFilterParameter` if `max_delay` exceeds
    /// [`MAX_ECHO_DELAY`], `delay` exceeds `max_delay` or a gain is outside 0..=1.
    pub fn validate(&self) -> Result<()> {
        if self.max_delay > MAX_ECHO_DELAY {
            return Err(CoreError::InvalidFilterParameter {
                name: "max_delay",
                reason: format!(
                    "{:?} is larger than {MAX_ECHO_DELAY:?}",
                    self.max_delay
                ),
            });
        }
        if self.delay > self.max_delay {
            return Err(CoreError::InvalidFilterParameter {
                name: "delay",
                reason: format!(
                    "{:?} is larger than max_delay {:?}",
                    self.delay, self.max_delay
                ),
            });
        }
        check_range("intensity", self.intensity, 0.0, 1.0)?;
        check_range("feedback", self.feedback, 0.0, 1.0)
    }
}

/// Ring-buffer echo over interleaved samples
#[derive(Debug, Clone)]
pub struct EchoFilter {
    settings: EchoSettings,
    rate: u32,
    channels: usize,
    /// Past frames after feedback, `frames * channels` samples
    ring: Vec<f32>,
    frames: usize,
    write_pos: usize,
    /// Whole frames of delay
    tap: usize,
    /// Weight of the older tap
    frac: f32,
}

impl EchoFilter {
    /// # Errors
    ///
    /// Returns an error for invalid settings, a zero rate or zero channels.
    pub fn new(settings: EchoSettings, rate: u32, channels: usize) -> Result<Self> {
        settings.validate()?;
        if rate == 0 || channels == 0 {
            return Err(CoreError::InvalidFilterParameter {
                name: "format",
                reason: format!("unsupported format: {rate} Hz, {channels} channels"),
            });
        }

        let (frames, len) = ring_size(settings.max_delay, rate, channels)?;
        let (tap, frac) = split_delay(settings.delay, rate);
        Ok(Self {
            settings,
            rate,
            channels,
            ring: vec![0.0; len],
            frames,
            write_pos: 0,
            tap,
            frac,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &EchoSettings {
        &self.settings
    }

    /// Apply new settings; the buffer is only reallocated when `max_delay` changes.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings; the filter keeps the old ones.
    pub fn set_settings(&mut self, settings: EchoSettings) -> Result<()> {
        settings.validate()?;
        if settings.max_delay != self.settings.max_delay {
            let (frames, len) = ring_size(settings.max_delay, self.rate, self.channels)?;
            self.frames = frames;
            self.ring = vec![0.0; len];
            self.write_pos = 0;
        }
        (self.tap, self.frac) = split_delay(settings.delay, self.rate);
        self.settings = settings;
        Ok(())
    }

    /// Forget all buffered history
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
    }

    /// Process interleaved samples in place; a trailing partial frame is left untouched.
    pub fn process(&mut self, samples: &mut [f32]) {
        let channels = self.channels;
        let intensity = self.settings.intensity;
        let feedback = self.settings.feedback;

        for frame in samples.chunks_exact_mut(channels) {
            let near = (self.write_pos + self.frames - self.tap) % self.frames;
            let far = (self.write_pos + self.frames - self.tap - 1) % self.frames;

            for (c, sample) in frame.iter_mut().enumerate() {
                let a = self.ring[near * channels + c];
                let b = self.ring[far * channels + c];
                let echo = a + (b - a) * self.frac;

                let input = *sample;
                *sample = input + intensity * echo;
                self.ring[self.write_pos * channels + c] = input + feedback * echo;
            }

            self.write_pos = (self.write_pos + 1) % self.frames;
        }
    }
}

/// Ring length as (frames, samples)
fn ring_size(max_delay: Duration, rate: u32, channels: usize) -> Result<(usize, usize)> {
    let frames = frames_for(max_delay, rate) + 2;
    let len = frames
        .checked_mul(channels)
        .ok_or_else(|| CoreError::InvalidFilterParameter {
            name: "format",
            reason: format!("{channels} channels of {frames} frames do not fit in memory"),
        })?;
    Ok((frames, len))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn frames_for(delay: Duration, rate: u32) -> usize {
    (delay.as_secs_f64() * f64::from(rate)).ceil() as usize
}

/// Delay in frames as (whole frames >= 1, fraction)
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn split_delay(delay: Duration, rate: u32) -> (usize, f32) {
    let frames = (delay.as_secs_f64() * f64::from(rate)).max(1.0);
    let whole = frames.floor();
    (whole as usize, (frames - whole) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn settings(delay_ms: u64, intensity: f32, feedback: f32) -> EchoSettings {
        EchoSettings {
            delay: Duration::from_millis(delay_ms),
            max_delay: Duration::from_millis(10),
            intensity,
            feedback,
        }
    }

    fn impulse(len: usize) -> Vec<f32> {
        let mut samples = vec![0.0; len];
        samples[0] = 1.0;
        samples
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        let mut filter = EchoFilter::new(settings(3, 0.0, 0.9), RATE, 2).unwrap();
        let input: Vec<f32> = (0..40).map(|i| (i as f32 * 0.37).sin()).collect();
        let mut output = input.clone();
        filter.process(&mut output);
        assert_eq!(input, output);
    }

    #[test]
    fn test_impulse_echo_and_feedback() {
        // 3 ms at 1 kHz is exactly 3 frames
        let mut filter = EchoFilter::new(settings(3, 0.5, 0.5), RATE, 1).unwrap();
        let mut samples = impulse(10);
        filter.process(&mut samples);
        assert!((samples[0] - 1.0).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
        assert!((samples[3] - 0.5).abs() < 1e-6);
        assert!((samples[6] - 0.25).abs() < 1e-6);
        assert!((samples[9] - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_fractional_delay_interpolates() {
        let mut filter = EchoFilter::new(
            EchoSettings {
                delay: Duration::from_micros(2500),
                ..settings(0, 1.0, 0.0)
            },
            RATE,
            1,
        )
        .unwrap();
        let mut samples = impulse(6);
        filter.process(&mut samples);
        assert!((samples[2] - 0.5).abs() < 1e-6);
        assert!((samples[3] - 0.5).abs() < 1e-6);
        assert!(samples[4].abs() < 1e-6);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut filter = EchoFilter::new(settings(1, 1.0, 0.0), RATE, 2).unwrap();
        let mut samples = vec![1.0, 0.0, 0.0, 0.0];
        filter.process(&mut samples);
        assert_eq!(samples, vec![1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_state_carries_across_calls_and_reset_clears() {
        let mut filter = EchoFilter::new(settings(2, 1.0, 0.0), RATE, 1).unwrap();
        let mut first = vec![1.0, 0.0];
        filter.process(&mut first);
        let mut second = vec![0.0, 0.0];
        filter.process(&mut second);
        assert!((second[0] - 1.0).abs() < 1e-6);

        filter.process(&mut [1.0]);
        filter.reset();
        let mut after = vec![0.0; 4];
        filter.process(&mut after);
        assert!(after.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_validation() {
        assert!(settings(20, 0.5, 0.5).validate().is_err());
        assert!(settings(5, 1.5, 0.5).validate().is_err());
        assert!(settings(5, 0.5, -0.1).validate().is_err());
        assert!(EchoFilter::new(settings(5, 0.5, 0.5), 0, 2).is_err());

        let mut filter = EchoFilter::new(settings(5, 0.5, 0.5), RATE, 2).unwrap();
        assert!(filter.set_settings(settings(50, 0.5, 0.5)).is_err());
        assert_eq!(filter.settings().delay, Duration::from_millis(5));
    }

    #[test]
    fn test_max_delay_is_capped() {
        let huge = EchoSettings {
            max_delay: Duration::from_secs(u64::MAX / 4),
            ..settings(5, 0.5, 0.5)
        };
        assert!(matches!(
            huge.validate(),
            Err(CoreError::InvalidFilterParameter { name: "max_delay", .. })
        ));
        assert!(EchoFilter::new(huge, RATE, 2).is_err());

        let mut filter = EchoFilter::new(settings(5, 0.5, 0.5), RATE, 2).unwrap();
        assert!(filter.set_settings(huge).is_err());
        assert_eq!(filter.settings().max_delay, Duration::from_millis(10));

        let longest = EchoSettings {
            max_delay: MAX_ECHO_DELAY,
            ..settings(5, 0.5, 0.5)
        };
        assert!(EchoFilter::new(longest, RATE, 2).is_ok());
    }

    #[test]
    fn test_oversized_channel_count_rejected() {
        assert!(EchoFilter::new(settings(5, 0.5, 0.5), RATE, usize::MAX).is_err());
    }
}
