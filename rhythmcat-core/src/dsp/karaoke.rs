use super::check_range;
use crate::error::{CoreError, Result};
use std::f64::consts::PI;

/// Voice removal parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KaraokeSettings {
    /// Strength of the centre cut, 0..=1
    pub level: f32,
    /// How much of the band-passed centre is mixed back, 0..=1
    pub mono_level: f32,
    /// Centre frequency of the kept band in Hz, 0..=441
    pub filter_band: f32,
    /// Width of the kept band in Hz, 0..=100
    pub filter_width: f32,
}

impl Default for KaraokeSettings {
    fn default() -> Self {
        Self {
            level: 1.0,
            mono_level: 1.0,
            filter_band: 220.0,
            filter_width: 100.0,
        }
    }
}

impl KaraokeSettings {
    /// # Errors
    ///
    /// Returns `InvalidFilterParameter` for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        check_range("level", self.level, 0.0, 1.0)?;
        check_range("mono_level", self.mono_level, 0.0, 1.0)?;
        check_range("filter_band", self.filter_band, 0.0, 441.0)?;
        check_range("filter_width", self.filter_width, 0.0, 100.0)
    }
}

/// Centre-channel cancellation for interleaved stereo.
///
/// Non-stereo input passes through unchanged.
#[derive(Debug, Clone)]
pub struct KaraokeFilter {
    settings: KaraokeSettings,
    rate: u32,
    channels: usize,
    a: f64,
    b: f64,
    c: f64,
    y1: f64,
    y2: f64,
}

impl KaraokeFilter {
    /// # Errors
    ///
    /// Returns an error for invalid settings or a zero rate.
    pub fn new(settings: KaraokeSettings, rate: u32, channels: usize) -> Result<Self> {
        settings.validate()?;
        if rate == 0 {
            return Err(CoreError::InvalidFilterParameter {
                name: "rate",
                reason: "sample rate must be positive".to_string(),
            });
        }
        let mut filter = Self {
            settings,
            rate,
            channels,
            a: 0.0,
            b: 0.0,
            c: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.update_coefficients();
        Ok(filter)
    }

    #[must_use]
    pub const fn settings(&self) -> &KaraokeSettings {
        &self.settings
    }

    /// # Errors
    ///
    /// Returns an error for invalid settings; the filter keeps the old ones.
    pub fn set_settings(&mut self, settings: KaraokeSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.update_coefficients();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Two-pole resonator centred on `filter_band`
    fn update_coefficients(&mut self) {
        let rate = f64::from(self.rate);
        let band = f64::from(self.settings.filter_band);
        let width = f64::from(self.settings.filter_width);

        self.c = (-2.0 * PI * width / rate).exp();
        self.b = -4.0 * self.c / (1.0 + self.c) * (2.0 * PI * band / rate).cos();
        self.a = (1.0 - self.b * self.b / (4.0 * self.c)).max(0.0).sqrt() * (1.0 - self.c);
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.channels != 2 || self.settings.level <= 0.0 {
            return;
        }
        let level = f64::from(self.settings.level);
        let mono_level = f64::from(self.settings.mono_level);

        for frame in samples.chunks_exact_mut(2) {
            let l = f64::from(frame[0]);
            let r = f64::from(frame[1]);

            let x = (l + r) / 2.0;
            let y = self.a * x - self.b * self.y1 - self.c * self.y2;
            self.y2 = self.y1;
            self.y1 = y;

            let centre = y * mono_level * level;
            frame[0] = (l - r * level + centre) as f32;
            frame[1] = (r - l * level + centre) as f32;
        }
    }
}
