//! Configuration: [MuxConfig] for what gets generated and [Options] for the
//! free-form key/value options passed through to encoders and containers.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::format::{Dimensions, PixelFormat};
use crate::synth::Tone;
use crate::time::Rational;

/// What to generate and how to encode it.
///
/// Every field has a default (see [MuxConfig::default]), so a config file
/// only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MuxConfig {
    /// How long both streams run, in seconds. A frame is only generated if it
    /// starts strictly before this.
    pub duration: Rational,
    pub frame_rate: u32,
    pub dimensions: Dimensions,
    /// The pixel format to encode with (if the encoder supports it).
    pub pixel_format: PixelFormat,
    pub video_bit_rate: u64,
    /// Emit an intra frame at least this often.
    pub gop: u32,
    pub audio_bit_rate: u64,
    /// The sample rate to encode with (if the encoder supports it).
    pub preferred_sample_rate: u32,
    /// Samples per audio frame for encoders that accept any frame size.
    pub variable_frame_size: usize,
    /// Generate audio at this rate instead of the encoder's (forcing a
    /// resampler into the pipeline).
    pub synth_sample_rate: Option<u32>,
    pub tone: Tone,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            duration: Rational::from_integer(10),
            frame_rate: 25,
            dimensions: (352, 288).into(),
            pixel_format: PixelFormat::Yuv420p,
            video_bit_rate: 400_000,
            gop: 12,
            audio_bit_rate: 64_000,
            preferred_sample_rate: 44_100,
            variable_frame_size: 10_000,
            synth_sample_rate: None,
            tone: Tone::default(),
        }
    }
}

impl MuxConfig {
    /// Check for values that can't produce a valid stream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duration.num() <= 0 {
            return Err(ConfigError::NonPositiveDuration(self.duration));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        if self.preferred_sample_rate == 0 || self.synth_sample_rate == Some(0) {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.variable_frame_size == 0 {
            return Err(ConfigError::ZeroFrameSize);
        }
        Ok(())
    }
}

/// Key/value options (e.g. `fflags` = `+bitexact`) for encoders and
/// containers, remembering which ones something actually used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: Vec<OptionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OptionEntry {
    key: String,
    value: String,
    used: bool,
}

/// The command line options that are passed through, without their `-`.
const PASSED_THROUGH: &[&str] = &["flags", "fflags"];

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect options from command line style pairs (`-flags +bitexact`).
    /// Only `-flags` and `-fflags` are kept; other pairs and a trailing
    /// unpaired argument are ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use media::config::Options;
    ///
    /// let options = Options::from_args(["-fflags", "+bitexact", "-y", "1", "-flags"]);
    /// assert_eq!(options.get("fflags"), Some("+bitexact"));
    /// assert_eq!(options.len(), 1);
    /// ```
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let mut options = Self::new();

        for pair in args.chunks_exact(2) {
            let key = pair[0].as_ref();
            if let Some(name) = key.strip_prefix('-')
                && PASSED_THROUGH.contains(&name)
            {
                options.set(name, pair[1].as_ref());
            }
        }

        options
    }

    /// Set `key` to `value`, replacing (and un-using) any old value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.entries.retain(|e| e.key != key);
        self.entries.push(OptionEntry {
            key,
            value,
            used: false,
        });
    }

    /// Look at a value without marking it as used.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Get a value and mark it as used. The value stays available to
    /// whatever reads it next.
    pub fn take(&mut self, key: &str) -> Option<String> {
        let entry = self.entries.iter_mut().find(|e| e.key == key)?;
        entry.used = true;
        Some(entry.value.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.key.as_str(), e.value.as_str()))
    }

    /// The options nothing has [taken](Self::take) so far.
    pub fn unused(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|e| !e.used)
            .map(|e| (e.key.as_str(), e.value.as_str()))
    }
}

/// One change from a flags value: `+name` sets a flag, `-name` clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagChange {
    pub name: String,
    pub set: bool,
}

/// Returned by [parse_flags] for a malformed value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("`{0}` isn't a valid list of flags (expected something like `+a-b`).")]
pub struct InvalidFlags(pub String);

/// Parse a flags value in FFmpeg's syntax (e.g. `+bitexact-global_header`).
/// A leading flag without a sign is set.
///
/// # Example
///
/// ```
/// use media::config::{FlagChange, parse_flags};
///
/// let changes = parse_flags("bitexact-low_delay").unwrap();
/// assert_eq!(changes[0], FlagChange { name: "bitexact".into(), set: true });
/// assert_eq!(changes[1], FlagChange { name: "low_delay".into(), set: false });
/// ```
pub fn parse_flags(value: &str) -> Result<Vec<FlagChange>, InvalidFlags> {
    let invalid = || InvalidFlags(value.to_string());
    let mut changes = Vec::new();
    let mut rest = value;

    while !rest.is_empty() {
        let set = match rest.as_bytes()[0] {
            b'+' => {
                rest = &rest[1..];
                true
            }
            b'-' => {
                rest = &rest[1..];
                false
            }
            _ if changes.is_empty() => true,
            _ => return Err(invalid()),
        };

        let end = rest.find(['+', '-']).unwrap_or(rest.len());
        let name = &rest[..end];
        if name.is_empty()
            || !name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(invalid());
        }

        changes.push(FlagChange {
            name: name.to_string(),
            set,
        });
        rest = &rest[end..];
    }

    if changes.is_empty() {
        return Err(invalid());
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MuxConfig::default();
        assert_eq!(config.duration, Rational::from_integer(10));
        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.dimensions, (352, 288).into());
        assert_eq!(config.video_bit_rate, 400_000);
        assert_eq!(config.gop, 12);
        assert_eq!(config.audio_bit_rate, 64_000);
        assert_eq!(config.variable_frame_size, 10_000);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: MuxConfig =
            serde_json::from_str(r#"{ "duration": [1, 1], "pixel_format": "rgb24" }"#).unwrap();
        assert_eq!(config.duration, Rational::ONE);
        assert_eq!(config.pixel_format, PixelFormat::Rgb24);
        assert_eq!(config.frame_rate, 25);

        assert!(serde_json::from_str::<MuxConfig>(r#"{ "fps": 30 }"#).is_err());
        assert!(serde_json::from_str::<MuxConfig>(r#"{ "dimensions": [0, 288] }"#).is_err());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let config = MuxConfig {
            duration: Rational::new(-1, 2).unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveDuration(_))
        ));

        let config = MuxConfig {
            synth_sample_rate: Some(0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroSampleRate));
    }

    #[test]
    fn only_known_pairs_are_passed_through() {
        let options = Options::from_args(["-flags", "+bitexact", "-threads", "4", "-fflags", "x"]);
        assert_eq!(
            options.iter().collect::<Vec<_>>(),
            [("flags", "+bitexact"), ("fflags", "x")]
        );
    }

    #[test]
    fn taking_marks_options_used() {
        let mut options = Options::new();
        options.set("flags", "+bitexact");
        options.set("fflags", "+bitexact");
        assert_eq!(options.take("flags").as_deref(), Some("+bitexact"));
        assert_eq!(options.take("flags").as_deref(), Some("+bitexact"));
        assert_eq!(options.take("nope"), None);
        assert_eq!(options.unused().collect::<Vec<_>>(), [("fflags", "+bitexact")]);

        options.set("flags", "-bitexact");
        assert_eq!(options.unused().count(), 2);
    }

    #[test]
    fn flag_syntax() {
        assert_eq!(
            parse_flags("+a-b+c").unwrap(),
            [
                FlagChange { name: "a".into(), set: true },
                FlagChange { name: "b".into(), set: false },
                FlagChange { name: "c".into(), set: true },
            ]
        );
        assert!(parse_flags("").is_err());
        assert!(parse_flags("+").is_err());
        assert!(parse_flags("+a++b").is_err());
        assert!(parse_flags("+Bad").is_err());
    }
}
