//! LRC lyric parsing and the timing model used by the lyric-show overlay.

use crate::error::{CoreError, Result};
use std::time::Duration;

/// How long the final line stays active when the track length is unknown
pub const DEFAULT_LAST_LINE_LENGTH: Duration = Duration::from_secs(5);

/// A parsed lyric document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lyrics {
    pub tags: LyricTags,
    /// Sorted by start time
    pub lines: Vec<LyricLine>,
}

/// ID tags found in the header of an LRC file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LyricTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// `[by:]`, the author of the LRC file
    pub creator: Option<String>,
    /// Milliseconds; positive values make lines appear earlier
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub start: Duration,
    /// Time until the next line starts
    pub length: Duration,
    pub text: String,
    /// Per-word timing from enhanced `<mm:ss.xx>` markers
    pub words: Vec<LyricWord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricWord {
    pub start: Duration,
    pub text: String,
}

impl Lyrics {
    /// Parse LRC text. Lines without a timestamp are skipped.
    ///
    /// `track_length` bounds the final line; pass `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns `LrcParseError` when the input holds neither tags nor timed lines.
    pub fn parse(input: &str, track_length: Option<Duration>) -> Result<Self> {
        let mut tags = LyricTags::default();
        let mut lines = Vec::new();
        let mut saw_tag = false;

        for raw in input.lines() {
            let raw = raw.trim().trim_start_matches('\u{feff}');
            if raw.is_empty() {
                continue;
            }

            let (stamps, text) = split_timestamps(raw);
            if stamps.is_empty() {
                if let Some((key, value)) = id_tag(raw) {
                    saw_tag |= apply_tag(&mut tags, &key, value);
                }
                continue;
            }

            let (text, words) = enhanced_words(text);
            for start in stamps {
                lines.push(LyricLine {
                    start,
                    length: Duration::ZERO,
                    text: text.clone(),
                    words: words.clone(),
                });
            }
        }

        if lines.is_empty() && !saw_tag {
            return Err(CoreError::LrcParseError {
                reason: "no timestamps or tags found".to_string(),
            });
        }

        if tags.offset != 0 {
            let shift = |t: Duration| crate::time::offset_micros(t, tags.offset.saturating_mul(-1000));
            for line in &mut lines {
                line.start = shift(line.start);
                for word in &mut line.words {
                    word.start = shift(word.start);
                }
            }
        }

        // Stable: lines sharing a timestamp keep file order
        lines.sort_by_key(|l| l.start);

        let mut lyrics = Self { tags, lines };
        lyrics.assign_lengths(track_length);
        Ok(lyrics)
    }

    /// Recompute each line's length once the track length becomes known
    pub fn assign_lengths(&mut self, track_length: Option<Duration>) {
        let starts: Vec<Duration> = self.lines.iter().map(|l| l.start).collect();
        for (i, line) in self.lines.iter_mut().enumerate() {
            line.length = match starts.get(i + 1) {
                Some(next) => next.saturating_sub(line.start),
                None => match track_length {
                    Some(total) if total > line.start => total - line.start,
                    _ => DEFAULT_LAST_LINE_LENGTH,
                },
            };
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the line active at `position`
    #[must_use]
    pub fn line_index_at(&self, position: Duration) -> Option<usize> {
        let after = self.lines.partition_point(|l| l.start <= position);
        after.checked_sub(1)
    }

    #[must_use]
    pub fn line_at(&self, position: Duration) -> Option<&LyricLine> {
        self.line_index_at(position).map(|i| &self.lines[i])
    }

    /// Lines around the active one: `before` above it and `after` below it.
    /// Before the first line the window starts at the top.
    #[must_use]
    pub fn window(&self, position: Duration, before: usize, after: usize) -> &[LyricLine] {
        if self.lines.is_empty() {
            return &[];
        }
        let current = self.line_index_at(position).unwrap_or(0);
        let start = current.saturating_sub(before);
        let end = (current + after + 1).min(self.lines.len());
        &self.lines[start..end]
    }
}

impl LyricLine {
    /// Fraction of the line already sung, 0.0 to 1.0.
    ///
    /// With word timing each finished word counts fully and the active word
    /// is interpolated; otherwise progress is linear over the line length.
    #[must_use]
    pub fn progress(&self, position: Duration) -> f64 {
        if position <= self.start {
            return 0.0;
        }
        let end = self.start + self.length;
        if position >= end || self.length.is_zero() {
            return 1.0;
        }

        if self.words.is_empty() {
            return fraction(position - self.start, self.length);
        }

        let total: usize = self.words.iter().map(|w| w.text.chars().count()).sum();
        if total == 0 {
            return fraction(position - self.start, self.length);
        }

        let mut sung = 0.0;
        for (i, word) in self.words.iter().enumerate() {
            if position < word.start {
                break;
            }
            let word_end = self.words.get(i + 1).map_or(end, |next| next.start);
            let weight = ratio(word.text.chars().count(), total);
            if position >= word_end || word_end <= word.start {
                sung += weight;
            } else {
                sung += weight * fraction(position - word.start, word_end - word.start);
                break;
            }
        }
        sung.clamp(0.0, 1.0)
    }
}

fn fraction(part: Duration, whole: Duration) -> f64 {
    (part.as_secs_f64() / whole.as_secs_f64()).clamp(0.0, 1.0)
}

fn ratio(part: usize, whole: usize) -> f64 {
    let part = u32::try_from(part).unwrap_or(u32::MAX);
    let whole = u32::try_from(whole).unwrap_or(u32::MAX);
    f64::from(part) / f64::from(whole)
}

/// Peel leading `[time]` groups off a line
fn split_timestamps(line: &str) -> (Vec<Duration>, &str) {
    let mut stamps = Vec::new();
    let mut rest = line;
    while let Some(inner) = rest.strip_prefix('[') {
        let Some((stamp, tail)) = inner.split_once(']') else {
            break;
        };
        let Some(time) = parse_time(stamp) else {
            break;
        };
        stamps.push(time);
        rest = tail;
    }
    (stamps, rest.trim())
}

/// `[key:value]` header tag
fn id_tag(line: &str) -> Option<(String, &str)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let (key, value) = inner.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((key.to_ascii_lowercase(), value.trim()))
}

/// Returns whether the tag was recognised
fn apply_tag(tags: &mut LyricTags, key: &str, value: &str) -> bool {
    let text = || (!value.is_empty()).then(|| value.to_string());
    match key {
        "ti" => tags.title = text(),
        "ar" => tags.artist = text(),
        "al" => tags.album = text(),
        "by" => tags.creator = text(),
        "offset" => tags.offset = value.trim_start_matches('+').parse().unwrap_or(0),
        _ => return false,
    }
    true
}

/// Parse `mm:ss`, `mm:ss.xx`, `mm:ss.xxx` or `mm:ss:xx`
fn parse_time(stamp: &str) -> Option<Duration> {
    let mut parts = stamp.trim().split(':');
    let minutes: u64 = parts.next()?.parse().ok()?;
    let second_part = parts.next()?;
    let fraction_part = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let (seconds, fraction) = match fraction_part {
        Some(fraction) => (second_part, Some(fraction)),
        None => match second_part.split_once('.') {
            Some((seconds, fraction)) => (seconds, Some(fraction)),
            None => (second_part, None),
        },
    };

    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    let millis = match fraction {
        Some(digits) => fraction_millis(digits)?,
        None => 0,
    };

    let total = minutes
        .checked_mul(60_000)?
        .checked_add(seconds * 1000)?
        .checked_add(millis)?;
    Some(Duration::from_millis(total))
}

/// `"5"` -> 500, `"34"` -> 340, `"345"` -> 345; extra digits are dropped
fn fraction_millis(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut padded: String = digits.chars().take(3).collect();
    while padded.len() < 3 {
        padded.push('0');
    }
    padded.parse().ok()
}

/// Split `<mm:ss.xx>word <mm:ss.xx>word` into plain text and word timings
fn enhanced_words(text: &str) -> (String, Vec<LyricWord>) {
    if !text.contains('<') {
        return (text.to_string(), Vec::new());
    }

    let mut words = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        let marker = rest
            .strip_prefix('<')
            .and_then(|inner| inner.split_once('>'))
            .and_then(|(stamp, tail)| parse_time(stamp).map(|t| (t, tail)));

        let Some((start, tail)) = marker else {
            // Text before the first marker, or a stray '<'
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let next = rest[first..].find('<').map_or(rest.len(), |i| i + first);
            plain.push_str(&rest[..next]);
            rest = &rest[next..];
            continue;
        };

        let end = tail.find('<').unwrap_or(tail.len());
        let word = &tail[..end];
        if !word.trim().is_empty() {
            words.push(LyricWord {
                start,
                text: word.to_string(),
            });
        }
        plain.push_str(word);
        rest = &tail[end..];
    }

    (plain.trim().to_string(), words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_parse_basic_lines() {
        let lyrics = Lyrics::parse("[00:12.34]Hello world\n[00:15.00]Next", None).unwrap();
        assert_eq!(lyrics.lines.len(), 2);
        assert_eq!(lyrics.lines[0].start, ms(12_340));
        assert_eq!(lyrics.lines[0].text, "Hello world");
        assert_eq!(lyrics.lines[0].length, ms(2_660));
    }

    #[test]
    fn test_time_formats() {
        assert_eq!(parse_time("01:02"), Some(ms(62_000)));
        assert_eq!(parse_time("01:02.5"), Some(ms(62_500)));
        assert_eq!(parse_time("01:02.345"), Some(ms(62_345)));
        assert_eq!(parse_time("00:12:34"), Some(ms(12_340)));
        assert_eq!(parse_time("ti"), None);
        assert_eq!(parse_time("00:75.00"), None);
    }

    #[test]
    fn test_tags() {
        let input = "[ti:Song]\n[ar:Singer]\n[al:Record]\n[by:someone]\n[00:01.00]x";
        let lyrics = Lyrics::parse(input, None).unwrap();
        assert_eq!(lyrics.tags.title.as_deref(), Some("Song"));
        assert_eq!(lyrics.tags.artist.as_deref(), Some("Singer"));
        assert_eq!(lyrics.tags.album.as_deref(), Some("Record"));
        assert_eq!(lyrics.tags.creator.as_deref(), Some("someone"));
    }

    #[test]
    fn test_positive_offset_shows_lines_earlier() {
        let lyrics = Lyrics::parse("[offset:+500]\n[00:10.00]Test", None).unwrap();
        assert_eq!(lyrics.lines[0].start, ms(9_500));
    }

    #[test]
    fn test_negative_offset_delays_lines() {
        let lyrics = Lyrics::parse("[offset:-250]\n[00:10.00]Test", None).unwrap();
        assert_eq!(lyrics.lines[0].start, ms(10_250));
    }

    #[test]
    fn test_multiple_timestamps_sorted() {
        let input = "[00:20.00][00:05.00]Chorus\n[00:10.00]Verse";
        let lyrics = Lyrics::parse(input, None).unwrap();
        let texts: Vec<_> = lyrics.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Chorus", "Verse", "Chorus"]);
        assert_eq!(lyrics.lines[2].start, ms(20_000));
    }

    #[test]
    fn test_last_line_length() {
        let input = "[00:10.00]a\n[00:20.00]b";
        let unknown = Lyrics::parse(input, None).unwrap();
        assert_eq!(unknown.lines[1].length, DEFAULT_LAST_LINE_LENGTH);

        let known = Lyrics::parse(input, Some(Duration::from_secs(50))).unwrap();
        assert_eq!(known.lines[1].length, Duration::from_secs(30));
    }

    #[test]
    fn test_enhanced_words() {
        let lyrics =
            Lyrics::parse("[00:12.00]<00:12.00>Hello <00:13.00>world", None).unwrap();
        let line = &lyrics.lines[0];
        assert_eq!(line.text, "Hello world");
        assert_eq!(line.words.len(), 2);
        assert_eq!(line.words[1].start, ms(13_000));
        assert_eq!(line.words[1].text, "world");
    }

    #[test]
    fn test_cjk_text() {
        let lyrics = Lyrics::parse("[00:05.00]你好世界", None).unwrap();
        assert_eq!(lyrics.lines[0].text, "你好世界");
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(matches!(
            Lyrics::parse("just some text\nno timing", None),
            Err(CoreError::LrcParseError { .. })
        ));
    }

    #[test]
    fn test_line_lookup() {
        let lyrics = Lyrics::parse("[00:05.00]First\n[00:10.00]Second", None).unwrap();
        assert!(lyrics.line_at(ms(1_000)).is_none());
        assert_eq!(lyrics.line_at(ms(5_000)).unwrap().text, "First");
        assert_eq!(lyrics.line_at(ms(99_000)).unwrap().text, "Second");
    }

    #[test]
    fn test_window() {
        let input = "[00:05.00]1\n[00:10.00]2\n[00:15.00]3\n[00:20.00]4\n[00:25.00]5";
        let lyrics = Lyrics::parse(input, None).unwrap();
        let window: Vec<_> = lyrics
            .window(ms(16_000), 1, 2)
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(window, vec!["2", "3", "4", "5"]);
        assert_eq!(lyrics.window(ms(0), 2, 1).len(), 2);
    }

    #[test]
    fn test_progress_linear() {
        let lyrics = Lyrics::parse("[00:10.00]a\n[00:15.00]b", None).unwrap();
        let line = &lyrics.lines[0];
        assert!(line.progress(ms(8_000)).abs() < f64::EPSILON);
        assert!((line.progress(ms(12_500)) - 0.5).abs() < 0.001);
        assert!((line.progress(ms(15_000)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_by_words() {
        let lyrics =
            Lyrics::parse("[00:10.00]<00:10.00>ab<00:11.00>cd\n[00:12.00]next", None).unwrap();
        let line = &lyrics.lines[0];
        // First word fully sung, second halfway
        assert!((line.progress(ms(11_500)) - 0.75).abs() < 0.001);
        assert!((line.progress(ms(10_500)) - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_overflowing_minutes_tag_dropped() {
        assert_eq!(parse_time("999999999999999999:00.00"), None);

        let lyrics = Lyrics::parse("[999999999999999999:00.00]boom\n[00:01.00]ok", None).unwrap();
        assert_eq!(lyrics.lines.len(), 1);
        assert_eq!(lyrics.lines[0].text, "ok");
        assert_eq!(lyrics.lines[0].start, ms(1000));
    }
}
