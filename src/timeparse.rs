//! Wait-time extraction from rate-limit phrasing
//!
//! Chat surfaces announce usage limits in loosely structured text: "You can
//! generate more images in 3 hours and 51 minutes", "Faltam 2:30", "try again
//! after 14:54". This module turns those snippets into concrete waits or
//! resume instants. The patterns live in [`LimitGrammar`], a versioned table
//! kept separate from the callers, so new locales and phrasings land as a
//! grammar revision without touching the run loop.
//!
//! All duration math is integer milliseconds. Wall-clock math takes an
//! explicit `now` so callers pin the clock and tests stay deterministic.

use crate::error::Result;
use chrono::{NaiveDateTime, TimeDelta};
use regex::Regex;
use std::time::Duration;

/// Safety buffer added to any relative duration found in turn text
const RELATIVE_BUFFER_MINUTES: u64 = 5;

/// Safety buffer added to a probe reply's `DD:HH:MM` countdown
const PROBE_BUFFER_MINUTES: u64 = 5;

/// Safety buffer added past an announced absolute resume time
const ABSOLUTE_BUFFER_MINUTES: i64 = 10;

/// Wait used when an absolute limit announces no parsable timestamp, or the
/// computed wait lands outside the plausible range
const FALLBACK_WAIT: Duration = Duration::from_secs(15 * 60);

/// Wait used when the announced resume time has already passed
const ELAPSED_WAIT: Duration = Duration::from_secs(30);

/// Longest wait an absolute timestamp is allowed to produce, in hours
const MAX_ABSOLUTE_WAIT_HOURS: i64 = 24;

/// Compiled pattern table for rate-limit phrasing (English and Portuguese).
///
/// Compilation is fallible so pattern typos surface at construction instead
/// of panicking mid-run.
#[derive(Debug)]
pub struct LimitGrammar {
    /// Absolute-time preposition guard: "after 14:54", "às 18:30". Text
    /// matching this must not be read as a relative duration.
    absolute_guard: Regex,

    /// Hours mention: "3 hours", "2 horas"
    hours: Regex,

    /// Minutes mention: "51 minutes", "30 minutos", "15 mins"
    minutes: Regex,

    /// Compact hour/minute token: "3h50", "3h50m"
    compact: Regex,

    /// `H:MM` countdown behind a duration-context keyword: "in 2:30",
    /// "faltam 1:05", "about 0:45"
    keyword_countdown: Regex,

    /// Bare clock token with optional meridiem: "14:54", "2:30 pm"
    clock: Regex,

    /// Limit keyword anywhere in a banner: "limit", "limite"
    limit_keyword: Regex,

    /// Limit keyword followed by a clock token, for turn-text scans
    limit_time: Regex,

    /// Bare "no" token in a probe reply, any case. The probe asks for an
    /// upper-case NO, but surfaces routinely restate it in sentence case.
    probe_no: Regex,

    /// `DD:HH:MM` countdown in a probe reply
    probe_countdown: Regex,
}

impl LimitGrammar {
    /// Grammar revision. Bump when a pattern changes meaning, so stored
    /// transcripts can be replayed against the grammar that classified them.
    pub const VERSION: u32 = 2;

    /// Compile the pattern table
    pub fn new() -> Result<Self> {
        Ok(Self {
            absolute_guard: Regex::new(r"(?i)\b(?:após|after|at|às|until)\b\s*\d{1,2}:\d{2}")?,
            hours: Regex::new(r"(?i)(\d{1,2})\s*(?:hours?|horas?)")?,
            minutes: Regex::new(r"(?i)(\d{1,2})\s*(?:minutes?|minutos?|mins?)")?,
            compact: Regex::new(r"(?i)\b(\d{1,2})h(\d{1,2})m?\b")?,
            keyword_countdown: Regex::new(
                r"(?i)\b(?:faltam|restam|cerca de|about|resets?\s+in|in|em)\s*(\d{1,2}):(\d{2})\b",
            )?,
            clock: Regex::new(r"(?i)(\d{1,2}):(\d{2})(?:\s?(am|pm))?")?,
            limit_keyword: Regex::new(r"(?i)\b(?:limit|limite)")?,
            limit_time: Regex::new(r"(?i)(?:limit|limite)[^0-9]*(\d{1,2}:\d{2}(?:\s?(?:am|pm))?)")?,
            probe_no: Regex::new(r"(?i)\bno\b")?,
            probe_countdown: Regex::new(r"(\d{1,2}):(\d{1,2}):(\d{1,2})")?,
        })
    }
}

/// Classified escalation-probe reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeReply {
    /// The surface answered that no usage limit is in effect
    NotLimited,
    /// The surface stated a countdown; wait this long (buffer included)
    Wait(Duration),
    /// The reply matched neither form
    Unrecognized,
}

/// Extracts waits and resume times from turn text, banners, and probe replies
#[derive(Debug)]
pub struct TimeParser {
    grammar: LimitGrammar,
}

impl TimeParser {
    /// Build a parser over the current [`LimitGrammar`]
    pub fn new() -> Result<Self> {
        Ok(Self {
            grammar: LimitGrammar::new()?,
        })
    }

    /// Extract a relative cooldown duration from turn text.
    ///
    /// Returns `None` when the text carries no duration, or when it names an
    /// absolute clock time ("after 14:54") that the absolute path must handle
    /// instead. The returned wait includes a 5-minute buffer.
    pub fn relative_wait(&self, text: &str) -> Option<Duration> {
        // Emphasis markup splits tokens ("**3 hours**"), strip it first
        let text = text.replace("**", "");

        if self.grammar.absolute_guard.is_match(&text) {
            return None;
        }

        let hours = self
            .grammar
            .hours
            .captures(&text)
            .and_then(|caps| capture::<u64>(&caps, 1));
        let minutes = self
            .grammar
            .minutes
            .captures(&text)
            .and_then(|caps| capture::<u64>(&caps, 1));

        let total_minutes = if hours.is_some() || minutes.is_some() {
            hours.unwrap_or(0) * 60 + minutes.unwrap_or(0)
        } else if let Some(caps) = self.grammar.compact.captures(&text) {
            capture::<u64>(&caps, 1)? * 60 + capture::<u64>(&caps, 2)?
        } else if let Some(caps) = self.grammar.keyword_countdown.captures(&text) {
            capture::<u64>(&caps, 1)? * 60 + capture::<u64>(&caps, 2)?
        } else {
            return None;
        };

        Some(minutes_to_duration(total_minutes + RELATIVE_BUFFER_MINUTES))
    }

    /// Resolve an announced clock time to the concrete resume instant.
    ///
    /// The time is anchored to `now`'s date; when that lands more than twelve
    /// hours from `now` in either direction, it rolls forward one day. A
    /// 10-minute buffer is added past the announced time.
    pub fn absolute_resume_time(
        &self,
        time_text: &str,
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let caps = self.grammar.clock.captures(time_text)?;
        let mut hour: u32 = capture(&caps, 1)?;
        let minute: u32 = capture(&caps, 2)?;

        match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
            Some("pm") if hour < 12 => hour += 12,
            Some("am") if hour == 12 => hour = 0,
            _ => {}
        }

        let mut target = now.date().and_hms_opt(hour, minute, 0)?;
        if (target - now).abs() > TimeDelta::hours(12) {
            target += TimeDelta::days(1);
        }

        Some(target + TimeDelta::minutes(ABSOLUTE_BUFFER_MINUTES))
    }

    /// Concrete wait until an announced clock time, clamped to sane bounds.
    ///
    /// No parsable timestamp or a wait past 24 hours falls back to 15
    /// minutes; a resume time already behind `now` waits 30 seconds.
    pub fn absolute_wait(&self, time_text: &str, now: NaiveDateTime) -> Duration {
        let Some(resume) = self.absolute_resume_time(time_text, now) else {
            return FALLBACK_WAIT;
        };

        let wait = resume - now;
        if wait <= TimeDelta::zero() {
            return ELAPSED_WAIT;
        }
        if wait > TimeDelta::hours(MAX_ABSOLUTE_WAIT_HOURS) {
            return FALLBACK_WAIT;
        }

        u64::try_from(wait.num_milliseconds())
            .map(Duration::from_millis)
            .unwrap_or(FALLBACK_WAIT)
    }

    /// Classify the reply to the escalation probe.
    ///
    /// A bare `NO` token (any case) wins over any countdown in the same
    /// reply; otherwise
    /// a `DD:HH:MM` token anywhere in the text becomes a wait with a 5-minute
    /// buffer.
    pub fn probe_reply(&self, text: &str) -> ProbeReply {
        if self.grammar.probe_no.is_match(text) {
            return ProbeReply::NotLimited;
        }

        if let Some(caps) = self.grammar.probe_countdown.captures(text) {
            if let (Some(days), Some(hours), Some(minutes)) = (
                capture::<u64>(&caps, 1),
                capture::<u64>(&caps, 2),
                capture::<u64>(&caps, 3),
            ) {
                let total_minutes = (days * 24 + hours) * 60 + minutes;
                return ProbeReply::Wait(minutes_to_duration(total_minutes + PROBE_BUFFER_MINUTES));
            }
        }

        ProbeReply::Unrecognized
    }

    /// Pull the clock token out of a rate-limit banner.
    ///
    /// The banner must mention a limit keyword somewhere; the first clock
    /// token is then captured verbatim (meridiem included when present).
    pub fn banner_limit_time(&self, banner_text: &str) -> Option<String> {
        if !self.grammar.limit_keyword.is_match(banner_text) {
            return None;
        }
        self.grammar
            .clock
            .find(banner_text)
            .map(|m| m.as_str().to_string())
    }

    /// Pull a clock token that follows a limit keyword in turn text.
    ///
    /// Stricter than [`banner_limit_time`](Self::banner_limit_time): the
    /// keyword must precede the time, so an unrelated timestamp earlier in a
    /// long reply is not mistaken for a resume time.
    pub fn limit_time_in_text(&self, text: &str) -> Option<String> {
        self.grammar
            .limit_time
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn capture<T: std::str::FromStr>(captures: &regex::Captures<'_>, index: usize) -> Option<T> {
    captures.get(index)?.as_str().parse().ok()
}

fn minutes_to_duration(total_minutes: u64) -> Duration {
    Duration::from_millis(total_minutes * 60_000)
}
