use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Videos at or under this length are classified as Shorts.
pub const SHORT_MAX_SECONDS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    Short,
    Long,
}

impl VideoType {
    pub fn from_duration(duration_seconds: i64) -> Self {
        if duration_seconds <= SHORT_MAX_SECONDS {
            VideoType::Short
        } else {
            VideoType::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoType::Short => "short",
            VideoType::Long => "long",
        }
    }
}

impl fmt::Display for VideoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(VideoType::Short),
            "long" => Ok(VideoType::Long),
            other => Err(format!("unknown video type `{other}`")),
        }
    }
}

/// A video as normalized from the Data API. Counters are all-time totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredVideo {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub duration_seconds: i64,
    pub video_type: VideoType,
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/mqdefault.jpg")
}

/// Parse an ISO-8601 duration of the `PT#H#M#S` form. Any group may be
/// missing; anything malformed yields 0.
pub fn parse_iso8601_duration(raw: &str) -> i64 {
    let Some(body) = raw.trim().strip_prefix("PT") else {
        return 0;
    };
    if body.is_empty() {
        return 0;
    }

    let mut total = 0i64;
    let mut digits = String::new();
    // Units must appear in H, M, S order, each at most once.
    let mut last_rank = 0u8;

    for ch in body.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let (rank, factor) = match ch {
            'H' => (1, 3600),
            'M' => (2, 60),
            'S' => (3, 1),
            _ => return 0,
        };
        if rank <= last_rank || digits.is_empty() {
            return 0;
        }
        let Ok(value) = digits.parse::<i64>() else {
            return 0;
        };
        let Some(next) = value.checked_mul(factor).and_then(|v| total.checked_add(v)) else {
            return 0;
        };
        total = next;
        last_rank = rank;
        digits.clear();
    }

    if !digits.is_empty() {
        return 0;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), 253);
        assert_eq!(parse_iso8601_duration("PT1H"), 3600);
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_iso8601_duration("PT10M"), 600);
    }

    #[test]
    fn malformed_durations_are_zero() {
        assert_eq!(parse_iso8601_duration(""), 0);
        assert_eq!(parse_iso8601_duration("PT"), 0);
        assert_eq!(parse_iso8601_duration("P1D"), 0);
        assert_eq!(parse_iso8601_duration("PT4X"), 0);
        assert_eq!(parse_iso8601_duration("PT13S4M"), 0);
        assert_eq!(parse_iso8601_duration("PT45"), 0);
        assert_eq!(parse_iso8601_duration("garbage"), 0);
        assert_eq!(parse_iso8601_duration("PT99999999999999999H"), 0);
        assert_eq!(parse_iso8601_duration("PT2562047788015215H59M"), 0);
    }

    #[test]
    fn short_boundary_is_inclusive() {
        assert_eq!(VideoType::from_duration(180), VideoType::Short);
        assert_eq!(VideoType::from_duration(181), VideoType::Long);
        assert_eq!(VideoType::from_duration(0), VideoType::Short);
    }

    #[test]
    fn video_type_round_trips_through_str() {
        for ty in [VideoType::Short, VideoType::Long] {
            assert_eq!(ty.as_str().parse::<VideoType>(), Ok(ty));
        }
        assert!("medium".parse::<VideoType>().is_err());
    }
}
