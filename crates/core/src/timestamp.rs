use crate::classifier::ENCODED_DATE_TIME_NAME_RE;
use crate::error::RenameError;
use crate::probe::MetadataProbe;
use crate::triage::SourceEntry;
use chrono::{
    DateTime, Duration, Local, LocalResult, Months, NaiveDateTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::time::SystemTime;
use tracing::debug;

pub const ENCODED_DATE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    #[default]
    FileModificationTime,
    EmbeddedVideoMetadata,
    EncodedFilenameDateTime,
}

/// Local wall-clock capture time, second precision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedTimestamp(NaiveDateTime);

impl ResolvedTimestamp {
    pub fn new(value: NaiveDateTime) -> Self {
        Self(value.with_nanosecond(0).unwrap_or(value))
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn to_system_time(&self) -> Option<SystemTime> {
        match Local.from_local_datetime(&self.0) {
            LocalResult::Single(dt) => Some(dt.into()),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.into()),
            LocalResult::None => None,
        }
    }
}

impl From<DateTime<Local>> for ResolvedTimestamp {
    fn from(value: DateTime<Local>) -> Self {
        Self::new(value.naive_local())
    }
}

impl fmt::Display for ResolvedTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Clock correction applied after resolution: hours, then days, then months.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TimeShift {
    pub hours: i64,
    pub days: i64,
    pub months: i32,
}

impl TimeShift {
    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.days == 0 && self.months == 0
    }

    pub fn apply(&self, timestamp: ResolvedTimestamp) -> Result<ResolvedTimestamp, RenameError> {
        let base = timestamp.naive();
        let out_of_range = || RenameError::ShiftOutOfRange(base);

        let shifted = base
            .checked_add_signed(Duration::try_hours(self.hours).ok_or_else(out_of_range)?)
            .ok_or_else(out_of_range)?;
        let shifted = shifted
            .checked_add_signed(Duration::try_days(self.days).ok_or_else(out_of_range)?)
            .ok_or_else(out_of_range)?;
        let months = Months::new(self.months.unsigned_abs());
        let shifted = if self.months >= 0 {
            shifted.checked_add_months(months)
        } else {
            shifted.checked_sub_months(months)
        }
        .ok_or_else(out_of_range)?;

        Ok(ResolvedTimestamp::new(shifted))
    }
}

pub fn resolve_timestamp(
    entry: &SourceEntry,
    source: TimestampSource,
    probe: &dyn MetadataProbe,
) -> Result<ResolvedTimestamp, RenameError> {
    match source {
        TimestampSource::FileModificationTime => modified_time(entry),
        TimestampSource::EmbeddedVideoMetadata => embedded_creation_time(entry, probe),
        TimestampSource::EncodedFilenameDateTime => encoded_filename_time(entry),
    }
}

fn modified_time(entry: &SourceEntry) -> Result<ResolvedTimestamp, RenameError> {
    let modified = fs::metadata(&entry.path)
        .and_then(|meta| meta.modified())
        .map_err(|err| {
            RenameError::timestamp_unavailable(
                &entry.path,
                TimestampSource::FileModificationTime,
                err.to_string(),
            )
        })?;
    Ok(DateTime::<Local>::from(modified).into())
}

fn embedded_creation_time(
    entry: &SourceEntry,
    probe: &dyn MetadataProbe,
) -> Result<ResolvedTimestamp, RenameError> {
    let unavailable = |reason: String| {
        RenameError::timestamp_unavailable(
            &entry.path,
            TimestampSource::EmbeddedVideoMetadata,
            reason,
        )
    };

    let report = probe
        .probe(&entry.path)
        .map_err(|err| unavailable(err.to_string()))?;
    debug!("{}", report.describe(&entry.path));
    let raw = report
        .creation_time()
        .ok_or_else(|| unavailable("creation_timeタグがありません".to_string()))?;
    let parsed = parse_creation_time(raw)
        .ok_or_else(|| unavailable(format!("creation_timeを解析できませんでした: {raw}")))?;
    Ok(parsed.into())
}

fn encoded_filename_time(entry: &SourceEntry) -> Result<ResolvedTimestamp, RenameError> {
    let unavailable = |reason: String| {
        RenameError::timestamp_unavailable(
            &entry.path,
            TimestampSource::EncodedFilenameDateTime,
            reason,
        )
    };

    let caps = ENCODED_DATE_TIME_NAME_RE
        .captures(&entry.file_name)
        .ok_or_else(|| unavailable("ファイル名が日時_名前の形式ではありません".to_string()))?;
    let token = &caps[1];
    let parsed = NaiveDateTime::parse_from_str(token, ENCODED_DATE_TIME_FORMAT)
        .map_err(|err| unavailable(format!("{token}: {err}")))?;
    Ok(ResolvedTimestamp::new(parsed))
}

/// Timezone-aware `creation_time` tag, converted to local time. Values without
/// an offset are read as UTC, which is how container metadata stores them.
pub fn parse_creation_time(input: &str) -> Option<DateTime<Local>> {
    let normalized = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(normalized) {
        return Some(dt.with_timezone(&Local));
    }

    let with_offset = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];
    for fmt in with_offset {
        if let Ok(dt) = DateTime::parse_from_str(normalized, fmt) {
            return Some(dt.with_timezone(&Local));
        }
    }

    let naive = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    for fmt in naive {
        if let Ok(value) = NaiveDateTime::parse_from_str(normalized, fmt) {
            return Some(Utc.from_utc_datetime(&value).with_timezone(&Local));
        }
    }

    None
}
