use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_SUFFIX: &str = "UNKNOWN";
pub const SINGLETON_SUFFIX: &str = "0001";

pub(crate) static ENCODED_DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{8}_\d{6}\..*$").expect("failed to compile encoded datetime regex")
});

pub(crate) static ENCODED_DATE_TIME_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8}_\d{6})_(.+)\..*$").expect("failed to compile encoded datetime name regex")
});

static GENERIC_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^IMG_(.+)\..*$").expect("failed to compile image regex"));

static FIRST_SEGMENT_A_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^GOPR(\d+)").expect("failed to compile first segment regex"));

static CONTINUATION_A_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^GP(\d{2})(\d+)").expect("failed to compile continuation regex"));

static FIRST_SEGMENT_B_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^G[XH]01(\d+)").expect("failed to compile first segment regex"));

static CONTINUATION_B_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^G[XH](\d{2})(\d+)").expect("failed to compile continuation regex")
});

static DRONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DJI_(\d+)").expect("failed to compile drone regex"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NamingConvention {
    EncodedDateTime,
    GenericImage,
    ActionCamFirstSegment,
    ActionCamContinuation,
    DroneCapture,
    Unknown,
}

/// The rule of the fixed priority list that produced a classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PatternRule {
    EncodedDateTimeOnly,
    EncodedDateTimeWithName,
    GenericImage,
    ActionCamFirstSegmentA,
    ActionCamContinuationA,
    ActionCamFirstSegmentB,
    ActionCamContinuationB,
    Drone,
    Fallback,
}

impl PatternRule {
    /// Camera family that emits filenames of this shape. Differs from the
    /// classification's convention only for drone files, whose suffix takes
    /// the first-segment shape.
    pub fn family(self) -> NamingConvention {
        match self {
            Self::EncodedDateTimeOnly | Self::EncodedDateTimeWithName => {
                NamingConvention::EncodedDateTime
            }
            Self::GenericImage => NamingConvention::GenericImage,
            Self::ActionCamFirstSegmentA | Self::ActionCamFirstSegmentB => {
                NamingConvention::ActionCamFirstSegment
            }
            Self::ActionCamContinuationA | Self::ActionCamContinuationB => {
                NamingConvention::ActionCamContinuation
            }
            Self::Drone => NamingConvention::DroneCapture,
            Self::Fallback => NamingConvention::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub convention: NamingConvention,
    pub suffix: String,
    pub rule: PatternRule,
}

impl Classification {
    fn new(rule: PatternRule, convention: NamingConvention, suffix: impl Into<String>) -> Self {
        Self {
            convention,
            suffix: suffix.into(),
            rule,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.convention != NamingConvention::Unknown
    }
}

type RuleFn = fn(&str) -> Option<Classification>;

const RULES: &[RuleFn] = &[
    encoded_date_time_only,
    encoded_date_time_with_name,
    generic_image,
    action_cam_first_segment_a,
    action_cam_continuation_a,
    action_cam_first_segment_b,
    action_cam_continuation_b,
    drone_capture,
];

/// Classifies a bare filename (no directory part). Rules are tried in
/// priority order and the first match wins.
pub fn classify(filename: &str) -> Classification {
    RULES
        .iter()
        .find_map(|rule| rule(filename))
        .unwrap_or_else(|| {
            Classification::new(
                PatternRule::Fallback,
                NamingConvention::Unknown,
                UNKNOWN_SUFFIX,
            )
        })
}

fn encoded_date_time_only(filename: &str) -> Option<Classification> {
    ENCODED_DATE_TIME_RE.is_match(filename).then(|| {
        Classification::new(
            PatternRule::EncodedDateTimeOnly,
            NamingConvention::EncodedDateTime,
            SINGLETON_SUFFIX,
        )
    })
}

fn encoded_date_time_with_name(filename: &str) -> Option<Classification> {
    let caps = ENCODED_DATE_TIME_NAME_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::EncodedDateTimeWithName,
        NamingConvention::EncodedDateTime,
        &caps[2],
    ))
}

fn generic_image(filename: &str) -> Option<Classification> {
    let caps = GENERIC_IMAGE_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::GenericImage,
        NamingConvention::GenericImage,
        &caps[1],
    ))
}

fn action_cam_first_segment_a(filename: &str) -> Option<Classification> {
    let caps = FIRST_SEGMENT_A_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::ActionCamFirstSegmentA,
        NamingConvention::ActionCamFirstSegment,
        &caps[1],
    ))
}

fn action_cam_continuation_a(filename: &str) -> Option<Classification> {
    let caps = CONTINUATION_A_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::ActionCamContinuationA,
        NamingConvention::ActionCamContinuation,
        format!("{}_{}", &caps[2], &caps[1]),
    ))
}

fn action_cam_first_segment_b(filename: &str) -> Option<Classification> {
    let caps = FIRST_SEGMENT_B_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::ActionCamFirstSegmentB,
        NamingConvention::ActionCamFirstSegment,
        &caps[1],
    ))
}

// Chapter indices are 1-based in this form; the suffix carries them 0-based.
fn action_cam_continuation_b(filename: &str) -> Option<Classification> {
    let caps = CONTINUATION_B_RE.captures(filename)?;
    let chapter = &caps[1];
    if chapter == "01" {
        return None;
    }
    let index = chapter.parse::<u32>().ok()?.checked_sub(1)?;
    Some(Classification::new(
        PatternRule::ActionCamContinuationB,
        NamingConvention::ActionCamContinuation,
        format!("{}_{:02}", &caps[2], index),
    ))
}

fn drone_capture(filename: &str) -> Option<Classification> {
    let caps = DRONE_RE.captures(filename)?;
    Some(Classification::new(
        PatternRule::Drone,
        NamingConvention::ActionCamFirstSegment,
        &caps[1],
    ))
}
