mod batch;
mod classifier;
mod collision;
mod config;
mod error;
mod filename;
mod probe;
mod timestamp;
mod triage;

pub use batch::{
    run_batch, BatchOptions, BatchReport, BatchStats, EntryOutcome, EntryReport, RenamePlan,
};
pub use classifier::{classify, Classification, NamingConvention, PatternRule, UNKNOWN_SUFFIX};
pub use collision::{CollisionResolver, Placement, DUPLICATES_DIR};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
};
pub use error::RenameError;
pub use filename::{build_target_filename, sanitize_tag, timestamp_prefix};
pub use probe::{
    parse_ffprobe_json, FfprobeProbe, MetadataProbe, ProbeError, ProbeReport, ProbeStream,
};
pub use timestamp::{
    parse_creation_time, resolve_timestamp, ResolvedTimestamp, TimeShift, TimestampSource,
};
pub use triage::{triage, SourceEntry, TriageDecision, DELETABLE_EXTENSIONS};
