use crate::classifier::{classify, Classification};
use crate::collision::CollisionResolver;
use crate::error::RenameError;
use crate::filename::{build_target_filename, sanitize_tag};
use crate::probe::MetadataProbe;
use crate::timestamp::{resolve_timestamp, ResolvedTimestamp, TimeShift, TimestampSource};
use crate::triage::{triage, SourceEntry, TriageDecision};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub directory: PathBuf,
    pub timestamp_source: TimestampSource,
    pub shift: TimeShift,
    pub custom_tag: String,
    pub dry_run: bool,
    pub sync_modified_time: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            timestamp_source: TimestampSource::FileModificationTime,
            shift: TimeShift::default(),
            custom_tag: String::new(),
            dry_run: true,
            sync_modified_time: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenamePlan {
    pub source: SourceEntry,
    pub target_filename: String,
    pub final_path: PathBuf,
    pub is_fallback: bool,
    pub classification: Classification,
    pub source_time: ResolvedTimestamp,
    pub shifted_time: ResolvedTimestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Deleted,
    Skipped,
    Renamed { plan: RenamePlan },
    Unchanged { plan: RenamePlan },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryReport {
    pub path: PathBuf,
    pub decision: TriageDecision,
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub scanned_files: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub renamed: usize,
    pub fallbacks: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub directory: PathBuf,
    pub dry_run: bool,
    pub timestamp_source: TimestampSource,
    pub entries: Vec<EntryReport>,
    pub stats: BatchStats,
}

pub fn run_batch(options: &BatchOptions, probe: &dyn MetadataProbe) -> Result<BatchReport> {
    if !options.directory.is_dir() {
        anyhow::bail!(
            "対象フォルダが存在しません: {}",
            options.directory.display()
        );
    }

    let files = collect_files(&options.directory)?;
    let custom_tag = sanitize_tag(&options.custom_tag);
    let mut resolver = CollisionResolver::new(&options.directory, options.dry_run);
    let mut stats = BatchStats::default();
    let mut entries = Vec::with_capacity(files.len());

    info!(
        directory = %options.directory.display(),
        source = ?options.timestamp_source,
        files = files.len(),
        dry_run = options.dry_run,
        "一括リネームを開始します"
    );

    for path in files {
        stats.scanned_files += 1;
        let entry = SourceEntry::from_path(path);
        let decision = triage(&entry);

        let outcome = match decision {
            TriageDecision::Delete => delete_entry(&entry, options.dry_run, &mut resolver),
            TriageDecision::Skip => {
                info!(path = %entry.path.display(), "スキップします");
                EntryOutcome::Skipped
            }
            TriageDecision::Process => {
                info!(
                    path = %entry.path.display(),
                    extension = %entry.extension,
                    "処理します"
                );
                // the metadata source already dumps what it probed
                if options.timestamp_source != TimestampSource::EmbeddedVideoMetadata {
                    log_probe_details(&entry, probe);
                }
                match process_entry(&entry, options, &custom_tag, probe, &mut resolver) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(path = %entry.path.display(), error = %err, "処理に失敗しました");
                        EntryOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                }
            }
        };

        match &outcome {
            EntryOutcome::Deleted => stats.deleted += 1,
            EntryOutcome::Skipped => stats.skipped += 1,
            EntryOutcome::Renamed { plan } => {
                stats.renamed += 1;
                if plan.is_fallback {
                    stats.fallbacks += 1;
                }
            }
            EntryOutcome::Unchanged { .. } => stats.unchanged += 1,
            EntryOutcome::Failed { .. } => stats.failed += 1,
        }

        entries.push(EntryReport {
            path: entry.path,
            decision,
            outcome,
        });
    }

    Ok(BatchReport {
        directory: options.directory.clone(),
        dry_run: options.dry_run,
        timestamp_source: options.timestamp_source,
        entries,
        stats,
    })
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err)
                    .with_context(|| format!("フォルダを読めませんでした: {}", root.display()));
            }
            Err(err) => {
                warn!(error = %err, "エントリを読めなかったため無視します");
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}

fn delete_entry(
    entry: &SourceEntry,
    dry_run: bool,
    resolver: &mut CollisionResolver,
) -> EntryOutcome {
    if !dry_run {
        if let Err(err) = fs::remove_file(&entry.path) {
            let err = RenameError::io("ファイルの削除", &entry.path, err);
            error!(error = %err, "削除に失敗しました");
            return EntryOutcome::Failed {
                reason: err.to_string(),
            };
        }
    }
    resolver.mark_vacated(&entry.path);
    info!(path = %entry.path.display(), dry_run, "削除しました");
    EntryOutcome::Deleted
}

fn process_entry(
    entry: &SourceEntry,
    options: &BatchOptions,
    custom_tag: &str,
    probe: &dyn MetadataProbe,
    resolver: &mut CollisionResolver,
) -> Result<EntryOutcome, RenameError> {
    let source_time = resolve_timestamp(entry, options.timestamp_source, probe)?;
    info!(
        path = %entry.path.display(),
        source = ?options.timestamp_source,
        source_time = %source_time,
        "撮影日時を決定しました"
    );
    let shifted_time = if options.shift.is_zero() {
        source_time
    } else {
        let shifted = options.shift.apply(source_time)?;
        info!(
            hours = options.shift.hours,
            days = options.shift.days,
            months = options.shift.months,
            shifted_time = %shifted,
            "撮影日時を補正しました"
        );
        shifted
    };

    if !options.dry_run && options.sync_modified_time {
        set_modified_time(&entry.path, shifted_time)?;
    }

    let classification = classify(&entry.file_name);
    if !classification.is_recognized() {
        warn!(file = %entry.file_name, "命名規則を判別できませんでした");
    }
    let target_filename = build_target_filename(
        shifted_time,
        &classification.suffix,
        custom_tag,
        &entry.extension,
    );
    let candidate = options.directory.join(&target_filename);

    let mut plan = RenamePlan {
        source: entry.clone(),
        target_filename,
        final_path: candidate.clone(),
        is_fallback: false,
        classification,
        source_time,
        shifted_time,
    };

    if is_same_location(&candidate, &entry.path) {
        info!(path = %entry.path.display(), "既に正規のファイル名です");
        return Ok(EntryOutcome::Unchanged { plan });
    }

    let placement = resolver.place(&entry.path, &candidate)?;
    plan.final_path = placement.final_path;
    plan.is_fallback = placement.is_fallback;
    Ok(EntryOutcome::Renamed { plan })
}

/// Names differing only in case are the same file on macOS and Windows.
fn is_same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    cfg!(any(target_os = "macos", windows))
        && a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}

fn set_modified_time(path: &Path, timestamp: ResolvedTimestamp) -> Result<(), RenameError> {
    let Some(time) = timestamp.to_system_time() else {
        warn!(
            path = %path.display(),
            time = %timestamp,
            "ローカル時刻に存在しない日時のため更新日時を変更しません"
        );
        return Ok(());
    };
    let file = fs::File::options()
        .write(true)
        .open(path)
        .map_err(|err| RenameError::io("更新日時の設定", path, err))?;
    file.set_modified(time)
        .map_err(|err| RenameError::io("更新日時の設定", path, err))?;
    Ok(())
}

fn log_probe_details(entry: &SourceEntry, probe: &dyn MetadataProbe) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    match probe.probe(&entry.path) {
        Ok(report) => debug!("{}", report.describe(&entry.path)),
        Err(err) => debug!(path = %entry.path.display(), error = %err, "メディア情報を取得できませんでした"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::NamingConvention;
    use crate::collision::DUPLICATES_DIR;
    use crate::probe::{ProbeError, ProbeReport};
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::collections::{BTreeMap, HashMap};
    use std::time::SystemTime;
    use tempfile::tempdir;

    struct TagProbe(HashMap<String, String>);

    impl MetadataProbe for TagProbe {
        fn probe(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
            let name = path
                .file_name()
                .map(|v| v.to_string_lossy().to_string())
                .unwrap_or_default();
            let value = self
                .0
                .get(&name)
                .ok_or_else(|| ProbeError::Parse(format!("no metadata for {name}")))?;
            let mut format_tags = BTreeMap::new();
            format_tags.insert("creation_time".to_string(), value.clone());
            Ok(ProbeReport {
                format_tags,
                ..ProbeReport::default()
            })
        }
    }

    struct CountingProbe {
        calls: Cell<usize>,
    }

    impl MetadataProbe for CountingProbe {
        fn probe(&self, _path: &Path) -> Result<ProbeReport, ProbeError> {
            self.calls.set(self.calls.get() + 1);
            let mut format_tags = BTreeMap::new();
            format_tags.insert(
                "creation_time".to_string(),
                "2023-03-05T08:07:09Z".to_string(),
            );
            Ok(ProbeReport {
                format_tags,
                ..ProbeReport::default()
            })
        }
    }

    fn no_probe() -> TagProbe {
        TagProbe(HashMap::new())
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> ResolvedTimestamp {
        ResolvedTimestamp::new(
            NaiveDate::from_ymd_opt(y, mo, d)
                .and_then(|date| date.and_hms_opt(h, mi, s))
                .expect("valid date"),
        )
    }

    fn write_with_mtime(path: &Path, body: &[u8], time: ResolvedTimestamp) {
        fs::write(path, body).expect("write file");
        let file = fs::File::options()
            .write(true)
            .open(path)
            .expect("open for mtime");
        file.set_modified(time.to_system_time().expect("local time"))
            .expect("set mtime");
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>, SystemTime)> {
        let mut out: Vec<_> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .flatten()
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let meta = fs::metadata(e.path()).expect("metadata");
                (
                    e.path().to_path_buf(),
                    fs::read(e.path()).expect("read"),
                    meta.modified().expect("mtime"),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn options(dir: &Path, dry_run: bool) -> BatchOptions {
        BatchOptions {
            directory: dir.to_path_buf(),
            dry_run,
            ..BatchOptions::default()
        }
    }

    fn renamed_plan(report: &BatchReport, name: &str) -> RenamePlan {
        report
            .entries
            .iter()
            .find(|e| e.path.file_name().and_then(|v| v.to_str()) == Some(name))
            .and_then(|e| match &e.outcome {
                EntryOutcome::Renamed { plan } => Some(plan.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("{name} should be renamed"))
    }

    fn populate(dir: &Path) {
        let t = at(2023, 3, 5, 8, 7, 9);
        write_with_mtime(&dir.join("GOPR1234.MP4"), b"first", t);
        write_with_mtime(&dir.join("GP021234.MP4"), b"second", at(2023, 3, 5, 8, 20, 0));
        write_with_mtime(&dir.join("GX011234.MP4"), b"dup", t);
        write_with_mtime(&dir.join("GOPR1234.THM"), b"thumb", t);
        write_with_mtime(&dir.join("GL011234.LRV"), b"proxy", t);
        write_with_mtime(&dir.join(".DS_Store"), b"hidden", t);
        write_with_mtime(&dir.join("random_name.mov"), b"unknown", t);
    }

    #[test]
    fn run_batch_rejects_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let err = run_batch(&options(&temp.path().join("nope"), true), &no_probe())
            .expect_err("missing folder must fail");
        assert!(err.to_string().contains("対象フォルダが存在しません"));
    }

    #[test]
    fn full_run_deletes_skips_and_renames() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        populate(dir);

        let report = run_batch(&options(dir, false), &no_probe()).expect("run");

        assert_eq!(report.stats.scanned_files, 7);
        assert_eq!(report.stats.deleted, 2);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.renamed, 4);
        assert_eq!(report.stats.fallbacks, 1);
        assert_eq!(report.stats.failed, 0);

        assert!(!dir.join("GOPR1234.THM").exists());
        assert!(!dir.join("GL011234.LRV").exists());
        assert!(dir.join(".DS_Store").exists());

        let first = renamed_plan(&report, "GOPR1234.MP4");
        assert_eq!(first.final_path, dir.join("20230305_080709_1234.mp4"));
        assert!(!first.is_fallback);
        assert_eq!(
            fs::read(dir.join("20230305_080709_1234.mp4")).expect("read"),
            b"first"
        );

        let chapter = renamed_plan(&report, "GP021234.MP4");
        assert_eq!(chapter.target_filename, "20230305_082000_1234_02.mp4");

        let dup = renamed_plan(&report, "GX011234.MP4");
        assert!(dup.is_fallback);
        assert_eq!(
            dup.final_path,
            dir.join(DUPLICATES_DIR).join("20230305_080709_1234.mp4")
        );
        assert_eq!(fs::read(&dup.final_path).expect("read dup"), b"dup");

        let unknown = renamed_plan(&report, "random_name.mov");
        assert_eq!(unknown.classification.convention, NamingConvention::Unknown);
        assert_eq!(unknown.target_filename, "20230305_080709_UNKNOWN.mov");
    }

    #[test]
    fn dry_run_leaves_disk_untouched_and_matches_real_run() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        populate(dir);

        let before = snapshot(dir);
        let dry = run_batch(&options(dir, true), &no_probe()).expect("dry run");
        assert_eq!(snapshot(dir), before);
        assert!(!dir.join(DUPLICATES_DIR).exists());

        let real = run_batch(&options(dir, false), &no_probe()).expect("real run");
        assert!(dry.dry_run);
        assert!(!real.dry_run);
        assert_eq!(dry.entries, real.entries);
        assert_eq!(dry.stats, real.stats);
    }

    #[test]
    fn shift_is_applied_and_synced_to_mtime() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        write_with_mtime(&dir.join("DJI_0042.JPG"), b"x", at(2023, 1, 31, 23, 30, 0));

        let opts = BatchOptions {
            shift: TimeShift {
                hours: 1,
                days: 0,
                months: 1,
            },
            ..options(dir, false)
        };
        let report = run_batch(&opts, &no_probe()).expect("run");

        let plan = renamed_plan(&report, "DJI_0042.JPG");
        assert_eq!(plan.shifted_time, at(2023, 3, 1, 0, 30, 0));
        let target = dir.join("20230301_003000_0042.jpg");
        assert_eq!(plan.final_path, target);

        let mtime = fs::metadata(&target)
            .and_then(|m| m.modified())
            .expect("mtime");
        assert_eq!(
            ResolvedTimestamp::from(chrono::DateTime::<chrono::Local>::from(mtime)),
            plan.shifted_time
        );
    }

    #[test]
    fn keep_mtime_leaves_modification_time_alone() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        let original = at(2023, 1, 31, 23, 30, 0);
        write_with_mtime(&dir.join("IMG_0007.JPG"), b"x", original);

        let opts = BatchOptions {
            shift: TimeShift {
                hours: 2,
                ..TimeShift::default()
            },
            sync_modified_time: false,
            ..options(dir, false)
        };
        run_batch(&opts, &no_probe()).expect("run");

        let mtime = fs::metadata(dir.join("20230201_013000_0007.jpg"))
            .and_then(|m| m.modified())
            .expect("mtime");
        assert_eq!(
            ResolvedTimestamp::from(chrono::DateTime::<chrono::Local>::from(mtime)),
            original
        );
    }

    #[test]
    fn per_file_failures_do_not_abort_the_batch() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("20230305_080709_beach.mp4"), b"a").expect("write");
        fs::write(dir.join("GOPR1234.MP4"), b"b").expect("write");
        fs::write(dir.join("20230101_120000_hike.mp4"), b"c").expect("write");

        let opts = BatchOptions {
            timestamp_source: TimestampSource::EncodedFilenameDateTime,
            shift: TimeShift {
                hours: 1,
                ..TimeShift::default()
            },
            ..options(dir, false)
        };
        let report = run_batch(&opts, &no_probe()).expect("run");

        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.renamed, 2);
        assert!(dir.join("GOPR1234.MP4").exists());
        assert!(dir.join("20230305_090709_beach.mp4").exists());
        assert!(dir.join("20230101_130000_hike.mp4").exists());

        let failed = report
            .entries
            .iter()
            .find(|e| matches!(e.outcome, EntryOutcome::Failed { .. }))
            .expect("one failure");
        assert_eq!(failed.path, dir.join("GOPR1234.MP4"));
    }

    #[test]
    fn canonical_name_is_left_unchanged() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        let path = dir.join("20230305_080709_beach.mp4");
        fs::write(&path, b"a").expect("write");

        let opts = BatchOptions {
            timestamp_source: TimestampSource::EncodedFilenameDateTime,
            ..options(dir, false)
        };
        let report = run_batch(&opts, &no_probe()).expect("run");

        assert_eq!(report.stats.unchanged, 1);
        assert!(path.exists());
        assert!(!dir.join(DUPLICATES_DIR).exists());
    }

    #[test]
    fn embedded_metadata_and_custom_tag() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("GX031234.MP4"), b"a").expect("write");
        fs::write(dir.join("GX041234.MP4"), b"b").expect("write");

        let probe = TagProbe(HashMap::from([(
            "GX031234.MP4".to_string(),
            "2023-03-05T08:07:09.000000Z".to_string(),
        )]));
        let opts = BatchOptions {
            timestamp_source: TimestampSource::EmbeddedVideoMetadata,
            custom_tag: "_iceland/day1".to_string(),
            ..options(dir, false)
        };
        let report = run_batch(&opts, &probe).expect("run");

        let expected_time = ResolvedTimestamp::from(
            chrono::DateTime::parse_from_rfc3339("2023-03-05T08:07:09Z")
                .expect("rfc3339")
                .with_timezone(&chrono::Local),
        );
        let plan = renamed_plan(&report, "GX031234.MP4");
        assert_eq!(plan.source_time, expected_time);
        assert!(plan.target_filename.ends_with("_1234_02_iceland_day1.mp4"));
        assert_eq!(plan.final_path.parent(), Some(dir));

        assert_eq!(report.stats.failed, 1);
        assert!(dir.join("GX041234.MP4").exists());
    }

    #[test]
    fn metadata_source_probes_each_file_once_with_debug_logging() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        fs::write(dir.join("GX011234.MP4"), b"a").expect("write");
        fs::write(dir.join("GX021234.MP4"), b"b").expect("write");

        let probe = CountingProbe {
            calls: Cell::new(0),
        };
        let opts = BatchOptions {
            timestamp_source: TimestampSource::EmbeddedVideoMetadata,
            ..options(dir, true)
        };
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let report = tracing::subscriber::with_default(subscriber, || run_batch(&opts, &probe))
            .expect("run");

        assert_eq!(report.stats.renamed, 2);
        assert_eq!(probe.calls.get(), 2);
    }

    #[test]
    fn zero_shift_keeps_resolved_time() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path();
        let original = at(2023, 3, 5, 8, 7, 9);
        write_with_mtime(&dir.join("GOPR1234.MP4"), b"x", original);

        let report = run_batch(&options(dir, true), &no_probe()).expect("run");

        let plan = renamed_plan(&report, "GOPR1234.MP4");
        assert_eq!(plan.source_time, original);
        assert_eq!(plan.shifted_time, original);
    }

    #[test]
    fn same_location_ignores_case_only_on_case_insensitive_platforms() {
        let lower = Path::new("/card/20230305_080709_beach.mp4");
        let upper = Path::new("/card/20230305_080709_beach.MP4");

        assert!(is_same_location(lower, lower));
        assert_eq!(
            is_same_location(lower, upper),
            cfg!(any(target_os = "macos", windows))
        );
        assert!(!is_same_location(
            lower,
            Path::new("/card/20230305_080709_hike.mp4")
        ));
    }
}
