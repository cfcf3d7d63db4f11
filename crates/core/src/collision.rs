use crate::error::RenameError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DUPLICATES_DIR: &str = "duplicates";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Placement {
    pub final_path: PathBuf,
    pub is_fallback: bool,
}

/// Moves files into place without ever overwriting. Occupancy is tracked for
/// the whole run so a dry run predicts the same placements as a real one.
#[derive(Debug)]
pub struct CollisionResolver {
    duplicates_dir: PathBuf,
    dry_run: bool,
    duplicates_ready: bool,
    claimed: HashSet<PathBuf>,
    vacated: HashSet<PathBuf>,
}

impl CollisionResolver {
    pub fn new(directory: &Path, dry_run: bool) -> Self {
        Self {
            duplicates_dir: directory.join(DUPLICATES_DIR),
            dry_run,
            duplicates_ready: false,
            claimed: HashSet::new(),
            vacated: HashSet::new(),
        }
    }

    pub fn duplicates_dir(&self) -> &Path {
        &self.duplicates_dir
    }

    pub fn is_occupied(&self, path: &Path) -> bool {
        if self.claimed.contains(path) {
            return true;
        }
        // symlink_metadata so a dangling link still counts as taken
        !self.vacated.contains(path) && fs::symlink_metadata(path).is_ok()
    }

    pub fn mark_vacated(&mut self, path: &Path) {
        self.vacated.insert(path.to_path_buf());
    }

    pub fn place(&mut self, source: &Path, candidate: &Path) -> Result<Placement, RenameError> {
        if self.is_occupied(candidate) {
            warn!(
                from = %source.display(),
                to = %candidate.display(),
                dry_run = self.dry_run,
                "リネーム先が既に存在するため重複フォルダへ移動します"
            );
        } else {
            match self.move_file(source, candidate) {
                Ok(()) => return Ok(self.record(source, candidate, false)),
                Err(err) => warn!(
                    error = %err,
                    "移動に失敗したため重複フォルダへ移動します"
                ),
            }
        }

        self.ensure_duplicates_dir();

        let file_name = candidate.file_name().unwrap_or_default();
        let fallback = self.duplicates_dir.join(file_name);
        if self.is_occupied(&fallback) {
            let err = RenameError::CollisionConflict {
                from: source.to_path_buf(),
                to: fallback,
            };
            error!(error = %err, dry_run = self.dry_run, "ファイルは元の場所に残します");
            return Err(err);
        }

        if let Err(err) = self.move_file(source, &fallback) {
            error!(error = %err, "ファイルは元の場所に残します");
            return Err(err);
        }
        Ok(self.record(source, &fallback, true))
    }

    fn move_file(&self, source: &Path, destination: &Path) -> Result<(), RenameError> {
        if !self.dry_run {
            fs::rename(source, destination)
                .map_err(|err| RenameError::io("ファイルの移動", source, err))?;
        }
        info!(
            from = %source.display(),
            to = %destination.display(),
            dry_run = self.dry_run,
            "ファイルを移動しました"
        );
        Ok(())
    }

    fn record(&mut self, source: &Path, destination: &Path, is_fallback: bool) -> Placement {
        self.vacated.insert(source.to_path_buf());
        self.claimed.insert(destination.to_path_buf());
        Placement {
            final_path: destination.to_path_buf(),
            is_fallback,
        }
    }

    fn ensure_duplicates_dir(&mut self) {
        if self.dry_run || self.duplicates_ready {
            return;
        }
        match fs::create_dir_all(&self.duplicates_dir) {
            Ok(()) => self.duplicates_ready = true,
            Err(source) => {
                let err = RenameError::DirectoryCreation {
                    path: self.duplicates_dir.clone(),
                    source,
                };
                warn!(error = %err, "重複フォルダの作成に失敗しました");
            }
        }
    }
}
