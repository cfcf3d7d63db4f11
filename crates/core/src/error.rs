use crate::timestamp::TimestampSource;
use chrono::NaiveDateTime;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("撮影日時を取得できませんでした ({strategy:?}): {}: {reason}", .path.display())]
    TimestampUnavailable {
        path: PathBuf,
        strategy: TimestampSource,
        reason: String,
    },
    #[error("時刻シフトの結果が扱える範囲を超えました: {0}")]
    ShiftOutOfRange(NaiveDateTime),
    #[error(
        "リネーム先が既に存在し、重複フォルダにも移動できませんでした: {} -> {}",
        .from.display(),
        .to.display()
    )]
    CollisionConflict { from: PathBuf, to: PathBuf },
    #[error("重複フォルダを作成できませんでした: {}: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{action}に失敗しました: {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RenameError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn timestamp_unavailable(
        path: impl Into<PathBuf>,
        strategy: TimestampSource,
        reason: impl Into<String>,
    ) -> Self {
        Self::TimestampUnavailable {
            path: path.into(),
            strategy,
            reason: reason.into(),
        }
    }
}
