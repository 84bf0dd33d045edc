//! Retention/hygiene job (C11, §4.5.3): archives stale daily memory files and
//! session dumps, purges old archives, and prunes expired conversation rows.
//! Runs at most every 12 hours, gated by a small JSON state file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::manager::SqliteMemoryStore;

const MIN_INTERVAL_HOURS: i64 = 12;
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Serialize, Deserialize, Default)]
struct HygieneState {
    last_run_at: Option<DateTime<Utc>>,
}

pub struct HygieneReport {
    pub daily_files_archived: usize,
    pub session_dumps_archived: usize,
    pub archives_purged: usize,
    pub conversation_rows_deleted: usize,
}

/// Runs the hygiene pass if the 12-hour gate allows it. Returns `None` when
/// skipped because the state file says it last ran too recently.
pub async fn run_if_due(
    workspace: &Path,
    config_dir: &Path,
    store: &SqliteMemoryStore,
    archive_after_days: i64,
    purge_after_days: i64,
    conversation_retention_days: i64,
) -> Result<Option<HygieneReport>, MemoryError> {
    let state_path = config_dir.join("state").join("memory_hygiene_state.json");
    let mut state = read_state(&state_path)?;
    let now = Utc::now();

    if let Some(last_run) = state.last_run_at {
        if now.signed_duration_since(last_run) < Duration::hours(MIN_INTERVAL_HOURS) {
            return Ok(None);
        }
    }

    let daily_files_archived =
        archive_dated_files(&workspace.join("memory"), &workspace.join("memory").join("archive"), archive_after_days, now)?;
    let session_dumps_archived =
        archive_dated_files(&workspace.join("sessions"), &workspace.join("sessions").join("archive"), archive_after_days, now)?;
    let archives_purged = purge_old_archives(&workspace.join("memory").join("archive"), purge_after_days, now)?
        + purge_old_archives(&workspace.join("sessions").join("archive"), purge_after_days, now)?;
    let conversation_rows_deleted = delete_old_conversations(store, conversation_retention_days, now).await?;

    state.last_run_at = Some(now);
    write_state(&state_path, &state)?;

    Ok(Some(HygieneReport {
        daily_files_archived,
        session_dumps_archived,
        archives_purged,
        conversation_rows_deleted,
    }))
}

fn read_state(path: &Path) -> Result<HygieneState, MemoryError> {
    if !path.exists() {
        return Ok(HygieneState::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text).unwrap_or_default())
}

fn write_state(path: &Path, state: &HygieneState) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(state).map_err(|e| MemoryError::Serialization(e.to_string()))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Moves `YYYY-MM-DD.*` files older than `threshold_days` from `source` into
/// `archive_dir`, suffixing `_1`, `_2`, … on a name collision.
fn archive_dated_files(
    source: &Path,
    archive_dir: &Path,
    threshold_days: i64,
    now: DateTime<Utc>,
) -> Result<usize, MemoryError> {
    if !source.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(archive_dir)?;
    let mut archived = 0usize;

    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(date) = file_date(&path) else { continue };
        let age_days = (now.date_naive() - date).num_days();
        if age_days <= threshold_days {
            continue;
        }
        let dest = unique_destination(archive_dir, &path)?;
        std::fs::rename(&path, &dest)?;
        archived += 1;
    }
    Ok(archived)
}

fn purge_old_archives(archive_dir: &Path, threshold_days: i64, now: DateTime<Utc>) -> Result<usize, MemoryError> {
    if !archive_dir.is_dir() {
        return Ok(0);
    }
    let mut purged = 0usize;
    for entry in std::fs::read_dir(archive_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        let age_days = now.signed_duration_since(modified).num_days();
        if age_days > threshold_days {
            std::fs::remove_file(&path)?;
            purged += 1;
        }
    }
    Ok(purged)
}

async fn delete_old_conversations(
    store: &SqliteMemoryStore,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize, MemoryError> {
    let cutoff = (now - Duration::days(retention_days)).to_rfc3339();
    store.delete_conversations_before(&cutoff)
}

fn file_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

fn unique_destination(archive_dir: &Path, source: &Path) -> Result<PathBuf, MemoryError> {
    let file_name = source.file_name().expect("source has a file name");
    let dest = archive_dir.join(file_name);
    if !dest.exists() {
        return Ok(dest);
    }
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let ext = source.extension().and_then(|s| s.to_str());
    for n in 1..=MAX_RENAME_ATTEMPTS {
        let candidate_name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = archive_dir.join(candidate_name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(MemoryError::Serialization(format!(
        "could not find a unique archive name for {} after {MAX_RENAME_ATTEMPTS} attempts",
        source.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_destination_suffixes_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&archive).unwrap();
        std::fs::write(archive.join("2024-01-01.md"), "x").unwrap();
        let source = dir.path().join("2024-01-01.md");
        std::fs::write(&source, "y").unwrap();
        let dest = unique_destination(&archive, &source).unwrap();
        assert_eq!(dest.file_name().unwrap().to_str().unwrap(), "2024-01-01_1.md");
    }

    #[test]
    fn file_date_parses_dated_stem() {
        assert_eq!(file_date(Path::new("/tmp/memory/2024-03-05.md")), NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn file_date_rejects_non_dated_stem() {
        assert_eq!(file_date(Path::new("/tmp/memory/brain.db")), None);
    }
}
