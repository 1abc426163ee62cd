use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use serde::{Deserialize, Serialize};

use crate::config::AnomalyConfig;
use crate::simulator::AnomalyInstance;

/// Append-only jsonl record of pattern activations and expiries, one file
/// per day with size-based rotation. Gives operators a replayable trace of
/// what the injector did without touching the main store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyJournalEntry {
    pub timestamp: String,
    pub equipment_id: u32,
    pub event: AnomalyJournalEvent,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ticks: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyJournalEvent {
    Activated,
    Expired,
}

pub fn record_activation(
    config: &AnomalyConfig,
    equipment_id: u32,
    instance: &AnomalyInstance,
    now: DateTime<Utc>,
) {
    let entry = AnomalyJournalEntry {
        timestamp: now.to_rfc3339(),
        equipment_id,
        event: AnomalyJournalEvent::Activated,
        pattern: instance.pattern.clone(),
        magnitude: Some(instance.magnitude),
        duration_ticks: Some(instance.duration_ticks),
    };
    append_entry(config, &entry, now);
}

pub fn record_expiry(config: &AnomalyConfig, equipment_id: u32, pattern: &str, now: DateTime<Utc>) {
    let entry = AnomalyJournalEntry {
        timestamp: now.to_rfc3339(),
        equipment_id,
        event: AnomalyJournalEvent::Expired,
        pattern: pattern.to_string(),
        magnitude: None,
        duration_ticks: None,
    };
    append_entry(config, &entry, now);
}

fn append_entry(config: &AnomalyConfig, entry: &AnomalyJournalEntry, now: DateTime<Utc>) {
    if !config.journal_enabled {
        return;
    }

    let events_dir = events_dir(config);
    if let Err(error) = fs::create_dir_all(&events_dir) {
        log::warn!("anomaly journal: failed to create directory: {}", error);
        return;
    }

    let file_name = format!(
        "events-{:04}-{:02}-{:02}.jsonl",
        now.year(),
        now.month(),
        now.day()
    );
    let path = events_dir.join(file_name);
    if let Err(error) = append_with_rotation(
        &path,
        entry,
        config.journal_max_file_size_bytes,
        config.journal_retention_days,
    ) {
        log::warn!("anomaly journal: failed to write event line: {}", error);
    }
}

/// Newest events first, across the daily files.
pub fn recent_events(config: &AnomalyConfig, limit: usize) -> Vec<AnomalyJournalEntry> {
    if !config.journal_enabled || limit == 0 {
        return Vec::new();
    }

    let files = newest_event_files(&events_dir(config));
    let mut out = Vec::with_capacity(limit);
    for file_path in files {
        let remaining = limit.saturating_sub(out.len());
        if remaining == 0 {
            break;
        }

        let lines = match read_tail_lines(&file_path, remaining) {
            Ok(lines) => lines,
            Err(_) => continue,
        };

        for line in lines.into_iter().rev() {
            let Ok(entry) = serde_json::from_str::<AnomalyJournalEntry>(&line) else {
                continue;
            };
            out.push(entry);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}

pub fn run_maintenance(config: &AnomalyConfig) {
    if !config.journal_enabled {
        return;
    }

    let events_dir = events_dir(config);
    if let Err(error) = fs::create_dir_all(&events_dir) {
        log::warn!("anomaly journal maintenance: failed to ensure dir: {}", error);
        return;
    }

    prune_by_date_prefix(&events_dir, "events-", config.journal_retention_days);
}

fn events_dir(config: &AnomalyConfig) -> PathBuf {
    PathBuf::from(&config.journal_dir).join("events")
}

fn append_with_rotation(
    path: &Path,
    entry: &AnomalyJournalEntry,
    max_file_size_bytes: u64,
    retention_days: u16,
) -> Result<(), std::io::Error> {
    let max_bytes = usize::try_from(max_file_size_bytes).unwrap_or(usize::MAX);
    let mut writer = FileRotate::new(
        path,
        AppendCount::new(retention_days as usize),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );

    serde_json::to_writer(&mut writer, entry).map_err(std::io::Error::other)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn prune_by_date_prefix(dir: &Path, prefix: &str, retention_days: u16) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let today = Utc::now().date_naive();
    let keep_for = ChronoDuration::days(retention_days as i64);

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if !file_name.starts_with(prefix) || !file_name.contains(".jsonl") {
            continue;
        }

        let date_part = file_name.strip_prefix(prefix).and_then(|tail| tail.get(0..10));
        let Some(date_part) = date_part else {
            continue;
        };

        let Ok(file_date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        if today.signed_duration_since(file_date) > keep_for {
            if let Err(error) = fs::remove_file(&path) {
                log::warn!(
                    "anomaly journal: failed to remove old file {}: {}",
                    path.display(),
                    error
                );
            }
        }
    }
}

fn newest_event_files(events_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(events_dir) else {
        return Vec::new();
    };

    let mut files = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("events-") && name.contains(".jsonl"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    files.sort_by(|left, right| {
        let left_modified = left.metadata().and_then(|meta| meta.modified()).ok();
        let right_modified = right.metadata().and_then(|meta| meta.modified()).ok();
        right_modified.cmp(&left_modified)
    });

    files
}

fn read_tail_lines(path: &Path, max_lines: usize) -> Result<Vec<String>, std::io::Error> {
    let mut file = File::open(path)?;
    let file_len = file.seek(SeekFrom::End(0))?;
    if file_len == 0 || max_lines == 0 {
        return Ok(Vec::new());
    }

    const CHUNK_SIZE: usize = 4096;
    let mut pos = file_len;
    let mut bytes = Vec::new();
    let mut newline_count = 0usize;

    while pos > 0 && newline_count <= max_lines {
        let read_size = CHUNK_SIZE.min(pos as usize);
        pos -= read_size as u64;

        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; read_size];
        file.read_exact(&mut chunk)?;

        newline_count += chunk.iter().filter(|&&byte| byte == b'\n').count();

        chunk.extend_from_slice(&bytes);
        bytes = chunk;
    }

    let mut lines = String::from_utf8_lossy(&bytes)
        .lines()
        .map(|line| line.to_string())
        .collect::<Vec<_>>();

    if lines.len() > max_lines {
        lines.drain(0..(lines.len() - max_lines));
    }

    Ok(lines)
}
