//! Append-only, rotating, newline-delimited JSON log store.
//!
//! One mutex guards segment selection and all file access, so appends are
//! totally ordered and never interleave, and a query sees every append that
//! completed before it acquired the lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use super::segment::{
    daily_segment_path, is_segment_name, next_local_midnight, overflow_segment_path, parse_lines,
};
use crate::domain::observation::Observation;
use crate::error::UplogError;
use crate::services::scheduler::ObservationSink;

/// Entries returned by [`LogStore::recent`] when the caller passes a non-positive limit.
pub const DEFAULT_RECENT_LIMIT: usize = 100;
/// Size past which the current segment is rotated.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub max_segment_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct SegmentState {
    current: Option<PathBuf>,
    rotation_deadline: DateTime<Local>,
}

pub struct LogStore {
    dir: PathBuf,
    max_segment_bytes: u64,
    state: Mutex<SegmentState>,
}

impl LogStore {
    /// Create the data directory if needed and select the initial segment.
    pub fn open(config: StoreConfig) -> Result<Self, UplogError> {
        fs::create_dir_all(&config.data_dir).map_err(|e| {
            UplogError::at_path("failed to create data directory", &config.data_dir, e)
        })?;
        Ok(Self::with_config(config))
    }

    /// Open for queries only; nothing is created on disk.
    ///
    /// A missing data directory reads as an empty store.
    pub fn open_read_only(config: StoreConfig) -> Self {
        Self::with_config(config)
    }

    fn with_config(config: StoreConfig) -> Self {
        let store = LogStore {
            dir: config.data_dir,
            max_segment_bytes: config.max_segment_bytes,
            state: Mutex::new(SegmentState {
                current: None,
                rotation_deadline: Local::now(),
            }),
        };
        {
            let mut state = store.state.lock();
            store.rotate_if_needed(&mut state, Local::now());
        }
        store
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// Segment currently receiving appends. It may not exist on disk yet.
    pub fn current_segment(&self) -> Option<PathBuf> {
        self.state.lock().current.clone()
    }

    /// Append one observation as a single line of the current segment.
    #[instrument(skip(self, observation), fields(ts = %observation.timestamp))]
    pub fn append(&self, observation: &Observation) -> Result<(), UplogError> {
        let mut line = serde_json::to_vec(observation)?;
        line.push(b'\n');

        let mut state = self.state.lock();
        self.rotate_if_needed(&mut state, Local::now());
        let Some(path) = state.current.as_ref() else {
            return Err(UplogError::Other("no current segment selected".into()));
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| UplogError::at_path("failed to open log file", path, e))?;
        if ends_mid_line(&mut file)
            .map_err(|e| UplogError::at_path("failed to inspect log file", path, e))?
        {
            // seal a torn tail so this record starts on its own line
            line.insert(0, b'\n');
        }
        file.write_all(&line)
            .map_err(|e| UplogError::at_path("failed to write to log file", path, e))?;
        Ok(())
    }

    /// Up to `limit` newest valid entries of the current segment, oldest first.
    ///
    /// A `limit` of zero or less means [`DEFAULT_RECENT_LIMIT`]. Historical
    /// segments are never consulted.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: i64) -> Result<Vec<Observation>, UplogError> {
        let limit = usize::try_from(limit)
            .ok()
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_RECENT_LIMIT);

        let state = self.state.lock();
        let Some(path) = state.current.as_ref() else {
            return Ok(Vec::new());
        };
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(UplogError::at_path(
                    "failed to read current log file",
                    path,
                    e,
                ));
            }
        };
        drop(state);

        let mut entries: Vec<Observation> = parse_lines(&content).collect();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries.split_off(skip))
    }

    /// Every stored observation with `start <= timestamp <= end`, across all
    /// segments, sorted by timestamp.
    ///
    /// Full scan of the data directory; the lock is held for its duration.
    #[instrument(skip(self))]
    pub fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>, UplogError> {
        let _state = self.state.lock();
        let mut out = Vec::new();
        for path in self.list_segments()? {
            let content = match fs::read(&path) {
                Ok(content) => content,
                Err(e) => return Err(UplogError::at_path("failed to read log file", &path, e)),
            };
            out.extend(
                parse_lines(&content).filter(|o| o.timestamp >= start && o.timestamp <= end),
            );
        }
        out.sort_by_key(|o| o.timestamp);
        debug!(count = out.len(), "range scan complete");
        Ok(out)
    }

    /// All segment files in the data directory, sorted by name.
    pub fn segments(&self) -> Result<Vec<PathBuf>, UplogError> {
        let _state = self.state.lock();
        self.list_segments()
    }

    fn list_segments(&self) -> Result<Vec<PathBuf>, UplogError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(UplogError::at_path("failed to list log files in", &self.dir, e)),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| entry.file_name().to_str().is_some_and(is_segment_name))
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Switch the current segment when the day rolled over or it grew too large.
    ///
    /// Only the date rotation moves the midnight deadline; overflow siblings
    /// share the deadline of the daily segment they split from.
    fn rotate_if_needed(&self, state: &mut SegmentState, now: DateTime<Local>) {
        if state.current.is_none() || now > state.rotation_deadline {
            let path = daily_segment_path(&self.dir, now);
            state.rotation_deadline = next_local_midnight(now);
            info!(segment = %path.display(), deadline = %state.rotation_deadline, "rotated to daily segment");
            state.current = Some(path);
            return;
        }

        let Some(current) = state.current.as_ref() else {
            return;
        };
        match fs::metadata(current) {
            Ok(meta) if meta.len() > self.max_segment_bytes => {
                let path = overflow_segment_path(&self.dir, now);
                info!(segment = %path.display(), size = meta.len(), "rotated to overflow segment");
                state.current = Some(path);
            }
            _ => {}
        }
    }
}

/// Whether a non-empty file lacks its trailing newline.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl ObservationSink for LogStore {
    fn record(&self, observation: &Observation) -> Result<(), UplogError> {
        self.append(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn obs(secs: i64, latency: i64) -> Observation {
        let ts = DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap();
        Observation::reachable(ts, "8.8.8.8", latency)
    }

    fn store_with(max: u64) -> (TempDir, LogStore) {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(StoreConfig {
            data_dir: dir.path().join("data"),
            max_segment_bytes: max,
        })
        .unwrap();
        (dir, store)
    }

    #[test]
    fn open_selects_today_without_creating_file() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let current = store.current_segment().unwrap();
        let expected = daily_segment_path(store.data_dir(), Local::now());
        assert_eq!(current, expected);
        assert!(!current.exists());
        assert!(store.recent(10).unwrap().is_empty());
    }

    #[test]
    fn append_then_recent_one() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        store.append(&obs(0, 10)).unwrap();
        store.append(&obs(5, 11)).unwrap();
        assert_eq!(store.recent(1).unwrap(), vec![obs(5, 11)]);
    }

    #[test]
    fn recent_returns_newest_window_in_file_order() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        for i in 0..5 {
            store.append(&obs(i, i)).unwrap();
        }
        let got = store.recent(3).unwrap();
        assert_eq!(got, vec![obs(2, 2), obs(3, 3), obs(4, 4)]);
        assert_eq!(store.recent(50).unwrap().len(), 5);
    }

    #[test]
    fn non_positive_limit_uses_default() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        for i in 0..120 {
            store.append(&obs(i, 1)).unwrap();
        }
        let default = store.recent(100).unwrap();
        assert_eq!(default.len(), DEFAULT_RECENT_LIMIT);
        assert_eq!(store.recent(0).unwrap(), default);
        assert_eq!(store.recent(-5).unwrap(), default);
    }

    #[test]
    fn recent_skips_corrupt_lines() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        store.append(&obs(0, 7)).unwrap();
        let path = store.current_segment().unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"timestamp\":\"2023-11-14T22:1").unwrap();
        drop(f);
        assert_eq!(store.recent(10).unwrap(), vec![obs(0, 7)]);
    }

    #[test]
    fn expired_deadline_rotates_to_today() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let stale = store.data_dir().join("connection-2000-01-01.log");
        {
            let mut state = store.state.lock();
            state.current = Some(stale.clone());
            state.rotation_deadline = Local::now() - Duration::hours(1);
        }
        store.append(&obs(0, 1)).unwrap();

        let now = Local::now();
        let state = store.state.lock();
        assert_eq!(
            state.current.as_deref(),
            Some(daily_segment_path(store.data_dir(), now).as_path())
        );
        assert_eq!(state.rotation_deadline, next_local_midnight(now));
        assert!(!stale.exists());
    }

    #[test]
    fn oversized_segment_rotates_without_moving_deadline() {
        let (_dir, store) = store_with(64);
        store.append(&obs(0, 1)).unwrap();
        let first = store.current_segment().unwrap();
        let deadline = store.state.lock().rotation_deadline;

        // first line alone is larger than 64 bytes
        store.append(&obs(1, 2)).unwrap();
        let second = store.current_segment().unwrap();
        assert_ne!(first, second);
        assert!(
            second
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_segment_name)
        );
        assert_eq!(store.state.lock().rotation_deadline, deadline);

        let all = store.range(obs(0, 0).timestamp, obs(1, 0).timestamp).unwrap();
        assert_eq!(all, vec![obs(0, 1), obs(1, 2)]);
        assert_eq!(store.segments().unwrap().len(), 2);
        // recent only sees the current segment
        assert_eq!(store.recent(10).unwrap(), vec![obs(1, 2)]);
    }

    #[test]
    fn range_bounds_are_inclusive_and_sorted_across_segments() {
        let (dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let old = dir.path().join("data").join("connection-2023-11-13.log");
        let lines = [obs(30, 3), obs(-10, 0)]
            .iter()
            .map(|o| serde_json::to_string(o).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&old, format!("{lines}\ngarbage\n")).unwrap();
        fs::write(dir.path().join("data").join("notes.txt"), "ignored").unwrap();

        for i in [0, 10, 20] {
            store.append(&obs(i, i)).unwrap();
        }
        let got = store.range(obs(0, 0).timestamp, obs(30, 0).timestamp).unwrap();
        assert_eq!(got, vec![obs(0, 0), obs(10, 10), obs(20, 20), obs(30, 3)]);

        let again = store.range(obs(0, 0).timestamp, obs(30, 0).timestamp).unwrap();
        assert_eq!(got, again);

        let single = store.range(obs(10, 0).timestamp, obs(10, 0).timestamp).unwrap();
        assert_eq!(single, vec![obs(10, 10)]);
    }

    #[test]
    fn range_on_empty_store_is_empty() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let now = Utc::now();
        assert!(store.range(now - Duration::hours(24), now).unwrap().is_empty());
    }

    #[test]
    fn open_fails_when_directory_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let err = LogStore::open(StoreConfig::new(blocker.join("data")))
            .err()
            .expect("open must fail");
        assert!(matches!(err, UplogError::Storage { .. }));
    }

    #[test]
    fn append_failure_is_reported_and_store_recovers() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let current = store.current_segment().unwrap();
        fs::create_dir_all(&current).unwrap();

        let err = store.append(&obs(0, 1)).unwrap_err();
        assert!(matches!(err, UplogError::Storage { ref context, .. } if context.contains("failed to open log file")));
        let err = store.record(&obs(1, 1)).unwrap_err();
        assert!(matches!(err, UplogError::Storage { .. }));
        assert_eq!(store.current_segment(), Some(current.clone()));

        fs::remove_dir(&current).unwrap();
        store.append(&obs(2, 5)).unwrap();
        assert_eq!(store.recent(10).unwrap(), vec![obs(2, 5)]);
    }

    #[test]
    fn append_after_torn_tail_starts_new_line() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        store.append(&obs(0, 1)).unwrap();
        let path = store.current_segment().unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"timestamp\":\"2023-11-14T22:13:21Z\",\"target\":\"h\xC3").unwrap();
        drop(f);

        store.append(&obs(2, 3)).unwrap();
        assert_eq!(store.recent(10).unwrap(), vec![obs(0, 1), obs(2, 3)]);
        let all = store.range(obs(0, 0).timestamp, obs(2, 0).timestamp).unwrap();
        assert_eq!(all, vec![obs(0, 1), obs(2, 3)]);
    }

    #[test]
    fn read_only_open_leaves_disk_untouched() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("missing");
        let store = LogStore::open_read_only(StoreConfig::new(&data));
        assert!(store.recent(5).unwrap().is_empty());
        let now = Utc::now();
        assert!(store.range(now - Duration::hours(1), now).unwrap().is_empty());
        assert!(!data.exists());

        let writer = LogStore::open(StoreConfig::new(&data)).unwrap();
        writer.append(&obs(0, 9)).unwrap();
        let reader = LogStore::open_read_only(StoreConfig::new(&data));
        assert_eq!(reader.recent(5).unwrap(), vec![obs(0, 9)]);
    }

    #[test]
    fn concurrent_appends_never_interleave() {
        let (_dir, store) = store_with(DEFAULT_MAX_SEGMENT_BYTES);
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append(&obs(t * 1000 + i, i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let content = fs::read(store.current_segment().unwrap()).unwrap();
        assert_eq!(content.iter().filter(|&&b| b == b'\n').count(), 400);
        assert_eq!(parse_lines(&content).count(), 400);
    }
}
