//! Append-only, sequenced log of device events.
//!
//! Every appended event gets the next sequence number, starting at 1. Numbers
//! are never reused, even after the event has settled. With the `persist`
//! feature the log can be backed by a journal file (one JSON event per line)
//! so that consumers can resume from a sequence cursor after a restart.
//!
//! # Example
//!
//! ```
//! use devqueue::journal::EventLog;
//! use devqueue::EventKind;
//!
//! let log = EventLog::new(16);
//! let first = log.append(EventKind::Add, "/devices/virtual/net/lo").unwrap();
//! let second = log.append(EventKind::Change, "/devices/virtual/net/lo").unwrap();
//! assert_eq!((first.sequence, second.sequence), (1, 2));
//! assert_eq!(log.since(1).len(), 1);
//! ```

use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(feature = "persist")]
use std::fs::{File, OpenOptions};
#[cfg(feature = "persist")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "persist")]
use std::path::{Path, PathBuf};

/// Default maximum number of events held by a log.
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Append-only event log.
pub struct EventLog {
    inner: Mutex<LogInner>,
    capacity: usize,
}

struct LogInner {
    /// Sorted by sequence.
    events: Vec<Event>,
    last_sequence: u64,
    #[cfg(feature = "persist")]
    journal: Option<Journal>,
}

#[cfg(feature = "persist")]
struct Journal {
    path: PathBuf,
    file: File,
}

impl EventLog {
    /// Create an in-memory log that holds at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LogInner {
                events: Vec::new(),
                last_sequence: 0,
                #[cfg(feature = "persist")]
                journal: None,
            }),
            capacity,
        }
    }

    /// Open a log backed by a journal file, reloading any events already in it.
    ///
    /// Numbering resumes after the highest sequence found. Lines that fail to
    /// parse, or that would break sequence ordering, are skipped with a warning.
    /// A final line without a newline is terminated if it holds an event and
    /// cut off otherwise, so new entries always start on a fresh line.
    #[cfg(feature = "persist")]
    pub fn open_journal(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut events: Vec<Event> = Vec::new();
        let mut last_sequence = 0;
        // Bytes up to the end of the last newline-terminated line.
        let mut complete_len: u64 = 0;
        let mut torn = false;
        let mut torn_kept = false;

        if path.exists() {
            let file = File::open(&path).map_err(|e| {
                Error::Journal(format!("failed to open {}: {}", path.display(), e))
            })?;
            let mut reader = BufReader::new(file);
            let mut buf = Vec::new();
            let mut lineno = 0;
            loop {
                buf.clear();
                let read = reader.read_until(b'\n', &mut buf).map_err(|e| {
                    Error::Journal(format!("failed to read {}: {}", path.display(), e))
                })?;
                if read == 0 {
                    break;
                }
                lineno += 1;
                if buf.last() == Some(&b'\n') {
                    complete_len += read as u64;
                } else {
                    torn = true;
                }
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        log::warn!("{}:{}: unreadable entry: {}", path.display(), lineno, e);
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) if event.sequence > last_sequence => {
                        last_sequence = event.sequence;
                        events.push(event);
                        torn_kept = torn;
                    }
                    Ok(event) => {
                        log::warn!(
                            "{}:{}: sequence {} out of order, skipping",
                            path.display(),
                            lineno,
                            event.sequence
                        );
                    }
                    Err(e) => {
                        log::warn!("{}:{}: unreadable entry: {}", path.display(), lineno, e);
                    }
                }
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Journal(format!("failed to open {}: {}", path.display(), e)))?;

        if torn_kept {
            file.write_all(b"\n").map_err(|e| {
                Error::Journal(format!("failed to write {}: {}", path.display(), e))
            })?;
        } else if torn {
            log::warn!(
                "{}: dropping torn entry after byte {}",
                path.display(),
                complete_len
            );
            file.set_len(complete_len).map_err(|e| {
                Error::Journal(format!("failed to truncate {}: {}", path.display(), e))
            })?;
        }

        log::debug!(
            "journal {} resumed at sequence {} ({} events)",
            path.display(),
            last_sequence,
            events.len()
        );

        Ok(Self {
            inner: Mutex::new(LogInner {
                events,
                last_sequence,
                journal: Some(Journal { path, file }),
            }),
            capacity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and return it with its assigned sequence number.
    ///
    /// Fails with [`Error::StorageExhausted`] when the log is full or the
    /// journal cannot be written; the sequence number is not consumed then.
    pub fn append(&self, kind: EventKind, subject_id: impl Into<String>) -> Result<Event> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::ThreadError("event log mutex poisoned".into()))?;

        if inner.events.len() >= self.capacity {
            return Err(Error::StorageExhausted(format!(
                "event log holds {} events (capacity {})",
                inner.events.len(),
                self.capacity
            )));
        }

        let event = Event::new(inner.last_sequence + 1, kind, subject_id);

        #[cfg(feature = "persist")]
        {
            if let Some(journal) = inner.journal.as_mut() {
                journal.write(&event)?;
            }
        }

        inner.last_sequence = event.sequence;
        inner.events.push(event.clone());
        Ok(event)
    }

    /// Get the event with the given sequence number.
    pub fn get(&self, sequence: u64) -> Option<Event> {
        let inner = self.lock();
        inner
            .events
            .binary_search_by_key(&sequence, |e| e.sequence)
            .ok()
            .map(|idx| inner.events[idx].clone())
    }

    /// Like [`get`](Self::get), but reports a missing event as an error.
    pub fn lookup(&self, sequence: u64) -> Result<Event> {
        self.get(sequence).ok_or(Error::UnknownSequence(sequence))
    }

    /// All events with a sequence number greater than `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<Event> {
        let inner = self.lock();
        let start = inner.events.partition_point(|e| e.sequence <= sequence);
        inner.events[start..].to_vec()
    }

    /// The highest sequence number issued so far, or 0 if none.
    pub fn last_sequence(&self) -> u64 {
        self.lock().last_sequence
    }

    /// Number of events held.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Check if the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of events the log will hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(feature = "persist")]
impl Journal {
    /// Write one complete line, or nothing.
    ///
    /// A failed write is cut back to the length the file had before it, so a
    /// rejected event never reappears on resume.
    fn write(&mut self, event: &Event) -> Result<()> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| Error::Journal(format!("failed to serialize event: {}", e)))?;
        line.push(b'\n');

        let exhausted = |e: std::io::Error| {
            Error::StorageExhausted(format!(
                "failed to write journal {}: {}",
                self.path.display(),
                e
            ))
        };

        let len = self.file.metadata().map_err(exhausted)?.len();
        if let Err(e) = self.file.write_all(&line) {
            if let Err(truncate) = self.file.set_len(len) {
                log::error!(
                    "failed to roll back journal {} to {} bytes: {}",
                    self.path.display(),
                    len,
                    truncate
                );
            }
            return Err(exhausted(e));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_increase_by_one_from_one() {
        let log = EventLog::new(64);
        let sequences: Vec<u64> = (0..10)
            .map(|i| log.append(EventKind::Add, format!("dev{}", i)).unwrap().sequence)
            .collect();
        assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
        assert_eq!(log.last_sequence(), 10);
    }

    #[test]
    fn test_get_and_lookup() {
        let log = EventLog::new(8);
        log.append(EventKind::Add, "sda").unwrap();
        log.append(EventKind::Remove, "sda").unwrap();

        let event = log.get(2).unwrap();
        assert_eq!(event.kind, EventKind::Remove);
        assert!(log.get(0).is_none());
        assert!(log.get(3).is_none());
        assert!(matches!(log.lookup(7), Err(Error::UnknownSequence(7))));
    }

    #[test]
    fn test_capacity_exhaustion_is_reported() {
        let log = EventLog::new(2);
        log.append(EventKind::Add, "a").unwrap();
        log.append(EventKind::Add, "b").unwrap();

        let err = log.append(EventKind::Add, "c").unwrap_err();
        assert!(matches!(err, Error::StorageExhausted(_)));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_sequence(), 2);
    }

    #[test]
    fn test_since_cursor() {
        let log = EventLog::new(8);
        for name in ["a", "b", "c", "d"] {
            log.append(EventKind::Change, name).unwrap();
        }
        let tail: Vec<u64> = log.since(2).iter().map(|e| e.sequence).collect();
        assert_eq!(tail, vec![3, 4]);
        assert!(log.since(4).is_empty());
        assert_eq!(log.since(0).len(), 4);
    }

    #[cfg(feature = "persist")]
    #[test]
    fn test_journal_resume() {
        let path = std::env::temp_dir().join(format!(
            "devqueue_test_journal_{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            log.append(EventKind::Add, "usb1").unwrap();
            log.append(EventKind::Change, "usb1").unwrap();
        }

        let log = EventLog::open_journal(&path, 16).unwrap();
        assert_eq!(log.last_sequence(), 2);
        assert_eq!(log.get(1).unwrap().subject_id, "usb1");
        assert_eq!(log.append(EventKind::Remove, "usb1").unwrap().sequence, 3);

        std::fs::remove_file(&path).unwrap();
    }

    #[cfg(feature = "persist")]
    fn journal_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "devqueue_test_{}_{}.jsonl",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[cfg(feature = "persist")]
    #[test]
    fn test_failed_journal_write_is_not_stored() {
        let path = journal_path("failed_write");

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            // A read-only handle makes every write fail.
            let writable = {
                let mut inner = log.lock();
                let journal = inner.journal.as_mut().unwrap();
                std::mem::replace(&mut journal.file, File::open(&path).unwrap())
            };

            let err = log.append(EventKind::Add, "rejected").unwrap_err();
            assert!(matches!(err, Error::StorageExhausted(_)));
            assert_eq!(log.last_sequence(), 0);
            assert!(log.is_empty());

            log.lock().journal.as_mut().unwrap().file = writable;
            assert_eq!(log.append(EventKind::Add, "accepted").unwrap().sequence, 1);
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(!contents.contains("rejected"));

        let log = EventLog::open_journal(&path, 16).unwrap();
        assert_eq!(log.last_sequence(), 1);
        assert_eq!(log.get(1).unwrap().subject_id, "accepted");

        std::fs::remove_file(&path).unwrap();
    }

    #[cfg(feature = "persist")]
    #[test]
    fn test_torn_utf8_tail_is_skipped() {
        let path = journal_path("torn_tail");

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            log.append(EventKind::Add, "input0").unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"sequence\":2,\"subject_id\":\"caf\xc3").unwrap();
        }

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            assert_eq!(log.last_sequence(), 1);
            assert_eq!(log.append(EventKind::Change, "input0").unwrap().sequence, 2);
        }

        let log = EventLog::open_journal(&path, 16).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(2).unwrap().kind, EventKind::Change);

        std::fs::remove_file(&path).unwrap();
    }

    #[cfg(feature = "persist")]
    #[test]
    fn test_unterminated_last_event_is_kept() {
        let path = journal_path("unterminated");

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            log.append(EventKind::Add, "loop0").unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.trim_end()).unwrap();

        {
            let log = EventLog::open_journal(&path, 16).unwrap();
            assert_eq!(log.last_sequence(), 1);
            log.append(EventKind::Remove, "loop0").unwrap();
        }

        let log = EventLog::open_journal(&path, 16).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().subject_id, "loop0");
        assert_eq!(log.get(2).unwrap().kind, EventKind::Remove);

        std::fs::remove_file(&path).unwrap();
    }
}
