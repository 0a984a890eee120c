// packages/observer/src/logging/file_writer.rs
//! File writer and stitching
//!
//! Owns every file handle and the chunk rotation state machine. All methods
//! run on the serialized file task executor; nothing here is touched from
//! producer threads.
//!
//! Two modes, fixed for the writer's lifetime:
//!
//! - **Unbounded**: events stream directly into the final log file.
//! - **Bounded**: events stream into a ring of chunk files inside a
//!   `<final>.inprogress/` directory; on stop the chunks are stitched into
//!   the final file together with the constants prologue and the polled
//!   data epilogue.

use crate::logging::write_queue::WriteQueue;
use crate::logging::NO_LIMIT;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Read buffer used while stitching (at most this many bytes in memory)
const READ_BUFFER_SIZE: usize = 1 << 16; // 64 KiB

/// Left in the final file while chunks are being written. Visible on disk
/// only if logging does not end gracefully.
const INPROGRESS_PLACEHOLDER: &str =
    "Log data is being written to the .inprogress directory";

/// Opens `path` for writing (truncating). Returns `None` on failure; the
/// caller treats a missing handle as a silent no-op sink.
fn open_file_for_write(path: &Path) -> Option<File> {
    match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
    {
        Ok(file) => Some(file),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed opening file");
            None
        }
    }
}

/// Appends each part to `file`. The handle may be `None`, in which case
/// nothing is written. Returns the number of bytes successfully written.
fn write_to_file(file: &mut Option<File>, parts: &[&[u8]]) -> u64 {
    let mut bytes_written = 0u64;

    if let Some(file) = file {
        for part in parts {
            if part.is_empty() {
                continue;
            }
            match file.write_all(part) {
                Ok(()) => bytes_written += part.len() as u64,
                Err(e) => warn!(error = %e, "failed writing to log file"),
            }
        }
    }

    bytes_written
}

/// Copies all of `source_path` into `destination`, then deletes the source.
/// A missing source is a no-op.
fn append_file_then_delete(
    source_path: &Path,
    destination: &mut Option<File>,
    read_buffer: &mut [u8],
) {
    let mut source = match File::open(source_path) {
        Ok(file) => file,
        Err(_) => return,
    };

    loop {
        match source.read(read_buffer) {
            Ok(0) => break,
            Ok(n) => {
                write_to_file(destination, &[&read_buffer[..n]]);
            }
            Err(e) => {
                warn!(path = %source_path.display(), error = %e, "failed reading source file");
                break;
            }
        }
    }

    drop(source);
    if let Err(e) = fs::remove_file(source_path) {
        warn!(path = %source_path.display(), error = %e, "failed deleting source file");
    }
}

/// To be valid JSON the events array must not end with a comma. Event lines
/// are terminated with ",\n", so seek back two bytes before closing the
/// array. Requires the event encoder to emit no trailing whitespace.
fn rewind_if_wrote_event_bytes(file: &mut Option<File>, wrote_event_bytes: bool) {
    if let Some(file) = file {
        if wrote_event_bytes {
            if let Err(e) = file.seek(SeekFrom::End(-2)) {
                warn!(error = %e, "failed rewinding over trailing event separator");
            }
        }
    }
}

/// Drains events from the shared [`WriteQueue`] and writes them to disk.
///
/// Constructed on the caller's thread, then owned and driven exclusively by
/// the file task executor.
pub(crate) struct FileWriter {
    /// Where the assembled log ends up
    final_log_path: PathBuf,
    final_log_file: Option<File>,

    /// Chunk file currently written to, if any. `None` after a failed open
    /// or once logging has stopped.
    current_event_file: Option<File>,
    current_event_file_size: u64,

    /// Number of chunk slots in the ring
    total_num_event_files: usize,

    /// Monotonic chunk counter; 0 means no chunk opened yet, the first real
    /// chunk is number 1. Only the derived index wraps.
    current_event_file_number: usize,

    /// Soft per-chunk byte limit, or [`NO_LIMIT`]
    max_event_file_size: u64,

    /// Whether any event bytes reached disk; decides the seek-back that
    /// strips the final ",\n"
    wrote_event_bytes: bool,
}

impl FileWriter {
    pub(crate) fn new(
        final_log_path: PathBuf,
        max_event_file_size: u64,
        total_num_event_files: usize,
    ) -> Self {
        assert!(total_num_event_files > 0, "chunk count must be nonzero");

        Self {
            final_log_path,
            final_log_file: None,
            current_event_file: None,
            current_event_file_size: 0,
            total_num_event_files,
            current_event_file_number: 0,
            max_event_file_size,
            wrote_event_bytes: false,
        }
    }

    /// Opens the final log file and writes the constants prologue, which
    /// intentionally leaves the events array open until `stop`.
    pub(crate) fn initialize(&mut self, constants: Value) {
        self.final_log_file = open_file_for_write(&self.final_log_path);

        if self.is_bounded() {
            self.create_inprogress_directory();
            let mut constants_file = open_file_for_write(&self.constants_file_path());
            write_constants_to_file(&constants, &mut constants_file);
        } else {
            write_constants_to_file(&constants, &mut self.final_log_file);
        }
    }

    /// Drains the write queue and appends each event followed by ",\n".
    ///
    /// In bounded mode, rotation happens lazily before a write when no
    /// chunk is open yet or the current chunk crossed its soft limit.
    pub(crate) fn flush(&mut self, queue: &WriteQueue) {
        let mut local_queue = VecDeque::new();
        queue.swap(&mut local_queue);

        for event in local_queue {
            let bytes_written;
            if self.is_bounded() {
                if self.current_event_file_number == 0
                    || self.current_event_file_size >= self.max_event_file_size
                {
                    self.increment_current_event_file();
                }
                bytes_written =
                    write_to_file(&mut self.current_event_file, &[event.as_bytes(), b",\n"]);
                self.current_event_file_size += bytes_written;
            } else {
                bytes_written =
                    write_to_file(&mut self.final_log_file, &[event.as_bytes(), b",\n"]);
            }

            self.wrote_event_bytes |= bytes_written > 0;
        }
    }

    /// Closes the events array and writes the polled-data epilogue. Bounded
    /// mode additionally stitches the chunk ring into the final file. The
    /// final file is closed last.
    pub(crate) fn stop(&mut self, polled_data: Option<Value>) {
        if self.is_bounded() {
            let mut closing_file = open_file_for_write(&self.closing_file_path());
            write_polled_data_to_file(polled_data, &mut closing_file);
        } else {
            rewind_if_wrote_event_bytes(&mut self.final_log_file, self.wrote_event_bytes);
            write_polled_data_to_file(polled_data, &mut self.final_log_file);
        }

        if self.is_bounded() {
            self.stitch_final_log_file();
        }

        self.final_log_file = None;
    }

    /// The composite task posted by `stop_observing`
    pub(crate) fn flush_then_stop(&mut self, queue: &WriteQueue, polled_data: Option<Value>) {
        self.flush(queue);
        self.stop(polled_data);
    }

    /// Closes all handles and removes everything written so far. No further
    /// operations are valid afterwards.
    pub(crate) fn delete_all_files(&mut self) {
        self.final_log_file = None;

        if self.is_bounded() {
            self.current_event_file = None;
            if let Err(e) = fs::remove_dir_all(self.inprogress_dir_path()) {
                warn!(error = %e, "failed removing in-progress directory");
            }
        }

        if let Err(e) = fs::remove_file(&self.final_log_path) {
            warn!(error = %e, "failed removing final log file");
        }
    }

    fn is_unbounded(&self) -> bool {
        self.max_event_file_size == NO_LIMIT
    }

    fn is_bounded(&self) -> bool {
        !self.is_unbounded()
    }

    /// Rotate to the next chunk: bump the monotonic file number and
    /// truncate-open the slot it maps to.
    fn increment_current_event_file(&mut self) {
        debug_assert!(self.is_bounded());

        self.current_event_file_number += 1;
        let index = self.file_number_to_index(self.current_event_file_number);
        self.current_event_file = open_file_for_write(&self.event_file_path(index));
        self.current_event_file_size = 0;
    }

    /// File numbers are monotonic and start at 1; indices wrap over the
    /// ring. Tracking the number rather than the index keeps the stitch
    /// window unambiguous once the ring has wrapped.
    fn file_number_to_index(&self, file_number: usize) -> usize {
        debug_assert!(file_number > 0);
        (file_number - 1) % self.total_num_event_files
    }

    fn inprogress_dir_path(&self) -> PathBuf {
        let mut path = self.final_log_path.clone().into_os_string();
        path.push(".inprogress");
        PathBuf::from(path)
    }

    fn event_file_path(&self, index: usize) -> PathBuf {
        debug_assert!(index < self.total_num_event_files);
        self.inprogress_dir_path()
            .join(format!("event_file_{index}.json"))
    }

    fn constants_file_path(&self) -> PathBuf {
        self.inprogress_dir_path().join("constants.json")
    }

    fn closing_file_path(&self) -> PathBuf {
        self.inprogress_dir_path().join("end_netlog.json")
    }

    /// Creates the `.inprogress` directory and leaves a note in the final
    /// file saying where the real data currently lives. The note is
    /// overwritten by stitching on a graceful stop.
    fn create_inprogress_directory(&mut self) {
        debug_assert!(self.is_bounded());

        // The directory is a sibling of the final log path; if that file
        // could not be opened there is no point creating the directory.
        if self.final_log_file.is_none() {
            return;
        }

        if let Err(e) = fs::create_dir_all(self.inprogress_dir_path()) {
            warn!(
                path = %self.inprogress_dir_path().display(),
                error = %e,
                "failed creating in-progress directory"
            );
        }

        write_to_file(&mut self.final_log_file, &[INPROGRESS_PLACEHOLDER.as_bytes()]);
        if let Some(file) = &mut self.final_log_file {
            let _ = file.flush();
        }
    }

    /// Concatenates constants, the live chunk window (oldest to newest) and
    /// the closing file into the final log, deleting each source, then
    /// removes the in-progress directory. The single stitched file is what
    /// offline tooling ingests.
    fn stitch_final_log_file(&mut self) {
        // Close the current chunk so everything is flushed before reading.
        self.current_event_file = None;

        // If the directory never came into existence, there is nothing to
        // stitch; the final file keeps the placeholder note.
        if !self.inprogress_dir_path().is_dir() {
            warn!(
                path = %self.inprogress_dir_path().display(),
                "in-progress directory missing, leaving placeholder in final log"
            );
            return;
        }

        let mut read_buffer = vec![0u8; READ_BUFFER_SIZE];

        // Re-open the final log file, truncating the placeholder.
        self.final_log_file = open_file_for_write(&self.final_log_path);

        append_file_then_delete(
            &self.constants_file_path(),
            &mut self.final_log_file,
            &mut read_buffer,
        );

        // The live window of the ring, oldest to newest. File numbers start
        // at 1, so an under-filled ring begins at 1; a wrapped ring begins
        // N slots back from the end.
        let end_filenumber = self.current_event_file_number + 1;
        let begin_filenumber = if self.current_event_file_number <= self.total_num_event_files {
            1
        } else {
            end_filenumber - self.total_num_event_files
        };
        for filenumber in begin_filenumber..end_filenumber {
            let index = self.file_number_to_index(filenumber);
            append_file_then_delete(
                &self.event_file_path(index),
                &mut self.final_log_file,
                &mut read_buffer,
            );
        }

        rewind_if_wrote_event_bytes(&mut self.final_log_file, self.wrote_event_bytes);

        append_file_then_delete(
            &self.closing_file_path(),
            &mut self.final_log_file,
            &mut read_buffer,
        );

        if let Err(e) = fs::remove_dir_all(self.inprogress_dir_path()) {
            warn!(error = %e, "failed removing in-progress directory");
        }
    }
}

/// Writes the constants prologue and opens the events array (closed again in
/// `stop`): `{"constants":<json>,\n"events": [\n`
fn write_constants_to_file(constants: &Value, file: &mut Option<File>) {
    // Constants always encode; a value that does not is a programmer error.
    let json = match serde_json::to_string(constants) {
        Ok(json) => json,
        Err(e) => {
            debug_assert!(false, "constants failed to encode: {e}");
            error!(error = %e, "constants failed to encode, writing null");
            "null".to_string()
        }
    };

    write_to_file(
        file,
        &[b"{\"constants\":", json.as_bytes(), b",\n\"events\": [\n"],
    );
}

/// Closes the events array, appends `"polledData"` when present and
/// non-null, and closes the log object.
fn write_polled_data_to_file(polled_data: Option<Value>, file: &mut Option<File>) {
    write_to_file(file, &[b"]"]);

    if let Some(polled_data) = polled_data {
        if !polled_data.is_null() {
            match serde_json::to_string(&polled_data) {
                Ok(json) => {
                    write_to_file(file, &[b",\n\"polledData\": ", json.as_bytes(), b"\n"]);
                }
                // Polled data that cannot be encoded is ignored.
                Err(e) => warn!(error = %e, "polled data failed to encode, ignoring"),
            }
        }
    }

    write_to_file(file, &[b"}\n"]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn writer_for(path: &Path, max_event_file_size: u64, total: usize) -> FileWriter {
        FileWriter::new(path.to_path_buf(), max_event_file_size, total)
    }

    fn queue_with(events: &[&str]) -> WriteQueue {
        let queue = WriteQueue::new(NO_LIMIT);
        for event in events {
            queue.push((*event).to_string());
        }
        queue
    }

    #[test]
    fn test_file_number_to_index_wraps() {
        let dir = tempdir().unwrap();
        let writer = writer_for(&dir.path().join("log.json"), 100, 3);

        assert_eq!(writer.file_number_to_index(1), 0);
        assert_eq!(writer.file_number_to_index(2), 1);
        assert_eq!(writer.file_number_to_index(3), 2);
        assert_eq!(writer.file_number_to_index(4), 0);
        assert_eq!(writer.file_number_to_index(7), 0);
    }

    #[test]
    fn test_unbounded_round_trip_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, NO_LIMIT, 1);

        writer.initialize(json!({}));
        writer.flush(&queue_with(&[r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#]));
        writer.stop(None);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\"constants\":{},\n\"events\": [\n{\"a\":1},\n{\"a\":2},\n{\"a\":3}]}\n"
        );

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["events"], json!([{"a":1}, {"a":2}, {"a":3}]));
    }

    #[test]
    fn test_unbounded_no_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, NO_LIMIT, 1);

        writer.initialize(json!({}));
        writer.stop(None);

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["events"], json!([]));
        assert!(parsed.get("polledData").is_none());
    }

    #[test]
    fn test_bounded_creates_ring_files_and_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, 10, 2);

        writer.initialize(json!({}));

        // Placeholder is in the final file until stitching.
        let placeholder = fs::read_to_string(&path).unwrap();
        assert!(placeholder.contains(".inprogress"));

        // Each event line overshoots the 10-byte soft limit, so every
        // event rotates to a fresh chunk.
        writer.flush(&queue_with(&[r#"{"n":1,"pad":"x"}"#]));
        assert!(path
            .with_file_name("log.json.inprogress")
            .join("event_file_0.json")
            .is_file());

        writer.flush(&queue_with(&[r#"{"n":2,"pad":"x"}"#]));
        assert!(path
            .with_file_name("log.json.inprogress")
            .join("event_file_1.json")
            .is_file());

        writer.stop(Some(json!({"k": "v"})));

        // Ring directory is gone, final file holds both events and the
        // polled data.
        assert!(!path.with_file_name("log.json.inprogress").exists());
        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["events"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["polledData"], json!({"k": "v"}));
    }

    #[test]
    fn test_bounded_wrapped_ring_keeps_newest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        // Zero soft limit: every event gets its own chunk number.
        let mut writer = writer_for(&path, 0, 3);

        writer.initialize(json!({}));
        for n in 1..=7 {
            writer.flush(&queue_with(&[&format!(r#"{{"n":{n}}}"#)]));
        }
        assert_eq!(writer.current_event_file_number, 7);
        writer.stop(None);

        // Window [5, 8): events 5, 6, 7 survive in age order.
        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["events"], json!([{"n":5}, {"n":6}, {"n":7}]));
    }

    #[test]
    fn test_single_chunk_ring() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        // One slot, zero soft limit: each event claims the slot for itself.
        let mut writer = writer_for(&path, 0, 1);

        writer.initialize(json!({}));
        for n in 1..=3 {
            writer.flush(&queue_with(&[&format!(r#"{{"n":{n}}}"#)]));
        }
        writer.stop(None);

        // Window [3, 4): only the newest event survives.
        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["events"], json!([{"n":3}]));
    }

    #[test]
    fn test_bounded_no_events_stitches_empty_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, 10, 2);

        writer.initialize(json!({"c": true}));
        writer.stop(None);

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["constants"], json!({"c": true}));
        assert_eq!(parsed["events"], json!([]));
    }

    #[test]
    fn test_bounded_directory_create_failure_leaves_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        // Occupy the directory path with a file so create_dir_all fails.
        fs::write(path.with_file_name("log.json.inprogress"), b"blocker").unwrap();

        let mut writer = writer_for(&path, 10, 2);
        writer.initialize(json!({}));
        writer.flush(&queue_with(&[r#"{"lost":true}"#]));
        writer.stop(None);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, INPROGRESS_PLACEHOLDER);

        fs::remove_file(path.with_file_name("log.json.inprogress")).unwrap();
    }

    #[test]
    fn test_delete_all_files_removes_everything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, 10, 2);

        writer.initialize(json!({}));
        writer.flush(&queue_with(&[r#"{"n":1}"#]));
        writer.delete_all_files();

        assert!(!path.exists());
        assert!(!path.with_file_name("log.json.inprogress").exists());
    }

    #[test]
    fn test_polled_data_null_is_omitted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, NO_LIMIT, 1);

        writer.initialize(json!({}));
        writer.flush(&queue_with(&[r#"{"a":1}"#]));
        writer.stop(Some(Value::Null));

        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.get("polledData").is_none());
    }

    #[test]
    fn test_oversized_event_written_in_full() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.json");
        let mut writer = writer_for(&path, 8, 2);

        let big = format!(r#"{{"data":"{}"}}"#, "y".repeat(64));
        writer.initialize(json!({}));
        writer.flush(&queue_with(&[&big, r#"{"next":1}"#]));

        // The oversized event landed whole in chunk 0; the follow-up event
        // triggered rotation to chunk 1.
        assert_eq!(writer.current_event_file_number, 2);

        writer.stop(None);
        let parsed: Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["events"].as_array().unwrap().len(), 2);
    }
}
