// logfacts - platform/fs.rs
//
// Loading log files as text. A parse reads its file once, in full, then
// splits the content into lines.

use crate::util::constants;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Retry limits for transient I/O errors.
const MAX_RETRIES: u32 = 3;
const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

/// Supplies the full text of a log file.
pub trait LineSource: Send + Sync {
    fn load(&self, path: &Path) -> io::Result<String>;
}

/// Split loaded content into lines (`\n` or `\r\n` terminated).
pub fn split_lines(content: &str) -> Vec<&str> {
    content
        .strip_prefix('\u{feff}')
        .unwrap_or(content)
        .lines()
        .collect()
}

/// Reads files from the local filesystem.
///
/// Files at or above `large_file_threshold` bytes are memory-mapped. Invalid
/// UTF-8 is replaced rather than rejected.
#[derive(Debug, Clone)]
pub struct FsLineSource {
    pub large_file_threshold: u64,
}

impl Default for FsLineSource {
    fn default() -> Self {
        Self {
            large_file_threshold: constants::DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl LineSource for FsLineSource {
    fn load(&self, path: &Path) -> io::Result<String> {
        let size = std::fs::metadata(path)?.len();
        if size >= self.large_file_threshold && size > 0 {
            read_large_file(path)
        } else {
            read_small_file_with_retry(path)
        }
    }
}

/// Read using `memmap2` for large files (avoids allocating a read buffer).
fn read_large_file(path: &Path) -> io::Result<String> {
    let file = std::fs::File::open(path)?;
    // SAFETY: the map is read-only and dropped before returning. A log file
    // being truncated by another process during the copy is the documented
    // risk of mapping files we do not own.
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    Ok(String::from_utf8_lossy(&mmap).into_owned())
}

/// Read a small file with transient-error retries.
fn read_small_file_with_retry(path: &Path) -> io::Result<String> {
    let mut last_err: Option<io::Error> = None;

    for attempt in 0..MAX_RETRIES {
        match std::fs::read(path) {
            Ok(bytes) => {
                return Ok(match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::debug!(file = %path.display(), "Invalid UTF-8 replaced");
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                })
            }
            Err(e) if is_transient_error(&e) => {
                tracing::debug!(
                    file = %path.display(),
                    attempt = attempt + 1,
                    error = %e,
                    "Transient I/O error, retrying"
                );
                std::thread::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt as usize]));
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("Unknown read error")))
}

/// Returns true for transient I/O errors that are worth retrying.
fn is_transient_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
