use crate::config::{LOG_BACKUPS, MAX_LOG_SIZE};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only request logger with size-based rotation.
///
/// Lines are mirrored to stdout/stderr and appended to a file. When the file
/// reaches [`MAX_LOG_SIZE`] it is rotated through `.1`..`.3` backups, newest
/// first. File IO failures are swallowed; logging must never fail a request.
pub struct Logger {
    path: PathBuf,
    // Serializes the size check against the rotation renames.
    lock: Mutex<()>,
}

impl Logger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn info(&self, msg: &str) {
        let line = format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), msg);
        println!("{}", line);
        self.append(&line);
    }

    pub fn error(&self, msg: &str) {
        let line = format!(
            "[{}] ERROR: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            msg
        );
        eprintln!("{}", line);
        self.append(&line);
    }

    fn append(&self, line: &str) {
        let _guard = match self.lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() >= MAX_LOG_SIZE {
                rotate(&self.path);
            }
        }

        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

fn rotate(path: &Path) {
    let backup = |n: usize| {
        let mut p = path.as_os_str().to_owned();
        p.push(format!(".{}", n));
        PathBuf::from(p)
    };

    let _ = std::fs::remove_file(backup(LOG_BACKUPS));
    for n in (1..LOG_BACKUPS).rev() {
        let _ = std::fs::rename(backup(n), backup(n + 1));
    }
    let _ = std::fs::rename(path, backup(1));
}

lazy_static::lazy_static! {
    /// Process-wide logger; the file path comes from `CMM_LOG_FILE`.
    pub static ref LOG: Logger = Logger::new(
        std::env::var("CMM_LOG_FILE").unwrap_or_else(|_| "cmm-gateway.log".to_string())
    );
}
