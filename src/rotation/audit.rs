//! Append-only rotation audit log.

use std::{
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
};

/// Shown instead of a prefix when the key had no value before rotation.
pub const NOT_SET: &str = "(not set)";

const SEPARATOR: &str = "---------------------------------------";

/// One rotation event. Secrets must already be redacted.
#[derive(Debug)]
pub struct AuditEntry<'a> {
    pub rotated_at: &'a str,
    pub key_name: &'a str,
    pub previous: Option<&'a str>,
    pub new: &'a str,
    pub backup: &'a Path,
}

impl fmt::Display for AuditEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {} rotated.", self.rotated_at, self.key_name)?;
        writeln!(f, "Previous: {}", self.previous.unwrap_or(NOT_SET))?;
        writeln!(f, "New: {}", self.new)?;
        writeln!(f, "Backup: {}", self.backup.display())?;
        writeln!(f, "{SEPARATOR}")
    }
}

/// Append an entry, creating the log if needed.
///
/// # Errors
/// Returns an error if the log cannot be opened or written.
pub fn append(path: &Path, entry: &AuditEntry<'_>) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(entry.to_string().as_bytes())?;
    file.sync_all()
}

/// Count entries in an audit log body.
#[must_use]
pub fn count_entries(log: &str) -> usize {
    log.lines().filter(|line| *line == SEPARATOR).count()
}
