//! Admin secret rotation.
//!
//! Flow Overview:
//! 1) Refuse to start when the configuration file is missing (nothing is written).
//! 2) Lock `<config>.lock` so two rotations never interleave.
//! 3) Read the file, capture the current secret, generate a new one.
//! 4) Write an immutable timestamped backup of the untouched file.
//! 5) Replace the secret line through a temp file + rename.
//! 6) Append one redacted audit entry.
//!
//! There is no rollback: when a later step fails the backup from step 4 is the
//! recovery artifact.

pub mod audit;
pub mod lock;
pub mod secret;

use crate::{config_file, ADMIN_KEY_NAME};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

pub use self::audit::AuditEntry;
pub use self::lock::RotationLock;
pub use self::secret::{generate_secret, redact};

const BACKUP_DIR: &str = "backups";
const AUDIT_LOG: &str = "rotation.log";

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("another rotation is in progress (lock held on {})", .0.display())]
    Locked(PathBuf),
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to generate secret: {0}")]
    Random(#[from] rand::Error),
    #[error("invalid key name: {0}")]
    KeyName(#[from] regex::Error),
}

impl RotationError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of a successful rotation.
#[derive(Debug)]
pub struct Rotation {
    pub rotated_at: DateTime<Utc>,
    /// Redacted prefix of the replaced secret, `None` if the key was unset.
    pub previous_prefix: Option<String>,
    pub new_secret: SecretString,
    pub backup_path: PathBuf,
    pub audit_log: PathBuf,
}

impl Rotation {
    #[must_use]
    pub fn new_secret_prefix(&self) -> String {
        redact(self.new_secret.expose_secret())
    }
}

#[derive(Debug, Clone)]
pub struct Rotator {
    config_path: PathBuf,
    backup_dir: PathBuf,
    audit_log: PathBuf,
    key_name: String,
}

impl Rotator {
    /// Rotator with backups in `<config dir>/backups` and the audit log in
    /// `<config dir>/rotation.log`.
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        let base = config_path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        Self {
            backup_dir: base.join(BACKUP_DIR),
            audit_log: base.join(AUDIT_LOG),
            config_path,
            key_name: ADMIN_KEY_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = backup_dir.into();
        self
    }

    #[must_use]
    pub fn with_audit_log(mut self, audit_log: impl Into<PathBuf>) -> Self {
        self.audit_log = audit_log.into();
        self
    }

    #[must_use]
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    #[must_use]
    pub fn audit_log(&self) -> &Path {
        &self.audit_log
    }

    /// Run one rotation.
    ///
    /// # Errors
    /// `ConfigNotFound` before any write, `Locked` if another rotation is running,
    /// `Io` for any filesystem failure after that.
    #[instrument(skip(self), fields(config = %self.config_path.display()))]
    pub fn rotate(&self) -> Result<Rotation, RotationError> {
        if !self.config_path.is_file() {
            return Err(RotationError::ConfigNotFound(self.config_path.clone()));
        }

        let _lock = RotationLock::acquire(&self.config_path)?;

        let content = fs::read_to_string(&self.config_path)
            .map_err(|source| RotationError::io("read", &self.config_path, source))?;

        let pattern = key_pattern(&self.key_name)?;
        let previous = current_secret(&pattern, &content);
        let new_secret = generate_secret()?;

        let rotated_at = Utc::now();
        let stamp = rotated_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        fs::create_dir_all(&self.backup_dir)
            .map_err(|source| RotationError::io("create", &self.backup_dir, source))?;

        let backup_path = self.backup_dir.join(backup_file_name(&stamp));
        write_backup(&backup_path, &stamp, &content)
            .map_err(|source| RotationError::io("write backup", &backup_path, source))?;

        debug!("backup written to {}", backup_path.display());

        let updated = replace_secret(
            &pattern,
            &self.key_name,
            &content,
            new_secret.expose_secret(),
        );
        replace_file(&self.config_path, &updated)
            .map_err(|source| RotationError::io("rewrite", &self.config_path, source))?;

        let previous_prefix = previous.map(redact);
        let new_prefix = redact(new_secret.expose_secret());

        audit::append(
            &self.audit_log,
            &AuditEntry {
                rotated_at: &stamp,
                key_name: &self.key_name,
                previous: previous_prefix.as_deref(),
                new: &new_prefix,
                backup: &backup_path,
            },
        )
        .map_err(|source| RotationError::io("append audit log", &self.audit_log, source))?;

        info!(
            previous = previous_prefix.as_deref().unwrap_or(audit::NOT_SET),
            new = %new_prefix,
            backup = %backup_path.display(),
            "{} rotated",
            self.key_name
        );

        Ok(Rotation {
            rotated_at,
            previous_prefix,
            new_secret,
            backup_path,
            audit_log: self.audit_log.clone(),
        })
    }
}

/// Rotate `ADMIN_API_KEY` in `config_path` with the default backup and audit locations.
///
/// # Errors
/// See [`Rotator::rotate`].
pub fn rotate(config_path: &Path) -> Result<Rotation, RotationError> {
    Rotator::new(config_path).rotate()
}

/// `env-backup-<ISO-8601>.txt` with `:` and `.` replaced by `-`.
#[must_use]
pub fn backup_file_name(timestamp: &str) -> String {
    format!("env-backup-{}.txt", timestamp.replace([':', '.'], "-"))
}

fn key_pattern(key_name: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?m)^([ \t]*(?:export[ \t]+)?{}[ \t]*=)([^\r\n]*)",
        regex::escape(key_name)
    ))
}

fn current_secret<'a>(pattern: &Regex, content: &'a str) -> Option<&'a str> {
    pattern
        .captures(content)
        .and_then(|captures| captures.get(2))
        .map(|value| config_file::unquote(value.as_str().trim()))
        .filter(|value| !value.is_empty())
}

fn replace_secret(pattern: &Regex, key_name: &str, content: &str, new_secret: &str) -> String {
    if pattern.is_match(content) {
        return pattern
            .replacen(content, 1, |captures: &regex::Captures<'_>| {
                format!("{}{new_secret}", &captures[1])
            })
            .into_owned();
    }

    let mut updated = content.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(key_name);
    updated.push('=');
    updated.push_str(new_secret);
    updated.push('\n');
    updated
}

fn write_backup(path: &Path, stamp: &str, content: &str) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    write!(
        file,
        "# Automatic backup of the configuration file\n# Date: {stamp}\n\n{content}"
    )?;
    file.sync_all()
}

/// Write `content` to a sibling temp file created with the original permissions, then
/// rename it over `path`. A temp file that already exists is an error and is left alone.
fn replace_file(path: &Path, content: &str) -> io::Result<()> {
    let permissions = fs::metadata(path)?.permissions();

    let mut tmp_name = OsString::from(".");
    tmp_name.push(path.file_name().unwrap_or_default());
    tmp_name.push(".keygate-tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(permissions.mode() & 0o777);
    }
    let mut file = options.open(&tmp_path)?;

    let result = (|| {
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::set_permissions(&tmp_path, permissions)?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn setup(content: &str) -> Result<(TempDir, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join(".env");
        fs::write(&config, content)?;
        Ok((dir, config))
    }

    fn key_line(content: &str) -> Option<String> {
        content
            .lines()
            .find_map(|line| line.strip_prefix("ADMIN_API_KEY="))
            .map(str::to_string)
    }

    #[test]
    fn rotation_replaces_secret_and_backs_up_previous_file() -> Result<()> {
        let original = "SUPABASE_URL=https://x.supabase.co\nADMIN_API_KEY=abc123\nPORT=4000\n";
        let (dir, config) = setup(original)?;

        let rotation = rotate(&config)?;

        let updated = fs::read_to_string(&config)?;
        let new_key = key_line(&updated).unwrap_or_default();
        assert_ne!(new_key, "abc123");
        assert_eq!(new_key.len(), 64);
        assert!(new_key
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(new_key, rotation.new_secret.expose_secret());
        assert_eq!(
            updated,
            format!("SUPABASE_URL=https://x.supabase.co\nADMIN_API_KEY={new_key}\nPORT=4000\n")
        );

        assert!(rotation.backup_path.starts_with(dir.path().join("backups")));
        let backup = fs::read_to_string(&rotation.backup_path)?;
        assert!(backup.starts_with("# Automatic backup of the configuration file\n"));
        assert!(backup.contains("ADMIN_API_KEY=abc123"));
        assert!(backup.ends_with(original));

        let log = fs::read_to_string(dir.path().join("rotation.log"))?;
        assert_eq!(audit::count_entries(&log), 1);
        assert!(log.contains(&format!("Backup: {}", rotation.backup_path.display())));
        assert!(log.contains("Previous: abc123..."));
        assert_eq!(rotation.previous_prefix.as_deref(), Some("abc123..."));
        Ok(())
    }

    #[test]
    fn audit_log_never_contains_more_than_six_secret_characters() -> Result<()> {
        let (dir, config) = setup("ADMIN_API_KEY=0123456789abcdef\n")?;

        let rotation = rotate(&config)?;
        let log = fs::read_to_string(dir.path().join("rotation.log"))?;
        let new_secret = rotation.new_secret.expose_secret();

        assert!(!log.contains("0123456"));
        assert!(!log.contains(&new_secret[..7]));
        assert!(log.contains(&format!("New: {}...", &new_secret[..6])));
        assert_eq!(rotation.new_secret_prefix(), format!("{}...", &new_secret[..6]));
        Ok(())
    }

    #[test]
    fn missing_config_fails_without_writing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join(".env");

        let result = rotate(&config);

        assert!(matches!(result, Err(RotationError::ConfigNotFound(_))));
        assert!(!dir.path().join("backups").exists());
        assert!(!dir.path().join("rotation.log").exists());
        assert!(!config.exists());
        Ok(())
    }

    #[test]
    fn missing_key_is_appended() -> Result<()> {
        let (dir, config) = setup("PORT=4000")?;

        let rotation = rotate(&config)?;

        let updated = fs::read_to_string(&config)?;
        assert!(updated.starts_with("PORT=4000\nADMIN_API_KEY="));
        assert_eq!(
            key_line(&updated).as_deref(),
            Some(rotation.new_secret.expose_secret())
        );
        assert_eq!(rotation.previous_prefix, None);

        let log = fs::read_to_string(dir.path().join("rotation.log"))?;
        assert!(log.contains("Previous: (not set)"));
        Ok(())
    }

    #[test]
    fn blank_key_counts_as_unset() -> Result<()> {
        let (_dir, config) = setup("ADMIN_API_KEY=\nPORT=4000\n")?;

        let rotation = rotate(&config)?;

        assert_eq!(rotation.previous_prefix, None);
        let updated = fs::read_to_string(&config)?;
        assert_eq!(updated.matches("ADMIN_API_KEY=").count(), 1);
        Ok(())
    }

    #[test]
    fn comments_and_similar_keys_are_left_alone() -> Result<()> {
        let original = "# ADMIN_API_KEY=commented\nOLD_ADMIN_API_KEY=legacy\nADMIN_API_KEY=live\n";
        let (_dir, config) = setup(original)?;

        let rotation = rotate(&config)?;

        let updated = fs::read_to_string(&config)?;
        assert!(updated.starts_with("# ADMIN_API_KEY=commented\nOLD_ADMIN_API_KEY=legacy\n"));
        assert_eq!(rotation.previous_prefix.as_deref(), Some("live..."));
        Ok(())
    }

    #[test]
    fn quoted_and_exported_values_are_recognized() -> Result<()> {
        let (_dir, config) = setup("export ADMIN_API_KEY=\"abcdef987\"\r\nPORT=1\r\n")?;

        let rotation = rotate(&config)?;

        let updated = fs::read_to_string(&config)?;
        assert_eq!(rotation.previous_prefix.as_deref(), Some("abcdef..."));
        assert_eq!(
            updated,
            format!(
                "export ADMIN_API_KEY={}\r\nPORT=1\r\n",
                rotation.new_secret.expose_secret()
            )
        );
        Ok(())
    }

    #[test]
    fn rotated_key_is_what_the_gateway_reads() -> Result<()> {
        let (_dir, config) = setup("export\tADMIN_API_KEY=abcdef987\nPORT=1\n")?;

        let rotation = rotate(&config)?;

        let record = config_file::ConfigRecord::load(&config)?;
        assert_eq!(rotation.previous_prefix.as_deref(), Some("abcdef..."));
        assert_eq!(
            record.get(ADMIN_KEY_NAME),
            Some(rotation.new_secret.expose_secret())
        );
        Ok(())
    }

    #[test]
    fn consecutive_rotations_keep_one_backup_and_entry_each() -> Result<()> {
        let (dir, config) = setup("ADMIN_API_KEY=abc123\n")?;

        let first = rotate(&config)?;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = rotate(&config)?;

        assert_ne!(first.backup_path, second.backup_path);
        let second_backup = fs::read_to_string(&second.backup_path)?;
        assert!(second_backup.contains(&format!(
            "ADMIN_API_KEY={}",
            first.new_secret.expose_secret()
        )));

        let log = fs::read_to_string(dir.path().join("rotation.log"))?;
        assert_eq!(audit::count_entries(&log), 2);
        assert_eq!(fs::read_dir(dir.path().join("backups"))?.count(), 2);
        Ok(())
    }

    #[test]
    fn rotation_is_refused_while_locked() -> Result<()> {
        let (dir, config) = setup("ADMIN_API_KEY=abc123\n")?;

        let _held = RotationLock::acquire(&config)?;
        let result = rotate(&config);

        assert!(matches!(result, Err(RotationError::Locked(_))));
        assert_eq!(fs::read_to_string(&config)?, "ADMIN_API_KEY=abc123\n");
        assert!(!dir.path().join("backups").exists());
        Ok(())
    }

    #[test]
    fn custom_locations_are_honoured() -> Result<()> {
        let (dir, config) = setup("ADMIN_API_KEY=abc123\n")?;
        let backups = dir.path().join("vault/backups");
        let log = dir.path().join("logs-rotation.log");

        let rotation = Rotator::new(&config)
            .with_backup_dir(&backups)
            .with_audit_log(&log)
            .rotate()?;

        assert!(rotation.backup_path.starts_with(&backups));
        assert_eq!(rotation.audit_log, log);
        assert!(log.exists());
        Ok(())
    }

    #[test]
    fn custom_key_name() -> Result<()> {
        let (_dir, config) = setup("ADMIN_API_KEY=keep\nOTHER_KEY=old\n")?;

        let rotation = Rotator::new(&config).with_key_name("OTHER_KEY").rotate()?;

        let updated = fs::read_to_string(&config)?;
        assert!(updated.starts_with("ADMIN_API_KEY=keep\n"));
        assert_eq!(rotation.previous_prefix.as_deref(), Some("old..."));
        Ok(())
    }

    #[test]
    fn backup_name_is_filesystem_safe() {
        assert_eq!(
            backup_file_name("2025-01-02T03:04:05.678Z"),
            "env-backup-2025-01-02T03-04-05-678Z.txt"
        );
    }

    #[test]
    fn default_locations_follow_config_dir() {
        let rotator = Rotator::new("/srv/app/.env");
        assert_eq!(rotator.backup_dir(), Path::new("/srv/app/backups"));
        assert_eq!(rotator.audit_log(), Path::new("/srv/app/rotation.log"));
        assert_eq!(rotator.config_path(), Path::new("/srv/app/.env"));

        let relative = Rotator::new(".env");
        assert_eq!(relative.backup_dir(), Path::new("backups"));
    }

    #[cfg(unix)]
    #[test]
    fn rewrite_keeps_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, config) = setup("ADMIN_API_KEY=abc123\n")?;
        fs::set_permissions(&config, fs::Permissions::from_mode(0o600))?;

        let rotation = rotate(&config)?;

        assert_eq!(fs::metadata(&config)?.permissions().mode() & 0o777, 0o600);
        assert_eq!(
            fs::metadata(&rotation.backup_path)?.permissions().mode() & 0o777,
            0o600
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn existing_temp_file_is_never_reused() -> Result<()> {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let (dir, config) = setup("ADMIN_API_KEY=abc123\n")?;
        fs::set_permissions(&config, fs::Permissions::from_mode(0o600))?;
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, "untouched\n")?;
        symlink(&outside, dir.path().join("..env.keygate-tmp"))?;

        let result = rotate(&config);

        assert!(
            matches!(&result, Err(RotationError::Io { action: "rewrite", .. })),
            "{:?}",
            result.as_ref().err()
        );
        assert_eq!(fs::read_to_string(&config)?, "ADMIN_API_KEY=abc123\n");
        assert_eq!(fs::read_to_string(&outside)?, "untouched\n");
        assert!(fs::symlink_metadata(dir.path().join("..env.keygate-tmp"))?
            .file_type()
            .is_symlink());
        Ok(())
    }
}
