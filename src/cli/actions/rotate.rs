use crate::{
    rotation::{Rotation, Rotator},
    ADMIN_KEY_NAME,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    pub config: PathBuf,
    pub backup_dir: Option<PathBuf>,
    pub audit_log: Option<PathBuf>,
}

impl Args {
    #[must_use]
    pub fn rotator(&self) -> Rotator {
        let mut rotator = Rotator::new(&self.config);
        if let Some(dir) = &self.backup_dir {
            rotator = rotator.with_backup_dir(dir);
        }
        if let Some(log) = &self.audit_log {
            rotator = rotator.with_audit_log(log);
        }
        rotator
    }
}

/// Rotate the admin key and print a redacted summary.
///
/// # Errors
/// Returns an error if the rotation fails.
pub fn execute(args: &Args) -> Result<()> {
    let rotation = args.rotator().rotate().with_context(|| {
        format!(
            "Failed to rotate {} in {}",
            ADMIN_KEY_NAME,
            args.config.display()
        )
    })?;

    println!("{}", summary(&rotation));

    Ok(())
}

/// Operator-facing report. Secrets appear only as their 6-character prefix.
#[must_use]
pub fn summary(rotation: &Rotation) -> String {
    format!(
        "{ADMIN_KEY_NAME} rotated successfully.\nNew key (hidden): {}\nBackup saved to: {}\nAudit log: {}",
        rotation.new_secret_prefix(),
        rotation.backup_path.display(),
        rotation.audit_log.display()
    )
}
