//! Binary installation with rollback.
//!
//! The new binary is staged next to the current one, the current one is
//! moved aside, and only then does the staged copy take its place, all via
//! `rename` so the executable path never points at a half-written file. If
//! the final rename fails the backup is moved back.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub(crate) fn install_binary(new_binary: &[u8], current_exe: &Path) -> Result<()> {
    let parent = current_exe
        .parent()
        .context("Binary has no parent directory")?;

    let mut staging =
        NamedTempFile::new_in(parent).context("Failed to create staging temp file")?;
    staging
        .write_all(new_binary)
        .context("Failed to write new binary")?;
    staging
        .as_file()
        .sync_all()
        .context("Failed to sync new binary to disk")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))
            .context("Failed to set executable permissions on new binary")?;
    }

    let backup = NamedTempFile::new_in(parent).context("Failed to create backup temp file")?;
    let backup_path = backup.into_temp_path();

    fs::rename(current_exe, &*backup_path).context("Failed to back up current binary")?;

    let staging_path = staging.into_temp_path();
    if let Err(e) = fs::rename(&*staging_path, current_exe) {
        if let Err(rollback_err) = fs::rename(&*backup_path, current_exe) {
            bail!(
                "Update failed and rollback failed!\n\
                 Update error: {}\n\
                 Rollback error: {}\n\
                 Manual recovery needed: copy {} to {}",
                e,
                rollback_err,
                backup_path.display(),
                current_exe.display()
            );
        }
        return Err(e.into());
    }

    // Backup is deleted when its TempPath drops.
    Ok(())
}
