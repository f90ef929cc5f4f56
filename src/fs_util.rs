use std::fs;
use std::path::Path;

use crate::error::RetrieveError;

/// Owner and group may use the working directory, nobody else.
pub const WORKING_DIR_MODE: u32 = 0o770;

pub fn ensure_working_dir(path: &Path) -> Result<(), RetrieveError> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(WORKING_DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|err| RetrieveError::Filesystem(format!("create {}: {err}", path.display())))
}
