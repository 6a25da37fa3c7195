//! Shell-script stand-ins for the GDAL executables.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::command::{GdalRunner, GdalTool};

/// `gdal_translate` that writes a placeholder image plus a `.wld` world file
/// at its last argument and appends its arguments to `calls.log`.
pub const TRANSLATE_WRITES_OUTPUT: &str = r#"for arg; do out="$arg"; done
echo "$@" >> "$(dirname "$0")/calls.log"
printf 'jpeg' > "$out"
printf '0.5\n0\n0\n-0.5\n-98.5\n29.5\n' > "${out%.*}.wld""#;

/// A directory of fake GDAL tools.
pub struct StandIns {
    dir: TempDir,
}

impl StandIns {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Install `tool` as a `/bin/sh` script with the given body.
    pub fn install(self, tool: GdalTool, body: &str) -> Self {
        let path = self.dir.path().join(tool.program());
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        self
    }

    pub fn runner(&self) -> GdalRunner {
        GdalRunner::new().with_tool_dir(self.dir.path())
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Argument lines recorded by [`TRANSLATE_WRITES_OUTPUT`].
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.calls_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn calls_log(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }
}
