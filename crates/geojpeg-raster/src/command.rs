//! GDAL command builder and runner.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{RasterError, RasterResult};

/// External GDAL utilities the converter drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GdalTool {
    /// `gdalinfo`: metadata reader
    Info,
    /// `gdal_translate`: format conversion and encoding
    Translate,
    /// `gdalwarp`: reprojection
    Warp,
}

impl GdalTool {
    pub const ALL: [GdalTool; 3] = [GdalTool::Info, GdalTool::Translate, GdalTool::Warp];

    /// Executable name.
    pub fn program(&self) -> &'static str {
        match self {
            GdalTool::Info => "gdalinfo",
            GdalTool::Translate => "gdal_translate",
            GdalTool::Warp => "gdalwarp",
        }
    }
}

/// Builder for GDAL commands.
#[derive(Debug, Clone)]
pub struct GdalCommand {
    /// Tool to invoke
    tool: GdalTool,
    /// Option arguments (before the positional paths)
    args: Vec<String>,
    /// Source dataset
    input: Option<PathBuf>,
    /// Destination dataset
    output: Option<PathBuf>,
    /// Suppress progress output
    quiet: bool,
}

impl GdalCommand {
    /// Create a bare command.
    pub fn new(tool: GdalTool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            input: None,
            output: None,
            quiet: false,
        }
    }

    /// `gdalinfo -json <input>`.
    pub fn info(input: impl AsRef<Path>) -> Self {
        Self::new(GdalTool::Info).arg("-json").input(input)
    }

    /// `gdal_translate -q <input> <output>`.
    pub fn translate(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new(GdalTool::Translate).input(input).output(output);
        cmd.quiet = true;
        cmd
    }

    /// `gdalwarp -q -overwrite <input> <output>`.
    pub fn warp(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new(GdalTool::Warp)
            .arg("-overwrite")
            .input(input)
            .output(output);
        cmd.quiet = true;
        cmd
    }

    /// Set the source dataset.
    pub fn input(mut self, input: impl AsRef<Path>) -> Self {
        self.input = Some(input.as_ref().to_path_buf());
        self
    }

    /// Set the destination dataset.
    pub fn output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = Some(output.as_ref().to_path_buf());
        self
    }

    /// Add an option argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple option arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set output format (`-of`).
    pub fn output_format(self, format: impl Into<String>) -> Self {
        self.arg("-of").arg(format)
    }

    /// Add a creation option (`-co KEY=VALUE`).
    pub fn creation_option(self, key: &str, value: impl std::fmt::Display) -> Self {
        self.arg("-co").arg(format!("{}={}", key, value))
    }

    /// Set source SRS (`-s_srs`).
    pub fn source_srs(self, srs: impl Into<String>) -> Self {
        self.arg("-s_srs").arg(srs)
    }

    /// Set target SRS (`-t_srs`).
    pub fn target_srs(self, srs: impl Into<String>) -> Self {
        self.arg("-t_srs").arg(srs)
    }

    /// Assign an SRS without reprojecting (`-a_srs`).
    pub fn assign_srs(self, srs: impl Into<String>) -> Self {
        self.arg("-a_srs").arg(srs)
    }

    /// Read only a pixel window of the source (`-srcwin xoff yoff xsize ysize`).
    pub fn src_window(self, x_off: u64, y_off: u64, width: u64, height: u64) -> Self {
        self.args([
            "-srcwin".to_string(),
            x_off.to_string(),
            y_off.to_string(),
            width.to_string(),
            height.to_string(),
        ])
    }

    /// Add a ground control point (`-gcp pixel line x y`).
    pub fn gcp(self, pixel: f64, line: f64, x: f64, y: f64) -> Self {
        self.args([
            "-gcp".to_string(),
            pixel.to_string(),
            line.to_string(),
            x.to_string(),
            y.to_string(),
        ])
    }

    pub fn tool(&self) -> GdalTool {
        self.tool
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.quiet {
            args.push("-q".to_string());
        }

        args.extend(self.args.iter().cloned());

        if let Some(input) = &self.input {
            args.push(input.to_string_lossy().to_string());
        }
        if let Some(output) = &self.output {
            args.push(output.to_string_lossy().to_string());
        }

        args
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runner for GDAL commands with timeout and cancellation.
#[derive(Debug, Clone, Default)]
pub struct GdalRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
    /// Directory holding the GDAL executables; `PATH` when unset
    tool_dir: Option<PathBuf>,
}

impl GdalRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Look up the GDAL executables in `dir` instead of `PATH`.
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }

    /// Full path of the executable this runner would start for `tool`.
    pub fn locate(&self, tool: GdalTool) -> RasterResult<PathBuf> {
        let program = tool.program();
        let found = match &self.tool_dir {
            Some(dir) => which::which_in(program, Some(dir), dir),
            None => which::which(program),
        };
        found.map_err(|_| RasterError::ToolNotFound(program))
    }

    /// Run a command to completion, failing on a non-zero exit.
    pub async fn run(&self, cmd: &GdalCommand) -> RasterResult<CommandOutput> {
        let program = cmd.tool().program();
        let executable = self.locate(cmd.tool())?;

        if self.is_cancelled() {
            return Err(RasterError::Cancelled);
        }

        let args = cmd.build_args();
        debug!("Running GDAL: {} {}", program, args.join(" "));

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_handle = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_handle = tokio::spawn(read_pipe(child.stderr.take()));

        let status = self.wait_for_completion(&mut child, program).await;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();
        let status = status?;

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            let stderr = stderr.trim().to_string();
            Err(RasterError::command_failed(
                program,
                format!("exited with {}", status),
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ))
        }
    }

    /// Wait for child process with cancellation and timeout.
    async fn wait_for_completion(
        &self,
        child: &mut Child,
        program: &'static str,
    ) -> RasterResult<ExitStatus> {
        let timeout_secs = self.timeout_secs;
        let deadline = async move {
            match timeout_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancel_rx = self.cancel_rx.clone();
        let cancelled = async move {
            match cancel_rx {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        let interrupted = tokio::select! {
            status = child.wait() => return Ok(status?),
            _ = deadline => RasterError::Timeout(timeout_secs.unwrap_or_default()),
            _ = cancelled => RasterError::Cancelled,
        };

        match &interrupted {
            RasterError::Timeout(secs) => {
                warn!("{} timed out after {} seconds, killing process", program, secs)
            }
            _ => info!("{} cancelled, killing process", program),
        }
        let _ = child.kill().await;
        Err(interrupted)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Report the version string of a GDAL tool (`--version`).
pub async fn tool_version(runner: &GdalRunner, tool: GdalTool) -> RasterResult<String> {
    let output = runner.run(&GdalCommand::new(tool).arg("--version")).await?;
    Ok(output.stdout.trim().to_string())
}

/// Check whether GDAL lists a raster driver (e.g. `MrSID`) in `gdalinfo --formats`.
pub async fn has_driver(runner: &GdalRunner, driver: &str) -> RasterResult<bool> {
    let output = runner
        .run(&GdalCommand::new(GdalTool::Info).arg("--formats"))
        .await?;
    Ok(formats_list_driver(&output.stdout, driver))
}

fn formats_list_driver(formats: &str, driver: &str) -> bool {
    formats
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name.eq_ignore_ascii_case(driver))
}
