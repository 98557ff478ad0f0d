//! Screen observers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use deskpilot_core::{Error, Observation, Observer};

pub const DEFAULT_CAPTURE_COMMAND: &str = "import -window root jpeg:-";
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";
pub const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;

/// Captures the screen by running a command that writes an image to stdout.
#[derive(Debug, Clone)]
pub struct CommandObserver {
    program: String,
    args: Vec<String>,
    media_type: String,
    max_bytes: usize,
}

impl Default for CommandObserver {
    fn default() -> Self {
        Self::new("import", ["-window", "root", "jpeg:-"])
    }
}

impl CommandObserver {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            media_type: DEFAULT_MEDIA_TYPE.into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    pub fn from_command_line(line: &str) -> Result<Self, Error> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Observation("capture command is empty".into()))?;
        Ok(Self::new(program, parts))
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl Observer for CommandObserver {
    async fn observe(&self) -> Result<Observation, Error> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Observation(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Observation(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let bytes = output.stdout;
        if bytes.is_empty() {
            return Err(Error::Observation(format!(
                "{} produced no image data",
                self.program
            )));
        }
        if bytes.len() > self.max_bytes {
            return Err(Error::Observation(format!(
                "image is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }

        debug!(bytes = bytes.len(), media_type = %self.media_type, "Captured screen");
        Ok(Observation::new(&self.media_type, STANDARD.encode(&bytes)))
    }
}

/// Serves the same image file on every observation.
#[derive(Debug, Clone)]
pub struct FileObserver {
    path: PathBuf,
    media_type: String,
}

impl FileObserver {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let media_type = media_type_for_path(&path).ok_or_else(|| {
            Error::Observation(format!("unsupported image type: {}", path.display()))
        })?;
        Ok(Self {
            path,
            media_type: media_type.into(),
        })
    }
}

#[async_trait]
impl Observer for FileObserver {
    async fn observe(&self) -> Result<Observation, Error> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::Observation(format!("failed to read {}: {e}", self.path.display()))
        })?;
        if bytes.is_empty() {
            return Err(Error::Observation(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(Observation::new(&self.media_type, STANDARD.encode(&bytes)))
    }
}

/// Media type from a file extension.
pub fn media_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
