//! Action executor: dispatches validated actions to effectors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionOutcome};

/// Failure reported by an effector.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Command(String),

    #[error("path must be absolute: {0}")]
    RelativePath(String),

    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to create directory: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to write file: {0}")]
    Write(std::io::Error),
}

/// Pointer and keyboard effectors.
///
/// Calls are expected to return quickly; they are never preempted.
pub trait InputDevice: Send + Sync {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), EffectError>;

    /// Press and release `button` ("left", "right", "middle") at the current
    /// pointer position.
    fn click(&self, button: &str, double: bool) -> Result<(), EffectError>;

    fn type_text(&self, text: &str) -> Result<(), EffectError>;

    fn key_press(&self, key: &str) -> Result<(), EffectError>;

    /// Press a `+`-separated chord such as `ctrl+shift+s`.
    fn key_combo(&self, combo: &str) -> Result<(), EffectError>;

    fn scroll(&self, direction: &str, amount: u32) -> Result<(), EffectError>;
}

impl<I: InputDevice + ?Sized> InputDevice for Box<I> {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), EffectError> {
        (**self).move_pointer(x, y)
    }

    fn click(&self, button: &str, double: bool) -> Result<(), EffectError> {
        (**self).click(button, double)
    }

    fn type_text(&self, text: &str) -> Result<(), EffectError> {
        (**self).type_text(text)
    }

    fn key_press(&self, key: &str) -> Result<(), EffectError> {
        (**self).key_press(key)
    }

    fn key_combo(&self, combo: &str) -> Result<(), EffectError> {
        (**self).key_combo(combo)
    }

    fn scroll(&self, direction: &str, amount: u32) -> Result<(), EffectError> {
        (**self).scroll(direction, amount)
    }
}

/// Trait for executing actions in the environment.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Apply an action. Failures come back as a failed outcome, never as a
    /// panic or error.
    async fn execute(&self, action: &Action) -> ActionOutcome;
}

#[async_trait]
impl<T: ActionExecutor + ?Sized> ActionExecutor for Arc<T> {
    async fn execute(&self, action: &Action) -> ActionOutcome {
        (**self).execute(action).await
    }
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Pause between moving the pointer and pressing the button.
    pub click_settle: Duration,
    /// Reject relative paths for file actions.
    pub require_absolute_paths: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            click_settle: Duration::from_millis(50),
            require_absolute_paths: true,
        }
    }
}

/// Dispatch table from action kind to effector call.
pub struct Executor<I> {
    input: I,
    config: ExecutorConfig,
}

impl<I: InputDevice> Executor<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    async fn click(&self, x: i32, y: i32, button: &str, double: bool) -> Result<(), EffectError> {
        self.input.move_pointer(x, y)?;
        tokio::time::sleep(self.config.click_settle).await;
        self.input.click(button, double)
    }

    fn key(&self, key: &str) -> Result<(), EffectError> {
        if key.contains('+') {
            self.input.key_combo(key)
        } else {
            self.input.key_press(key)
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, EffectError> {
        self.check_path(path)?;
        let bytes = tokio::fs::read(path).await.map_err(EffectError::Read)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), EffectError> {
        self.check_path(path)?;
        if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(EffectError::CreateDir)?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(EffectError::Write)
    }

    fn check_path(&self, path: &str) -> Result<(), EffectError> {
        if self.config.require_absolute_paths && !Path::new(path).is_absolute() {
            return Err(EffectError::RelativePath(path.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<I: InputDevice> ActionExecutor for Executor<I> {
    async fn execute(&self, action: &Action) -> ActionOutcome {
        debug!(action = %action, "Executing action");

        let result = match action {
            Action::Click {
                x,
                y,
                button,
                double,
            } => self.click(*x, *y, button, *double).await.map(|_| None),
            Action::Type { text } => self.input.type_text(text).map(|_| None),
            Action::Key { key } => self.key(key).map(|_| None),
            Action::Scroll { direction, amount } => {
                self.input.scroll(direction, *amount).map(|_| None)
            }
            Action::FileRead { path } => self.read_file(path).await.map(Some),
            Action::FileWrite { path, content } => {
                let result = self.write_file(path, content).await;
                if result.is_ok() {
                    info!(path = %path, bytes = content.len(), "Wrote file");
                }
                result.map(|_| None)
            }
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }
            Action::Done { .. } | Action::Failed { .. } => {
                // Terminal actions are consumed by the controller.
                warn!(kind = %action.kind(), "Terminal action reached the executor");
                Ok(None)
            }
        };

        match result {
            Ok(Some(data)) => ActionOutcome::with_data(data),
            Ok(None) => ActionOutcome::ok(),
            Err(e) => {
                warn!(kind = %action.kind(), error = %e, "Action failed");
                ActionOutcome::failure(e.to_string())
            }
        }
    }
}
