//! Action protocol.
//!
//! The oracle answers with a flat JSON object tagged by `type`. It is decoded
//! into a [`RawAction`] (every field optional) and then turned into a typed
//! [`Action`] by [`RawAction::normalize_and_validate`], which applies defaults
//! and rejects missing required fields. There is no other way to build an
//! `Action` from untrusted input.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Default mouse button for `click`.
pub const DEFAULT_BUTTON: &str = "left";
/// Default wheel units for `scroll`.
pub const DEFAULT_SCROLL_AMOUNT: u32 = 3;
/// Default duration for `wait`, in milliseconds.
pub const DEFAULT_WAIT_MS: u64 = 500;

/// Maximum characters of typed text shown when describing an action.
pub const TEXT_PREVIEW_CHARS: usize = 50;
/// Maximum characters of a path shown when describing an action.
pub const PATH_PREVIEW_CHARS: usize = 120;

/// A validated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Move the pointer to `(x, y)` and press a button.
    Click {
        x: i32,
        y: i32,
        button: String,
        double: bool,
    },

    /// Inject raw text.
    Type { text: String },

    /// Press a key or a `+`-separated key combination.
    Key { key: String },

    /// Turn the mouse wheel.
    Scroll { direction: String, amount: u32 },

    /// Read a file's contents.
    FileRead { path: String },

    /// Write content to a file.
    FileWrite { path: String, content: String },

    /// Sleep for `ms` milliseconds.
    Wait { ms: u64 },

    /// Goal achieved. Ends the run, never executed.
    Done { summary: String },

    /// Goal cannot be achieved. Ends the run, never executed.
    Failed { reason: String },
}

/// The closed set of action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Key,
    Scroll,
    FileRead,
    FileWrite,
    Wait,
    Done,
    Failed,
}

impl ActionKind {
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Key,
        ActionKind::Scroll,
        ActionKind::FileRead,
        ActionKind::FileWrite,
        ActionKind::Wait,
        ActionKind::Done,
        ActionKind::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Key => "key",
            ActionKind::Scroll => "scroll",
            ActionKind::FileRead => "file_read",
            ActionKind::FileWrite => "file_write",
            ActionKind::Wait => "wait",
            ActionKind::Done => "done",
            ActionKind::Failed => "failed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// `done` and `failed` end the run instead of being executed.
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Done | ActionKind::Failed)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Click { .. } => ActionKind::Click,
            Action::Type { .. } => ActionKind::Type,
            Action::Key { .. } => ActionKind::Key,
            Action::Scroll { .. } => ActionKind::Scroll,
            Action::FileRead { .. } => ActionKind::FileRead,
            Action::FileWrite { .. } => ActionKind::FileWrite,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Done { .. } => ActionKind::Done,
            Action::Failed { .. } => ActionKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Short parameter description, without the kind. Long text and paths are
    /// cut to a preview; file content is never included.
    pub fn detail(&self) -> String {
        match self {
            Action::Click {
                x,
                y,
                button,
                double,
            } => {
                let dbl = if *double { " double" } else { "" };
                format!("{button}{dbl} at ({x}, {y})")
            }
            Action::Type { text } => format!("{:?}", preview(text, TEXT_PREVIEW_CHARS)),
            Action::Key { key } => key.clone(),
            Action::Scroll { direction, amount } => format!("{direction} {amount}"),
            Action::FileRead { path } => preview(path, PATH_PREVIEW_CHARS),
            Action::FileWrite { path, content } => format!(
                "{} ({} bytes)",
                preview(path, PATH_PREVIEW_CHARS),
                content.len()
            ),
            Action::Wait { ms } => format!("{ms}ms"),
            Action::Done { summary } => preview(summary, TEXT_PREVIEW_CHARS),
            Action::Failed { reason } => preview(reason, TEXT_PREVIEW_CHARS),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.detail())
    }
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// An action field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Name of the offending wire field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn required(field: &'static str, kind: ActionKind) -> Self {
        Self {
            field,
            message: format!("{field} is required for {kind} action"),
        }
    }
}

/// Wire form of an action as sent by the oracle. Missing or `null` strings
/// decode as empty and missing or `null` numbers as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAction {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub x: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub y: i32,
    #[serde(deserialize_with = "null_as_default")]
    pub button: String,
    #[serde(deserialize_with = "null_as_default")]
    pub double: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub direction: String,
    /// Zero or negative means the default amount.
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content: String,
    /// Zero or negative means the default wait.
    #[serde(deserialize_with = "null_as_default")]
    pub ms: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub reason: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawAction {
    /// Apply per-kind defaults, check required fields and build the typed
    /// action.
    pub fn normalize_and_validate(self) -> Result<Action, ValidationError> {
        let Some(kind) = ActionKind::from_tag(&self.kind) else {
            return Err(ValidationError {
                field: "type",
                message: format!("unknown action type: {}", self.kind),
            });
        };

        let action = match kind {
            ActionKind::Click => Action::Click {
                x: self.x,
                y: self.y,
                button: if self.button.is_empty() {
                    DEFAULT_BUTTON.to_string()
                } else {
                    self.button
                },
                double: self.double,
            },
            ActionKind::Type => Action::Type {
                text: require(self.text, "text", kind)?,
            },
            ActionKind::Key => Action::Key {
                key: require(self.key, "key", kind)?,
            },
            ActionKind::Scroll => Action::Scroll {
                direction: require(self.direction, "direction", kind)?,
                amount: if self.amount <= 0 {
                    DEFAULT_SCROLL_AMOUNT
                } else {
                    u32::try_from(self.amount).unwrap_or(u32::MAX)
                },
            },
            ActionKind::FileRead => Action::FileRead {
                path: require(self.path, "path", kind)?,
            },
            ActionKind::FileWrite => Action::FileWrite {
                path: require(self.path, "path", kind)?,
                content: self.content,
            },
            ActionKind::Wait => Action::Wait {
                ms: if self.ms <= 0 {
                    DEFAULT_WAIT_MS
                } else {
                    self.ms.unsigned_abs()
                },
            },
            ActionKind::Done => Action::Done {
                summary: self.summary,
            },
            ActionKind::Failed => Action::Failed {
                reason: require(self.reason, "reason", kind)?,
            },
        };

        Ok(action)
    }
}

fn require(value: String, field: &'static str, kind: ActionKind) -> Result<String, ValidationError> {
    if value.is_empty() {
        Err(ValidationError::required(field, kind))
    } else {
        Ok(value)
    }
}

/// Result of applying a non-terminal action.
///
/// A failed outcome always carries a non-empty error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    /// Successful outcome carrying a payload (file content for `file_read`).
    pub fn with_data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::ok()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".into();
        }
        Self {
            success: false,
            error: Some(error),
            data: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// `OK` or `ERROR: <message>`.
    pub fn status(&self) -> String {
        match &self.error {
            Some(error) if !self.success => format!("ERROR: {error}"),
            _ => "OK".into(),
        }
    }
}
