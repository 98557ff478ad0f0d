//! Pointer and keyboard effectors.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use deskpilot_core::{EffectError, InputDevice};

/// Drives an X11 session through the `xdotool` binary.
pub struct XdotoolInput {
    program: String,
}

impl Default for XdotoolInput {
    fn default() -> Self {
        Self::new()
    }
}

impl XdotoolInput {
    pub fn new() -> Self {
        Self::with_program("xdotool")
    }

    /// Use a different binary, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), EffectError> {
        debug!(program = %self.program, ?args, "Running input command");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EffectError::Command(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EffectError::Command(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl InputDevice for XdotoolInput {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), EffectError> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run(&["mousemove", &x, &y])
    }

    fn click(&self, button: &str, double: bool) -> Result<(), EffectError> {
        let code = button_code(button)?;
        if double {
            self.run(&["click", "--repeat", "2", code])
        } else {
            self.run(&["click", code])
        }
    }

    fn type_text(&self, text: &str) -> Result<(), EffectError> {
        self.run(&["type", "--", text])
    }

    fn key_press(&self, key: &str) -> Result<(), EffectError> {
        self.run(&["key", &translate_key(key)])
    }

    fn key_combo(&self, combo: &str) -> Result<(), EffectError> {
        self.run(&["key", &translate_combo(combo)])
    }

    fn scroll(&self, direction: &str, amount: u32) -> Result<(), EffectError> {
        let code = scroll_button(direction)?;
        let repeat = amount.max(1).to_string();
        self.run(&["click", "--repeat", &repeat, code])
    }
}

/// X11 button number for a named mouse button.
pub fn button_code(button: &str) -> Result<&'static str, EffectError> {
    match button.to_ascii_lowercase().as_str() {
        "left" => Ok("1"),
        "middle" => Ok("2"),
        "right" => Ok("3"),
        other => Err(EffectError::Unsupported(format!("mouse button: {other}"))),
    }
}

/// Wheel directions map onto buttons 4 through 7.
pub fn scroll_button(direction: &str) -> Result<&'static str, EffectError> {
    match direction.to_ascii_lowercase().as_str() {
        "up" => Ok("4"),
        "down" => Ok("5"),
        "left" => Ok("6"),
        "right" => Ok("7"),
        other => Err(EffectError::Unsupported(format!("scroll direction: {other}"))),
    }
}

/// Translate a single key name to its keysym.
pub fn translate_key(key: &str) -> String {
    let lower = key.trim().to_ascii_lowercase();
    let keysym = match lower.as_str() {
        "win" | "super" | "cmd" | "meta" => "super",
        "ctrl" | "control" => "ctrl",
        "alt" => "alt",
        "shift" => "shift",
        "enter" | "return" => "Return",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "space" => "space",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        "pageup" => "Prior",
        "pagedown" => "Next",
        "insert" => "Insert",
        _ => {
            if let Some(n) = lower.strip_prefix('f').filter(|n| n.parse::<u8>().is_ok()) {
                return format!("F{n}");
            }
            return key.trim().to_string();
        }
    };
    keysym.to_string()
}

/// Translate each part of a `+`-joined chord, keeping the separator.
pub fn translate_combo(combo: &str) -> String {
    combo
        .split('+')
        .map(translate_key)
        .collect::<Vec<_>>()
        .join("+")
}

/// Logs every effect instead of performing it.
#[derive(Debug, Default)]
pub struct DryRunInput;

impl InputDevice for DryRunInput {
    fn move_pointer(&self, x: i32, y: i32) -> Result<(), EffectError> {
        info!(x, y, "[dry-run] move pointer");
        Ok(())
    }

    fn click(&self, button: &str, double: bool) -> Result<(), EffectError> {
        info!(button, double, "[dry-run] click");
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), EffectError> {
        info!(chars = text.chars().count(), "[dry-run] type text");
        Ok(())
    }

    fn key_press(&self, key: &str) -> Result<(), EffectError> {
        info!(key, "[dry-run] key press");
        Ok(())
    }

    fn key_combo(&self, combo: &str) -> Result<(), EffectError> {
        info!(combo, "[dry-run] key combo");
        Ok(())
    }

    fn scroll(&self, direction: &str, amount: u32) -> Result<(), EffectError> {
        info!(direction, amount, "[dry-run] scroll");
        Ok(())
    }
}
