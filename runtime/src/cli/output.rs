//! Terminal output helpers shared by the subcommands.
//!
//! Global flags are exported as `AREASCOPE_*` environment variables by
//! `main` so any module can check them.

use areascope::FieldValue;
use serde::Serialize;
use std::io::IsTerminal;

pub fn is_json() -> bool {
    flag("AREASCOPE_JSON")
}

pub fn is_quiet() -> bool {
    flag("AREASCOPE_QUIET")
}

pub fn is_verbose() -> bool {
    flag("AREASCOPE_VERBOSE")
}

fn flag(var: &str) -> bool {
    std::env::var(var).is_ok_and(|v| v == "1")
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  failed to encode output: {e}"),
    }
}

/// Human-readable rendering of a field value.
pub fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Number(v) => format!("{v:.1}"),
        FieldValue::Text(s) => s.clone(),
    }
}

/// Status symbols, coloured when stderr is a terminal.
pub struct Styled {
    color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        let color = std::io::stderr().is_terminal() && !flag("AREASCOPE_NO_COLOR");
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "[OK]")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "[!!]")
    }

    pub fn fail_sym(&self) -> String {
        self.paint("31", "[XX]")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}
