use colored::Colorize;
use std::io::{self, Write};

/// Write an info message
pub fn info(w: &mut dyn Write, msg: &str) -> io::Result<()> {
    writeln!(w, "{} {}", "ℹ".blue(), msg)
}

/// Write a fatal error message
pub fn fatal(w: &mut dyn Write, msg: &str) -> io::Result<()> {
    writeln!(w, "{} {}", "FATAL:".red().bold(), msg)
}

/// Write a plain message
pub fn plain(w: &mut dyn Write, msg: &str) -> io::Result<()> {
    writeln!(w, "{msg}")
}

// ============================================================================
// Tests
// ============================================================================
