//! File-level entry point: read, detect, rewrite, write.
//!
//! The output file sits next to the input, named `<stem>_cb.<ext>`. The
//! target device reads from the front of a FAT card, so the output is
//! comment-free and CRLF-joined regardless of the input's line endings.

use std::fs;
use std::path::{Path, PathBuf};

use crate::buffer::LineBuffer;
use crate::diagnostics::DiagnosticsSink;
use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Suffix appended to the input's file stem
const OUTPUT_SUFFIX: &str = "_cb";

/// Process one G-code file and return the path written.
pub fn process_file(path: &Path, sink: &dyn DiagnosticsSink) -> Result<PathBuf> {
    // slicer output is ASCII; stray high bytes in comments (degree signs
    // from latin-1 profiles) must not abort the conversion
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);

    let first_line = content.lines().next().unwrap_or("");
    let dialect = Dialect::detect(first_line)
        .ok_or_else(|| Error::UnrecognizedDialect(first_line.to_string()))?;
    sink.info(&format!("detected {} G-code", dialect.name()));

    let mut buf = LineBuffer::from_raw_lines(content.lines());
    dialect.process(&mut buf, sink)?;

    let output = output_path(path, dialect);
    fs::write(&output, render(&buf))?;
    sink.info(&format!("wrote {}", output.display()));
    Ok(output)
}

/// Serialized output: code only, comments and blank lines dropped,
/// CRLF-joined with no trailing terminator.
fn render(buf: &LineBuffer) -> String {
    buf.lines()
        .iter()
        .map(|line| line.code())
        .filter(|code| !code.is_empty())
        .collect::<Vec<_>>()
        .join("\r\n")
}

fn output_path(input: &Path, dialect: Dialect) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = dialect
        .output_extension()
        .or_else(|| input.extension().and_then(|e| e.to_str()))
        .unwrap_or("gcode");
    input.with_file_name(format!("{stem}{OUTPUT_SUFFIX}.{extension}"))
}
