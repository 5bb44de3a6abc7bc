//! Per-line command classifier.
//!
//! Matches a line against a fixed, closed set of command shapes and
//! returns a tagged result carrying the extracted numeric fields. Matching
//! is exact-shape: the parameter list must match one shape completely or
//! the line is [`Classified::NoMatch`] and passes through every rewrite
//! untouched. When a motion line carries both a position and a trailing
//! speed field, the speed-carrying variant takes precedence.

pub mod lexer;

use std::sync::LazyLock;

use regex::Regex;

use crate::buffer::Line;
use crate::error::{Error, Result};
use lexer::{TokenKind, split_parameter, tokenize_code};

/// Comment markers with structural meaning to one of the dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Cura layer boundary, `;LAYER:<n>`
    LayerChange,
    /// KISSlicer `; 'Solid Path'`
    SolidPath,
    /// KISSlicer `; 'Sparse Infill Path'`
    InfillPath,
    /// Any other KISSlicer `; '<name> Path'` marker
    OtherPath,
    /// KISSlicer `; extruder on`
    BeadStart,
    /// KISSlicer `; extruders off`
    BeadEnd,
    /// KISSlicer `*** G-code Prefix ***`, end of the settings header
    HeaderEnd,
}

/// Classification result for one line
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// `M101`
    ExtruderOn,
    /// `M103`
    ExtruderOff,
    /// `M104 S<temp>`
    ExtruderTemperature { temperature: f64 },
    /// `M108 S<rate>`, the explicit flow-rate command of the target device
    FlowRate { rate: f64 },
    /// `G1 X<x> Y<y> E<e> [F<speed>]`
    ExtrudeMove {
        x: f64,
        y: f64,
        filament: f64,
        speed: Option<f64>,
    },
    /// `G1 X<x> Y<y> [F<speed>]`
    PlainMove { x: f64, y: f64, speed: Option<f64> },
    /// `G1 Z<z> F<speed>`
    VerticalMove { z: f64, speed: f64 },
    /// `G1 F<speed>`
    SpeedOnly { speed: f64 },
    /// `G1 E<e> F<speed>`, a filament retract or prime
    Retract { filament: f64, speed: f64 },
    /// `G92 E0`, the filament position reset
    FilamentReset,
    /// Header comment of the form `; key = value`
    SettingAssignment { key: String, value: String },
    /// Structural comment marker
    SectionMarker(SectionKind),
    /// None of the recognized shapes
    NoMatch,
}

static PATH_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^; '.* Path'").expect("path marker regex"));

/// Classify one line.
///
/// The only error case is a line that matches a command shape but whose
/// numeric field does not parse; that aborts the file's processing.
pub fn classify(line: &Line) -> Result<Classified> {
    if line.is_comment_only() {
        return Ok(classify_marker(line));
    }

    let tokens = tokenize_code(line.code());
    let Some(first) = tokens.first() else {
        return Ok(Classified::NoMatch);
    };
    if first.kind != TokenKind::Command {
        return Ok(Classified::NoMatch);
    }

    // (letter, value text) for every parameter, or NoMatch when a token
    // has no leading letter
    let mut params = Vec::with_capacity(tokens.len() - 1);
    for token in &tokens[1..] {
        match split_parameter(&token.text) {
            Some(pair) => params.push(pair),
            None => return Ok(Classified::NoMatch),
        }
    }
    // No recognized shape carries a non-numeric value, so a field with
    // letters in it (e.g. the `SFIRST_LAYER` placeholder) can never match
    // a shape. Numeric-looking values are parsed later and failures there
    // are hard errors.
    if params.iter().any(|(_, v)| !looks_numeric(v)) {
        return Ok(Classified::NoMatch);
    }
    let letters: String = params.iter().map(|(l, _)| *l).collect();

    match first.text.as_str() {
        "M101" if params.is_empty() => Ok(Classified::ExtruderOn),
        "M103" if params.is_empty() => Ok(Classified::ExtruderOff),
        "M104" if letters == "S" => Ok(Classified::ExtruderTemperature {
            temperature: numeric(line, params[0].1)?,
        }),
        "M108" if letters == "S" => Ok(Classified::FlowRate {
            rate: numeric(line, params[0].1)?,
        }),
        "G92" if letters == "E" => {
            if numeric(line, params[0].1)? == 0.0 {
                Ok(Classified::FilamentReset)
            } else {
                Ok(Classified::NoMatch)
            }
        }
        "G1" => classify_move(line, &letters, &params),
        _ => Ok(Classified::NoMatch),
    }
}

/// Match the `G1` shapes. The letter sequence is the shape: a trailing `F`
/// selects the speed-carrying variant.
fn classify_move(line: &Line, letters: &str, params: &[(char, &str)]) -> Result<Classified> {
    match letters {
        "XYE" | "XYEF" => Ok(Classified::ExtrudeMove {
            x: numeric(line, params[0].1)?,
            y: numeric(line, params[1].1)?,
            filament: numeric(line, params[2].1)?,
            speed: match params.get(3) {
                Some((_, v)) => Some(numeric(line, v)?),
                None => None,
            },
        }),
        "XY" | "XYF" => Ok(Classified::PlainMove {
            x: numeric(line, params[0].1)?,
            y: numeric(line, params[1].1)?,
            speed: match params.get(2) {
                Some((_, v)) => Some(numeric(line, v)?),
                None => None,
            },
        }),
        "ZF" => Ok(Classified::VerticalMove {
            z: numeric(line, params[0].1)?,
            speed: numeric(line, params[1].1)?,
        }),
        "F" => Ok(Classified::SpeedOnly {
            speed: numeric(line, params[0].1)?,
        }),
        "EF" => Ok(Classified::Retract {
            filament: numeric(line, params[0].1)?,
            speed: numeric(line, params[1].1)?,
        }),
        _ => Ok(Classified::NoMatch),
    }
}

/// Match the comment markers the dialects care about
fn classify_marker(line: &Line) -> Classified {
    let raw = line.raw();
    if raw.starts_with(";LAYER:") {
        return Classified::SectionMarker(SectionKind::LayerChange);
    }
    if raw.starts_with("; 'Solid Path'") {
        return Classified::SectionMarker(SectionKind::SolidPath);
    }
    if raw.starts_with("; 'Sparse Infill Path'") {
        return Classified::SectionMarker(SectionKind::InfillPath);
    }
    if PATH_MARKER.is_match(raw) {
        return Classified::SectionMarker(SectionKind::OtherPath);
    }
    if raw.starts_with("; extruder on") {
        return Classified::SectionMarker(SectionKind::BeadStart);
    }
    // the slicer emits "extruders off"; the parenthesized spelling shows
    // up in hand-edited files and is accepted too
    if raw.starts_with("; extruders off") || raw.starts_with("; extruder(s) off") {
        return Classified::SectionMarker(SectionKind::BeadEnd);
    }
    if raw.contains("*** G-code Prefix ***") {
        return Classified::SectionMarker(SectionKind::HeaderEnd);
    }
    if let Some((key, value)) = parse_setting(line.comment().unwrap_or("")) {
        return Classified::SettingAssignment { key, value };
    }
    Classified::NoMatch
}

/// `key = value` comment, key a single identifier-like word
fn parse_setting(comment: &str) -> Option<(String, String)> {
    let (key, value) = comment.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty()
        || value.is_empty()
        || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn looks_numeric(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

/// Parse one numeric field of an already shape-matched line. The value
/// already looks numeric at this point, so a parse failure (e.g. "1.2.3")
/// is a hard error carrying the offending line.
fn numeric(line: &Line, text: &str) -> Result<f64> {
    text.parse::<f64>().map_err(|_| Error::MalformedNumber {
        line: line.raw().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: &str) -> Classified {
        classify(&Line::new(raw)).expect("classify")
    }

    #[test]
    fn extruder_state_commands() {
        assert_eq!(kind("M101"), Classified::ExtruderOn);
        assert_eq!(kind("M103"), Classified::ExtruderOff);
    }

    #[test]
    fn temperature_and_flow() {
        assert_eq!(
            kind("M104 S210"),
            Classified::ExtruderTemperature { temperature: 210.0 }
        );
        assert_eq!(kind("M108 S5.3"), Classified::FlowRate { rate: 5.3 });
    }

    #[test]
    fn extrude_move_without_speed() {
        assert_eq!(
            kind("G1 X-32.5 Y31.536 E2.3007"),
            Classified::ExtrudeMove {
                x: -32.5,
                y: 31.536,
                filament: 2.3007,
                speed: None,
            }
        );
    }

    #[test]
    fn speed_variant_takes_precedence() {
        assert_eq!(
            kind("G1 X1.0 Y2.0 E0.5 F1800.0"),
            Classified::ExtrudeMove {
                x: 1.0,
                y: 2.0,
                filament: 0.5,
                speed: Some(1800.0),
            }
        );
        assert_eq!(
            kind("G1 X1.0 Y2.0 F1800.0"),
            Classified::PlainMove {
                x: 1.0,
                y: 2.0,
                speed: Some(1800.0),
            }
        );
    }

    #[test]
    fn vertical_speed_and_retract() {
        assert_eq!(
            kind("G1 Z0.35 F7800.0"),
            Classified::VerticalMove {
                z: 0.35,
                speed: 7800.0,
            }
        );
        assert_eq!(kind("G1 F900"), Classified::SpeedOnly { speed: 900.0 });
        assert_eq!(
            kind("G1 E-2.00000 F2400.00000"),
            Classified::Retract {
                filament: -2.0,
                speed: 2400.0,
            }
        );
    }

    #[test]
    fn filament_reset_must_be_zero() {
        assert_eq!(kind("G92 E0"), Classified::FilamentReset);
        assert_eq!(kind("G92 E12.5"), Classified::NoMatch);
    }

    #[test]
    fn exact_shape_rejects_extra_parameters() {
        assert_eq!(kind("G1 X1 Y2 Z3 F100"), Classified::NoMatch);
        assert_eq!(kind("M101 S5"), Classified::NoMatch);
        assert_eq!(kind("G28"), Classified::NoMatch);
    }

    #[test]
    fn placeholder_value_is_no_match_not_error() {
        assert_eq!(kind("M104 SFIRST_LAYER"), Classified::NoMatch);
    }

    #[test]
    fn malformed_numeric_is_hard_error() {
        let err = classify(&Line::new("G1 X1.2.3 Y2 F100")).unwrap_err();
        assert!(matches!(err, Error::MalformedNumber { .. }));
    }

    #[test]
    fn section_markers() {
        assert_eq!(
            kind(";LAYER:0"),
            Classified::SectionMarker(SectionKind::LayerChange)
        );
        assert_eq!(
            kind("; 'Solid Path'"),
            Classified::SectionMarker(SectionKind::SolidPath)
        );
        assert_eq!(
            kind("; 'Sparse Infill Path'"),
            Classified::SectionMarker(SectionKind::InfillPath)
        );
        assert_eq!(
            kind("; 'Perimeter Path'"),
            Classified::SectionMarker(SectionKind::OtherPath)
        );
        assert_eq!(
            kind("; extruder on"),
            Classified::SectionMarker(SectionKind::BeadStart)
        );
        assert_eq!(
            kind("; extruders off"),
            Classified::SectionMarker(SectionKind::BeadEnd)
        );
        assert_eq!(
            kind("; extruder(s) off"),
            Classified::SectionMarker(SectionKind::BeadEnd)
        );
        assert_eq!(
            kind("; *** G-code Prefix ***"),
            Classified::SectionMarker(SectionKind::HeaderEnd)
        );
    }

    #[test]
    fn setting_assignment() {
        assert_eq!(
            kind("; destring_speed_mm_per_s = 40"),
            Classified::SettingAssignment {
                key: "destring_speed_mm_per_s".to_string(),
                value: "40".to_string(),
            }
        );
        // prose comments with an equals sign are not settings
        assert_eq!(kind("; speed x = y is not a setting"), Classified::NoMatch);
    }

    #[test]
    fn plain_comment_and_unknown_command_pass_through() {
        assert_eq!(kind("; just a comment"), Classified::NoMatch);
        assert_eq!(kind("M999"), Classified::NoMatch);
    }
}
