//! Shared rewrite passes for the Makerbot-style dialects (Slic3r,
//! Simplify3D).
//!
//! Each pass is one forward traversal of the buffer applying a single
//! concern. Dialects differ only in configuration (flow-scale constant,
//! header marker, synthetic-span handling, deny-list), never in the
//! buffer or reconstructor contracts.

use crate::buffer::{Line, LineBuffer};
use crate::classify::{Classified, classify};
use crate::diagnostics::DiagnosticsSink;
use crate::error::Result;
use crate::flow::FlowReconstructor;

/// One rewrite concern, run once over the whole buffer
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()>;
}

/// Extruder-off command of the target device
pub const EXTRUDER_OFF_CMD: &str = "M103";
/// Extruder-on command of the target device
pub const EXTRUDER_ON_CMD: &str = "M101";

/// Drops every line preceding the dialect's header marker
pub struct StripHeader {
    pub marker: &'static str,
}

impl Pass for StripHeader {
    fn name(&self) -> &'static str {
        "strip-header"
    }

    fn run(&self, buf: &mut LineBuffer, _sink: &dyn DiagnosticsSink) -> Result<()> {
        while let Some(line) = buf.current() {
            if line.code().starts_with(self.marker) {
                break;
            }
            buf.delete_current();
            buf.advance();
        }
        Ok(())
    }
}

/// Simplify3D header handling: the slicer emits its temperature command
/// before the device header block, but the device wants it in the
/// `M104 SFIRST_LAYER` placeholder slot inside the block. Everything else
/// preceding the header (lines starting with `^`) is dropped.
pub struct RelocateHeaderTemperature;

impl Pass for RelocateHeaderTemperature {
    fn name(&self) -> &'static str {
        "relocate-header-temperature"
    }

    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        let mut in_header = false;
        let mut saved_temp: Option<String> = None;

        while let Some(line) = buf.current() {
            let code = line.code().to_string();
            if code.starts_with('^') {
                in_header = true;
            } else if code.starts_with("M104") {
                if !in_header {
                    saved_temp = Some(code);
                    buf.delete_current();
                } else if code.split_whitespace().nth(1) == Some("SFIRST_LAYER") {
                    match saved_temp.take() {
                        Some(temp) => buf.replace_current(Line::new(temp)),
                        None => sink.warn("no temperature line found for the header placeholder"),
                    }
                    break;
                }
            } else if !in_header {
                buf.delete_current();
            }
            buf.advance();
        }
        Ok(())
    }
}

/// Reconstructs explicit flow-rate commands from implicit extrusion.
///
/// Drives the classifier and the flow reconstructor across the buffer:
/// extruder-on opens a span, extruder-off / speed-only / plain moves close
/// it, extrude moves sample into it. Retracts disappear (the target format
/// has no retraction) but their filament reading is kept. With
/// `synthetic_reset` set (Simplify3D), a filament reset immediately followed
/// by a speed-carrying extrude move becomes the start of a bead and the
/// reset line itself is rewritten to the extruder-on command.
pub struct ReconstructExtrusion {
    pub scale: f64,
    pub synthetic_reset: bool,
}

impl Pass for ReconstructExtrusion {
    fn name(&self) -> &'static str {
        "reconstruct-extrusion"
    }

    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        let mut flow = FlowReconstructor::new(self.scale);
        let mut current_speed = 0.0;
        // an off-marker is already in effect; stray repeats get deleted
        let mut off_seen = false;
        let mut reset_index: Option<usize> = None;

        while let Some(line) = buf.current() {
            let classified = classify(line)?;
            let is_reset = matches!(classified, Classified::FilamentReset);
            match classified {
                Classified::ExtruderOn => {
                    flow.begin_span(buf);
                    off_seen = false;
                }
                Classified::ExtruderOff => {
                    if flow.span_open() {
                        flow.close_span(buf);
                        off_seen = true;
                    } else if off_seen {
                        buf.delete_current();
                    } else {
                        off_seen = true;
                    }
                }
                Classified::FilamentReset if self.synthetic_reset => {
                    flow.track_filament(0.0);
                    reset_index = Some(buf.cursor());
                }
                Classified::ExtrudeMove {
                    x,
                    y,
                    filament,
                    speed,
                } => {
                    if self.synthetic_reset && speed.is_some() {
                        if let Some(index) = reset_index.take() {
                            let at = flow.begin_span_at(index, buf);
                            buf.replace(at, Line::new(EXTRUDER_ON_CMD));
                            off_seen = false;
                            sink.debug("synthetic extruder-on from filament reset");
                        }
                    }
                    if flow.span_open() {
                        if let Some(speed) = speed {
                            current_speed = speed;
                        }
                        flow.sample((x, y), filament, current_speed);
                    }
                }
                Classified::SpeedOnly { .. } => {
                    if flow.span_open() {
                        flow.close_span(buf);
                        buf.replace_current(Line::new(EXTRUDER_OFF_CMD));
                        off_seen = true;
                    } else {
                        buf.delete_current();
                    }
                }
                Classified::Retract { filament, .. } => {
                    buf.delete_current();
                    flow.track_filament(filament);
                }
                Classified::PlainMove { x, y, .. } => {
                    if flow.span_open() {
                        flow.close_span(buf);
                        buf.insert_before_current(Line::new(EXTRUDER_OFF_CMD));
                        off_seen = true;
                    }
                    flow.track_position((x, y));
                }
                _ => {}
            }
            if !is_reset {
                reset_index = None;
            }
            buf.advance();
        }
        Ok(())
    }
}

/// Rewrites every motion line into one canonical 3-axis move carrying the
/// most recently seen vertical coordinate and speed; vertical-only moves
/// are deleted once their value is captured. Canonical moves match no
/// recognized shape, so running the pass on its own output changes
/// nothing.
pub struct NormalizeMotion;

fn canonical_move(x: f64, y: f64, z: f64, speed: f64) -> Line {
    Line::new(format!("G1 X{x:.3} Y{y:.3} Z{z:.3} F{speed:.1}"))
}

impl Pass for NormalizeMotion {
    fn name(&self) -> &'static str {
        "normalize-motion"
    }

    fn run(&self, buf: &mut LineBuffer, _sink: &dyn DiagnosticsSink) -> Result<()> {
        let mut current_z = 0.0;
        let mut current_speed = 0.0;

        while let Some(line) = buf.current() {
            match classify(line)? {
                Classified::VerticalMove { z, .. } => {
                    current_z = z;
                    buf.delete_current();
                }
                Classified::ExtrudeMove { x, y, speed, .. } => {
                    if let Some(speed) = speed {
                        current_speed = speed;
                    }
                    buf.replace_current(canonical_move(x, y, current_z, current_speed));
                }
                Classified::PlainMove { x, y, speed } => {
                    let speed = speed.unwrap_or(current_speed);
                    buf.replace_current(canonical_move(x, y, current_z, speed));
                }
                _ => {}
            }
            buf.advance();
        }
        Ok(())
    }
}

/// Renames the two legacy fan codes to their canonical equivalents,
/// leaving the rest of the line untouched
pub struct RenameFanCommands;

impl Pass for RenameFanCommands {
    fn name(&self) -> &'static str {
        "rename-fan-commands"
    }

    fn run(&self, buf: &mut LineBuffer, _sink: &dyn DiagnosticsSink) -> Result<()> {
        while let Some(line) = buf.current() {
            let code = line.code();
            let renamed = if code.starts_with("M127") {
                Some(line.raw().replacen("M127", "M107", 1))
            } else if code.starts_with("M126") {
                Some(line.raw().replacen("M126", "M106", 1))
            } else {
                None
            };
            if let Some(renamed) = renamed {
                buf.replace_current(Line::new(renamed));
            }
            buf.advance();
        }
        Ok(())
    }
}

/// The device must never receive a temperature change while extruding:
/// an extruder-off is inserted directly before any such command
pub struct TemperatureInterlock;

impl Pass for TemperatureInterlock {
    fn name(&self) -> &'static str {
        "temperature-interlock"
    }

    fn run(&self, buf: &mut LineBuffer, _sink: &dyn DiagnosticsSink) -> Result<()> {
        let mut extruder_on = false;

        while let Some(line) = buf.current() {
            match classify(line)? {
                Classified::ExtruderOn => extruder_on = true,
                Classified::ExtruderOff => extruder_on = false,
                Classified::ExtruderTemperature { .. } if extruder_on => {
                    buf.insert_before_current(Line::new(EXTRUDER_OFF_CMD));
                }
                _ => {}
            }
            buf.advance();
        }
        Ok(())
    }
}

/// Deletes every line whose command code the target device has no use for
pub struct RemoveDeniedCommands {
    pub deny: &'static [&'static str],
}

impl Pass for RemoveDeniedCommands {
    fn name(&self) -> &'static str {
        "remove-denied-commands"
    }

    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        while let Some(line) = buf.current() {
            let denied = line
                .code()
                .split_whitespace()
                .next()
                .is_some_and(|word| self.deny.contains(&word));
            if denied {
                sink.debug(&format!("dropping unused command: {}", line.raw()));
                buf.delete_current();
            }
            buf.advance();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;

    fn buffer(lines: &[&str]) -> LineBuffer {
        LineBuffer::new(lines.iter().map(|l| Line::new(*l)).collect())
    }

    fn raws(buf: &LineBuffer) -> Vec<&str> {
        buf.lines().iter().map(Line::raw).collect()
    }

    #[test]
    fn strip_header_drops_leading_lines() {
        let mut buf = buffer(&["M104 S220", "G28", "^Firmware:V1.1", "M101"]);
        StripHeader {
            marker: "^Firmware",
        }
        .run(&mut buf, &NullSink)
        .unwrap();
        assert_eq!(raws(&buf), ["^Firmware:V1.1", "M101"]);
    }

    #[test]
    fn strip_header_without_marker_empties_buffer() {
        let mut buf = buffer(&["M104 S220", "G28"]);
        StripHeader {
            marker: "^Firmware",
        }
        .run(&mut buf, &NullSink)
        .unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn relocate_header_temperature() {
        let mut buf = buffer(&[
            "M104 S230",
            "G28",
            "^Firmware:V1.1",
            "M104 SFIRST_LAYER",
            "M101",
        ]);
        RelocateHeaderTemperature.run(&mut buf, &NullSink).unwrap();
        assert_eq!(raws(&buf), ["^Firmware:V1.1", "M104 S230", "M101"]);
    }

    #[test]
    fn relocate_without_placeholder_just_strips() {
        let mut buf = buffer(&["G28", "^Firmware:V1.1", "M101"]);
        RelocateHeaderTemperature.run(&mut buf, &NullSink).unwrap();
        assert_eq!(raws(&buf), ["^Firmware:V1.1", "M101"]);
    }

    #[test]
    fn extrusion_pass_emits_flow_before_bead() {
        let mut buf = buffer(&[
            "M101",
            "G1 X0.0 Y31.536 E0.0 F1200.0",
            "G1 X-32.5 Y31.536 E2.3007",
            "M103",
        ]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        // flow command lands at the span start, ahead of the extruder-on
        assert!(buf.get(0).unwrap().raw().starts_with("M108 S"));
        assert_eq!(buf.get(1).unwrap().raw(), "M101");
        assert_eq!(buf.get(4).unwrap().raw(), "M103");
    }

    #[test]
    fn plain_move_closes_bead_with_inserted_off() {
        let mut buf = buffer(&[
            "M101",
            "G1 X1.0 Y0.0 E0.5 F900.0",
            "G1 X5.0 Y5.0 F3000.0",
            "M103",
        ]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        let lines = raws(&buf);
        // M108 before the bead, M103 inserted before the travel move, and
        // the stray trailing M103 removed as redundant
        assert_eq!(lines[0], "M108 S450.0");
        assert_eq!(lines[1], "M101");
        assert_eq!(lines[3], "M103");
        assert_eq!(lines[4], "G1 X5.0 Y5.0 F3000.0");
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn speed_only_line_becomes_extruder_off() {
        let mut buf = buffer(&["M101", "G1 X1.0 Y0.0 E0.5 F900.0", "G1 F1800", "M101"]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        let lines = raws(&buf);
        assert_eq!(lines[0], "M108 S450.0");
        assert_eq!(lines[3], "M103");
        assert_eq!(lines[4], "M101");
    }

    #[test]
    fn speed_only_without_span_is_deleted() {
        let mut buf = buffer(&["G1 F1800", "M101"]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();
        assert_eq!(raws(&buf), ["M101"]);
    }

    #[test]
    fn retract_is_deleted_but_filament_tracked() {
        let mut buf = buffer(&[
            "M101",
            "G1 X1.0 Y0.0 E1.0 F900.0",
            "M103",
            "G1 E-2.0 F2400.0",
            "M101",
            "G1 X2.0 Y0.0 E-1.0",
            "M103",
        ]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        let lines = raws(&buf);
        assert!(!lines.iter().any(|l| l.starts_with("G1 E-2.0")));
        // second bead samples against the retracted reading -2.0:
        // path 1.0, extrusion |(-2.0) - (-1.0)| = 1.0, rate 1.0 * 900
        assert_eq!(lines[4], "M108 S900.0");
    }

    #[test]
    fn redundant_off_lines_are_deleted() {
        let mut buf = buffer(&["M101", "G1 X1.0 Y0.0 E0.5 F900.0", "M103", "M103", "M103"]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        let offs = raws(&buf).iter().filter(|l| **l == "M103").count();
        assert_eq!(offs, 1);
    }

    #[test]
    fn synthetic_span_from_filament_reset() {
        let mut buf = buffer(&[
            "^Firmware:V1.1",
            "G92 E0",
            "G1 X1.0 Y0.0 E0.5 F900.0",
            "G1 X2.0 Y0.0 E1.0",
            "G1 F1800",
        ]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: true,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        let lines = raws(&buf);
        // the reset line became the extruder-on, flow inserted before it
        assert!(lines[1].starts_with("M108 S"));
        assert_eq!(lines[2], "M101");
        assert_eq!(*lines.last().unwrap(), "M103");
    }

    #[test]
    fn reset_not_followed_by_speed_move_stays() {
        let mut buf = buffer(&["G92 E0", "G1 X1.0 Y0.0 F3000.0", "G1 X2.0 Y0.0 E0.5 F900.0"]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: true,
        }
        .run(&mut buf, &NullSink)
        .unwrap();
        assert_eq!(raws(&buf)[0], "G92 E0");
    }

    #[test]
    fn flow_commands_alternate_with_off_markers() {
        let mut buf = buffer(&[
            "M101",
            "G1 X1.0 Y0.0 E0.5 F900.0",
            "G1 X5.0 Y5.0 F3000.0",
            "M101",
            "G1 X6.0 Y5.0 E1.0",
            "M103",
        ]);
        ReconstructExtrusion {
            scale: 1.0,
            synthetic_reset: false,
        }
        .run(&mut buf, &NullSink)
        .unwrap();

        // every flow command is followed by exactly one off marker before
        // the next flow command
        let mut pending_off = 0;
        for line in raws(&buf) {
            if line.starts_with("M108 S") {
                assert_eq!(pending_off, 0, "flow command before previous bead closed");
                pending_off = 1;
            } else if line == "M103" {
                assert_eq!(pending_off, 1, "stray off marker");
                pending_off = 0;
            }
        }
        assert_eq!(pending_off, 0);
    }

    #[test]
    fn normalize_motion_carries_z_and_speed() {
        let mut buf = buffer(&[
            "G1 Z0.35 F7800.0",
            "G1 X1.0 Y2.0 E0.5 F900.0",
            "G1 X2.0 Y3.0 E1.0",
            "G1 X9.0 Y9.0 F3000.0",
        ]);
        NormalizeMotion.run(&mut buf, &NullSink).unwrap();
        assert_eq!(
            raws(&buf),
            [
                "G1 X1.000 Y2.000 Z0.350 F900.0",
                "G1 X2.000 Y3.000 Z0.350 F900.0",
                "G1 X9.000 Y9.000 Z0.350 F3000.0",
            ]
        );
    }

    #[test]
    fn normalize_motion_is_idempotent() {
        let mut buf = buffer(&["G1 Z0.35 F7800.0", "G1 X1.0 Y2.0 E0.5 F900.0"]);
        NormalizeMotion.run(&mut buf, &NullSink).unwrap();
        let first = raws(&buf)
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        buf.rewind();
        NormalizeMotion.run(&mut buf, &NullSink).unwrap();
        assert_eq!(raws(&buf), first);
    }

    #[test]
    fn fan_codes_are_renamed_in_place() {
        let mut buf = buffer(&["M126 S255", "G1 X1 Y1", "M127 ; fan off"]);
        RenameFanCommands.run(&mut buf, &NullSink).unwrap();
        assert_eq!(raws(&buf), ["M106 S255", "G1 X1 Y1", "M107 ; fan off"]);
    }

    #[test]
    fn temperature_interlock_inserts_off() {
        let mut buf = buffer(&["M101", "M104 S220", "M103"]);
        TemperatureInterlock.run(&mut buf, &NullSink).unwrap();
        assert_eq!(raws(&buf), ["M101", "M103", "M104 S220", "M103"]);
    }

    #[test]
    fn temperature_while_off_is_untouched() {
        let mut buf = buffer(&["M103", "M104 S220", "M101"]);
        TemperatureInterlock.run(&mut buf, &NullSink).unwrap();
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn denied_commands_are_removed() {
        let mut buf = buffer(&["G90", "M82", "G1 X1 Y1", "M84"]);
        RemoveDeniedCommands {
            deny: &["G90", "M82", "M84"],
        }
        .run(&mut buf, &NullSink)
        .unwrap();
        assert_eq!(raws(&buf), ["G1 X1 Y1"]);
    }
}
