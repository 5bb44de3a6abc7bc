//! KISSlicer-specific rewriting.
//!
//! KISSlicer already emits the target command set; what it cannot do is
//! tune solid and infill extrusion amounts separately. Two settings are
//! smuggled through the profile header and applied here by scaling the
//! flow-rate command feeding each bead inside the matching path section.

use std::collections::HashMap;

use crate::buffer::{Line, LineBuffer};
use crate::classify::{Classified, SectionKind, classify};
use crate::diagnostics::DiagnosticsSink;
use crate::error::Result;

use super::passes::Pass;

/// Header setting repurposed as the solid-path extrusion percentage
pub const SOLID_SETTING_KEY: &str = "bed_C";
/// Header setting repurposed as the sparse-infill extrusion percentage
pub const INFILL_SETTING_KEY: &str = "destring_speed_mm_per_s";
/// Read but currently unused; kept so the header scan stays complete
pub const LOOPS_INSIDEOUT_KEY: &str = "loops_insideout";

const SETTINGS_TO_READ: [&str; 3] = [SOLID_SETTING_KEY, INFILL_SETTING_KEY, LOOPS_INSIDEOUT_KEY];

/// Percentage value meaning "no scaling"
const NO_SCALING: &str = "100";

/// Read the recognized settings from the header region, which ends at the
/// G-code prefix marker. The table is consulted but never mutated
/// afterwards.
pub fn read_settings(buf: &LineBuffer) -> Result<HashMap<String, String>> {
    let mut settings = HashMap::new();
    for line in buf.lines() {
        match classify(line)? {
            Classified::SectionMarker(SectionKind::HeaderEnd) => break,
            Classified::SettingAssignment { key, value }
                if SETTINGS_TO_READ.contains(&key.as_str()) =>
            {
                settings.insert(key, value);
            }
            _ => {}
        }
    }
    Ok(settings)
}

/// Scales the flow-rate command of every bead inside one named path
/// section. A bead belongs to the section between its start marker and the
/// next extruders-off marker; the flow command to patch is the most recent
/// one seen when the bead's extruder-on marker occurs.
pub struct ScaleSectionFlow {
    section: SectionKind,
    multiplier: f64,
    label: &'static str,
}

impl ScaleSectionFlow {
    /// Build the pass from the settings table; `None` when the setting is
    /// absent or set to the no-scaling sentinel.
    pub fn from_settings(
        settings: &HashMap<String, String>,
        key: &str,
        section: SectionKind,
        label: &'static str,
        sink: &dyn DiagnosticsSink,
    ) -> Option<Self> {
        let value = settings.get(key)?;
        if value == NO_SCALING {
            sink.info(&format!(
                "value of 100 set for {label} extrusion, nothing to do"
            ));
            return None;
        }
        let Ok(percentage) = value.parse::<f64>() else {
            sink.warn(&format!(
                "unusable {label} extrusion setting {value:?}, skipping"
            ));
            return None;
        };
        let multiplier = percentage / 100.0;
        sink.info(&format!(
            "using multiplier {multiplier} for {label} extrusion"
        ));
        Some(Self {
            section,
            multiplier,
            label,
        })
    }
}

impl Pass for ScaleSectionFlow {
    fn name(&self) -> &'static str {
        "scale-section-flow"
    }

    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        // most recent flow command: index and its value as first seen, so
        // repeated bead markers in one section do not compound the scaling
        let mut last_flow: Option<(usize, f64)> = None;
        let mut in_section = false;

        while let Some(line) = buf.current() {
            match classify(line)? {
                Classified::FlowRate { rate } => {
                    last_flow = Some((buf.cursor(), rate));
                }
                Classified::SectionMarker(kind) if kind == self.section => {
                    in_section = true;
                }
                Classified::SectionMarker(SectionKind::BeadStart) if in_section => {
                    if let Some((index, rate)) = last_flow {
                        let patched = format!("M108 S{:.1}", rate * self.multiplier);
                        sink.debug(&format!(
                            "scaling {} flow at line {index}: {patched}",
                            self.label
                        ));
                        buf.replace(index, Line::new(patched));
                    }
                }
                Classified::SectionMarker(SectionKind::BeadEnd) => {
                    in_section = false;
                }
                _ => {}
            }
            buf.advance();
        }
        Ok(())
    }
}
