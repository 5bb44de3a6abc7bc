//! Dialect detection and per-dialect rewrite pipelines.
//!
//! Each supported slicer maps to an ordered pass list over the shared
//! line buffer; the passes themselves are configuration (flow-scale
//! constant, header marker, deny-list). The dialect is picked from the
//! first line of the file and nothing else.

pub mod cura;
pub mod kisslicer;
pub mod passes;

use crate::buffer::LineBuffer;
use crate::classify::SectionKind;
use crate::diagnostics::DiagnosticsSink;
use crate::error::Result;

use cura::FirstLayerTemperature;
use kisslicer::{INFILL_SETTING_KEY, SOLID_SETTING_KEY, ScaleSectionFlow, read_settings};
use passes::{
    NormalizeMotion, Pass, ReconstructExtrusion, RelocateHeaderTemperature, RemoveDeniedCommands,
    RenameFanCommands, StripHeader, TemperatureInterlock,
};

/// Flow scale for the Makerbot-style dialects, tuned for an MK8 drive gear
const MAKERBOT_FLOW_SCALE: f64 = 0.365;

/// Commands the target firmware ignores; dropped from Simplify3D output
const SIMPLIFY3D_DENY_LIST: &[&str] = &["G90", "G92", "M82", "M84", "M105"];

/// The supported upstream slicers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Kisslicer,
    Cura,
    Slic3r,
    Simplify3d,
}

impl Dialect {
    /// Pick the dialect from the first line of raw input. Each slicer
    /// stamps a fixed literal prefix there; anything else is fatal.
    pub fn detect(first_line: &str) -> Option<Self> {
        if first_line.starts_with("; KISSlicer") {
            Some(Dialect::Kisslicer)
        } else if first_line.starts_with("; CURA") {
            Some(Dialect::Cura)
        } else if first_line.starts_with("; generated by Slic3r") {
            Some(Dialect::Slic3r)
        } else if first_line.starts_with("; G-Code generated by Simplify3D") {
            Some(Dialect::Simplify3d)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Kisslicer => "KISSlicer",
            Dialect::Cura => "Cura",
            Dialect::Slic3r => "Slic3r",
            Dialect::Simplify3d => "Simplify3D",
        }
    }

    /// Output extension override; `None` keeps the input's extension
    pub fn output_extension(&self) -> Option<&'static str> {
        match self {
            Dialect::Simplify3d => Some("bfb"),
            _ => None,
        }
    }

    /// Assemble the ordered pass list. The KISSlicer pipeline depends on
    /// the settings read from the header region, so assembly may inspect
    /// the (not yet modified) buffer.
    fn passes(&self, buf: &LineBuffer, sink: &dyn DiagnosticsSink) -> Result<Vec<Box<dyn Pass>>> {
        let passes: Vec<Box<dyn Pass>> = match self {
            Dialect::Slic3r => vec![
                Box::new(StripHeader {
                    marker: "^Firmware",
                }),
                Box::new(ReconstructExtrusion {
                    scale: MAKERBOT_FLOW_SCALE,
                    synthetic_reset: false,
                }),
                Box::new(NormalizeMotion),
                Box::new(RenameFanCommands),
                Box::new(TemperatureInterlock),
            ],
            Dialect::Simplify3d => vec![
                Box::new(RelocateHeaderTemperature),
                Box::new(ReconstructExtrusion {
                    scale: MAKERBOT_FLOW_SCALE,
                    synthetic_reset: true,
                }),
                Box::new(NormalizeMotion),
                Box::new(RenameFanCommands),
                Box::new(TemperatureInterlock),
                Box::new(RemoveDeniedCommands {
                    deny: SIMPLIFY3D_DENY_LIST,
                }),
            ],
            Dialect::Cura => vec![Box::new(FirstLayerTemperature)],
            Dialect::Kisslicer => {
                let settings = read_settings(buf)?;
                let mut passes: Vec<Box<dyn Pass>> = Vec::new();
                if let Some(pass) = ScaleSectionFlow::from_settings(
                    &settings,
                    SOLID_SETTING_KEY,
                    SectionKind::SolidPath,
                    "solid",
                    sink,
                ) {
                    passes.push(Box::new(pass));
                }
                if let Some(pass) = ScaleSectionFlow::from_settings(
                    &settings,
                    INFILL_SETTING_KEY,
                    SectionKind::InfillPath,
                    "infill",
                    sink,
                ) {
                    passes.push(Box::new(pass));
                }
                passes
            }
        };
        Ok(passes)
    }

    /// Run every pass of this dialect's pipeline, in order, each as one
    /// full forward traversal of the buffer.
    pub fn process(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        for pass in self.passes(buf, sink)? {
            sink.debug(&format!("running pass: {}", pass.name()));
            buf.rewind();
            pass.run(buf, sink)?;
        }
        Ok(())
    }
}
