//! Cura-specific rewriting.
//!
//! Cura output is already close to the target format; the only adjustment
//! is printing the first layer hotter for bed adhesion.

use crate::buffer::{Line, LineBuffer};
use crate::classify::{Classified, SectionKind, classify};
use crate::diagnostics::DiagnosticsSink;
use crate::error::Result;

use super::passes::Pass;

/// Degrees added to the configured temperature for the first layer
const FIRST_LAYER_OFFSET: i64 = 10;

/// Hard ceiling of the device; at or above it the offset is never applied
const MAX_TEMPERATURE: i64 = 280;

/// Raises the temperature-set value preceding the first layer marker by a
/// fixed offset and restores the original value at the point extrusion
/// next ends after a later layer boundary.
pub struct FirstLayerTemperature;

impl Pass for FirstLayerTemperature {
    fn name(&self) -> &'static str {
        "first-layer-temperature"
    }

    fn run(&self, buf: &mut LineBuffer, sink: &dyn DiagnosticsSink) -> Result<()> {
        let mut layer_nr = 0u32;
        // index and value of the most recent temperature-set command
        let mut temp: Option<(usize, i64)> = None;

        while let Some(line) = buf.current() {
            match classify(line)? {
                Classified::SectionMarker(SectionKind::LayerChange) => {
                    layer_nr += 1;
                    if layer_nr == 1 {
                        if let Some((index, value)) = temp {
                            let patched = format!("M104 S{}", value + FIRST_LAYER_OFFSET);
                            sink.info(&format!("patching first layer temperature: {patched}"));
                            buf.replace(index, Line::new(patched));
                        }
                    }
                }
                Classified::ExtruderTemperature { temperature } => {
                    let value = temperature as i64;
                    if value >= MAX_TEMPERATURE {
                        sink.info(&format!(
                            "temperature {value} at or above the {MAX_TEMPERATURE} ceiling, \
                             leaving first layer untouched"
                        ));
                        return Ok(());
                    }
                    temp = Some((buf.cursor(), value));
                }
                Classified::ExtruderOff if layer_nr > 1 => {
                    if let Some((_, value)) = temp {
                        let restore = format!("M104 S{value}");
                        sink.info(&format!("restoring temperature after first layer: {restore}"));
                        let after = buf.cursor() + 1;
                        buf.insert(after, Line::new(restore));
                    }
                    return Ok(());
                }
                _ => {}
            }
            buf.advance();
        }
        Ok(())
    }
}
