//! Extrusion flow reconstruction.
//!
//! Upstream slicers encode flow implicitly: each extrude move advances the
//! head by some path length while pushing some filament length. The target
//! device instead wants one explicit `M108 S<rate>` per bead, emitted at
//! the point where extrusion begins. The reconstructor collects
//! (rate, speed) samples between an extruder-on event and whatever ends
//! the bead, then summarizes them as the arithmetic mean of the rates
//! scaled by the first sample's commanded speed and a per-dialect
//! constant.

use crate::buffer::{Line, LineBuffer};

/// Substitute rate when either delta is zero. Some slicers emit extrude
/// moves with no filament advance (suspected generator defect); downstream
/// output depends on this exact constant, so it is not "fixed" here.
pub const FALLBACK_FLOW_RATE: f64 = 0.005;

/// One reconstructed sample: instantaneous flow rate and the commanded
/// speed at the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSample {
    pub rate: f64,
    pub speed: f64,
}

#[derive(Debug)]
struct Span {
    start: usize,
    samples: Vec<FlowSample>,
}

/// Flow rate from the two independently sampled deltas of one move
pub fn feed_rate(path_len: f64, extrusion_len: f64) -> f64 {
    if path_len == 0.0 || extrusion_len == 0.0 {
        return FALLBACK_FLOW_RATE;
    }
    1.0 / (path_len / extrusion_len)
}

/// Stateful reconstructor driven by the extrusion pass.
///
/// Tracks the previous head position and filament reading across the whole
/// scan (plain moves and retracts keep them current even between beads),
/// plus the currently open span, if any.
#[derive(Debug)]
pub struct FlowReconstructor {
    scale: f64,
    prev_position: (f64, f64),
    prev_filament: f64,
    span: Option<Span>,
}

impl FlowReconstructor {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            prev_position: (0.0, 0.0),
            prev_filament: 0.0,
            span: None,
        }
    }

    pub fn span_open(&self) -> bool {
        self.span.is_some()
    }

    /// Open a span at the buffer's cursor. An already open span is closed
    /// first: two on-events without an off-event mean one bead ended and
    /// another began.
    pub fn begin_span(&mut self, buf: &mut LineBuffer) {
        self.close_span(buf);
        let start = buf.cursor();
        self.span = Some(Span {
            start,
            samples: Vec::new(),
        });
    }

    /// Open a span at an already-visited index (the Simplify3D synthetic
    /// span, anchored at the rewritten filament-reset line). Closing a
    /// previous span may insert a flow command before `index`; the
    /// corrected index is returned.
    pub fn begin_span_at(&mut self, mut index: usize, buf: &mut LineBuffer) -> usize {
        if let Some(open) = &self.span {
            let prev_start = open.start;
            if self.close_span(buf) && prev_start <= index {
                index += 1;
            }
        }
        self.span = Some(Span {
            start: index,
            samples: Vec::new(),
        });
        index
    }

    /// Record one extrude move into the open span and update the position
    /// and filament trackers. Must only be called while a span is open.
    pub fn sample(&mut self, position: (f64, f64), filament: f64, speed: f64) {
        debug_assert!(self.span.is_some(), "sample without an open span");
        let dx = self.prev_position.0 - position.0;
        let dy = self.prev_position.1 - position.1;
        let path_len = (dx * dx + dy * dy).sqrt();
        let extrusion_len = (self.prev_filament - filament).abs();
        let rate = feed_rate(path_len, extrusion_len);
        if let Some(span) = &mut self.span {
            span.samples.push(FlowSample { rate, speed });
        }
        self.prev_position = position;
        self.prev_filament = filament;
    }

    /// Update the head position without sampling (motion with the
    /// extruder off)
    pub fn track_position(&mut self, position: (f64, f64)) {
        self.prev_position = position;
    }

    /// Update the filament reading without sampling (retracts, resets)
    pub fn track_filament(&mut self, filament: f64) {
        self.prev_filament = filament;
    }

    /// Close the open span: with at least one sample, insert one
    /// `M108 S<rate>` at the span's start; with none, emit nothing.
    /// Returns whether a command was inserted. No-op without a span.
    pub fn close_span(&mut self, buf: &mut LineBuffer) -> bool {
        let Some(span) = self.span.take() else {
            return false;
        };
        if span.samples.is_empty() {
            return false;
        }
        let mean = span.samples.iter().map(|s| s.rate).sum::<f64>() / span.samples.len() as f64;
        let flow = mean * span.samples[0].speed * self.scale;
        buf.insert(span.start, Line::new(format!("M108 S{flow:.1}")));
        true
    }
}
