//! History service — the stroke log and the shared redo stack.
//!
//! DESIGN
//! ======
//! The stroke log is append-only in commit order and is the replay order
//! for every client. Undo moves the log tail onto the redo stack, redo moves
//! it back. Any new commit empties the redo stack, so history stays strictly
//! linear: after `commit; undo; commit` the undone stroke is gone for good.
//!
//! Undo and redo are global. They act on the newest stroke regardless of
//! which participant drew it.
//!
//! ERROR HANDLING
//! ==============
//! Strokes are validated before they touch the log. A rejected stroke leaves
//! both stacks untouched. Undo/redo on an empty source are no-ops, reported
//! as `None` rather than as errors.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::CanvasLimits;

// =============================================================================
// TYPES
// =============================================================================

/// A canvas-local coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One completed drawing gesture. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StrokeError {
    #[error("stroke needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("stroke has {count} points, limit is {limit}")]
    TooManyPoints { count: usize, limit: usize },
    #[error("stroke point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),
    #[error("stroke width must be a positive number, got {0}")]
    InvalidWidth(f64),
}

impl crate::frame::ErrorCode for StrokeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::TooFewPoints(_) => "E_STROKE_TOO_SHORT",
            Self::TooManyPoints { .. } => "E_STROKE_TOO_LONG",
            Self::NonFinitePoint(_) => "E_STROKE_NON_FINITE",
            Self::InvalidWidth(_) => "E_STROKE_WIDTH",
        }
    }
}

impl Stroke {
    /// Check the stroke is drawable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: point count, a non-finite coordinate,
    /// or a width that is not a positive finite number.
    pub fn validate(&self, max_points: usize) -> Result<(), StrokeError> {
        let count = self.points.len();
        if count < 2 {
            return Err(StrokeError::TooFewPoints(count));
        }
        if count > max_points {
            return Err(StrokeError::TooManyPoints { count, limit: max_points });
        }
        if let Some(index) = self.points.iter().position(|p| !p.is_finite()) {
            return Err(StrokeError::NonFinitePoint(index));
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err(StrokeError::InvalidWidth(self.width));
        }
        Ok(())
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// Stroke log plus redo stack. Not synchronized on its own; the coordinator
/// owns the lock around it.
#[derive(Debug, Default)]
pub struct History {
    /// Committed strokes, oldest first.
    strokes: VecDeque<Stroke>,
    /// Undone strokes, most recently undone last.
    redo: Vec<Stroke>,
    limits: CanvasLimits,
}

impl History {
    #[must_use]
    pub fn new(limits: CanvasLimits) -> Self {
        Self { strokes: VecDeque::new(), redo: Vec::new(), limits }
    }

    /// Append a validated stroke and discard the redo branch.
    /// Returns how many of the oldest strokes the history limit evicted.
    ///
    /// # Errors
    ///
    /// Returns a `StrokeError` for malformed input; the history is unchanged.
    pub fn commit(&mut self, stroke: Stroke) -> Result<usize, StrokeError> {
        stroke.validate(self.limits.max_stroke_points)?;
        self.strokes.push_back(stroke);
        self.redo.clear();

        let Some(limit) = self.limits.history_limit else {
            return Ok(0);
        };
        let evicted = self.strokes.len().saturating_sub(limit);
        self.strokes.drain(..evicted);
        Ok(evicted)
    }

    /// Move the newest stroke onto the redo stack.
    /// Returns the resulting log, or `None` if there was nothing to undo.
    pub fn undo(&mut self) -> Option<Vec<Stroke>> {
        let stroke = self.strokes.pop_back()?;
        self.redo.push(stroke);
        Some(self.snapshot())
    }

    /// Move the most recently undone stroke back onto the log.
    /// Returns the resulting log, or `None` if there was nothing to redo.
    pub fn redo(&mut self) -> Option<Vec<Stroke>> {
        let stroke = self.redo.pop()?;
        self.strokes.push_back(stroke);
        Some(self.snapshot())
    }

    /// Empty both the log and the redo stack.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.redo.clear();
    }

    /// Copy of the log in replay order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Stroke> {
        self.strokes.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
