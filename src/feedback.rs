//! Input/feedback state machine
//!
//! Local mirrors of encoder bars and grid toggles, and the LED commands each
//! input event produces. Every event costs at most two outbound commands,
//! whatever the size of the delta.

use tracing::{debug, trace};

use crate::osc::{DeviceCommand, InboundEvent};

/// Encoders (and rings) on an arc
pub const ENCODER_COUNT: usize = 4;
/// Highest LED position on a ring
pub const RING_MAX: i32 = 63;
/// Side length of the key grid
pub const GRID_SIZE: usize = 16;

pub const LEVEL_OFF: i32 = 0;
pub const LEVEL_DIM: i32 = 6;
pub const LEVEL_FULL: i32 = 15;

/// Delta ticks per ring LED
const TICKS_PER_LED: f64 = 8.0;

fn index(value: i32, len: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|i| *i < len)
}

/// Accumulated position of each encoder, clamped to `[0, RING_MAX]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderBars {
    positions: [f64; ENCODER_COUNT],
}

impl EncoderBars {
    /// Add `delta / 8` to an encoder, clamping after the step
    ///
    /// Returns the new breakpoint, or `None` for an unknown encoder.
    pub fn apply_delta(&mut self, encoder: i32, delta: i32) -> Option<i32> {
        let i = index(encoder, ENCODER_COUNT)?;
        let position = &mut self.positions[i];
        *position = (*position + f64::from(delta) / TICKS_PER_LED).clamp(0.0, f64::from(RING_MAX));
        Some(position.floor() as i32)
    }

    pub fn position(&self, encoder: i32) -> Option<f64> {
        index(encoder, ENCODER_COUNT).map(|i| self.positions[i])
    }

    pub fn breakpoint(&self, encoder: i32) -> Option<i32> {
        self.position(encoder).map(|p| p.floor() as i32)
    }
}

/// Toggle state of every grid key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyGrid {
    cells: [[bool; GRID_SIZE]; GRID_SIZE],
}

impl KeyGrid {
    /// Flip a cell, returning its new value
    pub fn toggle(&mut self, x: i32, y: i32) -> Option<bool> {
        let (x, y) = (index(x, GRID_SIZE)?, index(y, GRID_SIZE)?);
        let cell = &mut self.cells[x][y];
        *cell = !*cell;
        Some(*cell)
    }

    pub fn is_lit(&self, x: i32, y: i32) -> Option<bool> {
        let (x, y) = (index(x, GRID_SIZE)?, index(y, GRID_SIZE)?);
        Some(self.cells[x][y])
    }
}

/// Per-cycle feedback state
#[derive(Debug, Clone, Default)]
pub struct FeedbackState {
    bars: EncoderBars,
    keys: KeyGrid,
}

impl FeedbackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bars(&self) -> &EncoderBars {
        &self.bars
    }

    pub fn keys(&self) -> &KeyGrid {
        &self.keys
    }

    /// Update local state for a device event and return the LED commands to send
    pub fn on_event(&mut self, event: &InboundEvent) -> Vec<DeviceCommand> {
        match *event {
            InboundEvent::EncoderDelta { encoder, delta } => self.encoder_delta(encoder, delta),
            InboundEvent::GridKey { x, y, pressed } => self.grid_key(x, y, pressed),
            // Hooks for a concrete application; no default feedback
            InboundEvent::EncoderKey { .. } | InboundEvent::Tilt { .. } => {
                trace!("No feedback for {}", event);
                Vec::new()
            }
            InboundEvent::DeviceInfo(_)
            | InboundEvent::DeviceAdded(_)
            | InboundEvent::DeviceRemoved { .. } => Vec::new(),
        }
    }

    /// Bar graph: ring lit from 0 to the breakpoint, dark above it
    fn encoder_delta(&mut self, encoder: i32, delta: i32) -> Vec<DeviceCommand> {
        let Some(breakpoint) = self.bars.apply_delta(encoder, delta) else {
            debug!("Delta for unknown encoder {}", encoder);
            return Vec::new();
        };

        let mut commands = vec![DeviceCommand::RingRange {
            ring: encoder,
            from: 0,
            to: breakpoint,
            level: LEVEL_FULL,
        }];
        if breakpoint < RING_MAX {
            commands.push(DeviceCommand::RingRange {
                ring: encoder,
                from: breakpoint + 1,
                to: RING_MAX,
                level: LEVEL_OFF,
            });
        }
        commands
    }

    /// Down edge flips the cell and flashes it; up edge shows the toggled value
    fn grid_key(&mut self, x: i32, y: i32, pressed: bool) -> Vec<DeviceCommand> {
        let level = if pressed {
            if self.keys.toggle(x, y).is_none() {
                debug!("Key ({},{}) outside grid", x, y);
                return Vec::new();
            }
            LEVEL_FULL
        } else {
            match self.keys.is_lit(x, y) {
                Some(true) => LEVEL_DIM,
                Some(false) => LEVEL_OFF,
                None => {
                    debug!("Key ({},{}) outside grid", x, y);
                    return Vec::new();
                }
            }
        };

        vec![DeviceCommand::GridLedSet { x, y, level }]
    }
}
