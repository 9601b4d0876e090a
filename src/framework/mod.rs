//! Cycle-based simulation of a bit-packed circuit.
//!
//! A tick runs every gate family once, in wiring order. Reads marked
//! [`Phase::Current`](crate::wiring::Phase) see values produced earlier in
//! the same tick, reads marked `Previous` see the state committed by the last
//! clock edge. The [`Dut`] wraps this with the testbench protocol: inputs are
//! poked, combinational results are computed lazily on peek, and `step`
//! commits ticks.
mod dut;
mod propagate;

pub use dut::Dut;
pub use propagate::{tick, Propagator};

use crate::{
    error::SimError,
    utils::{bit_of, live_mask},
    wiring::Circuit,
};

/// One word per gate family, in the circuit's family order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    pub(crate) words: Vec<u64>,
}

impl CircuitState {
    pub fn zeroed(circuit: &Circuit) -> Self {
        Self {
            words: vec![0; circuit.families().len()],
        }
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Word of the family at `index`.
    pub fn word(&self, index: usize) -> u64 {
        self.words[index]
    }

    pub(crate) fn clear(&mut self) {
        self.words.fill(0);
    }
}

/// The driver facing protocol of a device under test.
///
/// Signal names are matched exactly. Failed calls change nothing.
pub trait Testbench {
    /// Zero every input, state word and cached output.
    fn reset(&mut self);

    /// Drive an input. The value is truncated to the input width.
    fn poke(&mut self, name: &str, value: u64) -> Result<(), SimError>;

    /// Read an input, an output or the word of a gate family.
    ///
    /// Outputs and families reflect the pending combinational result when
    /// one is available, so a peek after a poke sees the new inputs without
    /// advancing the clock.
    fn peek(&mut self, name: &str) -> Result<u64, SimError>;

    /// Read a signal as it was before the last clock edge.
    ///
    /// Families give the word committed by the edge before the last one,
    /// outputs are assembled from that state. Inputs do not change across an
    /// edge and read as [`peek`](Testbench::peek) does. Before the first
    /// step this is the reset state.
    fn peek_previous(&mut self, name: &str) -> Result<u64, SimError>;

    /// Bit `bit` of a signal, 0 or 1.
    fn peek_bit(&mut self, name: &str, bit: u32) -> Result<u64, SimError> {
        let mask = bit_range(bit, bit)?;
        Ok(bit_of(self.peek(name)? & mask, bit))
    }

    /// Bits `lo..=hi` of a signal, shifted down to bit 0.
    fn peek_bits(&mut self, name: &str, lo: u32, hi: u32) -> Result<u64, SimError> {
        let mask = bit_range(lo, hi)?;
        Ok((self.peek(name)? & mask) >> lo)
    }

    /// Replace bits `lo..=hi` of an input, keeping the others.
    fn poke_bits(&mut self, name: &str, lo: u32, hi: u32, value: u64) -> Result<(), SimError> {
        let mask = bit_range(lo, hi)?;
        let old = self.peek(name)?;
        self.poke(name, (old & !mask) | ((value << lo) & mask))
    }

    /// Recompute the combinational result from the committed state and the
    /// current inputs.
    fn eval(&mut self);

    /// Advance the clock `cycles` times. Non-positive counts only make sure
    /// the outputs are up to date.
    fn step(&mut self, cycles: i64);

    /// Waveform output is not available.
    fn dump_vcd(&mut self, destination: &str) -> Result<(), SimError>;

    fn circuit(&self) -> &Circuit;

    /// Number of clock edges since construction or the last reset.
    fn cycle_count(&self) -> u64;
}

/// Mask of bits `lo..=hi`.
fn bit_range(lo: u32, hi: u32) -> Result<u64, SimError> {
    if lo > hi || hi >= u64::BITS {
        return Err(SimError::InvalidRange { lo, hi });
    }
    Ok(live_mask(hi - lo + 1) << lo)
}
