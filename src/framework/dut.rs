use std::sync::Arc;

use super::{
    propagate::{output_word, output_words},
    tick, CircuitState, Testbench,
};
use crate::{
    error::SimError,
    utils::live_mask,
    wiring::{Circuit, SignalId},
};

/// Device under test: one simulation context over a shared circuit.
///
/// - `current`: state committed by the last clock edge, changed only by
///   [`Testbench::step`].
/// - `pending`: one tick of combinational logic on top of `current` with the
///   present inputs. Computed lazily and dropped whenever an input changes.
/// - `previous`: what `current` was before the last clock edge.
///
/// Outputs are cached; they belong to `pending` after an evaluation and to
/// `current` after a step.
pub struct Dut {
    pub(crate) circuit: Arc<Circuit>,
    pub(crate) current: CircuitState,
    pub(crate) pending: CircuitState,
    pub(crate) previous: CircuitState,
    pub(crate) inputs: Vec<u64>,
    pub(crate) outputs: Vec<u64>,
    pub(crate) pending_valid: bool,
    pub(crate) outputs_valid: bool,
    pub(crate) cycle_count: u64,
}

impl Dut {
    pub fn new(circuit: Arc<Circuit>) -> Self {
        let state = CircuitState::zeroed(&circuit);
        Self {
            current: state.clone(),
            previous: state.clone(),
            pending: state,
            inputs: vec![0; circuit.inputs().len()],
            outputs: vec![0; circuit.outputs().len()],
            pending_valid: false,
            outputs_valid: false,
            cycle_count: 0,
            circuit,
        }
    }

    /// State committed by the last clock edge.
    pub fn current_state(&self) -> &CircuitState {
        &self.current
    }

    /// Like [`Testbench::peek`], but report unknown names through the log
    /// and read them as zero.
    pub fn peek_or_zero(&mut self, name: &str) -> u64 {
        match self.peek(name) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{err}");
                0
            }
        }
    }

    fn compute_pending(&mut self) {
        self.pending = tick(&self.circuit, &self.current, &self.inputs);
        output_words(&self.circuit, &self.pending, &self.inputs, &mut self.outputs);
        self.pending_valid = true;
        self.outputs_valid = true;
    }

    fn ensure_outputs(&mut self) {
        if !self.outputs_valid {
            self.compute_pending();
        }
    }

    /// The state peeks observe.
    fn visible_state(&self) -> &CircuitState {
        if self.pending_valid {
            &self.pending
        } else {
            &self.current
        }
    }
}

impl Testbench for Dut {
    fn reset(&mut self) {
        self.current.clear();
        self.pending.clear();
        self.previous.clear();
        self.inputs.fill(0);
        self.outputs.fill(0);
        self.pending_valid = false;
        self.outputs_valid = false;
        self.cycle_count = 0;
        tracing::debug!(circuit = %self.circuit.name(), "reset");
    }

    fn poke(&mut self, name: &str, value: u64) -> Result<(), SimError> {
        match self.circuit.lookup(name) {
            Some(SignalId::Input(index)) => {
                let width = self.circuit.inputs()[index].width;
                let value = value & live_mask(width);
                tracing::debug!(input = name, value, "poke");
                self.inputs[index] = value;
                self.pending_valid = false;
                self.outputs_valid = false;
                Ok(())
            }
            _ => {
                tracing::error!(signal = name, "poke of unknown input");
                Err(SimError::UnknownSignal(name.to_string()))
            }
        }
    }

    fn peek(&mut self, name: &str) -> Result<u64, SimError> {
        match self.circuit.lookup(name) {
            Some(SignalId::Input(index)) => Ok(self.inputs[index]),
            Some(SignalId::Output(index)) => {
                self.ensure_outputs();
                Ok(self.outputs[index])
            }
            Some(SignalId::Family(index)) => {
                self.ensure_outputs();
                Ok(self.visible_state().word(index))
            }
            None => Err(SimError::UnknownSignal(name.to_string())),
        }
    }

    fn peek_previous(&mut self, name: &str) -> Result<u64, SimError> {
        match self.circuit.lookup(name) {
            Some(SignalId::Input(index)) => Ok(self.inputs[index]),
            Some(SignalId::Output(index)) => Ok(output_word(
                &self.circuit.outputs()[index],
                &self.previous,
                &self.inputs,
            )),
            Some(SignalId::Family(index)) => Ok(self.previous.word(index)),
            None => Err(SimError::UnknownSignal(name.to_string())),
        }
    }

    fn eval(&mut self) {
        self.compute_pending();
    }

    fn step(&mut self, cycles: i64) {
        if cycles <= 0 {
            self.ensure_outputs();
            return;
        }
        for _ in 0..cycles {
            let next = tick(&self.circuit, &self.current, &self.inputs);
            self.previous = std::mem::replace(&mut self.current, next);
            self.cycle_count += 1;
        }
        self.pending_valid = false;
        output_words(&self.circuit, &self.current, &self.inputs, &mut self.outputs);
        self.outputs_valid = true;
        tracing::debug!(cycles, total = self.cycle_count, "step");
    }

    fn dump_vcd(&mut self, destination: &str) -> Result<(), SimError> {
        tracing::warn!(destination, "waveform dump requested");
        Err(SimError::Unsupported("dump_vcd"))
    }

    fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    fn cycle_count(&self) -> u64 {
        self.cycle_count
    }
}
