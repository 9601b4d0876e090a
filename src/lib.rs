//! Bit-packed gate-level simulation.
//!
//! Gates of one type are packed into 64-bit words, one gate per lane, and a
//! whole family is updated by a single bitwise operation. See
//! [`wiring`] for how circuits are described and [`framework`] for how they
//! are run.
pub mod circuits;
pub mod debug;
mod error;
pub mod framework;
pub mod repl;
pub mod utils;
pub mod wiring;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

pub use error::SimError;
pub use framework::{CircuitState, Dut, Testbench};
pub use wiring::{Circuit, Wiring};

/// Build a circuit from a wiring file, or from a built-in name when no such
/// file exists.
pub fn load_circuit(name: &str) -> Result<Arc<Circuit>> {
    let wiring = if Path::new(name).is_file() {
        Wiring::load(name)?
    } else {
        circuits::create_wiring(name).with_context(|| {
            format!(
                "`{name}` is neither a file nor a built-in circuit ({})",
                circuits::circuit_names().join(", ")
            )
        })?
    };
    let circuit = wiring
        .build()
        .with_context(|| format!("invalid circuit `{}`", wiring.name))?;
    Ok(Arc::new(circuit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_builtin_and_file() -> Result<()> {
        let circuit = load_circuit("register8")?;
        assert_eq!(circuit.name(), "register8");
        assert!(load_circuit("nothing8").is_err());

        let file = tempfile::Builder::new().suffix(".wir").tempfile()?;
        std::fs::write(
            file.path(),
            "circuit Inv; input A; output Y; family n : NOT[1]; n.a <- A:0; Y <- n;",
        )?;
        let path = file.path().to_str().context("non utf-8 temp path")?;
        let mut dut = Dut::new(load_circuit(path)?);
        assert_eq!(dut.peek("Y")?, 1);
        Ok(())
    }

    #[test]
    fn dut_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Dut>();
    }
}
