//! Built-in circuits.
//!
//! Names are a kind followed by a width, for example `adder4` or
//! `register16`.
mod adder;
mod register;

use anyhow::{bail, Context, Result};

pub use adder::ripple_adder;
pub use register::register;

use crate::wiring::{Phase, Wiring};

/// Names of the built-in circuits shown to users.
pub fn circuit_names() -> Vec<&'static str> {
    vec!["adder4", "adder16", "regadder16", "register16"]
}

/// Generate a built-in circuit by name.
pub fn create_wiring(name: &str) -> Result<Wiring> {
    let split = name
        .find(|c: char| c.is_ascii_digit())
        .with_context(|| format!("`{name}` has no width suffix"))?;
    let (kind, width) = name.split_at(split);
    let width: u32 = width
        .parse()
        .with_context(|| format!("invalid width in `{name}`"))?;
    match kind {
        "adder" => ripple_adder(width, Phase::Current),
        "regadder" => ripple_adder(width, Phase::Previous),
        "register" => register(width),
        _ => bail!("unknown built-in circuit `{name}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_names_build() -> Result<()> {
        for name in circuit_names() {
            let circuit = create_wiring(name)?.build()?;
            assert!(!circuit.families().is_empty(), "{name}");
        }
        Ok(())
    }

    #[test]
    fn bad_names() {
        assert!(create_wiring("adder").is_err());
        assert!(create_wiring("mux4").is_err());
        assert!(create_wiring("adder4x").is_err());
        assert!(create_wiring("adder0").is_err());
        assert!(create_wiring("register65").is_err());
    }
}
