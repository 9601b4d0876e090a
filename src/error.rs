/// Errors reported by a [`crate::Testbench`].
///
/// A failed operation leaves the testbench state untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The name is neither an input, an output nor a gate family.
    UnknownSignal(String),
    /// The operation exists in the interface but is not implemented.
    Unsupported(&'static str),
    /// A bit range that is empty, wider than a word or past bit 63.
    InvalidRange { lo: u32, hi: u32 },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::UnknownSignal(name) => write!(f, "unknown signal `{name}`"),
            SimError::Unsupported(op) => write!(f, "{op} is not supported"),
            SimError::InvalidRange { lo, hi } => write!(f, "invalid bit range [{lo}..={hi}]"),
        }
    }
}

impl std::error::Error for SimError {}
