use serde::{Deserialize, Serialize};
use std::fmt;

/// Token program family owning a token account.
///
/// Both families share the associated token account derivation scheme but
/// live under different program ids, so the same owner and mint derive
/// different addresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenProgram {
    /// The original SPL Token program.
    #[default]
    Token,
    /// The Token-2022 (token extensions) program.
    Token2022,
}

impl fmt::Display for TokenProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenProgram::Token => write!(f, "token"),
            TokenProgram::Token2022 => write!(f, "token-2022"),
        }
    }
}
