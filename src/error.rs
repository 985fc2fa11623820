use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed netlist `{circuit}`: {reason}")]
    MalformedNetlist { circuit: String, reason: String },

    #[error("combinational cycle in `{circuit}`: {}", wires.join(" -> "))]
    CombinationalCycle { circuit: String, wires: Vec<String> },

    #[error("oracle and locked circuit do not match: {0}")]
    CircuitMismatch(String),

    #[error("oracle has no consistent behavior for the queried sequence (frame {frame})")]
    OracleInconsistency { frame: usize },

    #[error("key constraints became unsatisfiable after the search finished")]
    KeySolverUnsat,

    #[error("repeated dip where neither key copy disagrees with the oracle")]
    UnresolvedSpuriousDip,

    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("attack worker failed: {0}")]
    Supervisor(String),
}

impl Error {
    pub(crate) fn malformed(circuit: &str, reason: impl Into<String>) -> Self {
        Error::MalformedNetlist {
            circuit: circuit.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
