use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Failures while turning a word stream into region contents.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {token:?} is not a 64-bit hex word")]
    MalformedWord { line: usize, token: String },

    /// The word at index `capacity` would land past the end of the region.
    #[error("more than {capacity} words; region would overrun")]
    OverrunedCapacity { capacity: usize },
}

/// Everything that can stop the harness before the pivot.
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("error mapping {region} region at {addr:#x}: {source}")]
    AllocationFailure {
        region: &'static str,
        addr: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to allocate {region} region at {requested:#x}, got {obtained:#x}")]
    AddressMismatch {
        region: &'static str,
        requested: usize,
        obtained: usize,
    },

    #[error("cannot open {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
}

impl HarnessError {
    /// Every detected failure before the pivot exits with 1.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::AllocationFailure { .. }
            | Self::AddressMismatch { .. }
            | Self::SourceUnavailable { .. }
            | Self::Load { .. } => ExitCode::from(1),
        }
    }
}

/// Failures while building a chain.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("unmatched '[' at instruction {index}")]
    UnmatchedOpen { index: usize },

    #[error("unmatched ']' at instruction {index}")]
    UnmatchedClose { index: usize },

    #[error("jump buffer targets {first:#x} and {second:#x} are not adjacent")]
    NonAdjacentTargets { first: u64, second: u64 },

    #[error("gadget slot left unresolved")]
    UnresolvedSlot,

    #[error("gadget has no frame location yet")]
    UnplacedGadget,

    #[error("expected {expected} gadget")]
    UnexpectedGadget { expected: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ChainError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(1)
    }
}
