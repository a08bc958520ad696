//! Program loading.
//!
//! A [`Program`] is an instruction stream plus everything the VM needs from
//! outside it: class/struct schemas for the object opcodes, an optional cycle
//! budget and the register values a run is expected to leave behind.
//!
//! Two on-disk forms are supported:
//!
//! - [`manifest`] - TOML source with mnemonics, labels and schemas
//! - [`binary`] - `NVMW` container of raw float words
//!
//! [`Program::load`] picks the form by sniffing the file's first bytes.

pub mod binary;
pub mod manifest;
pub mod runner;

pub use binary::MAGIC;
pub use manifest::Manifest;
pub use runner::{check_expectations, ExpectationFailure, ProgramResult, ProgramRunner};

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::interpreter::state::Register;
use crate::interpreter::word::InstructionWord;
use crate::object::SchemaCatalog;

/// Errors from loading or assembling a program.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("instruction {index}: unknown operation '{name}'")]
    UnknownOperation { index: usize, name: String },

    #[error("{location}: unknown register '{name}'")]
    UnknownRegister { location: String, name: String },

    #[error("instruction {index}: {register} cannot be encoded as {field}")]
    UnencodableRegister {
        index: usize,
        register: Register,
        field: &'static str,
    },

    #[error("instruction {index}: unknown type '{name}'")]
    UnknownType { index: usize, name: String },

    #[error("instruction {index}: unknown label '{label}'")]
    UnknownLabel { index: usize, label: String },

    #[error("duplicate label '{label}' at instructions {first} and {second}")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },

    #[error("instruction {index}: both imm and target given")]
    ConflictingImmediate { index: usize },

    #[error("not a program container (magic {found:02X?})")]
    BadMagic { found: [u8; 4] },

    #[error("truncated program: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Register value a run must leave in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub thread: usize,
    pub register: Register,
    /// Compared after truncation to 32 bits, so -1 matches 0xFFFF_FFFF.
    pub value: i64,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}.{} == {}", self.thread, self.register, self.value)
    }
}

/// A loadable program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub name: Option<String>,
    pub words: Vec<InstructionWord>,
    pub catalog: SchemaCatalog,
    /// Cycle budget overriding the configured one.
    pub max_cycles: Option<u64>,
    pub expectations: Vec<Expectation>,
}

impl Program {
    /// Program with only an instruction stream.
    pub fn from_words(words: Vec<InstructionWord>) -> Self {
        Self {
            words,
            ..Self::default()
        }
    }

    /// Load a manifest or binary container from `path`.
    pub fn load(path: &Path) -> Result<Self, ProgramError> {
        let data = std::fs::read(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut program = if data.starts_with(MAGIC) {
            Self::from_words(binary::decode(&data)?)
        } else {
            let text = String::from_utf8_lossy(&data);
            Manifest::parse(&text)?.assemble()?
        };

        if program.name.is_none() {
            program.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        log::info!(
            "Loaded {} ({} words) from {}",
            program.display_name(),
            program.words.len(),
            path.display()
        );
        Ok(program)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
