//! Deserialization errors.
//!
//! Grounded on `exo-class-file/src/error.rs`'s flat error enum, trimmed to
//! the attributes and constructs this parser actually recognizes: unrecognized
//! attributes are skipped by length rather than rejected, so there is nothing
//! to have a dedicated error variant for.

use std::string::FromUtf8Error;

/// An error which can occur while deserializing a class file.
#[derive(Debug, thiserror::Error)]
pub enum ClassFileError {
    #[error("i/o error reading class file: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic number: {0:#010x}")]
    BadMagicNumber(u32),

    #[error("unknown constant pool tag: {0}")]
    UnknownConstantPoolTag(u8),

    #[error("invalid modified utf-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("unknown method handle reference kind: {0}")]
    UnknownReferenceKind(u8),

    #[error("bad class access flags")]
    BadClassAccessFlags,

    #[error("bad field access flags")]
    BadFieldAccessFlags,

    #[error("bad method access flags")]
    BadMethodAccessFlags,

    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("opcode {0:#04x} is reserved and unsupported")]
    ReservedOpcode(u8),

    #[error("malformed field or method descriptor: {0:?}")]
    BadDescriptor(String),

    #[error("arithmetic overflow decoding a {0} table")]
    TableOverflow(&'static str),

    #[error("constant pool index {0} out of range")]
    BadConstantPoolIndex(u16),

    #[error("constant pool entry at index {0} has the wrong tag for this use")]
    WrongConstantPoolTag(u16),
}

pub type Result<T> = std::result::Result<T, ClassFileError>;
