//! Binary `.class` file parser.
//!
//! Reads the standard JVMS `ClassFile` format into an in-memory structure.
//! This crate knows nothing about VM semantics: no loading, linking,
//! resolution, or execution lives here. It only turns bytes into a typed
//! tree and back out as readable descriptors and opcodes.

pub mod attributes;
pub mod class_file;
pub mod constant_pool;
pub mod descriptor;
pub mod error;
pub mod fields;
pub mod methods;
pub mod opcode;
pub mod stream;

pub use class_file::{ClassAccessFlags, ClassFile, CLASS_MAGIC};
pub use constant_pool::{ConstantPool, ConstantPoolEntry, RefKind};
pub use error::{ClassFileError, Result};
pub use stream::{ClassFileItem, ClassFileStream};
