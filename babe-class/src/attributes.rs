//! Attribute parsing (JVMS §4.7).
//!
//! Grounded on `exo-class-file/src/item/attribute_info/mod.rs`'s
//! `AttributesCollection`/name-dispatch pattern, trimmed down to the handful
//! of attributes this interpreter actually consults at run time: `Code` (with
//! its nested `LineNumberTable` and `LocalVariableTable`, for stack traces
//! and debugging only), `ConstantValue`, `Exceptions`, `SourceFile`,
//! `Signature`, and `SourceDebugExtension`. Every other attribute — the
//! teacher parses the full annotation and type-annotation grammar here,
//! which nothing in a minimal interpreter ever reads — is kept as a raw byte
//! blob under its name, per JVMS §4.7.1: "A Java Virtual Machine
//! implementation is required to silently ignore any or all attributes in
//! the attributes table that it does not recognize."

use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::constant_pool::ConstantPool;
use crate::error::Result;
use crate::opcode::Instructions;
use crate::stream::{ClassFileItem, ClassFileStream};

mod names {
    pub const CONSTANT_VALUE: &str = "ConstantValue";
    pub const CODE: &str = "Code";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const SIGNATURE: &str = "Signature";
    pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const DEPRECATED: &str = "Deprecated";
    pub const SYNTHETIC: &str = "Synthetic";
}

#[derive(Debug, Clone)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero means "catch everything" (used by `finally` blocks).
    pub catch_type: u16,
}

impl ClassFileItem for ExceptionTableEntry {
    fn read_from_stream<R: Read>(
        s: &mut ClassFileStream<R>,
        _cp: Option<&ConstantPool>,
    ) -> Result<Self> {
        Ok(Self {
            start_pc: s.read_u2()?,
            end_pc: s.read_u2()?,
            handler_pc: s.read_u2()?,
            catch_type: s.read_u2()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl ClassFileItem for LineNumberTableEntry {
    fn read_from_stream<R: Read>(
        s: &mut ClassFileStream<R>,
        _cp: Option<&ConstantPool>,
    ) -> Result<Self> {
        Ok(Self {
            start_pc: s.read_u2()?,
            line_number: s.read_u2()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LocalVariableTableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

impl ClassFileItem for LocalVariableTableEntry {
    fn read_from_stream<R: Read>(
        s: &mut ClassFileStream<R>,
        _cp: Option<&ConstantPool>,
    ) -> Result<Self> {
        Ok(Self {
            start_pc: s.read_u2()?,
            length: s.read_u2()?,
            name_index: s.read_u2()?,
            descriptor_index: s.read_u2()?,
            index: s.read_u2()?,
        })
    }
}

/// The `Code` attribute's payload: a method's bytecode and the tables that
/// accompany it.
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Instructions,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_number_table: Vec<LineNumberTableEntry>,
    pub local_variable_table: Vec<LocalVariableTableEntry>,
}

/// A recognized attribute value. Anything not in this set is kept as an
/// opaque blob in `Attributes::other`.
#[derive(Debug, Clone)]
enum Attribute {
    ConstantValue { index: u16 },
    Code(CodeAttribute),
    Exceptions { exception_index_table: Vec<u16> },
    SourceFile { sourcefile_index: u16 },
    Signature { signature_index: u16 },
    SourceDebugExtension { debug_extension: Vec<u8> },
    LineNumberTable(Vec<LineNumberTableEntry>),
    LocalVariableTable(Vec<LocalVariableTableEntry>),
    Deprecated,
    Synthetic,
}

/// The attribute table of a `ClassFile`, `field_info`, `method_info`, or
/// `Code` attribute. Recognized attributes are parsed eagerly; everything
/// else is stashed as raw bytes, retrievable by name.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    recognized: Vec<Attribute>,
    other: HashMap<String, Vec<u8>>,
}

impl Attributes {
    pub fn code(&self) -> Option<&CodeAttribute> {
        self.recognized.iter().find_map(|a| match a {
            Attribute::Code(c) => Some(c),
            _ => None,
        })
    }

    pub fn constant_value_index(&self) -> Option<u16> {
        self.recognized.iter().find_map(|a| match a {
            Attribute::ConstantValue { index } => Some(*index),
            _ => None,
        })
    }

    pub fn checked_exceptions(&self) -> &[u16] {
        self.recognized
            .iter()
            .find_map(|a| match a {
                Attribute::Exceptions { exception_index_table } => {
                    Some(exception_index_table.as_slice())
                }
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn source_file_index(&self) -> Option<u16> {
        self.recognized.iter().find_map(|a| match a {
            Attribute::SourceFile { sourcefile_index } => Some(*sourcefile_index),
            _ => None,
        })
    }

    pub fn signature_index(&self) -> Option<u16> {
        self.recognized.iter().find_map(|a| match a {
            Attribute::Signature { signature_index } => Some(*signature_index),
            _ => None,
        })
    }

    pub fn is_deprecated(&self) -> bool {
        self.recognized.iter().any(|a| matches!(a, Attribute::Deprecated))
    }

    pub fn is_synthetic(&self) -> bool {
        self.recognized.iter().any(|a| matches!(a, Attribute::Synthetic))
    }

    pub fn raw(&self, name: &str) -> Option<&[u8]> {
        self.other.get(name).map(|v| v.as_slice())
    }

    fn line_number_table(&self) -> Vec<LineNumberTableEntry> {
        self.recognized
            .iter()
            .filter_map(|a| match a {
                Attribute::LineNumberTable(v) => Some(v.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn local_variable_table(&self) -> Vec<LocalVariableTableEntry> {
        self.recognized
            .iter()
            .filter_map(|a| match a {
                Attribute::LocalVariableTable(v) => Some(v.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl ClassFileItem for Attributes {
    fn read_from_stream<R: Read>(s: &mut ClassFileStream<R>, cp: Option<&ConstantPool>) -> Result<Self> {
        let cp = cp.expect("constant pool must be available before attributes are read");
        let count = s.read_u2()?;
        let mut attrs = Attributes::default();
        for _ in 0..count {
            let name_index = s.read_u2()?;
            let length = s.read_u4()?;
            let body = s.read_dynamic(length as usize)?;
            let name = cp.get_utf8(name_index)?.to_string();

            let mut cursor = Cursor::new(&body);
            let mut inner = ClassFileStream::new(&mut cursor);

            let recognized = match name.as_str() {
                names::CONSTANT_VALUE => Some(Attribute::ConstantValue {
                    index: inner.read_u2()?,
                }),
                names::CODE => {
                    let max_stack = inner.read_u2()?;
                    let max_locals = inner.read_u2()?;
                    let code_length = inner.read_u4()?;
                    let code_bytes = inner.read_dynamic(code_length as usize)?;
                    let exc_count = inner.read_u2()?;
                    let exception_table =
                        inner.read_sequence::<ExceptionTableEntry>(Some(cp), exc_count as usize)?;
                    let nested = Attributes::read_from_stream(&mut inner, Some(cp))?;

                    let mut code_cursor = Cursor::new(&code_bytes);
                    let mut code_stream = ClassFileStream::new(&mut code_cursor);
                    let code = Instructions::read_from_stream(&mut code_stream, Some(cp))?;

                    Some(Attribute::Code(CodeAttribute {
                        max_stack,
                        max_locals,
                        code,
                        exception_table,
                        line_number_table: nested.line_number_table(),
                        local_variable_table: nested.local_variable_table(),
                    }))
                }
                names::LINE_NUMBER_TABLE => {
                    let n = inner.read_u2()?;
                    Some(Attribute::LineNumberTable(
                        inner.read_sequence::<LineNumberTableEntry>(Some(cp), n as usize)?,
                    ))
                }
                names::LOCAL_VARIABLE_TABLE => {
                    let n = inner.read_u2()?;
                    Some(Attribute::LocalVariableTable(
                        inner.read_sequence::<LocalVariableTableEntry>(Some(cp), n as usize)?,
                    ))
                }
                names::EXCEPTIONS => {
                    let n = inner.read_u2()?;
                    Some(Attribute::Exceptions {
                        exception_index_table: inner.read_sequence::<u16>(Some(cp), n as usize)?,
                    })
                }
                names::SOURCE_FILE => Some(Attribute::SourceFile {
                    sourcefile_index: inner.read_u2()?,
                }),
                names::SIGNATURE => Some(Attribute::Signature {
                    signature_index: inner.read_u2()?,
                }),
                names::SOURCE_DEBUG_EXTENSION => Some(Attribute::SourceDebugExtension {
                    debug_extension: body.clone(),
                }),
                names::DEPRECATED => Some(Attribute::Deprecated),
                names::SYNTHETIC => Some(Attribute::Synthetic),
                _ => None,
            };

            match recognized {
                Some(a) => attrs.recognized.push(a),
                None => {
                    attrs.other.insert(name, body);
                }
            }
        }
        Ok(attrs)
    }
}
