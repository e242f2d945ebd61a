//! Field declarations (JVMS §4.5).
//!
//! Grounded directly on `exo-class-file/src/item/fields/mod.rs` — the
//! teacher's `FieldInfo`/`FieldAccessFlags` shape carries over almost
//! unchanged, since field_info is one of the simplest structures in the
//! format.

use std::io::Read;

use crate::attributes::Attributes;
use crate::constant_pool::ConstantPool;
use crate::error::{ClassFileError, Result};
use crate::stream::{ClassFileItem, ClassFileStream};

bitflags::bitflags! {
    pub struct FieldAccessFlags: u16 {
        const ACC_PUBLIC = 0x0001;
        const ACC_PRIVATE = 0x0002;
        const ACC_PROTECTED = 0x0004;
        const ACC_STATIC = 0x0008;
        const ACC_FINAL = 0x0010;
        const ACC_VOLATILE = 0x0040;
        const ACC_TRANSIENT = 0x0080;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_ENUM = 0x4000;
    }
}

#[derive(Debug)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}

impl FieldInfo {
    pub fn name<'a>(&self, cp: &'a ConstantPool) -> Result<&'a str> {
        cp.get_utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, cp: &'a ConstantPool) -> Result<&'a str> {
        cp.get_utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::ACC_STATIC)
    }
}

impl ClassFileItem for FieldInfo {
    fn read_from_stream<R: Read>(s: &mut ClassFileStream<R>, cp: Option<&ConstantPool>) -> Result<Self> {
        let access_flags =
            FieldAccessFlags::from_bits(s.read_u2()?).ok_or(ClassFileError::BadFieldAccessFlags)?;
        let name_index = s.read_u2()?;
        let descriptor_index = s.read_u2()?;
        let attributes = Attributes::read_from_stream(s, cp)?;

        Ok(Self {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}
