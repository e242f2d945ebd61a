//! Method declarations (JVMS §4.6).
//!
//! No teacher counterpart exists for this one: `exo-class-file/src/item/
//! mod.rs` declares `pub mod methods;` but the file was never checked in, so
//! the teacher itself doesn't build. Written fresh, mirroring the sibling
//! `fields.rs` (same `{access_flags, name_index, descriptor_index,
//! attributes}` shape, per JVMS §4.5/§4.6 sharing that layout) with the
//! method-specific access flags from JVMS Table 4.6-A.

use std::io::Read;

use crate::attributes::Attributes;
use crate::constant_pool::ConstantPool;
use crate::descriptor::MethodDescriptor;
use crate::error::{ClassFileError, Result};
use crate::stream::{ClassFileItem, ClassFileStream};

bitflags::bitflags! {
    pub struct MethodAccessFlags: u16 {
        const ACC_PUBLIC = 0x0001;
        const ACC_PRIVATE = 0x0002;
        const ACC_PROTECTED = 0x0004;
        const ACC_STATIC = 0x0008;
        const ACC_FINAL = 0x0010;
        const ACC_SYNCHRONIZED = 0x0020;
        const ACC_BRIDGE = 0x0040;
        const ACC_VARARGS = 0x0080;
        const ACC_NATIVE = 0x0100;
        const ACC_ABSTRACT = 0x0400;
        const ACC_STRICT = 0x0800;
        const ACC_SYNTHETIC = 0x1000;
    }
}

#[derive(Debug)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Attributes,
}

impl MethodInfo {
    pub fn name<'a>(&self, cp: &'a ConstantPool) -> Result<&'a str> {
        cp.get_utf8(self.name_index)
    }

    pub fn descriptor(&self, cp: &ConstantPool) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(cp.get_utf8(self.descriptor_index)?)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ACC_STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ACC_NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ACC_ABSTRACT)
    }

    pub fn is_constructor(&self, cp: &ConstantPool) -> Result<bool> {
        Ok(self.name(cp)? == "<init>")
    }
}

impl ClassFileItem for MethodInfo {
    fn read_from_stream<R: Read>(s: &mut ClassFileStream<R>, cp: Option<&ConstantPool>) -> Result<Self> {
        let access_flags =
            MethodAccessFlags::from_bits(s.read_u2()?).ok_or(ClassFileError::BadMethodAccessFlags)?;
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
