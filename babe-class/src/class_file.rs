//! The top-level `ClassFile` structure (JVMS §4.1).
//!
//! Grounded on `exo-class-file/src/item/file.rs`: same field shape, same
//! `ClassAccessFlags` bitflags, same magic-number check. The teacher's two
//! debug `println!`s for the version numbers are dropped — logging belongs
//! to the VM that loads the class, not the parser that reads its bytes.

use std::io::Read;

use crate::attributes::Attributes;
use crate::constant_pool::ConstantPool;
use crate::error::{ClassFileError, Result};
use crate::fields::FieldInfo;
use crate::methods::MethodInfo;
use crate::stream::{ClassFileItem, ClassFileStream};

pub const CLASS_MAGIC: u32 = 0xCAFEBABE;

bitflags::bitflags! {
    pub struct ClassAccessFlags: u16 {
        const ACC_PUBLIC = 0x0001;
        const ACC_FINAL = 0x0010;
        const ACC_SUPER = 0x0020;
        const ACC_INTERFACE = 0x0200;
        const ACC_ABSTRACT = 0x0400;
        const ACC_SYNTHETIC = 0x1000;
        const ACC_ANNOTATION = 0x2000;
        const ACC_ENUM = 0x4000;
    }
}

/// A fully parsed `.class` file.
#[derive(Debug)]
pub struct ClassFile {
    pub major_version: u16,
    pub minor_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: ClassAccessFlags,
    /// Constant pool index of a `CONSTANT_Class_info` naming this class.
    pub this_class: u16,
    /// Zero for `java/lang/Object`; otherwise a `CONSTANT_Class_info` index.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Attributes,
}

impl ClassFile {
    pub fn this_class_name(&self) -> Result<&str> {
        self.constant_pool.get_class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            self.constant_pool.get_class_name(self.super_class).map(Some)
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ACC_INTERFACE)
    }
}

impl ClassFileItem for ClassFile {
    fn read_from_stream<R: Read>(s: &mut ClassFileStream<R>, _cp: Option<&ConstantPool>) -> Result<Self> {
        let magic = s.read_u4()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFileError::BadMagicNumber(magic));
        }

        let minor_version = s.read_u2()?;
        let major_version = s.read_u2()?;

        let constant_pool = ConstantPool::read_from_stream(s, None)?;

        let access_flags =
            ClassAccessFlags::from_bits(s.read_u2()?).ok_or(ClassFileError::BadClassAccessFlags)?;

        let this_class = s.read_u2()?;
        let super_class = s.read_u2()?;

        let interfaces_count = s.read_u2()?;
        let interfaces = s.read_sequence::<u16>(Some(&constant_pool), interfaces_count as usize)?;

        let fields_count = s.read_u2()?;
        let fields = s.read_sequence::<FieldInfo>(Some(&constant_pool), fields_count as usize)?;

        let methods_count = s.read_u2()?;
        let methods = s.read_sequence::<MethodInfo>(Some(&constant_pool), methods_count as usize)?;

        let attributes = Attributes::read_from_stream(s, Some(&constant_pool))?;

        Ok(Self {
            major_version,
            minor_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hand-assembled minimal class file: `class Empty {}`, no fields,
    /// methods, or interfaces, with a constant pool holding only the
    /// self-referencing `Class` entry and its name.
    fn minimal_class_bytes() -> Vec<u8> {
        let mut b = vec![];
        b.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        b.extend_from_slice(&[0x00, 0x00]); // minor
        b.extend_from_slice(&[0x00, 0x34]); // major (52 = Java 8)
        b.extend_from_slice(&[0x00, 0x03]); // constant_pool_count = 3 (2 entries)
        b.push(1); // CONSTANT_Utf8
        b.extend_from_slice(&[0x00, 0x05]);
        b.extend_from_slice(b"Empty");
        b.push(7); // CONSTANT_Class
        b.extend_from_slice(&[0x00, 0x01]); // name_index = 1
        b.extend_from_slice(&[0x00, 0x21]); // access_flags: PUBLIC | SUPER
        b.extend_from_slice(&[0x00, 0x02]); // this_class = 2
        b.extend_from_slice(&[0x00, 0x00]); // super_class = 0
        b.extend_from_slice(&[0x00, 0x00]); // interfaces_count
        b.extend_from_slice(&[0x00, 0x00]); // fields_count
        b.extend_from_slice(&[0x00, 0x00]); // methods_count
        b.extend_from_slice(&[0x00, 0x00]); // attributes_count
        b
    }

    #[test]
    fn parses_minimal_class() {
        let bytes = minimal_class_bytes();
        let mut cursor = Cursor::new(bytes);
        let mut stream = ClassFileStream::new(&mut cursor);
        let class = ClassFile::read_from_stream(&mut stream, None).unwrap();
        assert_eq!(class.this_class_name().unwrap(), "Empty");
        assert_eq!(class.super_class_name().unwrap(), None);
        assert!(class.fields.is_empty());
        assert!(class.methods.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = minimal_class_bytes();
        bytes[0] = 0;
        let mut cursor = Cursor::new(bytes);
        let mut stream = ClassFileStream::new(&mut cursor);
        assert!(matches!(
            ClassFile::read_from_stream(&mut stream, None),
            Err(ClassFileError::BadMagicNumber(_))
        ));
    }
}
