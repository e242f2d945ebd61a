//! Class loading, linking, and constant-pool resolution (§4.C).
//!
//! Grounded on `exo-jvm/src/vm/class/bootstrap.rs`'s `BootstrapClassLoader`
//! (classpath-as-`PathBuf`, `find_class` appending `.class` and reading from
//! disk, a cache keyed by class name) and `exo-jvm/src/vm/class/
//! constant_pool.rs`'s `RuntimeConstantPool`/`RuntimeConstant` idea of a
//! constant pool whose entries start as raw indices and are rewritten to
//! resolved pointers on first use. The teacher's version is built entirely
//! against its dropped `exo_parser`-typed descriptor/class-name model
//! (`ClassRefName`, `UnqualifiedName`); this one resolves against
//! `babe_class`'s plain byte-string names and `babe_class::descriptor`
//! types instead.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use babe_class::class_file::ClassFile;
use babe_class::stream::{ClassFileItem, ClassFileStream};

use crate::class::{
    ArrayClazz, Clazz, ClazzHeader, ClazzKind, ClazzRef, ExceptionTableEntry, Field,
    FieldNameAndType, InstanceClazz, JavaMethodCode, LifecycleState, Method, MethodBody,
    MethodNameAndType, PrimitiveClazz,
};
use crate::error::VmError;
use crate::object::{ElementType, Reference};
use crate::vm::Vm;

/// One classpath: a list of directory or `.jar` entries.
#[derive(Clone, Default)]
pub struct Classpath {
    pub entries: Vec<PathBuf>,
}

impl Classpath {
    pub fn new(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    /// Locate the raw bytes of `name` (slash-separated, no `.class` suffix).
    fn find(&self, name: &[u8]) -> Option<Vec<u8>> {
        let name = String::from_utf8_lossy(name);
        for entry in &self.entries {
            if entry.extension().map(|e| e == "jar").unwrap_or(false) {
                if let Some(bytes) = find_in_jar(entry, &name) {
                    return Some(bytes);
                }
                continue;
            }
            let path = entry.join(format!("{name}.class"));
            if let Ok(bytes) = std::fs::read(&path) {
                return Some(bytes);
            }
        }
        None
    }
}

fn find_in_jar(_jar: &Path, _name: &str) -> Option<Vec<u8>> {
    // Zip reading is explicitly an external adapter, not re-specified here;
    // a real embedder supplies class bytes through `Classpath::entries`
    // pointed at an already-extracted directory, or wires in a zip reader
    // upstream of `load_class`.
    None
}

/// A resolved (or not-yet-resolved) constant pool entry. Mirrors
/// `babe_class::constant_pool::ConstantPoolEntry` but replaces raw indices
/// with `OnceCell`s that cache the first successful resolution, matching the
/// OPT-flag/`resolved_ptr` contract: resolution is idempotent and O(1) after
/// the first call.
pub enum LinkedEntry {
    Utf8(Rc<[u8]>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name: Rc<[u8]>, resolved: OnceCell<ClazzRef> },
    StringRef { content: Rc<[u8]>, resolved: OnceCell<Reference> },
    FieldRef {
        class_name: Rc<[u8]>,
        field: MethodNameAndType_,
        resolved: OnceCell<usize>,
    },
    MethodRef {
        class_name: Rc<[u8]>,
        method: MethodNameAndType_,
        resolved: OnceCell<Rc<Method>>,
        interface: bool,
    },
    NameAndType(Rc<[u8]>, Rc<[u8]>),
    Unsupported,
}

/// Field/method name+descriptor pair as stored in a not-yet-resolved
/// `FieldRef`/`MethodRef`/`InterfaceMethodref` constant.
pub type MethodNameAndType_ = FieldNameAndType;

pub struct LinkedConstantPool {
    entries: Vec<LinkedEntry>,
}

impl LinkedConstantPool {
    pub fn get_utf8(&self, index: u16) -> Option<&Rc<[u8]>> {
        match self.entries.get(index as usize)? {
            LinkedEntry::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_integer(&self, index: u16) -> Option<i32> {
        match self.entries.get(index as usize)? {
            LinkedEntry::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_long(&self, index: u16) -> Option<i64> {
        match self.entries.get(index as usize)? {
            LinkedEntry::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, index: u16) -> Option<f32> {
        match self.entries.get(index as usize)? {
            LinkedEntry::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self, index: u16) -> Option<f64> {
        match self.entries.get(index as usize)? {
            LinkedEntry::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// `resolve_clazz(i)`: look up `(loader, name)` through `vm`, applying
    /// accessibility rules, caching into the constant's `OnceCell`.
    pub fn resolve_clazz(&self, vm: &Vm, loader: Reference, index: u16) -> Result<ClazzRef, VmError> {
        let LinkedEntry::Class { name, resolved } = &self.entries[index as usize] else {
            return Err(VmError::Verify("constant pool index is not a Class".into()));
        };
        if let Some(c) = resolved.get() {
            return Ok(c.clone());
        }
        let clazz = vm.resolve_class(loader, name)?;
        let _ = resolved.set(clazz.clone());
        Ok(clazz)
    }

    pub fn resolve_string(&self, vm: &Vm, index: u16) -> Result<Reference, VmError> {
        let LinkedEntry::StringRef { content, resolved } = &self.entries[index as usize] else {
            return Err(VmError::Verify("constant pool index is not a String".into()));
        };
        if let Some(r) = resolved.get() {
            return Ok(*r);
        }
        let r = vm.intern_string(content)?;
        let _ = resolved.set(r);
        Ok(r)
    }

    /// `getstatic`/`putstatic`/`getfield`/`putfield`'s field resolution: the
    /// declaring class plus the field's index in it. Re-resolved on every
    /// access rather than cached through the constant's `OnceCell` (fields
    /// are cheap to relocate by name; caching would need to track which
    /// concrete clazz answered the lookup, not just an index).
    pub fn resolve_field(&self, vm: &Vm, loader: Reference, index: u16) -> Result<crate::class::ResolvedField, VmError> {
        let LinkedEntry::FieldRef { class_name, field, .. } = &self.entries[index as usize] else {
            return Err(VmError::Verify("constant pool index is not a Fieldref".into()));
        };
        let clazz = vm.resolve_class(loader, class_name)?;
        crate::class::find_field(&clazz, &field.name, &field.descriptor)
            .ok_or_else(|| VmError::NoSuchField(String::from_utf8_lossy(&field.name).into_owned()))
    }

    /// `invokestatic`/`invokespecial`'s symbolic method resolution: find the
    /// method in the named class or its superclass chain. Cached, since a
    /// resolved `Method` is immutable once its declaring class is loaded.
    pub fn resolve_method(&self, vm: &Vm, loader: Reference, index: u16) -> Result<Rc<Method>, VmError> {
        let LinkedEntry::MethodRef { class_name, method, resolved, .. } = &self.entries[index as usize] else {
            return Err(VmError::Verify("constant pool index is not a Methodref".into()));
        };
        if let Some(m) = resolved.get() {
            return Ok(m.clone());
        }
        let clazz = vm.resolve_class(loader, class_name)?;
        let m = crate::class::find_method(&clazz, &method.name, &method.descriptor)
            .ok_or_else(|| VmError::NoSuchMethod(String::from_utf8_lossy(&method.name).into_owned()))?;
        let _ = resolved.set(m.clone());
        Ok(m)
    }

    /// The declaring class name and name+descriptor of a method ref, without
    /// resolving it — used by `invokevirtual`/`invokeinterface` to redo
    /// dispatch against the receiver's actual class rather than the
    /// statically resolved one.
    pub fn method_name_and_type(&self, index: u16) -> Result<(&[u8], &[u8]), VmError> {
        let LinkedEntry::MethodRef { method, .. } = &self.entries[index as usize] else {
            return Err(VmError::Verify("constant pool index is not a Methodref".into()));
        };
        Ok((&method.name, &method.descriptor))
    }
}

/// Read the magic primitive-type words per §4.C step 3.
fn primitive_element_type(name: &[u8]) -> Option<ElementType> {
    Some(match name {
        b"boolean" => ElementType::Boolean,
        b"byte" => ElementType::Byte,
        b"char" => ElementType::Char,
        b"short" => ElementType::Short,
        b"int" => ElementType::Int,
        b"long" => ElementType::Long,
        b"float" => ElementType::Float,
        b"double" => ElementType::Double,
        _ => return None,
    })
}

impl Vm {
    /// §4.C load ordering, steps 1-6. `name` is a slash-separated internal
    /// class name, possibly starting with `[` for an array class.
    pub fn resolve_class(&self, loader: Reference, name: &[u8]) -> Result<ClazzRef, VmError> {
        if let Some(c) = self.class_pool.borrow().get(loader, name) {
            return Ok(c);
        }

        if name.first() == Some(&b'[') {
            return self.load_array_class(loader, name);
        }

        if let Some(prim) = primitive_element_type(name) {
            return self.load_primitive_class(name, prim);
        }

        // Names starting with java/ or babe/ are forced to the bootstrap
        // loader regardless of the initiating loader.
        let effective_loader = if name.starts_with(b"java/") || name.starts_with(b"babe/") {
            Reference::NULL
        } else {
            loader
        };

        let bytes = self
            .classpath_for(effective_loader)
            .find(name)
            .ok_or_else(|| VmError::ClassNotFound(String::from_utf8_lossy(name).into_owned()))?;

        self.define_class(effective_loader, name, &bytes)
    }

    fn load_array_class(&self, loader: Reference, name: &[u8]) -> Result<ClazzRef, VmError> {
        let component_name = &name[1..];
        let component = self.resolve_class_or_primitive(loader, component_name)?;
        let (array_loader, component_clazz, component_type) = match component {
            ComponentResolution::Clazz(c) => (c.header().loader, Some(c), ElementType::Reference),
            ComponentResolution::Primitive(el) => (Reference::NULL, None, el),
        };
        let id = self.class_pool.borrow_mut().reserve_id();
        let clazz = Rc::new(Clazz::Array(ArrayClazz {
            header: ClazzHeader {
                state: std::cell::Cell::new(LifecycleState::Initialized),
                kind: ClazzKind::Array,
                access_flags: babe_class::class_file::ClassAccessFlags::ACC_PUBLIC | babe_class::class_file::ClassAccessFlags::ACC_FINAL,
                name: canonicalize(self, name),
                package: canonicalize(self, b""),
                mirror: Reference::NULL,
                super_clazz: Some(self.resolve_class(Reference::NULL, b"java/lang/Object")?),
                loader: array_loader,
                id,
            },
            component_type,
            component_clazz,
        }));
        self.class_pool.borrow_mut().insert(array_loader, name.to_vec(), clazz.clone());
        Ok(clazz)
    }

    fn resolve_class_or_primitive(&self, loader: Reference, name: &[u8]) -> Result<ComponentResolution, VmError> {
        if name.first() == Some(&b'[') || name.first() == Some(&b'L') {
            let stripped = if name.first() == Some(&b'L') {
                &name[1..name.len().saturating_sub(1)]
            } else {
                name
            };
            Ok(ComponentResolution::Clazz(self.resolve_class(loader, stripped)?))
        } else if let Some(prim) = primitive_descriptor_char(name) {
            Ok(ComponentResolution::Primitive(prim))
        } else {
            Ok(ComponentResolution::Clazz(self.resolve_class(loader, name)?))
        }
    }

    fn load_primitive_class(&self, name: &[u8], element: ElementType) -> Result<ClazzRef, VmError> {
        let id = self.class_pool.borrow_mut().reserve_id();
        let clazz = Rc::new(Clazz::Primitive(PrimitiveClazz {
            header: ClazzHeader {
                state: std::cell::Cell::new(LifecycleState::Initialized),
                kind: ClazzKind::Primitive,
                access_flags: babe_class::class_file::ClassAccessFlags::ACC_PUBLIC,
                name: canonicalize(self, name),
                package: canonicalize(self, b""),
                mirror: Reference::NULL,
                super_clazz: None,
                loader: Reference::NULL,
                id,
            },
            element_type: element,
        }));
        self.class_pool.borrow_mut().insert(Reference::NULL, name.to_vec(), clazz.clone());
        Ok(clazz)
    }

    /// §4.C step 5: parse class bytes into an `InstanceClazz` and link it.
    fn define_class(&self, loader: Reference, expected_name: &[u8], bytes: &[u8]) -> Result<ClazzRef, VmError> {
        let mut cursor = std::io::Cursor::new(bytes);
        let mut stream = ClassFileStream::new(&mut cursor);
        let file = ClassFile::read_from_stream(&mut stream, None)
            .map_err(|e| VmError::ClassFormat(e.to_string()))?;

        let this_name = file
            .this_class_name()
            .map_err(|e| VmError::ClassFormat(e.to_string()))?
            .as_bytes()
            .to_vec();
        if this_name != expected_name {
            return Err(VmError::NoClassDefFound(String::from_utf8_lossy(expected_name).into_owned()));
        }

        let super_clazz = match file.super_class_name().map_err(|e| VmError::ClassFormat(e.to_string()))? {
            Some(name) => Some(self.resolve_class(loader, name.as_bytes())?),
            None => None,
        };

        let interfaces = file
            .interfaces
            .iter()
            .map(|&idx| {
                file.constant_pool
                    .get_class_name(idx)
                    .map(|n| canonicalize(self, n.as_bytes()))
                    .map_err(|e| VmError::ClassFormat(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for iface_name in &interfaces {
            self.resolve_class(loader, iface_name)?;
        }

        let inherited_count = super_clazz
            .as_ref()
            .and_then(|c| c.as_instance())
            .map(|c| c.instance_fields_count)
            .unwrap_or(0);

        let mut fields = Vec::new();
        let mut statics = Vec::new();
        let mut static_longs = Vec::new();
        let mut instance_offset = inherited_count;
        // Partition static-first, instance-second, stable class-file order
        // within each partition. Own instance fields start past the
        // inherited slots so a subclass's layout never overlaps its
        // superclass's, since both are read through the same flat cell array.
        for f in file.fields.iter().filter(|f| f.is_static()) {
            let name = canonicalize(self, f.name(&file.constant_pool).unwrap_or_default().as_bytes());
            let descriptor = canonicalize(self, f.descriptor(&file.constant_pool).unwrap_or_default().as_bytes());
            let is_wide = descriptor.starts_with(b"J") || descriptor.starts_with(b"D");
            let static_index = if is_wide {
                static_longs.push(0i64);
                statics.push(crate::object::Cell::from_i32((static_longs.len() - 1) as i32));
                statics.len() - 1
            } else {
                statics.push(crate::object::Cell::ZERO);
                statics.len() - 1
            };
            fields.push(Field {
                desc: FieldNameAndType { name, descriptor: descriptor.clone() },
                access_flags: f.access_flags,
                is_reference: descriptor.starts_with(b"L") || descriptor.starts_with(b"["),
                is_wide,
                instance_offset: None,
                static_index: Some(static_index),
            });
        }
        for f in file.fields.iter().filter(|f| !f.is_static()) {
            let name = canonicalize(self, f.name(&file.constant_pool).unwrap_or_default().as_bytes());
            let descriptor = canonicalize(self, f.descriptor(&file.constant_pool).unwrap_or_default().as_bytes());
            let is_wide = descriptor.starts_with(b"J") || descriptor.starts_with(b"D");
            let offset = instance_offset;
            instance_offset += if is_wide { 2 } else { 1 };
            fields.push(Field {
                desc: FieldNameAndType { name, descriptor: descriptor.clone() },
                access_flags: f.access_flags,
                is_reference: descriptor.starts_with(b"L") || descriptor.starts_with(b"["),
                is_wide,
                instance_offset: Some(offset),
                static_index: None,
            });
        }
        let mut methods = Vec::new();
        for m in &file.methods {
            let name = canonicalize(self, m.name(&file.constant_pool).unwrap_or_default().as_bytes());
            let descriptor_str = m.descriptor(&file.constant_pool).map_err(|e| VmError::ClassFormat(e.to_string()))?;
            let argument_cells = descriptor_str.argument_cells() as usize + if m.is_static() { 0 } else { 1 };
            let return_cells = descriptor_str.return_cells() as usize;
            let descriptor = canonicalize(self, file.constant_pool.get_utf8(m.descriptor_index).unwrap_or_default().as_bytes());
            let body = if m.is_abstract() {
                MethodBody::Abstract
            } else if m.is_native() {
                MethodBody::Native
            } else if let Some(code) = m.attributes.code() {
                MethodBody::Java(JavaMethodCode {
                    max_stack: code.max_stack,
                    max_locals: code.max_locals,
                    code: code.code.clone(),
                    exception_table: code
                        .exception_table
                        .iter()
                        .map(|e| ExceptionTableEntry {
                            start_pc: e.start_pc,
                            end_pc: e.end_pc,
                            handler_pc: e.handler_pc,
                            catch_type: if e.catch_type == 0 {
                                None
                            } else {
                                file.constant_pool.get_class_name(e.catch_type).ok().map(|n| canonicalize(self, n.as_bytes()))
                            },
                        })
                        .collect(),
                    line_number_table: code.line_number_table.iter().map(|l| (l.start_pc, l.line_number)).collect(),
                })
            } else {
                MethodBody::Abstract
            };
            methods.push(Rc::new(Method {
                desc: MethodNameAndType { name, descriptor },
                access_flags: m.access_flags,
                argument_cells,
                return_cells,
                body,
                declaring_class: canonicalize(self, this_name.as_slice()),
            }));
        }

        let linked_pool = link_constant_pool(self, &file.constant_pool);
        let id = self.class_pool.borrow_mut().reserve_id();

        let instance = InstanceClazz {
            header: ClazzHeader {
                state: std::cell::Cell::new(LifecycleState::Loaded),
                kind: ClazzKind::Instance,
                access_flags: file.access_flags,
                name: canonicalize(self, &this_name),
                package: package_of(&this_name),
                mirror: Reference::NULL,
                super_clazz,
                loader,
                id,
            },
            constant_pool: linked_pool,
            interfaces,
            fields,
            methods,
            static_longs: std::cell::RefCell::new(static_longs),
            statics: std::cell::RefCell::new(statics),
            instance_fields_count: instance_offset,
        };

        let clazz = Rc::new(Clazz::Instance(instance));
        self.class_pool.borrow_mut().insert(loader, this_name, clazz.clone());
        self.apply_constant_values(&clazz, &file)?;
        Ok(clazz)
    }

    /// Static final primitive fields with a `ConstantValue` attribute
    /// receive their value at load time (§4.C.f).
    fn apply_constant_values(&self, clazz: &ClazzRef, file: &ClassFile) -> Result<(), VmError> {
        let Clazz::Instance(instance) = &**clazz else { return Ok(()) };
        for (field, info) in instance.fields.iter().zip(file.fields.iter()).filter(|(f, _)| f.static_index.is_some()) {
            if let Some(idx) = info.attributes.constant_value_index() {
                let mut statics = instance.statics.borrow_mut();
                let si = field.static_index.unwrap();
                if field.desc.descriptor.starts_with(b"J") {
                    let v = file.constant_pool.get(idx).ok().and_then(|e| match e {
                        babe_class::constant_pool::ConstantPoolEntry::Long { value } => Some(*value),
                        _ => None,
                    });
                    if let Some(v) = v {
                        let mut longs = instance.static_longs.borrow_mut();
                        let cell = statics[si].as_i32() as usize;
                        longs[cell] = v;
                    }
                } else if field.desc.descriptor.starts_with(b"D") {
                    let v = file.constant_pool.get(idx).ok().and_then(|e| match e {
                        babe_class::constant_pool::ConstantPoolEntry::Double { value } => Some(*value),
                        _ => None,
                    });
                    if let Some(v) = v {
                        let mut longs = instance.static_longs.borrow_mut();
                        let cell = statics[si].as_i32() as usize;
                        longs[cell] = v.to_bits() as i64;
                    }
                } else if field.desc.descriptor.starts_with(b"F") {
                    if let Ok(babe_class::constant_pool::ConstantPoolEntry::Float { value }) = file.constant_pool.get(idx) {
                        statics[si] = crate::object::Cell::from_f32(*value);
                    }
                } else if let Ok(babe_class::constant_pool::ConstantPoolEntry::Integer { value }) = file.constant_pool.get(idx) {
                    statics[si] = crate::object::Cell::from_i32(*value);
                }
            }
        }
        Ok(())
    }

    fn classpath_for(&self, loader: Reference) -> &Classpath {
        if loader.is_null() {
            &self.bootstrap_classpath
        } else {
            &self.user_classpath
        }
    }
}

enum ComponentResolution {
    Clazz(ClazzRef),
    Primitive(ElementType),
}

fn primitive_descriptor_char(name: &[u8]) -> Option<ElementType> {
    Some(match name {
        b"I" => ElementType::Int,
        b"J" => ElementType::Long,
        b"F" => ElementType::Float,
        b"D" => ElementType::Double,
        b"B" => ElementType::Byte,
        b"S" => ElementType::Short,
        b"C" => ElementType::Char,
        b"Z" => ElementType::Boolean,
        _ => return None,
    })
}

fn canonicalize(vm: &Vm, bytes: &[u8]) -> Rc<[u8]> {
    vm.utf_pool.borrow_mut().get(bytes, true).expect("add=true never misses")
}

fn package_of(name: &[u8]) -> Rc<[u8]> {
    match name.iter().rposition(|&b| b == b'/') {
        Some(i) => Rc::from(&name[..i]),
        None => Rc::from(&b""[..]),
    }
}

fn link_constant_pool(vm: &Vm, cp: &babe_class::constant_pool::ConstantPool) -> LinkedConstantPool {
    use babe_class::constant_pool::ConstantPoolEntry as E;
    let mut entries = Vec::with_capacity(cp.len());
    entries.push(LinkedEntry::Unsupported);
    for i in 1..cp.len() as u16 {
        let entry = match cp.get(i) {
            Ok(E::Utf8 { data }) => LinkedEntry::Utf8(vm.utf_pool.borrow_mut().get(data.as_bytes(), true).unwrap()),
            Ok(E::Integer { value }) => LinkedEntry::Integer(*value),
            Ok(E::Float { value }) => LinkedEntry::Float(*value),
            Ok(E::Long { value }) => LinkedEntry::Long(*value),
            Ok(E::Double { value }) => LinkedEntry::Double(*value),
            Ok(E::Class { .. }) => {
                let name = cp.get_class_name(i).map(|n| vm.utf_pool.borrow_mut().get(n.as_bytes(), true).unwrap()).unwrap_or_else(|_| Rc::from(&b""[..]));
                LinkedEntry::Class { name, resolved: OnceCell::new() }
            }
            Ok(E::String { string_index }) => {
                let content = cp.get_utf8(*string_index).map(|s| vm.utf_pool.borrow_mut().get(s.as_bytes(), true).unwrap()).unwrap_or_else(|_| Rc::from(&b""[..]));
                LinkedEntry::StringRef { content, resolved: OnceCell::new() }
            }
            Ok(E::NameAndType { name_index, descriptor_index }) => {
                let name = cp.get_utf8(*name_index).map(|s| vm.utf_pool.borrow_mut().get(s.as_bytes(), true).unwrap()).unwrap_or_else(|_| Rc::from(&b""[..]));
                let descriptor = cp.get_utf8(*descriptor_index).map(|s| vm.utf_pool.borrow_mut().get(s.as_bytes(), true).unwrap()).unwrap_or_else(|_| Rc::from(&b""[..]));
                LinkedEntry::NameAndType(name, descriptor)
            }
            Ok(E::Fieldref { class_index, name_and_type_index }) | Ok(E::Methodref { class_index, name_and_type_index }) | Ok(E::InterfaceMethodref { class_index, name_and_type_index }) => {
                let class_name = cp.get_class_name(*class_index).map(|n| vm.utf_pool.borrow_mut().get(n.as_bytes(), true).unwrap()).unwrap_or_else(|_| Rc::from(&b""[..]));
                let (name, descriptor) = cp
                    .get_name_and_type(*name_and_type_index)
                    .map(|(n, d)| {
                        let name = vm.utf_pool.borrow_mut().get(n.as_bytes(), true).unwrap();
                        let descriptor = vm.utf_pool.borrow_mut().get(d.as_bytes(), true).unwrap();
                        (name, descriptor)
                    })
                    .unwrap_or_else(|_| (Rc::from(&b""[..]), Rc::from(&b""[..])));
                let field_desc = FieldNameAndType { name, descriptor };
                if matches!(cp.get(i), Ok(E::Fieldref { .. })) {
                    LinkedEntry::FieldRef { class_name, field: field_desc, resolved: OnceCell::new() }
                } else {
                    LinkedEntry::MethodRef {
                        class_name,
                        method: field_desc,
                        resolved: OnceCell::new(),
                        interface: matches!(cp.get(i), Ok(E::InterfaceMethodref { .. })),
                    }
                }
            }
            _ => LinkedEntry::Unsupported,
        };
        entries.push(entry);
    }
    LinkedConstantPool { entries }
}
