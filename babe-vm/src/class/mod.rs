//! The clazz model: common header plus the three variant bodies, the class
//! pool, and the field/method metadata attached to an `InstanceClazz`.
//!
//! Grounded on `exo-jvm/src/vm/class/mod.rs` (`MethodImplementation`,
//! `MethodImplementationType::{Native,Java}`, `JavaMethodCode`,
//! `JavaExceptionTableEntry` shapes) and `FieldNameAndType`/
//! `MethodNameAndType` naming, adapted to the tagged-variant
//! `Instance`/`Array`/`Primitive` clazz header the data model calls for
//! (the teacher has only one clazz shape, `JVMRawClass`, built for an
//! interpreter that never materialized primitive or array clazzes
//! separately).

pub mod loader;

use std::rc::Rc;

use babe_class::opcode::Instructions;

use crate::object::{Cell, ElementType, Reference};
use crate::vm::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Loading,
    Loaded,
    Initializing,
    Initialized,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClazzKind {
    Instance,
    Array,
    Primitive,
}

/// Common header every clazz variant shares.
pub struct ClazzHeader {
    /// `Cell`, not a plain field: a clazz is shared through `Rc` once
    /// loaded, but its lifecycle still advances (Loaded -> Initializing ->
    /// Initialized) the first time it's actively used.
    pub state: std::cell::Cell<LifecycleState>,
    pub kind: ClazzKind,
    pub access_flags: babe_class::class_file::ClassAccessFlags,
    pub name: Rc<[u8]>,
    pub package: Rc<[u8]>,
    /// The `java.lang.Class` mirror object for this clazz, allocated when
    /// the clazz is first loaded.
    pub mirror: Reference,
    pub super_clazz: Option<ClazzRef>,
    pub loader: Reference,
    /// Stable identity assigned by the class pool at load time. An object's
    /// clazz cell stores this id rather than a heap pointer, since clazzes
    /// live in `Rc`s owned by the class pool, not in the traced arena.
    pub id: u32,
}

/// A non-owning reference to a clazz held in the class pool. The class pool
/// is the unique owner (§ class pool invariant); every other edge, including
/// this one, is valid only until the class is unloaded.
pub type ClazzRef = Rc<Clazz>;

pub enum Clazz {
    Instance(InstanceClazz),
    Array(ArrayClazz),
    Primitive(PrimitiveClazz),
}

impl Clazz {
    pub fn header(&self) -> &ClazzHeader {
        match self {
            Clazz::Instance(c) => &c.header,
            Clazz::Array(c) => &c.header,
            Clazz::Primitive(c) => &c.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ClazzHeader {
        match self {
            Clazz::Instance(c) => &mut c.header,
            Clazz::Array(c) => &mut c.header,
            Clazz::Primitive(c) => &mut c.header,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.header().name
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, Clazz::Instance(c) if c.header.access_flags.contains(babe_class::class_file::ClassAccessFlags::ACC_INTERFACE))
    }

    pub fn as_instance(&self) -> Option<&InstanceClazz> {
        match self {
            Clazz::Instance(c) => Some(c),
            _ => None,
        }
    }
}

/// Field name and JNI-style descriptor, used as a lookup key and to tag a
/// `Field`'s declared type for the GC's reference-cell tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldNameAndType {
    pub name: Rc<[u8]>,
    pub descriptor: Rc<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodNameAndType {
    pub name: Rc<[u8]>,
    pub descriptor: Rc<[u8]>,
}

pub struct Field {
    pub desc: FieldNameAndType,
    pub access_flags: babe_class::fields::FieldAccessFlags,
    pub is_reference: bool,
    pub is_wide: bool,
    /// `Some` for an instance field (offset in cells past the object
    /// header); `None` for a static field, whose value lives in
    /// `InstanceClazz::statics` (or, for a static long/double, indirectly
    /// through `static_longs`).
    pub instance_offset: Option<usize>,
    pub static_index: Option<usize>,
}

pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Name of the catch type, resolved to a `ClazzRef` lazily on first
    /// throw (per §4.C, catch-type stored as a name). `None` means a
    /// `finally` handler that catches everything.
    pub catch_type: Option<Rc<[u8]>>,
}

pub struct JavaMethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Instructions,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_number_table: Vec<(u16, u16)>,
}

pub enum MethodBody {
    Java(JavaMethodCode),
    /// Resolved lazily against the native registry; absent resolution is
    /// deferred until first call, yielding `UnsatisfiedLinkError` there
    /// rather than at load time.
    Native,
    Abstract,
}

pub struct Method {
    pub desc: MethodNameAndType,
    pub access_flags: babe_class::methods::MethodAccessFlags,
    pub argument_cells: usize,
    pub return_cells: usize,
    pub body: MethodBody,
    pub declaring_class: Rc<[u8]>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(babe_class::methods::MethodAccessFlags::ACC_STATIC)
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags.contains(babe_class::methods::MethodAccessFlags::ACC_SYNCHRONIZED)
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, MethodBody::Native)
    }
}

pub struct InstanceClazz {
    pub header: ClazzHeader,
    pub constant_pool: loader::LinkedConstantPool,
    pub interfaces: Vec<Rc<[u8]>>,
    pub fields: Vec<Field>,
    pub methods: Vec<Rc<Method>>,
    /// Static long/double storage, addressed indirectly by a static field's
    /// cell (which holds an index into this array as a `Cell::from_i32`).
    pub static_longs: std::cell::RefCell<Vec<i64>>,
    pub statics: std::cell::RefCell<Vec<Cell>>,
    pub instance_fields_count: usize,
}

pub struct ArrayClazz {
    pub header: ClazzHeader,
    pub component_type: ElementType,
    pub component_clazz: Option<ClazzRef>,
}

pub struct PrimitiveClazz {
    pub header: ClazzHeader,
    pub element_type: ElementType,
}

/// `(loader, name)` → clazz, chained hashing with ancestor-aware bucket
/// lookup (a bucket entry matches a requested loader or any of its
/// ancestors), per §4.B.
#[derive(Default)]
pub struct ClassPool {
    entries: ahash::AHashMap<(Reference, Vec<u8>), ClazzRef>,
    /// Dense id -> clazz, parallel to each clazz's `ClazzHeader::id`. Lets an
    /// object's clazz cell store a small stable id instead of a real pointer.
    by_id: Vec<Option<ClazzRef>>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, loader: Reference, name: &[u8]) -> Option<ClazzRef> {
        self.entries.get(&(loader, name.to_vec())).cloned()
    }

    /// Reserve an id for a clazz under construction. Call before building
    /// the `ClazzHeader` so its `id` field can be set, then `insert` once the
    /// clazz itself exists.
    pub fn reserve_id(&mut self) -> u32 {
        let id = self.by_id.len() as u32;
        self.by_id.push(None);
        id
    }

    pub fn insert(&mut self, loader: Reference, name: Vec<u8>, clazz: ClazzRef) {
        let id = clazz.header().id as usize;
        if id < self.by_id.len() {
            self.by_id[id] = Some(clazz.clone());
        }
        self.entries.insert((loader, name), clazz);
    }

    pub fn remove(&mut self, loader: Reference, name: &[u8]) {
        if let Some(c) = self.entries.remove(&(loader, name.to_vec())) {
            let id = c.header().id as usize;
            if id < self.by_id.len() {
                self.by_id[id] = None;
            }
        }
    }

    pub fn by_id(&self, id: u32) -> Option<ClazzRef> {
        self.by_id.get(id as usize).and_then(|c| c.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClazzRef> {
        self.entries.values()
    }
}

/// `is_assignable_from(from, to)`, per §4.C: identity, Object target,
/// primitive arrays (identical component), reference arrays (recursive
/// component check), interfaces (array targets accept only
/// `Cloneable`/`Serializable`), and instance supertype walk.
pub fn is_assignable_from(vm: &Vm, from: &ClazzRef, to: &ClazzRef) -> bool {
    if Rc::ptr_eq(from, to) {
        return true;
    }
    if to.name() == b"java/lang/Object" {
        return matches!(**from, Clazz::Array(_) | Clazz::Instance(_));
    }
    match (&**from, &**to) {
        (Clazz::Array(f), Clazz::Array(t)) => match (f.component_type, t.component_type) {
            (a, b) if a == b && a != ElementType::Reference => true,
            (ElementType::Reference, ElementType::Reference) => {
                match (&f.component_clazz, &t.component_clazz) {
                    (Some(fc), Some(tc)) => is_assignable_from(vm, fc, tc),
                    _ => false,
                }
            }
            _ => false,
        },
        (Clazz::Array(_), Clazz::Instance(t)) => {
            t.header.access_flags.contains(babe_class::class_file::ClassAccessFlags::ACC_INTERFACE)
                && (to.name() == b"java/lang/Cloneable" || to.name() == b"java/io/Serializable")
        }
        (Clazz::Instance(f), Clazz::Instance(_)) if to.is_interface() => {
            implements_transitively(vm, f, to)
        }
        (Clazz::Instance(_), Clazz::Instance(_)) => {
            let mut cur = from.header().super_clazz.clone();
            while let Some(c) = cur {
                if Rc::ptr_eq(&c, to) {
                    return true;
                }
                cur = c.header().super_clazz.clone();
            }
            false
        }
        _ => false,
    }
}

/// A field located by name+descriptor: the clazz that actually declares it
/// (which owns its static storage) and its index into that clazz's `fields`.
pub struct ResolvedField {
    pub owner: ClazzRef,
    pub field_index: usize,
}

/// Walk `clazz` and its superclasses for a field with the given name and
/// descriptor, JVMS §5.4.3.2 order (declared, then superclass chain; this
/// VM has no interface-declared fields to consult beyond that).
pub fn find_field(clazz: &ClazzRef, name: &[u8], descriptor: &[u8]) -> Option<ResolvedField> {
    let mut cur = Some(clazz.clone());
    while let Some(c) = cur {
        if let Clazz::Instance(instance) = &*c {
            if let Some(idx) = instance.fields.iter().position(|f| &*f.desc.name == name && &*f.desc.descriptor == descriptor) {
                return Some(ResolvedField { owner: c.clone(), field_index: idx });
            }
        }
        cur = c.header().super_clazz.clone();
    }
    None
}

/// Virtual/symbolic method lookup by name+descriptor, JVMS §5.4.3.3 order:
/// the clazz itself, then its superclass chain. Used both for symbolic
/// constant-pool resolution and for `invokevirtual`/`invokeinterface`'s
/// dynamic dispatch against a receiver's actual class.
pub fn find_method(clazz: &ClazzRef, name: &[u8], descriptor: &[u8]) -> Option<Rc<Method>> {
    let mut cur = Some(clazz.clone());
    while let Some(c) = cur {
        if let Clazz::Instance(instance) = &*c {
            if let Some(m) = instance.methods.iter().find(|m| &*m.desc.name == name && &*m.desc.descriptor == descriptor) {
                return Some(m.clone());
            }
        }
        cur = c.header().super_clazz.clone();
    }
    None
}

fn implements_transitively(vm: &Vm, instance: &InstanceClazz, iface: &ClazzRef) -> bool {
    for name in &instance.interfaces {
        if let Some(i) = vm.class_pool.borrow().get(instance.header.loader, name) {
            if Rc::ptr_eq(&i, iface) || (i.is_interface() && implements_transitively(vm, i.as_instance().unwrap(), iface)) {
                return true;
            }
        }
    }
    if let Some(sup) = &instance.header.super_clazz {
        if let Some(sup_instance) = sup.as_instance() {
            return implements_transitively(vm, sup_instance, iface);
        }
    }
    false
}
