//! Hand-assembled `.class` byte builder shared by the end-to-end scenario
//! tests, following the same by-hand encoding `babe-class`'s own
//! `class_file::tests::minimal_class_bytes` uses (no compiler is available
//! to produce real fixtures in this workspace).

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::rc::Rc;

/// `ClassAccessFlags`/`MethodAccessFlags`/`FieldAccessFlags` bit values
/// (JVMS §4.1, §4.5, §4.6), duplicated here as plain `u16`s rather than
/// depending on `babe_class`'s bitflags types, which this builder never
/// needs to construct directly.
pub mod flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_SYNCHRONIZED: u16 = 0x0020;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
}

#[derive(Clone)]
enum Entry {
    Utf8(String),
    Class(u16),
    NameAndType(u16, u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    Integer(i32),
}

/// Constant pool under construction. Only `utf8` entries are deduplicated;
/// every other kind is appended fresh on each call, which is harmless
/// (a few repeated entries cost bytes, never correctness).
pub struct Cp {
    entries: Vec<Entry>,
}

impl Cp {
    fn new() -> Self {
        Cp { entries: Vec::new() }
    }

    fn push(&mut self, e: Entry) -> u16 {
        self.entries.push(e);
        self.entries.len() as u16
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        for (i, e) in self.entries.iter().enumerate() {
            if let Entry::Utf8(x) = e {
                if x == s {
                    return (i + 1) as u16;
                }
            }
        }
        self.push(Entry::Utf8(s.to_string()))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let n = self.utf8(name);
        self.push(Entry::Class(n))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(descriptor);
        self.push(Entry::NameAndType(n, d))
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let c = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.push(Entry::Fieldref(c, nt))
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let c = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.push(Entry::Methodref(c, nt))
    }

    pub fn interface_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let c = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.push(Entry::InterfaceMethodref(c, nt))
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        self.push(Entry::Integer(v))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&((self.entries.len() + 1) as u16).to_be_bytes());
        for e in &self.entries {
            match e {
                Entry::Utf8(s) => {
                    out.push(1);
                    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Entry::Class(n) => {
                    out.push(7);
                    out.extend_from_slice(&n.to_be_bytes());
                }
                Entry::NameAndType(n, d) => {
                    out.push(12);
                    out.extend_from_slice(&n.to_be_bytes());
                    out.extend_from_slice(&d.to_be_bytes());
                }
                Entry::Fieldref(c, nt) => {
                    out.push(9);
                    out.extend_from_slice(&c.to_be_bytes());
                    out.extend_from_slice(&nt.to_be_bytes());
                }
                Entry::Methodref(c, nt) => {
                    out.push(10);
                    out.extend_from_slice(&c.to_be_bytes());
                    out.extend_from_slice(&nt.to_be_bytes());
                }
                Entry::InterfaceMethodref(c, nt) => {
                    out.push(11);
                    out.extend_from_slice(&c.to_be_bytes());
                    out.extend_from_slice(&nt.to_be_bytes());
                }
                Entry::Integer(v) => {
                    out.push(3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
    }
}

pub struct CodeSpec {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    /// `(start_pc, end_pc, handler_pc, catch_type_class_name)`; `None` catch
    /// type means "catch everything" (a `finally` handler).
    pub exceptions: Vec<(u16, u16, u16, Option<String>)>,
}

struct FieldSpec {
    access_flags: u16,
    name: String,
    descriptor: String,
}

struct MethodSpec {
    access_flags: u16,
    name: String,
    descriptor: String,
    code: Option<CodeSpec>,
}

/// Assembles one `.class` file's bytes field by field, the way
/// `babe_class::class_file`'s own test module builds `class Empty {}`.
pub struct ClassBuilder {
    pub cp: Cp,
    access_flags: u16,
    this_name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        ClassBuilder {
            cp: Cp::new(),
            access_flags: flags::ACC_PUBLIC | flags::ACC_SUPER,
            this_name: name.to_string(),
            super_name: super_name.map(String::from),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn set_access_flags(&mut self, f: u16) {
        self.access_flags = f;
    }

    pub fn add_interface(&mut self, name: &str) {
        self.interfaces.push(name.to_string());
    }

    pub fn add_field(&mut self, access_flags: u16, name: &str, descriptor: &str) {
        self.fields.push(FieldSpec { access_flags, name: name.into(), descriptor: descriptor.into() });
    }

    pub fn add_method(&mut self, access_flags: u16, name: &str, descriptor: &str, code: Option<CodeSpec>) {
        self.methods.push(MethodSpec { access_flags, name: name.into(), descriptor: descriptor.into(), code });
    }

    pub fn build(&mut self) -> Vec<u8> {
        let this_idx = self.cp.class(&self.this_name);
        let super_idx = match &self.super_name {
            Some(s) => self.cp.class(s),
            None => 0,
        };
        let interfaces = self.interfaces.clone();
        let interface_idxs: Vec<u16> = interfaces.iter().map(|i| self.cp.class(i)).collect();

        let mut fields_bytes = Vec::new();
        fields_bytes.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for f in &self.fields {
            let name_idx = self.cp.utf8(&f.name);
            let desc_idx = self.cp.utf8(&f.descriptor);
            fields_bytes.extend_from_slice(&f.access_flags.to_be_bytes());
            fields_bytes.extend_from_slice(&name_idx.to_be_bytes());
            fields_bytes.extend_from_slice(&desc_idx.to_be_bytes());
            fields_bytes.extend_from_slice(&0u16.to_be_bytes());
        }

        let mut methods_bytes = Vec::new();
        methods_bytes.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for m in &self.methods {
            let name_idx = self.cp.utf8(&m.name);
            let desc_idx = self.cp.utf8(&m.descriptor);
            methods_bytes.extend_from_slice(&m.access_flags.to_be_bytes());
            methods_bytes.extend_from_slice(&name_idx.to_be_bytes());
            methods_bytes.extend_from_slice(&desc_idx.to_be_bytes());
            match &m.code {
                None => methods_bytes.extend_from_slice(&0u16.to_be_bytes()),
                Some(c) => {
                    methods_bytes.extend_from_slice(&1u16.to_be_bytes());
                    let code_name = self.cp.utf8("Code");
                    let mut inner = Vec::new();
                    inner.extend_from_slice(&c.max_stack.to_be_bytes());
                    inner.extend_from_slice(&c.max_locals.to_be_bytes());
                    inner.extend_from_slice(&(c.bytes.len() as u32).to_be_bytes());
                    inner.extend_from_slice(&c.bytes);
                    inner.extend_from_slice(&(c.exceptions.len() as u16).to_be_bytes());
                    for (start, end, handler, catch) in &c.exceptions {
                        let catch_idx = match catch {
                            Some(name) => self.cp.class(name),
                            None => 0,
                        };
                        inner.extend_from_slice(&start.to_be_bytes());
                        inner.extend_from_slice(&end.to_be_bytes());
                        inner.extend_from_slice(&handler.to_be_bytes());
                        inner.extend_from_slice(&catch_idx.to_be_bytes());
                    }
                    inner.extend_from_slice(&0u16.to_be_bytes());
                    methods_bytes.extend_from_slice(&code_name.to_be_bytes());
                    methods_bytes.extend_from_slice(&(inner.len() as u32).to_be_bytes());
                    methods_bytes.extend_from_slice(&inner);
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        self.cp.write(&mut out);
        out.extend_from_slice(&self.access_flags.to_be_bytes());
        out.extend_from_slice(&this_idx.to_be_bytes());
        out.extend_from_slice(&super_idx.to_be_bytes());
        out.extend_from_slice(&(interface_idxs.len() as u16).to_be_bytes());
        for i in &interface_idxs {
            out.extend_from_slice(&i.to_be_bytes());
        }
        out.extend_from_slice(&fields_bytes);
        out.extend_from_slice(&methods_bytes);
        out.extend_from_slice(&0u16.to_be_bytes());
        out
    }
}

/// A class with nothing but a public no-arg constructor chaining to
/// `super_name`'s own (or a bare `return` for `java/lang/Object`, which has
/// no superclass to chain to).
pub fn trivial_class(name: &str, super_name: Option<&str>) -> Vec<u8> {
    let mut cb = ClassBuilder::new(name, super_name);
    let code = match super_name {
        Some(sup) => {
            let super_init = cb.cp.methodref(sup, "<init>", "()V");
            let mut v = vec![0x2a, 0xb7];
            v.extend_from_slice(&super_init.to_be_bytes());
            v.push(0xb1);
            v
        }
        None => vec![0xb1],
    };
    cb.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: code, exceptions: vec![] }));
    cb.build()
}

/// A marker interface: `ACC_INTERFACE | ACC_ABSTRACT`, no methods.
pub fn trivial_interface(name: &str) -> Vec<u8> {
    let mut cb = ClassBuilder::new(name, Some("java/lang/Object"));
    cb.set_access_flags(flags::ACC_PUBLIC | flags::ACC_INTERFACE | flags::ACC_ABSTRACT);
    cb.build()
}

/// `java/lang/Thread`: a constructor plus the four native methods
/// `babe_vm::native::NativeRegistry::with_builtins` registers against it.
pub fn thread_class() -> Vec<u8> {
    let mut cb = ClassBuilder::new("java/lang/Thread", Some("java/lang/Object"));
    let super_init = cb.cp.methodref("java/lang/Object", "<init>", "()V");
    let mut init_code = vec![0x2a, 0xb7];
    init_code.extend_from_slice(&super_init.to_be_bytes());
    init_code.push(0xb1);
    cb.add_method(flags::ACC_PUBLIC, "<init>", "()V", Some(CodeSpec { max_stack: 1, max_locals: 1, bytes: init_code, exceptions: vec![] }));
    cb.add_method(flags::ACC_PUBLIC | flags::ACC_NATIVE, "start", "()V", None);
    cb.add_method(flags::ACC_PUBLIC | flags::ACC_NATIVE, "join", "()V", None);
    cb.add_method(flags::ACC_PUBLIC | flags::ACC_NATIVE, "interrupt", "()V", None);
    cb.add_method(flags::ACC_PUBLIC | flags::ACC_NATIVE, "sleep", "(J)V", None);
    cb.build()
}

fn write_class(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(format!("{name}.class"));
    std::fs::create_dir_all(path.parent().unwrap()).expect("create class package directory");
    std::fs::write(&path, bytes).expect("write class file");
}

/// Hand-builds every class `Vm::boot`'s `BOOTSTRAP_CORE_CLASSES` list
/// requires, plus `IncompatibleClassChangeError` (needed by the
/// interface-dispatch scenario but not itself a bootstrap class), and
/// writes them under `dir` following the `<name>.class` classpath layout
/// `Classpath::find` expects.
pub fn write_bootstrap_classes(dir: &Path) {
    write_class(dir, "java/lang/Object", &trivial_class("java/lang/Object", None));
    write_class(dir, "java/lang/Class", &trivial_class("java/lang/Class", Some("java/lang/Object")));
    write_class(dir, "java/lang/String", &trivial_class("java/lang/String", Some("java/lang/Object")));
    write_class(dir, "java/lang/Throwable", &trivial_class("java/lang/Throwable", Some("java/lang/Object")));
    write_class(dir, "java/lang/Exception", &trivial_class("java/lang/Exception", Some("java/lang/Throwable")));
    write_class(dir, "java/lang/RuntimeException", &trivial_class("java/lang/RuntimeException", Some("java/lang/Exception")));
    write_class(dir, "java/lang/Error", &trivial_class("java/lang/Error", Some("java/lang/Throwable")));
    write_class(dir, "java/lang/OutOfMemoryError", &trivial_class("java/lang/OutOfMemoryError", Some("java/lang/Error")));
    write_class(dir, "java/lang/StackOverflowError", &trivial_class("java/lang/StackOverflowError", Some("java/lang/Error")));
    write_class(dir, "java/lang/NullPointerException", &trivial_class("java/lang/NullPointerException", Some("java/lang/RuntimeException")));
    write_class(dir, "java/lang/ArithmeticException", &trivial_class("java/lang/ArithmeticException", Some("java/lang/RuntimeException")));
    write_class(
        dir,
        "java/lang/ArrayIndexOutOfBoundsException",
        &trivial_class("java/lang/ArrayIndexOutOfBoundsException", Some("java/lang/RuntimeException")),
    );
    write_class(dir, "java/lang/ClassCastException", &trivial_class("java/lang/ClassCastException", Some("java/lang/RuntimeException")));
    write_class(dir, "java/lang/Thread", &thread_class());
    write_class(dir, "java/lang/Cloneable", &trivial_interface("java/lang/Cloneable"));
    write_class(dir, "java/io/Serializable", &trivial_interface("java/io/Serializable"));
    write_class(
        dir,
        "java/lang/IncompatibleClassChangeError",
        &trivial_class("java/lang/IncompatibleClassChangeError", Some("java/lang/Error")),
    );
}

/// A fresh, unique classpath directory for one test, named after `tag` so a
/// failed run's leftovers are identifiable. Each `tests/*.rs` file is its
/// own process, so `process::id()` alone is enough to avoid collisions
/// between scenario tests; a stale directory from a previous crashed run is
/// removed first.
pub fn classpath_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("babe_vm_test_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scenario classpath directory");
    dir
}

pub fn boot_vm(dir: &Path, main_class: &str) -> Rc<babe_vm::Vm> {
    let config = babe_vm::VmConfig {
        bootstrap_classpath: vec![dir.to_path_buf()],
        user_classpath: vec![dir.to_path_buf()],
        heap_size: 4 * 1024 * 1024,
        max_file_handles: 16,
        main_class: main_class.to_string(),
        program_args: vec![],
        debug: false,
    };
    babe_vm::Vm::boot(config).expect("vm boots against hand-built bootstrap classes")
}

pub fn read_static_int(vm: &babe_vm::Vm, class_name: &[u8], field_name: &[u8]) -> i32 {
    let clazz = vm.class_pool.borrow().get(babe_vm::object::Reference::NULL, class_name).expect("class is loaded");
    let instance = clazz.as_instance().expect("instance clazz");
    let idx = instance
        .fields
        .iter()
        .find(|f| &*f.desc.name == field_name && f.static_index.is_some())
        .and_then(|f| f.static_index)
        .expect("static field exists");
    let v = instance.statics.borrow()[idx].as_i32();
    v
}

pub fn read_static_ref(vm: &babe_vm::Vm, class_name: &[u8], field_name: &[u8]) -> babe_vm::object::Reference {
    let clazz = vm.class_pool.borrow().get(babe_vm::object::Reference::NULL, class_name).expect("class is loaded");
    let instance = clazz.as_instance().expect("instance clazz");
    let idx = instance
        .fields
        .iter()
        .find(|f| &*f.desc.name == field_name && f.static_index.is_some())
        .and_then(|f| f.static_index)
        .expect("static field exists");
    let v = instance.statics.borrow()[idx].as_ref();
    v
}

/// Reads an instance field cell directly out of the heap, mirroring
/// `gc::trace_instance`'s pointer arithmetic: there is no safe public API
/// for reading a live object's fields from outside the interpreter.
///
/// SAFETY: `obj` must be a live instance allocated by `vm.new_instance` (or
/// the interpreter's `new` opcode) with at least `offset + 1` field cells,
/// and no `&mut Heap` borrow may be outstanding.
pub fn read_instance_int(vm: &babe_vm::Vm, obj: babe_vm::object::Reference, offset: usize) -> i32 {
    let heap = vm.heap.borrow();
    let base = heap.payload_ptr(obj.0) as *const babe_vm::object::ObjectHeader;
    unsafe {
        let cells = (base as *const babe_vm::object::Cell).add(1);
        (*cells.add(offset)).as_i32()
    }
}

/// Same idea as `read_instance_int`, for a reference-typed field.
///
/// SAFETY: see `read_instance_int`.
pub fn write_instance_ref(vm: &babe_vm::Vm, obj: babe_vm::object::Reference, offset: usize, value: babe_vm::object::Reference) {
    let heap = vm.heap.borrow();
    let base = heap.payload_ptr(obj.0) as *mut babe_vm::object::ObjectHeader;
    unsafe {
        let cells = (base as *mut babe_vm::object::Cell).add(1);
        *cells.add(offset) = babe_vm::object::Cell::from_ref(value);
    }
}
