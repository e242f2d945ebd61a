//! The `Vm` instance: the singleton that owns the heap, the pools, the
//! class pool, and the thread scheduler, per the data model's "treat as
//! singletons owned by a VM instance; pass the instance explicitly" rule.
//!
//! Grounded on `exo-jvm/src/vm/mod.rs`'s `VM { gc: Arc<Mutex<VMGcState>> }`
//! shape (one struct holding every process-wide subsystem) but dropping its
//! `Arc<Mutex<_>>`/OS-thread plumbing: this scheduler is cooperative and
//! single-native-thread, so every field is a plain `RefCell`.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, error, info, trace};

use crate::class::loader::Classpath;
use crate::class::{Clazz, ClazzRef, ClassPool};
use crate::error::{Result, VmError, VmFault};
use crate::heap::Heap;
use crate::native::NativeRegistry;
use crate::object::{Cell, Reference};
use crate::pool::{InternPool, UtfPool};
use crate::thread::Scheduler;

/// Boot-time configuration, built by `babe-bin`'s CLI layer and handed to
/// `Vm::boot` by value. No other configuration surface exists.
pub struct VmConfig {
    pub bootstrap_classpath: Vec<PathBuf>,
    pub user_classpath: Vec<PathBuf>,
    pub heap_size: usize,
    pub max_file_handles: usize,
    pub main_class: String,
    pub program_args: Vec<String>,
    pub debug: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            bootstrap_classpath: Vec::new(),
            user_classpath: Vec::new(),
            heap_size: 16 * 1024 * 1024,
            max_file_handles: 64,
            main_class: String::new(),
            program_args: Vec::new(),
            debug: false,
        }
    }
}

/// The pre-cooked `OutOfMemoryError` instance: the allocator's sole means of
/// raising OOM without itself allocating.
pub struct PermanentRoots {
    pub out_of_memory: Reference,
    pub null_sentinel: Reference,
}

pub struct Vm {
    pub heap: RefCell<Heap>,
    pub class_pool: RefCell<ClassPool>,
    pub utf_pool: RefCell<UtfPool>,
    pub intern_pool: RefCell<InternPool>,
    pub bootstrap_classpath: Classpath,
    pub user_classpath: Classpath,
    pub natives: NativeRegistry,
    pub scheduler: RefCell<Scheduler>,
    pub permanent_roots: RefCell<Option<PermanentRoots>>,
    pub debug: bool,
}

impl Vm {
    /// Allocate the heap and the empty pools. The bootstrap core classes are
    /// not yet loaded; call `boot` to bring the VM to a runnable state.
    pub fn new(config: &VmConfig) -> std::result::Result<Self, VmFault> {
        let heap = Heap::new(config.heap_size)?;
        Ok(Self {
            heap: RefCell::new(heap),
            class_pool: RefCell::new(ClassPool::new()),
            utf_pool: RefCell::new(UtfPool::new()),
            intern_pool: RefCell::new(InternPool::new()),
            bootstrap_classpath: Classpath::new(config.bootstrap_classpath.clone()),
            user_classpath: Classpath::new(config.user_classpath.clone()),
            natives: NativeRegistry::with_builtins(),
            scheduler: RefCell::new(Scheduler::new()),
            permanent_roots: RefCell::new(None),
            debug: config.debug,
        })
    }

    /// §2 control flow: allocate the heap (done in `new`), bootstrap the
    /// pools (done in `new`), load the bootstrap core classes, construct the
    /// initial thread, and leave the VM ready for the interpreter to enter.
    pub fn boot(config: VmConfig) -> Result<Rc<Self>> {
        info!(heap_size = config.heap_size, "booting vm");
        let vm = Rc::new(Self::new(&config).map_err(|f| {
            error!(?f, "fatal error during pre-init allocation");
            VmError::Internal(format!("{f}"))
        })?);

        for name in BOOTSTRAP_CORE_CLASSES {
            trace!(class = name, "loading bootstrap core class");
            vm.resolve_class(Reference::NULL, name.as_bytes()).map_err(|e| {
                error!(class = name, error = %e, "unresolvable bootstrap class");
                VmError::Internal(format!("unresolvable bootstrap class {name}: {e}"))
            })?;
        }

        let out_of_memory = vm.allocate_permanent_error(b"java/lang/OutOfMemoryError")?;
        let null_sentinel = Reference::NULL;
        *vm.permanent_roots.borrow_mut() = Some(PermanentRoots { out_of_memory, null_sentinel });

        vm.scheduler.borrow_mut().spawn_main(vm.clone(), &config.main_class, &config.program_args)?;
        debug!("vm boot complete");
        Ok(vm)
    }

    /// Instantiate a throwable-shaped object ahead of time, for errors that
    /// must be raiseable without allocating (`OutOfMemoryError`).
    fn allocate_permanent_error(&self, class_name: &[u8]) -> Result<Reference> {
        let clazz = self.resolve_class(Reference::NULL, class_name)?;
        self.new_instance(&clazz)
    }

    /// `new`'s allocation half, shared by the interpreter's `new` opcode and
    /// the permanent-error bootstrap above. Zeroes all field cells per the
    /// object model.
    pub fn new_instance(&self, clazz: &ClazzRef) -> Result<Reference> {
        let Clazz::Instance(instance) = &**clazz else {
            return Err(VmError::Instantiation(String::from_utf8_lossy(clazz.name()).into_owned()));
        };
        let payload = crate::object::instance_payload_size(instance.instance_fields_count);
        let ptr = self
            .heap
            .borrow_mut()
            .calloc(payload, crate::heap::Kind::Instance)
            .ok_or(VmError::OutOfMemory)?;
        let header = crate::object::ObjectHeader { clazz: Cell::from_i32(clazz.header().id as i32) };
        // SAFETY: `ptr` was just allocated with room for an ObjectHeader
        // followed by `instance_fields_count` cells, per `instance_payload_size`.
        unsafe {
            let base = self.heap.borrow().payload_ptr(ptr) as *mut crate::object::ObjectHeader;
            base.write(header);
        }
        Ok(Reference(ptr))
    }

    /// Recover the clazz of a heap object from its header's clazz-id cell.
    pub fn clazz_of(&self, obj: Reference) -> Result<ClazzRef> {
        let id = unsafe {
            let base = self.heap.borrow().payload_ptr(obj.0) as *const crate::object::ObjectHeader;
            (*base).clazz.as_i32() as u32
        };
        self.class_pool.borrow().by_id(id).ok_or_else(|| VmError::Internal("dangling clazz id".into()))
    }

    pub fn intern_string(&self, content: &[u8]) -> Result<Reference> {
        if let Some(r) = self.intern_pool.borrow().lookup(content) {
            return Ok(r);
        }
        let clazz = self.resolve_class(Reference::NULL, b"java/lang/String")?;
        let r = self.new_instance(&clazz)?;
        self.intern_pool.borrow_mut().intern(content.to_vec(), r);
        Ok(r)
    }
}

const BOOTSTRAP_CORE_CLASSES: &[&str] = &[
    "java/lang/Object",
    "java/lang/Class",
    "java/lang/String",
    "java/lang/Throwable",
    "java/lang/Exception",
    "java/lang/RuntimeException",
    "java/lang/Error",
    "java/lang/OutOfMemoryError",
    "java/lang/StackOverflowError",
    "java/lang/NullPointerException",
    "java/lang/ArithmeticException",
    "java/lang/ArrayIndexOutOfBoundsException",
    "java/lang/ClassCastException",
    "java/lang/Thread",
    "java/lang/Cloneable",
    "java/io/Serializable",
];
