//! VM-level error vocabulary.
//!
//! Grounded on `exo-class-file/src/error.rs`'s flat `thiserror` enum shape,
//! split into the two families the error taxonomy calls for: `VmFault` is
//! always process-terminating and never Java-visible, while `VmError` is the
//! Rust-level vocabulary the interpreter's helpers return on their way to
//! being turned into a thrown `Throwable` object by the try/catch bridge
//! (see `trycatch.rs`). Neither type is itself a Java exception; `VmError`
//! just names *which* Java exception class to construct and with what
//! message.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VmError>;

/// A condition with no Java-visible representation: the VM exits.
#[derive(Debug, Error)]
pub enum VmFault {
    #[error("failed to allocate the {0}-byte heap arena")]
    ArenaAllocation(usize),
    #[error("heap corruption: {0}")]
    InvalidChunk(&'static str),
    #[error("bootstrap class {0} could not be loaded")]
    UnresolvableBootstrapClass(String),
    #[error("try/catch stack underflow")]
    TryCatchUnderflow,
    #[error("breakpoint opcode encountered outside a debug session")]
    UnexpectedBreakpoint,
    #[error("allocation requested before the VM finished initializing")]
    PreInitAllocationFailure,
}

/// The Rust-level vocabulary for conditions that become a thrown `Throwable`.
/// Each variant names the JVM exception/error class the try/catch bridge
/// (`trycatch.rs`) should instantiate and populate with `message()`.
#[derive(Debug, Error, Clone)]
pub enum VmError {
    #[error("java/lang/OutOfMemoryError")]
    OutOfMemory,
    #[error("java/lang/StackOverflowError")]
    StackOverflow,
    #[error("java/lang/NoClassDefFoundError: {0}")]
    NoClassDefFound(String),
    #[error("java/lang/ClassNotFoundException: {0}")]
    ClassNotFound(String),
    #[error("java/lang/ClassFormatError: {0}")]
    ClassFormat(String),
    #[error("java/lang/IncompatibleClassChangeError: {0}")]
    IncompatibleClassChange(String),
    #[error("java/lang/IllegalAccessError: {0}")]
    IllegalAccess(String),
    #[error("java/lang/VerifyError: {0}")]
    Verify(String),
    #[error("java/lang/NoSuchMethodError: {0}")]
    NoSuchMethod(String),
    #[error("java/lang/NoSuchFieldError: {0}")]
    NoSuchField(String),
    #[error("java/lang/AbstractMethodError: {0}")]
    AbstractMethod(String),
    #[error("java/lang/UnsatisfiedLinkError: {0}")]
    UnsatisfiedLink(String),
    #[error("java/lang/NullPointerException")]
    NullPointer,
    #[error("java/lang/ArrayIndexOutOfBoundsException: {0}")]
    ArrayIndexOutOfBounds(i32),
    #[error("java/lang/ArrayStoreException: {0}")]
    ArrayStore(String),
    #[error("java/lang/ClassCastException: {0}")]
    ClassCast(String),
    #[error("java/lang/NegativeArraySizeException: {0}")]
    NegativeArraySize(i32),
    #[error("java/lang/ArithmeticException: {0}")]
    Arithmetic(&'static str),
    #[error("java/lang/IllegalMonitorStateException")]
    IllegalMonitorState,
    #[error("java/lang/ClassCircularityError: {0}")]
    ClassCircularity(String),
    #[error("java/lang/InstantiationError: {0}")]
    Instantiation(String),
    #[error("java/lang/InternalError: {0}")]
    Internal(String),
    #[error("java/lang/InterruptedException")]
    Interrupted,
    /// `athrow` on an already-constructed object, or a VM-raised error that
    /// has already been materialized into a `Throwable` instance once while
    /// searching for a handler. Carrying the object through propagation
    /// means repeated unwinding never re-allocates or loses the thrown
    /// object's identity/state.
    #[error("java/lang/Throwable (thrown object)")]
    Thrown(crate::object::Reference),
}
