//! Command-line driver for the embeddable VM.
//!
//! Neither `exo-jvm` nor `exo-java-bin` carries a `main.rs` to ground this
//! on (the teacher never wired a CLI entry point at all), so the shape here
//! is borrowed from `lagertha-vm`'s `vm/src/main.rs`: a `clap::Parser`
//! struct, a small config-building function that can fail with a plain
//! `String`, and a `main` that turns any failure into a non-zero exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use babe_vm::vm::{Vm, VmConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Smallest heap the allocator is willing to run with: big enough to hold
/// the bootstrap core classes and their permanent-error instance.
const MIN_HEAP_BYTES: usize = 64 * 1024;
/// Largest heap `babevm` will request; the arena is a single contiguous
/// `alloc_zeroed` call, so anything past this is almost certainly a typo'd
/// `-Xmx` rather than an intentional request.
const MAX_HEAP_BYTES: usize = 4 * 1024 * 1024 * 1024;

const EXIT_OK: u8 = 0;
const EXIT_BAD_CONFIG: u8 = 2;
const EXIT_BOOT_FAILURE: u8 = 3;
const EXIT_UNCAUGHT_EXCEPTION: u8 = 4;

#[derive(Parser, Debug)]
#[command(version, about = "An embeddable JVM")]
struct Args {
    /// Bootstrap classpath entries (directories or .jar files), ';'-separated.
    #[arg(long = "bootclasspath", visible_alias = "Xbootclasspath", value_delimiter = ';')]
    bootstrap_classpath: Vec<PathBuf>,

    /// User classpath entries, ';'-separated.
    #[arg(short = 'c', long = "classpath", visible_alias = "cp", value_delimiter = ';')]
    classpath: Vec<PathBuf>,

    /// Heap size in bytes.
    #[arg(long = "heap", visible_alias = "Xmx", default_value_t = 16 * 1024 * 1024)]
    heap_size: usize,

    /// Maximum simultaneously open file handles for classpath jar/dir access.
    #[arg(long = "max-file-handles", default_value_t = 64)]
    max_file_handles: usize,

    /// Enable the fast-path-rewrite-disabling debug mode.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Fully-qualified main class, e.g. `com.example.Main`.
    main_class: String,

    /// Arguments passed through to the Java `main(String[])`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

fn build_config(args: Args) -> Result<VmConfig, String> {
    if args.heap_size < MIN_HEAP_BYTES || args.heap_size > MAX_HEAP_BYTES {
        return Err(format!(
            "heap size {} outside supported range [{MIN_HEAP_BYTES}, {MAX_HEAP_BYTES}]",
            args.heap_size
        ));
    }
    if args.max_file_handles == 0 {
        return Err("max-file-handles must be at least 1".into());
    }
    let main_class = args.main_class.replace('.', "/");
    Ok(VmConfig {
        bootstrap_classpath: args.bootstrap_classpath,
        user_classpath: args.classpath,
        heap_size: args.heap_size,
        max_file_handles: args.max_file_handles,
        main_class,
        program_args: args.program_args,
        debug: args.debug,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("babevm: {e}");
            return ExitCode::from(EXIT_BAD_CONFIG);
        }
    };

    let vm = match Vm::boot(config) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("babevm: fatal error booting vm: {e}");
            return ExitCode::from(EXIT_BOOT_FAILURE);
        }
    };

    match babe_vm::interp::run(&vm) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            eprintln!("babevm: uncaught exception escaped main thread: {e}");
            ExitCode::from(EXIT_UNCAUGHT_EXCEPTION)
        }
    }
}
