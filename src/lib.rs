//! Stage a ROP chain at fixed addresses and pivot into it.
//!
//! `ropstage` maps a faked stack and a jump-buffer table from
//! `stackbuf.txt` / `jmpbuf.txt`, maps a scratch area, then points the stack
//! pointer at the fake stack. `bf2rop` produces those two files from a
//! Brainfuck program.

pub mod chain;
pub mod error;
pub mod launcher;
pub mod layout;
pub mod loader;
pub mod region;
pub mod trampoline;

/// Log straight to stdout, one flushed record at a time.
///
/// `RUST_LOG` overrides `default`.
pub fn init_logging(default: log::LevelFilter) {
    env_logger::builder()
        .filter_level(default)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format_timestamp(None)
        .init();
}
