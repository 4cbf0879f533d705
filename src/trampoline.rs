//! The stack pivot.
//!
//! This is the only place control leaves the program for data it loaded.
//! Whatever happens afterwards is decided by the chain.

#[cfg(any(target_arch = "x86_64", target_arch = "riscv64", target_arch = "aarch64"))]
use core::arch::asm;

/// Index of the stack word the pivot returns through.
#[cfg(target_arch = "x86_64")]
pub const RETURN_SLOT: usize = 0;

/// Index of the stack word the pivot returns through.
///
/// A 16-byte frame epilogue: word 0 is the saved frame pointer.
#[cfg(not(target_arch = "x86_64"))]
pub const RETURN_SLOT: usize = 1;

/// Point the stack pointer at `stack` and return through it.
///
/// # Safety
///
/// Never returns. `stack` must be a mapped, writable region holding a chain;
/// the calling frame is abandoned.
#[cfg(target_arch = "x86_64")]
pub unsafe fn pivot(stack: *const u8) -> ! {
    asm!(
        "mov rsp, {stack}",
        "ret",
        stack = in(reg) stack,
        options(noreturn)
    );
}

/// Point the stack pointer at `stack` and run a leaf epilogue off it:
/// `s0` from word 0, `ra` from word 1, pop 16 bytes, return.
///
/// # Safety
///
/// Never returns. `stack` must be a mapped, writable region holding a chain;
/// the calling frame is abandoned.
#[cfg(target_arch = "riscv64")]
pub unsafe fn pivot(stack: *const u8) -> ! {
    asm!(
        "mv sp, {stack}",
        "ld s0, 0(sp)",
        "ld ra, 8(sp)",
        "addi sp, sp, 16",
        "ret",
        stack = in(reg) stack,
        options(noreturn)
    );
}

/// Point the stack pointer at `stack` and pop `x29`/`x30` off it.
///
/// # Safety
///
/// Never returns. `stack` must be a mapped, writable region holding a chain;
/// the calling frame is abandoned.
#[cfg(target_arch = "aarch64")]
pub unsafe fn pivot(stack: *const u8) -> ! {
    asm!(
        "mov sp, {stack}",
        "ldp x29, x30, [sp], #16",
        "ret",
        stack = in(reg) stack,
        options(noreturn)
    );
}

/// # Safety
///
/// Always safe to call; there is no pivot for this architecture.
#[cfg(not(any(target_arch = "x86_64", target_arch = "riscv64", target_arch = "aarch64")))]
pub unsafe fn pivot(stack: *const u8) -> ! {
    log::error!("no stack pivot for this architecture (stack at {:p})", stack);
    std::process::exit(1);
}
