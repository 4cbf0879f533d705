//! Fixed memory layout shared by the harness and the chain compiler.
//!
//! Chains bake absolute addresses into their words, so these values are
//! constants rather than something negotiated with the kernel at runtime.

/// Size of every region: 256 MiB.
pub const REGION_SIZE: usize = 0x1000_0000;

pub const STACK_BASE: usize = 0x1000_0000;
pub const GADGET_BASE: usize = 0x2000_0000;
pub const SCRATCH_BASE: usize = 0x3000_0000;

/// Initial Brainfuck tape pointer, in the upper half of scratch.
pub const TAPE_BASE: usize = 0x3800_0000;

/// Where the target's libc is loaded (qemu-riscv64 user mode, no ASLR).
pub const LIBC_BASE: u64 = 0x3f_f7ea_1000;

pub const STACK_FILE: &str = "stackbuf.txt";
pub const GADGET_FILE: &str = "jmpbuf.txt";

/// One fixed-address region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpec {
    pub name: &'static str,
    pub base: usize,
    pub len: usize,
}

impl RegionSpec {
    /// Number of 64-bit words the region holds.
    pub const fn capacity_words(&self) -> usize {
        self.len / 8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub stack: RegionSpec,
    pub gadgets: RegionSpec,
    pub scratch: RegionSpec,
}

impl Layout {
    pub const DEFAULT: Layout = Layout {
        stack: RegionSpec { name: "stack", base: STACK_BASE, len: REGION_SIZE },
        gadgets: RegionSpec { name: "gadgets", base: GADGET_BASE, len: REGION_SIZE },
        scratch: RegionSpec { name: "scratch", base: SCRATCH_BASE, len: REGION_SIZE },
    };
}

impl Default for Layout {
    fn default() -> Self {
        Layout::DEFAULT
    }
}
