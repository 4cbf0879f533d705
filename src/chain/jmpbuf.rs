use crate::error::ChainError;

/// Saved `ra` plus `s0..s11`; the saved `sp` follows them.
const REGS: usize = 13;

/// Array of riscv64 glibc `jmp_buf`s laid over each other.
///
/// Storage comes in blocks of 26 words: 13 return addresses followed by the
/// 13 stack pointers that go with them. A target at slot `s` therefore reads
/// `ra` from `s` and `sp` from `s + 13`; the `s0..s11` it restores are the
/// neighbouring targets' return addresses, which no chain relies on.
#[derive(Debug, Clone)]
pub struct JmpBuf {
    base: u64,
    next: usize,
    words: Vec<u64>,
}

impl JmpBuf {
    pub fn new(base: u64) -> JmpBuf {
        JmpBuf { base, next: 0, words: vec![0; 2 * REGS] }
    }

    /// Slot the next target will use.
    pub fn next_slot(&self) -> usize {
        self.next
    }

    /// Reserve a target that resumes at `ra` with stack `sp`. Returns the
    /// address to pass to `longjmp`.
    pub fn make_target(&mut self, ra: u64, sp: u64) -> u64 {
        let slot = self.next;
        self.words[slot] = ra;
        self.words[slot + REGS] = sp;

        self.next += 1;
        if self.next % REGS == 0 {
            self.next += REGS;
            self.words.resize(self.words.len() + 2 * REGS, 0);
        }

        self.base + slot as u64 * 8
    }

    /// Reserve two targets exactly 8 bytes apart, burning a slot if the
    /// pair would straddle a block.
    pub fn make_pair(&mut self, first: (u64, u64), second: (u64, u64)) -> Result<(u64, u64), ChainError> {
        if self.next % REGS == REGS - 1 {
            self.make_target(0, 0);
        }
        let a = self.make_target(first.0, first.1);
        let b = self.make_target(second.0, second.1);
        if b != a + 8 {
            return Err(ChainError::NonAdjacentTargets { first: a, second: b });
        }
        Ok((a, b))
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u64> {
        self.words
    }
}
