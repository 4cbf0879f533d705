//! ROP chain model.
//!
//! A chain is a tree of gadgets. Leaves are single libc gadgets; sequences
//! run their parts in order, each part returning into the next. Placing a
//! chain gives every frame an absolute address, which lets later gadgets
//! write into the frames of gadgets that have not run yet.

pub mod brainfuck;
pub mod jmpbuf;
pub mod primitive;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::ChainError;
use crate::layout::{GADGET_FILE, SCRATCH_BASE, STACK_FILE};

pub use jmpbuf::JmpBuf;
pub use primitive::{Primitive, Slot};

pub(crate) const SCRATCH: u64 = SCRATCH_BASE as u64;

/// Sequences that patch their own parts once they know where they live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Plain,
    WriteVal,
    ConditionalPivot,
    CallFunc,
    OutputChar,
    InputChar,
    BeginLoop,
    Increment,
    Decrement,
}

#[derive(Debug, Clone)]
pub enum Gadget {
    Leaf { op: Primitive, frame: Option<u64> },
    Seq { kind: Kind, frame: Option<u64>, parts: Vec<Gadget> },
}

impl Gadget {
    pub fn leaf(op: Primitive) -> Gadget {
        Gadget::Leaf { op, frame: None }
    }

    pub fn seq(kind: Kind, parts: Vec<Gadget>) -> Gadget {
        Gadget::Seq { kind, frame: None, parts }
    }

    pub fn entry(&self) -> u64 {
        match self {
            Gadget::Leaf { op, .. } => op.entry(),
            Gadget::Seq { parts, .. } => parts.first().map_or(0, Gadget::entry),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Gadget::Leaf { op, .. } => op.size(),
            Gadget::Seq { parts, .. } => parts.iter().map(Gadget::size).sum(),
        }
    }

    pub fn frame(&self) -> Result<u64, ChainError> {
        match self {
            Gadget::Leaf { frame, .. } | Gadget::Seq { frame, .. } => {
                frame.ok_or(ChainError::UnplacedGadget)
            }
        }
    }

    pub fn part(&self, index: usize) -> Result<&Gadget, ChainError> {
        match self {
            Gadget::Seq { parts, .. } => parts
                .get(index)
                .ok_or(ChainError::UnexpectedGadget { expected: "sequence part" }),
            Gadget::Leaf { .. } => Err(ChainError::UnexpectedGadget { expected: "sequence" }),
        }
    }

    pub fn part_mut(&mut self, index: usize) -> Result<&mut Gadget, ChainError> {
        match self {
            Gadget::Seq { parts, .. } => parts
                .get_mut(index)
                .ok_or(ChainError::UnexpectedGadget { expected: "sequence part" }),
            Gadget::Leaf { .. } => Err(ChainError::UnexpectedGadget { expected: "sequence" }),
        }
    }

    /// Stack address of the value a placed `PopA0` loads into a0.
    pub fn popped_a0(&self) -> Result<u64, ChainError> {
        match self {
            Gadget::Leaf { op: Primitive::PopA0 { .. }, .. } => Ok(self.frame()? + 8),
            _ => Err(ChainError::UnexpectedGadget { expected: "pop a0" }),
        }
    }

    /// Stack address of the value a placed `PopS0` loads into s0.
    pub fn popped_s0(&self) -> Result<u64, ChainError> {
        match self {
            Gadget::Leaf { op: Primitive::PopS0 { .. }, .. } => self.frame(),
            _ => Err(ChainError::UnexpectedGadget { expected: "pop s0" }),
        }
    }

    /// Assign frame addresses starting at `at`.
    ///
    /// Self-patching sequences are placed, patched, then placed again.
    /// Patching a call allocates a jump buffer target every time, so
    /// enclosing sequences that place twice leave a spent target behind.
    pub fn place(&mut self, at: u64, jmp: &mut JmpBuf) -> Result<(), ChainError> {
        match self {
            Gadget::Leaf { frame, .. } => {
                *frame = Some(at);
                Ok(())
            }
            Gadget::Seq { kind, frame, parts } => {
                *frame = Some(at);
                place_parts(parts, at, jmp)?;
                if patch(*kind, parts, jmp)? {
                    place_parts(parts, at, jmp)?;
                }
                Ok(())
            }
        }
    }

    /// Lay out the frames, the last one returning into `ra`.
    pub fn synthesize(&self, ra: u64, out: &mut Vec<u64>) -> Result<(), ChainError> {
        match self {
            Gadget::Leaf { op, .. } => op.frame(ra, out),
            Gadget::Seq { parts, .. } => {
                for (i, part) in parts.iter().enumerate() {
                    let next = parts.get(i + 1).map_or(ra, Gadget::entry);
                    part.synthesize(next, out)?;
                }
                Ok(())
            }
        }
    }
}

fn place_parts(parts: &mut [Gadget], at: u64, jmp: &mut JmpBuf) -> Result<(), ChainError> {
    let mut next = at;
    for part in parts {
        part.place(next, jmp)?;
        next += part.size();
    }
    Ok(())
}

fn part_at(parts: &[Gadget], index: usize) -> Result<&Gadget, ChainError> {
    parts
        .get(index)
        .ok_or(ChainError::UnexpectedGadget { expected: "sequence part" })
}

/// Fill in the forward references of a placed sequence. Returns whether
/// anything changed.
fn patch(kind: Kind, parts: &mut [Gadget], jmp: &mut JmpBuf) -> Result<bool, ChainError> {
    match kind {
        Kind::Plain => return Ok(false),
        Kind::WriteVal => {
            parts[0] = write_a0(Some(part_at(parts, 3)?.popped_a0()?), 0);
        }
        Kind::ConditionalPivot => {
            parts[0] = write_a0(Some(part_at(parts, 2)?.popped_a0()?), 0);
        }
        Kind::CallFunc => {
            let landing = part_at(parts, 5)?;
            let (landing_entry, landing_frame) = (landing.entry(), landing.frame()?);
            let landing_a0 = landing.popped_a0()?;
            let vals = [0, 0, 0, part_at(parts, 6)?.entry(), SCRATCH, part_at(parts, 7)?.entry()];
            parts[0] = write_vals(&vals, landing_frame);
            parts[1] = write_a0(Some(landing_a0), 0);
            parts[3] = stack_pivot_to(landing_entry, landing_frame, jmp);
        }
        Kind::OutputChar => {
            parts[0] = write_a0(Some(part_at(parts, 4)?.popped_a0()?), 0);
        }
        Kind::InputChar => {
            parts[0] = write_a0(Some(part_at(parts, 7)?.popped_a0()?), 0);
            parts[3] = write_a0(Some(part_at(parts, 5)?.popped_s0()?), 0);
        }
        Kind::BeginLoop => {
            parts[0] = write_a0(Some(part_at(parts, 1)?.popped_a0()?), 0);
            parts[2] = write_a0(Some(part_at(parts, 7)?.popped_a0()?), 0);
        }
        Kind::Increment => {
            parts[0] = write_a0(Some(part_at(parts, 9)?.popped_a0()?), 0);
            parts[3] = write_a0(Some(part_at(parts, 7)?.popped_s0()?), 0);
        }
        Kind::Decrement => {
            parts[0] = write_a0(Some(part_at(parts, 10)?.popped_a0()?), 0);
            parts[3] = write_a0(Some(part_at(parts, 8)?.popped_s0()?), 0);
        }
    }
    Ok(true)
}

pub(crate) fn op(p: Primitive) -> Gadget {
    Gadget::leaf(p)
}

pub(crate) fn pop_a0(a0: u64) -> Gadget {
    op(Primitive::PopA0 { a0: Some(a0) })
}

pub(crate) fn pop_s0(s0: u64) -> Gadget {
    op(Primitive::PopS0 { s0: Some(s0) })
}

pub fn nop() -> Gadget {
    op(Primitive::Nop)
}

/// Store a0 at `dest`. Clobbers s0 (left as `next_s0`).
pub fn write_a0(dest: Slot, next_s0: u64) -> Gadget {
    Gadget::seq(
        Kind::Plain,
        vec![
            op(Primitive::PopS0 { s0: dest.map(|d| d.wrapping_sub(0x10)) }),
            op(Primitive::SdA0Off10S0 { s0: next_s0 }),
        ],
    )
}

/// `longjmp` through a target filled in later.
pub fn stack_pivot() -> Gadget {
    Gadget::seq(Kind::Plain, vec![op(Primitive::PopA0 { a0: None }), op(Primitive::Longjmp)])
}

/// `longjmp` to `ra` with the stack at `sp`.
pub fn stack_pivot_to(ra: u64, sp: u64, jmp: &mut JmpBuf) -> Gadget {
    let target = jmp.make_target(ra, sp);
    Gadget::seq(Kind::Plain, vec![pop_a0(target), op(Primitive::Longjmp)])
}

/// a0 = [a0 + 8]. Clobbers a4, a5 and s0.
pub fn load_a0() -> Gadget {
    let prepare = Gadget::seq(
        Kind::Plain,
        vec![pop_s0(SCRATCH), op(Primitive::LdA5S0 { a4: 0, s0: SCRATCH })],
    );
    Gadget::seq(Kind::Plain, vec![prepare, op(Primitive::LdA0Off8A0 { a4: 0, s0: SCRATCH })])
}

/// Branch on a0: non-zero takes the first target of the pair set by
/// [`set_branch_targets`], zero the second. Clobbers a0.
pub fn conditional_pivot() -> Gadget {
    let mut parts = vec![
        write_a0(None, 0),
        op(Primitive::PopA5 { a5: 0 }),
        pop_a0(0),
        op(Primitive::SeqzA0),
        op(Primitive::PopS0S1S2 { s0: 0, s1: 0, s2: SCRATCH }),
    ];
    // a5 = 8 * (a0 == 0)
    for _ in 0..8 {
        parts.push(op(Primitive::AddA5A0 { s0: 0, s1: 0, s2: SCRATCH, s3: 0 }));
    }
    parts.extend([
        op(Primitive::PopA0 { a0: None }),
        op(Primitive::AddA0A5),
        op(Primitive::Longjmp),
    ]);
    Gadget::seq(Kind::ConditionalPivot, parts)
}

/// Index of the pop that loads the pair's base address.
const BRANCH_TABLE_POP: usize = 13;

/// Allocate the adjacent target pair for a placed conditional pivot.
pub fn set_branch_targets(
    pivot: &mut Gadget,
    taken: (u64, u64),
    not_taken: (u64, u64),
    jmp: &mut JmpBuf,
) -> Result<(), ChainError> {
    let (first, _) = jmp.make_pair(taken, not_taken)?;
    let slot = pivot.part_mut(BRANCH_TABLE_POP)?;
    if !matches!(slot, Gadget::Leaf { op: Primitive::PopA0 { .. }, .. }) {
        return Err(ChainError::UnexpectedGadget { expected: "pop a0" });
    }
    *slot = pop_a0(first);
    Ok(())
}

/// Store `val` at `dest`, keeping a0.
pub fn write_val(val: u64, dest: u64) -> Gadget {
    Gadget::seq(
        Kind::WriteVal,
        vec![write_a0(None, 0), pop_a0(val), write_a0(Some(dest), 0), pop_a0(0)],
    )
}

pub fn write_vals(vals: &[u64], dest: u64) -> Gadget {
    let parts = vals
        .iter()
        .enumerate()
        .map(|(i, &v)| write_val(v, dest.wrapping_add(8 * i as u64)))
        .collect();
    Gadget::seq(Kind::Plain, parts)
}

/// Call `func(a0)` on a fresh stretch of stack; the result ends up in a0.
/// May clobber every caller-saved register.
pub fn call_func(func: u64) -> Gadget {
    Gadget::seq(
        Kind::CallFunc,
        vec![
            write_vals(&[0; 6], 0),
            write_a0(None, 0),
            op(Primitive::PopA5 { a5: func }),
            stack_pivot(),
            op(Primitive::Spacer { words: 512 }),
            pop_a0(0),
            pop_s0(SCRATCH),
            op(Primitive::CallA5 { s0: 0 }),
        ],
    )
}

/// Chain words ready for the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub stack: Vec<u64>,
    pub jmpbuf: Vec<u64>,
}

fn write_words<W: Write>(mut w: W, words: &[u64]) -> io::Result<()> {
    for word in words {
        writeln!(w, "{:x}", word)?;
    }
    w.flush()
}

impl Program {
    pub fn write_stack<W: Write>(&self, w: W) -> io::Result<()> {
        write_words(w, &self.stack)
    }

    pub fn write_jmpbuf<W: Write>(&self, w: W) -> io::Result<()> {
        write_words(w, &self.jmpbuf)
    }

    /// Write `stackbuf.txt` and `jmpbuf.txt` into `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), ChainError> {
        self.write_stack(io::BufWriter::new(fs::File::create(dir.join(STACK_FILE))?))?;
        self.write_jmpbuf(io::BufWriter::new(fs::File::create(dir.join(GADGET_FILE))?))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_returns_into_next_part() {
        let g = Gadget::seq(Kind::Plain, vec![nop(), pop_a0(5)]);
        let mut out = Vec::new();
        g.synthesize(0xfeed, &mut out).unwrap();
        assert_eq!(out, [0, pop_a0(0).entry(), 0, 5, 0, 0xfeed]);
        assert_eq!(g.size(), 0x30);
        assert_eq!(g.entry(), nop().entry());
    }

    #[test]
    fn placement_is_sequential() {
        let mut g = Gadget::seq(Kind::Plain, vec![nop(), pop_a0(5), pop_s0(1)]);
        g.place(0x1000, &mut JmpBuf::new(0)).unwrap();
        assert_eq!(g.part(1).unwrap().popped_a0().unwrap(), 0x1018);
        assert_eq!(g.part(2).unwrap().popped_s0().unwrap(), 0x1030);
    }

    #[test]
    fn write_a0_targets_slot() {
        let g = write_a0(Some(0x1234), 7);
        let mut out = Vec::new();
        g.synthesize(0, &mut out).unwrap();
        assert_eq!(out[0], 0x1224);
        assert_eq!(out[2], 7);
    }

    #[test]
    fn write_val_patches_its_restore() {
        let mut g = write_val(0x41, 0x5000);
        g.place(0x1000, &mut JmpBuf::new(0)).unwrap();
        let mut out = Vec::new();
        g.synthesize(0, &mut out).unwrap();
        // the saved a0 lands in the final pop's slot
        let restore = g.part(3).unwrap().popped_a0().unwrap();
        assert_eq!(restore, 0x1000 + 0x60 + 8);
        assert_eq!(out[0], restore - 0x10);
        assert_eq!(out[5], 0x41);
        assert_eq!(out[8], 0x5000 - 0x10);
    }

    #[test]
    fn unplaced_pop_has_no_slot_address() {
        assert!(matches!(pop_a0(0).popped_a0(), Err(ChainError::UnplacedGadget)));
        assert!(matches!(nop().popped_a0(), Err(ChainError::UnexpectedGadget { .. })));
    }

    #[test]
    fn call_func_pivots_onto_its_landing_pad() {
        let mut jmp = JmpBuf::new(0x2000_0000);
        let mut g = call_func(0xf00);
        g.place(0x1000_0000, &mut jmp).unwrap();
        // write_vals (0x300) + write_a0 + pop a5 + pivot + 512 spacer words
        let landing = 0x1000_0000 + 0x300 + 0x20 + 0x20 + 0x20 + 0x1000;
        assert_eq!(g.part(5).unwrap().frame().unwrap(), landing);
        assert_eq!(jmp.words()[0], pop_a0(0).entry());
        assert_eq!(jmp.words()[13], landing);
        assert_eq!(jmp.next_slot(), 1);

        let mut out = Vec::new();
        g.synthesize(0, &mut out).unwrap();
        assert_eq!(out.len() as u64 * 8, g.size());
    }

    #[test]
    fn branch_targets_replace_the_table_pop() {
        let mut jmp = JmpBuf::new(0x2000_0000);
        let mut g = conditional_pivot();
        g.place(0x1000_0000, &mut jmp).unwrap();
        set_branch_targets(&mut g, (1, 2), (3, 4), &mut jmp).unwrap();
        let mut out = Vec::new();
        g.synthesize(0, &mut out).unwrap();
        assert!(out.contains(&0x2000_0000));
    }

    #[test]
    fn program_text_format() {
        let p = Program { stack: vec![0, 0xdeadbeef], jmpbuf: vec![] };
        let mut buf = Vec::new();
        p.write_stack(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "0\ndeadbeef\n");
    }
}
