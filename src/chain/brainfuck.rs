//! Brainfuck → ROP.
//!
//! a0 holds the tape pointer, starting at [`TAPE_BASE`]. Cells are 8 bytes
//! wide. Every instruction that needs a0 twice first copies it into a later
//! pop, so the chain rewrites itself as it runs.

use crate::error::ChainError;
use crate::layout::{GADGET_BASE, LIBC_BASE, STACK_BASE, TAPE_BASE};

use super::{
    call_func, conditional_pivot, load_a0, nop, op, pop_a0, pop_s0, set_branch_targets,
    stack_pivot, stack_pivot_to, write_a0, Gadget, JmpBuf, Kind, Primitive, Program,
};

const PUTCHAR: u64 = 0x5b70a;
const GETCHAR: u64 = 0x5eaa6;
const EXIT: u64 = 0x342e4;

const INSTRUCTIONS: &[u8] = b"><+-.,[]";

/// Parts before the first instruction: entry NOP, tape pointer load.
const PROLOGUE: usize = 2;

fn add8() -> Gadget {
    Gadget::seq(Kind::Plain, (0..8).map(|_| op(Primitive::Add1A0 { s0: 0 })).collect())
}

fn sub8() -> Gadget {
    Gadget::seq(Kind::Plain, (0..4).map(|_| op(Primitive::Dec2A0)).collect())
}

fn increment() -> Gadget {
    Gadget::seq(
        Kind::Increment,
        vec![
            write_a0(None, 0),
            sub8(),
            sub8(),
            write_a0(None, 0),
            add8(),
            load_a0(),
            op(Primitive::Add1A0 { s0: 0 }),
            pop_s0(0),
            op(Primitive::SdA0Off10S0 { s0: 0 }),
            pop_a0(0),
        ],
    )
}

fn decrement() -> Gadget {
    Gadget::seq(
        Kind::Decrement,
        vec![
            write_a0(None, 0),
            sub8(),
            sub8(),
            write_a0(None, 0),
            add8(),
            load_a0(),
            // +1 -2
            op(Primitive::Add1A0 { s0: 0 }),
            op(Primitive::Dec2A0),
            pop_s0(0),
            op(Primitive::SdA0Off10S0 { s0: 0 }),
            pop_a0(0),
        ],
    )
}

fn output_char() -> Gadget {
    Gadget::seq(
        Kind::OutputChar,
        vec![write_a0(None, 0), sub8(), load_a0(), call_func(LIBC_BASE + PUTCHAR), pop_a0(0)],
    )
}

fn input_char() -> Gadget {
    Gadget::seq(
        Kind::InputChar,
        vec![
            write_a0(None, 0),
            sub8(),
            sub8(),
            write_a0(None, 0),
            call_func(LIBC_BASE + GETCHAR),
            pop_s0(0),
            op(Primitive::SdA0Off10S0 { s0: 0 }),
            pop_a0(0),
        ],
    )
}

fn begin_loop() -> Gadget {
    Gadget::seq(
        Kind::BeginLoop,
        vec![
            write_a0(None, 0),
            // loop head: end_loop pivots back here
            pop_a0(0),
            write_a0(None, 0),
            write_a0(None, 0),
            sub8(),
            load_a0(),
            conditional_pivot(),
            // loop body starts here
            pop_a0(0),
        ],
    )
}

fn end_loop() -> Gadget {
    Gadget::seq(Kind::Plain, vec![write_a0(None, 0), stack_pivot(), pop_a0(0)])
}

fn instruction(b: u8) -> Option<Gadget> {
    Some(match b {
        b'>' => add8(),
        b'<' => sub8(),
        b'+' => increment(),
        b'-' => decrement(),
        b'.' => output_char(),
        b',' => input_char(),
        b'[' => begin_loop(),
        b']' => end_loop(),
        _ => return None,
    })
}

/// `(open, close)` instruction indices, ordered by `open`.
fn match_loops(ops: &[u8]) -> Result<Vec<(usize, usize)>, ChainError> {
    let mut open = Vec::new();
    let mut pairs = Vec::new();
    for (i, &b) in ops.iter().enumerate() {
        match b {
            b'[' => open.push(i),
            b']' => {
                let start = open.pop().ok_or(ChainError::UnmatchedClose { index: i })?;
                pairs.push((start, i));
            }
            _ => {}
        }
    }
    if let Some(&index) = open.first() {
        return Err(ChainError::UnmatchedOpen { index });
    }
    pairs.sort_unstable();
    Ok(pairs)
}

/// Connect a placed loop: the head branches to the body or past the end,
/// the end pivots back to the head.
fn wire_loop(chain: &mut Gadget, begin: usize, end: usize, jmp: &mut JmpBuf) -> Result<(), ChainError> {
    let exit = chain.part(end)?.part(2)?;
    let (exit_a0, exit_to) = (exit.popped_a0()?, (exit.entry(), exit.frame()?));

    let body = chain.part(begin)?.part(7)?;
    let body_to = (body.entry(), body.frame()?);

    let head = chain.part(begin)?.part(1)?;
    let (head_a0, head_entry, head_frame) = (head.popped_a0()?, head.entry(), head.frame()?);

    let begin = chain.part_mut(begin)?;
    *begin.part_mut(3)? = write_a0(Some(exit_a0), 0);
    set_branch_targets(begin.part_mut(6)?, body_to, exit_to, jmp)?;

    let end = chain.part_mut(end)?;
    *end.part_mut(0)? = write_a0(Some(head_a0), 0);
    *end.part_mut(1)? = stack_pivot_to(head_entry, head_frame, jmp);
    Ok(())
}

/// Compile `source` into a chain placed at [`STACK_BASE`] with its jump
/// buffers at [`GADGET_BASE`]. Characters outside `><+-.,[]` are comments.
pub fn compile(source: &str) -> Result<Program, ChainError> {
    let ops: Vec<u8> = source.bytes().filter(|b| INSTRUCTIONS.contains(b)).collect();
    let loops = match_loops(&ops)?;

    let mut parts = vec![nop(), pop_a0(TAPE_BASE as u64)];
    parts.extend(ops.iter().filter_map(|&b| instruction(b)));
    parts.push(pop_a0(0));
    parts.push(call_func(LIBC_BASE + EXIT));

    let mut jmp = JmpBuf::new(GADGET_BASE as u64);
    let mut chain = Gadget::seq(Kind::Plain, parts);
    chain.place(STACK_BASE as u64, &mut jmp)?;

    for (open, close) in loops {
        wire_loop(&mut chain, PROLOGUE + open, PROLOGUE + close, &mut jmp)?;
    }

    let mut stack = Vec::new();
    chain.synthesize(nop().entry(), &mut stack)?;
    log::debug!("{} instructions, {} stack words, {} jmpbuf words", ops.len(), stack.len(), jmp.words().len());

    Ok(Program { stack, jmpbuf: jmp.into_words() })
}
