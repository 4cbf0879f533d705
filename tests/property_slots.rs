//! Slot property: for any well-formed word stream that fits, slot `i`
//! holds word `i`, and nothing past the last word is touched.

use byteorder::{ByteOrder, LittleEndian as le};
use proptest::prelude::*;
use ropstage::error::LoadError;
use ropstage::loader;

const CAPACITY: usize = 64;

/// Render a word the way a hand-written or generated file might.
fn render(word: u64, style: u8) -> String {
    match style % 4 {
        0 => format!("{word:x}"),
        1 => format!("{word:016x}"),
        2 => format!("0x{word:X}"),
        _ => format!("  {word:x}\t"),
    }
}

proptest! {
    #[test]
    fn slot_i_holds_word_i(
        words in prop::collection::vec((any::<u64>(), any::<u8>()), 0..=CAPACITY),
        blank_every in 1..8usize,
    ) {
        let mut text = String::new();
        for (i, (word, style)) in words.iter().enumerate() {
            text.push_str(&render(*word, *style));
            text.push('\n');
            if i % blank_every == 0 {
                text.push('\n');
            }
        }

        let mut buf = vec![0xffu8; CAPACITY * 8];
        let written = loader::fill(&mut buf, text.as_bytes()).unwrap();
        prop_assert_eq!(written, words.len());

        for (i, (word, _)) in words.iter().enumerate() {
            prop_assert_eq!(le::read_u64(&buf[i * 8..]), *word);
        }
        prop_assert!(buf[words.len() * 8..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn overflow_is_always_rejected(extra in 1..16usize) {
        let text: String = (0..CAPACITY + extra).map(|i| format!("{i:x}\n")).collect();
        let mut buf = vec![0u8; CAPACITY * 8];
        let res = loader::fill(&mut buf, text.as_bytes());
        prop_assert!(
            matches!(res, Err(LoadError::OverrunedCapacity { capacity: CAPACITY })),
            "unexpected {:?}", res
        );
        prop_assert_eq!(le::read_u64(&buf[(CAPACITY - 1) * 8..]), (CAPACITY - 1) as u64);
    }
}
