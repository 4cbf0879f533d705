//! Hex word stream → region contents.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian as le};

use crate::error::{HarnessError, LoadError};
use crate::region::Region;

/// Parse one token the way `%lx` would: hex digits, optional `0x` prefix.
fn parse_word(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Copy every word of `source` into `target`, in order, from offset 0.
///
/// Tokens are whitespace separated; blank lines produce nothing. Returns the
/// number of words written. Nothing is written past `target.len() / 8`
/// words: the first word that would not fit fails the whole load.
pub fn fill<R: BufRead>(target: &mut [u8], source: R) -> Result<usize, LoadError> {
    let capacity = target.len() / 8;
    let mut count = 0;

    for (n, line) in source.lines().enumerate() {
        let line = line?;
        for token in line.split_ascii_whitespace() {
            let word = parse_word(token).ok_or_else(|| LoadError::MalformedWord {
                line: n + 1,
                token: token.to_string(),
            })?;
            if count == capacity {
                return Err(LoadError::OverrunedCapacity { capacity });
            }
            le::write_u64(&mut target[count * 8..], word);
            count += 1;
        }
    }

    Ok(count)
}

impl Region {
    /// Load `path` into this region. Returns the region base.
    pub fn fill_from(&mut self, path: &Path) -> Result<usize, HarnessError> {
        let file = File::open(path).map_err(|source| HarnessError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        self.fill_from_file(path, file)
    }

    pub(crate) fn fill_from_file(&mut self, path: &Path, file: File) -> Result<usize, HarnessError> {
        let words = fill(self.as_bytes_mut(), BufReader::new(file)).map_err(|source| {
            HarnessError::Load { path: path.to_path_buf(), source }
        })?;
        log::info!("loaded {} words from {} into {:#x}", words, path.display(), self.base());
        Ok(self.base())
    }
}
