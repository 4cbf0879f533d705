use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::HarnessError;
use crate::layout::{Layout, RegionSpec, GADGET_FILE, STACK_FILE};
use crate::region::Region;
use crate::trampoline;

/// All three regions, populated and ready for the pivot.
#[derive(Debug)]
pub struct Staged {
    pub stack: Region,
    pub gadgets: Region,
    pub scratch: Region,
}

fn open(dir: &Path, name: &str) -> Result<(std::path::PathBuf, File), HarnessError> {
    let path = dir.join(name);
    match File::open(&path) {
        Ok(file) => Ok((path, file)),
        Err(source) => Err(HarnessError::SourceUnavailable { path, source }),
    }
}

fn load(dir: &Path, name: &str, spec: &RegionSpec) -> Result<Region, HarnessError> {
    let (path, file) = open(dir, name)?;
    let mut region = Region::map(spec)?;
    region.fill_from_file(&path, file)?;
    Ok(region)
}

/// Map and fill the stack and gadget regions from `dir`, then map scratch.
///
/// Stops at the first failure; later regions are never requested.
pub fn stage(layout: &Layout, dir: &Path) -> Result<Staged, HarnessError> {
    let stack = load(dir, STACK_FILE, &layout.stack)?;
    let gadgets = load(dir, GADGET_FILE, &layout.gadgets)?;
    let scratch = Region::map(&layout.scratch)?;
    Ok(Staged { stack, gadgets, scratch })
}

impl Staged {
    /// Word the pivot will return through.
    pub fn entry_point(&self) -> u64 {
        self.stack.word(trampoline::RETURN_SLOT).unwrap_or(0)
    }

    /// Hand the process over to the chain.
    ///
    /// # Safety
    ///
    /// Executes whatever the stack image points at. Nothing about the chain
    /// is checked.
    pub unsafe fn launch(self) -> ! {
        let entry = self.entry_point();
        if entry == 0 {
            log::warn!("stack image returns to 0; the pivot will fault");
        }
        log::info!("pivoting to {:#x}, first return to {:#x}", self.stack.base(), entry);

        let stack = self.stack.leak();
        self.gadgets.leak();
        self.scratch.leak();

        let _ = std::io::stdout().flush();
        trampoline::pivot(stack as *const u8)
    }
}
