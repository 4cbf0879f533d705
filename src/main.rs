use std::path::Path;
use std::process::ExitCode;

use ropstage::launcher;
use ropstage::layout::Layout;

fn main() -> ExitCode {
    ropstage::init_logging(log::LevelFilter::Warn);

    let staged = match launcher::stage(&Layout::DEFAULT, Path::new(".")) {
        Ok(staged) => staged,
        Err(e) => {
            log::error!("{e}");
            return e.exit_code();
        }
    };

    // From here on the chain owns the process
    unsafe { staged.launch() }
}
