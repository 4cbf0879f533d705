/*
 * Compiles a Brainfuck program from stdin into a ROP chain for ropstage.
 * Writes stackbuf.txt and jmpbuf.txt to the current directory.
 *
 * echo '++++++++[>++++++++<-]>+.' | bf2rop && qemu-riscv64 ./ropstage
 */

use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

use ropstage::chain::brainfuck;
use ropstage::error::ChainError;

fn run() -> Result<(), ChainError> {
    let mut source = String::new();
    io::stdin().read_to_string(&mut source)?;

    let program = brainfuck::compile(&source)?;
    program.save(Path::new("."))?;

    log::info!(
        "wrote {} stack words and {} jmpbuf words",
        program.stack.len(),
        program.jmpbuf.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    ropstage::init_logging(log::LevelFilter::Info);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            e.exit_code()
        }
    }
}
