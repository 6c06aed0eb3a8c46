//! Command-line front end for `armsim`: loads a `.s` file, runs it to
//! completion, and maps `x0` to the process exit code.

use armsim::analyzer::StaticRuleConfig;
use armsim::register::RegisterId;
use armsim::syscall::StdHostIo;
use armsim::Engine;
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "armsim", about = "Interpreting simulator for a subset of AArch64 user-mode assembly")]
struct Cli {
    /// Path to the .s source file to run
    program: PathBuf,

    /// Forbid a mnemonic from appearing anywhere in the program (repeatable)
    #[arg(long = "forbid", value_name = "MNEMONIC")]
    forbid: Vec<String>,

    /// Reject any backward branch that is not a `bl`
    #[arg(long = "forbid-loops")]
    forbid_loops: bool,

    /// Reject any instruction unreachable after an unconditional `b`/`ret`
    #[arg(long = "check-dead-code")]
    check_dead_code: bool,

    /// Fail the run if any label recurses dynamically
    #[arg(long = "forbid-recursion")]
    forbid_recursion: bool,

    /// Fail the run if no label recurses dynamically
    #[arg(long = "require-recursion")]
    require_recursion: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let rules = StaticRuleConfig {
        forbidden_mnemonics: cli.forbid.into_iter().collect::<HashSet<_>>(),
        forbid_loops: cli.forbid_loops,
        check_dead_code: cli.check_dead_code,
        forbid_recursion: cli.forbid_recursion,
        require_recursion: cli.require_recursion,
        recursive_labels: HashSet::new(),
    };

    let source = match std::fs::read_to_string(&cli.program) {
        Ok(source) => source,
        Err(e) => {
            log::error!("could not read {}: {}", cli.program.display(), e);
            eprintln!("error: could not read {}: {}", cli.program.display(), e);
            return ExitCode::from(1);
        }
    };

    let mut engine = Engine::new(rules, StdHostIo);
    if let Err(e) = engine.parse(&source) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }
    log::debug!("parsed {} instructions", engine.instruction_count());

    if let Err(e) = engine.run() {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }

    let code = (engine.registers().read(RegisterId::X0) & 0xFF) as u8;
    ExitCode::from(code)
}
