//! End-to-end scenarios: one program, run to completion, checked against
//! its expected exit value (`x0`) and, where relevant, flags or static/
//! dynamic rule outcomes.

use armsim::analyzer::StaticRuleConfig;
use armsim::register::RegisterId;
use armsim::syscall::test_support::ScriptedHostIo;
use armsim::{EngineError, Engine};
use std::collections::HashSet;

fn run(source: &str) -> Engine<ScriptedHostIo> {
    let mut engine = Engine::new(StaticRuleConfig::default(), ScriptedHostIo::default());
    engine.parse(source).expect("parse");
    engine.run().expect("run");
    engine
}

#[test]
fn arithmetic_scenario_yields_seven() {
    let engine = run("mov x0,#2\nmov x1,#5\nadd x0,x0,x1\nsub x0,x0,#0");
    assert_eq!(engine.registers().read(RegisterId::X0), 7);
    assert!(!engine.flags().zero);
    assert!(!engine.flags().negative);
}

#[test]
fn branching_scenario_skips_wrong_path() {
    let engine = run(
        "mov x0,#0\nmov x1,#1\ncmp x1,#1\nb.eq skip\nmov x0,#99\nskip:\nadd x0,x0,#7",
    );
    assert_eq!(engine.registers().read(RegisterId::X0), 7);
}

#[test]
fn load_store_pair_scenario_round_trips() {
    let engine = run(
        ".data\nbuf:.space 32\nmain:\nldr x1,=buf\nmov x2,#3\nmov x3,#4\nstp x2,x3,[x1]\nldp x4,x5,[x1]\nadd x0,x4,x5",
    );
    assert_eq!(engine.registers().read(RegisterId::X0), 7);
}

/// A Collatz step counter. `ret` sets pc back to the exact `bl` that
/// reached it rather than to the instruction after it (this engine's `bl`
/// writes its own pc into `lr`, not pc+1), so `bl step` / `ret` forms a
/// loop: each `ret` re-enters `step` through the same call site, and the
/// only way out is the `b stepdone` taken once `x1 == 1`. `x0` is
/// incremented on every entry to `step`, including the terminating one,
/// so it ends up holding the total number of steps.
const COLLATZ_SOURCE: &str = "\
mov x1,#37
mov x0,#0
bl step
step:
add x0,x0,#1
cmp x1,#1
b.eq stepdone
and x2,x1,#1
cbnz x2,odd
asr x1,x1,#1
ret
odd:
mov x3,#3
mul x1,x1,x3
add x1,x1,#1
ret
stepdone:
b end
end:
";

#[test]
fn collatz_of_37_takes_22_calls() {
    let engine = run(COLLATZ_SOURCE);
    assert_eq!(engine.registers().read(RegisterId::X0), 22);
}

#[test]
fn forbid_recursion_rejects_collatz_after_it_runs() {
    let mut rules = StaticRuleConfig::default();
    rules.forbid_recursion = true;
    let mut engine = Engine::new(rules, ScriptedHostIo::default());
    engine.parse(COLLATZ_SOURCE).expect("parse");
    let result = engine.run();
    assert!(matches!(result, Err(EngineError::DynamicRule(_))));
}

#[test]
fn forbidden_mnemonic_rejects_mov_before_running() {
    let mut rules = StaticRuleConfig::default();
    rules.forbidden_mnemonics = HashSet::from(["mov".to_string()]);
    let mut engine = Engine::new(rules, ScriptedHostIo::default());
    let result = engine.parse("mov x0,#1");
    assert!(matches!(result, Err(EngineError::StaticRule(_))));
}
