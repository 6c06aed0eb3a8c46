//! C7: the static analyzer. Runs once, after parse and before any
//! execution, over the decoded instruction list.

use crate::error::StaticRuleViolation;
use crate::instruction::Instruction;
use std::collections::{HashMap, HashSet};

/// The pedagogical rule set a caller opts into, equivalent to spec.md's
/// "optional flag to choose debugger mode" made concrete as a plain value
/// (spec.md §9's configuration note).
#[derive(Clone, Debug, Default)]
pub struct StaticRuleConfig {
    pub forbidden_mnemonics: HashSet<String>,
    pub forbid_loops: bool,
    pub check_dead_code: bool,
    pub forbid_recursion: bool,
    pub require_recursion: bool,
    pub recursive_labels: HashSet<String>,
}

fn branch_target(instr: &Instruction) -> Option<&str> {
    match instr {
        Instruction::B { label } => Some(label),
        Instruction::BCond { label, .. } => Some(label),
        Instruction::Cbz { label, .. } => Some(label),
        Instruction::Cbnz { label, .. } => Some(label),
        Instruction::Bl { label } => Some(label),
        _ => None,
    }
}

fn is_unconditional_flow_end(instr: &Instruction) -> bool {
    matches!(instr, Instruction::B { .. } | Instruction::Ret)
}

/// `label_index` maps a label's bare name (without trailing `:`) to its
/// position in `instructions`; `linked_labels` holds the bare names of
/// host-linked labels, which count as valid branch targets without a
/// local index.
pub fn check_static_rules(
    instructions: &[Instruction],
    raw_lines: &[String],
    label_index: &HashMap<String, usize>,
    linked_labels: &HashSet<String>,
    rules: &StaticRuleConfig,
) -> Result<(), StaticRuleViolation> {
    if instructions.is_empty() {
        return Err(StaticRuleViolation::EmptyProgram);
    }

    let mut seen_labels = HashSet::new();
    for line in raw_lines {
        if let Some(name) = line.strip_suffix(':') {
            if !seen_labels.insert(name.to_string()) {
                return Err(StaticRuleViolation::DuplicateLabel(name.to_string()));
            }
        }
    }

    if !rules.forbidden_mnemonics.is_empty() {
        for line in raw_lines {
            if let Some(mnemonic) = line.split_whitespace().next() {
                if rules.forbidden_mnemonics.contains(mnemonic) {
                    return Err(StaticRuleViolation::ForbiddenMnemonic(mnemonic.to_string()));
                }
            }
        }
    }

    for (idx, instr) in instructions.iter().enumerate() {
        if let Some(label) = branch_target(instr) {
            if !label_index.contains_key(label) && !linked_labels.contains(label) {
                return Err(StaticRuleViolation::UnknownBranchTarget {
                    line: idx + 1,
                    label: label.to_string(),
                });
            }

            let is_bl = matches!(instr, Instruction::Bl { .. });
            if rules.forbid_loops && !is_bl {
                if let Some(&target_idx) = label_index.get(label) {
                    if target_idx <= idx {
                        return Err(StaticRuleViolation::LoopDetected {
                            line: idx + 1,
                            label: label.to_string(),
                        });
                    }
                }
            }
        }
    }

    if rules.check_dead_code {
        for (idx, instr) in instructions.iter().enumerate() {
            if is_unconditional_flow_end(instr) && idx + 1 < instructions.len() {
                if !matches!(instructions[idx + 1], Instruction::Label(_)) {
                    return Err(StaticRuleViolation::DeadCode { line: idx + 2 });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::decode;

    fn build(lines: &[&str]) -> (Vec<Instruction>, Vec<String>, HashMap<String, usize>) {
        let raw: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let instructions: Vec<Instruction> = raw
            .iter()
            .enumerate()
            .map(|(i, l)| decode(i + 1, l).unwrap())
            .collect();
        let mut label_index = HashMap::new();
        for (i, l) in raw.iter().enumerate() {
            if let Some(name) = l.strip_suffix(':') {
                label_index.insert(name.to_string(), i);
            }
        }
        (instructions, raw, label_index)
    }

    #[test]
    fn empty_program_is_rejected() {
        let (instructions, raw, label_index) = build(&[]);
        let result = check_static_rules(
            &instructions,
            &raw,
            &label_index,
            &HashSet::new(),
            &StaticRuleConfig::default(),
        );
        assert_eq!(result, Err(StaticRuleViolation::EmptyProgram));
    }

    #[test]
    fn forbidden_mnemonic_is_rejected() {
        let (instructions, raw, label_index) = build(&["mov x0,#1"]);
        let mut rules = StaticRuleConfig::default();
        rules.forbidden_mnemonics.insert("mov".to_string());
        let result = check_static_rules(&instructions, &raw, &label_index, &HashSet::new(), &rules);
        assert_eq!(
            result,
            Err(StaticRuleViolation::ForbiddenMnemonic("mov".to_string()))
        );
    }

    #[test]
    fn unknown_branch_target_is_rejected() {
        let (instructions, raw, label_index) = build(&["b nowhere"]);
        let result = check_static_rules(
            &instructions,
            &raw,
            &label_index,
            &HashSet::new(),
            &StaticRuleConfig::default(),
        );
        assert!(matches!(
            result,
            Err(StaticRuleViolation::UnknownBranchTarget { .. })
        ));
    }

    #[test]
    fn backward_branch_is_a_loop_when_forbidden() {
        let (instructions, raw, label_index) = build(&["top:", "b top"]);
        let mut rules = StaticRuleConfig::default();
        rules.forbid_loops = true;
        let result = check_static_rules(&instructions, &raw, &label_index, &HashSet::new(), &rules);
        assert!(matches!(result, Err(StaticRuleViolation::LoopDetected { .. })));
    }

    #[test]
    fn bl_to_earlier_label_is_not_a_loop() {
        let (instructions, raw, label_index) = build(&["fn:", "ret", "bl fn"]);
        let mut rules = StaticRuleConfig::default();
        rules.forbid_loops = true;
        let result = check_static_rules(&instructions, &raw, &label_index, &HashSet::new(), &rules);
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn dead_code_after_ret_is_rejected_unless_a_label() {
        let (instructions, raw, label_index) = build(&["ret", "mov x0,#1"]);
        let mut rules = StaticRuleConfig::default();
        rules.check_dead_code = true;
        let result = check_static_rules(&instructions, &raw, &label_index, &HashSet::new(), &rules);
        assert!(matches!(result, Err(StaticRuleViolation::DeadCode { .. })));
    }

    #[test]
    fn label_immediately_after_ret_is_fine() {
        let (instructions, raw, label_index) = build(&["ret", "done:"]);
        let mut rules = StaticRuleConfig::default();
        rules.check_dead_code = true;
        let result = check_static_rules(&instructions, &raw, &label_index, &HashSet::new(), &rules);
        assert_eq!(result, Ok(()));
    }
}
