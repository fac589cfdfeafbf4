//! Dead-code elimination.
//!
//! Removes side-effect-free instructions whose result is never used.
//! Use counts are gathered with the IR visitor; anything that can
//! trap, write, or transfer control is kept.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{IrModule, IrValue, IrValueKind, IrVisitor, Opcode, ValueId};

use super::Pass;

pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, module: &mut IrModule) -> bool {
        let mut counter = UseCounter {
            counts: BTreeMap::new(),
        };
        counter.visit_module(module);
        for global in &module.globals {
            if let Some(init) = global.init {
                *counter.counts.entry(init).or_insert(0) += 1;
            }
        }

        // Decide first, mutate second; the block lists cannot be
        // edited while the module is borrowed for inspection.
        let mut dead: BTreeSet<ValueId> = BTreeSet::new();
        for function in &module.functions {
            for block in &function.blocks {
                for id in &block.instructions {
                    if counter.counts.get(id).copied().unwrap_or(0) == 0
                        && is_removable(module.value(*id))
                    {
                        dead.insert(*id);
                    }
                }
            }
        }
        if dead.is_empty() {
            return false;
        }
        for function in &mut module.functions {
            for block in &mut function.blocks {
                block.instructions.retain(|id| !dead.contains(id));
            }
        }
        true
    }
}

/// Opcodes that neither trap nor have observable effects.
fn is_removable(value: &IrValue) -> bool {
    let IrValueKind::Instruction { opcode, .. } = &value.kind else {
        return false;
    };
    matches!(
        opcode,
        Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Neg
            | Opcode::Eq
            | Opcode::Neq
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::Lte
            | Opcode::Gte
            | Opcode::And
            | Opcode::Or
            | Opcode::Not
            | Opcode::Alloca
            | Opcode::ArrayLen
            | Opcode::RefIsNull
            | Opcode::RefEq
            | Opcode::FuncRef
    )
}

struct UseCounter {
    counts: BTreeMap<ValueId, usize>,
}

impl IrVisitor for UseCounter {
    fn visit_value(&mut self, _module: &IrModule, value: &IrValue) {
        *self.counts.entry(value.id).or_insert(0) += 1;
    }
}
