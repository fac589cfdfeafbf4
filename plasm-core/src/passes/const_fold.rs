//! Constant folding.
//!
//! Integer arithmetic over two constant operands is evaluated at
//! compile time; the instruction value is rewritten in place into a
//! constant and dropped from its block.

use std::collections::BTreeSet;

use crate::ir::{IrConst, IrModule, IrValueKind, Opcode, ValueId};

use super::Pass;

pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn run(&mut self, module: &mut IrModule) -> bool {
        // Constants that are assignment targets behave as variables;
        // folding through them would freeze their initial value.
        let mut mutated: BTreeSet<ValueId> = BTreeSet::new();
        for function in &module.functions {
            for block in &function.blocks {
                for id in &block.instructions {
                    if let IrValueKind::Instruction {
                        opcode: Opcode::Store,
                        operands,
                    } = &module.value(*id).kind
                    {
                        if let Some(target) = operands.get(1) {
                            mutated.insert(*target);
                        }
                    }
                }
            }
        }

        let mut folded: Vec<(ValueId, i64)> = Vec::new();
        for function in &module.functions {
            for block in &function.blocks {
                for id in &block.instructions {
                    let value = module.value(*id);
                    let IrValueKind::Instruction { opcode, operands } = &value.kind else {
                        continue;
                    };
                    if operands.len() != 2 || !value.ty.is_integer() {
                        continue;
                    }
                    if operands.iter().any(|o| mutated.contains(o)) {
                        continue;
                    }
                    let (Some(a), Some(b)) = (
                        const_int(module, operands[0]),
                        const_int(module, operands[1]),
                    ) else {
                        continue;
                    };
                    // Division is left alone: its result depends on the
                    // signedness interpretation of the operands.
                    let result = match opcode {
                        Opcode::Add => a.wrapping_add(b),
                        Opcode::Sub => a.wrapping_sub(b),
                        Opcode::Mul => a.wrapping_mul(b),
                        _ => continue,
                    };
                    folded.push((*id, result));
                }
            }
        }
        if folded.is_empty() {
            return false;
        }
        let removed: BTreeSet<ValueId> = folded.iter().map(|(id, _)| *id).collect();
        for (id, result) in folded {
            module.value_mut(id).kind = IrValueKind::Constant(IrConst::Int(result));
        }
        for function in &mut module.functions {
            for block in &mut function.blocks {
                block.instructions.retain(|id| !removed.contains(id));
            }
        }
        true
    }
}

fn const_int(module: &IrModule, id: ValueId) -> Option<i64> {
    match &module.value(id).kind {
        IrValueKind::Constant(IrConst::Int(v)) => Some(*v),
        _ => None,
    }
}
