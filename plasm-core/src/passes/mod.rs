//! IR pass manager.
//!
//! Passes run in order over the module and report whether they changed
//! anything. The bundled passes are deliberately small; the manager
//! exists so further passes slot in without touching the driver.

pub mod const_fold;
pub mod dce;

use crate::ir::IrModule;

pub trait Pass {
    fn name(&self) -> &'static str;
    /// Returns true if the pass modified the module.
    fn run(&mut self, module: &mut IrModule) -> bool;
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager { passes: Vec::new() }
    }

    pub fn add(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass once, in order.
    pub fn run_all(&mut self, module: &mut IrModule) -> bool {
        let mut changed = false;
        for pass in &mut self.passes {
            if pass.run(module) {
                changed = true;
            }
        }
        changed
    }
}

/// The default pipeline: constant folding, then dead-code elimination.
pub fn default_pipeline() -> PassManager {
    let mut manager = PassManager::new();
    manager.add(Box::new(const_fold::ConstantFolding));
    manager.add(Box::new(dce::DeadCodeElimination));
    manager
}
