//! WebAssembly text generation.
//!
//! Emits one `(module ...)` S-expression targeting the GC proposal.
//! Control flow is reconstructed structurally: the generator walks
//! blocks from the entry, relying on the shapes the IR builder
//! produces (`then`/`else`/`merge` triples for conditionals,
//! `while_header`/`while_body`/`while_exit` for loops).
//!
//! Every instruction result is spilled into a numbered local, so the
//! operand stack is empty between instructions; operands are pushed
//! with `local.get`/`global.get` or inline constants.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::ir::*;

pub fn generate_wat(module: &IrModule) -> String {
    let generator = Generator::new(module);
    generator.run()
}

use crate::ir::WasmClass as ValClass;

fn val_class(ty: &IrType) -> ValClass {
    ty.wasm_class()
}

struct Generator<'a> {
    module: &'a IrModule,
    /// Synthesised type definitions (string array, element arrays)
    /// discovered by scanning the module.
    synthetics: Vec<IrTypeDef>,
    /// Function name -> table slot, when a table is needed.
    table: BTreeMap<String, usize>,
    needs_table: bool,
    needs_memory: bool,
}

impl<'a> Generator<'a> {
    fn new(module: &'a IrModule) -> Generator<'a> {
        let mut generator = Generator {
            module,
            synthetics: Vec::new(),
            table: BTreeMap::new(),
            needs_table: false,
            needs_memory: false,
        };
        generator.scan();
        generator
    }

    fn scan(&mut self) {
        for value in self.module.values() {
            self.note_type(&value.ty.clone());
            if let IrValueKind::Instruction { opcode, .. } = &value.kind {
                match opcode {
                    Opcode::FuncRef | Opcode::CallIndirect => self.needs_table = true,
                    Opcode::Load | Opcode::Store | Opcode::Alloca => self.needs_memory = true,
                    _ => {}
                }
            }
        }
        for def in &self.module.type_defs {
            if let IrTypeDefKind::Struct { fields } = &def.kind {
                for field in fields.clone() {
                    self.note_type(&field.ty);
                }
            }
        }
        for global in &self.module.globals {
            self.note_type(&global.ty.clone());
        }
        for function in &self.module.functions {
            self.note_type(&function.return_type.clone());
        }
        if self.needs_table {
            for (index, function) in self.module.functions.iter().enumerate() {
                self.table.insert(function.name.clone(), index);
            }
        }
    }

    /// Record the synthesised definitions a type relies on.
    fn note_type(&mut self, ty: &IrType) {
        match ty {
            IrType::Str => {
                self.add_synthetic(IrTypeDef {
                    name: "str".to_string(),
                    kind: IrTypeDefKind::Array { elem: IrType::I8 },
                });
            }
            IrType::Array(elem) => {
                self.note_type(elem);
                self.add_synthetic(IrTypeDef {
                    name: ty.mangle(),
                    kind: IrTypeDefKind::Array { elem: (**elem).clone() },
                });
            }
            _ => {}
        }
    }

    fn add_synthetic(&mut self, def: IrTypeDef) {
        if self.module.type_def(&def.name).is_none()
            && !self.synthetics.iter().any(|d| d.name == def.name)
        {
            self.synthetics.push(def);
        }
    }

    fn run(&self) -> String {
        let mut out = String::new();
        out.push_str("(module\n");

        self.emit_types(&mut out);
        self.emit_imports(&mut out);
        if self.needs_table {
            let count = self.module.functions.len();
            let _ = writeln!(out, "  (table $fns {count} funcref)");
            if count > 0 {
                let names: Vec<String> = self
                    .module
                    .functions
                    .iter()
                    .map(|f| wat_id(&f.name))
                    .collect();
                let _ = writeln!(
                    out,
                    "  (elem (table $fns) (i32.const 0) func {})",
                    names.join(" ")
                );
            }
        }
        if self.needs_memory {
            out.push_str("  (memory (export \"memory\") 1)\n");
        }
        self.emit_globals(&mut out);
        for function in &self.module.functions {
            self.emit_function(&mut out, function);
        }
        out.push_str(")\n");
        out
    }

    fn emit_types(&self, out: &mut String) {
        let mut defs: Vec<&IrTypeDef> = self.module.type_defs.iter().collect();
        defs.extend(self.synthetics.iter());
        if defs.is_empty() {
            return;
        }
        // A single recursion group sidesteps definition-order
        // constraints between mutually referencing structs.
        out.push_str("  (rec\n");
        for def in defs {
            match &def.kind {
                IrTypeDefKind::Struct { fields } => {
                    let mut rendered = String::new();
                    for field in fields {
                        let ty = self.field_type(&field.ty);
                        if field.mutable {
                            let _ = write!(
                                rendered,
                                " (field {} (mut {}))",
                                wat_id(&field.name),
                                ty
                            );
                        } else {
                            let _ =
                                write!(rendered, " (field {} {})", wat_id(&field.name), ty);
                        }
                    }
                    let _ = writeln!(
                        out,
                        "    (type {} (struct{rendered}))",
                        wat_id(&def.name)
                    );
                }
                IrTypeDefKind::Array { elem } => {
                    // The string array uses packed byte storage.
                    let storage = if def.name == "str" {
                        "i8".to_string()
                    } else {
                        self.field_type(elem)
                    };
                    let _ = writeln!(
                        out,
                        "    (type {} (array (mut {storage})))",
                        wat_id(&def.name)
                    );
                }
            }
        }
        out.push_str("  )\n");
    }

    /// Imports are synthesised from call sites whose target is not a
    /// module function: parameter types from the arguments, result
    /// type from the instruction.
    fn emit_imports(&self, out: &mut String) {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for value in self.module.values() {
            let IrValueKind::Instruction { opcode, operands } = &value.kind else {
                continue;
            };
            if *opcode != Opcode::Call {
                continue;
            }
            let Some(name) = self.call_target(operands) else {
                continue;
            };
            if self.module.function(&name).is_some() || seen.contains(&name) {
                continue;
            }
            seen.insert(name.clone());
            let mut sig = String::new();
            for arg in &operands[1..] {
                let _ = write!(sig, " (param {})", self.val_type(&self.module.value(*arg).ty));
            }
            if value.ty != IrType::Void {
                let _ = write!(sig, " (result {})", self.val_type(&value.ty));
            }
            let _ = writeln!(
                out,
                "  (import \"env\" \"{name}\" (func {}{sig}))",
                wat_id(&name)
            );
        }
    }

    fn call_target(&self, operands: &[ValueId]) -> Option<String> {
        let first = self.module.value(*operands.first()?);
        match &first.kind {
            IrValueKind::Constant(IrConst::Str(name)) => Some(name.clone()),
            _ => None,
        }
    }

    fn emit_globals(&self, out: &mut String) {
        for global in &self.module.globals {
            let ty = self.val_type(&global.ty);
            let ty_text = if global.is_constant {
                ty.clone()
            } else {
                format!("(mut {ty})")
            };
            let init = match global.init {
                Some(init) => self.const_expr(init),
                None => self.zero_expr(&global.ty),
            };
            let _ = writeln!(out, "  (global {} {} {})", wat_id(&global.name), ty_text, init);
        }
    }

    fn const_expr(&self, id: ValueId) -> String {
        let value = self.module.value(id);
        match &value.kind {
            IrValueKind::Constant(IrConst::Int(v)) => match val_class(&value.ty) {
                ValClass::I64 => format!("(i64.const {v})"),
                _ => format!("(i32.const {v})"),
            },
            IrValueKind::Constant(IrConst::Float(v)) => match val_class(&value.ty) {
                ValClass::F32 => format!("(f32.const {v})"),
                _ => format!("(f64.const {v})"),
            },
            IrValueKind::Constant(IrConst::Bool(v)) => {
                format!("(i32.const {})", if *v { 1 } else { 0 })
            }
            IrValueKind::Constant(IrConst::Str(s)) => {
                let mut parts: Vec<String> = s
                    .as_bytes()
                    .iter()
                    .map(|b| format!("(i32.const {b})"))
                    .collect();
                parts.push(format!("(array.new_fixed $str {})", s.len()));
                parts.join(" ")
            }
            IrValueKind::Constant(IrConst::Null) => self.zero_expr(&value.ty),
            _ => self.zero_expr(&value.ty),
        }
    }

    fn zero_expr(&self, ty: &IrType) -> String {
        match val_class(ty) {
            ValClass::I32 => "(i32.const 0)".to_string(),
            ValClass::I64 => "(i64.const 0)".to_string(),
            ValClass::F32 => "(f32.const 0)".to_string(),
            ValClass::F64 => "(f64.const 0)".to_string(),
            ValClass::Ref => format!("(ref.null {})", self.heap_type(ty)),
        }
    }

    fn val_type(&self, ty: &IrType) -> String {
        match val_class(ty) {
            ValClass::I32 => "i32".to_string(),
            ValClass::I64 => "i64".to_string(),
            ValClass::F32 => "f32".to_string(),
            ValClass::F64 => "f64".to_string(),
            ValClass::Ref => format!("(ref null {})", self.heap_type(ty)),
        }
    }

    fn field_type(&self, ty: &IrType) -> String {
        self.val_type(ty)
    }

    fn heap_type(&self, ty: &IrType) -> String {
        match ty {
            IrType::Any => "any".to_string(),
            IrType::Str => "$str".to_string(),
            IrType::Named(name) => wat_id(name),
            IrType::Array(_) => wat_id(&ty.mangle()),
            _ => "any".to_string(),
        }
    }

    fn emit_function(&self, out: &mut String, function: &IrFunction) {
        let mut header = format!("  (func {}", wat_id(&function.name));
        if function.name.starts_with("$main") {
            header.push_str(" (export \"_start\")");
        }
        for param in &function.params {
            let value = self.module.value(*param);
            let name = value.name.clone().unwrap_or_else(|| format!("p{}", param.0));
            let _ = write!(header, " (param {} {})", wat_id(&name), self.val_type(&value.ty));
        }
        if function.return_type != IrType::Void {
            let _ = write!(header, " (result {})", self.val_type(&function.return_type));
        }
        out.push_str(&header);
        out.push('\n');

        let mut emitter = FuncEmitter {
            generator: self,
            module: self.module,
            function,
            out: String::new(),
            visited: BTreeSet::new(),
            loop_labels: Vec::new(),
            label_count: 0,
            const_locals: BTreeSet::new(),
        };
        emitter.collect_const_locals();
        emitter.emit_locals(out);
        emitter.emit_body();
        out.push_str(&emitter.out);
        if function.return_type != IrType::Void {
            out.push_str("    unreachable\n");
        }
        out.push_str("  )\n");
    }
}

struct FuncEmitter<'a> {
    generator: &'a Generator<'a>,
    module: &'a IrModule,
    function: &'a IrFunction,
    out: String,
    visited: BTreeSet<BlockId>,
    /// Innermost-last: (loop header, loop label, exit label).
    loop_labels: Vec<(BlockId, String, String)>,
    label_count: u32,
    /// Constants that are assignment targets and therefore live in a
    /// local rather than being inlined.
    const_locals: BTreeSet<ValueId>,
}

impl<'a> FuncEmitter<'a> {
    fn collect_const_locals(&mut self) {
        for block in &self.function.blocks {
            for id in &block.instructions {
                let value = self.module.value(*id);
                if let IrValueKind::Instruction { opcode: Opcode::Store, operands } = &value.kind
                {
                    if let Some(target) = operands.get(1) {
                        if matches!(
                            self.module.value(*target).kind,
                            IrValueKind::Constant(_)
                        ) {
                            self.const_locals.insert(*target);
                        }
                    }
                }
            }
        }
    }

    fn emit_locals(&self, out: &mut String) {
        for block in &self.function.blocks {
            for id in &block.instructions {
                let value = self.module.value(*id);
                if value.ty != IrType::Void {
                    let _ = writeln!(
                        out,
                        "    (local {} {})",
                        local_id(*id),
                        self.generator.val_type(&value.ty)
                    );
                }
            }
        }
        for id in &self.const_locals {
            let value = self.module.value(*id);
            let _ = writeln!(
                out,
                "    (local {} {})",
                local_id(*id),
                self.generator.val_type(&value.ty)
            );
        }
    }

    fn emit_body(&mut self) {
        // Mutated constants start out holding their literal value.
        let const_locals: Vec<ValueId> = self.const_locals.iter().copied().collect();
        for id in const_locals {
            self.push_constant(id);
            self.line(&format!("local.set {}", local_id(id)));
        }
        if let Some(entry) = self.function.blocks.first() {
            self.emit_chain(entry.id, None);
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str("    ");
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block_by_id(&self, id: BlockId) -> Option<&'a IrBasicBlock> {
        self.function.blocks.iter().find(|b| b.id == id)
    }

    fn label_of(&self, id: BlockId) -> Option<&str> {
        self.block_by_id(id).and_then(|b| b.label.as_deref())
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("${}{}", prefix, self.label_count);
        self.label_count += 1;
        label
    }

    /// Emit the straight-line chain starting at `start`, stopping when
    /// control reaches `stop` (exclusive).
    fn emit_chain(&mut self, start: BlockId, stop: Option<BlockId>) {
        let mut current = start;
        loop {
            if Some(current) == stop || self.visited.contains(&current) {
                return;
            }
            if self.label_of(current) == Some("while_header") {
                current = self.emit_loop(current);
                continue;
            }
            let Some(block) = self.block_by_id(current) else {
                return;
            };
            self.visited.insert(current);
            for id in block.instructions.clone() {
                self.emit_instruction(id);
            }
            match block.terminator.clone() {
                None => return,
                Some(Terminator::Ret(value)) => {
                    if let Some(value) = value {
                        self.push(value);
                    }
                    self.line("return");
                    return;
                }
                Some(Terminator::Br(target)) => {
                    if let Some((_, loop_label, _)) = self
                        .loop_labels
                        .iter()
                        .rev()
                        .find(|(header, _, _)| *header == target)
                        .cloned()
                    {
                        self.line(&format!("br {loop_label}"));
                        return;
                    }
                    if Some(target) == stop {
                        return;
                    }
                    current = target;
                }
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    // Conditional layout: `then`, optional `else`,
                    // then `merge`, allocated consecutively.
                    let has_else = self.label_of(else_block) == Some("else");
                    let merge = if has_else {
                        BlockId(else_block.0 + 1)
                    } else {
                        else_block
                    };
                    self.push(cond);
                    self.line("if");
                    self.emit_chain(then_block, Some(merge));
                    if has_else {
                        self.line("else");
                        self.emit_chain(else_block, Some(merge));
                    }
                    self.line("end");
                    current = merge;
                }
            }
        }
    }

    /// Emit a `block`/`loop` pair for the loop rooted at `header`;
    /// returns the exit block to continue with.
    fn emit_loop(&mut self, header: BlockId) -> BlockId {
        let Some(header_block) = self.block_by_id(header) else {
            return header;
        };
        let Some(Terminator::CondBr {
            cond,
            then_block: body,
            else_block: exit,
        }) = header_block.terminator.clone()
        else {
            return header;
        };
        let exit_label = self.fresh_label("B");
        let loop_label = self.fresh_label("L");
        self.line(&format!("block {exit_label}"));
        self.line(&format!("loop {loop_label}"));
        self.visited.insert(header);
        for id in header_block.instructions.clone() {
            self.emit_instruction(id);
        }
        self.push(cond);
        self.line("i32.eqz");
        self.line(&format!("br_if {exit_label}"));
        self.loop_labels
            .push((header, loop_label, exit_label));
        self.emit_chain(body, None);
        self.loop_labels.pop();
        self.line("end");
        self.line("end");
        exit
    }

    // -- operand pushes ----------------------------------------------

    fn push(&mut self, id: ValueId) {
        let value = self.module.value(id);
        match &value.kind {
            IrValueKind::Parameter { .. } => {
                let name = value.name.clone().unwrap_or_else(|| format!("p{}", id.0));
                self.line(&format!("local.get {}", wat_id(&name)));
            }
            IrValueKind::Constant(_) => {
                if self.const_locals.contains(&id) {
                    self.line(&format!("local.get {}", local_id(id)));
                } else {
                    self.push_constant(id);
                }
            }
            IrValueKind::Global { name } => {
                self.line(&format!("global.get {}", wat_id(name)));
            }
            IrValueKind::Instruction { .. } => {
                self.line(&format!("local.get {}", local_id(id)));
            }
        }
    }

    fn push_constant(&mut self, id: ValueId) {
        let value = self.module.value(id);
        let IrValueKind::Constant(constant) = &value.kind else {
            return;
        };
        match constant {
            IrConst::Int(v) => match val_class(&value.ty) {
                ValClass::I64 => self.line(&format!("i64.const {v}")),
                ValClass::F32 => self.line(&format!("f32.const {v}")),
                ValClass::F64 => self.line(&format!("f64.const {v}")),
                _ => self.line(&format!("i32.const {v}")),
            },
            IrConst::Float(v) => match val_class(&value.ty) {
                ValClass::F32 => self.line(&format!("f32.const {v}")),
                _ => self.line(&format!("f64.const {v}")),
            },
            IrConst::Bool(v) => self.line(&format!("i32.const {}", if *v { 1 } else { 0 })),
            IrConst::Str(s) => {
                let bytes: Vec<u8> = s.bytes().collect();
                for b in &bytes {
                    self.line(&format!("i32.const {b}"));
                }
                self.line(&format!("array.new_fixed $str {}", bytes.len()));
            }
            IrConst::Null => {
                let text = self.generator.zero_expr(&value.ty);
                self.line(text.trim_start_matches('(').trim_end_matches(')'));
            }
        }
    }

    fn set_result(&mut self, id: ValueId) {
        let value = self.module.value(id);
        if value.ty != IrType::Void {
            self.line(&format!("local.set {}", local_id(id)));
        }
    }

    // -- instructions -------------------------------------------------

    fn emit_instruction(&mut self, id: ValueId) {
        let value = self.module.value(id).clone();
        let IrValueKind::Instruction { opcode, operands } = &value.kind else {
            return;
        };
        match opcode {
            Opcode::Alloca => {
                // The backing local is zero-initialised by wasm.
            }
            Opcode::Store => {
                self.push(operands[0]);
                let target = self.module.value(operands[1]);
                match &target.kind {
                    IrValueKind::Parameter { .. } => {
                        let name = target
                            .name
                            .clone()
                            .unwrap_or_else(|| format!("p{}", operands[1].0));
                        self.line(&format!("local.set {}", wat_id(&name)));
                    }
                    IrValueKind::Global { name } => {
                        self.line(&format!("global.set {}", wat_id(name)));
                    }
                    _ => {
                        self.line(&format!("local.set {}", local_id(operands[1])));
                    }
                }
            }
            Opcode::Load => {
                self.push(operands[0]);
                self.set_result(id);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                let operand_ty = self.module.value(operands[0]).ty.clone();
                self.push(operands[0]);
                self.push(operands[1]);
                self.line(&arith_op(*opcode, &operand_ty));
                self.set_result(id);
            }
            Opcode::Neg => {
                let ty = self.module.value(operands[0]).ty.clone();
                match val_class(&ty) {
                    ValClass::F32 | ValClass::F64 => {
                        self.push(operands[0]);
                        self.line(&format!("{}.neg", prefix(&ty)));
                    }
                    _ => {
                        self.line(&format!("{}.const 0", prefix(&ty)));
                        self.push(operands[0]);
                        self.line(&format!("{}.sub", prefix(&ty)));
                    }
                }
                self.set_result(id);
            }
            Opcode::Eq | Opcode::Neq | Opcode::Lt | Opcode::Gt | Opcode::Lte | Opcode::Gte => {
                let operand_ty = self.module.value(operands[0]).ty.clone();
                self.push(operands[0]);
                self.push(operands[1]);
                self.line(&compare_op(*opcode, &operand_ty));
                self.set_result(id);
            }
            Opcode::And => {
                self.push(operands[0]);
                self.push(operands[1]);
                self.line("i32.and");
                self.set_result(id);
            }
            Opcode::Or => {
                self.push(operands[0]);
                self.push(operands[1]);
                self.line("i32.or");
                self.set_result(id);
            }
            Opcode::Not => {
                self.push(operands[0]);
                self.line("i32.eqz");
                self.set_result(id);
            }
            Opcode::Call => {
                let name = self
                    .generator
                    .call_target(operands)
                    .unwrap_or_else(|| "unknown".to_string());
                for arg in &operands[1..] {
                    self.push(*arg);
                }
                self.line(&format!("call {}", wat_id(&name)));
                self.set_result(id);
            }
            Opcode::CallIndirect => {
                for arg in &operands[1..] {
                    self.push(*arg);
                }
                self.push(operands[0]);
                let mut sig = String::new();
                for arg in &operands[1..] {
                    let _ = write!(
                        sig,
                        " (param {})",
                        self.generator.val_type(&self.module.value(*arg).ty)
                    );
                }
                if value.ty != IrType::Void {
                    let _ = write!(sig, " (result {})", self.generator.val_type(&value.ty));
                }
                self.line(&format!("call_indirect $fns{sig}"));
                self.set_result(id);
            }
            Opcode::Cast => {
                let from = self.module.value(operands[0]).ty.clone();
                self.push(operands[0]);
                for op in cast_ops(&from, &value.ty) {
                    self.line(&op);
                }
                self.set_result(id);
            }
            Opcode::StructNew => {
                for operand in operands {
                    self.push(*operand);
                }
                self.line(&format!(
                    "struct.new {}",
                    wat_id(&value.ty.mangle())
                ));
                self.set_result(id);
            }
            Opcode::StructGet => {
                let obj_ty = self.module.value(operands[0]).ty.clone();
                let field = self.str_operand(operands[1]);
                self.push(operands[0]);
                self.line(&format!(
                    "struct.get {} {}",
                    wat_id(&obj_ty.mangle()),
                    wat_id(&field)
                ));
                self.set_result(id);
            }
            Opcode::StructSet => {
                let obj_ty = self.module.value(operands[0]).ty.clone();
                let field = self.str_operand(operands[1]);
                self.push(operands[0]);
                self.push(operands[2]);
                self.line(&format!(
                    "struct.set {} {}",
                    wat_id(&obj_ty.mangle()),
                    wat_id(&field)
                ));
            }
            Opcode::ArrayNew => {
                self.push(operands[0]);
                self.push(operands[1]);
                self.line(&format!("array.new {}", wat_id(&value.ty.mangle())));
                self.set_result(id);
            }
            Opcode::ArrayNewDefault => {
                self.push(operands[0]);
                self.line(&format!(
                    "array.new_default {}",
                    wat_id(&value.ty.mangle())
                ));
                self.set_result(id);
            }
            Opcode::ArrayGet => {
                let array_ty = self.module.value(operands[0]).ty.clone();
                self.push(operands[0]);
                self.push(operands[1]);
                self.line(&format!("array.get {}", wat_id(&array_ty.mangle())));
                self.set_result(id);
            }
            Opcode::ArraySet => {
                let array_ty = self.module.value(operands[0]).ty.clone();
                self.push(operands[0]);
                self.push(operands[1]);
                self.push(operands[2]);
                self.line(&format!("array.set {}", wat_id(&array_ty.mangle())));
            }
            Opcode::ArrayLen => {
                self.push(operands[0]);
                self.line("array.len");
                self.set_result(id);
            }
            Opcode::RefNull => {
                let text = self.generator.zero_expr(&value.ty);
                self.line(text.trim_start_matches('(').trim_end_matches(')'));
                self.set_result(id);
            }
            Opcode::RefIsNull => {
                self.push(operands[0]);
                self.line("ref.is_null");
                self.set_result(id);
            }
            Opcode::RefEq => {
                self.push(operands[0]);
                self.push(operands[1]);
                self.line("ref.eq");
                self.set_result(id);
            }
            Opcode::RefCast => {
                self.push(operands[0]);
                self.line(&format!(
                    "ref.cast (ref null {})",
                    self.generator.heap_type(&value.ty)
                ));
                self.set_result(id);
            }
            Opcode::RefTest => {
                let target = self.str_operand(operands[1]);
                let heap = if target == "i31" || target == "any" {
                    target
                } else {
                    format!("${target}")
                };
                self.push(operands[0]);
                self.line(&format!("ref.test (ref {heap})"));
                self.set_result(id);
            }
            Opcode::RttCanon => {
                self.line(&format!("rtt.canon {}", wat_id(&value.ty.mangle())));
                self.set_result(id);
            }
            Opcode::RttSub => {
                self.push(operands[0]);
                self.line(&format!("rtt.sub {}", wat_id(&value.ty.mangle())));
                self.set_result(id);
            }
            Opcode::I31New => {
                self.push(operands[0]);
                self.line("ref.i31");
                self.set_result(id);
            }
            Opcode::I31GetS => {
                self.push(operands[0]);
                self.line("i31.get_s");
                self.set_result(id);
            }
            Opcode::I31GetU => {
                self.push(operands[0]);
                self.line("i31.get_u");
                self.set_result(id);
            }
            Opcode::FuncRef => {
                let name = self.str_operand(operands[0]);
                let index = self.generator.table.get(&name).copied().unwrap_or(0);
                self.line(&format!("i32.const {index}"));
                self.set_result(id);
            }
        }
    }

    fn str_operand(&self, id: ValueId) -> String {
        match &self.module.value(id).kind {
            IrValueKind::Constant(IrConst::Str(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

fn prefix(ty: &IrType) -> &'static str {
    match val_class(ty) {
        ValClass::I32 => "i32",
        ValClass::I64 => "i64",
        ValClass::F32 => "f32",
        ValClass::F64 => "f64",
        ValClass::Ref => "ref",
    }
}

fn arith_op(opcode: Opcode, ty: &IrType) -> String {
    let p = prefix(ty);
    let float = ty.is_float();
    let unsigned = ty.is_unsigned() || *ty == IrType::Bool;
    let name = match opcode {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Div => {
            if float {
                "div"
            } else if unsigned {
                "div_u"
            } else {
                "div_s"
            }
        }
        Opcode::Mod => {
            if unsigned {
                "rem_u"
            } else {
                "rem_s"
            }
        }
        _ => "add",
    };
    format!("{p}.{name}")
}

fn compare_op(opcode: Opcode, ty: &IrType) -> String {
    let p = prefix(ty);
    let float = ty.is_float();
    let unsigned = ty.is_unsigned() || *ty == IrType::Bool;
    let name = match opcode {
        Opcode::Eq => "eq",
        Opcode::Neq => "ne",
        Opcode::Lt => {
            if float {
                "lt"
            } else if unsigned {
                "lt_u"
            } else {
                "lt_s"
            }
        }
        Opcode::Gt => {
            if float {
                "gt"
            } else if unsigned {
                "gt_u"
            } else {
                "gt_s"
            }
        }
        Opcode::Lte => {
            if float {
                "le"
            } else if unsigned {
                "le_u"
            } else {
                "le_s"
            }
        }
        Opcode::Gte => {
            if float {
                "ge"
            } else if unsigned {
                "ge_u"
            } else {
                "ge_s"
            }
        }
        _ => "eq",
    };
    format!("{p}.{name}")
}

/// Conversion sequence between two IR types.
fn cast_ops(from: &IrType, to: &IrType) -> Vec<String> {
    let fc = val_class(from);
    let tc = val_class(to);
    if fc == tc && fc != ValClass::Ref {
        return Vec::new();
    }
    let from_unsigned = from.is_unsigned() || *from == IrType::Bool;
    let to_unsigned = to.is_unsigned() || *to == IrType::Bool;
    match (fc, tc) {
        (ValClass::I64, ValClass::I32) => vec!["i32.wrap_i64".to_string()],
        (ValClass::I32, ValClass::I64) => {
            if from_unsigned {
                vec!["i64.extend_i32_u".to_string()]
            } else {
                vec!["i64.extend_i32_s".to_string()]
            }
        }
        (ValClass::I32, ValClass::F32) | (ValClass::I32, ValClass::F64)
        | (ValClass::I64, ValClass::F32) | (ValClass::I64, ValClass::F64) => {
            let sign = if from_unsigned { "u" } else { "s" };
            let src = if fc == ValClass::I32 { "i32" } else { "i64" };
            let dst = if tc == ValClass::F32 { "f32" } else { "f64" };
            vec![format!("{dst}.convert_{src}_{sign}")]
        }
        (ValClass::F32, ValClass::I32) | (ValClass::F64, ValClass::I32)
        | (ValClass::F32, ValClass::I64) | (ValClass::F64, ValClass::I64) => {
            let sign = if to_unsigned { "u" } else { "s" };
            let src = if fc == ValClass::F32 { "f32" } else { "f64" };
            let dst = if tc == ValClass::I32 { "i32" } else { "i64" };
            vec![format!("{dst}.trunc_{src}_{sign}")]
        }
        (ValClass::F32, ValClass::F64) => vec!["f64.promote_f32".to_string()],
        (ValClass::F64, ValClass::F32) => vec!["f32.demote_f64".to_string()],
        (ValClass::I32, ValClass::Ref) => vec!["ref.i31".to_string()],
        (ValClass::I64, ValClass::Ref) => {
            vec!["i32.wrap_i64".to_string(), "ref.i31".to_string()]
        }
        (ValClass::Ref, ValClass::I32) => {
            let get = if to_unsigned { "i31.get_u" } else { "i31.get_s" };
            vec!["ref.cast (ref i31)".to_string(), get.to_string()]
        }
        (ValClass::Ref, ValClass::I64) => {
            let (get, extend) = if to_unsigned {
                ("i31.get_u", "i64.extend_i32_u")
            } else {
                ("i31.get_s", "i64.extend_i32_s")
            };
            vec![
                "ref.cast (ref i31)".to_string(),
                get.to_string(),
                extend.to_string(),
            ]
        }
        (ValClass::Ref, ValClass::F32) | (ValClass::Ref, ValClass::F64) => {
            // Handled by the builder through float boxes; falling
            // through here means an unboxed float was expected.
            Vec::new()
        }
        (ValClass::F32, ValClass::Ref) | (ValClass::F64, ValClass::Ref) => Vec::new(),
        (ValClass::Ref, ValClass::Ref) => {
            // Upcasts to `any` are subsumption; anything else needs a
            // runtime checked downcast.
            if from == to || *to == IrType::Any {
                Vec::new()
            } else {
                vec![format!("ref.cast (ref null {})", heap_name(to))]
            }
        }
        _ => Vec::new(),
    }
}

fn heap_name(ty: &IrType) -> String {
    match ty {
        IrType::Any => "any".to_string(),
        IrType::Str => "$str".to_string(),
        IrType::Named(name) => format!("${name}"),
        IrType::Array(_) => format!("${}", ty.mangle()),
        _ => "any".to_string(),
    }
}

fn wat_id(name: &str) -> String {
    format!("${name}")
}

fn local_id(id: ValueId) -> String {
    format!("$_v{}", id.0)
}
