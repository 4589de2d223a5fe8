use super::{Instruction, InstructionKind, IrCode, ValueId};
use crate::names::NameTable;
use std::fmt;

/// Textual listing of a method body, one instruction per line
pub struct IrDisplay<'a> {
    code: &'a IrCode,
    names: &'a NameTable,
}

impl<'a> IrDisplay<'a> {
    pub(crate) fn new(code: &'a IrCode, names: &'a NameTable) -> Self {
        Self { code, names }
    }

    fn write_instruction(&self, f: &mut fmt::Formatter<'_>, instruction: &Instruction) -> fmt::Result {
        let names = self.names;
        if let Some(out) = instruction.out() {
            write!(f, "{} <- ", out)?;
        }
        match &instruction.kind {
            InstructionKind::Argument { index, .. } => write!(f, "argument {}", index),
            InstructionKind::ConstNumber { value, .. } => write!(f, "const {}", value),
            InstructionKind::ConstNull { .. } => write!(f, "const-null"),
            InstructionKind::NewInstance { class, .. } => {
                write!(f, "new-instance {}", names.resolve(class.0))
            }
            InstructionKind::Invoke(invoke) => {
                write!(
                    f,
                    "{} {} ",
                    invoke.kind.mnemonic(),
                    invoke.method.display(names)
                )?;
                write_values(f, &invoke.arguments)
            }
            InstructionKind::CheckCast { object, class, .. } => {
                write!(f, "check-cast {} {}", names.resolve(class.0), object)
            }
            InstructionKind::AssumeNonNull { src, .. } => write!(f, "assume-non-null {}", src),
            InstructionKind::Goto { target } => write!(f, "goto {}", target),
            InstructionKind::If {
                condition,
                then_block,
                else_block,
            } => write!(f, "if {} {} {}", condition, then_block, else_block),
            InstructionKind::Return { value: Some(value) } => write!(f, "return {}", value),
            InstructionKind::Return { value: None } => write!(f, "return"),
            InstructionKind::Throw { exception } => write!(f, "throw {}", exception),
        }
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[ValueId]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", value)?;
    }
    Ok(())
}

impl fmt::Display for IrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {}", self.code.method().display(self.names))?;
        for block in self.code.blocks() {
            write!(f, "{}:", block.id)?;
            if !block.predecessors.is_empty() {
                write!(f, " <- ")?;
                for (i, predecessor) in block.predecessors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", predecessor)?;
                }
            }
            writeln!(f)?;
            for handler in &block.catch_handlers {
                let guard = handler
                    .guard
                    .map_or("*", |guard| self.names.resolve(guard.0));
                writeln!(f, "  catch {} -> {}", guard, handler.target)?;
            }
            for phi in &block.phis {
                write!(f, "  {} <- phi ", phi.out)?;
                write_values(f, &phi.operands)?;
                writeln!(f)?;
            }
            for &id in &block.instructions {
                write!(f, "  ")?;
                self.write_instruction(f, self.code.instruction(id))?;
                writeln!(f)?;
            }
        }
        Ok(())
    }
}
