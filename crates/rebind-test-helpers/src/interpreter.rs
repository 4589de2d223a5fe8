//! Reference interpreter
//!
//! Executes method bodies with dispatch decided by the receiver's runtime
//! class at each call. Method selection is implemented here from scratch
//! and deliberately shares nothing with the resolution oracle, so running a
//! program before and after optimization checks the optimizer against an
//! independent model of the runtime.

use crate::program::TestProgram;
use rebind_core::hierarchy::{ClassDef, MemberAccess, MethodDef};
use rebind_core::ir::{BlockId, InstructionKind, IrCode, ValueId};
use rebind_core::{ClassHierarchy, DispatchKind, MethodRef, TypeName};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

/// Instructions a single run may execute before it is considered divergent
pub const DEFAULT_STEP_LIMIT: usize = 100_000;

/// Maximum call depth
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeValue {
    Null,
    Int(i64),
    /// Instance of exactly this class
    Object(TypeName),
}

/// Methods entered during a run, in order, as `Holder::name`
pub type Trace = Vec<String>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterpreterError {
    #[error("Null receiver calling {0}")]
    NullReceiver(String),

    #[error("No method implements {0}")]
    AbstractMethod(String),

    #[error("Conflicting default methods for {0}")]
    IncompatibleClassChange(String),

    #[error("Cannot cast {from} to {to}")]
    ClassCast { from: String, to: String },

    #[error("Exception thrown in {0}")]
    Thrown(String),

    #[error("Value {0} read before being defined")]
    UndefinedValue(ValueId),

    #[error("Fell off the end of block {0}")]
    MissingTerminator(BlockId),

    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    #[error("Call depth limit exceeded")]
    StackOverflow,
}

type Result<T> = std::result::Result<T, InterpreterError>;

fn read(frame: &FxHashMap<ValueId, RuntimeValue>, value: ValueId) -> Result<RuntimeValue> {
    frame
        .get(&value)
        .copied()
        .ok_or(InterpreterError::UndefinedValue(value))
}

pub struct Interpreter<'p> {
    program: &'p TestProgram,
    hierarchy: &'p ClassHierarchy,
    step_limit: usize,
    steps: usize,
    depth: usize,
    trace: Trace,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p TestProgram) -> Self {
        Self {
            program,
            hierarchy: &program.hierarchy,
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
            depth: 0,
            trace: Vec::new(),
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Run `method` directly, without dispatch, and return the trace
    pub fn run(mut self, method: &MethodRef, arguments: Vec<RuntimeValue>) -> Result<Trace> {
        self.invoke_target(method, arguments)?;
        Ok(self.trace)
    }

    fn display(&self, method: &MethodRef) -> String {
        format!(
            "{}::{}",
            self.hierarchy.type_display(method.holder),
            self.hierarchy.names().resolve(method.name())
        )
    }

    fn invoke_target(&mut self, target: &MethodRef, arguments: Vec<RuntimeValue>) -> Result<RuntimeValue> {
        self.trace.push(self.display(target));
        match self.program.body(target) {
            Some(code) => {
                if self.depth >= MAX_DEPTH {
                    return Err(InterpreterError::StackOverflow);
                }
                self.depth += 1;
                let result = self.execute(code, &arguments);
                self.depth -= 1;
                result
            }
            // Bodiless methods are leaves
            None => Ok(RuntimeValue::Null),
        }
    }

    fn execute(&mut self, code: &'p IrCode, arguments: &[RuntimeValue]) -> Result<RuntimeValue> {
        let mut frame: FxHashMap<ValueId, RuntimeValue> = FxHashMap::default();
        let mut block = code.entry();
        let mut previous: Option<BlockId> = None;

        loop {
            if let Some(predecessor) = previous {
                self.enter_block(code, block, predecessor, &mut frame)?;
            }

            let mut next = None;
            for &id in &code.block(block).instructions {
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(InterpreterError::StepLimitExceeded(self.step_limit));
                }

                match &code.instruction(id).kind {
                    InstructionKind::Argument { out, index } => {
                        let value = arguments.get(*index as usize).copied().unwrap_or(RuntimeValue::Null);
                        frame.insert(*out, value);
                    }
                    InstructionKind::ConstNumber { out, value } => {
                        frame.insert(*out, RuntimeValue::Int(*value));
                    }
                    InstructionKind::ConstNull { out } => {
                        frame.insert(*out, RuntimeValue::Null);
                    }
                    InstructionKind::NewInstance { out, class } => {
                        frame.insert(*out, RuntimeValue::Object(*class));
                    }
                    InstructionKind::CheckCast { out, object, class } => {
                        let value = read(&frame, *object)?;
                        if let RuntimeValue::Object(actual) = value {
                            if !self.hierarchy.is_subtype(actual, *class) {
                                return Err(InterpreterError::ClassCast {
                                    from: self.hierarchy.type_display(actual).to_string(),
                                    to: self.hierarchy.type_display(*class).to_string(),
                                });
                            }
                        }
                        frame.insert(*out, value);
                    }
                    InstructionKind::AssumeNonNull { out, src, .. } => {
                        let value = read(&frame, *src)?;
                        frame.insert(*out, value);
                    }
                    InstructionKind::Invoke(invoke) => {
                        let values = invoke
                            .arguments
                            .iter()
                            .map(|&argument| read(&frame, argument))
                            .collect::<Result<Vec<_>>>()?;
                        let target = self.select_target(code, invoke.kind, &invoke.method, &values)?;
                        trace!("{} dispatches to {}", self.display(&invoke.method), self.display(&target));
                        let result = self.invoke_target(&target, values)?;
                        if let Some(out) = invoke.out {
                            frame.insert(out, result);
                        }
                    }
                    InstructionKind::Goto { target } => next = Some(*target),
                    InstructionKind::If {
                        condition,
                        then_block,
                        else_block,
                    } => {
                        let taken = !matches!(read(&frame, *condition)?, RuntimeValue::Int(0) | RuntimeValue::Null);
                        next = Some(if taken { *then_block } else { *else_block });
                    }
                    InstructionKind::Return { value } => {
                        return match value {
                            Some(value) => read(&frame, *value),
                            None => Ok(RuntimeValue::Null),
                        };
                    }
                    InstructionKind::Throw { .. } => {
                        return Err(InterpreterError::Thrown(self.display(code.method())));
                    }
                }
            }

            let Some(target) = next else {
                return Err(InterpreterError::MissingTerminator(block));
            };
            previous = Some(block);
            block = target;
        }
    }

    /// Evaluate the phis of `block` for the edge from `predecessor`, all
    /// reading the state before any of them is assigned
    fn enter_block(
        &self,
        code: &IrCode,
        block: BlockId,
        predecessor: BlockId,
        frame: &mut FxHashMap<ValueId, RuntimeValue>,
    ) -> Result<()> {
        let block = code.block(block);
        let Some(edge) = block.predecessors.iter().position(|&p| p == predecessor) else {
            return Ok(());
        };
        let mut incoming = Vec::with_capacity(block.phis.len());
        for phi in &block.phis {
            incoming.push((phi.out, read(frame, phi.operands[edge])?));
        }
        frame.extend(incoming);
        Ok(())
    }

    fn select_target(
        &self,
        code: &IrCode,
        kind: DispatchKind,
        method: &MethodRef,
        arguments: &[RuntimeValue],
    ) -> Result<MethodRef> {
        let receiver = match arguments.first() {
            Some(RuntimeValue::Object(class)) => *class,
            _ => return Err(InterpreterError::NullReceiver(self.display(method))),
        };
        let start = match kind {
            DispatchKind::Virtual | DispatchKind::Interface => Some(receiver),
            DispatchKind::Super => self
                .hierarchy
                .class_of(code.method().holder)
                .and_then(|class| class.superclass),
        };
        let Some(start) = start else {
            return Err(InterpreterError::AbstractMethod(self.display(method)));
        };

        // Class methods first, nearest wins
        for class in self.hierarchy.superclass_chain(start) {
            let Some(candidate) = class.lookup_method(&method.signature) else {
                continue;
            };
            if candidate.is_static || candidate.access == MemberAccess::Private {
                continue;
            }
            if !self.can_override(class, candidate, method) {
                continue;
            }
            if candidate.is_abstract {
                return Err(InterpreterError::AbstractMethod(self.display(method)));
            }
            return Ok(class.method_ref(candidate));
        }

        self.select_default(start, method)
    }

    /// A package-private declaration only takes part in dispatch for calls
    /// made against its own package
    fn can_override(&self, class: &ClassDef, candidate: &MethodDef, method: &MethodRef) -> bool {
        if candidate.access != MemberAccess::PackagePrivate || class.name == method.holder {
            return true;
        }
        self.hierarchy
            .class_of(method.holder)
            .is_some_and(|declared| declared.package == class.package)
    }

    fn select_default(&self, start: TypeName, method: &MethodRef) -> Result<MethodRef> {
        let candidates: Vec<TypeName> = self
            .hierarchy
            .superinterfaces(start)
            .into_iter()
            .filter(|&interface| {
                self.hierarchy
                    .class_of(interface)
                    .and_then(|class| class.lookup_method(&method.signature))
                    .is_some()
            })
            .collect();

        // Drop every interface that a more specific candidate extends
        let specific: Vec<TypeName> = candidates
            .iter()
            .copied()
            .filter(|&interface| {
                !candidates
                    .iter()
                    .any(|&other| other != interface && self.hierarchy.is_subtype(other, interface))
            })
            .collect();
        let concrete: Vec<MethodRef> = specific
            .iter()
            .filter_map(|&interface| self.hierarchy.class_of(interface))
            .filter_map(|class| {
                class
                    .lookup_method(&method.signature)
                    .filter(|m| !m.is_abstract)
                    .map(|m| class.method_ref(m))
            })
            .collect();

        match concrete.as_slice() {
            [single] if specific.len() == 1 => Ok(single.clone()),
            [] => Err(InterpreterError::AbstractMethod(self.display(method))),
            _ => Err(InterpreterError::IncompatibleClassChange(self.display(method))),
        }
    }
}
