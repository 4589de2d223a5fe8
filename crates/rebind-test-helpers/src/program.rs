use crate::interpreter::{Interpreter, InterpreterError, RuntimeValue, Trace};
use rebind_core::errors::Result;
use rebind_core::ir::IrCode;
use rebind_core::{
    ClassHierarchy, MethodRef, Optimizer, OptimizerConfig, PhaseReport, TypeName,
    WholeProgramAnalysis,
};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A closed-world program: the hierarchy, every method body, and the method
/// a run starts from
#[derive(Clone)]
pub struct TestProgram {
    pub hierarchy: Arc<ClassHierarchy>,
    pub methods: Vec<IrCode>,
    pub entry: MethodRef,
    pub entry_arguments: Vec<RuntimeValue>,
    index: FxHashMap<MethodRef, usize>,
}

impl TestProgram {
    pub fn new(hierarchy: ClassHierarchy, entry: MethodRef) -> Self {
        Self {
            hierarchy: Arc::new(hierarchy),
            methods: Vec::new(),
            entry,
            entry_arguments: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<RuntimeValue>) -> Self {
        self.entry_arguments = arguments;
        self
    }

    pub fn add_body(&mut self, code: IrCode) {
        self.index.insert(code.method().clone(), self.methods.len());
        self.methods.push(code);
    }

    pub fn body(&self, method: &MethodRef) -> Option<&IrCode> {
        self.index.get(method).map(|&i| &self.methods[i])
    }

    pub fn body_mut(&mut self, method: &MethodRef) -> Option<&mut IrCode> {
        let i = *self.index.get(method)?;
        Some(&mut self.methods[i])
    }

    /// Body of the entry method. Every fixture has one.
    pub fn entry_body(&self) -> &IrCode {
        self.body(&self.entry)
            .unwrap_or_else(|| panic!("program has no body for its entry method"))
    }

    pub fn class(&self, name: &str) -> TypeName {
        self.hierarchy
            .lookup_type(name)
            .unwrap_or_else(|| panic!("no class {name} in fixture"))
    }

    pub fn method(&self, holder: &str, name: &str) -> MethodRef {
        self.hierarchy
            .method_ref(holder, name)
            .unwrap_or_else(|| panic!("no method {holder}.{name} in fixture"))
    }

    /// Run the whole optimization phase over every body
    pub fn optimize(&mut self, config: OptimizerConfig) -> Result<PhaseReport> {
        let analysis = WholeProgramAnalysis::from_shared(self.hierarchy.clone());
        Optimizer::new(config, &analysis).optimize(&mut self.methods)
    }

    /// Execute the entry method with the program's entry arguments
    pub fn run(&self) -> std::result::Result<Trace, InterpreterError> {
        Interpreter::new(self).run(&self.entry, self.entry_arguments.clone())
    }
}
