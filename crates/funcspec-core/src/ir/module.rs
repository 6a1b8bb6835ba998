//! Modules: the whole-program unit the specializer runs over.

use super::constant::Constant;
use super::function::{Function, Linkage};
use super::inst::{CallInst, Operand};
use super::types::Type;
use super::{FuncId, GlobalId, InstId};
use crate::error::IrError;
use serde::{Deserialize, Serialize};

/// A module-level variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    /// Type of the value stored in the global.
    pub ty: Type,
    #[serde(default)]
    pub initializer: Option<Constant>,
    /// The global is never written.
    #[serde(default)]
    pub is_constant: bool,
    #[serde(default)]
    pub linkage: Linkage,
}

impl Global {
    /// A read-only internal global holding `value`.
    pub fn constant(name: impl Into<String>, value: Constant) -> Self {
        Self {
            name: name.into(),
            ty: value.ty(),
            initializer: Some(value),
            is_constant: true,
            linkage: Linkage::Internal,
        }
    }

    /// A writable global with an optional initial value.
    pub fn variable(name: impl Into<String>, ty: Type, initializer: Option<Constant>) -> Self {
        Self {
            name: name.into(),
            ty,
            initializer,
            is_constant: false,
            linkage: Linkage::External,
        }
    }
}

/// A call or invoke instruction, identified by its enclosing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteRef {
    pub caller: FuncId,
    pub inst: InstId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Function slots. Erased functions leave `None` so ids stay stable.
    functions: Vec<Option<Function>>,
    globals: Vec<Global>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Some(func));
        id
    }

    pub fn get_function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index()).and_then(|f| f.as_ref())
    }

    /// The function in slot `id`.
    ///
    /// # Panics
    ///
    /// Panics if the function was erased.
    pub fn function(&self, id: FuncId) -> &Function {
        match self.get_function(id) {
            Some(func) => func,
            None => panic!("function {} was erased", id),
        }
    }

    /// Mutable access to the function in slot `id`.
    ///
    /// # Panics
    ///
    /// Panics if the function was erased.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        match self.functions.get_mut(id.index()).and_then(|f| f.as_mut()) {
            Some(func) => func,
            None => panic!("function {} was erased", id),
        }
    }

    pub fn contains_function(&self, id: FuncId) -> bool {
        self.get_function(id).is_some()
    }

    /// Live functions in module order.
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.as_ref().map(|f| (FuncId(i as u32), f)))
    }

    pub fn function_ids(&self) -> Vec<FuncId> {
        self.functions().map(|(id, _)| id).collect()
    }

    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    pub fn lookup_function(&self, name: &str) -> Result<FuncId, IrError> {
        self.function_by_name(name)
            .ok_or_else(|| IrError::UnknownFunction(name.to_string()))
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> + '_ {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id)
    }

    pub fn lookup_global(&self, name: &str) -> Result<GlobalId, IrError> {
        self.global_by_name(name)
            .ok_or_else(|| IrError::UnknownGlobal(name.to_string()))
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.functions().any(|(_, f)| f.name == name) || self.globals.iter().any(|g| g.name == name)
    }

    /// `prefix.N` for the smallest `N >= 1` not yet used by any symbol.
    pub fn fresh_name(&self, prefix: &str) -> String {
        let mut n = 1usize;
        loop {
            let candidate = format!("{}.{}", prefix, n);
            if !self.name_in_use(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Materialize a new internal read-only global holding `value`.
    pub fn add_constant_global(&mut self, prefix: &str, value: Constant) -> GlobalId {
        let name = self.fresh_name(prefix);
        self.add_global(Global::constant(name, value))
    }

    /// Copy the body of `id` into a new function named `prefix.N`.
    pub fn clone_function(&mut self, id: FuncId, prefix: &str) -> FuncId {
        let mut clone = self.function(id).clone();
        clone.name = self.fresh_name(prefix);
        self.add_function(clone)
    }

    /// Remove a function from the module.
    ///
    /// Any reference left behind (only possible in dead code) is replaced by
    /// a poison pointer so that no operand names a missing function.
    pub fn erase_function(&mut self, id: FuncId) -> Option<Function> {
        let removed = self.functions.get_mut(id.index())?.take()?;
        let poison = Constant::Poison(Type::Ptr);
        for func in self.functions.iter_mut().flatten() {
            for inst in &mut func.insts {
                for op in inst.kind.operands_mut() {
                    if let Operand::Const(c) = op {
                        c.replace_function(id, &poison);
                    }
                }
            }
        }
        for global in &mut self.globals {
            if let Some(init) = &mut global.initializer {
                init.replace_function(id, &poison);
            }
        }
        Some(removed)
    }

    /// Every attached call or invoke whose callee is literally `callee`, in
    /// module order.
    pub fn call_sites_of(&self, callee: FuncId) -> Vec<CallSiteRef> {
        let mut sites = Vec::new();
        for (caller, func) in self.functions() {
            for inst in func.instructions() {
                if let Some(call) = func.inst(inst).kind.as_call() {
                    if call.called_function() == Some(callee) {
                        sites.push(CallSiteRef { caller, inst });
                    }
                }
            }
        }
        sites
    }

    /// Whether `func`'s address escapes anywhere other than as a direct callee.
    pub fn is_address_taken(&self, func: FuncId) -> bool {
        for (_, f) in self.functions() {
            for inst in f.instructions() {
                let kind = &f.inst(inst).kind;
                let ops = kind.operands();
                let skip_callee = kind.as_call().is_some();
                for (i, op) in ops.into_iter().enumerate() {
                    if skip_callee && i == 0 {
                        continue;
                    }
                    if let Operand::Const(c) = op {
                        if c.references_function(func) {
                            return true;
                        }
                    }
                }
            }
        }
        self.globals.iter().any(|g| {
            g.initializer
                .as_ref()
                .is_some_and(|init| init.references_function(func))
        })
    }

    pub fn call_inst(&self, site: CallSiteRef) -> Option<&CallInst> {
        self.get_function(site.caller)?
            .inst(site.inst)
            .kind
            .as_call()
    }

    /// Point a call site at a different function.
    pub fn set_called_function(&mut self, site: CallSiteRef, callee: FuncId) {
        if let Some(call) = self
            .function_mut(site.caller)
            .inst_mut(site.inst)
            .kind
            .as_call_mut()
        {
            call.callee = Operand::Const(Constant::Function(callee));
        }
    }

    /// Replace one actual argument of a call site.
    pub fn set_call_arg(&mut self, site: CallSiteRef, index: usize, value: Operand) {
        if let Some(call) = self
            .function_mut(site.caller)
            .inst_mut(site.inst)
            .kind
            .as_call_mut()
        {
            if let Some(arg) = call.args.get_mut(index) {
                *arg = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Param};

    fn module_with_caller() -> (Module, FuncId, FuncId) {
        let mut m = Module::new("m");
        let callee = m.add_function(Function::new(
            "callee",
            vec![Param::new("x", Type::I32)],
            Type::Void,
        ));
        {
            let mut b = FunctionBuilder::new(&mut m, callee);
            b.block("entry");
            b.ret(None);
        }
        let caller = m.add_function(Function::new("main", vec![], Type::Void));
        {
            let mut b = FunctionBuilder::new(&mut m, caller);
            b.block("entry");
            b.call_direct(callee, vec![Operand::Const(Constant::i32(1))]);
            b.call_direct(callee, vec![Operand::Const(Constant::i32(2))]);
            b.ret(None);
        }
        (m, callee, caller)
    }

    #[test]
    fn test_call_sites_of_in_order() {
        let (m, callee, caller) = module_with_caller();
        let sites = m.call_sites_of(callee);
        assert_eq!(sites.len(), 2);
        assert!(sites.iter().all(|s| s.caller == caller));
        assert!(sites[0].inst < sites[1].inst);
        assert!(!m.is_address_taken(callee));
    }

    #[test]
    fn test_fresh_names_do_not_collide() {
        let (mut m, callee, _) = module_with_caller();
        let first = m.clone_function(callee, "callee.specialized");
        let second = m.clone_function(callee, "callee.specialized");
        assert_eq!(m.function(first).name, "callee.specialized.1");
        assert_eq!(m.function(second).name, "callee.specialized.2");
        let g = m.add_constant_global("funcspec.arg", Constant::i32(3));
        assert_eq!(m.global(g).name, "funcspec.arg.1");
        assert!(m.global(g).is_constant);
    }

    #[test]
    fn test_erase_function_poisons_dangling_references() {
        let (mut m, callee, caller) = module_with_caller();
        let ptr_holder = m.add_global(Global::variable(
            "table",
            Type::Ptr,
            Some(Constant::Function(callee)),
        ));
        assert!(m.is_address_taken(callee));
        assert!(m.erase_function(callee).is_some());
        assert!(!m.contains_function(callee));
        assert_eq!(
            m.global(ptr_holder).initializer,
            Some(Constant::Poison(Type::Ptr))
        );
        let func = m.function(caller);
        for inst in func.instructions() {
            if let Some(call) = func.inst(inst).kind.as_call() {
                assert_eq!(call.callee, Operand::Const(Constant::Poison(Type::Ptr)));
            }
        }
    }

    #[test]
    fn test_json_round_trip_preserves_erased_slots() {
        let (mut m, callee, _) = module_with_caller();
        m.erase_function(callee);
        let json = m.to_json().unwrap();
        let back = Module::from_json(&json).unwrap();
        assert_eq!(back, m);
        assert!(back.lookup_function("callee").is_err());
        assert!(matches!(
            back.lookup_global("nope"),
            Err(IrError::UnknownGlobal(_))
        ));
    }
}
