use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::builtins::Builtin;
use super::value::Value;

/// Name of the interpreter-state module.
pub const SYS_MODULE: &str = "sys";
/// Name of the builtins module; it has no namespace of its own.
pub const BUILTINS_MODULE: &str = "builtins";
/// File extension of importable console modules.
pub const MODULE_EXTENSION: &str = "rws";

/// Ordered set of name bindings.
#[derive(Debug, Default)]
pub struct Namespace {
    bindings: BTreeMap<String, Value>,
}

/// Shared, mutable namespace handle.
pub type NamespaceRef = Rc<RefCell<Namespace>>;

/// Create an empty shared namespace.
pub fn new_namespace() -> NamespaceRef {
    Rc::new(RefCell::new(Namespace::default()))
}

impl Namespace {
    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    /// Bind or rebind a name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Remove a binding, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// All bindings, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// A loaded module.
#[derive(Debug)]
pub struct Module {
    name: String,
    file: Option<PathBuf>,
    namespace: Option<NamespaceRef>,
}

impl Module {
    /// Describe a module. `namespace` is `None` for modules that cannot be
    /// entered (such as `builtins`).
    pub fn new(name: impl Into<String>, file: Option<PathBuf>, namespace: Option<NamespaceRef>) -> Self {
        Self {
            name: name.into(),
            file,
            namespace,
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file, if the module was loaded from disk.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Module namespace, if it has one.
    pub fn namespace(&self) -> Option<&NamespaceRef> {
        self.namespace.as_ref()
    }

    /// Attribute lookup on the module.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match &self.namespace {
            Some(namespace) => namespace.borrow().get(name),
            None => Builtin::lookup(name).map(Value::Builtin),
        }
    }

    /// Rebind an attribute. Returns `false` when the module is read-only.
    pub fn set_attribute(&self, name: &str, value: Value) -> bool {
        match &self.namespace {
            Some(namespace) => {
                namespace.borrow_mut().set(name, value);
                true
            }
            None => false,
        }
    }

    /// Module contents as `(name, value)` pairs.
    pub fn bindings(&self) -> Vec<(String, Value)> {
        match &self.namespace {
            Some(namespace) => namespace.borrow().snapshot(),
            None => Builtin::ALL
                .iter()
                .map(|builtin| (builtin.name().to_string(), Value::Builtin(*builtin)))
                .collect(),
        }
    }
}

/// Registry of loaded modules, shared between the evaluation context and
/// running interpreters.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    modules: Rc<RefCell<BTreeMap<String, Rc<Module>>>>,
    sys: NamespaceRef,
}

impl ModuleRegistry {
    /// Registry holding `sys` and `builtins`.
    pub fn new(search_paths: &[PathBuf], ps1: &str, ps2: &str) -> Self {
        let sys = new_namespace();
        {
            let mut ns = sys.borrow_mut();
            ns.set("__name__", SYS_MODULE);
            ns.set("argv", Value::list(vec![Value::from("")]));
            ns.set(
                "path",
                Value::list(
                    search_paths
                        .iter()
                        .map(|path| Value::from(path.display().to_string()))
                        .collect(),
                ),
            );
            ns.set("ps1", ps1);
            ns.set("ps2", ps2);
            ns.set("stdout", "stdout");
            ns.set("stderr", "stderr");
        }
        let registry = Self {
            modules: Rc::new(RefCell::new(BTreeMap::new())),
            sys: sys.clone(),
        };
        registry.register(Module::new(SYS_MODULE, None, Some(sys)));
        registry.register(Module::new(BUILTINS_MODULE, None, None));
        registry
    }

    /// The `sys` namespace.
    pub fn sys(&self) -> &NamespaceRef {
        &self.sys
    }

    /// Look up a loaded module.
    pub fn get(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.borrow().get(name).cloned()
    }

    /// Register (or replace) a module.
    pub fn register(&self, module: Module) -> Rc<Module> {
        let module = Rc::new(module);
        self.modules
            .borrow_mut()
            .insert(module.name().to_string(), module.clone());
        module
    }

    /// Forget a module whose initialisation failed.
    pub fn unregister(&self, name: &str) {
        self.modules.borrow_mut().remove(name);
    }

    /// Names of all loaded modules.
    pub fn names(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    /// Find the source file of a dotted module name on `sys.path`.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let relative: PathBuf = name.split('.').collect::<PathBuf>().with_extension(MODULE_EXTENSION);
        let search = match self.sys.borrow().get("path") {
            Some(Value::List(items)) => items.borrow().clone(),
            _ => Vec::new(),
        };
        search
            .iter()
            .filter_map(|entry| entry.as_str().map(PathBuf::from))
            .map(|dir| dir.join(&relative))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_with_sys_and_builtins() {
        let registry = ModuleRegistry::new(&[], ">>> ", "... ");
        assert_eq!(registry.names(), vec!["builtins".to_string(), "sys".to_string()]);
        let sys = registry.get("sys").unwrap();
        assert_eq!(sys.attribute("ps1").unwrap().to_str(), ">>> ");
        assert!(registry.get("builtins").unwrap().namespace().is_none());
    }

    #[test]
    fn builtins_module_is_read_only() {
        let registry = ModuleRegistry::new(&[], ">>> ", "... ");
        let builtins = registry.get("builtins").unwrap();
        assert!(!builtins.set_attribute("len", Value::None));
        assert!(builtins.attribute("len").is_some());
    }

    #[test]
    fn locate_searches_sys_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg").join("tools.rws"), "x = 1\n").unwrap();
        let registry = ModuleRegistry::new(&[dir.path().to_path_buf()], ">>> ", "... ");
        assert_eq!(
            registry.locate("pkg.tools"),
            Some(dir.path().join("pkg").join("tools.rws"))
        );
        assert_eq!(registry.locate("missing"), None);
    }
}
