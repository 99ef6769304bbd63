use super::ModuleNode;
use crate::containers::{Concat, Sequential};
use crate::layers::{
    BatchNorm, Convolution, DropConnect, Dropout, Flatten, Identity, Linear, LogSoftMax, Logistic, ReLU, SoftMax,
    TanH,
};
use crate::module::Module;
use crate::recurrent::{Lstm, Recurrent, Sequencer};
use neurarust_tensor::{NeuraNumeric, NeuraRustError};
use std::collections::HashMap;
use std::fmt;

/// Rebuilds a module from its saved node. Loaders of composite modules call
/// back into the registry for their children.
pub type LoaderFn<T> = fn(&ModuleNode, &ModuleRegistry<T>) -> Result<Box<dyn Module<T>>, NeuraRustError>;

/// Wraps a concrete `load` associated function into a [`LoaderFn`].
macro_rules! loader {
    ($ty:ident) => {
        |node, registry| Ok(Box::new($ty::load(node, registry)?) as Box<dyn Module<T>>)
    };
}

/// Maps type tags (`ModuleNode::kind`) to loader functions.
#[derive(Clone)]
pub struct ModuleRegistry<T: NeuraNumeric> {
    loaders: HashMap<String, LoaderFn<T>>,
}

impl<T: NeuraNumeric> ModuleRegistry<T> {
    /// A registry that knows no types.
    pub fn new() -> Self {
        ModuleRegistry {
            loaders: HashMap::new(),
        }
    }

    /// A registry that knows every module type of this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Linear", loader!(Linear));
        registry.register("Identity", loader!(Identity));
        registry.register("Logistic", loader!(Logistic));
        registry.register("TanH", loader!(TanH));
        registry.register("ReLU", loader!(ReLU));
        registry.register("LogSoftMax", loader!(LogSoftMax));
        registry.register("SoftMax", loader!(SoftMax));
        registry.register("BatchNorm", loader!(BatchNorm));
        registry.register("Dropout", loader!(Dropout));
        registry.register("DropConnect", loader!(DropConnect));
        registry.register("Convolution", loader!(Convolution));
        registry.register("Flatten", loader!(Flatten));
        registry.register("Sequential", loader!(Sequential));
        registry.register("Concat", loader!(Concat));
        registry.register("Recurrent", loader!(Recurrent));
        registry.register("LSTM", loader!(Lstm));
        registry.register("Sequencer", loader!(Sequencer));
        registry
    }

    /// Adds or replaces the loader for `kind`.
    pub fn register(&mut self, kind: &str, loader: LoaderFn<T>) {
        if self.loaders.insert(kind.to_string(), loader).is_some() {
            log::debug!("replaced loader for module type '{}'", kind);
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.loaders.contains_key(kind)
    }

    /// Rebuilds the module graph rooted at `node`.
    ///
    /// # Errors
    /// Returns `SerializationError` for an unknown type tag, or whatever the
    /// type's loader reports for a malformed node.
    pub fn load(&self, node: &ModuleNode) -> Result<Box<dyn Module<T>>, NeuraRustError> {
        let loader = self.loaders.get(&node.kind).ok_or_else(|| {
            NeuraRustError::SerializationError(format!("unknown module type '{}'", node.kind))
        })?;
        loader(node, self)
    }
}

impl<T: NeuraNumeric> fmt::Debug for ModuleRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ModuleRegistry").field("kinds", &kinds).finish()
    }
}

impl<T: NeuraNumeric> Default for ModuleRegistry<T> {
    fn default() -> Self {
        Self::with_builtins()
    }
}
