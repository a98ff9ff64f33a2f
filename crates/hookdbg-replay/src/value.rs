use std::fmt;
use std::sync::Arc;

use hookdbg_core::host::Locals;
use indexmap::IndexMap;
use parking_lot::Mutex;

/// Object of a replayed program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayValue {
    /// The nil object.
    Nil,

    /// `true` or `false`.
    Bool(bool),

    /// An integer.
    Int(i64),

    /// A string.
    Str(Arc<str>),

    /// An instance of a class.
    Object {
        /// Name of the class of the object.
        class: Arc<str>,
    },

    /// A raised exception.
    Exception {
        /// Name of the class of the exception.
        class: Arc<str>,

        /// Unique identifier of the raise.
        id: u64,
    },
}

impl ReplayValue {
    /// Parses a value from its textual representation.
    ///
    /// Integers, booleans and `nil` are recognized, anything else is a
    /// string.
    pub fn parse(text: &str) -> Self {
        match text {
            "nil" => return Self::Nil,
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => (),
        }

        match text.parse() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Str(text.into()),
        }
    }

    /// Returns whether the value is neither nil nor false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }
}

impl fmt::Display for ReplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::Object { class } => write!(f, "#<{class}>"),
            Self::Exception { class, id } => write!(f, "#<{class}:{id}>"),
        }
    }
}

type Vars = Arc<Mutex<IndexMap<String, ReplayValue>>>;

/// Live variable scope of a replayed call or block.
#[derive(Clone, Debug, Default)]
pub struct ReplayScope {
    /// Variables of the enclosing method.
    locals: Vars,

    /// Variables local to the innermost block, if any.
    dynamic: Option<Vars>,
}

impl ReplayScope {
    /// Creates the scope of a block running within this scope.
    pub fn block(&self) -> Self {
        Self {
            locals: self.locals.clone(),
            dynamic: Some(Vars::default()),
        }
    }

    /// Assigns a variable.
    ///
    /// Within a block, variables of the enclosing method are assigned in
    /// place while new variables are local to the block.
    pub fn set(&self, name: &str, value: ReplayValue) {
        let mut locals = self.locals.lock();

        match (&self.dynamic, locals.get_mut(name)) {
            (_, Some(slot)) => *slot = value,
            (Some(dynamic), None) => {
                dynamic.lock().insert(name.to_owned(), value);
            }
            (None, None) => {
                locals.insert(name.to_owned(), value);
            }
        }
    }

    /// Reads a variable.
    pub fn get(&self, name: &str) -> Option<ReplayValue> {
        if let Some(dynamic) = &self.dynamic {
            if let Some(value) = dynamic.lock().get(name) {
                return Some(value.clone());
            }
        }

        self.locals.lock().get(name).cloned()
    }

    pub(crate) fn locals(&self) -> Vec<(String, ReplayValue)> {
        snapshot(&self.locals)
    }

    pub(crate) fn dynamic(&self) -> Vec<(String, ReplayValue)> {
        self.dynamic.as_ref().map(snapshot).unwrap_or_default()
    }
}

fn snapshot(vars: &Vars) -> Vec<(String, ReplayValue)> {
    vars.lock()
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Variables visible from a binding.
#[derive(Clone, Debug)]
pub enum BindingVars {
    /// Variables of a live scope.
    Live(ReplayScope),

    /// Variables copied from a frame.
    Frozen(Locals<ReplayValue>),
}

/// Evaluation context of a replayed program.
#[derive(Clone, Debug)]
pub struct ReplayBinding {
    /// Receiver of the binding.
    pub receiver: ReplayValue,

    /// Variables visible from the binding.
    pub vars: BindingVars,
}

impl ReplayBinding {
    /// Reads a variable visible from the binding.
    pub fn get(&self, name: &str) -> Option<ReplayValue> {
        match &self.vars {
            BindingVars::Live(scope) => scope.get(name),
            BindingVars::Frozen(locals) => locals.get(name).cloned(),
        }
    }
}

/// Type of a replayed program.
///
/// Anonymous wrapper types are written `#<Class:Name>` for the singleton type
/// of `Name`, and `#<include:Name>` for the inclusion wrapper of module
/// `Name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReplayType(pub Arc<str>);

impl ReplayType {
    /// Creates a new type reference.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the name of the type.
    pub fn name(&self) -> &str {
        &self.0
    }

    pub(crate) fn singleton_of(&self) -> Option<Self> {
        wrapped(&self.0, "#<Class:").map(Self::new)
    }

    pub(crate) fn included_module(&self) -> Option<Self> {
        wrapped(&self.0, "#<include:").map(Self::new)
    }
}

fn wrapped<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_suffix('>')
}

#[cfg(test)]
mod tests {
    use super::{ReplayScope, ReplayType, ReplayValue};

    #[test]
    fn parse_values() {
        assert_eq!(ReplayValue::parse("nil"), ReplayValue::Nil);
        assert_eq!(ReplayValue::parse("-3"), ReplayValue::Int(-3));
        assert_eq!(ReplayValue::parse("abc"), ReplayValue::Str("abc".into()));
        assert_eq!(ReplayValue::parse("false"), ReplayValue::Bool(false));
        assert_eq!(ReplayValue::parse("true").to_string(), "true");

        assert!(!ReplayValue::parse("false").is_truthy());
        assert!(ReplayValue::parse("true").is_truthy());
        assert!(ReplayValue::parse("0").is_truthy());
        assert!(ReplayValue::Str("false".into()).is_truthy());
    }

    #[test]
    fn block_scope_assignments() {
        let scope = ReplayScope::default();
        scope.set("x", ReplayValue::Int(1));

        let block = scope.block();
        block.set("x", ReplayValue::Int(2));
        block.set("y", ReplayValue::Int(3));

        assert_eq!(scope.get("x"), Some(ReplayValue::Int(2)));
        assert_eq!(scope.get("y"), None);
        assert_eq!(block.get("y"), Some(ReplayValue::Int(3)));
        assert_eq!(block.dynamic().len(), 1);
        assert_eq!(block.locals().len(), 1);
    }

    #[test]
    fn wrapper_types() {
        let singleton = ReplayType::new("#<Class:Worker>");
        assert_eq!(singleton.singleton_of(), Some(ReplayType::new("Worker")));
        assert_eq!(singleton.included_module(), None);

        let included = ReplayType::new("#<include:Helpers>");
        assert_eq!(included.included_module(), Some(ReplayType::new("Helpers")));
        assert_eq!(ReplayType::new("Worker").singleton_of(), None);
    }
}
