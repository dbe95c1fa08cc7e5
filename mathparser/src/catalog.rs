//! FILENAME: mathparser/src/catalog.rs
//! PURPOSE: Operator/function catalog for one parse session.
//! CONTEXT: The decomposer recognizes three families of built-in callables
//! (real-valued functions, matrix functions, unit conversions) plus a
//! per-session set of discovered user-defined script functions. The built-in
//! tables are immutable configuration constructed once and passed by
//! reference into each parse session; they are never process-wide mutable
//! singletons. User-function entries are additive only and are never removed
//! mid-session.
//!
//! NAME MATCHING: a built-in matches its exact lowercase name or the
//! first-letter-capitalized form ("cos" and "Cos" both match, "COS" does
//! not), preserving the original scripting language's convention.

use crate::value::OutputInfo;
use std::collections::HashMap;
use std::path::PathBuf;

/// Built-in callables resolved at decomposition time. A closed enum so that
/// adding a function is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFunction {
    // Real-valued functions
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan2,
    Atan,
    Log,
    Log10,
    Exp,
    Sqrt,
    Abs,

    // Matrix functions
    Transpose,
    Det,
    Inv,
    Norm,
    Cross,
    Dot,

    // Unit conversions
    DegToRad,
    RadToDeg,
}

/// Every built-in, for exact-name resolution.
const ALL_BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction::Sin,
    BuiltinFunction::Cos,
    BuiltinFunction::Tan,
    BuiltinFunction::Asin,
    BuiltinFunction::Acos,
    BuiltinFunction::Atan2,
    BuiltinFunction::Atan,
    BuiltinFunction::Log,
    BuiltinFunction::Log10,
    BuiltinFunction::Exp,
    BuiltinFunction::Sqrt,
    BuiltinFunction::Abs,
    BuiltinFunction::Transpose,
    BuiltinFunction::Det,
    BuiltinFunction::Inv,
    BuiltinFunction::Norm,
    BuiltinFunction::Cross,
    BuiltinFunction::Dot,
    BuiltinFunction::DegToRad,
    BuiltinFunction::RadToDeg,
];

impl BuiltinFunction {
    /// The canonical (stored) name of the function.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            BuiltinFunction::Sin => "sin",
            BuiltinFunction::Cos => "cos",
            BuiltinFunction::Tan => "tan",
            BuiltinFunction::Asin => "asin",
            BuiltinFunction::Acos => "acos",
            BuiltinFunction::Atan2 => "atan2",
            BuiltinFunction::Atan => "atan",
            BuiltinFunction::Log => "log",
            BuiltinFunction::Log10 => "log10",
            BuiltinFunction::Exp => "exp",
            BuiltinFunction::Sqrt => "sqrt",
            BuiltinFunction::Abs => "abs",
            BuiltinFunction::Transpose => "transpose",
            BuiltinFunction::Det => "det",
            BuiltinFunction::Inv => "inv",
            BuiltinFunction::Norm => "norm",
            BuiltinFunction::Cross => "cross",
            BuiltinFunction::Dot => "dot",
            BuiltinFunction::DegToRad => "degToRad",
            BuiltinFunction::RadToDeg => "radToDeg",
        }
    }

    /// Resolves a scripted name to a built-in, accepting the canonical form
    /// or its first-letter-capitalized variant.
    pub fn from_name(name: &str) -> Option<BuiltinFunction> {
        ALL_BUILTINS
            .iter()
            .copied()
            .find(|f| name_matches(f.canonical_name(), name))
    }

    /// Number of arguments the function takes (1 except the two-argument
    /// built-ins atan2, cross, and dot).
    pub fn arg_count(&self) -> usize {
        match self {
            BuiltinFunction::Atan2 | BuiltinFunction::Cross | BuiltinFunction::Dot => 2,
            _ => 1,
        }
    }

    /// True for functions whose arguments are matrices.
    pub fn takes_matrix(&self) -> bool {
        matches!(
            self,
            BuiltinFunction::Transpose
                | BuiltinFunction::Det
                | BuiltinFunction::Inv
                | BuiltinFunction::Norm
                | BuiltinFunction::Cross
                | BuiltinFunction::Dot
        )
    }
}

/// Returns true if `candidate` is the canonical name or its
/// first-letter-capitalized form.
fn name_matches(canonical: &str, candidate: &str) -> bool {
    if candidate == canonical {
        return true;
    }
    let mut chars = canonical.chars();
    match chars.next() {
        Some(first) => {
            let capitalized: String = first.to_ascii_uppercase().to_string() + chars.as_str();
            candidate == capitalized
        }
        None => false,
    }
}

/// Declared signature of a user-defined script function: how many inputs it
/// takes and the shape of its (single) output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signature {
    pub input_count: usize,
    pub output: OutputInfo,
}

/// Locates the file defining a user script function, so that a function name
/// can be discovered before any statement defines it as an object. The
/// concrete search (script search path, extensions) belongs to the embedder.
pub trait FileLocator {
    fn find_script_function_file(&self, name: &str) -> Option<PathBuf>;
}

/// A FileLocator that never finds anything; useful for sessions that do not
/// support user functions.
pub struct NoFunctionFiles;

impl FileLocator for NoFunctionFiles {
    fn find_script_function_file(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Per-session function catalog: the immutable built-in tables plus the
/// additive set of discovered user-defined function names.
#[derive(Debug, Default)]
pub struct FunctionCatalog {
    user_functions: HashMap<String, Option<Signature>>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        FunctionCatalog {
            user_functions: HashMap::new(),
        }
    }

    /// Resolves a name against the built-in tables.
    pub fn builtin(&self, name: &str) -> Option<BuiltinFunction> {
        BuiltinFunction::from_name(name)
    }

    pub fn is_user_function(&self, name: &str) -> bool {
        self.user_functions.contains_key(name)
    }

    /// True if the name is callable: a built-in or a discovered user
    /// function.
    pub fn is_function(&self, name: &str) -> bool {
        self.builtin(name).is_some() || self.is_user_function(name)
    }

    /// Registers a user function name. Entries are additive only.
    pub fn add_user_function(&mut self, name: impl Into<String>) {
        self.user_functions.entry(name.into()).or_insert(None);
    }

    /// Attaches the declared signature of a user function, supplied by the
    /// embedding scope once the callee's definition is known.
    pub fn set_declared_signature(&mut self, name: &str, signature: Signature) {
        self.user_functions
            .insert(name.to_string(), Some(signature));
    }

    pub fn declared_signature(&self, name: &str) -> Option<Signature> {
        self.user_functions.get(name).copied().flatten()
    }

    /// Scans an expression for identifiers that precede a '(' and are
    /// neither built-ins nor known objects, asking the locator whether a
    /// script function file defines them. Hits are added to the session
    /// catalog. Runs once per expression, before tree building.
    pub fn discover_user_functions(
        &mut self,
        expr: &str,
        is_known_object: &dyn Fn(&str) -> bool,
        locator: &dyn FileLocator,
    ) {
        let bytes = expr.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if is_name_start(bytes[i] as char) {
                let start = i;
                while i < bytes.len() && is_name_char(bytes[i] as char) {
                    i += 1;
                }
                let name = &expr[start..i];
                let followed_by_paren = i < bytes.len() && bytes[i] == b'(';
                if followed_by_paren
                    && self.builtin(name).is_none()
                    && !self.is_user_function(name)
                    && !is_known_object(name)
                    && locator.find_script_function_file(name).is_some()
                {
                    log::debug!("discovered user function '{}'", name);
                    self.add_user_function(name);
                }
            } else {
                i += 1;
            }
        }
    }
}

pub(crate) fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
