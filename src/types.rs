use sealed::sealed;
use std::fmt;

/// An enumeration of the types of items the library exposes, used mainly for reporting and serialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Annotation,
    Document,
    Config,
    Pattern,
    Token,
}

impl Type {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Annotation => "Annotation",
            Self::Document => "Document",
            Self::Config => "Config",
            Self::Pattern => "Pattern",
            Self::Token => "Token",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provides the type of an item at runtime.
/// This is a sealed trait, not implementable outside this crate.
#[sealed(pub(crate))]
pub trait TypeInfo {
    fn typeinfo() -> Type;
}
