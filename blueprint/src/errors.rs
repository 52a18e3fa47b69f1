use thiserror::Error;

/// Diagnostic raised while applying arguments or making a blueprint.
///
/// Messages are fully rendered at the raise site (including suggestions and
/// nesting hints), so `Display` is the user-facing text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlueprintError {
    /// A required parameter path has no binding, no viable default, and no
    /// fully-default polymorphic instance.
    #[error("{0}")]
    MissingArg(String),
    /// A layer contains a key that is neither used nor clobbered.
    #[error("{0}")]
    ExtraneousArg(String),
    /// A reference targets a non-existent path, or a castable string can be
    /// interpreted neither as a value nor as a factory.
    #[error("{0}")]
    InvalidArg(String),
    /// Structural failure: un-introspectable target, variadic misuse,
    /// wildcard-vs-default ambiguity, or a reference cycle.
    #[error("{0}")]
    Construction(String),
    /// `--help` was requested; carries the rendered help text.
    #[error("{0}")]
    Help(String),
}

impl BlueprintError {
    /// Append a context note to the message, preserving the variant.
    pub(crate) fn with_note(self, note: &str) -> Self {
        match self {
            Self::MissingArg(m) => Self::MissingArg(format!("{m}{note}")),
            Self::ExtraneousArg(m) => Self::ExtraneousArg(format!("{m}{note}")),
            Self::InvalidArg(m) => Self::InvalidArg(format!("{m}{note}")),
            Self::Construction(m) => Self::Construction(format!("{m}{note}")),
            Self::Help(m) => Self::Help(m),
        }
    }
}

/// A string could not be coerced to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CastError(pub String);

/// A factory string could not be resolved by a meta-factory.
///
/// Internal to the meta-factory layer; always converted to
/// [`BlueprintError::InvalidArg`] at the construction-walk boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MetaFromString(pub String);
