//! Error types for the stochbb random-variable engine.
//!
//! The variants mirror the error kinds the engine's error-handling design
//! names: a combinator that requires independence rejects dependent
//! children with [`StochError::Dependency`], invalid numeric parameters
//! raise [`StochError::Domain`], a numerical evaluation that produces a
//! non-finite result raises [`StochError::Convergence`], and a construction
//! the simplifier cannot currently handle raises
//! [`StochError::NotSupported`]. None of these are retried by the engine;
//! every one is surfaced to the caller.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

pub type StochResult<T> = Result<T, StochError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    Dependency,
    Domain,
    Convergence,
    NotSupported,
    Multiple,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

#[derive(Debug)]
pub enum StochError {
    /// A combinator requiring mutually independent children (`Sum`, `Min`,
    /// `Max`, `Mixture`) received children whose atom sets intersect.
    Dependency { message: ErrString },
    /// Invalid parameters: `sigma <= 0`, gamma shape/scale `<= 0`, mixture
    /// weights not summing to 1, `Tmin >= Tmax`, `N == 0`, non-positive
    /// affine scale.
    Domain { message: ErrString },
    /// Numerical compound quadrature or convolution produced a non-finite
    /// value.
    Convergence { message: ErrString },
    /// A construction the simplifier/engine does not currently handle
    /// (e.g. subtraction of a strictly-positive variable).
    NotSupported { message: ErrString },

    Multiple(MultiDisplay),

    Context {
        context: ErrorContext,
        source: Box<StochError>,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
}

impl StochError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Dependency { .. } => ErrorCode::Dependency,
            Self::Domain { .. } => ErrorCode::Domain,
            Self::Convergence { .. } => ErrorCode::Convergence,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::Multiple(_) => ErrorCode::Multiple,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        StochError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
            #[cfg(feature = "backtrace")]
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for StochError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency { message } => write!(f, "Dependency error: {}", message),
            Self::Domain { message } => write!(f, "Domain error: {}", message),
            Self::Convergence { message } => write!(f, "Convergence error: {}", message),
            Self::NotSupported { message } => write!(f, "Not supported: {}", message),
            Self::Multiple(m) => write!(f, "Multiple errors:\n{}", m),
            Self::Context {
                context, source, ..
            } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for StochError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}

impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorContext {}

#[derive(Debug)]
pub struct MultiDisplay(Vec<StochError>);

impl Display for MultiDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {} (code: {:?})", i, e, e.code())?;
        }
        Ok(())
    }
}

impl From<Vec<StochError>> for MultiDisplay {
    fn from(v: Vec<StochError>) -> Self {
        Self(v)
    }
}

impl From<Vec<StochError>> for StochError {
    fn from(v: Vec<StochError>) -> Self {
        StochError::Multiple(MultiDisplay(v))
    }
}

/// Ergonomic `Result` extension for attaching context to an error as it
/// propagates, e.g. `density_of(node).context("while evaluating Sum child")`.
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> StochResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> StochResult<T>;
}

impl<T, E: Into<StochError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> StochResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> StochResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

pub trait IntoStochError<T> {
    fn into_stoch_error(self) -> StochResult<T>;
}

impl<T, E: Into<StochError>> IntoStochError<T> for Result<T, E> {
    fn into_stoch_error(self) -> StochResult<T> {
        self.map_err(Into::into)
    }
}

#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! stochbb_err {
    (Dependency: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::StochError::Dependency { message: format!($fmt, $($arg),*).into() })
    };
    (Domain: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::StochError::Domain { message: format!($fmt, $($arg),*).into() })
    };
    (Convergence: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::StochError::Convergence { message: format!($fmt, $($arg),*).into() })
    };
    (NotSupported: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::StochError::NotSupported { message: format!($fmt, $($arg),*).into() })
    };
    ($variant:ident: $msg:expr $(,)?) => {{
        $crate::__private::must_use($crate::StochError::Domain { message: $msg.into() })
    }};
}

#[macro_export]
macro_rules! stochbb_bail {
    ($($tt:tt)+) => { return Err($crate::stochbb_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::stochbb_bail!($($tt)+); }
    };
}
