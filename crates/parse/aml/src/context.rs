//! Seams to the interpreter and the bytecode parser.
//!
//! This crate never evaluates expressions or runs method bodies itself. It
//! calls out through [`ExecutionContext`] whenever an operand, region bound
//! or method body has to be evaluated, and through [`TermListParser`] the
//! first time a method body is needed.

use alloc::boxed::Box;

use crate::AmlError;
use crate::path::AmlPath;
use crate::region::{RegionRequest, RegionSpace};
use crate::value::{AmlValue, TermArg, TermList};

/// The interpreter's run-time environment.
///
/// Implementations own the method frame (locals, arguments, return slot)
/// and the current scope used to resolve relative names.
pub trait ExecutionContext {
    /// The scope relative names are resolved against.
    fn scope(&self) -> AmlPath;

    /// Switches the current scope, returning the previous one.
    fn set_scope(&mut self, scope: AmlPath) -> AmlPath;

    /// Evaluates an operand to a concrete value.
    ///
    /// # Errors
    ///
    /// Propagates any evaluation failure.
    fn evaluate(&mut self, arg: &TermArg) -> Result<AmlValue, AmlError>;

    /// Stores `value` into the object an operand refers to.
    ///
    /// # Errors
    ///
    /// Propagates any failure to resolve or update the target.
    fn store(&mut self, target: &TermArg, value: AmlValue) -> Result<(), AmlError>;

    /// Executes the statements of a method body.
    ///
    /// # Errors
    ///
    /// Propagates any execution failure.
    fn execute(&mut self, terms: &TermList) -> Result<(), AmlError>;

    /// Takes the value set by the last executed `Return`, if any.
    fn take_return_value(&mut self) -> Option<AmlValue>;

    /// Supplies a platform region space for an operation region.
    ///
    /// Returning `Ok(None)` falls back to the built-in array-backed spaces.
    /// Kernels override this to route System I/O, PCI configuration or
    /// embedded controller regions to real hardware.
    ///
    /// # Errors
    ///
    /// Implementations may refuse a region outright.
    fn map_region(
        &mut self,
        request: &RegionRequest,
    ) -> Result<Option<Box<dyn RegionSpace>>, AmlError> {
        let _ = request;
        Ok(None)
    }
}

/// Evaluates an operand that must produce an integer.
///
/// # Errors
///
/// Propagates evaluation failures and returns [`AmlError::TypeMismatch`] for
/// non-integer results.
pub fn evaluate_integer<C>(ctx: &mut C, arg: &TermArg) -> Result<u64, AmlError>
where
    C: ExecutionContext + ?Sized,
{
    ctx.evaluate(arg)?.expect_integer()
}

/// Runs `f` with the context's scope temporarily set to `scope`.
///
/// The previous scope is restored whether or not `f` succeeds.
pub fn with_scope<C, R>(ctx: &mut C, scope: AmlPath, f: impl FnOnce(&mut C) -> R) -> R
where
    C: ExecutionContext + ?Sized,
{
    let previous = ctx.set_scope(scope);
    let result = f(ctx);
    ctx.set_scope(previous);
    result
}

/// Produces the term list of a method body on demand.
///
/// A method's parser is invoked at most once.
pub trait TermListParser {
    /// Parses the remaining bytecode as a term list.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytecode is malformed.
    fn parse_term_list(&mut self) -> Result<TermList, AmlError>;
}
