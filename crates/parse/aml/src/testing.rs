//! Test doubles for the interpreter seams.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::mem;

use crate::AmlError;
use crate::context::{ExecutionContext, TermListParser};
use crate::namespace::Namespace;
use crate::path::AmlPath;
use crate::region::{MemoryRegion, RegionRequest, RegionSpace, RegionSpaceKind};
use crate::value::{AmlValue, TermArg, TermList};

/// A minimal interpreter: constants, names and locals only.
///
/// Executing a term list evaluates each term in order and returns the
/// value of the last one.
pub(crate) struct MockContext<'a> {
    ns: Option<&'a Namespace>,
    scope: AmlPath,
    pub return_value: Option<AmlValue>,
    pub locals: [Option<AmlValue>; 8],
    /// Number of `evaluate` calls so far.
    pub evaluations: usize,
    /// Scope in effect at each `execute` call.
    pub scopes_seen: Vec<AmlPath>,
    /// Regions of this kind are mapped to a byte array by the context
    /// instead of the built-in spaces.
    pub intercept: Option<RegionSpaceKind>,
}

impl<'a> MockContext<'a> {
    pub fn new(ns: &'a Namespace) -> Self {
        Self {
            ns: Some(ns),
            ..Self::detached()
        }
    }

    /// A context with no namespace; name operands fail to evaluate.
    pub fn detached() -> Self {
        Self {
            ns: None,
            scope: AmlPath::ROOT,
            return_value: None,
            locals: Default::default(),
            evaluations: 0,
            scopes_seen: Vec::new(),
            intercept: None,
        }
    }
}

impl ExecutionContext for MockContext<'_> {
    fn scope(&self) -> AmlPath {
        self.scope
    }

    fn set_scope(&mut self, scope: AmlPath) -> AmlPath {
        mem::replace(&mut self.scope, scope)
    }

    fn evaluate(&mut self, arg: &TermArg) -> Result<AmlValue, AmlError> {
        self.evaluations += 1;
        match arg {
            TermArg::Value(value) => Ok(value.clone()),
            TermArg::Name(name) => {
                let ns = self.ns.ok_or(AmlError::Evaluation("no namespace"))?;
                let handle = ns.resolve(&self.scope, name)?;
                ns.read_value(handle, self)
            }
            TermArg::Local(i) => self
                .locals
                .get(usize::from(*i))
                .cloned()
                .flatten()
                .ok_or(AmlError::Evaluation("uninitialized local")),
            TermArg::Arg(_) | TermArg::Expression(_) => {
                Err(AmlError::Evaluation("unsupported operand"))
            }
        }
    }

    fn store(&mut self, target: &TermArg, value: AmlValue) -> Result<(), AmlError> {
        match target {
            TermArg::Name(name) => {
                let ns = self.ns.ok_or(AmlError::Evaluation("no namespace"))?;
                let handle = ns.resolve(&self.scope, name)?;
                ns.update_value(handle, value, self)
            }
            TermArg::Local(i) => {
                let slot = self
                    .locals
                    .get_mut(usize::from(*i))
                    .ok_or(AmlError::Evaluation("no such local"))?;
                *slot = Some(value);
                Ok(())
            }
            _ => Err(AmlError::Evaluation("unsupported store target")),
        }
    }

    fn execute(&mut self, terms: &TermList) -> Result<(), AmlError> {
        self.scopes_seen.push(self.scope);
        for term in &terms.0 {
            let value = self.evaluate(term)?;
            self.return_value = Some(value);
        }
        Ok(())
    }

    fn take_return_value(&mut self) -> Option<AmlValue> {
        self.return_value.take()
    }

    fn map_region(
        &mut self,
        request: &RegionRequest,
    ) -> Result<Option<Box<dyn RegionSpace>>, AmlError> {
        if self.intercept != Some(request.kind) {
            return Ok(None);
        }
        let space = MemoryRegion::<u8>::new(
            request.kind,
            request.base,
            request.length,
            request.update_rule,
        )?;
        Ok(Some(Box::new(space)))
    }
}

/// A method body parser that counts how often it runs.
pub(crate) struct CountingParser {
    body: Option<Vec<TermArg>>,
    parses: Rc<Cell<usize>>,
}

impl CountingParser {
    /// A parser that yields `terms`.
    pub fn returning(terms: Vec<TermArg>) -> (Self, Rc<Cell<usize>>) {
        Self::with_body(Some(terms))
    }

    /// A parser that rejects the body as malformed.
    pub fn failing() -> (Self, Rc<Cell<usize>>) {
        Self::with_body(None)
    }

    fn with_body(body: Option<Vec<TermArg>>) -> (Self, Rc<Cell<usize>>) {
        let parses = Rc::new(Cell::new(0));
        (
            Self {
                body,
                parses: Rc::clone(&parses),
            },
            parses,
        )
    }
}

impl TermListParser for CountingParser {
    fn parse_term_list(&mut self) -> Result<TermList, AmlError> {
        self.parses.set(self.parses.get() + 1);
        self.body
            .clone()
            .map(TermList)
            .ok_or(AmlError::Evaluation("malformed method body"))
    }
}
