//! Middleware pipeline builder — composes a terminal endpoint with an
//! ordered stack of middleware into a single callable.
//!
//! Middleware is represented in the factory form favored by [DESIGN NOTES]:
//! a [`Layer`] is a function from "the successor handler" to "a new handler
//! that wraps it", which makes the successor immutable once bound. This
//! mirrors how `gotham`'s `PipelineBuilder` recursively closes over the
//! tail of the chain, generalized here to a concrete (non-type-level) stack
//! so middleware can be composed at runtime.
//!
//! [DESIGN NOTES]: https://docs.rs/wharf (see crate-level docs, §9)

use std::cell::RefCell;
use std::sync::Arc;

use crate::error::WharfError;

/// A terminal or intermediate request handler: `I -> O`.
///
/// In the HTTP worker this is instantiated as
/// `Handler<Environment, ResponseTriple>`; the generic form also lets the
/// builder be exercised with plain types (e.g. `String -> String`) for unit
/// testing of ordering semantics.
pub type Handler<I, O> = Arc<dyn Fn(I) -> O + Send + Sync>;

/// A middleware layer: given the successor handler, returns a new handler
/// that wraps it. The successor is captured by the closure and is
/// immutable from that point on.
pub type Layer<I, O> = Arc<dyn Fn(Handler<I, O>) -> Handler<I, O> + Send + Sync>;

/// Builds an ordered middleware stack terminated by an endpoint, then
/// produces a single callable that routes a request through the pipeline.
///
/// # Ordering
///
/// Middleware wraps the endpoint in "onion" order: the first-appended
/// middleware is outermost. `prepend` inserts a new outermost layer.
/// For middleware `A` then `B` then endpoint `E`, the call order is
/// `A -> B -> E` and responses unwind `E -> B -> A`.
///
/// # Caching
///
/// `build()` may be called repeatedly; the compiled handler is cached and
/// only recomputed after `append`, `prepend`, or `set_endpoint` invalidate
/// it.
pub struct PipelineBuilder<I, O> {
    middleware: Vec<Layer<I, O>>,
    endpoint: Option<Handler<I, O>>,
    cached: RefCell<Option<Handler<I, O>>>,
}

impl<I, O> PipelineBuilder<I, O>
where
    I: 'static,
    O: 'static,
{
    /// Creates an empty builder with no middleware and no endpoint.
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            endpoint: None,
            cached: RefCell::new(None),
        }
    }

    /// Equivalent to constructing an empty builder, appending each
    /// middleware in list order, then setting the endpoint.
    pub fn from_parts(middleware: Vec<Layer<I, O>>, endpoint: Handler<I, O>) -> Self {
        Self {
            middleware,
            endpoint: Some(endpoint),
            cached: RefCell::new(None),
        }
    }

    /// Appends a middleware layer as the new innermost wrapper (closest to
    /// the endpoint).
    pub fn append(&mut self, middleware: Layer<I, O>) -> &mut Self {
        self.middleware.push(middleware);
        self.cached.borrow_mut().take();
        self
    }

    /// Prepends a middleware layer as the new outermost wrapper.
    pub fn prepend(&mut self, middleware: Layer<I, O>) -> &mut Self {
        self.middleware.insert(0, middleware);
        self.cached.borrow_mut().take();
        self
    }

    /// Sets (or replaces) the terminal endpoint handler.
    pub fn set_endpoint(&mut self, endpoint: Handler<I, O>) -> &mut Self {
        self.endpoint = Some(endpoint);
        self.cached.borrow_mut().take();
        self
    }

    /// Binds each middleware's successor from last to first and returns the
    /// first middleware's handler, or the endpoint directly if there is no
    /// middleware.
    ///
    /// # Errors
    ///
    /// Returns [`WharfError::NoEndpoint`] if no endpoint has been set.
    pub fn build(&self) -> Result<Handler<I, O>, WharfError> {
        if let Some(handler) = self.cached.borrow().as_ref() {
            return Ok(Arc::clone(handler));
        }

        let endpoint = self.endpoint.clone().ok_or(WharfError::NoEndpoint)?;
        let handler = self
            .middleware
            .iter()
            .rev()
            .fold(endpoint, |next, layer| layer(next));

        *self.cached.borrow_mut() = Some(Arc::clone(&handler));
        Ok(handler)
    }

    /// Equivalent to `build()` followed by one invocation.
    pub fn invoke(&self, input: I) -> Result<O, WharfError> {
        let handler = self.build()?;
        Ok(handler(input))
    }
}

impl<I, O> Default for PipelineBuilder<I, O>
where
    I: 'static,
    O: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint_handled() -> Handler<String, String> {
        Arc::new(|input: String| format!("{input}HANDLED"))
    }

    fn wrap(prefix: &'static str, suffix: &'static str) -> Layer<String, String> {
        Arc::new(move |next: Handler<String, String>| {
            let next = Arc::clone(&next);
            Arc::new(move |input: String| {
                let wrapped = format!("{prefix}{input}");
                let out = next(wrapped);
                format!("{out}{suffix}")
            })
        })
    }

    #[test]
    fn empty_pipeline_returns_endpoint_directly() {
        let mut builder: PipelineBuilder<String, String> = PipelineBuilder::new();
        builder.set_endpoint(Arc::new(|_: String| "R".to_string()));
        assert_eq!(builder.invoke("X".to_string()).unwrap(), "R");
    }

    #[test]
    fn two_middleware_onion_order() {
        let mut builder: PipelineBuilder<String, String> = PipelineBuilder::new();
        builder.append(wrap("1", "1"));
        builder.append(wrap("2", "2"));
        builder.set_endpoint(endpoint_handled());
        assert_eq!(
            builder.invoke("TESTDATA".to_string()).unwrap(),
            "21TESTDATAHANDLED21"
        );
    }

    #[test]
    fn prepend_inserts_new_outermost_layer() {
        let mut builder: PipelineBuilder<String, String> = PipelineBuilder::new();
        builder.append(wrap("1", "1"));
        builder.prepend(wrap("2", "2"));
        builder.set_endpoint(endpoint_handled());
        assert_eq!(
            builder.invoke("TESTDATA".to_string()).unwrap(),
            "12TESTDATAHANDLED12"
        );
    }

    #[test]
    fn no_endpoint_fails() {
        let builder: PipelineBuilder<String, String> = PipelineBuilder::new();
        assert!(matches!(
            builder.invoke("X".to_string()),
            Err(WharfError::NoEndpoint)
        ));
    }

    #[test]
    fn from_parts_matches_append_then_set_endpoint() {
        let builder = PipelineBuilder::from_parts(
            vec![wrap("1", "1"), wrap("2", "2")],
            endpoint_handled(),
        );
        assert_eq!(
            builder.invoke("TESTDATA".to_string()).unwrap(),
            "21TESTDATAHANDLED21"
        );
    }

    #[test]
    fn build_is_cached_until_mutated() {
        let mut builder: PipelineBuilder<String, String> = PipelineBuilder::new();
        builder.set_endpoint(Arc::new(|s: String| s));
        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        builder.append(wrap("x", "x"));
        let third = builder.build().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
