//! Transform pipelines
//!
//! A pipeline composes unary transform functions into one function. On read
//! the first function receives every fetched source value positionally and
//! each later function receives the previous result. A function returning
//! `None` asks for the field to be omitted.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Error type returned by caller supplied transforms.
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single transform step.
pub type TransformResult = std::result::Result<Option<Value>, TransformError>;

type TransformFnInner = dyn Fn(&[Option<Value>]) -> TransformResult + Send + Sync;

/// A shareable transform function
#[derive(Clone)]
pub struct TransformFn(Arc<TransformFnInner>);

impl TransformFn {
    /// Wrap a function of a single value.
    ///
    /// When called with several values only the first one is passed on.
    pub fn new(func: impl Fn(Option<Value>) -> TransformResult + Send + Sync + 'static) -> Self {
        Self(Arc::new(move |args: &[Option<Value>]| {
            func(args.first().cloned().flatten())
        }))
    }

    /// Wrap a function that receives every value positionally.
    pub fn variadic(
        func: impl Fn(&[Option<Value>]) -> TransformResult + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(func))
    }

    /// Call the function.
    ///
    /// # Errors
    ///
    /// Returns whatever error the wrapped function returns.
    pub fn call(&self, args: &[Option<Value>]) -> TransformResult {
        (self.0)(args)
    }
}

impl fmt::Debug for TransformFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransformFn")
    }
}

/// Left-to-right composition of transform functions
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<TransformFn>,
}

impl Pipeline {
    /// Compose `steps` in the given order.
    pub fn new(steps: impl IntoIterator<Item = TransformFn>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// A pipeline that returns its first argument unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run `args` through every step.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by a step, unchanged.
    pub fn apply(&self, args: Vec<Option<Value>>) -> crate::Result<Option<Value>> {
        let mut steps = self.steps.iter();
        let Some(first) = steps.next() else {
            return Ok(args.into_iter().next().flatten());
        };

        let mut value = first.call(&args)?;
        for step in steps {
            value = step.call(std::slice::from_ref(&value))?;
        }
        Ok(value)
    }
}

/// A paired read/write transform step.
///
/// Steps are combined with [`paired`]: reads run in the listed order and
/// writes run in reverse, so a list of steps stays invertible.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub read: Option<TransformFn>,
    pub write: Option<TransformFn>,
}

impl Step {
    /// A step that only transforms on read.
    #[must_use]
    pub fn read(read: TransformFn) -> Self {
        Self {
            read: Some(read),
            write: None,
        }
    }

    /// A step that only transforms on write.
    #[must_use]
    pub fn write(write: TransformFn) -> Self {
        Self {
            read: None,
            write: Some(write),
        }
    }

    /// A step with both directions.
    #[must_use]
    pub fn both(read: TransformFn, write: TransformFn) -> Self {
        Self {
            read: Some(read),
            write: Some(write),
        }
    }
}

/// Split paired steps into a read list (in order) and a write list (reversed).
pub fn paired<'a>(
    steps: impl IntoIterator<Item = &'a Step>,
) -> (Vec<TransformFn>, Vec<TransformFn>) {
    let (mut reads, mut writes) = (Vec::new(), Vec::new());
    for step in steps {
        reads.extend(step.read.clone());
        writes.extend(step.write.clone());
    }
    writes.reverse();
    (reads, writes)
}
