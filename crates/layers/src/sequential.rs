//! Ordered composition of fallible stages.
//!
//! Components in this workspace describe their forward pass as a list of
//! stages applied left to right, each consuming the previous output. Stage
//! `i + 1` only ever sees the output of stage `i`, and the first error stops
//! the chain.

/// A boxed stage in a [`Sequential`] pipeline.
pub type Stage<'a, T, E> = Box<dyn Fn(T) -> Result<T, E> + 'a>;

/// Builder-style pipeline of stages sharing one value type.
pub struct Sequential<'a, T, E> {
    stages: Vec<Stage<'a, T, E>>,
}

impl<'a, T, E> Sequential<'a, T, E> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Appends `stage` to the end of the pipeline.
    pub fn then<F>(mut self, stage: F) -> Self
    where
        F: Fn(T) -> Result<T, E> + 'a,
    {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order on `input`.
    pub fn run(&self, input: T) -> Result<T, E> {
        self.stages.iter().try_fold(input, |value, stage| stage(value))
    }
}

impl<'a, T, E> Default for Sequential<'a, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds `input` through `stages` in order.
pub fn sequential<T, E>(stages: &[&dyn Fn(T) -> Result<T, E>], input: T) -> Result<T, E> {
    stages.iter().try_fold(input, |value, stage| stage(value))
}
