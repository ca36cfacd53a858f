//! visitor pattern helpers
mod visit_references;
pub use visit_references::{Reference, VisitReferences};

/// Visitor that visits its subjects by reference
pub trait Visit<T> {
    fn visit(&mut self, value: &T);
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(&T),
{
    fn visit(&mut self, value: &T) {
        self(value)
    }
}
