#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantTy {
    Exists,
    Forall,
}

impl QuantTy {
    /// The opposite kind, as produced by negating a quantifier.
    #[must_use]
    pub fn dual(self) -> Self {
        match self {
            QuantTy::Exists => QuantTy::Forall,
            QuantTy::Forall => QuantTy::Exists,
        }
    }
}

impl std::fmt::Display for QuantTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantTy::Exists => write!(f, "e"),
            QuantTy::Forall => write!(f, "a"),
        }
    }
}
