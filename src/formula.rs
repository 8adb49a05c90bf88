//! The quantified Boolean formula algebra.
//!
//! A [`Formula`] is an immutable tree. Transformations never mutate a node;
//! they build a new tree, sharing unchanged subtrees through [`Arc`].

use crate::QuantTy;
use std::{collections::BTreeSet, fmt::Display, str::FromStr, sync::Arc};
use thiserror::Error;

pub mod stream;

/// Construction of a node violated a structural invariant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidStructure {
    #[error("variable name must not be empty")]
    EmptyName,

    #[error("variable name {0:?} contains whitespace or unprintable characters")]
    UnprintableName(String),

    #[error("{op} requires at least two operands, got {found}")]
    TooFewOperands { op: &'static str, found: usize },

    #[error("quantifier binds no variables")]
    EmptyQuantifier,
}

/// The name of a propositional atom.
///
/// Names are non-empty strings of printable, non-whitespace characters.
/// Cloning is cheap, the underlying buffer is shared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarName(Arc<str>);

impl VarName {
    pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidStructure> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(InvalidStructure::EmptyName);
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(InvalidStructure::UnprintableName(name.to_string()));
        }
        Ok(Self(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VarName {
    type Err = InvalidStructure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Display for VarName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quantified Boolean formula.
///
/// `And`/`Or` hold at least two children; quantifiers bind a non-empty set
/// of pairwise-distinct names. The checked constructors below enforce this,
/// the [`conj`](Formula::conj)/[`disj`](Formula::disj) constructors restore
/// it by flattening and collapsing.
///
/// Equality is structural: child sequences compare in order, quantifier
/// variable sets compare as sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Var(VarName),
    Not(Arc<Formula>),
    And(Vec<Arc<Formula>>),
    Or(Vec<Arc<Formula>>),
    Forall(BTreeSet<VarName>, Arc<Formula>),
    Exists(BTreeSet<VarName>, Arc<Formula>),
}

impl Formula {
    /// A variable atom. Fails if `name` violates the [`VarName`] rules.
    pub fn var(name: impl AsRef<str>) -> Result<Self, InvalidStructure> {
        Ok(Formula::Var(VarName::new(name)?))
    }

    /// A positive or negative literal over `name`.
    pub fn literal(name: VarName, positive: bool) -> Self {
        let var = Formula::Var(name);
        if positive {
            var
        } else {
            Formula::not(var)
        }
    }

    pub fn not(child: Formula) -> Self {
        Formula::Not(Arc::new(child))
    }

    /// An n-ary conjunction. Fails unless there are at least two children.
    pub fn and(children: Vec<Formula>) -> Result<Self, InvalidStructure> {
        Self::nary("And", children).map(Formula::And)
    }

    /// An n-ary disjunction. Fails unless there are at least two children.
    pub fn or(children: Vec<Formula>) -> Result<Self, InvalidStructure> {
        Self::nary("Or", children).map(Formula::Or)
    }

    fn nary(
        op: &'static str,
        children: Vec<Formula>,
    ) -> Result<Vec<Arc<Formula>>, InvalidStructure> {
        if children.len() < 2 {
            return Err(InvalidStructure::TooFewOperands { op, found: children.len() });
        }
        Ok(children.into_iter().map(Arc::new).collect())
    }

    /// A universal quantifier binding `vars` over `body`.
    pub fn forall(
        vars: impl IntoIterator<Item = VarName>,
        body: Formula,
    ) -> Result<Self, InvalidStructure> {
        Self::quantified(QuantTy::Forall, vars.into_iter().collect(), body)
    }

    /// An existential quantifier binding `vars` over `body`.
    pub fn exists(
        vars: impl IntoIterator<Item = VarName>,
        body: Formula,
    ) -> Result<Self, InvalidStructure> {
        Self::quantified(QuantTy::Exists, vars.into_iter().collect(), body)
    }

    /// A quantifier of the given kind. Fails if `vars` is empty.
    pub fn quantified(
        quant: QuantTy,
        vars: BTreeSet<VarName>,
        body: Formula,
    ) -> Result<Self, InvalidStructure> {
        if vars.is_empty() {
            return Err(InvalidStructure::EmptyQuantifier);
        }
        let body = Arc::new(body);
        Ok(match quant {
            QuantTy::Forall => Formula::Forall(vars, body),
            QuantTy::Exists => Formula::Exists(vars, body),
        })
    }

    /// Conjunction that restores the invariants instead of failing:
    /// nested `And` children are flattened into the new node, a single
    /// child is returned as-is and no child yields the identity `True`.
    pub fn conj(children: impl IntoIterator<Item = Formula>) -> Self {
        Self::conj_arcs(children.into_iter().map(Arc::new).collect())
    }

    /// Disjunction counterpart of [`conj`](Formula::conj); the empty
    /// disjunction is `False`.
    pub fn disj(children: impl IntoIterator<Item = Formula>) -> Self {
        Self::disj_arcs(children.into_iter().map(Arc::new).collect())
    }

    pub(crate) fn conj_arcs(children: Vec<Arc<Formula>>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match &*child {
                Formula::And(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(child),
            }
        }
        match flat.len() {
            0 => Formula::True,
            1 => unshare(flat.pop().expect("len is 1")),
            _ => Formula::And(flat),
        }
    }

    pub(crate) fn disj_arcs(children: Vec<Arc<Formula>>) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match &*child {
                Formula::Or(inner) => flat.extend(inner.iter().cloned()),
                _ => flat.push(child),
            }
        }
        match flat.len() {
            0 => Formula::False,
            1 => unshare(flat.pop().expect("len is 1")),
            _ => Formula::Or(flat),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Formula::True | Formula::False)
    }

    pub fn is_negation(&self) -> bool {
        matches!(self, Formula::Not(_))
    }

    pub fn is_quantifier(&self) -> bool {
        matches!(self, Formula::Forall(..) | Formula::Exists(..))
    }

    /// A variable or a negated variable.
    pub fn is_literal(&self) -> bool {
        match self {
            Formula::Var(_) => true,
            Formula::Not(child) => matches!(**child, Formula::Var(_)),
            _ => false,
        }
    }

    /// A literal, or a disjunction of literals.
    pub fn is_clause(&self) -> bool {
        match self {
            Formula::Or(children) => children.iter().all(|c| c.is_literal()),
            _ => self.is_literal(),
        }
    }

    /// A clause, or a conjunction of clauses. `True` counts as the empty
    /// conjunction, which is what [`conj`](Formula::conj) collapses it to.
    pub fn is_cnf_matrix(&self) -> bool {
        match self {
            Formula::True => true,
            Formula::And(children) => children.iter().all(|c| c.is_clause()),
            _ => self.is_clause(),
        }
    }

    /// Every negation applies directly to a variable.
    pub fn is_nnf(&self) -> bool {
        self.subformulas().all(|f| match f {
            Formula::Not(child) => matches!(**child, Formula::Var(_)),
            _ => true,
        })
    }

    /// Every quantifier lies on the prefix chain at the root.
    pub fn is_pnf(&self) -> bool {
        let mut matrix = self;
        while let Some((_, _, body)) = matrix.quant() {
            matrix = body;
        }
        matrix.subformulas().all(|f| !f.is_quantifier())
    }

    /// Destructures a quantifier node.
    pub fn quant(&self) -> Option<(QuantTy, &BTreeSet<VarName>, &Formula)> {
        match self {
            Formula::Forall(vars, body) => Some((QuantTy::Forall, vars, body)),
            Formula::Exists(vars, body) => Some((QuantTy::Exists, vars, body)),
            _ => None,
        }
    }

    /// The set of distinct variable names occurring anywhere, bound sites
    /// included.
    pub fn variable_set(&self) -> BTreeSet<VarName> {
        let mut names: BTreeSet<VarName> = self.variables().cloned().collect();
        for f in self.subformulas() {
            if let Some((_, vars, _)) = f.quant() {
                names.extend(vars.iter().cloned());
            }
        }
        names
    }

    /// The set of distinct free variable names.
    pub fn free_variable_set(&self) -> BTreeSet<VarName> {
        self.free_variables().cloned().collect()
    }
}

fn unshare(f: Arc<Formula>) -> Formula {
    Arc::try_unwrap(f).unwrap_or_else(|shared| (*shared).clone())
}

impl Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join(
            f: &mut std::fmt::Formatter<'_>,
            children: &[Arc<Formula>],
            sep: &str,
        ) -> std::fmt::Result {
            write!(f, "(")?;
            for (idx, child) in children.iter().enumerate() {
                if idx > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")
        }

        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Var(name) => write!(f, "{name}"),
            Formula::Not(child) if child.is_quantifier() => write!(f, "!({child})"),
            Formula::Not(child) => write!(f, "!{child}"),
            Formula::And(children) => join(f, children, "&"),
            Formula::Or(children) => join(f, children, "|"),
            Formula::Forall(vars, body) | Formula::Exists(vars, body) => {
                let quant =
                    if matches!(self, Formula::Forall(..)) { "forall" } else { "exists" };
                write!(f, "{quant}")?;
                for var in vars {
                    write!(f, " {var}")?;
                }
                write!(f, ". {body}")
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::{Formula, VarName};

    pub(crate) fn name(s: &str) -> VarName {
        VarName::new(s).unwrap()
    }

    pub(crate) fn v(s: &str) -> Formula {
        Formula::var(s).unwrap()
    }

    pub(crate) fn nv(s: &str) -> Formula {
        Formula::not(v(s))
    }

    pub(crate) fn and(children: Vec<Formula>) -> Formula {
        Formula::and(children).unwrap()
    }

    pub(crate) fn or(children: Vec<Formula>) -> Formula {
        Formula::or(children).unwrap()
    }

    pub(crate) fn forall(vars: &[&str], body: Formula) -> Formula {
        Formula::forall(vars.iter().map(|s| name(s)), body).unwrap()
    }

    pub(crate) fn exists(vars: &[&str], body: Formula) -> Formula {
        Formula::exists(vars.iter().map(|s| name(s)), body).unwrap()
    }
}


#[cfg(test)]
mod test {
    use super::testutil::*;
    use super::*;

    #[test]
    fn nary_arity() {
        assert_eq!(
            Formula::and(vec![]),
            Err(InvalidStructure::TooFewOperands { op: "And", found: 0 })
        );
        assert_eq!(
            Formula::or(vec![v("x")]),
            Err(InvalidStructure::TooFewOperands { op: "Or", found: 1 })
        );
        assert!(Formula::and(vec![v("x"), v("y")]).is_ok());
    }

    #[test]
    fn quantifier_needs_variables() {
        assert_eq!(
            Formula::forall(Vec::<VarName>::new(), v("x")),
            Err(InvalidStructure::EmptyQuantifier)
        );
        assert!(Formula::exists([name("x")], v("x")).is_ok());
    }

    #[test]
    fn variable_names_are_validated() {
        assert_eq!(Formula::var(""), Err(InvalidStructure::EmptyName));
        assert!(matches!(Formula::var("a b"), Err(InvalidStructure::UnprintableName(_))));
        assert!(matches!(Formula::var("a\tb"), Err(InvalidStructure::UnprintableName(_))));
        assert!(Formula::var("x1").is_ok());
        assert!(Formula::var("-weird-").is_ok());
    }

    #[test]
    fn conj_collapses() {
        assert_eq!(Formula::conj(vec![]), Formula::True);
        assert_eq!(Formula::disj(vec![]), Formula::False);
        assert_eq!(Formula::conj(vec![v("x")]), v("x"));
        assert_eq!(Formula::disj(vec![nv("x")]), nv("x"));
    }

    #[test]
    fn conj_flattens_nested() {
        let nested = Formula::conj(vec![and(vec![v("a"), v("b")]), v("c")]);
        assert_eq!(nested, and(vec![v("a"), v("b"), v("c")]));
        // one level only, Or below And stays intact
        let mixed = Formula::conj(vec![or(vec![v("a"), v("b")]), v("c")]);
        assert_eq!(mixed, and(vec![or(vec![v("a"), v("b")]), v("c")]));
    }

    #[test]
    fn predicates() {
        assert!(v("x").is_literal());
        assert!(nv("x").is_literal());
        assert!(!Formula::not(nv("x")).is_literal());
        assert!(Formula::not(nv("x")).is_negation());
        assert!(!v("x").is_negation());
        assert!(Formula::True.is_constant());
        assert!(or(vec![v("x"), nv("y")]).is_clause());
        assert!(!or(vec![v("x"), and(vec![v("a"), v("b")])]).is_clause());
        assert!(and(vec![or(vec![v("x"), nv("y")]), v("z")]).is_cnf_matrix());
        assert!(forall(&["x"], v("x")).is_quantifier());
    }

    #[test]
    fn nnf_and_pnf_predicates() {
        assert!(and(vec![nv("x"), v("y")]).is_nnf());
        assert!(!Formula::not(and(vec![v("x"), v("y")])).is_nnf());

        assert!(forall(&["x"], exists(&["y"], or(vec![v("x"), v("y")]))).is_pnf());
        assert!(!and(vec![forall(&["x"], v("x")), v("y")]).is_pnf());
    }

    #[test]
    fn quantifier_sets_compare_as_sets() {
        let a = Formula::forall([name("x"), name("y")], v("z")).unwrap();
        let b = Formula::forall([name("y"), name("x")], v("z")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn child_sequences_compare_in_order() {
        assert_ne!(and(vec![v("x"), v("y")]), and(vec![v("y"), v("x")]));
    }

    #[test]
    fn variable_sets() {
        let f = forall(&["x"], or(vec![v("x"), nv("y")]));
        let names: Vec<_> = f.variable_set().into_iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["x", "y"]);
        let free: Vec<_> = f.free_variable_set().into_iter().map(|n| n.to_string()).collect();
        assert_eq!(free, ["y"]);
    }

    #[test]
    fn display() {
        let f = forall(&["x"], exists(&["y"], and(vec![or(vec![v("x"), nv("y")]), v("y")])));
        assert_eq!(f.to_string(), "forall x. exists y. ((x | !y) & y)");
    }
}
