//! Lazy traversals over a formula.
//!
//! All streams visit in document order (pre-order, children left to right)
//! and borrow the root immutably, so any number of them may run at once.
//! The `par_*` counterparts materialize the sequential traversal and hand
//! it to rayon; consumed unordered, the results are the same multiset.

use super::{Formula, VarName};
use crate::QuantTy;
use rayon::prelude::*;
use std::{collections::BTreeSet, rc::Rc};

impl Formula {
    /// All subformulas including `self`, pre-order.
    pub fn subformulas(&self) -> Subformulas<'_> {
        Subformulas { stack: vec![self] }
    }

    /// Every occurrence of a variable atom, bound and free.
    pub fn variables(&self) -> impl Iterator<Item = &VarName> {
        self.subformulas().filter_map(|f| match f {
            Formula::Var(name) => Some(name),
            _ => None,
        })
    }

    /// Every variable occurrence outside the scope of a binding quantifier.
    pub fn free_variables(&self) -> FreeVariables<'_> {
        FreeVariables { stack: vec![(self, Rc::new(Scope::Root))] }
    }

    /// The quantifier chain at the root, outermost first. Stops at the
    /// first non-quantifier node.
    pub fn prefix(&self) -> Prefix<'_> {
        Prefix { node: self }
    }

    pub fn par_subformulas(&self) -> impl IndexedParallelIterator<Item = &Formula> {
        self.subformulas().collect::<Vec<_>>().into_par_iter()
    }

    pub fn par_variables(&self) -> impl IndexedParallelIterator<Item = &VarName> {
        self.variables().collect::<Vec<_>>().into_par_iter()
    }

    pub fn par_free_variables(&self) -> impl IndexedParallelIterator<Item = &VarName> {
        self.free_variables().collect::<Vec<_>>().into_par_iter()
    }
}

#[derive(Debug, Clone)]
pub struct Subformulas<'a> {
    stack: Vec<&'a Formula>,
}

impl<'a> Iterator for Subformulas<'a> {
    type Item = &'a Formula;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        push_children(&mut self.stack, node, |child| child);
        Some(node)
    }
}

/// Pushes `node`'s children in reverse, so popping yields document order.
fn push_children<'a, T>(
    stack: &mut Vec<T>,
    node: &'a Formula,
    mut wrap: impl FnMut(&'a Formula) -> T,
) {
    match node {
        Formula::True | Formula::False | Formula::Var(_) => {}
        Formula::Not(child)
        | Formula::Forall(_, child)
        | Formula::Exists(_, child) => stack.push(wrap(child)),
        Formula::And(children) | Formula::Or(children) => {
            stack.extend(children.iter().rev().map(|c| wrap(c.as_ref())));
        }
    }
}

/// Chain of enclosing quantifier bindings, innermost first.
#[derive(Debug)]
enum Scope<'a> {
    Root,
    Bind(&'a BTreeSet<VarName>, Rc<Scope<'a>>),
}

impl Scope<'_> {
    fn binds(&self, name: &VarName) -> bool {
        let mut scope = self;
        loop {
            match scope {
                Scope::Root => return false,
                Scope::Bind(vars, parent) => {
                    if vars.contains(name) {
                        return true;
                    }
                    scope = parent;
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct FreeVariables<'a> {
    stack: Vec<(&'a Formula, Rc<Scope<'a>>)>,
}

impl<'a> Iterator for FreeVariables<'a> {
    type Item = &'a VarName;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((node, scope)) = self.stack.pop() {
            match node {
                Formula::Var(name) => {
                    if !scope.binds(name) {
                        return Some(name);
                    }
                }
                Formula::Forall(vars, body) | Formula::Exists(vars, body) => {
                    self.stack.push((body, Rc::new(Scope::Bind(vars, scope))));
                }
                _ => push_children(&mut self.stack, node, |child| (child, Rc::clone(&scope))),
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct Prefix<'a> {
    node: &'a Formula,
}

impl<'a> Iterator for Prefix<'a> {
    type Item = (QuantTy, &'a BTreeSet<VarName>);

    fn next(&mut self) -> Option<Self::Item> {
        let (quant, vars, body) = self.node.quant()?;
        self.node = body;
        Some((quant, vars))
    }
}

impl<'a> Prefix<'a> {
    /// The first non-quantifier descendant, i.e. the node the prefix ends
    /// at. Exhausts the iterator.
    pub fn into_matrix(mut self) -> &'a Formula {
        while self.next().is_some() {}
        self.node
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formula::testutil::*;

    fn sample() -> Formula {
        // forall x. exists y. ((x | !y) & (y | z))
        forall(
            &["x"],
            exists(&["y"], and(vec![or(vec![v("x"), nv("y")]), or(vec![v("y"), v("z")])])),
        )
    }

    #[test]
    fn subformulas_preorder() {
        let f = or(vec![and(vec![v("a"), v("b")]), nv("c")]);
        let rendered: Vec<_> = f.subformulas().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            ["((a & b) | !c)", "(a & b)", "a", "b", "!c", "c"]
        );
    }

    #[test]
    fn variables_in_document_order() {
        let occurrences: Vec<_> = sample().variables().map(ToString::to_string).collect();
        assert_eq!(occurrences, ["x", "y", "y", "z"]);
    }

    #[test]
    fn free_variables_skip_bound_occurrences() {
        let free: Vec<_> = sample().free_variables().map(ToString::to_string).collect();
        assert_eq!(free, ["z"]);
    }

    #[test]
    fn shadowing_is_per_scope() {
        // x free on the left, bound on the right
        let f = and(vec![v("x"), forall(&["x"], v("x"))]);
        let free: Vec<_> = f.free_variables().map(ToString::to_string).collect();
        assert_eq!(free, ["x"]);
    }

    #[test]
    fn prefix_stops_at_matrix() {
        let f = sample();
        let kinds: Vec<_> = f.prefix().map(|(q, _)| q).collect();
        assert_eq!(kinds, [crate::QuantTy::Forall, crate::QuantTy::Exists]);
        assert!(f.prefix().into_matrix().is_cnf_matrix());
    }

    #[test]
    fn prefix_of_quantifier_free_formula_is_empty() {
        assert_eq!(v("x").prefix().count(), 0);
    }

    #[test]
    fn parallel_matches_sequential_multiset() {
        let f = sample();
        let mut sequential: Vec<_> = f.variables().map(ToString::to_string).collect();
        let mut parallel: Vec<_> =
            f.par_variables().map(ToString::to_string).collect::<Vec<_>>();
        sequential.sort();
        parallel.sort();
        assert_eq!(sequential, parallel);
    }
}
