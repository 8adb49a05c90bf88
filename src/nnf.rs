//! Negation normal form and the quantifier-free skeleton.

use crate::{
    formula::Formula,
    rewrite::{rewrite_top_down, CancelToken, Cancelled},
};
use std::sync::Arc;

/// Pushes every negation down to the variables.
///
/// Applies `!!p -> p`, De Morgan over `And`/`Or`, quantifier duality and
/// constant negation until each `Not` wraps a variable. Idempotent.
pub fn to_nnf(formula: &Formula) -> Formula {
    to_nnf_with(formula, &CancelToken::never()).expect("token never fires")
}

/// [`to_nnf`] with cooperative cancellation.
pub fn to_nnf_with(formula: &Formula, cancel: &CancelToken) -> Result<Formula, Cancelled> {
    rewrite_top_down(formula, cancel, &mut push_negation)
}

fn push_negation(node: Formula) -> Formula {
    let Formula::Not(child) = node else {
        return node;
    };
    match &*child {
        Formula::True => Formula::False,
        Formula::False => Formula::True,
        Formula::Var(_) => Formula::Not(child),
        Formula::Not(inner) => (**inner).clone(),
        Formula::And(children) => Formula::disj_arcs(negate_each(children)),
        Formula::Or(children) => Formula::conj_arcs(negate_each(children)),
        Formula::Forall(vars, body) => {
            Formula::Exists(vars.clone(), Arc::new(Formula::Not(Arc::clone(body))))
        }
        Formula::Exists(vars, body) => {
            Formula::Forall(vars.clone(), Arc::new(Formula::Not(Arc::clone(body))))
        }
    }
}

fn negate_each(children: &[Arc<Formula>]) -> Vec<Arc<Formula>> {
    children.iter().map(|child| Arc::new(Formula::Not(Arc::clone(child)))).collect()
}

/// Strips the quantifier prefix and returns the first non-quantifier
/// descendant. On a PNF formula this is the matrix; elsewhere inner
/// quantifiers stay in place.
#[must_use]
pub fn skeleton(formula: &Formula) -> Formula {
    formula.prefix().into_matrix().clone()
}
