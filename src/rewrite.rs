//! Generic rebuild combinators for formula transformations.
//!
//! Both directions check a caller-supplied [`CancelToken`] between rewrite
//! steps and restore the n-ary associativity invariant: a step that
//! produces an `And` whose children contain an `And` gets the two merged
//! (likewise for `Or`), and a step that leaves fewer than two children
//! collapses to the single child or the identity element.

use crate::formula::Formula;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;

/// A cancellation signal fired while a rewrite was running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("the transformation was cancelled")]
pub struct Cancelled;

/// Cooperative cancellation handle shared between the caller and a
/// long-running transformation. Cloning yields a handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that never fires, for callers without a cancellation path.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Rebuilds the tree leaves first: `step` receives each node with its
/// children already rewritten and returns the replacement node.
pub fn rewrite_bottom_up<F>(
    formula: &Formula,
    cancel: &CancelToken,
    step: &mut F,
) -> Result<Formula, Cancelled>
where
    F: FnMut(Formula) -> Formula,
{
    cancel.check()?;
    let rebuilt = match formula {
        Formula::True | Formula::False | Formula::Var(_) => formula.clone(),
        Formula::Not(child) => Formula::not(rewrite_bottom_up(child, cancel, step)?),
        Formula::And(children) => Formula::conj_arcs(rewrite_children(children, cancel, step)?),
        Formula::Or(children) => Formula::disj_arcs(rewrite_children(children, cancel, step)?),
        Formula::Forall(vars, body) => {
            Formula::Forall(vars.clone(), Arc::new(rewrite_bottom_up(body, cancel, step)?))
        }
        Formula::Exists(vars, body) => {
            Formula::Exists(vars.clone(), Arc::new(rewrite_bottom_up(body, cancel, step)?))
        }
    };
    Ok(reassociate(step(rebuilt)))
}

/// Rebuilds the tree root first: `step` is applied at each node until it
/// no longer changes it, then the rewrite descends into the children of
/// whatever `step` produced. Use this when a decision depends on outer
/// context, e.g. pushing negations below the node they negate.
pub fn rewrite_top_down<F>(
    formula: &Formula,
    cancel: &CancelToken,
    step: &mut F,
) -> Result<Formula, Cancelled>
where
    F: FnMut(Formula) -> Formula,
{
    cancel.check()?;
    let mut node = step(formula.clone());
    loop {
        let next = step(node.clone());
        if next == node {
            break;
        }
        node = next;
    }
    let rebuilt = match node {
        Formula::True | Formula::False | Formula::Var(_) => node,
        Formula::Not(child) => Formula::not(rewrite_top_down(&child, cancel, step)?),
        Formula::And(children) => Formula::conj_arcs(rewrite_arc_children(&children, cancel, step)?),
        Formula::Or(children) => Formula::disj_arcs(rewrite_arc_children(&children, cancel, step)?),
        Formula::Forall(vars, body) => {
            Formula::Forall(vars, Arc::new(rewrite_top_down(&body, cancel, step)?))
        }
        Formula::Exists(vars, body) => {
            Formula::Exists(vars, Arc::new(rewrite_top_down(&body, cancel, step)?))
        }
    };
    Ok(reassociate(rebuilt))
}

fn rewrite_children<F>(
    children: &[Arc<Formula>],
    cancel: &CancelToken,
    step: &mut F,
) -> Result<Vec<Arc<Formula>>, Cancelled>
where
    F: FnMut(Formula) -> Formula,
{
    children
        .iter()
        .map(|child| rewrite_bottom_up(child, cancel, step).map(Arc::new))
        .collect()
}

fn rewrite_arc_children<F>(
    children: &[Arc<Formula>],
    cancel: &CancelToken,
    step: &mut F,
) -> Result<Vec<Arc<Formula>>, Cancelled>
where
    F: FnMut(Formula) -> Formula,
{
    children
        .iter()
        .map(|child| rewrite_top_down(child, cancel, step).map(Arc::new))
        .collect()
}

/// Re-establishes flatness and arity after a step.
fn reassociate(formula: Formula) -> Formula {
    match formula {
        Formula::And(children) => Formula::conj_arcs(children),
        Formula::Or(children) => Formula::disj_arcs(children),
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formula::testutil::*;

    #[test]
    fn bottom_up_replaces_leaves_first() {
        let f = and(vec![v("x"), or(vec![v("x"), v("y")])]);
        let replaced = rewrite_bottom_up(&f, &CancelToken::never(), &mut |node| match node {
            Formula::Var(name) if name.as_str() == "x" => Formula::True,
            other => other,
        })
        .unwrap();
        assert_eq!(replaced, and(vec![Formula::True, or(vec![Formula::True, v("y")])]));
    }

    #[test]
    fn flattening_merges_nested_operators() {
        // turning the inner Or into an And produces And-under-And,
        // which the kernel must merge into one level
        let f = and(vec![or(vec![v("a"), v("b")]), v("c")]);
        let rewritten = rewrite_bottom_up(&f, &CancelToken::never(), &mut |node| match node {
            Formula::Or(children) => Formula::conj_arcs(children),
            other => other,
        })
        .unwrap();
        assert_eq!(rewritten, and(vec![v("a"), v("b"), v("c")]));
    }

    #[test]
    fn collapse_to_single_child() {
        // dropping all but the first child must not leave a unary And
        let f = and(vec![v("a"), v("b")]);
        let rewritten = rewrite_bottom_up(&f, &CancelToken::never(), &mut |node| match node {
            Formula::And(children) => {
                Formula::conj_arcs(children.into_iter().take(1).collect())
            }
            other => other,
        })
        .unwrap();
        assert_eq!(rewritten, v("a"));
    }

    #[test]
    fn top_down_runs_to_local_fixpoint() {
        let quadruple_neg = Formula::not(Formula::not(Formula::not(nv("x"))));
        let rewritten =
            rewrite_top_down(&quadruple_neg, &CancelToken::never(), &mut |node| match node {
                Formula::Not(child) => match &*child {
                    Formula::Not(inner) => (**inner).clone(),
                    _ => Formula::Not(child),
                },
                other => other,
            })
            .unwrap();
        assert_eq!(rewritten, v("x"));
    }

    #[test]
    fn cancellation_aborts_without_result() {
        let token = CancelToken::new();
        token.cancel();
        let f = and(vec![v("x"), v("y")]);
        let result = rewrite_bottom_up(&f, &token, &mut |node| node);
        assert_eq!(result, Err(Cancelled));
    }

    #[test]
    fn token_handles_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
