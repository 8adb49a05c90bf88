//! Prenex normal form with orderable hoisting strategies.
//!
//! Quantifiers are hoisted past their parent `And`/`Or` by the standard
//! quantifier-movement rules, all of which are sound on alpha-unique NNF
//! input. What a strategy controls is prefix placement: whether a hoisted
//! block merges into the first compatible same-kind prefix level or starts
//! a new innermost level, traded off to keep quantifier alternations low.

use crate::{
    formula::{Formula, VarName},
    rewrite::{rewrite_bottom_up, CancelToken, Cancelled},
    QuantTy,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{debug, trace};

/// Prefix placement strategy for hoisted quantifiers.
///
/// Each strategy resolves to two predicates over `(n_q_path, n_critical)`,
/// the counts of same-kind and opposite-kind quantifiers passed along the
/// path from a quantifier up to the root of the input. A `true` verdict
/// raises the quantifier into the first compatible same-kind prefix level;
/// `false` keeps it down on a new innermost level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Strategy {
    /// Raise existentials aggressively, universals only when cheap.
    ForAllDownExistsUp,
    /// Raise universals aggressively, existentials only when cheap.
    ExistsDownForAllUp,
    /// Raise both kinds whenever possible.
    ForAllUpExistsUp,
    /// Raise either kind only when cheap.
    ForAllDownExistsDown,
}

impl Strategy {
    fn select(self, quant: QuantTy, n_q_path: usize, n_critical: usize) -> bool {
        let cheap = n_critical.saturating_sub(n_q_path) <= 1;
        match (self, quant) {
            (Strategy::ForAllUpExistsUp, _)
            | (Strategy::ForAllDownExistsUp, QuantTy::Exists)
            | (Strategy::ExistsDownForAllUp, QuantTy::Forall) => true,
            (Strategy::ForAllDownExistsUp, QuantTy::Forall)
            | (Strategy::ExistsDownForAllUp, QuantTy::Exists)
            | (Strategy::ForAllDownExistsDown, _) => cheap,
        }
    }
}

/// Converts an NNF formula into an alpha-equivalent PNF one.
///
/// Free variables are preserved; bound variables are renamed only where a
/// hoist would capture a sibling's free variable or collide with an
/// already-hoisted bound name. `Not` is opaque to hoisting, so quantifiers
/// below a non-literal negation (non-NNF input) stay in place.
#[must_use]
pub fn to_pnf(formula: &Formula, strategy: Strategy) -> Formula {
    to_pnf_with(formula, strategy, &CancelToken::never()).expect("token never fires")
}

/// [`to_pnf`] with cooperative cancellation.
pub fn to_pnf_with(
    formula: &Formula,
    strategy: Strategy,
    cancel: &CancelToken,
) -> Result<Formula, Cancelled> {
    let mut fresh = FreshNames::new(formula);
    let (blocks, matrix) = hoist(formula, strategy, cancel, &mut fresh, 0, 0)?;
    debug!(levels = blocks.len(), "hoisted prefix");
    let mut result = matrix;
    for Block { quant, vars, .. } in blocks.into_iter().rev() {
        let body = Arc::new(result);
        result = match quant {
            QuantTy::Forall => Formula::Forall(vars, body),
            QuantTy::Exists => Formula::Exists(vars, body),
        };
    }
    Ok(result)
}

/// A quantifier block cut loose from the tree, annotated with its path
/// counts in the input formula.
#[derive(Debug)]
struct Block {
    quant: QuantTy,
    vars: BTreeSet<VarName>,
    n_q_path: usize,
    n_critical: usize,
}

/// Deterministic fresh names drawn against the formula's own variable set.
struct FreshNames {
    used: BTreeSet<VarName>,
}

impl FreshNames {
    fn new(formula: &Formula) -> Self {
        Self { used: formula.variable_set() }
    }

    fn fresh(&mut self, base: &VarName) -> VarName {
        let mut counter = 1usize;
        loop {
            let candidate = VarName::new(format!("{base}~{counter}"))
                .expect("derived from a valid name and a digit suffix");
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Separates `formula` into hoisted blocks (outermost first) and a
/// quantifier-free matrix. `n_forall`/`n_exists` count the quantifier
/// ancestors in the input tree.
///
/// Invariant on the return value: block names are pairwise distinct, and
/// every matrix occurrence of a block name is bound by exactly that block.
fn hoist(
    formula: &Formula,
    strategy: Strategy,
    cancel: &CancelToken,
    fresh: &mut FreshNames,
    n_forall: usize,
    n_exists: usize,
) -> Result<(Vec<Block>, Formula), Cancelled> {
    cancel.check()?;
    match formula {
        Formula::True | Formula::False | Formula::Var(_) | Formula::Not(_) => {
            Ok((Vec::new(), formula.clone()))
        }
        Formula::Forall(vars, body) => {
            let (blocks, matrix) =
                hoist(body, strategy, cancel, fresh, n_forall + 1, n_exists)?;
            Ok((
                stack_block(QuantTy::Forall, vars, n_forall, n_exists, blocks, fresh),
                matrix,
            ))
        }
        Formula::Exists(vars, body) => {
            let (blocks, matrix) =
                hoist(body, strategy, cancel, fresh, n_forall, n_exists + 1)?;
            Ok((
                stack_block(QuantTy::Exists, vars, n_exists, n_forall, blocks, fresh),
                matrix,
            ))
        }
        Formula::And(children) | Formula::Or(children) => {
            let parts = children
                .iter()
                .map(|child| hoist(child, strategy, cancel, fresh, n_forall, n_exists))
                .collect::<Result<Vec<_>, _>>()?;
            let (blocks, matrices) = merge_siblings(parts, strategy, cancel, fresh)?;
            let matrix = if matches!(formula, Formula::And(_)) {
                Formula::conj_arcs(matrices)
            } else {
                Formula::disj_arcs(matrices)
            };
            Ok((blocks, matrix))
        }
    }
}

/// Puts a quantifier's own block on top of its body's hoisted blocks.
///
/// A bound name shadowed by an inner block binds nothing in the matrix
/// (in a pure quantifier chain every matrix occurrence lies below the
/// inner block), so the outer binder is renamed without substitution.
fn stack_block(
    quant: QuantTy,
    vars: &BTreeSet<VarName>,
    n_q_path: usize,
    n_critical: usize,
    mut blocks: Vec<Block>,
    fresh: &mut FreshNames,
) -> Vec<Block> {
    let inner: BTreeSet<&VarName> = blocks.iter().flat_map(|b| b.vars.iter()).collect();
    let vars = vars
        .iter()
        .map(|name| {
            if inner.contains(name) {
                fresh.fresh(name)
            } else {
                name.clone()
            }
        })
        .collect();
    blocks.insert(0, Block { quant, vars, n_q_path, n_critical });
    blocks
}

/// Merges the hoisted prefixes of sibling subtrees, left to right.
///
/// Blocks of one sibling keep their relative order; the cursor `pos`
/// enforces it. A raised block joins the first same-kind level at or after
/// the cursor, a kept-down block opens a new innermost level. Collisions
/// with names already in the merged prefix or free in the other siblings
/// are renamed fresh before the block joins.
#[allow(clippy::type_complexity)]
fn merge_siblings(
    parts: Vec<(Vec<Block>, Formula)>,
    strategy: Strategy,
    cancel: &CancelToken,
    fresh: &mut FreshNames,
) -> Result<(Vec<Block>, Vec<Arc<Formula>>), Cancelled> {
    let sibling_free: Vec<BTreeSet<VarName>> = parts
        .iter()
        .map(|(blocks, matrix)| {
            let mut free = matrix.free_variable_set();
            for block in blocks {
                for name in &block.vars {
                    free.remove(name);
                }
            }
            free
        })
        .collect();

    let mut merged: Vec<Block> = Vec::new();
    let mut merged_names: BTreeSet<VarName> = BTreeSet::new();
    let mut matrices: Vec<Arc<Formula>> = Vec::with_capacity(parts.len());

    for (idx, (blocks, mut matrix)) in parts.into_iter().enumerate() {
        let mut forbidden = merged_names.clone();
        for (other, free) in sibling_free.iter().enumerate() {
            if other != idx {
                forbidden.extend(free.iter().cloned());
            }
        }

        let mut pos = 0;
        for mut block in blocks {
            for name in block.vars.clone() {
                if forbidden.contains(&name) {
                    let renamed = fresh.fresh(&name);
                    trace!(%name, %renamed, "hoist collision");
                    block.vars.remove(&name);
                    block.vars.insert(renamed.clone());
                    matrix = rename_in_matrix(&matrix, &name, &renamed, cancel)?;
                }
            }

            let raise = strategy.select(block.quant, block.n_q_path, block.n_critical);
            let slot = if raise {
                merged[pos..].iter().position(|level| level.quant == block.quant)
            } else {
                None
            };
            merged_names.extend(block.vars.iter().cloned());
            forbidden.extend(block.vars.iter().cloned());
            match slot {
                Some(offset) => {
                    let at = pos + offset;
                    merged[at].vars.extend(block.vars);
                    pos = at + 1;
                }
                None => {
                    merged.push(block);
                    pos = merged.len();
                }
            }
        }
        matrices.push(Arc::new(matrix));
    }

    Ok((merged, matrices))
}

/// Renames every occurrence of `old` in a quantifier-free matrix.
fn rename_in_matrix(
    matrix: &Formula,
    old: &VarName,
    new: &VarName,
    cancel: &CancelToken,
) -> Result<Formula, Cancelled> {
    rewrite_bottom_up(matrix, cancel, &mut |node| match node {
        Formula::Var(ref name) if name == old => Formula::Var(new.clone()),
        other => other,
    })
}
