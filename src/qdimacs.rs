//! Reader and writer for the QDIMACS file format.
//! The format specification is provided at <https://www.qbflib.org/qdimacs.html>.
//!
//! The reader accepts any prenex-CNF input and produces a [`Formula`];
//! the writer emits any formula whose body below the quantifier prefix is
//! a CNF matrix, and refuses everything else with [`WriteError::NotCnf`].

use crate::{
    formula::{Formula, VarName},
    QuantTy,
};
use miette::{Diagnostic, SourceSpan};
use std::{collections::BTreeSet, io::Read, io::Write};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("Cannot parse QDIMACS")]
#[diagnostic()]
pub struct ExtendedParseError {
    #[source_code]
    pub source_code: String,

    #[related]
    pub related: Vec<ParseError>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("The underlying IO has failed")]
    Io(#[from] std::io::Error),

    #[error("Input is not valid text in line {line}")]
    InvalidEncoding { line: usize },

    #[error("Missing QDIMACS problem line, i.e., `p cnf ...`")]
    MissingProblemLine,

    #[error("Invalid problem line in line {line}, expected `p cnf <vars> <clauses>`")]
    InvalidProblemLine {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Duplicate problem line in line {line}")]
    DuplicateProblemLine {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Statement in line {line} appears before the problem line")]
    BeforeProblemLine {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Quantifier line in line {line} appears after the first clause")]
    PrefixAfterClauses {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Quantifier line in line {line} binds no variables")]
    EmptyLevel {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Clause in line {line} has no literals")]
    EmptyClause {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Statement in line {line} is not terminated by `0`")]
    MissingTerminator {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Unexpected token {token:?} after the terminating `0` in line {line}")]
    TrailingTokens {
        token: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Invalid variable {token:?} in line {line}")]
    InvalidVariable {
        token: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Variable {name} is bound twice in line {line}")]
    DuplicateVariable {
        name: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },
}

/// Writing a formula as QDIMACS failed.
#[derive(Debug, Error, Diagnostic)]
pub enum WriteError {
    #[error("The formula below the quantifier prefix is not a CNF matrix")]
    NotCnf,

    #[error("The underlying IO has failed")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct QdimacsParser<R: Read> {
    reader: R,
}

impl<R: Read> QdimacsParser<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parses a QDIMACS file into a formula.
    ///
    /// The outermost prefix level comes from the first `a`/`e` line. A
    /// single-clause matrix is returned as that clause directly, a
    /// single-literal clause as that literal.
    ///
    /// # Errors
    ///
    /// This function will return an error if the read content is not valid
    /// QDIMACS. The function propagates underlying IO failures.
    pub fn parse(mut self) -> Result<Formula, ParseError> {
        let mut source = Vec::new();
        self.reader.read_to_end(&mut source)?;
        parse_source(&source)
    }
}

/// One whitespace-separated statement line, split with byte offsets kept
/// for diagnostics.
struct Line<'a> {
    number: usize,
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn tokens(&self) -> impl Iterator<Item = (SourceSpan, &str)> + '_ {
        let base = self.start;
        let origin = self.text.as_ptr() as usize;
        self.text.split_ascii_whitespace().map(move |token| {
            let offset = base + (token.as_ptr() as usize - origin);
            ((offset, token.len()).into(), token)
        })
    }

    fn span(&self) -> SourceSpan {
        (self.start, self.text.len()).into()
    }
}

fn parse_source(source: &[u8]) -> Result<Formula, ParseError> {
    let mut prefix: Vec<(QuantTy, BTreeSet<VarName>)> = Vec::new();
    let mut clauses: Vec<Formula> = Vec::new();
    let mut problem_seen = false;

    let mut offset = 0;
    for (number, raw) in source.split(|&b| b == b'\n').enumerate() {
        let line = Line {
            number: number + 1,
            start: offset,
            text: std::str::from_utf8(raw)
                .map_err(|_| ParseError::InvalidEncoding { line: number + 1 })?,
        };
        offset += raw.len() + 1;

        if line.text.trim().is_empty() {
            continue;
        }
        // a comment runs to the end of its line
        if line.text.starts_with('c') {
            continue;
        }

        let mut tokens = line.tokens().peekable();
        let &(first_span, first) = tokens.peek().expect("line is non-empty");
        match first {
            "p" => {
                if problem_seen {
                    return Err(ParseError::DuplicateProblemLine {
                        line: line.number,
                        err_span: first_span,
                    });
                }
                parse_problem_line(&line)?;
                problem_seen = true;
            }
            "a" | "e" => {
                if !problem_seen {
                    return Err(ParseError::BeforeProblemLine {
                        line: line.number,
                        err_span: first_span,
                    });
                }
                if !clauses.is_empty() {
                    return Err(ParseError::PrefixAfterClauses {
                        line: line.number,
                        err_span: first_span,
                    });
                }
                let quant = if first == "a" { QuantTy::Forall } else { QuantTy::Exists };
                tokens.next();
                prefix.push((quant, parse_level(&line, tokens)?));
            }
            _ => {
                if !problem_seen {
                    return Err(ParseError::BeforeProblemLine {
                        line: line.number,
                        err_span: first_span,
                    });
                }
                clauses.push(parse_clause(&line, tokens)?);
            }
        }
    }

    if !problem_seen {
        return Err(ParseError::MissingProblemLine);
    }

    let mut formula = Formula::conj(clauses);
    for (quant, vars) in prefix.into_iter().rev() {
        formula = Formula::quantified(quant, vars, formula)
            .expect("prefix level holds at least one variable");
    }
    Ok(formula)
}

/// `p cnf [NUM_VARIABLES] [NUM_CLAUSES]`. The numeric fields are ignored,
/// the writer recomputes them.
fn parse_problem_line(line: &Line<'_>) -> Result<(), ParseError> {
    let tokens: Vec<_> = line.tokens().map(|(_, token)| token).collect();
    match tokens.as_slice() {
        ["p", "cnf", _, _] => Ok(()),
        _ => Err(ParseError::InvalidProblemLine { line: line.number, err_span: line.span() }),
    }
}

/// The variable names of one `a`/`e` line, up to the terminating `0`.
fn parse_level<'a>(
    line: &Line<'_>,
    tokens: impl Iterator<Item = (SourceSpan, &'a str)>,
) -> Result<BTreeSet<VarName>, ParseError> {
    let mut vars = BTreeSet::new();
    for (span, token) in terminated(line, tokens)? {
        let name = variable(line, span, token)?;
        if !vars.insert(name) {
            return Err(ParseError::DuplicateVariable {
                name: token.to_string(),
                line: line.number,
                err_span: span,
            });
        }
    }
    if vars.is_empty() {
        return Err(ParseError::EmptyLevel { line: line.number, err_span: line.span() });
    }
    Ok(vars)
}

/// One clause line, literals up to the terminating `0`.
fn parse_clause<'a>(
    line: &Line<'_>,
    tokens: impl Iterator<Item = (SourceSpan, &'a str)>,
) -> Result<Formula, ParseError> {
    let mut literals = Vec::new();
    for (span, token) in terminated(line, tokens)? {
        let (name, positive) = match token.strip_prefix('-') {
            Some(rest) => (variable(line, span, rest)?, false),
            None => (variable(line, span, token)?, true),
        };
        literals.push(Formula::literal(name, positive));
    }
    if literals.is_empty() {
        return Err(ParseError::EmptyClause { line: line.number, err_span: line.span() });
    }
    Ok(Formula::disj(literals))
}

/// Checks the `0` terminator discipline and yields the tokens before it.
fn terminated<'a>(
    line: &Line<'_>,
    tokens: impl Iterator<Item = (SourceSpan, &'a str)>,
) -> Result<Vec<(SourceSpan, &'a str)>, ParseError> {
    let mut body = Vec::new();
    let mut seen_terminator = false;
    for (span, token) in tokens {
        if seen_terminator {
            return Err(ParseError::TrailingTokens {
                token: token.to_string(),
                line: line.number,
                err_span: span,
            });
        }
        if token == "0" {
            seen_terminator = true;
        } else {
            body.push((span, token));
        }
    }
    if !seen_terminator {
        return Err(ParseError::MissingTerminator { line: line.number, err_span: line.span() });
    }
    Ok(body)
}

fn variable(line: &Line<'_>, span: SourceSpan, token: &str) -> Result<VarName, ParseError> {
    if token == "0" {
        // `-0`, the bare `0` is reserved for the terminator
        return Err(ParseError::InvalidVariable {
            token: token.to_string(),
            line: line.number,
            err_span: span,
        });
    }
    VarName::new(token).map_err(|_| ParseError::InvalidVariable {
        token: token.to_string(),
        line: line.number,
        err_span: span,
    })
}

/// Writes `formula` in QDIMACS.
///
/// The body below the quantifier prefix must be a CNF matrix. The problem
/// line is recomputed from the actual emission: the body is buffered
/// first, then `p cnf V C` is written with the distinct-variable and
/// clause counts. Variable names are written exactly as they appear in
/// the formula.
///
/// # Errors
///
/// Fails with [`WriteError::NotCnf`] if the body is not in CNF and
/// propagates underlying IO failures.
pub fn write(formula: &Formula, sink: &mut impl Write) -> Result<(), WriteError> {
    let matrix = formula.prefix().into_matrix();
    if !matrix.is_cnf_matrix() {
        return Err(WriteError::NotCnf);
    }

    let mut body = String::new();
    for (quant, vars) in formula.prefix() {
        body.push_str(&quant.to_string());
        for var in vars {
            body.push(' ');
            body.push_str(var.as_str());
        }
        body.push_str(" 0\n");
    }

    let clauses: Vec<&Formula> = match matrix {
        // the empty conjunction, a zero-clause matrix
        Formula::True => Vec::new(),
        Formula::And(children) => children.iter().map(AsRef::as_ref).collect(),
        clause => vec![clause],
    };
    for clause in &clauses {
        let literals: Vec<&Formula> = match clause {
            Formula::Or(children) => children.iter().map(AsRef::as_ref).collect(),
            literal => vec![literal],
        };
        for literal in literals {
            match literal {
                Formula::Var(name) => body.push_str(name.as_str()),
                Formula::Not(child) => {
                    let Formula::Var(name) = &**child else {
                        return Err(WriteError::NotCnf);
                    };
                    body.push('-');
                    body.push_str(name.as_str());
                }
                _ => return Err(WriteError::NotCnf),
            }
            body.push(' ');
        }
        body.push_str("0\n");
    }

    writeln!(sink, "p cnf {} {}", formula.variable_set().len(), clauses.len())?;
    sink.write_all(body.as_bytes())?;
    Ok(())
}

/// [`write`] into a fresh string.
pub fn to_string(formula: &Formula) -> Result<String, WriteError> {
    let mut buffer = Vec::new();
    write(formula, &mut buffer)?;
    Ok(String::from_utf8(buffer).expect("writer emits ASCII"))
}
