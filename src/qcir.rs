//! Reader for the prenex fragment of the QCIR-G14 circuit format.
//! The format specification is provided at
//! <https://www.qbflib.org/qcir.pdf>.
//!
//! The reader expands gate references by substitution while it parses, so
//! the produced [`Formula`] is a plain tree without sharing guarantees.
//! Subtrees of multiply-referenced gates are shared structurally, which a
//! consumer cannot observe.

use crate::{
    formula::{Formula, VarName},
    QuantTy,
};
use miette::{Diagnostic, SourceSpan};
use std::{
    collections::{BTreeSet, HashMap},
    io::Read,
};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("Cannot parse QCIR")]
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

    #[error("Cannot parse statement in line {line}")]
    InvalidStatement {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Unknown gate type {token:?} in line {line}, expected `and` or `or`")]
    UnknownGateType {
        token: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Invalid variable or gate name {token:?} in line {line}")]
    InvalidName {
        token: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("{name} in line {line} is not a declared variable or defined gate")]
    UndefinedName {
        name: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("{name} is declared twice, second time in line {line}")]
    DuplicateName {
        name: String,
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Quantifier in line {line} binds no variables")]
    EmptyQuantifier {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Quantifier block in line {line} appears after the output statement")]
    QuantifierAfterOutput {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Gate definition in line {line} appears before the output statement")]
    GateBeforeOutput {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Duplicate output statement in line {line}")]
    DuplicateOutput {
        line: usize,

        #[label]
        err_span: SourceSpan,
    },

    #[error("Missing output statement")]
    MissingOutput,
}

#[derive(Debug)]
pub struct QcirParser<R: Read> {
    reader: R,
}

impl<R: Read> QcirParser<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parses a QCIR file into a formula, prefix applied outermost first.
    ///
    /// # Errors
    ///
    /// This function will return an error if the read content is not valid
    /// QCIR. The function propagates underlying IO failures.
    pub fn parse(mut self) -> Result<Formula, ParseError> {
        let mut source = Vec::new();
        self.reader.read_to_end(&mut source)?;
        parse_source(&source)
    }
}

#[derive(Debug, Default)]
struct Circuit {
    prefix: Vec<(QuantTy, BTreeSet<VarName>)>,
    variables: BTreeSet<VarName>,
    gates: HashMap<VarName, Formula>,
    output: Option<(usize, SourceSpan, String)>,
}

fn parse_source(source: &[u8]) -> Result<Formula, ParseError> {
    let mut circuit = Circuit::default();

    let mut offset = 0;
    for (number, raw) in source.split(|&b| b == b'\n').enumerate() {
        let line = number + 1;
        let text =
            std::str::from_utf8(raw).map_err(|_| ParseError::InvalidEncoding { line })?;
        let start = offset;
        offset += raw.len() + 1;

        let trimmed = text.trim();
        // `#QCIR-G14` header and `#` comments
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let span: SourceSpan = (start + leading_whitespace(text), trimmed.len()).into();

        match trimmed.split_once('=') {
            Some((name, gate)) => {
                parse_gate(&mut circuit, line, span, name.trim(), gate.trim())?;
            }
            None => parse_statement(&mut circuit, line, span, trimmed)?,
        }
    }

    let Some((line, span, token)) = circuit.output.take() else {
        return Err(ParseError::MissingOutput);
    };
    let mut formula = resolve(&circuit, line, span, &token)?;
    for (quant, vars) in circuit.prefix.into_iter().rev() {
        formula = Formula::quantified(quant, vars, formula)
            .expect("quantifier block holds at least one variable");
    }
    Ok(formula)
}

fn leading_whitespace(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// `free(...)`, `forall(...)`, `exists(...)` or `output(...)`.
fn parse_statement(
    circuit: &mut Circuit,
    line: usize,
    span: SourceSpan,
    text: &str,
) -> Result<(), ParseError> {
    let (keyword, args) = split_application(text)
        .ok_or(ParseError::InvalidStatement { line, err_span: span })?;

    if keyword.eq_ignore_ascii_case("output") {
        if circuit.output.is_some() {
            return Err(ParseError::DuplicateOutput { line, err_span: span });
        }
        let [token] = args.as_slice() else {
            return Err(ParseError::InvalidStatement { line, err_span: span });
        };
        circuit.output = Some((line, span, (*token).to_string()));
        return Ok(());
    }

    let quant = if keyword.eq_ignore_ascii_case("forall") {
        Some(QuantTy::Forall)
    } else if keyword.eq_ignore_ascii_case("exists") {
        Some(QuantTy::Exists)
    } else if keyword.eq_ignore_ascii_case("free") {
        None
    } else {
        return Err(ParseError::InvalidStatement { line, err_span: span });
    };

    if circuit.output.is_some() {
        return Err(ParseError::QuantifierAfterOutput { line, err_span: span });
    }
    if args.is_empty() {
        return Err(ParseError::EmptyQuantifier { line, err_span: span });
    }

    let mut vars = BTreeSet::new();
    for token in args {
        let name = valid_name(line, span, token)?;
        if !circuit.variables.insert(name.clone()) {
            return Err(ParseError::DuplicateName {
                name: token.to_string(),
                line,
                err_span: span,
            });
        }
        vars.insert(name);
    }
    if let Some(quant) = quant {
        circuit.prefix.push((quant, vars));
    }
    Ok(())
}

/// `name = and(...)` or `name = or(...)`.
fn parse_gate(
    circuit: &mut Circuit,
    line: usize,
    span: SourceSpan,
    name: &str,
    gate: &str,
) -> Result<(), ParseError> {
    if circuit.output.is_none() {
        return Err(ParseError::GateBeforeOutput { line, err_span: span });
    }
    let name = valid_name(line, span, name)?;
    if circuit.variables.contains(&name) || circuit.gates.contains_key(&name) {
        return Err(ParseError::DuplicateName {
            name: name.to_string(),
            line,
            err_span: span,
        });
    }

    let (keyword, args) =
        split_application(gate).ok_or(ParseError::InvalidStatement { line, err_span: span })?;
    let operands = args
        .into_iter()
        .map(|token| resolve(circuit, line, span, token))
        .collect::<Result<Vec<_>, _>>()?;

    // nullary and unary gates collapse to the identity / single operand
    let formula = if keyword.eq_ignore_ascii_case("and") {
        Formula::conj(operands)
    } else if keyword.eq_ignore_ascii_case("or") {
        Formula::disj(operands)
    } else {
        return Err(ParseError::UnknownGateType {
            token: keyword.to_string(),
            line,
            err_span: span,
        });
    };
    circuit.gates.insert(name, formula);
    Ok(())
}

/// Splits `kw(a, b, c)` into the keyword and its comma-separated
/// arguments. Returns `None` if the shape does not match.
fn split_application(text: &str) -> Option<(&str, Vec<&str>)> {
    let (keyword, rest) = text.split_once('(')?;
    let args = rest.strip_suffix(')')?;
    let keyword = keyword.trim();
    let args = args.trim();
    if args.is_empty() {
        Some((keyword, Vec::new()))
    } else {
        Some((keyword, args.split(',').map(str::trim).collect()))
    }
}

/// Turns a possibly negated reference to a variable or an already defined
/// gate into a formula. Gates must be defined before use, so expansion
/// cannot cycle.
fn resolve(
    circuit: &Circuit,
    line: usize,
    span: SourceSpan,
    token: &str,
) -> Result<Formula, ParseError> {
    let (bare, positive) = match token.strip_prefix('-') {
        Some(rest) => (rest.trim(), false),
        None => (token, true),
    };
    let name = valid_name(line, span, bare)?;
    let formula = if let Some(gate) = circuit.gates.get(&name) {
        gate.clone()
    } else if circuit.variables.contains(&name) {
        Formula::Var(name)
    } else {
        return Err(ParseError::UndefinedName { name: bare.to_string(), line, err_span: span });
    };
    Ok(if positive { formula } else { Formula::not(formula) })
}

fn valid_name(line: usize, span: SourceSpan, token: &str) -> Result<VarName, ParseError> {
    VarName::new(token).map_err(|_| ParseError::InvalidName {
        token: token.to_string(),
        line,
        err_span: span,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::formula::testutil::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn parse(input: &str) -> Result<Formula, ParseError> {
        QcirParser::new(Cursor::new(input)).parse()
    }

    macro_rules! expect_error {
        ( $input:expr, $pat:pat ) => {
            match parse($input) {
                Ok(parsed) => panic!("Expected error but got {parsed}"),
                Err(err) => match err {
                    $pat => (),
                    _ => panic!("Unexpected error {err:?}"),
                },
            }
        };
    }

    #[test]
    fn simple_circuit() -> Result<(), ParseError> {
        let input = "#QCIR-G14\n\
                     forall(x)\n\
                     exists(y)\n\
                     output(g2)\n\
                     g1 = or(x, -y)\n\
                     g2 = and(g1, y)\n";
        let expected =
            forall(&["x"], exists(&["y"], and(vec![or(vec![v("x"), nv("y")]), v("y")])));
        assert_eq!(parse(input)?, expected);
        Ok(())
    }

    #[test]
    fn gates_expand_by_substitution() -> Result<(), ParseError> {
        let input = "#QCIR-G14\n\
                     free(x, y)\n\
                     output(g2)\n\
                     g1 = or(x, y)\n\
                     g2 = and(g1, -g1)\n";
        let g1 = or(vec![v("x"), v("y")]);
        assert_eq!(parse(input)?, and(vec![g1.clone(), Formula::not(g1)]));
        Ok(())
    }

    #[test]
    fn negated_output() -> Result<(), ParseError> {
        let input = "free(x)\noutput(-x)\n";
        assert_eq!(parse(input)?, nv("x"));
        Ok(())
    }

    #[test]
    fn nullary_and_unary_gates_collapse() -> Result<(), ParseError> {
        assert_eq!(parse("output(g)\ng = and()\n")?, Formula::True);
        assert_eq!(parse("output(g)\ng = or()\n")?, Formula::False);
        assert_eq!(parse("free(x)\noutput(g)\ng = and(x)\n")?, v("x"));
        Ok(())
    }

    #[test]
    fn keywords_are_case_insensitive() -> Result<(), ParseError> {
        let input = "FORALL(x)\nOUTPUT(g)\ng = AND(x, x)\n";
        assert_eq!(parse(input)?, forall(&["x"], and(vec![v("x"), v("x")])));
        Ok(())
    }

    #[test]
    fn whitespace_inside_statements() -> Result<(), ParseError> {
        let input = "  exists( x , y )\n  output( g )\n  g = or( -x , y )\n";
        assert_eq!(parse(input)?, exists(&["x", "y"], or(vec![nv("x"), v("y")])));
        Ok(())
    }

    #[test]
    fn missing_and_duplicate_output() {
        expect_error!("#QCIR-G14\nfree(x)\n", ParseError::MissingOutput);
        expect_error!(
            "free(x)\noutput(x)\noutput(x)\n",
            ParseError::DuplicateOutput { line: 3, .. }
        );
    }

    #[test]
    fn statement_order_is_enforced() {
        expect_error!(
            "output(g)\ng = and()\nforall(x)\n",
            ParseError::QuantifierAfterOutput { line: 3, .. }
        );
        expect_error!("g = and()\noutput(g)\n", ParseError::GateBeforeOutput { line: 1, .. });
    }

    #[test]
    fn references_must_be_declared() {
        expect_error!("output(x)\n", ParseError::UndefinedName { line: 1, .. });
        expect_error!(
            "free(x)\noutput(g)\ng = and(x, y)\n",
            ParseError::UndefinedName { line: 3, .. }
        );
        // gates are defined before use, forward references are not
        expect_error!(
            "free(x)\noutput(g1)\ng1 = and(g2, x)\ng2 = or(x, x)\n",
            ParseError::UndefinedName { line: 3, .. }
        );
    }

    #[test]
    fn double_declaration_is_rejected() {
        expect_error!("free(x)\nexists(x)\noutput(x)\n", ParseError::DuplicateName { .. });
        expect_error!(
            "free(x)\noutput(g)\ng = and()\ng = or()\n",
            ParseError::DuplicateName { line: 4, .. }
        );
        expect_error!("free(x)\noutput(x)\nx = and()\n", ParseError::DuplicateName { .. });
    }

    #[test]
    fn malformed_statements() {
        expect_error!("forall x\noutput(x)\n", ParseError::InvalidStatement { line: 1, .. });
        expect_error!("free(x)\noutput(g)\ng = xor(x, x)\n", ParseError::UnknownGateType { .. });
        expect_error!("forall()\noutput(x)\n", ParseError::EmptyQuantifier { line: 1, .. });
    }

    proptest! {
        #[test]
        fn doesnt_crash(s in ".*") {
            let _formula = parse(&s).ok();
        }
    }
}
