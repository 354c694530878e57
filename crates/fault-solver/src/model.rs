//! Parsing `get-model` output into scenarios.
//!
//! The solver's model response is an s-expression of `define-fun` entries.
//! Anything the solver printed before the first parenthesized line (`sat`,
//! banners) is discarded. Each defined identifier splits into its base and
//! state index, and the values bucket into float, int, or bool traces by
//! their declared sort.

use indexmap::IndexMap;

use fault_smt::variables::split_state;

use crate::scenario::{BoolTrace, FloatTrace, IntTrace, Scenario};
use crate::{SolverError, SolverResult};

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    fn atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(a) => Some(a),
            Sexp::List(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Sexp::Atom(a) => a.clone(),
            Sexp::List(items) => {
                let inner: Vec<String> = items.iter().map(Sexp::render).collect();
                format!("({})", inner.join(" "))
            }
        }
    }
}

/// Drop whatever the solver printed before the first line that opens an
/// s-expression.
pub(crate) fn clean_extra_outputs(results: &str) -> SolverResult<&str> {
    let mut rest = results;
    loop {
        if rest.starts_with('(') {
            return Ok(rest);
        }
        match rest.find('\n') {
            Some(idx) => rest = &rest[idx + 1..],
            None => {
                return Err(SolverError::ModelParse(format!(
                    "no model in solver output: {results:?}"
                )))
            }
        }
    }
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    for ch in input.chars() {
        match ch {
            '(' | ')' => {
                if !buf.is_empty() {
                    tokens.push(std::mem::take(&mut buf));
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !buf.is_empty() {
                    tokens.push(std::mem::take(&mut buf));
                }
            }
            c => buf.push(c),
        }
    }
    if !buf.is_empty() {
        tokens.push(buf);
    }
    tokens
}

fn parse_sexp(tokens: &[String], pos: &mut usize) -> SolverResult<Sexp> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| SolverError::ModelParse("unexpected end of model".to_string()))?;
    *pos += 1;
    match tok.as_str() {
        "(" => {
            let mut items = Vec::new();
            loop {
                match tokens.get(*pos).map(String::as_str) {
                    Some(")") => {
                        *pos += 1;
                        return Ok(Sexp::List(items));
                    }
                    Some(_) => items.push(parse_sexp(tokens, pos)?),
                    None => {
                        return Err(SolverError::ModelParse(
                            "unbalanced parentheses in model".to_string(),
                        ))
                    }
                }
            }
        }
        ")" => Err(SolverError::ModelParse(
            "unexpected `)` in model".to_string(),
        )),
        atom => Ok(Sexp::Atom(atom.to_string())),
    }
}

fn eval_numeric(value: &Sexp) -> Option<f64> {
    match value {
        Sexp::Atom(a) => a.parse().ok(),
        Sexp::List(items) => {
            let op = items.first()?.atom()?;
            let args: Vec<f64> = items[1..]
                .iter()
                .map(eval_numeric)
                .collect::<Option<Vec<_>>>()?;
            match (op, args.as_slice()) {
                ("-", [x]) => Some(-x),
                ("-", [x, y]) => Some(x - y),
                ("+", rest) if !rest.is_empty() => Some(rest.iter().sum()),
                ("*", rest) if !rest.is_empty() => Some(rest.iter().product()),
                ("/", [x, y]) if *y != 0.0 => Some(x / y),
                _ => None,
            }
        }
    }
}

/// Parse a model response into scenarios plus the raw identifier → value
/// text mapping.
pub fn parse_model(
    results: &str,
) -> SolverResult<(IndexMap<String, Scenario>, IndexMap<String, String>)> {
    let cleaned = clean_extra_outputs(results)?;
    let tokens = tokenize(cleaned);
    let mut pos = 0;
    let top = parse_sexp(&tokens, &mut pos)?;
    let entries = match top {
        Sexp::List(items) => items,
        Sexp::Atom(a) => {
            return Err(SolverError::ModelParse(format!(
                "expected a model list, got `{a}`"
            )))
        }
    };

    let mut scenarios: IndexMap<String, Scenario> = IndexMap::new();
    let mut values: IndexMap<String, String> = IndexMap::new();

    for entry in entries {
        let Sexp::List(parts) = entry else {
            // `model` header atom and other noise
            continue;
        };
        if parts.first().and_then(Sexp::atom) != Some("define-fun") {
            continue;
        }
        let name = parts
            .get(1)
            .and_then(Sexp::atom)
            .ok_or_else(|| SolverError::ModelParse("define-fun without a name".to_string()))?
            .to_string();
        let sort = parts.get(3).and_then(Sexp::atom).unwrap_or("");
        let value = parts
            .get(4)
            .ok_or_else(|| SolverError::ModelParse(format!("no value for `{name}`")))?;

        values.insert(name.clone(), value.render());

        let (base, state) = match split_state(&name) {
            Some((b, n)) => (b.to_string(), n),
            None => (name.clone(), 0),
        };

        match sort {
            "Real" => {
                let v = eval_numeric(value).ok_or_else(|| {
                    SolverError::ModelParse(format!("bad Real value for `{name}`"))
                })?;
                let trace = scenarios
                    .entry(base.clone())
                    .or_insert_with(|| Scenario::Float(FloatTrace::default()));
                match trace {
                    Scenario::Float(t) => t.add_result(state, v),
                    _ => {
                        return Err(SolverError::ModelParse(format!(
                            "sort mismatch for base `{base}`"
                        )))
                    }
                }
            }
            "Int" => {
                let v = eval_numeric(value).ok_or_else(|| {
                    SolverError::ModelParse(format!("bad Int value for `{name}`"))
                })?;
                let trace = scenarios
                    .entry(base.clone())
                    .or_insert_with(|| Scenario::Int(IntTrace::default()));
                match trace {
                    Scenario::Int(t) => t.add_result(state, v as i64),
                    _ => {
                        return Err(SolverError::ModelParse(format!(
                            "sort mismatch for base `{base}`"
                        )))
                    }
                }
            }
            "Bool" => {
                let v = match value.atom() {
                    Some("true") => true,
                    Some("false") => false,
                    _ => {
                        return Err(SolverError::ModelParse(format!(
                            "bad Bool value for `{name}`"
                        )))
                    }
                };
                let trace = scenarios
                    .entry(base.clone())
                    .or_insert_with(|| Scenario::Bool(BoolTrace::default()));
                match trace {
                    Scenario::Bool(t) => t.add_result(state, v),
                    _ => {
                        return Err(SolverError::ModelParse(format!(
                            "sort mismatch for base `{base}`"
                        )))
                    }
                }
            }
            other => {
                return Err(SolverError::ModelParse(format!(
                    "unsupported sort `{other}` for `{name}`"
                )))
            }
        }
    }

    Ok((scenarios, values))
}
