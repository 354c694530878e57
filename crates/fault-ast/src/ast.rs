/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.end.saturating_sub(span.start)).into()
    }
}

/// A top-level `assert` or `assume` statement.
///
/// `assert` statements describe properties the model checker tries to break;
/// `assume` statements constrain the search space. Temporal modifiers and
/// counting filters qualify how many of a variable's states the constraint
/// ranges over.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionStatement {
    pub constraint: InvariantClause,
    pub assume: bool,
    pub temporal: Option<Temporal>,
    pub filter: Option<TemporalFilter>,
    pub span: Span,
}

/// The comparison (or `then` staging) at the top of an assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantClause {
    pub left: Expr,
    pub operator: String,
    pub right: Expr,
    pub span: Span,
}

/// Temporal modifier on an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Eventually,
    Always,
    EventuallyAlways,
}

/// Bounded counting filter: the constraint holds in no more than / no fewer
/// than `n` of the enumerated states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalFilter {
    pub kind: FilterKind,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    NoMoreThan,
    NoFewerThan,
}

/// An expression inside an assertion constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Infix(InfixExpr),
    Prefix(PrefixExpr),
    Var(AssertVar),
    Index(IndexExpr),
    Int(IntegerLit),
    Float(FloatLit),
    Bool(BoolLit),
    Str(StringLit),
    Nil(NilLit),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Infix(e) => e.span,
            Expr::Prefix(e) => e.span,
            Expr::Var(e) => e.span,
            Expr::Index(e) => e.span,
            Expr::Int(e) => e.span,
            Expr::Float(e) => e.span,
            Expr::Bool(e) => e.span,
            Expr::Str(e) => e.span,
            Expr::Nil(e) => e.span,
        }
    }

    /// Node kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Infix(_) => "infix expression",
            Expr::Prefix(_) => "prefix expression",
            Expr::Var(_) => "variable",
            Expr::Index(_) => "index expression",
            Expr::Int(_) => "integer literal",
            Expr::Float(_) => "float literal",
            Expr::Bool(_) => "boolean literal",
            Expr::Str(_) => "string literal",
            Expr::Nil(_) => "nil",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfixExpr {
    pub left: Box<Expr>,
    pub operator: String,
    pub right: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrefixExpr {
    pub operator: String,
    pub right: Box<Expr>,
    pub span: Span,
}

/// A variable reference, already resolved by the frontend to the concrete
/// instance bases it names (one spec-level name can expand to several
/// instantiated components).
#[derive(Debug, Clone, PartialEq)]
pub struct AssertVar {
    pub instances: Vec<String>,
    pub span: Span,
}

/// A state-indexed variable reference, `v[N]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub left: Box<Expr>,
    pub index: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerLit {
    pub value: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLit {
    pub value: f64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoolLit {
    pub value: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NilLit {
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_converts_to_source_span() {
        let s: miette::SourceSpan = Span::new(4, 10).into();
        assert_eq!(s.offset(), 4);
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn expr_reports_its_span() {
        let e = Expr::Int(IntegerLit {
            value: 3,
            span: Span::new(1, 2),
        });
        assert_eq!(e.span(), Span::new(1, 2));
        assert_eq!(e.kind(), "integer literal");
    }
}
