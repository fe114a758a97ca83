use crate::core::Value;

/// Identifier, remembering how it was quoted so it re-serializes the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub value: String,
    pub quote: Option<char>, // '"' or '`'
}

impl Ident {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into(), quote: None }
    }

    pub fn quoted(value: impl Into<String>, quote: char) -> Self {
        Self { value: value.into(), quote: Some(quote) }
    }

    /// Case-insensitive for bare identifiers, exact for quoted ones.
    pub fn matches(&self, name: &str) -> bool {
        if self.quote.is_some() {
            self.value == name
        } else {
            self.value.eq_ignore_ascii_case(name)
        }
    }

    /// Same identifier with another name, keeping the quote style.
    #[must_use]
    pub fn renamed(&self, value: impl Into<String>) -> Self {
        Self { value: value.into(), quote: self.quote }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: Ident,
    pub alias: Option<Ident>,
}

impl TableRef {
    /// Name that qualified column references use for this table.
    pub fn binding(&self) -> &Ident {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// Column reference, optionally qualified: `orders.user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<Ident>,
    pub column: Ident,
}

/// Bound-parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `$n`, 1-based as written
    Numbered(usize),
    /// `?`, 0-based position in the statement
    Positional(usize),
}

impl Placeholder {
    /// 0-based index into the bound parameter list.
    pub const fn index(self) -> usize {
        match self {
            Self::Numbered(n) => n.saturating_sub(1),
            Self::Positional(i) => i,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Placeholder(Placeholder),
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    /// `*` inside `COUNT(*)`
    Wildcard,
    /// Parenthesized expression
    Nested(Box<Expr>),
}

impl Expr {
    pub fn binary(left: Self, op: BinaryOperator, right: Self) -> Self {
        Self::Binary { left: Box::new(left), op, right: Box::new(right) }
    }

    /// Pre-order walk; leaves are visited in textual order.
    pub fn walk<F: FnMut(&Self)>(&self, f: &mut F) {
        f(self);
        match self {
            Self::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Self::Not(e) | Self::Nested(e) | Self::IsNull { expr: e, .. } => e.walk(f),
            Self::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Self::Between { expr, low, high, .. } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            Self::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Self::Function { args, .. } => args.iter().for_each(|e| e.walk(f)),
            Self::Column(_) | Self::Literal(_) | Self::Placeholder(_) | Self::Wildcard => {}
        }
    }

    pub fn walk_mut<F: FnMut(&mut Self)>(&mut self, f: &mut F) {
        f(self);
        match self {
            Self::Binary { left, right, .. } => {
                left.walk_mut(f);
                right.walk_mut(f);
            }
            Self::Not(e) | Self::Nested(e) | Self::IsNull { expr: e, .. } => e.walk_mut(f),
            Self::InList { expr, list, .. } => {
                expr.walk_mut(f);
                list.iter_mut().for_each(|e| e.walk_mut(f));
            }
            Self::Between { expr, low, high, .. } => {
                expr.walk_mut(f);
                low.walk_mut(f);
                high.walk_mut(f);
            }
            Self::Like { expr, pattern, .. } => {
                expr.walk_mut(f);
                pattern.walk_mut(f);
            }
            Self::Function { args, .. } => args.iter_mut().for_each(|e| e.walk_mut(f)),
            Self::Column(_) | Self::Literal(_) | Self::Placeholder(_) | Self::Wildcard => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    QualifiedWildcard(Ident),
    Expr { expr: Expr, alias: Option<Ident> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

/// Next member of a `UNION`/`INTERSECT`/`EXCEPT` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub op: SetOperator,
    pub select: Box<SelectStatement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub columns: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub compound: Option<Compound>,
}

impl SelectStatement {
    /// Expressions of this member only (not the compound chain), in textual order.
    pub fn walk_exprs_mut<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        for item in &mut self.columns {
            if let SelectItem::Expr { expr, .. } = item {
                expr.walk_mut(f);
            }
        }
        for join in &mut self.joins {
            join.on.walk_mut(f);
        }
        let clauses = self
            .filter
            .iter_mut()
            .chain(self.group_by.iter_mut())
            .chain(self.having.iter_mut())
            .chain(self.order_by.iter_mut().map(|o| &mut o.expr))
            .chain(self.limit.iter_mut())
            .chain(self.offset.iter_mut());
        for expr in clauses {
            expr.walk_mut(f);
        }
    }

    /// All table references of this member: FROM first, then joins.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        std::iter::once(&self.from).chain(self.joins.iter().map(|j| &j.table))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: Ident,
    /// Empty when the statement has no column list
    pub columns: Vec<Ident>,
    pub rows: Vec<Vec<Expr>>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableRef,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Expr>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableRef,
    pub filter: Option<Expr>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertStatement),
    Select(SelectStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

fn walk_items_mut<F: FnMut(&mut Expr)>(items: &mut [SelectItem], f: &mut F) {
    for item in items {
        if let SelectItem::Expr { expr, .. } = item {
            expr.walk_mut(f);
        }
    }
}

impl Statement {
    /// Every expression of the statement in textual order, compound members included.
    pub fn walk_exprs_mut<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        match self {
            Self::Insert(insert) => {
                for row in &mut insert.rows {
                    row.iter_mut().for_each(|e| e.walk_mut(f));
                }
                walk_items_mut(&mut insert.returning, f);
            }
            Self::Select(select) => {
                let mut member = Some(select);
                while let Some(current) = member {
                    current.walk_exprs_mut(f);
                    member = current.compound.as_mut().map(|c| c.select.as_mut());
                }
            }
            Self::Update(update) => {
                for assignment in &mut update.assignments {
                    assignment.value.walk_mut(f);
                }
                if let Some(filter) = &mut update.filter {
                    filter.walk_mut(f);
                }
                walk_items_mut(&mut update.returning, f);
            }
            Self::Delete(delete) => {
                if let Some(filter) = &mut delete.filter {
                    filter.walk_mut(f);
                }
                walk_items_mut(&mut delete.returning, f);
            }
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "INSERT",
            Self::Select(_) => "SELECT",
            Self::Update(_) => "UPDATE",
            Self::Delete(_) => "DELETE",
        }
    }
}
