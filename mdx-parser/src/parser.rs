//! Recursive-descent parser over the token stream produced by
//! [`crate::lexer::lex`], building the CST types from `mdx-ast` (spec.md
//! §4.B). There is no error recovery: the first syntax error stops parsing,
//! exactly as spec.md requires.

use std::time::{Duration, Instant};

use mdx_ast::{
    Axis, AxisId, BinOpKind, BinaryOp, BracedSet, BracketedIdent, CalcMemberDef, CallArg,
    CaseExpr, CubeRef, Error, FunctionCall, IifExpr, Literal, MemberExpr, MemberFunction,
    MemberPath, Query, Reason, SelectStmt, SetElement, SetExpr, Slicer, Span, TupleExpr, UnOpKind,
    UnaryOp, ValueExpr, WithClause, WithErrorInfo,
};

use crate::lexer::{self, Keyword, Token, TokenKind};

/// Config knobs consumed by the parser (spec.md §6): input-size cap and a
/// wall-clock parse timeout, both advisory and only checked at loop
/// boundaries (spec.md §5).
#[derive(Debug, Clone)]
pub struct ParserOptions {
    pub strict_mode: bool,
    pub max_input_size_chars: Option<usize>,
    pub parse_timeout: Option<Duration>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            strict_mode: false,
            max_input_size_chars: None,
            parse_timeout: None,
        }
    }
}

pub fn parse(source: &str, options: &ParserOptions) -> Result<Query, Error> {
    if let Some(limit) = options.max_input_size_chars {
        let len = source.chars().count();
        if len > limit {
            return Err(Error::new(Reason::Simple(format!(
                "input is {len} chars, exceeding the configured limit of {limit}"
            )))
            .with_code("resource.max_input_size"));
        }
    }
    if source.trim().is_empty() {
        return Err(Error::new_simple("MDX input must not be empty"));
    }

    let lexed = lexer::lex(source)?;
    let deadline = options.parse_timeout.map(|d| Instant::now() + d);
    let mut parser = Parser {
        tokens: lexed.tokens,
        pos: 0,
        deadline,
        comments: lexed.comments,
        comment_pos: 0,
    };
    let query = parser.parse_query()?;
    parser.expect_end()?;
    Ok(query)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    deadline: Option<Instant>,
    /// Comments collected by the lexer, in source order. `comment_pos` only
    /// ever advances, so each is attributed to at most one construct (spec.md
    /// §4.A's hint-harvesting attachment).
    comments: Vec<lexer::Comment>,
    comment_pos: usize,
}

impl Parser {
    fn check_deadline(&self) -> Result<(), Error> {
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(
                    Error::new_simple("parse timeout exceeded").with_code("resource.parse_timeout")
                );
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn span_at(&self, pos: usize) -> Option<Span> {
        self.tokens
            .get(pos)
            .map(|t| t.span)
            .or_else(|| self.tokens.last().map(|t| t.span))
    }

    fn current_span(&self) -> Option<Span> {
        self.span_at(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.is_keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), Error> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{kw:?}")))
        }
    }

    fn is_kind(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat_kind(&mut self, kind: &TokenKind) -> bool {
        if self.is_kind(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: TokenKind) -> Result<(), Error> {
        if self.eat_kind(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{kind:?}")))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match self.peek_kind() {
            Some(k) => format!("{k:?}"),
            None => "end of input".to_string(),
        };
        Error::new(Reason::Expected {
            who: None,
            expected: expected.to_string(),
            found,
        })
        .with_span(self.current_span())
    }

    /// Consumes every collected comment ending at or before `before`,
    /// keeping the text of the nearest one (the last consumed) as the
    /// construct's leading comment.
    fn take_leading_comment(&mut self, before: Option<usize>) -> Option<String> {
        let before = before?;
        let mut found = None;
        while let Some(comment) = self.comments.get(self.comment_pos) {
            if comment.span.end <= before {
                found = Some(comment.text.clone());
                self.comment_pos += 1;
            } else {
                break;
            }
        }
        found
    }

    fn expect_end(&self) -> Result<(), Error> {
        if self.pos != self.tokens.len() {
            return Err(self.unexpected("end of query"));
        }
        Ok(())
    }

    fn expect_bracket_ident(&mut self) -> Result<BracketedIdent, Error> {
        let span = self.current_span();
        match self.bump() {
            Some(Token {
                kind: TokenKind::BracketIdent(text),
                span,
            }) => Ok(BracketedIdent {
                text,
                span: Some(span),
            }),
            _ => Err(Error::new(Reason::Expected {
                who: None,
                expected: "a bracketed identifier".to_string(),
                found: "something else".to_string(),
            })
            .with_span(span)),
        }
    }

    fn parse_query(&mut self) -> Result<Query, Error> {
        self.check_deadline()?;
        let start = self.current_span();
        let with = if self.is_keyword(Keyword::With) {
            Some(self.parse_with_clause()?)
        } else {
            None
        };
        let select = self.parse_select_stmt()?;
        let span = start.zip(select.span).map(|(a, b)| a.union(b)).or(select.span);
        Ok(Query { with, select, span })
    }

    fn parse_with_clause(&mut self) -> Result<WithClause, Error> {
        let start = self.current_span();
        // Comments preceding WITH itself belong to whatever came before the
        // query, not to the first MEMBER def; drop them from consideration
        // before the first `take_leading_comment` call in `parse_calc_def`.
        self.take_leading_comment(start.map(|s| s.start));
        self.expect_keyword(Keyword::With)?;
        let mut defs = Vec::new();
        while self.is_keyword(Keyword::Member) {
            defs.push(self.parse_calc_def()?);
        }
        if defs.is_empty() {
            return Err(self.unexpected("at least one MEMBER definition after WITH"));
        }
        let end = defs.last().and_then(|d| d.span);
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(WithClause { defs, span })
    }

    fn parse_calc_def(&mut self) -> Result<CalcMemberDef, Error> {
        let start = self.current_span();
        let leading_comment = self.take_leading_comment(start.map(|s| s.start));
        self.expect_keyword(Keyword::Member)?;
        let name = self.parse_member_path()?;
        self.expect_keyword(Keyword::As)?;
        let value = Box::new(self.parse_value_expr()?);
        let mut properties = Vec::new();
        while self.eat_kind(&TokenKind::Comma) {
            let prop_name = match self.bump() {
                Some(Token {
                    kind: TokenKind::Ident(name),
                    ..
                }) => name,
                _ => return Err(self.unexpected("a calculated member property name")),
            };
            self.expect_kind(TokenKind::Eq)?;
            let prop_value = self.parse_value_expr()?;
            properties.push((prop_name, prop_value));
        }
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(CalcMemberDef {
            name,
            value,
            properties,
            leading_comment,
            span,
        })
    }

    fn parse_select_stmt(&mut self) -> Result<SelectStmt, Error> {
        let start = self.current_span();
        self.expect_keyword(Keyword::Select)?;
        let mut axes = Vec::new();
        axes.push(self.parse_axis()?);
        while self.eat_kind(&TokenKind::Comma) {
            axes.push(self.parse_axis()?);
        }
        self.expect_keyword(Keyword::From)?;
        let cube = self.parse_cube_ref()?;
        let where_clause = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_slicer()?)
        } else {
            None
        };
        let end = where_clause
            .as_ref()
            .and_then(|w| w.span)
            .or(cube.span)
            .or(axes.last().and_then(|a| a.span));
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(SelectStmt {
            axes,
            cube,
            where_clause,
            span,
        })
    }

    fn parse_axis(&mut self) -> Result<Axis, Error> {
        let start = self.current_span();
        let non_empty = self.eat_keyword(Keyword::Non);
        if non_empty {
            self.expect_keyword(Keyword::Empty)?;
        }
        let set = self.parse_set_expr()?;
        self.expect_keyword(Keyword::On)?;
        let axis_id = self.parse_axis_id()?;
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(Axis {
            non_empty,
            set,
            axis_id,
            span,
        })
    }

    fn parse_axis_id(&mut self) -> Result<AxisId, Error> {
        match self.peek_kind() {
            Some(TokenKind::Integer(n)) => {
                let n = *n as u32;
                self.bump();
                Ok(AxisId::Numbered(n))
            }
            Some(TokenKind::Keyword(Keyword::Columns)) => {
                self.bump();
                Ok(AxisId::Columns)
            }
            Some(TokenKind::Keyword(Keyword::Rows)) => {
                self.bump();
                Ok(AxisId::Rows)
            }
            Some(TokenKind::Keyword(Keyword::Pages)) => {
                self.bump();
                Ok(AxisId::Pages)
            }
            Some(TokenKind::Keyword(Keyword::Chapters)) => {
                self.bump();
                Ok(AxisId::Chapters)
            }
            Some(TokenKind::Keyword(Keyword::Sections)) => {
                self.bump();
                Ok(AxisId::Sections)
            }
            Some(TokenKind::Ident(word)) if word.eq_ignore_ascii_case("axis") => {
                self.bump();
                self.expect_kind(TokenKind::LParen)?;
                let n = match self.bump() {
                    Some(Token {
                        kind: TokenKind::Integer(n),
                        ..
                    }) => n as u32,
                    _ => return Err(self.unexpected("a numeral inside AXIS(...)")),
                };
                self.expect_kind(TokenKind::RParen)?;
                Ok(AxisId::Named(n))
            }
            _ => Err(self.unexpected("an axis identifier (0, 1, COLUMNS, ROWS, ...)")),
        }
    }

    fn parse_cube_ref(&mut self) -> Result<CubeRef, Error> {
        let start = self.current_span();
        let mut segments = vec![self.expect_bracket_ident()?];
        while self.is_kind(&TokenKind::Dot) {
            // Only consume the dot if it is followed by a bracketed
            // identifier; otherwise leave it for whatever follows the cube
            // reference (defensive, in practice FROM is always followed
            // directly by WHERE or end of query).
            if matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.kind),
                Some(TokenKind::BracketIdent(_))
            ) {
                self.bump();
                segments.push(self.expect_bracket_ident()?);
            } else {
                break;
            }
        }
        let end = segments.last().and_then(|s| s.span);
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(CubeRef { segments, span })
    }

    fn parse_slicer(&mut self) -> Result<Slicer, Error> {
        let start = self.current_span();
        self.expect_kind(TokenKind::LParen)?;
        let mut members = vec![self.parse_member_expr()?];
        while self.eat_kind(&TokenKind::Comma) {
            members.push(self.parse_member_expr()?);
        }
        self.expect_kind(TokenKind::RParen)?;
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(Slicer { members, span })
    }

    // -- sets -----------------------------------------------------------

    fn parse_set_expr(&mut self) -> Result<SetExpr, Error> {
        let mut left = self.parse_set_primary()?;
        while self.eat_kind(&TokenKind::Star) {
            let right = self.parse_set_primary()?;
            left = SetExpr::CrossJoin(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_set_primary(&mut self) -> Result<SetExpr, Error> {
        self.check_deadline()?;
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(SetExpr::Braced(self.parse_braced_set()?)),
            Some(TokenKind::LParen) => {
                self.bump();
                let inner = self.parse_set_expr()?;
                self.expect_kind(TokenKind::RParen)?;
                Ok(SetExpr::Paren(Box::new(inner)))
            }
            Some(TokenKind::Ident(_)) if self.next_is_call() => {
                Ok(SetExpr::FunctionCall(self.parse_function_call()?))
            }
            Some(TokenKind::BracketIdent(_)) => Ok(SetExpr::Member(self.parse_member_expr()?)),
            _ => Err(self.unexpected("a set expression")),
        }
    }

    fn next_is_call(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::LParen)
        )
    }

    fn parse_braced_set(&mut self) -> Result<BracedSet, Error> {
        let start = self.current_span();
        self.expect_kind(TokenKind::LBrace)?;
        let mut elements = Vec::new();
        if !self.is_kind(&TokenKind::RBrace) {
            elements.push(self.parse_set_element()?);
            while self.eat_kind(&TokenKind::Comma) {
                elements.push(self.parse_set_element()?);
            }
        }
        self.expect_kind(TokenKind::RBrace)?;
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(BracedSet { elements, span })
    }

    fn parse_set_element(&mut self) -> Result<SetElement, Error> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(SetElement::Nested(SetExpr::Braced(
                self.parse_braced_set()?,
            ))),
            Some(TokenKind::LParen) => Ok(SetElement::Tuple(self.parse_tuple_expr()?)),
            Some(TokenKind::Ident(_)) if self.next_is_call() => Ok(SetElement::Nested(
                SetExpr::FunctionCall(self.parse_function_call()?),
            )),
            Some(TokenKind::BracketIdent(_)) => Ok(SetElement::Member(self.parse_member_expr()?)),
            _ => Err(self.unexpected("a set member, tuple or nested set")),
        }
    }

    fn parse_tuple_expr(&mut self) -> Result<TupleExpr, Error> {
        let start = self.current_span();
        self.expect_kind(TokenKind::LParen)?;
        let mut members = vec![self.parse_member_expr()?];
        while self.eat_kind(&TokenKind::Comma) {
            members.push(self.parse_member_expr()?);
        }
        self.expect_kind(TokenKind::RParen)?;
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(TupleExpr { members, span })
    }

    // -- members ----------------------------------------------------------

    fn parse_member_path(&mut self) -> Result<MemberPath, Error> {
        let start = self.current_span();
        let mut segments = vec![self.expect_bracket_ident()?];
        while self.is_kind(&TokenKind::Dot)
            && matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.kind),
                Some(TokenKind::BracketIdent(_))
            )
        {
            self.bump();
            segments.push(self.expect_bracket_ident()?);
        }
        let end = segments.last().and_then(|s| s.span);
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(MemberPath { segments, span })
    }

    fn parse_member_expr(&mut self) -> Result<MemberExpr, Error> {
        let start = self.current_span();
        let path = self.parse_member_path()?;
        let function = self.try_parse_member_function()?;
        let end = function
            .as_ref()
            .and_then(member_function_span)
            .or_else(|| path.span);
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(MemberExpr {
            path,
            function,
            span,
        })
    }

    fn try_parse_member_function(&mut self) -> Result<Option<MemberFunction>, Error> {
        if self.is_kind(&TokenKind::Dot) {
            // `.Members`, `.Children`, or `.Func(args)`.
            let save = self.pos;
            self.bump();
            match self.bump() {
                Some(Token {
                    kind: TokenKind::Ident(word),
                    ..
                }) => {
                    if self.is_kind(&TokenKind::LParen) {
                        let args = self.parse_call_args()?;
                        return Ok(Some(MemberFunction::Call(FunctionCall {
                            name: word,
                            args,
                            span: None,
                        })));
                    }
                    if word.eq_ignore_ascii_case("members") {
                        return Ok(Some(MemberFunction::Members));
                    }
                    if word.eq_ignore_ascii_case("children") {
                        return Ok(Some(MemberFunction::Children));
                    }
                    if word.eq_ignore_ascii_case("descendants") {
                        return Ok(Some(MemberFunction::Descendants));
                    }
                    return Err(self.unexpected("MEMBERS, CHILDREN or a function name"));
                }
                _ => {
                    self.pos = save;
                    return Ok(None);
                }
            }
        }
        if self.is_kind(&TokenKind::Amp) {
            self.bump();
            let key = self.expect_bracket_ident()?;
            return Ok(Some(MemberFunction::Key(key.text)));
        }
        Ok(None)
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, Error> {
        self.expect_kind(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.is_kind(&TokenKind::RParen) {
            args.push(self.parse_call_arg()?);
            while self.eat_kind(&TokenKind::Comma) {
                args.push(self.parse_call_arg()?);
            }
        }
        self.expect_kind(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_call_arg(&mut self) -> Result<CallArg, Error> {
        if self.is_kind(&TokenKind::LBrace) {
            return Ok(CallArg::Set(SetExpr::Braced(self.parse_braced_set()?)));
        }
        Ok(CallArg::Value(self.parse_value_expr()?))
    }

    fn parse_function_call(&mut self) -> Result<FunctionCall, Error> {
        let start = self.current_span();
        let name = match self.bump() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => name,
            _ => return Err(self.unexpected("a function name")),
        };
        let args = self.parse_call_args()?;
        let end = self.current_span();
        let span = match (start, end) {
            (Some(a), Some(b)) => Some(a.union(b)),
            _ => start,
        };
        Ok(FunctionCall { name, args, span })
    }

    // -- scalar value expressions, spec.md §4.A precedence chain --------
    // OR < AND < NOT < comparisons < + - < * / < unary - < primary

    fn parse_value_expr(&mut self) -> Result<ValueExpr, Error> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<ValueExpr, Error> {
        let mut left = self.parse_and()?;
        while self.is_keyword(Keyword::Or) {
            let start = left_span(&left);
            self.bump();
            let right = self.parse_and()?;
            left = binary(BinOpKind::Or, left, right, start);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ValueExpr, Error> {
        let mut left = self.parse_not()?;
        while self.is_keyword(Keyword::And) {
            let start = left_span(&left);
            self.bump();
            let right = self.parse_not()?;
            left = binary(BinOpKind::And, left, right, start);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ValueExpr, Error> {
        if self.is_keyword(Keyword::Not) {
            let start = self.current_span();
            self.bump();
            let inner = self.parse_not()?;
            let end = value_expr_span(&inner);
            let span = union_opt(start, end);
            return Ok(ValueExpr::Unary(UnaryOp {
                op: UnOpKind::Not,
                expr: Box::new(inner),
                span,
            }));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ValueExpr, Error> {
        let left = self.parse_additive()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(BinOpKind::Eq),
            Some(TokenKind::Ne) => Some(BinOpKind::Ne),
            Some(TokenKind::Lt) => Some(BinOpKind::Lt),
            Some(TokenKind::Le) => Some(BinOpKind::Le),
            Some(TokenKind::Gt) => Some(BinOpKind::Gt),
            Some(TokenKind::Ge) => Some(BinOpKind::Ge),
            _ => None,
        };
        if let Some(op) = op {
            let start = left_span(&left);
            self.bump();
            let right = self.parse_additive()?;
            return Ok(binary(op, left, right, start));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ValueExpr, Error> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOpKind::Add,
                Some(TokenKind::Minus) => BinOpKind::Sub,
                _ => break,
            };
            let start = left_span(&left);
            self.bump();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ValueExpr, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOpKind::Mul,
                Some(TokenKind::Slash) => BinOpKind::Div,
                _ => break,
            };
            let start = left_span(&left);
            self.bump();
            let right = self.parse_unary()?;
            left = binary(op, left, right, start);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ValueExpr, Error> {
        if self.is_kind(&TokenKind::Minus) {
            let start = self.current_span();
            self.bump();
            let inner = self.parse_unary()?;
            let end = value_expr_span(&inner);
            let span = union_opt(start, end);
            return Ok(ValueExpr::Unary(UnaryOp {
                op: UnOpKind::Neg,
                expr: Box::new(inner),
                span,
            }));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<ValueExpr, Error> {
        self.check_deadline()?;
        match self.peek_kind() {
            Some(TokenKind::Integer(n)) => {
                let n = *n;
                self.bump();
                Ok(ValueExpr::Literal(Literal::Integer(n)))
            }
            Some(TokenKind::Float(f)) => {
                let f = *f;
                self.bump();
                Ok(ValueExpr::Literal(Literal::Float(f)))
            }
            Some(TokenKind::String(s)) => {
                let s = s.clone();
                self.bump();
                Ok(ValueExpr::Literal(Literal::String(s)))
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.bump();
                Ok(ValueExpr::Literal(Literal::Boolean(true)))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.bump();
                Ok(ValueExpr::Literal(Literal::Boolean(false)))
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let inner = self.parse_value_expr()?;
                self.expect_kind(TokenKind::RParen)?;
                Ok(ValueExpr::Paren(Box::new(inner)))
            }
            Some(TokenKind::BracketIdent(_)) => Ok(ValueExpr::Member(self.parse_member_expr()?)),
            Some(TokenKind::Ident(word)) if word.eq_ignore_ascii_case("iif") => {
                self.parse_iif()
            }
            Some(TokenKind::Ident(word)) if word.eq_ignore_ascii_case("case") => {
                self.parse_case()
            }
            Some(TokenKind::Ident(_)) if self.next_is_call() => {
                Ok(ValueExpr::FunctionCall(self.parse_function_call()?))
            }
            _ => Err(self.unexpected("a value expression")),
        }
    }

    fn parse_iif(&mut self) -> Result<ValueExpr, Error> {
        let start = self.current_span();
        self.bump(); // IIF
        self.expect_kind(TokenKind::LParen)?;
        let cond = Box::new(self.parse_value_expr()?);
        self.expect_kind(TokenKind::Comma)?;
        let then_branch = Box::new(self.parse_value_expr()?);
        self.expect_kind(TokenKind::Comma)?;
        let else_branch = Box::new(self.parse_value_expr()?);
        self.expect_kind(TokenKind::RParen)?;
        let end = self.current_span();
        let span = union_opt(start, end);
        Ok(ValueExpr::Iif(IifExpr {
            cond,
            then_branch,
            else_branch,
            span,
        }))
    }

    fn parse_case(&mut self) -> Result<ValueExpr, Error> {
        let start = self.current_span();
        self.bump(); // CASE
        let mut arms = Vec::new();
        while matches!(self.peek_kind(), Some(TokenKind::Ident(w)) if w.eq_ignore_ascii_case("when"))
        {
            self.bump();
            let cond = self.parse_value_expr()?;
            self.expect_then()?;
            let value = self.parse_value_expr()?;
            arms.push((cond, value));
        }
        if arms.is_empty() {
            return Err(self.unexpected("at least one WHEN branch in CASE"));
        }
        let else_branch = if matches!(self.peek_kind(), Some(TokenKind::Ident(w)) if w.eq_ignore_ascii_case("else"))
        {
            self.bump();
            Some(Box::new(self.parse_value_expr()?))
        } else {
            None
        };
        self.expect_end_keyword()?;
        let end = self.current_span();
        let span = union_opt(start, end);
        Ok(ValueExpr::Case(CaseExpr {
            arms,
            else_branch,
            span,
        }))
    }

    fn expect_then(&mut self) -> Result<(), Error> {
        match self.peek_kind() {
            Some(TokenKind::Ident(w)) if w.eq_ignore_ascii_case("then") => {
                self.bump();
                Ok(())
            }
            _ => Err(self.unexpected("THEN")),
        }
    }

    fn expect_end_keyword(&mut self) -> Result<(), Error> {
        match self.peek_kind() {
            Some(TokenKind::Ident(w)) if w.eq_ignore_ascii_case("end") => {
                self.bump();
                Ok(())
            }
            _ => Err(self.unexpected("END")),
        }
    }
}

fn binary(op: BinOpKind, left: ValueExpr, right: ValueExpr, start: Option<Span>) -> ValueExpr {
    let end = value_expr_span(&right);
    let span = union_opt(start, end);
    ValueExpr::Binary(BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    })
}

fn left_span(expr: &ValueExpr) -> Option<Span> {
    value_expr_span(expr)
}

fn value_expr_span(expr: &ValueExpr) -> Option<Span> {
    match expr {
        ValueExpr::Literal(_) => None,
        ValueExpr::Member(m) => m.span,
        ValueExpr::Binary(b) => b.span,
        ValueExpr::Unary(u) => u.span,
        ValueExpr::FunctionCall(f) => f.span,
        ValueExpr::Iif(i) => i.span,
        ValueExpr::Case(c) => c.span,
        ValueExpr::Paren(inner) => value_expr_span(inner),
    }
}

fn member_function_span(f: &MemberFunction) -> Option<Span> {
    match f {
        MemberFunction::Call(c) => c.span,
        _ => None,
    }
}

fn union_opt(a: Option<Span>, b: Option<Span>) -> Option<Span> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
