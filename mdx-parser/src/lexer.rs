//! Hand-rolled character-level lexer for MDX (spec.md §4.A).
//!
//! MDX's bracketed identifiers (`[Measures].[Sales Amount]`) and `&[key]`
//! key references need lookahead that a table-driven lexer handles more
//! awkwardly than a direct scan, so this is a plain `Peekable<Chars>`
//! scanner rather than a parser-combinator pipeline.

use mdx_ast::{Error, Reason, Span};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    BracketIdent(String),
    Keyword(Keyword),
    String(String),
    Integer(i64),
    Float(f64),

    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Dot,
    Amp,
    Star,

    Plus,
    Minus,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    With,
    Member,
    As,
    On,
    Axis,
    Columns,
    Rows,
    Pages,
    Chapters,
    Sections,
    Non,
    Empty,
    And,
    Or,
    Not,
    In,
    True,
    False,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match word.to_ascii_uppercase().as_str() {
            "SELECT" => Select,
            "FROM" => From,
            "WHERE" => Where,
            "WITH" => With,
            "MEMBER" => Member,
            "AS" => As,
            "ON" => On,
            "AXIS" => Axis,
            "COLUMNS" => Columns,
            "ROWS" => Rows,
            "PAGES" => Pages,
            "CHAPTERS" => Chapters,
            "SECTIONS" => Sections,
            "NON" => Non,
            "EMPTY" => Empty,
            "AND" => And,
            "OR" => Or,
            "NOT" => Not,
            "IN" => In,
            "TRUE" => True,
            "FALSE" => False,
            _ => return None,
        })
    }
}

/// A comment attached to a byte span, retained for the linter's hint
/// harvesting (spec.md §4.A): `--...`, `//...` and `/*...*/` forms.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub span: Span,
    pub text: String,
}

pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    comments: Vec<Comment>,
}

pub fn lex(source: &str) -> Result<LexOutput, Error> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        comments: Vec::new(),
    };
    lexer.run()?;
    Ok(LexOutput {
        tokens: lexer.tokens,
        comments: lexer.comments,
    })
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::new(Reason::Simple(msg.into())).with_span_at(self.pos)
    }

    fn run(&mut self) -> Result<(), Error> {
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(ch) = self.peek() else { break };
            let start = self.pos;
            let kind = match ch {
                '{' => {
                    self.bump();
                    TokenKind::LBrace
                }
                '}' => {
                    self.bump();
                    TokenKind::RBrace
                }
                '(' => {
                    self.bump();
                    TokenKind::LParen
                }
                ')' => {
                    self.bump();
                    TokenKind::RParen
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                '.' => {
                    self.bump();
                    TokenKind::Dot
                }
                '&' => {
                    self.bump();
                    TokenKind::Amp
                }
                '*' => {
                    self.bump();
                    TokenKind::Star
                }
                '+' => {
                    self.bump();
                    TokenKind::Plus
                }
                '-' => {
                    self.bump();
                    TokenKind::Minus
                }
                '/' => {
                    self.bump();
                    TokenKind::Slash
                }
                '=' => {
                    self.bump();
                    TokenKind::Eq
                }
                '<' => {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        TokenKind::Ne
                    } else if self.peek() == Some('=') {
                        self.bump();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '[' => self.lex_bracket_ident()?,
                '"' | '\'' => self.lex_string(ch)?,
                c if c.is_ascii_digit() => self.lex_number()?,
                c if is_ident_start(c) => self.lex_ident_or_keyword(),
                other => return Err(self.err(format!("unexpected character '{other}'"))),
            };
            let span = Span::new(start, self.pos);
            self.tokens.push(Token { kind, span });
        }
        Ok(())
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.starts_with("--") => self.skip_line_comment(2),
                Some('/') if self.starts_with("//") => self.skip_line_comment(2),
                Some('/') if self.starts_with("/*") => self.skip_block_comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self, prefix_len: usize) {
        let start = self.pos;
        for _ in 0..prefix_len {
            self.bump();
        }
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        let text = self.source[start..self.pos].to_string();
        self.comments.push(Comment {
            span: Span::new(start, self.pos),
            text,
        });
    }

    fn skip_block_comment(&mut self) -> Result<(), Error> {
        let start = self.pos;
        self.bump();
        self.bump();
        loop {
            if self.starts_with("*/") {
                self.bump();
                self.bump();
                break;
            }
            if self.bump().is_none() {
                return Err(self.err("unterminated block comment"));
            }
        }
        let text = self.source[start..self.pos].to_string();
        self.comments.push(Comment {
            span: Span::new(start, self.pos),
            text,
        });
        Ok(())
    }

    fn lex_bracket_ident(&mut self) -> Result<TokenKind, Error> {
        self.bump(); // consume '['
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(']') => {
                    if self.peek() == Some(']') {
                        self.bump();
                        text.push(']');
                    } else {
                        return Ok(TokenKind::BracketIdent(text));
                    }
                }
                Some(c) => text.push(c),
                None => return Err(self.err("unterminated bracketed identifier")),
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<TokenKind, Error> {
        self.bump(); // consume opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                        text.push(quote);
                    } else {
                        return Ok(TokenKind::String(text));
                    }
                }
                Some(c) => text.push(c),
                None => return Err(self.err("unterminated string literal")),
            }
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, Error> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = save;
            }
        }
        let text = &self.source[start..self.pos];
        if is_float {
            let v: f64 = text
                .parse()
                .map_err(|_| self.err(format!("invalid numeric literal '{text}'")))?;
            Ok(TokenKind::Float(v))
        } else {
            let v: i64 = text
                .parse()
                .map_err(|_| self.err(format!("invalid numeric literal '{text}'")))?;
            Ok(TokenKind::Integer(v))
        }
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        let word = &self.source[start..self.pos];
        match Keyword::from_word(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(word.to_string()),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

trait SpanAt {
    fn with_span_at(self, offset: usize) -> Self;
}

impl SpanAt for Error {
    fn with_span_at(self, offset: usize) -> Self {
        use mdx_ast::WithErrorInfo;
        self.with_span(Some(Span::new(offset, offset)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_simple_select() {
        let toks = kinds("SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]");
        assert_eq!(
            toks,
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::LBrace,
                TokenKind::BracketIdent("Measures".into()),
                TokenKind::Dot,
                TokenKind::BracketIdent("Sales Amount".into()),
                TokenKind::RBrace,
                TokenKind::Keyword(Keyword::On),
                TokenKind::Integer(0),
                TokenKind::Keyword(Keyword::From),
                TokenKind::BracketIdent("Adventure Works".into()),
            ]
        );
    }

    #[test]
    fn escaped_bracket_ident() {
        let toks = kinds("[x]]y]");
        assert_eq!(toks, vec![TokenKind::BracketIdent("x]y".into())]);
    }

    #[test]
    fn key_reference() {
        let toks = kinds("&[2023]");
        assert_eq!(
            toks,
            vec![TokenKind::Amp, TokenKind::BracketIdent("2023".into())]
        );
    }

    #[test]
    fn comments_are_collected_not_emitted() {
        let out = lex("-- a comment\nSELECT").unwrap();
        assert_eq!(out.tokens.len(), 1);
        assert_eq!(out.comments.len(), 1);
        assert_eq!(out.comments[0].text, "-- a comment");
    }

    #[test]
    fn block_comment() {
        let out = lex("/* hi */ SELECT").unwrap();
        assert_eq!(out.tokens.len(), 1);
        assert_eq!(out.comments[0].text, "/* hi */");
    }

    #[test]
    fn doubled_quote_escape_in_string() {
        let toks = kinds("\"He said \"\"hi\"\"\"");
        assert_eq!(toks, vec![TokenKind::String("He said \"hi\"".into())]);
    }

    #[test]
    fn float_literal() {
        let toks = kinds("3.14");
        assert_eq!(toks, vec![TokenKind::Float(3.14)]);
    }

    #[test]
    fn unterminated_string_is_error() {
        assert!(lex("\"abc").is_err());
    }
}
