//! Flag expressions
//!
//! A flag's statement is a boolean expression over bare words:
//!
//! ```text
//! LOADING
//! !LOADING
//! READY && !SAVING
//! (EDITING || SAVING) && !LOCKED
//! EDITING != LOCKED
//! ```
//!
//! Every maximal run of word characters (`[A-Za-z0-9_]`) is an equality test
//! against the active state. Everything else is boolean syntax and passes
//! through untouched, so `"A && !B"` reads as
//! `(viewState === "A") && !(viewState === "B")`.
//!
//! The operators, loosest first: `||`, `&&`, then `==`/`===` and `!=`/`!==`
//! comparing two booleans, then prefix `!`. Parentheses group.
//!
//! Words are never resolved against other flags. A word that happens to be a
//! flag name is still compared with the active state.

use smallvec::SmallVec;
use thiserror::Error;

/// Default name of the field that holds the active state
pub const DEFAULT_STATE_FIELD: &str = "viewState";

/// Maximum parenthesis nesting accepted by the parser
const MAX_DEPTH: usize = 64;

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite every bare word of `statement` as an equality test on `state_field`
///
/// ```rust
/// use blinc_viewstate::translate;
///
/// assert_eq!(
///     translate("READY && !SAVING", "viewState"),
///     r#"(viewState === "READY") && !(viewState === "SAVING")"#
/// );
/// ```
pub fn translate(statement: &str, state_field: &str) -> String {
    let mut out = String::with_capacity(statement.len() * 3);
    let mut word_start: Option<usize> = None;

    for (i, c) in statement.char_indices() {
        match (is_word_char(c), word_start) {
            (true, None) => word_start = Some(i),
            (true, Some(_)) => {}
            (false, Some(start)) => {
                push_equality(&mut out, state_field, &statement[start..i]);
                word_start = None;
                out.push(c);
            }
            (false, None) => out.push(c),
        }
    }
    if let Some(start) = word_start {
        push_equality(&mut out, state_field, &statement[start..]);
    }
    out
}

fn push_equality(out: &mut String, state_field: &str, word: &str) {
    out.push('(');
    out.push_str(state_field);
    out.push_str(" === \"");
    out.push_str(word);
    out.push_str("\")");
}

/// Why a statement could not be compiled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unexpected `{token}` at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("parentheses nested deeper than {}", MAX_DEPTH)]
    TooDeep,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind<'a> {
    Word(&'a str),
    Not,
    And,
    Or,
    Eq,
    Ne,
    Open,
    Close,
}

#[derive(Clone, Copy, Debug)]
struct Token<'a> {
    kind: TokenKind<'a>,
    offset: usize,
}

impl TokenKind<'_> {
    fn describe(&self) -> String {
        match self {
            TokenKind::Word(word) => (*word).to_string(),
            TokenKind::Not => "!".to_string(),
            TokenKind::And => "&&".to_string(),
            TokenKind::Or => "||".to_string(),
            TokenKind::Eq => "==".to_string(),
            TokenKind::Ne => "!=".to_string(),
            TokenKind::Open => "(".to_string(),
            TokenKind::Close => ")".to_string(),
        }
    }
}

fn tokenize(statement: &str) -> Result<SmallVec<[Token<'_>; 16]>, ExpressionError> {
    let mut tokens = SmallVec::new();
    let bytes = statement.as_bytes();
    let mut chars = statement.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            c if is_word_char(c) => {
                let mut end = offset + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                TokenKind::Word(&statement[offset..end])
            }
            '!' | '=' if bytes.get(offset + 1) == Some(&b'=') => {
                chars.next();
                // `===` and `!==` mean the same on booleans
                if bytes.get(offset + 2) == Some(&b'=') {
                    chars.next();
                }
                if c == '=' {
                    TokenKind::Eq
                } else {
                    TokenKind::Ne
                }
            }
            '!' => TokenKind::Not,
            '(' => TokenKind::Open,
            ')' => TokenKind::Close,
            '&' | '|' if bytes.get(offset + 1) == Some(&(c as u8)) => {
                chars.next();
                if c == '&' {
                    TokenKind::And
                } else {
                    TokenKind::Or
                }
            }
            ch => return Err(ExpressionError::UnexpectedChar { ch, offset }),
        };
        tokens.push(Token { kind, offset });
    }
    Ok(tokens)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Expr {
    Const(bool),
    Is(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn evaluate(&self, active: Option<&str>) -> bool {
        match self {
            Expr::Const(value) => *value,
            Expr::Is(state) => active == Some(state.as_str()),
            Expr::Not(inner) => !inner.evaluate(active),
            Expr::And(lhs, rhs) => lhs.evaluate(active) && rhs.evaluate(active),
            Expr::Or(lhs, rhs) => lhs.evaluate(active) || rhs.evaluate(active),
            Expr::Eq(lhs, rhs) => lhs.evaluate(active) == rhs.evaluate(active),
            Expr::Ne(lhs, rhs) => lhs.evaluate(active) != rhs.evaluate(active),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token<'a>],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn parse(tokens: &'a [Token<'a>]) -> Result<Expr, ExpressionError> {
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(unexpected(token)),
        }
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn eat(&mut self, kind: TokenKind<'_>) -> bool {
        if self.peek().map(|t| t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.and()?;
        while self.eat(TokenKind::Or) {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.equality()?;
        while self.eat(TokenKind::And) {
            lhs = Expr::And(Box::new(lhs), Box::new(self.equality()?));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat(TokenKind::Eq) {
                lhs = Expr::Eq(Box::new(lhs), Box::new(self.unary()?));
            } else if self.eat(TokenKind::Ne) {
                lhs = Expr::Ne(Box::new(lhs), Box::new(self.unary()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.peek().ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;
        match token.kind {
            TokenKind::Word(word) => Ok(Expr::Is(word.to_string())),
            TokenKind::Not => {
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Not(Box::new(inner)))
            }
            TokenKind::Open => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                match self.peek() {
                    Some(Token {
                        kind: TokenKind::Close,
                        ..
                    }) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(unexpected(other)),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            _ => Err(unexpected(token)),
        }
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        Ok(())
    }
}

fn unexpected(token: Token<'_>) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        token: token.kind.describe(),
        offset: token.offset,
    }
}

/// A compiled flag statement, evaluated against the active state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    source: Option<String>,
    translated: String,
    state_field: String,
    compiled: Result<Expr, ExpressionError>,
}

impl Predicate {
    /// Compile a flag statement
    ///
    /// Accepted syntax is word runs, `!`, `&&`, `||`, `==`/`===`, `!=`/`!==`
    /// and parentheses. A missing or blank statement is the constant `false`.
    /// A statement that does not parse (a single `&`, `-`, a dangling
    /// operator) still translates, but always evaluates to `false`.
    pub fn compile(statement: Option<&str>, state_field: &str) -> Self {
        let source = statement.map(str::to_string);
        let Some(text) = statement.filter(|s| !s.trim().is_empty()) else {
            return Self {
                source,
                translated: "false".to_string(),
                state_field: state_field.to_string(),
                compiled: Ok(Expr::Const(false)),
            };
        };

        let compiled = tokenize(text).and_then(|tokens| Parser::parse(&tokens));
        if let Err(err) = &compiled {
            tracing::warn!("Flag expression {:?} is malformed: {}", text, err);
        }

        Self {
            translated: translate(text, state_field),
            source,
            state_field: state_field.to_string(),
            compiled,
        }
    }

    /// Evaluate against the current value of the state field
    pub fn evaluate(&self, active: Option<&str>) -> bool {
        match &self.compiled {
            Ok(expr) => expr.evaluate(active),
            Err(_) => false,
        }
    }

    /// The statement this predicate was compiled from
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The statement with every word rewritten as a state test
    pub fn translated(&self) -> &str {
        &self.translated
    }

    /// Field holding the active state this predicate reads
    pub fn state_field(&self) -> &str {
        &self.state_field
    }

    pub fn is_well_formed(&self) -> bool {
        self.compiled.is_ok()
    }

    pub fn syntax_error(&self) -> Option<&ExpressionError> {
        self.compiled.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pred(statement: &str) -> Predicate {
        Predicate::compile(Some(statement), DEFAULT_STATE_FIELD)
    }

    #[test]
    fn test_translate_substitutes_words_only() {
        assert_eq!(translate("LOADING", "viewState"), r#"(viewState === "LOADING")"#);
        assert_eq!(translate("!LOADING", "viewState"), r#"!(viewState === "LOADING")"#);
        assert_eq!(
            translate("A && !B", "viewState"),
            r#"(viewState === "A") && !(viewState === "B")"#
        );
        assert_eq!(
            translate("(A||B)&&C", "mode"),
            r#"((mode === "A")||(mode === "B"))&&(mode === "C")"#
        );
    }

    #[test]
    fn test_translate_splits_on_dashes() {
        assert_eq!(
            translate("save-2", "viewState"),
            r#"(viewState === "save")-(viewState === "2")"#
        );
    }

    #[test]
    fn test_evaluate_simple_word() {
        let p = pred("LOADING");
        assert!(p.evaluate(Some("LOADING")));
        assert!(!p.evaluate(Some("READY")));
        assert!(!p.evaluate(None));
    }

    #[test]
    fn test_evaluate_matches_translation() {
        let p = pred("A && !B");
        for state in [Some("A"), Some("B"), Some("C"), None] {
            let expected = state == Some("A") && !(state == Some("B"));
            assert_eq!(p.evaluate(state), expected, "state {state:?}");
        }
    }

    #[test]
    fn test_precedence_and_binds_tighter() {
        let p = pred("A || B && C");
        assert!(p.evaluate(Some("A")));
        assert!(!p.evaluate(Some("B")));

        let grouped = pred("(A || B) && !C");
        assert!(grouped.evaluate(Some("B")));
        assert!(!grouped.evaluate(Some("C")));
    }

    #[test]
    fn test_equality_operators() {
        // Both sides are state tests, so `A != B` holds in A or B
        let ne = pred("A != B");
        assert!(ne.is_well_formed());
        assert!(ne.evaluate(Some("A")));
        assert!(ne.evaluate(Some("B")));
        assert!(!ne.evaluate(Some("C")));

        let eq = pred("A === B");
        assert!(!eq.evaluate(Some("A")));
        assert!(eq.evaluate(Some("C")));

        // Looser than `!`, tighter than `&&`
        let mixed = pred("!A == B && C || D");
        assert!(mixed.evaluate(Some("D")));
        assert!(!mixed.evaluate(Some("C")));
        assert_eq!(pred("A !== B").evaluate(Some("A")), ne.evaluate(Some("A")));
    }

    #[test]
    fn test_double_negation() {
        let p = pred("!!READY");
        assert!(p.evaluate(Some("READY")));
        assert!(!p.evaluate(Some("LOADING")));
    }

    #[test]
    fn test_flag_names_are_state_tests() {
        // `isLoading` is compared with the active state, not another flag's value
        let p = pred("isLoading || READY");
        assert!(p.evaluate(Some("isLoading")));
        assert!(!p.evaluate(Some("LOADING")));
    }

    #[test]
    fn test_missing_statement_is_false() {
        let p = Predicate::compile(None, DEFAULT_STATE_FIELD);
        assert!(p.is_well_formed());
        assert!(!p.evaluate(Some("anything")));
        assert_eq!(p.translated(), "false");

        let blank = pred("   ");
        assert!(blank.is_well_formed());
        assert_eq!(blank.source(), Some("   "));
        assert!(!blank.evaluate(None));
    }

    #[test]
    fn test_malformed_statements_evaluate_false() {
        for statement in ["A &&", "A & B", "(A", "A)", "A B", "save-2", "A = B", "A ==", "&& A"] {
            let p = pred(statement);
            assert!(!p.is_well_formed(), "{statement:?} should be malformed");
            assert!(!p.evaluate(Some("A")));
        }
    }

    #[test]
    fn test_syntax_errors_carry_offsets() {
        assert_eq!(
            pred("A - B").syntax_error(),
            Some(&ExpressionError::UnexpectedChar { ch: '-', offset: 2 })
        );
        assert_eq!(
            pred("A B").syntax_error(),
            Some(&ExpressionError::UnexpectedToken {
                token: "B".to_string(),
                offset: 2
            })
        );
        assert_eq!(pred("!").syntax_error(), Some(&ExpressionError::UnexpectedEnd));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}A{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(pred(&deep).syntax_error(), Some(&ExpressionError::TooDeep));

        let ok = format!("{}A{}", "(".repeat(10), ")".repeat(10));
        assert!(pred(&ok).evaluate(Some("A")));
    }

    #[test]
    fn test_custom_state_field() {
        let p = Predicate::compile(Some("EDIT"), "mode");
        assert_eq!(p.state_field(), "mode");
        assert_eq!(p.translated(), r#"(mode === "EDIT")"#);
    }
}
