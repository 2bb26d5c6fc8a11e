//! Lexer for shell input
//!
//! The lexer turns raw input into a stream of tokens, tracking nesting depth
//! inside expansions and quotes. It handles:
//! - Operators (greedy longest-match: 3 chars before 2 before 1)
//! - Keywords, recognized only at command position
//! - Words, emitted as fine-grained adjacent tokens that the parser merges
//! - `;;` vs `;` disambiguation inside case bodies
//! - Here-document body collection
//!
//! Brace expansion runs as a preprocessing pass over the literal text before
//! tokenization (see [`crate::parser::brace`]).

use std::collections::HashMap;
use thiserror::Error;

use crate::parser::brace::preprocess_braces;

/// Quote discipline attached to a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteType {
    #[default]
    None,
    Single,
    Double,
    AnsiC,
}

/// The closed set of token kinds shared by the lexer and parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Word,
    String,
    Variable,
    CommandSub,
    ArithExpansion,
    ParamExpansion,
    ProcessSubIn,
    ProcessSubOut,
    Assign,
    PlusAssign,
    Pipe,
    AndAnd,
    OrOr,
    Ampersand,
    Semicolon,
    DoubleSemicolon,
    SemicolonAmp,
    AmpSemicolon,
    Newline,
    RedirectIn,
    RedirectOut,
    RedirectAppend,
    Heredoc,
    HeredocStrip,
    HerestringIn,
    RedirectDupOut,
    RedirectDupIn,
    RedirectClobber,
    RedirectRW,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleLParen,
    DoubleRParen,
    DoubleLBracket,
    DoubleRBracket,
    If,
    Then,
    Else,
    Elif,
    Fi,
    While,
    Until,
    Do,
    Done,
    For,
    In,
    Case,
    Esac,
    Select,
    Function,
    Break,
    Continue,
    Return,
    Eof,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word => "WORD",
            Self::String => "STRING",
            Self::Variable => "VARIABLE",
            Self::CommandSub => "COMMAND_SUB",
            Self::ArithExpansion => "ARITH_EXPANSION",
            Self::ParamExpansion => "PARAM_EXPANSION",
            Self::ProcessSubIn => "PROCESS_SUB_IN",
            Self::ProcessSubOut => "PROCESS_SUB_OUT",
            Self::Assign => "ASSIGN",
            Self::PlusAssign => "PLUS_ASSIGN",
            Self::Pipe => "|",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Ampersand => "&",
            Self::Semicolon => ";",
            Self::DoubleSemicolon => ";;",
            Self::SemicolonAmp => ";&",
            Self::AmpSemicolon => ";;&",
            Self::Newline => "NEWLINE",
            Self::RedirectIn => "<",
            Self::RedirectOut => ">",
            Self::RedirectAppend => ">>",
            Self::Heredoc => "<<",
            Self::HeredocStrip => "<<-",
            Self::HerestringIn => "<<<",
            Self::RedirectDupOut => ">&",
            Self::RedirectDupIn => "<&",
            Self::RedirectClobber => ">|",
            Self::RedirectRW => "<>",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::DoubleLParen => "((",
            Self::DoubleRParen => "))",
            Self::DoubleLBracket => "[[",
            Self::DoubleRBracket => "]]",
            Self::If => "if",
            Self::Then => "then",
            Self::Else => "else",
            Self::Elif => "elif",
            Self::Fi => "fi",
            Self::While => "while",
            Self::Until => "until",
            Self::Do => "do",
            Self::Done => "done",
            Self::For => "for",
            Self::In => "in",
            Self::Case => "case",
            Self::Esac => "esac",
            Self::Select => "select",
            Self::Function => "function",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::Eof => "EOF",
        }
    }

    /// True for kinds that can form part of an argument word.
    pub fn is_word_like(&self) -> bool {
        matches!(
            self,
            Self::Word
                | Self::String
                | Self::Variable
                | Self::CommandSub
                | Self::ArithExpansion
                | Self::ParamExpansion
                | Self::ProcessSubIn
                | Self::ProcessSubOut
                | Self::Assign
                | Self::PlusAssign
        )
    }

    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            Self::RedirectIn
                | Self::RedirectOut
                | Self::RedirectAppend
                | Self::Heredoc
                | Self::HeredocStrip
                | Self::HerestringIn
                | Self::RedirectDupOut
                | Self::RedirectDupIn
                | Self::RedirectClobber
                | Self::RedirectRW
        )
    }
}

/// A token produced by the lexer.
///
/// `value` holds normalized content: for a `String` token the inner text
/// without the surrounding quotes, for `Variable` the name without `$`, for
/// `ParamExpansion`/`CommandSub`/`ArithExpansion` the text between the
/// delimiters. Composites (adjacent tokens with `end == next.start`) are
/// merged back into a single argument by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenType,
    pub value: String,
    pub quote: QuoteType,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(
        kind: TokenType,
        value: impl Into<String>,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            kind,
            value: value.into(),
            quote: QuoteType::None,
            start,
            end,
            line,
            column,
        }
    }

    pub fn with_quote(mut self, quote: QuoteType) -> Self {
        self.quote = quote;
        self
    }
}

/// Tokenization failure. All variants abort the current input unit.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unexpected EOF while looking for matching `{0}'")]
    UnclosedQuote(char, usize),
    #[error("unexpected EOF while looking for matching `{0}'")]
    UnclosedExpansion(char, usize),
    #[error("here-document delimited by end-of-file (wanted `{0}')")]
    UnterminatedHeredoc(String),
    #[error("invalid escape sequence")]
    InvalidEscape(usize),
}

impl LexError {
    pub fn position(&self) -> usize {
        match self {
            Self::UnclosedQuote(_, p) | Self::UnclosedExpansion(_, p) | Self::InvalidEscape(p) => {
                *p
            }
            Self::UnterminatedHeredoc(_) => 0,
        }
    }
}

/// Here-document body captured during tokenization, keyed by the byte offset
/// of the `<<`/`<<-` operator token.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeredoc {
    pub delimiter: String,
    pub quoted: bool,
    pub strip_tabs: bool,
    pub body: String,
}

pub type HeredocMap = HashMap<usize, RawHeredoc>;

/// Nesting and position state the lexer threads through recognition.
#[derive(Debug, Clone, Default)]
pub struct LexerContext {
    pub paren_depth: usize,
    pub bracket_depth: usize,
    pub brace_depth: usize,
    pub in_single_quote: bool,
    pub in_double_quote: bool,
    pub in_arith: bool,
    pub in_cmd_sub: bool,
    pub at_command_position: bool,
    pub in_array_subscript: bool,
}

#[derive(Debug, Clone)]
struct PendingHeredoc {
    key: usize,
    delimiter: String,
    quoted: bool,
    strip_tabs: bool,
}

lazy_static::lazy_static! {
    /// Reserved words, recognized only at command position.
    static ref RESERVED_WORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("if", TokenType::If);
        m.insert("then", TokenType::Then);
        m.insert("else", TokenType::Else);
        m.insert("elif", TokenType::Elif);
        m.insert("fi", TokenType::Fi);
        m.insert("while", TokenType::While);
        m.insert("until", TokenType::Until);
        m.insert("do", TokenType::Do);
        m.insert("done", TokenType::Done);
        m.insert("for", TokenType::For);
        m.insert("in", TokenType::In);
        m.insert("case", TokenType::Case);
        m.insert("esac", TokenType::Esac);
        m.insert("select", TokenType::Select);
        m.insert("function", TokenType::Function);
        m.insert("break", TokenType::Break);
        m.insert("continue", TokenType::Continue);
        m.insert("return", TokenType::Return);
        m
    };
}

/// Check if a string is a valid variable name.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Characters that terminate an unquoted word.
fn is_word_boundary(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')' | '<' | '>')
}

type CanRecognizeFn = fn(&Lexer) -> bool;
type RecognizeFn = fn(&mut Lexer) -> Result<(), LexError>;

/// Prioritized recognizer registry: process-substitution before operators
/// before words. Comments and whitespace are consumed by the main loop.
const RECOGNIZERS: &[(CanRecognizeFn, RecognizeFn)] = &[
    (Lexer::can_process_sub, Lexer::recognize_process_sub),
    (Lexer::can_operator, Lexer::recognize_operator),
    (Lexer::can_word, Lexer::recognize_word),
];

/// The lexer.
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    ctx: LexerContext,
    pending_heredocs: Vec<PendingHeredoc>,
    heredocs: HeredocMap,
    /// `case` nesting depth; `;;` is DoubleSemicolon only when > 0.
    case_depth: usize,
    /// Set after `for`/`select` so `((` starts arithmetic capture there too.
    after_for: bool,
    /// Inside `[[ ... ]]`, where `<` and `>` are comparison words.
    in_dbrack: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let expanded = preprocess_braces(input);
        Self {
            input: expanded.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            ctx: LexerContext {
                at_command_position: true,
                ..Default::default()
            },
            pending_heredocs: Vec::new(),
            heredocs: HashMap::new(),
            case_depth: 0,
            after_for: false,
            in_dbrack: false,
        }
    }

    /// Tokenize the entire input.
    pub fn tokenize(self) -> Result<Vec<Token>, LexError> {
        self.tokenize_with_heredocs().map(|(tokens, _)| tokens)
    }

    /// Tokenize and additionally return collected here-document bodies.
    pub fn tokenize_with_heredocs(mut self) -> Result<(Vec<Token>, HeredocMap), LexError> {
        while self.pos < self.input.len() {
            self.skip_blanks();
            let Some(c) = self.current() else { break };

            // Comments run to end of line and produce no token.
            if c == '#' && self.at_word_start() {
                while let Some(c) = self.current() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }

            let mut matched = false;
            for (can, run) in RECOGNIZERS {
                if can(&self) {
                    run(&mut self)?;
                    matched = true;
                    break;
                }
            }
            if !matched {
                // Defensive: consume one char as a bare word to guarantee progress.
                let start = self.pos;
                let (line, column) = (self.line, self.column);
                let c = self.bump().unwrap();
                self.push_token(Token::new(
                    TokenType::Word,
                    c.to_string(),
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
        }

        if let Some(pending) = self.pending_heredocs.first() {
            return Err(LexError::UnterminatedHeredoc(pending.delimiter.clone()));
        }

        self.tokens.push(Token::new(
            TokenType::Eof,
            "",
            self.pos,
            self.pos,
            self.line,
            self.column,
        ));
        Ok((self.tokens, self.heredocs))
    }

    // =========================================================================
    // CURSOR HELPERS
    // =========================================================================

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.current();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn skip_blanks(&mut self) {
        while let Some(c) = self.current() {
            match c {
                ' ' | '\t' => {
                    self.bump();
                }
                '\\' if self.peek(1) == Some('\n') => {
                    // Line continuation
                    self.bump();
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn at_word_start(&self) -> bool {
        if self.pos == 0 {
            return true;
        }
        matches!(
            self.input.get(self.pos - 1),
            Some(' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')')
        )
    }

    fn push_token(&mut self, token: Token) {
        self.ctx.at_command_position = matches!(
            token.kind,
            TokenType::Newline
                | TokenType::Semicolon
                | TokenType::DoubleSemicolon
                | TokenType::SemicolonAmp
                | TokenType::AmpSemicolon
                | TokenType::Ampersand
                | TokenType::AndAnd
                | TokenType::OrOr
                | TokenType::Pipe
                | TokenType::LParen
                | TokenType::LBrace
                | TokenType::If
                | TokenType::Then
                | TokenType::Else
                | TokenType::Elif
                | TokenType::While
                | TokenType::Until
                | TokenType::Do
        );
        self.after_for = matches!(token.kind, TokenType::For | TokenType::Select);
        self.tokens.push(token);
    }

    // =========================================================================
    // PROCESS SUBSTITUTION
    // =========================================================================

    fn can_process_sub(&self) -> bool {
        !self.in_dbrack
            && matches!(self.current(), Some('<') | Some('>'))
            && self.peek(1) == Some('(')
    }

    fn recognize_process_sub(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let kind = if self.current() == Some('<') {
            TokenType::ProcessSubIn
        } else {
            TokenType::ProcessSubOut
        };
        self.bump_n(2);
        let inner = self.consume_balanced_parens(start)?;
        self.push_token(Token::new(kind, inner, start, self.pos, line, column));
        Ok(())
    }

    // =========================================================================
    // OPERATORS
    // =========================================================================

    fn can_operator(&self) -> bool {
        let Some(c) = self.current() else { return false };
        match c {
            '\n' | ';' | '&' | '|' | '(' | ')' => true,
            '<' | '>' => !self.in_dbrack,
            '{' => matches!(self.peek(1), Some(' ' | '\t' | '\n') | None),
            '}' => {
                self.ctx.at_command_position
                    && (self.peek(1).is_none()
                        || matches!(self.peek(1), Some(c2) if is_word_boundary(c2)))
            }
            '[' => {
                self.peek(1) == Some('[')
                    && self.ctx.at_command_position
                    && matches!(self.peek(2), Some(c2) if c2 == ' ' || c2 == '\t' || c2 == '\n')
            }
            ']' => self.in_dbrack && self.peek(1) == Some(']'),
            _ => false,
        }
    }

    fn recognize_operator(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let c0 = self.current().unwrap();
        let c1 = self.peek(1);
        let c2 = self.peek(2);

        macro_rules! op {
            ($n:expr, $kind:expr, $text:expr) => {{
                self.bump_n($n);
                self.push_token(Token::new($kind, $text, start, self.pos, line, column));
                return Ok(());
            }};
        }

        match c0 {
            '\n' => {
                self.bump();
                self.push_token(Token::new(
                    TokenType::Newline,
                    "\n",
                    start,
                    self.pos,
                    line,
                    column,
                ));
                self.collect_pending_heredocs()?;
                return Ok(());
            }
            ';' => {
                if self.case_depth > 0 {
                    if c1 == Some(';') && c2 == Some('&') {
                        op!(3, TokenType::AmpSemicolon, ";;&");
                    }
                    if c1 == Some(';') {
                        op!(2, TokenType::DoubleSemicolon, ";;");
                    }
                    if c1 == Some('&') {
                        op!(2, TokenType::SemicolonAmp, ";&");
                    }
                }
                op!(1, TokenType::Semicolon, ";");
            }
            '&' => {
                if c1 == Some('&') {
                    op!(2, TokenType::AndAnd, "&&");
                }
                op!(1, TokenType::Ampersand, "&");
            }
            '|' => {
                if c1 == Some('|') {
                    op!(2, TokenType::OrOr, "||");
                }
                op!(1, TokenType::Pipe, "|");
            }
            '<' => {
                if c1 == Some('<') && c2 == Some('<') {
                    op!(3, TokenType::HerestringIn, "<<<");
                }
                if c1 == Some('<') && c2 == Some('-') {
                    self.bump_n(3);
                    self.register_heredoc(start, true);
                    self.push_token(Token::new(
                        TokenType::HeredocStrip,
                        "<<-",
                        start,
                        self.pos,
                        line,
                        column,
                    ));
                    return Ok(());
                }
                if c1 == Some('<') {
                    self.bump_n(2);
                    self.register_heredoc(start, false);
                    self.push_token(Token::new(
                        TokenType::Heredoc,
                        "<<",
                        start,
                        self.pos,
                        line,
                        column,
                    ));
                    return Ok(());
                }
                if c1 == Some('&') {
                    op!(2, TokenType::RedirectDupIn, "<&");
                }
                if c1 == Some('>') {
                    op!(2, TokenType::RedirectRW, "<>");
                }
                op!(1, TokenType::RedirectIn, "<");
            }
            '>' => {
                if c1 == Some('>') {
                    op!(2, TokenType::RedirectAppend, ">>");
                }
                if c1 == Some('&') {
                    op!(2, TokenType::RedirectDupOut, ">&");
                }
                if c1 == Some('|') {
                    op!(2, TokenType::RedirectClobber, ">|");
                }
                op!(1, TokenType::RedirectOut, ">");
            }
            '(' => {
                if c1 == Some('(') && (self.ctx.at_command_position || self.after_for) {
                    return self.recognize_arith_command(start, line, column);
                }
                self.ctx.paren_depth += 1;
                op!(1, TokenType::LParen, "(");
            }
            ')' => {
                self.ctx.paren_depth = self.ctx.paren_depth.saturating_sub(1);
                op!(1, TokenType::RParen, ")");
            }
            '{' => {
                self.ctx.brace_depth += 1;
                op!(1, TokenType::LBrace, "{");
            }
            '}' => {
                self.ctx.brace_depth = self.ctx.brace_depth.saturating_sub(1);
                op!(1, TokenType::RBrace, "}");
            }
            '[' => {
                self.in_dbrack = true;
                op!(2, TokenType::DoubleLBracket, "[[");
            }
            ']' => {
                self.in_dbrack = false;
                op!(2, TokenType::DoubleRBracket, "]]");
            }
            _ => unreachable!("can_operator admitted {c0:?}"),
        }
    }

    /// `(( expr ))` at command position: emit `((`, the raw expression text
    /// as a single word, and `))`. The closing `))` is located by counting
    /// matching parenthesis pairs.
    fn recognize_arith_command(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<(), LexError> {
        self.bump_n(2);
        self.push_token(Token::new(
            TokenType::DoubleLParen,
            "((",
            start,
            self.pos,
            line,
            column,
        ));

        let expr_start = self.pos;
        let (expr_line, expr_column) = (self.line, self.column);
        let mut depth: usize = 0;
        let mut value = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(LexError::UnclosedExpansion(')', start));
            };
            if c == '(' {
                depth += 1;
            } else if c == ')' {
                if depth == 0 && self.peek(1) == Some(')') {
                    break;
                }
                if depth == 0 {
                    return Err(LexError::UnclosedExpansion(')', start));
                }
                depth -= 1;
            }
            value.push(c);
            self.bump();
        }
        self.tokens.push(
            Token::new(
                TokenType::Word,
                value,
                expr_start,
                self.pos,
                expr_line,
                expr_column,
            ),
        );

        let close_start = self.pos;
        let (cl, cc) = (self.line, self.column);
        self.bump_n(2);
        self.push_token(Token::new(
            TokenType::DoubleRParen,
            "))",
            close_start,
            self.pos,
            cl,
            cc,
        ));
        Ok(())
    }

    // =========================================================================
    // HEREDOCS
    // =========================================================================

    /// Look ahead (without consuming) for the delimiter word following a
    /// heredoc operator and queue the body for collection at the next newline.
    fn register_heredoc(&mut self, key: usize, strip_tabs: bool) {
        let mut i = self.pos;
        while matches!(self.input.get(i), Some(' ' | '\t')) {
            i += 1;
        }
        let mut delimiter = String::new();
        let mut quoted = false;
        while let Some(&c) = self.input.get(i) {
            match c {
                '\'' | '"' => {
                    quoted = true;
                    let quote = c;
                    i += 1;
                    while let Some(&c2) = self.input.get(i) {
                        if c2 == quote {
                            break;
                        }
                        delimiter.push(c2);
                        i += 1;
                    }
                    i += 1;
                }
                '\\' => {
                    quoted = true;
                    i += 1;
                    if let Some(&c2) = self.input.get(i) {
                        delimiter.push(c2);
                        i += 1;
                    }
                }
                c if is_word_boundary(c) => break,
                c => {
                    delimiter.push(c);
                    i += 1;
                }
            }
        }
        self.pending_heredocs.push(PendingHeredoc {
            key,
            delimiter,
            quoted,
            strip_tabs,
        });
    }

    /// Consume body lines for every queued heredoc, in FIFO order.
    fn collect_pending_heredocs(&mut self) -> Result<(), LexError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in pending {
            let mut body = String::new();
            let mut terminated = false;
            while self.pos < self.input.len() {
                let mut raw_line = String::new();
                while let Some(c) = self.current() {
                    self.bump();
                    if c == '\n' {
                        break;
                    }
                    raw_line.push(c);
                }
                let check = if heredoc.strip_tabs {
                    raw_line.trim_start_matches('\t').to_string()
                } else {
                    raw_line.clone()
                };
                if check == heredoc.delimiter {
                    terminated = true;
                    break;
                }
                if heredoc.strip_tabs {
                    body.push_str(raw_line.trim_start_matches('\t'));
                } else {
                    body.push_str(&raw_line);
                }
                body.push('\n');
            }
            if !terminated {
                return Err(LexError::UnterminatedHeredoc(heredoc.delimiter));
            }
            self.heredocs.insert(
                heredoc.key,
                RawHeredoc {
                    delimiter: heredoc.delimiter,
                    quoted: heredoc.quoted,
                    strip_tabs: heredoc.strip_tabs,
                    body,
                },
            );
        }
        Ok(())
    }

    // =========================================================================
    // WORDS
    // =========================================================================

    fn can_word(&self) -> bool {
        self.current().is_some()
    }

    /// Read one word region, emitting fine-grained adjacent tokens for each
    /// quoted or expandable piece. The parser merges tokens whose spans touch.
    fn recognize_word(&mut self) -> Result<(), LexError> {
        let region_start = self.pos;
        let mut first_piece = true;

        while let Some(c) = self.current() {
            if is_word_boundary(c) && !(self.in_dbrack && matches!(c, '<' | '>')) {
                break;
            }
            // `<`/`>` inside [[ ]] are comparison operator words
            if self.in_dbrack && matches!(c, '<' | '>') {
                if self.pos != region_start {
                    break;
                }
                let start = self.pos;
                let (line, column) = (self.line, self.column);
                self.bump();
                self.push_token(Token::new(
                    TokenType::Word,
                    c.to_string(),
                    start,
                    self.pos,
                    line,
                    column,
                ));
                return Ok(());
            }

            match c {
                '\'' => self.read_single_quoted()?,
                '"' => self.read_double_quoted()?,
                '`' => self.read_backtick()?,
                '$' => self.read_dollar()?,
                _ => {
                    if first_piece {
                        if self.try_read_assignment_prefix() {
                            first_piece = false;
                            // `NAME=(` starts an array literal; stop so the
                            // parser sees the following LParen.
                            if self.current() == Some('(') {
                                return Ok(());
                            }
                            continue;
                        }
                    }
                    self.read_bare_run()?;
                }
            }
            first_piece = false;
        }
        Ok(())
    }

    fn read_single_quoted(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\'') => break,
                Some(c) => value.push(c),
                None => return Err(LexError::UnclosedQuote('\'', start)),
            }
        }
        self.push_token(
            Token::new(TokenType::String, value, start, self.pos, line, column)
                .with_quote(QuoteType::Single),
        );
        Ok(())
    }

    /// Double quotes: `$`-constructs nest, backslash escapes only
    /// `$`, backtick, `"`, `\` and newline. The raw inner text is preserved;
    /// the expansion engine applies the double-quote rules later.
    fn read_double_quoted(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(LexError::UnclosedQuote('"', start));
            };
            match c {
                '"' => {
                    self.bump();
                    break;
                }
                '\\' => {
                    self.bump();
                    match self.current() {
                        Some('\n') => {
                            // Line continuation disappears
                            self.bump();
                        }
                        Some(e) if matches!(e, '$' | '`' | '"' | '\\') => {
                            value.push('\\');
                            value.push(e);
                            self.bump();
                        }
                        Some(e) => {
                            value.push('\\');
                            value.push(e);
                            self.bump();
                        }
                        None => return Err(LexError::UnclosedQuote('"', start)),
                    }
                }
                '$' if self.peek(1) == Some('(') => {
                    value.push('$');
                    self.bump();
                    let inner = self.consume_balanced_parens(start)?;
                    value.push('(');
                    value.push_str(&inner);
                    value.push(')');
                }
                '$' if self.peek(1) == Some('{') => {
                    value.push('$');
                    self.bump();
                    let inner = self.consume_balanced_braces(start)?;
                    value.push('{');
                    value.push_str(&inner);
                    value.push('}');
                }
                '`' => {
                    let inner = self.consume_backtick_raw(start)?;
                    value.push('`');
                    value.push_str(&inner);
                    value.push('`');
                }
                _ => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push_token(
            Token::new(TokenType::String, value, start, self.pos, line, column)
                .with_quote(QuoteType::Double),
        );
        Ok(())
    }

    fn read_backtick(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let inner = self.consume_backtick_raw(start)?;
        self.push_token(Token::new(
            TokenType::CommandSub,
            inner,
            start,
            self.pos,
            line,
            column,
        ));
        Ok(())
    }

    /// Consume a backtick substitution including both backticks; returns the
    /// inner text with `\``, `\\` and `\$` unescaped.
    fn consume_backtick_raw(&mut self, err_pos: usize) -> Result<String, LexError> {
        debug_assert_eq!(self.current(), Some('`'));
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(e) if matches!(e, '`' | '\\' | '$') => value.push(e),
                    Some(e) => {
                        value.push('\\');
                        value.push(e);
                    }
                    None => return Err(LexError::UnclosedExpansion('`', err_pos)),
                },
                Some(c) => value.push(c),
                None => return Err(LexError::UnclosedExpansion('`', err_pos)),
            }
        }
        Ok(value)
    }

    fn read_dollar(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);

        match self.peek(1) {
            Some('\'') => {
                // ANSI-C quoting: raw inner text; escapes processed at expansion
                self.bump_n(2);
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some('\'') => break,
                        Some('\\') => {
                            value.push('\\');
                            match self.bump() {
                                Some(e) => value.push(e),
                                None => return Err(LexError::UnclosedQuote('\'', start)),
                            }
                        }
                        Some(c) => value.push(c),
                        None => return Err(LexError::UnclosedQuote('\'', start)),
                    }
                }
                validate_ansi_c_escapes(&value, start)?;
                self.push_token(
                    Token::new(TokenType::String, value, start, self.pos, line, column)
                        .with_quote(QuoteType::AnsiC),
                );
            }
            Some('(') if self.peek(2) == Some('(') => {
                // $(( ... )) arithmetic expansion
                self.ctx.in_arith = true;
                self.bump_n(3);
                let mut depth: usize = 0;
                let mut value = String::new();
                loop {
                    let Some(c) = self.current() else {
                        self.ctx.in_arith = false;
                        return Err(LexError::UnclosedExpansion(')', start));
                    };
                    if c == '(' {
                        depth += 1;
                    } else if c == ')' {
                        if depth == 0 {
                            if self.peek(1) == Some(')') {
                                break;
                            }
                            self.ctx.in_arith = false;
                            return Err(LexError::UnclosedExpansion(')', start));
                        }
                        depth -= 1;
                    }
                    value.push(c);
                    self.bump();
                }
                self.bump_n(2);
                self.ctx.in_arith = false;
                self.push_token(Token::new(
                    TokenType::ArithExpansion,
                    value,
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
            Some('(') => {
                self.bump();
                let inner = self.consume_balanced_parens(start)?;
                self.push_token(Token::new(
                    TokenType::CommandSub,
                    inner,
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
            Some('{') => {
                self.bump();
                let inner = self.consume_balanced_braces(start)?;
                self.push_token(Token::new(
                    TokenType::ParamExpansion,
                    inner,
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                self.bump();
                let mut name = String::new();
                while let Some(c) = self.current() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.push_token(Token::new(
                    TokenType::Variable,
                    name,
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
            Some(c) if c.is_ascii_digit() || matches!(c, '#' | '?' | '$' | '!' | '@' | '*' | '-') => {
                self.bump_n(2);
                self.push_token(Token::new(
                    TokenType::Variable,
                    c.to_string(),
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
            _ => {
                // Lone dollar is a literal
                self.bump();
                self.push_token(Token::new(
                    TokenType::Word,
                    "$",
                    start,
                    self.pos,
                    line,
                    column,
                ));
            }
        }
        Ok(())
    }

    /// Consume text after `$(` up to the matching `)`, tracking quotes and
    /// `case` patterns so an unmatched `)` in a pattern does not close the
    /// substitution early. The cursor must sit on the `(`.
    fn consume_balanced_parens(&mut self, err_pos: usize) -> Result<String, LexError> {
        debug_assert_eq!(self.current(), Some('('));
        self.ctx.in_cmd_sub = true;
        self.bump();
        let mut depth: usize = 0;
        let mut value = String::new();
        let mut word = String::new();
        let mut case_depth: usize = 0;
        let mut in_case_pattern = false;
        loop {
            let Some(c) = self.current() else {
                self.ctx.in_cmd_sub = false;
                return Err(LexError::UnclosedExpansion(')', err_pos));
            };
            match c {
                '\'' => {
                    value.push(c);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                value.push('\'');
                                break;
                            }
                            Some(c2) => value.push(c2),
                            None => {
                                self.ctx.in_cmd_sub = false;
                                return Err(LexError::UnclosedQuote('\'', err_pos));
                            }
                        }
                    }
                    word.clear();
                }
                '"' => {
                    value.push(c);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('"') => {
                                value.push('"');
                                break;
                            }
                            Some('\\') => {
                                value.push('\\');
                                if let Some(c2) = self.bump() {
                                    value.push(c2);
                                }
                            }
                            Some(c2) => value.push(c2),
                            None => {
                                self.ctx.in_cmd_sub = false;
                                return Err(LexError::UnclosedQuote('"', err_pos));
                            }
                        }
                    }
                    word.clear();
                }
                '\\' => {
                    value.push(c);
                    self.bump();
                    if let Some(c2) = self.bump() {
                        value.push(c2);
                    }
                    word.clear();
                }
                '(' => {
                    depth += 1;
                    value.push(c);
                    self.bump();
                    word.clear();
                }
                ')' => {
                    if in_case_pattern {
                        in_case_pattern = false;
                        value.push(c);
                        self.bump();
                    } else if depth == 0 {
                        self.bump();
                        self.ctx.in_cmd_sub = false;
                        return Ok(value);
                    } else {
                        depth -= 1;
                        value.push(c);
                        self.bump();
                    }
                    word.clear();
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    word.push(c);
                    value.push(c);
                    self.bump();
                }
                _ => {
                    match word.as_str() {
                        "case" => {
                            case_depth += 1;
                            in_case_pattern = false;
                        }
                        "in" if case_depth > 0 => in_case_pattern = true,
                        "esac" if case_depth > 0 => {
                            case_depth -= 1;
                            in_case_pattern = false;
                        }
                        _ => {}
                    }
                    word.clear();
                    if c == ';' && case_depth > 0 && self.peek(1) == Some(';') {
                        in_case_pattern = true;
                    }
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume text after `${` up to the matching `}`. The cursor must sit on
    /// the `{`.
    fn consume_balanced_braces(&mut self, err_pos: usize) -> Result<String, LexError> {
        debug_assert_eq!(self.current(), Some('{'));
        self.bump();
        let mut depth: usize = 0;
        let mut value = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(LexError::UnclosedExpansion('}', err_pos));
            };
            match c {
                '\'' => {
                    value.push(c);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\'') => {
                                value.push('\'');
                                break;
                            }
                            Some(c2) => value.push(c2),
                            None => return Err(LexError::UnclosedQuote('\'', err_pos)),
                        }
                    }
                }
                '"' => {
                    value.push(c);
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('"') => {
                                value.push('"');
                                break;
                            }
                            Some('\\') => {
                                value.push('\\');
                                if let Some(c2) = self.bump() {
                                    value.push(c2);
                                }
                            }
                            Some(c2) => value.push(c2),
                            None => return Err(LexError::UnclosedQuote('"', err_pos)),
                        }
                    }
                }
                '\\' => {
                    value.push(c);
                    self.bump();
                    if let Some(c2) = self.bump() {
                        value.push(c2);
                    }
                }
                '{' => {
                    depth += 1;
                    value.push(c);
                    self.bump();
                }
                '}' => {
                    if depth == 0 {
                        self.bump();
                        return Ok(value);
                    }
                    depth -= 1;
                    value.push(c);
                    self.bump();
                }
                _ => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Try to read `NAME=`, `NAME+=`, or `NAME[sub]=` at a word start,
    /// emitting an Assign/PlusAssign token. Returns false without consuming
    /// anything when the region is not an assignment prefix.
    fn try_read_assignment_prefix(&mut self) -> bool {
        let start = self.pos;
        let (line, column) = (self.line, self.column);

        let Some(c0) = self.current() else { return false };
        if !c0.is_ascii_alphabetic() && c0 != '_' {
            return false;
        }

        let mut i = self.pos;
        while let Some(&c) = self.input.get(i) {
            if c.is_ascii_alphanumeric() || c == '_' {
                i += 1;
            } else {
                break;
            }
        }

        // Optional balanced subscript
        let mut sub_end = i;
        if self.input.get(i) == Some(&'[') {
            self.ctx.in_array_subscript = true;
            self.ctx.bracket_depth = 1;
            let mut j = i + 1;
            while let Some(&c) = self.input.get(j) {
                match c {
                    '[' => self.ctx.bracket_depth += 1,
                    ']' => {
                        self.ctx.bracket_depth -= 1;
                        if self.ctx.bracket_depth == 0 {
                            break;
                        }
                    }
                    '\n' => break,
                    _ => {}
                }
                j += 1;
            }
            self.ctx.in_array_subscript = false;
            if self.input.get(j) == Some(&']') {
                sub_end = j + 1;
            } else {
                return false;
            }
        }

        let (kind, eq_len) = match (self.input.get(sub_end), self.input.get(sub_end + 1)) {
            (Some('='), _) => (TokenType::Assign, 1),
            (Some('+'), Some('=')) => (TokenType::PlusAssign, 2),
            _ => return false,
        };

        let name: String = self.input[start..sub_end].iter().collect();
        self.bump_n(sub_end - start + eq_len);
        self.push_token(Token::new(kind, name, start, self.pos, line, column));
        true
    }

    /// Read a run of bare (unquoted, unexpanded) characters into a Word
    /// token. Backslash escapes are preserved verbatim; quote removal strips
    /// them during expansion.
    fn read_bare_run(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let mut value = String::new();
        while let Some(c) = self.current() {
            if is_word_boundary(c) && !(self.in_dbrack && matches!(c, '<' | '>')) {
                break;
            }
            match c {
                '\'' | '"' | '`' | '$' => break,
                '<' | '>' if self.in_dbrack => break,
                '\\' => {
                    self.bump();
                    match self.current() {
                        Some('\n') => {
                            self.bump(); // line continuation
                        }
                        Some(e) => {
                            value.push('\\');
                            value.push(e);
                            self.bump();
                        }
                        None => value.push('\\'),
                    }
                }
                '[' => {
                    // Array subscripts ride along inside the word
                    value.push(c);
                    self.bump();
                }
                _ => {
                    value.push(c);
                    self.bump();
                }
            }
        }

        if value.is_empty() {
            return Ok(());
        }

        // Keyword normalization: reserved words only at command position.
        if self.ctx.at_command_position && self.pos_is_region_end() {
            if let Some(&kind) = RESERVED_WORDS.get(value.as_str()) {
                if self.tokens.last().map(|t| t.end) != Some(start) {
                    if kind == TokenType::Case {
                        self.case_depth += 1;
                    }
                    if kind == TokenType::Esac {
                        self.case_depth = self.case_depth.saturating_sub(1);
                    }
                    self.push_token(Token::new(kind, value, start, self.pos, line, column));
                    return Ok(());
                }
            }
        }
        // `esac`/`in` may appear off command position
        if self.tokens.last().map(|t| t.end) != Some(start) && self.pos_is_region_end() {
            if value == "esac" && self.case_depth > 0 {
                self.case_depth -= 1;
                self.push_token(Token::new(
                    TokenType::Esac,
                    value,
                    start,
                    self.pos,
                    line,
                    column,
                ));
                return Ok(());
            }
        }

        self.push_token(Token::new(
            TokenType::Word,
            value,
            start,
            self.pos,
            line,
            column,
        ));
        Ok(())
    }

    /// True when the cursor sits at the end of the current word region.
    fn pos_is_region_end(&self) -> bool {
        match self.current() {
            None => true,
            Some(c) => is_word_boundary(c),
        }
    }
}

/// Validate the C-style escapes in an ANSI-C quoted string.
fn validate_ansi_c_escapes(s: &str, pos: usize) -> Result<(), LexError> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() {
            match chars[i + 1] {
                'u' | 'U' => {
                    if !matches!(chars.get(i + 2), Some(c) if c.is_ascii_hexdigit()) {
                        return Err(LexError::InvalidEscape(pos));
                    }
                }
                'x' => {
                    if !matches!(chars.get(i + 2), Some(c) if c.is_ascii_hexdigit()) {
                        return Err(LexError::InvalidEscape(pos));
                    }
                }
                _ => {}
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).tokenize().expect("lex failure")
    }

    fn kinds(input: &str) -> Vec<TokenType> {
        lex(input).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_command() {
        let tokens = lex("echo hello world");
        assert_eq!(
            tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenType::Word,
                TokenType::Word,
                TokenType::Word,
                TokenType::Eof
            ]
        );
        assert_eq!(tokens[0].value, "echo");
        assert_eq!(tokens[2].value, "world");
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a && b || c | d"),
            vec![
                TokenType::Word,
                TokenType::AndAnd,
                TokenType::Word,
                TokenType::OrOr,
                TokenType::Word,
                TokenType::Pipe,
                TokenType::Word,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_redirect_operators() {
        assert_eq!(
            kinds("a > f >> g < h 2>&1"),
            vec![
                TokenType::Word,
                TokenType::RedirectOut,
                TokenType::Word,
                TokenType::RedirectAppend,
                TokenType::Word,
                TokenType::RedirectIn,
                TokenType::Word,
                TokenType::Word,
                TokenType::RedirectDupOut,
                TokenType::Word,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_fd_prefix_is_adjacent() {
        let tokens = lex("echo 2>&1");
        // "2" must touch ">&" so the parser can see the fd prefix
        assert_eq!(tokens[1].value, "2");
        assert_eq!(tokens[1].end, tokens[2].start);
    }

    #[test]
    fn test_single_quotes_are_literal() {
        let tokens = lex("echo '$HOME'");
        assert_eq!(tokens[1].kind, TokenType::String);
        assert_eq!(tokens[1].quote, QuoteType::Single);
        assert_eq!(tokens[1].value, "$HOME");
    }

    #[test]
    fn test_double_quotes_keep_inner_text() {
        let tokens = lex(r#"echo "a $b c""#);
        assert_eq!(tokens[1].kind, TokenType::String);
        assert_eq!(tokens[1].quote, QuoteType::Double);
        assert_eq!(tokens[1].value, "a $b c");
    }

    #[test]
    fn test_ansi_c_quote() {
        let tokens = lex(r"echo $'a\tb'");
        assert_eq!(tokens[1].quote, QuoteType::AnsiC);
        assert_eq!(tokens[1].value, r"a\tb");
    }

    #[test]
    fn test_variable_token() {
        let tokens = lex("echo $HOME $? $1");
        assert_eq!(tokens[1].kind, TokenType::Variable);
        assert_eq!(tokens[1].value, "HOME");
        assert_eq!(tokens[2].value, "?");
        assert_eq!(tokens[3].value, "1");
    }

    #[test]
    fn test_param_expansion_token() {
        let tokens = lex("echo ${X:-default}");
        assert_eq!(tokens[1].kind, TokenType::ParamExpansion);
        assert_eq!(tokens[1].value, "X:-default");
    }

    #[test]
    fn test_command_sub_nested_parens() {
        let tokens = lex("echo $(echo (ignored))");
        assert_eq!(tokens[1].kind, TokenType::CommandSub);
        assert_eq!(tokens[1].value, "echo (ignored)");
    }

    #[test]
    fn test_command_sub_with_case() {
        let tokens = lex("echo $(case x in a) echo hi;; esac)");
        assert_eq!(tokens[1].kind, TokenType::CommandSub);
        assert_eq!(tokens[1].value, "case x in a) echo hi;; esac");
    }

    #[test]
    fn test_arith_expansion_token() {
        let tokens = lex("echo $((1 + (2 * 3)))");
        assert_eq!(tokens[1].kind, TokenType::ArithExpansion);
        assert_eq!(tokens[1].value, "1 + (2 * 3)");
    }

    #[test]
    fn test_backtick_command_sub() {
        let tokens = lex("echo `date`");
        assert_eq!(tokens[1].kind, TokenType::CommandSub);
        assert_eq!(tokens[1].value, "date");
    }

    #[test]
    fn test_adjacent_tokens_share_boundary() {
        let tokens = lex(r#"echo a"b"$c"#);
        assert_eq!(tokens[1].kind, TokenType::Word);
        assert_eq!(tokens[2].kind, TokenType::String);
        assert_eq!(tokens[3].kind, TokenType::Variable);
        assert_eq!(tokens[1].end, tokens[2].start);
        assert_eq!(tokens[2].end, tokens[3].start);
    }

    #[test]
    fn test_keyword_only_at_command_position() {
        let tokens = lex("if true; then echo if; fi");
        assert_eq!(tokens[0].kind, TokenType::If);
        // "if" as an argument to echo is a plain word
        let arg = tokens.iter().filter(|t| t.value == "if").nth(1).unwrap();
        assert_eq!(arg.kind, TokenType::Word);
        assert!(tokens.iter().any(|t| t.kind == TokenType::Fi));
    }

    #[test]
    fn test_double_semicolon_only_in_case() {
        // Outside a case body, `;;` is two separate semicolons
        assert_eq!(
            kinds("a ;; b"),
            vec![
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::Semicolon,
                TokenType::Word,
                TokenType::Eof
            ]
        );
        let tokens = lex("case x in a) echo hi;; esac");
        assert!(tokens.iter().any(|t| t.kind == TokenType::DoubleSemicolon));
    }

    #[test]
    fn test_assignment_token() {
        let tokens = lex("X=1 echo");
        assert_eq!(tokens[0].kind, TokenType::Assign);
        assert_eq!(tokens[0].value, "X");
        assert_eq!(tokens[1].kind, TokenType::Word);
        assert_eq!(tokens[1].value, "1");
        // value is adjacent to the assignment prefix
        assert_eq!(tokens[0].end, tokens[1].start);
    }

    #[test]
    fn test_plus_assignment() {
        let tokens = lex("X+=abc");
        assert_eq!(tokens[0].kind, TokenType::PlusAssign);
        assert_eq!(tokens[0].value, "X");
        assert_eq!(tokens[1].value, "abc");
    }

    #[test]
    fn test_subscript_assignment() {
        let tokens = lex("arr[2]=x");
        assert_eq!(tokens[0].kind, TokenType::Assign);
        assert_eq!(tokens[0].value, "arr[2]");
    }

    #[test]
    fn test_array_literal_assignment() {
        assert_eq!(
            kinds("arr=(a b)"),
            vec![
                TokenType::Assign,
                TokenType::LParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::RParen,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_heredoc_collection() {
        let (tokens, heredocs) = Lexer::new("cat <<EOF\nhello\nworld\nEOF\n")
            .tokenize_with_heredocs()
            .unwrap();
        let op = tokens.iter().find(|t| t.kind == TokenType::Heredoc).unwrap();
        let body = &heredocs[&op.start];
        assert_eq!(body.body, "hello\nworld\n");
        assert!(!body.quoted);
    }

    #[test]
    fn test_heredoc_quoted_delimiter() {
        let (tokens, heredocs) = Lexer::new("cat <<'EOF'\n$X\nEOF\n")
            .tokenize_with_heredocs()
            .unwrap();
        let op = tokens.iter().find(|t| t.kind == TokenType::Heredoc).unwrap();
        assert!(heredocs[&op.start].quoted);
        assert_eq!(heredocs[&op.start].body, "$X\n");
    }

    #[test]
    fn test_heredoc_strip_tabs() {
        let (tokens, heredocs) = Lexer::new("cat <<-EOF\n\t\tindented\n\tEOF\n")
            .tokenize_with_heredocs()
            .unwrap();
        let op = tokens
            .iter()
            .find(|t| t.kind == TokenType::HeredocStrip)
            .unwrap();
        assert_eq!(heredocs[&op.start].body, "indented\n");
    }

    #[test]
    fn test_unterminated_heredoc() {
        let err = Lexer::new("cat <<EOF\nhello\n").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnterminatedHeredoc(d) if d == "EOF"));
    }

    #[test]
    fn test_unclosed_quote_error() {
        let err = Lexer::new("echo 'oops").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnclosedQuote('\'', _)));
    }

    #[test]
    fn test_unclosed_expansion_error() {
        let err = Lexer::new("echo $(true").tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnclosedExpansion(_, _)));
    }

    #[test]
    fn test_process_substitution() {
        let tokens = lex("diff <(sort a) >(tee log)");
        assert_eq!(tokens[1].kind, TokenType::ProcessSubIn);
        assert_eq!(tokens[1].value, "sort a");
        assert_eq!(tokens[2].kind, TokenType::ProcessSubOut);
        assert_eq!(tokens[2].value, "tee log");
    }

    #[test]
    fn test_arith_command() {
        assert_eq!(
            kinds("(( x + 1 ))"),
            vec![
                TokenType::DoubleLParen,
                TokenType::Word,
                TokenType::DoubleRParen,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_dbrack_tokens() {
        let tokens = lex("[[ $a < $b ]]");
        assert_eq!(tokens[0].kind, TokenType::DoubleLBracket);
        assert_eq!(tokens[2].kind, TokenType::Word);
        assert_eq!(tokens[2].value, "<");
        assert_eq!(tokens[4].kind, TokenType::DoubleRBracket);
    }

    #[test]
    fn test_subshell_vs_arith() {
        assert_eq!(
            kinds("(echo hi)"),
            vec![
                TokenType::LParen,
                TokenType::Word,
                TokenType::Word,
                TokenType::RParen,
                TokenType::Eof
            ]
        );
        assert_eq!(kinds("((1 + 2))")[0], TokenType::DoubleLParen);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("echo hi # a comment\necho bye"),
            vec![
                TokenType::Word,
                TokenType::Word,
                TokenType::Newline,
                TokenType::Word,
                TokenType::Word,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_brace_group_tokens() {
        assert_eq!(
            kinds("{ echo hi; }"),
            vec![
                TokenType::LBrace,
                TokenType::Word,
                TokenType::Word,
                TokenType::Semicolon,
                TokenType::RBrace,
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_brace_expansion_preprocessing() {
        let tokens = lex("echo {a,b,c}");
        let words: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenType::Word)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(words, vec!["echo", "a", "b", "c"]);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(
            kinds("echo a \\\n b"),
            vec![TokenType::Word, TokenType::Word, TokenType::Word, TokenType::Eof]
        );
    }

    #[test]
    fn test_escaped_glob_char_preserved() {
        let tokens = lex(r"echo \*");
        assert_eq!(tokens[1].value, r"\*");
    }
}
