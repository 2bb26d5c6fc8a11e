//! Recursive Descent Parser
//!
//! Consumes tokens from the lexer and produces an AST.
//!
//! Grammar (simplified):
//!   program      ::= (function_def | statement)*
//!   statement    ::= and_or_list
//!   and_or_list  ::= pipeline (('&&' | '||') pipeline)*
//!   pipeline     ::= ['!'] command ('|' command)* ['&']
//!   command      ::= simple_command | compound_command
//!   simple_cmd   ::= (assignment | redirect | word)+ redirect*
//!   compound_cmd ::= subshell | group | if | while | until | for | case
//!                  | select | (( )) | [[ ]]
//!
//! Adjacent word-like tokens (sharing a span boundary) are merged into a
//! single argument here; the lexer emits them fine-grained.

use crate::ast::types::{
    AndOrListNode, AndOrOperator, ArrayAssignmentNode, CommandNode, FunctionDefNode, HeredocBody,
    PipelineNode, ProgramItem, ProgramNode, RedirectKind, RedirectNode, SimpleCommandNode,
    StatementNode, WordItem,
};
use crate::parser::lexer::{HeredocMap, Lexer, QuoteType, Token, TokenType};
use crate::parser::types::{
    is_sync_point, ErrorMode, ParseErrorCode, ParseException, MAX_INPUT_SIZE, MAX_PARSER_DEPTH,
    MAX_TOKENS,
};

/// Rebuild the source form of a token so merged composites can be re-scanned
/// by the expansion engine.
pub fn rebuild_token_text(t: &Token) -> String {
    match t.kind {
        TokenType::String => match t.quote {
            QuoteType::Single => format!("'{}'", t.value),
            QuoteType::Double => format!("\"{}\"", t.value),
            QuoteType::AnsiC => format!("$'{}'", t.value),
            QuoteType::None => t.value.clone(),
        },
        TokenType::Variable => format!("${}", t.value),
        TokenType::ParamExpansion => format!("${{{}}}", t.value),
        TokenType::CommandSub => format!("$({})", t.value),
        TokenType::ArithExpansion => format!("$(({}))", t.value),
        TokenType::ProcessSubIn => format!("<({})", t.value),
        TokenType::ProcessSubOut => format!(">({})", t.value),
        TokenType::Assign => format!("{}=", t.value),
        TokenType::PlusAssign => format!("{}+=", t.value),
        _ => t.value.clone(),
    }
}

/// Split an assignment LHS like `arr[2]` into name and subscript.
pub fn split_subscript(lhs: &str) -> (String, String) {
    match lhs.find('[') {
        Some(open) if lhs.ends_with(']') => (
            lhs[..open].to_string(),
            lhs[open + 1..lhs.len() - 1].to_string(),
        ),
        _ => (lhs.to_string(), String::new()),
    }
}

/// The parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    heredocs: HeredocMap,
    mode: ErrorMode,
    errors: Vec<ParseException>,
    depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            pos: 0,
            heredocs: HeredocMap::new(),
            mode: ErrorMode::Strict,
            errors: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_mode(mode: ErrorMode) -> Self {
        Self {
            mode,
            ..Self::new()
        }
    }

    /// Errors accumulated in `Collect`/`Recover` mode.
    pub fn errors(&self) -> &[ParseException] {
        &self.errors
    }

    /// Parse a complete input string into a program.
    pub fn parse(&mut self, input: &str) -> Result<ProgramNode, ParseException> {
        if input.len() > MAX_INPUT_SIZE {
            return Err(
                ParseException::new(format!("input too large: {} bytes", input.len()), 1, 1)
                    .with_code(ParseErrorCode::InputTooLarge),
            );
        }

        let (tokens, heredocs) = Lexer::new(input).tokenize_with_heredocs().map_err(|e| {
            ParseException::new(e.to_string(), 1, 1).with_code(ParseErrorCode::LexFailure)
        })?;
        if tokens.len() > MAX_TOKENS {
            return Err(
                ParseException::new(format!("too many tokens: {}", tokens.len()), 1, 1)
                    .with_code(ParseErrorCode::InputTooLarge),
            );
        }

        self.tokens = tokens;
        self.heredocs = heredocs;
        self.pos = 0;
        self.errors.clear();
        self.depth = 0;

        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.at(TokenType::Eof) {
                break;
            }
            match self.parse_statement() {
                Ok(StatementNode::FunctionDef(f)) => items.push(ProgramItem::FunctionDef(f)),
                Ok(stmt) => items.push(ProgramItem::Statement(stmt)),
                Err(e) => match self.mode {
                    ErrorMode::Strict => return Err(e),
                    ErrorMode::Collect => {
                        self.errors.push(e);
                        self.sync_to_separator();
                    }
                    ErrorMode::Recover => {
                        self.errors.push(e);
                        self.sync_to_sync_point();
                    }
                },
            }
        }
        Ok(ProgramNode { items })
    }

    // =========================================================================
    // CURSOR HELPERS
    // =========================================================================

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at(&self, kind: TokenType) -> bool {
        self.current().kind == kind
    }

    pub(crate) fn at_any(&self, kinds: &[TokenType]) -> bool {
        kinds.contains(&self.current().kind)
    }

    /// Keyword check tolerant of off-command-position words: the grammar
    /// accepts a bare unquoted word with the right text where a keyword is
    /// expected (`in` after `for NAME` is the common case).
    pub(crate) fn at_keyword(&self, kind: TokenType) -> bool {
        let t = self.current();
        t.kind == kind
            || (t.kind == TokenType::Word && t.quote == QuoteType::None && t.value == kind.as_str())
    }

    pub(crate) fn expect(
        &mut self,
        kind: TokenType,
        code: ParseErrorCode,
    ) -> Result<Token, ParseException> {
        if self.at_keyword(kind) {
            Ok(self.advance())
        } else {
            let t = self.current();
            let code = if t.kind == TokenType::Eof {
                match code {
                    ParseErrorCode::ExpectedToken => ParseErrorCode::UnexpectedEof,
                    other => other,
                }
            } else {
                code
            };
            Err(
                ParseException::at_token(format!("expected `{}'", kind.as_str()), t)
                    .with_code(code)
                    .with_expected(vec![kind]),
            )
        }
    }

    pub(crate) fn unexpected(&self, what: &str) -> ParseException {
        let t = self.current();
        let code = if t.kind == TokenType::Eof {
            ParseErrorCode::UnexpectedEof
        } else {
            ParseErrorCode::UnexpectedToken
        };
        ParseException::at_token(
            format!("unexpected token `{}' while looking for {}", t.value, what),
            t,
        )
        .with_code(code)
    }

    pub(crate) fn skip_newlines(&mut self) {
        while self.at(TokenType::Newline) {
            self.advance();
        }
    }

    pub(crate) fn skip_separators(&mut self) {
        while self.at_any(&[TokenType::Newline, TokenType::Semicolon]) {
            self.advance();
        }
    }

    fn sync_to_separator(&mut self) {
        while !self.at_any(&[TokenType::Newline, TokenType::Semicolon, TokenType::Eof]) {
            self.advance();
        }
    }

    fn sync_to_sync_point(&mut self) {
        while !is_sync_point(self.current().kind) {
            self.advance();
        }
        if !self.at(TokenType::Eof) {
            self.advance();
        }
    }

    pub(crate) fn enter(&mut self) -> Result<(), ParseException> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            let t = self.current();
            return Err(
                ParseException::at_token("nesting too deep", t).with_code(ParseErrorCode::TooDeep),
            );
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    /// Parse the statements of a block, stopping (without consuming) at any
    /// of `terminators`.
    pub(crate) fn parse_statement_list(
        &mut self,
        terminators: &[TokenType],
    ) -> Result<Vec<StatementNode>, ParseException> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at(TokenType::Eof) || terminators.iter().any(|k| self.at_keyword(*k)) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<StatementNode, ParseException> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.leave();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<StatementNode, ParseException> {
        // Function definition: NAME ( ) compound, or the `function` keyword.
        if self.at(TokenType::Function) {
            return Ok(StatementNode::FunctionDef(self.parse_function_keyword()?));
        }
        if self.at(TokenType::Word)
            && self.peek(1).kind == TokenType::LParen
            && self.peek(2).kind == TokenType::RParen
        {
            return Ok(StatementNode::FunctionDef(self.parse_function_posix()?));
        }
        // A reserved word in function position is rejected explicitly
        if self.current().kind.as_str().chars().all(|c| c.is_ascii_lowercase())
            && !self.current().kind.is_word_like()
            && self.peek(1).kind == TokenType::LParen
            && self.peek(2).kind == TokenType::RParen
        {
            return Err(ParseException::at_token(
                format!("`{}' is not a valid function name", self.current().value),
                self.current(),
            )
            .with_code(ParseErrorCode::InvalidFunctionName));
        }

        // Bare `break [n]` / `continue [n]` at statement position
        if self.at_any(&[TokenType::Break, TokenType::Continue]) {
            let saved = self.pos;
            let kw = self.advance();
            let mut levels: u32 = 1;
            let mut have_level = false;
            if self.at(TokenType::Word)
                && self.current().quote == QuoteType::None
                && self.current().value.chars().all(|c| c.is_ascii_digit())
                && !self.current().value.is_empty()
            {
                levels = self.current().value.parse().unwrap_or(1);
                have_level = true;
            }
            let end_pos = if have_level { 1 } else { 0 };
            let at_end = matches!(
                self.peek(end_pos).kind,
                TokenType::Semicolon
                    | TokenType::Newline
                    | TokenType::Eof
                    | TokenType::Ampersand
                    | TokenType::RParen
                    | TokenType::RBrace
                    | TokenType::DoubleSemicolon
                    | TokenType::SemicolonAmp
                    | TokenType::AmpSemicolon
                    | TokenType::Done
                    | TokenType::Fi
                    | TokenType::Esac
            );
            if at_end {
                if have_level {
                    self.advance();
                }
                return Ok(if kw.kind == TokenType::Break {
                    StatementNode::Break(levels.max(1))
                } else {
                    StatementNode::Continue(levels.max(1))
                });
            }
            self.pos = saved;
        }

        Ok(StatementNode::AndOr(self.parse_and_or()?))
    }

    pub(crate) fn parse_and_or(&mut self) -> Result<AndOrListNode, ParseException> {
        let line = self.current().line;
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut operators = Vec::new();
        loop {
            let op = match self.current().kind {
                TokenType::AndAnd => AndOrOperator::And,
                TokenType::OrOr => AndOrOperator::Or,
                _ => break,
            };
            self.advance();
            self.skip_newlines();
            operators.push(op);
            pipelines.push(self.parse_pipeline()?);
        }
        if self.at(TokenType::Ampersand) {
            self.advance();
            if let Some(last) = pipelines.last_mut() {
                last.background = true;
            }
        }
        Ok(AndOrListNode {
            pipelines,
            operators,
            line,
        })
    }

    pub(crate) fn parse_pipeline(&mut self) -> Result<PipelineNode, ParseException> {
        let mut inverted = false;
        while self.at(TokenType::Word)
            && self.current().value == "!"
            && self.current().quote == QuoteType::None
        {
            inverted = !inverted;
            self.advance();
        }

        let mut commands = vec![self.parse_command()?];
        while self.at(TokenType::Pipe) {
            self.advance();
            self.skip_newlines();
            commands.push(self.parse_command()?);
        }

        if commands.len() > 1 {
            for command in &mut commands {
                if let CommandNode::Compound(compound) = command {
                    compound.set_pipeline_context();
                }
            }
        }

        Ok(PipelineNode {
            commands,
            inverted,
            background: false,
        })
    }

    pub(crate) fn parse_command(&mut self) -> Result<CommandNode, ParseException> {
        self.enter()?;
        let result = match self.current().kind {
            TokenType::LParen => self.parse_subshell().map(CommandNode::Compound),
            TokenType::LBrace => self.parse_brace_group().map(CommandNode::Compound),
            TokenType::DoubleLParen => self.parse_arith_eval().map(CommandNode::Compound),
            TokenType::DoubleLBracket => self.parse_test_command().map(CommandNode::Compound),
            TokenType::If => self.parse_if().map(CommandNode::Compound),
            TokenType::While => self.parse_while().map(CommandNode::Compound),
            TokenType::Until => self.parse_until().map(CommandNode::Compound),
            TokenType::For => self.parse_for().map(CommandNode::Compound),
            TokenType::Case => self.parse_case().map(CommandNode::Compound),
            TokenType::Select => self.parse_select().map(CommandNode::Compound),
            _ => self.parse_simple_command().map(CommandNode::Simple),
        };
        self.leave();
        result
    }

    // =========================================================================
    // SIMPLE COMMANDS
    // =========================================================================

    fn parse_simple_command(&mut self) -> Result<SimpleCommandNode, ParseException> {
        let mut node = SimpleCommandNode {
            line: self.current().line,
            ..Default::default()
        };
        let mut in_prefix = true;

        loop {
            let t = self.current();

            // Redirections, with an optional adjacent numeric fd prefix
            if t.kind.is_redirect() {
                let redirect = self.parse_redirect()?;
                node.redirects.push(redirect);
                continue;
            }
            if self.at_fd_prefix() {
                let redirect = self.parse_redirect()?;
                node.redirects.push(redirect);
                continue;
            }

            // Array assignments and subscripted assignments in the prefix
            if in_prefix
                && matches!(t.kind, TokenType::Assign | TokenType::PlusAssign)
                && (self.is_array_literal_next() || t.value.contains('['))
            {
                let assignment = self.parse_array_assignment()?;
                node.array_assignments.push(assignment);
                continue;
            }

            // Control-flow keywords used as command words (`return 3`, or
            // `break` inside an and-or list) become plain words here.
            if matches!(
                t.kind,
                TokenType::Break | TokenType::Continue | TokenType::Return
            ) {
                let t = self.advance();
                node.push_arg(t.value, TokenType::Word, QuoteType::None);
                in_prefix = false;
                continue;
            }

            if t.kind.is_word_like() {
                let item = self.parse_word_item();
                if !matches!(item.kind, TokenType::Assign | TokenType::PlusAssign) {
                    in_prefix = false;
                }
                node.push_arg(item.text, item.kind, item.quote);
                continue;
            }

            break;
        }

        if node.args.is_empty() && node.redirects.is_empty() && node.array_assignments.is_empty() {
            return Err(self.unexpected("a command"));
        }
        Ok(node)
    }

    /// True when the current token is a numeric word glued to a redirect
    /// operator (`2>`, `3<&`).
    fn at_fd_prefix(&self) -> bool {
        let t = self.current();
        t.kind == TokenType::Word
            && t.quote == QuoteType::None
            && !t.value.is_empty()
            && t.value.chars().all(|c| c.is_ascii_digit())
            && self.peek(1).kind.is_redirect()
            && self.peek(1).start == t.end
    }

    fn is_array_literal_next(&self) -> bool {
        let t = self.current();
        self.peek(1).kind == TokenType::LParen && self.peek(1).start == t.end
    }

    /// Merge adjacent word-like tokens into one argument word.
    pub(crate) fn parse_word_item(&mut self) -> WordItem {
        let first = self.advance();
        let mut end = first.end;
        let mut parts = vec![first];
        while self.current().kind.is_word_like() && self.current().start == end {
            let t = self.advance();
            end = t.end;
            parts.push(t);
        }

        if parts.len() == 1 {
            let t = &parts[0];
            match t.kind {
                // A lone assignment token still carries its `=` in the text
                TokenType::Assign | TokenType::PlusAssign => {
                    WordItem::new(rebuild_token_text(t), t.kind, t.quote)
                }
                _ => WordItem::new(t.value.clone(), t.kind, t.quote),
            }
        } else {
            let kind = match parts[0].kind {
                TokenType::Assign => TokenType::Assign,
                TokenType::PlusAssign => TokenType::PlusAssign,
                _ => TokenType::Word,
            };
            let text: String = parts.iter().map(rebuild_token_text).collect();
            WordItem::new(text, kind, QuoteType::None)
        }
    }

    fn parse_array_assignment(&mut self) -> Result<ArrayAssignmentNode, ParseException> {
        let assign = self.advance();
        let append = assign.kind == TokenType::PlusAssign;
        let (name, subscript) = split_subscript(&assign.value);

        if self.at(TokenType::LParen) && self.current().start == assign.end {
            // NAME=( elements... )
            self.advance();
            let mut elements = Vec::new();
            loop {
                self.skip_separators();
                if self.at(TokenType::RParen) {
                    self.advance();
                    break;
                }
                if self.at(TokenType::Eof) {
                    return Err(self.unexpected("`)'"));
                }
                if !self.current().kind.is_word_like() {
                    return Err(self.unexpected("an array element"));
                }
                elements.push(self.parse_word_item());
            }
            Ok(ArrayAssignmentNode {
                name,
                subscript,
                append,
                elements: Some(elements),
                scalar_value: None,
            })
        } else {
            // NAME[idx]=value: the value is the adjacent word, if any
            let value = if self.current().kind.is_word_like() && self.current().start == assign.end
            {
                Some(self.parse_word_item())
            } else {
                None
            };
            Ok(ArrayAssignmentNode {
                name,
                subscript,
                append,
                elements: None,
                scalar_value: value,
            })
        }
    }

    // =========================================================================
    // REDIRECTIONS
    // =========================================================================

    pub(crate) fn parse_redirect(&mut self) -> Result<RedirectNode, ParseException> {
        let fd = if self.at_fd_prefix() {
            let t = self.advance();
            Some(t.value.parse::<i32>().map_err(|_| {
                ParseException::at_token("bad file descriptor", &t)
                    .with_code(ParseErrorCode::InvalidRedirect)
            })?)
        } else {
            None
        };

        let op = self.advance();
        let kind = match op.kind {
            TokenType::RedirectIn => RedirectKind::In,
            TokenType::RedirectOut => RedirectKind::Out,
            TokenType::RedirectAppend => RedirectKind::Append,
            TokenType::Heredoc => RedirectKind::Heredoc,
            TokenType::HeredocStrip => RedirectKind::HeredocStrip,
            TokenType::HerestringIn => RedirectKind::HereString,
            TokenType::RedirectDupOut => RedirectKind::DupOut,
            TokenType::RedirectDupIn => RedirectKind::DupIn,
            TokenType::RedirectClobber => RedirectKind::Clobber,
            TokenType::RedirectRW => RedirectKind::ReadWrite,
            _ => {
                return Err(ParseException::at_token("invalid redirection", &op)
                    .with_code(ParseErrorCode::InvalidRedirect))
            }
        };

        if !self.current().kind.is_word_like() {
            return Err(ParseException::at_token(
                format!("missing target after `{}'", kind.as_str()),
                self.current(),
            )
            .with_code(ParseErrorCode::InvalidRedirect));
        }
        let target = self.parse_word_item();

        let heredoc = match kind {
            RedirectKind::Heredoc | RedirectKind::HeredocStrip => {
                let raw = self.heredocs.get(&op.start);
                Some(HeredocBody {
                    delimiter: raw.map(|r| r.delimiter.clone()).unwrap_or_default(),
                    quoted_delimiter: raw.map(|r| r.quoted).unwrap_or(false),
                    body: raw.map(|r| r.body.clone()).unwrap_or_default(),
                })
            }
            _ => None,
        };

        Ok(RedirectNode {
            kind,
            fd,
            target,
            heredoc,
        })
    }

    /// Trailing redirects after a compound command's closing token.
    pub(crate) fn parse_trailing_redirects(
        &mut self,
    ) -> Result<Vec<RedirectNode>, ParseException> {
        let mut redirects = Vec::new();
        while self.current().kind.is_redirect() || self.at_fd_prefix() {
            redirects.push(self.parse_redirect()?);
        }
        Ok(redirects)
    }

    // =========================================================================
    // FUNCTIONS
    // =========================================================================

    fn parse_function_posix(&mut self) -> Result<FunctionDefNode, ParseException> {
        let name_token = self.advance();
        self.advance(); // (
        self.advance(); // )
        self.finish_function(name_token)
    }

    fn parse_function_keyword(&mut self) -> Result<FunctionDefNode, ParseException> {
        self.advance(); // function
        if !self.current().kind.is_word_like() {
            return Err(self
                .unexpected("a function name")
                .with_code(ParseErrorCode::InvalidFunctionName));
        }
        let name_token = self.advance();
        if self.at(TokenType::LParen) && self.peek(1).kind == TokenType::RParen {
            self.advance();
            self.advance();
        }
        self.finish_function(name_token)
    }

    fn finish_function(&mut self, name_token: Token) -> Result<FunctionDefNode, ParseException> {
        let name = name_token.value.clone();
        if name.is_empty() || name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            return Err(ParseException::at_token(
                format!("`{name}' is not a valid function name"),
                &name_token,
            )
            .with_code(ParseErrorCode::InvalidFunctionName));
        }

        self.skip_newlines();
        let body = match self.parse_command()? {
            CommandNode::Compound(compound) => compound,
            CommandNode::Simple(_) => {
                return Err(ParseException::new(
                    "function body must be a compound command",
                    name_token.line,
                    name_token.column,
                ))
            }
        };
        let redirects = self.parse_trailing_redirects()?;
        Ok(FunctionDefNode {
            name,
            body: Box::new(body),
            redirects,
            line: name_token.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{CompoundCommandNode, ExecutionContext};
    use assert_matches::assert_matches;

    fn parse(input: &str) -> ProgramNode {
        Parser::new().parse(input).expect("parse failure")
    }

    fn first_statement(program: &ProgramNode) -> &StatementNode {
        match &program.items[0] {
            ProgramItem::Statement(s) => s,
            ProgramItem::FunctionDef(_) => panic!("expected statement"),
        }
    }

    fn first_simple(program: &ProgramNode) -> &SimpleCommandNode {
        match first_statement(program) {
            StatementNode::AndOr(list) => match &list.pipelines[0].commands[0] {
                CommandNode::Simple(s) => s,
                _ => panic!("expected simple command"),
            },
            _ => panic!("expected and-or list"),
        }
    }

    #[test]
    fn test_simple_command_args() {
        let program = parse("echo hello world");
        let cmd = first_simple(&program);
        assert_eq!(cmd.args, vec!["echo", "hello", "world"]);
        assert_eq!(cmd.args.len(), cmd.arg_token_kinds.len());
        assert_eq!(cmd.args.len(), cmd.quote_types.len());
    }

    #[test]
    fn test_adjacent_tokens_merged() {
        let program = parse(r#"echo a"b c"$d"#);
        let cmd = first_simple(&program);
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[1], "a\"b c\"$d");
        assert_eq!(cmd.arg_token_kinds[1], TokenType::Word);
    }

    #[test]
    fn test_quote_types_tracked() {
        let program = parse("echo 'single' \"double\" plain");
        let cmd = first_simple(&program);
        assert_eq!(
            cmd.quote_types,
            vec![
                QuoteType::None,
                QuoteType::Single,
                QuoteType::Double,
                QuoteType::None
            ]
        );
    }

    #[test]
    fn test_and_or_list() {
        let program = parse("true && false || echo ok");
        match first_statement(&program) {
            StatementNode::AndOr(list) => {
                assert_eq!(list.pipelines.len(), 3);
                assert_eq!(
                    list.operators,
                    vec![AndOrOperator::And, AndOrOperator::Or]
                );
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_pipeline_and_inversion() {
        let program = parse("! cat file | wc -l");
        match first_statement(&program) {
            StatementNode::AndOr(list) => {
                let p = &list.pipelines[0];
                assert!(p.inverted);
                assert_eq!(p.commands.len(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_background_flag() {
        let program = parse("sleep 5 &");
        match first_statement(&program) {
            StatementNode::AndOr(list) => assert!(list.pipelines[0].background),
            _ => panic!(),
        }
    }

    #[test]
    fn test_redirects_with_fd() {
        let program = parse("cmd 2>&1 >out <in");
        let cmd = first_simple(&program);
        assert_eq!(cmd.redirects.len(), 3);
        assert_eq!(cmd.redirects[0].kind, RedirectKind::DupOut);
        assert_eq!(cmd.redirects[0].fd, Some(2));
        assert_eq!(cmd.redirects[0].target.text, "1");
        assert_eq!(cmd.redirects[1].kind, RedirectKind::Out);
        assert_eq!(cmd.redirects[1].fd, None);
        assert_eq!(cmd.redirects[2].kind, RedirectKind::In);
    }

    #[test]
    fn test_heredoc_attached() {
        let program = parse("cat <<EOF\nline1\nline2\nEOF\n");
        let cmd = first_simple(&program);
        let heredoc = cmd.redirects[0].heredoc.as_ref().unwrap();
        assert_eq!(heredoc.body, "line1\nline2\n");
        assert!(!heredoc.quoted_delimiter);
    }

    #[test]
    fn test_heredoc_quoted_delimiter() {
        let program = parse("cat <<'EOF'\n$X\nEOF\n");
        let cmd = first_simple(&program);
        let heredoc = cmd.redirects[0].heredoc.as_ref().unwrap();
        assert!(heredoc.quoted_delimiter);
    }

    #[test]
    fn test_function_definition() {
        let program = parse("greet() { echo hi; }");
        match &program.items[0] {
            ProgramItem::FunctionDef(f) => {
                assert_eq!(f.name, "greet");
                assert_matches!(*f.body, CompoundCommandNode::BraceGroup(_));
            }
            _ => panic!("expected function def"),
        }
    }

    #[test]
    fn test_function_keyword_form() {
        let program = parse("function greet { echo hi; }");
        assert!(matches!(&program.items[0], ProgramItem::FunctionDef(f) if f.name == "greet"));
    }

    #[test]
    fn test_reserved_word_not_function_name() {
        assert!(Parser::new().parse("if() { :; }").is_err());
    }

    #[test]
    fn test_assignment_stays_in_args() {
        let program = parse("X=1 Y=2 cmd a");
        let cmd = first_simple(&program);
        assert_eq!(cmd.args, vec!["X=1", "Y=2", "cmd", "a"]);
        assert_eq!(cmd.arg_token_kinds[0], TokenType::Assign);
        assert_eq!(cmd.arg_token_kinds[1], TokenType::Assign);
        assert_eq!(cmd.arg_token_kinds[2], TokenType::Word);
    }

    #[test]
    fn test_array_assignment() {
        let program = parse("arr=(a b c)");
        let cmd = first_simple(&program);
        assert_eq!(cmd.array_assignments.len(), 1);
        let assignment = &cmd.array_assignments[0];
        assert_eq!(assignment.name, "arr");
        assert_eq!(assignment.elements.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_subscript_assignment() {
        let program = parse("arr[2]=value");
        let cmd = first_simple(&program);
        let assignment = &cmd.array_assignments[0];
        assert_eq!(assignment.name, "arr");
        assert_eq!(assignment.subscript, "2");
        assert_eq!(assignment.scalar_value.as_ref().unwrap().text, "value");
    }

    #[test]
    fn test_bare_break_statement() {
        let program = parse("break 2");
        assert_matches!(first_statement(&program), StatementNode::Break(2));
    }

    #[test]
    fn test_break_in_and_or_is_command() {
        let program = parse("true && break");
        match first_statement(&program) {
            StatementNode::AndOr(list) => {
                assert_eq!(list.pipelines.len(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_pipeline_stage_context() {
        let program = parse("if true; then echo a; fi | cat");
        match first_statement(&program) {
            StatementNode::AndOr(list) => match &list.pipelines[0].commands[0] {
                CommandNode::Compound(c) => {
                    assert_eq!(c.context(), ExecutionContext::Pipeline)
                }
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn test_statement_level_context() {
        let program = parse("if true; then echo a; fi");
        match first_statement(&program) {
            StatementNode::AndOr(list) => match &list.pipelines[0].commands[0] {
                CommandNode::Compound(c) => {
                    assert_eq!(c.context(), ExecutionContext::Statement)
                }
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn test_collect_mode_continues() {
        let mut parser = Parser::with_mode(ErrorMode::Collect);
        let program = parser.parse("fi\necho ok").unwrap();
        assert_eq!(parser.errors().len(), 1);
        assert_eq!(program.items.len(), 1);
    }

    #[test]
    fn test_missing_fi_error_code() {
        let err = Parser::new().parse("if true; then echo a").unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MissingFi);
    }

    #[test]
    fn test_empty_input() {
        let program = parse("");
        assert!(program.items.is_empty());
    }

    #[test]
    fn test_multiline_program() {
        let program = parse("echo a\necho b\n\necho c\n");
        assert_eq!(program.items.len(), 3);
    }
}
