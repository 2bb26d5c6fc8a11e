//! Compound Command Parsing
//!
//! if/while/until/for/case/select, subshells, brace groups, and arithmetic
//! commands. Each control structure is produced as a unified node whose
//! `ExecutionContext` defaults to `Statement`; `Parser::parse_pipeline`
//! flips stages of multi-command pipelines to `Pipeline`.

use crate::ast::types::{
    ArithEvalNode, BraceGroupNode, CaseItemNode, CaseNode, CaseTerminator, CompoundCommandNode,
    ExecutionContext, ForArithNode, ForEachNode, IfClause, IfNode, SelectNode, SubshellNode,
    UntilNode, WhileNode, WordItem,
};
use crate::parser::lexer::{QuoteType, TokenType};
use crate::parser::parser::Parser;
use crate::parser::types::{ParseErrorCode, ParseException};

impl Parser {
    pub(crate) fn parse_subshell(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // (
        let body = self.parse_statement_list(&[TokenType::RParen])?;
        self.expect(TokenType::RParen, ParseErrorCode::ExpectedToken)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::Subshell(SubshellNode {
            body,
            redirects,
        }))
    }

    pub(crate) fn parse_brace_group(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // {
        let body = self.parse_statement_list(&[TokenType::RBrace])?;
        self.expect(TokenType::RBrace, ParseErrorCode::ExpectedToken)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::BraceGroup(BraceGroupNode {
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    pub(crate) fn parse_if(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // if
        let mut clauses = Vec::new();

        let condition = self.parse_statement_list(&[TokenType::Then])?;
        self.expect(TokenType::Then, ParseErrorCode::MissingFi)?;
        let body =
            self.parse_statement_list(&[TokenType::Elif, TokenType::Else, TokenType::Fi])?;
        clauses.push(IfClause { condition, body });

        while self.at_keyword(TokenType::Elif) {
            self.advance();
            let condition = self.parse_statement_list(&[TokenType::Then])?;
            self.expect(TokenType::Then, ParseErrorCode::MissingFi)?;
            let body =
                self.parse_statement_list(&[TokenType::Elif, TokenType::Else, TokenType::Fi])?;
            clauses.push(IfClause { condition, body });
        }

        let else_body = if self.at_keyword(TokenType::Else) {
            self.advance();
            Some(self.parse_statement_list(&[TokenType::Fi])?)
        } else {
            None
        };

        self.expect(TokenType::Fi, ParseErrorCode::MissingFi)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::If(IfNode {
            clauses,
            else_body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    pub(crate) fn parse_while(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // while
        let condition = self.parse_statement_list(&[TokenType::Do])?;
        let (body, redirects) = self.parse_do_block()?;
        Ok(CompoundCommandNode::While(WhileNode {
            condition,
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    pub(crate) fn parse_until(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // until
        let condition = self.parse_statement_list(&[TokenType::Do])?;
        let (body, redirects) = self.parse_do_block()?;
        Ok(CompoundCommandNode::Until(UntilNode {
            condition,
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    fn parse_do_block(
        &mut self,
    ) -> Result<(Vec<crate::ast::types::StatementNode>, Vec<crate::ast::types::RedirectNode>), ParseException>
    {
        self.expect(TokenType::Do, ParseErrorCode::MissingDone)?;
        let body = self.parse_statement_list(&[TokenType::Done])?;
        self.expect(TokenType::Done, ParseErrorCode::MissingDone)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok((body, redirects))
    }

    pub(crate) fn parse_for(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // for

        if self.at(TokenType::DoubleLParen) {
            return self.parse_for_arith();
        }

        let name_token = self.current().clone();
        if !name_token.kind.is_word_like() {
            return Err(self.unexpected("a loop variable name"));
        }
        self.advance();
        let variable = name_token.value;

        self.skip_newlines();
        let words = if self.at_keyword(TokenType::In) {
            self.advance();
            let mut words = Vec::new();
            while self.current().kind.is_word_like() {
                words.push(self.parse_word_item());
            }
            Some(words)
        } else {
            None
        };

        self.skip_separators();
        let (body, redirects) = self.parse_do_block()?;
        Ok(CompoundCommandNode::ForEach(ForEachNode {
            variable,
            words,
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    fn parse_for_arith(&mut self) -> Result<CompoundCommandNode, ParseException> {
        let open = self.advance(); // ((
        let expr = if self.at(TokenType::Word) {
            self.advance().value
        } else {
            String::new()
        };
        self.expect(TokenType::DoubleRParen, ParseErrorCode::InvalidArithmetic)?;

        let sections: Vec<&str> = expr.split(';').collect();
        if sections.len() != 3 {
            return Err(ParseException::new(
                "expected `((init; condition; update))'",
                open.line,
                open.column,
            )
            .with_code(ParseErrorCode::InvalidArithmetic));
        }

        self.skip_separators();
        let (body, redirects) = self.parse_do_block()?;
        Ok(CompoundCommandNode::ForArith(ForArithNode {
            init: sections[0].trim().to_string(),
            condition: sections[1].trim().to_string(),
            update: sections[2].trim().to_string(),
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    pub(crate) fn parse_case(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // case
        if !self.current().kind.is_word_like() {
            return Err(self.unexpected("a word after `case'"));
        }
        let word = self.parse_word_item();
        self.skip_newlines();
        self.expect(TokenType::In, ParseErrorCode::ExpectedToken)?;

        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.at_keyword(TokenType::Esac) {
                break;
            }
            if self.at(TokenType::Eof) {
                return Err(self.unexpected("`esac'").with_code(ParseErrorCode::MissingEsac));
            }

            if self.at(TokenType::LParen) {
                self.advance();
            }
            let mut patterns = vec![self.parse_case_pattern()?];
            while self.at(TokenType::Pipe) {
                self.advance();
                patterns.push(self.parse_case_pattern()?);
            }
            self.expect(TokenType::RParen, ParseErrorCode::ExpectedToken)?;

            let body = self.parse_statement_list(&[
                TokenType::DoubleSemicolon,
                TokenType::SemicolonAmp,
                TokenType::AmpSemicolon,
                TokenType::Esac,
            ])?;

            let terminator = match self.current().kind {
                TokenType::DoubleSemicolon => {
                    self.advance();
                    CaseTerminator::Break
                }
                TokenType::SemicolonAmp => {
                    self.advance();
                    CaseTerminator::FallThrough
                }
                TokenType::AmpSemicolon => {
                    self.advance();
                    CaseTerminator::Continue
                }
                _ => CaseTerminator::Break,
            };
            items.push(CaseItemNode {
                patterns,
                body,
                terminator,
            });
        }

        self.expect(TokenType::Esac, ParseErrorCode::MissingEsac)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::Case(CaseNode {
            word,
            items,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    fn parse_case_pattern(&mut self) -> Result<WordItem, ParseException> {
        let t = self.current();
        if t.kind.is_word_like() {
            return Ok(self.parse_word_item());
        }
        // Keywords are valid patterns when quoted words were normalized
        if matches!(t.kind, TokenType::In | TokenType::Esac) {
            let t = self.advance();
            return Ok(WordItem::new(t.value, TokenType::Word, QuoteType::None));
        }
        Err(self.unexpected("a case pattern"))
    }

    pub(crate) fn parse_select(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // select
        let name_token = self.current().clone();
        if !name_token.kind.is_word_like() {
            return Err(self.unexpected("a selection variable name"));
        }
        self.advance();

        self.skip_newlines();
        let words = if self.at_keyword(TokenType::In) {
            self.advance();
            let mut words = Vec::new();
            while self.current().kind.is_word_like() {
                words.push(self.parse_word_item());
            }
            Some(words)
        } else {
            None
        };

        self.skip_separators();
        let (body, redirects) = self.parse_do_block()?;
        Ok(CompoundCommandNode::Select(SelectNode {
            variable: name_token.value,
            words,
            body,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    pub(crate) fn parse_arith_eval(&mut self) -> Result<CompoundCommandNode, ParseException> {
        let open = self.advance(); // ((
        let expression = if self.at(TokenType::Word) {
            self.advance().value
        } else {
            String::new()
        };
        self.expect(TokenType::DoubleRParen, ParseErrorCode::InvalidArithmetic)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::ArithEval(ArithEvalNode {
            expression,
            redirects,
            context: ExecutionContext::Statement,
            line: open.line,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{CommandNode, ProgramItem, ProgramNode, StatementNode};

    fn parse(input: &str) -> ProgramNode {
        Parser::new().parse(input).expect("parse failure")
    }

    fn first_compound(program: &ProgramNode) -> &CompoundCommandNode {
        match &program.items[0] {
            ProgramItem::Statement(StatementNode::AndOr(list)) => {
                match &list.pipelines[0].commands[0] {
                    CommandNode::Compound(c) => c,
                    _ => panic!("expected compound"),
                }
            }
            _ => panic!("expected statement"),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let program = parse("if a; then b; elif c; then d; else e; fi");
        match first_compound(&program) {
            CompoundCommandNode::If(node) => {
                assert_eq!(node.clauses.len(), 2);
                assert!(node.else_body.is_some());
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_while_loop() {
        let program = parse("while true; do echo hi; done");
        assert!(matches!(
            first_compound(&program),
            CompoundCommandNode::While(_)
        ));
    }

    #[test]
    fn test_until_loop() {
        let program = parse("until false; do echo hi; done");
        assert!(matches!(
            first_compound(&program),
            CompoundCommandNode::Until(_)
        ));
    }

    #[test]
    fn test_for_each() {
        let program = parse("for f in a b c; do echo $f; done");
        match first_compound(&program) {
            CompoundCommandNode::ForEach(node) => {
                assert_eq!(node.variable, "f");
                assert_eq!(node.words.as_ref().unwrap().len(), 3);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_for_without_in_iterates_positional() {
        let program = parse("for f; do echo $f; done");
        match first_compound(&program) {
            CompoundCommandNode::ForEach(node) => assert!(node.words.is_none()),
            _ => panic!(),
        }
    }

    #[test]
    fn test_for_arith() {
        let program = parse("for ((i=0; i<5; i++)); do echo $i; done");
        match first_compound(&program) {
            CompoundCommandNode::ForArith(node) => {
                assert_eq!(node.init, "i=0");
                assert_eq!(node.condition, "i<5");
                assert_eq!(node.update, "i++");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_for_arith_empty_sections() {
        let program = parse("for ((;;)); do break; done");
        match first_compound(&program) {
            CompoundCommandNode::ForArith(node) => {
                assert!(node.init.is_empty());
                assert!(node.condition.is_empty());
                assert!(node.update.is_empty());
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_case_terminators() {
        let program = parse("case $x in a) echo a;; b) echo b;& c) echo c;;& *) echo d;; esac");
        match first_compound(&program) {
            CompoundCommandNode::Case(node) => {
                assert_eq!(node.items.len(), 4);
                assert_eq!(node.items[0].terminator, CaseTerminator::Break);
                assert_eq!(node.items[1].terminator, CaseTerminator::FallThrough);
                assert_eq!(node.items[2].terminator, CaseTerminator::Continue);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_case_multiple_patterns() {
        let program = parse("case $x in a|b|c) echo m;; esac");
        match first_compound(&program) {
            CompoundCommandNode::Case(node) => {
                assert_eq!(node.items[0].patterns.len(), 3);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_subshell() {
        let program = parse("(echo a; echo b)");
        match first_compound(&program) {
            CompoundCommandNode::Subshell(node) => assert_eq!(node.body.len(), 2),
            _ => panic!(),
        }
    }

    #[test]
    fn test_brace_group_with_redirect() {
        let program = parse("{ echo a; echo b; } > out.txt");
        match first_compound(&program) {
            CompoundCommandNode::BraceGroup(node) => {
                assert_eq!(node.body.len(), 2);
                assert_eq!(node.redirects.len(), 1);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_arith_eval_command() {
        let program = parse("(( x + 1 ))");
        match first_compound(&program) {
            CompoundCommandNode::ArithEval(node) => {
                assert_eq!(node.expression.trim(), "x + 1");
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_select_statement() {
        let program = parse("select opt in a b; do echo $opt; done");
        match first_compound(&program) {
            CompoundCommandNode::Select(node) => {
                assert_eq!(node.variable, "opt");
                assert_eq!(node.words.as_ref().unwrap().len(), 2);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_missing_done() {
        let err = Parser::new()
            .parse("while true; do echo hi")
            .unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MissingDone);
    }

    #[test]
    fn test_missing_esac() {
        let err = Parser::new().parse("case x in a) echo a;;").unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MissingEsac);
    }

    #[test]
    fn test_nested_loops() {
        let program = parse("for a in 1 2; do for b in 3 4; do echo $a$b; done; done");
        match first_compound(&program) {
            CompoundCommandNode::ForEach(node) => assert_eq!(node.body.len(), 1),
            _ => panic!(),
        }
    }
}
