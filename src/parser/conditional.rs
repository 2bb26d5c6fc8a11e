//! Conditional Expression Parsing
//!
//! The fenced `[[ ... ]]` test expression has its own precedence grammar:
//! `||` binds loosest, then `&&`, then `!`, then primaries. Parenthesized
//! groups nest. Word splitting and pathname expansion are suppressed when
//! the evaluator expands the operands.

use crate::ast::types::{CompoundCommandNode, ExecutionContext, TestExprNode, TestNode, WordItem};
use crate::parser::lexer::{QuoteType, TokenType};
use crate::parser::parser::Parser;
use crate::parser::types::{ParseErrorCode, ParseException};

const UNARY_OPS: &[&str] = &[
    "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-p", "-r", "-s", "-t", "-u", "-w",
    "-x", "-G", "-L", "-N", "-O", "-S", "-z", "-n", "-o", "-v", "-R",
];

const BINARY_OPS: &[&str] = &[
    "=", "==", "!=", "=~", "<", ">", "-eq", "-ne", "-lt", "-le", "-gt", "-ge", "-nt", "-ot",
    "-ef",
];

impl Parser {
    pub(crate) fn parse_test_command(&mut self) -> Result<CompoundCommandNode, ParseException> {
        self.advance(); // [[
        self.skip_newlines();
        let expression = self.parse_test_or()?;
        self.skip_newlines();
        self.expect(TokenType::DoubleRBracket, ParseErrorCode::ExpectedToken)?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommandNode::Test(TestNode {
            expression,
            redirects,
            context: ExecutionContext::Statement,
        }))
    }

    fn parse_test_or(&mut self) -> Result<TestExprNode, ParseException> {
        let mut left = self.parse_test_and()?;
        while self.at(TokenType::OrOr) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_test_and()?;
            left = TestExprNode::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_test_and(&mut self) -> Result<TestExprNode, ParseException> {
        let mut left = self.parse_test_not()?;
        while self.at(TokenType::AndAnd) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_test_not()?;
            left = TestExprNode::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_test_not(&mut self) -> Result<TestExprNode, ParseException> {
        if self.at(TokenType::Word)
            && self.current().value == "!"
            && self.current().quote == QuoteType::None
        {
            self.advance();
            let operand = self.parse_test_not()?;
            return Ok(TestExprNode::Not(Box::new(operand)));
        }
        self.parse_test_primary()
    }

    fn parse_test_primary(&mut self) -> Result<TestExprNode, ParseException> {
        if self.at(TokenType::LParen) {
            self.advance();
            self.skip_newlines();
            let inner = self.parse_test_or()?;
            self.skip_newlines();
            self.expect(TokenType::RParen, ParseErrorCode::ExpectedToken)?;
            return Ok(inner);
        }

        if self.at(TokenType::Eof) || self.at(TokenType::DoubleRBracket) {
            return Err(self.unexpected("a conditional expression"));
        }

        // Unary operator?
        let t = self.current();
        if t.kind == TokenType::Word
            && t.quote == QuoteType::None
            && UNARY_OPS.contains(&t.value.as_str())
        {
            let op = self.advance().value;
            if !self.current().kind.is_word_like() {
                return Err(self.unexpected("an operand"));
            }
            let operand = self.parse_word_item();
            return Ok(TestExprNode::Unary { op, operand });
        }

        if !self.current().kind.is_word_like() {
            return Err(self.unexpected("a conditional operand"));
        }
        let left = self.parse_word_item();

        // Binary operator?
        let t = self.current();
        if t.kind == TokenType::Word
            && t.quote == QuoteType::None
            && BINARY_OPS.contains(&t.value.as_str())
        {
            let op = self.advance().value;
            if !self.current().kind.is_word_like() {
                return Err(self.unexpected("an operand"));
            }
            let right = if op == "=~" {
                self.parse_regex_operand()
            } else {
                self.parse_word_item()
            };
            return Ok(TestExprNode::Binary { op, left, right });
        }

        Ok(TestExprNode::Word(left))
    }

    /// The right side of `=~` extends to the next `&&`, `||`, `)` or `]]`,
    /// so unquoted regex metacharacters survive.
    fn parse_regex_operand(&mut self) -> WordItem {
        let mut item = self.parse_word_item();
        while self.current().kind.is_word_like() {
            let next = self.parse_word_item();
            item.text.push(' ');
            item.text.push_str(&next.text);
            item.kind = TokenType::Word;
            item.quote = QuoteType::None;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{CommandNode, ProgramItem, ProgramNode, StatementNode};

    fn parse_test(input: &str) -> TestExprNode {
        let program: ProgramNode = Parser::new().parse(input).expect("parse failure");
        match &program.items[0] {
            ProgramItem::Statement(StatementNode::AndOr(list)) => {
                match &list.pipelines[0].commands[0] {
                    CommandNode::Compound(CompoundCommandNode::Test(t)) => t.expression.clone(),
                    _ => panic!("expected test command"),
                }
            }
            _ => panic!("expected statement"),
        }
    }

    #[test]
    fn test_unary() {
        let expr = parse_test("[[ -f /etc/passwd ]]");
        assert!(matches!(expr, TestExprNode::Unary { op, .. } if op == "-f"));
    }

    #[test]
    fn test_binary_string() {
        let expr = parse_test("[[ $a == $b ]]");
        assert!(matches!(expr, TestExprNode::Binary { op, .. } if op == "=="));
    }

    #[test]
    fn test_lexical_comparison() {
        let expr = parse_test("[[ $a < $b ]]");
        assert!(matches!(expr, TestExprNode::Binary { op, .. } if op == "<"));
    }

    #[test]
    fn test_precedence_or_and() {
        // a && b || c parses as (a && b) || c
        let expr = parse_test("[[ -n a && -n b || -n c ]]");
        match expr {
            TestExprNode::Or(left, _) => {
                assert!(matches!(*left, TestExprNode::And(_, _)));
            }
            _ => panic!("expected Or at top"),
        }
    }

    #[test]
    fn test_negation() {
        let expr = parse_test("[[ ! -z $x ]]");
        assert!(matches!(expr, TestExprNode::Not(_)));
    }

    #[test]
    fn test_grouping() {
        let expr = parse_test("[[ ( -n a || -n b ) && -n c ]]");
        assert!(matches!(expr, TestExprNode::And(_, _)));
    }

    #[test]
    fn test_bare_word() {
        let expr = parse_test("[[ $x ]]");
        assert!(matches!(expr, TestExprNode::Word(_)));
    }

    #[test]
    fn test_regex_match() {
        let expr = parse_test("[[ $x =~ ^[0-9]+$ ]]");
        match expr {
            TestExprNode::Binary { op, right, .. } => {
                assert_eq!(op, "=~");
                assert_eq!(right.text, "^[0-9]+$");
            }
            _ => panic!(),
        }
    }
}
