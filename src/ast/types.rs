//! Abstract Syntax Tree Types
//!
//! This module defines the AST produced by the parser and consumed by the
//! evaluator. The design follows the POSIX shell grammar while being
//! Rust-idiomatic: every node category is a sum type, and control structures
//! are unified nodes that carry an [`ExecutionContext`] telling the evaluator
//! whether they run in the current shell or in a forked pipeline stage.

use crate::parser::lexer::{QuoteType, TokenType};

// =============================================================================
// BASE TYPES
// =============================================================================

/// Where a compound command appears, which decides whether it forks.
///
/// `Statement` means the node runs in the current shell process; `Pipeline`
/// means it is a pipeline stage and must run in a subshell. The parser sets
/// this from its call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    #[default]
    Statement,
    Pipeline,
}

/// A single word position outside of `SimpleCommand` argument lists
/// (for-loop word lists, case words and patterns, test operands).
#[derive(Debug, Clone, PartialEq)]
pub struct WordItem {
    /// Source text of the word (inner text for quoted strings).
    pub text: String,
    /// Token kind the word was lexed as.
    pub kind: TokenType,
    /// Quote discipline governing expansion of this word.
    pub quote: QuoteType,
}

impl WordItem {
    pub fn new(text: impl Into<String>, kind: TokenType, quote: QuoteType) -> Self {
        Self {
            text: text.into(),
            kind,
            quote,
        }
    }

    /// A bare unquoted word.
    pub fn bare(text: impl Into<String>) -> Self {
        Self::new(text, TokenType::Word, QuoteType::None)
    }
}

// =============================================================================
// PROGRAM & STATEMENTS
// =============================================================================

/// Root node: an ordered list of top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramNode {
    pub items: Vec<ProgramItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramItem {
    FunctionDef(FunctionDefNode),
    Statement(StatementNode),
}

/// A statement: an and-or list, a function definition, or a bare loop
/// control word recognized at statement position.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementNode {
    AndOr(AndOrListNode),
    FunctionDef(FunctionDefNode),
    Break(u32),
    Continue(u32),
}

/// Pipelines joined by `&&` / `||`, associating left-to-right.
#[derive(Debug, Clone, PartialEq)]
pub struct AndOrListNode {
    pub pipelines: Vec<PipelineNode>,
    /// `operators.len() == pipelines.len() - 1`
    pub operators: Vec<AndOrOperator>,
    /// Source line of the first token, for $LINENO and diagnostics.
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOperator {
    And, // &&
    Or,  // ||
}

// =============================================================================
// PIPELINES & COMMANDS
// =============================================================================

/// `cmd1 | cmd2 | cmd3`, optionally inverted with a leading `!` and
/// backgrounded with a trailing `&`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineNode {
    /// Always at least one command. Single-command pipelines do not fork on
    /// their own; the evaluator elides the pipe setup.
    pub commands: Vec<CommandNode>,
    pub inverted: bool,
    pub background: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    Simple(SimpleCommandNode),
    Compound(CompoundCommandNode),
}

/// Simple command: three parallel sequences of equal length describing the
/// raw argument words, plus redirections and array assignments.
///
/// Scalar `NAME=value` assignments stay in `args` (with kind
/// [`TokenType::Assign`] or [`TokenType::PlusAssign`]); the evaluator
/// extracts the leading run of them before dispatch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleCommandNode {
    pub args: Vec<String>,
    pub arg_token_kinds: Vec<TokenType>,
    pub quote_types: Vec<QuoteType>,
    pub redirects: Vec<RedirectNode>,
    pub array_assignments: Vec<ArrayAssignmentNode>,
    pub background: bool,
    pub line: usize,
}

impl SimpleCommandNode {
    /// Push one argument word, keeping the three sequences in lockstep.
    pub fn push_arg(&mut self, text: String, kind: TokenType, quote: QuoteType) {
        self.args.push(text);
        self.arg_token_kinds.push(kind);
        self.quote_types.push(quote);
    }
}

/// `NAME=(a b c)`, `NAME+=(x)`, or `NAME[idx]=value` forms that cannot live
/// in the flat argument sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAssignmentNode {
    pub name: String,
    /// Subscript text for `NAME[idx]=value`; empty for whole-array forms.
    pub subscript: String,
    pub append: bool,
    /// `None` for `NAME[idx]=value` (then `scalar_value` holds the word);
    /// `Some` for `NAME=(...)` literals.
    pub elements: Option<Vec<WordItem>>,
    pub scalar_value: Option<WordItem>,
}

// =============================================================================
// COMPOUND COMMANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CompoundCommandNode {
    Subshell(SubshellNode),
    BraceGroup(BraceGroupNode),
    If(IfNode),
    While(WhileNode),
    Until(UntilNode),
    ForEach(ForEachNode),
    ForArith(ForArithNode),
    Case(CaseNode),
    Select(SelectNode),
    ArithEval(ArithEvalNode),
    Test(TestNode),
}

impl CompoundCommandNode {
    /// Execution context of the node, as set by the parser.
    pub fn context(&self) -> ExecutionContext {
        match self {
            Self::Subshell(_) => ExecutionContext::Pipeline,
            Self::BraceGroup(n) => n.context,
            Self::If(n) => n.context,
            Self::While(n) => n.context,
            Self::Until(n) => n.context,
            Self::ForEach(n) => n.context,
            Self::ForArith(n) => n.context,
            Self::Case(n) => n.context,
            Self::Select(n) => n.context,
            Self::ArithEval(n) => n.context,
            Self::Test(n) => n.context,
        }
    }

    /// Flip the node into pipeline context (used by the parser once it knows
    /// the command is a stage of a multi-command pipeline).
    pub fn set_pipeline_context(&mut self) {
        match self {
            Self::Subshell(_) => {}
            Self::BraceGroup(n) => n.context = ExecutionContext::Pipeline,
            Self::If(n) => n.context = ExecutionContext::Pipeline,
            Self::While(n) => n.context = ExecutionContext::Pipeline,
            Self::Until(n) => n.context = ExecutionContext::Pipeline,
            Self::ForEach(n) => n.context = ExecutionContext::Pipeline,
            Self::ForArith(n) => n.context = ExecutionContext::Pipeline,
            Self::Case(n) => n.context = ExecutionContext::Pipeline,
            Self::Select(n) => n.context = ExecutionContext::Pipeline,
            Self::ArithEval(n) => n.context = ExecutionContext::Pipeline,
            Self::Test(n) => n.context = ExecutionContext::Pipeline,
        }
    }

    pub fn redirects(&self) -> &[RedirectNode] {
        match self {
            Self::Subshell(n) => &n.redirects,
            Self::BraceGroup(n) => &n.redirects,
            Self::If(n) => &n.redirects,
            Self::While(n) => &n.redirects,
            Self::Until(n) => &n.redirects,
            Self::ForEach(n) => &n.redirects,
            Self::ForArith(n) => &n.redirects,
            Self::Case(n) => &n.redirects,
            Self::Select(n) => &n.redirects,
            Self::ArithEval(n) => &n.redirects,
            Self::Test(n) => &n.redirects,
        }
    }
}

/// Subshell `( ... )`: always forks, so it carries no context flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SubshellNode {
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
}

/// Brace group `{ ...; }`: runs in the current process at statement position.
#[derive(Debug, Clone, PartialEq)]
pub struct BraceGroupNode {
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// `if`/`elif` clauses in order: (condition, body).
    pub clauses: Vec<IfClause>,
    pub else_body: Option<Vec<StatementNode>>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfClause {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UntilNode {
    pub condition: Vec<StatementNode>,
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

/// `for VAR [in WORDS]; do ...; done`: `words: None` means iterate `"$@"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForEachNode {
    pub variable: String,
    pub words: Option<Vec<WordItem>>,
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

/// `for ((init; cond; update)); do ...; done`.
///
/// The three expression strings may be empty: an empty init or update is a
/// no-op and an empty condition is true.
#[derive(Debug, Clone, PartialEq)]
pub struct ForArithNode {
    pub init: String,
    pub condition: String,
    pub update: String,
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    pub word: WordItem,
    pub items: Vec<CaseItemNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseItemNode {
    pub patterns: Vec<WordItem>,
    pub body: Vec<StatementNode>,
    pub terminator: CaseTerminator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTerminator {
    /// `;;`: stop after this item.
    Break,
    /// `;&`: fall through into the next item's body.
    FallThrough,
    /// `;;&`: keep testing the remaining patterns.
    Continue,
}

/// `select VAR [in WORDS]; do ...; done`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectNode {
    pub variable: String,
    pub words: Option<Vec<WordItem>>,
    pub body: Vec<StatementNode>,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

/// `(( expr ))` as a command: exit 0 when the expression is nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct ArithEvalNode {
    pub expression: String,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
    pub line: usize,
}

/// `[[ expr ]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TestNode {
    pub expression: TestExprNode,
    pub redirects: Vec<RedirectNode>,
    pub context: ExecutionContext,
}

// =============================================================================
// FUNCTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefNode {
    pub name: String,
    pub body: Box<CompoundCommandNode>,
    pub redirects: Vec<RedirectNode>,
    pub line: usize,
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    In,          // <
    Out,         // >
    Append,      // >>
    Heredoc,     // <<
    HeredocStrip, // <<-
    HereString,  // <<<
    DupOut,      // >&
    DupIn,       // <&
    Clobber,     // >|
    ReadWrite,   // <>
}

impl RedirectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "<",
            Self::Out => ">",
            Self::Append => ">>",
            Self::Heredoc => "<<",
            Self::HeredocStrip => "<<-",
            Self::HereString => "<<<",
            Self::DupOut => ">&",
            Self::DupIn => "<&",
            Self::Clobber => ">|",
            Self::ReadWrite => "<>",
        }
    }

    /// Default file descriptor when no numeric prefix is given.
    pub fn default_fd(&self) -> i32 {
        match self {
            Self::In | Self::Heredoc | Self::HeredocStrip | Self::HereString | Self::DupIn
            | Self::ReadWrite => 0,
            Self::Out | Self::Append | Self::DupOut | Self::Clobber => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirectNode {
    pub kind: RedirectKind,
    /// Explicit source fd (`2>`), if given.
    pub fd: Option<i32>,
    /// Target word: filename, fd number, `-`, or here-string word.
    pub target: WordItem,
    /// Present for `<<` / `<<-` once the body has been attached.
    pub heredoc: Option<HeredocBody>,
}

/// Heredoc body captured at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct HeredocBody {
    pub delimiter: String,
    /// A quoted delimiter disables expansion of the body at evaluation.
    pub quoted_delimiter: bool,
    pub body: String,
}

// =============================================================================
// TEST EXPRESSIONS (for [[ ... ]])
// =============================================================================

/// Precedence inside `[[ ... ]]`: `||` < `&&` < `!` < primary.
#[derive(Debug, Clone, PartialEq)]
pub enum TestExprNode {
    Unary {
        op: String,
        operand: WordItem,
    },
    Binary {
        op: String,
        left: WordItem,
        right: WordItem,
    },
    Word(WordItem),
    Not(Box<TestExprNode>),
    And(Box<TestExprNode>, Box<TestExprNode>),
    Or(Box<TestExprNode>, Box<TestExprNode>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_command_parallel_sequences() {
        let mut cmd = SimpleCommandNode::default();
        cmd.push_arg("echo".into(), TokenType::Word, QuoteType::None);
        cmd.push_arg("hi there".into(), TokenType::String, QuoteType::Double);
        assert_eq!(cmd.args.len(), cmd.arg_token_kinds.len());
        assert_eq!(cmd.args.len(), cmd.quote_types.len());
    }

    #[test]
    fn test_redirect_default_fds() {
        assert_eq!(RedirectKind::In.default_fd(), 0);
        assert_eq!(RedirectKind::Out.default_fd(), 1);
        assert_eq!(RedirectKind::Append.default_fd(), 1);
        assert_eq!(RedirectKind::Heredoc.default_fd(), 0);
        assert_eq!(RedirectKind::DupOut.default_fd(), 1);
    }

    #[test]
    fn test_compound_context_flip() {
        let mut node = CompoundCommandNode::If(IfNode {
            clauses: vec![],
            else_body: None,
            redirects: vec![],
            context: ExecutionContext::Statement,
        });
        assert_eq!(node.context(), ExecutionContext::Statement);
        node.set_pipeline_context();
        assert_eq!(node.context(), ExecutionContext::Pipeline);
    }
}
