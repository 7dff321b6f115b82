//! Parser module
//!
//! Lowers a token stream directly into a [`Module`]: there is no AST
//! stage, each statement compiles to stack-machine instructions as it is
//! read. Parsing runs in two passes so function names resolve regardless
//! of definition order: pass one collects every function and native
//! declaration, pass two compiles bodies.
//!
//! Surface grammar:
//!
//! ```text
//! module        := { function-def | native-decl }*
//! function-def  := '(' name param* [ ':' local* ] ')' [ '->' int ] body 'end'
//! native-decl   := '*' '(' name param* ')' [ '->' int ]
//! param         := Identifier | '(' Identifier* ')'
//! body          := { statement }*
//! statement     := literal | name | ':' name | '->' name | operator
//!                | 'if' cond ':' body [ 'else' body ] 'end'
//! ```
//!
//! A bare name calls the local, function or native it resolves to (locals
//! are pushed, not called); `:name` pushes a first-class reference;
//! `-> name` pops into an existing local. Extra locals declared after the
//! `:` in a header start out Void.

use tracing::debug;

use crate::frontend::lexer::{tokenize, tokens::Token, tokens::TokenKind};
use crate::runtime::debug::{BlockDebugSymbol, FunctionDebugInfo};
use crate::runtime::module::{FunctionDefinition, Module};
use crate::runtime::value::Value;
use crate::util::span::Span;
use crate::vm::instructions::Instruction;

/// Compile-time error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Structural errors that fit no more specific kind
    Error,
    UnexpectedToken,
    NegativeResultCount,
    UsageOfUndeclaredLocal,
    UsageOfUndeclaredFunction,
    UsageOfUndeclaredNativeFunction,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParseErrorKind::Error => "parse error",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::NegativeResultCount => "negative result count",
            ParseErrorKind::UsageOfUndeclaredLocal => "usage of undeclared local",
            ParseErrorKind::UsageOfUndeclaredFunction => "usage of undeclared function",
            ParseErrorKind::UsageOfUndeclaredNativeFunction => {
                "usage of undeclared native function"
            }
        };
        write!(f, "{}", name)
    }
}

/// Parse error: kind, offending token and a human readable message
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} at {position}: {message}", position = .token.span.start)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub token: Token,
    pub message: String,
}

/// Pending body compilation recorded by pass one
struct PendingFunction {
    module_index: usize,
    declared_returns: Option<usize>,
    locals: Vec<String>,
    body_start: usize,
    name_token: Token,
}

/// Parsed function header
struct FunctionHeader {
    name: String,
    name_token: Token,
    locals: Vec<String>,
    arity: usize,
    declared_returns: Option<usize>,
}

/// Per-function compilation state.
///
/// `locals` is the ordered bindings list from the header; duplicate names
/// shadow earlier ones, so resolution scans from the end (last wins).
struct FunctionBody<'f> {
    locals: &'f [String],
    code: Vec<Instruction>,
    blocks: Vec<BlockDebugSymbol>,
}

impl FunctionBody<'_> {
    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|local| local == name)
    }
}

/// Two-pass parser lowering source text into a [`Module`]
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    last_error: Option<ParseError>,
}

impl<'a> Parser<'a> {
    /// Create a parser over `source`
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: Vec::new(),
            pos: 0,
            last_error: None,
        }
    }

    /// The source text this parser reads
    pub fn source(&self) -> &str {
        self.source
    }

    /// Compile the whole source into `module`.
    ///
    /// On error the module is left untouched: compilation happens on a
    /// scratch copy that only replaces `module` on success. The error is
    /// also retained for [`Parser::last_error`] style re-reads.
    pub fn parse_into_module(&mut self, module: &mut Module) -> Result<(), ParseError> {
        let result = self.parse_impl(module);
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    /// The last error, if parsing failed
    pub fn last_error(&self) -> Option<&ParseError> {
        self.last_error.as_ref()
    }

    /// Offending token of the last error
    pub fn last_error_token(&self) -> Option<&Token> {
        self.last_error.as_ref().map(|err| &err.token)
    }

    /// Message of the last error
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_ref().map(|err| err.message.as_str())
    }

    fn parse_impl(&mut self, module: &mut Module) -> Result<(), ParseError> {
        self.tokens = match tokenize(self.source) {
            Ok(tokens) => tokens,
            Err(lex_error) => {
                let token = Token::new(TokenKind::None, Span::at(lex_error.position()));
                return Err(self.set_error(
                    ParseErrorKind::UnexpectedToken,
                    &token,
                    lex_error.to_string(),
                ));
            }
        };
        self.pos = 0;

        // Compile against a scratch copy so errors never leave a
        // half-filled module behind.
        let mut scratch = module.clone();
        let mut pending = Vec::new();

        // Pass one: declarations
        while !self.at_end() {
            let token = self.current().clone();
            match token.kind {
                TokenKind::Star => {
                    self.bump();
                    let header = self.parse_header(true)?;
                    let def = FunctionDefinition {
                        name: header.name,
                        arity: header.arity,
                        returns: header.declared_returns.unwrap_or(0),
                        stack_arity: 0,
                        locals_count: header.arity,
                        code: Vec::new(),
                        debug: FunctionDebugInfo {
                            definition: header.name_token.span,
                            blocks: Vec::new(),
                        },
                    };
                    scratch.declare_native(def);
                }
                TokenKind::OpenParenth => {
                    let header = self.parse_header(false)?;
                    let body_start = self.pos;
                    self.skip_body(&header.name_token)?;
                    let def = FunctionDefinition {
                        name: header.name.clone(),
                        arity: header.arity,
                        // Placeholder until pass two infers the real
                        // count; annotated functions keep this value.
                        returns: header.declared_returns.unwrap_or(0),
                        stack_arity: 0,
                        locals_count: header.locals.len(),
                        code: Vec::new(),
                        debug: FunctionDebugInfo {
                            definition: header.name_token.span,
                            blocks: Vec::new(),
                        },
                    };
                    let module_index = scratch.add_function(def);
                    pending.push(PendingFunction {
                        module_index,
                        declared_returns: header.declared_returns,
                        locals: header.locals,
                        body_start,
                        name_token: header.name_token,
                    });
                }
                _ => {
                    return Err(self.set_error(
                        ParseErrorKind::UnexpectedToken,
                        &token,
                        "expected a function definition or a native declaration",
                    ));
                }
            }
        }

        // Pass two: bodies, in declaration order
        for function in pending {
            self.compile_function(&mut scratch, function)?;
        }

        *module = scratch;
        Ok(())
    }

    /// Header: `'(' name param* [':' local*] ')' ['->' int]`.
    /// The leading `*` of native declarations is already consumed.
    fn parse_header(&mut self, is_native: bool) -> Result<FunctionHeader, ParseError> {
        self.expect(TokenKind::OpenParenth, "expected `(` to open a header")?;

        let name_token = self.current().clone();
        let Some(name) = name_token.identifier().map(str::to_owned) else {
            return Err(self.set_error(
                ParseErrorKind::UnexpectedToken,
                &name_token,
                "expected a function name",
            ));
        };
        self.bump();

        let mut params: Vec<String> = Vec::new();
        let mut extras: Vec<String> = Vec::new();
        let mut in_extras = false;
        loop {
            let token = self.current().clone();
            match &token.kind {
                TokenKind::Identifier(param) => {
                    self.bump();
                    if in_extras {
                        extras.push(param.clone());
                    } else {
                        params.push(param.clone());
                    }
                }
                // Parameters may be grouped: `*(println!(msg))`
                TokenKind::OpenParenth => {
                    self.bump();
                    loop {
                        let inner = self.current().clone();
                        match &inner.kind {
                            TokenKind::Identifier(param) => {
                                self.bump();
                                if in_extras {
                                    extras.push(param.clone());
                                } else {
                                    params.push(param.clone());
                                }
                            }
                            TokenKind::CloseParenth => {
                                self.bump();
                                break;
                            }
                            _ => {
                                return Err(self.set_error(
                                    ParseErrorKind::UnexpectedToken,
                                    &inner,
                                    "expected a parameter name or `)`",
                                ));
                            }
                        }
                    }
                }
                TokenKind::Colon => {
                    if is_native {
                        return Err(self.set_error(
                            ParseErrorKind::UnexpectedToken,
                            &token,
                            "native declarations cannot declare extra locals",
                        ));
                    }
                    self.bump();
                    in_extras = true;
                }
                TokenKind::CloseParenth => {
                    self.bump();
                    break;
                }
                _ => {
                    return Err(self.set_error(
                        ParseErrorKind::UnexpectedToken,
                        &token,
                        "expected a parameter name, `:` or `)`",
                    ));
                }
            }
        }

        let declared_returns = self.parse_returns_annotation()?;

        let arity = params.len();
        let mut locals = params;
        locals.extend(extras);

        Ok(FunctionHeader {
            name,
            name_token,
            locals,
            arity,
            declared_returns,
        })
    }

    /// Optional `-> N` result-count annotation
    fn parse_returns_annotation(&mut self) -> Result<Option<usize>, ParseError> {
        if self.current().kind != TokenKind::RightArrow {
            return Ok(None);
        }
        self.bump();

        let negative = if self.current().kind == TokenKind::Minus {
            self.bump();
            true
        } else {
            false
        };

        let token = self.current().clone();
        let TokenKind::IntegerLiteral(count) = token.kind else {
            return Err(self.set_error(
                ParseErrorKind::UnexpectedToken,
                &token,
                "expected a result count after `->`",
            ));
        };
        self.bump();

        if negative {
            return Err(self.set_error(
                ParseErrorKind::NegativeResultCount,
                &token,
                "result count cannot be negative",
            ));
        }
        Ok(Some(count as usize))
    }

    /// Skip a function body (pass one), leaving `pos` after its `end`
    fn skip_body(&mut self, name_token: &Token) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::KwIf => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::KwEnd => {
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                TokenKind::EndOfFile => {
                    return Err(self.set_error(
                        ParseErrorKind::UnexpectedToken,
                        name_token,
                        "function body is missing its `end`",
                    ));
                }
                _ => self.bump(),
            }
        }
    }

    /// Pass two for one function: compile its body and finalize the
    /// definition registered by pass one.
    fn compile_function(
        &mut self,
        module: &mut Module,
        function: PendingFunction,
    ) -> Result<(), ParseError> {
        self.pos = function.body_start;

        let mut body = FunctionBody {
            locals: &function.locals,
            code: Vec::new(),
            blocks: Vec::new(),
        };
        body.blocks.push(BlockDebugSymbol {
            span: self.current().span,
            code_offset: 0,
        });

        let (delta, _end_token) =
            self.compile_statements(module, &mut body, &[TokenKind::KwEnd])?;

        if delta < 0 {
            return Err(self.set_error(
                ParseErrorKind::NegativeResultCount,
                &function.name_token,
                "function body consumes more values than it produces",
            ));
        }
        let produced = delta as usize;
        let returns = match function.declared_returns {
            Some(declared) => {
                if declared > produced {
                    return Err(self.set_error(
                        ParseErrorKind::NegativeResultCount,
                        &function.name_token,
                        format!(
                            "function declares {} results but its body produces {}",
                            declared, produced
                        ),
                    ));
                }
                declared
            }
            None => produced,
        };

        body.code.push(Instruction::Return);

        let def = &mut module.functions[function.module_index];
        def.returns = returns;
        def.code = body.code;
        def.debug.blocks = body.blocks;
        debug!(
            function = %def.name,
            instructions = def.code.len(),
            returns = def.returns,
            "compiled function"
        );
        Ok(())
    }

    /// Compile statements until one of `terminators` shows up; consumes
    /// and returns the terminator. The returned delta is the net stack
    /// effect of the compiled statements.
    fn compile_statements(
        &mut self,
        module: &mut Module,
        body: &mut FunctionBody<'_>,
        terminators: &[TokenKind],
    ) -> Result<(isize, Token), ParseError> {
        let mut delta = 0isize;
        loop {
            let token = self.current().clone();
            if terminators.contains(&token.kind) {
                self.bump();
                return Ok((delta, token));
            }
            match &token.kind {
                TokenKind::IntegerLiteral(value) => {
                    self.bump();
                    let index = module.add_constant((*value).into());
                    body.code.push(Instruction::PushConst(index));
                    delta += 1;
                }
                TokenKind::DoubleLiteral(value) => {
                    self.bump();
                    let index = module.add_constant((*value).into());
                    body.code.push(Instruction::PushConst(index));
                    delta += 1;
                }
                TokenKind::StringLiteral(bytes) => {
                    self.bump();
                    let index = module.add_constant(Value::String(bytes.clone().into()));
                    body.code.push(Instruction::PushConst(index));
                    delta += 1;
                }
                TokenKind::Identifier(name) => {
                    self.bump();
                    delta += self.compile_name(module, body, name, &token)?;
                }
                // A `:` outside a condition prefix introduces a
                // first-class function reference.
                TokenKind::Colon => {
                    self.bump();
                    let name_token = self.current().clone();
                    let Some(name) = name_token.identifier() else {
                        return Err(self.set_error(
                            ParseErrorKind::UnexpectedToken,
                            &name_token,
                            "expected a function name after `:`",
                        ));
                    };
                    self.bump();
                    let reference = if let Some(index) = module.find_function_by_name(name) {
                        Value::FunctionReference(index)
                    } else if let Some(index) = module.find_native_by_name(name) {
                        Value::NativeFunctionReference(index)
                    } else {
                        return Err(self.undeclared_callable(name, &name_token));
                    };
                    let index = module.add_constant(reference);
                    body.code.push(Instruction::PushConst(index));
                    delta += 1;
                }
                // `-> name` pops into an existing local
                TokenKind::RightArrow => {
                    self.bump();
                    let name_token = self.current().clone();
                    let Some(name) = name_token.identifier() else {
                        return Err(self.set_error(
                            ParseErrorKind::UnexpectedToken,
                            &name_token,
                            "expected a local name after `->`",
                        ));
                    };
                    self.bump();
                    let Some(index) = body.resolve_local(name) else {
                        return Err(self.set_error(
                            ParseErrorKind::UsageOfUndeclaredLocal,
                            &name_token,
                            format!("no local named `{}` in scope", name),
                        ));
                    };
                    body.code.push(Instruction::StoreLocal(index));
                    delta -= 1;
                }
                TokenKind::Plus => {
                    self.bump();
                    body.code.push(Instruction::Add);
                    delta -= 1;
                }
                TokenKind::Minus => {
                    self.bump();
                    body.code.push(Instruction::Sub);
                    delta -= 1;
                }
                TokenKind::Star => {
                    self.bump();
                    body.code.push(Instruction::Mul);
                    delta -= 1;
                }
                TokenKind::FullStop => {
                    self.bump();
                    body.code.push(Instruction::Concat);
                    delta -= 1;
                }
                TokenKind::Negate => {
                    self.bump();
                    body.code.push(Instruction::Neg);
                }
                TokenKind::Equals => {
                    self.bump();
                    body.code.push(Instruction::Eq);
                    delta -= 1;
                }
                TokenKind::NotEquals => {
                    self.bump();
                    body.code.push(Instruction::Neq);
                    delta -= 1;
                }
                TokenKind::Less => {
                    self.bump();
                    body.code.push(Instruction::Lt);
                    delta -= 1;
                }
                TokenKind::LessOrEqual => {
                    self.bump();
                    body.code.push(Instruction::Le);
                    delta -= 1;
                }
                TokenKind::More => {
                    self.bump();
                    body.code.push(Instruction::Gt);
                    delta -= 1;
                }
                TokenKind::MoreOrEqual => {
                    self.bump();
                    body.code.push(Instruction::Ge);
                    delta -= 1;
                }
                TokenKind::KwIf => {
                    delta += self.compile_if(module, body)?;
                }
                TokenKind::EndOfFile => {
                    return Err(self.set_error(
                        ParseErrorKind::UnexpectedToken,
                        &token,
                        "unexpected end of file inside a function body",
                    ));
                }
                _ => {
                    return Err(self.set_error(
                        ParseErrorKind::UnexpectedToken,
                        &token,
                        format!("`{}` cannot appear here", token.kind.name()),
                    ));
                }
            }
        }
    }

    /// A bare name: push a local, or call the function or native it
    /// resolves to. Returns the statement's stack effect.
    fn compile_name(
        &mut self,
        module: &mut Module,
        body: &mut FunctionBody<'_>,
        name: &str,
        token: &Token,
    ) -> Result<isize, ParseError> {
        if let Some(index) = body.resolve_local(name) {
            body.code.push(Instruction::LoadLocal(index));
            return Ok(1);
        }
        if let Some(index) = module.find_function_by_name(name) {
            let def = &module.functions[index];
            let effect =
                def.returns as isize - def.arity as isize - def.stack_arity as isize;
            body.code.push(Instruction::Call(index));
            return Ok(effect);
        }
        if let Some(index) = module.find_native_by_name(name) {
            let def = &module.native_bindings[index];
            let effect =
                def.returns as isize - def.arity as isize - def.stack_arity as isize;
            body.code.push(Instruction::CallNative(index));
            return Ok(effect);
        }
        Err(self.undeclared_callable(name, token))
    }

    /// `if cond ':' body ['else' body] 'end'`.
    ///
    /// The condition prefix may be empty, in which case the branch
    /// consumes whatever the preceding statements left on the stack.
    /// Both branches must agree on their stack effect; a missing `else`
    /// counts as an empty branch.
    fn compile_if(
        &mut self,
        module: &mut Module,
        body: &mut FunctionBody<'_>,
    ) -> Result<isize, ParseError> {
        // Consume `if`
        self.bump();

        let (cond_delta, _) = self.compile_statements(module, body, &[TokenKind::Colon])?;

        let jump_if_false_at = body.code.len();
        body.code.push(Instruction::JumpIfFalse(0));
        body.blocks.push(BlockDebugSymbol {
            span: self.current().span,
            code_offset: body.code.len(),
        });

        let (then_delta, branch_token) =
            self.compile_statements(module, body, &[TokenKind::KwElse, TokenKind::KwEnd])?;

        if branch_token.kind == TokenKind::KwElse {
            let jump_at = body.code.len();
            body.code.push(Instruction::Jump(0));
            body.code[jump_if_false_at] = Instruction::JumpIfFalse(body.code.len());
            body.blocks.push(BlockDebugSymbol {
                span: self.current().span,
                code_offset: body.code.len(),
            });

            let (else_delta, end_token) =
                self.compile_statements(module, body, &[TokenKind::KwEnd])?;
            body.code[jump_at] = Instruction::Jump(body.code.len());

            if then_delta != else_delta {
                return Err(self.set_error(
                    ParseErrorKind::Error,
                    &end_token,
                    format!(
                        "if and else branches have mismatched stack effects ({} vs {})",
                        then_delta, else_delta
                    ),
                ));
            }
            Ok(cond_delta - 1 + then_delta)
        } else {
            body.code[jump_if_false_at] = Instruction::JumpIfFalse(body.code.len());
            if then_delta != 0 {
                return Err(self.set_error(
                    ParseErrorKind::Error,
                    &branch_token,
                    "an if without else must leave the stack unchanged",
                ));
            }
            Ok(cond_delta - 1)
        }
    }

    fn undeclared_callable(&mut self, name: &str, token: &Token) -> ParseError {
        // Bang-suffixed names are native functions by convention, which
        // makes the more specific error kind possible here.
        let kind = if name.ends_with('!') {
            ParseErrorKind::UsageOfUndeclaredNativeFunction
        } else {
            ParseErrorKind::UsageOfUndeclaredFunction
        };
        self.set_error(
            kind,
            token,
            format!("no local, function or native function named `{}`", name),
        )
    }

    fn set_error(
        &mut self,
        kind: ParseErrorKind,
        token: &Token,
        message: impl Into<String>,
    ) -> ParseError {
        let error = ParseError {
            kind,
            token: token.clone(),
            message: message.into(),
        };
        self.last_error = Some(error.clone());
        error
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::EndOfFile)
    }

    /// Current token; the stream always ends with EndOfFile, which is
    /// sticky.
    fn current(&self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn bump(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<(), ParseError> {
        let token = self.current().clone();
        if token.kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(self.set_error(ParseErrorKind::UnexpectedToken, &token, message))
        }
    }
}

#[cfg(test)]
mod tests;
