//! Parser for the Pascal dialect.
//! Statements and declarations are parsed by recursive descent, expressions
//! with binding powers (Pratt parsing). Scopes are tracked while parsing so
//! that a bare identifier can be told apart from a parameterless call.

use super::UnitResolver;
use crate::analyzer::resolve::binary_result_type;
use crate::analyzer::symbols::SymbolTable;
use crate::analyzer::types::Type;
use crate::ast::*;
use crate::lexer::{Spanned, Token};
use crate::reporter::{CompilerError, ParserError};
use crate::utils::Location;
use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::Arc;

/// Errors are recorded in `Parser::errors` at the point of detection; the
/// `Err(())` only unwinds to the nearest recovery point.
type PResult<T> = Result<T, ()>;

// --- 1. parser state ---

pub struct Parser<'a> {
    tokens: &'a [Spanned],
    source: &'a str,
    file: Arc<str>,
    current: usize,
    errors: Vec<CompilerError>,

    symbols: SymbolTable,
    uses: Vec<String>,
    resolver: &'a mut dyn UnitResolver,
    /// Integer constants, for array bounds.
    constants: HashMap<String, i64>,

    // state of the routine being parsed
    function: Option<(String, bool)>,
    locals: Vec<(String, Type)>,
    loop_depth: usize,
    in_interface: bool,
}

// --- 2. parsing concerns ---

pub trait Parse {
    /// Consumes the parser and parses a whole unit.
    fn parse(self) -> (Option<Unit>, Vec<CompilerError>);
}

trait DeclarationParser {
    fn parse_unit(&mut self) -> PResult<Unit>;
    fn parse_declarations(&mut self);
    fn parse_uses(&mut self) -> PResult<()>;
    fn parse_const_section(&mut self, scope_id: usize) -> PResult<Vec<VariableDefinition>>;
    fn parse_var_section(&mut self, scope_id: usize) -> PResult<Vec<VariableDefinition>>;
    fn parse_type_section(&mut self) -> PResult<()>;
    fn parse_routine(&mut self) -> PResult<()>;
    fn parse_parameter_list(&mut self) -> PResult<Vec<Parameter>>;
    fn parse_routine_body(&mut self, function: &FunctionDefinition) -> PResult<Block>;
}

trait StatementParser {
    fn parse_statement_list(&mut self) -> Vec<Node>;
    fn parse_statement(&mut self) -> PResult<Option<Node>>;
    fn parse_nested_statement(&mut self) -> PResult<Node>;
    fn parse_compound(&mut self) -> PResult<Node>;
    fn parse_if(&mut self) -> PResult<Node>;
    fn parse_while(&mut self) -> PResult<Node>;
    fn parse_for(&mut self) -> PResult<Node>;
    fn parse_repeat(&mut self) -> PResult<Node>;
    fn parse_simple_statement(&mut self) -> PResult<Node>;
}

trait ExpressionParser {
    fn parse_expression(&mut self, min_bp: u8) -> PResult<Node>;
    fn parse_prefix(&mut self) -> PResult<Node>;
    fn parse_atom(&mut self) -> PResult<Node>;
    fn parse_identifier(&mut self, name: String, loc: Location) -> PResult<Node>;
    fn parse_postfix(&mut self, left: Node) -> PResult<Node>;
    fn parse_call_arguments(&mut self) -> PResult<(Vec<Node>, Location, Option<String>)>;
}

trait TypeParser {
    fn parse_type(&mut self, name: Option<&str>) -> PResult<Type>;
    fn parse_bound(&mut self) -> PResult<i64>;
}

trait Util {
    fn peek(&self) -> Option<&Token>;
    fn loc(&self) -> Location;
    fn previous_loc(&self) -> Location;
    fn is_at_end(&self) -> bool;
    fn advance(&mut self) -> Location;
    fn check(&self, token: &Token) -> bool;
    fn check_word(&self, word: &str) -> bool;
    fn match_token(&mut self, token: &Token) -> bool;
    fn consume(&mut self, token: &Token, expected: &str) -> PResult<Location>;
    fn consume_ident(&mut self, expected: &str) -> PResult<(String, Location)>;
    fn expected(&mut self, expected: &str);
    fn report(&mut self, error: ParserError);
    fn synchronize(&mut self);

    fn is_variable(&self, name: &str) -> bool;
    fn constant_type(&self, node: &Node) -> Type;
    fn constant_value(&self, node: &Node) -> Option<i64>;
    fn declare_global(&mut self, var: VariableDefinition);
    fn declare_local(&mut self, block: &mut Block, var: VariableDefinition);
    fn declare_function(&mut self, function: FunctionDefinition);

    fn prefix_binding_power(token: &Token) -> Option<((), u8)>;
    fn infix_binding_power(token: &Token) -> Option<(u8, u8)>;
    fn postfix_binding_power(token: &Token) -> Option<(u8, ())>;
}

// --- 3. construction and entry ---

impl<'a> Parser<'a> {
    pub fn new(
        tokens: &'a [Spanned],
        source: &'a str,
        file: Arc<str>,
        resolver: &'a mut dyn UnitResolver,
    ) -> Self {
        Self {
            tokens,
            source,
            file,
            current: 0,
            errors: Vec::new(),
            symbols: SymbolTable::new(),
            uses: Vec::new(),
            resolver,
            constants: HashMap::new(),
            function: None,
            locals: Vec::new(),
            loop_depth: 0,
            in_interface: false,
        }
    }
}

impl<'a> Parse for Parser<'a> {
    fn parse(mut self) -> (Option<Unit>, Vec<CompilerError>) {
        let unit = self.parse_unit().ok();
        if unit.is_some() && !self.is_at_end() {
            self.expected("end of file");
        }
        (unit, self.errors)
    }
}

// --- 4. declarations ---

impl<'a> DeclarationParser for Parser<'a> {
    fn parse_unit(&mut self) -> PResult<Unit> {
        let start = self.loc();
        let kind = if self.match_token(&Token::Program) {
            UnitKind::Program
        } else if self.match_token(&Token::Unit) {
            UnitKind::Library
        } else {
            self.expected("`program` or `unit`");
            return Err(());
        };
        let (name, _) = self.consume_ident("a unit name")?;
        self.consume(&Token::Semicolon, "`;`")?;
        if self.match_token(&Token::Interface) {
            self.in_interface = true;
        }

        self.parse_declarations();

        let mut body = Block::new(name.clone(), self.loc());
        if self.check(&Token::Begin) || self.check_word("initialization") {
            self.advance();
            body.statements = self.parse_statement_list();
            self.consume(&Token::End, "`end`")?;
        } else if kind == UnitKind::Library && self.match_token(&Token::End) {
            // a unit without an initialization part
        } else {
            self.expected("`begin`");
            return Err(());
        }
        self.consume(&Token::Dot, "`.` after the final `end`")?;

        Ok(Unit {
            kind,
            name,
            uses: std::mem::take(&mut self.uses),
            symbols: std::mem::take(&mut self.symbols),
            body,
            loc: start,
        })
    }

    fn parse_declarations(&mut self) {
        loop {
            let result = match self.peek() {
                Some(Token::Uses) => self.parse_uses(),
                Some(Token::Const) => self.parse_const_section(0).map(|vars| {
                    for var in vars {
                        self.declare_global(var);
                    }
                }),
                Some(Token::Var) => self.parse_var_section(0).map(|vars| {
                    for var in vars {
                        self.declare_global(var);
                    }
                }),
                Some(Token::Type) => self.parse_type_section(),
                Some(Token::Function | Token::Procedure) => self.parse_routine(),
                Some(Token::Implementation) => {
                    self.advance();
                    self.in_interface = false;
                    Ok(())
                }
                _ => break,
            };
            if result.is_err() {
                self.synchronize();
            }
        }
    }

    fn parse_uses(&mut self) -> PResult<()> {
        self.advance();
        loop {
            let (name, loc) = self.consume_ident("a unit name")?;
            // `system` is always available.
            if name != "system" && !self.uses.contains(&name) {
                match self.resolver.resolve(&name, &loc) {
                    Ok(symbols) => self.symbols.import(symbols),
                    Err(errors) => self.errors.extend(errors),
                }
                self.uses.push(name);
            }
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.consume(&Token::Semicolon, "`;`")?;
        Ok(())
    }

    fn parse_const_section(&mut self, scope_id: usize) -> PResult<Vec<VariableDefinition>> {
        self.advance();
        let mut constants = Vec::new();
        while let Some(Token::Ident(_)) = self.peek() {
            let (name, loc) = self.consume_ident("a constant name")?;
            let declared = if self.match_token(&Token::Colon) { Some(self.parse_type(None)?) } else { None };
            self.consume(&Token::Eq, "`=`")?;
            let value = self.parse_expression(0)?;
            self.consume(&Token::Semicolon, "`;`")?;

            let ty = match declared {
                Some(ty) => ty,
                None => self.constant_type(&value),
            };
            if ty.is_unknown() {
                self.report(ParserError::invalid(format!("cannot infer the type of constant `{}`", name), &loc));
                continue;
            }
            if let Some(v) = self.constant_value(&value) {
                self.constants.insert(name.clone(), v);
            }
            constants.push(VariableDefinition {
                name,
                ty,
                scope_id,
                initializer: Some(value),
                is_constant: true,
                loc,
            });
        }
        Ok(constants)
    }

    fn parse_var_section(&mut self, scope_id: usize) -> PResult<Vec<VariableDefinition>> {
        self.advance();
        let mut vars = Vec::new();
        while let Some(Token::Ident(_)) = self.peek() {
            let mut names = vec![self.consume_ident("a variable name")?];
            while self.match_token(&Token::Comma) {
                names.push(self.consume_ident("a variable name")?);
            }
            self.consume(&Token::Colon, "`:`")?;
            let ty = self.parse_type(None)?;
            let initializer = if self.match_token(&Token::Eq) { Some(self.parse_expression(0)?) } else { None };
            self.consume(&Token::Semicolon, "`;`")?;

            for (name, loc) in names {
                vars.push(VariableDefinition {
                    name,
                    ty: ty.clone(),
                    scope_id,
                    initializer: initializer.clone(),
                    is_constant: false,
                    loc,
                });
            }
        }
        Ok(vars)
    }

    fn parse_type_section(&mut self) -> PResult<()> {
        self.advance();
        while let Some(Token::Ident(_)) = self.peek() {
            let (name, _) = self.consume_ident("a type name")?;
            self.consume(&Token::Eq, "`=`")?;
            let ty = self.parse_type(Some(&name))?;
            self.consume(&Token::Semicolon, "`;`")?;
            self.symbols.add_type(name, ty);
        }
        Ok(())
    }

    fn parse_routine(&mut self) -> PResult<()> {
        let is_procedure = self.check(&Token::Procedure);
        let start = self.advance();
        let (name, _) = self.consume_ident("a routine name")?;
        let params = if self.check(&Token::LParen) { self.parse_parameter_list()? } else { Vec::new() };
        let return_type = if is_procedure {
            Type::Unknown
        } else {
            self.consume(&Token::Colon, "`:` and a return type")?;
            self.parse_type(None)?
        };
        self.consume(&Token::Semicolon, "`;`")?;

        let mut function = FunctionDefinition {
            name,
            link_name: None,
            library: None,
            params,
            body: None,
            is_procedure,
            is_variadic: false,
            is_external: false,
            return_type,
            loc: start,
        };

        // directives
        let mut is_forward = self.in_interface;
        loop {
            let word = match self.peek() {
                Some(Token::Ident(word)) => word.clone(),
                _ => break,
            };
            match word.as_str() {
                "cdecl" | "overload" | "inline" | "stdcall" | "register" => {
                    self.advance();
                }
                "varargs" => {
                    self.advance();
                    function.is_variadic = true;
                }
                "forward" => {
                    self.advance();
                    is_forward = true;
                }
                "external" => {
                    self.advance();
                    function.is_external = true;
                    if let Some(Token::String(library)) = self.peek() {
                        function.library = Some(String::from_utf8_lossy(library).into_owned());
                        self.advance();
                    }
                    if self.check_word("name") {
                        self.advance();
                        match self.peek() {
                            Some(Token::String(link)) => {
                                function.link_name = Some(String::from_utf8_lossy(link).into_owned());
                                self.advance();
                            }
                            _ => {
                                self.expected("a quoted symbol name");
                                return Err(());
                            }
                        }
                    }
                }
                _ => break,
            }
            self.consume(&Token::Semicolon, "`;`")?;
        }

        if function.is_external || is_forward {
            self.declare_function(function);
            return Ok(());
        }

        // Register the header first so the body can call itself.
        if self.symbols.function_by_signature(&function.signature()).is_none() {
            self.declare_function(function.clone());
        }
        self.function = Some((function.name.clone(), function.is_procedure));
        self.locals = function.params.iter().map(|p| (p.name.clone(), p.ty.clone())).collect();
        let body = self.parse_routine_body(&function);
        self.function = None;
        self.locals.clear();

        function.body = Some(body?);
        self.declare_function(function);
        Ok(())
    }

    fn parse_parameter_list(&mut self) -> PResult<Vec<Parameter>> {
        self.consume(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if self.match_token(&Token::RParen) {
            return Ok(params);
        }
        loop {
            let is_reference = if self.match_token(&Token::Var) {
                true
            } else if self.check_word("out") {
                self.advance();
                true
            } else {
                // `const` parameters are passed like value parameters.
                self.match_token(&Token::Const);
                false
            };
            let mut names = vec![self.consume_ident("a parameter name")?];
            while self.match_token(&Token::Comma) {
                names.push(self.consume_ident("a parameter name")?);
            }
            self.consume(&Token::Colon, "`:`")?;
            let ty = self.parse_type(None)?;
            for (name, loc) in names {
                if params.iter().any(|p: &Parameter| p.name == name) {
                    self.report(ParserError::invalid(format!("duplicate parameter `{}`", name), &loc));
                    continue;
                }
                params.push(Parameter { name, ty: ty.clone(), is_reference, loc });
            }
            if !self.match_token(&Token::Semicolon) {
                break;
            }
        }
        self.consume(&Token::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_routine_body(&mut self, function: &FunctionDefinition) -> PResult<Block> {
        let mut block = Block::new(function.name.clone(), function.loc.clone());
        loop {
            match self.peek() {
                Some(Token::Var) => {
                    for var in self.parse_var_section(1)? {
                        self.declare_local(&mut block, var);
                    }
                }
                Some(Token::Const) => {
                    for var in self.parse_const_section(1)? {
                        self.declare_local(&mut block, var);
                    }
                }
                Some(Token::Type) => self.parse_type_section()?,
                Some(Token::Function | Token::Procedure) => {
                    self.report(ParserError::invalid("nested routines are not supported", &self.loc()));
                    return Err(());
                }
                _ => break,
            }
        }
        self.consume(&Token::Begin, "`begin`")?;
        block.statements = self.parse_statement_list();
        self.consume(&Token::End, "`end`")?;
        self.consume(&Token::Semicolon, "`;`")?;
        Ok(block)
    }
}

// --- 5. statements ---

impl<'a> StatementParser for Parser<'a> {
    /// Parses statements up to (not including) `end`/`until`, recovering at
    /// statement boundaries.
    fn parse_statement_list(&mut self) -> Vec<Node> {
        let mut statements = Vec::new();
        loop {
            if self.is_at_end() || self.check(&Token::End) || self.check(&Token::Until) {
                break;
            }
            if self.match_token(&Token::Semicolon) {
                continue;
            }
            match self.parse_statement() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => {}
                Err(()) => {
                    self.synchronize();
                    continue;
                }
            }
            if !self.check(&Token::End) && !self.check(&Token::Until) && self.consume(&Token::Semicolon, "`;`").is_err() {
                self.synchronize();
            }
        }
        statements
    }

    fn parse_statement(&mut self) -> PResult<Option<Node>> {
        let statement = match self.peek() {
            Some(Token::Begin) => self.parse_compound()?,
            Some(Token::If) => self.parse_if()?,
            Some(Token::While) => self.parse_while()?,
            Some(Token::For) => self.parse_for()?,
            Some(Token::Repeat) => self.parse_repeat()?,
            Some(Token::Break | Token::Continue) => {
                let is_break = self.check(&Token::Break);
                let loc = self.advance();
                if self.loop_depth == 0 {
                    let keyword = if is_break { "break" } else { "continue" };
                    self.report(ParserError::invalid(format!("`{}` outside of a loop", keyword), &loc));
                    return Ok(None);
                }
                Node::new(if is_break { NodeKind::Break } else { NodeKind::Continue }, loc)
            }
            Some(Token::Ident(_)) => self.parse_simple_statement()?,
            Some(Token::Else | Token::End | Token::Until) => return Ok(None),
            _ => {
                self.expected("a statement");
                return Err(());
            }
        };
        Ok(Some(statement))
    }

    /// A statement in a nested position; an empty statement becomes an empty block.
    fn parse_nested_statement(&mut self) -> PResult<Node> {
        let loc = self.loc();
        Ok(self.parse_statement()?.unwrap_or_else(|| Node::new(NodeKind::Block(Block::new("empty", loc.clone())), loc)))
    }

    fn parse_compound(&mut self) -> PResult<Node> {
        let start = self.advance();
        let statements = self.parse_statement_list();
        let end = self.consume(&Token::End, "`end`")?;
        let mut block = Block::new("begin", start.to(&end));
        block.statements = statements;
        Ok(Node::new(NodeKind::Block(block), start.to(&end)))
    }

    fn parse_if(&mut self) -> PResult<Node> {
        let start = self.advance();
        let condition = self.parse_expression(0)?;
        self.consume(&Token::Then, "`then`")?;
        let then_branch = self.parse_nested_statement()?;
        let else_branch = if self.match_token(&Token::Else) { Some(Box::new(self.parse_nested_statement()?)) } else { None };
        let end = self.previous_loc();
        Ok(Node::new(
            NodeKind::If { condition: Box::new(condition), then_branch: Box::new(then_branch), else_branch },
            start.to(&end),
        ))
    }

    fn parse_while(&mut self) -> PResult<Node> {
        let start = self.advance();
        let condition = self.parse_expression(0)?;
        self.consume(&Token::Do, "`do`")?;
        self.loop_depth += 1;
        let body = self.parse_nested_statement();
        self.loop_depth -= 1;
        let body = body?;
        let loc = start.to(&body.loc);
        Ok(Node::new(NodeKind::While { condition: Box::new(condition), body: Box::new(body) }, loc))
    }

    fn parse_for(&mut self) -> PResult<Node> {
        let start = self.advance();
        let (variable, _) = self.consume_ident("a loop variable")?;
        self.consume(&Token::Assign, "`:=`")?;
        let first = self.parse_expression(0)?;
        let descending = if self.match_token(&Token::Downto) {
            true
        } else {
            self.consume(&Token::To, "`to` or `downto`")?;
            false
        };
        let last = self.parse_expression(0)?;
        self.consume(&Token::Do, "`do`")?;
        self.loop_depth += 1;
        let body = self.parse_nested_statement();
        self.loop_depth -= 1;
        let body = body?;
        let loc = start.to(&body.loc);
        Ok(Node::new(
            NodeKind::For {
                variable,
                start: Box::new(first),
                end: Box::new(last),
                descending,
                body: Box::new(body),
            },
            loc,
        ))
    }

    fn parse_repeat(&mut self) -> PResult<Node> {
        let start = self.advance();
        self.loop_depth += 1;
        let statements = self.parse_statement_list();
        self.loop_depth -= 1;
        self.consume(&Token::Until, "`until`")?;
        let condition = self.parse_expression(0)?;
        let mut body = Block::new("repeat", start.clone());
        body.statements = statements;
        let loc = start.to(&condition.loc);
        Ok(Node::new(NodeKind::Repeat { body, condition: Box::new(condition) }, loc))
    }

    /// An assignment or a procedure call.
    fn parse_simple_statement(&mut self) -> PResult<Node> {
        let target = self.parse_expression(0)?;
        if self.match_token(&Token::Assign) {
            if !target.is_lvalue() {
                self.report(ParserError::invalid("cannot assign to this expression", &target.loc));
            }
            let value = self.parse_expression(0)?;
            let loc = target.loc.to(&value.loc);
            return Ok(Node::new(NodeKind::Assignment { target: Box::new(target), value: Box::new(value) }, loc));
        }
        match target.kind {
            NodeKind::Call { .. } | NodeKind::SystemCall { .. } => Ok(target),
            _ => {
                self.report(ParserError::invalid("expected a statement, found an expression", &target.loc));
                Err(())
            }
        }
    }
}

// --- 6. expressions ---

impl<'a> ExpressionParser for Parser<'a> {
    fn parse_expression(&mut self, min_bp: u8) -> PResult<Node> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(token) = self.peek() else { break };

            if let Some((l_bp, ())) = Self::postfix_binding_power(token) {
                if l_bp < min_bp {
                    break;
                }
                left = self.parse_postfix(left)?;
                continue;
            }

            if let Some((l_bp, r_bp)) = Self::infix_binding_power(token) {
                if l_bp < min_bp {
                    break;
                }
                let token = token.clone();
                self.advance();
                let right = self.parse_expression(r_bp)?;
                let loc = left.loc.to(&right.loc);
                let (lhs, rhs) = (Box::new(left), Box::new(right));
                let kind = match token {
                    Token::Eq => NodeKind::Comparison { op: ComparisonOperator::Eq, lhs, rhs },
                    Token::NotEq => NodeKind::Comparison { op: ComparisonOperator::NotEq, lhs, rhs },
                    Token::Lt => NodeKind::Comparison { op: ComparisonOperator::Lt, lhs, rhs },
                    Token::LtEq => NodeKind::Comparison { op: ComparisonOperator::LtEq, lhs, rhs },
                    Token::Gt => NodeKind::Comparison { op: ComparisonOperator::Gt, lhs, rhs },
                    Token::GtEq => NodeKind::Comparison { op: ComparisonOperator::GtEq, lhs, rhs },
                    Token::Plus => NodeKind::Binary { op: BinaryOperator::Add, lhs, rhs },
                    Token::Minus => NodeKind::Binary { op: BinaryOperator::Sub, lhs, rhs },
                    Token::Or => NodeKind::Binary { op: BinaryOperator::Or, lhs, rhs },
                    Token::Xor => NodeKind::Binary { op: BinaryOperator::Xor, lhs, rhs },
                    Token::Star => NodeKind::Binary { op: BinaryOperator::Mul, lhs, rhs },
                    Token::Slash => NodeKind::Binary { op: BinaryOperator::Divide, lhs, rhs },
                    Token::Div => NodeKind::Binary { op: BinaryOperator::IntDiv, lhs, rhs },
                    Token::Mod => NodeKind::Binary { op: BinaryOperator::Mod, lhs, rhs },
                    Token::And => NodeKind::Binary { op: BinaryOperator::And, lhs, rhs },
                    Token::Shl => NodeKind::Binary { op: BinaryOperator::Shl, lhs, rhs },
                    Token::Shr => NodeKind::Binary { op: BinaryOperator::Shr, lhs, rhs },
                    _ => unreachable!("token has an infix binding power"),
                };
                left = Node::new(kind, loc);
                continue;
            }

            break;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> PResult<Node> {
        let Some(((), r_bp)) = self.peek().and_then(Self::prefix_binding_power) else {
            return self.parse_atom();
        };
        let token = self.peek().cloned();
        let start = self.advance();
        let operand = self.parse_expression(r_bp)?;
        let loc = start.to(&operand.loc);
        let kind = match (token, operand.kind) {
            // Fold negative literals so `-5` is a constant.
            (Some(Token::Minus), NodeKind::IntLiteral(value)) => NodeKind::IntLiteral(value.wrapping_neg()),
            (Some(Token::Minus), NodeKind::RealLiteral(value)) => NodeKind::RealLiteral(-value),
            (Some(Token::Plus), kind) => kind,
            (Some(Token::Minus), kind) => {
                NodeKind::Unary { op: UnaryOperator::Neg, operand: Box::new(Node::new(kind, operand.loc)) }
            }
            (Some(Token::Not), kind) => {
                NodeKind::Unary { op: UnaryOperator::Not, operand: Box::new(Node::new(kind, operand.loc)) }
            }
            (_, kind) => NodeKind::AddressOf(Box::new(Node::new(kind, operand.loc))),
        };
        Ok(Node::new(kind, loc))
    }

    fn parse_atom(&mut self) -> PResult<Node> {
        let Some(token) = self.peek().cloned() else {
            self.expected("an expression");
            return Err(());
        };
        let loc = self.loc();
        let kind = match token {
            Token::Integer(value) => NodeKind::IntLiteral(value),
            Token::Real(value) => NodeKind::RealLiteral(value),
            Token::Boolean(value) => NodeKind::BoolLiteral(value),
            Token::String(value) => NodeKind::StringLiteral(value),
            Token::CharCode(code) => NodeKind::CharLiteral(code),
            Token::Nil => NodeKind::NilLiteral,
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                let end = self.consume(&Token::RParen, "`)`")?;
                return Ok(Node::new(inner.kind, loc.to(&end)));
            }
            Token::Ident(name) => {
                self.advance();
                return self.parse_identifier(name, loc);
            }
            _ => {
                self.expected("an expression");
                return Err(());
            }
        };
        self.advance();
        Ok(Node::new(kind, loc))
    }

    /// A variable, a call, or a built-in routine.
    fn parse_identifier(&mut self, name: String, loc: Location) -> PResult<Node> {
        let system = if self.is_variable(&name) { None } else { SystemFunction::lookup(&name) };

        if self.check(&Token::LParen) {
            let (args, end, source_text) = self.parse_call_arguments()?;
            let kind = match system {
                Some(function) => NodeKind::SystemCall { function, args, source_text },
                None => NodeKind::Call { name, args },
            };
            return Ok(Node::new(kind, loc.to(&end)));
        }

        let kind = match system {
            _ if self.is_variable(&name) => NodeKind::Variable(name),
            Some(function) if function.allows_bare_call() => {
                NodeKind::SystemCall { function, args: Vec::new(), source_text: None }
            }
            _ if self.symbols.has_function(&name) => NodeKind::Call { name, args: Vec::new() },
            // Left for the lowering engine to report as unresolved.
            _ => NodeKind::Variable(name),
        };
        Ok(Node::new(kind, loc))
    }

    fn parse_postfix(&mut self, left: Node) -> PResult<Node> {
        let start = left.loc.clone();
        match self.peek() {
            Some(Token::LBracket) => {
                self.advance();
                let mut node = left;
                loop {
                    let index = self.parse_expression(0)?;
                    let loc = start.to(&index.loc);
                    node = Node::new(NodeKind::ArrayAccess { array: Box::new(node), index: Box::new(index) }, loc);
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                }
                let end = self.consume(&Token::RBracket, "`]`")?;
                node.loc = start.to(&end);
                Ok(node)
            }
            Some(Token::Dot) => {
                self.advance();
                let (field, end) = self.consume_ident("a field name")?;
                Ok(Node::new(NodeKind::FieldAccess { record: Box::new(left), field }, start.to(&end)))
            }
            _ => {
                let end = self.advance();
                Ok(Node::new(NodeKind::Dereference(Box::new(left)), start.to(&end)))
            }
        }
    }

    /// Parses `(a, b, ...)`. Also returns the location of `)` and the
    /// verbatim source between the parentheses.
    fn parse_call_arguments(&mut self) -> PResult<(Vec<Node>, Location, Option<String>)> {
        let open = self.consume(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expression(0)?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        let close = self.consume(&Token::RParen, "`)`")?;
        let text = self
            .source
            .get(open.offset + open.len..close.offset)
            .map(|s| s.trim().to_string());
        Ok((args, close, text))
    }
}

// --- 7. types ---

impl<'a> TypeParser for Parser<'a> {
    /// Parses a type denoter. `name` is the name being declared in a `type`
    /// section, used to label record types.
    fn parse_type(&mut self, name: Option<&str>) -> PResult<Type> {
        let Some(token) = self.peek().cloned() else {
            self.expected("a type");
            return Err(());
        };
        match token {
            Token::Caret => {
                self.advance();
                Ok(Type::pointer_to(self.parse_type(None)?))
            }
            Token::Array => {
                self.advance();
                if self.match_token(&Token::LBracket) {
                    let mut ranges = Vec::new();
                    loop {
                        let low = self.parse_bound()?;
                        self.consume(&Token::DotDot, "`..`")?;
                        let high = self.parse_bound()?;
                        if high < low {
                            self.report(ParserError::invalid(
                                format!("empty array range {}..{}", low, high),
                                &self.previous_loc(),
                            ));
                        }
                        ranges.push((low, high));
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                    self.consume(&Token::RBracket, "`]`")?;
                    self.consume(&Token::Of, "`of`")?;
                    let element = self.parse_type(None)?;
                    // `array[a..b, c..d] of T` is `array[a..b] of array[c..d] of T`.
                    Ok(ranges
                        .into_iter()
                        .rev()
                        .fold(element, |inner, (low, high)| Type::fixed_array(inner, low, high)))
                } else {
                    self.consume(&Token::Of, "`of` or `[`")?;
                    Ok(Type::dynamic_array(self.parse_type(None)?))
                }
            }
            Token::Record => {
                self.advance();
                let mut fields: Vec<(String, Type)> = Vec::new();
                while let Some(Token::Ident(_)) = self.peek() {
                    let mut names = vec![self.consume_ident("a field name")?];
                    while self.match_token(&Token::Comma) {
                        names.push(self.consume_ident("a field name")?);
                    }
                    self.consume(&Token::Colon, "`:`")?;
                    let ty = self.parse_type(None)?;
                    for (field, loc) in names {
                        if fields.iter().any(|(f, _)| *f == field) {
                            self.report(ParserError::invalid(format!("duplicate field `{}`", field), &loc));
                        } else {
                            fields.push((field, ty.clone()));
                        }
                    }
                    if !self.match_token(&Token::Semicolon) {
                        break;
                    }
                }
                self.consume(&Token::End, "`end`")?;
                Ok(Type::record(name.unwrap_or("anonymous"), fields))
            }
            Token::File => {
                self.advance();
                if self.match_token(&Token::Of) {
                    Ok(Type::File(Some(Arc::new(self.parse_type(None)?))))
                } else {
                    Ok(Type::File(None))
                }
            }
            Token::Ident(type_name) => {
                let loc = self.advance();
                // `string[N]` is a plain string.
                if type_name == "string" && self.match_token(&Token::LBracket) {
                    self.parse_bound()?;
                    self.consume(&Token::RBracket, "`]`")?;
                }
                match self.symbols.type_name(&type_name) {
                    Some(ty) => Ok(ty.clone()),
                    None => {
                        self.report(ParserError::UnknownType { name: type_name, loc });
                        Err(())
                    }
                }
            }
            _ => {
                self.expected("a type");
                Err(())
            }
        }
    }

    fn parse_bound(&mut self) -> PResult<i64> {
        let expr = self.parse_expression(3)?;
        match self.constant_value(&expr) {
            Some(value) => Ok(value),
            None => {
                self.report(ParserError::invalid("array bounds must be integer constants", &expr.loc));
                Err(())
            }
        }
    }
}

// --- 8. helpers ---

impl<'a> Util for Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current).map(|(token, _)| token)
    }

    /// Location of the current token, or the end of the file.
    fn loc(&self) -> Location {
        match self.tokens.get(self.current) {
            Some((_, loc)) => loc.clone(),
            None => match self.tokens.last() {
                Some((_, last)) => {
                    Location::new(last.file.clone(), last.offset + last.len, 0, last.row, last.col + last.len)
                }
                None => Location::start_of(self.file.clone()),
            },
        }
    }

    fn previous_loc(&self) -> Location {
        match self.current.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some((_, loc)) => loc.clone(),
            None => Location::start_of(self.file.clone()),
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.tokens.len()
    }

    /// Consumes the current token and returns its location.
    fn advance(&mut self) -> Location {
        let loc = self.loc();
        if !self.is_at_end() {
            self.current += 1;
        }
        loc
    }

    fn check(&self, token: &Token) -> bool {
        self.peek().is_some_and(|t| discriminant(t) == discriminant(token))
    }

    /// Checks for a contextual keyword such as `external` or `name`.
    fn check_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == word)
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, token: &Token, expected: &str) -> PResult<Location> {
        if self.check(token) {
            Ok(self.advance())
        } else {
            self.expected(expected);
            Err(())
        }
    }

    fn consume_ident(&mut self, expected: &str) -> PResult<(String, Location)> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                Ok((name, self.advance()))
            }
            _ => {
                self.expected(expected);
                Err(())
            }
        }
    }

    fn expected(&mut self, expected: &str) {
        let found = self.peek().map_or_else(|| "end of file".to_string(), ToString::to_string);
        let loc = self.loc();
        self.report(ParserError::UnexpectedToken { expected: expected.to_string(), found, loc });
    }

    fn report(&mut self, error: ParserError) {
        log::trace!("parse error: {}", error);
        self.errors.push(error.into());
    }

    /// Skips ahead to a statement or declaration boundary. Always makes
    /// progress unless already at `end`, `until` or the end of the file.
    fn synchronize(&mut self) {
        if self.is_at_end() || self.check(&Token::End) || self.check(&Token::Until) {
            return;
        }
        self.advance();
        while let Some(token) = self.peek() {
            if matches!(self.tokens.get(self.current - 1), Some((Token::Semicolon, _))) {
                return;
            }
            match token {
                Token::Begin
                | Token::End
                | Token::Until
                | Token::Var
                | Token::Const
                | Token::Type
                | Token::Function
                | Token::Procedure
                | Token::If
                | Token::While
                | Token::For
                | Token::Repeat
                | Token::Implementation => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn is_variable(&self, name: &str) -> bool {
        if self.locals.iter().any(|(local, _)| local == name) {
            return true;
        }
        if let Some((function, is_procedure)) = &self.function {
            if !is_procedure && (name == function || name == "result") {
                return true;
            }
        }
        self.symbols.variable(name).is_some()
    }

    /// Infers the type of a constant's initializer without a full scope.
    fn constant_type(&self, node: &Node) -> Type {
        match &node.kind {
            NodeKind::IntLiteral(value) => {
                if i32::try_from(*value).is_ok() {
                    Type::int32()
                } else {
                    Type::integer(64)
                }
            }
            NodeKind::RealLiteral(_) => Type::float64(),
            NodeKind::BoolLiteral(_) => Type::Boolean,
            NodeKind::StringLiteral(_) => Type::String,
            NodeKind::CharLiteral(_) => Type::integer(8),
            NodeKind::NilLiteral => Type::Pointer(None),
            NodeKind::Unary { operand, .. } => self.constant_type(operand),
            NodeKind::Binary { op, lhs, rhs } => {
                binary_result_type(*op, &self.constant_type(lhs), &self.constant_type(rhs))
            }
            NodeKind::Comparison { .. } => Type::Boolean,
            NodeKind::Variable(name) => self
                .locals
                .iter()
                .rev()
                .find(|(local, _)| local == name)
                .map(|(_, ty)| ty.clone())
                .or_else(|| self.symbols.variable(name).map(|v| v.ty.clone()))
                .unwrap_or(Type::Unknown),
            _ => Type::Unknown,
        }
    }

    /// Folds integer constant expressions (literals, named constants, and
    /// `+ - * div mod` over them).
    fn constant_value(&self, node: &Node) -> Option<i64> {
        if let Some(value) = node.constant_int() {
            return Some(value);
        }
        match &node.kind {
            NodeKind::Variable(name) => self.constants.get(name).copied(),
            NodeKind::Unary { op: UnaryOperator::Neg, operand } => self.constant_value(operand)?.checked_neg(),
            NodeKind::Binary { op, lhs, rhs } => {
                let (l, r) = (self.constant_value(lhs)?, self.constant_value(rhs)?);
                match op {
                    BinaryOperator::Add => l.checked_add(r),
                    BinaryOperator::Sub => l.checked_sub(r),
                    BinaryOperator::Mul => l.checked_mul(r),
                    BinaryOperator::IntDiv => l.checked_div(r),
                    BinaryOperator::Mod => l.checked_rem(r),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn declare_global(&mut self, var: VariableDefinition) {
        let (name, loc) = (var.name.clone(), var.loc.clone());
        if let Err(existing) = self.symbols.add_variable(var) {
            let previous = existing.loc.clone();
            self.report(ParserError::Redefinition { name, previous, loc });
        }
    }

    fn declare_local(&mut self, block: &mut Block, var: VariableDefinition) {
        if let Some(existing) = block.variable(&var.name) {
            let previous = existing.loc.clone();
            self.report(ParserError::Redefinition { name: var.name, previous, loc: var.loc });
            return;
        }
        if self.function.is_some() && self.locals.iter().any(|(local, _)| *local == var.name) {
            let message = format!("local `{}` duplicates a parameter", var.name);
            self.report(ParserError::invalid(message, &var.loc));
            return;
        }
        self.locals.push((var.name.clone(), var.ty.clone()));
        block.variables.push(var);
    }

    fn declare_function(&mut self, function: FunctionDefinition) {
        let (name, loc) = (function.name.clone(), function.loc.clone());
        if let Err(existing) = self.symbols.add_function(function) {
            let previous = existing.loc.clone();
            self.report(ParserError::Redefinition { name, previous, loc });
        }
    }

    // --- binding powers ---

    fn prefix_binding_power(token: &Token) -> Option<((), u8)> {
        match token {
            Token::Not | Token::Minus | Token::Plus | Token::At => Some(((), 7)),
            _ => None,
        }
    }

    fn infix_binding_power(token: &Token) -> Option<(u8, u8)> {
        match token {
            Token::Eq | Token::NotEq | Token::Lt | Token::LtEq | Token::Gt | Token::GtEq => Some((1, 2)),
            Token::Plus | Token::Minus | Token::Or | Token::Xor => Some((3, 4)),
            Token::Star | Token::Slash | Token::Div | Token::Mod | Token::And | Token::Shl | Token::Shr => {
                Some((5, 6))
            }
            _ => None,
        }
    }

    fn postfix_binding_power(token: &Token) -> Option<(u8, ())> {
        match token {
            Token::LBracket | Token::Dot | Token::Caret => Some((9, ())),
            _ => None,
        }
    }
}
