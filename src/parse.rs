//! Análisis sintáctico.
//!
//! Parser de descenso recursivo con un token de lookahead, sin
//! backtracking y sin recuperación de errores: la primera discrepancia
//! estructural aborta el análisis completo. Los comentarios se ignoran
//! de manera transparente en cualquier punto donde se espera un token.
//!
//! # Precedencia
//! La gramática de expresiones es plana: todos los operadores binarios
//! tienen la misma precedencia y asocian a la izquierda. Por tanto,
//! `a + b * c` equivale a `(a + b) * c`.

use std::fmt::{self, Display};
use thiserror::Error;

use crate::{
    lex::{HexLiteral, Identifier, Token, TokenKind},
    source::{Located, Location},
};

use log::debug;

/// Programa completo.
///
/// Se preserva el orden de declaración de variables y bloques.
#[derive(Debug, Default)]
pub struct Program {
    variables: Vec<VariableDeclaration>,
    start: Option<StartBlock>,
    blocks: Vec<Block>,
}

impl Program {
    /// Declaraciones `loc`, en orden.
    pub fn variables(&self) -> &[VariableDeclaration] {
        &self.variables
    }

    /// Declaración `start`, si existe.
    pub fn start(&self) -> Option<&StartBlock> {
        self.start.as_ref()
    }

    /// Bloques `block`, en orden.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

/// `loc <name> at <address>;`
#[derive(Debug)]
pub struct VariableDeclaration {
    pub name: Located<Identifier>,
    pub address: Located<HexLiteral>,
}

/// `start at <address>;`
#[derive(Debug)]
pub struct StartBlock {
    pub address: Located<HexLiteral>,
}

/// `block <address> { ... }`
#[derive(Debug)]
pub struct Block {
    pub address: Located<HexLiteral>,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    /// `<target> = <value>;`
    Assignment {
        target: Located<Identifier>,
        value: Expr,
    },

    /// `if (<condition>) { ... } else { ... }`
    If {
        condition: Expr,
        then_block: Vec<Statement>,
        else_block: Option<Vec<Statement>>,
    },

    /// `call <function>(<params>);`
    Call {
        function: Located<Identifier>,
        params: Vec<Parameter>,
    },

    /// `goto <address>;`
    Goto(Located<HexLiteral>),

    /// `mem[<address>] = <value>;`
    ///
    /// A diferencia de `mem[...]` en posición de expresión, aquí la
    /// dirección puede ser una expresión arbitraria.
    MemoryAssignment { address: Expr, value: Expr },
}

#[derive(Debug)]
pub enum Expr {
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Variable(Located<Identifier>),
    Constant(Located<HexLiteral>),

    /// `mem[<address>]`, donde la dirección es siempre una constante.
    MemoryLocation(Located<HexLiteral>),
}

/// Parámetro de una llamada a función.
#[derive(Debug)]
pub enum Parameter {
    /// Un identificador, que se interpreta como referencia a memoria.
    Variable(Located<Identifier>),

    /// Un byte literal.
    Byte(Located<HexLiteral>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Mod,
    Add,
    Sub,
    Equal,
    NotEqual,
    Greater,
    Less,
    Mul,
}

impl BinOp {
    /// Determina el operador que corresponde a un token, si alguno.
    pub fn from_kind(kind: TokenKind) -> Option<Self> {
        use BinOp::*;

        let op = match kind {
            TokenKind::Mod => Mod,
            TokenKind::Plus => Add,
            TokenKind::Minus => Sub,
            TokenKind::Eq => Equal,
            TokenKind::NotEq => NotEqual,
            TokenKind::Gt => Greater,
            TokenKind::Lt => Less,
            TokenKind::Asterisk => Mul,
            _ => return None,
        };

        Some(op)
    }

    /// Clase de token de la cual proviene el operador.
    pub fn kind(self) -> TokenKind {
        use BinOp::*;

        match self {
            Mod => TokenKind::Mod,
            Add => TokenKind::Plus,
            Sub => TokenKind::Minus,
            Equal => TokenKind::Eq,
            NotEqual => TokenKind::NotEq,
            Greater => TokenKind::Gt,
            Less => TokenKind::Lt,
            Mul => TokenKind::Asterisk,
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        let symbol = match self {
            Mod => "%",
            Add => "+",
            Sub => "-",
            Equal => "==",
            NotEqual => "!=",
            Greater => ">",
            Less => "<",
            Mul => "*",
        };

        fmt.write_str(symbol)
    }
}

// Las expresiones binarias se muestran con paréntesis explícitos,
// lo cual hace visible la asociatividad
impl Display for Expr {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Binary(left, op, right) => write!(fmt, "({} {} {})", left, op, right),
            Expr::Variable(name) => name.fmt(fmt),
            Expr::Constant(value) => value.fmt(fmt),
            Expr::MemoryLocation(address) => write!(fmt, "mem[{}]", address),
        }
    }
}

impl Display for Parameter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Variable(name) => name.fmt(fmt),
            Parameter::Byte(value) => value.fmt(fmt),
        }
    }
}

impl Display for Program {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for variable in &self.variables {
            writeln!(fmt, "loc {} at {};", variable.name, variable.address)?;
        }

        if let Some(start) = &self.start {
            writeln!(fmt, "start at {};", start.address)?;
        }

        for block in &self.blocks {
            writeln!(fmt, "block {} {{", block.address)?;
            write_statements(fmt, &block.statements, 1)?;
            writeln!(fmt, "}}")?;
        }

        Ok(())
    }
}

fn write_statements(
    fmt: &mut fmt::Formatter<'_>,
    statements: &[Statement],
    depth: usize,
) -> fmt::Result {
    let indent = depth * 4;

    for statement in statements {
        write!(fmt, "{:indent$}", "", indent = indent)?;

        match statement {
            Statement::Assignment { target, value } => writeln!(fmt, "{} = {};", target, value)?,

            Statement::If {
                condition,
                then_block,
                else_block,
            } => {
                // Una condición binaria ya incluye sus paréntesis
                match condition {
                    Expr::Binary(..) => writeln!(fmt, "if {} {{", condition)?,
                    _ => writeln!(fmt, "if ({}) {{", condition)?,
                }

                write_statements(fmt, then_block, depth + 1)?;
                write!(fmt, "{:indent$}}}", "", indent = indent)?;

                if let Some(else_block) = else_block {
                    writeln!(fmt, " else {{")?;
                    write_statements(fmt, else_block, depth + 1)?;
                    write!(fmt, "{:indent$}}}", "", indent = indent)?;
                }

                writeln!(fmt)?;
            }

            Statement::Call { function, params } => {
                write!(fmt, "call {}(", function)?;
                for (index, param) in params.iter().enumerate() {
                    let separator = if index > 0 { ", " } else { "" };
                    write!(fmt, "{}{}", separator, param)?;
                }

                writeln!(fmt, ");")?;
            }

            Statement::Goto(address) => writeln!(fmt, "goto {};", address)?,

            Statement::MemoryAssignment { address, value } => {
                writeln!(fmt, "mem[{}] = {};", address, value)?
            }
        }
    }

    Ok(())
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected token {0}, found {1} instead")]
    UnexpectedToken(TokenKind, Token),

    #[error("Expected token {0}, reached end of input instead")]
    MissingToken(TokenKind),

    #[error("Expected one of {}, found {1} instead", one_of(.0))]
    ExpectedOneOf(&'static [TokenKind], Token),

    #[error("Expected any of `loc`, `start` or `block`, found {0} instead")]
    UnexpectedTopLevel(Token),

    #[error("Expected any of assignment, `if`, `call`, `goto` or `mem`, found {0} instead")]
    ExpectedStatement(Token),

    #[error("Expected identifier, hex literal or `mem[...]`, found {0} instead")]
    ExpectedExpr(Token),

    #[error("Expected identifier or hex literal as parameter, found {0} instead")]
    ExpectedParameter(Token),

    #[error("Entry point was already declared")]
    DuplicateStart,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

fn one_of(kinds: &[TokenKind]) -> String {
    let names: Vec<_> = kinds.iter().map(|kind| kind.name()).collect();
    names.join(", ")
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Construye el AST a partir de un flujo de tokens.
///
/// El flujo debe terminar en [`TokenKind::Eof`], tal y como lo
/// produce [`crate::lex::Lexer::tokenize()`]. Un flujo vacío equivale
/// a un programa vacío.
pub fn parse(tokens: &[Located<Token>]) -> Parse<Program> {
    if tokens.is_empty() {
        return Ok(Program::default());
    }

    let mut parser = Parser { tokens, cursor: 0 };
    let program = parser.program()?;

    debug!(
        "Parsed {} declarations and {} blocks",
        program.variables.len(),
        program.blocks.len()
    );

    Ok(program)
}

struct Parser<'a> {
    tokens: &'a [Located<Token>],
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parse<Program> {
        let mut program = Program::default();

        loop {
            let token = self.peek();
            match token.as_ref().kind() {
                TokenKind::Eof => break Ok(program),
                TokenKind::Loc => program.variables.push(self.variable()?),
                TokenKind::Block => program.blocks.push(self.block()?),

                TokenKind::Start => {
                    let start = self.start()?;
                    if program.start.is_some() {
                        return fail(ParserError::DuplicateStart, token.location());
                    }

                    program.start = Some(start);
                }

                _ => {
                    let error = ParserError::UnexpectedTopLevel(token.as_ref().clone());
                    return fail(error, token.location());
                }
            }
        }
    }

    fn variable(&mut self) -> Parse<VariableDeclaration> {
        self.expect(TokenKind::Loc)?;
        let name = self.id()?;

        self.expect(TokenKind::At)?;
        let address = self.hex()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(VariableDeclaration { name, address })
    }

    fn start(&mut self) -> Parse<StartBlock> {
        self.expect(TokenKind::Start)?;
        self.expect(TokenKind::At)?;

        let address = self.hex()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(StartBlock { address })
    }

    fn block(&mut self) -> Parse<Block> {
        self.expect(TokenKind::Block)?;
        let address = self.hex()?;
        let statements = self.statement_block()?;

        Ok(Block {
            address,
            statements,
        })
    }

    fn statement_block(&mut self) -> Parse<Vec<Statement>> {
        self.expect(TokenKind::LBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.peek().as_ref().kind() {
                TokenKind::RBrace => {
                    self.next();
                    break Ok(statements);
                }

                TokenKind::Eof => {
                    let eof = self.peek().location();
                    break fail(ParserError::MissingToken(TokenKind::RBrace), eof);
                }

                _ => statements.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> Parse<Statement> {
        let token = self.peek();
        match token.as_ref().kind() {
            TokenKind::Identifier => self.assignment(),
            TokenKind::If => self.if_statement(),
            TokenKind::Call => self.call(),
            TokenKind::Goto => self.goto(),
            TokenKind::Mem => self.memory_assignment(),
            TokenKind::Eof => fail(ParserError::UnexpectedEof, token.location()),

            _ => {
                let error = ParserError::ExpectedStatement(token.as_ref().clone());
                fail(error, token.location())
            }
        }
    }

    fn assignment(&mut self) -> Parse<Statement> {
        let target = self.id()?;
        self.expect(TokenKind::Assign)?;

        let value = self.expr()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement::Assignment { target, value })
    }

    fn if_statement(&mut self) -> Parse<Statement> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;

        let condition = self.expr()?;
        self.expect(TokenKind::RParen)?;

        let then_block = self.statement_block()?;
        let else_block = match self.peek().as_ref().kind() {
            TokenKind::Else => {
                self.next();
                Some(self.statement_block()?)
            }

            _ => None,
        };

        Ok(Statement::If {
            condition,
            then_block,
            else_block,
        })
    }

    fn call(&mut self) -> Parse<Statement> {
        self.expect(TokenKind::Call)?;
        let function = self.id()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if self.peek().as_ref().kind() == TokenKind::RParen {
            self.next();
        } else {
            // Una coma final antes de `)` no es válida, ya que después de
            // toda coma se exige otro parámetro
            loop {
                params.push(self.parameter()?);

                let separator = self.expect_any(&[TokenKind::Comma, TokenKind::RParen])?;
                if separator.as_ref().kind() == TokenKind::RParen {
                    break;
                }
            }
        }

        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Call { function, params })
    }

    fn parameter(&mut self) -> Parse<Parameter> {
        let token = self.peek();
        match token.as_ref().kind() {
            TokenKind::Identifier => Ok(Parameter::Variable(self.id()?)),
            TokenKind::HexNumber => Ok(Parameter::Byte(self.hex()?)),
            TokenKind::Eof => fail(ParserError::UnexpectedEof, token.location()),

            _ => {
                let error = ParserError::ExpectedParameter(token.as_ref().clone());
                fail(error, token.location())
            }
        }
    }

    fn goto(&mut self) -> Parse<Statement> {
        self.expect(TokenKind::Goto)?;
        let address = self.hex()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement::Goto(address))
    }

    fn memory_assignment(&mut self) -> Parse<Statement> {
        self.expect(TokenKind::Mem)?;
        self.expect(TokenKind::LBracket)?;

        let address = self.expr()?;
        self.expect(TokenKind::RBracket)?;
        self.expect(TokenKind::Assign)?;

        let value = self.expr()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement::MemoryAssignment { address, value })
    }

    fn expr(&mut self) -> Parse<Expr> {
        let mut left = self.primary()?;

        // Plegado a la izquierda, sin distinción de precedencia
        while let Some(op) = BinOp::from_kind(self.peek().as_ref().kind()) {
            self.next();

            let right = self.primary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }

        Ok(left)
    }

    fn primary(&mut self) -> Parse<Expr> {
        let token = self.peek();
        match token.as_ref().kind() {
            TokenKind::Identifier => Ok(Expr::Variable(self.id()?)),
            TokenKind::HexNumber => Ok(Expr::Constant(self.hex()?)),

            TokenKind::Mem => {
                self.next();
                self.expect(TokenKind::LBracket)?;

                // Solo se admite una constante, no una expresión
                let address = self.hex()?;
                self.expect(TokenKind::RBracket)?;

                Ok(Expr::MemoryLocation(address))
            }

            TokenKind::Eof => fail(ParserError::UnexpectedEof, token.location()),
            _ => fail(ParserError::ExpectedExpr(token.as_ref().clone()), token.location()),
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        let token = self.expect(TokenKind::Identifier)?;
        let id = token.as_ref().identifier().ok_or_else(|| unexpected(TokenKind::Identifier, token))?;

        Ok(Located::at(id, token.location().clone()))
    }

    fn hex(&mut self) -> Parse<Located<HexLiteral>> {
        let token = self.expect(TokenKind::HexNumber)?;
        let hex = token.as_ref().hex().ok_or_else(|| unexpected(TokenKind::HexNumber, token))?;

        Ok(Located::at(hex, token.location().clone()))
    }

    /// Consume el siguiente token si es de la clase indicada.
    fn expect(&mut self, kind: TokenKind) -> Parse<&'a Located<Token>> {
        let token = self.peek();
        if token.as_ref().kind() == kind {
            self.next();
            Ok(token)
        } else {
            Err(unexpected(kind, token))
        }
    }

    /// Consume el siguiente token si es de cualquiera de las clases indicadas.
    fn expect_any(&mut self, kinds: &'static [TokenKind]) -> Parse<&'a Located<Token>> {
        let token = self.peek();
        let found = token.as_ref().kind();

        if kinds.contains(&found) {
            self.next();
            Ok(token)
        } else if found == TokenKind::Eof {
            fail(ParserError::UnexpectedEof, token.location())
        } else {
            let error = ParserError::ExpectedOneOf(kinds, token.as_ref().clone());
            fail(error, token.location())
        }
    }

    /// Observa el siguiente token que no sea un comentario.
    ///
    /// Los comentarios observados se consumen.
    fn peek(&mut self) -> &'a Located<Token> {
        let last = self.tokens.len() - 1;
        while self.cursor < last && self.tokens[self.cursor].as_ref().kind() == TokenKind::Comment {
            self.cursor += 1;
        }

        &self.tokens[self.cursor.min(last)]
    }

    /// Consume el siguiente token. [`TokenKind::Eof`] nunca se consume.
    fn next(&mut self) -> &'a Located<Token> {
        let token = self.peek();
        if token.as_ref().kind() != TokenKind::Eof {
            self.cursor += 1;
        }

        token
    }
}

fn unexpected(expected: TokenKind, found: &Located<Token>) -> Located<ParserError> {
    let error = match found.as_ref().kind() {
        TokenKind::Eof => ParserError::MissingToken(expected),
        _ => ParserError::UnexpectedToken(expected, found.as_ref().clone()),
    };

    Located::at(error, found.location().clone())
}

fn fail<T>(error: ParserError, location: &Location) -> Parse<T> {
    Err(Located::at(error, location.clone()))
}
