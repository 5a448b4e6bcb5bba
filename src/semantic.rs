//! Análisis semántico.
//!
//! Se construye una tabla de símbolos con las direcciones de todas las
//! variables y bloques, y luego se traduce el AST a [`ir`], resolviendo
//! cada nombre y cada literal. Todo error de símbolos se detecta en esta
//! fase, antes de que se emita un solo byte.

use thiserror::Error;

use std::collections::{HashMap, HashSet};

use crate::{
    builtin::Builtin,
    ir::{self, Argument, Instruction},
    lex::{HexLiteral, Identifier},
    parse,
    source::Located,
};

use log::debug;

/// Dirección máxima en el espacio de 16 bits.
const ADDRESS_MAX: u32 = 0xFFFF;

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Variable `{0}` is not declared")]
    Undefined(Identifier),

    #[error("Unknown function `{0}`, expected one of {}", known_functions())]
    UnknownFunction(Identifier),

    #[error("Variable `{0}` is already declared")]
    DuplicateVariable(Identifier),

    #[error("Another block is already placed at address 0x{0:04X}")]
    DuplicateBlock(u16),

    #[error("Literal `{0}` exceeds 16 bits, valid range is [0x0, 0x{ADDRESS_MAX:X}]")]
    AddressOverflow(HexLiteral),

    #[error("Literal `{0}` has no hex digits")]
    MalformedHex(HexLiteral),
}

fn known_functions() -> String {
    Builtin::names().collect::<Vec<_>>().join(", ")
}

/// Tabla plana de símbolos.
///
/// Se construye una única vez antes de la traducción y desde entonces
/// solo se consulta.
#[derive(Default)]
pub struct SymbolTable {
    variables: HashMap<Identifier, u16>,
    blocks: HashSet<u16>,
}

impl SymbolTable {
    /// Construye la tabla a partir de todas las declaraciones del programa.
    pub fn scan(program: &parse::Program) -> Semantic<Self> {
        let mut table = SymbolTable::default();

        for declaration in program.variables() {
            let address = resolve_literal(&declaration.address)?;
            let name = declaration.name.as_ref();

            if table.variables.insert(name.clone(), address).is_some() {
                return Err(Located::at(
                    SemanticError::DuplicateVariable(name.clone()),
                    declaration.name.location().clone(),
                ));
            }
        }

        for block in program.blocks() {
            let address = resolve_literal(&block.address)?;
            if !table.blocks.insert(address) {
                return Err(Located::at(
                    SemanticError::DuplicateBlock(address),
                    block.address.location().clone(),
                ));
            }
        }

        Ok(table)
    }

    /// Busca la dirección de una variable.
    pub fn lookup(&self, id: &Located<Identifier>) -> Semantic<u16> {
        self.variables.get(id.as_ref()).copied().ok_or_else(|| {
            Located::at(
                SemanticError::Undefined(id.as_ref().clone()),
                id.location().clone(),
            )
        })
    }
}

impl parse::Program {
    /// Resuelve todos los símbolos y traduce el programa a IR.
    pub fn resolve(&self) -> Semantic<ir::Program> {
        let table = SymbolTable::scan(self)?;
        let context = Context { table: &table };

        let entry = self
            .start()
            .map(|start| resolve_literal(&start.address))
            .transpose()?;

        let globals = self
            .variables()
            .iter()
            .map(|declaration| {
                Ok(ir::Global {
                    name: declaration.name.as_ref().clone(),
                    address: table.lookup(&declaration.name)?,
                })
            })
            .collect::<Semantic<Vec<_>>>()?;

        let blocks = self
            .blocks()
            .iter()
            .map(|block| {
                Ok(ir::Block {
                    address: resolve_literal(&block.address)?,
                    body: context.statements(&block.statements)?,
                })
            })
            .collect::<Semantic<Vec<_>>>()?;

        debug!(
            "Resolved {} variables and {} blocks, entry {:?}",
            globals.len(),
            blocks.len(),
            entry
        );

        Ok(ir::Program {
            entry,
            globals,
            blocks,
        })
    }
}

struct Context<'a> {
    table: &'a SymbolTable,
}

impl Context<'_> {
    fn statements(&self, statements: &[parse::Statement]) -> Semantic<Vec<Instruction>> {
        statements
            .iter()
            .map(|statement| self.statement(statement))
            .collect()
    }

    fn statement(&self, statement: &parse::Statement) -> Semantic<Instruction> {
        use parse::Statement::*;

        let instruction = match statement {
            Assignment { target, value } => Instruction::Store {
                target: self.table.lookup(target)?,
                value: self.expr(value)?,
            },

            MemoryAssignment { address, value } => Instruction::StoreMem {
                address: self.expr(address)?,
                value: self.expr(value)?,
            },

            Goto(address) => Instruction::Jump(resolve_literal(address)?),

            Call { function, params } => {
                let target = function.as_ref().as_ref().parse::<Builtin>().map_err(|()| {
                    Located::at(
                        SemanticError::UnknownFunction(function.as_ref().clone()),
                        function.location().clone(),
                    )
                })?;

                let arguments = params
                    .iter()
                    .map(|param| match param {
                        parse::Parameter::Variable(id) => {
                            Ok(Argument::Variable(self.table.lookup(id)?))
                        }

                        parse::Parameter::Byte(value) => Ok(Argument::Byte(resolve_literal(value)?)),
                    })
                    .collect::<Semantic<Vec<_>>>()?;

                Instruction::Call { target, arguments }
            }

            If {
                condition,
                then_block,
                else_block,
            } => Instruction::Branch {
                condition: self.expr(condition)?,
                then: self.statements(then_block)?,
                otherwise: else_block
                    .as_ref()
                    .map(|block| self.statements(block))
                    .transpose()?,
            },
        };

        Ok(instruction)
    }

    fn expr(&self, expr: &parse::Expr) -> Semantic<ir::Expr> {
        use parse::Expr::*;

        let expr = match expr {
            Binary(left, op, right) => {
                ir::Expr::Binary(Box::new(self.expr(left)?), *op, Box::new(self.expr(right)?))
            }

            Variable(id) => ir::Expr::Load(self.table.lookup(id)?),
            Constant(value) => ir::Expr::Const(resolve_literal(value)?),
            MemoryLocation(address) => ir::Expr::Mem(resolve_literal(address)?),
        };

        Ok(expr)
    }
}

/// Interpreta una constante hexadecimal como valor de 16 bits.
///
/// Los ceros a la izquierda no cuentan para el límite de 16 bits.
pub fn resolve_literal(literal: &Located<HexLiteral>) -> Semantic<u16> {
    let fail = |error: fn(HexLiteral) -> SemanticError| {
        Located::at(error(literal.as_ref().clone()), literal.location().clone())
    };

    let digits = literal.as_ref().digits();
    if digits.is_empty() {
        return Err(fail(SemanticError::MalformedHex));
    }

    let significant = digits.trim_start_matches('0');
    if significant.len() > 4 {
        return Err(fail(SemanticError::AddressOverflow));
    } else if significant.is_empty() {
        return Ok(0);
    }

    u16::from_str_radix(significant, 16).map_err(|_| fail(SemanticError::MalformedHex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source::Source};

    fn resolve(text: &str) -> Semantic<ir::Program> {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source).tokenize().expect("lexer error");
        let program = parse::parse(&tokens).expect("parser error");

        program.resolve()
    }

    #[test]
    fn resolves_addresses() {
        let program = resolve(
            "loc x at 0x0010;\n\
             start at 0x0200;\n\
             block 0x0200 { x = x + 0x05; goto 0x0200; }",
        )
        .unwrap();

        assert_eq!(program.entry, Some(0x0200));
        assert_eq!(program.globals[0].address, 0x0010);
        assert_eq!(program.blocks[0].address, 0x0200);

        match &program.blocks[0].body[0] {
            Instruction::Store {
                target: 0x0010,
                value: ir::Expr::Binary(left, _, right),
            } => {
                assert!(matches!(**left, ir::Expr::Load(0x0010)));
                assert!(matches!(**right, ir::Expr::Const(0x05)));
            }

            _ => panic!("unexpected instruction"),
        }

        assert!(matches!(program.blocks[0].body[1], Instruction::Jump(0x0200)));
    }

    #[test]
    fn variables_may_be_declared_after_use() {
        let program = resolve("block 0x0 { y = 0x1; }\nloc y at 0x20;").unwrap();
        assert!(matches!(program.blocks[0].body[0], Instruction::Store { target: 0x20, .. }));
    }

    #[test]
    fn undeclared_variable() {
        let error = resolve("block 0x0 { if (z == 0x1) { } }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::Undefined(id) if id.as_ref() == "z"));
        assert_eq!(error.location().start().column(), 17);
    }

    #[test]
    fn undeclared_parameter() {
        let error = resolve("block 0x0 { call SET_COLOR(color); }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::Undefined(_)));
    }

    #[test]
    fn unknown_function() {
        let error = resolve("block 0x0 { call UNKNOWN_FN(0x1); }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::UnknownFunction(id) if id.as_ref() == "UNKNOWN_FN"));
        assert!(error.to_string().contains("DRAW_LINE"));
    }

    #[test]
    fn duplicate_block_address() {
        let error = resolve("block 0x0200 { }\nblock 0x200 { }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::DuplicateBlock(0x0200)));
        assert_eq!(error.location().start().line(), 2);
    }

    #[test]
    fn duplicate_variable() {
        let error = resolve("loc x at 0x1; loc x at 0x2;").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::DuplicateVariable(_)));
    }

    #[test]
    fn aliased_variables_are_allowed() {
        let program = resolve("loc x at 0x1; loc y at 0x1;").unwrap();
        assert_eq!(program.globals.len(), 2);
    }

    #[test]
    fn literal_ranges() {
        assert!(resolve("loc x at 0x0000FFFF;").is_ok());

        let error = resolve("loc x at 0x10000;").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::AddressOverflow(_)));

        let error = resolve("block 0x0 { goto 0x; }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::MalformedHex(_)));

        let error = resolve("block 0x0 { call DRAW_LINE(0x12345); }").err().unwrap();
        assert!(matches!(error.as_ref(), SemanticError::AddressOverflow(_)));
    }

    #[test]
    fn goto_targets_are_not_checked() {
        let program = resolve("block 0x0 { goto 0xBEEF; }").unwrap();
        assert!(matches!(program.blocks[0].body[0], Instruction::Jump(0xBEEF)));
    }
}
