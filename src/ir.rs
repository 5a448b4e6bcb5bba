//! Representación intermedia.
//!
//! Resultado del análisis semántico. A diferencia del AST, aquí no
//! quedan nombres ni literales sin verificar: toda variable se ha
//! sustituido por su dirección de 16 bits y toda función por su código.

use crate::{builtin::Builtin, lex::Identifier, parse::BinOp};

pub struct Program {
    /// Dirección de entrada, si se declaró `start`.
    pub entry: Option<u16>,

    /// Variables mapeadas a memoria, en orden de declaración.
    pub globals: Vec<Global>,

    /// Bloques en orden de declaración.
    pub blocks: Vec<Block>,
}

pub struct Global {
    pub name: Identifier,
    pub address: u16,
}

pub struct Block {
    pub address: u16,
    pub body: Vec<Instruction>,
}

pub enum Instruction {
    /// Escritura a una variable declarada.
    Store { target: u16, value: Expr },

    /// Escritura a una dirección calculada.
    StoreMem { address: Expr, value: Expr },

    /// Salto incondicional. El destino no se verifica contra los bloques.
    Jump(u16),

    Call {
        target: Builtin,
        arguments: Vec<Argument>,
    },

    Branch {
        condition: Expr,
        then: Vec<Instruction>,
        otherwise: Option<Vec<Instruction>>,
    },
}

pub enum Expr {
    Binary(Box<Expr>, BinOp, Box<Expr>),

    /// Lectura de una variable, por dirección.
    Load(u16),

    Const(u16),

    /// Lectura directa de memoria, `mem[...]`.
    Mem(u16),
}

pub enum Argument {
    /// Referencia a la dirección de una variable.
    Variable(u16),

    /// Byte literal.
    Byte(u16),
}
