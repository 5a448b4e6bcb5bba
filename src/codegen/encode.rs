use super::CodegenError;
use std::convert::TryFrom;

use crate::{
    ir::{Argument, Expr, Instruction},
    lex::TokenKind,
};

/// Acumulador de bytes para un bloque.
///
/// Cada nodo inicia con un opcode de un byte, por lo cual el flujo
/// resultante puede volver a recorrerse sin ambigüedad de nodos.
pub(super) struct Encoder {
    block: u16,
    bytes: Vec<u8>,
}

impl Encoder {
    pub fn new(block: u16) -> Self {
        Encoder {
            block,
            bytes: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn byte<B: Into<u8>>(&mut self, byte: B) {
        self.bytes.push(byte.into());
    }

    /// Dirección o longitud de 16 bits, big-endian.
    pub fn word(&mut self, word: u16) {
        self.bytes.extend_from_slice(&word.to_be_bytes());
    }

    /// Valor literal en el mínimo de bytes que lo contiene.
    pub fn literal(&mut self, value: u16) {
        match u8::try_from(value) {
            Ok(byte) => self.byte(byte),
            Err(_) => self.word(value),
        }
    }

    pub fn instructions(&mut self, instructions: &[Instruction]) -> Result<(), CodegenError> {
        for instruction in instructions {
            self.instruction(instruction)?;
        }

        Ok(())
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<(), CodegenError> {
        use Instruction::*;

        match instruction {
            Store { target, value } => {
                emit!(self, TokenKind::Identifier);
                self.word(*target);
                emit!(self, TokenKind::Assign);
                self.expr(value);
            }

            StoreMem { address, value } => {
                emit!(self, TokenKind::Mem);
                self.expr(address);
                emit!(self, TokenKind::Assign);
                self.expr(value);
            }

            Jump(address) => {
                emit!(self, TokenKind::Goto);
                self.word(*address);
            }

            Call { target, arguments } => {
                emit!(self, TokenKind::Call, target.opcode());
                for argument in arguments {
                    match argument {
                        Argument::Variable(address) => {
                            emit!(self, TokenKind::Identifier);
                            self.word(*address);
                        }

                        Argument::Byte(value) => {
                            emit!(self, TokenKind::HexNumber);
                            self.literal(*value);
                        }
                    }
                }
            }

            // Cada rama lleva su longitud para que el intérprete pueda
            // saltarla sin ejecutarla
            Branch {
                condition,
                then,
                otherwise,
            } => {
                emit!(self, TokenKind::If);
                self.expr(condition);
                self.branch(then)?;

                if let Some(otherwise) = otherwise {
                    emit!(self, TokenKind::Else);
                    self.branch(otherwise)?;
                }
            }
        }

        Ok(())
    }

    fn branch(&mut self, body: &[Instruction]) -> Result<(), CodegenError> {
        let mut inner = Encoder::new(self.block);
        inner.instructions(body)?;

        let bytes = inner.finish();
        let length = u16::try_from(bytes.len()).map_err(|_| CodegenError::BranchTooLong {
            block: self.block,
            length: bytes.len(),
        })?;

        self.word(length);
        self.bytes.extend(bytes);

        Ok(())
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Binary(left, op, right) => {
                self.expr(left);
                emit!(self, op.kind());
                self.expr(right);
            }

            Expr::Load(address) => {
                emit!(self, TokenKind::Identifier);
                self.word(*address);
            }

            Expr::Const(value) => {
                emit!(self, TokenKind::HexNumber);
                self.literal(*value);
            }

            Expr::Mem(address) => {
                emit!(self, TokenKind::Mem);
                self.word(*address);
            }
        }
    }
}
