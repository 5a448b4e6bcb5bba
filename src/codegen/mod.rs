//! Generación de bytecode.
//!
//! Cada bloque del programa se traduce a un fragmento de bytes cargado
//! en la dirección del bloque. Los fragmentos se entregan ordenados por
//! dirección ascendente, sin importar el orden de declaración.

use crate::{ir, lex::Identifier};
use thiserror::Error;

use log::{debug, trace};

mod encode;

use encode::Encoder;

/// Tamaño del espacio de direcciones.
const ADDRESS_SPACE: usize = 0x10000;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("Branch of {length} bytes in block 0x{block:04X} exceeds the 16-bit length field")]
    BranchTooLong { block: u16, length: usize },

    #[error("Block 0x{block:04X} of {length} bytes runs past the end of the address space")]
    ImageOverflow { block: u16, length: usize },

    #[error("Block 0x{second:04X} overlaps with block 0x{first:04X}")]
    Overlap { first: u16, second: u16 },
}

/// Un rango contiguo de bytes en la imagen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub address: u16,
    pub bytes: Vec<u8>,
}

impl Chunk {
    /// Dirección siguiente al último byte.
    pub(crate) fn end(&self) -> usize {
        self.address as usize + self.bytes.len()
    }
}

/// Imagen de bytecode completa.
#[derive(Debug)]
pub struct Image {
    chunks: Vec<Chunk>,
    entry: Option<u16>,
    globals: Vec<(Identifier, u16)>,
}

impl Image {
    /// Fragmentos en orden ascendente de dirección.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Dirección de entrada declarada con `start`.
    pub fn entry(&self) -> Option<u16> {
        self.entry
    }

    /// Variables mapeadas a memoria, en orden de declaración.
    pub fn globals(&self) -> &[(Identifier, u16)] {
        &self.globals
    }
}

/// Emite la imagen de bytecode de un programa.
pub fn emit(program: &ir::Program) -> Result<Image, CodegenError> {
    let mut chunks = program
        .blocks
        .iter()
        .map(|block| {
            let mut encoder = Encoder::new(block.address);
            encoder.instructions(&block.body)?;

            let chunk = Chunk {
                address: block.address,
                bytes: encoder.finish(),
            };

            if chunk.end() > ADDRESS_SPACE {
                return Err(CodegenError::ImageOverflow {
                    block: chunk.address,
                    length: chunk.bytes.len(),
                });
            }

            trace!("Block 0x{:04X}: {} bytes", chunk.address, chunk.bytes.len());
            Ok(chunk)
        })
        .collect::<Result<Vec<_>, _>>()?;

    chunks.sort_by_key(|chunk| chunk.address);
    for pair in chunks.windows(2) {
        if pair[0].end() > pair[1].address as usize {
            return Err(CodegenError::Overlap {
                first: pair[0].address,
                second: pair[1].address,
            });
        }
    }

    let globals = program
        .globals
        .iter()
        .map(|global| (global.name.clone(), global.address))
        .collect();

    debug!("Emitted {} chunks", chunks.len());
    Ok(Image {
        chunks,
        entry: program.entry,
        globals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source::Source};

    fn image(text: &str) -> Result<Image, CodegenError> {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source).tokenize().expect("lexer error");
        let program = parse::parse(&tokens).expect("parser error");

        emit(&program.resolve().expect("semantic error"))
    }

    fn bytes(body: &str) -> Vec<u8> {
        let text = format!("loc x at 0x0010; loc y at 0x1234; block 0x0100 {{ {} }}", body);
        image(&text).unwrap().chunks()[0].bytes.clone()
    }

    #[test]
    fn assignment_and_goto() {
        assert_eq!(
            bytes("x = 0x05; goto 0x0200;"),
            [0x02, 0x00, 0x10, 0x0E, 0x03, 0x05, 0x0B, 0x02, 0x00]
        );
    }

    #[test]
    fn constants_use_minimum_width() {
        assert_eq!(bytes("x = 0x00FF;"), [0x02, 0x00, 0x10, 0x0E, 0x03, 0xFF]);
        assert_eq!(bytes("x = 0x100;"), [0x02, 0x00, 0x10, 0x0E, 0x03, 0x01, 0x00]);
    }

    #[test]
    fn binary_expression() {
        // ((x + 0x1) * y)
        assert_eq!(
            bytes("x = x + 0x1 * y;"),
            [
                0x02, 0x00, 0x10, 0x0E, // x =
                0x02, 0x00, 0x10, // x
                0x0F, 0x03, 0x01, // + 0x1
                0x11, 0x02, 0x12, 0x34, // * y
            ]
        );
    }

    #[test]
    fn memory_assignment() {
        assert_eq!(
            bytes("mem[x + 0x2] = mem[0x0300];"),
            [0x08, 0x02, 0x00, 0x10, 0x0F, 0x03, 0x02, 0x0E, 0x08, 0x03, 0x00]
        );
    }

    #[test]
    fn call() {
        assert_eq!(
            bytes("call DRAW_CIRCLE(x, 0x7, 0x1FF); call SET_COLOR();"),
            [0x0C, 0x01, 0x02, 0x00, 0x10, 0x03, 0x07, 0x03, 0x01, 0xFF, 0x0C, 0x02]
        );
    }

    #[test]
    fn branches_carry_lengths() {
        assert_eq!(
            bytes("if (x == 0x1) { goto 0x0100; } else { }"),
            [
                0x09, 0x02, 0x00, 0x10, 0x13, 0x03, 0x01, // if (x == 0x1)
                0x00, 0x03, 0x0B, 0x01, 0x00, // { goto 0x0100; }
                0x0A, 0x00, 0x00, // else { }
            ]
        );

        assert_eq!(bytes("if (x) { }"), [0x09, 0x02, 0x00, 0x10, 0x00, 0x00]);
    }

    #[test]
    fn nested_branch_lengths() {
        let bytes = bytes("if (x) { if (y) { goto 0x0; } }");
        assert_eq!(&bytes[4..6], &[0x00, 0x09]);
        assert_eq!(&bytes[10..12], &[0x00, 0x03]);
        assert_eq!(bytes.len(), 15);
    }

    #[test]
    fn chunks_are_sorted() {
        let image = image("block 0x0300 { goto 0x0; } block 0x0100 { } start at 0x0300;").unwrap();
        let addresses: Vec<_> = image.chunks().iter().map(|chunk| chunk.address).collect();

        assert_eq!(addresses, [0x0100, 0x0300]);
        assert!(image.chunks()[0].bytes.is_empty());
        assert_eq!(image.entry(), Some(0x0300));
    }

    #[test]
    fn overlapping_blocks() {
        let error = image("block 0x0100 { goto 0x0; } block 0x0102 { }").unwrap_err();
        assert!(matches!(error, CodegenError::Overlap { first: 0x0100, second: 0x0102 }));

        assert!(image("block 0x0100 { goto 0x0; } block 0x0103 { }").is_ok());
    }

    #[test]
    fn image_overflow() {
        let error = image("block 0xFFFE { goto 0x0; }").unwrap_err();
        assert!(matches!(error, CodegenError::ImageOverflow { block: 0xFFFE, length: 3 }));

        assert!(image("block 0xFFFD { goto 0x0; }").is_ok());
    }

    #[test]
    fn globals_are_reported() {
        let image = image("loc b at 0x2; loc a at 0x1;").unwrap();
        let names: Vec<_> = image.globals().iter().map(|(name, _)| name.to_string()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
