//! Compilador del lenguaje de bloques a imágenes Intel HEX.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! El árbol sintáctico es procesado por análisis semántico en
//! [`semantic`], donde se resuelve cada nombre a una dirección y se
//! obtiene la representación intermedia descrita en [`ir`].
//!
//! # Back end
//! La representación intermedia se traduce a bytecode en [`codegen`].
//! Cada bloque se vuelve un fragmento de bytes cargado en su dirección
//! declarada, y cada nodo se codifica con el opcode de su clase de
//! token. Finalmente, la imagen se serializa como registros Intel HEX
//! en [`ihex`].

#[macro_use]
mod macros;

pub mod builtin;
pub mod codegen;
pub mod error;
pub mod ihex;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;

use crate::{
    codegen::Image,
    error::CompileError,
    ihex::HexOptions,
    lex::Lexer,
    source::Source,
};

use log::debug;

/// Resultado de una compilación exitosa.
pub struct Output {
    /// AST tal como se leyó.
    pub program: parse::Program,

    /// Imagen de bytecode.
    pub image: Image,

    /// Registros Intel HEX, uno por línea.
    pub lines: Vec<String>,
}

/// Compila un programa completo.
///
/// El nombre de origen solo se utiliza para reportar ubicaciones.
pub fn compile(name: &str, text: &str, options: HexOptions) -> Result<Output, CompileError> {
    let source = Source::new(name, text);

    let tokens = Lexer::new(&source).tokenize()?;
    let program = parse::parse(&tokens)?;

    let image = codegen::emit(&program.resolve()?)?;
    let lines = ihex::encode(&image, options);
    debug!("Compiled {} into {} records", name, lines.len());

    Ok(Output {
        program,
        image,
        lines,
    })
}
