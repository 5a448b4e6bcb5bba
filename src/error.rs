use crate::{
    codegen::CodegenError,
    lex::LexerError,
    parse::ParserError,
    semantic::SemanticError,
    source::{Located, Location, TAB_STOP},
};

use std::fmt::{self, Display};
use thiserror::Error;

/// Error de cualquier fase de compilación.
///
/// La compilación se detiene en el primer error, por lo cual a lo sumo
/// existe uno por ejecución.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] Located<LexerError>),

    #[error(transparent)]
    Parse(#[from] Located<ParserError>),

    #[error(transparent)]
    Symbol(#[from] Located<SemanticError>),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    /// Clase de error, según la fase que lo produjo.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::Lex(_) => "Lexical error",
            CompileError::Parse(_) => "Syntax error",
            CompileError::Symbol(_) => "Symbol error",
            CompileError::Codegen(_) => "Codegen error",
        }
    }

    /// Ubicación en el código fuente, si la fase la conoce.
    pub fn location(&self) -> Option<&Location> {
        match self {
            CompileError::Lex(error) => Some(error.location()),
            CompileError::Parse(error) => Some(error.location()),
            CompileError::Symbol(error) => Some(error.location()),
            CompileError::Codegen(_) => None,
        }
    }

    /// Reporte legible con extracto del código fuente.
    pub fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics { error: self }
    }
}

pub struct Diagnostics<'a> {
    error: &'a CompileError,
}

impl Display for Diagnostics<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let error = self.error;
        writeln!(fmt, "{}: {}", error.kind(), error)?;

        if let Some(location) = error.location() {
            writeln!(fmt, " --> {}", location)?;

            let digits = location.end().line().to_string().chars().count();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            for line_number in location.start().line()..=location.end().line() {
                let line = location.source().line(line_number).unwrap_or("");
                let line = expand_tabs(line);
                writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)?;
            }

            // Un rango vacío, como el de EOF, se señala con un solo carácter
            let from = location.start().column();
            let to = location.end().column().saturating_sub(1).max(from);
            let (skip, highlight) = if location.start().line() == location.end().line() {
                ((from - 1) as usize, (to - from + 1) as usize)
            } else {
                ((from - 1) as usize, 1)
            };

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        writeln!(fmt, "Build failed with 1 error")
    }
}

/// Sustituye tabuladores por espacios hasta la siguiente columna de
/// tabulador, igual que al contar columnas en el lexer.
fn expand_tabs(line: &str) -> String {
    let mut expanded = String::with_capacity(line.len());
    for c in line.chars() {
        if c == '\t' {
            let width = TAB_STOP as usize - expanded.chars().count() % TAB_STOP as usize;
            expanded.extend(std::iter::repeat(' ').take(width));
        } else {
            expanded.push(c);
        }
    }

    expanded
}

#[cfg(test)]
mod tests {
    use crate::{compile, ihex::HexOptions};

    fn report(text: &str) -> String {
        compile("prog.blk", text, HexOptions::default())
            .err()
            .unwrap()
            .diagnostics()
            .to_string()
    }

    #[test]
    fn caret_under_token() {
        let report = report("loc x at 0x10;\nblock 0x0 { y = 0x1; }");
        let expected = "Symbol error: Variable `y` is not declared\n \
                        --> prog.blk:2:13\n  \
                        |\n\
                        2 | block 0x0 { y = 0x1; }\n  \
                        |             ^\n\
                        \n\
                        Build failed with 1 error\n";

        assert_eq!(report, expected);
    }

    #[test]
    fn caret_after_tabs() {
        let report = report("block 0x0 {\n\ty = 0x1;\n}");
        assert!(report.contains(" --> prog.blk:2:5\n"));
        assert!(report.contains("2 |     y = 0x1;\n  |     ^\n"));

        let report = self::report("block 0x0 {\n  \tz = 0x1;\n}");
        assert!(report.contains("2 |     z = 0x1;\n  |     ^\n"));
    }

    #[test]
    fn kinds() {
        assert!(report("loc x at 0x1 $").starts_with("Lexical error: "));
        assert!(report("loc x at 0x1").starts_with("Syntax error: "));
        assert!(report("block 0x0 { call NOPE(); }").starts_with("Symbol error: "));
        assert!(report("block 0xFFFF { goto 0x0; }").starts_with("Codegen error: "));
    }
}
