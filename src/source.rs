//! Rastreo de ubicaciones originales en código fuente.
//!
//! Tanto los tokens como las hojas del AST llevan cuenta del rango
//! de posiciones que ocupan en el texto original, lo cual permite
//! señalar el punto exacto en donde ocurre un error de cualquier fase.

use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
pub(crate) const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        self.value.fmt(formatter)
    }
}

// La ubicación no forma parte del mensaje, se muestra aparte en `Diagnostics`
impl<E: Error> Error for Located<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.value.source()
    }
}

/// Código fuente completo de una compilación.
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Construye un origen a partir de su nombre y contenido.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Rc::new(Source {
            name: name.into(),
            text: text.into(),
        })
    }

    /// Obtiene una línea por número, iniciando en 1.
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = (number as usize).checked_sub(1)?;
        self.text.lines().nth(index)
    }

    /// Inicia un flujo carácter por carácter sobre el contenido.
    pub fn stream(self: &Rc<Self>) -> Stream {
        Stream {
            source: Rc::clone(self),
            offset: 0,
            next: Position::default(),
        }
    }
}

impl Debug for Source {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "Source({:?})", self.name)
    }
}

/// Flujo de entrada con un carácter de lookahead.
///
/// El flujo lleva cuenta de la posición del siguiente carácter
/// que será consumido.
#[derive(Clone)]
pub struct Stream {
    source: Rc<Source>,
    offset: usize,
    next: Position,
}

impl Stream {
    /// Observa el siguiente carácter sin consumirlo.
    pub fn peek(&self) -> Option<char> {
        self.source.text[self.offset..].chars().next()
    }

    /// Consume el siguiente carácter, si existe.
    pub fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.offset += c.len_utf8();
            self.next = match c {
                '\n' => self.next.newline(),
                '\t' => self.next.tab(),
                _ => self.next.advance(),
            };
        }
    }

    /// Posición del siguiente carácter.
    pub fn position(&self) -> Position {
        self.next
    }

    /// Construye una ubicación sobre el mismo origen.
    pub fn span(&self, from: Position, to: Position) -> Location {
        Location {
            from: Rc::clone(&self.source),
            position: from..to,
        }
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
///
/// El final del rango es exclusivo.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Obtiene el origen.
    pub fn source(&self) -> &Source {
        &self.from
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start || end == start.advance() || end.line != start.line {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_tracks_lines_and_tabs() {
        let source = Source::new("test", "a\n\tb");
        let mut stream = source.stream();

        assert_eq!(stream.peek(), Some('a'));
        stream.bump();
        stream.bump();
        assert_eq!(stream.position(), Position { line: 2, column: 1 });

        stream.bump();
        assert_eq!(stream.position(), Position { line: 2, column: 5 });
        assert_eq!(stream.peek(), Some('b'));

        stream.bump();
        assert_eq!(stream.peek(), None);
    }

    #[test]
    fn location_display() {
        let source = Source::new("prog.blk", "loc x at 0x10;");
        let stream = source.stream();

        let start = Position { line: 1, column: 5 };
        assert_eq!(stream.span(start, start.advance()).to_string(), "prog.blk:1:5");

        let end = Position { line: 1, column: 9 };
        assert_eq!(stream.span(start, end).to_string(), "prog.blk:[1:5-1:8]");
    }

    #[test]
    fn lines_are_one_based() {
        let source = Source::new("test", "first\nsecond\n");
        assert_eq!(source.line(0), None);
        assert_eq!(source.line(2), Some("second"));
        assert_eq!(source.line(3), None);
    }
}
