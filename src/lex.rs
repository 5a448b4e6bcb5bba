//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. Los espacios en
//! blanco se descartan durante esta operación, pero los comentarios
//! de línea se conservan como tokens [`TokenKind::Comment`]; es el
//! parser quien los ignora. Cada token emitido está asociado a una
//! ubicación en el código fuente original.
//!
//! # Contenido de un token
//! Todo token incluye su clase y su lexema original. La clase determina
//! además el opcode que le corresponde en el bytecode generado.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores inician con una letra o `'_'` y no pueden
//!   incluir dígitos.
//! - Las palabras clave y los identificadores distinguen mayúsculas
//!   de minúsculas.
//! - Las constantes numéricas son siempre hexadecimales con prefijo `0x`.
//!   El lexer no verifica su rango, eso ocurre al resolver direcciones.
//!
//! # Errores
//! El lexer no se recupera de errores. El primer carácter que no inicia
//! ningún token válido produce un token [`TokenKind::Illegal`] dentro de
//! un [`LexerError`] y la compilación se detiene.

use crate::source::{Located, Position, Source, Stream};
use std::{
    fmt::{self, Display},
    rc::Rc,
};

use log::debug;
use thiserror::Error;

token_kinds! {
    /// Carácter no reconocido.
    Illegal = 0x00 => "ILLEGAL",
    /// Fin de la entrada.
    Eof = 0x01 => "EOF",

    Identifier = 0x02 => "IDENTIFIER",
    HexNumber = 0x03 => "HEXNUMBER",

    /// `loc`
    Loc = 0x04 => "LOC",
    /// `at`
    At = 0x05 => "AT",
    /// `start`
    Start = 0x06 => "START",
    /// `block`
    Block = 0x07 => "BLOCK",
    /// `mem`
    Mem = 0x08 => "MEM",
    /// `if`
    If = 0x09 => "IF",
    /// `else`
    Else = 0x0A => "ELSE",
    /// `goto`
    Goto = 0x0B => "GOTO",
    /// `call`
    Call = 0x0C => "CALL",
    /// `to`, reservada pero sin uso en la gramática.
    To = 0x0D => "TO",

    /// `=`
    Assign = 0x0E => "ASSIGN",
    /// `+`
    Plus = 0x0F => "PLUS",
    /// `-`
    Minus = 0x10 => "MINUS",
    /// `*`
    Asterisk = 0x11 => "ASTERISK",
    /// `/`
    Slash = 0x12 => "SLASH",
    /// `==`
    Eq = 0x13 => "EQ",
    /// `!=`
    NotEq = 0x14 => "NOT_EQ",
    /// `>`
    Gt = 0x15 => "GT",
    /// `<`
    Lt = 0x16 => "LT",
    /// `%`
    Mod = 0x17 => "MOD",

    /// `,`
    Comma = 0x18 => "COMMA",
    /// `;`
    Semicolon = 0x19 => "SEMICOLON",
    /// `:`
    Colon = 0x1A => "COLON",
    /// `(`
    LParen = 0x1B => "LPAREN",
    /// `)`
    RParen = 0x1C => "RPAREN",
    /// `{`
    LBrace = 0x1D => "LBRACE",
    /// `}`
    RBrace = 0x1E => "RBRACE",
    /// `[`
    LBracket = 0x1F => "LBRACKET",
    /// `]`
    RBracket = 0x20 => "RBRACKET",

    /// Comentario de línea, `//` hasta el final de la línea.
    Comment = 0x21 => "COMMENT",
}

impl TokenKind {
    /// Opcode de un byte asociado a esta clase de token.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Busca una palabra clave. Se distinguen mayúsculas.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        use TokenKind::*;

        const KEYWORDS: &[(&str, TokenKind)] = &[
            ("loc",   Loc),
            ("at",    At),
            ("start", Start),
            ("block", Block),
            ("mem",   Mem),
            ("if",    If),
            ("else",  Else),
            ("goto",  Goto),
            ("call",  Call),
            ("to",    To),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == word)
            .map(|&(_, keyword)| keyword)
    }

    /// Clase de un token de un solo carácter.
    fn single(c: char) -> Option<TokenKind> {
        use TokenKind::*;

        let kind = match c {
            '+' => Plus,
            '-' => Minus,
            '*' => Asterisk,
            ';' => Semicolon,
            ':' => Colon,
            ',' => Comma,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            '>' => Gt,
            '<' => Lt,
            '%' => Mod,
            _ => return None,
        };

        Some(kind)
    }
}

impl From<TokenKind> for u8 {
    fn from(kind: TokenKind) -> u8 {
        kind.opcode()
    }
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    literal: Rc<str>,
}

impl Token {
    /// Construye un token a partir de su clase y lexema.
    pub fn new(kind: TokenKind, literal: &str) -> Self {
        Token {
            kind,
            literal: Rc::from(literal),
        }
    }

    /// Obtiene la clase del token.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Obtiene el lexema original.
    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Interpreta el token como un identificador.
    pub fn identifier(&self) -> Option<Identifier> {
        match self.kind {
            TokenKind::Identifier => Some(Identifier(Rc::clone(&self.literal))),
            _ => None,
        }
    }

    /// Interpreta el token como una constante hexadecimal.
    pub fn hex(&self) -> Option<HexLiteral> {
        match self.kind {
            TokenKind::HexNumber => Some(HexLiteral(Rc::clone(&self.literal))),
            _ => None,
        }
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => fmt.write_str("EOF"),
            TokenKind::Comment => fmt.write_str("COMMENT"),
            kind => write!(fmt, "{} `{}`", kind, self.literal),
        }
    }
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Una constante hexadecimal, tal y como aparece en el código fuente.
///
/// El lexema siempre inicia con `0x`. Puede no tener dígitos o exceder
/// 16 bits; ambas condiciones se reportan al resolver direcciones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexLiteral(Rc<str>);

impl HexLiteral {
    /// Dígitos después del prefijo `0x`.
    pub fn digits(&self) -> &str {
        self.0.get(2..).unwrap_or("")
    }
}

impl Display for HexLiteral {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    ///
    /// Se incluye el token [`TokenKind::Illegal`] correspondiente.
    #[error("Unexpected character {:?} in input", .0.literal())]
    Illegal(Token),
}

pub type Lex<T> = Result<T, Located<LexerError>>;

/// Máquina de estados para análisis léxico.
///
/// La salida del lexer, así como su siguiente estado, se define a
/// partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer {
    source: Stream,
    state: State,
    finished: bool,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(TokenKind, String),

    /// Se encontró `=`, que puede iniciar `==`.
    Equals,

    /// Se encontró `!`, que únicamente es válido como parte de `!=`.
    Bang,

    /// Se encontró `/`, que puede iniciar un comentario.
    Slash,

    /// Comentario de línea.
    ///
    /// Termina antes de `'\n'` o al final de la entrada. El salto de
    /// línea no forma parte del lexema.
    Comment(String),

    /// Se encontró `0`, que debe estar seguido de `x`.
    Zero,

    /// Constante hexadecimal.
    Hex(String),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl Lexer {
    /// Crea un lexer en estado inicial a partir de un origen.
    pub fn new(source: &Rc<Source>) -> Self {
        Lexer {
            source: source.stream(),
            state: State::Start,
            finished: false,
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens.
    ///
    /// El último token de la secuencia siempre es [`TokenKind::Eof`].
    /// El primer error detiene el análisis.
    pub fn tokenize(mut self) -> Lex<Vec<Located<Token>>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let eof = token.as_ref().kind() == TokenKind::Eof;

            tokens.push(token);
            if eof {
                break;
            }
        }

        debug!("Lexer produced {} tokens", tokens.len());
        Ok(tokens)
    }

    /// Construye el siguiente token.
    ///
    /// Al agotarse la entrada se emite [`TokenKind::Eof`] de manera
    /// indefinida.
    pub fn next_token(&mut self) -> Lex<Located<Token>> {
        use State::*;

        let mut start = self.source.position();
        let (kind, literal) = loop {
            let next_char = match self.source.peek() {
                // NUL funciona como centinela de fin de entrada
                Some('\0') | None => None,
                c => c,
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                start = self.source.position();
            }

            match (&mut self.state, next_char) {
                (Start, None) => break (TokenKind::Eof, String::new()),

                // Espacios en blanco, incluyendo saltos de línea
                (Start, Some(c)) if c.is_whitespace() => (),

                (Start, Some('=')) => self.state = Equals,
                (Start, Some('!')) => self.state = Bang,
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('0')) => self.state = Zero,

                (Start, Some(c)) if is_word_char(c) => self.state = Word(c.to_string()),
                (Start, Some(c)) => match TokenKind::single(c) {
                    Some(kind) => self.state = Complete(kind, c.to_string()),
                    None => {
                        self.source.bump();
                        return Err(self.illegal(c, start));
                    }
                },

                // Emisión retardada de tokens ya consumidos
                (Complete(kind, literal), _) => break (*kind, std::mem::take(literal)),

                // Operadores de dos caracteres, un carácter de lookahead
                (Equals, Some('=')) => self.state = Complete(TokenKind::Eq, String::from("==")),
                (Equals, _) => break (TokenKind::Assign, String::from("=")),

                (Bang, Some('=')) => self.state = Complete(TokenKind::NotEq, String::from("!=")),
                (Bang, _) => return Err(self.illegal('!', start)),

                (Slash, Some('/')) => self.state = Comment(String::from("//")),
                (Slash, _) => break (TokenKind::Slash, String::from("/")),

                (Comment(text), Some(c)) if c != '\n' => text.push(c),
                (Comment(text), _) => break (TokenKind::Comment, std::mem::take(text)),

                (Zero, Some('x')) => self.state = Hex(String::from("0x")),
                (Zero, _) => return Err(self.illegal('0', start)),

                (Hex(digits), Some(c)) if c.is_ascii_hexdigit() => digits.push(c),
                (Hex(digits), _) => break (TokenKind::HexNumber, std::mem::take(digits)),

                (Word(word), Some(c)) if is_word_char(c) => word.push(c),
                (Word(word), _) => {
                    let word = std::mem::take(word);
                    let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Identifier);
                    break (kind, word);
                }
            }

            // Se consume el carácter que se observó con lookahead
            self.source.bump();
        };

        self.state = State::Start;
        if kind == TokenKind::Eof {
            self.finished = true;
        }

        let location = self.source.span(start, self.source.position());
        Ok(Located::at(Token::new(kind, &literal), location))
    }

    /// Construye el error para un carácter que no inicia ningún token.
    fn illegal(&mut self, c: char, start: Position) -> Located<LexerError> {
        self.state = State::Start;
        self.finished = true;

        let token = Token::new(TokenKind::Illegal, &c.to_string());
        let location = self.source.span(start, start.advance());
        Located::at(LexerError::Illegal(token), location)
    }
}

impl Iterator for Lexer {
    type Item = Lex<Located<Token>>;

    /// Emite tokens hasta [`TokenKind::Eof`] inclusive, o hasta el primer error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.next_token();
        if result.is_err() {
            self.finished = true;
        }

        Some(result)
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(text: &str) -> Lex<Vec<Located<Token>>> {
        Lexer::new(&Source::new("test", text)).tokenize()
    }

    fn kinds(text: &str) -> Vec<&'static str> {
        lex(text)
            .unwrap()
            .iter()
            .map(|token| token.as_ref().kind().name())
            .collect()
    }

    #[test]
    fn opcodes_follow_table_order() {
        for (opcode, kind) in TokenKind::ALL.iter().enumerate() {
            assert_eq!(kind.opcode() as usize, opcode);
        }

        assert_eq!(TokenKind::ALL.len(), 0x22);
        assert_eq!(TokenKind::Comment.opcode(), 0x21);
        assert_eq!(TokenKind::NotEq.name(), "NOT_EQ");
    }

    #[test]
    fn declaration() {
        assert_eq!(
            kinds("loc x at 0x0010;"),
            ["LOC", "IDENTIFIER", "AT", "HEXNUMBER", "SEMICOLON", "EOF"]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("= == != / < > % * - +"),
            ["ASSIGN", "EQ", "NOT_EQ", "SLASH", "LT", "GT", "MOD", "ASTERISK", "MINUS", "PLUS", "EOF"]
        );

        assert_eq!(kinds("a==b"), ["IDENTIFIER", "EQ", "IDENTIFIER", "EOF"]);
        assert_eq!(kinds("a=b"), ["IDENTIFIER", "ASSIGN", "IDENTIFIER", "EOF"]);
    }

    #[test]
    fn comments_are_kept() {
        let tokens = lex("x = 0x1; // set x\ngoto 0x0200;").unwrap();

        let comment = &tokens[4];
        assert_eq!(comment.as_ref().kind(), TokenKind::Comment);
        assert_eq!(comment.as_ref().literal(), "// set x");
        assert_eq!(tokens[5].as_ref().kind(), TokenKind::Goto);
    }

    #[test]
    fn comment_at_end_of_input() {
        let tokens = lex("// nothing else").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].as_ref().literal(), "// nothing else");
        assert_eq!(tokens[1].as_ref().kind(), TokenKind::Eof);
    }

    #[test]
    fn identifiers_exclude_digits() {
        let tokens = lex("foo_bar _x").unwrap();
        assert_eq!(tokens[0].as_ref().literal(), "foo_bar");
        assert_eq!(tokens[1].as_ref().literal(), "_x");

        let error = lex("x1").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::Illegal(token) if token.literal() == "1"));
        assert_eq!(kinds("LOC loc"), ["IDENTIFIER", "LOC", "EOF"]);
    }

    #[test]
    fn hex_numbers() {
        let tokens = lex("0x00fF 0x 0x123456").unwrap();
        assert_eq!(tokens[0].as_ref().literal(), "0x00fF");
        assert_eq!(tokens[1].as_ref().literal(), "0x");
        assert_eq!(tokens[2].as_ref().literal(), "0x123456");

        let hex = tokens[0].as_ref().hex().unwrap();
        assert_eq!(hex.digits(), "00fF");
    }

    #[test]
    fn bare_bang_is_illegal() {
        let error = lex("x ! y").unwrap_err();
        assert!(matches!(error.as_ref(), LexerError::Illegal(token)
            if token.kind() == TokenKind::Illegal && token.literal() == "!"));
        assert_eq!(error.location().start().column(), 3);
    }

    #[test]
    fn unknown_character_is_illegal() {
        let error = lex("block 0x0200 {\n  x = #;\n}").unwrap_err();
        assert_eq!(error.location().start().line(), 2);
        assert_eq!(error.location().start().column(), 7);
    }

    #[test]
    fn nul_ends_input() {
        assert_eq!(kinds("goto\0 garbage #"), ["GOTO", "EOF"]);
    }

    #[test]
    fn token_locations() {
        let tokens = lex("  block 0x0200").unwrap();
        let block = tokens[0].location();
        assert_eq!(block.start().column(), 3);
        assert_eq!(block.end().column(), 8);

        let address = tokens[1].location();
        assert_eq!(address.start().column(), 9);
        assert_eq!(address.end().column(), 15);
    }

    #[test]
    fn iterator_stops_after_eof() {
        let lexer = Lexer::new(&Source::new("test", "goto"));
        let tokens: Vec<_> = lexer.collect();
        assert_eq!(tokens.len(), 2);
    }
}
