/// Declara la tabla de clases de token.
///
/// Cada entrada asocia una variante con su opcode de un byte y su
/// nombre canónico. El opcode es el discriminante de la variante, por
/// lo cual el orden y los valores de esta tabla son parte del formato
/// de salida.
macro_rules! token_kinds {
    ($($(#[$attr:meta])* $kind:ident = $opcode:literal => $name:literal,)*) => {
        /// Clase de un token.
        ///
        /// El discriminante de cada variante es el opcode que se emite
        /// al generar bytecode para el constructo correspondiente.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum TokenKind {
            $($(#[$attr])* $kind = $opcode,)*
        }

        impl TokenKind {
            /// Todas las clases de token, en orden de opcode.
            pub const ALL: &'static [TokenKind] = &[$(TokenKind::$kind,)*];

            /// Nombre canónico de la clase, en mayúsculas.
            pub fn name(self) -> &'static str {
                match self {
                    $(TokenKind::$kind => $name,)*
                }
            }
        }
    };
}

/// Escribe una secuencia de bytes u opcodes a un codificador.
macro_rules! emit {
    ($encoder:expr, $($byte:expr),+ $(,)?) => {{
        $($encoder.byte($byte);)+
    }};
}
