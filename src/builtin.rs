//! Funciones de dispositivo.
//!
//! Las únicas funciones invocables con `call` son las que implementa el
//! dispositivo objetivo. Cada una se identifica en el bytecode por un
//! código de un byte; esta tabla es cerrada y forma parte del formato
//! de salida.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// Una función de dispositivo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Builtin {
    DrawLine = 0x00,
    DrawCircle = 0x01,
    SetColor = 0x02,
    DrawRectangle = 0x03,
}

const BUILTINS: &[(&str, Builtin)] = &[
    ("DRAW_LINE",      Builtin::DrawLine),
    ("DRAW_CIRCLE",    Builtin::DrawCircle),
    ("SET_COLOR",      Builtin::SetColor),
    ("DRAW_RECTANGLE", Builtin::DrawRectangle),
];

impl Builtin {
    /// Código de función que sigue al opcode `call`.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Nombre con el que se invoca la función.
    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|&&(_, builtin)| builtin == self)
            .map_or("", |&(name, _)| name)
    }

    /// Nombres de todas las funciones, en orden de código.
    pub fn names() -> impl Iterator<Item = &'static str> {
        BUILTINS.iter().map(|&(name, _)| name)
    }
}

impl FromStr for Builtin {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        BUILTINS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, builtin)| builtin)
            .ok_or(())
    }
}

impl Display for Builtin {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}
