use std::fmt;
use std::str::FromStr;

use crate::error::TbError;

/// Success payload of a test or task.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    String(String),
    None,
}

/// Four-state value of a single-bit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Logic {
    Zero,
    One,
    #[default]
    X,
    Z,
}

impl Logic {
    /// `true` for 0 and 1.
    pub fn is_resolved(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    pub fn to_u32(self) -> Option<u32> {
        match self {
            Logic::Zero => Some(0),
            Logic::One => Some(1),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'x',
            Logic::Z => 'z',
        }
    }
}

impl From<bool> for Logic {
    fn from(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }
}

impl TryFrom<u32> for Logic {
    type Error = TbError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Logic::Zero),
            1 => Ok(Logic::One),
            _ => Err(TbError::InvalidValue(format!("{} does not fit in one bit", v))),
        }
    }
}

impl TryFrom<char> for Logic {
    type Error = TbError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_lowercase() {
            '0' => Ok(Logic::Zero),
            '1' => Ok(Logic::One),
            'x' => Ok(Logic::X),
            'z' => Ok(Logic::Z),
            _ => Err(TbError::InvalidValue(format!("'{}'", c))),
        }
    }
}

impl FromStr for Logic {
    type Err = TbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // accept "1", "0b1", "1'b1"
        let stripped = s.trim().trim_start_matches("0b").trim_start_matches("1'b");
        let mut chars = stripped.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Logic::try_from(c),
            _ => Err(TbError::InvalidValue(format!("'{}'", s))),
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
