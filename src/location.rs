use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 32-bit general purpose registers, in x86 encoding order.
#[derive(Clone, Eq, PartialEq, Copy, Debug, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Register {
    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
}

impl Register {
    pub const ALL: [Register; 8] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esp,
        Register::Ebp,
        Register::Esi,
        Register::Edi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Register::Eax => "eax",
            Register::Ecx => "ecx",
            Register::Edx => "edx",
            Register::Ebx => "ebx",
            Register::Esp => "esp",
            Register::Ebp => "ebp",
            Register::Esi => "esi",
            Register::Edi => "edi",
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        Register::ALL.iter().cloned().find(|x| x.name() == name)
    }

    /// Only eax/ecx/edx/ebx have 8-bit views.
    pub fn has_byte_views(self) -> bool {
        (self as u8) < 4
    }
}

/// Which part of a register a `Location` names.
#[derive(Clone, Eq, PartialEq, Copy, Debug, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegisterView {
    Low8,
    High8,
    Word,
    Dword,
}

impl RegisterView {
    pub fn bits(self) -> u8 {
        match self {
            RegisterView::Low8 | RegisterView::High8 => 8,
            RegisterView::Word => 16,
            RegisterView::Dword => 32,
        }
    }

    pub fn shift(self) -> u8 {
        match self {
            RegisterView::High8 => 8,
            _ => 0,
        }
    }
}

/// Status flags, each a single bit of eflags.
#[derive(Clone, Eq, PartialEq, Copy, Debug, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Flag {
    Carry,
    Parity,
    Auxiliary,
    Zero,
    Sign,
    Direction,
    Overflow,
}

impl Flag {
    pub const ALL: [Flag; 7] = [
        Flag::Carry,
        Flag::Parity,
        Flag::Auxiliary,
        Flag::Zero,
        Flag::Sign,
        Flag::Direction,
        Flag::Overflow,
    ];

    /// Bit index of the flag in eflags.
    pub fn bit_offset(self) -> u8 {
        match self {
            Flag::Carry => 0,
            Flag::Parity => 2,
            Flag::Auxiliary => 4,
            Flag::Zero => 6,
            Flag::Sign => 7,
            Flag::Direction => 10,
            Flag::Overflow => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Flag::Carry => "cf",
            Flag::Parity => "pf",
            Flag::Auxiliary => "af",
            Flag::Zero => "zf",
            Flag::Sign => "sf",
            Flag::Direction => "df",
            Flag::Overflow => "of",
        }
    }

    pub fn from_name(name: &str) -> Option<Flag> {
        Flag::ALL.iter().cloned().find(|x| x.name() == name)
    }
}

/// Something whose value can be checked in the final machine state.
#[derive(Clone, Eq, PartialEq, Copy, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Location {
    Register(Register, RegisterView),
    Flag(Flag),
}

pub const ALL_REGISTERS: [Location; 8] = [
    Location::Register(Register::Eax, RegisterView::Dword),
    Location::Register(Register::Ebx, RegisterView::Dword),
    Location::Register(Register::Ecx, RegisterView::Dword),
    Location::Register(Register::Edx, RegisterView::Dword),
    Location::Register(Register::Esi, RegisterView::Dword),
    Location::Register(Register::Edi, RegisterView::Dword),
    Location::Register(Register::Esp, RegisterView::Dword),
    Location::Register(Register::Ebp, RegisterView::Dword),
];

pub const ALL_FLAGS: [Location; 7] = [
    Location::Flag(Flag::Carry),
    Location::Flag(Flag::Parity),
    Location::Flag(Flag::Auxiliary),
    Location::Flag(Flag::Zero),
    Location::Flag(Flag::Sign),
    Location::Flag(Flag::Direction),
    Location::Flag(Flag::Overflow),
];

/// Every register followed by every flag.
pub fn all_locations() -> Vec<Location> {
    ALL_REGISTERS.iter().chain(ALL_FLAGS.iter()).cloned().collect()
}

impl Location {
    pub fn reg32(register: Register) -> Location {
        Location::Register(register, RegisterView::Dword)
    }

    pub fn bits(self) -> u8 {
        match self {
            Location::Register(_, view) => view.bits(),
            Location::Flag(_) => 1,
        }
    }

    /// Returns `None` for views that don't exist, e.g. `High8` of esi.
    pub fn name(self) -> Option<&'static str> {
        use self::Register::*;
        use self::RegisterView::*;
        let name = match self {
            Location::Flag(flag) => flag.name(),
            Location::Register(reg, Dword) => reg.name(),
            Location::Register(reg, Word) => &reg.name()[1..],
            Location::Register(reg, view) => match (reg, view) {
                (Eax, Low8) => "al",
                (Ecx, Low8) => "cl",
                (Edx, Low8) => "dl",
                (Ebx, Low8) => "bl",
                (Eax, High8) => "ah",
                (Ecx, High8) => "ch",
                (Edx, High8) => "dh",
                (Ebx, High8) => "bh",
                _ => return None,
            },
        };
        Some(name)
    }

    /// Parses a comma or whitespace separated list, e.g. `eax, cf,of`.
    pub fn parse_list(text: &str) -> Result<Vec<Location>, UnknownLocation> {
        text.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|x| !x.is_empty())
            .map(|x| x.parse())
            .collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownLocation(pub String);

impl fmt::Display for UnknownLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unknown register or flag `{}`", self.0)
    }
}

impl std::error::Error for UnknownLocation {}

impl FromStr for Location {
    type Err = UnknownLocation;

    fn from_str(text: &str) -> Result<Location, UnknownLocation> {
        let name = text.trim().to_ascii_lowercase();
        if let Some(flag) = Flag::from_name(&name) {
            return Ok(Location::Flag(flag));
        }
        if let Some(reg) = Register::from_name(&name) {
            return Ok(Location::reg32(reg));
        }
        if let Some(reg) = Register::from_name(&format!("e{}", name)) {
            return Ok(Location::Register(reg, RegisterView::Word));
        }
        let bytes = name.as_bytes();
        if bytes.len() == 2 {
            let view = match bytes[1] {
                b'l' => Some(RegisterView::Low8),
                b'h' => Some(RegisterView::High8),
                _ => None,
            };
            let reg = Register::from_name(&format!("e{}x", bytes[0] as char))
                .filter(|x| x.has_byte_views());
            if let (Some(reg), Some(view)) = (reg, view) {
                return Ok(Location::Register(reg, view));
            }
        }
        Err(UnknownLocation(text.into()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => match *self {
                Location::Register(reg, view) => write!(f, "{}.{:?}", reg.name(), view),
                Location::Flag(flag) => f.write_str(flag.name()),
            },
        }
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Location({})", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_names() {
        let loc = |x: &str| x.parse::<Location>().unwrap();
        assert_eq!(loc("eax"), Location::reg32(Register::Eax));
        assert_eq!(loc("EDI"), Location::reg32(Register::Edi));
        assert_eq!(loc("ax"), Location::Register(Register::Eax, RegisterView::Word));
        assert_eq!(loc("sp"), Location::Register(Register::Esp, RegisterView::Word));
        assert_eq!(loc("ah"), Location::Register(Register::Eax, RegisterView::High8));
        assert_eq!(loc("bl"), Location::Register(Register::Ebx, RegisterView::Low8));
        assert_eq!(loc("zf"), Location::Flag(Flag::Zero));
        assert!("sil".parse::<Location>().is_err());
        assert!("sh".parse::<Location>().is_err());
        assert!("eflags".parse::<Location>().is_err());
        assert!("xl".parse::<Location>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for &loc in all_locations().iter() {
            assert_eq!(loc.to_string().parse::<Location>().unwrap(), loc);
        }
        for &reg in Register::ALL.iter().filter(|x| x.has_byte_views()) {
            for &view in &[RegisterView::Low8, RegisterView::High8, RegisterView::Word] {
                let loc = Location::Register(reg, view);
                assert_eq!(loc.to_string().parse::<Location>().unwrap(), loc);
            }
        }
        assert_eq!(Location::Register(Register::Esi, RegisterView::High8).name(), None);
    }

    #[test]
    fn widths_and_offsets() {
        assert_eq!(Location::reg32(Register::Eax).bits(), 32);
        assert_eq!("ax".parse::<Location>().unwrap().bits(), 16);
        assert_eq!("ah".parse::<Location>().unwrap().bits(), 8);
        assert_eq!(RegisterView::High8.shift(), 8);
        assert_eq!(Location::Flag(Flag::Overflow).bits(), 1);
        let offsets = Flag::ALL.iter().map(|x| x.bit_offset()).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 2, 4, 6, 7, 10, 11]);
    }

    #[test]
    fn lists() {
        let list = Location::parse_list("eax, cf,of  zf").unwrap();
        assert_eq!(list, vec![
            Location::reg32(Register::Eax),
            Location::Flag(Flag::Carry),
            Location::Flag(Flag::Overflow),
            Location::Flag(Flag::Zero),
        ]);
        assert_eq!(
            Location::parse_list("eax,bogus"),
            Err(UnknownLocation("bogus".into())),
        );
        assert_eq!(all_locations().len(), 15);
    }
}
