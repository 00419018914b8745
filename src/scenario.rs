//! Instruction sequences to test, and the locations to check after them.

use std::fmt;

use crate::location::{Flag, Location, Register};

/// Operands that sit on sign, zero, carry and overflow edges of 8/16/32-bit
/// arithmetic.
pub const BOUNDARY_VALUES: [u32; 10] = [
    0, 1, 2, 0x1234, 0x7fff, 0x8000, 0xffff, 0x7fff_ffff, 0x8000_0000, 0xffff_ffff,
];

/// Highest shift/rotate count tested; counts are masked by hardware, so this
/// covers the wrap-around twice.
pub const MAX_ROTATE_COUNT: u32 = 64;

/// One instruction sequence and what to verify after it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Scenario {
    pub asm: String,
    /// Values substituted into the template, if the scenario came from one.
    pub operands: Vec<u32>,
    pub locations: Vec<Location>,
}

impl Scenario {
    pub fn new<S: Into<String>>(asm: S, locations: &[Location]) -> Scenario {
        Scenario {
            asm: asm.into(),
            operands: Vec::new(),
            locations: locations.into(),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut locations = self.locations.iter();
        write!(f, "{} [", self.asm.lines().map(str::trim).filter(|x| !x.is_empty())
            .collect::<Vec<_>>().join("; "))?;
        if let Some(first) = locations.next() {
            write!(f, "{}", first)?;
            for loc in locations {
                write!(f, ", {}", loc)?;
            }
        }
        write!(f, "]")
    }
}

/// Assembly text with `{}` slots that are filled with hex operands.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new<S: Into<String>>(text: S) -> Template {
        Template {
            text: text.into(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.text.matches("{}").count()
    }

    /// Panics if `operands.len()` doesn't match the slot count.
    pub fn render(&self, operands: &[u32]) -> String {
        assert_eq!(operands.len(), self.slot_count(), "Operand count for {:?}", self.text);
        let mut out = String::with_capacity(self.text.len() + operands.len() * 10);
        let mut pieces = self.text.split("{}");
        if let Some(first) = pieces.next() {
            out.push_str(first);
        }
        for (piece, operand) in pieces.zip(operands) {
            out.push_str(&format!("{:#x}", operand));
            out.push_str(piece);
        }
        out
    }

    pub fn instantiate(&self, operands: &[u32], locations: &[Location]) -> Scenario {
        Scenario {
            asm: self.render(operands),
            operands: operands.into(),
            locations: locations.into(),
        }
    }

    /// Instantiates the template for every combination of `values` in the slots,
    /// varying the last slot fastest.
    pub fn product<'a>(
        &'a self,
        values: &'a [u32],
        locations: &'a [Location],
    ) -> impl Iterator<Item = Scenario> + 'a {
        let slots = self.slot_count() as u32;
        let total = if values.is_empty() && slots != 0 { 0 } else { values.len().pow(slots) };
        (0..total).map(move |mut index| {
            let mut operands = vec![0; slots as usize];
            for out in operands.iter_mut().rev() {
                *out = values[index % values.len()];
                index /= values.len();
            }
            self.instantiate(&operands, locations)
        })
    }

    /// `product` over `BOUNDARY_VALUES`.
    pub fn boundary_product(&self, locations: &[Location]) -> Vec<Scenario> {
        self.product(&BOUNDARY_VALUES, locations).collect()
    }
}

/// Non-empty lines, trimmed and tab-indented.
pub fn prettify(asm: &str) -> String {
    asm.lines()
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(|x| format!("\t{}", x))
        .collect::<Vec<_>>()
        .join("\n")
}

fn reg(register: Register) -> Location {
    Location::reg32(register)
}

/// eax and the arithmetic flags.
pub fn arithmetic_locations() -> Vec<Location> {
    vec![
        reg(Register::Eax),
        Location::Flag(Flag::Overflow),
        Location::Flag(Flag::Sign),
        Location::Flag(Flag::Zero),
        Location::Flag(Flag::Carry),
        Location::Flag(Flag::Parity),
        Location::Flag(Flag::Auxiliary),
    ]
}

/// `op eax, B` after `mov eax, A`, for every boundary pair (A, B).
pub fn binary_op_scenarios(mnemonic: &str) -> Vec<Scenario> {
    let template = Template::new(format!("mov eax, {{}}\n{} eax, {{}}\n", mnemonic));
    template.boundary_product(&arithmetic_locations())
}

/// One-operand `mul`/`imul` of eax by ebx, for every boundary pair.
pub fn multiply_scenarios(mnemonic: &str) -> Vec<Scenario> {
    let template = Template::new(format!("mov eax, {{}}\nmov ebx, {{}}\n{} ebx\n", mnemonic));
    let locations = [
        reg(Register::Eax),
        reg(Register::Edx),
        Location::Flag(Flag::Overflow),
        Location::Flag(Flag::Carry),
    ];
    template.boundary_product(&locations)
}

/// Rotates a fixed value by cl for each count in 0..=64.
///
/// Rotates through carry (rcl/rcr) depend on the incoming carry, so they
/// get two scenarios per count, one starting with `stc` and one with `clc`.
pub fn rotate_scenarios(mnemonic: &str) -> Vec<Scenario> {
    let template = Template::new(format!("mov cl, {{}}\nmov eax, 0x12b4e78f\n{} eax, cl\n", mnemonic));
    let locations = [
        reg(Register::Eax),
        Location::Flag(Flag::Carry),
        Location::Flag(Flag::Overflow),
    ];
    let through_carry = match mnemonic {
        "rcl" | "rcr" => true,
        _ => false,
    };
    let mut out = Vec::new();
    for count in 0..=MAX_ROTATE_COUNT {
        let scenario = template.instantiate(&[count], &locations);
        if through_carry {
            for &prefix in &["stc", "clc"] {
                out.push(Scenario {
                    asm: format!("{}\n{}", prefix, scenario.asm),
                    ..scenario.clone()
                });
            }
        } else {
            out.push(scenario);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn render() {
        let template = Template::new("mov eax, {}\nadd eax, {}\n");
        assert_eq!(template.slot_count(), 2);
        assert_eq!(template.render(&[0, 0x7fff_ffff]), "mov eax, 0x0\nadd eax, 0x7fffffff\n");
        let plain = Template::new("nop");
        assert_eq!(plain.slot_count(), 0);
        assert_eq!(plain.render(&[]), "nop");
    }

    #[test]
    #[should_panic]
    fn render_wrong_count() {
        Template::new("mov eax, {}").render(&[1, 2]);
    }

    #[test]
    fn cartesian_product() {
        let template = Template::new("mov eax, {}\nsub eax, {}");
        let all = template.boundary_product(&[reg(Register::Eax)]);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0].operands, vec![0, 0]);
        assert_eq!(all[1].operands, vec![0, 1]);
        assert_eq!(all[10].operands, vec![1, 0]);
        assert_eq!(all[99].operands, vec![0xffff_ffff, 0xffff_ffff]);
        let mut pairs = all.iter().map(|x| x.operands.clone()).collect::<Vec<_>>();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), 100);

        let single = Template::new("mov eax, {}").product(&[5, 6], &[]).collect::<Vec<_>>();
        assert_eq!(single.len(), 2);
        assert_eq!(single[1].asm, "mov eax, 0x6");
        assert_eq!(Template::new("nop").product(&[1, 2], &[]).count(), 1);
        assert_eq!(Template::new("mov eax, {}").product(&[], &[]).count(), 0);
    }

    #[test]
    fn families() {
        let add = binary_op_scenarios("add");
        assert_eq!(add.len(), 100);
        assert_eq!(add[12].asm, "mov eax, 0x1\nadd eax, 0x2\n");
        assert_eq!(add[0].locations.len(), 7);

        let mul = multiply_scenarios("imul");
        assert_eq!(mul.len(), 100);
        assert!(mul[0].asm.ends_with("imul ebx\n"));
        assert_eq!(mul[0].locations[1], reg(Register::Edx));

        let rol = rotate_scenarios("rol");
        assert_eq!(rol.len(), 65);
        assert_eq!(rol[64].asm, "mov cl, 0x40\nmov eax, 0x12b4e78f\nrol eax, cl\n");

        let rcr = rotate_scenarios("rcr");
        assert_eq!(rcr.len(), 130);
        assert!(rcr[0].asm.starts_with("stc\nmov cl, 0x0\n"));
        assert!(rcr[1].asm.starts_with("clc\nmov cl, 0x0\n"));
        assert_eq!(rcr[1].operands, vec![0]);
        assert_eq!(rcr[129].operands, vec![64]);
    }

    #[test]
    fn pretty() {
        let asm = "\n    \tmov eax,0xaaaa55aa\n\tmov ebx,0xcccccc55\n    ";
        assert_eq!(prettify(asm), "\tmov eax,0xaaaa55aa\n\tmov ebx,0xcccccc55");
        let scenario = Scenario::new(asm, &[reg(Register::Eax), Location::Flag(Flag::Zero)]);
        assert_eq!(scenario.to_string(), "mov eax,0xaaaa55aa; mov ebx,0xcccccc55 [eax, zf]");
        assert!(Scenario::new("", &[]).operands.is_empty());
    }
}
