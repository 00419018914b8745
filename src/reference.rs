//! Ground truth: runs an instruction sequence on the host CPU.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::Toolchain;
use crate::location::{Location, Register};
use crate::process;
use crate::Error;

/// Register state captured right after the tested sequence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConcreteState {
    registers: [u32; 8],
    pub eflags: u32,
}

impl ConcreteState {
    pub fn register(&self, register: Register) -> u32 {
        self.registers[register as usize]
    }

    pub fn set_register(&mut self, register: Register, value: u32) {
        self.registers[register as usize] = value;
    }

    /// Full 32-bit register for register locations, 0/1 for flags.
    pub fn value(&self, location: Location) -> u32 {
        match location {
            Location::Register(reg, _) => self.register(reg),
            Location::Flag(flag) => (self.eflags >> flag.bit_offset()) & 1,
        }
    }

    /// Parses `name=hexvalue` lines; every general register and `eflags`
    /// must be present.
    pub fn parse(text: &str) -> Result<ConcreteState, Error> {
        static LINE: OnceLock<Regex> = OnceLock::new();
        let line_re = LINE.get_or_init(|| Regex::new(r"^([a-z]+)=([0-9a-fA-F]{1,8})$").unwrap());
        let mut state = ConcreteState::default();
        let mut seen_registers = 0u8;
        let mut seen_eflags = false;
        for line in text.lines().map(str::trim).filter(|x| !x.is_empty()) {
            let caps = line_re.captures(line)
                .ok_or_else(|| Error::MalformedDump(format!("Unexpected line {:?}", line)))?;
            let value = u32::from_str_radix(&caps[2], 16)
                .map_err(|e| Error::MalformedDump(format!("{:?}: {}", line, e)))?;
            match &caps[1] {
                "eflags" => {
                    state.eflags = value;
                    seen_eflags = true;
                }
                name => match Register::from_name(name) {
                    Some(reg) => {
                        state.set_register(reg, value);
                        seen_registers |= 1 << (reg as u8);
                    }
                    None => {
                        return Err(Error::MalformedDump(format!("Unknown register {:?}", name)));
                    }
                },
            }
        }
        if let Some(&missing) = Register::ALL.iter().find(|&&x| seen_registers & (1 << (x as u8)) == 0) {
            return Err(Error::MalformedDump(format!("Missing {}", missing.name())));
        }
        if !seen_eflags {
            return Err(Error::MalformedDump("Missing eflags".into()));
        }
        Ok(state)
    }
}

const C_PROLOGUE: &str = r#"#include <stdio.h>
int main(void)
{
        unsigned int Reax, Rebx, Recx, Redx, Resi, Redi, Resp, Rebp, Reflags;
        asm volatile(
"#;

// eax/esp/ebp are stored to memory before eax is reused for the pushed
// flags; the remaining registers are picked up by output constraints.
const C_EPILOGUE: &str = r#"        "mov %0, eax\n"
        "mov %1, esp\n"
        "mov %2, ebp\n"
        "pushf\n"
        "pop eax\n"
        :
        "=m" (Reax),
        "=m" (Resp),
        "=m" (Rebp),
        "=a" (Reflags),
        "=b" (Rebx),
        "=c" (Recx),
        "=d" (Redx),
        "=S" (Resi),
        "=D" (Redi)
        ::);
        printf("eax=%08x\n", Reax);
        printf("ebx=%08x\n", Rebx);
        printf("ecx=%08x\n", Recx);
        printf("edx=%08x\n", Redx);
        printf("esi=%08x\n", Resi);
        printf("edi=%08x\n", Redi);
        printf("esp=%08x\n", Resp);
        printf("ebp=%08x\n", Rebp);
        printf("eflags=%08x\n", Reflags);
        return 0;
}
"#;

/// C program which executes `asm` once and prints the resulting registers.
pub fn c_source(asm: &str) -> String {
    let mut out = String::from(C_PROLOGUE);
    for line in asm.lines().map(str::trim).filter(|x| !x.is_empty()) {
        out.push_str("        \"");
        out.push_str(&line.replace('\\', "\\\\").replace('"', "\\\""));
        out.push_str("\\n\"\n");
    }
    out.push_str(C_EPILOGUE);
    out
}

/// Assembles `asm` as 32-bit code into raw opcodes, returning the output path.
pub fn assemble(toolchain: &Toolchain, dir: &Path, asm: &str) -> Result<PathBuf, Error> {
    let input = dir.join("asm.S");
    let output = dir.join("opcodes");
    write_file(&input, &format!("BITS 32\n{}\n", asm))?;
    process::run(
        Command::new(&toolchain.assembler).arg("-o").arg(&output).arg(&input),
        toolchain.timeout,
    )?;
    Ok(output)
}

/// Compiles and runs `asm` natively, returning the register state after it.
pub fn run_on_cpu(toolchain: &Toolchain, dir: &Path, asm: &str) -> Result<ConcreteState, Error> {
    let source = dir.join("test.c");
    let binary = dir.join("test");
    write_file(&source, &c_source(asm))?;
    process::run(
        Command::new(&toolchain.compiler)
            .args(&["-m32", "-masm=intel", "-o"])
            .arg(&binary)
            .arg(&source),
        toolchain.timeout,
    )?;
    let output = process::run(&mut Command::new(&binary), toolchain.timeout)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("Hardware state:\n{}", stdout.trim_end());
    ConcreteState::parse(&stdout)
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    fs::write(path, contents).map_err(|e| Error::IoWithFilename(e, path.into()))
}
