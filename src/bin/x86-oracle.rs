extern crate clap;
extern crate env_logger;
extern crate x86_oracle;

use std::process;

use x86_oracle::{Location, Oracle, Scenario, Toolchain, ALL_FLAGS, ALL_REGISTERS};

fn main() {
    env_logger::init();
    let matches = clap::App::new("x86-oracle")
        .arg(clap::Arg::with_name("path")
            .index(1)
            .value_name("FILE")
            .required(true)
            .help("32-bit Intel syntax assembly to test"))
        .arg(clap::Arg::with_name("check")
            .long("check")
            .value_name("LOCATIONS")
            .takes_value(true)
            .help("Comma-separated registers and flags to compare, e.g. eax,ah,zf \
                (defaults to all general registers and flags)"))
        .arg(clap::Arg::with_name("keep_scratch")
            .long("keep-scratch")
            .takes_value(false)
            .help("Leaves the intermediate files on disk"))
        .get_matches();

    let path = matches.value_of_os("path").unwrap();
    let asm = match std::fs::read_to_string(path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Can't read {}: {}", path.to_string_lossy(), e);
            process::exit(2);
        }
    };
    let locations = match matches.value_of("check") {
        Some(list) => match Location::parse_list(list) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(2);
            }
        },
        None => ALL_REGISTERS.iter().chain(ALL_FLAGS.iter()).cloned().collect(),
    };
    let keep_scratch = matches.is_present("keep_scratch");
    let oracle = Toolchain::from_env()
        .map(|x| {
            let keep = x.keep_scratch || keep_scratch;
            x.with_keep_scratch(keep)
        })
        .and_then(Oracle::new);
    let oracle = match oracle {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    let scenario = Scenario::new(asm, &locations);
    match oracle.check(&scenario, 0) {
        Ok(()) => println!("OK: {} locations agree", locations.len()),
        Err(e) => {
            println!("FAIL{}", e);
            process::exit(1);
        }
    }
}
