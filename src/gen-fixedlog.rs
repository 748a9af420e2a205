use itertools::Itertools;
use parse_int::parse;
use std::fs::{read, write};
use std::io::{stdout, Error, ErrorKind, Result, Write};
use std::path::Path;
use std::process;
use std::time::Instant;
use structopt::StructOpt;

/// Full scale of a 14-bit MIDI controller value. This is both the base and
/// the exponent denominator of the curve, and the exclusive upper key bound.
const DOMAIN_BOUND: u16 = 16383;

/// Returned by the generated function for keys outside the table.
const FALLBACK: u16 = 16381;

/// Where the generated source lands, relative to the working directory.
const OUTPUT_FILE: &str = "fixedlog.cc";

/// Value of the curve for a single key (no fallback handling).
fn reverse_log(x: u16) -> u16 {
    if x == 0 {
        return 0;
    }

    let bound = DOMAIN_BOUND as f64;

    // truncates toward zero, never exceeds DOMAIN_BOUND for x < DOMAIN_BOUND
    bound.powf(x as f64 / bound) as u16
}

/// Every dispatch entry, in strictly increasing key order.
fn table() -> Vec<(u16, u16)> {
    (0..DOMAIN_BOUND).map(|x| (x, reverse_log(x))).collect()
}

/// What the generated `fixed_reverselog` returns at runtime for `x`.
fn lookup(x: u16) -> u16 {
    if x < DOMAIN_BOUND {
        reverse_log(x)
    } else {
        FALLBACK
    }
}

/// Renders the complete source file. Lines are newline-separated with no
/// trailing newline, so the firmware build sees exactly the historical file.
fn render() -> String {
    let preamble = vec![
        "#include <Arduino.h>".to_owned(),
        "uint16_t fixed_reverselog(uint16_t x) { ".to_owned(),
        "  switch(x) {".to_owned(),
    ];

    let cases = table()
        .into_iter()
        .map(|(x, value)| format!("    case {}: return {};", x, value));

    let epilogue = vec![
        "  }".to_owned(),
        format!("return {};", FALLBACK),
        "}".to_owned(),
    ];

    preamble.into_iter().chain(cases).chain(epilogue).join("\n")
}

fn write_to<P: AsRef<Path>>(path: P) -> Result<()> {
    write(path, render())
}

/// Returns whether the file at `path` is byte-identical to a fresh render.
fn is_up_to_date<P: AsRef<Path>>(path: P) -> Result<bool> {
    Ok(read(path)? == render().into_bytes())
}

fn emit<W: Write>(mut out: W) -> Result<()> {
    out.write_all(render().as_bytes())?;
    out.flush()
}

fn parse_key(text: &str) -> Result<u16> {
    parse::<u16>(text.trim()).map_err(|err| Error::new(ErrorKind::Other, err))
}

fn run(args: Opt, output: &Path) -> Result<()> {
    if args.stdout {
        let stdout = stdout();
        return emit(stdout.lock());
    }

    if !args.query.is_empty() {
        for text in &args.query {
            let x = parse_key(text)?;
            println!("[+] fixed_reverselog({}) = {}", x, lookup(x));
        }

        return Ok(());
    }

    let start_time = Instant::now();

    if args.check {
        println!("[-] Checking {} against a fresh table.", output.display());

        let up_to_date = is_up_to_date(output).map_err(|err| {
            println!("[!] Failed to read {}!", output.display());
            err
        })?;

        if !up_to_date {
            return Err(Error::new(
                ErrorKind::Other,
                format!("{} is stale, regenerate it", output.display()),
            ));
        }

        println!(
            "[+] {} is up to date ({:.2} seconds).",
            output.display(),
            start_time.elapsed().as_secs_f64()
        );

        return Ok(());
    }

    println!("[-] Generating {} table entries.", DOMAIN_BOUND);

    write_to(output).map_err(|err| {
        println!("[!] Failed to write {}!", output.display());
        err
    })?;

    println!(
        "[+] Wrote {} after {:.2} seconds.",
        output.display(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

fn main() {
    if let Err(err) = run(Opt::from_args(), Path::new(OUTPUT_FILE)) {
        eprintln!("\nfatal error: {}", err);
        process::exit(1); // report failure
    }
}

#[derive(StructOpt)]
#[structopt(about)]
struct Opt {
    #[structopt(long = "stdout", conflicts_with = "query")]
    stdout: bool,

    #[structopt(long = "check", conflicts_with_all = &["stdout", "query"])]
    check: bool,

    #[structopt(long = "query", number_of_values = 1)]
    query: Vec<String>,
}
