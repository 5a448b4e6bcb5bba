//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, Command};

use blockhex::{
    codegen::Image,
    ihex::{self, HexOptions, Record},
};

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
};

use log::{debug, error, info};

const LICENSE: &str = "\
Licensed under the Apache License, Version 2.0 (the \"License\");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an \"AS IS\" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.";

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!(", "))
        .about(crate_description!())
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .required_unless_present_any(["info", "license"])
                .help("Source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output file, stdout if absent"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Print build information and exit"),
        )
        .arg(
            Arg::new("license")
                .long("license")
                .help("Print license and exit"),
        )
        .arg(
            Arg::new("segment-start")
                .long("segment-start")
                .conflicts_with("no-start")
                .help("Emit the entry address as a Start Segment Address record"),
        )
        .arg(
            Arg::new("no-start")
                .long("no-start")
                .help("Do not emit an entry address record"),
        )
        .arg(Arg::new("ast").long("ast").help("Dump the syntax tree to stderr"))
        .arg(Arg::new("map").long("map").help("Dump the memory map to stderr"))
        .arg(
            Arg::new("verify")
                .long("verify")
                .help("Decode the emitted records and compare them against the image"),
        )
        .get_matches();

    initialize_logging(args.occurrences_of("verbose"));

    if args.is_present("info") {
        print!("{}", build_info());
        return Ok(());
    } else if args.is_present("license") {
        println!("{}", LICENSE);
        return Ok(());
    }

    let mut options = HexOptions::empty();
    if args.is_present("segment-start") {
        options |= HexOptions::SEGMENT_START;
    }

    if args.is_present("no-start") {
        options |= HexOptions::NO_START;
    }

    // Se extraen argumentos necesarios
    let input = args
        .value_of("input")
        .context("No input file given")?;

    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read source file: {}", input))?;

    debug!("Compiling {} with {:?}", input, options);

    let output = match blockhex::compile(input, &text, options) {
        Ok(output) => output,
        Err(error) => {
            eprint!("{}", error.diagnostics());
            std::process::exit(1);
        }
    };

    if args.is_present("ast") {
        eprint!("{}", output.program);
    }

    if args.is_present("map") {
        eprint!("{}", memory_map(&output.image));
    }

    if args.is_present("verify") {
        verify(&output.image, &output.lines)?;
        info!("Verified {} records", output.lines.len());
    }

    match args.value_of("output") {
        None | Some("-") => {
            let stdout = io::stdout();
            write_lines(stdout.lock(), &output.lines).context("Failed to write to stdout")?;
        }

        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            write_lines(BufWriter::new(file), &output.lines)
                .with_context(|| format!("Failed to write to file: {}", path))?;
        }
    }

    Ok(())
}

/// Información de versión y de la compilación del propio ejecutable.
///
/// La fecha y la revisión se toman del entorno al momento de compilar.
fn build_info() -> String {
    let date = option_env!("BLOCKHEX_BUILD_DATE").unwrap_or("unknown");
    let revision = option_env!("BLOCKHEX_BUILD_REVISION").unwrap_or("unknown");

    format!(
        "{} {}\n\
         Version:             {}\n\
         Operating System:    {}\n\
         System Architecture: {}\n\
         Build Date:          {}\n\
         Build Revision:      {}\n",
        crate_name!(),
        crate_description!(),
        crate_version!(),
        std::env::consts::OS,
        std::env::consts::ARCH,
        date,
        revision
    )
}

fn initialize_logging(verbosity: u64) {
    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(match verbosity {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .chain(io::stderr())
        .apply();

    if let Err(error) = result {
        eprintln!("Failed to initialize logging: {}", error);
    }
}

fn write_lines<W: Write>(mut out: W, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }

    out.flush()
}

fn memory_map(image: &Image) -> String {
    let mut map = String::new();

    match image.entry() {
        Some(entry) => map.push_str(&format!("entry    0x{:04X}\n", entry)),
        None => map.push_str("entry    none\n"),
    }

    for (name, address) in image.globals() {
        map.push_str(&format!("loc      0x{:04X}  {}\n", address, name));
    }

    for chunk in image.chunks() {
        let end = chunk.address as usize + chunk.bytes.len();
        map.push_str(&format!(
            "block    0x{:04X}..0x{:04X}  {} bytes\n",
            chunk.address,
            end,
            chunk.bytes.len()
        ));
    }

    map
}

/// Vuelve a leer los registros emitidos y los compara contra la imagen.
fn verify(image: &Image, lines: &[String]) -> anyhow::Result<()> {
    let records = lines
        .iter()
        .enumerate()
        .map(|(number, line)| {
            line.parse::<Record>()
                .with_context(|| format!("Record {} is invalid: {}", number + 1, line))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if records.last() != Some(&Record::end_of_file()) {
        bail!("Output does not end with an end-of-file record");
    }

    let flatten = |chunks: &[blockhex::codegen::Chunk]| -> Vec<(usize, u8)> {
        chunks
            .iter()
            .flat_map(|chunk| {
                let address = chunk.address as usize;
                chunk.bytes.iter().enumerate().map(move |(i, &byte)| (address + i, byte))
            })
            .collect()
    };

    if flatten(&ihex::chunks(&records)) != flatten(image.chunks()) {
        error!("Decoded records differ from the generated image");
        bail!("Verification failed");
    }

    Ok(())
}
