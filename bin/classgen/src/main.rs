mod error;
mod program;

use classgen::jvm::class_file::Version;
use classgen::{compile_batch, CompileOptions};
use error::DriverError;

use clap::{crate_version, value_parser, Arg, Command};
use std::fs;
use std::path::PathBuf;
use std::process;

fn main() {
    env_logger::init();
    match run() {
        Ok(0) => (),
        Ok(failures) => {
            log::error!("{} class(es) failed to compile", failures);
            process::exit(1);
        }
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    }
}

/// Compile the sample classes, returning how many of them failed
fn run() -> Result<usize, DriverError> {
    let matches = Command::new("classgen")
        .version(crate_version!())
        .about("Compile a small sample program into verifiable JVM class files")
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Directory into which `.class` files are written"),
        )
        .arg(
            Arg::new("class")
                .long("class")
                .value_name("CLASS_NAME")
                .default_value("Main")
                .help("Internal name of the generated class (eg. `foo/bar/Main`)"),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .value_name("MAJOR")
                .default_value("52")
                .value_parser(value_parser!(u16))
                .help("Class file major version to emit (51 or later)"),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('j')
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Number of worker threads (defaults to one per core)"),
        )
        .get_matches();

    if let Some(jobs) = matches.get_one::<usize>("jobs") {
        rayon::ThreadPoolBuilder::new()
            .num_threads(*jobs)
            .build_global()?;
    }

    let target = *matches.get_one::<u16>("target").unwrap_or(&52);
    let version = Version::major(target);
    if !version.has_stack_map_frames() {
        return Err(DriverError::UnsupportedTarget(target));
    }
    let class_name = matches
        .get_one::<String>("class")
        .map_or("Main", String::as_str);
    let output_dir = matches
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let main_class = program::lower_program(class_name, &program::sample_program())?;
    let companion = program::companion_class(&format!("{}$Empty", class_name));
    let options = CompileOptions {
        version,
        ..CompileOptions::default()
    };

    log::info!("Compiling '{}' (class file version {})", class_name, target);
    let mut failures = 0;
    for result in compile_batch(vec![main_class, companion], &options) {
        match result {
            Ok(compiled) => {
                let path = output_dir.join(format!("{}.class", compiled.name));
                log::info!("Writing '{}'", path.display());
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, &compiled.bytes)?;
            }
            Err(err) => {
                log::error!("{}", err);
                failures += 1;
            }
        }
    }
    Ok(failures)
}
