/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::fs::File;
use std::process;

use clap::{Arg, Command};

use bigtools_rs::{determine_file_type, BigBedReader, BigFileKind, BigWigReader};

/* -------------------------------------------------------------------------- */

fn print_info(filename_in: &str, verbose: bool) {
    if verbose {
        eprintln!("Opening {}", filename_in);
    }

    let mut file = File::open(filename_in).unwrap_or_else(|err| {
        eprintln!("Error opening file: {}", err);
        process::exit(1);
    });

    let kind = determine_file_type(&mut file).unwrap_or_else(|err| {
        eprintln!("Error reading file header: {}", err);
        process::exit(1);
    });

    match kind {
        Some(BigFileKind::BigWig) => {
            let reader = BigWigReader::open(filename_in).unwrap_or_else(|err| {
                eprintln!("Error opening file: {}", err);
                process::exit(1);
            });
            println!("type: BigWig");
            print_summary_and_chroms(reader.total_summary(), reader.chroms().into_iter().map(|c| (c.key.clone(), c.size)));
        }
        Some(BigFileKind::BigBed) => {
            let reader = BigBedReader::open(filename_in).unwrap_or_else(|err| {
                eprintln!("Error opening file: {}", err);
                process::exit(1);
            });
            println!("type: BigBed");
            print_summary_and_chroms(reader.total_summary(), reader.chroms().into_iter().map(|c| (c.key.clone(), c.size)));
        }
        None => {
            eprintln!("{} is neither a BigBed nor a BigWig file", filename_in);
            process::exit(1);
        }
    }
}

fn print_summary_and_chroms(summary: bigtools_rs::BigSummary, chroms: impl Iterator<Item = (String, u32)>) {
    println!("basesCovered: {}", summary.count);
    println!("min          : {}", summary.min_value);
    println!("max          : {}", summary.max_value);
    println!("sum          : {}", summary.sum);
    println!("sumSquares   : {}", summary.sum_squares);
    println!("chromosomes:");
    for (name, size) in chroms {
        println!("  {}: {}", name, size);
    }
}

/* -------------------------------------------------------------------------- */

fn main() {
    let matches = Command::new("BigTools Info")
        .version("1.0")
        .author("Philipp Benner [https://github.com/pbenner]")
        .about("Print BigBed/BigWig file information")
        .arg(Arg::new("input").required(true).index(1).help("Input BigBed or BigWig file"))
        .arg(Arg::new("verbose").short('v').long("verbose").action(clap::ArgAction::SetTrue).help("Enable verbose output"))
        .get_matches();

    let filename_in = matches.get_one::<String>("input").unwrap();
    let verbose = matches.get_flag("verbose");

    print_info(filename_in, verbose);
}
