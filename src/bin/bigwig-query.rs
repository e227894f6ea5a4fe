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

use std::process;

use clap::{Arg, Command};

use bigtools_rs::BigWigReader;

/* -------------------------------------------------------------------------- */

fn query(filename_in: &str, chrom: &str, from: u32, to: u32, bin_size: u32, verbose: bool) {
    if verbose {
        eprintln!("Opening bigWig file {}", filename_in);
    }

    let reader = BigWigReader::open(filename_in).unwrap_or_else(|err| {
        eprintln!("Error opening file: {}", err);
        process::exit(1);
    });

    if bin_size == 0 {
        match reader.query(chrom, from, to, true) {
            Ok(hits) => {
                for (start, end, value) in hits {
                    println!("{}:[{}, {})={}", chrom, start, end, value);
                }
            }
            Err(err) => {
                eprintln!("Error querying bigWig file: {}", err);
                process::exit(1);
            }
        }
        return;
    }

    let num_bins = ((to - from) / bin_size).max(1);
    match reader.summarize(chrom, from, to, num_bins) {
        Ok(summaries) => {
            for (i, summary) in summaries.iter().enumerate() {
                let bin_start = from + i as u32 * bin_size;
                let bin_end = bin_start + bin_size;
                println!("{}:[{}, {})={}", chrom, bin_start, bin_end, summary.sum);
            }
        }
        Err(err) => {
            eprintln!("Error summarizing bigWig file: {}", err);
            process::exit(1);
        }
    }
}

/* -------------------------------------------------------------------------- */

fn main() {
    let matches = Command::new("BigWig Query")
        .version("1.0")
        .author("Philipp Benner [https://github.com/pbenner]")
        .about("Query BigWig files")
        .arg(Arg::new("input").help("The input BigWig file").required(true).index(1))
        .arg(Arg::new("chrom").help("The chromosome to query").required(true).index(2))
        .arg(Arg::new("from").help("The start position").required(true).index(3))
        .arg(Arg::new("to").help("The end position").required(true).index(4))
        .arg(Arg::new("binsize").help("The bin size for the query (0 for raw intervals)").required(true).index(5))
        .arg(Arg::new("verbose").short('v').long("verbose").action(clap::ArgAction::SetTrue).help("Be verbose"))
        .get_matches();

    let filename_in = matches.get_one::<String>("input").expect("Input file is required");
    let chrom = matches.get_one::<String>("chrom").expect("Chromosome is required");
    let from: u32 = matches.get_one::<String>("from").expect("Start position is required").parse().unwrap_or_else(|_| {
        eprintln!("Invalid start position");
        process::exit(1);
    });
    let to: u32 = matches.get_one::<String>("to").expect("End position is required").parse().unwrap_or_else(|_| {
        eprintln!("Invalid end position");
        process::exit(1);
    });
    let bin_size: u32 = matches.get_one::<String>("binsize").expect("Bin size is required").parse().unwrap_or_else(|_| {
        eprintln!("Invalid bin size");
        process::exit(1);
    });
    let verbose = matches.get_flag("verbose");

    query(filename_in, chrom, from, to, bin_size, verbose);
}
