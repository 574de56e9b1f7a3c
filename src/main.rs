use apted::cost::UnitCostModel;
use apted::parsing::{self, LabelDict};
use apted::ted::Apted;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use itertools::Itertools;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;

/// Tree edit distance utility
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Dataset file of trees in bracket notation, one per line
    #[arg(short, long, value_name = "FILE")]
    dataset_path: PathBuf,
    /// outputs only computed results
    #[arg(short, default_value_t = false)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Computes exact tree edit distances under the unit cost model
    Ted {
        /// output path for distance triples
        #[arg(long)]
        output: PathBuf,
        /// Optional CSV of candidate pairs to verify instead of all pairs
        #[arg(long)]
        candidates: Option<PathBuf>,
    },
    /// Prints the optimal edit mapping for one tree pair
    Mapping {
        /// Index of the first tree in the dataset
        #[arg(long)]
        first: usize,
        /// Index of the second tree in the dataset
        #[arg(long)]
        second: usize,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let mut cmd = Cli::command();

    if !cli.dataset_path.exists() || !cli.dataset_path.is_file() {
        cmd.error(
            ErrorKind::InvalidValue,
            "Path does not exists or is not a valid file!",
        )
        .exit();
    }
    let mut label_dict = LabelDict::default();
    let trees = match parsing::parse_dataset(&cli.dataset_path, &mut label_dict) {
        Ok(trees) => trees,
        Err(e) => {
            eprintln!("Got unexpected error: {}", e);
            exit(1);
        }
    };
    if !cli.quiet {
        println!("Parsed {} trees", trees.len());
    }

    match cli.command {
        Commands::Ted { output, candidates } => {
            let pairs: Vec<(usize, usize)> = match candidates {
                Some(path) => read_candidates(&path)?,
                None => (0..trees.len())
                    .flat_map(|i| ((i + 1)..trees.len()).map(move |j| (i, j)))
                    .collect(),
            };
            let start = Instant::now();
            let distances = pairs
                .par_iter()
                .map(|(i, j)| {
                    let mut apted = Apted::new(UnitCostModel);
                    let dist = apted
                        .compute_edit_distance(&trees[*i], &trees[*j])
                        .expect("dataset trees are non-empty and unit costs are valid");
                    (*i, *j, dist)
                })
                .collect::<Vec<_>>();
            if !cli.quiet {
                println!(
                    "Computed {} distances in {}ms",
                    distances.len(),
                    start.elapsed().as_millis()
                );
            }
            write_distances(output, &distances)?;
        }
        Commands::Mapping { first, second } => {
            if first >= trees.len() || second >= trees.len() {
                cmd.error(ErrorKind::InvalidValue, "Tree index out of range!")
                    .exit();
            }
            let mut apted = Apted::new(UnitCostModel);
            let dist = apted.compute_edit_distance(&trees[first], &trees[second])?;
            let mapping = apted.compute_edit_mapping()?;
            println!("Distance: {dist}");
            for (a, b) in mapping {
                match (a, b) {
                    (a, 0) => println!("del {a}"),
                    (0, b) => println!("ins {b}"),
                    (a, b) => println!("map {a} -> {b}"),
                }
            }
        }
    }

    Ok(())
}

fn read_candidates(path: &PathBuf) -> Result<Vec<(usize, usize)>, anyhow::Error> {
    let reader = BufReader::new(File::open(path)?);
    let mut creader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(reader);
    let mut candidates = vec![];
    for record in creader.records() {
        let record = record?;
        candidates.push((record[0].parse()?, record[1].parse()?));
    }
    Ok(candidates)
}

fn write_distances(
    output: PathBuf,
    distances: &[(usize, usize, f64)],
) -> Result<(), std::io::Error> {
    let f = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)?;
    let mut w = BufWriter::new(f);
    for line in distances
        .iter()
        .map(|(i, j, d)| format!("{i},{j},{d}"))
        .collect_vec()
    {
        writeln!(w, "{line}")?;
    }
    Ok(())
}
