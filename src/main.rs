#[macro_use]
extern crate log;
extern crate taxocore;

use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use itertools::Itertools;
use structopt::StructOpt;

use taxocore::store::TaxonRecord;
use taxocore::weighted::VoteWeightMode;
use taxocore::Engine;

/// Explore an NCBI-style taxonomy dump: lowest common ancestors, lineages, clade
/// counts and weighted-majority assignment over a local copy of the `.dmp` files.
#[derive(StructOpt)]
pub struct Opt {
    #[structopt(subcommand)]
    cmd: Command,

    /// Be verbose
    #[structopt(short = "v", long = "verbose")]
    verbosity: bool,

    /// Be extremely verbose
    #[structopt(short = "d", long = "debug")]
    debug: bool,
}

#[derive(StructOpt)]
enum Command {
    /// (Re)populate the local dump files by downloading the latest release from the
    /// NCBI servers
    #[structopt(name = "populate")]
    Populate {
        /// Use that email when connecting to NCBI servers
        #[structopt(short = "e", long = "email", default_value = "anonymous@example.com")]
        email: String,

        /// Don't download the dump; use this local `taxdmp.zip` instead
        #[structopt(long = "taxdmp")]
        taxdmp: Option<PathBuf>,
    },

    /// Look up NCBI Taxonomy ID(s) or scientific name(s) and show the results; no
    /// search is performed, only exact matches are returned
    #[structopt(name = "show")]
    Show {
        /// The NCBI Taxonomy ID(s) or scientific name(s)
        terms: Vec<String>,

        /// Output the results as CSV
        #[structopt(short = "c", long = "csv")]
        csv: bool,
    },

    /// Output the lineage of the node(s) (every node on the path to the root)
    #[structopt(name = "lineage")]
    Lineage {
        /// The NCBI Taxonomy ID(s) or scientific name(s)
        terms: Vec<String>,

        /// Comma-separated canonical ranks to project onto instead of printing the
        /// full root-to-node lineage (e.g. "superkingdom,phylum,genus,species")
        #[structopt(short = "r", long = "ranks")]
        ranks: Option<String>,

        /// Output the results as CSV
        #[structopt(short = "c", long = "csv")]
        csv: bool,
    },

    /// Build and print a tree spanning the given terms
    /// Warning: by default, single-child internal nodes are collapsed away; use
    /// -i/--internal to see every node.
    #[structopt(name = "tree")]
    Tree {
        /// The NCBI Taxonomy IDs or scientific name(s)
        terms: Vec<String>,

        /// Show all internal nodes
        #[structopt(short = "i", long = "internal")]
        internal: bool,

        /// Print the tree in Newick format
        #[structopt(short = "n", long = "newick")]
        newick: bool,

        /// Format the nodes with this formatting string (%rank, %name, %taxid)
        #[structopt(short = "f", long = "format")]
        format: Option<String>,
    },

    /// Return the Lowest Common Ancestor (LCA) between the given taxa. If more than
    /// two are given, return the LCA for every pair.
    #[structopt(name = "lca")]
    LCA {
        /// The NCBI Taxonomy IDs or scientific names
        terms: Vec<String>,

        /// Print the results as CSV; the first row contains the headers
        #[structopt(short = "c", long = "csv")]
        csv: bool,
    },

    /// Fold a per-taxon evidence-count table into per-clade subtree sums
    #[structopt(name = "clade-counts")]
    CladeCounts {
        /// Tab-separated file of `external_id<TAB>count` rows
        file: PathBuf,

        /// Output the results as CSV
        #[structopt(short = "c", long = "csv")]
        csv: bool,
    },

    /// Run the weighted-majority LCA algorithm over a table of (taxon, evidence) hits
    #[structopt(name = "weighted-lca")]
    WeightedLca {
        /// Tab-separated file of `external_id<TAB>evidence_value` rows
        file: PathBuf,

        /// Vote-weight mode: uniform, minus_log_evalue, or raw_score
        #[structopt(long = "mode", default_value = "uniform")]
        mode: String,

        /// Minimum fraction of assigned weight the selected taxon must cover
        #[structopt(long = "cutoff", default_value = "0.5")]
        cutoff: f64,
    },
}

/// Resolve each term to a record, logging and skipping terms that don't match
/// anything known to the engine.
fn resolve_records<'a>(engine: &'a Engine, terms: &[String]) -> Vec<&'a TaxonRecord> {
    let mut out = Vec::with_capacity(terms.len());
    for term in terms {
        match engine.resolve_term(term) {
            Ok(id) => match engine.record_of(id, false) {
                Ok(Some(record)) => out.push(record),
                _ => warn!("Unknown taxon: {}", term),
            },
            Err(e) => warn!("{}", e),
        }
    }
    out
}

fn show(records: &[&TaxonRecord], csv: bool) -> Result<(), Box<dyn Error>> {
    if csv {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        wtr.write_record(&["taxid", "scientific_name", "rank"])?;
        for record in records {
            wtr.serialize((record.external_id, &record.name, &record.rank))?;
        }
        wtr.flush()?;
    } else {
        for record in records {
            println!("{} - {}\nNCBI Taxonomy ID: {}", record.name, record.rank, record.external_id);
        }
    }
    Ok(())
}

fn show_lineage(engine: &Engine, records: &[&TaxonRecord], ranks: Option<String>, csv: bool) -> Result<(), Box<dyn Error>> {
    if let Some(ranks) = ranks {
        let requested: Vec<String> = ranks.split(',').map(|r| r.trim().to_string()).collect();
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(io::stdout());

        for record in records {
            let projected = engine.at_ranks(record, &requested)?;
            if csv {
                let mut row = vec![record.external_id.to_string()];
                row.extend(projected);
                wtr.serialize(row)?;
            } else {
                let pairs: Vec<String> = requested
                    .iter()
                    .zip(projected.iter())
                    .map(|(rank, value)| format!("{}={}", rank, value))
                    .collect();
                println!("{} ({}): {}", record.name, record.external_id, pairs.join(", "));
            }
        }
        if csv {
            wtr.flush()?;
        }
        return Ok(());
    }

    if csv {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(io::stdout());
        for record in records {
            let row: Vec<String> = engine
                .lineage_records(record)
                .iter()
                .map(|r| format!("{}:{}:{}", r.rank, r.name, r.external_id))
                .collect();
            wtr.serialize(row)?;
        }
        wtr.flush()?;
    } else {
        for record in records {
            let lineage = engine.lineage_records(record);
            for (i, node) in lineage.iter().enumerate() {
                if i == 0 {
                    println!("root");
                } else if i == lineage.len() - 1 {
                    println!(
                        "{}\u{2514}\u{2500}\u{2500} {}: {} (taxid: {})",
                        " ".repeat(i),
                        node.rank,
                        node.name,
                        node.external_id
                    );
                } else {
                    println!(
                        "{}\u{2514}\u{252C}\u{2500} {}: {} (taxid: {})",
                        " ".repeat(i),
                        node.rank,
                        node.name,
                        node.external_id
                    );
                }
            }
        }
    }
    Ok(())
}

fn show_tree(engine: &Engine, records: &[&TaxonRecord], internal: bool, newick: bool, format: Option<String>) {
    let roots: Vec<usize> = records.iter().map(|r| r.internal_index).collect();
    let mut tree = taxocore::tree::Tree::new(engine.store(), &roots);
    tree.mark_nodes(&roots);

    if let Some(format_string) = format {
        tree.set_format_string(format_string);
    } else if newick {
        tree.set_format_string(String::from("%name"));
    }

    if !internal {
        tree.simplify();
    }

    if newick {
        println!("{}", tree.to_newick());
    } else {
        println!("{}", tree);
    }
}

fn show_lca(engine: &Engine, records: &[&TaxonRecord], csv: bool) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::WriterBuilder::new().from_writer(io::stdout());
    if csv {
        wtr.write_record(&["name1", "taxid1", "name2", "taxid2", "lca_name", "lca_taxid"])?;
    }

    for pair in records.iter().combinations(2) {
        let a = pair[0];
        let b = pair[1];
        let lca_id = engine.lca(a.external_id, b.external_id);
        let lca_record = engine.record_of(lca_id, false)?;
        let lca_name = lca_record.map(|r| r.name.as_str()).unwrap_or("unknown");

        if csv {
            wtr.write_record(&[&a.name, &a.external_id.to_string(), &b.name, &b.external_id.to_string(), lca_name, &lca_id.to_string()])?;
        } else {
            println!("LCA({}, {}) = {} (taxid: {})", a.name, b.name, lca_name, lca_id);
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Read a tab-separated two-column file of `(id, value)` pairs, parsing the second
/// column with `parse`.
fn read_id_value_table<T: FromStr>(path: &PathBuf) -> Result<Vec<(i64, T)>, Box<dyn Error>>
where
    T::Err: std::fmt::Display,
{
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let id: i64 = fields
            .next()
            .ok_or_else(|| format!("{}: line {} is empty", path.display(), i + 1))?
            .trim()
            .parse()?;
        let value: T = fields
            .next()
            .ok_or_else(|| format!("{}: line {} is missing a value column", path.display(), i + 1))?
            .trim()
            .parse()
            .map_err(|e| format!("{}: line {}: {}", path.display(), i + 1, e))?;
        rows.push((id, value));
    }
    Ok(rows)
}

fn show_clade_counts(engine: &Engine, file: &PathBuf, csv: bool) -> Result<(), Box<dyn Error>> {
    let rows = read_id_value_table::<u64>(file)?;
    let counts: std::collections::HashMap<i64, u64> = rows.into_iter().collect();
    let clades = engine.clade_counts(&counts);

    let mut ids: Vec<&i64> = clades.keys().collect();
    ids.sort();

    if csv {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        wtr.write_record(&["taxid", "name", "self_count", "clade_count"])?;
        for id in ids {
            let count = &clades[id];
            let name = engine.record_of(*id, false)?.map(|r| r.name.clone()).unwrap_or_default();
            wtr.serialize((id, name, count.self_count, count.clade_count))?;
        }
        wtr.flush()?;
    } else {
        for id in ids {
            let count = &clades[id];
            let name = engine.record_of(*id, false)?.map(|r| r.name.clone()).unwrap_or_default();
            println!(
                "{} ({}): self={} clade={} children={}",
                name,
                id,
                count.self_count,
                count.clade_count,
                count.children.len()
            );
        }
    }
    Ok(())
}

fn show_weighted_lca(engine: &Engine, file: &PathBuf, mode: &str, cutoff: f64) -> Result<(), Box<dyn Error>> {
    let mode = VoteWeightMode::from_str(mode)?;
    let hits = read_id_value_table::<f64>(file)?;
    let result = engine.weighted_majority_lca(&hits, mode, cutoff)?;

    let name = engine
        .record_of(result.selected, false)?
        .map(|r| r.name.clone())
        .unwrap_or_else(|| "unassigned".to_string());

    println!("selected: {} (taxid: {})", name, result.selected);
    println!("assigned weight: {:.4}", result.total_assigned_weight);
    println!("unassigned hits: {}", result.unassigned_count);
    println!("agreeing hits: {}", result.agreeing_hits);
    println!("selected coverage: {:.2}%", result.selected_percent);
    Ok(())
}

fn build_engine(datadir: &PathBuf) -> Result<Engine, Box<dyn Error>> {
    let nodes_path = datadir.join("nodes.dmp");
    let names_path = datadir.join("names.dmp");
    let merged_path = datadir.join("merged.dmp");

    if !nodes_path.exists() || !names_path.exists() || !merged_path.exists() {
        return Err(From::from(format!(
            "dump files not found in {}. Try running: 'taxocore populate'",
            datadir.display()
        )));
    }

    Ok(Engine::build(&nodes_path, &names_path, &merged_path)?)
}

fn populate(datadir: &PathBuf, email: String, taxdmp: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    match taxdmp {
        Some(path) => {
            info!("Using local dump {}...", path.display());
            fs::copy(&path, datadir.join("taxdmp.zip"))?;
        }
        None => {
            info!("Downloading data from {}...", taxocore::NCBI_FTP_HOST);
            taxocore::download::download_taxdump(datadir, &email)?;
            info!("Checking download integrity...");
            taxocore::download::check_integrity(datadir)?;
            info!("Checksum OK.");
        }
    }

    info!("Extracting dumps...");
    taxocore::download::extract_dump(datadir)?;
    info!("Removing temporary files.");
    taxocore::download::remove_temp_files(datadir)?;
    info!("Done. Dump files are ready in {}.", datadir.display());
    Ok(())
}

pub fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    if opt.debug {
        loggerv::Logger::new().max_level(log::Level::Debug).level(true).init()?;
    } else if opt.verbosity {
        loggerv::Logger::new().max_level(log::Level::Info).level(true).init()?;
    } else {
        loggerv::init_quiet()?;
    }

    let xdg_dirs = xdg::BaseDirectories::with_prefix("taxocore")?;
    let datadir = xdg_dirs.get_data_home();
    xdg_dirs.create_data_directory(&datadir)?;

    match opt.cmd {
        Command::Populate { email, taxdmp } => {
            populate(&datadir, email, taxdmp)?;
        }

        Command::Show { terms, csv } => {
            let engine = build_engine(&datadir)?;
            let records = resolve_records(&engine, &terms);
            show(&records, csv)?;
        }

        Command::Lineage { terms, ranks, csv } => {
            let engine = build_engine(&datadir)?;
            let records = resolve_records(&engine, &terms);
            show_lineage(&engine, &records, ranks, csv)?;
        }

        Command::Tree { terms, internal, newick, format } => {
            let engine = build_engine(&datadir)?;
            let records = resolve_records(&engine, &terms);
            show_tree(&engine, &records, internal, newick, format);
        }

        Command::LCA { terms, csv } => {
            let engine = build_engine(&datadir)?;
            let records = resolve_records(&engine, &terms);
            if records.len() < 2 {
                error!("The lca command needs at least two known taxa.");
            } else {
                show_lca(&engine, &records, csv)?;
            }
        }

        Command::CladeCounts { file, csv } => {
            let engine = build_engine(&datadir)?;
            show_clade_counts(&engine, &file, csv)?;
        }

        Command::WeightedLca { file, mode, cutoff } => {
            let engine = build_engine(&datadir)?;
            show_weighted_lca(&engine, &file, &mode, cutoff)?;
        }
    }

    Ok(())
}

/// Main entry point
fn main() {
    let opt = Opt::from_args();

    if let Err(e) = run(opt) {
        error!("{}", e);
        process::exit(exitcode::SOFTWARE);
    }
    process::exit(exitcode::OK);
}
