//! The Dump Loader: parses the three NCBI-style `.dmp` text files into a `TaxonStore`.
//!
//! The field separator is the literal three-byte sequence `TAB|TAB`, with an optional
//! trailing `TAB|` end-of-record marker. This is *not* a delimiter a single-byte CSV
//! reader can express, so fields are split by hand rather than through the `csv` crate
//! (which the rest of the repo still uses for writing CSV output).

use std::fs;
use std::path::Path;

use crate::error::{Result, TaxonomyError};
use crate::store::TaxonStore;

fn split_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches('\n').trim_end_matches('\r');
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split("\t|\t").map(str::trim).collect()
}

fn parse_id(file: &str, line_no: usize, field: &str) -> Result<i64> {
    field.parse::<i64>().map_err(|_| TaxonomyError::Format {
        file: file.to_string(),
        line: line_no,
        reason: format!("expected an integer id, got {:?}", field),
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Load the nodes dump: `external_id`, `parent_external_id`, `rank`. Parent references
/// are validated once the whole file has been read, so row order within the file does
/// not matter.
pub fn load_nodes(path: &Path, store: &mut TaxonStore) -> Result<()> {
    let file = "nodes.dmp";
    let lines = read_lines(path)?;
    debug!("Beginning to read records from {}.", file);

    for (i, line) in lines.iter().enumerate() {
        let fields = split_fields(line);
        if fields.len() < 3 {
            return Err(TaxonomyError::Format {
                file: file.to_string(),
                line: i + 1,
                reason: format!("expected at least 3 fields, got {}", fields.len()),
            });
        }

        let external_id = parse_id(file, i + 1, fields[0])?;
        let parent_external_id = parse_id(file, i + 1, fields[1])?;
        let rank = fields[2].to_string();

        store.insert(external_id, parent_external_id, rank);

        if i > 0 && i % 100_000 == 0 {
            debug!("Read {} records so far.", i);
        }
    }
    debug!("Done inserting {} nodes.", store.len());

    for record in store.iter() {
        if record.is_root() {
            continue;
        }
        if !store.exists(record.parent_external_id) {
            return Err(TaxonomyError::InconsistentTopology {
                external_id: record.external_id,
                parent_external_id: record.parent_external_id,
            });
        }
    }

    Ok(())
}

/// Load the names dump, keeping only the first scientific name seen per id.
pub fn load_names(path: &Path, store: &mut TaxonStore) -> Result<()> {
    let file = "names.dmp";
    let lines = read_lines(path)?;
    debug!("Beginning to read records from {}.", file);

    for (i, line) in lines.iter().enumerate() {
        let fields = split_fields(line);
        if fields.len() < 3 {
            return Err(TaxonomyError::Format {
                file: file.to_string(),
                line: i + 1,
                reason: format!("expected at least 3 fields, got {}", fields.len()),
            });
        }

        let class = fields[fields.len() - 1];
        if !class.contains("scientific name") {
            continue;
        }

        let external_id = parse_id(file, i + 1, fields[0])?;
        let name = fields[1].to_string();

        if !store.set_name(external_id, name) {
            return Err(TaxonomyError::Format {
                file: file.to_string(),
                line: i + 1,
                reason: format!("name refers to unknown external id {}", external_id),
            });
        }
    }
    debug!("Done inserting names.");
    Ok(())
}

/// Load the merged dump: `old_external_id -> new_external_id` aliases. Entries whose
/// `old` id is already live, or whose `new` id is unknown, are silently skipped per
/// spec §4.1 (they are neither fatal nor worth a warning — they reflect a dump that has
/// already been partially applied, not a structural problem).
pub fn load_merged(path: &Path, store: &mut TaxonStore) -> Result<()> {
    let file = "merged.dmp";
    let lines = read_lines(path)?;
    debug!("Beginning to read records from {}.", file);

    for (i, line) in lines.iter().enumerate() {
        let fields = split_fields(line);
        if fields.len() < 2 {
            return Err(TaxonomyError::Format {
                file: file.to_string(),
                line: i + 1,
                reason: format!("expected at least 2 fields, got {}", fields.len()),
            });
        }

        let old_external_id = parse_id(file, i + 1, fields[0])?;
        let new_external_id = parse_id(file, i + 1, fields[1])?;
        store.alias_merged(old_external_id, new_external_id);
    }
    debug!("Done applying merged ids.");
    Ok(())
}

/// Given a database prefix `P`, look for `P_nodes.dmp` etc., falling back to bare
/// `nodes.dmp` etc. in the working directory. Fails if neither form is fully present.
pub fn discover_dump_paths(prefix: Option<&str>) -> Result<(std::path::PathBuf, std::path::PathBuf, std::path::PathBuf)> {
    if let Some(prefix) = prefix {
        let nodes = Path::new(&format!("{}_nodes.dmp", prefix)).to_path_buf();
        let names = Path::new(&format!("{}_names.dmp", prefix)).to_path_buf();
        let merged = Path::new(&format!("{}_merged.dmp", prefix)).to_path_buf();
        if nodes.exists() && names.exists() && merged.exists() {
            return Ok((nodes, names, merged));
        }
    }

    let nodes = Path::new("nodes.dmp").to_path_buf();
    let names = Path::new("names.dmp").to_path_buf();
    let merged = Path::new("merged.dmp").to_path_buf();
    if nodes.exists() && names.exists() && merged.exists() {
        return Ok((nodes, names, merged));
    }

    Err(TaxonomyError::Io {
        path: nodes,
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "neither prefixed nor bare nodes/names/merged.dmp were found",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    /// Join fields the way a real `.dmp` line is: `TAB|TAB`-separated, with a
    /// trailing `TAB|` end-of-record marker.
    fn dmp_line(fields: &[&str]) -> String {
        format!("{}\t|\n", fields.join("\t|\t"))
    }

    fn write_temp(name: &str, lines: &[String]) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!("taxocore_loader_test_{}_{}", n, name));
        fs::write(&path, lines.concat()).unwrap();
        path
    }

    #[test]
    fn loads_nodes_with_tab_pipe_tab_separator() {
        let lines = vec![
            dmp_line(&["1", "1", "no rank"]),
            dmp_line(&["2", "1", "kingdom"]),
        ];
        let path = write_temp("nodes.dmp", &lines);
        let mut store = TaxonStore::new();
        load_nodes(&path, &mut store).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.record(store.internal_of(2).unwrap()).rank, "kingdom");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn nodes_rejects_dangling_parent() {
        let lines = vec![
            dmp_line(&["1", "1", "no rank"]),
            dmp_line(&["2", "99", "kingdom"]),
        ];
        let path = write_temp("nodes_bad.dmp", &lines);
        let mut store = TaxonStore::new();
        let err = load_nodes(&path, &mut store).unwrap_err();
        assert!(matches!(err, TaxonomyError::InconsistentTopology { .. }));
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn names_keeps_first_scientific_name_only() {
        let nodes_path = write_temp("names_nodes.dmp", &[dmp_line(&["1", "1", "no rank"])]);
        let names_path = write_temp(
            "names.dmp",
            &[
                dmp_line(&["1", "first name", "", "scientific name"]),
                dmp_line(&["1", "second name", "", "scientific name"]),
                dmp_line(&["1", "common", "", "common name"]),
            ],
        );
        let mut store = TaxonStore::new();
        load_nodes(&nodes_path, &mut store).unwrap();
        load_names(&names_path, &mut store).unwrap();
        assert_eq!(store.record(store.internal_of(1).unwrap()).name, "first name");
        fs::remove_file(nodes_path).unwrap();
        fs::remove_file(names_path).unwrap();
    }

    #[test]
    fn merged_installs_alias_for_known_new_id() {
        let nodes_path = write_temp(
            "merged_nodes.dmp",
            &[dmp_line(&["1", "1", "no rank"]), dmp_line(&["2", "1", "genus"])],
        );
        let merged_path = write_temp("merged.dmp", &[dmp_line(&["10", "2"])]);
        let mut store = TaxonStore::new();
        load_nodes(&nodes_path, &mut store).unwrap();
        load_merged(&merged_path, &mut store).unwrap();
        assert_eq!(store.internal_of(10), store.internal_of(2));
        fs::remove_file(nodes_path).unwrap();
        fs::remove_file(merged_path).unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let missing = std::env::temp_dir().join("taxocore_loader_test_does_not_exist.dmp");
        let mut store = TaxonStore::new();
        let err = load_nodes(&missing, &mut store).unwrap_err();
        assert!(matches!(err, TaxonomyError::Io { .. }));
    }
}
