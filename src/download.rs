//! Download/Populate tooling: fetch the NCBI `taxdump.zip` release, verify its checksum,
//! and extract it to the three `.dmp` files the Dump Loader reads. Pure file/network
//! glue — the engine itself never touches the network (spec §4.11).

use std::fs::{self, File};
use std::io;
use std::path::Path;

use ftp::{FtpError, FtpStream};
use md5::Context;

use crate::error::{Result, TaxonomyError};
use crate::{NCBI_FTP_HOST, NCBI_FTP_PATH};

fn io_err(path: &Path, source: io::Error) -> TaxonomyError {
    TaxonomyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ftp_err(path: &Path, source: FtpError) -> TaxonomyError {
    TaxonomyError::Io {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, source.to_string()),
    }
}

/// Download the latest release of `taxdmp.zip` and its `.md5` sidecar from the NCBI
/// FTP servers into `datadir`.
pub fn download_taxdump(datadir: &Path, email: &str) -> Result<()> {
    debug!("Contacting {}...", NCBI_FTP_HOST);
    let mut conn = FtpStream::connect(NCBI_FTP_HOST).map_err(|e| ftp_err(datadir, e))?;
    conn.login("ftp", email).map_err(|e| ftp_err(datadir, e))?;
    debug!("Connected and logged in.");

    conn.cwd(NCBI_FTP_PATH).map_err(|e| ftp_err(datadir, e))?;

    debug!("Retrieving MD5 sum file...");
    let md5_path = datadir.join("taxdmp.zip.md5");
    let mut file = File::create(&md5_path).map_err(|e| io_err(&md5_path, e))?;
    let mut cursor = conn
        .simple_retr("taxdmp.zip.md5")
        .map_err(|e| ftp_err(&md5_path, e))?;
    io::copy(&mut cursor, &mut file).map_err(|e| io_err(&md5_path, e))?;

    debug!("Retrieving taxdmp.zip...");
    let zip_path = datadir.join("taxdmp.zip");
    conn.retr("taxdmp.zip", |stream| {
        let mut file = File::create(&zip_path).map_err(FtpError::ConnectionError)?;
        io::copy(stream, &mut file).map_err(FtpError::ConnectionError)
    })
    .map_err(|e| ftp_err(&datadir.join("taxdmp.zip"), e))?;

    let _ = conn.quit();
    debug!("Download complete.");
    Ok(())
}

/// Verify `taxdmp.zip` against the MD5 sum shipped alongside it.
pub fn check_integrity(datadir: &Path) -> Result<()> {
    let zip_path = datadir.join("taxdmp.zip");
    let mut file = File::open(&zip_path).map_err(|e| io_err(&zip_path, e))?;
    let mut hasher = Context::new();
    debug!("Computing MD5 sum...");
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(&zip_path, e))?;
    let digest = format!("{:x}", hasher.compute());

    let md5_path = datadir.join("taxdmp.zip.md5");
    let mut reference = fs::read_to_string(&md5_path).map_err(|e| io_err(&md5_path, e))?;
    reference.truncate(32);

    if digest != reference {
        return Err(TaxonomyError::Format {
            file: "taxdmp.zip".to_string(),
            line: 0,
            reason: format!("checksum mismatch: expected {}, computed {}", reference, digest),
        });
    }
    Ok(())
}

/// Extract every file from `taxdmp.zip` into `datadir`.
pub fn extract_dump(datadir: &Path) -> Result<()> {
    let zip_path = datadir.join("taxdmp.zip");
    let file = File::open(&zip_path).map_err(|e| io_err(&zip_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| TaxonomyError::Format {
        file: "taxdmp.zip".to_string(),
        line: 0,
        reason: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| TaxonomyError::Format {
            file: "taxdmp.zip".to_string(),
            line: 0,
            reason: e.to_string(),
        })?;
        let outpath = datadir.join(entry.sanitized_name());
        debug!("Extracted {}", outpath.display());
        let mut outfile = File::create(&outpath).map_err(|e| io_err(&outpath, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| io_err(&outpath, e))?;
    }
    Ok(())
}

/// Remove the downloaded archive and the extracted files the Dump Loader never reads.
/// `nodes.dmp`, `names.dmp` and `merged.dmp` are kept — they are the whole point of
/// `populate`.
pub fn remove_temp_files(datadir: &Path) -> Result<()> {
    let disposable = [
        "taxdmp.zip",
        "taxdmp.zip.md5",
        "citations.dmp",
        "delnodes.dmp",
        "division.dmp",
        "gc.prt",
        "gencode.dmp",
        "readme.txt",
    ];
    for name in disposable.iter() {
        let path = datadir.join(name);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}
