//! The assets bundle: cookbooks and roles packed into one gzip'd tarball that
//! every node downloads at configuration time.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::root::ConfigRoot;

pub const ASSETS_BUNDLE_NAME: &str = "rigger_chef_assets.tar.gz";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io { path: path.display().to_string(), source }
}

/// Pack `cookbooks` and `roles` into a gzip-compressed tar.
///
/// The archive has exactly two top-level directories, `cookbooks/` and
/// `roles/`, with paths relative to the archive root. A missing source
/// directory becomes an empty directory entry.
pub fn build_assets_bundle(cookbooks: &Path, roles: &Path) -> Result<Vec<u8>, ConfigError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, src) in [("cookbooks", cookbooks), ("roles", roles)] {
        if src.is_dir() {
            debug!("Packing {} from {}", name, src.display());
            builder.append_dir_all(name, src).map_err(io_err(src))?;
        } else {
            debug!("{} not found, packing an empty {}/", src.display(), name);
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder
                .append_data(&mut header, format!("{}/", name), std::io::empty())
                .map_err(io_err(src))?;
        }
    }

    let encoder = builder.into_inner().map_err(io_err(cookbooks))?;
    encoder.finish().map_err(io_err(cookbooks))
}

/// Build the bundle from a config root and write it to `out_dir`.
/// Returns the path of the written file.
pub fn write_assets_bundle(root: &ConfigRoot, out_dir: &Path) -> Result<PathBuf, ConfigError> {
    let bytes = build_assets_bundle(&root.cookbooks_dir(), &root.roles_dir())?;
    let path = out_dir.join(ASSETS_BUNDLE_NAME);
    let mut file = std::fs::File::create(&path).map_err(io_err(&path))?;
    file.write_all(&bytes).map_err(io_err(&path))?;
    info!(bytes = bytes.len(), "Packaged assets to {}", path.display());
    Ok(path)
}
