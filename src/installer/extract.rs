// Archive extraction for downloaded release assets

use anyhow::Result;
use flate2::read::GzDecoder;
use log::debug;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut zip = zip::ZipArchive::new(File::open(archive)?)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", archive.display(), e))?;
    zip.extract(dest)
        .map_err(|e| anyhow::anyhow!("Failed to extract {}: {}", archive.display(), e))?;
    Ok(())
}

/// Extract a `.tar`, `.tar.gz` or `.tgz` archive
pub fn extract_tar(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let reader: Box<dyn Read> = if is_gzip(archive) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    tar::Archive::new(reader)
        .unpack(dest)
        .map_err(|e| anyhow::anyhow!("Failed to extract {}: {}", archive.display(), e))?;
    Ok(())
}

fn lower_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_gzip(path: &Path) -> bool {
    let name = lower_name(path);
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// When `dir` holds exactly one directory, move its contents up a level
pub fn flatten_single_dir(dir: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    let [wrapper] = entries.as_slice() else {
        return Ok(());
    };
    if !wrapper.is_dir() {
        return Ok(());
    }

    debug!("Flattening {}", wrapper.display());
    // Rename first so a child with the wrapper's own name can move up
    let staging = dir.join(".setup-vim-unwrap");
    fs::rename(wrapper, &staging)?;
    for entry in fs::read_dir(&staging)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    Ok(())
}

/// Move a single-file executable to `bin_dir/name` and mark it executable
pub fn install_executable(file: &Path, bin_dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(bin_dir)?;
    let target = bin_dir.join(name);
    if fs::rename(file, &target).is_err() {
        // Different filesystem
        fs::copy(file, &target)?;
        fs::remove_file(file)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
    }
    Ok(target)
}

/// Unpack a downloaded asset into `install_dir` according to its extension
pub fn unpack(asset: &Path, install_dir: &Path, executable: &str) -> Result<()> {
    let name = lower_name(asset);
    if name.ends_with(".appimage") {
        install_executable(asset, &install_dir.join("bin"), executable)?;
    } else if name.ends_with(".zip") {
        extract_zip(asset, install_dir)?;
        flatten_single_dir(install_dir)?;
    } else if name.ends_with(".tar") || is_gzip(asset) {
        extract_tar(asset, install_dir)?;
        flatten_single_dir(install_dir)?;
    } else {
        anyhow::bail!("Unsupported archive format: {}", asset.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_tar_gz_wrapper_is_flattened() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("nvim-linux-x86_64.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("nvim-linux-x86_64/bin/nvim", "binary"),
                ("nvim-linux-x86_64/share/nvim/runtime/filetype.lua", "-- ft"),
            ],
        );

        let install = temp.path().join("vim");
        unpack(&archive, &install, "nvim").unwrap();

        assert_eq!(fs::read_to_string(install.join("bin/nvim")).unwrap(), "binary");
        assert!(install.join("share/nvim/runtime/filetype.lua").exists());
        assert!(!install.join("nvim-linux-x86_64").exists());
    }

    #[test]
    fn test_zip_is_extracted_and_flattened() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("nvim-win64.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.start_file("nvim-win64/bin/nvim.exe", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"exe").unwrap();
        zip.finish().unwrap();

        let install = temp.path().join("vim");
        unpack(&archive, &install, "nvim").unwrap();
        assert_eq!(fs::read_to_string(install.join("bin/nvim.exe")).unwrap(), "exe");
    }

    #[test]
    fn test_flatten_keeps_multiple_entries() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        flatten_single_dir(temp.path()).unwrap();
        assert!(temp.path().join("a").is_dir());
        assert!(temp.path().join("b").is_dir());
    }

    #[test]
    fn test_flatten_handles_child_named_like_wrapper() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("vim/vim")).unwrap();
        fs::write(temp.path().join("vim/vim/file"), "x").unwrap();
        flatten_single_dir(temp.path()).unwrap();
        assert!(temp.path().join("vim/file").exists());
    }

    #[test]
    fn test_appimage_becomes_executable() {
        let temp = TempDir::new().unwrap();
        let asset = temp.path().join("Vim-v9.0.0000.glibc2.15-x86_64.AppImage");
        fs::write(&asset, "elf").unwrap();

        let install = temp.path().join("vim");
        unpack(&asset, &install, "vim").unwrap();

        let target = install.join("bin").join("vim");
        assert_eq!(fs::read_to_string(&target).unwrap(), "elf");
        assert!(!asset.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let temp = TempDir::new().unwrap();
        let asset = temp.path().join("vim.pkg");
        fs::write(&asset, "").unwrap();
        assert!(unpack(&asset, &temp.path().join("vim"), "vim").is_err());
    }
}
