use std::{fs, io, path::Path};

/// Copies `src` (file or directory tree) into `dst_dir`, keeping its base name.
pub fn copy_into(src: &Path, dst_dir: &Path) -> io::Result<()> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", src.display()),
        )
    })?;
    let dst = dst_dir.join(name);

    if fs::metadata(src)?.is_dir() {
        copy_tree(src, &dst)
    } else {
        fs::copy(src, &dst).map(|_| ())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if fs::metadata(&from)?.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
