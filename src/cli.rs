use miette::{Diagnostic, Result};
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArgError {
    #[error("Path {} does not exist", path.display())]
    FileDoesNotExist { path: PathBuf },

    #[error("{} is not a file", path.display())]
    NotAFile { path: PathBuf },

    #[error("Cannot read file {}: {}", path.display(), err)]
    CannotReadFile { path: PathBuf, err: std::io::Error },

    #[error("Cannot read from stdin: {}", err)]
    CannotReadStdIn { err: std::io::Error },

    #[error("Cannot write file {}: {}", path.display(), err)]
    CannotWriteFile { path: PathBuf, err: std::io::Error },

    #[error("Cannot write to stdout: {}", err)]
    CannotWriteStdOut { err: std::io::Error },
}

/// Reads the contents of `path`, or of stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    let Some(path) = path else {
        tracing::info!("No input path provided, read from stdin");
        let mut buffer = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buffer)
            .map_err(|err| ArgError::CannotReadStdIn { err })?;
        return Ok(buffer);
    };
    if !path.exists() {
        return Err(ArgError::FileDoesNotExist { path: path.to_path_buf() }.into());
    }
    if !path.is_file() {
        return Err(ArgError::NotAFile { path: path.to_path_buf() }.into());
    }
    let contents = std::fs::read(path)
        .map_err(|err| ArgError::CannotReadFile { path: path.to_path_buf(), err })?;
    Ok(contents)
}

/// Writes `content` to `path`, or to stdout when no path is given.
pub fn write_output(path: Option<&Path>, content: &[u8]) -> Result<()> {
    match path {
        None => std::io::stdout()
            .write_all(content)
            .map_err(|err| ArgError::CannotWriteStdOut { err }.into()),
        Some(path) => std::fs::write(path, content)
            .map_err(|err| ArgError::CannotWriteFile { path: path.to_path_buf(), err }.into()),
    }
}
