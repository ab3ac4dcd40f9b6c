/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains some common helper functions for dealing with file I/O

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use crate::error::TapasError;

/// Get a file for reading or writing, strips a `file://` prefix if present
pub(crate) fn get_filepath(filename: &str) -> Result<PathBuf, TapasError> {
    if filename.starts_with("https://") || filename.starts_with("http://") {
        return Err(TapasError::IllegalUsage(
            "Loading URLs is not supported, download the file first",
        ));
    }
    if let Some(stripped) = filename.strip_prefix("file://") {
        Ok(PathBuf::from(stripped))
    } else {
        Ok(PathBuf::from(filename))
    }
}

/// Auxiliary function to help open files
pub(crate) fn open_file(filename: &str) -> Result<File, TapasError> {
    let path = get_filepath(filename)?;
    File::open(path.as_path()).map_err(|e| {
        TapasError::IOError(
            e,
            path.to_string_lossy().into_owned(),
            "Opening file for reading failed",
        )
    })
}

/// Auxiliary function to help create files
pub(crate) fn create_file(filename: &str) -> Result<File, TapasError> {
    let path = get_filepath(filename)?;
    File::create(path.as_path()).map_err(|e| {
        TapasError::IOError(
            e,
            path.to_string_lossy().into_owned(),
            "Opening file for writing failed",
        )
    })
}

/// Opens a file for buffered reading, `-` designates standard input
pub(crate) fn open_file_reader(filename: &str) -> Result<Box<dyn BufRead>, TapasError> {
    if filename == "-" {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(open_file(filename)?)))
    }
}

/// Opens a file for buffered writing, `-` designates standard output
pub(crate) fn open_file_writer(filename: &str) -> Result<Box<dyn Write>, TapasError> {
    if filename == "-" {
        Ok(Box::new(std::io::stdout()))
    } else {
        Ok(Box::new(BufWriter::new(create_file(filename)?)))
    }
}
