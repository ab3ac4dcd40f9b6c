/*
    TAPAS Library (Token Annotation PAttern Search)

        Licensed under the GNU General Public License v3
*/

//! This module contains the [`ToJson`] and [`FromJson`] traits that are used
//! in serialisation to/from JSON. The data structures themselves derive their
//! serde implementations, this only adds the plumbing.

use serde::de::DeserializeOwned;

use crate::error::TapasError;
use crate::file::*;
use crate::types::*;

pub trait ToJson
where
    Self: TypeInfo + serde::Serialize,
{
    /// Writes a serialisation to any writer
    /// Lower-level function
    fn to_json_writer<W>(&self, writer: W, compact: bool) -> Result<(), TapasError>
    where
        W: std::io::Write,
    {
        match compact {
            false => serde_json::to_writer_pretty(writer, &self),
            true => serde_json::to_writer(writer, &self),
        }
        .map_err(|e| {
            TapasError::SerializationError(format!("Writing {} to file: {}", Self::typeinfo(), e))
        })
    }

    /// Writes this structure to a file, `-` designates standard output
    fn to_json_file(&self, filename: &str, compact: bool) -> Result<(), TapasError> {
        let writer = open_file_writer(filename)?;
        self.to_json_writer(writer, compact)
    }

    /// Serializes this structure to one string.
    fn to_json_string(&self, compact: bool) -> Result<String, TapasError> {
        match compact {
            false => serde_json::to_string_pretty(&self),
            true => serde_json::to_string(&self),
        }
        .map_err(|e| {
            TapasError::SerializationError(format!(
                "Writing {} to string: {}",
                Self::typeinfo(),
                e
            ))
        })
    }
}

pub trait FromJson
where
    Self: TypeInfo + DeserializeOwned + Sized,
{
    /// Loads this structure from a JSON file, `-` designates standard input
    fn from_json_file(filename: &str) -> Result<Self, TapasError> {
        let reader = open_file_reader(filename)?;
        let deserializer = &mut serde_json::Deserializer::from_reader(reader);
        serde_path_to_error::deserialize(deserializer).map_err(|e| {
            TapasError::JsonError(e, filename.to_string(), "Reading JSON from file")
        })
    }

    /// Loads this structure from a JSON string
    fn from_json_str(string: &str) -> Result<Self, TapasError> {
        let deserializer = &mut serde_json::Deserializer::from_str(string);
        serde_path_to_error::deserialize(deserializer).map_err(|e| {
            TapasError::JsonError(e, format!("{} (string)", Self::typeinfo()), "Reading JSON from string")
        })
    }
}
