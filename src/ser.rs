//! Serialization of the GDSII object tree to serde-supported file formats.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{GdsError, GdsResult};

/// An enumeration of supported serialization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationFormat {
    /// JSON.
    Json,
    /// YAML.
    Yaml,
    /// TOML.
    Toml,
}

impl SerializationFormat {
    /// Serializes `data` to a string in this format.
    pub fn to_string(&self, data: &impl Serialize) -> GdsResult<String> {
        match self {
            Self::Json => Ok(serde_json::to_string(data)?),
            Self::Yaml => Ok(serde_yaml::to_string(data)?),
            Self::Toml => Ok(toml::to_string(data)?),
        }
    }

    /// Deserializes a value of type `T` from string `s` in this format.
    pub fn from_str<T: DeserializeOwned>(&self, s: &str) -> GdsResult<T> {
        match self {
            Self::Json => Ok(serde_json::from_str(s)?),
            Self::Yaml => Ok(serde_yaml::from_str(s)?),
            Self::Toml => Ok(toml::from_str(s)?),
        }
    }

    /// Saves `data` to file at path `fname` in this format.
    pub fn save(&self, data: &impl SerdeFile, fname: impl AsRef<Path>) -> GdsResult<()> {
        match self {
            Self::Json => {
                let writer = BufWriter::new(File::create(fname)?);
                serde_json::to_writer(writer, data)?;
            }
            Self::Yaml => {
                let writer = BufWriter::new(File::create(fname)?);
                serde_yaml::to_writer(writer, data)?;
            }
            // The toml crate has no writer-based API; serialize to a string first.
            Self::Toml => std::fs::write(fname, toml::to_string(data)?)?,
        };
        Ok(())
    }

    /// Loads a value of type `T` from file at path `fname` in this format.
    pub fn open<T: SerdeFile>(&self, fname: impl AsRef<Path>) -> GdsResult<T> {
        match self {
            Self::Json => Ok(serde_json::from_reader(BufReader::new(File::open(fname)?))?),
            Self::Yaml => Ok(serde_yaml::from_reader(BufReader::new(File::open(fname)?))?),
            Self::Toml => Ok(toml::from_str(&std::fs::read_to_string(fname)?)?),
        }
    }
}

/// A marker for types that can be saved to and loaded from files
/// in each of the supported serialization formats.
pub trait SerdeFile: Serialize + DeserializeOwned {}

impl From<serde_json::Error> for GdsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Boxed(Arc::new(e))
    }
}

impl From<serde_yaml::Error> for GdsError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Boxed(Arc::new(e))
    }
}

impl From<toml::ser::Error> for GdsError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Boxed(Arc::new(e))
    }
}

impl From<toml::de::Error> for GdsError {
    fn from(e: toml::de::Error) -> Self {
        Self::Boxed(Arc::new(e))
    }
}
