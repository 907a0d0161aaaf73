use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Compression formats understood by the generated read and write commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Compression {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "gzip")]
    Gzip,
    #[serde(rename = "tar.gzip")]
    TarGzip,
    #[serde(rename = "zip")]
    Zip,
}

impl Compression {
    pub const ALL: [Compression; 4] = [
        Compression::None,
        Compression::Gzip,
        Compression::TarGzip,
        Compression::Zip,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::TarGzip => "tar.gzip",
            Compression::Zip => "zip",
        }
    }

    /// File extension without the leading dot; `None` for uncompressed files.
    pub fn file_extension(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Zip => Some("zip"),
            Compression::Gzip => Some("gz"),
            Compression::TarGzip => Some("tar.gz"),
        }
    }

    /// Command that packs the files named after it and writes the archive to stdout.
    ///
    /// ```
    /// use stowage_core::Compression;
    ///
    /// let cmd = format!("{} data.csv > data.csv.gz", Compression::Gzip.compressor().unwrap());
    /// assert_eq!(cmd, "gzip -c data.csv > data.csv.gz");
    /// ```
    pub fn compressor(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Zip => Some("zip -"),
            Compression::Gzip => Some("gzip -c"),
            Compression::TarGzip => Some("tar -czf -"),
        }
    }

    /// Command that unpacks the file named after it (or `-` for stdin) to stdout.
    pub fn decompressor(self) -> &'static str {
        match self {
            Compression::None => "cat",
            Compression::Zip => "unzip -p",
            Compression::Gzip => "gunzip -d -c",
            Compression::TarGzip => "tar -xOzf",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" | "gz" => Ok(Compression::Gzip),
            "tar.gzip" | "tar.gz" | "tar_gzip" => Ok(Compression::TarGzip),
            "zip" => Ok(Compression::Zip),
            _ => Err(Error::UnknownCompression(s.to_string())),
        }
    }
}
