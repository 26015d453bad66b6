//! Uploaders: validate and transform one table format each, then push the
//! result through the gateway.
//!
//! Every uploader follows the same two-step contract: the constructor parses,
//! validates and fully transforms the input (all `Validation` and
//! `AmbiguousData` failures happen here, before any remote call), and
//! `upload` issues strictly sequential gateway calls. Uploads are not
//! transactional; a failed upload is safe to resubmit because every variant
//! either skips or archives-and-recreates existing records.

mod experiment;
mod fermentation;
mod media;
mod screen;
mod strains;
mod xref;

pub use fermentation::{FermentationOptions, FermentationUploader};
pub use media::{MediaOptions, MediaUploader};
pub use screen::{ScreenOptions, ScreenUploader};
pub use strains::StrainsUploader;
pub use xref::{XrefMeasurementUploader, XrefOptions};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::vocab::{CompoundName, SynonymMapper, COMPOUND_SKIP};

/// The closed set of upload kinds.
pub enum Uploader {
    Media(MediaUploader),
    Strains(StrainsUploader),
    Fermentation(FermentationUploader),
    Screen(ScreenUploader),
    XrefMeasurement(XrefMeasurementUploader),
}

impl Uploader {
    /// Push the prepared upload through the gateway.
    pub fn upload(&self, gateway: &dyn Gateway) -> Result<()> {
        match self {
            Uploader::Media(uploader) => uploader.upload(gateway),
            Uploader::Strains(uploader) => uploader.upload(gateway),
            Uploader::Fermentation(uploader) => uploader.upload(gateway),
            Uploader::Screen(uploader) => uploader.upload(gateway),
            Uploader::XrefMeasurement(uploader) => uploader.upload(gateway),
        }
    }
}

/// Parse a cell as a float, treating unparseable text as absent.
pub(crate) fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if crate::input::DataTable::is_null_value(value) {
        return None;
    }
    value.parse::<f64>().ok()
}

/// Map a ratio compound cell through the synonym mapper. Empty cells become
/// `None`; skip-list synonyms keep the sentinel so they stay distinguishable
/// inside test ids.
pub(crate) fn resolve_compound(mapper: &SynonymMapper, synonym: &str) -> Result<Option<String>> {
    Ok(match mapper(synonym)? {
        CompoundName::Chebi(name) => Some(name),
        CompoundName::Skip => Some(COMPOUND_SKIP.to_string()),
        CompoundName::Missing => None,
    })
}
