//! Compound vocabulary: synonym-to-ChEBI mapping and the skip list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::cache::CacheView;
use crate::error::{BenchsyncError, Result};

/// Sentinel for compounds on the skip list; rows carrying it are excluded
/// from upload instead of being flagged as errors.
pub const COMPOUND_SKIP: &str = "compound-on-skip-list";

/// Ad-hoc synonym table mapping lab shorthand to ChEBI names.
static SYNONYM_TO_CHEBI_NAME: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("o2", "dioxygen"),
        ("co2", "carbon dioxide"),
        ("tryptophan", "L-tryptophan"),
        ("trp", "L-tryptophan"),
        ("gluc", "aldehydo-D-glucose"),
        ("glucose", "aldehydo-D-glucose"),
        ("glc", "aldehydo-D-glucose"),
        ("methionine", "L-methionine"),
        ("tyrosine", "L-tyrosine"),
        ("tyr", "L-tyrosine"),
        ("yrosine", "L-tyrosine"),
        ("chloramphenicol", "chloramphenicol"),
        ("chlorampenicol", "chloramphenicol"),
        ("5htp", "5-hydroxytryptophan"),
        ("5-htp", "5-hydroxytryptophan"),
        ("spectinomycin", "spectinomycin"),
        ("spectinomycine", "spectinomycin"),
        ("kanamycin", "kanamycin X"),
        ("indole", "1H-indole"),
        ("oxygen", "dioxygen"),
        ("succinate", "succinate(1-)"),
        ("lactate2", "lactate"),
        ("trp_ex", "L-tryptophan"),
        ("trp_total", "L-tryptophan"),
        ("trpytamine", "tryptamine"),
        ("htp", "5-hydroxytryptophan"),
        ("acetylserotonin", "N-acetylserotonin"),
        ("acetyltryptamine", "N-acetyltryptamine"),
        ("acserotonin", "N-acetylserotonin"),
        ("actyptamine", "N-acetyltryptamine"),
        ("(nh4)2so4", "ammonium sulfate"),
        ("cacl2*2h2o", "calcium dichloride"),
        ("cocl2*6h2o", "cobalt dichloride"),
        ("edta", "EDTA disodium salt dihydrate"),
        ("h3bo3", "boric acid"),
        ("kh2po4", "potassium dihydrogen phosphate"),
        ("ki", "potassium iodide"),
        ("mgcl2", "magnesium dichloride"),
        ("mgso4*7h2o", "magnesium sulfate heptahydrate"),
        ("na2moo4*2h2o", "sodium molybdate dihydrate"),
        ("p-aminobenzoic acid", "4-aminobenzoic acid"),
        ("znso4*7h2o", "zinc sulfate heptahydrate"),
        ("CoSO4*6H2O", "cobalt(2+) sulfate heptahydrate"),
        ("Na2MoO2*2H2O", "sodium molybdate dihydrate"),
        ("NiSO4*3H2O", "nickel sulfate"),
        ("EtOH", "ethanol"),
        ("Biotin", "biotin"),
        ("3HP", "3-hydroxypropionic acid"),
        ("MES", "2-(N-morpholino)ethanesulfonic acid"),
        ("mncl2*4h2o", "manganese(II) chloride tetrahydrate"),
        ("cuso4*5h2o", "copper(II) sulfate pentahydrate"),
        ("ZnCl2", "zinc dichloride"),
        ("FeSO4*7H2O", "iron(2+) sulfate heptahydrate"),
        ("tri-Na-citrate", "sodium citrate"),
        ("Al2(SO4)3*18 H2O", "aluminium sulfate octadecahydrate"),
        ("Al2(SO4)3*18H2O", "aluminium sulfate octadecahydrate"),
        ("MnSO4*H2O", "manganese(II) sulfate monohydrate"),
        ("Pyridoxine HCl", "pyridoxine hydrochloride"),
        ("Pyridoxine-HCl", "pyridoxine hydrochloride"),
        ("Thiamine HCl", "thiamine(2+) dichloride"),
        ("Thiamine-HCl", "thiamine(2+) dichloride"),
        ("Ca-D-(+)phantothenate", "Calcium pantothenate"),
        ("Ca-panthothenate", "pantothenate"),
        ("Thiotic acid", "(R)-lipoic acid"),
        ("Vitamin B12", "cobalamin"),
        ("Glucose*H2O", "aldehydo-D-glucose"),
        ("Tryptophane", "L-tryptophan"),
        ("NAcetyltryptamine", "N-acetyltryptamine"),
        ("NAcTrp", "N-acetyltryptamine"),
        ("Yeast Extract", "Yeast extract"),
    ])
});

/// Synonyms that map to the skip sentinel, e.g. compounds the LIMS does not
/// track.
static SKIP_LIST: Lazy<HashSet<&'static str>> = Lazy::new(|| HashSet::from(["Antifoam 204"]));

/// Outcome of mapping a compound synonym.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompoundName {
    /// Resolved canonical ChEBI name.
    Chebi(String),
    /// The synonym is on the skip list; exclude the row from upload.
    Skip,
    /// The cell was empty.
    Missing,
}

/// Maps a compound synonym to a canonical name.
pub type SynonymMapper = Arc<dyn Fn(&str) -> Result<CompoundName> + Send + Sync>;

/// Mapper passing every non-empty synonym through unchanged.
pub fn identity_mapper() -> SynonymMapper {
    Arc::new(|synonym: &str| {
        if synonym.trim().is_empty() || synonym.trim().eq_ignore_ascii_case("nan") {
            Ok(CompoundName::Missing)
        } else {
            Ok(CompoundName::Chebi(synonym.trim().to_string()))
        }
    })
}

/// Map a synonym to a ChEBI name against a cached compound set.
///
/// Resolution order: skip list, exact static table, case-insensitive static
/// table, exact membership in the cached set, lowercase membership. Fails if
/// none match.
pub fn map_synonym(compounds: &HashSet<String>, synonym: &str) -> Result<CompoundName> {
    let synonym = synonym.trim();
    if synonym.is_empty() || synonym.eq_ignore_ascii_case("nan") {
        return Ok(CompoundName::Missing);
    }
    if SKIP_LIST.contains(synonym) {
        return Ok(CompoundName::Skip);
    }
    if let Some(name) = SYNONYM_TO_CHEBI_NAME.get(synonym) {
        return Ok(CompoundName::Chebi((*name).to_string()));
    }
    let lowered = synonym.to_lowercase();
    if let Some(name) = SYNONYM_TO_CHEBI_NAME.get(lowered.as_str()) {
        return Ok(CompoundName::Chebi((*name).to_string()));
    }
    if compounds.contains(synonym) {
        return Ok(CompoundName::Chebi(synonym.to_string()));
    }
    if compounds.contains(&lowered) {
        return Ok(CompoundName::Chebi(lowered));
    }
    Err(BenchsyncError::NotFound(format!(
        "failed to map {synonym} to chebi"
    )))
}

/// Mapper backed by the identifier cache's compound snapshot.
pub fn chebi_mapper(view: &CacheView) -> SynonymMapper {
    let compounds = Arc::clone(&view.compounds);
    Arc::new(move |synonym: &str| map_synonym(&compounds, synonym))
}
