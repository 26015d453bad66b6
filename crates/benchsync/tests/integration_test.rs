//! Integration tests for the full upload pipeline.

use std::io::Write;

use serde_json::json;
use tempfile::NamedTempFile;

use benchsync::gateway::MemoryGateway;
use benchsync::upload::{
    FermentationOptions, FermentationUploader, MediaOptions, MediaUploader, ScreenOptions,
    ScreenUploader, StrainsUploader, Uploader, XrefMeasurementUploader, XrefOptions,
};
use benchsync::validation::{
    compound_name_unknown, medium_name_unknown, reaction_id_unknown, strain_alias_unknown,
};
use benchsync::{
    chebi_mapper, BenchsyncError, EntityType, IdentifierCache, Project, RefreshScope, XrefKind,
};

const MEDIA_CSV: &str = "medium,compound_name,concentration,pH\n\
    M9 glucose,glc,2.0,7.0\n\
    M9 glucose,kanamycin,0.05,7.0\n\
    M9 glucose,Antifoam 204,0.1,7.0\n";

const STRAINS_CSV: &str = "pool,parent_pool,pool_type,genotype_pool,strain,parent_strain,genotype_strain,reference,organism\n\
    p2,p1,diversity,,eggs,scref,+geneX,0,Saccharomyces cerevisiae\n\
    p1,,diversity,,scref,,,1,Saccharomyces cerevisiae\n";

const SAMPLES_CSV: &str = "experiment,description,date,do,gas,gasflow,ph_set,ph_correction,stirrer,temperature,reactor,operation,feed_medium,batch_medium,strain\n\
    E0001,batch fermentation,2024-03-25,20,air,1.0,7.0,KOH,800,30,R1,batch,M9 glucose,M9 glucose,scref\n\
    E0001,batch fermentation,2024-03-25,20,air,1.0,7.0,KOH,800,30,R2,batch,M9 glucose,M9 glucose,eggs\n";

const PHYSIOLOGY_CSV: &str = "phase_start,phase_end,quantity,parameter,numerator_compound_name,denominator_compound_name,unit,E0001_R1,E0001_R2\n\
    0,10,mass,concentration,glc,,mg/L,1.5,2.5\n\
    0,10,,growth-rate,,,h-1,0.21,0.25\n";

const FLUXES_CSV: &str = "experiment,description,date,temperature,sample_name,strain,medium,phase_start,phase_end,xref_id,mode,value\n\
    F1,flux scan,2024-05-02,30,s1,scref,M9 glucose,0,10,bigg:PFK,quantitative,1.1\n\
    F1,flux scan,2024-05-02,30,s1,scref,M9 glucose,0,10,bigg:PGI,quantitative,2.2\n";

fn project() -> Project {
    Project::new("DEM")
}

/// Full pipeline: media first, then strains, then the sample-bearing
/// uploads validated against a cache refreshed in between.
#[test]
fn test_full_pipeline_against_memory_gateway() {
    let gateway = MemoryGateway::new().with_xref_ids(XrefKind::Reaction, ["PFK", "PGI"]);
    let project = project();
    let cache = IdentifierCache::new();
    cache
        .refresh(&gateway, RefreshScope::Full)
        .expect("cache refresh failed");
    let view = cache.view();

    // Media go first so the fermentation rows can reference them.
    let media = MediaUploader::from_content(
        &project,
        MEDIA_CSV.as_bytes(),
        MediaOptions {
            synonym_mapper: chebi_mapper(&view),
            checks: vec![compound_name_unknown(chebi_mapper(&view))],
        },
    )
    .expect("media construction failed");
    assert_eq!(media.medium_count(), 1);
    Uploader::Media(media).upload(&gateway).unwrap();
    assert_eq!(gateway.created_count(EntityType::Medium), 1);
    // The skip-list compound is excluded from the recipe.
    let recipe = &gateway.contents_updates()[0].1;
    assert_eq!(recipe.as_array().unwrap().len(), 2);

    let strains =
        StrainsUploader::from_content(&project, STRAINS_CSV.as_bytes()).expect("strains failed");
    assert_eq!(strains.strain_aliases(), vec!["scref", "eggs"]);
    Uploader::Strains(strains).upload(&gateway).unwrap();
    assert_eq!(gateway.created_count(EntityType::Strain), 2);

    // New media and strains become visible to the checks after a refresh.
    cache.refresh(&gateway, RefreshScope::Lite).unwrap();
    let view = cache.view();

    let fermentation = FermentationUploader::from_content(
        &project,
        SAMPLES_CSV.as_bytes(),
        PHYSIOLOGY_CSV.as_bytes(),
        FermentationOptions {
            overwrite: true,
            synonym_mapper: chebi_mapper(&view),
            checks: vec![
                medium_name_unknown(&view),
                strain_alias_unknown(&view, &project),
                compound_name_unknown(chebi_mapper(&view)),
            ],
        },
    )
    .expect("fermentation construction failed");
    assert_eq!(fermentation.measurement_count(), 4);
    Uploader::Fermentation(fermentation).upload(&gateway).unwrap();

    assert_eq!(gateway.created_count(EntityType::Experiment), 1);
    let batches = gateway.sample_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1.samples.len(), 2);
    assert_eq!(batches[0].1.scalars.len(), 2);

    let fluxes = XrefMeasurementUploader::from_content(
        &project,
        FLUXES_CSV.as_bytes(),
        XrefOptions {
            subject: XrefKind::Reaction,
            overwrite: true,
            checks: vec![
                medium_name_unknown(&view),
                strain_alias_unknown(&view, &project),
                reaction_id_unknown(&view),
            ],
        },
    )
    .expect("fluxes construction failed");
    Uploader::XrefMeasurement(fluxes).upload(&gateway).unwrap();

    assert_eq!(gateway.created_count(EntityType::Sample), 1);
    assert_eq!(gateway.xref_calls().len(), 1);
    assert_eq!(gateway.xref_calls()[0].1.accessions, vec!["PFK", "PGI"]);
}

#[test]
fn test_unknown_references_fail_before_any_remote_write() {
    let gateway = MemoryGateway::new();
    let project = project();
    let cache = IdentifierCache::new();
    cache.refresh(&gateway, RefreshScope::Full).unwrap();
    let view = cache.view();

    // Nothing registered yet, so medium and strain references must fail.
    let err = FermentationUploader::from_content(
        &project,
        SAMPLES_CSV.as_bytes(),
        PHYSIOLOGY_CSV.as_bytes(),
        FermentationOptions {
            overwrite: true,
            synonym_mapper: chebi_mapper(&view),
            checks: vec![
                medium_name_unknown(&view),
                strain_alias_unknown(&view, &project),
            ],
        },
    )
    .expect_err("construction should fail validation");

    match err {
        BenchsyncError::Validation(report) => {
            assert!(!report.valid);
            assert!(report.summary().contains("unknown medium name"));
            assert!(report.summary().contains("unknown strain alias"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(gateway.created_count(EntityType::Experiment), 0);
}

#[test]
fn test_unknown_reaction_identifier_is_reported() {
    let gateway = MemoryGateway::new().with_xref_ids(XrefKind::Reaction, ["PFK"]);
    let project = project();
    gateway.seed(EntityType::Medium, json!({"name": "M9 glucose"}));
    gateway.seed(EntityType::Strain, json!({"alias": "scref", "project": "DEM"}));
    let cache = IdentifierCache::new();
    cache.refresh(&gateway, RefreshScope::Full).unwrap();
    let view = cache.view();

    let data = "experiment,description,date,temperature,sample_name,strain,medium,phase_start,phase_end,xref_id,mode,value\n\
        F1,flux scan,2024-05-02,30,s1,scref,M9 glucose,0,10,bigg:NOPE,quantitative,1.1\n";
    let err = XrefMeasurementUploader::from_content(
        &project,
        data.as_bytes(),
        XrefOptions {
            subject: XrefKind::Reaction,
            overwrite: true,
            checks: vec![reaction_id_unknown(&view)],
        },
    )
    .expect_err("unknown accession should fail");
    assert!(err.to_string().contains("unknown reaction identifier"));
}

#[test]
fn test_screen_end_to_end() {
    let gateway = MemoryGateway::new();
    let project = project();
    gateway.seed(EntityType::Strain, json!({"alias": "scref", "project": "DEM"}));
    gateway.seed(EntityType::Medium, json!({"name": "M9 glucose"}));

    let data = "experiment,description,date,temperature,plate_name,plate_model,row,column,strain,medium,operation,value,unit,quantity,parameter,numerator_compound_name,denominator_compound_name\n\
        S1,screen,2024-04-02,30,plate1,greiner96,A,1,scref,M9 glucose,batch,1.5,g/L,mass,concentration,glc,\n\
        S1,screen,2024-04-02,30,plate1,greiner96,A,2,scref,M9 glucose,batch,2.5,g/L,mass,concentration,glc,\n";
    let screen =
        ScreenUploader::from_content(&project, data.as_bytes(), ScreenOptions::default())
            .expect("screen construction failed");
    Uploader::Screen(screen).upload(&gateway).unwrap();

    assert_eq!(gateway.created_count(EntityType::Plate), 1);
    let plates = gateway.records_of(EntityType::Plate);
    assert_eq!(plates[0].str_field("barcode"), Some("DEM_S1_plate1"));
    let batches = gateway.sample_batches();
    assert_eq!(batches[0].1.samples.len(), 2);
}

#[test]
fn test_overwrite_flag_controls_experiment_conflicts() {
    let gateway = MemoryGateway::new();
    let project = project();
    gateway.seed(EntityType::Strain, json!({"alias": "scref", "project": "DEM"}));
    gateway.seed(EntityType::Strain, json!({"alias": "eggs", "project": "DEM"}));
    gateway.seed(EntityType::Medium, json!({"name": "M9 glucose"}));
    gateway.seed(
        EntityType::Experiment,
        json!({"identifier": "E0001", "project": "DEM", "date": "2020-01-01"}),
    );

    let build = |overwrite: bool| {
        FermentationUploader::from_content(
            &project,
            SAMPLES_CSV.as_bytes(),
            PHYSIOLOGY_CSV.as_bytes(),
            FermentationOptions {
                overwrite,
                ..FermentationOptions::default()
            },
        )
        .unwrap()
    };

    let err = build(false).upload(&gateway).unwrap_err();
    assert!(matches!(err, BenchsyncError::Conflict(_)));
    assert_eq!(gateway.archived_count(EntityType::Experiment), 0);

    build(true).upload(&gateway).unwrap();
    assert_eq!(gateway.archived_count(EntityType::Experiment), 1);
    assert_eq!(gateway.created_count(EntityType::Experiment), 1);
}

/// The byte-content API composes with files on disk, as front ends use it.
#[test]
fn test_upload_from_file_content() {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(MEDIA_CSV.as_bytes()).expect("write failed");

    let content = std::fs::read(file.path()).expect("read failed");
    let media =
        MediaUploader::from_content(&project(), &content, MediaOptions::default()).unwrap();
    let gateway = MemoryGateway::new();
    media.upload(&gateway).unwrap();
    assert_eq!(gateway.created_count(EntityType::Medium), 1);
}
