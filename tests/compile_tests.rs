//! End-to-end compilation tests
//!
//! Drive the compiler through JSON fixtures on disk, the same way `schemac` does.

use std::path::{Path, PathBuf};

use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

use datareg_compiler::codegen::Severity;
use datareg_compiler::compiler::UnitEvent;
use datareg_compiler::error::KeyUsage;
use datareg_compiler::schema::{KeyValue, TypeKind};
use datareg_compiler::source::{CompositeDecl, PropertyDecl, PropertyRole, TypeDecl};
use datareg_compiler::{
    Backend, CompileError, Compiler, DataType, DirectorySource, ErrorPhase, MemorySource, RustBackend, SchemaDecl,
    SourceId, SourceReader,
};

fn fixtures(set: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(set)
}

fn reader(set: &str) -> DirectorySource {
    DirectorySource::new(vec![fixtures(set)], "schema.json")
}

fn ids(names: &[&str]) -> Vec<SourceId> {
    names.iter().map(|n| SourceId::new(*n)).collect()
}

// =============================================================================
// Scenario: Shared + Main
// =============================================================================

#[derive(Debug, PartialEq)]
enum Seen {
    Fixup(String),
    Published { unit: String, unresolved: usize },
}

#[test]
fn test_scenario_compiles_in_dependency_order() {
    let reader = reader("scenario");
    let mut compiler = Compiler::new();
    let mut events = Vec::new();

    let order = compiler
        .load_with(&reader, &ids(&["Main"]), |event| match event {
            UnitEvent::FixupStarted(unit) => events.push(Seen::Fixup(unit.to_string())),
            UnitEvent::Published(schema) => events.push(Seen::Published {
                unit: schema.source.to_string(),
                unresolved: schema.unresolved_count(),
            }),
        })
        .unwrap();

    assert_eq!(order, ids(&["Shared", "Main"]));
    assert_eq!(
        events,
        vec![
            Seen::Fixup("Shared".into()),
            Seen::Published {
                unit: "Shared".into(),
                unresolved: 0
            },
            Seen::Fixup("Main".into()),
            Seen::Published {
                unit: "Main".into(),
                unresolved: 0
            },
        ]
    );

    let ctx = compiler.context();
    let shared = ctx.schema_by_name("Shared").unwrap();
    let main = ctx.schema_by_name("Main").unwrap();
    assert_eq!(main.namespace, "Geo.Cities");
    assert_eq!(main.find_type("City").unwrap().namespace, "Geo.Cities");

    let city = main.find_type("City").unwrap();
    let country = &city.properties()[1];
    match country.data_type() {
        DataType::Entity(r) => {
            assert_eq!(r.schema, shared.key);
            assert_eq!(ctx.user_type(*r).name, "Country");
        }
        other => panic!("Expected an entity reference, got {:?}", other),
    }
}

#[test]
fn test_scenario_emits_two_successful_types() {
    let reader = reader("scenario");
    let mut compiler = Compiler::new();
    compiler.load(&reader, &ids(&["Main"])).unwrap();

    let report = compiler.emit(&RustBackend::default());
    assert!(!report.has_errors(), "{}", report);

    let types: Vec<_> = report.results.iter().filter(|r| !r.is_aggregate()).collect();
    assert_eq!(types.len(), 2);
    assert!(types.iter().all(|r| r.severity == Severity::Success));
    assert_eq!(types[0].properties.type_name, "Country");
    assert_eq!(types[0].properties.namespace, "Geo");
    assert_eq!(types[1].properties.type_name, "City");
    assert_eq!(types[1].properties.kind, "entity");
}

#[test]
fn test_report_written_to_disk() {
    let reader = reader("scenario");
    let mut compiler = Compiler::new();
    compiler.load(&reader, &ids(&["Main"])).unwrap();
    let backend = RustBackend::default();
    let report = compiler.emit(&backend);

    let dir = TempDir::new().unwrap();
    let out = dir.path().join("generated");
    let written = report.write(&out, backend.file_extension(), false).unwrap();

    assert_eq!(written.len(), report.results.len());
    for stem in ["Shared.Country", "Main.City", "Shared", "Main"] {
        assert!(out.join(format!("{}.rs", stem)).is_file(), "missing {}", stem);
    }
    let city = std::fs::read_to_string(out.join("Main.City.rs")).unwrap();
    assert!(city.contains("pub country: super::shared::CountryKey,"));
}

// =============================================================================
// Failure atomicity
// =============================================================================

#[test]
fn test_import_cycle_publishes_nothing() {
    let reader = reader("cycle");
    let mut compiler = Compiler::new();

    let err = compiler.load(&reader, &ids(&["A"])).unwrap_err();
    match &err {
        CompileError::ImportCycle { members } => assert_eq!(members, &ids(&["A", "B"])),
        other => panic!("Expected ImportCycle, got {:?}", other),
    }
    assert_eq!(err.phase(), ErrorPhase::Graph);
    assert!(compiler.context().schemas().is_empty());
}

#[test]
fn test_failed_unit_rolls_back_its_imports() {
    let mut source = MemorySource::new();
    source
        .insert_json(
            "Good",
            r#"{ "name": "Good", "types": [ { "kind": "struct", "name": "Point", "properties": [
                { "name": "x", "type": "double" } ] } ] }"#,
        )
        .unwrap();
    source
        .insert_json(
            "Bad",
            r#"{ "name": "Bad", "imports": [ { "source": "Good" } ], "types": [
                { "kind": "struct", "name": "Shape", "properties": [
                    { "name": "origin", "type": "Good.Pont" } ] } ] }"#,
        )
        .unwrap();

    let mut compiler = Compiler::new();
    let err = compiler.load(&source, &ids(&["Bad"])).unwrap_err();
    match &err {
        CompileError::UnresolvedType {
            reference, suggestion, ..
        } => {
            assert_eq!(reference, "Good.Pont");
            assert_eq!(suggestion.as_deref(), Some("Point"));
        }
        other => panic!("Expected UnresolvedType, got {:?}", other),
    }
    assert!(compiler.context().schemas().is_empty());

    // The good unit still compiles on its own
    compiler.load(&source, &ids(&["Good"])).unwrap();
    assert_eq!(compiler.context().schemas().len(), 1);
}

#[test]
fn test_published_units_are_reused() {
    let reader = reader("scenario");
    let mut compiler = Compiler::new();
    compiler.load(&reader, &ids(&["Shared"])).unwrap();

    let mut fixed_up = Vec::new();
    compiler
        .load_with(&reader, &ids(&["Main"]), |event| {
            if let UnitEvent::FixupStarted(unit) = event {
                fixed_up.push(unit.to_string());
            }
        })
        .unwrap();

    assert_eq!(fixed_up, vec!["Main".to_string()]);
    assert_eq!(compiler.context().schemas().len(), 2);
}

#[rstest]
#[case("void")]
#[case("int32")]
#[case("Optional")]
#[case("1st")]
fn test_invalid_schema_names(#[case] name: &str) {
    let source = MemorySource::new().with(
        "Main",
        SchemaDecl {
            name: Some(name.into()),
            ..Default::default()
        },
    );
    match Compiler::new().load(&source, &ids(&["Main"])).unwrap_err() {
        CompileError::InvalidIdentifier { what, name: found, .. } => {
            assert_eq!(what, "schema");
            assert_eq!(found, name);
        }
        other => panic!("Expected InvalidIdentifier, got {:?}", other),
    }
}

// =============================================================================
// Key capability and role agreement
// =============================================================================

#[derive(Debug)]
enum Rejected {
    Key(KeyUsage),
    Role(&'static str),
}

/// `Cell` gets one extra property on top of its `id` key
fn cell_with(property: serde_json::Value) -> MemorySource {
    let schema = json!({
        "name": "Main",
        "types": [
            { "kind": "enum", "name": "Side", "elements": [{ "name": "Left", "value": 1 }] },
            { "kind": "struct", "name": "Point", "properties": [{ "name": "x", "type": "int32" }] },
            { "kind": "entity", "name": "Other", "properties": [{ "name": "id", "type": "int32", "role": "primary_key" }] },
            {
                "kind": "entity",
                "name": "Cell",
                "properties": [{ "name": "id", "type": "int32", "role": "primary_key" }, property]
            }
        ]
    });
    let mut source = MemorySource::new();
    source.insert_json("Main", &schema.to_string()).unwrap();
    source
}

#[rstest]
#[case::custom_primary_key("Vector3", "primary_key", Rejected::Key(KeyUsage::PrimaryKey))]
#[case::enum_primary_key("Side", "primary_key", Rejected::Key(KeyUsage::PrimaryKey))]
#[case::struct_primary_key("Point", "primary_key", Rejected::Key(KeyUsage::PrimaryKey))]
#[case::enum_map_key("Side->string", "plain", Rejected::Key(KeyUsage::MapKey))]
#[case::struct_map_key("Point->string", "plain", Rejected::Key(KeyUsage::MapKey))]
#[case::custom_map_key("Vector3->int32", "plain", Rejected::Key(KeyUsage::MapKey))]
#[case::foreign_key_to_struct("Point", "foreign_key", Rejected::Role("foreign_key"))]
#[case::foreign_key_to_enum("Side", "foreign_key", Rejected::Role("foreign_key"))]
#[case::plain_entity_reference("Other", "plain", Rejected::Role("plain"))]
fn test_key_and_role_rules(#[case] ty: &str, #[case] role: &str, #[case] expected: Rejected) {
    let mut types = datareg_compiler::config::TypesConfig::default();
    types.custom.push(datareg_compiler::config::CustomPrimitive {
        name: "Vector3".into(),
        namespace: "Math".into(),
        can_be_key: false,
    });
    let mut compiler = Compiler::builder().with_types(&types).build().unwrap();

    let source = cell_with(json!({ "name": "slot", "type": ty, "role": role }));
    let err = compiler.load(&source, &ids(&["Main"])).unwrap_err();

    match (&expected, &err) {
        (Rejected::Key(usage), CompileError::KeyNotCapable { usage: found, property, .. }) => {
            assert_eq!(found, usage);
            assert_eq!(property, "slot");
        }
        (Rejected::Role(role), CompileError::RoleMismatch { role: found, property, .. }) => {
            assert_eq!(found, role);
            assert_eq!(property, "slot");
        }
        _ => panic!("Expected {:?}, got {:?}", expected, err),
    }
    assert!(compiler.context().schema_by_name("Main").is_none());
}

#[test]
fn test_key_capable_primitives_are_accepted() {
    let source = cell_with(json!({ "name": "code", "type": "string", "role": "primary_key" }));
    let mut compiler = Compiler::new();
    compiler.load(&source, &ids(&["Main"])).unwrap();

    let main = compiler.context().schema_by_name("Main").unwrap();
    let cell = datareg_compiler::TypeRef::new(main.key, main.type_index("Cell").unwrap());
    assert_eq!(compiler.context().primary_key(cell).unwrap().arity(), 2);
}

// =============================================================================
// World: subdirectories, aliases, inheritance, composite keys
// =============================================================================

fn world() -> Compiler {
    let mut compiler = Compiler::new();
    compiler.load(&reader("world"), &ids(&["Atlas"])).unwrap();
    compiler
}

#[test]
fn test_directory_source_walks_subdirectories() {
    let reader = reader("world");
    let path = reader.locate(&SourceId::new("shared/Geo")).unwrap();
    assert!(path.ends_with("shared/Geo.schema.json"));
    assert_eq!(reader.available(), ids(&["Atlas", "shared/Geo"]));
    assert_eq!(reader.imports(&SourceId::new("Atlas")).unwrap(), ids(&["shared/Geo"]));

    // Every listed id loads, and together they compile as one set
    let mut compiler = Compiler::new();
    let order = compiler.load(&reader, &reader.available()).unwrap();
    assert_eq!(order, ids(&["shared/Geo", "Atlas"]));
}

#[test]
fn test_derived_entity_flattens_and_shares_key() {
    let compiler = world();
    let ctx = compiler.context();
    let atlas = ctx.schema_by_name("Atlas").unwrap();

    let town_index = atlas.type_index("Town").unwrap();
    let place_index = atlas.type_index("Place").unwrap();
    let town = datareg_compiler::TypeRef::new(atlas.key, town_index);
    let place = datareg_compiler::TypeRef::new(atlas.key, place_index);

    let names: Vec<&str> = ctx.effective_properties(town).iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["name", "id", "region", "population", "neighbours", "tags"]);

    assert_eq!(atlas.key_owner(town_index), Some(place));
    assert_eq!(ctx.primary_key(town), ctx.primary_key(place));
    assert_eq!(ctx.primary_key(town).unwrap().arity(), 1);
}

#[test]
fn test_composite_key_round_trip() {
    let compiler = world();
    let ctx = compiler.context();
    let geo = ctx.schema_by_name("Geo").unwrap();
    let region = datareg_compiler::TypeRef::new(geo.key, geo.type_index("Region").unwrap());
    assert_eq!(ctx.user_type(region).kind, TypeKind::Entity);

    let layout = ctx.primary_key(region).unwrap();
    let names: Vec<&str> = layout.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["country", "code", "zone"]);

    let record = json!({ "name": "Tyrol", "country": "AT", "code": 7, "zone": 1, "hemisphere": 1, "area": 12648.0 });
    let derived = layout.key_of(record.as_object().unwrap()).unwrap();
    let composed = layout
        .compose(vec![
            KeyValue::String("AT".into()),
            KeyValue::Integer(7),
            KeyValue::Integer(1),
        ])
        .unwrap();
    assert_eq!(derived, composed);

    let out_of_range = json!({ "country": "AT", "code": 70000, "zone": 1 });
    assert!(layout.key_of(out_of_range.as_object().unwrap()).is_err());
}

#[test]
fn test_world_generates_rust() {
    let report = world().emit(&RustBackend::default());
    assert!(!report.has_errors(), "{}", report);

    let code = |stem: &str| {
        report
            .results
            .iter()
            .find(|r| r.file_stem() == stem)
            .and_then(|r| r.code.clone())
            .unwrap()
    };

    let town = code("Atlas.Town");
    assert!(town.contains("pub region: super::geo::RegionKey,"));
    assert!(town.contains("pub neighbours: Vec<TownKey>,"));
    assert!(town.contains("pub tags: std::collections::HashMap<String, String>,"));
    assert!(town.contains("impl super::geo::Named for Town {"));
    assert!(town.contains("pub type TownKey = (u64,);"));

    let region = code("Geo.Region");
    assert!(region.contains("pub type RegionKey = (String, u16, u8);"));
    assert!(region.contains("pub hemisphere: Hemisphere,"));

    let place = report.results.iter().find(|r| r.file_stem() == "Atlas.Place").unwrap();
    assert_eq!(place.severity, Severity::Info);

    let registry = code("Atlas");
    assert!(registry.contains("pub town: std::collections::HashMap<TownKey, Town>,"));
    assert!(!registry.contains("pub place:"));
    assert!(registry.contains("pub g: super::geo::GeoRegistry,"));
}

#[test]
fn test_builder_types_apply_to_sources() {
    let mut scores = PropertyDecl::new("scores", "Dictionary", PropertyRole::Plain);
    scores.key = Some("string".into());
    scores.value = Some("int".into());
    let source = MemorySource::new().with(
        "Main",
        SchemaDecl {
            name: Some("Main".into()),
            types: vec![TypeDecl::Entity(CompositeDecl {
                name: Some("User".into()),
                properties: vec![PropertyDecl::new("id", "Guid", PropertyRole::PrimaryKey), scores],
                ..Default::default()
            })],
            ..Default::default()
        },
    );

    let mut types = datareg_compiler::config::TypesConfig::default();
    types.primitives.int32 = "int".into();
    types.containers.map = "Dictionary".into();
    types.custom.push(datareg_compiler::config::CustomPrimitive {
        name: "Guid".into(),
        namespace: "System".into(),
        can_be_key: true,
    });

    let mut compiler = Compiler::builder().with_types(&types).build().unwrap();
    compiler.load(&source, &ids(&["Main"])).unwrap();

    let report = compiler.emit(&RustBackend::default());
    let user = report
        .results
        .iter()
        .find(|r| r.file_stem() == "Main.User")
        .and_then(|r| r.code.clone())
        .unwrap();
    assert!(user.contains("pub id: system::Guid,"));
    assert!(user.contains("pub scores: std::collections::HashMap<String, i32>,"));
}
