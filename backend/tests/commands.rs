//! End-to-end runs of the `dirstore` subcommands against a RocksDB backend
//! in a temporary directory.

use dirstore_configs::{BackendConfig, StorageEngine};
use dirstore_server::cli::{ImportLdifArgs, IndexStatusArgs, RebuildIndexArgs};
use dirstore_server::commands::{import_ldif, index_status, rebuild_index};
use std::fs;
use std::path::Path;

const LDIF: &str = "\
version: 1

dn: dc=example,dc=com
objectClass: domain
dc: example

dn: ou=People,dc=example,dc=com
objectClass: organizationalUnit

dn: uid=alice,ou=People,dc=example,dc=com
objectClass: person
cn: Alice
sn: Liddell

dn: uid=bob,ou=Missing,dc=example,dc=com
objectClass: person
cn: Bob
sn: Builder

dn: cn=stray,o=elsewhere
objectClass: person
cn: stray
";

fn config(dir: &Path) -> BackendConfig {
    let text = format!(
        r#"
        [storage]
        engine = "rocksdb"
        data_path = "{}"
        base_dns = ["dc=example,dc=com"]

        [[index.attribute_indexes]]
        attribute = "cn"
        types = ["equality"]

        [import]
        thread_count = 2
        "#,
        dir.join("data").display()
    );
    BackendConfig::from_toml_str(&text).unwrap()
}

fn import_args(ldif: &Path, reject: &Path) -> ImportLdifArgs {
    ImportLdifArgs {
        ldif_file: ldif.to_path_buf(),
        append: false,
        replace_existing: false,
        clear_backend: false,
        include_branches: Vec::new(),
        exclude_branches: Vec::new(),
        threads: None,
        reject_file: Some(reject.to_string_lossy().into_owned()),
        skip_file: None,
        skip_schema_validation: false,
        temp_dir: None,
    }
}

#[test]
fn test_import_then_index_status() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    assert_eq!(config.storage.engine, StorageEngine::Rocksdb);

    let ldif = dir.path().join("in.ldif");
    let reject = dir.path().join("rejects.ldif");
    fs::write(&ldif, LDIF).unwrap();

    let result = import_ldif::execute(&config, &import_args(&ldif, &reject)).unwrap();
    assert_eq!(result.entries_read, 5);
    assert_eq!(result.entries_imported, 3);
    assert_eq!(result.entries_rejected, 1);
    assert_eq!(result.entries_ignored, 1);

    let rejects = fs::read_to_string(&reject).unwrap();
    assert!(rejects.contains("dn: uid=bob,ou=Missing,dc=example,dc=com"));

    let report = index_status::execute(
        &config,
        &IndexStatusArgs {
            base_dn: None,
            json: true,
        },
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(json[0]["base_dn"], "dc=example,dc=com");
    assert_eq!(json[0]["entry_count"], 3);
    let indexes = json[0]["indexes"].as_array().unwrap();
    assert!(indexes.iter().all(|index| index["trusted"] == true));
}

#[test]
fn test_append_after_merge() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let ldif = dir.path().join("in.ldif");
    let reject = dir.path().join("rejects.ldif");
    fs::write(&ldif, LDIF).unwrap();
    import_ldif::execute(&config, &import_args(&ldif, &reject)).unwrap();

    let extra = dir.path().join("extra.ldif");
    fs::write(
        &extra,
        "dn: uid=carol,ou=People,dc=example,dc=com\nobjectClass: person\ncn: Carol\n\n\
         dn: uid=alice,ou=People,dc=example,dc=com\nobjectClass: person\ncn: Alice\n",
    )
    .unwrap();
    let mut args = import_args(&extra, &reject);
    args.append = true;
    let result = import_ldif::execute(&config, &args).unwrap();
    assert_eq!(result.entries_imported, 1);
    assert_eq!(result.entries_rejected, 1);

    let table = index_status::execute(
        &config,
        &IndexStatusArgs {
            base_dn: Some("dc=example,dc=com".to_string()),
            json: false,
        },
    )
    .unwrap();
    assert!(table.starts_with("dc=example,dc=com (4 entries)"));
}

#[test]
fn test_rebuild_index_matches_imported_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let ldif = dir.path().join("in.ldif");
    let reject = dir.path().join("rejects.ldif");
    fs::write(&ldif, LDIF).unwrap();
    import_ldif::execute(&config, &import_args(&ldif, &reject)).unwrap();

    let status_args = IndexStatusArgs {
        base_dn: None,
        json: true,
    };
    let before: serde_json::Value =
        serde_json::from_str(&index_status::execute(&config, &status_args).unwrap()).unwrap();

    let result = rebuild_index::execute(
        &config,
        &RebuildIndexArgs {
            base_dn: Some("dc=example,dc=com".to_string()),
            temp_dir: Some(dir.path().to_string_lossy().into_owned()),
        },
    )
    .unwrap();
    assert_eq!(result.base_dns, 1);
    assert_eq!(result.entries_processed, 3);

    let after: serde_json::Value =
        serde_json::from_str(&index_status::execute(&config, &status_args).unwrap()).unwrap();
    assert_eq!(after, before);
}
