//! CLI integration tests for cloudforge
//!
//! These tests run the binary against workspace exports and script trees
//! written to temporary directories.

use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command instance for the cloudforge binary, isolated from user config
fn cloudforge_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("cloudforge"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("CLOUDFORGE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn write_doc(root: &Path, kind: &str, name: &str, properties: Value) {
    let doc = json!({"name": name, "properties": properties});
    write(root, &format!("{}/{}.json", kind, name), &doc.to_string());
}

/// Workspace with a linked service, a dataset, a pipeline and a notebook
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("workspace");

    write_doc(&ws, "linkedService", "Storage", json!({"type": "AzureBlobFS"}));
    write_doc(
        &ws,
        "dataset",
        "Sales",
        json!({"linkedServiceName": {"referenceName": "Storage", "type": "LinkedServiceReference"}}),
    );
    write_doc(
        &ws,
        "pipeline",
        "LoadSales",
        json!({"activities": [
            {"inputs": [{"referenceName": "Sales", "type": "DatasetReference"}]},
            {"sparkPool": {"referenceName": "pool01", "type": "BigDataPoolReference"}}
        ]}),
    );
    write_doc(
        &ws,
        "notebook",
        "Explore",
        json!({"cells": [], "linked": {"referenceName": "Storage", "type": "LinkedServiceReference"}}),
    );

    dir
}

/// Script tree with setup, two migrations and two ETL views
fn setup_scripts() -> TempDir {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("db");

    write(
        &db,
        "dbo_initial_setup.sql",
        "CREATE TABLE IF NOT EXISTS MigrationControl (ScriptName TEXT NOT NULL, Applied TEXT NOT NULL)",
    );
    write(&db, "migrations/001_customers.sql", "CREATE TABLE customers (id INTEGER, name TEXT)\nGO\nINSERT INTO customers VALUES (1, 'a')");
    write(&db, "migrations/002_orders.sql", "CREATE TABLE orders (id INTEGER, customer INTEGER)");
    write(
        &db,
        "etl/v_customer_orders.sql",
        "/* DependsOn: [v_customers] */\nDROP VIEW IF EXISTS v_customer_orders\nGO\nCREATE VIEW v_customer_orders AS SELECT c.id FROM v_customers c JOIN orders o ON o.customer = c.id",
    );
    write(
        &db,
        "etl/v_customers.sql",
        "DROP VIEW IF EXISTS v_customers\nGO\nCREATE VIEW v_customers AS SELECT * FROM customers",
    );

    dir
}

// =============================================================================
// Synapse ARM Tests
// =============================================================================

#[test]
fn test_syn_arm_writes_template_to_stdout() {
    let dir = setup_workspace();

    let assert = cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "--workspace-name", "prod-ws"])
        .assert()
        .success();

    let template: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(
        template["$schema"],
        "http://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#"
    );
    assert_eq!(template["contentVersion"], "1.0.0.0");

    let names: Vec<&str> = template["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["prod-ws/Storage", "prod-ws/Sales", "prod-ws/Explore", "prod-ws/LoadSales"]
    );

    let pipeline = &template["resources"][3];
    assert_eq!(pipeline["type"], "Microsoft.Synapse/workspaces/pipelines");
    assert_eq!(pipeline["apiVersion"], "2019-06-01-preview");
    // The spark pool reference is ignored
    assert_eq!(
        pipeline["dependsOn"],
        json!(["Microsoft.Synapse/workspaces/prod-ws/datasets/Sales"])
    );

    let notebook = &template["resources"][2];
    assert_eq!(notebook["dependsOn"], json!([]));
}

#[test]
fn test_syn_arm_uses_config_workspace_name() {
    let dir = setup_workspace();
    write(dir.path(), "cloudforge.toml", "[synapse]\nworkspace_name = \"from-config\"\n");

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from-config/Storage"));
}

#[test]
fn test_syn_arm_requires_workspace_name() {
    let dir = setup_workspace();

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No workspace name"));
}

#[test]
fn test_syn_arm_out_file() {
    let dir = setup_workspace();

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws", "--out", "template.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 4 resource(s)"));

    let template: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("template.json")).unwrap()).unwrap();
    assert_eq!(template["resources"].as_array().unwrap().len(), 4);
}

#[test]
fn test_syn_arm_rejects_cycles() {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("workspace");
    write_doc(
        &ws,
        "pipeline",
        "A",
        json!({"activities": [{"pipeline": {"referenceName": "B", "type": "PipelineReference"}}]}),
    );
    write_doc(
        &ws,
        "pipeline",
        "B",
        json!({"activities": [{"pipeline": {"referenceName": "A", "type": "PipelineReference"}}]}),
    );

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Circular dependency detected at: pipeline/A"));
}

#[test]
fn test_syn_arm_rejects_missing_dependency() {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("workspace");
    write_doc(
        &ws,
        "dataset",
        "Orphan",
        json!({"linkedServiceName": {"referenceName": "Gone", "type": "LinkedServiceReference"}}),
    );

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Dependency linkedService/Gone of dataset/Orphan not found",
        ));
}

#[test]
fn test_syn_arm_allows_one_name_across_kinds() {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("workspace");
    write_doc(&ws, "linkedService", "Sales", json!({"type": "AzureSqlDW"}));
    write_doc(
        &ws,
        "dataset",
        "Sales",
        json!({"linkedServiceName": {"referenceName": "Sales", "type": "LinkedServiceReference"}}),
    );

    let assert = cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws"])
        .assert()
        .success();

    let template: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let resources = template["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0]["name"], "ws/Sales");
    assert_eq!(resources[0]["type"], "Microsoft.Synapse/workspaces/linkedServices");
    assert_eq!(resources[1]["name"], "ws/Sales");
    assert_eq!(resources[1]["type"], "Microsoft.Synapse/workspaces/datasets");
    assert_eq!(
        resources[1]["dependsOn"],
        json!(["Microsoft.Synapse/workspaces/ws/linkedServices/Sales"])
    );
}

#[test]
fn test_syn_arm_typed_reference_needs_matching_kind() {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("workspace");
    // A pipeline named Sales does not satisfy a dataset reference
    write_doc(&ws, "pipeline", "Sales", json!({"activities": []}));
    write_doc(
        &ws,
        "pipeline",
        "Load",
        json!({"activities": [{"inputs": [{"referenceName": "Sales", "type": "DatasetReference"}]}]}),
    );

    cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dependency dataset/Sales of pipeline/Load not found"));
}

#[test]
fn test_syn_arm_applies_overrides() {
    let dir = setup_workspace();
    write(
        dir.path(),
        "overrides.json",
        r#"{"linkedService": [{"name": "Storage", "path": "$.properties.url", "value": "https://prod", "action": "update"}]}"#,
    );

    let assert = cloudforge_cmd(dir.path())
        .args(["syn", "arm", "--dir", "workspace", "-w", "ws", "--overrides", "overrides.json"])
        .assert()
        .success();

    let template: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(template["resources"][0]["properties"]["url"], "https://prod");

    // Source files are untouched
    let source = fs::read_to_string(dir.path().join("workspace/linkedService/Storage.json")).unwrap();
    assert!(!source.contains("https://prod"));
}

// =============================================================================
// Synapse Plan and Override Tests
// =============================================================================

#[test]
fn test_syn_plan_lists_order() {
    let dir = setup_workspace();

    cloudforge_cmd(dir.path())
        .args(["syn", "plan", "--dir", "workspace"])
        .assert()
        .success()
        .stdout(predicate::str::contains("LoadSales"))
        .stdout(predicate::str::contains("4 artifact(s)"));
}

#[test]
fn test_syn_plan_json_for_one_artifact() {
    let dir = setup_workspace();

    let assert = cloudforge_cmd(dir.path())
        .args(["--format", "json", "syn", "plan", "--dir", "workspace", "--artifact", "LoadSales"])
        .assert()
        .success();

    let items: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let ids: Vec<&str> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["Storage", "Sales", "LoadSales"]);
    assert_eq!(items[2]["key"], "pipeline/LoadSales");
    assert_eq!(items[2]["depends_on"], json!(["dataset/Sales"]));
    assert_eq!(
        items[0]["dependents"],
        json!(["dataset/Sales", "notebook/Explore"])
    );
}

#[test]
fn test_syn_plan_shared_name_needs_kind() {
    let dir = setup_workspace();
    write_doc(
        &dir.path().join("workspace"),
        "pipeline",
        "Sales",
        json!({"activities": [{"inputs": [{"referenceName": "Sales", "type": "DatasetReference"}]}]}),
    );

    cloudforge_cmd(dir.path())
        .args(["syn", "plan", "--dir", "workspace", "--artifact", "Sales"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Artifact name Sales is ambiguous"))
        .stderr(predicate::str::contains("dataset/Sales, pipeline/Sales"));

    let assert = cloudforge_cmd(dir.path())
        .args(["--format", "json", "syn", "plan", "--dir", "workspace", "--artifact", "pipeline/Sales"])
        .assert()
        .success();

    let items: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let keys: Vec<&str> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["linkedService/Storage", "dataset/Sales", "pipeline/Sales"]);
}

#[test]
fn test_syn_plan_unknown_artifact() {
    let dir = setup_workspace();

    cloudforge_cmd(dir.path())
        .args(["syn", "plan", "--dir", "workspace", "--artifact", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Artifact not found: Nope"));
}

#[test]
fn test_syn_override_preview_and_inplace() {
    let dir = setup_workspace();
    write(
        dir.path(),
        "overrides.json",
        r#"{"dataset": [{"name": "Sales", "path": "$.properties.folder", "value": "prod", "action": "update"}]}"#,
    );
    let file = dir.path().join("workspace/dataset/Sales.json");

    cloudforge_cmd(dir.path())
        .args(["syn", "override", "--dir", "workspace", "--overrides", "overrides.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pass --inplace"));
    assert!(!fs::read_to_string(&file).unwrap().contains("prod"));

    cloudforge_cmd(dir.path())
        .args(["syn", "override", "--dir", "workspace", "--overrides", "overrides.json", "--inplace"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 1 file(s)"));

    let updated: Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(updated["properties"]["folder"], "prod");
    assert_eq!(updated["name"], "Sales");
}

#[test]
fn test_syn_override_invalid_action() {
    let dir = setup_workspace();
    write(
        dir.path(),
        "overrides.json",
        r#"{"dataset": [{"name": "Sales", "path": "$.properties.x", "value": 1, "action": "delete"}]}"#,
    );

    cloudforge_cmd(dir.path())
        .args(["syn", "override", "--dir", "workspace", "--overrides", "overrides.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid action 'delete'"));
}

// =============================================================================
// SQL Tests
// =============================================================================

#[test]
fn test_sql_plan_orders_scripts() {
    let dir = setup_scripts();

    let assert = cloudforge_cmd(dir.path())
        .args(["-f", "json", "sql", "plan", "--target-dir", "db"])
        .assert()
        .success();

    let plan: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(plan["initial_setup"], "dbo_initial_setup");
    assert_eq!(plan["migrations"], json!(["001_customers", "002_orders"]));
    assert_eq!(plan["etl"], json!(["v_customers", "v_customer_orders"]));
}

#[test]
fn test_sql_deploy_skips_applied_migrations() {
    let dir = setup_scripts();

    cloudforge_cmd(dir.path())
        .args(["sql", "deploy", "--target-dir", "db", "--database", "local.db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001_customers\tapplied"))
        .stdout(predicate::str::contains("v_customer_orders\trefreshed"));

    cloudforge_cmd(dir.path())
        .args(["sql", "deploy", "--target-dir", "db", "--database", "local.db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001_customers\tskipped"))
        .stdout(predicate::str::contains("002_orders\tskipped"))
        .stdout(predicate::str::contains("v_customers\trefreshed"));
}

#[test]
fn test_sql_deploy_json_report() {
    let dir = setup_scripts();

    let assert = cloudforge_cmd(dir.path())
        .args(["--format", "json", "sql", "deploy", "-t", "db", "-d", "local.db"])
        .assert()
        .success();

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[0]["stage"], "initial_setup");
    assert_eq!(steps[1]["outcome"]["status"], "applied");
    assert_eq!(steps[4]["outcome"]["status"], "refreshed");
}

#[test]
fn test_sql_deploy_continues_past_failures() {
    let dir = setup_scripts();
    write(dir.path(), "db/migrations/0015_broken.sql", "INSERT INTO missing_table VALUES (1)");

    cloudforge_cmd(dir.path())
        .args(["sql", "deploy", "--target-dir", "db", "--database", "local.db"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("0015_broken\tfailed"))
        .stdout(predicate::str::contains("002_orders\tapplied"))
        .stderr(predicate::str::contains("1 script(s) failed: 0015_broken"));
}

#[test]
fn test_sql_deploy_halt_on_failure() {
    let dir = setup_scripts();
    write(dir.path(), "db/migrations/0015_broken.sql", "INSERT INTO missing_table VALUES (1)");

    cloudforge_cmd(dir.path())
        .args(["sql", "deploy", "--target-dir", "db", "--database", "local.db", "--halt-on-failure"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("dbo_initial_setup\tapplied"))
        .stdout(predicate::str::contains("0015_broken\tfailed"))
        .stdout(predicate::str::contains("002_orders").not())
        .stderr(predicate::str::contains("Deployment stopped"))
        .stderr(predicate::str::contains("Failed to execute 0015_broken"));
}

#[test]
fn test_sql_deploy_resolves_before_touching_database() {
    let dir = setup_scripts();
    write(dir.path(), "db/etl/v_bad.sql", "/* DependsOn: [v_missing] */ SELECT 1");

    cloudforge_cmd(dir.path())
        .args(["sql", "deploy", "--target-dir", "db", "--database", "local.db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Dependency v_missing of v_bad not found"));

    assert!(!dir.path().join("local.db").exists());
}

#[test]
fn test_sql_deploy_multiple_declarations() {
    let dir = setup_scripts();
    write(
        dir.path(),
        "db/etl/v_twice.sql",
        "/* DependsOn: [v_customers] */\n/* DependsOn: [v_customer_orders] */\nSELECT 1",
    );

    cloudforge_cmd(dir.path())
        .args(["sql", "plan", "--target-dir", "db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Multiple DependsOn declarations found in v_twice"));
}

#[test]
fn test_config_flag_must_exist() {
    let dir = setup_scripts();

    cloudforge_cmd(dir.path())
        .args(["--config", "missing.toml", "sql", "plan", "--target-dir", "db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"));
}
