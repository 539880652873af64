use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn temp_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write temp file");
    path
}

/// Resource file with a stored pipeline and legacy handlers writing their
/// payload under `out`
#[allow(dead_code)]
pub fn resources_yaml(out: &std::path::Path) -> String {
    format!(
        r#"
type: Pipeline
spec:
  metadata:
    name: incidents
  workflows:
    - name: page oncall
      filters:
        - type: EventFilter
          name: is_incident
        - type: EventFilter
          name: production
      mutator:
        type: Mutator
        name: only_check_output
      handler:
        type: Handler
        name: pager
    - name: archive
      handler:
        type: Handler
        name: archive
---
type: EventFilter
spec:
  metadata:
    name: production
  action: allow
  expressions:
    - event.entity.metadata.namespace == 'production'
---
type: Handler
spec:
  metadata:
    name: pager
  type: pipe
  command: cat > {out}/pager.out
---
type: Handler
spec:
  metadata:
    name: archive
  type: pipe
  command: cat > {out}/archive.out
---
type: Handler
spec:
  metadata:
    name: ops
  type: set
  handlers:
    - pager
    - archive
"#,
        out = out.display()
    )
}

#[allow(dead_code)]
pub fn event_json(namespace: &str, status: u32, handlers: &[&str], pipelines: &[&str]) -> String {
    serde_json::json!({
        "entity": {"metadata": {"name": "web-01", "namespace": namespace}},
        "check": {
            "metadata": {"name": "check-http", "namespace": namespace},
            "status": status,
            "output": "HTTP CRITICAL: 503",
            "handlers": handlers,
        },
        "pipelines": pipelines
            .iter()
            .map(|p| serde_json::json!({"type": "Pipeline", "name": p}))
            .collect::<Vec<_>>(),
    })
    .to_string()
}
