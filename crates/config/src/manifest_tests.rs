// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use repoconv_core::redact::PLACEHOLDER;

const DEFAULTS: ManifestDefaults = ManifestDefaults { max_retries: 3 };

fn parse(text: &str) -> Manifest {
    parse_manifest(text, DEFAULTS, &Redactor::new()).unwrap()
}

#[test]
fn minimal_manifest_with_repo_list() {
    let manifest = parse(
        r#"
apache:
  type: svn
  code-host-name: svn.apache.org
  git-org-name: asf
  repo-parent-url: https://svn.apache.org/repos/asf
  repos:
    - xmlbeans
    - karaf
"#,
    );
    assert_eq!(manifest.repos.len(), 2);
    let repo = &manifest.repos[0];
    assert_eq!(repo.repo_key.as_str(), "xmlbeans");
    assert_eq!(repo.server_key.as_str(), "apache");
    assert_eq!(repo.vcs, VcsType::Svn);
    assert_eq!(repo.url, "https://svn.apache.org/repos/asf/xmlbeans");
    assert_eq!(repo.code_host_name, "svn.apache.org");
    assert_eq!(repo.git_org_name, "asf");
    assert_eq!(repo.repo_root_url, "https://svn.apache.org");
    // Built-in defaults
    assert_eq!(repo.fetch_batch_size, 100);
    assert_eq!(repo.git_default_branch, "trunk");
    assert!(repo.bare_clone);
    assert!(!repo.default_branch_only);
    assert_eq!(repo.max_retries, 3);
    assert_eq!(repo.layout, SvnLayout::Standard);
    assert!(!repo.allow_inactivity_timeout);
}

#[test]
fn repo_overrides_beat_server_and_global() {
    let manifest = parse(
        r#"
global:
  fetch-batch-size: 200
  git-default-branch: main
apache:
  type: svn
  url-unused: x
  repo-parent-url: https://svn.apache.org/repos/asf
  fetch-batch-size: 150
  repos:
    - xmlbeans:
        fetch-batch-size: 50
    - karaf
"#,
    );
    assert_eq!(manifest.repos[0].fetch_batch_size, 50);
    assert_eq!(manifest.repos[1].fetch_batch_size, 150);
    // Global still applies where nothing overrides it
    assert_eq!(manifest.repos[0].git_default_branch, "main");
}

#[test]
fn single_repo_as_bare_string() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos: xmlbeans
"#,
    );
    assert_eq!(manifest.repos.len(), 1);
    assert_eq!(manifest.repos[0].repo_key.as_str(), "xmlbeans");
}

#[test]
fn explicit_url_beats_parent_url() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos:
    - xmlbeans:
        url: https://svn.apache.org/special/xmlbeans/
"#,
    );
    // Trailing slash trimmed too
    assert_eq!(manifest.repos[0].url, "https://svn.apache.org/special/xmlbeans");
}

#[test]
fn code_host_name_falls_back_to_url_host() {
    let manifest = parse(
        r#"
mirror:
  type: svn
  repos:
    - widgets:
        url: https://user@svn.example.com:8443/repos/widgets
"#,
    );
    assert_eq!(manifest.repos[0].code_host_name, "svn.example.com");
}

#[test]
fn passwords_are_registered_with_the_redactor() {
    let redactor = Redactor::new();
    let manifest = parse_manifest(
        r#"
apache:
  type: svn
  password: tops3cret
  repo-parent-url: https://svn.apache.org/repos/asf
  repos: [xmlbeans]
"#,
        DEFAULTS,
        &redactor,
    )
    .unwrap();
    assert_eq!(manifest.repos[0].password.as_deref(), Some("tops3cret"));
    assert_eq!(redactor.redact("pw=tops3cret"), format!("pw={PLACEHOLDER}"));
}

#[test]
fn explicit_layout_paths() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos:
    - xmlbeans:
        trunk: trunk
        branches:
          - branches
          - sandbox
        tags: tags
"#,
    );
    assert_eq!(
        manifest.repos[0].layout,
        SvnLayout::Explicit {
            trunk: Some("trunk".into()),
            branches: vec!["branches".into(), "sandbox".into()],
            tags: vec!["tags".into()],
        }
    );
}

#[test]
fn layout_shorthand_wins_over_explicit_paths() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos:
    - xmlbeans:
        layout: standard
        trunk: trunk
"#,
    );
    assert_eq!(manifest.repos[0].layout, SvnLayout::Standard);
}

#[test]
fn missing_type_skips_repo_not_manifest() {
    let manifest = parse(
        r#"
broken:
  repo-parent-url: https://svn.example.com/repos
  repos: [a]
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos: [xmlbeans]
"#,
    );
    assert_eq!(manifest.repos.len(), 1);
    assert_eq!(manifest.repos[0].repo_key.as_str(), "xmlbeans");
}

#[test]
fn missing_url_skips_repo() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repos: [xmlbeans]
"#,
    );
    assert!(manifest.repos.is_empty());
}

#[test]
fn duplicate_repo_keys_keep_first_declaration() {
    let manifest = parse(
        r#"
one:
  type: svn
  repo-parent-url: https://one.example.com/repos
  repos: [shared]
two:
  type: svn
  repo-parent-url: https://two.example.com/repos
  repos: [shared]
"#,
    );
    assert_eq!(manifest.repos.len(), 1);
    assert_eq!(manifest.repos[0].server_key.as_str(), "one");
}

#[test]
fn server_concurrency_override_is_collected() {
    let manifest = parse(
        r#"
apache:
  type: svn
  max-concurrent-conversions: 5
  repo-parent-url: https://svn.apache.org/repos/asf
  repos: [xmlbeans]
"#,
    );
    assert_eq!(manifest.server_caps.get(&ServerKey::new("apache")), Some(&5));
}

#[test]
fn fetch_interval_and_retries() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  max-retries: 7
  repos:
    - xmlbeans:
        fetch-interval-seconds: 7200
"#,
    );
    let repo = &manifest.repos[0];
    assert_eq!(repo.fetch_interval, Some(Duration::from_secs(7200)));
    assert_eq!(repo.max_retries, 7);
}

#[test]
fn git_repo_name_overrides_key_derivation() {
    let manifest = parse(
        r#"
apache:
  type: svn
  repo-parent-url: https://svn.apache.org/repos/asf
  repos:
    - "weird name!":
        git-repo-name: sane-name
"#,
    );
    assert_eq!(manifest.repos[0].repo_key.as_str(), "sane-name");
    // URL still derives from the declared name
    assert_eq!(manifest.repos[0].url, "https://svn.apache.org/repos/asf/weird name!");
}

#[test]
fn yaml_syntax_error_is_fatal() {
    let err = parse_manifest("a: [unclosed", DEFAULTS, &Redactor::new()).unwrap_err();
    assert!(matches!(err, ManifestError::Yaml(_)));
}

#[test]
fn non_mapping_root_is_fatal() {
    let err = parse_manifest("- just\n- a\n- list\n", DEFAULTS, &Redactor::new()).unwrap_err();
    assert!(matches!(err, ManifestError::NotAMapping));
}

#[test]
fn reserved_types_are_loaded_for_later() {
    let manifest = parse(
        r#"
tfs:
  type: tfvc
  repo-parent-url: https://tfs.example.com/collection
  repos: [project]
"#,
    );
    assert_eq!(manifest.repos.len(), 1);
    assert_eq!(manifest.repos[0].vcs, VcsType::Tfvc);
}
