//! Startup replay, module upgrade and failsafe scenarios.

use canopy_tests::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

use canopy_core::Modstate;

fn old_modstate() -> Modstate {
    let mut ms = Modstate::new();
    ms.push(
        "example-system",
        "urn:example:sys",
        Revision::parse("2023-06-01").unwrap(),
    );
    ms
}

mod startup {
    use super::*;

    #[test]
    fn test_startup_replayed_into_running() {
        // GIVEN: a startup datastore
        let f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("hostname", "boot-host")]))
            .build();

        // THEN: boot committed it to running, candidate mirrors it
        assert_eq!(f.running_leaf("hostname"), Some("boot-host".to_string()));
        let (candidate, _) = f.engine.store().load(CANDIDATE).unwrap();
        assert!(candidate.deep_equal(&f.running()));
    }

    #[test]
    fn test_startup_gets_defaults() {
        let f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("hostname", "boot-host")]))
            .build();
        assert_eq!(f.running_leaf("mtu"), Some("1500".to_string()));
    }

    #[test]
    fn test_startup_runs_plugin_pipeline() {
        // GIVEN
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("hostname", "boot-host")]))
            .plugin(Box::new(Recording::new("a", trace.clone())))
            .build();

        // THEN: the all-ADD transaction drove the full lifecycle
        assert_eq!(
            *trace.borrow(),
            vec![
                "a:begin",
                "a:validate",
                "a:complete",
                "a:commit",
                "a:commit_done",
                "a:end",
            ]
        );
        assert_eq!(f.running_leaf("hostname"), Some("boot-host".to_string()));
    }

    #[test]
    fn test_boot_without_startup_is_empty_running() {
        let f = Fixture::new();
        assert!(f.running().is_empty());
    }
}

mod upgrade {
    use super::*;

    const RENAME_CHANGELOG: &str = r#"{
  "entries": [
    {
      "namespace": "urn:example:sys",
      "revfrom": 20230601,
      "revision": 20240115,
      "steps": [
        { "op": "rename", "where": "/system/host-name", "tag": "'hostname'" }
      ]
    }
  ]
}"#;

    #[test]
    fn test_changelog_upgrades_old_startup() {
        // GIVEN: startup authored against the 2023 revision, using the
        // old leaf name
        let f = Fixture::builder()
            .seed_with_modstate(
                STARTUP,
                Fixture::system_tree(&[("host-name", "old-host")]),
                old_modstate(),
            )
            .changelog(RENAME_CHANGELOG)
            .build();

        // THEN: the changelog renamed the leaf before binding, and the
        // upgraded tree validated and committed
        assert_eq!(f.running_leaf("hostname"), Some("old-host".to_string()));
    }

    #[test]
    fn test_programmatic_upgrade_callback() {
        // GIVEN: an upgrade callback renaming the old leaf
        let mut f = Fixture::builder()
            .seed_with_modstate(
                STARTUP,
                Fixture::system_tree(&[("host-name", "old-host")]),
                old_modstate(),
            )
            .no_boot()
            .build();
        f.engine.upgrades_mut().register(
            Some("urn:example:sys"),
            Box::new(|tree, _ns, _from, _to| {
                let root = tree.root();
                let system = tree.child_elements(root).next();
                if let Some(system) = system {
                    if let Ok(Some(leaf)) = tree.find_child(system, "host-name") {
                        tree.set_name(leaf, "hostname").map_err(|e| {
                            canopy_upgrade::UpgradeError::Callback {
                                namespace: "urn:example:sys".to_string(),
                                message: e.to_string(),
                            }
                        })?;
                    }
                }
                Ok(())
            }),
        );

        // WHEN
        f.engine.boot().unwrap();

        // THEN
        assert_eq!(f.running_leaf("hostname"), Some("old-host".to_string()));
    }

    #[test]
    fn test_matching_modstate_skips_upgrades() {
        // GIVEN: a changelog that would break the tree if applied
        const DESTRUCTIVE: &str = r#"{
  "entries": [
    {
      "namespace": "urn:example:sys",
      "revfrom": 20230601,
      "revision": 20240115,
      "steps": [ { "op": "delete", "where": "/system" } ]
    }
  ]
}"#;
        // Startup authored against the current revision.
        let f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("hostname", "h")]))
            .changelog(DESTRUCTIVE)
            .build();

        // THEN: no module delta, so the changelog never ran
        assert_eq!(f.running_leaf("hostname"), Some("h".to_string()));
    }
}

mod failsafe {
    use super::*;

    #[test]
    fn test_invalid_startup_loads_failsafe() {
        // GIVEN: startup failing type validation, failsafe valid
        let f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("counter", "boom")]))
            .seed(FAILSAFE, Fixture::system_tree(&[("hostname", "safe-host")]))
            .build();

        // THEN: the failsafe config is running
        assert_eq!(f.running_leaf("hostname"), Some("safe-host".to_string()));
    }

    #[test]
    fn test_invalid_startup_without_failsafe_is_fatal() {
        // GIVEN
        let mut f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("counter", "boom")]))
            .no_boot()
            .build();

        // WHEN
        let result = f.engine.boot();

        // THEN
        assert!(result.is_err());
    }

    #[test]
    fn test_failsafe_failure_restores_running() {
        // GIVEN: both startup and failsafe invalid
        let mut f = Fixture::builder()
            .seed(STARTUP, Fixture::system_tree(&[("counter", "boom")]))
            .seed(FAILSAFE, Fixture::system_tree(&[("counter", "also-boom")]))
            .no_boot()
            .build();

        // WHEN
        let result = f.engine.boot();

        // THEN: fatal, and running was restored from the tmp backup
        assert!(result.is_err());
        let (running, _) = f.engine.store().load(RUNNING).unwrap();
        assert!(running.is_empty());
    }
}

mod restart {
    use super::*;

    #[test]
    fn test_plugin_restart_replays_running() {
        // GIVEN: a committed config and a recording plugin
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("audit", trace.clone())))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.commit(1).is_ok());
        trace.borrow_mut().clear();

        // WHEN
        f.engine.plugin_restart("audit").unwrap();

        // THEN: reset seeded tmp, then the full single-plugin pipeline
        assert_eq!(
            *trace.borrow(),
            vec![
                "audit:reset:tmp",
                "audit:begin",
                "audit:validate",
                "audit:complete",
                "audit:commit",
                "audit:commit_done",
                "audit:end",
            ]
        );
        // Running is untouched by the replay.
        assert_eq!(f.running_leaf("hostname"), Some("r1".to_string()));
    }

    #[test]
    fn test_plugin_restart_unknown_name_fails() {
        let mut f = Fixture::new();
        assert!(f.engine.plugin_restart("ghost").is_err());
    }
}
