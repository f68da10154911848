//! Candidate/running transaction scenarios.

use canopy_tests::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

mod commit {
    use super::*;

    #[test]
    fn test_basic_commit() {
        // GIVEN: candidate = <system><hostname>router1</hostname></system>,
        // running empty
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "router1")]));

        // WHEN
        let reply = f.commit(1);

        // THEN: <ok/> and running carries the candidate content
        assert!(reply.is_ok(), "unexpected: {:?}", reply);
        assert_eq!(f.running_leaf("hostname"), Some("router1".to_string()));
    }

    #[test]
    fn test_commit_fills_defaults_into_running() {
        // GIVEN: mtu has default 1500 and is absent from the candidate
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "router1")]));

        // WHEN
        assert!(f.commit(1).is_ok());

        // THEN
        assert_eq!(f.running_leaf("mtu"), Some("1500".to_string()));
    }

    #[test]
    fn test_validation_failure_keeps_running() {
        // GIVEN: counter is uint8, candidate carries text
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.commit(1).is_ok());
        let before = f.raw_datastore(RUNNING);
        f.set_candidate(&Fixture::system_tree(&[("counter", "not-a-number")]));

        // WHEN
        let reply = f.commit(1);

        // THEN: invalid-value at the offending path; running bit-identical
        let err = reply.errors().unwrap().first().unwrap().clone();
        assert_eq!(err.tag, ErrorTag::InvalidValue);
        assert_eq!(err.path.as_deref(), Some("/system/counter"));
        assert_eq!(f.raw_datastore(RUNNING), before);
    }

    #[test]
    fn test_lock_denied() {
        // GIVEN: session 1 locks running
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.engine.rpc_lock(1, RUNNING).is_ok());

        // WHEN: session 2 commits
        let reply = f.commit(2);

        // THEN
        assert_eq!(reply.errors().unwrap().first().unwrap().tag, ErrorTag::InUse);
        assert_eq!(f.running_leaf("hostname"), None);

        // WHEN: the holder commits
        assert!(f.commit(1).is_ok());
        assert_eq!(f.running_leaf("hostname"), Some("r1".to_string()));
    }

    #[test]
    fn test_validate_rpc_does_not_touch_running() {
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        let before = f.raw_datastore(RUNNING);

        let reply = f.engine.rpc_validate(CANDIDATE);

        assert!(reply.is_ok(), "unexpected: {:?}", reply);
        assert_eq!(f.raw_datastore(RUNNING), before);
    }
}

mod round_trip {
    use super::*;

    #[test]
    fn test_copy_config_then_commit_is_identity() {
        // GIVEN: something committed
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.commit(1).is_ok());
        let before = f.raw_datastore(RUNNING);

        // WHEN: copy-config running->candidate; commit
        assert!(f.engine.rpc_copy_config(1, RUNNING, CANDIDATE).is_ok());
        assert!(f.commit(1).is_ok());

        // THEN: running unchanged
        assert_eq!(f.raw_datastore(RUNNING), before);
    }

    #[test]
    fn test_discard_changes_then_commit_is_identity() {
        // GIVEN: a committed config and a dirty candidate
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.commit(1).is_ok());
        let before = f.raw_datastore(RUNNING);
        f.set_candidate(&Fixture::system_tree(&[("hostname", "scratch")]));

        // WHEN
        assert!(f.engine.rpc_discard_changes(1).is_ok());
        assert!(f.commit(1).is_ok());

        // THEN
        assert_eq!(f.raw_datastore(RUNNING), before);
    }

    #[test]
    fn test_empty_candidate_commit_empties_running() {
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        assert!(f.commit(1).is_ok());

        f.set_candidate(&ConfigTree::new());
        assert!(f.commit(1).is_ok());

        assert!(f.running().is_empty());
    }
}

mod lifecycle {
    use super::*;

    fn trace() -> Trace {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_phase_order_across_plugins() {
        // GIVEN: two plugins in registration order
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone())))
            .plugin(Box::new(Recording::new("b", t.clone())))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));

        // WHEN
        assert!(f.commit(1).is_ok());

        // THEN: each phase sweeps the registry in order, commit_done
        // strictly after every commit
        assert_eq!(
            *t.borrow(),
            vec![
                "a:begin",
                "b:begin",
                "a:validate",
                "b:validate",
                "a:complete",
                "b:complete",
                "a:commit",
                "b:commit",
                "a:commit_done",
                "b:commit_done",
                "a:end",
                "b:end",
            ]
        );
    }

    #[test]
    fn test_commit_failure_aborts_in_reverse() {
        // GIVEN: plugin b refuses commit
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone())))
            .plugin(Box::new(Recording::new("b", t.clone()).failing("commit")))
            .plugin(Box::new(Recording::new("c", t.clone())))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));
        let before = f.raw_datastore(RUNNING);

        // WHEN
        let reply = f.commit(1);

        // THEN: operation-failed, running untouched
        assert_eq!(
            reply.errors().unwrap().first().unwrap().tag,
            ErrorTag::OperationFailed
        );
        assert_eq!(f.raw_datastore(RUNNING), before);

        // Every begun plugin got exactly one of end/abort: all three
        // began, none reached end, aborts ran in reverse order. c's
        // commit never ran, and commit_done ran nowhere.
        let trace = t.borrow();
        assert_eq!(
            trace
                .iter()
                .filter(|e| e.ends_with(":abort"))
                .collect::<Vec<_>>(),
            vec!["c:abort", "b:abort", "a:abort"]
        );
        assert!(!trace.iter().any(|e| e.ends_with(":end")));
        assert!(!trace.iter().any(|e| e.contains("commit_done")));
        assert!(!trace.contains(&"c:commit".to_string()));
    }

    #[test]
    fn test_begin_failure_aborts_only_begun() {
        // GIVEN: plugin b refuses begin
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone())))
            .plugin(Box::new(Recording::new("b", t.clone()).failing("begin")))
            .plugin(Box::new(Recording::new("c", t.clone())))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));

        // WHEN
        assert!(!f.commit(1).is_ok());

        // THEN: only a (which completed begin) is aborted
        let trace = t.borrow();
        assert_eq!(
            trace
                .iter()
                .filter(|e| e.ends_with(":abort"))
                .collect::<Vec<_>>(),
            vec!["a:abort"]
        );
        assert!(!trace.contains(&"c:begin".to_string()));
    }

    #[test]
    fn test_plugin_validate_failure_aborts() {
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone()).failing("validate")))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));

        let reply = f.commit(1);

        assert!(!reply.is_ok());
        assert_eq!(*t.borrow(), vec!["a:begin", "a:validate", "a:abort"]);
    }

    #[test]
    fn test_plugin_annotation_lands_in_running() {
        // GIVEN: a plugin annotating the target during complete
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone()).annotating("counter", "7")))
            .build();
        f.set_candidate(&Fixture::system_tree(&[("hostname", "r1")]));

        // WHEN
        assert!(f.commit(1).is_ok());

        // THEN: the annotation is part of running
        assert_eq!(f.running_leaf("counter"), Some("7".to_string()));
    }

    #[test]
    fn test_empty_target_still_runs_plugin_phases() {
        // GIVEN: empty candidate, empty running
        let t = trace();
        let mut f = Fixture::builder()
            .plugin(Box::new(Recording::new("a", t.clone())))
            .build();

        // WHEN
        assert!(f.commit(1).is_ok());

        // THEN: the full lifecycle ran despite there being nothing to
        // validate
        assert_eq!(
            *t.borrow(),
            vec![
                "a:begin",
                "a:validate",
                "a:complete",
                "a:commit",
                "a:commit_done",
                "a:end",
            ]
        );
    }
}

mod edit {
    use super::*;

    #[test]
    fn test_edit_config_merge_list_entry() {
        // GIVEN: one server committed
        let mut f = Fixture::new();
        let mut tree = Fixture::system_tree(&[("hostname", "r1")]);
        let system = tree.child_elements(tree.root()).next().unwrap();
        let server = tree.add_element(system, "server", None).unwrap();
        tree.add_leaf(server, "name", None, "s1").unwrap();
        f.set_candidate(&tree);
        assert!(f.commit(1).is_ok());

        // WHEN: merging a second server into the candidate
        let mut edit = ConfigTree::new();
        let root = edit.root();
        let system = edit
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        let server = edit.add_element(system, "server", None).unwrap();
        edit.add_leaf(server, "name", None, "s2").unwrap();
        assert!(f
            .engine
            .rpc_edit_config(1, CANDIDATE, EditOp::Merge, &edit)
            .is_ok());
        assert!(f.commit(1).is_ok());

        // THEN: both servers are running
        let running = f.running();
        let system = running.child_elements(running.root()).next().unwrap();
        let servers: Vec<_> = running
            .child_elements(system)
            .filter(|n| running.name(*n).unwrap() == "server")
            .collect();
        assert_eq!(servers.len(), 2);
    }

    #[test]
    fn test_edit_config_delete_missing_fails() {
        // GIVEN: a candidate whose system container lacks a hostname
        let mut f = Fixture::new();
        f.set_candidate(&Fixture::system_tree(&[("counter", "1")]));
        let mut edit = ConfigTree::new();
        let root = edit.root();
        let system = edit
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        let leaf = edit.add_leaf(system, "hostname", None, "x").unwrap();
        edit.add_attribute(leaf, "operation", "delete").unwrap();

        let reply = f.engine.rpc_edit_config(1, CANDIDATE, EditOp::Merge, &edit);

        // The system container itself merges fine; deleting the
        // absent hostname is the error.
        assert_eq!(
            reply.errors().unwrap().first().unwrap().tag,
            ErrorTag::DataMissing
        );
    }
}
