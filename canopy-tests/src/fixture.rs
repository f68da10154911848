//! The engine fixture.

use std::rc::Rc;

use tempfile::TempDir;

use canopy_core::{ManualClock, Modstate};
use canopy_engine::{ConfirmParams, Engine, EngineOptions, RpcReply};
use canopy_plugin::Plugin;
use canopy_store::{DatastoreStore, CANDIDATE, RUNNING};
use canopy_tree::ConfigTree;
use canopy_yang::{ContainerDef, LeafDef, LeafListDef, ListDef, Must, TypeSpec, YangSpec, YangSpecBuilder};

/// The schema the scenarios run against.
pub fn sample_spec() -> YangSpec {
    YangSpecBuilder::new()
        .module("example-system", "urn:example:sys", "2024-01-15", |m| {
            m.container(
                ContainerDef::new("system")
                    .with_must(Must::new("count(server) <= 4").with_message("too many servers")),
                |c| {
                    c.leaf(LeafDef::new("hostname", TypeSpec::string()));
                    c.leaf(LeafDef::new("mtu", TypeSpec::uint16()).with_default("1500"));
                    c.leaf(LeafDef::new("counter", TypeSpec::uint8()));
                    c.list(ListDef::new("server", &["name"]), |l| {
                        l.leaf(LeafDef::new("name", TypeSpec::string()));
                        l.leaf(LeafDef::new("port", TypeSpec::uint16()).with_default("22"));
                    });
                    c.leaf_list(LeafListDef::new("dns", TypeSpec::string()));
                },
            );
        })
        .build()
        .unwrap()
}

/// Builder for a [`Fixture`].
pub struct FixtureBuilder {
    spec: YangSpec,
    options: EngineOptions,
    plugins: Vec<Box<dyn Plugin>>,
    seeds: Vec<(String, ConfigTree, Option<Modstate>)>,
    boot: bool,
    changelog: Option<String>,
}

impl FixtureBuilder {
    fn new() -> Self {
        Self {
            spec: sample_spec(),
            options: EngineOptions::default(),
            plugins: Vec::new(),
            seeds: Vec::new(),
            boot: true,
            changelog: None,
        }
    }

    /// Replace the schema.
    pub fn spec(mut self, spec: YangSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Adjust the engine options.
    pub fn options(mut self, f: impl FnOnce(&mut EngineOptions)) -> Self {
        f(&mut self.options);
        self
    }

    /// Register a plugin.
    pub fn plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Seed a datastore file (with the current module-state) before
    /// the engine boots.
    pub fn seed(mut self, db: &str, tree: ConfigTree) -> Self {
        self.seeds.push((db.to_string(), tree, None));
        self
    }

    /// Seed a datastore file carrying a specific module-state record.
    pub fn seed_with_modstate(mut self, db: &str, tree: ConfigTree, modstate: Modstate) -> Self {
        self.seeds.push((db.to_string(), tree, Some(modstate)));
        self
    }

    /// Install a changelog document and point the options at it.
    pub fn changelog(mut self, json: &str) -> Self {
        self.changelog = Some(json.to_string());
        self
    }

    /// Skip `boot()`; the test drives startup itself.
    pub fn no_boot(mut self) -> Self {
        self.boot = false;
        self
    }

    /// Build the fixture.
    pub fn build(self) -> Fixture {
        Fixture::from_builder(self)
    }
}

/// An engine over a temporary store directory, on a manual clock.
pub struct Fixture {
    pub engine: Engine,
    pub clock: Rc<ManualClock>,
    spec: YangSpec,
    options: EngineOptions,
    dir: TempDir,
}

impl Fixture {
    /// A booted fixture with the sample schema and default options.
    pub fn new() -> Self {
        FixtureBuilder::new().build()
    }

    /// Start building a customized fixture.
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder::new()
    }

    fn from_builder(builder: FixtureBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut options = builder.options;
        if let Some(doc) = &builder.changelog {
            let path = dir.path().join("changelog.json");
            std::fs::write(&path, doc).unwrap();
            options.changelog_file = Some(path);
        }
        let mut store = DatastoreStore::open(dir.path()).unwrap();
        let current = builder.spec.modstate();
        for (db, tree, modstate) in &builder.seeds {
            let ms = modstate.as_ref().unwrap_or(&current);
            store.save(db, tree, Some(ms)).unwrap();
        }
        let clock = Rc::new(ManualClock::new(1_000));
        let mut engine = Engine::with_clock(
            builder.spec.clone(),
            store,
            options.clone(),
            Box::new(clock.clone()),
        )
        .unwrap();
        for plugin in builder.plugins {
            engine.register_plugin(plugin);
        }
        if builder.boot {
            engine.boot().unwrap();
        }
        Fixture {
            engine,
            clock,
            spec: builder.spec,
            options,
            dir,
        }
    }

    /// The store directory.
    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Simulate a process restart: rebuild the engine over the same
    /// directory (plugins are not carried over) and boot it.
    pub fn reopen(&mut self) {
        let store = DatastoreStore::open(self.dir.path()).unwrap();
        let mut engine = Engine::with_clock(
            self.spec.clone(),
            store,
            self.options.clone(),
            Box::new(self.clock.clone()),
        )
        .unwrap();
        engine.boot().unwrap();
        self.engine = engine;
    }

    // ========== Tree helpers ==========

    /// A `<system>` tree with the given leaves.
    pub fn system_tree(leaves: &[(&str, &str)]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        let root = tree.root();
        let system = tree
            .add_element(root, "system", Some("urn:example:sys"))
            .unwrap();
        for (name, value) in leaves {
            tree.add_leaf(system, *name, None, *value).unwrap();
        }
        tree
    }

    /// Overwrite the candidate datastore and mark it dirty.
    pub fn set_candidate(&mut self, tree: &ConfigTree) {
        let ms = self.spec.modstate();
        self.engine
            .store_mut()
            .save(CANDIDATE, tree, Some(&ms))
            .unwrap();
        self.engine.store_mut().set_modified(CANDIDATE, true);
    }

    /// Seed any datastore with the current module-state.
    pub fn set_datastore(&mut self, db: &str, tree: &ConfigTree) {
        let ms = self.spec.modstate();
        self.engine.store_mut().save(db, tree, Some(&ms)).unwrap();
    }

    /// Seed a datastore with an explicit module-state record.
    pub fn set_datastore_with_modstate(&mut self, db: &str, tree: &ConfigTree, ms: &Modstate) {
        self.engine.store_mut().save(db, tree, Some(ms)).unwrap();
    }

    /// Commit the candidate for a session.
    pub fn commit(&mut self, client: u32) -> RpcReply {
        self.engine.rpc_commit(client, ConfirmParams::default())
    }

    /// Commit with confirmed-commit parameters.
    pub fn commit_with(&mut self, client: u32, params: ConfirmParams) -> RpcReply {
        self.engine.rpc_commit(client, params)
    }

    /// The running tree.
    pub fn running(&self) -> ConfigTree {
        self.engine.store().load(RUNNING).unwrap().0
    }

    /// Body of `/system/<leaf>` in running, if present.
    pub fn running_leaf(&self, leaf: &str) -> Option<String> {
        let tree = self.running();
        let system = tree.child_elements(tree.root()).next()?;
        tree.child_body(system, leaf).unwrap()
    }

    /// Raw bytes of a datastore file.
    pub fn raw_datastore(&self, db: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("{}.json", db))).unwrap()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
