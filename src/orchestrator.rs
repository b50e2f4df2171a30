//! Run orchestration
//!
//! One deploy run, strictly in order: attributes, privilege drop, context,
//! merge, application lookup, recipe selection, convergence. The first
//! failure ends the run.

use converge::{ConvergeSummary, Engine, Settings};

use crate::attributes::{AttributeResolver, Transport};
use crate::error::{RunError, dump_stacktrace};
use crate::exit::RunOutcome;
use crate::lookup::{Lookup, find_application};
use crate::selector::select_recipes;

/// Runs once the attribute source has been read
pub type Hook<'a> = Box<dyn FnOnce() -> anyhow::Result<()> + 'a>;

/// The application id, or the usage error when none was given
pub fn require_app_id(app_id: Option<&str>) -> Result<&str, RunError> {
    app_id
        .filter(|id| !id.is_empty())
        .ok_or(RunError::UserInput)
}

pub struct Orchestrator<'a, T: Transport> {
    settings: Settings,
    attribute_source: Option<String>,
    resolver: AttributeResolver<T>,
    lookup: &'a dyn Lookup,
    engine: &'a mut dyn Engine,
    after_attributes: Option<Hook<'a>>,
}

impl<'a, T: Transport> Orchestrator<'a, T> {
    pub fn new(
        settings: Settings,
        attribute_source: Option<String>,
        resolver: AttributeResolver<T>,
        lookup: &'a dyn Lookup,
        engine: &'a mut dyn Engine,
    ) -> Self {
        Self {
            settings,
            attribute_source,
            resolver,
            lookup,
            engine,
            after_attributes: None,
        }
    }

    /// Run `hook` right after the attribute source is read
    ///
    /// Privileges are dropped here, so root-only attribute files stay readable.
    pub fn after_attributes(mut self, hook: impl FnOnce() -> anyhow::Result<()> + 'a) -> Self {
        self.after_attributes = Some(Box::new(hook));
        self
    }

    /// Deploy `app_id` and classify the result
    pub fn run(&mut self, app_id: Option<&str>) -> RunOutcome {
        match self.try_run(app_id) {
            Ok(summary) => {
                log::info!(
                    "Deploy of {} finished, {} recipes converged",
                    app_id.unwrap_or_default(),
                    summary.total()
                );
                RunOutcome::Success
            }
            Err(err) => {
                if err.wants_stacktrace() {
                    dump_stacktrace(&err, &self.settings.file_cache_path);
                }
                err.outcome()
            }
        }
    }

    fn try_run(&mut self, app_id: Option<&str>) -> Result<ConvergeSummary, RunError> {
        let app_id = require_app_id(app_id)?;

        self.settings.solo = false;

        let attributes = self.resolver.resolve(self.attribute_source.as_deref())?;

        if let Some(hook) = self.after_attributes.take() {
            hook().map_err(RunError::unclassified)?;
        }

        let mut ctx = self
            .engine
            .build_context(&self.settings)
            .map_err(RunError::engine)?;

        if let Some(attributes) = attributes {
            ctx.consume_attributes(attributes)
                .map_err(RunError::unclassified)?;
        }

        let app = find_application(self.lookup, app_id).map_err(RunError::unclassified)??;

        let host_roles = ctx.node.roles();
        let recipes = select_recipes(&app, &host_roles, &mut ctx, &mut *self.engine)?;
        log::info!("Selected recipes for {app_id}: [{}]", recipes.join(", "));

        self.engine.converge(&ctx).map_err(RunError::engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FetchError;
    use crate::error::STACKTRACE_FILE;
    use crate::lookup::StaticLookup;
    use converge::{ApplicationRecord, ConvergeSummary, ExitRequest, RecordingEngine, RunContext};
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::io::{self, Cursor, Read};
    use std::path::Path;

    /// Serves a fixed body for every source and counts requests
    struct CannedTransport {
        body: Option<&'static str>,
        calls: Cell<usize>,
    }

    impl CannedTransport {
        fn serving(body: &'static str) -> Self {
            Self {
                body: Some(body),
                calls: Cell::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                body: None,
                calls: Cell::new(0),
            }
        }
    }

    impl Transport for CannedTransport {
        fn fetch(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            match self.body {
                Some(body) => Ok(Box::new(Cursor::new(body.as_bytes().to_vec()))),
                None => Err(FetchError::Connect(format!("{url} refused"))),
            }
        }

        fn open(&self, _path: &Path) -> io::Result<Box<dyn Read>> {
            self.calls.set(self.calls.get() + 1);
            match self.body {
                Some(body) => Ok(Box::new(Cursor::new(body.as_bytes().to_vec()))),
                None => Err(io::ErrorKind::NotFound.into()),
            }
        }
    }

    fn web_app() -> ApplicationRecord {
        serde_json::from_value(json!({
            "id": "web",
            "server_roles": ["frontend", "backend"],
            "type": {"frontend": ["nginx"], "backend": ["api", "worker"]}
        }))
        .unwrap()
    }

    fn settings(cache: &Path) -> Settings {
        Settings {
            solo: true,
            file_cache_path: cache.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new().with_roles(&["backend", "frontend"]);

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(
            engine.converged,
            vec!["application::nginx", "application::api", "application::worker"]
        );
        assert_eq!(engine.converge_calls, 1);
        assert!(!engine.last_settings.unwrap().solo);
    }

    #[test]
    fn test_missing_application_name_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let transport = CannedTransport::serving("{}");
        let mut engine = RecordingEngine::new();

        for app_id in [None, Some("")] {
            let outcome = Orchestrator::new(
                settings(dir.path()),
                Some("http://attrs.example.com/a.json".into()),
                AttributeResolver::new(&transport),
                &lookup,
                &mut engine,
            )
            .run(app_id);

            assert_eq!(outcome.code(), 1);
            assert!(matches!(outcome, RunOutcome::UserError { .. }));
        }

        assert_eq!(engine.calls(), 0);
        assert_eq!(lookup.calls.get(), 0);
        assert_eq!(transport.calls.get(), 0);
    }

    #[test]
    fn test_unknown_application() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new().with_roles(&["frontend"]);

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("ghost"));

        assert_eq!(
            outcome,
            RunOutcome::fatal("Cannot find an application named ghost", 1)
        );
        assert_eq!(engine.converge_calls, 0);
    }

    #[test]
    fn test_attribute_failure_stops_before_engine() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new();

        let outcome = Orchestrator::new(
            settings(dir.path()),
            Some("https://attrs.example.com/web.json".into()),
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(
            outcome,
            RunOutcome::fatal("I cannot connect to https://attrs.example.com/web.json", 2)
        );
        assert_eq!(engine.calls(), 0);
        assert_eq!(lookup.calls.get(), 0);
    }

    #[test]
    fn test_attributes_merged_and_run_list_applied() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new();

        let outcome = Orchestrator::new(
            settings(dir.path()),
            Some("/etc/deploy-app/web.json".into()),
            AttributeResolver::new(CannedTransport::serving(
                r#"{"run_list": ["role[backend]"], "app": {"revision": "abc"}}"#,
            )),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(engine.converged, vec!["application::api", "application::worker"]);
    }

    #[test]
    fn test_no_matching_roles_still_converges() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new().with_roles(&["db"]);

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(outcome, RunOutcome::Success);
        assert!(engine.included.is_empty());
        assert_eq!(engine.converge_calls, 1);
    }

    #[test]
    fn test_build_failure_is_fatal_and_dumps_trace() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new().failing_build("cookbook sync failed");

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(
            outcome,
            RunOutcome::fatal("Engine error: cookbook sync failed", 1)
        );
        assert_eq!(lookup.calls.get(), 0);
        let trace = fs::read_to_string(dir.path().join(STACKTRACE_FILE)).unwrap();
        assert!(trace.contains("cookbook sync failed"));
    }

    #[test]
    fn test_converge_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new()
            .with_roles(&["frontend"])
            .failing_converge("package install failed");

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(outcome.code(), 1);
        assert_eq!(engine.included, vec!["application::nginx"]);
    }

    #[test]
    fn test_require_app_id() {
        assert_eq!(require_app_id(Some("web")).unwrap(), "web");
        assert!(matches!(require_app_id(None), Err(RunError::UserInput)));
        assert!(matches!(require_app_id(Some("")), Err(RunError::UserInput)));
    }

    #[test]
    fn test_privilege_hook_runs_after_attributes_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let transport = CannedTransport::serving("{}");
        let mut engine = RecordingEngine::new().with_roles(&["frontend"]);
        let order = RefCell::new(Vec::new());

        let outcome = Orchestrator::new(
            settings(dir.path()),
            Some("/etc/deploy-app/secret.json".into()),
            AttributeResolver::new(&transport),
            &lookup,
            &mut engine,
        )
        .after_attributes(|| {
            order
                .borrow_mut()
                .push(format!("privilege after {} reads", transport.calls.get()));
            Ok(())
        })
        .run(Some("web"));

        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(*order.borrow(), vec!["privilege after 1 reads"]);
        assert_eq!(engine.build_calls, 1);
    }

    #[test]
    fn test_hook_skipped_when_attributes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new();
        let ran = Cell::new(false);

        let outcome = Orchestrator::new(
            settings(dir.path()),
            Some("/etc/deploy-app/missing.json".into()),
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .after_attributes(|| {
            ran.set(true);
            Ok(())
        })
        .run(Some("web"));

        assert_eq!(outcome.code(), 2);
        assert!(!ran.get());
    }

    #[test]
    fn test_hook_failure_stops_before_engine() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new();

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .after_attributes(|| anyhow::bail!("Failed to get UID for user deploy, does it exist?"))
        .run(Some("web"));

        assert_eq!(
            outcome,
            RunOutcome::fatal("Failed to get UID for user deploy, does it exist?", 1)
        );
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_include_failure_is_an_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new()
            .with_roles(&["frontend"])
            .failing_include("cookbook application not found");

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(
            outcome,
            RunOutcome::fatal("Engine error: cookbook application not found", 1)
        );
        assert_eq!(engine.converge_calls, 0);
        assert!(dir.path().join(STACKTRACE_FILE).exists());
    }

    #[test]
    fn test_both_run_list_keys_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = RecordingEngine::new();

        let outcome = Orchestrator::new(
            settings(dir.path()),
            Some("/etc/deploy-app/web.json".into()),
            AttributeResolver::new(CannedTransport::serving(
                r#"{"run_list": ["role[frontend]"], "recipes": ["role[backend]"]}"#,
            )),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(outcome.code(), 1);
        assert_eq!(lookup.calls.get(), 0);
        assert_eq!(engine.converge_calls, 0);
    }

    /// Engine whose converge step decides the process exit itself
    struct ExitingEngine(RecordingEngine);

    impl Engine for ExitingEngine {
        fn build_context(&mut self, settings: &Settings) -> anyhow::Result<RunContext> {
            self.0.build_context(settings)
        }

        fn converge(&mut self, _ctx: &RunContext) -> anyhow::Result<ConvergeSummary> {
            Err(ExitRequest {
                code: 0,
                message: Some("Exiting".into()),
            }
            .into())
        }
    }

    #[test]
    fn test_exit_request_is_not_reclassified() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = StaticLookup::with(vec![web_app()]);
        let mut engine = ExitingEngine(RecordingEngine::new().with_roles(&["frontend"]));

        let outcome = Orchestrator::new(
            settings(dir.path()),
            None,
            AttributeResolver::new(CannedTransport::unreachable()),
            &lookup,
            &mut engine,
        )
        .run(Some("web"));

        assert_eq!(
            outcome,
            RunOutcome::Exit {
                message: Some("Exiting".into()),
                code: 0
            }
        );
        assert!(!dir.path().join(STACKTRACE_FILE).exists());
    }
}
