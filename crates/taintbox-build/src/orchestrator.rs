//! Sequential build/push orchestration.
//!
//! Cases are processed strictly in the order given; entries are appended
//! in that same order. A failure on one case is recorded and the next case
//! is attempted. Only the optional base-image pull can abort the run, and
//! it happens before any case.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use taintbox_common::config::Settings;
use taintbox_common::error::{ErrorKind, Result, TaintboxError};
use taintbox_common::types::{Case, sanitize_component};
use taintbox_mutate::reference::ImageRef;
use taintbox_mutate::render::{MutationArtifact, RenderOptions, canary_for, render};
use taintbox_mutate::tag::{TagRequest, format_timestamp, generate_tag};

use crate::clock::Clock;
use crate::runlist::{EntryError, EntryStatus, RunEntry, SkippedCase, payload_preview};
use crate::tool::ContainerTool;

/// Everything produced by one orchestrated run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// One entry per build attempt, in processing order.
    pub entries: Vec<RunEntry>,
    /// Cases that never reached the container tool.
    pub skipped: Vec<SkippedCase>,
    /// Whether the run was interrupted before the last case.
    pub cancelled: bool,
}

/// A case ready for the container tool.
struct Prepared {
    image: ImageRef,
    tag_sanitized: bool,
    canary: String,
    context_dir: PathBuf,
    artifact: MutationArtifact,
}

/// Drives the container tool over a list of cases.
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    suite_name: &'a str,
    render_options: RenderOptions,
    tool: &'a dyn ContainerTool,
    clock: &'a dyn Clock,
    cancel: Option<&'a AtomicBool>,
    external_appended_count: usize,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for one run.
    #[must_use]
    pub fn new(
        settings: &'a Settings,
        suite_name: &'a str,
        tool: &'a dyn ContainerTool,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            settings,
            suite_name,
            render_options: RenderOptions::from_settings(settings),
            tool,
            clock,
            cancel: None,
            external_appended_count: 0,
        }
    }

    /// Checks `flag` between cases and stops once it is set.
    #[must_use]
    pub const fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Records how many inline-ingested cases this run carries.
    #[must_use]
    pub const fn with_external_appended_count(mut self, count: usize) -> Self {
        self.external_appended_count = count;
        self
    }

    /// Processes every case in order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the base-image pull fails; case-level
    /// failures are recorded in the outcome.
    pub fn run(&self, cases: Vec<Case>) -> Result<RunOutcome> {
        if self.settings.pull_base {
            tracing::info!(image = %self.settings.base_image, "pulling base image");
            self.tool.pull(&self.settings.base_image)?;
        }

        let mut outcome = RunOutcome::default();
        for case in cases {
            if outcome.cancelled || self.cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
                if !outcome.cancelled {
                    tracing::warn!("run cancelled, abandoning remaining cases");
                }
                outcome.cancelled = true;
                outcome.skipped.push(SkippedCase {
                    case_id: case.id,
                    carrier: case.carrier,
                    kind: ErrorKind::Cancelled,
                    message: "run cancelled before this case was attempted".into(),
                });
                continue;
            }

            match self.prepare(&case) {
                Ok(prepared) => outcome.entries.push(self.attempt(case, prepared)),
                Err(err) => {
                    tracing::warn!(case_id = %case.id, error = %err, "skipping case");
                    outcome.skipped.push(SkippedCase {
                        case_id: case.id,
                        carrier: case.carrier,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            attempted = outcome.entries.len(),
            failed = outcome.entries.iter().filter(|e| e.failed()).count(),
            skipped = outcome.skipped.len(),
            "run finished"
        );
        Ok(outcome)
    }

    fn prepare(&self, case: &Case) -> Result<Prepared> {
        let canary = canary_for(&case.id);
        let artifact = render(&self.settings.base_image, case, &canary, &self.render_options)?;

        let timestamp = format_timestamp(self.clock.now(), &self.settings.timestamp_format);
        let tag = generate_tag(&TagRequest {
            prefix: &self.settings.tag_prefix,
            suite: self.suite_name,
            case_id: &case.id,
            carrier: case.carrier,
            timestamp: &timestamp,
        });
        let image = ImageRef::new(
            &self.settings.registry,
            &self.settings.repo,
            &self.settings.image_name,
            &tag.value,
        )?;

        let context_dir = self.settings.outdir.join(format!(
            "work_{}_{}_{}",
            self.suite_name,
            sanitize_component(&case.id),
            sanitize_component(&timestamp)
        ));
        write_context(&context_dir, &artifact)?;

        Ok(Prepared {
            image,
            tag_sanitized: tag.sanitized,
            canary,
            context_dir,
            artifact,
        })
    }

    fn attempt(&self, case: Case, prepared: Prepared) -> RunEntry {
        let image = prepared.image.to_string();
        tracing::info!(case_id = %case.id, carrier = %case.carrier, image = %image, "building");

        let (status, error) = match self
            .tool
            .build(&image, &prepared.context_dir, &prepared.artifact.build_args)
        {
            Err(err) => {
                tracing::warn!(case_id = %case.id, error = %err, "build failed");
                (EntryStatus::BuildFailed, Some(EntryError::from(&err)))
            }
            Ok(()) if self.settings.push => match self.tool.push(&image) {
                Ok(()) => (EntryStatus::Pushed, None),
                Err(err) => {
                    tracing::warn!(case_id = %case.id, error = %err, "push failed");
                    (EntryStatus::PushFailed, Some(EntryError::from(&err)))
                }
            },
            Ok(()) => (EntryStatus::Built, None),
        };

        RunEntry {
            image_tag: prepared.image.tag().to_string(),
            tag_sanitized: prepared.tag_sanitized,
            image,
            canary: prepared.canary,
            payload_preview: payload_preview(&case.payload),
            case_id: case.id,
            carrier: case.carrier,
            path: case.path,
            tool: self.tool.name().to_string(),
            external_appended_count: self.external_appended_count,
            status,
            error,
        }
    }
}

fn write_context(dir: &Path, artifact: &MutationArtifact) -> Result<()> {
    let io_err = |e| TaintboxError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    std::fs::write(dir.join("Dockerfile"), artifact.to_dockerfile()).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::{TimeZone, Utc};
    use taintbox_common::types::Carrier;
    use taintbox_mutate::tag::is_valid_tag;

    use super::*;
    use crate::clock::FixedClock;

    #[derive(Default)]
    struct ScriptedTool {
        fail_build: Vec<String>,
        fail_push: bool,
        fail_pull: bool,
        calls: RefCell<Vec<String>>,
    }

    impl ContainerTool for ScriptedTool {
        fn name(&self) -> &str {
            "docker"
        }

        fn pull(&self, image: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("pull {image}"));
            if self.fail_pull {
                return Err(TaintboxError::config(format!("pull of base image '{image}' failed")));
            }
            Ok(())
        }

        fn build(&self, image: &str, context_dir: &Path, _build_args: &[(String, String)]) -> Result<()> {
            assert!(context_dir.join("Dockerfile").exists());
            self.calls.borrow_mut().push(format!("build {image}"));
            if self.fail_build.iter().any(|f| image.contains(f.as_str())) {
                return Err(TaintboxError::Build {
                    tag: image.into(),
                    message: "exit 1".into(),
                });
            }
            Ok(())
        }

        fn push(&self, image: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("push {image}"));
            if self.fail_push {
                return Err(TaintboxError::Push {
                    tag: image.into(),
                    message: "denied".into(),
                });
            }
            Ok(())
        }
    }

    fn settings(outdir: &Path) -> Settings {
        Settings {
            base_image: "alpine:3.20".into(),
            registry: "registry.local:5000".into(),
            suite: PathBuf::from("suite.json"),
            outdir: outdir.to_path_buf(),
            ..Settings::default()
        }
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().expect("valid date"))
    }

    fn cases() -> Vec<Case> {
        vec![
            Case::new("c1", Carrier::Label, "one"),
            Case::new("c2", Carrier::Env, "two"),
            Case::new("c3", Carrier::Cmd, "three"),
        ]
    }

    #[test]
    fn build_failure_does_not_stop_later_cases() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = settings(dir.path());
        let tool = ScriptedTool {
            fail_build: vec!["-c2-".into()],
            ..ScriptedTool::default()
        };
        let clock = clock();

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(cases())
            .expect("run");

        let statuses: Vec<_> = outcome.entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![EntryStatus::Built, EntryStatus::BuildFailed, EntryStatus::Built]
        );
        assert_eq!(outcome.entries[1].error.as_ref().map(|e| e.kind), Some(ErrorKind::Build));
        assert_eq!(tool.calls.borrow().len(), 3);
    }

    #[test]
    fn push_failure_is_distinct_from_build_failure() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = Settings {
            push: true,
            ..settings(dir.path())
        };
        let tool = ScriptedTool {
            fail_push: true,
            ..ScriptedTool::default()
        };
        let clock = clock();

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(vec![Case::new("c1", Carrier::Label, "one")])
            .expect("run");

        assert_eq!(outcome.entries[0].status, EntryStatus::PushFailed);
        assert_eq!(outcome.entries[0].error.as_ref().map(|e| e.kind), Some(ErrorKind::Push));
    }

    #[test]
    fn failed_build_is_not_pushed() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = Settings {
            push: true,
            ..settings(dir.path())
        };
        let tool = ScriptedTool {
            fail_build: vec!["c1".into()],
            ..ScriptedTool::default()
        };
        let clock = clock();

        let _ = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(vec![Case::new("c1", Carrier::Label, "one")])
            .expect("run");
        assert!(tool.calls.borrow().iter().all(|c| !c.starts_with("push")));
    }

    #[test]
    fn pull_happens_once_before_cases() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = Settings {
            pull_base: true,
            ..settings(dir.path())
        };
        let tool = ScriptedTool::default();
        let clock = clock();

        let _ = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(cases())
            .expect("run");
        let calls = tool.calls.borrow();
        assert_eq!(calls[0], "pull alpine:3.20");
        assert_eq!(calls.iter().filter(|c| c.starts_with("pull")).count(), 1);
    }

    #[test]
    fn pull_failure_aborts_before_any_build() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = Settings {
            pull_base: true,
            ..settings(dir.path())
        };
        let tool = ScriptedTool {
            fail_pull: true,
            ..ScriptedTool::default()
        };
        let clock = clock();

        let err = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(cases())
            .expect_err("pull failure aborts the run");
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(tool.calls.borrow().len(), 1);
    }

    #[test]
    fn render_conflict_skips_only_that_case() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = Settings {
            trace_labels_enabled: true,
            payload_label_key: "org.llmsec.carrier".into(),
            ..settings(dir.path())
        };
        let tool = ScriptedTool::default();
        let clock = clock();

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(cases())
            .expect("run");
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].case_id, "c1");
        assert_eq!(outcome.skipped[0].kind, ErrorKind::Render);
    }

    #[test]
    fn cancellation_abandons_remaining_cases() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = settings(dir.path());
        let tool = ScriptedTool::default();
        let clock = clock();
        let cancel = AtomicBool::new(true);

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .with_cancel(&cancel)
            .run(cases())
            .expect("run");
        assert!(outcome.cancelled);
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.skipped.len(), 3);
        assert!(outcome.skipped.iter().all(|s| s.kind == ErrorKind::Cancelled));
    }

    #[test]
    fn entry_records_tag_canary_and_context() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = settings(dir.path());
        let tool = ScriptedTool::default();
        let clock = clock();

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .with_external_appended_count(7)
            .run(vec![Case::new("c1", Carrier::Label, "echo pwned")])
            .expect("run");

        let entry = &outcome.entries[0];
        assert_eq!(entry.image_tag, "suite-c1-label-20261016120000");
        assert!(!entry.tag_sanitized);
        assert_eq!(
            entry.image,
            "registry.local:5000/llmsec/mutated:suite-c1-label-20261016120000"
        );
        assert_eq!(entry.canary, "PWNED_CANARY_c1");
        assert_eq!(entry.external_appended_count, 7);
        let dockerfile = std::fs::read_to_string(
            dir.path().join("work_suite_c1_20261016120000").join("Dockerfile"),
        )
        .expect("dockerfile written");
        assert!(dockerfile.contains("LABEL payload=\"echo pwned\""));
    }

    #[test]
    fn entry_flags_rewritten_tag() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let settings = settings(dir.path());
        let tool = ScriptedTool::default();
        let clock = clock();

        let outcome = Orchestrator::new(&settings, "suite", &tool, &clock)
            .run(vec![Case::new("case one", Carrier::Env, "echo pwned")])
            .expect("run");

        let entry = &outcome.entries[0];
        assert!(entry.tag_sanitized);
        assert!(entry.image_tag.starts_with("suite-case-one-env-20261016120000-"));
        assert!(is_valid_tag(&entry.image_tag));
    }
}
