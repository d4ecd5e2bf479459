use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;

use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::analysis::{BasicMetrics, DataAnalysis};
use crate::charts::ChartRenderer;
use crate::checkpoint;
use crate::cleaning;
use crate::config::{ArtifactPaths, PipelineSettings};
use crate::error::{DmartError, PipelineError, Result};
use crate::ingestion::{self, RecordSource};
use crate::persistence::RecordSink;
use crate::transformation;
use crate::validation::DataValidation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Validate,
    Clean,
    Transform,
    Analyze,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Validate => "validate",
            Stage::Clean => "clean",
            Stage::Transform => "transform",
            Stage::Analyze => "analyze",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run currently is. Runs only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum RunState {
    Running(Stage),
    Done,
    Failed(Stage),
}

impl RunState {
    pub fn start() -> Self {
        RunState::Running(Stage::Ingest)
    }

    /// The state after `stage` succeeds, skipping disabled optional stages.
    pub fn after(stage: Stage, settings: &PipelineSettings) -> Self {
        let toggles = &settings.stages;
        let persist_enabled = toggles.persist_csv || toggles.persist_database;
        let mut next = stage;
        loop {
            next = match next {
                Stage::Ingest => Stage::Validate,
                Stage::Validate => Stage::Clean,
                Stage::Clean => Stage::Transform,
                Stage::Transform => Stage::Analyze,
                Stage::Analyze => Stage::Persist,
                Stage::Persist => return RunState::Done,
            };
            let enabled = match next {
                Stage::Transform => toggles.transform,
                Stage::Analyze => toggles.analyze,
                Stage::Persist => persist_enabled,
                _ => true,
            };
            if enabled {
                return RunState::Running(next);
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub source: String,
    pub raw_rows: usize,
    pub validated_rows: usize,
    pub cleaned_rows: usize,
    pub stages_completed: Vec<Stage>,
    pub metrics: Option<BasicMetrics>,
    pub persisted_table: Option<String>,
    pub artifacts: Vec<PathBuf>,
}

/// Runs Ingest → Validate → Clean → [Transform] → [Analyze] → [Persist].
pub struct Pipeline<'a> {
    settings: &'a PipelineSettings,
    paths: ArtifactPaths,
    source: &'a dyn RecordSource,
    sink: Option<&'a dyn RecordSink>,
    renderer: Option<&'a dyn ChartRenderer>,
    state: Cell<RunState>,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a PipelineSettings, source: &'a dyn RecordSource) -> Self {
        Self {
            paths: settings.paths(),
            settings,
            source,
            sink: None,
            renderer: None,
            state: Cell::new(RunState::start()),
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn RecordSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_renderer(mut self, renderer: &'a dyn ChartRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    fn is_next(&self, stage: Stage) -> bool {
        self.state.get() == RunState::Running(stage)
    }

    pub async fn run(&self) -> std::result::Result<RunReport, PipelineError> {
        info!(source = %self.source.describe(), "DMART pipeline started");
        self.state.set(RunState::start());
        let mut report = RunReport {
            source: self.source.describe(),
            ..RunReport::default()
        };

        let loaded = self
            .ingest(&mut report)
            .instrument(stage_span(Stage::Ingest))
            .await;
        let raw = self.finish(Stage::Ingest, loaded, &mut report)?;

        let validated = in_stage(Stage::Validate, || self.validate(raw));
        let validated = self.finish(Stage::Validate, validated, &mut report)?;
        report.validated_rows = validated.height();
        report.artifacts.push(self.paths.validated.clone());

        let cleaned = in_stage(Stage::Clean, || self.clean(validated));
        let mut table = self.finish(Stage::Clean, cleaned, &mut report)?;
        report.cleaned_rows = table.height();
        if self.settings.stages.persist_csv {
            report.artifacts.push(self.paths.cleaned.clone());
        }

        if self.is_next(Stage::Transform) {
            let transformed = in_stage(Stage::Transform, || self.transform(table));
            table = self.finish(Stage::Transform, transformed, &mut report)?;
            report.artifacts.push(self.paths.transformed.clone());
        }

        if self.is_next(Stage::Analyze) {
            let analyzed = in_stage(Stage::Analyze, || self.analyze(&table));
            let (metrics, artifacts) = self.finish(Stage::Analyze, analyzed, &mut report)?;
            report.metrics = Some(metrics);
            report.artifacts.extend(artifacts);
        }

        if self.is_next(Stage::Persist) {
            let persisted = self
                .persist(&table)
                .instrument(stage_span(Stage::Persist))
                .await;
            let persisted = self.finish(Stage::Persist, persisted, &mut report)?;
            report.persisted_table = persisted;
        }

        info!(
            rows = report.cleaned_rows,
            stages = report.stages_completed.len(),
            "DMART pipeline finished successfully"
        );
        Ok(report)
    }

    /// Advances the run past `stage`, or marks it failed.
    fn finish<T>(
        &self,
        stage: Stage,
        outcome: Result<T>,
        report: &mut RunReport,
    ) -> std::result::Result<T, PipelineError> {
        match outcome {
            Ok(value) => {
                self.state.set(RunState::after(stage, self.settings));
                report.stages_completed.push(stage);
                info!(stage = stage.as_str(), "Stage completed");
                Ok(value)
            }
            Err(source) => {
                self.state.set(RunState::Failed(stage));
                error!(
                    stage = stage.as_str(),
                    unexpected = source.is_unexpected(),
                    error = %source,
                    "Stage failed"
                );
                Err(PipelineError::new(stage, source))
            }
        }
    }

    async fn ingest(&self, report: &mut RunReport) -> Result<DataFrame> {
        let raw = self.source.load().await?;
        info!(rows = raw.height(), columns = raw.width(), "Raw data loaded");
        report.raw_rows = raw.height();

        checkpoint::write_csv(&raw, &self.paths.raw)?;
        report.artifacts.push(self.paths.raw.clone());

        if self.settings.stages.split_train_test && raw.height() > 1 {
            let split = &self.settings.split;
            let (train, test) =
                ingestion::split_train_test(&raw, split.test_size, split.random_state)?;
            checkpoint::write_csv(&train, &self.paths.train)?;
            checkpoint::write_csv(&test, &self.paths.test)?;
            report.artifacts.push(self.paths.train.clone());
            report.artifacts.push(self.paths.test.clone());
        }
        Ok(raw)
    }

    fn validate(&self, raw: DataFrame) -> Result<DataFrame> {
        DataValidation::new(
            self.settings.order_date_format.clone(),
            self.paths.validated.clone(),
        )
        .validate(raw)
    }

    fn clean(&self, validated: DataFrame) -> Result<DataFrame> {
        let cleaned = cleaning::clean(validated)?;
        if self.settings.stages.persist_csv {
            checkpoint::write_csv(&cleaned, &self.paths.cleaned)?;
        }
        Ok(cleaned)
    }

    fn transform(&self, table: DataFrame) -> Result<DataFrame> {
        let transformed = transformation::transform(table)?;
        checkpoint::write_csv(&transformed, &self.paths.transformed)?;
        Ok(transformed)
    }

    fn analyze(&self, table: &DataFrame) -> Result<(BasicMetrics, Vec<PathBuf>)> {
        let analysis = DataAnalysis::new(table);
        let report = analysis.write_artifacts(&self.paths.eda_dir)?;
        let mut artifacts = report.artifacts;

        match (self.settings.stages.render_charts, self.renderer) {
            (true, Some(renderer)) => {
                let charts = renderer.render(&analysis, &self.paths.eda_dir)?;
                info!(renderer = renderer.name(), files = charts.len(), "Chart data saved");
                artifacts.extend(charts);
            }
            (true, None) => warn!("Chart rendering enabled but no renderer configured"),
            _ => {}
        }
        Ok((report.metrics, artifacts))
    }

    async fn persist(&self, table: &DataFrame) -> Result<Option<String>> {
        if !self.settings.stages.persist_database {
            return Ok(None);
        }
        let sink = self.sink.ok_or_else(|| {
            DmartError::Config("database persistence enabled but no sink configured".to_string())
        })?;
        sink.write(table, &self.settings.sink_table, self.settings.write_mode)
            .await?;
        info!(sink = %sink.describe(), table = %self.settings.sink_table, "Cleaned data persisted");
        Ok(Some(self.settings.sink_table.clone()))
    }
}

fn stage_span(stage: Stage) -> Span {
    info_span!("stage", stage = stage.as_str())
}

fn in_stage<T>(stage: Stage, work: impl FnOnce() -> Result<T>) -> Result<T> {
    let _entered = stage_span(stage).entered();
    work()
}
