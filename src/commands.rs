//! Glue between the parsed command line and the pipeline.

use std::path::Path;

use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::cli::{CliOptions, Command, GenerateArgs, SearchArgs, StatusArgs};
use crate::error::PipelineError;
use crate::persist::Persister;
use crate::pipeline::{BatchSummary, Pipeline, status};
use crate::source::{GenerateSource, ReferenceImage, SearchSource};

/// Loads the catalog named on the command line, or the bundled one.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog, PipelineError> {
    let catalog = match path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::bundled()?,
    };
    if catalog.is_empty() {
        warn!("Catalog is empty, nothing to do");
    }
    Ok(catalog)
}

/// Runs whichever subcommand was given. `None` for commands that don't fetch anything.
pub async fn run(cli: &CliOptions) -> Result<Option<BatchSummary>, PipelineError> {
    let catalog = load_catalog(cli.catalog.as_deref())?;
    let out_dir = cli.out_dir();
    match &cli.command {
        Command::Search(args) => search(args, &catalog, &out_dir).await.map(Some),
        Command::Generate(args) => generate(args, &catalog, &out_dir).await.map(Some),
        Command::Status(args) => {
            report_status(args, &catalog, &out_dir);
            Ok(None)
        }
    }
}

async fn search(
    args: &SearchArgs,
    catalog: &Catalog,
    out_dir: &Path,
) -> Result<BatchSummary, PipelineError> {
    info!("Searching for images, target folder {}", out_dir.display());
    let source = SearchSource::new(args.config())?;
    let pipeline = Pipeline::new(
        source,
        Persister::new()?,
        args.naming(),
        out_dir,
        args.batch.options(),
    );
    pipeline.run(catalog).await
}

async fn generate(
    args: &GenerateArgs,
    catalog: &Catalog,
    out_dir: &Path,
) -> Result<BatchSummary, PipelineError> {
    // Every item needs the references, so check them before doing anything else.
    let references = args
        .references
        .iter()
        .map(|path| ReferenceImage::load(path))
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        "Generating images with {} reference image(s), target folder {}",
        references.len(),
        out_dir.display()
    );
    let source = GenerateSource::new(args.config(), references)?;
    let pipeline = Pipeline::new(
        source,
        Persister::new()?,
        args.naming(),
        out_dir,
        args.batch.options(),
    );
    pipeline.run(catalog).await
}

fn report_status(args: &StatusArgs, catalog: &Catalog, out_dir: &Path) {
    let report = status(catalog, &args.naming(), out_dir);
    let present = report.iter().filter(|entry| entry.present).count();
    for (index, entry) in report.iter().enumerate() {
        let mark = if entry.present { "present" } else { "missing" };
        info!(
            "{}/{}: {} [{mark}] {}",
            index + 1,
            report.len(),
            entry.name,
            entry.path.display()
        );
    }
    info!(
        "{present} present, {} missing, {} total",
        report.len() - present,
        report.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsString;

    #[tokio::test]
    async fn missing_reference_aborts_before_any_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let catalog_path = dir.path().join("items.txt");
        std::fs::write(&catalog_path, "A\nB\n").expect("write");
        let out_dir = dir.path().join("out");
        let missing = dir.path().join("template.jpg");

        let args: Vec<OsString> = vec![
            "catalog-images".into(),
            "--catalog".into(),
            catalog_path.into_os_string(),
            "--out-dir".into(),
            out_dir.clone().into_os_string(),
            "generate".into(),
            "--api-key".into(),
            "k".into(),
            "--api-base".into(),
            "http://127.0.0.1:9/".into(),
            "--reference".into(),
            missing.clone().into_os_string(),
        ];
        let cli = CliOptions::try_parse_from(args).expect("parse");

        let result = run(&cli).await;

        assert!(matches!(result, Err(PipelineError::MissingReference(path)) if path == missing));
        assert!(!out_dir.exists());
    }

    #[tokio::test]
    async fn status_needs_no_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args: Vec<OsString> = vec![
            "catalog-images".into(),
            "--out-dir".into(),
            dir.path().as_os_str().to_owned(),
            "status".into(),
        ];
        let cli = CliOptions::try_parse_from(args).expect("parse");

        assert!(matches!(run(&cli).await, Ok(None)));
    }

    #[test]
    fn bad_catalog_path_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = load_catalog(Some(dir.path().join("missing.json").as_path()));
        assert!(matches!(result, Err(PipelineError::Catalog(_))));
    }
}
