// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use the_prober::config::{load_options, ExecuterOptions, ScanOptions};
use the_prober::engine::{Engine, FileInput, InputProvider, ListInput};
use the_prober::output::JsonLinesSink;
use the_prober::template::{TemplateCache, TemplateLoader};

struct Args {
    config: Option<PathBuf>,
    templates: Vec<PathBuf>,
    targets: String,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--config options.yaml] <template.yaml> [template.yaml ...] <targets>\n\
         <targets> is a file with one target per line or a comma-separated list\n\
         Example: {} templates/panel.yaml https://example.com,https://example.org",
        program, program
    )
}

fn parse_args(args: &[String]) -> Result<Args> {
    let program = args.first().map(String::as_str).unwrap_or("the-prober");
    let mut config = None;
    let mut positional = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .with_context(|| format!("--config needs a file\n{}", usage(program)))?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => bail!(usage(program)),
            _ => positional.push(arg.clone()),
        }
    }

    let Some(targets) = positional.pop() else {
        bail!(usage(program));
    };
    if positional.is_empty() {
        bail!(usage(program));
    }
    Ok(Args {
        config,
        templates: positional.into_iter().map(PathBuf::from).collect(),
        targets,
    })
}

async fn inputs(targets: &str) -> Result<Box<dyn InputProvider>> {
    if Path::new(targets).is_file() {
        let input = FileInput::open(targets)
            .await
            .with_context(|| format!("failed to open target list '{}'", targets))?;
        Ok(Box::new(input))
    } else {
        Ok(Box::new(ListInput::parse(targets)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let args = parse_args(&args)?;
    let start_time = Instant::now();

    let options = match &args.config {
        Some(path) => load_options(path)?,
        None => ScanOptions::default(),
    };
    let runtime = ExecuterOptions::new(options, Arc::new(JsonLinesSink::stdout()))
        .context("failed to build http transport")?;

    let loader = TemplateLoader::new(Arc::new(TemplateCache::new()), runtime.clone());
    let loaded = loader.load_all(args.templates.as_slice());
    for rejected in &loaded.rejected {
        eprintln!("skipping template: {}", rejected);
    }
    let executers = loaded.into_executers(&runtime);
    if executers.is_empty() {
        bail!("no runnable templates");
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let summary = Engine::new(runtime)
        .execute(executers, inputs(&args.targets).await?, cancel)
        .await?;

    eprintln!(
        "{} pairs executed, {} matched, {} skipped, {} failed, {} results in {:?}{}",
        summary.pairs_executed,
        summary.pairs_matched,
        summary.pairs_skipped,
        summary.pairs_failed,
        summary.results,
        start_time.elapsed(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
